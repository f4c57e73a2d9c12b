use std::collections::HashMap;

use otpguard::{provisioning, Otp, OtpError, ProvisioningUri, Secret, Totp, DEFAULT_WINDOW};
use pretty_assertions::assert_eq;
use rstest::rstest;

const ENROLLED_AT: u64 = 1_640_995_200;

/// Stand-in for the account store: persists the secret and the last time
/// step a code was accepted for.
#[derive(Default)]
struct Accounts {
    secrets: HashMap<String, Secret>,
    last_step: HashMap<String, u64>,
}

impl Accounts {
    fn enroll(&mut self, email: &str) -> Result<String, OtpError> {
        let secret = otpguard::generate_secret()?;
        let uri = otpguard::build_uri(email, "ACME Co", &secret)?;
        self.secrets.insert(email.to_string(), secret);

        Ok(uri)
    }

    fn login(&mut self, email: &str, code: &str, now: u64) -> Result<bool, OtpError> {
        let Some(secret) = self.secrets.get(email) else {
            return Ok(false);
        };

        let totp = Totp::new(secret.clone());
        let step = totp.validate_window(code, now, DEFAULT_WINDOW as u64, DEFAULT_WINDOW as u64)?;

        match step {
            Some(step) if self.last_step.get(email).map_or(true, |last| step > *last) => {
                self.last_step.insert(email.to_string(), step);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// What an authenticator app does after scanning the QR code
fn authenticator_code(uri: &str, now: u64) -> String {
    let totp = Totp::from_uri(uri).unwrap();
    totp.generate(now).unwrap().to_string()
}

#[test]
fn enroll_then_login() {
    let mut accounts = Accounts::default();
    let uri = accounts.enroll("john.doe@email.com").unwrap();

    let png = otpguard::render_qr(&uri).unwrap();
    assert!(!png.is_empty());

    let provisioned = provisioning::parse_uri(&uri).unwrap();
    assert_eq!("john.doe@email.com", provisioned.account);
    assert_eq!(Some("ACME Co".to_string()), provisioned.issuer);
    assert_eq!(
        accounts.secrets["john.doe@email.com"].as_str(),
        provisioned.totp.secret().as_str()
    );

    let code = authenticator_code(&uri, ENROLLED_AT);
    assert!(accounts.login("john.doe@email.com", &code, ENROLLED_AT + 10).unwrap());
}

#[test]
fn replayed_code_is_refused_by_the_store() {
    let mut accounts = Accounts::default();
    let uri = accounts.enroll("john.doe@email.com").unwrap();

    let code = authenticator_code(&uri, ENROLLED_AT);
    assert!(accounts.login("john.doe@email.com", &code, ENROLLED_AT).unwrap());
    assert!(!accounts.login("john.doe@email.com", &code, ENROLLED_AT + 5).unwrap());

    let next = authenticator_code(&uri, ENROLLED_AT + 30);
    assert!(accounts.login("john.doe@email.com", &next, ENROLLED_AT + 30).unwrap());
}

#[rstest]
#[case(-30, true)]
#[case(30, true)]
#[case(-90, false)]
#[case(90, false)]
fn device_clock_drift(#[case] drift: i64, #[case] accepted: bool) {
    let secret = Secret::from_bytes(b"12345678901234567890");
    let device_time = ENROLLED_AT.checked_add_signed(drift).unwrap();
    let code = otpguard::generate(&secret, device_time).unwrap().to_string();

    assert_eq!(
        accepted,
        otpguard::verify(&code, &secret, ENROLLED_AT, DEFAULT_WINDOW).unwrap()
    );
}

#[test]
fn unknown_account_and_bad_code() {
    let mut accounts = Accounts::default();
    accounts.enroll("john.doe@email.com").unwrap();

    assert!(!accounts.login("jane@email.com", "123456", ENROLLED_AT).unwrap());
    assert!(!accounts.login("john.doe@email.com", "12a456", ENROLLED_AT).unwrap());
}

#[test]
fn provisioning_uri_qr_matches_free_function() {
    let secret = Secret::from("HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ");
    let provisioning = ProvisioningUri::new(
        "john.doe@email.com",
        Some("ACME Co".to_string()),
        Totp::new(secret.clone()),
    );
    let uri = otpguard::build_uri("john.doe@email.com", "ACME Co", &secret).unwrap();

    assert_eq!(uri, provisioning.to_uri().unwrap());
    assert_eq!(otpguard::render_qr(&uri).unwrap(), provisioning.to_qr_png().unwrap());
}
