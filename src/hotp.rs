use crate::{
    check_digits,
    uri_helper::{self, otp_to_uri, OtpType, OtpUriInput, OtpUriResult},
    Otp, OtpCode, OtpError, OtpHashAlgorithm, Secret, DEFAULT_DIGITS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Hotp {
    pub(crate) secret: Secret,
    pub(crate) algorithm: OtpHashAlgorithm,
    // How many digits to generate
    pub(crate) digits: u32,
    // The internal counter, used to generate the URI
    pub(crate) counter: u64,
}

impl Otp for Hotp {
    fn to_uri(&self, user: &str, issuer: Option<&str>) -> Result<String, OtpError> {
        otp_to_uri(OtpUriInput::Hotp(self), user, issuer)
    }

    fn from_uri(uri: &str) -> Result<Self, OtpError> {
        match uri_helper::otp_from_uri(uri, OtpType::Hotp)? {
            (OtpUriResult::Hotp(r), _) => Ok(r),
            (OtpUriResult::Totp(_), _) => Err(OtpError::InvalidUriType(
                uri_helper::TOTP_TYPE.into(),
                uri_helper::HOTP_TYPE.into(),
            )),
        }
    }
}

impl Hotp {
    /// Creates the config for the [HMAC-based One-time Password Algorithm](http://en.wikipedia.org/wiki/HMAC-based_One-time_Password_Algorithm)
    /// (HOTP) given an RFC4648 base32 encoded secret
    ///
    /// Obs.: This method defaults to a 6-digit code.
    pub fn new(secret: Secret, algorithm: OtpHashAlgorithm) -> Self {
        Self {
            secret,
            algorithm,
            digits: DEFAULT_DIGITS,
            counter: 0,
        }
    }

    ///  Sets the number of digits to generate
    pub fn with_digits(&mut self, digits: u32) -> &mut Self {
        self.digits = digits;

        self
    }

    ///  Sets the internal counter
    pub fn with_counter(&mut self, counter: u64) -> &mut Self {
        self.counter = counter;

        self
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Generates a HOTP from the provided counter
    /// truncated to the specified number of digits
    pub fn generate(&self, counter: u64) -> Result<OtpCode, OtpError> {
        check_digits(self.digits)?;

        let decoded = Self::decode_secret(&self.secret)?;
        Self::derive_code(&decoded, self.algorithm, counter, self.digits)
    }
}
