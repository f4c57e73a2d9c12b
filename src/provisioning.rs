//! `otpauth://` provisioning: the URI an authenticator app imports and the
//! QR image that carries it.
//!
//! The URI embeds the secret, so neither it nor the rendered image is ever
//! logged.

use std::{fmt, io::Cursor, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use tracing::debug;

use crate::{
    uri_helper::{self, OtpType, OtpUriResult},
    Otp, OtpError, Totp,
};

/// Smallest edge of a rendered QR image, in pixels
pub const QR_MIN_DIMENSION: u32 = 200;

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Everything an `otpauth://totp/` URI carries
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisioningUri {
    pub account: String,
    pub issuer: Option<String>,
    pub totp: Totp,
}

impl ProvisioningUri {
    pub fn new(account: impl Into<String>, issuer: Option<String>, totp: Totp) -> Self {
        Self {
            account: account.into(),
            issuer,
            totp,
        }
    }

    pub fn to_uri(&self) -> Result<String, OtpError> {
        self.totp.to_uri(&self.account, self.issuer.as_deref())
    }

    pub fn parse(uri: &str) -> Result<Self, OtpError> {
        match uri_helper::otp_from_uri(uri, OtpType::Totp)? {
            (OtpUriResult::Totp(totp), label) => Ok(Self {
                account: label.account,
                issuer: label.issuer,
                totp,
            }),
            (OtpUriResult::Hotp(_), _) => Err(OtpError::InvalidUriType(
                uri_helper::HOTP_TYPE.into(),
                uri_helper::TOTP_TYPE.into(),
            )),
        }
    }

    pub fn to_qr_png(&self) -> Result<Vec<u8>, OtpError> {
        render_qr(&self.to_uri()?)
    }
}

impl FromStr for ProvisioningUri {
    type Err = OtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ProvisioningUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uri = self.to_uri().map_err(|_| fmt::Error)?;
        f.write_str(&uri)
    }
}

/// Builds `otpauth://totp/{issuer}:{label}?secret=..&issuer=..&algorithm=..&digits=..&period=..`.
///
/// An empty `issuer` drops both the path prefix and the query parameter.
pub fn build_uri(label: &str, issuer: &str, totp: &Totp) -> Result<String, OtpError> {
    let issuer = (!issuer.is_empty()).then(|| issuer.to_string());
    let uri = ProvisioningUri::new(label, issuer, totp.clone()).to_uri()?;

    debug!(
        algorithm = %totp.algorithm(),
        digits = totp.digits(),
        period = totp.period(),
        "Built TOTP provisioning URI"
    );
    Ok(uri)
}

pub fn parse_uri(uri: &str) -> Result<ProvisioningUri, OtpError> {
    ProvisioningUri::parse(uri)
}

/// Rasterizes `uri` into a PNG QR code
pub fn render_qr(uri: &str) -> Result<Vec<u8>, OtpError> {
    let code = QrCode::new(uri.as_bytes()).map_err(OtpError::QrEncode)?;
    let img = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .build();

    // write_to needs Write + Seek
    let mut cursor = Cursor::new(Vec::<u8>::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(OtpError::ImageEncode)?;

    let png = cursor.into_inner();
    debug!(bytes = png.len(), "Rendered provisioning QR code");
    Ok(png)
}

/// Same as [`render_qr`], as a `data:` URI ready for an `<img src>`
pub fn render_qr_data_uri(uri: &str) -> Result<String, OtpError> {
    let png = render_qr(uri)?;

    Ok(format!("{PNG_DATA_URI_PREFIX}{}", STANDARD.encode(png)))
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::{build_uri, parse_uri, render_qr, render_qr_data_uri, ProvisioningUri};
    use crate::{OtpError, OtpHashAlgorithm, Secret, Totp};

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[fixture]
    fn totp() -> Totp {
        Totp::new("HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ".into())
    }

    #[rstest]
    fn build_default_uri(totp: Totp) {
        let uri = build_uri("john.doe@email.com", "ACME Co", &totp).unwrap();

        assert_eq!(
            "otpauth://totp/ACME%20Co:john.doe@email.com?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&issuer=ACME+Co&algorithm=SHA1&digits=6&period=30",
            uri
        );
    }

    #[rstest]
    fn build_without_issuer(totp: Totp) {
        let uri = build_uri("john.doe@email.com", "", &totp).unwrap();

        assert_eq!(
            "otpauth://totp/john.doe@email.com?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&algorithm=SHA1&digits=6&period=30",
            uri
        );
    }

    #[rstest]
    fn build_rejects_empty_label(totp: Totp) {
        assert!(matches!(
            build_uri("", "ACME Co", &totp),
            Err(OtpError::InvalidLabel)
        ));
    }

    #[test]
    fn build_rejects_undecodable_secret() {
        let totp = Totp::new("HXDMVJECJJWSRB3HWIZR4IFUGFTMXBO0".into());

        assert!(matches!(
            build_uri("john.doe@email.com", "ACME Co", &totp),
            Err(OtpError::InvalidSecretEncoding(_))
        ));
    }

    #[rstest]
    #[case("john.doe@email.com", "ACME Co")]
    #[case("kim@hyundai-autoever.com", "현대오토에버")]
    #[case("ops/admin", "ACME: Security")]
    #[case("first last", "")]
    #[case("a:b", "")]
    #[case("a:b", "ACME")]
    #[case(" bob", "ACME")]
    fn uri_round_trip(#[case] label: &str, #[case] issuer: &str) {
        let secret = Secret::generate().unwrap();
        let mut totp = Totp::new(secret.clone());
        totp.with_algorithm(OtpHashAlgorithm::SHA256).with_digits(8).with_period(60);

        let uri = build_uri(label, issuer, &totp).unwrap();
        assert!(uri.contains(&format!("secret={}", secret.as_str())));

        let parsed = parse_uri(&uri).unwrap();
        let expected = ProvisioningUri::new(
            label,
            (!issuer.is_empty()).then(|| issuer.to_string()),
            totp,
        );
        assert_eq!(expected, parsed);
        assert_eq!(&secret, parsed.totp.secret());
    }

    #[test]
    fn query_issuer_overrides_path_prefix() {
        let parsed = parse_uri(
            "otpauth://totp/Old:john.doe@email.com?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&issuer=New",
        )
        .unwrap();

        assert_eq!(Some("New".to_string()), parsed.issuer);
        assert_eq!("john.doe@email.com", parsed.account);
    }

    #[rstest]
    #[case("not a uri", "UriParseError")]
    #[case("https://totp/ACME:john?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ", "InvalidUriType")]
    #[case("otpauth://hotp/ACME:john?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&counter=1", "InvalidUriType")]
    #[case("otpauth://totp/ACME:john?issuer=ACME", "UriMissingSecret")]
    #[case("otpauth://totp/ACME:?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ", "InvalidLabel")]
    #[case("otpauth://totp/ACME:john?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&digits=six", "IntegerParseError")]
    #[case("otpauth://totp/ACME:john?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&algorithm=MD5", "InvalidHashingAlgorithm")]
    fn parse_errors(#[case] uri: &str, #[case] expected: &str) {
        let err = parse_uri(uri).unwrap_err();
        let kind = format!("{err:?}");

        assert!(kind.starts_with(expected), "{kind}");
    }

    #[test]
    fn display_matches_to_uri() {
        let provisioning = ProvisioningUri::new(
            "john.doe@email.com",
            Some("ACME Co".to_string()),
            Totp::new("HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ".into()),
        );

        assert_eq!(provisioning.to_uri().unwrap(), provisioning.to_string());
        assert_eq!(
            provisioning,
            provisioning.to_string().parse::<ProvisioningUri>().unwrap()
        );
    }

    #[rstest]
    fn renders_png(totp: Totp) {
        let uri = build_uri("john.doe@email.com", "ACME Co", &totp).unwrap();
        let png = render_qr(&uri).unwrap();

        assert_eq!(&PNG_SIGNATURE[..], &png[..8]);

        let decoded = image::load_from_memory(&png).unwrap();
        assert!(decoded.width() >= super::QR_MIN_DIMENSION);
        assert_eq!(decoded.width(), decoded.height());
    }

    #[rstest]
    fn renders_data_uri(totp: Totp) {
        let uri = build_uri("john.doe@email.com", "ACME Co", &totp).unwrap();
        let data_uri = render_qr_data_uri(&uri).unwrap();

        let encoded = data_uri.strip_prefix("data:image/png;base64,").unwrap();
        assert_eq!(render_qr(&uri).unwrap(), STANDARD.decode(encoded).unwrap());
    }

    #[test]
    fn oversized_payload_fails() {
        let uri = "A".repeat(8000);

        assert!(matches!(render_qr(&uri), Err(OtpError::QrEncode(_))));
    }
}
