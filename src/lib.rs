//! Time-based one-time password enrollment and verification.
//!
//! The crate covers the whole second-factor flow of a login form:
//!
//! 1. [`generate_secret`] draws a fresh shared key from the OS random source.
//! 2. [`build_uri`] and [`render_qr`] turn it into the `otpauth://` URI and
//!    the QR image an authenticator app scans at enrollment.
//! 3. [`verify`] checks a submitted code against the current time step and
//!    its neighbours, absorbing clock drift between server and device.
//!
//! Every operation is a pure function of its inputs. The clock is always
//! supplied by the caller as seconds since the UNIX epoch, and nothing here
//! persists state: storing the secret and enforcing single use of a code are
//! left to the account store (see [`totp::Totp::validate_window`]).
//!
//! ```no_run
//! # fn main() -> Result<(), otpguard::OtpError> {
//! let secret = otpguard::generate_secret()?;
//! let uri = otpguard::build_uri("john.doe@email.com", "ACME Co", &secret)?;
//! let png = otpguard::render_qr(&uri)?;
//!
//! let code = otpguard::generate(&secret, 1_640_995_200)?;
//! assert!(otpguard::verify(&code.to_string(), &secret, 1_640_995_200, 1)?);
//! # Ok(())
//! # }
//! ```

pub mod hotp;
pub mod provisioning;
pub mod secret;
pub mod totp;
pub(crate) mod uri_helper;

use core::num;
use std::{fmt::Display, str::FromStr};

use hmac::{digest::KeyInit, Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

pub use hotp::Hotp;
pub use provisioning::ProvisioningUri;
pub use secret::{Secret, DEFAULT_SECRET_LEN, MIN_SECRET_LEN};
pub use totp::Totp;

/// Number of digits in a generated code unless configured otherwise
pub const DEFAULT_DIGITS: u32 = 6;
/// Length of a time step in seconds
pub const DEFAULT_PERIOD: u64 = 30;
/// Adjacent time steps accepted on each side of "now" by [`verify`]
pub const DEFAULT_WINDOW: i64 = 1;
/// Largest number of steps accepted on either side of "now"
pub const MAX_WINDOW: u64 = 10;

const MIN_DIGITS: u32 = 6;
const MAX_DIGITS: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("The secure random source could not be read")]
    EntropyUnavailable(#[source] rand::Error),
    #[error("The secret is not valid unpadded RFC4648 base32")]
    InvalidSecretEncoding(#[source] data_encoding::DecodeError),
    #[error("The secret is too short, found {0} bits. Expected at least {min} bits", min = MIN_SECRET_LEN * 8)]
    SecretTooShort(usize),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("The account label must not be empty")]
    InvalidLabel,
    #[error("Invalid digest of {0} bytes")]
    InvalidDigest(usize),
    #[error("Invalid hashing algorithm, found {0}. Expected one of: SHA1, SHA256 or SHA512")]
    InvalidHashingAlgorithm(String),
    #[error("The provided URI is not valid, found {0}. Expected: {1}")]
    InvalidUriType(String, String),
    #[error("Could not parse the URI")]
    UriParseError(#[source] url::ParseError),
    #[error("Could not retrieve the secret from the URI")]
    UriMissingSecret,
    #[error("Could not retrieve the counter from the URI")]
    UriMissingHotpCounter,
    #[error("Could not parse an integer. Failed parsing: {1}")]
    IntegerParseError(#[source] num::ParseIntError, String),
    #[error("Could not encode the URI as a QR code")]
    QrEncode(#[source] qrcode::types::QrError),
    #[error("Could not encode the QR code image")]
    ImageEncode(#[source] image::ImageError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpHashAlgorithm {
    #[default]
    SHA1,
    SHA256,
    SHA512,
}

impl Display for OtpHashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SHA1 => write!(f, "SHA1"),
            Self::SHA256 => write!(f, "SHA256"),
            Self::SHA512 => write!(f, "SHA512"),
        }
    }
}

impl FromStr for OtpHashAlgorithm {
    type Err = OtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_uppercase();

        match normalized.as_str() {
            "SHA1" => Ok(Self::SHA1),
            "SHA256" => Ok(Self::SHA256),
            "SHA512" => Ok(Self::SHA512),
            _ => Err(OtpError::InvalidHashingAlgorithm(s.to_string())),
        }
    }
}

/// A generated code. Formats as a zero-padded decimal string.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OtpCode {
    code: u32,
    digits: u32,
}

impl OtpCode {
    pub fn integer(&self) -> u32 {
        self.code
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }
}

impl Display for OtpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:0padding$}",
            self.code,
            padding = (self.digits as usize)
        )
    }
}

pub trait Otp {
    /// Decodes a secret (given as an RFC4648 base32-encoded ASCII string)
    /// into a byte string
    fn decode_secret(secret: &Secret) -> Result<Vec<u8>, OtpError> {
        secret.to_bytes()
    }

    /// Calculates the HMAC digest of the big-endian moving factor `data`
    fn calc_digest(
        decoded_secret: &[u8],
        algorithm: OtpHashAlgorithm,
        data: u64,
    ) -> Result<Vec<u8>, OtpError> {
        let data = data.to_be_bytes();

        match algorithm {
            OtpHashAlgorithm::SHA1 => keyed_digest::<Hmac<Sha1>>(decoded_secret, &data),
            OtpHashAlgorithm::SHA256 => keyed_digest::<Hmac<Sha256>>(decoded_secret, &data),
            OtpHashAlgorithm::SHA512 => keyed_digest::<Hmac<Sha512>>(decoded_secret, &data),
        }
    }

    /// Encodes the HMAC digest into a truncated integer.
    fn encode_digest_truncated(digest: &[u8], target_digits_count: u32) -> Result<u32, OtpError> {
        // While sometimes this is a hardcoded 19
        // the last byte tells us the offset for any algorithm
        let offset = match digest.last() {
            Some(x) => *x & 0xf,
            None => return Err(OtpError::InvalidDigest(digest.len())),
        } as usize;

        // Gets the 4 bytes that will compose the code
        let code_bytes: [u8; 4] = digest
            .get(offset..offset + 4)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(OtpError::InvalidDigest(digest.len()))?;

        let code = u32::from_be_bytes(code_bytes);
        let truncation_factor = u32::pow(10, target_digits_count);

        Ok((code & 0x7fffffff) % truncation_factor)
    }

    /// Runs the RFC 4226 derivation for a single counter value
    fn derive_code(
        decoded_secret: &[u8],
        algorithm: OtpHashAlgorithm,
        counter: u64,
        digits: u32,
    ) -> Result<OtpCode, OtpError> {
        let digest = Self::calc_digest(decoded_secret, algorithm, counter)?;
        let code = Self::encode_digest_truncated(digest.as_ref(), digits)?;

        Ok(OtpCode { code, digits })
    }

    fn to_uri(&self, user: &str, issuer: Option<&str>) -> Result<String, OtpError>;
    fn from_uri(uri: &str) -> Result<Self, OtpError>
    where
        Self: std::marker::Sized;
}

fn keyed_digest<M>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, OtpError>
where
    M: Mac + KeyInit,
{
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|_| OtpError::InvalidParameter("HMAC key length".into()))?;
    mac.update(data);

    Ok(mac.finalize().into_bytes().to_vec())
}

pub(crate) fn check_digits(digits: u32) -> Result<(), OtpError> {
    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits) {
        return Err(OtpError::InvalidParameter(format!(
            "digits must be between {MIN_DIGITS} and {MAX_DIGITS}, found {digits}"
        )));
    }

    Ok(())
}

/// Generates a fresh 160-bit secret for a new enrollment
pub fn generate_secret() -> Result<Secret, OtpError> {
    Secret::generate()
}

/// Builds the provisioning URI for `secret` with the default SHA1, 6-digit,
/// 30-second parameters. An empty `issuer` omits the issuer entirely.
pub fn build_uri(label: &str, issuer: &str, secret: &Secret) -> Result<String, OtpError> {
    provisioning::build_uri(label, issuer, &Totp::new(secret.clone()))
}

/// Renders a provisioning URI as PNG bytes
pub fn render_qr(uri: &str) -> Result<Vec<u8>, OtpError> {
    provisioning::render_qr(uri)
}

/// Generates the default 6-digit code for `secret` at `at_time`
pub fn generate(secret: &Secret, at_time: u64) -> Result<OtpCode, OtpError> {
    Totp::new(secret.clone()).generate(at_time)
}

/// Verifies `candidate` against `secret`, accepting `window` steps on either
/// side of `at_time`
pub fn verify(
    candidate: &str,
    secret: &Secret,
    at_time: u64,
    window: i64,
) -> Result<bool, OtpError> {
    Totp::new(secret.clone()).verify(candidate, at_time, window)
}
