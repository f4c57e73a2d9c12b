use std::fmt;

use data_encoding::BASE32_NOPAD;
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};

use crate::OtpError;

/// Bytes of key material drawn for a new secret (160 bits)
pub const DEFAULT_SECRET_LEN: usize = 20;
/// RFC 4226 lower bound on the shared key length (80 bits)
pub const MIN_SECRET_LEN: usize = 10;

/// A shared key in its RFC4648 base32 form: uppercase, no padding.
///
/// This is the exact text embedded in the provisioning URI, so it is also
/// what the account store should persist. The value never appears in
/// `Debug` output or in error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wraps already encoded text without validating it. Malformed input is
    /// reported when the secret is first decoded.
    pub fn new(encoded: String) -> Self {
        Self(encoded)
    }

    /// Draws [`DEFAULT_SECRET_LEN`] bytes from the operating system's CSPRNG
    pub fn generate() -> Result<Self, OtpError> {
        Self::generate_with_len(DEFAULT_SECRET_LEN)
    }

    /// Draws `len` bytes from the operating system's CSPRNG.
    ///
    /// There is no fallback generator: if the OS source fails the error is
    /// returned and enrollment must not proceed.
    pub fn generate_with_len(len: usize) -> Result<Self, OtpError> {
        if len < MIN_SECRET_LEN {
            return Err(OtpError::InvalidParameter(format!(
                "secret length must be at least {MIN_SECRET_LEN} bytes, found {len}"
            )));
        }

        let mut bytes = vec![0u8; len];
        OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
            warn!("Secure random source unavailable while generating a TOTP secret");
            OtpError::EntropyUnavailable(e)
        })?;

        debug!(bits = len * 8, "Generated new TOTP secret");
        Ok(Self::from_bytes(&bytes))
    }

    /// Encodes raw key material
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BASE32_NOPAD.encode(bytes))
    }

    /// Decodes the key. Lowercase letters, `=` padding and whitespace are
    /// rejected rather than corrected.
    pub fn to_bytes(&self) -> Result<Vec<u8>, OtpError> {
        let decoded = BASE32_NOPAD
            .decode(self.0.as_bytes())
            .map_err(OtpError::InvalidSecretEncoding)?;

        if decoded.len() < MIN_SECRET_LEN {
            return Err(OtpError::SecretTooShort(decoded.len() * 8));
        }

        Ok(decoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

impl From<String> for Secret {
    fn from(encoded: String) -> Self {
        Self::new(encoded)
    }
}

impl From<&str> for Secret {
    fn from(encoded: &str) -> Self {
        Self::new(encoded.to_string())
    }
}
