use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::{
    check_digits,
    uri_helper::{self, otp_to_uri, OtpType, OtpUriInput, OtpUriResult},
    Otp, OtpCode, OtpError, OtpHashAlgorithm, Secret, DEFAULT_DIGITS, DEFAULT_PERIOD, MAX_WINDOW,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Totp {
    pub(crate) secret: Secret,
    pub(crate) algorithm: OtpHashAlgorithm,
    pub(crate) period: u64,
    pub(crate) digits: u32,
}

impl Otp for Totp {
    fn to_uri(&self, user: &str, issuer: Option<&str>) -> Result<String, OtpError> {
        otp_to_uri(OtpUriInput::Totp(self), user, issuer)
    }

    fn from_uri(uri: &str) -> Result<Self, OtpError> {
        match uri_helper::otp_from_uri(uri, OtpType::Totp)? {
            (OtpUriResult::Totp(r), _) => Ok(r),
            (OtpUriResult::Hotp(_), _) => Err(OtpError::InvalidUriType(
                uri_helper::HOTP_TYPE.into(),
                uri_helper::TOTP_TYPE.into(),
            )),
        }
    }
}

impl Totp {
    /// Creates the config for the [Time-based One-time Password Algorithm](http://en.wikipedia.org/wiki/Time-based_One-time_Password_Algorithm)
    /// (TOTP) given an RFC4648 base32 encoded secret.
    ///
    /// Obs.: This method defaults to the SHA1 hash, a 6-digit code and a period of 30 seconds
    pub fn new(secret: Secret) -> Self {
        Self {
            secret,
            algorithm: OtpHashAlgorithm::SHA1,
            period: DEFAULT_PERIOD,
            digits: DEFAULT_DIGITS,
        }
    }

    ///  Sets hashing algorithm
    pub fn with_algorithm(&mut self, algorithm: OtpHashAlgorithm) -> &mut Self {
        self.algorithm = algorithm;

        self
    }

    ///  Sets the period in seconds
    pub fn with_period(&mut self, period: u64) -> &mut Self {
        self.period = period;

        self
    }

    ///  Sets the number of digits to generate
    pub fn with_digits(&mut self, digits: u32) -> &mut Self {
        self.digits = digits;

        self
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn algorithm(&self) -> OtpHashAlgorithm {
        self.algorithm
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// The HOTP counter for the given seconds since the UNIX epoch
    pub fn time_step(&self, seconds_since_epoch: u64) -> Result<u64, OtpError> {
        self.check_parameters()?;

        Ok(seconds_since_epoch / self.period)
    }

    /// Seconds left before the code generated at `seconds_since_epoch` expires
    pub fn remaining_seconds(&self, seconds_since_epoch: u64) -> u64 {
        seconds_since_epoch
            .checked_rem(self.period)
            .map_or(0, |elapsed| self.period - elapsed)
    }

    /// Generates a Totp from the provided seconds since the UNIX epoch
    /// truncated to the specified number of digits
    pub fn generate(&self, seconds_since_epoch: u64) -> Result<OtpCode, OtpError> {
        let calculated_time = self.time_step(seconds_since_epoch)?;

        let decoded = Self::decode_secret(&self.secret)?;
        Self::derive_code(&decoded, self.algorithm, calculated_time, self.digits)
    }

    /// Checks `candidate` against the time steps within `window` steps of
    /// `seconds_since_epoch`, inclusive on both sides.
    ///
    /// A `window` of 0 accepts only the current step. A mismatch is `Ok(false)`.
    pub fn verify(
        &self,
        candidate: &str,
        seconds_since_epoch: u64,
        window: i64,
    ) -> Result<bool, OtpError> {
        let window = u64::try_from(window).map_err(|_| {
            OtpError::InvalidParameter(format!("window must not be negative, found {window}"))
        })?;

        Ok(self
            .validate_window(candidate, seconds_since_epoch, window, window)?
            .is_some())
    }

    /// Validates a code in the given window
    /// Returning the time step it matched or None if the code is invalid
    ///
    /// The returned step lets the account store reject a second use of the
    /// same code by remembering the last accepted step. Every step in the
    /// window is computed and compared in constant time, whether or not an
    /// earlier one matched.
    ///
    /// Obs.: the RFC recommends a window of 1 frame in the future and 1 in the past,
    /// this function accepts up to [`MAX_WINDOW`] frames on each side
    pub fn validate_window(
        &self,
        candidate: &str,
        seconds_since_epoch: u64,
        past_frames: u64,
        future_frames: u64,
    ) -> Result<Option<u64>, OtpError> {
        let current = self.time_step(seconds_since_epoch)?;

        if past_frames > MAX_WINDOW || future_frames > MAX_WINDOW {
            return Err(OtpError::InvalidParameter(format!(
                "window must not exceed {MAX_WINDOW} steps, \
                 found {past_frames} past and {future_frames} future"
            )));
        }

        if !self.is_well_formed(candidate) {
            warn!(digits = self.digits, "Rejected malformed TOTP code");
            return Ok(None);
        }

        let decoded = Self::decode_secret(&self.secret)?;

        let frames = std::iter::once(current)
            .chain((1..=past_frames).map_while(|i| current.checked_sub(i)))
            .chain((1..=future_frames).map_while(|i| current.checked_add(i)));

        let mut matched = None;
        for frame in frames {
            let expected = Self::derive_code(&decoded, self.algorithm, frame, self.digits)?;
            let is_match: bool = expected
                .to_string()
                .as_bytes()
                .ct_eq(candidate.as_bytes())
                .into();

            if is_match && matched.is_none() {
                matched = Some(frame);
            }
        }

        match matched {
            Some(frame) => {
                let drift = i128::from(frame) - i128::from(current);
                debug!(drift, "TOTP code accepted");
            }
            None => debug!("TOTP code rejected"),
        }

        Ok(matched)
    }

    fn is_well_formed(&self, candidate: &str) -> bool {
        candidate.len() == self.digits as usize && candidate.bytes().all(|b| b.is_ascii_digit())
    }

    fn check_parameters(&self) -> Result<(), OtpError> {
        check_digits(self.digits)?;

        if self.period == 0 {
            return Err(OtpError::InvalidParameter(
                "period must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
