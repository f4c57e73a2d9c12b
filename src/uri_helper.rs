use std::{borrow::Cow, str::FromStr};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{
    hotp::Hotp, totp::Totp, OtpError, OtpHashAlgorithm, Secret, DEFAULT_DIGITS, DEFAULT_PERIOD,
};

const URI_SCHEME: &str = "otpauth";
pub(crate) const TOTP_TYPE: &str = "totp";
pub(crate) const HOTP_TYPE: &str = "hotp";

const URI_SECRET_QUERY: &str = "secret";
const URI_ISSUER_QUERY: &str = "issuer";
const URI_HASH_QUERY: &str = "algorithm";
const URI_PERIOD_QUERY: &str = "period";
const URI_COUNTER_QUERY: &str = "counter";
const URI_DIGITS_QUERY: &str = "digits";

// RFC 3986 unreserved characters plus '@', which is common in account names.
// ':' stays encoded inside each part so the issuer separator is unambiguous.
const LABEL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'@');

pub enum OtpType {
    Totp,
    Hotp,
}

pub enum OtpUriResult {
    Totp(Totp),
    Hotp(Hotp),
}

pub enum OtpUriInput<'a> {
    Totp(&'a Totp),
    Hotp(&'a Hotp),
}

/// Account name and issuer carried in the URI path
#[derive(Debug, Clone, PartialEq)]
pub struct OtpUriLabel {
    pub account: String,
    pub issuer: Option<String>,
}

pub fn otp_from_uri(uri: &str, otp_type: OtpType) -> Result<(OtpUriResult, OtpUriLabel), OtpError> {
    let uri = url::Url::parse(uri).map_err(OtpError::UriParseError)?;

    if uri.scheme() != URI_SCHEME {
        return Err(OtpError::InvalidUriType(
            uri.scheme().into(),
            URI_SCHEME.into(),
        ));
    }

    let otp_type_str = match otp_type {
        OtpType::Totp => TOTP_TYPE,
        OtpType::Hotp => HOTP_TYPE,
    };

    let host = uri.host_str();
    if host != Some(otp_type_str) {
        return Err(OtpError::InvalidUriType(
            host.unwrap_or("None").into(),
            otp_type_str.into(),
        ));
    }

    let mut secret = "".to_string();
    let mut algorithm = OtpHashAlgorithm::default();
    let mut period = DEFAULT_PERIOD;
    let mut counter = None;
    let mut digits = DEFAULT_DIGITS;
    let mut query_issuer = None;

    for params in uri.query_pairs() {
        match params.0 {
            Cow::Borrowed(URI_SECRET_QUERY) => secret = params.1.to_string(),
            Cow::Borrowed(URI_ISSUER_QUERY) => {
                if !params.1.is_empty() {
                    query_issuer = Some(params.1.to_string());
                }
            }
            Cow::Borrowed(URI_HASH_QUERY) => {
                algorithm = OtpHashAlgorithm::from_str(params.1.as_ref())?
            }
            Cow::Borrowed(URI_PERIOD_QUERY) => {
                period = u64::from_str(params.1.as_ref())
                    .map_err(|e| OtpError::IntegerParseError(e, URI_PERIOD_QUERY.into()))?
            }
            Cow::Borrowed(URI_DIGITS_QUERY) => {
                digits = u32::from_str(params.1.as_ref())
                    .map_err(|e| OtpError::IntegerParseError(e, URI_DIGITS_QUERY.into()))?
            }
            Cow::Borrowed(URI_COUNTER_QUERY) => {
                counter = Some(
                    u64::from_str(params.1.as_ref())
                        .map_err(|e| OtpError::IntegerParseError(e, URI_COUNTER_QUERY.into()))?,
                )
            }
            _ => (),
        }
    }

    let label = split_label(uri.path(), query_issuer)?;

    if secret.is_empty() {
        return Err(OtpError::UriMissingSecret);
    }
    let secret = Secret::new(secret);

    if matches!(otp_type, OtpType::Totp) {
        let totp = Totp {
            secret,
            algorithm,
            period,
            digits,
        };
        return Ok((OtpUriResult::Totp(totp), label));
    }

    let counter = counter.ok_or(OtpError::UriMissingHotpCounter)?;

    let hotp = Hotp {
        secret,
        algorithm,
        counter,
        digits,
    };
    Ok((OtpUriResult::Hotp(hotp), label))
}

pub fn otp_to_uri(
    input: OtpUriInput,
    user: &str,
    issuer: Option<&str>,
) -> Result<String, OtpError> {
    if user.is_empty() {
        return Err(OtpError::InvalidLabel);
    }

    let (otp_uri_type, secret) = match input {
        OtpUriInput::Totp(inner) => (TOTP_TYPE, &inner.secret),
        OtpUriInput::Hotp(inner) => (HOTP_TYPE, &inner.secret),
    };

    // Never hand an authenticator a key that verification could not decode
    secret.to_bytes()?;

    let mut uri = url::Url::parse(&format!("{URI_SCHEME}://{otp_uri_type}/"))
        .map_err(OtpError::UriParseError)?;

    let issuer = issuer.filter(|i| !i.is_empty());
    let user_part = utf8_percent_encode(user, LABEL_ENCODE_SET);
    match issuer {
        Some(issuer) => {
            let issuer_part = utf8_percent_encode(issuer, LABEL_ENCODE_SET);
            uri.set_path(&format!("{issuer_part}:{user_part}"));
        }
        None => uri.set_path(&user_part.to_string()),
    }

    {
        let (algorithm, digits) = match input {
            OtpUriInput::Totp(inner) => (inner.algorithm, inner.digits),
            OtpUriInput::Hotp(inner) => (inner.algorithm, inner.digits),
        };

        let mut query_params = uri.query_pairs_mut();

        query_params.append_pair(URI_SECRET_QUERY, secret.as_str());

        if let Some(issuer) = issuer {
            query_params.append_pair(URI_ISSUER_QUERY, issuer);
        }

        query_params
            .append_pair(URI_HASH_QUERY, &algorithm.to_string())
            .append_pair(URI_DIGITS_QUERY, &digits.to_string());

        match input {
            OtpUriInput::Totp(inner) => {
                query_params.append_pair(URI_PERIOD_QUERY, &inner.period.to_string())
            }
            OtpUriInput::Hotp(inner) => {
                query_params.append_pair(URI_COUNTER_QUERY, &inner.counter.to_string())
            }
        };
    }

    Ok(uri.to_string())
}

/// Splits `/{issuer}:{account}` into its parts. The account is kept exactly
/// as encoded, whitespace included.
///
/// Apps that encode the separator as `%3A` are only split after decoding when
/// the decoded prefix equals the `issuer` query parameter; otherwise a `:`
/// inside the account name would be mistaken for a separator. A non-empty
/// `issuer` query parameter wins over the path prefix.
fn split_label(path: &str, query_issuer: Option<String>) -> Result<OtpUriLabel, OtpError> {
    let path = path.strip_prefix('/').unwrap_or(path);

    let (path_issuer, account) = match path.split_once(':') {
        Some((issuer, account)) => (Some(decode_part(issuer)?), decode_part(account)?),
        None => {
            let decoded = decode_part(path)?;
            let prefixed = query_issuer.as_deref().and_then(|issuer| {
                decoded
                    .strip_prefix(issuer)
                    .and_then(|rest| rest.strip_prefix(':'))
                    .map(|account| (issuer.to_string(), account.to_string()))
            });

            match prefixed {
                Some((issuer, account)) => (Some(issuer), account),
                None => (None, decoded),
            }
        }
    };

    if account.is_empty() {
        return Err(OtpError::InvalidLabel);
    }

    Ok(OtpUriLabel {
        account,
        issuer: query_issuer.or(path_issuer.filter(|i| !i.is_empty())),
    })
}

fn decode_part(part: &str) -> Result<String, OtpError> {
    percent_decode_str(part)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| OtpError::InvalidLabel)
}
