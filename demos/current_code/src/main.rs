use std::env;

use anyhow::Context;
use chrono::offset;
use otpguard::{totp::Totp, Secret};

pub fn main() -> anyhow::Result<()> {
    // The base32 secret stored for the account, e.g. printed by the `enroll` demo
    let secret = env::args()
        .nth(1)
        .context("usage: current-code <BASE32 SECRET>")?;

    // Initialize the TOTP with the defaults (SHA1 hash, 6-digits and 30 seconds period)
    let totp = Totp::new(Secret::new(secret));

    // Get seconds since Unix Epoch
    let now = u64::try_from(offset::Utc::now().timestamp())?;

    let code = totp.generate(now)?;

    println!(
        "Code: {}, Remaining time: {}",
        code,
        totp.remaining_seconds(now)
    );

    Ok(())
}
