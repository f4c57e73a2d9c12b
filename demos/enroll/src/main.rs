use std::{env, fs, time::SystemTime};

use anyhow::Context;
use otpguard::DEFAULT_WINDOW;
use tracing_subscriber::EnvFilter;

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let account = args
        .next()
        .context("usage: enroll <ACCOUNT> [ISSUER] [QR_OUTPUT.png]")?;
    let issuer = args.next().unwrap_or_default();
    let qr_path = args.next().unwrap_or_else(|| "enroll-qr.png".to_string());

    // Enrollment: the account store would persist `secret` against the account
    let secret = otpguard::generate_secret()?;
    let uri = otpguard::build_uri(&account, &issuer, &secret)?;
    fs::write(&qr_path, otpguard::render_qr(&uri)?)
        .with_context(|| format!("writing {qr_path}"))?;

    println!("Secret: {}", secret.as_str());
    println!("URI: {uri}");
    println!("QR code written to {qr_path}");

    // Login: the code an authenticator app would show right now
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_secs();
    let code = otpguard::generate(&secret, now)?;
    let accepted = otpguard::verify(&code.to_string(), &secret, now, DEFAULT_WINDOW)?;

    println!("Current code: {code} ({})", if accepted { "accepted" } else { "rejected" });

    Ok(())
}
