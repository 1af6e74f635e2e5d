//! TOTP verification and enrollment (SHA-1, 6 digits, 30 s step, one step of skew).

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::warn;

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP: u64 = 30;
const SECRET_BYTES: usize = 20;

#[derive(Debug, Error)]
pub enum TotpError {
    #[error("invalid TOTP secret: {0}")]
    InvalidSecret(String),
    #[error("failed to generate TOTP secret: {0}")]
    Generate(String),
    #[error("failed to render QR code: {0}")]
    Qr(String),
    #[error("system clock error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
}

/// Secret, provisioning URL and QR code for a new authenticator.
#[derive(Clone)]
pub struct Enrollment {
    pub secret: String,
    pub otpauth_url: String,
    /// PNG, base64-encoded.
    pub qr_code_png: String,
}

impl std::fmt::Debug for Enrollment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enrollment")
            .field("secret", &"***")
            .finish_non_exhaustive()
    }
}

fn build(secret_base32: &str, issuer: Option<&str>, account: &str) -> Result<TOTP, TotpError> {
    let bytes = Secret::Encoded(secret_base32.trim().to_ascii_uppercase())
        .to_bytes()
        .map_err(|err| TotpError::InvalidSecret(format!("{err:?}")))?;
    if bytes.is_empty() {
        return Err(TotpError::InvalidSecret("empty secret".to_string()));
    }
    Ok(TOTP::new_unchecked(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP,
        bytes,
        issuer.map(str::to_string),
        account.to_string(),
    ))
}

/// Check `code` against the current time window of `secret_base32`.
///
/// A malformed secret never verifies.
#[must_use]
pub fn verify(secret_base32: &str, code: &str) -> bool {
    let code = code.trim();
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    match build(secret_base32, None, "") {
        Ok(totp) => totp.check_current(code).unwrap_or(false),
        Err(err) => {
            warn!("cannot verify TOTP code: {err}");
            false
        }
    }
}

/// 160 random bits as unpadded base32.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_secret() -> Result<String, TotpError> {
    let mut bytes = vec![0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| TotpError::Generate(err.to_string()))?;
    let totp = TOTP::new_unchecked(Algorithm::SHA1, DIGITS, SKEW, STEP, bytes, None, String::new());
    Ok(totp.get_secret_base32())
}

/// Build the provisioning material for `secret_base32`.
///
/// # Errors
/// Returns an error if the secret is not base32 or the QR code cannot be rendered.
pub fn enroll(secret_base32: &str, issuer: &str, account: &str) -> Result<Enrollment, TotpError> {
    let totp = build(secret_base32, Some(issuer), account)?;
    let qr_code_png = totp.get_qr_base64().map_err(TotpError::Qr)?;
    Ok(Enrollment {
        secret: totp.get_secret_base32(),
        otpauth_url: totp.get_url(),
        qr_code_png,
    })
}

/// Current code for `secret_base32`.
///
/// # Errors
/// Returns an error if the secret is not base32 or the clock is before the epoch.
pub fn current_code(secret_base32: &str) -> Result<String, TotpError> {
    Ok(build(secret_base32, None, "")?.generate_current()?)
}
