use chrono::{DateTime, Duration, Utc};
use futures::future::{self, BoxFuture};
use rand::Rng;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::{
    db::models::Otp,
    error::{AppError, AppResult},
};

#[derive(Error, Debug)]
#[error("Failed to deliver OTP to {email}: {reason}")]
pub struct MailError {
    pub email: String,
    pub reason: String,
}

/// Delivers one-time codes to users. Transport lives outside this service.
pub trait OtpMailer: Send + Sync {
    fn send_otp<'a>(&'a self, email: &'a str, code: &'a str)
        -> BoxFuture<'a, Result<(), MailError>>;
}

/// Writes the code to the log instead of sending mail.
pub struct LogMailer;

impl OtpMailer for LogMailer {
    fn send_otp<'a>(
        &'a self,
        email: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        log::info!("OTP for {}: {}", email, code);
        Box::pin(future::ready(Ok(())))
    }
}

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Replaces any outstanding code for `email` with a fresh one and mails it.
///
/// The old record is dropped and the new one stored in one transaction, so
/// an address never has two live codes. Mail goes out after the commit.
///
/// Parameters:
/// - `pool`: The SQLite connection pool holding the `otps` table.
/// - `mailer`: Delivery channel for the code.
/// - `email`: Recipient; trimmed and lowercased before use.
/// - `ttl`: How long the code stays valid.
///
/// Returns:
/// - `Ok(())` once the code is stored and handed to the mailer.
/// - `Err(AppError::Validation)` for a missing or malformed address.
/// - `Err(AppError::Upstream)` with "Failed to send OTP" if delivery fails.
pub async fn send_otp(
    pool: &SqlitePool,
    mailer: &dyn OtpMailer,
    email: &str,
    ttl: Duration,
) -> AppResult<()> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }
    if !email.contains('@') {
        return Err(AppError::validation("A valid email is required"));
    }

    let code = generate_code();
    let expires_at = Utc::now() + ttl;

    let mut transaction = pool.begin().await?;

    sqlx::query("DELETE FROM otps WHERE email = ?")
        .bind(&email)
        .execute(&mut *transaction)
        .await?;

    sqlx::query("INSERT INTO otps (email, otp, expires_at) VALUES (?, ?, ?)")
        .bind(&email)
        .bind(&code)
        .bind(expires_at)
        .execute(&mut *transaction)
        .await?;

    transaction.commit().await?;

    mailer.send_otp(&email, &code).await.map_err(|e| {
        log::error!("{}", e);
        AppError::Upstream("Failed to send OTP".to_string())
    })?;

    log::info!("OTP issued for {}", email);
    Ok(())
}

/// Checks a one-time code and consumes it.
///
/// Finding and deleting the matching record is a single statement, so when
/// two requests race with the same code only one of them gets the record.
///
/// Parameters:
/// - `pool`: The SQLite connection pool holding the `otps` table.
/// - `email`: Address the code was sent to; trimmed and lowercased.
/// - `otp`: The code as typed by the user.
/// - `now`: Reference time for the expiry check.
///
/// Returns:
/// - `Ok(())` if the code matched and had not expired.
/// - `Err(AppError::Validation)` with "Invalid OTP" when nothing matched, or
///   "OTP expired" when the matching record was stale (it is deleted anyway).
pub async fn verify_otp(
    pool: &SqlitePool,
    email: &str,
    otp: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let email = normalize_email(email);
    let otp = otp.trim();
    if email.is_empty() || otp.is_empty() {
        return Err(AppError::validation("Email and OTP required"));
    }

    let record = sqlx::query_as::<_, Otp>(
        "DELETE FROM otps WHERE email = ? AND otp = ? RETURNING *",
    )
    .bind(&email)
    .bind(otp)
    .fetch_optional(pool)
    .await?;

    let Some(record) = record else {
        log::debug!("Rejected OTP for {}: no match", email);
        return Err(AppError::validation("Invalid OTP"));
    };

    if record.expires_at < now {
        log::debug!("Rejected OTP for {}: expired", email);
        return Err(AppError::validation("OTP expired"));
    }

    log::info!("OTP verified for {}", email);
    Ok(())
}

pub async fn purge_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM otps WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
