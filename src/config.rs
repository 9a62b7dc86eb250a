use chrono::{Duration, Utc};
use envconfig::Envconfig;
use thiserror::Error;

/// Upper bound for any configured lifetime.
const MAX_TTL_DAYS: i64 = 3650;
const MAX_OTP_TTL_SECS: i64 = MAX_TTL_DAYS * 24 * 60 * 60;
const MAX_SESSION_TTL_HOURS: i64 = MAX_TTL_DAYS * 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be between 1 and {max} (got {value})")]
    TtlOutOfRange { name: &'static str, value: i64, max: i64 },
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "DATABASE_URL", default = "sqlite://canteen.db")]
    pub database_url: String,

    #[envconfig(from = "PORT", default = "5000")]
    pub port: u16,

    /// Directory served under `/uploads`; menu images live here.
    #[envconfig(from = "UPLOADS_DIR", default = "uploads")]
    pub uploads_dir: String,

    #[envconfig(from = "OTP_TTL_SECS", default = "300")]
    pub otp_ttl_secs: i64,

    #[envconfig(from = "SESSION_TTL_HOURS", default = "24")]
    pub session_ttl_hours: i64,

    /// Prefix the QR code carries in front of the payment id.
    #[envconfig(from = "SCAN_PREFIX", default = "ORDER-")]
    pub scan_prefix: String,

    #[envconfig(from = "MAINTENANCE_CRON", default = "0 * * * * *")]
    pub maintenance_cron: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            port: 5000,
            uploads_dir: "uploads".to_string(),
            otp_ttl_secs: 300,
            session_ttl_hours: 24,
            scan_prefix: "ORDER-".to_string(),
            maintenance_cron: "0 * * * * *".to_string(),
        }
    }
}

impl Config {
    /// Rejects settings that would only fail later, while serving requests.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.checked_otp_ttl()?;
        self.checked_session_ttl()?;
        Ok(())
    }

    fn checked_otp_ttl(&self) -> Result<Duration, ConfigError> {
        checked_ttl("OTP_TTL_SECS", self.otp_ttl_secs, MAX_OTP_TTL_SECS, Duration::try_seconds)
    }

    fn checked_session_ttl(&self) -> Result<Duration, ConfigError> {
        checked_ttl(
            "SESSION_TTL_HOURS",
            self.session_ttl_hours,
            MAX_SESSION_TTL_HOURS,
            Duration::try_hours,
        )
    }

    /// Lifetime of an emailed code. Falls back to five minutes if unvalidated.
    pub fn otp_ttl(&self) -> Duration {
        self.checked_otp_ttl().unwrap_or_else(|_| Duration::minutes(5))
    }

    /// Lifetime of a login session. Falls back to a day if unvalidated.
    pub fn session_ttl(&self) -> Duration {
        self.checked_session_ttl().unwrap_or_else(|_| Duration::hours(24))
    }
}

fn checked_ttl(
    name: &'static str,
    value: i64,
    max: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<Duration, ConfigError> {
    let out_of_range = ConfigError::TtlOutOfRange { name, value, max };
    if !(1..=max).contains(&value) {
        return Err(out_of_range);
    }

    let ttl = to_duration(value).ok_or_else(|| out_of_range.clone())?;
    Utc::now().checked_add_signed(ttl).ok_or(out_of_range)?;
    Ok(ttl)
}
