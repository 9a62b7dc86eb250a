use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::models::{Role, User},
    error::{AppError, AppResult},
    services::otp::normalize_email,
};

const PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;

async fn hash_password(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, PASSWORD_COST))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

pub async fn create_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> AppResult<User> {
    let name = name.trim();
    let email = normalize_email(email);

    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("A valid email is required"));
    }
    if password.len() < 6 {
        return Err(AppError::validation(
            "Password must be at least 6 characters",
        ));
    }

    let password_hash = hash_password(password.to_string()).await?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, email, password_hash, role, created_at) \
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(name)
    .bind(&email)
    .bind(&password_hash)
    .bind(role)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::conflict("Email already registered")
        }
        other => AppError::Database(other),
    })?;

    log::info!("Registered {} account {}", user.role, user.email);
    Ok(user)
}

pub async fn find_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
}

/// Checks credentials and opens a session, returning its bearer token.
pub async fn login(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    ttl: Duration,
) -> AppResult<(String, User)> {
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = find_user_by_email(pool, email).await?.ok_or_else(invalid)?;

    if !verify_password(password.to_string(), user.password_hash.clone()).await? {
        log::debug!("Failed login for {}", user.email);
        return Err(invalid());
    }

    let token = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user.id)
        .bind(Utc::now() + ttl)
        .execute(pool)
        .await?;

    log::info!("Opened session for {}", user.email);
    Ok((token, user))
}

/// Resolves a bearer token to its user while the session is still live.
pub async fn resolve_session(
    pool: &SqlitePool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT users.* FROM sessions \
         JOIN users ON users.id = sessions.user_id \
         WHERE sessions.token = ? AND sessions.expires_at > ?",
    )
    .bind(token)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn logout(pool: &SqlitePool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn purge_expired_sessions(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
