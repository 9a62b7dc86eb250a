use chrono::{DateTime, Utc};
use futures::future;
use sqlx::SqlitePool;
use tokio_cron_scheduler::{Job, JobScheduler};

pub mod auth;
pub mod orders;
pub mod otp;
pub mod reports;
pub mod serving;

/// Schedules the periodic cleanup of expired OTP codes and sessions.
///
/// The scheduler runs in its own task; failures of a single run are logged
/// and the next tick tries again.
///
/// Parameters:
/// - `pool`: The SQLite connection pool the job cleans up.
/// - `cron`: Six-field `tokio_cron_scheduler` expression, seconds first
///   (`MAINTENANCE_CRON`).
///
/// Returns:
/// - `Ok(())` once the job is registered and the scheduler is spawned.
/// - `Err(Box<dyn std::error::Error>)` if the expression is invalid or the
///   scheduler cannot be created.
pub async fn schedule_maintenance(
    pool: SqlitePool,
    cron: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let sched = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _l| {
        let pool = pool.clone();
        Box::pin(async move {
            match run_maintenance(&pool, Utc::now()).await {
                Ok((otps, sessions)) => log::info!(
                    "Maintenance completed: {} expired OTPs, {} expired sessions removed",
                    otps,
                    sessions
                ),
                Err(e) => log::error!("Maintenance run failed: {}", e),
            }
        })
    })
    .map_err(|e| {
        log::error!("Failed to create maintenance job: {}", e);
        Box::new(e) as Box<dyn std::error::Error>
    })?;

    sched.add(job).await.map_err(|e| {
        log::error!("Failed to add maintenance job to scheduler: {}", e);
        Box::new(e) as Box<dyn std::error::Error>
    })?;

    tokio::spawn(async move {
        if let Err(e) = sched.start().await {
            log::error!("Scheduler error: {}", e);
        }
    });

    log::info!("Maintenance scheduler started");
    Ok(())
}

/// Deletes expired OTP codes and sessions.
///
/// Both deletes run concurrently; the first failure is returned.
///
/// Parameters:
/// - `pool`: The SQLite connection pool.
/// - `now`: Anything that expired before this instant is removed.
///
/// Returns:
/// - `Ok((otps, sessions))` with the number of rows removed from each table.
pub async fn run_maintenance(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<(u64, u64), sqlx::Error> {
    future::try_join(
        otp::purge_expired(pool, now),
        auth::purge_expired_sessions(pool, now),
    )
    .await
}
