use std::sync::Arc;

use canteen::{
    config::Config, db::init_db, services::otp::LogMailer, services::schedule_maintenance,
    start_server, state::AppState,
};
use dotenvy::dotenv;
use envconfig::Envconfig;

type Error = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Default to "info" unless RUST_LOG says otherwise
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    log::info!("Starting the canteen server...");

    dotenv().ok();
    let config = Config::init_from_env()?;
    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    let pool = match init_db(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    // Expired OTPs and sessions are swept in the background
    if let Err(e) = schedule_maintenance(pool.clone(), &config.maintenance_cron).await {
        log::error!("Failed to start maintenance scheduler: {}", e);
    }

    let state = AppState::new(pool, config, Arc::new(LogMailer));
    start_server(state).await?;

    log::info!("Shutting down gracefully");
    Ok(())
}
