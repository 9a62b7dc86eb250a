use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{
    config::Config,
    services::{otp::OtpMailer, serving::OrderLocks},
};

pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub locks: OrderLocks,
    pub mailer: Arc<dyn OtpMailer>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config, mailer: Arc<dyn OtpMailer>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            config,
            locks: OrderLocks::new(),
            mailer,
        })
    }
}
