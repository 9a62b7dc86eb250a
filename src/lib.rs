//! Canteen ordering backend.
//!
//! Customers browse the menu, pay, and receive an order whose payment id is
//! printed as a QR code. Counter staff scan that code and hand out items one
//! portion at a time; admins manage the menu, stock and accounts and read
//! sales reports.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::Request,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use tokio::{
    net::TcpListener,
    signal::{self, ctrl_c},
};
use tower_http::{cors::CorsLayer, services::ServeDir};

pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod services;
pub mod state;
pub mod utils;

use handlers::{auth, counter, menu, order, otp, reports, stock, users};
use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/menu", get(menu::list_menu).post(menu::create_menu_item))
        .route(
            "/menu/:id",
            get(menu::get_menu_item)
                .put(menu::update_menu_item)
                .delete(menu::delete_menu_item),
        )
        .route("/orders", post(order::create_order).get(order::list_orders))
        .route("/orders/stats", get(order::stats))
        .route("/orders/:id", get(order::get_order))
        .route("/orders/:id/status", put(order::update_status))
        .route("/orders/counter/pending", get(counter::pending))
        .route("/orders/counter/delivered", get(counter::delivered))
        .route("/orders/counter/stats", get(counter::stats))
        .route("/orders/counter/scan/:payment_id", get(counter::scan))
        .route(
            "/orders/counter/:order_id/item/:index/serve",
            put(counter::serve_item),
        )
        .route("/reports/kpis", get(reports::kpis))
        .route("/reports/overview", get(reports::overview))
        .route("/reports/breakdown", get(reports::breakdown))
        .route("/otp/send-otp", post(otp::send_otp))
        .route("/otp/verify-otp", post(otp::verify_otp))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/verify", get(auth::verify))
        .route("/users", get(users::list_users))
        .route("/users/:id", delete(users::delete_user))
        .route("/stock", get(stock::list_stock).post(stock::create_stock_item))
        .route("/stock/:id", delete(stock::delete_stock_item));

    Router::new()
        .route("/", get(|| async { "Canteen API is running" }))
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(&state.config.uploads_dir))
        .layer(middleware::from_fn(log_request))
        .layer(cors)
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = tokio::time::Instant::now();

    let response = next.run(request).await;

    log::info!(
        "{} {} -> {} in {:?}",
        method,
        path,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

pub async fn start_server(state: Arc<AppState>) -> std::io::Result<()> {
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = build_router(state);

    log::info!("Binding to {}", address);
    let listener = TcpListener::bind(&address).await?;
    log::info!("Server running on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        log::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
