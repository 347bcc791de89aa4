// ============================================================================
// HTTP API
// ============================================================================
//
// - handlers - order endpoints and the join-order event stream
// - identity - caller extraction from gateway headers
// - dto      - request bodies and response shaping
// - errors   - error → status/body mapping
//
// ============================================================================

mod dto;
mod errors;
mod handlers;
mod identity;

use std::sync::Arc;

use actix::Addr;
use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};

use crate::actors::NotificationHub;
use crate::domain::order::{OrderLifecycle, OrderQueries};

pub use errors::ApiError;
pub use identity::{USER_ID_HEADER, USER_ROLE_HEADER};

/// Shared by every worker
pub struct AppState {
    pub lifecycle: Arc<OrderLifecycle>,
    pub queries: Arc<OrderQueries>,
    pub hub: Addr<NotificationHub>,
}

/// Route table; `/orders/my-orders` must be registered before `/orders/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        ApiError::BadRequest(vec![err.to_string()]).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        ApiError::BadRequest(vec![err.to_string()]).into()
    }))
    .service(
        web::scope("/orders")
            .route("", web::post().to(handlers::create_order))
            .route("/my-orders", web::get().to(handlers::my_orders))
            .route("/{id}", web::get().to(handlers::get_order))
            .route("/{id}/status", web::put().to(handlers::update_status))
            .route("/{id}/track", web::get().to(handlers::track_order))
            .route("/{id}/return", web::post().to(handlers::request_return))
            .route("/{id}/return", web::put().to(handlers::resolve_return))
            .route("/{id}/payment", web::put().to(handlers::record_payment))
            .route("/{id}/events", web::get().to(handlers::order_events)),
    );
}

pub fn start_api_server(state: web::Data<AppState>, port: u16) -> std::io::Result<Server> {
    tracing::info!("Starting order API on http://0.0.0.0:{}", port);

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(("0.0.0.0", port))?
        .run();

    Ok(server)
}
