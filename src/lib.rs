pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/bookings",
            get(handlers::bookings::list_bookings).post(handlers::bookings::create_booking),
        )
        .route(
            "/api/bookings/:booking",
            delete(handlers::bookings::delete_booking),
        )
        .route(
            "/api/bookings/:booking/slots",
            post(handlers::bookings::add_slot),
        )
        .route(
            "/api/bookings/:booking/slots/:slot",
            patch(handlers::bookings::update_slot),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
