//! Web server adapter.
//!
//! JSON API over the range service. The service is synchronous, so every
//! handler that touches it runs the call on tokio's blocking pool.

mod error;
mod handlers;

pub use error::{WebError, status_from_error};
pub use handlers::*;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::domain::bar::Timeframe;
use crate::domain::pipeline::RangeService;

pub struct AppState {
    pub service: Arc<RangeService>,
    /// Timeframe and bar count used by sweeps triggered over HTTP when the
    /// request does not name them.
    pub sweep_timeframe: Timeframe,
    pub sweep_bars: usize,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/ranges/fetch_data", get(handlers::fetch_data))
        .route("/api/ranges/symbols", get(handlers::symbols))
        .route("/api/ranges/cache/status", get(handlers::cache_status))
        .route("/api/ranges/cache/clear", post(handlers::cache_clear))
        .route("/api/ranges/ranges/{symbol}", get(handlers::cached_ranges))
        .route("/api/ranges/quick_scan", post(handlers::quick_scan))
        .route("/api/ranges/calculated", get(handlers::calculated_ranges))
        .route("/api/ranges/merged", get(handlers::merged_ranges))
        .route("/api/ranges/sweep", post(handlers::sweep))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
