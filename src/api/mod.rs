pub mod health;
pub mod withdraw;

use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::WithdrawalOrchestrator;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the account id established by the upstream auth layer.
pub const GAINID_HEADER: &str = "x-gainid";

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub orchestrator: Arc<WithdrawalOrchestrator>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        orchestrator: Arc<WithdrawalOrchestrator>,
    ) -> Self {
        Self {
            repo,
            config,
            orchestrator,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/withdrawals/giftcard", post(withdraw::post_giftcard))
        .route("/v1/withdrawals", get(withdraw::get_withdrawals))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
