use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::generation::orchestrator::Orchestrator;
use crate::store::Repository;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub orchestrator: Arc<Orchestrator>,
    pub verifier: TokenVerifier,
    pub config: Config,
}
