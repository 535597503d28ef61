//! HTTP surface.

pub mod error;
pub mod handlers;

use crate::audit::DecisionAuditRecorder;
use crate::config::Config;
use crate::error::StoreError;
use crate::extraction::{ExtractionOrchestrator, ExtractionService, UpscaleService};
use crate::identity::{seed_officers, Authenticator, IdentityProvider, StaticTokenProvider};
use crate::lifecycle::RequestLifecycleManager;
use crate::store::SqliteStore;
use crate::validation::ValidationEngine;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<RequestLifecycleManager>,
    pub recorder: Arc<DecisionAuditRecorder>,
    pub authenticator: Arc<Authenticator>,
    pub store: Arc<SqliteStore>,
    pub validator: ValidationEngine,
}

impl AppState {
    /// Wires the pipeline around the given collaborators and seeds the
    /// officer roster from `config`.
    pub fn build(
        config: &Config,
        store: Arc<SqliteStore>,
        extractor: Arc<dyn ExtractionService>,
        upscaler: Arc<dyn UpscaleService>,
    ) -> Result<Self, StoreError> {
        let seeded = seed_officers(&store, &config.officers)?;
        log::info!("Loaded {} officer profile(s)", seeded);

        let provider: Arc<dyn IdentityProvider> =
            Arc::new(StaticTokenProvider::from_roster(&config.officers));
        let orchestrator = Arc::new(ExtractionOrchestrator::new(extractor, upscaler, config));

        Ok(Self {
            lifecycle: Arc::new(RequestLifecycleManager::new(
                store.clone(),
                orchestrator,
                config,
            )),
            recorder: Arc::new(DecisionAuditRecorder::new(store.clone())),
            authenticator: Arc::new(Authenticator::new(provider, store.clone())),
            store,
            validator: ValidationEngine::new(),
        })
    }
}

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Verification pipeline
        .route("/verify/process", post(handlers::process_document))
        .route("/verify/decision", post(handlers::submit_decision))
        .route("/verify/requests/:id", get(handlers::get_request))
        // Documents
        .route("/documents/upscale", post(handlers::upscale_document))
        .route("/documents/supported", get(handlers::supported_documents))
        .route("/validate/id-number", post(handlers::validate_id_number))
        // Audit and identity
        .route("/audit/logs", get(handlers::audit_logs))
        .route("/auth/me", get(handlers::me))
        .route("/officers", get(handlers::list_officers))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}
