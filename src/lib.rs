pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod extraction;
pub mod fraud;
pub mod identity;
pub mod lifecycle;
pub mod models;
pub mod recommendation;
pub mod statistics;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{DecisionAuditRecorder, DecisionSubmission};
pub use config::Config;
pub use error::{CollaboratorError, StoreError, VerifyError};
pub use extraction::{ExtractionOrchestrator, MediaType};
pub use fraud::FraudSignalDetector;
pub use lifecycle::RequestLifecycleManager;
pub use recommendation::RecommendationEngine;
pub use store::SqliteStore;
pub use validation::ValidationEngine;
