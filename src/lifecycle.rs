//! Request Lifecycle Manager
//!
//! Owns the PROCESSING → COMPLETED | FAILED state machine. A request row
//! is written before any collaborator is called, so a crash mid-pipeline
//! leaves it observably PROCESSING. The terminal write is a single
//! guarded update.

use crate::config::Config;
use crate::error::VerifyError;
use crate::extraction::{ExtractionOrchestrator, MediaType};
use crate::fraud::FraudSignalDetector;
use crate::models::{fraud_flag, ExtractionResult, ScoredResult, VerificationReport, VerificationRequest};
use crate::recommendation::{Recommendation, RecommendationEngine};
use crate::store::SqliteStore;
use crate::validation::{messages, ValidationEngine};
use chrono::Utc;
use std::sync::Arc;

pub struct RequestLifecycleManager {
    store: Arc<SqliteStore>,
    orchestrator: Arc<ExtractionOrchestrator>,
    validator: ValidationEngine,
    detector: FraudSignalDetector,
    recommender: RecommendationEngine,
}

impl RequestLifecycleManager {
    pub fn new(store: Arc<SqliteStore>, orchestrator: Arc<ExtractionOrchestrator>, config: &Config) -> Self {
        Self {
            store,
            orchestrator,
            validator: ValidationEngine::new(),
            detector: FraudSignalDetector::new(config.thresholds, config.forensics.enabled),
            recommender: RecommendationEngine::new(config.thresholds),
        }
    }

    /// Runs the whole pipeline for one image and returns once the request
    /// is terminal.
    pub async fn process(
        &self,
        image: &[u8],
        declared_mime: &str,
        hint: Option<&str>,
    ) -> Result<VerificationReport, VerifyError> {
        let media_type = MediaType::parse(declared_mime)?;
        if image.is_empty() {
            return Err(VerifyError::UnsupportedMediaType("empty image".to_string()));
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let id = request_id.clone();
        self.store
            .run(move |store| store.insert_processing(&id, Utc::now()))
            .await?;
        log::info!(
            "Verification request {} created ({} bytes, {}, hint: {})",
            request_id,
            image.len(),
            media_type.mime(),
            hint.unwrap_or("none")
        );

        let extraction = match self.orchestrator.extract(image, media_type, hint).await {
            Ok(extraction) => extraction,
            Err(e) => return Err(self.mark_failed(&request_id, e).await),
        };

        let (scored, recommendation) = self.score(extraction);
        let flagged = fraud_flag(&scored.fraud_signals);

        let id = request_id.clone();
        let verdict = recommendation.verdict;
        let scored = match self
            .store
            .run(move |store| {
                let completed = store.complete(&id, verdict, flagged, &scored)?;
                Ok((completed, scored))
            })
            .await
        {
            Ok((true, scored)) => scored,
            Ok((false, _)) => {
                return Err(VerifyError::InvalidRequestState(format!(
                    "request {request_id} left PROCESSING before it could complete"
                )))
            }
            Err(e) => return Err(self.mark_failed(&request_id, e.into()).await),
        };

        log::info!(
            "Verification request {} COMPLETED: {} ({}; {} validation error(s), {} signal(s), fraud_flag={})",
            request_id,
            recommendation.verdict,
            scored.extraction.document_type,
            scored.validation_errors.len(),
            scored.fraud_signals.len(),
            flagged
        );
        Ok(VerificationReport::from_scored(
            &request_id,
            recommendation.verdict,
            &scored,
        ))
    }

    /// Same as `process`, but the pipeline runs on its own task so it
    /// still reaches a terminal state if the caller goes away.
    pub async fn process_detached(
        self: Arc<Self>,
        image: Vec<u8>,
        declared_mime: String,
        hint: Option<String>,
    ) -> Result<VerificationReport, VerifyError> {
        let task = tokio::spawn(async move {
            self.process(&image, &declared_mime, hint.as_deref()).await
        });
        task.await
            .map_err(|e| VerifyError::Extraction(format!("pipeline task aborted: {e}")))?
    }

    /// Validation, fraud detection and recommendation over one extraction.
    pub fn score(&self, extraction: ExtractionResult) -> (ScoredResult, Recommendation) {
        let issues = self
            .validator
            .validate(&extraction.document_type, &extraction.fields);
        let fraud_signals = self.detector.detect(&extraction, &issues);
        let validation_errors = messages(&issues);
        let mean_confidence = extraction.mean_confidence();

        let recommendation =
            self.recommender
                .recommend(mean_confidence, &validation_errors, &fraud_signals);

        let scored = ScoredResult {
            extraction,
            validation_errors,
            fraud_signals,
            explanation: recommendation.explanation.clone(),
            mean_confidence,
        };
        (scored, recommendation)
    }

    /// Side-effect free re-query.
    pub fn get(&self, request_id: &str) -> Result<Option<VerificationRequest>, VerifyError> {
        Ok(self.store.get_request(request_id)?)
    }

    pub fn orchestrator(&self) -> &ExtractionOrchestrator {
        &self.orchestrator
    }

    async fn mark_failed(&self, request_id: &str, cause: VerifyError) -> VerifyError {
        let diagnostic = cause.to_string();
        let (id, message) = (request_id.to_string(), diagnostic.clone());
        match self.store.run(move |store| store.fail(&id, &message)).await {
            Ok(_) => log::warn!("Verification request {} FAILED: {}", request_id, diagnostic),
            Err(e) => log::error!(
                "Verification request {} could not be marked FAILED ({}); it stays PROCESSING",
                request_id,
                e
            ),
        }
        VerifyError::failed(request_id, cause)
    }
}
