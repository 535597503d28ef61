//! Scripted collaborator doubles shared by the unit tests.

use crate::config::Config;
use crate::error::CollaboratorError;
use crate::extraction::admission::{AdmissionGate, AdmissionPermit};
use crate::extraction::{
    ExtractionOrchestrator, ExtractionService, MediaType, RetryPolicy, UpscaleService,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed list of outcomes, one per call. Once the script runs
/// out every further call is a transport failure.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    calls: AtomicUsize,
    last_hint: Mutex<Option<String>>,
    delay: Option<Duration>,
}

impl ScriptedExtractor {
    pub fn new(script: Vec<Result<String, CollaboratorError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            last_hint: Mutex::new(None),
            delay: None,
        }
    }

    pub fn replying(reply: String) -> Self {
        Self::new(vec![Ok(reply)])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_hint(&self) -> Option<String> {
        self.last_hint.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionService for ScriptedExtractor {
    async fn extract(
        &self,
        _image: &[u8],
        _media_type: MediaType,
        hint: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_hint.lock().unwrap() = hint.map(str::to_string);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(CollaboratorError::Transport("script exhausted".to_string())))
    }
}

pub struct ScriptedUpscaler {
    fail: bool,
}

impl ScriptedUpscaler {
    pub fn ok() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl UpscaleService for ScriptedUpscaler {
    async fn upscale(&self, image: &[u8], _media_type: MediaType) -> Result<Vec<u8>, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Transport("upscaler offline".to_string()));
        }
        Ok(image.repeat(16))
    }
}

/// Builds a model reply in the shape the extraction prompt asks for.
pub fn reply(document_type: &str, fields: &[(&str, &str, f64)]) -> String {
    let fields: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(name, value, confidence)| {
            (
                name.to_string(),
                json!({"value": value, "confidence": confidence}),
            )
        })
        .collect();
    json!({"document_type": document_type, "fields": fields}).to_string()
}

/// Orchestrator whose single extraction slot is already taken. The slot
/// stays taken until the returned permit is dropped.
pub async fn saturated_orchestrator(
    extractor: Arc<ScriptedExtractor>,
) -> (ExtractionOrchestrator, AdmissionPermit) {
    let gate = AdmissionGate::new("extraction", 1, Duration::from_millis(30));
    let held = gate.acquire().await.unwrap();
    let orchestrator = ExtractionOrchestrator::with_gates(
        extractor,
        Arc::new(ScriptedUpscaler::ok()),
        gate,
        AdmissionGate::new("upscale", 1, Duration::from_millis(30)),
        RetryPolicy::default(),
    );
    (orchestrator, held)
}

/// Default config with tight timeouts and no retry pause.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.extraction.retry_delay_ms = 1;
    config.extraction.queue_timeout_seconds = 1;
    config.upscale.queue_timeout_seconds = 1;
    config.officers = vec![
        crate::config::OfficerConfig {
            id: "officer-1".to_string(),
            token: "token-officer".to_string(),
            email: "officer@example.org".to_string(),
            full_name: "Field Officer".to_string(),
            department: Some("KYC".to_string()),
            role: crate::models::Role::Officer,
            active: true,
        },
        crate::config::OfficerConfig {
            id: "admin-1".to_string(),
            token: "token-admin".to_string(),
            email: "admin@example.org".to_string(),
            full_name: "Desk Admin".to_string(),
            department: None,
            role: crate::models::Role::Admin,
            active: true,
        },
        crate::config::OfficerConfig {
            id: "retired-1".to_string(),
            token: "token-retired".to_string(),
            email: "retired@example.org".to_string(),
            full_name: "Former Officer".to_string(),
            department: None,
            role: crate::models::Role::Officer,
            active: false,
        },
    ];
    config
}
