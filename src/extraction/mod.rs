//! Extraction Orchestrator
//!
//! Turns raw image bytes into a normalized `ExtractionResult` by calling
//! the extraction collaborator behind an admission window and a bounded
//! retry policy. Upscaling is a separate capability on the same
//! orchestrator and is never chained into extraction automatically.

pub mod admission;
pub mod normalize;
pub mod upscaler;
pub mod vlm_client;

use crate::config::Config;
use crate::error::{CollaboratorError, VerifyError};
use crate::models::ExtractionResult;
use admission::AdmissionGate;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Image formats accepted for verification and upscaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
}

impl MediaType {
    pub fn parse(declared: &str) -> Result<Self, VerifyError> {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Ok(MediaType::Jpeg),
            "image/png" => Ok(MediaType::Png),
            _ => Err(VerifyError::UnsupportedMediaType(format!(
                "'{declared}' is not accepted, use image/jpeg or image/png"
            ))),
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
        }
    }
}

/// Vision-language extraction collaborator. Returns the model's raw reply
/// text; normalization happens in the orchestrator.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(
        &self,
        image: &[u8],
        media_type: MediaType,
        hint: Option<&str>,
    ) -> Result<String, CollaboratorError>;
}

/// 4x super-resolution collaborator.
#[async_trait]
pub trait UpscaleService: Send + Sync {
    async fn upscale(&self, image: &[u8], media_type: MediaType)
        -> Result<Vec<u8>, CollaboratorError>;
}

/// Bounded retry for malformed extraction replies. Transport failures are
/// never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(250),
        }
    }
}

pub struct ExtractionOrchestrator {
    extractor: Arc<dyn ExtractionService>,
    upscaler: Arc<dyn UpscaleService>,
    extraction_gate: AdmissionGate,
    upscale_gate: AdmissionGate,
    retry: RetryPolicy,
}

impl ExtractionOrchestrator {
    pub fn new(
        extractor: Arc<dyn ExtractionService>,
        upscaler: Arc<dyn UpscaleService>,
        config: &Config,
    ) -> Self {
        Self {
            extractor,
            upscaler,
            extraction_gate: AdmissionGate::new(
                "extraction",
                config.extraction.max_in_flight,
                Duration::from_secs(config.extraction.queue_timeout_seconds),
            ),
            upscale_gate: AdmissionGate::new(
                "upscale",
                config.upscale.max_in_flight,
                Duration::from_secs(config.upscale.queue_timeout_seconds),
            ),
            retry: RetryPolicy {
                max_attempts: config.extraction.max_attempts.max(1),
                delay: Duration::from_millis(config.extraction.retry_delay_ms),
            },
        }
    }

    pub fn with_gates(
        extractor: Arc<dyn ExtractionService>,
        upscaler: Arc<dyn UpscaleService>,
        extraction_gate: AdmissionGate,
        upscale_gate: AdmissionGate,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            extractor,
            upscaler,
            extraction_gate,
            upscale_gate,
            retry,
        }
    }

    pub async fn extract(
        &self,
        image: &[u8],
        media_type: MediaType,
        hint: Option<&str>,
    ) -> Result<ExtractionResult, VerifyError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            // The slot is held for the collaborator call only, not the retry pause.
            let outcome = {
                let _permit = self.extraction_gate.acquire().await?;
                self.extractor
                    .extract(image, media_type, hint)
                    .await
                    .and_then(|text| normalize::parse_response(&text, hint))
            };

            match outcome {
                Ok(result) => {
                    log::debug!(
                        "Extraction attempt {} classified document as {} with {} field(s)",
                        attempt,
                        result.document_type,
                        result.fields.len()
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    log::warn!(
                        "Extraction attempt {}/{} unusable ({}), retrying",
                        attempt,
                        self.retry.max_attempts,
                        e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    log::warn!("Extraction failed after {} attempt(s): {}", attempt, e);
                    return Err(VerifyError::Extraction(e.to_string()));
                }
            }
        }
    }

    pub async fn upscale(&self, image: &[u8], media_type: MediaType) -> Result<Vec<u8>, VerifyError> {
        if image.is_empty() {
            return Err(VerifyError::UnsupportedMediaType("empty image".to_string()));
        }
        let _permit = self.upscale_gate.acquire().await?;
        self.upscaler
            .upscale(image, media_type)
            .await
            .map_err(|e| VerifyError::Upscale(e.to_string()))
    }

    pub fn extraction_in_flight(&self) -> usize {
        self.extraction_gate.in_flight()
    }

    pub fn upscale_in_flight(&self) -> usize {
        self.upscale_gate.in_flight()
    }
}
