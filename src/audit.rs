//! Decision Audit Recorder
//!
//! Records an officer's final call against a COMPLETED request. Each
//! submission becomes a new immutable audit row; nothing here updates the
//! request itself.

use crate::error::VerifyError;
use crate::models::{AuditLog, AuditPage, RequestStatus, Verdict};
use crate::store::SqliteStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// One officer decision as submitted.
#[derive(Debug, Clone)]
pub struct DecisionSubmission<'a> {
    pub request_id: &'a str,
    pub officer_id: &'a str,
    pub decision: Verdict,
    pub override_reason: Option<&'a str>,
}

pub struct DecisionAuditRecorder {
    store: Arc<SqliteStore>,
}

impl DecisionAuditRecorder {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub fn record(&self, submission: &DecisionSubmission<'_>) -> Result<AuditLog, VerifyError> {
        self.record_at(submission, Utc::now())
    }

    /// Records the decision as if submitted at `now`.
    pub fn record_at(
        &self,
        submission: &DecisionSubmission<'_>,
        now: DateTime<Utc>,
    ) -> Result<AuditLog, VerifyError> {
        let request_id = submission.request_id;
        let request = self.store.get_request(request_id)?.ok_or_else(|| {
            VerifyError::InvalidRequestState(format!("verification request {request_id} does not exist"))
        })?;

        if request.status != RequestStatus::Completed {
            return Err(VerifyError::InvalidRequestState(format!(
                "verification request {request_id} is {}, decisions need COMPLETED",
                request.status
            )));
        }
        let recommendation = request.recommendation.ok_or_else(|| {
            VerifyError::InvalidRequestState(format!(
                "verification request {request_id} has no recommendation"
            ))
        })?;

        let was_overridden = submission.decision != recommendation;
        let reason = submission
            .override_reason
            .map(str::trim)
            .filter(|r| !r.is_empty());
        if was_overridden && reason.is_none() {
            return Err(VerifyError::MissingOverrideReason);
        }

        // Clock skew between the request row and this host must not go negative.
        let latency_ms = (now - request.created_at).num_milliseconds().max(0) as u64;

        let log = AuditLog {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: Some(request_id.to_string()),
            officer_id: Some(submission.officer_id.to_string()),
            officer_decision: submission.decision,
            was_overridden,
            override_reason: if was_overridden {
                reason.map(str::to_string)
            } else {
                None
            },
            latency_ms,
            created_at: now,
            document_type: request.document_type,
        };
        self.store.insert_audit(&log)?;

        log::info!(
            "Audit {}: officer {} decided {} on {} (recommended {}, overridden={}, {} ms)",
            log.id,
            submission.officer_id,
            submission.decision,
            request_id,
            recommendation,
            was_overridden,
            latency_ms
        );
        Ok(log)
    }

    /// Newest-first page of the audit trail. `page` is 1-based.
    pub fn list(&self, page: u32, page_size: u32) -> Result<AuditPage, VerifyError> {
        Ok(self.store.list_audit(page.max(1), page_size.clamp(1, MAX_PAGE_SIZE))?)
    }
}
