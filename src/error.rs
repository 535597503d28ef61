//! Error taxonomy shared by the pipeline, the store and the HTTP surface.

/// Failure reported by an external collaborator (extraction model or
/// upscaler).
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// Network failure, timeout or non-success status. Never retried.
    #[error("transport error: {0}")]
    Transport(String),
    /// The collaborator answered but the payload was empty or unusable.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl CollaboratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollaboratorError::Malformed(_))
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        CollaboratorError::Transport(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("store connection lock poisoned")]
    Poisoned,
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("upscaling failed: {0}")]
    Upscale(String),
    #[error("invalid request state: {0}")]
    InvalidRequestState(String),
    #[error("decision disagrees with the recommendation and carries no override reason")]
    MissingOverrideReason,
    #[error("service busy: {0}")]
    Busy(String),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    /// The request was created and then moved to FAILED.
    #[error("verification request {request_id} failed: {source}")]
    Failed {
        request_id: String,
        #[source]
        source: Box<VerifyError>,
    },
}

impl VerifyError {
    pub fn failed(request_id: impl Into<String>, source: VerifyError) -> Self {
        VerifyError::Failed {
            request_id: request_id.into(),
            source: Box::new(source),
        }
    }

    /// Id of the FAILED request this error belongs to, if one was created.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            VerifyError::Failed { request_id, .. } => Some(request_id),
            _ => None,
        }
    }

    /// The underlying cause, looking through the `Failed` wrapper.
    pub fn root(&self) -> &VerifyError {
        match self {
            VerifyError::Failed { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_malformed_is_retryable() {
        assert!(CollaboratorError::Malformed("empty".into()).is_retryable());
        assert!(!CollaboratorError::Transport("timeout".into()).is_retryable());
    }

    #[test]
    fn test_failed_wrapper_exposes_id_and_cause() {
        let err = VerifyError::failed("req-1", VerifyError::Busy("extraction".into()));
        assert_eq!(err.request_id(), Some("req-1"));
        assert!(matches!(err.root(), VerifyError::Busy(_)));
        assert_eq!(
            err.to_string(),
            "verification request req-1 failed: service busy: extraction"
        );
        assert_eq!(VerifyError::MissingOverrideReason.request_id(), None);
    }
}
