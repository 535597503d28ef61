use crate::error::VerifyError;
use crate::identity::AuthError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

fn verify_status(error: &VerifyError) -> StatusCode {
    match error.root() {
        VerifyError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        VerifyError::Extraction(_) | VerifyError::Upscale(_) => StatusCode::BAD_GATEWAY,
        VerifyError::InvalidRequestState(_) => StatusCode::CONFLICT,
        VerifyError::MissingOverrideReason => StatusCode::UNPROCESSABLE_ENTITY,
        VerifyError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
        VerifyError::Storage(_) | VerifyError::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Verify(e) => verify_status(e),
            ApiError::Auth(AuthError::MissingCredentials | AuthError::UnknownToken) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Auth(AuthError::Inactive(_) | AuthError::Forbidden(_)) => {
                StatusCode::FORBIDDEN
            }
            ApiError::Auth(AuthError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed with {}: {}", status, self);
        } else {
            log::debug!("Request rejected with {}: {}", status, self);
        }

        let request_id = match &self {
            ApiError::Verify(e) => e.request_id().map(str::to_string),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            request_id,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(VerifyError::UnsupportedMediaType("gif".into())),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                ApiError::from(VerifyError::failed("r1", VerifyError::Extraction("x".into()))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(VerifyError::Upscale("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(VerifyError::InvalidRequestState("x".into())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(VerifyError::MissingOverrideReason),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::from(VerifyError::failed("r1", VerifyError::Busy("x".into()))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ApiError::from(AuthError::UnknownToken), StatusCode::UNAUTHORIZED),
            (
                ApiError::from(AuthError::Forbidden("o".into())),
                StatusCode::FORBIDDEN,
            ),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{error}");
        }
    }
}
