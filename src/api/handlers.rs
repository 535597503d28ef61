//! API Handlers

use super::error::ApiError;
use super::AppState;
use crate::audit::{DecisionSubmission, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::StoreError;
use crate::extraction::MediaType;
use crate::identity::require_admin;
use crate::models::{AuditPage, Officer, Verdict, VerificationReport, VerificationRequest};
use crate::validation::{messages, DocumentKind, SupportedDocument};
use axum::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequestParts, Multipart, Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

// ============ Response Types ============

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Serialize)]
pub struct DecisionAck {
    pub audit_id: String,
    pub request_id: String,
    pub officer_decision: Verdict,
    pub was_overridden: bool,
    pub latency_ms: u64,
}

#[derive(Serialize)]
pub struct IdValidation {
    pub document_type: String,
    pub id_number: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
}

// ============ Request Types ============

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub request_id: String,
    pub final_decision: Verdict,
    pub override_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Deserialize)]
pub struct IdValidationRequest {
    pub document_type: String,
    pub id_number: String,
}

// ============ Authentication ============

/// The authenticated, active officer making the call.
pub struct CurrentOfficer(pub Officer);

#[async_trait]
impl FromRequestParts<AppState> for CurrentOfficer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let officer = state.authenticator.authenticate(token).await?;
        Ok(CurrentOfficer(officer))
    }
}

// ============ Uploads ============

struct Upload {
    bytes: Vec<u8>,
    content_type: String,
    hint: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| {
        ApiError::BadRequest(format!("invalid multipart body: {e}"))
    };

    let mut image = None;
    let mut hint = None;
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "image" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad)?;
                image = Some((bytes.to_vec(), content_type));
            }
            "document_type" | "hint" => {
                let text = field.text().await.map_err(bad)?;
                let text = text.trim();
                if !text.is_empty() {
                    hint = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    let (bytes, content_type) =
        image.ok_or_else(|| ApiError::BadRequest("multipart field 'file' is required".to_string()))?;
    Ok(Upload {
        bytes,
        content_type,
        hint,
    })
}

/// Runs synchronous store-backed work on the blocking pool.
async fn blocking<T, F>(op: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| ApiError::Verify(StoreError::Worker(e.to_string()).into()))?
}

// ============ Handlers ============

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "docverify",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = state.lifecycle.orchestrator();
    Json(serde_json::json!({
        "status": "ok",
        "extraction_in_flight": orchestrator.extraction_in_flight(),
        "upscale_in_flight": orchestrator.upscale_in_flight(),
    }))
}

/// Runs the verification pipeline on an uploaded image
pub async fn process_document(
    State(state): State<AppState>,
    CurrentOfficer(officer): CurrentOfficer,
    multipart: Multipart,
) -> Result<Json<ApiResponse<VerificationReport>>, ApiError> {
    let upload = read_upload(multipart).await?;
    log::info!(
        "Officer {} submitted a {} image for verification",
        officer.id,
        upload.content_type
    );

    let report = state
        .lifecycle
        .clone()
        .process_detached(upload.bytes, upload.content_type, upload.hint)
        .await?;
    Ok(ApiResponse::success(report))
}

pub async fn upscale_document(
    State(state): State<AppState>,
    CurrentOfficer(_officer): CurrentOfficer,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = read_upload(multipart).await?;
    let media_type = MediaType::parse(&upload.content_type)?;
    let enhanced = state
        .lifecycle
        .orchestrator()
        .upscale(&upload.bytes, media_type)
        .await?;
    Ok(([(CONTENT_TYPE, media_type.mime())], enhanced))
}

pub async fn submit_decision(
    State(state): State<AppState>,
    CurrentOfficer(officer): CurrentOfficer,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<DecisionAck>>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let DecisionRequest {
        request_id,
        final_decision,
        override_reason,
    } = payload;
    let recorder = state.recorder.clone();
    let (log, request_id) = blocking(move || {
        let log = recorder.record(&DecisionSubmission {
            request_id: &request_id,
            officer_id: &officer.id,
            decision: final_decision,
            override_reason: override_reason.as_deref(),
        })?;
        Ok((log, request_id))
    })
    .await?;

    Ok(ApiResponse::success(DecisionAck {
        audit_id: log.id,
        request_id,
        officer_decision: log.officer_decision,
        was_overridden: log.was_overridden,
        latency_ms: log.latency_ms,
    }))
}

pub async fn get_request(
    State(state): State<AppState>,
    CurrentOfficer(_officer): CurrentOfficer,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<VerificationRequest>>, ApiError> {
    let lifecycle = state.lifecycle.clone();
    let lookup = id.clone();
    let request = blocking(move || Ok(lifecycle.get(&lookup)?))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("verification request {id} not found")))?;
    Ok(ApiResponse::success(request))
}

pub async fn audit_logs(
    State(state): State<AppState>,
    CurrentOfficer(_officer): CurrentOfficer,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<AuditPage>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(i64::from(DEFAULT_PAGE_SIZE));
    if page < 1 || page > i64::from(u32::MAX) {
        return Err(ApiError::BadRequest("page must be at least 1".to_string()));
    }
    if !(1..=i64::from(MAX_PAGE_SIZE)).contains(&page_size) {
        return Err(ApiError::BadRequest(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let recorder = state.recorder.clone();
    let logs = blocking(move || Ok(recorder.list(page as u32, page_size as u32)?)).await?;
    Ok(ApiResponse::success(logs))
}

pub async fn validate_id_number(
    State(state): State<AppState>,
    CurrentOfficer(_officer): CurrentOfficer,
    payload: Result<Json<IdValidationRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<IdValidation>>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let kind = DocumentKind::parse(&payload.document_type).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "unsupported document type: {}",
            payload.document_type
        ))
    })?;

    let issues = state.validator.validate_identifier(kind, &payload.id_number);
    Ok(ApiResponse::success(IdValidation {
        document_type: kind.as_str().to_string(),
        id_number: payload.id_number,
        is_valid: issues.is_empty(),
        errors: messages(&issues),
    }))
}

pub async fn supported_documents(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<SupportedDocument>>> {
    ApiResponse::success(state.validator.supported_documents())
}

pub async fn me(CurrentOfficer(officer): CurrentOfficer) -> Json<ApiResponse<Officer>> {
    ApiResponse::success(officer)
}

pub async fn list_officers(
    State(state): State<AppState>,
    CurrentOfficer(officer): CurrentOfficer,
) -> Result<Json<ApiResponse<Vec<Officer>>>, ApiError> {
    require_admin(&officer)?;
    let officers = state
        .store
        .run(|store| store.list_officers())
        .await
        .map_err(|e| ApiError::Verify(e.into()))?;
    Ok(ApiResponse::success(officers))
}

#[cfg(test)]
mod tests {
    use super::super::create_router;
    use super::*;
    use crate::store::SqliteStore;
    use crate::lifecycle::RequestLifecycleManager;
    use crate::testing::{
        reply, saturated_orchestrator, test_config, ScriptedExtractor, ScriptedUpscaler,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docverify-test-boundary";

    fn app(extractor: ScriptedExtractor) -> Router {
        let config = test_config();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let state = AppState::build(
            &config,
            store,
            Arc::new(extractor),
            Arc::new(ScriptedUpscaler::ok()),
        )
        .unwrap();
        create_router(state, config.server.max_upload_bytes)
    }

    fn multipart(content_type: &str, image: &[u8], hint: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"id.jpg\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
        if let Some(hint) = hint {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"document_type\"\r\n\r\n{hint}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(uri: &str, token: &str, content_type: &str, hint: Option<&str>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart(content_type, b"\xff\xd8\xff\xe0", hint)))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn approvable() -> ScriptedExtractor {
        ScriptedExtractor::replying(reply(
            "aadhaar",
            &[
                ("name", "Asha Verma", 0.95),
                ("dob", "15-08-1990", 0.90),
                ("id_number", "234123412346", 0.91),
            ],
        ))
    }

    #[tokio::test]
    async fn test_health_and_supported_need_no_token() {
        let app = app(approvable());
        let (status, body) = send(&app, get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&app, get("/documents/supported", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_authentication_is_enforced() {
        let app = app(approvable());
        let (status, body) = send(&app, get("/auth/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, get("/auth/me", Some("token-retired"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, get("/auth/me", Some("token-officer"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["role"], "OFFICER");

        let (status, _) = send(&app, get("/officers", Some("token-officer"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, get("/officers", Some("token-admin"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_process_then_decide_with_override() {
        let app = app(approvable());
        let (status, body) = send(
            &app,
            upload("/verify/process", "token-officer", "image/jpeg", Some("aadhaar")),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["recommendation"], "APPROVE");
        assert_eq!(body["data"]["fraud_flag"], false);
        let request_id = body["data"]["request_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/verify/decision",
                "token-officer",
                serde_json::json!({"request_id": request_id, "final_decision": "REJECT"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/verify/decision",
                "token-officer",
                serde_json::json!({
                    "request_id": request_id,
                    "final_decision": "REJECT",
                    "override_reason": "hologram missing on the original"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["was_overridden"], true);

        let (status, body) = send(&app, get("/audit/logs?page=1&page_size=10", Some("token-officer"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["logs"][0]["officer_id"], "officer-1");
        assert_eq!(body["data"]["logs"][0]["document_type"], "aadhaar");

        let uri = format!("/verify/requests/{request_id}");
        let (status, body) = send(&app, get(&uri, Some("token-officer"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "COMPLETED");
    }

    #[tokio::test]
    async fn test_unsupported_media_type_is_415() {
        let app = app(approvable());
        let (status, body) = send(
            &app,
            upload("/verify/process", "token-officer", "image/gif", None),
        )
        .await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body.get("request_id").is_none());
    }

    #[tokio::test]
    async fn test_failed_extraction_reports_request_id() {
        let app = app(ScriptedExtractor::new(vec![]));
        let (status, body) = send(
            &app,
            upload("/verify/process", "token-officer", "image/png", None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let request_id = body["request_id"].as_str().unwrap().to_string();

        let uri = format!("/verify/requests/{request_id}");
        let (_, body) = send(&app, get(&uri, Some("token-officer"))).await;
        assert_eq!(body["data"]["status"], "FAILED");
        assert!(body["data"]["recommendation"].is_null());

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/verify/decision",
                "token-officer",
                serde_json::json!({"request_id": request_id, "final_decision": "APPROVE"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_busy_extraction_is_503_with_request_id() {
        let config = test_config();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut state = AppState::build(
            &config,
            store.clone(),
            Arc::new(approvable()),
            Arc::new(ScriptedUpscaler::ok()),
        )
        .unwrap();
        let (orchestrator, _held) = saturated_orchestrator(Arc::new(approvable())).await;
        state.lifecycle = Arc::new(RequestLifecycleManager::new(
            store,
            Arc::new(orchestrator),
            &config,
        ));
        let app = create_router(state, config.server.max_upload_bytes);

        let (status, body) = send(
            &app,
            upload("/verify/process", "token-officer", "image/jpeg", None),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        let request_id = body["request_id"].as_str().unwrap().to_string();

        let uri = format!("/verify/requests/{request_id}");
        let (_, body) = send(&app, get(&uri, Some("token-officer"))).await;
        assert_eq!(body["data"]["status"], "FAILED");
        assert!(body["data"]["recommendation"].is_null());
    }

    #[tokio::test]
    async fn test_bad_inputs_are_400() {
        let app = app(approvable());
        for uri in ["/audit/logs?page=0", "/audit/logs?page_size=101", "/audit/logs?page=abc"] {
            let (status, _) = send(&app, get(uri, Some("token-officer"))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/verify/decision",
                "token-officer",
                serde_json::json!({"request_id": "x", "final_decision": "MAYBE"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, get("/verify/requests/unknown", Some("token-officer"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validate_id_number_endpoint() {
        let app = app(approvable());
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/validate/id-number",
                "token-officer",
                serde_json::json!({"document_type": "aadhaar", "id_number": "2341 2341 2346"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_valid"], true);

        let (_, body) = send(
            &app,
            json_request(
                "POST",
                "/validate/id-number",
                "token-officer",
                serde_json::json!({"document_type": "pan", "id_number": "ABCDE12345"}),
            ),
        )
        .await;
        assert_eq!(body["data"]["is_valid"], false);
        assert!(!body["data"]["errors"].as_array().unwrap().is_empty());

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/validate/id-number",
                "token-officer",
                serde_json::json!({"document_type": "library_card", "id_number": "1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upscale_returns_image_bytes() {
        let app = app(approvable());
        let response = app
            .clone()
            .oneshot(upload("/documents/upscale", "token-officer", "image/jpeg", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "image/jpeg");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.len(), 4 * 16);
    }
}
