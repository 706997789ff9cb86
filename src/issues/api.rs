use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, Query, Request, State,
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::blob::{BlobStore, UPLOADS_PREFIX};
use super::db::DbHandle;
use super::ingest::{ImagePolicy, ImageUpload, IngestionService, IssueSubmission};
use super::query::QueryService;
use super::transition::StatusTransitionService;
use crate::errors::{ErrorKind, IssueError};

/// Multipart framing and text fields on top of the image itself.
const BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Form field carrying the issue photo.
const IMAGE_FIELD: &str = "image";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub ingestion: IngestionService,
    pub queries: QueryService,
    pub transitions: StatusTransitionService,
    pub blobs: Arc<dyn BlobStore>,
    pub team_token: Option<String>,
    pub dev_mode: bool,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: DbHandle, blobs: Arc<dyn BlobStore>, policy: ImagePolicy) -> Self {
        Self {
            ingestion: IngestionService::new(db.clone(), blobs.clone(), policy),
            queries: QueryService::new(db.clone()),
            transitions: StatusTransitionService::new(db),
            blobs,
            team_token: None,
            dev_mode: false,
        }
    }

    /// Map a service error onto a response, logging storage failures.
    /// Internal detail is attached only in dev mode.
    fn reject(&self, err: IssueError) -> ApiError {
        match err.kind() {
            ErrorKind::Validation => ApiError::BadRequest(err.to_string()),
            ErrorKind::NotFound => ApiError::NotFound(err.to_string()),
            ErrorKind::Storage => {
                let detail = match &err {
                    IssueError::Storage(source) => format!("{:#}", source),
                    other => other.to_string(),
                };
                error!(error = %detail, "storage failure");
                ApiError::Internal {
                    message: "Storage failure, the request may be retried".to_string(),
                    details: self.dev_mode.then_some(detail),
                }
            }
        }
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CategoryQuery {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct LocationQuery {
    pub location: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeIssueRequest {
    pub issue_id: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

// ── Response envelope ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

fn respond<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    let body = Envelope {
        success: true,
        message: message.to_string(),
        data,
    };
    (status, Json(body)).into_response()
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Internal {
        message: String,
        details: Option<String>,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Internal { message, details } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage", message, details)
            }
        };
        let mut body = serde_json::json!({
            "success": false,
            "kind": kind,
            "message": message,
        });
        if let Some(details) = details {
            body["details"] = serde_json::Value::String(details);
        }
        (status, Json(body)).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

/// Citizen routes are open; repair-team routes pass through the team token
/// check. Both share the same query handlers.
pub fn api_router(state: &SharedState) -> Router<SharedState> {
    let citizen = Router::new()
        .route("/citizens/issues", get(list_issues).post(submit_issue))
        .route("/citizens/issues/category", get(search_by_category))
        .route("/citizens/issues/location", get(search_by_location))
        .route("/citizens/issues/{id}", get(get_issue));

    let team = Router::new()
        .route("/team/issues", get(list_issues))
        .route("/team/issues/category", get(search_by_category))
        .route("/team/issues/location", get(search_by_location))
        .route("/team/issues/take", post(take_issue))
        .route("/team/issues/{id}", get(get_issue))
        .route("/team/issues/{id}/status", put(update_issue_status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_team_token,
        ));

    let body_limit = state.ingestion.policy().max_bytes + BODY_OVERHEAD_BYTES;

    Router::new()
        .merge(citizen)
        .merge(team)
        .route("/uploads/{name}", get(serve_upload))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
}

async fn require_team_token(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(expected) = state.team_token.as_deref() {
        let presented = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        if presented != Some(expected) {
            warn!(path = %req.uri().path(), "repair-team request without valid token");
            return ApiError::Unauthorized("Repair-team credentials required".into())
                .into_response();
        }
    }
    next.run(req).await
}

// ── Multipart helpers ─────────────────────────────────────────────────

fn multipart_error(err: MultipartError, policy: &ImagePolicy) -> IssueError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        IssueError::validation(policy.too_large_message())
    } else {
        IssueError::validation(format!("Upload error: {}", err.body_text()))
    }
}

/// Read a file part, giving up as soon as it passes the policy limit.
async fn read_file(mut field: Field<'_>, policy: &ImagePolicy) -> Result<Vec<u8>, IssueError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, policy))?
    {
        if bytes.len() + chunk.len() > policy.max_bytes {
            return Err(IssueError::validation(policy.too_large_message()));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn read_submission(
    mut multipart: Multipart,
    policy: &ImagePolicy,
) -> Result<(IssueSubmission, Vec<ImageUpload>), IssueError> {
    let mut submission = IssueSubmission::default();
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, policy))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) if name != IMAGE_FIELD => {
                debug!(field = %name, %filename, "ignoring file part outside the image field");
            }
            Some(filename) => {
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = read_file(field, policy).await?;
                images.push(ImageUpload {
                    filename,
                    media_type,
                    bytes,
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, policy))?;
                match name.as_str() {
                    "category" => submission.category = Some(value),
                    "city" => submission.city = Some(value),
                    "specificAddress" => submission.specific_address = Some(value),
                    "description" => submission.description = Some(value),
                    "issueDate" => submission.issue_date = Some(value),
                    other => debug!(field = other, "ignoring unknown form field"),
                }
            }
        }
    }
    Ok((submission, images))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn submit_issue(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("Upload error: {}", e.body_text())))?;
    let policy = state.ingestion.policy().clone();
    let (submission, images) = read_submission(multipart, &policy)
        .await
        .map_err(|e| state.reject(e))?;
    let issue = state
        .ingestion
        .submit_issue(submission, images)
        .await
        .map_err(|e| state.reject(e))?;
    Ok(respond(
        StatusCode::CREATED,
        "Your issue has been successfully submitted!",
        issue,
    ))
}

async fn list_issues(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let issues = state.queries.list_all().await.map_err(|e| state.reject(e))?;
    Ok(respond(
        StatusCode::OK,
        "All issues retrieved successfully",
        issues,
    ))
}

async fn get_issue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let issue = state
        .queries
        .get_by_id(&id)
        .await
        .map_err(|e| state.reject(e))?;
    Ok(respond(StatusCode::OK, "Issue retrieved successfully", issue))
}

async fn search_by_category(
    State(state): State<SharedState>,
    Query(query): Query<CategoryQuery>,
) -> Result<Response, ApiError> {
    let needle = query.category.unwrap_or_default();
    let issues = state
        .queries
        .find_by_category(&needle)
        .await
        .map_err(|e| state.reject(e))?;
    Ok(respond(
        StatusCode::OK,
        "Successfully retrieved issues by category",
        issues,
    ))
}

async fn search_by_location(
    State(state): State<SharedState>,
    Query(query): Query<LocationQuery>,
) -> Result<Response, ApiError> {
    let needle = query.location.unwrap_or_default();
    let issues = state
        .queries
        .find_by_location(&needle)
        .await
        .map_err(|e| state.reject(e))?;
    Ok(respond(
        StatusCode::OK,
        "Successfully filtered by location",
        issues,
    ))
}

async fn update_issue_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let issue = state
        .transitions
        .update_status(&id, req.status.as_deref(), req.notes.as_deref())
        .await
        .map_err(|e| state.reject(e))?;
    Ok(respond(
        StatusCode::OK,
        "Issue status updated successfully",
        issue,
    ))
}

async fn take_issue(
    State(state): State<SharedState>,
    body: Result<Json<TakeIssueRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let issue = state
        .transitions
        .take_issue(
            req.issue_id.as_deref().unwrap_or_default(),
            req.description.as_deref(),
            req.status.as_deref(),
        )
        .await
        .map_err(|e| state.reject(e))?;
    Ok(respond(StatusCode::OK, "Issue updated successfully", issue))
}

async fn serve_upload(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let reference = format!("{}{}", UPLOADS_PREFIX, name);
    let blob = state
        .blobs
        .serve(&reference)
        .await
        .map_err(|e| state.reject(e))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, blob.media_type)],
        blob.bytes,
    )
        .into_response())
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::blob::DiskBlobStore;
    use crate::issues::db::IssueDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "civic-test-boundary";

    struct TestApp {
        router: Router,
        db: DbHandle,
        _dir: tempfile::TempDir,
    }

    fn test_app_with(team_token: Option<&str>, dev_mode: bool) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let db = DbHandle::new(IssueDb::new_in_memory().unwrap());
        let blobs = Arc::new(DiskBlobStore::new(dir.path().join("uploads")));
        let mut state = AppState::new(db.clone(), blobs, ImagePolicy::default());
        state.team_token = team_token.map(str::to_string);
        state.dev_mode = dev_mode;
        let state = Arc::new(state);
        TestApp {
            router: api_router(&state).with_state(state),
            db,
            _dir: dir,
        }
    }

    fn test_app() -> TestApp {
        test_app_with(None, false)
    }

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart_request(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Request<Body> {
        let named: Vec<(&str, &str, &str, &[u8])> = files
            .iter()
            .map(|(filename, media_type, bytes)| ("image", *filename, *media_type, *bytes))
            .collect();
        multipart_request_named(fields, &named)
    }

    fn multipart_request_named(
        fields: &[(&str, &str)],
        files: &[(&str, &str, &str, &[u8])],
    ) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (field, filename, media_type, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {media_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/citizens/issues")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn pothole_fields() -> Vec<(&'static str, &'static str)> {
        vec![
            ("category", "Pothole"),
            ("city", "Springfield"),
            ("specificAddress", "742 Evergreen Terrace"),
            ("issueDate", "2024-05-01"),
        ]
    }

    async fn submit(app: &TestApp, category: &str, city: &str) -> serde_json::Value {
        let fields = [
            ("category", category),
            ("city", city),
            ("issueDate", "2024-05-01"),
        ];
        let req = multipart_request(&fields, &[("hole.png", "image/png", &b"\x89PNG"[..])]);
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp.into_body()).await["data"].clone()
    }

    async fn get(app: &TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        (status, body_json(resp.into_body()).await)
    }

    async fn send_json(
        app: &TestApp,
        method: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        (status, body_json(resp.into_body()).await)
    }

    // 1. Health check
    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    // 2. Submit then fetch by id
    #[tokio::test]
    async fn test_submit_issue_then_get_by_id() {
        let app = test_app();
        let req = multipart_request(&pothole_fields(), &[("hole.png", "image/png", &b"\x89PNG"[..])]);
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body = body_json(resp.into_body()).await;
        assert_eq!(body["success"], true);
        let issue = &body["data"];
        assert_eq!(issue["status"], "reported");
        assert_eq!(issue["category"], "Pothole");
        assert_eq!(issue["location"]["specificArea"], "742 Evergreen Terrace");
        assert!(!issue["imageReference"].as_str().unwrap().is_empty());

        let id = issue["id"].as_str().unwrap();
        let (status, fetched) = get(&app, &format!("/citizens/issues/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&fetched["data"], issue);
    }

    // 3. Text file rejected
    #[tokio::test]
    async fn test_submit_text_file_rejected() {
        let app = test_app();
        let req = multipart_request(&pothole_fields(), &[("notes.txt", "text/plain", &b"hello"[..])]);
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = body_json(resp.into_body()).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "validation");
        assert!(body["message"].as_str().unwrap().contains("text/plain"));

        let (_, list) = get(&app, "/citizens/issues").await;
        assert!(list["data"].as_array().unwrap().is_empty());
    }

    // 4. Missing image
    #[tokio::test]
    async fn test_submit_without_image_rejected() {
        let app = test_app();
        let resp = app
            .router
            .clone()
            .oneshot(multipart_request(&pothole_fields(), &[]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    // 4b. File parts outside the image field do not count as the image
    #[tokio::test]
    async fn test_submit_ignores_file_parts_outside_image_field() {
        let app = test_app();
        let req = multipart_request_named(
            &pothole_fields(),
            &[
                ("attachment", "extra.png", "image/png", &b"\x89PNG"[..]),
                ("image", "hole.png", "image/png", &b"\x89PNG"[..]),
            ],
        );
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = multipart_request_named(
            &pothole_fields(),
            &[("attachment", "hole.png", "image/png", &b"\x89PNG"[..])],
        );
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp.into_body()).await;
        assert_eq!(body["message"], "Image is required!");
    }

    // 5. Non-multipart body
    #[tokio::test]
    async fn test_submit_requires_multipart() {
        let app = test_app();
        let (status, body) = send_json(
            &app,
            "POST",
            "/citizens/issues",
            serde_json::json!({"category": "Pothole"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }

    // 6. Oversized image
    #[tokio::test]
    async fn test_submit_oversized_image_rejected() {
        let app = test_app();
        let big = vec![0u8; ImagePolicy::default().max_bytes + 1];
        let req = multipart_request(&pothole_fields(), &[("big.png", "image/png", big.as_slice())]);
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp.into_body()).await;
        assert!(body["message"].as_str().unwrap().contains("File too large"));
    }

    // 7. List is newest first on both route groups
    #[tokio::test]
    async fn test_list_issues_newest_first() {
        let app = test_app();
        submit(&app, "Pothole", "Springfield").await;
        submit(&app, "Graffiti", "Shelbyville").await;

        for uri in ["/citizens/issues", "/team/issues"] {
            let (status, body) = get(&app, uri).await;
            assert_eq!(status, StatusCode::OK);
            let issues = body["data"].as_array().unwrap();
            assert_eq!(issues.len(), 2);
            assert_eq!(issues[0]["category"], "Graffiti");
            assert_eq!(issues[1]["category"], "Pothole");
        }
    }

    // 8. Search by category and location
    #[tokio::test]
    async fn test_search_by_category_and_location() {
        let app = test_app();
        submit(&app, "Pothole", "Springfield").await;
        submit(&app, "Graffiti", "Shelbyville").await;

        let (status, body) = get(&app, "/citizens/issues/category?category=pot").await;
        assert_eq!(status, StatusCode::OK);
        let issues = body["data"].as_array().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["category"], "Pothole");

        let (status, body) = get(&app, "/team/issues/location?location=shelby").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["category"], "Graffiti");
    }

    // 9. Search requires a term
    #[tokio::test]
    async fn test_search_requires_term() {
        let app = test_app();
        let (status, body) = get(&app, "/citizens/issues/category").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Category is required!");

        let (status, _) = get(&app, "/citizens/issues/location?location=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // 10. Get by id errors
    #[tokio::test]
    async fn test_get_issue_errors() {
        let app = test_app();
        let (status, body) = get(&app, "/citizens/issues/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid issue ID format");

        let (status, body) = get(
            &app,
            &format!("/team/issues/{}", uuid::Uuid::new_v4()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    // 11. Update status
    #[tokio::test]
    async fn test_update_status_resolved() {
        let app = test_app();
        let issue = submit(&app, "Pothole", "Springfield").await;
        let id = issue["id"].as_str().unwrap();

        let (status, body) = send_json(
            &app,
            "PUT",
            &format!("/team/issues/{id}/status"),
            serde_json::json!({"status": "resolved", "notes": "Filled with asphalt"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "resolved");
        assert_eq!(body["data"]["lastStatusUpdateNotes"], "Filled with asphalt");

        let (_, fetched) = get(&app, &format!("/citizens/issues/{id}")).await;
        assert_eq!(fetched["data"]["status"], "resolved");
    }

    // 12. Unknown status leaves the issue untouched
    #[tokio::test]
    async fn test_update_status_unknown_state() {
        let app = test_app();
        let issue = submit(&app, "Pothole", "Springfield").await;
        let id = issue["id"].as_str().unwrap();

        let (status, body) = send_json(
            &app,
            "PUT",
            &format!("/team/issues/{id}/status"),
            serde_json::json!({"status": "notARealState"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let (_, fetched) = get(&app, &format!("/citizens/issues/{id}")).await;
        assert_eq!(fetched["data"], issue);
    }

    // 13. Update status on a missing issue
    #[tokio::test]
    async fn test_update_status_missing_issue() {
        let app = test_app();
        let (status, _) = send_json(
            &app,
            "PUT",
            &format!("/team/issues/{}/status", uuid::Uuid::new_v4()),
            serde_json::json!({"status": "resolved"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // 14. Take issue
    #[tokio::test]
    async fn test_take_issue() {
        let app = test_app();
        let issue = submit(&app, "Pothole", "Springfield").await;

        let (status, body) = send_json(
            &app,
            "POST",
            "/team/issues/take",
            serde_json::json!({
                "issueId": issue["id"],
                "description": "Crew 7 on site",
                "status": "in_progress"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["description"], "Crew 7 on site");
        assert_eq!(body["data"]["status"], "in_progress");
    }

    // 15. Malformed JSON keeps the error envelope
    #[tokio::test]
    async fn test_take_issue_malformed_body() {
        let app = test_app();
        let req = Request::builder()
            .method("POST")
            .uri("/team/issues/take")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp.into_body()).await;
        assert_eq!(body["success"], false);
    }

    // 16. Team token gate
    #[tokio::test]
    async fn test_team_routes_require_token_when_configured() {
        let app = test_app_with(Some("s3cret"), false);

        let (status, body) = get(&app, "/team/issues").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthorized");

        let req = Request::builder()
            .uri("/team/issues")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let (status, _) = get(&app, "/citizens/issues").await;
        assert_eq!(status, StatusCode::OK);
    }

    // 17. Stored image is served back
    #[tokio::test]
    async fn test_serve_uploaded_image() {
        let app = test_app();
        let issue = submit(&app, "Pothole", "Springfield").await;
        let reference = issue["imageReference"].as_str().unwrap();

        let req = Request::builder().uri(reference).body(Body::empty()).unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "image/png");
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"\x89PNG");

        let (status, _) = get(&app, "/uploads/missing.png").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // 18. Storage failure details only in dev mode
    #[tokio::test]
    async fn test_storage_error_details_only_in_dev_mode() {
        for dev_mode in [false, true] {
            let app = test_app_with(None, dev_mode);
            app.db
                .lock_sync()
                .unwrap()
                .drop_issues_table_for_test()
                .unwrap();

            let (status, body) = get(&app, "/citizens/issues").await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["kind"], "storage");
            assert_eq!(body.get("details").is_some(), dev_mode);
        }
    }
}
