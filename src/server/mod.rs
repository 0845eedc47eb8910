//! HTTP 서버 - 업로드/질문 엔드포인트
//!
//! - `POST /upload`: multipart `file` 필드의 문서를 인덱싱
//! - `GET /ask?query=`: 업로드된 문서 기반 답변
//! - `GET /health`: 상태 + 저장된 청크 수

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::extractor::{ExtractError, SUPPORTED_FORMATS_MESSAGE};
use crate::pipeline::{RagPipeline, UploadOutcome};

/// 업로드 최대 크기
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// 핸들러 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
}

/// 질문 쿼리 파라미터
#[derive(Debug, Deserialize)]
pub struct AskQuery {
    #[serde(default)]
    pub query: String,
}

// ============================================================================
// Errors
// ============================================================================

/// API 에러 (`{"detail": ...}` 응답)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let detail = format!("{:#}", err);
        match err.downcast_ref::<ExtractError>() {
            Some(ExtractError::Io(_)) | None => Self::Internal(detail),
            Some(_) => Self::BadRequest(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Rejected request: {}", self);
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// 라우터 생성
pub fn router(pipeline: Arc<RagPipeline>) -> Router {
    let state = AppState { pipeline };

    Router::new()
        .route("/upload", post(upload))
        .route("/ask", get(ask))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 서버 실행 (Ctrl+C까지)
pub async fn serve(settings: &Settings) -> Result<()> {
    let pipeline = RagPipeline::from_settings(settings).await?;
    let app = router(Arc::new(pipeline));

    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind))?;
    let addr = listener.local_addr()?;

    tracing::info!("Document QA server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Document QA server shutting down");
        })
        .await
        .context("HTTP server error")
}

// ============================================================================
// Handlers
// ============================================================================

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let response = match state.pipeline.upload(&filename, bytes.to_vec()).await? {
            UploadOutcome::Stored { source, chunks } => json!({
                "message": "Document uploaded successfully",
                "source": source,
                "chunks": chunks,
            }),
            UploadOutcome::Unsupported { .. } => json!({ "error": SUPPORTED_FORMATS_MESSAGE }),
        };
        return Ok(Json(response));
    }

    Err(ApiError::BadRequest(
        "Missing multipart field 'file'".to_string(),
    ))
}

async fn ask(
    State(state): State<AppState>,
    Query(params): Query<AskQuery>,
) -> Result<Json<Value>, ApiError> {
    if params.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".to_string()));
    }

    let answer = state.pipeline.ask(&params.query).await?;
    Ok(Json(json!({ "answer": answer })))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let chunks = state.pipeline.count().await?;
    Ok(Json(json!({ "status": "ok", "chunks": chunks })))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::render_prompt;
    use crate::pipeline::tests::test_pipeline;
    use crate::testing::ScriptedChat;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docqa-test-boundary";

    fn multipart_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_upload_and_ask() {
        let dir = TempDir::new().unwrap();
        let chat = ScriptedChat::answering("The sky is blue.");
        let prompts = chat.prompts();
        let app = router(Arc::new(test_pipeline(&dir, chat)));

        let (status, body) = send(&app, multipart_request("file", "t.txt", b"The sky is blue.")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Document uploaded successfully");
        assert_eq!(body["source"], "t.txt");
        assert_eq!(body["chunks"], 1);

        let (status, body) = send(&app, get("/ask?query=What%20color%20is%20the%20sky%3F")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "The sky is blue.");
        assert_eq!(
            prompts.lock().unwrap()[0],
            render_prompt("The sky is blue.", "What color is the sky?")
        );

        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok", "chunks": 1 }));
    }

    #[tokio::test]
    async fn test_upload_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(test_pipeline(&dir, ScriptedChat::answering("x"))));

        let (status, body) = send(&app, multipart_request("file", "data.csv", b"a,b\n1,2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "error": "Supported formats: .txt, .pdf, .xlsx" }));
    }

    #[tokio::test]
    async fn test_upload_invalid_utf8_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(test_pipeline(&dir, ScriptedChat::answering("x"))));

        let (status, body) = send(&app, multipart_request("file", "bad.txt", &[0xff, 0xfe])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("UTF-8"));
    }

    #[tokio::test]
    async fn test_upload_missing_file_field() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(test_pipeline(&dir, ScriptedChat::answering("x"))));

        let (status, body) = send(&app, multipart_request("document", "t.txt", b"hello")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn test_ask_empty_query() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(test_pipeline(&dir, ScriptedChat::answering("x"))));

        let (status, _) = send(&app, get("/ask?query=%20")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, get("/ask")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ask_model_failure_is_internal_error() {
        let dir = TempDir::new().unwrap();
        let app = router(Arc::new(test_pipeline(&dir, ScriptedChat::failing())));

        let (status, body) = send(&app, get("/ask?query=anything")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("Language model call failed"));
    }
}
