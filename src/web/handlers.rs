use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::errors::{AppError, AppResult};
use crate::models::Document;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "sproc-streamer"
    }))
}

/// Run the pipeline and stream one NDJSON line per document.
///
/// The run lives under a child of the server's shutdown token. That token is
/// cancelled when the response body is dropped, so a disconnecting client
/// releases every in-flight procedure call.
pub async fn stream_documents(State(state): State<AppState>) -> AppResult<Response> {
    let cancel = state.shutdown.child_token();
    let run = state.pipeline.run(cancel.clone()).await.map_err(|e| {
        error!("Document request failed before streaming: {}", e);
        AppError::from(e)
    })?;

    let run_id = run.report().run_id;
    info!("Streaming documents for run {}", run_id);

    let lines = async_stream::stream! {
        let _guard = cancel.drop_guard();
        let mut run = run;
        while let Some(document) = run.next().await {
            yield encode_line(&document);
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-run-id", run_id.to_string())
        .body(Body::from_stream(lines))
        .map_err(|e| AppError::internal(format!("Failed to build response: {e}")))
}

/// One line of the `/api/v1/documents` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLine {
    pub unit_name: String,
    pub document: String,
}

fn encode_line(document: &Document) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(&DocumentLine {
        unit_name: document.unit_name.clone(),
        document: document.content.clone(),
    })?;
    line.push(b'\n');
    Ok(line)
}
