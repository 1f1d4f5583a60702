use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use sproc_streamer::document::{parse_document, XmlDocumentBuilder};
use sproc_streamer::errors::{DiscoveryError, InvocationCause, InvocationError};
use sproc_streamer::models::{ProcedureMapping, ResultSet, Value};
use sproc_streamer::pipeline::{Pipeline, PipelineOptions};
use sproc_streamer::sources::{MappingSource, ProcedureInvoker};
use sproc_streamer::web::{handlers::DocumentLine, AppState, WebServer};

struct FixedMappings(Option<Vec<ProcedureMapping>>);

#[async_trait]
impl MappingSource for FixedMappings {
    async fn fetch_mappings(&self) -> Result<Vec<ProcedureMapping>, DiscoveryError> {
        self.0.clone().ok_or_else(|| DiscoveryError::Unavailable {
            message: "mapping table unreachable".to_string(),
        })
    }
}

struct GrowthOnly;

#[async_trait]
impl ProcedureInvoker for GrowthOnly {
    async fn invoke(&self, procedure_name: &str) -> Result<ResultSet, InvocationError> {
        if procedure_name == "sp_growth" {
            Ok(ResultSet::from_rows(
                &["id", "val"],
                vec![vec![Value::Integer(1), Value::Float(10.5)]],
            ))
        } else {
            Err(InvocationError::new(
                procedure_name,
                InvocationCause::Database(sqlx::Error::RowNotFound),
            ))
        }
    }
}

fn app(mappings: Option<Vec<ProcedureMapping>>) -> Router {
    let pipeline = Pipeline::new(
        Arc::new(FixedMappings(mappings)),
        Arc::new(GrowthOnly),
        Arc::new(XmlDocumentBuilder::new()),
        PipelineOptions::default(),
    );
    WebServer::router(AppState::new(Arc::new(pipeline), CancellationToken::new()))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, body.to_vec())
}

#[tokio::test]
async fn test_health_endpoint() {
    let (status, _, body) = get(app(Some(Vec::new())), "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: JsonValue = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_documents_stream_as_ndjson() {
    let mappings = vec![
        ProcedureMapping::new("Growth", "sp_growth"),
        ProcedureMapping::new("Income", "sp_income"),
    ];
    let (status, content_type, body) = get(app(Some(mappings)), "/api/v1/documents").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/x-ndjson"));

    let text = String::from_utf8(body).unwrap();
    let lines: Vec<DocumentLine> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].unit_name, "Growth");
    let parsed = parse_document(&lines[0].document).unwrap();
    assert_eq!(parsed.rows.len(), 1);
}

#[tokio::test]
async fn test_discovery_failure_returns_bad_gateway() {
    let (status, content_type, body) = get(app(None), "/api/v1/documents").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(content_type.as_deref(), Some("application/json"));

    let json: JsonValue = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("mapping table unreachable"));
}

#[tokio::test]
async fn test_empty_discovery_returns_empty_body() {
    let (status, _, body) = get(app(Some(Vec::new())), "/api/v1/documents").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}
