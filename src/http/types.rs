//! HTTP request and response bodies
use crate::error::ValidationError;
use crate::retrieval::QueryError;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Validation,
    Backend,
    Forbidden,
}

impl From<&ErrorType> for StatusCode {
    fn from(value: &ErrorType) -> Self {
        match value {
            ErrorType::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorType::Backend => StatusCode::SERVICE_UNAVAILABLE,
            ErrorType::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: ErrorType,
    /// Field-level detail for validation failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ValidationError>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            error: error.into(),
            error_type,
            fields: Vec::new(),
        }
    }
}

impl From<QueryError> for ErrorResponse {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Validation(fields) => Self {
                error: "invalid query".to_string(),
                error_type: ErrorType::Validation,
                fields,
            },
            // Per-backend detail stays in the logs
            QueryError::BackendUnavailable { .. } => {
                Self::new("no retrieval backend is available", ErrorType::Backend)
            }
        }
    }
}

impl From<ErrorResponse> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: ErrorResponse) -> Self {
        (StatusCode::from(&err.error_type), Json(err))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Which backends this instance was configured with
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BackendPresence {
    pub vector: bool,
    pub lexical: bool,
    pub graph: bool,
    pub embedder: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub rerank_enabled: bool,
    pub rerank_model: String,
    pub rerank_loaded: bool,
    pub rerank_state: &'static str,
    pub backends: BackendPresence,
    pub started_at: DateTime<Utc>,
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_keeps_fields() {
        let err = QueryError::Validation(vec![ValidationError::new("query", "Query cannot be empty")]);
        let (status, Json(body)) = <(StatusCode, Json<ErrorResponse>)>::from(ErrorResponse::from(err));

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error_type"], "validation");
        assert_eq!(json["fields"][0]["path"], "query");
    }

    #[test]
    fn test_backend_error_is_503_without_detail() {
        let err = QueryError::BackendUnavailable {
            failures: vec!["vector backend unavailable: connection refused".to_string()],
        };
        let (status, Json(body)) = <(StatusCode, Json<ErrorResponse>)>::from(ErrorResponse::from(err));

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("fields").is_none());
        assert!(!json["error"].as_str().unwrap().contains("refused"));
    }
}
