//! Backend clients
//!
//! Thin typed HTTP clients for the retrieval backends:
//! - `VectorIndexClient`: dense points search (Qdrant wire format)
//! - `LexicalIndexClient`: BM25 search (OpenSearch/Elasticsearch `_search`)
//! - `GraphStoreClient`: graph relevance booster
//! - `HttpEmbedder`: query embedding (text-embeddings-inference `/embed`)
//!
//! Every client is optional. A missing endpoint disables it, it is not an error.

mod embedder;
mod graph;
mod lexical;
mod vector;

pub use embedder::{Embedder, HttpEmbedder};
pub use graph::GraphStoreClient;
pub use lexical::LexicalIndexClient;
pub use vector::VectorIndexClient;

use crate::config::BackendsConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{backend} backend unavailable: {message}")]
    Unavailable {
        backend: BackendKind,
        message: String,
    },

    #[error("{backend} backend timed out after {timeout_ms}ms")]
    Timeout {
        backend: BackendKind,
        timeout_ms: u64,
    },

    #[error("{backend} backend returned status {status}")]
    Status { backend: BackendKind, status: u16 },

    #[error("{backend} backend response could not be decoded: {message}")]
    Decode {
        backend: BackendKind,
        message: String,
    },

    #[error("No query vector available for dense search")]
    MissingVector,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl BackendError {
    fn from_reqwest(backend: BackendKind, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout {
                backend,
                timeout_ms: timeout.as_millis() as u64,
            }
        } else if err.is_decode() {
            BackendError::Decode {
                backend,
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            BackendError::Status {
                backend,
                status: status.as_u16(),
            }
        } else {
            BackendError::Unavailable {
                backend,
                message: err.to_string(),
            }
        }
    }
}

/// Identity of a backend, used in logs, metrics and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Vector,
    Lexical,
    Graph,
    Embedder,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Vector => "vector",
            BackendKind::Lexical => "lexical",
            BackendKind::Graph => "graph",
            BackendKind::Embedder => "embedder",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One backend result before fusion
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub chunk_id: String,
    pub doc_id: Option<String>,
    pub section_id: Option<String>,
    pub text: Option<String>,
    /// Backend-native score, not comparable across backends
    pub score: f32,
    /// Remaining backend fields, in backend order
    pub payload: Map<String, Value>,
}

impl RawHit {
    pub fn new(chunk_id: impl Into<String>, score: f32) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            doc_id: None,
            section_id: None,
            text: None,
            score,
            payload: Map::new(),
        }
    }

    /// Build a hit from a backend document, lifting the well-known fields out
    /// of `payload`. `fallback_id` is used when the payload has no `chunk_id`.
    pub fn from_payload(fallback_id: String, score: f32, mut payload: Map<String, Value>) -> Self {
        let chunk_id = payload
            .shift_remove("chunk_id")
            .and_then(value_to_string)
            .unwrap_or(fallback_id);
        let doc_id = payload.shift_remove("doc_id").and_then(value_to_string);
        let section_id = payload.shift_remove("section_id").and_then(value_to_string);
        let text = payload.shift_remove("text").and_then(value_to_string);

        Self {
            chunk_id,
            doc_id,
            section_id,
            text,
            score,
            payload,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Query handed to a search backend
#[derive(Debug, Clone, Copy)]
pub struct BackendQuery<'a> {
    pub text: &'a str,
    pub vector: Option<&'a [f32]>,
    pub namespace: &'a str,
}

/// A backend answering "top-K for this query inside this namespace"
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn search(&self, query: BackendQuery<'_>, limit: usize) -> Result<Vec<RawHit>, BackendError>;
}

/// The configured set of backend clients, shared by every request
#[derive(Clone, Default)]
pub struct BackendClients {
    pub vector: Option<Arc<dyn SearchBackend>>,
    pub lexical: Option<Arc<dyn SearchBackend>>,
    pub graph: Option<Arc<dyn SearchBackend>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    /// Expected query vector length
    pub embedding_dim: Option<usize>,
}

impl BackendClients {
    /// Build clients for every configured endpoint over one shared connection pool
    pub fn from_config(config: &BackendsConfig, http: reqwest::Client) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);

        let vector = config.vector_index_url.as_ref().map(|url| {
            Arc::new(VectorIndexClient::new(http.clone(), url, timeout)) as Arc<dyn SearchBackend>
        });
        let lexical = config.lexical_index_url.as_ref().map(|url| {
            Arc::new(LexicalIndexClient::new(http.clone(), url, timeout)) as Arc<dyn SearchBackend>
        });
        let graph = config.graph_store_url.as_ref().map(|url| {
            Arc::new(GraphStoreClient::new(http.clone(), url, timeout)) as Arc<dyn SearchBackend>
        });
        let embedder = config
            .embedder_url
            .as_ref()
            .map(|url| Arc::new(HttpEmbedder::new(http.clone(), url, timeout)) as Arc<dyn Embedder>);

        Self {
            vector,
            lexical,
            graph,
            embedder,
            embedding_dim: config.embedding_dim,
        }
    }
}

/// Build the shared HTTP connection pool used by every backend client
pub fn http_client(timeout_ms: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(concat!("hybrid-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// POST a JSON body and decode a JSON response
pub(crate) async fn post_json<B, T>(
    http: &reqwest::Client,
    backend: BackendKind,
    url: &str,
    body: &B,
    timeout: Duration,
) -> Result<T, BackendError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = http
        .post(url)
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| BackendError::from_reqwest(backend, e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Status {
            backend,
            status: status.as_u16(),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::from_reqwest(backend, e, timeout))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
