//! Hybrid retrieval
//!
//! Dense and lexical candidates are blended with a tunable weight, optionally
//! boosted by graph relevance, and optionally refined by a cross-encoder
//! reranker before truncation.

mod deduplication;
mod fusion;
mod orchestrator;
mod reranker;

pub use deduplication::deduplicate_hits;
pub use fusion::{
    apply_graph_boost, apply_rerank, hybrid_blend, min_max_normalize, rerank_fusion,
    sort_by_score,
};
pub use orchestrator::{QueryError, QueryOrchestrator, QuerySettings};
pub use reranker::{
    FastEmbedScorer, PairScorer, RerankEngine, RerankError, RerankModel, RerankPhase,
    SUPPORTED_RERANK_MODELS,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query as sent by the caller; unset fields take service defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Query text
    #[serde(default)]
    pub query: String,

    /// Tenant isolation key; falls back to the configured default namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Desired result count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,

    /// Dense weight of the hybrid blend, in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f32>,

    /// Overrides the service-wide rerank default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_rerank: Option<bool>,

    /// Number of top candidates handed to the reranker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_topn: Option<usize>,

    /// Result count after reranking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_k: Option<usize>,

    /// Precomputed query embedding; skips the embedder when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn with_rerank(mut self, use_rerank: bool) -> Self {
        self.use_rerank = Some(use_rerank);
        self
    }
}

/// One ranked result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Unique within a namespace; the deduplication key
    pub chunk_id: String,

    pub doc_id: Option<String>,

    pub section_id: Option<String>,

    #[serde(default)]
    pub text: String,

    /// Fused score, comparable across every hit of one response
    pub score: f32,

    /// Cross-encoder relevance in [0, 1], present only when reranking ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,

    /// Backend metadata passed through untouched
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// Body of a successful `/query` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub k: usize,
    pub used_rerank: bool,
    pub hits: Vec<Hit>,
}
