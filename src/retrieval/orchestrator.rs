//! Query orchestration: validation, backend fan-out, fusion and reranking

use crate::backends::{BackendClients, BackendError, BackendKind, BackendQuery, RawHit};
use crate::config::Config;
use crate::error::{join_errors, ValidationError};
use crate::retrieval::{
    apply_graph_boost, apply_rerank, hybrid_blend, sort_by_score, Hit, QueryRequest,
    QueryResponse, RerankEngine,
};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid query: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("All configured backends failed: {}", .failures.join("; "))]
    BackendUnavailable { failures: Vec<String> },
}

/// Service-wide query defaults and limits
#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub default_namespace: Option<String>,
    pub default_k: usize,
    pub default_alpha: f32,
    pub max_k: usize,
    pub candidate_multiplier: usize,
    pub graph_boost_weight: f32,
    pub rerank_by_default: bool,
    pub rerank_topn: usize,
    pub rerank_k: Option<usize>,
    pub backend_timeout: Duration,
}

impl QuerySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_namespace: config.query.default_namespace.clone(),
            default_k: config.query.default_k,
            default_alpha: config.query.default_alpha,
            max_k: config.query.max_k,
            candidate_multiplier: config.query.candidate_multiplier,
            graph_boost_weight: config.query.graph_boost_weight,
            rerank_by_default: config.rerank.enable,
            rerank_topn: config.rerank.topn,
            rerank_k: config.rerank.k,
            backend_timeout: Duration::from_millis(config.backends.timeout_ms),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A request with every default applied and every field validated
#[derive(Debug)]
struct QueryPlan {
    query: String,
    namespace: String,
    k: usize,
    alpha: f32,
    use_rerank: bool,
    rerank_topn: usize,
    rerank_k: usize,
    vector: Option<Vec<f32>>,
}

impl QueryPlan {
    fn resolve(req: QueryRequest, settings: &QuerySettings) -> Result<Self, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let query = req.query.trim().to_string();
        if query.is_empty() {
            errors.push(ValidationError::new("query", "Query cannot be empty"));
        }

        let namespace = match req.namespace.as_deref().map(str::trim) {
            Some("") => {
                errors.push(ValidationError::new("namespace", "Namespace cannot be empty"));
                None
            }
            Some(ns) => Some(ns.to_string()),
            None => {
                if settings.default_namespace.is_none() {
                    errors.push(ValidationError::new(
                        "namespace",
                        "Namespace is required when no default namespace is configured",
                    ));
                }
                settings.default_namespace.clone()
            }
        };

        let k = req.k.unwrap_or(settings.default_k);
        if k == 0 || k > settings.max_k {
            errors.push(ValidationError::new(
                "k",
                format!("k must be between 1 and {}, got {}", settings.max_k, k),
            ));
        }

        let alpha = req.alpha.unwrap_or(settings.default_alpha);
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            errors.push(ValidationError::new(
                "alpha",
                format!("alpha must be between 0.0 and 1.0, got {}", alpha),
            ));
        }

        let rerank_topn = req.rerank_topn.unwrap_or(settings.rerank_topn);
        if rerank_topn == 0 || rerank_topn > settings.max_k {
            errors.push(ValidationError::new(
                "rerank_topn",
                format!("rerank_topn must be between 1 and {}, got {}", settings.max_k, rerank_topn),
            ));
        }

        let rerank_k = req.rerank_k.or(settings.rerank_k).unwrap_or(k);
        if let Some(requested) = req.rerank_k {
            if requested == 0 || requested > settings.max_k {
                errors.push(ValidationError::new(
                    "rerank_k",
                    format!("rerank_k must be between 1 and {}, got {}", settings.max_k, requested),
                ));
            }
        }

        if let Some(vector) = &req.vector {
            if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
                errors.push(ValidationError::new(
                    "vector",
                    "vector must be non-empty and contain only finite values",
                ));
            }
        }

        match namespace {
            Some(namespace) if errors.is_empty() => Ok(Self {
                query,
                namespace,
                k,
                alpha,
                use_rerank: req.use_rerank.unwrap_or(settings.rerank_by_default),
                rerank_topn,
                rerank_k,
                vector: req.vector,
            }),
            _ => Err(errors),
        }
    }

    /// Per-backend fetch size
    fn fetch_limit(&self, multiplier: usize) -> usize {
        let wanted = if self.use_rerank {
            self.k.max(self.rerank_topn).max(self.rerank_k)
        } else {
            self.k
        };
        wanted.saturating_mul(multiplier.max(1))
    }
}

/// Outcome of one backend branch; `None` when the backend is not configured
type Branch = Option<Result<Vec<RawHit>, BackendError>>;

/// Coordinates one query across backends, fusion and reranking
///
/// Holds only shared, read-only state; every call to [`handle`](Self::handle)
/// is independent.
#[derive(Clone)]
pub struct QueryOrchestrator {
    backends: BackendClients,
    reranker: RerankEngine,
    settings: QuerySettings,
}

impl QueryOrchestrator {
    pub fn new(backends: BackendClients, reranker: RerankEngine, settings: QuerySettings) -> Self {
        Self {
            backends,
            reranker,
            settings,
        }
    }

    pub fn backends(&self) -> &BackendClients {
        &self.backends
    }

    pub fn reranker(&self) -> &RerankEngine {
        &self.reranker
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Run one query end to end
    #[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
    pub async fn handle(&self, req: QueryRequest) -> Result<QueryResponse, QueryError> {
        let start = Instant::now();
        metrics::counter!("gateway_query_count").increment(1);

        let plan = match QueryPlan::resolve(req, &self.settings) {
            Ok(plan) => plan,
            Err(errors) => {
                metrics::counter!("gateway_query_failure", "err" => "validation").increment(1);
                tracing::debug!(errors = %join_errors(&errors), "Rejected invalid query");
                return Err(QueryError::Validation(errors));
            }
        };

        let limit = plan.fetch_limit(self.settings.candidate_multiplier);
        let text_query = BackendQuery {
            text: &plan.query,
            vector: None,
            namespace: &plan.namespace,
        };

        // Independent branches; one failing does not cancel the others
        let (dense, lexical, graph) = tokio::join!(
            self.dense_branch(&plan, limit),
            self.text_branch(BackendKind::Lexical, text_query, limit),
            self.text_branch(BackendKind::Graph, text_query, limit),
        );

        let mut responded: Vec<&'static str> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        let dense = self.settle(BackendKind::Vector, dense, &mut responded, &mut failures);
        let lexical = self.settle(BackendKind::Lexical, lexical, &mut responded, &mut failures);
        let candidate_failures = failures.len();
        let graph = self.settle(BackendKind::Graph, graph, &mut responded, &mut failures);

        if dense.is_none() && lexical.is_none() {
            metrics::counter!("gateway_query_failure", "err" => "backend").increment(1);
            tracing::error!(
                namespace = %plan.namespace,
                failures = candidate_failures,
                latency_ms = start.elapsed().as_millis() as u64,
                "Every candidate backend failed"
            );
            return Err(QueryError::BackendUnavailable { failures });
        }

        // First pass: hybrid blend, graph boost
        let mut hits = hybrid_blend(
            dense.unwrap_or_default(),
            lexical.unwrap_or_default(),
            plan.alpha,
        );
        if let Some(graph) = graph {
            apply_graph_boost(&mut hits, graph, self.settings.graph_boost_weight);
        }
        sort_by_score(&mut hits);

        // Second pass: rerank the head of the list
        let used_rerank = plan.use_rerank && self.rerank(&plan, &mut hits).await;
        let limit = if used_rerank { plan.rerank_k } else { plan.k };
        hits.truncate(limit);

        let elapsed = start.elapsed();
        metrics::counter!("gateway_query_success").increment(1);
        metrics::histogram!("gateway_query_duration").record(elapsed.as_secs_f64());
        metrics::histogram!("gateway_query_hits").record(hits.len() as f64);
        tracing::info!(
            namespace = %plan.namespace,
            k = plan.k,
            hits = hits.len(),
            backends = %responded.join(","),
            failed_backends = failures.len(),
            used_rerank,
            latency_ms = elapsed.as_millis() as u64,
            "Query served"
        );

        Ok(QueryResponse {
            query: plan.query,
            k: plan.k,
            used_rerank,
            hits,
        })
    }

    async fn dense_branch(&self, plan: &QueryPlan, limit: usize) -> Branch {
        let backend = self.backends.vector.as_ref()?;
        let timeout = self.settings.backend_timeout;

        let vector = match self.query_vector(plan).await {
            Ok(vector) => vector,
            Err(e) => return Some(Err(e)),
        };
        let query = BackendQuery {
            text: &plan.query,
            vector: Some(&vector),
            namespace: &plan.namespace,
        };

        Some(timed(backend.kind(), timeout, backend.search(query, limit)).await)
    }

    async fn text_branch(&self, kind: BackendKind, query: BackendQuery<'_>, limit: usize) -> Branch {
        let backend = match kind {
            BackendKind::Lexical => self.backends.lexical.as_ref()?,
            BackendKind::Graph => self.backends.graph.as_ref()?,
            _ => return None,
        };

        Some(timed(backend.kind(), self.settings.backend_timeout, backend.search(query, limit)).await)
    }

    async fn query_vector(&self, plan: &QueryPlan) -> Result<Vec<f32>, BackendError> {
        let vector = match (&plan.vector, &self.backends.embedder) {
            (Some(vector), _) => vector.clone(),
            (None, Some(embedder)) => {
                timed(
                    BackendKind::Embedder,
                    self.settings.backend_timeout,
                    embedder.embed(&plan.query),
                )
                .await?
            }
            (None, None) => return Err(BackendError::MissingVector),
        };

        match self.backends.embedding_dim {
            Some(expected) if expected != vector.len() => Err(BackendError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            _ => Ok(vector),
        }
    }

    fn settle(
        &self,
        kind: BackendKind,
        branch: Branch,
        responded: &mut Vec<&'static str>,
        failures: &mut Vec<String>,
    ) -> Option<Vec<RawHit>> {
        match branch? {
            Ok(hits) => {
                responded.push(kind.as_str());
                Some(hits)
            }
            Err(e) => {
                metrics::counter!("gateway_backend_failure", "backend" => kind.as_str())
                    .increment(1);
                tracing::warn!(backend = kind.as_str(), error = %e, "Backend failed; excluded from fusion");
                failures.push(e.to_string());
                None
            }
        }
    }

    /// Rerank the top `rerank_topn` hits in place; returns whether it ran
    async fn rerank(&self, plan: &QueryPlan, hits: &mut Vec<Hit>) -> bool {
        if hits.is_empty() {
            return false;
        }

        let head = plan.rerank_topn.min(hits.len());
        let texts: Vec<String> = hits[..head].iter().map(|h| h.text.clone()).collect();

        match self.reranker.score_pairs(&plan.query, texts).await {
            Ok(scores) => {
                hits.truncate(head);
                apply_rerank(hits, &scores);
                sort_by_score(hits);
                metrics::counter!("gateway_rerank_count").increment(1);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rerank skipped");
                false
            }
        }
    }
}

async fn timed<T, F>(kind: BackendKind, timeout: Duration, fut: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout {
            backend: kind,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> QuerySettings {
        QuerySettings {
            default_namespace: None,
            ..QuerySettings::default()
        }
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let mut settings = settings();
        settings.default_namespace = Some("public".to_string());
        settings.rerank_k = Some(3);

        let plan = QueryPlan::resolve(
            QueryRequest {
                query: "  broker restart ".to_string(),
                ..Default::default()
            },
            &settings,
        )
        .unwrap();

        assert_eq!(plan.query, "broker restart");
        assert_eq!(plan.namespace, "public");
        assert_eq!(plan.k, 10);
        assert!((plan.alpha - 0.7).abs() < f32::EPSILON);
        assert!(!plan.use_rerank);
        assert_eq!(plan.rerank_topn, 50);
        assert_eq!(plan.rerank_k, 3);
    }

    #[test]
    fn test_rerank_k_falls_back_to_k() {
        let plan = QueryPlan::resolve(QueryRequest::new("q", "ns").with_k(4), &settings()).unwrap();
        assert_eq!(plan.rerank_k, 4);
    }

    #[test]
    fn test_resolve_reports_every_field() {
        let req = QueryRequest {
            query: "   ".to_string(),
            namespace: None,
            k: Some(0),
            alpha: Some(1.5),
            rerank_topn: Some(0),
            ..Default::default()
        };

        let errors = QueryPlan::resolve(req, &settings()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(fields, vec!["query", "namespace", "k", "alpha", "rerank_topn"]);
    }

    #[test]
    fn test_rerank_sizes_capped_by_max_k() {
        let req = QueryRequest {
            rerank_topn: Some(1_000_000_000),
            rerank_k: Some(1_000_000_000),
            ..QueryRequest::new("q", "ns").with_rerank(true)
        };

        let errors = QueryPlan::resolve(req, &settings()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(fields, vec!["rerank_topn", "rerank_k"]);

        let req = QueryRequest {
            rerank_topn: Some(100),
            rerank_k: Some(100),
            ..QueryRequest::new("q", "ns").with_rerank(true)
        };
        let plan = QueryPlan::resolve(req, &settings()).unwrap();
        assert_eq!(plan.fetch_limit(2), 200);
    }

    #[test]
    fn test_blank_namespace_is_rejected() {
        let mut settings = settings();
        settings.default_namespace = Some("public".to_string());

        let errors = QueryPlan::resolve(QueryRequest::new("q", "   "), &settings).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "namespace");
    }

    #[test]
    fn test_k_above_maximum() {
        let errors =
            QueryPlan::resolve(QueryRequest::new("q", "ns").with_k(10_000), &settings()).unwrap_err();
        assert_eq!(errors[0].path, "k");
    }

    #[test]
    fn test_fetch_limit() {
        let plan = QueryPlan::resolve(QueryRequest::new("q", "ns").with_k(5), &settings()).unwrap();
        assert_eq!(plan.fetch_limit(2), 10);

        let plan = QueryPlan::resolve(
            QueryRequest::new("q", "ns").with_k(5).with_rerank(true),
            &settings(),
        )
        .unwrap();
        assert_eq!(plan.fetch_limit(2), 100);
    }
}
