#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use hybrid_gateway::backends::{
    BackendClients, BackendError, BackendKind, BackendQuery, RawHit, SearchBackend,
};
use hybrid_gateway::http::{router, AppState};
use hybrid_gateway::retrieval::{
    PairScorer, QueryOrchestrator, QuerySettings, RerankEngine, RerankError,
};
use hybrid_gateway::trust::TrustConfig;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Backend returning a fixed list, truncated to the requested limit
pub struct StaticBackend {
    kind: BackendKind,
    hits: Vec<RawHit>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StaticBackend {
    pub fn new(kind: BackendKind, hits: Vec<RawHit>) -> Self {
        Self {
            kind,
            hits,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SearchBackend for StaticBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn search(&self, _query: BackendQuery<'_>, limit: usize) -> Result<Vec<RawHit>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

/// Backend that is always down
pub struct DownBackend(pub BackendKind);

#[async_trait]
impl SearchBackend for DownBackend {
    fn kind(&self) -> BackendKind {
        self.0
    }

    async fn search(&self, _query: BackendQuery<'_>, _limit: usize) -> Result<Vec<RawHit>, BackendError> {
        Err(BackendError::Unavailable {
            backend: self.0,
            message: "connection refused".to_string(),
        })
    }
}

/// Scores 1.0 when the text shares a word with the query, else 0.0
pub struct KeywordScorer;

impl PairScorer for KeywordScorer {
    fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankError> {
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                if words.iter().any(|w| t.contains(w.as_str())) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect())
    }
}

/// Loads fine, then fails every scoring call
pub struct FailingScorer;

impl PairScorer for FailingScorer {
    fn score_pairs(&self, _query: &str, _texts: &[String]) -> Result<Vec<f32>, RerankError> {
        Err(RerankError::Scoring("onnx session error".to_string()))
    }
}

/// Loads fine, then takes a full second per scoring call
pub struct StallingScorer;

impl PairScorer for StallingScorer {
    fn score_pairs(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>, RerankError> {
        std::thread::sleep(Duration::from_secs(1));
        Ok(vec![1.0; texts.len()])
    }
}

pub fn hit(id: &str, score: f32, text: &str) -> RawHit {
    RawHit::new(id, score).with_text(text)
}

pub fn keyword_reranker() -> RerankEngine {
    RerankEngine::with_loader("test-keyword", Duration::from_secs(2), |_| {
        Ok(Arc::new(KeywordScorer) as Arc<dyn PairScorer>)
    })
}

pub fn broken_reranker() -> RerankEngine {
    RerankEngine::with_loader("test-broken", Duration::from_secs(2), |_| {
        Err(RerankError::Initialization("model files missing".to_string()))
    })
}

pub fn reranker_with(scorer: Arc<dyn PairScorer>, timeout: Duration) -> RerankEngine {
    RerankEngine::with_loader("test-scorer", timeout, move |_| Ok(scorer.clone()))
}

/// Reranker whose model takes `load_time` to load
pub fn slow_loading_reranker(load_time: Duration, timeout: Duration) -> RerankEngine {
    RerankEngine::with_loader("test-slow-load", timeout, move |_| {
        std::thread::sleep(load_time);
        Ok(Arc::new(KeywordScorer) as Arc<dyn PairScorer>)
    })
}

pub fn settings() -> QuerySettings {
    QuerySettings {
        default_namespace: Some("public".to_string()),
        backend_timeout: Duration::from_millis(200),
        ..QuerySettings::default()
    }
}

pub fn clients(
    vector: Option<Arc<dyn SearchBackend>>,
    lexical: Option<Arc<dyn SearchBackend>>,
    graph: Option<Arc<dyn SearchBackend>>,
) -> BackendClients {
    BackendClients {
        vector,
        lexical,
        graph,
        ..BackendClients::default()
    }
}

pub fn app(backends: BackendClients, reranker: RerankEngine, trust: TrustConfig) -> Router {
    let orchestrator = QueryOrchestrator::new(backends, reranker, settings());
    router(AppState::new(orchestrator, trust))
}

/// A lexical-only gateway with an open trust boundary
pub fn lexical_app(hits: Vec<RawHit>) -> Router {
    let lexical = Arc::new(StaticBackend::new(BackendKind::Lexical, hits)) as Arc<dyn SearchBackend>;
    app(clients(None, Some(lexical), None), keyword_reranker(), TrustConfig::default())
}

pub fn get(uri: &str, peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(xff) = forwarded_for {
        builder = builder.header("x-forwarded-for", xff);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    request.extensions_mut().insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
    request
}

pub fn post_query(body: Value, peer: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
    request
}

/// Send one request through the router and decode the JSON body
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}
