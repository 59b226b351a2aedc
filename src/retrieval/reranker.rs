//! Cross-encoder reranking using FastEmbed
//!
//! The model is held by a [`RerankEngine`] owned by the service state. It moves
//! through `Uninitialized -> Loading -> {Loaded | Unavailable}` exactly once;
//! a failed load is permanent for the process lifetime.

use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OnceCell, Semaphore};

/// Scoring jobs allowed on the blocking pool at once
pub const DEFAULT_MAX_CONCURRENT_SCORING: usize = 4;

/// Model identifiers accepted by [`FastEmbedScorer::load`]
pub const SUPPORTED_RERANK_MODELS: &[&str] = &[
    "BAAI/bge-reranker-base",
    "rozgo/bge-reranker-v2-m3",
    "jinaai/jina-reranker-v1-turbo-en",
];

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    Initialization(String),

    #[error("Unsupported rerank model: {0}")]
    UnsupportedModel(String),

    #[error("Reranker unavailable: {0}")]
    Unavailable(String),

    #[error("Reranking failed: {0}")]
    Scoring(String),

    #[error("Reranking timed out after {0:?}")]
    Timeout(Duration),
}

/// A pairwise relevance scorer
///
/// Returns one score in [0, 1] per text, in input order.
pub trait PairScorer: Send + Sync {
    fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankError>;
}

/// Cross-encoder scorer backed by a FastEmbed ONNX reranker
pub struct FastEmbedScorer {
    model: TextRerank,
}

impl FastEmbedScorer {
    /// Load a reranker model
    ///
    /// **Important**: models are downloaded on first use into the FastEmbed
    /// cache directory. This blocks; call it from a blocking context.
    pub fn load(model_id: &str) -> Result<Self, RerankError> {
        let model = match model_id {
            "BAAI/bge-reranker-base" => RerankerModel::BGERerankerBase,
            "rozgo/bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            "jinaai/jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
            other => return Err(RerankError::UnsupportedModel(other.to_string())),
        };

        tracing::info!("Initializing reranker model: {}", model_id);

        let init_options = RerankInitOptions::new(model).with_show_download_progress(false);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::Initialization(e.to_string()))?;

        Ok(Self { model })
    }
}

impl PairScorer for FastEmbedScorer {
    fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let results = self
            .model
            .rerank(query, documents, false, None)
            .map_err(|e| RerankError::Scoring(e.to_string()))?;

        // FastEmbed returns logits sorted by score; restore input order
        let mut scores = vec![0.0; texts.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = sigmoid(result.score);
            }
        }

        Ok(scores)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Terminal state of the model handle
#[derive(Clone)]
pub enum RerankModel {
    Loaded(Arc<dyn PairScorer>),
    Unavailable(String),
}

/// Observable lifecycle phase, for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankPhase {
    Uninitialized,
    Loading,
    Loaded,
    Unavailable,
}

impl RerankPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankPhase::Uninitialized => "uninitialized",
            RerankPhase::Loading => "loading",
            RerankPhase::Loaded => "loaded",
            RerankPhase::Unavailable => "unavailable",
        }
    }
}

type Loader = dyn Fn(&str) -> Result<Arc<dyn PairScorer>, RerankError> + Send + Sync;

struct EngineInner {
    model_id: String,
    loader: Box<Loader>,
    model: OnceCell<RerankModel>,
    loading: AtomicBool,
    timeout: Duration,
}

impl EngineInner {
    async fn init(self: Arc<Self>) -> RerankModel {
        let inner = self.clone();
        self.model
            .get_or_init(|| async move {
                inner.loading.store(true, Ordering::SeqCst);

                let loader_inner = inner.clone();
                let loaded =
                    tokio::task::spawn_blocking(move || (loader_inner.loader)(&loader_inner.model_id))
                        .await;

                let model = match loaded {
                    Ok(Ok(scorer)) => {
                        tracing::info!(model = %inner.model_id, "Reranker loaded");
                        RerankModel::Loaded(scorer)
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(model = %inner.model_id, error = %e, "Reranker unavailable; reranking disabled");
                        RerankModel::Unavailable(e.to_string())
                    }
                    Err(e) => {
                        tracing::error!(model = %inner.model_id, error = %e, "Reranker loader panicked; reranking disabled");
                        RerankModel::Unavailable(format!("loader panicked: {}", e))
                    }
                };

                inner.loading.store(false, Ordering::SeqCst);
                model
            })
            .await
            .clone()
    }
}

/// Process-wide reranker handle
///
/// Cheap to clone; every clone shares one model. Initialization runs at most
/// once, on a detached task so that a cancelled request cannot abandon it.
/// Each scoring job holds a permit until the blocking work returns, even when
/// its caller has already timed out.
#[derive(Clone)]
pub struct RerankEngine {
    inner: Arc<EngineInner>,
    scoring: Arc<Semaphore>,
}

impl RerankEngine {
    /// Engine backed by a FastEmbed cross-encoder
    pub fn new(model_id: impl Into<String>, timeout: Duration) -> Self {
        Self::with_loader(model_id, timeout, |id| {
            FastEmbedScorer::load(id).map(|s| Arc::new(s) as Arc<dyn PairScorer>)
        })
    }

    /// Engine with a custom model loader
    pub fn with_loader<F>(model_id: impl Into<String>, timeout: Duration, loader: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn PairScorer>, RerankError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(EngineInner {
                model_id: model_id.into(),
                loader: Box::new(loader),
                model: OnceCell::new(),
                loading: AtomicBool::new(false),
                timeout,
            }),
            scoring: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_SCORING)),
        }
    }

    /// Limit how many scoring jobs may run on the blocking pool at once
    pub fn with_max_concurrent_scoring(mut self, permits: usize) -> Self {
        self.scoring = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    pub fn model_id(&self) -> &str {
        &self.inner.model_id
    }

    pub fn phase(&self) -> RerankPhase {
        match self.inner.model.get() {
            Some(RerankModel::Loaded(_)) => RerankPhase::Loaded,
            Some(RerankModel::Unavailable(_)) => RerankPhase::Unavailable,
            None if self.inner.loading.load(Ordering::SeqCst) => RerankPhase::Loading,
            None => RerankPhase::Uninitialized,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.phase() == RerankPhase::Loaded
    }

    /// Reason the model is unavailable, once it is known to be
    pub fn unavailable_reason(&self) -> Option<&str> {
        match self.inner.model.get() {
            Some(RerankModel::Unavailable(reason)) => Some(reason),
            _ => None,
        }
    }

    /// Load the model if that has not happened yet; concurrent callers share one load
    pub async fn ensure_loaded(&self) -> RerankModel {
        if let Some(model) = self.inner.model.get() {
            return model.clone();
        }

        let inner = self.inner.clone();
        match tokio::spawn(inner.init()).await {
            Ok(model) => model,
            Err(e) => RerankModel::Unavailable(format!("initialization task failed: {}", e)),
        }
    }

    /// Start loading in the background without waiting for it
    pub fn preload(&self) {
        if self.inner.model.initialized() {
            return;
        }
        tokio::spawn(self.inner.clone().init());
    }

    /// Score `texts` against `query`, one score in [0, 1] per text
    ///
    /// The timeout covers the whole call, including waiting for the model to
    /// load. A load still running when it expires carries on in the background.
    pub async fn score_pairs(&self, query: &str, texts: Vec<String>) -> Result<Vec<f32>, RerankError> {
        let timeout = self.inner.timeout;
        match tokio::time::timeout(timeout, self.run_scorer(query, texts)).await {
            Ok(result) => result,
            Err(_) => Err(RerankError::Timeout(timeout)),
        }
    }

    async fn run_scorer(&self, query: &str, texts: Vec<String>) -> Result<Vec<f32>, RerankError> {
        let scorer = match self.ensure_loaded().await {
            RerankModel::Loaded(scorer) => scorer,
            RerankModel::Unavailable(reason) => return Err(RerankError::Unavailable(reason)),
        };

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let permit = self
            .scoring
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RerankError::Unavailable(e.to_string()))?;

        let expected = texts.len();
        let query = query.to_string();
        let scores = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            scorer.score_pairs(&query, &texts)
        })
        .await
        .map_err(|e| RerankError::Scoring(e.to_string()))??;

        if scores.len() != expected {
            return Err(RerankError::Scoring(format!(
                "expected {} scores, got {}",
                expected,
                scores.len()
            )));
        }

        Ok(scores
            .into_iter()
            .map(|s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 })
            .collect())
    }
}
