//! Query embedder trait and HTTP implementation
use crate::backends::{join_url, post_json, BackendError, BackendKind};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Turns query text into the dense vector consumed by the vector index
///
/// The gateway treats the embedder as a black box; only the output length is
/// checked against the configured dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;
}

/// Embedder speaking the text-embeddings-inference `/embed` protocol
pub struct HttpEmbedder {
    http: reqwest::Client,
    embed_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a str,
    truncate: bool,
}

impl HttpEmbedder {
    pub fn new(http: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            embed_url: join_url(base_url, "embed"),
            timeout,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let request = EmbedRequest {
            inputs: text,
            truncate: true,
        };

        let mut embeddings: Vec<Vec<f32>> =
            post_json(&self.http, BackendKind::Embedder, &self.embed_url, &request, self.timeout)
                .await?;

        if embeddings.is_empty() {
            return Err(BackendError::Decode {
                backend: BackendKind::Embedder,
                message: "empty embedding batch".to_string(),
            });
        }

        Ok(embeddings.swap_remove(0))
    }
}
