//! Graph store relevance booster client
use crate::backends::{
    join_url, post_json, BackendError, BackendKind, BackendQuery, RawHit, SearchBackend,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for the graph booster endpoint (`POST {base}/boost`)
pub struct GraphStoreClient {
    http: reqwest::Client,
    boost_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct BoostRequest<'a> {
    query: &'a str,
    namespace: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
struct BoostResponse {
    #[serde(default)]
    hits: Vec<BoostHit>,
}

#[derive(Deserialize)]
struct BoostHit {
    chunk_id: String,
    score: f32,
}

impl GraphStoreClient {
    pub fn new(http: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            boost_url: join_url(base_url, "boost"),
            timeout,
        }
    }
}

#[async_trait]
impl SearchBackend for GraphStoreClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    async fn search(&self, query: BackendQuery<'_>, limit: usize) -> Result<Vec<RawHit>, BackendError> {
        let request = BoostRequest {
            query: query.text,
            namespace: query.namespace,
            limit,
        };

        let response: BoostResponse =
            post_json(&self.http, BackendKind::Graph, &self.boost_url, &request, self.timeout)
                .await?;

        Ok(response
            .hits
            .into_iter()
            .map(|hit| RawHit::new(hit.chunk_id, hit.score))
            .collect())
    }
}
