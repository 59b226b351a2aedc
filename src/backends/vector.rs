//! Dense vector index client (Qdrant points search)
use crate::backends::{
    join_url, post_json, BackendError, BackendKind, BackendQuery, RawHit, SearchBackend,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Client for one vector collection, e.g. `http://qdrant:6333/collections/chunks`
pub struct VectorIndexClient {
    http: reqwest::Client,
    search_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    filter: Filter<'a>,
}

#[derive(Serialize)]
struct Filter<'a> {
    must: [FieldCondition<'a>; 1],
}

#[derive(Serialize)]
struct FieldCondition<'a> {
    key: &'static str,
    #[serde(rename = "match")]
    matches: MatchValue<'a>,
}

#[derive(Serialize)]
struct MatchValue<'a> {
    value: &'a str,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl VectorIndexClient {
    pub fn new(http: reqwest::Client, collection_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            search_url: join_url(collection_url, "points/search"),
            timeout,
        }
    }
}

#[async_trait]
impl SearchBackend for VectorIndexClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    async fn search(&self, query: BackendQuery<'_>, limit: usize) -> Result<Vec<RawHit>, BackendError> {
        let vector = query.vector.ok_or(BackendError::MissingVector)?;

        let request = SearchRequest {
            vector,
            limit,
            with_payload: true,
            filter: Filter {
                must: [FieldCondition {
                    key: "namespace",
                    matches: MatchValue {
                        value: query.namespace,
                    },
                }],
            },
        };

        let response: SearchResponse =
            post_json(&self.http, BackendKind::Vector, &self.search_url, &request, self.timeout)
                .await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let id = match point.id {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                RawHit::from_payload(id, point.score, point.payload.unwrap_or_default())
            })
            .collect())
    }
}
