//! Lexical index client (OpenSearch / Elasticsearch `_search`)
use crate::backends::{
    join_url, post_json, BackendError, BackendKind, BackendQuery, RawHit, SearchBackend,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Client for one index, e.g. `http://opensearch:9200/chunks`
pub struct LexicalIndexClient {
    http: reqwest::Client,
    search_url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Document>,
}

#[derive(Deserialize)]
struct Document {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

impl LexicalIndexClient {
    pub fn new(http: reqwest::Client, index_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            search_url: join_url(index_url, "_search"),
            timeout,
        }
    }

    fn request_body(query: &BackendQuery<'_>, limit: usize) -> Value {
        json!({
            "size": limit,
            "query": {
                "bool": {
                    "must": [{ "match": { "text": query.text } }],
                    "filter": [{ "term": { "namespace": query.namespace } }]
                }
            }
        })
    }
}

#[async_trait]
impl SearchBackend for LexicalIndexClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Lexical
    }

    async fn search(&self, query: BackendQuery<'_>, limit: usize) -> Result<Vec<RawHit>, BackendError> {
        let body = Self::request_body(&query, limit);

        let response: SearchResponse =
            post_json(&self.http, BackendKind::Lexical, &self.search_url, &body, self.timeout)
                .await?;

        Ok(response
            .hits
            .hits
            .into_iter()
            .map(|doc| RawHit::from_payload(doc.id, doc.score.unwrap_or(0.0), doc.source))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_filters_namespace() {
        let query = BackendQuery {
            text: "broker restart",
            vector: None,
            namespace: "acme",
        };
        let body = LexicalIndexClient::request_body(&query, 15);

        assert_eq!(body["size"], 15);
        assert_eq!(
            body["query"]["bool"]["filter"][0]["term"]["namespace"],
            "acme"
        );
        assert_eq!(
            body["query"]["bool"]["must"][0]["match"]["text"],
            "broker restart"
        );
    }

    #[test]
    fn test_response_decode() {
        let response: SearchResponse = serde_json::from_value(json!({
            "took": 3,
            "hits": {
                "total": {"value": 1},
                "hits": [{
                    "_index": "chunks",
                    "_id": "c-9",
                    "_score": 7.25,
                    "_source": {"text": "broker restart steps", "namespace": "acme"}
                }]
            }
        }))
        .unwrap();

        assert_eq!(response.hits.hits.len(), 1);
        assert_eq!(response.hits.hits[0].id, "c-9");
        assert_eq!(response.hits.hits[0].score, Some(7.25));
    }
}
