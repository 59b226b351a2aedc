//! Configuration management for the gateway
//!
//! Configuration is assembled once at startup: built-in defaults, then an
//! optional TOML file, then the recognized environment variables. The result
//! is validated as a whole and is immutable for the lifetime of the process.

use crate::error::{GatewayError, Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub server: ServerConfig,
    pub backends: BackendsConfig,
    pub rerank: RerankConfig,
    pub trust: TrustSettings,
    pub query: QueryConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Backend endpoints; an absent URL disables that backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_index_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_index_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_store_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedder_url: Option<String>,
    /// Expected query vector length; unchecked when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<usize>,
    /// Per-call timeout for every backend request
    pub timeout_ms: u64,
}

/// Cross-encoder reranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Service-wide default for `use_rerank`; also triggers eager model loading
    pub enable: bool,
    pub model: String,
    /// Number of top candidates handed to the reranker
    pub topn: usize,
    /// Result count after reranking; falls back to the request `k`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    pub timeout_ms: u64,
}

/// Raw trust boundary settings as written in configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustSettings {
    pub require_trust_for_all: bool,
    pub require_trust_for_admin_only: bool,
    pub trusted_proxy_cidrs: Vec<String>,
}

/// Query defaults and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_namespace: Option<String>,
    pub default_k: usize,
    pub default_alpha: f32,
    pub max_k: usize,
    /// Backend fetch size is the wanted result count times this factor
    pub candidate_multiplier: usize,
    pub graph_boost_weight: f32,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GatewayError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| GatewayError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides()?;
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Build configuration from defaults and the process environment only
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `(KEY, value)` overrides, collecting every unparsable value
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut errors = Vec::new();
        for (key, value) in vars {
            if let Err(e) = self.set_value_from_env(&key, &value) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::ConfigValidation { errors })
        }
    }

    fn set_value_from_env(&mut self, key: &str, value: &str) -> std::result::Result<(), ValidationError> {
        match key {
            "VECTOR_INDEX_URL" => self.backends.vector_index_url = non_empty(value),
            "LEXICAL_INDEX_URL" => self.backends.lexical_index_url = non_empty(value),
            "GRAPH_STORE_URL" => self.backends.graph_store_url = non_empty(value),
            "EMBEDDER_URL" => self.backends.embedder_url = non_empty(value),
            "EMBEDDING_DIM" => {
                self.backends.embedding_dim = match non_empty(value) {
                    Some(v) => Some(parse_number(key, &v)?),
                    None => None,
                }
            }
            "BACKEND_TIMEOUT_MS" => self.backends.timeout_ms = parse_number(key, value)?,
            "RERANK_ENABLE" => self.rerank.enable = parse_bool(key, value)?,
            "RERANK_MODEL" => self.rerank.model = value.trim().to_string(),
            "RERANK_TOPN" => self.rerank.topn = parse_number(key, value)?,
            "RERANK_K" => {
                self.rerank.k = match non_empty(value) {
                    Some(v) => Some(parse_number(key, &v)?),
                    None => None,
                }
            }
            "RERANK_TIMEOUT_MS" => self.rerank.timeout_ms = parse_number(key, value)?,
            "TRUST_ALL_REQUIRED" => self.trust.require_trust_for_all = parse_bool(key, value)?,
            "TRUST_ADMIN_ONLY_REQUIRED" => {
                self.trust.require_trust_for_admin_only = parse_bool(key, value)?
            }
            "TRUSTED_PROXY_CIDRS" => {
                self.trust.trusted_proxy_cidrs = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            }
            "DEFAULT_NAMESPACE" => self.query.default_namespace = non_empty(value),
            "QUERY_DEFAULT_ALPHA" => self.query.default_alpha = parse_number(key, value)?,
            "QUERY_MAX_K" => self.query.max_k = parse_number(key, value)?,
            "QUERY_CANDIDATE_MULTIPLIER" => {
                self.query.candidate_multiplier = parse_number(key, value)?
            }
            "GRAPH_BOOST_WEIGHT" => self.query.graph_boost_weight = parse_number(key, value)?,
            "GATEWAY_HOST" => self.server.host = value.trim().to_string(),
            "GATEWAY_PORT" => self.server.port = parse_number(key, value)?,
            _ => {}
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| GatewayError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("hybrid-gateway").join("config.toml"))
    }

    /// Whether at least one backend able to produce candidates is configured
    pub fn has_candidate_backend(&self) -> bool {
        self.backends.vector_index_url.is_some() || self.backends.lexical_index_url.is_some()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ValidationError::new(
            key,
            format!("Cannot parse '{}' as boolean", other),
        )),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> std::result::Result<T, ValidationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ValidationError::new(key, format!("Cannot parse '{}' as a number", value)))
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            vector_index_url: None,
            lexical_index_url: None,
            graph_store_url: None,
            embedder_url: None,
            embedding_dim: None,
            timeout_ms: 2000,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enable: false,
            model: "BAAI/bge-reranker-base".to_string(),
            topn: 50,
            k: None,
            timeout_ms: 5000,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_namespace: None,
            default_k: 10,
            default_alpha: 0.7,
            max_k: 100,
            candidate_multiplier: 2,
            graph_boost_weight: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(vars(&[
                ("VECTOR_INDEX_URL", "http://qdrant:6333/collections/chunks"),
                ("LEXICAL_INDEX_URL", ""),
                ("RERANK_ENABLE", "true"),
                ("RERANK_TOPN", "25"),
                ("RERANK_K", "5"),
                ("TRUSTED_PROXY_CIDRS", "10.10.0.1/32, 100.64.0.0/10,"),
                ("TRUST_ADMIN_ONLY_REQUIRED", "1"),
                ("DEFAULT_NAMESPACE", "acme"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();

        assert_eq!(
            config.backends.vector_index_url.as_deref(),
            Some("http://qdrant:6333/collections/chunks")
        );
        assert!(config.backends.lexical_index_url.is_none());
        assert!(config.rerank.enable);
        assert_eq!(config.rerank.topn, 25);
        assert_eq!(config.rerank.k, Some(5));
        assert_eq!(
            config.trust.trusted_proxy_cidrs,
            vec!["10.10.0.1/32".to_string(), "100.64.0.0/10".to_string()]
        );
        assert!(config.trust.require_trust_for_admin_only);
        assert!(!config.trust.require_trust_for_all);
        assert_eq!(config.query.default_namespace.as_deref(), Some("acme"));
    }

    #[test]
    fn test_env_override_errors_are_collected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(vars(&[("RERANK_ENABLE", "maybe"), ("RERANK_TOPN", "lots")]))
            .unwrap_err();

        match err {
            GatewayError::ConfigValidation { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].path, "RERANK_ENABLE");
                assert_eq!(errors[1].path, "RERANK_TOPN");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [backends]
            lexical_index_url = "http://opensearch:9200/chunks"

            [query]
            default_alpha = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backends.timeout_ms, 2000);
        assert_eq!(config.query.default_alpha, 0.5);
        assert_eq!(config.query.max_k, 100);
        assert!(config.has_candidate_backend());
    }
}
