use crate::config::Config;
use crate::error::{GatewayError, Result, ValidationError};
use crate::trust::parse_network;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every invalid key at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_server(config, &mut errors);
        Self::validate_backends(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_trust(config, &mut errors);
        Self::validate_query(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.server.host.is_empty() {
            errors.push(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_backends(config: &Config, errors: &mut Vec<ValidationError>) {
        if !config.has_candidate_backend() {
            errors.push(ValidationError::new(
                "backends",
                "At least one of VECTOR_INDEX_URL or LEXICAL_INDEX_URL must be set",
            ));
        }

        let urls = [
            ("backends.vector_index_url", &config.backends.vector_index_url),
            ("backends.lexical_index_url", &config.backends.lexical_index_url),
            ("backends.graph_store_url", &config.backends.graph_store_url),
            ("backends.embedder_url", &config.backends.embedder_url),
        ];
        for (path, url) in urls {
            if let Some(url) = url {
                if let Err(e) = reqwest::Url::parse(url) {
                    errors.push(ValidationError::new(
                        path,
                        format!("Invalid URL '{}': {}", url, e),
                    ));
                }
            }
        }

        if config.backends.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "backends.timeout_ms",
                "Backend timeout must be greater than 0",
            ));
        }

        if config.backends.embedding_dim == Some(0) {
            errors.push(ValidationError::new(
                "backends.embedding_dim",
                "Embedding dimension must be greater than 0",
            ));
        }

        if config.backends.vector_index_url.is_some() && config.backends.embedder_url.is_none() {
            tracing::warn!(
                "Vector index configured without EMBEDDER_URL; dense search requires callers to supply query vectors"
            );
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.rerank.model.is_empty() {
            errors.push(ValidationError::new(
                "rerank.model",
                "Model name cannot be empty",
            ));
        }

        let max_k = config.query.max_k;
        if config.rerank.topn == 0 {
            errors.push(ValidationError::new(
                "rerank.topn",
                "Rerank candidate count must be greater than 0",
            ));
        } else if config.rerank.topn > max_k {
            errors.push(ValidationError::new(
                "rerank.topn",
                format!("Rerank candidate count cannot exceed query.max_k ({})", max_k),
            ));
        }

        match config.rerank.k {
            Some(0) => errors.push(ValidationError::new(
                "rerank.k",
                "Rerank result count must be greater than 0",
            )),
            Some(k) if k > max_k => errors.push(ValidationError::new(
                "rerank.k",
                format!("Rerank result count cannot exceed query.max_k ({})", max_k),
            )),
            _ => {}
        }

        if config.rerank.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "rerank.timeout_ms",
                "Rerank timeout must be greater than 0",
            ));
        }
    }

    fn validate_trust(config: &Config, errors: &mut Vec<ValidationError>) {
        for (i, cidr) in config.trust.trusted_proxy_cidrs.iter().enumerate() {
            if let Err(e) = parse_network(cidr) {
                errors.push(ValidationError::new(
                    format!("trust.trusted_proxy_cidrs[{}]", i),
                    format!("Invalid network '{}': {}", cidr, e),
                ));
            }
        }

        let gated = config.trust.require_trust_for_all || config.trust.require_trust_for_admin_only;
        if gated && config.trust.trusted_proxy_cidrs.is_empty() {
            tracing::warn!("Trust gate enabled with no trusted networks; gated routes will reject every caller");
        }
    }

    fn validate_query(config: &Config, errors: &mut Vec<ValidationError>) {
        let alpha = config.query.default_alpha;
        if !(0.0..=1.0).contains(&alpha) {
            errors.push(ValidationError::new(
                "query.default_alpha",
                format!("Alpha must be between 0.0 and 1.0, got {}", alpha),
            ));
        }

        if config.query.max_k == 0 {
            errors.push(ValidationError::new(
                "query.max_k",
                "Maximum result count must be greater than 0",
            ));
        }

        if config.query.default_k == 0 || config.query.default_k > config.query.max_k {
            errors.push(ValidationError::new(
                "query.default_k",
                format!(
                    "Default result count must be between 1 and {}, got {}",
                    config.query.max_k, config.query.default_k
                ),
            ));
        }

        if config.query.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "query.candidate_multiplier",
                "Candidate multiplier must be greater than 0",
            ));
        }

        let weight = config.query.graph_boost_weight;
        if !weight.is_finite() || weight < 0.0 {
            errors.push(ValidationError::new(
                "query.graph_boost_weight",
                format!("Graph boost weight must be a non-negative number, got {}", weight),
            ));
        }

        if let Some(ns) = &config.query.default_namespace {
            if ns.trim().is_empty() {
                errors.push(ValidationError::new(
                    "query.default_namespace",
                    "Default namespace cannot be blank",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexical_only() -> Config {
        let mut config = Config::default();
        config.backends.lexical_index_url = Some("http://localhost:9200/chunks".to_string());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(ConfigValidator::validate(&lexical_only()).is_ok());
    }

    #[test]
    fn test_no_candidate_backend() {
        let mut config = Config::default();
        config.backends.graph_store_url = Some("http://localhost:7474".to_string());
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_cidr_reports_index() {
        let mut config = lexical_only();
        config.trust.trusted_proxy_cidrs = vec!["10.0.0.0/8".to_string(), "10.0.0/33".to_string()];

        match ConfigValidator::validate(&config) {
            Err(GatewayError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, "trust.trusted_proxy_cidrs[1]");
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_rerank_sizes_bounded_by_max_k() {
        let mut config = lexical_only();
        config.query.max_k = 20;
        config.rerank.k = Some(25);

        match ConfigValidator::validate(&config) {
            Err(GatewayError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert_eq!(paths, vec!["rerank.topn", "rerank.k"]);
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = lexical_only();
        config.query.default_alpha = 1.5;
        config.rerank.topn = 0;
        config.backends.timeout_ms = 0;

        match ConfigValidator::validate(&config) {
            Err(GatewayError::ConfigValidation { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
