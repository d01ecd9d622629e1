mod llm;
mod pipeline;
mod retrieval;
mod server;
mod transport;

pub use llm::*;
pub use pipeline::*;
pub use retrieval::*;
pub use server::*;
pub use transport::*;

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        // A relational store or external queue needs a database URL.
        let needs_db = self.transport.store_backend == StoreBackend::Relational
            || self.transport.queue_backend == QueueBackend::External;
        if needs_db && self.transport.database_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "transport.database_url".into(),
                message: "relational store / external queue requires a database_url".into(),
            });
        }

        // Responses must outlive the client grace period.
        if self.transport.response_ttl_secs < 300 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "transport.response_ttl_secs".into(),
                message: "response TTL below 300s risks dropping responses before clients poll"
                    .into(),
            });
        }

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        } else if !self.llm.base_url.starts_with("http://")
            && !self.llm.base_url.starts_with("https://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: format!(
                    "base_url must start with http:// or https:// (got \"{}\")",
                    self.llm.base_url
                ),
            });
        }

        if !self.retrieval.endpoint.is_empty()
            && !self.retrieval.endpoint.starts_with("http://")
            && !self.retrieval.endpoint.starts_with("https://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "retrieval.endpoint".into(),
                message: format!(
                    "endpoint must start with http:// or https:// (got \"{}\")",
                    self.retrieval.endpoint
                ),
            });
        }

        if self.retrieval.endpoint.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "retrieval.endpoint".into(),
                message: "no retrieval endpoint configured — answers will carry no evidence"
                    .into(),
            });
        }

        if self.pipeline.max_llm_attempts == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "pipeline.max_llm_attempts".into(),
                message: "at least one LLM attempt is required".into(),
            });
        }

        if self.pipeline.workers == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "pipeline.workers".into(),
                message: "at least one worker is required".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_with_warnings_only() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .all(|e| e.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn relational_store_requires_database_url() {
        let mut cfg = Config::default();
        cfg.transport.store_backend = StoreBackend::Relational;
        cfg.transport.database_url = String::new();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "transport.database_url"
                && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn bad_llm_url_is_an_error() {
        let mut cfg = Config::default();
        cfg.llm.base_url = "ftp://example".into();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "llm.base_url" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn toml_round_trip_with_defaults() {
        let toml_src = r#"
            [server]
            port = 8080

            [transport]
            queue_backend = "memory"
            store_backend = "memory"

            [llm]
            model = "gpt-4o-mini"
        "#;
        let cfg: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        // Untouched sections get defaults.
        assert_eq!(cfg.pipeline.turn_timeout_secs, 120);
    }
}
