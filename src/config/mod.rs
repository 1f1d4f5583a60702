use crate::errors::{AppError, AppResult};
use crate::pipeline::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variables override file settings, e.g.
/// `SPROC_STREAMER__PIPELINE__CONCURRENCY_LIMIT=8`
pub const ENV_PREFIX: &str = "SPROC_STREAMER";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

/// Order in which finished documents leave the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmissionOrder {
    /// First completed, first emitted
    Completion,
    /// Discovery order, at the cost of head-of-line blocking
    Discovery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of procedure calls in flight at once
    pub concurrency_limit: usize,
    pub emission_order: EmissionOrder,
    /// Parameterless query returning `unit_name` and `procedure_name` columns
    pub mapping_query: String,
    /// Statement used to call a procedure; `{procedure}` is replaced by the
    /// validated procedure name. Defaults to the backend's call shape.
    pub call_template: Option<String>,
    pub invocation_timeout_secs: Option<u64>,
    /// Attempts per procedure call, including the first
    pub max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./sproc-streamer.db".to_string(),
                max_connections: Some(10),
            },
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            emission_order: EmissionOrder::Completion,
            mapping_query: "SELECT unit_name, procedure_name FROM procedure_mappings".to_string(),
            call_template: None,
            invocation_timeout_secs: Some(30),
            max_attempts: 1,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 2000,
        }
    }
}

impl Config {
    /// Layer defaults, the optional TOML file at `path`, and the environment
    pub fn load(path: &str) -> AppResult<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Self::default())?)
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.pipeline.validate()?;

        if let Some(max_connections) = self.database.max_connections {
            if self.pipeline.concurrency_limit > max_connections as usize {
                tracing::warn!(
                    "pipeline.concurrency_limit ({}) exceeds database.max_connections ({}); \
                     invocations will queue on the pool",
                    self.pipeline.concurrency_limit,
                    max_connections
                );
            }
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.concurrency_limit == 0 {
            return Err(AppError::configuration(
                "pipeline.concurrency_limit must be at least 1",
            ));
        }
        if self.max_attempts == 0 {
            return Err(AppError::configuration(
                "pipeline.max_attempts must be at least 1",
            ));
        }
        if let Some(template) = &self.call_template {
            if !template.contains("{procedure}") {
                return Err(AppError::configuration(format!(
                    "pipeline.call_template '{}' has no {{procedure}} placeholder",
                    template
                )));
            }
        }
        if self.mapping_query.trim().is_empty() {
            return Err(AppError::configuration("pipeline.mapping_query is empty"));
        }
        Ok(())
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.emission_order, EmissionOrder::Completion);
        assert_eq!(config.pipeline.invocation_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.pipeline.concurrency_limit = 0;
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_call_template_requires_placeholder() {
        let mut pipeline = PipelineConfig::default();
        pipeline.call_template = Some("CALL my_proc()".to_string());
        assert!(pipeline.validate().is_err());

        pipeline.call_template = Some("CALL {procedure}()".to_string());
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn test_load_merges_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[pipeline]
concurrency_limit = 2
emission_order = "discovery"
max_attempts = 3
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.pipeline.concurrency_limit, 2);
        assert_eq!(config.pipeline.emission_order, EmissionOrder::Discovery);
        assert_eq!(config.pipeline.retry_config().max_attempts, 3);
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.database.max_connections, Some(10));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/sproc-streamer-config").unwrap();
        assert_eq!(config.pipeline.concurrency_limit, 4);
    }
}
