use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub artifact_store: ArtifactStoreConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Content source references the collect stage sweeps.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// API key for the api_key method (required when method = "api_key")
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// Database configuration.
///
/// A single SQLite file backs the work queues, the dedup index and the
/// audit log.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("conveyor.db")
}

/// Artifact store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactStoreConfig {
    /// Root directory where artifacts are written.
    #[serde(default = "default_artifact_root")]
    pub root: PathBuf,
}

impl Default for ArtifactStoreConfig {
    fn default() -> Self {
        Self {
            root: default_artifact_root(),
        }
    }
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from("artifacts")
}

/// Publish target configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishConfig {
    /// Directory the publish stage writes rendered pages into.
    #[serde(default = "default_publish_root")]
    pub root: PathBuf,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            root: default_publish_root(),
        }
    }
}

fn default_publish_root() -> PathBuf {
    PathBuf::from("public")
}

/// Error reporting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Service name included in sanitized error responses.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Strings longer than this are truncated before logging.
    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            max_value_len: default_max_value_len(),
        }
    }
}

fn default_service_name() -> String {
    "conveyor".to_string()
}

fn default_max_value_len() -> usize {
    256
}

/// Pipeline configuration: one block per stage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub collect: StageConfig,
    #[serde(default)]
    pub process: StageConfig,
    #[serde(default)]
    pub render: StageConfig,
    #[serde(default)]
    pub publish: StageConfig,
}

/// Per-stage worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageConfig {
    /// Enable/disable this stage's worker.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum number of messages leased per poll.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Empirical per-item processing estimate in seconds.
    #[serde(default = "default_estimated_processing_secs")]
    pub estimated_processing_secs: u64,

    /// Multiplicative safety margin applied to the processing estimate
    /// when sizing visibility leases. Clamped to 1.0-2.0.
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,

    /// Lease duration used before any processing-time samples exist.
    #[serde(default = "default_fallback_lease_secs")]
    pub fallback_lease_secs: u64,

    /// Per-message handler timeout. Must stay below the lease so a hung
    /// handler is abandoned before the lease expires on its own.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,

    /// Consecutive empty polls before a drain cycle is declared done.
    #[serde(default = "default_empty_polls_before_done")]
    pub empty_polls_before_done: u32,

    /// Base of the increasing wait between empty polls (5s, 10s, 15s...).
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Deliveries after which a message is dead-lettered instead of retried.
    #[serde(default = "default_max_dequeue_count")]
    pub max_dequeue_count: u32,

    /// Hard wall-clock cap on a single drain cycle.
    #[serde(default = "default_max_cycle_secs")]
    pub max_cycle_secs: u64,

    /// Hard cap on poll iterations within a single drain cycle.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Sleep between drain cycles while the queue stays empty.
    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_batch_size: default_max_batch_size(),
            estimated_processing_secs: default_estimated_processing_secs(),
            safety_margin: default_safety_margin(),
            fallback_lease_secs: default_fallback_lease_secs(),
            handler_timeout_secs: default_handler_timeout_secs(),
            empty_polls_before_done: default_empty_polls_before_done(),
            backoff_base_secs: default_backoff_base_secs(),
            max_dequeue_count: default_max_dequeue_count(),
            max_cycle_secs: default_max_cycle_secs(),
            max_iterations: default_max_iterations(),
            idle_poll_secs: default_idle_poll_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_batch_size() -> usize {
    8
}

fn default_estimated_processing_secs() -> u64 {
    45
}

fn default_safety_margin() -> f64 {
    1.5
}

fn default_fallback_lease_secs() -> u64 {
    120
}

fn default_handler_timeout_secs() -> u64 {
    90
}

fn default_empty_polls_before_done() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    5
}

fn default_max_dequeue_count() -> u32 {
    5
}

fn default_max_cycle_secs() -> u64 {
    900
}

fn default_max_iterations() -> u32 {
    500
}

fn default_idle_poll_secs() -> u64 {
    5
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub artifact_store: ArtifactStoreConfig,
    pub publish: PublishConfig,
    pub pipeline: PipelineConfig,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_key_configured: config
                    .auth
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            artifact_store: config.artifact_store.clone(),
            publish: config.publish.clone(),
            pipeline: config.pipeline.clone(),
            sources: config.sources.clone(),
        }
    }
}
