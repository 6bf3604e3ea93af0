use serde::Deserialize;
use httpmon_core::error::{HttpmonError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpmonConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

impl Default for HttpmonConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSection::default(),
            metrics: MetricsSection::default(),
        }
    }
}

impl HttpmonConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(HttpmonError::UnsupportedVersion);
        }
        self.server.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

/// Behavior of `submit` when the work queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueFull {
    /// Fail the submission with `Saturation`.
    #[default]
    Reject,
    /// Wait until a worker frees a queue slot.
    Block,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Fixed worker count (min == max).
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Upper bound on queued jobs.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    #[serde(default)]
    pub queue_full: QueueFull,

    #[serde(default = "default_pool_name")]
    pub pool_name: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            threads: default_threads(),
            queue_size: default_queue_size(),
            queue_full: QueueFull::default(),
            pool_name: default_pool_name(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=1024).contains(&self.threads) {
            return Err(HttpmonError::BadConfig(
                "server.threads must be between 1 and 1024".into(),
            ));
        }
        if !(1..=1_000_000).contains(&self.queue_size) {
            return Err(HttpmonError::BadConfig(
                "server.queue_size must be between 1 and 1000000".into(),
            ));
        }
        if !is_metric_segment(&self.pool_name) {
            return Err(HttpmonError::BadConfig(
                "server.pool_name must be non-empty [A-Za-z0-9._-]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Also count each exact status code, not only its class.
    #[serde(default)]
    pub exact_status_codes: bool,

    /// Register process-level runtime gauges at startup.
    #[serde(default = "default_true")]
    pub runtime_gauges: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            exact_status_codes: false,
            runtime_gauges: true,
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        if !is_metric_segment(&self.prefix) {
            return Err(HttpmonError::BadConfig(
                "metrics.prefix must be non-empty [A-Za-z0-9._-]".into(),
            ));
        }
        Ok(())
    }
}

fn is_metric_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_threads() -> usize {
    32
}
fn default_queue_size() -> usize {
    128
}
fn default_pool_name() -> String {
    "default-pool".into()
}
fn default_prefix() -> String {
    "http-server".into()
}
fn default_true() -> bool {
    true
}
