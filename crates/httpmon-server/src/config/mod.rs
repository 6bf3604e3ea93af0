//! Config loader (strict parsing).

pub mod schema;

use std::fs;
use std::io::ErrorKind;

use httpmon_core::error::{HttpmonError, Result};

pub use schema::{HttpmonConfig, MetricsSection, QueueFull, ServerSection};

pub fn load_from_file(path: &str) -> Result<HttpmonConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| HttpmonError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

/// Like [`load_from_file`], but a missing file yields the built-in defaults.
pub fn load_or_default(path: &str) -> Result<HttpmonConfig> {
    match fs::read_to_string(path) {
        Ok(s) => load_from_str(&s),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(%path, "config file not found; using defaults");
            Ok(HttpmonConfig::default())
        }
        Err(e) => Err(HttpmonError::Internal(format!("read config failed: {e}"))),
    }
}

pub fn load_from_str(s: &str) -> Result<HttpmonConfig> {
    let cfg: HttpmonConfig = serde_yaml::from_str(s)
        .map_err(|e| HttpmonError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
