/// Configuration loading from TOML file
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::types::Config;

/// Load configuration from a TOML file, falling back to defaults when the
/// file does not exist (every knob has a stated default).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = if path.as_ref().exists() {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?
    } else {
        info!(
            "Config file {} not found - using defaults",
            path.as_ref().display()
        );
        Config::default()
    };

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.buffer_capacity == 0 {
        return Err(PipelineError::Config(
            "buffer_capacity must be > 0".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(PipelineError::Config("batch_size must be > 0".to_string()));
    }

    if config.flush_interval_ms == 0 {
        return Err(PipelineError::Config(
            "flush_interval_ms must be > 0".to_string(),
        ));
    }

    if config.retention_hours <= 0 {
        return Err(PipelineError::Config(format!(
            "Invalid retention_hours: {}",
            config.retention_hours
        )));
    }

    if config.backoff_start_secs == 0 || config.backoff_cap_secs < config.backoff_start_secs {
        return Err(PipelineError::Config(format!(
            "Invalid backoff range: start={} cap={}",
            config.backoff_start_secs, config.backoff_cap_secs
        )));
    }

    if config.rolling_window < 2 {
        return Err(PipelineError::Config(
            "rolling_window must be >= 2".to_string(),
        ));
    }

    Ok(())
}
