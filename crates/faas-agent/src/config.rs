use faas_common::FaasError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

pub const DEFAULT_MAX_LOG_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_STATS_MAX_SAMPLES: usize = 240;

/// Tunables for the call front-end. Every field can be overridden from the
/// environment, see [`AgentConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Bytes of function stderr/stdout kept per call before truncation.
    pub max_log_size: u64,
    /// Upper bound on stats samples persisted with a finished call.
    pub stats_max_samples: usize,
    /// Memory (MB) this host can hand out to calls.
    pub max_total_memory_mb: u64,
    /// CPU (millicpus) this host can hand out to calls; 0 disables CPU checks.
    pub max_total_cpu_mcpus: u64,
    /// Share (percent) of memory and CPU async calls are allowed to claim.
    pub async_hwmark_pct: u8,
    /// Payload buffers kept around for reuse.
    pub payload_pool_size: usize,
    /// Buffers that grew past this capacity are dropped instead of pooled.
    pub payload_pool_max_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_log_size: DEFAULT_MAX_LOG_SIZE,
            stats_max_samples: DEFAULT_STATS_MAX_SAMPLES,
            max_total_memory_mb: 8 * 1024,
            max_total_cpu_mcpus: 0,
            async_hwmark_pct: 80,
            payload_pool_size: 64,
            payload_pool_max_bytes: 4 * 1024 * 1024,
        }
    }
}

impl AgentConfig {
    /// Load the config from `FN_*` environment variables (and a `.env` file if
    /// one is present), falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, FaasError> {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "Loaded agent environment file");
        }
        let defaults = Self::default();

        let config = Self {
            max_log_size: env_or("FN_MAX_LOG_SIZE_BYTES", defaults.max_log_size)?,
            stats_max_samples: env_or("FN_STATS_MAX_SAMPLES", defaults.stats_max_samples)?,
            max_total_memory_mb: env_or("FN_MAX_TOTAL_MEMORY_MB", defaults.max_total_memory_mb)?,
            max_total_cpu_mcpus: env_or("FN_MAX_TOTAL_CPU_MCPUS", defaults.max_total_cpu_mcpus)?,
            async_hwmark_pct: env_or("FN_ASYNC_HWMARK_PCT", defaults.async_hwmark_pct)?,
            payload_pool_size: env_or("FN_PAYLOAD_POOL_SIZE", defaults.payload_pool_size)?,
            payload_pool_max_bytes: env_or(
                "FN_PAYLOAD_POOL_MAX_BYTES",
                defaults.payload_pool_max_bytes,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FaasError> {
        if self.async_hwmark_pct > 100 {
            return Err(FaasError::Config(format!(
                "FN_ASYNC_HWMARK_PCT must be at most 100, got {}",
                self.async_hwmark_pct
            )));
        }
        if self.stats_max_samples == 0 {
            return Err(FaasError::Config(
                "FN_STATS_MAX_SAMPLES must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, FaasError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| FaasError::Config(format!("invalid {key}={raw:?}: {e}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("FN_MAX_LOG_SIZE_BYTES", "2048");
        std::env::set_var("FN_ASYNC_HWMARK_PCT", "50");
        let config = AgentConfig::from_env().unwrap();
        std::env::remove_var("FN_MAX_LOG_SIZE_BYTES");
        std::env::remove_var("FN_ASYNC_HWMARK_PCT");

        assert_eq!(config.max_log_size, 2048);
        assert_eq!(config.async_hwmark_pct, 50);
        assert_eq!(config.stats_max_samples, DEFAULT_STATS_MAX_SAMPLES);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        std::env::set_var("FN_STATS_MAX_SAMPLES", "many");
        let result = AgentConfig::from_env();
        std::env::remove_var("FN_STATS_MAX_SAMPLES");

        assert!(matches!(result, Err(FaasError::Config(_))));
    }

    #[test]
    fn test_validate_hwmark() {
        let config = AgentConfig {
            async_hwmark_pct: 120,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
