use crate::config::AgentConfig;
use crate::{Error, Result};
use faas_common::{CallParams, MilliCpus};
use tracing::debug;

/// Answers whether this host could ever service a call of the given size.
/// Implementations own their accounting and its atomicity.
pub trait ResourceTracker: Send + Sync {
    fn is_resource_possible(&self, memory_mb: u64, cpus: MilliCpus, is_async: bool) -> bool;
}

/// Reject a call the host cannot service. Must run after the call parameters
/// are final and before anything is reserved for it.
pub fn admit(tracker: &dyn ResourceTracker, params: &CallParams) -> Result<()> {
    let memory = params.memory.saturating_add(u64::from(params.tmpfs_size));
    if tracker.is_resource_possible(memory, params.cpus, params.is_async()) {
        return Ok(());
    }
    debug!(
        call_id = %params.id,
        memory_mb = memory,
        cpus = %params.cpus,
        is_async = params.is_async(),
        "Call rejected, not enough resources on this host"
    );
    Err(Error::ServerBusy)
}

/// Fixed-capacity tracker. Async calls may only claim `async_hwmark_pct` of
/// the host, leaving headroom for sync traffic.
#[derive(Debug, Clone)]
pub struct StaticResourceTracker {
    total_memory_mb: u64,
    total_cpu_mcpus: u64,
    async_hwmark_pct: u8,
}

impl StaticResourceTracker {
    pub fn new(total_memory_mb: u64, total_cpu_mcpus: u64, async_hwmark_pct: u8) -> Self {
        Self {
            total_memory_mb,
            total_cpu_mcpus,
            async_hwmark_pct: async_hwmark_pct.min(100),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config.max_total_memory_mb,
            config.max_total_cpu_mcpus,
            config.async_hwmark_pct,
        )
    }

    fn async_share(&self, total: u64) -> u64 {
        (u128::from(total) * u128::from(self.async_hwmark_pct) / 100) as u64
    }
}

impl ResourceTracker for StaticResourceTracker {
    fn is_resource_possible(&self, memory_mb: u64, cpus: MilliCpus, is_async: bool) -> bool {
        let (memory_limit, cpu_limit) = if is_async {
            (
                self.async_share(self.total_memory_mb),
                self.async_share(self.total_cpu_mcpus),
            )
        } else {
            (self.total_memory_mb, self.total_cpu_mcpus)
        };

        // zero total CPU means CPU is not accounted on this host
        memory_mb <= memory_limit && (self.total_cpu_mcpus == 0 || cpus.0 <= cpu_limit)
    }
}
