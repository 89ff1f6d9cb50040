//! Invocation front-end of the FaaS agent.
//!
//! Turns an incoming invocation (route request, HTTP trigger, structured event
//! or stored call) into a [`Call`], rejects it early when this host cannot run
//! it, and drives it through [`Call::start`] / [`Call::end`] with the
//! datastore and listener hooks around execution.
//!
//! ```text
//! options ──▶ CallBuilder ──▶ overrider ──▶ admission ──▶ Call
//!                                                          │
//!                              start ◀─────────────────────┘
//!                                │   (execution backend)
//!                               end ──▶ CallHandler::finish ──▶ AfterCall
//! ```

use faas_common::CallParams;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument};

pub mod admission;
pub mod call;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod handler;
pub mod logs;
pub mod options;
pub mod payload;
pub mod request;
pub mod sink;
pub mod synth;

pub use admission::{admit, ResourceTracker, StaticResourceTracker};
pub use call::Call;
pub use config::{AgentConfig, DEFAULT_MAX_LOG_SIZE, DEFAULT_STATS_MAX_SAMPLES};
pub use context::Context;
pub use error::{Error, Result};
pub use event::{CloudEvent, EventExtensions, Extension, CLOUD_EVENT_MEDIA_TYPE};
pub use handler::{CallHandler, CallHooks, CallListeners, CallOverrider, Extensions};
pub use logs::CallLog;
pub use options::{
    from_event, from_http_trigger_request, from_load_balancer, from_model,
    from_model_and_input, from_request, with_extensions, with_writer, CallBuilder, CallOpt,
    FromEvent, FromHttpTriggerRequest, FromLoadBalancer, FromModel, FromRequest, WithExtensions,
    WithWriter,
};
pub use payload::{empty_body, Body, BufferPool, PayloadLoader};
pub use request::InvocationRequest;
pub use sink::{HttpResponseSink, OutputSink, ResponseWriter, CALL_ID_HEADER, QUEUE_WAIT_HEADER};

pub use faas_common as common;

/// Builds calls and hands them the collaborators they need for their
/// lifecycle.
#[derive(Clone)]
pub struct Agent {
    config: AgentConfig,
    handler: Arc<dyn CallHandler>,
    resources: Arc<dyn ResourceTracker>,
    listeners: CallListeners,
    overrider: Option<Arc<dyn CallOverrider>>,
    loader: PayloadLoader,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        handler: Arc<dyn CallHandler>,
        resources: Arc<dyn ResourceTracker>,
    ) -> Self {
        let pool = BufferPool::new(config.payload_pool_size, config.payload_pool_max_bytes);
        Self {
            config,
            handler,
            resources,
            listeners: CallListeners::default(),
            overrider: None,
            loader: PayloadLoader::new(Arc::new(pool)),
        }
    }

    /// Agent sized from `config`, using a [`StaticResourceTracker`].
    pub fn with_static_resources(config: AgentConfig, handler: Arc<dyn CallHandler>) -> Self {
        let resources = Arc::new(StaticResourceTracker::from_config(&config));
        Self::new(config, handler, resources)
    }

    pub fn with_listener(mut self, listener: Arc<dyn CallHooks>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_overrider(mut self, overrider: Arc<dyn CallOverrider>) -> Self {
        self.overrider = Some(overrider);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn payload_loader(&self) -> &PayloadLoader {
        &self.loader
    }

    /// Assemble a call from `opts`, applied in order.
    ///
    /// Exactly one source option must be given. The first failing option
    /// aborts assembly with its own error; a call this host can never run
    /// fails with [`Error::ServerBusy`] before anything is reserved for it.
    #[instrument(skip_all)]
    pub async fn get_call<I>(&self, ctx: &Context, opts: I) -> Result<Call>
    where
        I: IntoIterator<Item = Box<dyn CallOpt>> + Send,
        I::IntoIter: Send,
    {
        let mut builder = CallBuilder::new(self.loader.clone());
        for opt in opts {
            opt.apply(ctx, &mut builder).await?;
        }

        let CallBuilder {
            model,
            writer,
            extensions,
            is_cloud_event,
            is_lb,
            ..
        } = builder;
        let model = model.ok_or(Error::NoSource)?;

        let extensions = match &self.overrider {
            Some(overrider) => overrider
                .override_call(&model.params, extensions)
                .map_err(Error::Overrider)?,
            None => extensions,
        };

        admit(self.resources.as_ref(), &model.params)?;

        let stderr = CallLog::new(&model.params, self.config.max_log_size);
        // no writer: send stdout to the logs (async)
        let output = writer.unwrap_or_else(|| Arc::new(stderr.clone()));
        let slot_hash_id = slot_hash_id(&model.params);
        debug!(call_id = %model.params.id, %slot_hash_id, "Call assembled");

        Ok(Call {
            model,
            is_cloud_event,
            is_lb,
            extensions,
            slot_hash_id,
            output,
            stderr,
            handler: self.handler.clone(),
            listeners: self.listeners.clone(),
            stats_max_samples: self.config.stats_max_samples,
        })
    }
}

/// Hash of everything that shapes the container a call runs in. Calls with
/// the same hash can share a warm container.
pub fn slot_hash_id(params: &CallParams) -> String {
    let mut hasher = Sha256::new();
    for part in [
        params.app_id.as_str(),
        params.path.as_str(),
        params.image.as_str(),
        params.format.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0]);
    }
    hasher.update(params.memory.to_le_bytes());
    hasher.update(params.cpus.0.to_le_bytes());
    hasher.update(params.tmpfs_size.to_le_bytes());
    hasher.update(params.timeout.to_le_bytes());
    hasher.update(params.idle_timeout.to_le_bytes());
    for (k, v) in &params.config {
        hasher.update(k.as_bytes());
        hasher.update([b'=']);
        hasher.update(v.as_bytes());
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use faas_common::{CallType, Config, Format, MilliCpus};

    fn params(image: &str, config: Config) -> CallParams {
        CallParams {
            id: faas_common::uuid::Uuid::new_v4().to_string(),
            app_id: "app".to_string(),
            fn_id: None,
            trigger_id: None,
            image: image.to_string(),
            path: "/hello".to_string(),
            call_type: CallType::Sync,
            format: Format::Http,
            priority: 0,
            timeout: 30,
            idle_timeout: 30,
            memory: 128,
            cpus: MilliCpus(0),
            tmpfs_size: 0,
            config,
            annotations: Default::default(),
            headers: Default::default(),
            url: String::new(),
            method: String::new(),
            created_at: Utc::now(),
            syslog_url: None,
        }
    }

    #[test]
    fn test_slot_hash_ignores_call_identity() {
        let a = params("img:1", Config::new());
        let b = params("img:1", Config::new());
        assert_ne!(a.id, b.id);
        assert_eq!(slot_hash_id(&a), slot_hash_id(&b));
        assert_eq!(slot_hash_id(&a).len(), 64);
    }

    #[test]
    fn test_slot_hash_tracks_definition() {
        let base = params("img:1", Config::new());
        assert_ne!(slot_hash_id(&base), slot_hash_id(&params("img:2", Config::new())));

        let config = Config::from([("K".to_string(), "V".to_string())]);
        assert_ne!(slot_hash_id(&base), slot_hash_id(&params("img:1", config)));
    }
}
