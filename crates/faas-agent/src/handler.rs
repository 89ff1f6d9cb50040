use crate::logs::CallLog;
use crate::Context;
use async_trait::async_trait;
use faas_common::{CallModel, CallParams, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque key/value data passed through to collaborating layers.
pub type Extensions = HashMap<String, String>;

/// Durable bookkeeping for calls (datastore and/or message queue).
#[async_trait]
pub trait CallHandler: Send + Sync {
    /// Mark an async call as taken. Called only for async calls, before the
    /// `BeforeCall` hook.
    async fn start(&self, ctx: &Context, call: &CallModel) -> Result<()>;

    /// Persist the finished call together with its logs.
    async fn finish(
        &self,
        ctx: &Context,
        call: &CallModel,
        logs: &CallLog,
        is_async: bool,
    ) -> Result<()>;
}

/// Listener notified around every call execution.
#[async_trait]
pub trait CallHooks: Send + Sync {
    async fn before_call(&self, _ctx: &Context, _call: &CallModel) -> Result<()> {
        Ok(())
    }

    async fn after_call(&self, _ctx: &Context, _call: &CallModel) -> Result<()> {
        Ok(())
    }
}

/// Rewrites the extensions of a freshly assembled call.
pub trait CallOverrider: Send + Sync {
    fn override_call(&self, call: &CallParams, extensions: Extensions) -> Result<Extensions>;
}

impl<F> CallOverrider for F
where
    F: Fn(&CallParams, Extensions) -> Result<Extensions> + Send + Sync,
{
    fn override_call(&self, call: &CallParams, extensions: Extensions) -> Result<Extensions> {
        self(call, extensions)
    }
}

/// Registered listeners, fired in registration order. The first failing
/// listener stops the chain.
#[derive(Clone, Default)]
pub struct CallListeners {
    listeners: Vec<Arc<dyn CallHooks>>,
}

impl CallListeners {
    pub fn push(&mut self, listener: Arc<dyn CallHooks>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub async fn fire_before_call(&self, ctx: &Context, call: &CallModel) -> Result<()> {
        for listener in &self.listeners {
            listener.before_call(ctx, call).await?;
        }
        Ok(())
    }

    pub async fn fire_after_call(&self, ctx: &Context, call: &CallModel) -> Result<()> {
        for listener in &self.listeners {
            listener.after_call(ctx, call).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CallListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}
