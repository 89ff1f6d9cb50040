//! Shared mocks and fixtures for the call assembly and lifecycle tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{header, HeaderValue, Method};
use faas_agent::{
    AgentConfig, CallHandler, CallHooks, CallLog, Context, InvocationRequest,
    StaticResourceTracker,
};
use faas_common::{App, CallModel, CallType, FaasError, Route};
use std::sync::{Arc, Once};
use tokio::sync::{Mutex, RwLock};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Ordered trace of everything the mocks saw, shared across handler and hooks.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub async fn push(&self, event: impl Into<String>) {
        self.0.lock().await.push(event.into());
    }

    pub async fn events(&self) -> Vec<String> {
        self.0.lock().await.clone()
    }
}

#[derive(Clone, Debug, Default)]
pub struct HandlerBehavior {
    pub fail_start: bool,
    pub fail_finish: bool,
}

/// Datastore/queue stand-in. Keeps the last finished model and its logs.
#[derive(Clone)]
pub struct MockHandler {
    pub log: EventLog,
    pub behavior: Arc<RwLock<HandlerBehavior>>,
    pub finished: Arc<Mutex<Option<(CallModel, String, bool)>>>,
}

impl MockHandler {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            behavior: Arc::new(RwLock::new(HandlerBehavior::default())),
            finished: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn set_behavior(&self, behavior: HandlerBehavior) {
        *self.behavior.write().await = behavior;
    }

    pub async fn last_finished(&self) -> Option<(CallModel, String, bool)> {
        self.finished.lock().await.clone()
    }
}

#[async_trait]
impl CallHandler for MockHandler {
    async fn start(&self, _ctx: &Context, call: &CallModel) -> faas_common::Result<()> {
        self.log.push("handler.start").await;
        if self.behavior.read().await.fail_start {
            return Err(FaasError::Datastore(format!("call {} already taken", call.params.id)));
        }
        Ok(())
    }

    async fn finish(
        &self,
        _ctx: &Context,
        call: &CallModel,
        logs: &CallLog,
        is_async: bool,
    ) -> faas_common::Result<()> {
        self.log.push("handler.finish").await;
        *self.finished.lock().await = Some((call.clone(), logs.contents_lossy(), is_async));
        if self.behavior.read().await.fail_finish {
            return Err(FaasError::Datastore("insert failed".to_string()));
        }
        Ok(())
    }
}

/// Listener that records both hooks and can be told to fail either.
pub struct MockHooks {
    pub name: &'static str,
    pub log: EventLog,
    pub fail_before: bool,
    pub fail_after: bool,
}

impl MockHooks {
    pub fn new(name: &'static str, log: EventLog) -> Self {
        Self {
            name,
            log,
            fail_before: false,
            fail_after: false,
        }
    }
}

#[async_trait]
impl CallHooks for MockHooks {
    async fn before_call(&self, _ctx: &Context, call: &CallModel) -> faas_common::Result<()> {
        self.log
            .push(format!("{}.before:{:?}", self.name, call.state.status))
            .await;
        if self.fail_before {
            return Err(FaasError::Hook(format!("{} rejected call", self.name)));
        }
        Ok(())
    }

    async fn after_call(&self, _ctx: &Context, call: &CallModel) -> faas_common::Result<()> {
        self.log
            .push(format!("{}.after:{:?}", self.name, call.state.status))
            .await;
        if self.fail_after {
            return Err(FaasError::Hook(format!("{} failed after call", self.name)));
        }
        Ok(())
    }
}

pub fn app() -> App {
    App {
        id: "app-1".to_string(),
        name: "myapp".to_string(),
        config: [("APP_KEY".to_string(), "app".to_string())].into(),
        ..Default::default()
    }
}

pub fn route(call_type: CallType) -> Route {
    Route {
        app_id: "app-1".to_string(),
        path: "/hello".to_string(),
        image: "fnproject/hello:0.0.1".to_string(),
        call_type,
        memory: 128,
        ..Default::default()
    }
}

pub fn request(body: &'static str) -> InvocationRequest {
    InvocationRequest::new(Method::POST, "/r/myapp/hello".parse().unwrap())
        .with_header(header::HOST, HeaderValue::from_static("localhost:8080"))
        .with_body(body.as_bytes())
}

pub fn config() -> AgentConfig {
    AgentConfig {
        max_total_memory_mb: 1024,
        ..Default::default()
    }
}

pub fn tracker() -> Arc<StaticResourceTracker> {
    Arc::new(StaticResourceTracker::from_config(&config()))
}
