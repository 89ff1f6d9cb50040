//! Call options: the units that assemble a [`crate::Call`] from one
//! invocation source.
//!
//! Options run in the order given. Options that write response headers need
//! the output sink, so [`WithWriter`] must come before the source option.

use crate::event::CloudEvent;
use crate::handler::Extensions;
use crate::payload::{Body, PayloadLoader};
use crate::request::InvocationRequest;
use crate::sink::{OutputSink, ResponseWriter, CALL_ID_HEADER};
use crate::synth::{build_route_config, build_trigger_config};
use crate::{Context, Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use faas_common::uuid::Uuid;
use faas_common::{
    App, CallModel, CallParams, CallType, Format, Function, MilliCpus, Route, Trigger,
};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait CallOpt: Send {
    async fn apply(self: Box<Self>, ctx: &Context, builder: &mut CallBuilder) -> Result<()>;
}

/// Assembly-time view of a call under construction.
pub struct CallBuilder {
    loader: PayloadLoader,
    source: Option<&'static str>,
    pub(crate) model: Option<CallModel>,
    pub(crate) writer: Option<Arc<dyn OutputSink>>,
    pub(crate) extensions: Extensions,
    pub(crate) is_cloud_event: bool,
    pub(crate) is_lb: bool,
}

impl CallBuilder {
    pub(crate) fn new(loader: PayloadLoader) -> Self {
        Self {
            loader,
            source: None,
            model: None,
            writer: None,
            extensions: Extensions::new(),
            is_cloud_event: false,
            is_lb: false,
        }
    }

    /// Register `source` as the one invocation source of this call. Must be
    /// called by a source option before it has any side effect.
    pub fn claim_source(&mut self, source: &'static str) -> Result<()> {
        if let Some(existing) = self.source {
            return Err(Error::SourceAlreadySet(existing));
        }
        self.source = Some(source);
        Ok(())
    }

    pub fn set_model(&mut self, model: CallModel) {
        self.model = Some(model);
    }

    pub fn set_writer(&mut self, writer: Arc<dyn OutputSink>) {
        self.writer = Some(writer);
    }

    pub fn set_extensions(&mut self, extensions: Extensions) {
        self.extensions = extensions;
    }

    pub fn mark_cloud_event(&mut self) {
        self.is_cloud_event = true;
    }

    pub fn mark_lb(&mut self) {
        self.is_lb = true;
    }

    pub fn response_writer(&self) -> Option<&dyn ResponseWriter> {
        self.writer.as_deref().and_then(|w| w.response_writer())
    }

    pub async fn load_payload(&self, ctx: &Context, body: Body) -> Result<String> {
        self.loader.load(ctx, body).await
    }
}

fn new_call_id() -> String {
    Uuid::new_v4().to_string()
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Route-style invocation: `/r/{app}/{route}`.
pub struct FromRequest {
    pub app: App,
    pub route: Route,
    pub request: InvocationRequest,
}

pub fn from_request(app: App, route: Route, request: InvocationRequest) -> Box<dyn CallOpt> {
    Box::new(FromRequest {
        app,
        route,
        request,
    })
}

#[async_trait]
impl CallOpt for FromRequest {
    async fn apply(self: Box<Self>, ctx: &Context, builder: &mut CallBuilder) -> Result<()> {
        let FromRequest {
            app,
            mut route,
            request,
        } = *self;
        builder.claim_source("request")?;

        if request.is_cloud_event() {
            builder.mark_cloud_event();
            route.format = Some(Format::CloudEvent);
        }
        let format = route.format.unwrap_or_default();
        route.format = Some(format);

        let id = new_call_id();

        // written before validation so the invoker sees the id even on failure
        if let Some(rw) = builder.response_writer() {
            rw.add_header(CALL_ID_HEADER, &id);
            for (name, values) in &route.headers {
                for value in values {
                    rw.add_header(name, value);
                }
            }
        }

        route.validate()?;

        let params = CallParams {
            id,
            app_id: app.id.clone(),
            fn_id: None,
            trigger_id: None,
            image: route.image.clone(),
            path: route.path.clone(),
            call_type: route.call_type,
            format,
            priority: 0,
            timeout: route.timeout,
            idle_timeout: route.idle_timeout,
            memory: route.memory,
            cpus: route.cpus,
            tmpfs_size: route.tmpfs_size,
            config: build_route_config(&app, &route),
            annotations: app.annotations.merge_change(&route.annotations),
            headers: request.header_map(),
            url: request.url(),
            method: request.method.to_string(),
            created_at: Utc::now(),
            syslog_url: app.syslog_url.clone(),
        };
        debug!(call_id = %params.id, path = %params.path, "Assembling call from route request");

        let payload = builder.load_payload(ctx, request.body).await?;
        builder.set_model(CallModel {
            payload,
            ..CallModel::new(params)
        });
        Ok(())
    }
}

/// Structured event carrying the app/function/trigger definitions inline.
pub struct FromEvent {
    event: Result<CloudEvent>,
}

impl FromEvent {
    pub fn new(event: CloudEvent) -> Self {
        Self { event: Ok(event) }
    }

    /// Decode the event from its JSON form; a malformed event fails assembly.
    pub fn from_json(bytes: &[u8]) -> Self {
        Self {
            event: CloudEvent::from_json(bytes),
        }
    }
}

pub fn from_event(event: CloudEvent) -> Box<dyn CallOpt> {
    Box::new(FromEvent::new(event))
}

#[async_trait]
impl CallOpt for FromEvent {
    async fn apply(self: Box<Self>, _ctx: &Context, builder: &mut CallBuilder) -> Result<()> {
        builder.claim_source("event")?;
        let event = self.event?;
        let payload = event.payload();
        let ext = event.extensions;

        let params = CallParams {
            id: new_call_id(),
            app_id: ext.app.id.clone(),
            fn_id: non_empty(&ext.function.id),
            trigger_id: non_empty(&ext.trigger.id),
            image: ext.function.image.clone(),
            path: String::new(),
            call_type: CallType::Sync,
            format: Format::CloudEvent,
            priority: 0,
            timeout: ext.function.timeout,
            idle_timeout: ext.function.idle_timeout,
            memory: ext.function.memory,
            cpus: MilliCpus::default(),
            tmpfs_size: 0,
            config: Default::default(),
            annotations: ext
                .app
                .annotations
                .merge_change(&ext.function.annotations)
                .merge_change(&ext.trigger.annotations),
            headers: Default::default(),
            url: String::new(),
            method: String::new(),
            created_at: Utc::now(),
            syslog_url: ext.app.syslog_url.clone(),
        };
        debug!(call_id = %params.id, event_id = %event.id, "Assembling call from event");

        builder.mark_cloud_event();
        builder.set_model(CallModel {
            payload,
            ..CallModel::new(params)
        });
        Ok(())
    }
}

/// Function invoked through one of its HTTP triggers.
pub struct FromHttpTriggerRequest {
    pub app: App,
    pub function: Function,
    pub trigger: Trigger,
    pub request: InvocationRequest,
}

pub fn from_http_trigger_request(
    app: App,
    function: Function,
    trigger: Trigger,
    request: InvocationRequest,
) -> Box<dyn CallOpt> {
    Box::new(FromHttpTriggerRequest {
        app,
        function,
        trigger,
        request,
    })
}

#[async_trait]
impl CallOpt for FromHttpTriggerRequest {
    async fn apply(self: Box<Self>, ctx: &Context, builder: &mut CallBuilder) -> Result<()> {
        let FromHttpTriggerRequest {
            app,
            mut function,
            trigger,
            request,
        } = *self;
        builder.claim_source("http trigger")?;

        if request.is_cloud_event() {
            builder.mark_cloud_event();
            function.format = Some(Format::CloudEvent);
        }
        let format = function.format.unwrap_or_default();
        function.format = Some(format);

        let id = new_call_id();
        if let Some(rw) = builder.response_writer() {
            rw.add_header(CALL_ID_HEADER, &id);
        }

        let params = CallParams {
            id,
            app_id: app.id.clone(),
            fn_id: Some(function.id.clone()),
            trigger_id: Some(trigger.id.clone()),
            image: function.image.clone(),
            path: trigger.source.clone(),
            call_type: CallType::Sync,
            format,
            priority: 0,
            timeout: function.timeout,
            idle_timeout: function.idle_timeout,
            memory: function.memory,
            cpus: MilliCpus::default(),
            tmpfs_size: 0,
            config: build_trigger_config(&app, &function, &trigger),
            annotations: app
                .annotations
                .merge_change(&function.annotations)
                .merge_change(&trigger.annotations),
            headers: request.header_map(),
            url: request.url(),
            method: request.method.to_string(),
            created_at: Utc::now(),
            syslog_url: app.syslog_url.clone(),
        };
        debug!(call_id = %params.id, fn_id = %function.id, "Assembling call from trigger request");

        let payload = builder.load_payload(ctx, request.body).await?;
        builder.set_model(CallModel {
            payload,
            ..CallModel::new(params)
        });
        Ok(())
    }
}

/// A stored call, replayed for async delivery. The parameters are reused as
/// stored; lifecycle state starts over for this attempt. When `input` is set
/// the payload is read from it instead of the stored payload.
pub struct FromModel {
    pub model: CallModel,
    pub input: Option<Body>,
}

pub fn from_model(model: CallModel) -> Box<dyn CallOpt> {
    Box::new(FromModel { model, input: None })
}

pub fn from_model_and_input(model: CallModel, input: Body) -> Box<dyn CallOpt> {
    Box::new(FromModel {
        model,
        input: Some(input),
    })
}

#[async_trait]
impl CallOpt for FromModel {
    async fn apply(self: Box<Self>, ctx: &Context, builder: &mut CallBuilder) -> Result<()> {
        let FromModel { model, input } = *self;
        builder.claim_source("model")?;

        let payload = match input {
            Some(body) => builder.load_payload(ctx, body).await?,
            None => model.payload,
        };
        builder.set_model(CallModel {
            payload,
            ..CallModel::new(model.params)
        });
        Ok(())
    }
}

/// Where the call writes its output. Without one, output goes to the call log.
pub struct WithWriter(pub Arc<dyn OutputSink>);

pub fn with_writer(writer: Arc<dyn OutputSink>) -> Box<dyn CallOpt> {
    Box::new(WithWriter(writer))
}

#[async_trait]
impl CallOpt for WithWriter {
    async fn apply(self: Box<Self>, _ctx: &Context, builder: &mut CallBuilder) -> Result<()> {
        builder.set_writer(self.0);
        Ok(())
    }
}

/// Attach opaque data for extension layers; never read by the agent itself.
pub struct WithExtensions(pub Extensions);

pub fn with_extensions(extensions: Extensions) -> Box<dyn CallOpt> {
    Box::new(WithExtensions(extensions))
}

#[async_trait]
impl CallOpt for WithExtensions {
    async fn apply(self: Box<Self>, _ctx: &Context, builder: &mut CallBuilder) -> Result<()> {
        builder.set_extensions(self.0);
        Ok(())
    }
}

/// Marks a call forwarded by a load balancer, which reports queue wait itself.
pub struct FromLoadBalancer;

pub fn from_load_balancer() -> Box<dyn CallOpt> {
    Box::new(FromLoadBalancer)
}

#[async_trait]
impl CallOpt for FromLoadBalancer {
    async fn apply(self: Box<Self>, _ctx: &Context, builder: &mut CallBuilder) -> Result<()> {
        builder.mark_lb();
        Ok(())
    }
}
