use crate::handler::{CallHandler, CallListeners, Extensions};
use crate::logs::CallLog;
use crate::sink::{OutputSink, QUEUE_WAIT_HEADER};
use crate::{Context, Error, Result};
use chrono::Utc;
use faas_common::{decimate, CallModel, CallParams, CallState, CallStatus, Stat};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// One assembled invocation, owned by a single task from admission until
/// [`Call::end`] returns.
///
/// Parameters are read-only after assembly; lifecycle state only changes in
/// [`Call::start`] and [`Call::end`].
pub struct Call {
    pub(crate) model: CallModel,
    pub(crate) is_cloud_event: bool,
    pub(crate) is_lb: bool,
    pub(crate) extensions: Extensions,
    pub(crate) slot_hash_id: String,
    pub(crate) output: Arc<dyn OutputSink>,
    pub(crate) stderr: CallLog,
    pub(crate) handler: Arc<dyn CallHandler>,
    pub(crate) listeners: CallListeners,
    pub(crate) stats_max_samples: usize,
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("model", &self.model)
            .field("is_cloud_event", &self.is_cloud_event)
            .field("is_lb", &self.is_lb)
            .field("extensions", &self.extensions)
            .field("slot_hash_id", &self.slot_hash_id)
            .finish_non_exhaustive()
    }
}

impl Call {
    pub fn model(&self) -> &CallModel {
        &self.model
    }

    pub fn params(&self) -> &CallParams {
        &self.model.params
    }

    pub fn state(&self) -> &CallState {
        &self.model.state
    }

    pub fn id(&self) -> &str {
        &self.model.params.id
    }

    pub fn payload(&self) -> &str {
        &self.model.payload
    }

    /// Fresh reader over the call payload, for the execution backend.
    pub fn request_body(&self) -> Cursor<Vec<u8>> {
        Cursor::new(self.model.payload.clone().into_bytes())
    }

    pub fn is_cloud_event(&self) -> bool {
        self.is_cloud_event
    }

    pub fn is_lb(&self) -> bool {
        self.is_lb
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Identity used by the placement layer to match this call with a warm
    /// container running the same function definition.
    pub fn slot_hash_id(&self) -> &str {
        &self.slot_hash_id
    }

    pub fn output(&self) -> &Arc<dyn OutputSink> {
        &self.output
    }

    pub fn stderr(&self) -> &CallLog {
        &self.stderr
    }

    /// Append a stats sample gathered by the execution backend. Only accepted
    /// while the call is running.
    pub fn record_stat(&mut self, stat: Stat) -> Result<()> {
        if self.model.state.status != CallStatus::Running {
            return Err(self.invalid_state("record stats"));
        }
        self.model.state.stats.push(stat);
        Ok(())
    }

    fn invalid_state(&self, op: &'static str) -> Error {
        Error::InvalidState {
            call_id: self.model.params.id.clone(),
            status: self.model.state.status,
            op,
        }
    }

    /// Called right before the call is executed.
    ///
    /// An already-done `ctx` is reported without touching the call. Async calls
    /// are marked as taken with the [`CallHandler`] first; if that fails the
    /// caller should leave the call for another worker.
    #[instrument(skip(self, ctx), fields(call_id = %self.model.params.id))]
    pub async fn start(&mut self, ctx: &Context) -> Result<()> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        if self.model.state.status != CallStatus::Queued {
            return Err(self.invalid_state("start"));
        }

        let started_at = Utc::now();
        self.model.state.started_at = Some(started_at);
        self.model.state.status = CallStatus::Running;

        if !self.is_lb {
            if let Some(rw) = self.output.response_writer() {
                let wait = (started_at - self.model.params.created_at)
                    .to_std()
                    .unwrap_or_default();
                rw.set_header(QUEUE_WAIT_HEADER, &format_wait(wait));
            }
        }

        if self.model.params.is_async() {
            self.handler
                .start(ctx, &self.model)
                .await
                .map_err(Error::Reservation)?;
        }

        self.listeners
            .fire_before_call(ctx, &self.model)
            .await
            .map_err(Error::BeforeCall)?;

        debug!("Call started");
        Ok(())
    }

    /// Called once execution is over, whatever its outcome. `err_in` is the
    /// execution error, `None` on success.
    ///
    /// Returns `err_in` unchanged unless the `AfterCall` hook fails, in which
    /// case the hook's error is returned instead. Failing to persist the call
    /// is only logged: the function itself may well have succeeded.
    #[instrument(skip(self, ctx, err_in), fields(call_id = %self.model.params.id))]
    pub async fn end(&mut self, ctx: &Context, err_in: Option<Error>) -> Result<()> {
        if self.model.state.status.is_terminal() {
            return Err(self.invalid_state("end"));
        }

        let state = &mut self.model.state;
        state.completed_at = Some(Utc::now());
        match &err_in {
            None => state.status = CallStatus::Success,
            Some(Error::DeadlineExceeded) => state.status = CallStatus::Timeout,
            Some(err) => {
                state.status = CallStatus::Error;
                state.error = Some(err.to_string());
            }
        }

        // keep the persisted stats series bounded
        let stats = std::mem::take(&mut state.stats);
        state.stats = decimate(self.stats_max_samples, stats);

        let is_async = self.model.params.is_async();
        if let Err(e) = self
            .handler
            .finish(ctx, &self.model, &self.stderr, is_async)
            .await
        {
            error!(error = %e, "error finalizing call on datastore/mq");
        }

        // only after finish, which still reads the buffered logs
        self.stderr.close();

        self.listeners
            .fire_after_call(ctx, &self.model)
            .await
            .map_err(Error::AfterCall)?;

        info!(status = ?self.model.state.status, "Call ended");
        match err_in {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// Queue wait as an ASCII header value: `42us`, `1.250ms` or `3.000s`.
fn format_wait(wait: Duration) -> String {
    let micros = wait.as_micros();
    if micros < 1_000 {
        format!("{micros}us")
    } else if micros < 1_000_000 {
        format!("{:.3}ms", wait.as_secs_f64() * 1_000.0)
    } else {
        format!("{:.3}s", wait.as_secs_f64())
    }
}
