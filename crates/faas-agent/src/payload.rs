use crate::{Context, Error, Result};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tracing::debug;

/// Request body stream handed to the agent by the HTTP layer.
pub type Body = Box<dyn AsyncRead + Send + Unpin + 'static>;

pub fn empty_body() -> Body {
    Box::new(tokio::io::empty())
}

/// Reusable read buffers for payload ingestion.
///
/// Only the task that filled a buffer ever gives it back, and only after its
/// caller has accepted the result, so a buffer still being written by an
/// abandoned read can never be handed to another load.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    max_buffers: usize,
    max_capacity: usize,
}

impl BufferPool {
    pub fn new(max_buffers: usize, max_capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_buffers)),
            max_buffers,
            max_capacity,
        }
    }

    fn get(&self) -> Vec<u8> {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default()
    }

    fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() > self.max_capacity {
            return;
        }
        buf.clear();
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        if buffers.len() < self.max_buffers {
            buffers.push(buf);
        }
    }

    /// Buffers currently parked in the pool.
    pub fn available(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Debug, Clone)]
pub struct PayloadLoader {
    pool: Arc<BufferPool>,
}

impl PayloadLoader {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Read `body` to the end, giving up as soon as `ctx` is done.
    ///
    /// The read runs on its own task so a body that never yields still lets
    /// us observe cancellation.
    pub async fn load(&self, ctx: &Context, body: Body) -> Result<String> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let (tx, rx) = oneshot::channel::<io::Result<String>>();
        let pool = self.pool.clone();
        let reader = tokio::spawn(read_body(pool, body, tx));

        tokio::select! {
            res = rx => match res {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(e)) => Err(Error::Payload(e)),
                Err(_) => Err(Error::Payload(io::Error::other("payload reader stopped"))),
            },
            err = ctx.done() => {
                debug!(error = %err, "Payload read abandoned");
                reader.abort();
                Err(err)
            }
        }
    }
}

async fn read_body(pool: Arc<BufferPool>, mut body: Body, tx: oneshot::Sender<io::Result<String>>) {
    let mut buf = pool.get();
    match body.read_to_end(&mut buf).await {
        Ok(_) => {
            let payload = String::from_utf8_lossy(&buf).into_owned();
            // a failed send means the caller gave up; the buffer is dropped
            if tx.send(Ok(payload)).is_ok() {
                pool.put(buf);
            }
        }
        Err(e) => {
            let _ = tx.send(Err(e));
        }
    }
}
