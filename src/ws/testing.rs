//! In-memory transports and helpers for unit tests.

use crate::error::TransportError;
use crate::ws::types::Transport;
use async_trait::async_trait;
use axum::extract::ws::{Message, Utf8Bytes};
use futures::channel::mpsc;
use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
});

/// Inbound half fed by the test: push frames, or drop the sender to end the stream.
pub(crate) type Inbound = mpsc::UnboundedReceiver<Result<Message, axum::Error>>;
pub(crate) type InboundTx = mpsc::UnboundedSender<Result<Message, axum::Error>>;

pub(crate) fn inbound() -> (InboundTx, Inbound) {
    mpsc::unbounded()
}

pub(crate) fn broken_pipe() -> axum::Error {
    axum::Error::new(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "peer went away",
    ))
}

/// Records every frame written; can be told to fail all writes.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingTransport {
    frames: Arc<Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub(crate) fn failing() -> Self {
        let transport = Self::default();
        transport.fail_writes.store(true, Ordering::SeqCst);
        transport
    }

    pub(crate) fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn write(&mut self, payload: Utf8Bytes) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::WebSocket(broken_pipe()));
        }
        self.frames.lock().unwrap().push(payload.as_str().to_owned());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Never completes a write. Models a stalled client.
#[derive(Debug, Default)]
pub(crate) struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    async fn write(&mut self, _payload: Utf8Bytes) -> Result<(), TransportError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Writes each frame in two halves with a yield in between, newline terminated.
/// Without a send lock, concurrent writers would interleave the halves.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChunkedTransport {
    output: Arc<Mutex<String>>,
}

impl ChunkedTransport {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.output
            .lock()
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

#[async_trait]
impl Transport for ChunkedTransport {
    async fn write(&mut self, payload: Utf8Bytes) -> Result<(), TransportError> {
        let text = payload.as_str();
        let mid = text.len() / 2;
        self.output.lock().unwrap().push_str(&text[..mid]);
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        let mut output = self.output.lock().unwrap();
        output.push_str(&text[mid..]);
        output.push('\n');
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Polls `check` until it holds, failing the test after about two seconds.
pub(crate) async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}
