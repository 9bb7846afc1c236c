//! Bridges the blocking delivery pipeline onto an async response body.
//!
//! Delivery runs on a blocking worker and writes into a [`ChannelSink`]. Its
//! headers travel over a oneshot once flushed; body chunks follow over a bounded
//! channel. When the client disconnects the receiver is dropped, the next chunk
//! send fails and delivery stops with a stream error.

use std::io;
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::{AppError, AppResult};
use crate::filestore::{ExecutionLimits, FileDelivery, ResponseSink};

/// Chunks buffered between the worker and the connection.
const CHANNEL_DEPTH: usize = 16;

type HeaderList = Vec<(&'static str, String)>;

pub struct ChannelSink {
    headers: HeaderList,
    head_tx: Option<oneshot::Sender<HeaderList>>,
    body_tx: mpsc::Sender<io::Result<Bytes>>,
    pending: Vec<u8>,
    flushed: bool,
}

impl ChannelSink {
    pub fn new(head_tx: oneshot::Sender<HeaderList>, body_tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self { headers: Vec::new(), head_tx: Some(head_tx), body_tx, pending: Vec::new(), flushed: false }
    }

    fn send(&self, bytes: Bytes) -> io::Result<()> {
        self.body_tx
            .blocking_send(Ok(bytes))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }
}

impl ResponseSink for ChannelSink {
    fn set_header(&mut self, name: &'static str, value: String) {
        self.headers.push((name, value));
    }

    fn clear_buffer(&mut self) {
        self.pending.clear();
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(tx) = self.head_tx.take() {
            tx.send(mem::take(&mut self.headers))
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response dropped before headers"))?;
        }
        self.flushed = true;
        if !self.pending.is_empty() {
            let bytes = Bytes::from(mem::take(&mut self.pending));
            self.send(bytes)?;
        }
        Ok(())
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.flushed {
            self.pending.extend_from_slice(bytes);
            return Ok(());
        }
        self.send(Bytes::copy_from_slice(bytes))
    }
}

/// Run delivery on a blocking worker and answer as soon as its headers are flushed.
/// Failures before the flush (missing or unreadable file) become error responses;
/// failures after it end the body with an error, which aborts the connection.
pub async fn deliver_streaming(
    delivery: Arc<FileDelivery>,
    path: PathBuf,
    is_image: bool,
    limits: Arc<dyn ExecutionLimits>,
) -> AppResult<Response> {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, mut body_rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_DEPTH);
    let abort_tx = body_tx.clone();

    let worker = tokio::task::spawn_blocking(move || {
        let mut sink = ChannelSink::new(head_tx, body_tx);
        delivery.deliver(&path, is_image, limits.as_ref(), &mut sink)
    });

    let headers = match head_rx.await {
        Ok(headers) => headers,
        Err(_) => {
            drop(abort_tx);
            return match worker.await {
                Ok(Err(e)) => Err(e.into()),
                Ok(Ok(_)) => Err(AppError::internal("no_headers", "delivery finished without flushing headers")),
                Err(e) => Err(AppError::internal("worker_failed".to_string(), e.to_string())),
            };
        }
    };

    tokio::spawn(async move {
        match worker.await {
            Ok(Ok(sent)) => debug!(target: "filewarden::server", "stream complete ({} bytes)", sent),
            Ok(Err(e)) => {
                warn!(target: "filewarden::server", "stream aborted: {}", e);
                let _ = abort_tx.send(Err(io::Error::other(e.to_string()))).await;
            }
            Err(e) => error!(target: "filewarden::server", "delivery worker failed: {}", e),
        }
    });

    let stream = futures_util::stream::poll_fn(move |cx| body_rx.poll_recv(cx));
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let map = response.headers_mut();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::internal("bad_header".to_string(), e.to_string()))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| AppError::internal("bad_header".to_string(), e.to_string()))?;
        map.insert(name, value);
    }
    Ok(response)
}
