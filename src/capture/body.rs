use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};
use parking_lot::Mutex;

/// Appended to a captured body that exceeded its budget.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Byte-limited copy of a body, filled as the body is observed.
#[derive(Debug)]
pub struct CaptureBuffer {
    limit: usize,
    bytes: BytesMut,
    seen: usize,
}

impl CaptureBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            bytes: BytesMut::new(),
            seen: 0,
        }
    }

    pub fn shared(limit: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new(limit)))
    }

    pub fn observe(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        self.bytes.extend_from_slice(&chunk[..room.min(chunk.len())]);
        self.seen = self.seen.saturating_add(chunk.len());
    }

    pub fn is_truncated(&self) -> bool {
        self.seen > self.limit
    }

    /// Captured text, or `None` for an empty body.
    pub fn render(&self) -> Option<String> {
        if self.seen == 0 {
            return None;
        }
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.is_truncated() {
            text.push_str(TRUNCATION_MARKER);
        }
        Some(text)
    }
}

type OnComplete = Box<dyn FnOnce() + Send>;

/// Body wrapper that forwards every frame untouched while copying data
/// frames into a [`CaptureBuffer`].
///
/// `on_complete` runs exactly once: at end of stream, on a body error, or
/// when the body is dropped early (client went away).
pub struct TeeBody {
    inner: Body,
    capture: Arc<Mutex<CaptureBuffer>>,
    on_complete: Option<OnComplete>,
}

impl TeeBody {
    pub fn new(inner: Body, capture: Arc<Mutex<CaptureBuffer>>) -> Self {
        Self {
            inner,
            capture,
            on_complete: None,
        }
    }

    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    fn complete(&mut self) {
        if let Some(f) = self.on_complete.take() {
            f();
        }
    }
}

impl HttpBody for TeeBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    self.capture.lock().observe(data);
                }
            }
            Poll::Ready(Some(Err(_))) | Poll::Ready(None) => self.complete(),
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TeeBody {
    fn drop(&mut self) {
        self.complete();
    }
}
