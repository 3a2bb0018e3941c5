//! Test doubles for the loader ports.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{Semaphore, mpsc};

use super::{
    DecodeSource, DisplayTarget, ExecutionContext, ImageDecoder, ImageLoadingListener,
    ImageSource, SourceProvider,
};
use crate::domain::entities::{DecodingPolicy, ImageId, ImageSize, PlaceholderRef};
use crate::domain::errors::{DecodeError, LoadError};

/// Encodes a blank PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = io::Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(width, height)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encoding failed");
    out.into_inner()
}

/// Reader that yields `prefix` and then fails.
pub struct FailingReader {
    prefix: Vec<u8>,
    sent: bool,
}

impl FailingReader {
    pub fn new(prefix: &[u8]) -> Self {
        Self {
            prefix: prefix.to_vec(),
            sent: false,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.sent {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset mid-copy",
            )));
        }
        self.sent = true;
        let n = self.prefix.len().min(buf.remaining());
        buf.put_slice(&self.prefix[..n]);
        Poll::Ready(Ok(()))
    }
}

/// What happened to a `RecordingTarget`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEvent {
    Image(u32, u32),
    Placeholder(String),
    Cleared,
}

/// Display target that records every mutation.
pub struct RecordingTarget {
    events: Mutex<Vec<TargetEvent>>,
    context: Option<Arc<dyn ExecutionContext>>,
    size: Option<ImageSize>,
}

impl RecordingTarget {
    pub fn new(context: Option<Arc<dyn ExecutionContext>>, size: ImageSize) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            context,
            size: Some(size),
        })
    }

    pub fn events(&self) -> Vec<TargetEvent> {
        self.events.lock().clone()
    }

    pub fn images(&self) -> Vec<(u32, u32)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TargetEvent::Image(w, h) => Some((*w, *h)),
                _ => None,
            })
            .collect()
    }
}

impl DisplayTarget for RecordingTarget {
    fn apply_image(&self, image: Arc<image::DynamicImage>) {
        self.events
            .lock()
            .push(TargetEvent::Image(image.width(), image.height()));
    }

    fn apply_placeholder(&self, placeholder: &PlaceholderRef) {
        self.events
            .lock()
            .push(TargetEvent::Placeholder(placeholder.as_str().to_string()));
    }

    fn clear_image(&self) {
        self.events.lock().push(TargetEvent::Cleared);
    }

    fn owner_context(&self) -> Option<Arc<dyn ExecutionContext>> {
        self.context.clone()
    }

    fn declared_size(&self) -> Option<ImageSize> {
        self.size
    }
}

/// Listener events, in the order they were fired.
#[derive(Debug, Clone)]
pub enum ListenerEvent {
    Started(ImageId),
    Complete(ImageId, (u32, u32)),
    Failed(ImageId, LoadError),
}

/// Listener forwarding every event to a channel.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ListenerEvent>,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ImageLoadingListener for ChannelListener {
    fn on_loading_started(&self, id: &ImageId) {
        let _ = self.tx.send(ListenerEvent::Started(id.clone()));
    }

    fn on_loading_complete(&self, id: &ImageId, image: &Arc<image::DynamicImage>) {
        let _ = self.tx.send(ListenerEvent::Complete(
            id.clone(),
            (image.width(), image.height()),
        ));
    }

    fn on_loading_failed(&self, id: &ImageId, error: &LoadError) {
        let _ = self.tx.send(ListenerEvent::Failed(id.clone(), error.clone()));
    }
}

/// Decoder replaying scripted failures, then producing target-sized images.
pub struct ScriptedDecoder {
    script: Mutex<VecDeque<DecodeError>>,
    calls: AtomicUsize,
}

impl ScriptedDecoder {
    pub fn new(failures: Vec<DecodeError>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(failures.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageDecoder for ScriptedDecoder {
    fn decode(
        &self,
        _source: &DecodeSource,
        target: ImageSize,
        _policy: DecodingPolicy,
    ) -> Result<image::DynamicImage, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.script.lock().pop_front() {
            return Err(err);
        }
        let size = target.non_zero();
        Ok(image::DynamicImage::new_rgb8(size.width, size.height))
    }
}

type SourceFn = dyn Fn(&ImageId) -> Result<ImageSource, LoadError> + Send + Sync;

/// Source provider backed by a closure, optionally held behind a gate.
pub struct MockProvider {
    source: Box<SourceFn>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(
        source: impl Fn(&ImageId) -> Result<ImageSource, LoadError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            source: Box::new(source),
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Provider serving a PNG of the given size for every id.
    pub fn png(width: u32, height: u32) -> Arc<Self> {
        let bytes = png_bytes(width, height);
        Self::new(move |_: &ImageId| Ok(ImageSource::from_bytes(bytes.clone())))
    }

    /// Like `png`, but every fetch waits for `open_gate`.
    pub fn gated_png(width: u32, height: u32) -> Arc<Self> {
        let bytes = png_bytes(width, height);
        Arc::new(Self {
            source: Box::new(move |_: &ImageId| Ok(ImageSource::from_bytes(bytes.clone()))),
            gate: Some(Semaphore::new(0)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1024);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for MockProvider {
    async fn fetch(&self, id: &ImageId) -> Result<ImageSource, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| LoadError::io(e.to_string()))?;
            drop(permit);
        }
        (self.source)(id)
    }
}
