//! Headless display targets and listeners for the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, error, info, trace};

use crate::domain::entities::{ImageId, ImageSize, PlaceholderRef};
use crate::domain::errors::LoadError;
use crate::domain::ports::{DisplayTarget, ExecutionContext, ImageLoadingListener};

/// Target that writes every applied image to a PNG file.
pub struct FileTarget {
    path: PathBuf,
    context: Arc<dyn ExecutionContext>,
    size: Option<ImageSize>,
    written: AtomicBool,
}

impl FileTarget {
    /// Creates a target writing to `path`, owned by `context`.
    #[must_use]
    pub fn new(
        path: PathBuf,
        context: Arc<dyn ExecutionContext>,
        size: Option<ImageSize>,
    ) -> Arc<Self> {
        Arc::new(Self {
            path,
            context,
            size,
            written: AtomicBool::new(false),
        })
    }

    /// Creates a target for `id` inside `dir`.
    #[must_use]
    pub fn for_id(
        dir: &Path,
        id: &ImageId,
        context: Arc<dyn ExecutionContext>,
        size: Option<ImageSize>,
    ) -> Arc<Self> {
        Self::new(dir.join(file_name_for(id)), context, size)
    }

    /// File the image is written to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once an image was written.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::SeqCst)
    }
}

impl DisplayTarget for FileTarget {
    fn apply_image(&self, image: Arc<image::DynamicImage>) {
        match image.save_with_format(&self.path, image::ImageFormat::Png) {
            Ok(()) => {
                self.written.store(true, Ordering::SeqCst);
                info!(
                    path = %self.path.display(),
                    width = image.width(),
                    height = image.height(),
                    "Saved image"
                );
            }
            Err(e) => error!(path = %self.path.display(), error = %e, "Failed to save image"),
        }
    }

    fn apply_placeholder(&self, placeholder: &PlaceholderRef) {
        debug!(path = %self.path.display(), placeholder = %placeholder, "Showing placeholder");
    }

    fn clear_image(&self) {
        trace!(path = %self.path.display(), "Cleared");
    }

    fn owner_context(&self) -> Option<Arc<dyn ExecutionContext>> {
        Some(self.context.clone())
    }

    fn declared_size(&self) -> Option<ImageSize> {
        self.size
    }
}

/// Output file name for `id`: the last path segment without its extension,
/// plus a short digest so different ids never collide.
#[must_use]
pub fn file_name_for(id: &ImageId) -> String {
    let digest = id.digest();
    let last = id
        .as_str()
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let stem = last.rsplit_once('.').map_or(last, |(stem, _)| stem);
    let stem: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(48)
        .collect();

    if stem.is_empty() {
        format!("{digest}.png")
    } else {
        format!("{stem}-{}.png", &digest[..8])
    }
}

/// Listener that logs outcomes and counts outstanding requests.
pub struct LoggingListener {
    remaining: AtomicUsize,
    failed: AtomicUsize,
}

impl LoggingListener {
    /// Creates a listener expecting `expected` requests to report back.
    #[must_use]
    pub const fn new(expected: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(expected),
            failed: AtomicUsize::new(0),
        }
    }

    /// Requests that have not reported back yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Requests that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn finish_one(&self) {
        let _ = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

impl ImageLoadingListener for LoggingListener {
    fn on_loading_started(&self, id: &ImageId) {
        debug!(id = %id, "Loading started");
    }

    fn on_loading_complete(&self, id: &ImageId, image: &Arc<image::DynamicImage>) {
        info!(id = %id, width = image.width(), height = image.height(), "Loading complete");
        self.finish_one();
    }

    fn on_loading_failed(&self, id: &ImageId, error: &LoadError) {
        error!(id = %id, error = %error, "Loading failed");
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.finish_one();
    }
}
