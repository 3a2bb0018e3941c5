//! Ports on the display side: targets, their owning loops, listeners, sizing.

use std::sync::Arc;

use crate::domain::entities::{ImageId, ImageSize, PlaceholderRef};
use crate::domain::errors::LoadError;

/// Work posted to a target's owning execution context.
pub type ContextJob = Box<dyn FnOnce() + Send + 'static>;

/// The loop a display target belongs to. Target mutations only run here.
pub trait ExecutionContext: Send + Sync {
    /// Schedules `job` to run on this context.
    fn post(&self, job: ContextJob);
}

/// A mutable surface that shows one image at a time.
pub trait DisplayTarget: Send + Sync {
    /// Shows a decoded image.
    fn apply_image(&self, image: Arc<image::DynamicImage>);

    /// Shows a placeholder.
    fn apply_placeholder(&self, placeholder: &PlaceholderRef);

    /// Shows nothing.
    fn clear_image(&self);

    /// Returns the context that owns this target, if it can be identified.
    fn owner_context(&self) -> Option<Arc<dyn ExecutionContext>>;

    /// Size the target asks for explicitly, if any.
    fn declared_size(&self) -> Option<ImageSize> {
        None
    }
}

/// Callbacks for the loading process of one request.
///
/// Completion and failure run on the target's owning context when it exists.
pub trait ImageLoadingListener: Send + Sync {
    /// Loading started. Fired on the caller's thread.
    fn on_loading_started(&self, _id: &ImageId) {}

    /// Image was applied to the target.
    fn on_loading_complete(&self, _id: &ImageId, _image: &Arc<image::DynamicImage>) {}

    /// Loading failed; the target was left as it was.
    fn on_loading_failed(&self, _id: &ImageId, _error: &LoadError) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ImageLoadingListener for NoopListener {}

/// Determines the size an image should be decoded at for a target.
pub trait SizeResolver: Send + Sync {
    /// Returns the desired decode size for `target`.
    fn resolve(&self, target: &dyn DisplayTarget) -> ImageSize;
}
