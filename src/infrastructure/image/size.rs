use crate::domain::entities::ImageSize;
use crate::domain::ports::{DisplayTarget, SizeResolver};

/// Uses the size a target declares, or a configured maximum.
#[derive(Debug, Clone, Copy)]
pub struct FallbackSizeResolver {
    max: ImageSize,
}

impl FallbackSizeResolver {
    /// Creates a resolver falling back to `max`.
    #[must_use]
    pub const fn new(max: ImageSize) -> Self {
        Self { max }
    }
}

impl SizeResolver for FallbackSizeResolver {
    fn resolve(&self, target: &dyn DisplayTarget) -> ImageSize {
        target
            .declared_size()
            .filter(|size| size.width > 0 && size.height > 0)
            .unwrap_or(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mock::RecordingTarget;

    #[test]
    fn test_declared_size_wins() {
        let resolver = FallbackSizeResolver::new(ImageSize::new(800, 600));
        let target = RecordingTarget::new(None, ImageSize::new(32, 16));
        assert_eq!(resolver.resolve(target.as_ref()), ImageSize::new(32, 16));
    }

    #[test]
    fn test_zero_declared_size_falls_back() {
        let resolver = FallbackSizeResolver::new(ImageSize::new(800, 600));
        let target = RecordingTarget::new(None, ImageSize::new(0, 16));
        assert_eq!(resolver.resolve(target.as_ref()), ImageSize::new(800, 600));
    }
}
