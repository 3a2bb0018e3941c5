//! Memory cache keys.
//!
//! A key renders as `<id>_<width>x<height>`. The id and the size are stored
//! separately, so grouping keys by id never has to re-split the rendered form.

use std::cmp::Ordering;
use std::sync::Arc;

use super::{ImageId, ImageSize};

const ID_AND_SIZE_SEPARATOR: char = '_';

/// Key of a decoded image in the memory cache, unique per (id, size).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    id: Arc<str>,
    size: ImageSize,
}

impl CacheKey {
    /// Derives the key for `id` decoded at `size`.
    #[must_use]
    pub fn generate(id: &ImageId, size: ImageSize) -> Self {
        Self {
            id: Arc::from(id.as_str()),
            size,
        }
    }

    /// Parses a rendered key.
    ///
    /// Splits on the last separator, so ids containing `_` round-trip as long
    /// as the suffix is a well-formed `<digits>x<digits>`.
    #[must_use]
    pub fn parse(rendered: &str) -> Option<Self> {
        let (id, size) = rendered.rsplit_once(ID_AND_SIZE_SEPARATOR)?;
        let (w, h) = size.split_once('x')?;
        if w.is_empty() || h.is_empty() || !w.bytes().chain(h.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            id: Arc::from(id),
            size: ImageSize::new(w.parse().ok()?, h.parse().ok()?),
        })
    }

    /// Returns the id part of the key.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the size part of the key.
    #[must_use]
    pub const fn size(&self) -> ImageSize {
        self.size
    }

    /// Orders keys by id only, so every size of one image sorts together.
    #[must_use]
    pub fn fuzzy_cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }

    /// Returns true if both keys belong to the same image id.
    #[must_use]
    pub fn same_image(&self, other: &Self) -> bool {
        self.fuzzy_cmp(other) == Ordering::Equal
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}x{}",
            self.id, ID_AND_SIZE_SEPARATOR, self.size.width, self.size.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str, w: u32, h: u32) -> CacheKey {
        CacheKey::generate(&ImageId::new(id), ImageSize::new(w, h))
    }

    #[test]
    fn test_generate_format() {
        assert_eq!(key("http://a/b.png", 100, 50).to_string(), "http://a/b.png_100x50");
    }

    #[test]
    fn test_generate_is_deterministic() {
        assert_eq!(key("img", 10, 20), key("img", 10, 20));
        assert_ne!(key("img", 10, 20), key("img", 20, 10));
    }

    #[test]
    fn test_fuzzy_cmp_ignores_size() {
        assert_eq!(key("a", 10, 10).fuzzy_cmp(&key("a", 999, 1)), Ordering::Equal);
        assert_eq!(key("a", 999, 999).fuzzy_cmp(&key("b", 1, 1)), Ordering::Less);
        assert_eq!(key("b", 1, 1).fuzzy_cmp(&key("a", 999, 999)), Ordering::Greater);
    }

    #[test]
    fn test_fuzzy_sort_groups_ids() {
        let mut keys = vec![key("b", 1, 1), key("a", 2, 2), key("b", 3, 3), key("a", 4, 4)];
        keys.sort_by(CacheKey::fuzzy_cmp);
        let ids: Vec<&str> = keys.iter().map(CacheKey::id).collect();
        assert_eq!(ids, vec!["a", "a", "b", "b"]);
    }

    #[test]
    fn test_id_with_separator_stays_grouped() {
        let tricky = key("photo_12x34", 100, 100);
        assert!(tricky.same_image(&key("photo_12x34", 5, 5)));
        assert!(!tricky.same_image(&key("photo", 12, 34)));
    }

    #[test]
    fn test_parse_round_trip() {
        let original = key("photo_12x34", 100, 7);
        assert_eq!(CacheKey::parse(&original.to_string()), Some(original));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(CacheKey::parse("no-separator"), None);
        assert_eq!(CacheKey::parse("id_12"), None);
        assert_eq!(CacheKey::parse("id_x4"), None);
        assert_eq!(CacheKey::parse("id_1x-4"), None);
    }
}
