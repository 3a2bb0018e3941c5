//! Core image domain types.

use serde::{Deserialize, Serialize};

/// Opaque identifier of an image source.
///
/// Usually a URL, but any caller-chosen string works. The persistent cache
/// keys files by this id alone, one full-resolution copy per id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(String);

impl ImageId {
    /// Creates a new `ImageId` from any string-like input.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty id, which clears the target instead of loading.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a file-system safe digest of the id.
    #[must_use]
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Target decode dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageSize {
    /// Creates a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the same size with zero dimensions raised to one.
    #[must_use]
    pub const fn non_zero(self) -> Self {
        Self {
            width: if self.width == 0 { 1 } else { self.width },
            height: if self.height == 0 { 1 } else { self.height },
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = w
            .trim()
            .parse()
            .map_err(|e| format!("invalid width '{w}': {e}"))?;
        let height = h
            .trim()
            .parse()
            .map_err(|e| format!("invalid height '{h}': {e}"))?;
        Ok(Self::new(width, height))
    }
}

/// Strategy for choosing the downscale factor during decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DecodingPolicy {
    /// Power-of-two subsampling, cheapest to decode.
    #[default]
    Fast,
    /// Largest integer factor that still covers the target.
    MemorySaving,
}

impl std::fmt::Display for DecodingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::MemorySaving => write!(f, "memory_saving"),
        }
    }
}

/// Reference to a placeholder image the display target knows how to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderRef(pub String);

impl PlaceholderRef {
    /// Creates a new placeholder reference.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the placeholder name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlaceholderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-request display options.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    /// Keep the decoded image in the memory cache.
    #[serde(default = "default_true")]
    pub cache_in_memory: bool,

    /// Keep the raw bytes in the persistent cache.
    #[serde(default = "default_true")]
    pub cache_on_disc: bool,

    /// Show `stub_placeholder` while the image loads.
    #[serde(default)]
    pub show_stub_while_loading: bool,

    /// Show `empty_placeholder` when the id is empty.
    #[serde(default)]
    pub show_placeholder_for_empty_id: bool,

    /// Downscale strategy.
    #[serde(default)]
    pub decoding_policy: DecodingPolicy,

    /// Placeholder applied while loading.
    #[serde(default = "default_stub")]
    pub stub_placeholder: PlaceholderRef,

    /// Placeholder applied for an empty id.
    #[serde(default = "default_empty")]
    pub empty_placeholder: PlaceholderRef,
}

fn default_true() -> bool {
    true
}

fn default_stub() -> PlaceholderRef {
    PlaceholderRef::new("loading")
}

fn default_empty() -> PlaceholderRef {
    PlaceholderRef::new("empty")
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            cache_in_memory: true,
            cache_on_disc: true,
            show_stub_while_loading: false,
            show_placeholder_for_empty_id: false,
            decoding_policy: DecodingPolicy::default(),
            stub_placeholder: default_stub(),
            empty_placeholder: default_empty(),
        }
    }
}

impl DisplayOptions {
    /// Sets memory caching.
    #[must_use]
    pub const fn with_cache_in_memory(mut self, enabled: bool) -> Self {
        self.cache_in_memory = enabled;
        self
    }

    /// Sets disc caching.
    #[must_use]
    pub const fn with_cache_on_disc(mut self, enabled: bool) -> Self {
        self.cache_on_disc = enabled;
        self
    }

    /// Shows the given stub while loading.
    #[must_use]
    pub fn with_stub(mut self, stub: PlaceholderRef) -> Self {
        self.show_stub_while_loading = true;
        self.stub_placeholder = stub;
        self
    }

    /// Shows the given placeholder for empty ids.
    #[must_use]
    pub fn with_empty_placeholder(mut self, placeholder: PlaceholderRef) -> Self {
        self.show_placeholder_for_empty_id = true;
        self.empty_placeholder = placeholder;
        self
    }

    /// Sets the decoding policy.
    #[must_use]
    pub const fn with_decoding_policy(mut self, policy: DecodingPolicy) -> Self {
        self.decoding_policy = policy;
        self
    }
}

/// Where the bytes of a loaded image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Loaded from in-memory LRU cache.
    MemoryCache,
    /// Loaded from disc cache.
    DiscCache,
    /// Fetched through the source provider.
    Provider,
}

impl std::fmt::Display for ImageOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiscCache => write!(f, "disc"),
            Self::Provider => write!(f, "provider"),
        }
    }
}
