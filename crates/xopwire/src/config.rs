//! Decoder configuration types.

use crate::charset::Charset;

/// Default maximum boundary length (RFC 2046).
pub const DEFAULT_BOUNDARY_LENGTH_LIMIT: usize = 70;

/// Default maximum number of parts per envelope.
pub const DEFAULT_MAX_PARTS: usize = 1024;

/// Default maximum cumulative body size (128 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 128 * 1024 * 1024;

/// Default maximum size of a part's header block (16 KiB).
pub const DEFAULT_MAX_PART_HEADER_BYTES: usize = 16 * 1024;

/// Default maximum number of header lines per part.
pub const DEFAULT_MAX_HEADERS_PER_PART: usize = 16;

/// Default size of one stream read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8192;

/// Default number of idle read buffers kept by a pool.
pub const DEFAULT_POOLED_BUFFERS: usize = 16;

/// MTOM decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DecoderConfig {
    /// Maximum boundary token length.
    pub boundary_length_limit: usize,
    /// Maximum number of parts in one envelope.
    pub max_parts: usize,
    /// Maximum cumulative size of all part bodies.
    pub max_body_bytes: usize,
    /// Maximum size of one part's header block.
    pub max_part_header_bytes: usize,
    /// Maximum number of header lines in one part.
    pub max_headers_per_part: usize,
    /// Bytes requested from the stream per read.
    pub read_chunk_size: usize,
    /// Idle read buffers retained for reuse.
    pub pooled_buffers: usize,
    /// Charset used when the root part declares none.
    pub default_charset: Charset,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            boundary_length_limit: DEFAULT_BOUNDARY_LENGTH_LIMIT,
            max_parts: DEFAULT_MAX_PARTS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_part_header_bytes: DEFAULT_MAX_PART_HEADER_BYTES,
            max_headers_per_part: DEFAULT_MAX_HEADERS_PER_PART,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            pooled_buffers: DEFAULT_POOLED_BUFFERS,
            default_charset: Charset::Utf8,
        }
    }
}

impl DecoderConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> DecoderConfigBuilder {
        DecoderConfigBuilder::new()
    }
}

/// Builder for [`DecoderConfig`].
#[derive(Debug, Clone, Default)]
pub struct DecoderConfigBuilder {
    config: DecoderConfig,
}

impl DecoderConfigBuilder {
    /// Creates a builder holding the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the boundary length limit.
    #[must_use]
    pub const fn boundary_length_limit(mut self, limit: usize) -> Self {
        self.config.boundary_length_limit = limit;
        self
    }

    /// Sets the maximum part count.
    #[must_use]
    pub const fn max_parts(mut self, max: usize) -> Self {
        self.config.max_parts = max;
        self
    }

    /// Sets the maximum cumulative body size.
    #[must_use]
    pub const fn max_body_bytes(mut self, max: usize) -> Self {
        self.config.max_body_bytes = max;
        self
    }

    /// Sets the maximum header block size per part.
    #[must_use]
    pub const fn max_part_header_bytes(mut self, max: usize) -> Self {
        self.config.max_part_header_bytes = max;
        self
    }

    /// Sets the maximum number of header lines per part.
    #[must_use]
    pub const fn max_headers_per_part(mut self, max: usize) -> Self {
        self.config.max_headers_per_part = max;
        self
    }

    /// Sets the read chunk size. Zero is treated as one byte.
    #[must_use]
    pub const fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets how many idle buffers the pool keeps.
    #[must_use]
    pub const fn pooled_buffers(mut self, count: usize) -> Self {
        self.config.pooled_buffers = count;
        self
    }

    /// Sets the fallback charset for the root part.
    #[must_use]
    pub const fn default_charset(mut self, charset: Charset) -> Self {
        self.config.default_charset = charset;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> DecoderConfig {
        self.config
    }
}
