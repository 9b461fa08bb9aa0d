//! Streaming multipart reader.
//!
//! The reader makes one forward pass over its input. Each call to
//! [`MultipartReader::next_part`] reads one section: header block first, then
//! the body up to the next delimiter. A body is always drained completely
//! before the following section is looked at, so sections never interleave
//! on the shared read cursor.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, Empty};

use crate::boundary::Boundary;
use crate::config::DecoderConfig;
use crate::error::{Error, Limit, Result};
use crate::header::Headers;
use crate::part::{Part, PartBody};
use crate::pool::{BufferPool, PooledBuffer};
use crate::registry::PartRegistry;

/// Maximum transport padding accepted after a delimiter (RFC 5322 line length).
const MAX_TRANSPORT_PADDING: usize = 998;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Parts,
    Done,
}

/// Splits a multipart body into [`Part`]s.
pub struct MultipartReader<R> {
    input: Input<R>,
    delimiter: Vec<u8>,
    config: DecoderConfig,
    state: State,
    parts_read: usize,
    body_bytes: usize,
}

impl<R> MultipartReader<R> {
    fn with_input(input: Input<R>, boundary: &Boundary, config: &DecoderConfig) -> Self {
        Self {
            input,
            delimiter: boundary.delimiter(),
            config: config.clone(),
            state: State::Preamble,
            parts_read: 0,
            body_bytes: 0,
        }
    }

    /// Number of parts read so far.
    #[must_use]
    pub const fn parts_read(&self) -> usize {
        self.parts_read
    }

    /// Cumulative body bytes read so far.
    #[must_use]
    pub const fn body_bytes(&self) -> usize {
        self.body_bytes
    }
}

impl<R> MultipartReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a reader over a stream, borrowing a read buffer from `pool`.
    ///
    /// Part bodies are copied into buffers owned by each part.
    pub fn new(reader: R, boundary: &Boundary, config: &DecoderConfig, pool: &BufferPool) -> Self {
        let input = Input::Stream {
            reader,
            window: pool.acquire(),
            chunk: config.read_chunk_size.max(1),
            eof: false,
        };
        Self::with_input(input, boundary, config)
    }

    /// Reads the next part, or `None` after the closing delimiter.
    ///
    /// After an error the reader is exhausted and keeps returning `None`.
    ///
    /// # Errors
    ///
    /// Returns a format error for malformed framing or a truncated stream,
    /// and a limit error when the part count, cumulative body size, or a
    /// header block exceeds the configuration.
    pub async fn next_part(&mut self) -> Result<Option<Part>> {
        let result = self.read_section().await;
        if !matches!(result, Ok(Some(_))) {
            self.state = State::Done;
        }
        result
    }

    /// Reads every remaining part into a registry.
    ///
    /// # Errors
    ///
    /// See [`MultipartReader::next_part`].
    pub async fn read_all(mut self) -> Result<PartRegistry> {
        let mut registry = PartRegistry::new();
        while let Some(part) = self.next_part().await? {
            registry.push(part);
        }
        tracing::debug!(
            parts = registry.len(),
            body_bytes = self.body_bytes,
            "multipart body read"
        );
        Ok(registry)
    }

    async fn read_section(&mut self) -> Result<Option<Part>> {
        match self.state {
            State::Done => return Ok(None),
            State::Preamble => {
                self.skip_preamble().await?;
                self.state = State::Parts;
            }
            State::Parts => {}
        }

        if !self.open_section().await? {
            tracing::trace!(parts = self.parts_read, "closing delimiter");
            return Ok(None);
        }

        if self.parts_read >= self.config.max_parts {
            return Err(Error::limit(
                Limit::PartCount,
                self.parts_read + 1,
                self.config.max_parts,
            ));
        }

        let headers = self.read_headers().await?;
        let body = self.read_body().await?;
        self.parts_read += 1;
        tracing::trace!(
            index = self.parts_read - 1,
            content_id = headers.get("content-id"),
            size = body.len(),
            "part read"
        );

        Part::new(headers, body).map(Some)
    }

    /// Discards everything up to and including the first dash-boundary.
    ///
    /// Discarded preamble bytes count against the body size limit.
    async fn skip_preamble(&mut self) -> Result<()> {
        let dash_boundary = &self.delimiter[2..];
        // The stream may open with the dash-boundary, without a leading CRLF.
        self.input.ensure(dash_boundary.len()).await?;
        if self.input.window().starts_with(dash_boundary) {
            self.input.consume(dash_boundary.len());
            return Ok(());
        }

        loop {
            if let Some(pos) = find(self.input.window(), &self.delimiter) {
                self.charge_body(pos)?;
                self.input.consume(pos + self.delimiter.len());
                return Ok(());
            }
            let discard = self
                .input
                .window()
                .len()
                .saturating_sub(self.delimiter.len() - 1);
            self.charge_body(discard)?;
            self.input.consume(discard);
            if !self.input.fill().await? {
                return Err(Error::format("missing opening boundary delimiter"));
            }
        }
    }

    /// Handles the rest of a delimiter line. Returns false on the closing
    /// delimiter.
    async fn open_section(&mut self) -> Result<bool> {
        if !self.input.ensure(2).await? {
            return Err(Error::format("stream ends inside a boundary delimiter"));
        }
        if self.input.window().starts_with(b"--") {
            self.input.consume(2);
            return Ok(false);
        }

        let mut padding = 0;
        loop {
            if !self.input.ensure(1).await? {
                return Err(Error::format("stream ends inside a boundary delimiter"));
            }
            if !matches!(self.input.window()[0], b' ' | b'\t') {
                break;
            }
            self.input.consume(1);
            padding += 1;
            if padding > MAX_TRANSPORT_PADDING {
                return Err(Error::format("boundary delimiter line too long"));
            }
        }

        self.input.ensure(2).await?;
        let window = self.input.window();
        let line_break = if window.starts_with(b"\r\n") {
            2
        } else if window.starts_with(b"\n") {
            1
        } else {
            0
        };
        if line_break == 0 {
            return Err(Error::format(
                "boundary delimiter not followed by a line break",
            ));
        }
        self.input.consume(line_break);
        Ok(true)
    }

    async fn read_headers(&mut self) -> Result<Headers> {
        self.input.ensure(2).await?;
        if self.input.window().starts_with(b"\r\n") {
            self.input.consume(2);
            return Ok(Headers::new());
        }

        let max = self.config.max_part_header_bytes;
        loop {
            if let Some(pos) = find(self.input.window(), b"\r\n\r\n") {
                if pos > max {
                    return Err(Error::limit(Limit::HeaderSize, pos, max));
                }
                let headers = Headers::parse_block(
                    &self.input.window()[..pos],
                    self.config.max_headers_per_part,
                )?;
                self.input.consume(pos + 4);
                return Ok(headers);
            }

            let buffered = self.input.window().len();
            if buffered > max + 3 {
                return Err(Error::limit(Limit::HeaderSize, buffered, max));
            }
            if !self.input.fill().await? {
                return Err(Error::format("stream ends inside part headers"));
            }
        }
    }

    fn charge_body(&mut self, n: usize) -> Result<()> {
        self.body_bytes += n;
        if self.body_bytes > self.config.max_body_bytes {
            return Err(Error::limit(
                Limit::BodySize,
                self.body_bytes,
                self.config.max_body_bytes,
            ));
        }
        Ok(())
    }

    async fn read_body(&mut self) -> Result<PartBody> {
        let mut sink = self.input.sink();
        let delimiter_len = self.delimiter.len();

        loop {
            let found = find(self.input.window(), &self.delimiter);
            // Keep a possible partial delimiter in the window until more
            // data arrives.
            let take = found.unwrap_or_else(|| {
                self.input
                    .window()
                    .len()
                    .saturating_sub(delimiter_len - 1)
            });

            self.charge_body(take)?;
            self.input.take(take, &mut sink);

            if found.is_some() {
                self.input.consume(delimiter_len);
                return Ok(sink.finish());
            }
            if !self.input.fill().await? {
                return Err(Error::format("stream ends inside a part body"));
            }
        }
    }
}

impl MultipartReader<Empty> {
    /// Creates a reader over an envelope already held in memory.
    ///
    /// Part bodies are [`PartBody::Shared`] ranges of `data`; nothing is
    /// copied.
    #[must_use]
    pub fn buffered(data: Bytes, boundary: &Boundary, config: &DecoderConfig) -> Self {
        Self::with_input(Input::Buffered { data, pos: 0 }, boundary, config)
    }
}

/// Where the reader gets its bytes from.
enum Input<R> {
    Stream {
        reader: R,
        window: PooledBuffer,
        chunk: usize,
        eof: bool,
    },
    Buffered {
        data: Bytes,
        pos: usize,
    },
}

impl<R> Input<R>
where
    R: AsyncRead + Unpin,
{
    /// Bytes read but not yet consumed.
    fn window(&self) -> &[u8] {
        match self {
            Self::Stream { window, .. } => &window[..],
            Self::Buffered { data, pos } => &data[*pos..],
        }
    }

    /// Reads more bytes into the window. Returns false at end of input.
    async fn fill(&mut self) -> Result<bool> {
        match self {
            Self::Stream {
                reader,
                window,
                chunk,
                eof,
            } => {
                if *eof {
                    return Ok(false);
                }
                window.reserve(*chunk);
                let n = reader.read_buf(&mut **window).await?;
                if n == 0 {
                    *eof = true;
                }
                Ok(n > 0)
            }
            Self::Buffered { .. } => Ok(false),
        }
    }

    /// Fills until at least `n` bytes are available. Returns false if the
    /// input ends first.
    async fn ensure(&mut self, n: usize) -> Result<bool> {
        while self.window().len() < n {
            if !self.fill().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn consume(&mut self, n: usize) {
        match self {
            Self::Stream { window, .. } => window.advance(n),
            Self::Buffered { pos, .. } => *pos += n,
        }
    }

    fn sink(&self) -> BodySink {
        match self {
            Self::Stream { .. } => BodySink::Owned(BytesMut::new()),
            Self::Buffered { data, pos } => BodySink::Shared {
                source: data.clone(),
                start: *pos,
                len: 0,
            },
        }
    }

    /// Moves `n` window bytes into the body.
    fn take(&mut self, n: usize, sink: &mut BodySink) {
        match sink {
            BodySink::Owned(body) => body.extend_from_slice(&self.window()[..n]),
            BodySink::Shared { len, .. } => *len += n,
        }
        self.consume(n);
    }
}

enum BodySink {
    Owned(BytesMut),
    Shared {
        source: Bytes,
        start: usize,
        len: usize,
    },
}

impl BodySink {
    fn finish(self) -> PartBody {
        match self {
            Self::Owned(body) => PartBody::Owned(body.freeze()),
            Self::Shared { source, start, len } => PartBody::Shared {
                source,
                range: start..start + len,
            },
        }
    }
}

/// Finds the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
