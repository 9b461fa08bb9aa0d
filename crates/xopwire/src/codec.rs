//! Message codec seam and the XOP decoding wrapper.

use std::future::Future;
use std::io::Cursor;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::assembler::{AssembledMessage, MessageAssembler};
use crate::boundary::Boundary;
use crate::config::DecoderConfig;
use crate::content_type::{ContentType, is_xop_multipart};
use crate::error::Result;
use crate::multipart::MultipartReader;
use crate::pool::BufferPool;
use crate::registry::PartRegistry;

/// Reads and writes messages of one wire format.
///
/// Implement this for the XML/SOAP codec that [`XopCodec`] should hand
/// resolved documents to. `XopCodec` implements it as well, so wrappers
/// compose.
pub trait MessageCodec: Send + Sync {
    /// Decoded message type.
    type Message: Send;

    /// Decodes one message from `stream`.
    fn read<R>(
        &self,
        stream: &mut R,
        max_header_bytes: usize,
        content_type: &str,
    ) -> impl Future<Output = Result<Self::Message>> + Send
    where
        R: AsyncRead + Unpin + Send;

    /// Encodes one message to `stream`.
    fn write<W>(
        &self,
        message: Self::Message,
        stream: &mut W,
    ) -> impl Future<Output = Result<()>> + Send
    where
        W: AsyncWrite + Unpin + Send;

    /// Returns true if this codec can read `content_type`.
    fn accepts(&self, content_type: &str) -> bool;
}

/// Decodes MTOM envelopes in front of an inner codec.
///
/// Reads of `multipart/related; type="application/xop+xml"` content are
/// split into parts, resolved into one XML document, and passed to the inner
/// codec with the root part's content type. Other reads and every write go
/// to the inner codec unchanged.
#[derive(Debug)]
pub struct XopCodec<C> {
    inner: C,
    config: DecoderConfig,
    pool: BufferPool,
}

impl<C> XopCodec<C> {
    /// Wraps `inner` with the default configuration.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, DecoderConfig::default())
    }

    /// Wraps `inner` with the given configuration.
    #[must_use]
    pub fn with_config(inner: C, config: DecoderConfig) -> Self {
        let pool = BufferPool::new(config.read_chunk_size, config.pooled_buffers);
        Self {
            inner,
            config,
            pool,
        }
    }

    /// The wrapped codec.
    #[must_use]
    pub const fn inner(&self) -> &C {
        &self.inner
    }

    /// The decoder configuration.
    #[must_use]
    pub const fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// The read buffer pool.
    #[must_use]
    pub const fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Reads an MTOM envelope from a stream and resolves its root document.
    ///
    /// # Errors
    ///
    /// Returns a format or limit error for a bad envelope and an I/O error if
    /// the stream fails.
    pub async fn decode_envelope<R>(
        &self,
        stream: &mut R,
        content_type: &str,
    ) -> Result<AssembledMessage>
    where
        R: AsyncRead + Unpin,
    {
        let outer = ContentType::parse(content_type)?;
        let boundary = Boundary::resolve(content_type, self.config.boundary_length_limit)?;
        let parts = MultipartReader::new(stream, &boundary, &self.config, &self.pool)
            .read_all()
            .await?;
        self.assemble(&parts, &outer)
    }

    /// Resolves an MTOM envelope that is already in memory.
    ///
    /// # Errors
    ///
    /// See [`XopCodec::decode_envelope`].
    pub async fn decode_buffered(
        &self,
        data: Bytes,
        content_type: &str,
    ) -> Result<AssembledMessage> {
        let outer = ContentType::parse(content_type)?;
        let boundary = Boundary::resolve(content_type, self.config.boundary_length_limit)?;
        let parts = MultipartReader::buffered(data, &boundary, &self.config)
            .read_all()
            .await?;
        self.assemble(&parts, &outer)
    }

    fn assemble(&self, parts: &PartRegistry, outer: &ContentType) -> Result<AssembledMessage> {
        let assembled = MessageAssembler::new(&self.config).assemble(parts, outer)?;
        tracing::debug!(
            parts = parts.len(),
            size = assembled.body.len(),
            content_type = %assembled.content_type,
            "mtom envelope decoded"
        );
        Ok(assembled)
    }
}

impl<C> MessageCodec for XopCodec<C>
where
    C: MessageCodec,
{
    type Message = C::Message;

    async fn read<R>(
        &self,
        stream: &mut R,
        max_header_bytes: usize,
        content_type: &str,
    ) -> Result<Self::Message>
    where
        R: AsyncRead + Unpin + Send,
    {
        if !is_xop_multipart(content_type) {
            return self.inner.read(stream, max_header_bytes, content_type).await;
        }

        let assembled = match self.decode_envelope(stream, content_type).await {
            Ok(assembled) => assembled,
            Err(e) => {
                tracing::debug!(error = %e, kind = ?e.kind(), "mtom decode failed");
                return Err(e);
            }
        };
        let mut resolved = Cursor::new(assembled.body);
        self.inner
            .read(&mut resolved, max_header_bytes, &assembled.content_type)
            .await
    }

    async fn write<W>(&self, message: Self::Message, stream: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.inner.write(message, stream).await
    }

    fn accepts(&self, content_type: &str) -> bool {
        self.inner.accepts(content_type) || is_xop_multipart(content_type)
    }
}
