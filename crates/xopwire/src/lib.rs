//! # xopwire
//!
//! MTOM/XOP message decoding for XML-based RPC.
//!
//! An MTOM message is a `multipart/related` MIME envelope: one XML root part
//! plus binary parts, where the XML points at binary parts through
//! `xop:Include` elements with `cid:` hrefs. This crate turns such an
//! envelope back into a single XML document with the binary content inlined
//! as base64, then hands it to the XML codec you already have.
//!
//! ## Features
//!
//! - **Streaming multipart reader**: one forward pass over any `AsyncRead`,
//!   or zero-copy over an envelope already in memory
//! - **Strict framing**: boundary, header, and disposition validation
//! - **Resource limits**: part count, cumulative body size, header size
//! - **XOP resolution**: every `xop:Include` replaced; the rest of the
//!   document is copied through byte for byte
//! - **Composable**: [`XopCodec`] wraps any [`MessageCodec`] and is one
//!   itself
//!
//! ## Quick Start
//!
//! ```ignore
//! use xopwire::{MessageCodec, XopCodec};
//!
//! let codec = XopCodec::new(my_soap_codec);
//! if codec.accepts(&content_type) {
//!     let message = codec.read(&mut body, 64 * 1024, &content_type).await?;
//! }
//! ```
//!
//! ### Without an inner codec
//!
//! ```ignore
//! use xopwire::{DecoderConfig, XopCodec};
//!
//! let config = DecoderConfig::builder().max_parts(16).build();
//! let codec = XopCodec::with_config((), config);
//! let resolved = codec.decode_envelope(&mut body, &content_type).await?;
//! println!("{}", String::from_utf8_lossy(&resolved.body));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod assembler;
mod boundary;
mod charset;
mod codec;
mod config;
mod content_type;
mod error;
mod header;
mod multipart;
mod part;
mod pool;
mod registry;
mod xop;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use boundary::Boundary;
pub use charset::Charset;
pub use codec::{MessageCodec, XopCodec};
pub use config::{DecoderConfig, DecoderConfigBuilder};
pub use content_type::{ContentType, MULTIPART_RELATED, XOP_XML, is_xop_multipart};
pub use error::{Error, ErrorKind, Limit, Result};
pub use header::Headers;
pub use multipart::MultipartReader;
pub use part::{ContentDisposition, Part, PartBody, PartKind, strip_angle_brackets};
pub use pool::{BufferPool, PooledBuffer};
pub use registry::PartRegistry;
pub use xop::{XOP_NAMESPACE, XopResolver};
