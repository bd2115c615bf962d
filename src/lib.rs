//! HTTP response compression middleware for Tower.
//!
//! This crate provides a Tower layer that compresses HTTP response bodies
//! with gzip or raw deflate, negotiated from the client's `Accept-Encoding`
//! header. Bodies are compressed incrementally as the transport pulls them;
//! nothing is buffered beyond one chunk and the encoder's window.
//!
//! # Example
//!
//! ```ignore
//! use http_deflater::{DeflaterConfig, DeflaterLayer};
//! use tower::ServiceBuilder;
//!
//! let config = DeflaterConfig::builder()
//!     .include(["text/", "application/json"])
//!     .exclude(|req, _status, _headers, _size| req.path().starts_with("/downloads"))
//!     .build()?;
//!
//! let service = ServiceBuilder::new()
//!     .layer(DeflaterLayer::with_config(config))
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! Checked in this order; the first failing rule leaves the response alone:
//! - the `condition` predicate, if any, must return `true`
//! - the `exclude` predicate, if any, must return `false`
//! - the status is not 1xx, `204` or `304`
//! - the `Content-Type` matches an `include` prefix, if any are configured
//! - `Cache-Control` does not contain `no-transform`
//! - `Content-Encoding` is absent or `identity`
//! - `Content-Length` is not `0`
//!
//! An eligible response is then negotiated against `gzip`, `deflate` and
//! `identity`, in that order of server preference. If the client accepts
//! none of them, the response is replaced by `406 Not Acceptable`.
//!
//! # Response Modifications
//!
//! For every eligible response, `Vary` is made to include `Accept-Encoding`.
//! When compression is applied:
//! - `Content-Encoding` header is set to the codec used
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//!
//! # Flushing
//!
//! By default the encoder is flushed after every body chunk so streamed
//! responses reach the client promptly. With `sync(false)` the encoder
//! buffers across chunks and only the end of the body forces output.

#![deny(missing_docs)]

mod body;
mod codec;
mod config;
mod context;
mod decide;
mod error;
mod future;
mod headers;
mod layer;
mod negotiate;
mod service;
pub mod streaming;

pub use body::CompressionBody;
pub use codec::{Codec, IDENTITY, SUPPORTED_ENCODINGS};
pub use config::{DeflaterConfig, DeflaterConfigBuilder, Predicate};
pub use context::RequestContext;
pub use decide::{Decision, SkipReason, check_applicable, decide, should_compress};
pub use error::{BodyClosed, BoxError, ConfigError, Error};
pub use future::ResponseFuture;
pub use headers::{apply_content_encoding, merge_vary};
pub use layer::DeflaterLayer;
pub use negotiate::{EncodingPreference, negotiate, parse_accept_encoding};
pub use service::Deflater;
pub use streaming::{BodySink, StreamingBody, channel};
