use compression_codecs::{EncodeV2, deflate::DeflateEncoder, gzip::GzipEncoder};
use compression_core::Level;

/// Content-coding token that leaves the body untouched.
pub const IDENTITY: &str = "identity";

/// Encodings the middleware can produce, in server preference order.
///
/// `identity` is listed last so that it only wins when the client ranks it
/// above every real codec.
pub const SUPPORTED_ENCODINGS: &[&str] = &["gzip", "deflate", IDENTITY];

/// Supported compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Gzip container around a deflate stream, with CRC32 and length trailer.
    Gzip,
    /// Raw deflate stream, no zlib header.
    Deflate,
}

impl Codec {
    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
        }
    }

    /// Maps a negotiated content-coding token to a codec.
    ///
    /// Returns `None` for `identity` and anything unsupported.
    pub fn from_token(token: &str) -> Option<Codec> {
        if token.eq_ignore_ascii_case("gzip") {
            Some(Codec::Gzip)
        } else if token.eq_ignore_ascii_case("deflate") {
            Some(Codec::Deflate)
        } else {
            None
        }
    }

    /// Creates a new incremental encoder for this codec.
    pub fn encoder(&self) -> Box<dyn EncodeV2 + Send> {
        match self {
            Codec::Gzip => Box::new(GzipEncoder::new(Level::Default.into())),
            Codec::Deflate => Box::new(DeflateEncoder::new(Level::Default.into())),
        }
    }
}
