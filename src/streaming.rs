//! Push-driven response bodies.
//!
//! A handler that wants to write its body incrementally (server-sent events,
//! long polls, generated exports) creates a [`channel`], returns the
//! [`StreamingBody`] half in its response, and keeps writing into the
//! [`BodySink`]. The deflater wraps the receiving half like any other body,
//! so the producer keeps writing plain bytes into the same sink while the
//! client receives compressed ones.

use crate::error::{BodyClosed, BoxError};
use bytes::Bytes;
use http_body::{Body, Frame};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Creates a streaming body and the sink that feeds it.
///
/// `buffer` is the number of chunks that may be queued before
/// [`BodySink::write`] waits for the consumer. It is at least 1.
pub fn channel(buffer: usize) -> (BodySink, StreamingBody) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (BodySink { tx }, StreamingBody { rx })
}

/// Writing half of a [`StreamingBody`].
///
/// Dropping every sink ends the body.
#[derive(Debug, Clone)]
pub struct BodySink {
    tx: mpsc::Sender<Result<Bytes, BoxError>>,
}

impl BodySink {
    /// Sends a chunk, waiting while the queue is full.
    ///
    /// Fails with [`BodyClosed`] once the consumer has dropped the body.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), BodyClosed> {
        self.tx.send(Ok(chunk.into())).await.map_err(|_| BodyClosed)
    }

    /// Ends the body with an error instead of a clean end of stream.
    ///
    /// The consumer receives `err` as is.
    pub async fn abort(self, err: impl Into<BoxError>) {
        // A gone consumer has nothing left to notify
        let _ = self.tx.send(Err(err.into())).await;
    }

    /// Whether the consumer has dropped the body.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer has dropped the body.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Reading half of a streaming body; an ordinary [`http_body::Body`].
#[derive(Debug)]
pub struct StreamingBody {
    rx: mpsc::Receiver<Result<Bytes, BoxError>>,
}

impl Body for StreamingBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|chunk| chunk.map(Frame::data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::CompressionBody;
    use crate::codec::Codec;
    use flate2::read::GzDecoder;
    use http_body_util::BodyExt;
    use std::io::{self, Read};

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let (sink, body) = channel(4);
        sink.write("foo").await.unwrap();
        sink.write(Bytes::from_static(b"bar")).await.unwrap();
        drop(sink);

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"foobar"));
    }

    #[tokio::test]
    async fn test_compressed_streaming_body() {
        let (sink, body) = channel(1);
        let producer = tokio::spawn(async move {
            for _ in 0..21 {
                sink.write("hello\n").await.unwrap();
            }
        });

        let body = CompressionBody::compressed(body, Codec::Gzip, true);
        let compressed = body.collect().await.unwrap().to_bytes();
        producer.await.unwrap();

        let mut out = String::new();
        GzDecoder::new(&compressed[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello\n".repeat(21));
    }

    #[tokio::test]
    async fn test_consumer_drop_surfaces_to_producer() {
        let (sink, body) = channel(1);
        assert!(!sink.is_closed());

        drop(body);

        assert!(sink.is_closed());
        sink.closed().await;
        assert_eq!(sink.write("late").await, Err(BodyClosed));
    }

    #[tokio::test]
    async fn test_abort_passes_producer_error_through() {
        let (sink, body) = channel(4);
        sink.write("partial").await.unwrap();
        sink.abort(io::Error::new(io::ErrorKind::TimedOut, "upstream stalled"))
            .await;

        let mut body = CompressionBody::compressed(body, Codec::Deflate, true);
        let first = body.frame().await.unwrap().unwrap();
        assert!(first.is_data());

        let err = body.frame().await.unwrap().unwrap_err();
        let source = err.into_body_error().unwrap();
        assert_eq!(
            source.downcast_ref::<io::Error>().unwrap().kind(),
            io::ErrorKind::TimedOut
        );
        assert!(body.frame().await.is_none());
    }
}
