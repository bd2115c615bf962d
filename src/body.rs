use crate::codec::Codec;
use crate::error::{BoxError, Error};
use bytes::{Buf, Bytes, BytesMut};
use compression_codecs::EncodeV2;
use compression_core::util::{PartialBuffer, WriteBuffer};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

pin_project! {
    /// A response body produced by the deflater.
    ///
    /// The original body is owned by this value for its whole life: it is
    /// polled only through this wrapper and dropped exactly once, when the
    /// wrapper is dropped. Dropping is how a transport closes a body, early
    /// or after the last frame.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Compressed body with encoder.
        Compressed {
            #[pin]
            inner: B,
            state: CompressedBody,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
        /// Fixed replacement body. The original is never polled, only held
        /// so that it is released together with the replacement.
        Replaced {
            inner: B,
            message: Option<Bytes>,
        },
    }
}

/// State and buffers for an actively compressed body.
pub struct CompressedBody {
    codec: Codec,
    // Released as soon as the trailer has been produced.
    encoder: Option<Box<dyn EncodeV2 + Send>>,
    output_buffer: Vec<u8>,
    sync: bool,
    state: CompressState,
    pending_trailers: Option<HeaderMap>,
}

/// State machine for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressState {
    /// Reading data from inner body and compressing.
    Reading,
    /// Finishing compression after inner body is done.
    Finishing,
    /// Emitting buffered trailers.
    Trailers,
    /// Compression is complete, or was abandoned after an error.
    Done,
}

impl CompressedBody {
    fn new(codec: Codec, sync: bool) -> Self {
        Self {
            codec,
            encoder: Some(codec.encoder()),
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
            sync,
            state: CompressState::Reading,
            pending_trailers: None,
        }
    }

    pub(crate) fn state(&self) -> CompressState {
        self.state
    }

    #[allow(dead_code)]
    pub(crate) fn sync(&self) -> bool {
        self.sync
    }

    pub(crate) fn codec(&self) -> Codec {
        self.codec
    }

    /// Drops the encoder and its buffers and moves past the data frames.
    fn release(&mut self) {
        self.encoder = None;
        self.output_buffer = Vec::new();
        self.state = if self.pending_trailers.is_some() {
            CompressState::Trailers
        } else {
            CompressState::Done
        };
    }

    /// Gives up on the stream; nothing more will be produced.
    fn abandon(&mut self) {
        self.pending_trailers = None;
        self.release();
    }

    /// Polls the inner body and compresses data.
    fn poll_compressed<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, Error>>>
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<BoxError>,
    {
        loop {
            match self.state {
                CompressState::Done => return Poll::Ready(None),

                CompressState::Trailers => {
                    self.state = CompressState::Done;
                    return Poll::Ready(self.pending_trailers.take().map(|t| Ok(Frame::trailers(t))));
                }

                CompressState::Finishing => {
                    let Some(encoder) = self.encoder.as_mut() else {
                        self.release();
                        continue;
                    };

                    let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
                    let done = match encoder.finish(&mut output) {
                        Ok(done) => done,
                        Err(e) => {
                            self.abandon();
                            return Poll::Ready(Some(Err(Error::Encode(e))));
                        }
                    };
                    let written = output.written_len();
                    let data = (written > 0)
                        .then(|| Bytes::copy_from_slice(&self.output_buffer[..written]));

                    if done {
                        tracing::trace!(
                            encoding = self.codec.content_encoding(),
                            "compressed stream finished"
                        );
                        self.release();
                    }
                    if let Some(data) = data {
                        return Poll::Ready(Some(Ok(Frame::data(data))));
                    }
                }

                CompressState::Reading => match inner.as_mut().poll_frame(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => {
                        self.state = CompressState::Finishing;
                    }
                    Poll::Ready(Some(Err(e))) => {
                        self.abandon();
                        return Poll::Ready(Some(Err(Error::Body(e.into()))));
                    }
                    Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                        Ok(mut data) => {
                            if !data.has_remaining() {
                                continue;
                            }
                            let input = data.copy_to_bytes(data.remaining());
                            match self.compress_chunk(&input) {
                                Ok(Some(output)) => return Poll::Ready(Some(Ok(Frame::data(output)))),
                                // Encoder is buffering, keep feeding it
                                Ok(None) => continue,
                                Err(e) => {
                                    self.abandon();
                                    return Poll::Ready(Some(Err(Error::Encode(e))));
                                }
                            }
                        }
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                // Buffer trailers and finish compression first
                                self.pending_trailers = Some(trailers);
                                self.state = CompressState::Finishing;
                            }
                        }
                    },
                },
            }
        }
    }

    /// Compresses a chunk of input data, returning whatever the encoder
    /// released.
    fn compress_chunk(&mut self, input: &[u8]) -> io::Result<Option<Bytes>> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(None);
        };
        let mut input_buf = PartialBuffer::new(input);
        let mut all_output = BytesMut::new();

        // Keep encoding until all input is consumed
        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            encoder.encode(&mut input_buf, &mut output)?;

            let written = output.written_len();
            if written > 0 {
                all_output.extend_from_slice(&self.output_buffer[..written]);
            }

            if input_buf.written_len() >= input.len() {
                break;
            }

            // Safety check to prevent infinite loop
            if written == 0 && input_buf.written_len() == 0 {
                break;
            }
        }

        if self.sync {
            loop {
                let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
                let done = encoder.flush(&mut output)?;

                let written = output.written_len();
                if written > 0 {
                    all_output.extend_from_slice(&self.output_buffer[..written]);
                }
                if done {
                    break;
                }
            }
        }

        Ok((!all_output.is_empty()).then(|| all_output.freeze()))
    }
}

impl<B> CompressionBody<B> {
    /// Creates a compressed body with the given codec.
    ///
    /// With `sync` set, every non-empty chunk of `inner` yields a flushed
    /// compressed chunk.
    pub fn compressed(inner: B, codec: Codec, sync: bool) -> Self {
        Self::Compressed {
            inner,
            state: CompressedBody::new(codec, sync),
        }
    }

    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Creates a body that yields `message` instead of `inner`.
    pub fn replaced(inner: B, message: Bytes) -> Self {
        Self::Replaced {
            inner,
            message: Some(message),
        }
    }

    /// Returns the codec if this body is being compressed.
    pub fn codec(&self) -> Option<Codec> {
        match self {
            CompressionBody::Compressed { state, .. } => Some(state.codec()),
            _ => None,
        }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(Error::Body(e.into())))),
            },
            CompressionBodyProj::Compressed { inner, state } => state.poll_compressed(cx, inner),
            CompressionBodyProj::Replaced { message, .. } => {
                Poll::Ready(message.take().map(|m| Ok(Frame::data(m))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { state, .. } => state.state() == CompressState::Done,
            CompressionBody::Replaced { message, .. } => message.is_none(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            // Compressed size is unknown
            CompressionBody::Compressed { .. } => SizeHint::default(),
            CompressionBody::Replaced { message, .. } => {
                SizeHint::with_exact(message.as_ref().map_or(0, |m| m.len() as u64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{DeflateDecoder, GzDecoder};
    use std::collections::VecDeque;
    use std::io::Read;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A test body that yields predefined frames and counts its drops.
    struct TestBody {
        frames: VecDeque<Result<Frame<Bytes>, io::Error>>,
        drops: Arc<AtomicUsize>,
    }

    impl TestBody {
        fn new(frames: Vec<Frame<Bytes>>) -> Self {
            Self {
                frames: frames.into_iter().map(Ok).collect(),
                drops: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn chunks(chunks: &[&'static str]) -> Self {
            Self::new(
                chunks
                    .iter()
                    .map(|c| Frame::data(Bytes::from_static(c.as_bytes())))
                    .collect(),
            )
        }

        fn failing_after(chunk: &'static str) -> Self {
            let mut body = Self::chunks(&[chunk]);
            body.frames
                .push_back(Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream reset")));
            body
        }
    }

    impl Drop for TestBody {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Body for TestBody {
        type Data = Bytes;
        type Error = io::Error;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Ready(self.frames.pop_front())
        }
    }

    fn poll_body<B: Body + Unpin>(body: &mut B) -> Option<Result<Frame<B::Data>, B::Error>> {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match Pin::new(body).poll_frame(&mut cx) {
            Poll::Ready(result) => result,
            Poll::Pending => None,
        }
    }

    /// Drains a body, returning its data frames.
    fn data_frames<B>(body: &mut CompressionBody<B>) -> Vec<Bytes>
    where
        B: Body + Unpin,
        B::Data: Buf,
        B::Error: Into<BoxError>,
    {
        let mut frames = Vec::new();
        while let Some(frame) = poll_body(body) {
            if let Ok(data) = frame.unwrap().into_data() {
                frames.push(data);
            }
        }
        frames
    }

    fn concat(frames: &[Bytes]) -> Vec<u8> {
        frames.iter().flat_map(|f| f.iter().copied()).collect()
    }

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    fn inflate(data: &[u8]) -> String {
        let mut out = String::new();
        DeflateDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_passthrough_data() {
        let inner = TestBody::new(vec![Frame::data(Bytes::from("hello world"))]);
        let mut body = CompressionBody::passthrough(inner);

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_data());
        assert_eq!(frame.into_data().unwrap(), Bytes::from("hello world"));

        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_passthrough_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("data")),
            Frame::trailers(trailers.clone()),
        ]);
        let mut body = CompressionBody::passthrough(inner);

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_data());

        let frame = poll_body(&mut body).unwrap().unwrap();
        let received_trailers = frame.into_trailers().unwrap();
        assert_eq!(received_trailers.get("x-checksum").unwrap(), "abc123");

        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_gzip_round_trip() {
        let mut body = CompressionBody::compressed(TestBody::chunks(&["foo", "bar"]), Codec::Gzip, true);

        let compressed = concat(&data_frames(&mut body));
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(&compressed), "foobar");
        assert!(body.is_end_stream());
    }

    #[test]
    fn test_deflate_round_trip() {
        let mut body =
            CompressionBody::compressed(TestBody::chunks(&["foo", "bar"]), Codec::Deflate, true);

        let compressed = concat(&data_frames(&mut body));
        assert_eq!(inflate(&compressed), "foobar");
    }

    #[test]
    fn test_empty_body_still_produces_valid_stream() {
        let mut body = CompressionBody::compressed(TestBody::chunks(&[]), Codec::Gzip, true);
        assert_eq!(gunzip(&concat(&data_frames(&mut body))), "");
    }

    #[test]
    fn test_sync_emits_every_chunk() {
        let mut body =
            CompressionBody::compressed(TestBody::chunks(&["foo", "bar", "baz"]), Codec::Deflate, true);

        // One frame per input chunk, then the final block
        for _ in 0..3 {
            let frame = poll_body(&mut body).unwrap().unwrap();
            assert!(!frame.into_data().unwrap().is_empty());
        }
        let rest = data_frames(&mut body);
        assert!(!rest.is_empty());
    }

    #[test]
    fn test_unsynced_buffers_output() {
        let chunks = vec!["hello\n"; 21];

        let mut synced = CompressionBody::compressed(TestBody::chunks(&chunks), Codec::Gzip, true);
        let synced_frames = data_frames(&mut synced);

        let mut unsynced = CompressionBody::compressed(TestBody::chunks(&chunks), Codec::Gzip, false);
        let unsynced_frames = data_frames(&mut unsynced);

        let unsynced_bytes = concat(&unsynced_frames);
        assert!(unsynced_bytes.len() < concat(&synced_frames).len());
        assert!(unsynced_frames.len() < synced_frames.len());
        assert_eq!(gunzip(&unsynced_bytes), "hello\n".repeat(21));
        assert_eq!(gunzip(&concat(&synced_frames)), "hello\n".repeat(21));
    }

    #[test]
    fn test_empty_chunks_are_skipped() {
        let mut with_empty =
            CompressionBody::compressed(TestBody::chunks(&["", "foo", "", ""]), Codec::Deflate, true);
        let mut without =
            CompressionBody::compressed(TestBody::chunks(&["foo"]), Codec::Deflate, true);

        let with_empty = data_frames(&mut with_empty);
        let without = data_frames(&mut without);
        assert_eq!(with_empty, without);
        assert_eq!(inflate(&concat(&with_empty)), "foo");
    }

    #[test]
    fn test_compressed_with_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("hello world")),
            Frame::trailers(trailers),
        ]);
        let mut body = CompressionBody::compressed(inner, Codec::Gzip, false);

        let mut data = Vec::new();
        let mut trailer_frame = None;
        while let Some(Ok(frame)) = poll_body(&mut body) {
            assert!(trailer_frame.is_none(), "trailers must be the last frame");
            match frame.into_data() {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(frame) => trailer_frame = Some(frame),
            }
        }

        assert_eq!(gunzip(&data), "hello world");
        let trailers = trailer_frame
            .expect("Expected trailers frame")
            .into_trailers()
            .unwrap();
        assert_eq!(trailers.get("x-checksum").unwrap(), "abc123");
        assert!(body.is_end_stream());
    }

    #[test]
    fn test_inner_error_is_surfaced_unchanged() {
        let mut body =
            CompressionBody::compressed(TestBody::failing_after("foo"), Codec::Gzip, true);

        assert!(poll_body(&mut body).unwrap().is_ok());

        let err = poll_body(&mut body).unwrap().unwrap_err();
        assert!(!err.is_encode());
        let source = err.into_body_error().unwrap();
        let io_err = source.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);

        // Nothing more after an abort
        assert!(poll_body(&mut body).is_none());
        assert!(body.is_end_stream());
    }

    #[test]
    fn test_inner_dropped_once_after_consumption() {
        let inner = TestBody::chunks(&["foo", "bar"]);
        let drops = inner.drops.clone();
        let mut body = CompressionBody::compressed(inner, Codec::Gzip, true);

        data_frames(&mut body);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(body);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inner_dropped_once_on_early_abort() {
        let inner = TestBody::chunks(&["foo", "bar", "baz"]);
        let drops = inner.drops.clone();
        let mut body = CompressionBody::compressed(inner, Codec::Deflate, true);

        assert!(poll_body(&mut body).unwrap().is_ok());
        drop(body);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_encoder_released_after_finish() {
        let mut body = CompressionBody::compressed(TestBody::chunks(&["foo"]), Codec::Gzip, true);
        data_frames(&mut body);

        match &body {
            CompressionBody::Compressed { state, .. } => {
                assert_eq!(state.state(), CompressState::Done);
                assert!(state.encoder.is_none());
                assert!(state.output_buffer.is_empty());
            }
            _ => panic!("Expected compressed body"),
        }
    }

    #[test]
    fn test_replaced_body() {
        let inner = TestBody::chunks(&["never read"]);
        let drops = inner.drops.clone();
        let mut body = CompressionBody::replaced(inner, Bytes::from_static(b"not acceptable"));

        assert_eq!(body.size_hint().exact(), Some(14));
        let frame = poll_body(&mut body).unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"not acceptable"));
        assert!(poll_body(&mut body).is_none());
        assert!(body.is_end_stream());

        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(body);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_size_hint() {
        let inner = TestBody::chunks(&["foo"]);
        let body = CompressionBody::compressed(inner, Codec::Gzip, true);
        assert_eq!(body.size_hint().exact(), None);
        assert_eq!(body.codec(), Some(Codec::Gzip));

        let body = CompressionBody::passthrough(TestBody::chunks(&["foo"]));
        assert_eq!(body.codec(), None);
    }
}
