use crate::body::CompressionBody;
use crate::config::DeflaterConfig;
use crate::context::RequestContext;
use crate::decide::{Decision, decide};
use crate::headers::{apply_content_encoding, merge_vary};
use bytes::Bytes;
use http::response::Parts;
use http::{HeaderMap, HeaderValue, Response, StatusCode, header};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pin_project! {
    /// Future for deflater service responses.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        context: RequestContext,
        config: Arc<DeflaterConfig>,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, context: RequestContext, config: Arc<DeflaterConfig>) -> Self {
        Self {
            inner,
            context,
            config,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(response)) => {
                let response = wrap_response(response, this.context, this.config);
                Poll::Ready(Ok(response))
            }
        }
    }
}

/// Wraps the response body with compression if appropriate.
fn wrap_response<B>(
    response: Response<B>,
    ctx: &RequestContext,
    config: &DeflaterConfig,
) -> Response<CompressionBody<B>>
where
    B: Body,
{
    let (mut parts, body) = response.into_parts();

    let body = match decide(config, ctx, parts.status, &parts.headers, &body.size_hint()) {
        Decision::Skip(reason) => {
            tracing::debug!(?reason, status = %parts.status, path = ctx.path(), "response not compressed");
            CompressionBody::passthrough(body)
        }
        Decision::Identity => {
            merge_vary(&mut parts.headers);
            CompressionBody::passthrough(body)
        }
        Decision::NotAcceptable => return not_acceptable(parts, body, ctx),
        Decision::Compress(codec) => {
            tracing::debug!(encoding = codec.content_encoding(), path = ctx.path(), "compressing response");
            merge_vary(&mut parts.headers);
            apply_content_encoding(&mut parts.headers, codec);
            CompressionBody::compressed(body, codec, config.sync())
        }
    };

    Response::from_parts(parts, body)
}

/// Replaces the response with a 406 when the client rules out every coding,
/// identity included. The original body is held until the new one is dropped.
fn not_acceptable<B>(
    mut parts: Parts,
    body: B,
    ctx: &RequestContext,
) -> Response<CompressionBody<B>> {
    tracing::debug!(path = ctx.path(), "no acceptable content coding");

    let message = Bytes::from(format!(
        "An acceptable encoding for the requested resource {} could not be found.",
        ctx.full_path()
    ));

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(message.len()));
    headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));

    parts.status = StatusCode::NOT_ACCEPTABLE;
    parts.headers = headers;

    Response::from_parts(parts, CompressionBody::replaced(body, message))
}
