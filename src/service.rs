use crate::config::DeflaterConfig;
use crate::context::RequestContext;
use crate::future::ResponseFuture;
use http::Request;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that compresses HTTP response bodies.
///
/// The inner service is called exactly once per request; its errors are
/// returned unchanged.
#[derive(Debug, Clone)]
pub struct Deflater<S> {
    inner: S,
    config: Arc<DeflaterConfig>,
}

impl<S> Deflater<S> {
    /// Creates a new deflater wrapping the given inner service.
    pub fn new(inner: S, config: Arc<DeflaterConfig>) -> Self {
        Self { inner, config }
    }

    /// Returns the shared configuration.
    pub fn config(&self) -> &DeflaterConfig {
        &self.config
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Deflater<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
    ResBody: http_body::Body,
{
    type Response = http::Response<crate::body::CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Predicates and negotiation run once the response is known
        let context = RequestContext::from_request(&req);

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, context, self.config.clone())
    }
}
