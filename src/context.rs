use http::{HeaderMap, Method, Request, Uri, header};

/// The slice of the request the middleware keeps around until the response
/// arrives: method, target and headers.
///
/// Predicates configured on the layer receive this as their first argument.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl RequestContext {
    /// Creates a context from its parts.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    /// Captures the context of an incoming request.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self::new(req.method().clone(), req.uri().clone(), req.headers().clone())
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The full request target.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Path plus query string, as the client sent it.
    pub fn full_path(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// All Accept-Encoding values joined into one list.
    ///
    /// A missing header yields an empty string, i.e. no encoding preferences.
    pub fn accept_encoding(&self) -> String {
        self.headers
            .get_all(header::ACCEPT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Method::GET, Uri::from_static("/"), HeaderMap::new())
    }
}
