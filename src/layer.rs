use crate::config::DeflaterConfig;
use crate::service::Deflater;
use std::sync::Arc;
use tower::Layer;

/// A Tower layer that compresses HTTP response bodies.
///
/// This layer wraps services and compresses response bodies with gzip or
/// deflate, based on the client's Accept-Encoding header.
#[derive(Debug, Clone)]
pub struct DeflaterLayer {
    config: Arc<DeflaterConfig>,
}

impl DeflaterLayer {
    /// Creates a new layer with default settings.
    ///
    /// Every content type is eligible, no predicates are set, and the
    /// encoder is flushed after every chunk.
    pub fn new() -> Self {
        Self::with_config(DeflaterConfig::default())
    }

    /// Creates a layer from a built configuration.
    pub fn with_config(config: DeflaterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Sets whether the encoder is flushed after every body chunk.
    pub fn sync(self, sync: bool) -> Self {
        let mut config = Arc::unwrap_or_clone(self.config);
        config.set_sync(sync);
        Self::with_config(config)
    }

    /// Returns the configuration shared by every wrapped service.
    pub fn config(&self) -> &DeflaterConfig {
        &self.config
    }
}

impl Default for DeflaterLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for DeflaterLayer {
    type Service = Deflater<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Deflater::new(inner, self.config.clone())
    }
}
