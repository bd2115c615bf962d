use crate::context::RequestContext;
use crate::error::ConfigError;
use http::{HeaderMap, StatusCode};
use http_body::SizeHint;
use std::fmt;
use std::sync::Arc;

/// A response predicate: request context, status, response headers and the
/// response body's size hint.
pub type Predicate =
    Arc<dyn Fn(&RequestContext, StatusCode, &HeaderMap, &SizeHint) -> bool + Send + Sync>;

/// Immutable middleware configuration, shared by every request.
#[derive(Clone)]
pub struct DeflaterConfig {
    include: Vec<String>,
    exclude: Option<Predicate>,
    condition: Option<Predicate>,
    sync: bool,
}

impl DeflaterConfig {
    /// Starts building a configuration.
    pub fn builder() -> DeflaterConfigBuilder {
        DeflaterConfigBuilder::default()
    }

    /// Lowercased content-type prefixes eligible for compression.
    ///
    /// Empty means every content type is eligible.
    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Whether to flush the encoder after every body chunk.
    pub fn sync(&self) -> bool {
        self.sync
    }

    pub(crate) fn set_sync(&mut self, sync: bool) {
        self.sync = sync;
    }

    /// Evaluates the `exclude` predicate. Absent means nothing is excluded.
    pub(crate) fn is_excluded(
        &self,
        ctx: &RequestContext,
        status: StatusCode,
        headers: &HeaderMap,
        size_hint: &SizeHint,
    ) -> bool {
        self.exclude
            .as_ref()
            .is_some_and(|f| f(ctx, status, headers, size_hint))
    }

    /// Evaluates the `condition` predicate. Absent means every response passes.
    pub(crate) fn condition_holds(
        &self,
        ctx: &RequestContext,
        status: StatusCode,
        headers: &HeaderMap,
        size_hint: &SizeHint,
    ) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|f| f(ctx, status, headers, size_hint))
    }

    /// Whether a content type matches the `include` list.
    pub(crate) fn includes(&self, content_type: Option<&str>) -> bool {
        if self.include.is_empty() {
            return true;
        }
        let Some(content_type) = content_type else {
            return false;
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        self.include.iter().any(|prefix| mime.starts_with(prefix))
    }
}

impl Default for DeflaterConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: None,
            condition: None,
            sync: true,
        }
    }
}

impl fmt::Debug for DeflaterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeflaterConfig")
            .field("include", &self.include)
            .field("exclude", &self.exclude.is_some())
            .field("condition", &self.condition.is_some())
            .field("sync", &self.sync)
            .finish()
    }
}

/// Builder for [`DeflaterConfig`].
#[derive(Default)]
pub struct DeflaterConfigBuilder {
    include: Vec<String>,
    exclude: Option<Predicate>,
    condition: Option<Predicate>,
    sync: Option<bool>,
}

impl DeflaterConfigBuilder {
    /// Restricts compression to responses whose content type starts with one
    /// of the given prefixes (compared case-insensitively, parameters ignored).
    pub fn include<I, T>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.include.extend(prefixes.into_iter().map(Into::into));
        self
    }

    /// Skips compression whenever the predicate returns `true`.
    pub fn exclude<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, StatusCode, &HeaderMap, &SizeHint) -> bool + Send + Sync + 'static,
    {
        self.exclude = Some(Arc::new(f));
        self
    }

    /// Only compresses when the predicate returns `true`.
    pub fn condition<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, StatusCode, &HeaderMap, &SizeHint) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(f));
        self
    }

    /// Sets whether the encoder is flushed after every chunk (default `true`).
    ///
    /// Turning this off lets the encoder buffer across chunks for a better
    /// ratio; everything is still emitted once the body ends.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<DeflaterConfig, ConfigError> {
        let include = self
            .include
            .into_iter()
            .map(|prefix| {
                let trimmed = prefix.trim();
                if trimmed.is_empty() || trimmed.contains(';') {
                    Err(ConfigError::InvalidInclude(prefix))
                } else {
                    Ok(trimmed.to_ascii_lowercase())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DeflaterConfig {
            include,
            exclude: self.exclude,
            condition: self.condition,
            sync: self.sync.unwrap_or(true),
        })
    }
}
