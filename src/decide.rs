//! Per-response decision: leave alone, compress, or refuse.

use crate::codec::{Codec, IDENTITY, SUPPORTED_ENCODINGS};
use crate::config::DeflaterConfig;
use crate::context::RequestContext;
use crate::headers::has_token;
use crate::negotiate::negotiate;
use http::{HeaderMap, StatusCode, header};
use http_body::SizeHint;

/// Why a response was left alone before negotiation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The `condition` predicate returned `false`.
    Condition,
    /// The `exclude` predicate returned `true`.
    Excluded,
    /// 1xx, 204 and 304 responses carry no body.
    NoBodyStatus,
    /// Content type not covered by the `include` list.
    ContentType,
    /// `Cache-Control: no-transform`.
    NoTransform,
    /// The body already has a non-identity content coding.
    AlreadyEncoded,
    /// `Content-Length: 0`.
    Empty,
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The response is not eligible; pass it through untouched.
    Skip(SkipReason),
    /// Eligible, but the client prefers the identity coding.
    Identity,
    /// Eligible, but the client accepts no coding at all, not even identity.
    NotAcceptable,
    /// Compress with this codec.
    Compress(Codec),
}

/// Runs the applicability checks in order, stopping at the first failure.
pub fn check_applicable(
    config: &DeflaterConfig,
    ctx: &RequestContext,
    status: StatusCode,
    headers: &HeaderMap,
    size_hint: &SizeHint,
) -> Result<(), SkipReason> {
    if !config.condition_holds(ctx, status, headers, size_hint) {
        return Err(SkipReason::Condition);
    }

    if config.is_excluded(ctx, status, headers, size_hint) {
        return Err(SkipReason::Excluded);
    }

    if is_bodiless_status(status) {
        return Err(SkipReason::NoBodyStatus);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    if !config.includes(content_type) {
        return Err(SkipReason::ContentType);
    }

    if header_has_token(headers, header::CACHE_CONTROL, "no-transform") {
        return Err(SkipReason::NoTransform);
    }

    if !is_identity_encoded(headers) {
        return Err(SkipReason::AlreadyEncoded);
    }

    if has_zero_content_length(headers) {
        return Err(SkipReason::Empty);
    }

    Ok(())
}

/// Decides what to do with a response for the given request.
pub fn decide(
    config: &DeflaterConfig,
    ctx: &RequestContext,
    status: StatusCode,
    headers: &HeaderMap,
    size_hint: &SizeHint,
) -> Decision {
    if let Err(reason) = check_applicable(config, ctx, status, headers, size_hint) {
        return Decision::Skip(reason);
    }

    match negotiate(&ctx.accept_encoding(), SUPPORTED_ENCODINGS) {
        None => Decision::NotAcceptable,
        Some(token) if token == IDENTITY => Decision::Identity,
        Some(token) => Codec::from_token(token).map_or(Decision::Identity, Decision::Compress),
    }
}

/// Returns `true` only if the response will actually be compressed.
pub fn should_compress(
    config: &DeflaterConfig,
    ctx: &RequestContext,
    status: StatusCode,
    headers: &HeaderMap,
    size_hint: &SizeHint,
) -> bool {
    matches!(
        decide(config, ctx, status, headers, size_hint),
        Decision::Compress(_)
    )
}

fn is_bodiless_status(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

fn header_has_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| has_token(v, token))
}

/// Absent, or only the identity coding.
fn is_identity_encoded(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CONTENT_ENCODING)
        .iter()
        .all(|v| {
            v.to_str().is_ok_and(|v| {
                v.split(',')
                    .map(str::trim)
                    .all(|c| c.is_empty() || c.eq_ignore_ascii_case(IDENTITY))
            })
        })
}

fn has_zero_content_length(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|len| len == 0)
}
