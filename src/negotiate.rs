//! Accept-Encoding parsing and content-coding selection.

use crate::codec::IDENTITY;
use std::cmp::Ordering;

/// A single entry of an Accept-Encoding header, e.g. `gzip;q=0.8`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingPreference {
    /// Lowercased content-coding token, or `*`.
    pub encoding: String,
    /// Quality weight in `[0, 1]`.
    pub quality: f32,
}

impl EncodingPreference {
    fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(';');
        let encoding = parts.next()?.trim();
        if encoding.is_empty() {
            return None;
        }

        let quality = parts
            .map(str::trim)
            .find_map(|param| param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")))
            .map_or(1.0, parse_quality);

        Some(Self {
            encoding: encoding.to_ascii_lowercase(),
            quality,
        })
    }
}

/// Malformed or out-of-range weights count as "not acceptable".
fn parse_quality(value: &str) -> f32 {
    match value.trim().parse::<f32>() {
        Ok(q) if q.is_finite() && (0.0..=1.0).contains(&q) => q,
        _ => 0.0,
    }
}

/// Parses an Accept-Encoding header value into its entries, in header order.
///
/// Empty entries are dropped; nothing here ever fails on client input.
pub fn parse_accept_encoding(header: &str) -> Vec<EncodingPreference> {
    header
        .split(',')
        .filter_map(EncodingPreference::parse)
        .collect()
}

/// Picks the best entry of `supported` for the given Accept-Encoding value.
///
/// Candidates are ordered by descending client weight, then by their position
/// in `supported`. `*` stands for every supported token the header does not
/// name explicitly. `identity` is implicitly acceptable at the lowest rank
/// unless a zero weight (on `identity` or `*`) rules it out. Any token that
/// appears with weight 0 is excluded, whatever other entries say about it.
///
/// Returns `None` when nothing in `supported` is acceptable.
pub fn negotiate<'a>(accept_encoding: &str, supported: &[&'a str]) -> Option<&'a str> {
    let preferences = parse_accept_encoding(accept_encoding);

    let rank = |encoding: &str| {
        supported
            .iter()
            .position(|s| s.eq_ignore_ascii_case(encoding))
            .unwrap_or(supported.len())
    };
    let listed = |encoding: &str| {
        preferences
            .iter()
            .any(|p| p.encoding.eq_ignore_ascii_case(encoding))
    };

    // (token, weight, server rank)
    let mut expanded: Vec<(&str, f32, usize)> = Vec::with_capacity(preferences.len());
    for pref in &preferences {
        if pref.encoding == "*" {
            for (idx, s) in supported.iter().copied().enumerate() {
                if !listed(s) {
                    expanded.push((s, pref.quality, idx));
                }
            }
        } else {
            let encoding = pref.encoding.as_str();
            expanded.push((encoding, pref.quality, rank(encoding)));
        }
    }

    expanded.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.2.cmp(&b.2))
    });

    let excluded = |encoding: &str| {
        expanded
            .iter()
            .any(|(e, q, _)| *q == 0.0 && e.eq_ignore_ascii_case(encoding))
    };

    expanded
        .iter()
        .map(|(e, _, _)| *e)
        .chain(std::iter::once(IDENTITY))
        .filter(|e| !excluded(*e))
        .find_map(|e| supported.iter().copied().find(|s| s.eq_ignore_ascii_case(e)))
}
