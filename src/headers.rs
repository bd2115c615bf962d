use crate::codec::Codec;
use http::header::{self, HeaderMap, HeaderValue};

const ACCEPT_ENCODING: &str = "Accept-Encoding";

/// Makes sure `Vary` covers `Accept-Encoding`.
///
/// `*` is left alone. An existing list that does not mention
/// `Accept-Encoding` gets it appended (`Origin` becomes
/// `Origin,Accept-Encoding`). Repeated `Vary` headers are folded into one.
pub fn merge_vary(headers: &mut HeaderMap) {
    let mut values: Vec<String> = Vec::new();
    for vary in headers.get_all(header::VARY) {
        let Ok(vary) = vary.to_str() else {
            // Opaque bytes we cannot safely rewrite.
            return;
        };
        values.extend(
            vary.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned),
        );
    }

    let covered = values
        .iter()
        .any(|v| v == "*" || v.eq_ignore_ascii_case(ACCEPT_ENCODING));
    if covered {
        return;
    }

    values.push(ACCEPT_ENCODING.to_owned());
    if let Ok(value) = HeaderValue::from_str(&values.join(",")) {
        headers.insert(header::VARY, value);
    }
}

/// Rewrites entity headers for a body that is about to be compressed.
pub fn apply_content_encoding(headers: &mut HeaderMap, codec: Codec) {
    headers.insert(
        header::CONTENT_ENCODING,
        HeaderValue::from_static(codec.content_encoding()),
    );

    // Compressed size is unknown
    headers.remove(header::CONTENT_LENGTH);

    // Byte ranges of the original representation no longer apply
    headers.remove(header::ACCEPT_RANGES);
}

/// Whether a comma-separated header value contains `token`, ignoring case.
pub(crate) fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|v| v.trim().eq_ignore_ascii_case(token))
}
