//! `Content-Disposition` values for downloaded documents.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// RFC 5987 `attr-char` minus alphanumerics.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Strip path components and control characters; fall back to `fallback`
/// when nothing usable remains. Always ends in `.<extension>`.
pub fn sanitize_filename(raw: &str, fallback: &str, extension: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|ch| !ch.is_control() && *ch != '"')
        .collect();
    let cleaned = cleaned.trim();
    let name = if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        fallback
    } else {
        cleaned
    };
    let suffix = format!(".{}", extension.to_ascii_lowercase());
    if name.to_ascii_lowercase().ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

/// File name without its final extension.
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// `attachment` disposition with an ASCII fallback and a UTF-8 `filename*`.
pub fn attachment(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|ch| if ch.is_ascii() && !ch.is_ascii_control() { ch } else { '_' })
        .collect();
    let encoded = utf8_percent_encode(filename, ATTR_CHAR);
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}
