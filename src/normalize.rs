//! Search-key normalization.
//!
//! Build-time keys and query strings go through the same function so that a
//! query matches exactly what the builder stored.

use std::borrow::Cow;

use crate::error::RejectReason;

/// Removes formatting markup: `<tag>` spans are dropped and HTML character
/// references are decoded. Unterminated tags are kept as literal text.
pub fn strip_markup(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['<', '&']) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find(['<', '&']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with('<') {
            match tail.find('>') {
                Some(end) => rest = &tail[end + 1..],
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
            continue;
        }

        match decode_entity(tail) {
            Some((decoded, consumed)) => {
                out.push(decoded);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decodes one character reference at the start of `input` (which begins with
/// `&`). Returns the character and the number of bytes consumed.
fn decode_entity(input: &str) -> Option<(char, usize)> {
    let end = input.bytes().take(12).position(|byte| byte == b';')?;
    let body = &input[1..end];
    let decoded = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => {
            let numeric = body.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some((decoded, end + 1))
}

/// Normalizes a raw search key: strip markup, trim, case-fold.
///
/// Rejects keys that are empty afterwards, still carry control characters,
/// or would change under a second pass (`a&amp;lt;b` decodes to `a&lt;b`).
/// Stored keys are re-checked when shards are decoded, so every accepted key
/// must be a fixed point.
pub fn normalize_key(raw: &str) -> Result<String, RejectReason> {
    let normalized = normalize_text(raw);
    if normalized.is_empty() {
        return Err(RejectReason::EmptyKey);
    }
    if normalized.chars().any(char::is_control) || normalize_text(&normalized) != normalized {
        return Err(RejectReason::UnnormalizableKey);
    }
    Ok(normalized)
}

/// Normalizes a query string the same way keys were normalized at build time.
/// Whitespace-only input becomes the empty string.
pub fn normalize_query(raw: &str) -> String {
    normalize_text(raw)
}

/// Whether `key` is already in normalized form.
pub fn is_normalized_key(key: &str) -> bool {
    matches!(normalize_key(key), Ok(normalized) if normalized == key)
}

/// Cleans human-readable text (display names, disambiguators) for presentation.
pub fn clean_display(raw: &str) -> String {
    strip_markup(raw).trim().to_string()
}

fn normalize_text(raw: &str) -> String {
    strip_markup(raw).trim().to_lowercase()
}
