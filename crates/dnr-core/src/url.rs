//! Pattern and domain helpers
//!
//! These work on filter patterns rather than full URLs: a pattern can carry
//! anchors (`||`, `|`), separators (`^`) and wildcards around its host part.

use std::borrow::Cow;

const REGEX_DELIMITER: char = '/';
const PUNYCODE_PREFIX: &str = "xn--";

/// Whether a pattern (or domain entry) is a `/regex/` literal.
#[inline]
pub fn is_regex_pattern(pattern: &str) -> bool {
    pattern.len() > 2 && pattern.starts_with(REGEX_DELIMITER) && pattern.ends_with(REGEX_DELIMITER)
}

/// Strip the `/` delimiters of a regex literal. Non-regex input is returned as-is.
#[inline]
pub fn strip_regex_delimiters(pattern: &str) -> &str {
    if is_regex_pattern(pattern) {
        &pattern[1..pattern.len() - 1]
    } else {
        pattern
    }
}

/// Whether a domain entry uses a `*` wildcard (e.g. `example.*`).
#[inline]
pub fn has_wildcard(domain: &str) -> bool {
    domain.contains('*')
}

/// Convert every non-ASCII label of a pattern or domain to punycode.
///
/// Labels are the runs between ASCII punctuation, so anchors and
/// separators around a host survive untouched:
/// `||пример.рф^` becomes `||xn--e1afmkfd.xn--p1ai^`.
pub fn to_ascii(input: &str) -> Cow<'_, str> {
    if input.is_ascii() {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() * 2);
    let mut label_start = None;

    for (i, ch) in input.char_indices() {
        if is_label_char(ch) {
            if label_start.is_none() {
                label_start = Some(i);
            }
            continue;
        }
        if let Some(start) = label_start.take() {
            push_label(&mut out, &input[start..i]);
        }
        out.push(ch);
    }

    if let Some(start) = label_start {
        push_label(&mut out, &input[start..]);
    }

    Cow::Owned(out)
}

fn is_label_char(ch: char) -> bool {
    !ch.is_ascii() || ch.is_ascii_alphanumeric() || ch == '-'
}

fn push_label(out: &mut String, label: &str) {
    if label.is_ascii() {
        out.push_str(label);
        return;
    }
    match punycode::encode(&label.to_lowercase()) {
        Ok(encoded) => {
            out.push_str(PUNYCODE_PREFIX);
            out.push_str(&encoded);
        }
        Err(()) => out.push_str(label),
    }
}
