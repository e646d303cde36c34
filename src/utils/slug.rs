//! URL slugification.
//!
//! Converts titles, filenames and category names to URL-safe segments.

use crate::config::SlugMode;

/// Characters forbidden in URL segments
const FORBIDDEN_CHARS: &[char] = &[
    '<', '>', ':', '|', '?', '*', '#', '\\', '/', '(', ')', '[', ']', '"', '\'', '\t', '\r', '\n',
];

// ============================================================================
// Slugification
// ============================================================================

/// Convert text to a URL segment according to the configured mode.
pub fn slugify(text: &str, mode: &SlugMode) -> String {
    match mode {
        SlugMode::Safe => sanitize_text(text),
        SlugMode::On => slugify_ascii(text),
        SlugMode::No => text.to_owned(),
    }
}

/// Full slugification: transliterate to ASCII, lowercase, and join
/// alphanumeric runs with `-`.
///
/// `"Héllo, Wörld!"` → `"hello-world"`
pub fn slugify_ascii(text: &str) -> String {
    let ascii = deunicode::deunicode(text);
    let mut out = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Remove forbidden characters and replace whitespace runs with `-`
fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.trim().chars() {
        if c.is_whitespace() {
            pending_dash = true;
        } else if !FORBIDDEN_CHARS.contains(&c) {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        }
    }
    out
}
