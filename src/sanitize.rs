//! Cleanup of assistant answers before display.

use std::sync::LazyLock;

use regex::Regex;

/// Inline footnote tags such as `【3:0†manual.pdf】`.
static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【\d+:[^】]*?†[^】]*?】").expect("citation pattern is valid"));

/// Removes citation markers and normalizes whitespace.
///
/// Every marker is dropped, runs of whitespace collapse to one space, and the
/// result is trimmed.  Nothing else is touched.
///
/// ```
/// # use threadchat::sanitize;
/// assert_eq!(sanitize("Hola 【1:x†y】mundo"), "Hola mundo");
/// assert_eq!(sanitize("  a \n\t b  "), "a b");
/// ```
pub fn sanitize(raw: &str) -> String {
    let stripped = CITATION_MARKER.replace_all(raw, "");
    normalize_whitespace(&stripped)
}

/// Collapses whitespace runs to single spaces and trims both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
