//! Free-text cleanup for job board descriptions
//!
//! Sources deliver descriptions as HTML fragments. Stored postings keep plain
//! text only: tags removed, common entities decoded, whitespace collapsed.

use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used, reason = "literal pattern, covered by tests")]
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"));

#[allow(clippy::expect_used, reason = "literal pattern, covered by tests")]
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern compiles"));

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&laquo;", "«"),
    ("&raquo;", "»"),
    ("&mdash;", "—"),
    ("&ndash;", "–"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    // Must stay last so "&amp;lt;" decodes to "&lt;" rather than "<"
    ("&amp;", "&"),
];

/// Strip markup from a free-text field.
///
/// Tags are replaced by a space so that `<li>a</li><li>b</li>` does not glue
/// words together.
pub fn strip_markup(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let without_tags = TAG.replace_all(input, " ");

    let mut decoded = without_tags.into_owned();
    for (entity, replacement) in ENTITIES {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, replacement);
        }
    }

    WHITESPACE
        .replace_all(&decoded, " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags_and_collapses_whitespace() {
        let html = "<p>Требования:</p>\n<ul><li>Python</li><li>SQL</li></ul>";
        assert_eq!(strip_markup(html), "Требования: Python SQL");
    }

    #[test]
    fn test_decodes_entities() {
        assert_eq!(strip_markup("R&amp;D&nbsp;отдел &laquo;Урал&raquo;"), "R&D отдел «Урал»");
        assert_eq!(strip_markup("&amp;lt;b&amp;gt;"), "&lt;b&gt;");
    }

    #[test]
    fn test_empty_and_plain_text() {
        assert_eq!(strip_markup(""), "");
        assert_eq!(strip_markup("   plain text  "), "plain text");
    }
}
