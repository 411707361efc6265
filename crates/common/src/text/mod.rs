//! Text normalization for indexing and retrieval
//!
//! Stored content and retrieval queries go through the same cleaning so
//! that query vectors live in the same space as indexed vectors.

use std::sync::OnceLock;

use regex_lite::Regex;

/// Content shorter than this after cleaning is not worth indexing.
pub const MIN_INDEXABLE_CHARS: usize = 10;

fn user_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@[A-Z0-9]+(\|[^>]*)?>").unwrap())
}

fn channel_ref_named_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<#[A-Z0-9]+\|([^>]*)>").unwrap())
}

fn channel_ref_bare_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<#[A-Z0-9]+>").unwrap())
}

fn link_labeled_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(?:https?|mailto)[^|>]*\|([^>]+)>").unwrap())
}

fn link_bare_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<((?:https?|mailto)[^>]*)>").unwrap())
}

fn emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":[a-z0-9_+\-]+:").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Strip platform markup and collapse whitespace.
///
/// - user references (`<@U123>`) are removed
/// - channel references keep the readable name (`<#C1|general>` → `#general`)
/// - formatted links keep the label, bare links keep the URL
/// - emoji shortcodes (`:tada:`) are removed
pub fn normalize(text: &str) -> String {
    let cleaned = user_ref_re().replace_all(text, "");
    let cleaned = channel_ref_named_re().replace_all(&cleaned, "#$1");
    let cleaned = channel_ref_bare_re().replace_all(&cleaned, "");
    let cleaned = link_labeled_re().replace_all(&cleaned, "$1");
    let cleaned = link_bare_re().replace_all(&cleaned, "$1");
    let cleaned = emoji_re().replace_all(&cleaned, "");
    let cleaned = whitespace_re().replace_all(&cleaned, " ");
    cleaned.trim().to_string()
}

/// Whether cleaned content is substantial enough to index.
pub fn is_indexable(cleaned: &str) -> bool {
    cleaned.chars().count() >= MIN_INDEXABLE_CHARS
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for zero-magnitude or mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a.sqrt() * mag_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_user_references() {
        assert_eq!(normalize("hey <@U02ABC> can you look?"), "hey can you look?");
    }

    #[test]
    fn keeps_channel_names() {
        assert_eq!(normalize("posted in <#C01XYZ|general> earlier"), "posted in #general earlier");
        assert_eq!(normalize("posted in <#C01XYZ> earlier"), "posted in earlier");
    }

    #[test]
    fn unwraps_links() {
        assert_eq!(
            normalize("see <https://example.com/doc|the doc>"),
            "see the doc"
        );
        assert_eq!(
            normalize("see <https://example.com/doc>"),
            "see https://example.com/doc"
        );
    }

    #[test]
    fn strips_emoji_shortcodes() {
        assert_eq!(normalize("shipped! :tada: :+1:"), "shipped!");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("a\n\n  b\t c"), "a b c");
    }

    #[test]
    fn short_content_is_not_indexable() {
        assert!(!is_indexable("ok"));
        assert!(!is_indexable(&normalize("<@U1> :+1:")));
        assert!(is_indexable("this is long enough"));
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.2, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
