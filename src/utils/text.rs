//! Text processing utilities.

use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"http\S+|www\S+").unwrap());
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+@\S+").unwrap());
static DISALLOWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s.,!?;:\-]").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Light normalization applied to documents and queries before embedding.
///
/// Lowercases, drops URLs and e-mail addresses, replaces symbols outside
/// basic sentence punctuation with spaces and collapses whitespace.
/// Stopwords and word forms are left alone.
pub fn normalize_for_embedding(text: &str) -> String {
    let text = text.to_lowercase();
    let text = URL_RE.replace_all(&text, "");
    let text = EMAIL_RE.replace_all(&text, "");
    let text = DISALLOWED_RE.replace_all(&text, " ");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_collapses_whitespace() {
        assert_eq!(
            normalize_for_embedding("  Deep   Learning\n\tWorks.  "),
            "deep learning works."
        );
    }

    #[test]
    fn test_normalize_strips_urls_and_emails() {
        let text = "See https://arxiv.org/abs/1706.03762 or mail a.b@uni.edu for code.";
        assert_eq!(normalize_for_embedding(text), "see or mail for code.");
    }

    #[test]
    fn test_normalize_keeps_sentence_punctuation() {
        assert_eq!(
            normalize_for_embedding("Results: 95% accuracy (top-1)!"),
            "results: 95 accuracy top-1 !"
        );
    }

    #[test]
    fn test_normalize_keeps_stopwords() {
        assert_eq!(
            normalize_for_embedding("The model is not the data"),
            "the model is not the data"
        );
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_for_embedding(""), "");
        assert_eq!(normalize_for_embedding("   "), "");
    }
}
