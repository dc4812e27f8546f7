//! Title and thumbnail similarity measures used by the merge engine.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\s\-_,.!?"'()]+"#).unwrap());

/// Remove markup wrappers such as `<em class="keyword">` from a title.
pub fn strip_markup(title: &str) -> String {
    MARKUP.replace_all(title, "").into_owned()
}

/// Canonical form used for title comparison.
///
/// Markup is dropped, runs of whitespace and `-_,.!?"'()` become a single
/// space, and the result is trimmed and lower-cased.
pub fn normalize_title(title: &str) -> String {
    let stripped = strip_markup(title);
    SEPARATORS
        .replace_all(&stripped, " ")
        .trim()
        .to_lowercase()
}

/// Jaccard similarity of the whitespace-separated token sets.
///
/// Expects already normalised input. An empty union yields `0.0`.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    intersection as f64 / union as f64
}

/// Normalise both titles and compare them with [`jaccard`].
pub fn title_similarity(a: &str, b: &str) -> f64 {
    jaccard(&normalize_title(a), &normalize_title(b))
}

/// Cosine similarity. Zero-norm or mismatched vectors score `0.0`.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalization_strips_markup_and_punctuation() {
        assert_eq!(
            normalize_title(r#"<em class="keyword">Python</em> Tutorial - (Full Course)!"#),
            "python tutorial full course"
        );
        assert_eq!(normalize_title("  a__b..c  "), "a b c");
        assert_eq!(normalize_title("\t\n"), "");
    }

    #[test]
    fn jaccard_is_symmetric() {
        let a = "python tutorial for beginners";
        let b = "python full tutorial";
        assert_eq!(jaccard(a, b), jaccard(b, a));
        assert!((jaccard(a, b) - 2.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_self_similarity_is_one() {
        assert_eq!(jaccard("learn rust now", "learn rust now"), 1.0);
    }

    #[test]
    fn jaccard_empty_is_zero() {
        assert_eq!(jaccard("", "python"), 0.0);
        assert_eq!(jaccard("", ""), 0.0);
    }

    #[test]
    fn title_similarity_ignores_case_and_punctuation() {
        assert_eq!(
            title_similarity("Python Tutorial!", "python   tutorial"),
            1.0
        );
    }

    #[test]
    fn cosine_self_is_one() {
        let v = [0.3f32, 0.4, 0.5, 0.1];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
