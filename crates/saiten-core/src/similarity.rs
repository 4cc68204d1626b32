//! Character n-gram similarity.
//!
//! Uses character trigrams rather than word tokens so that text without
//! whitespace-delimited words (Japanese) is compared meaningfully.

use std::collections::HashSet;

/// Length of the character n-grams compared.
pub const NGRAM_SIZE: usize = 3;

/// Punctuation removed during normalization.
const STRIPPED_PUNCTUATION: [char; 4] = ['、', '。', '！', '？'];

/// Jaccard similarity of the trigram sets of `a` and `b`, in `[0, 1]`.
///
/// Returns 0 when either normalized string is shorter than one trigram.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize(a), normalize(b));
    jaccard(&ngrams(&a, NGRAM_SIZE), &ngrams(&b, NGRAM_SIZE))
}

/// Lowercase, drop whitespace and sentence punctuation.
pub fn normalize(text: &str) -> Vec<char> {
    text.chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED_PUNCTUATION.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Set of all contiguous `n`-character windows.
pub fn ngrams(chars: &[char], n: usize) -> HashSet<&[char]> {
    if n == 0 {
        return HashSet::new();
    }
    chars.windows(n).collect()
}

fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_is_one() {
        let samples = [
            "利用部門の主要メンバを早期に参画させる",
            "Risk register review",
            "abc",
            "進捗 会議を　毎週開く。",
        ];
        for s in samples {
            assert_eq!(similarity(s, s), 1.0, "similarity({s:?}, itself)");
        }
    }

    #[test]
    fn empty_side_is_zero() {
        for s in ["", "abc", "要件定義の遅延リスク"] {
            assert_eq!(similarity(s, ""), 0.0);
            assert_eq!(similarity("", s), 0.0);
        }
    }

    #[test]
    fn shorter_than_trigram_is_zero() {
        assert_eq!(similarity("ab", "ab"), 0.0);
        assert_eq!(similarity("要件。", "要件"), 0.0);
    }

    #[test]
    fn normalization_ignores_case_space_and_punctuation() {
        assert_eq!(similarity("Risk Plan", "riskplan"), 1.0);
        assert_eq!(similarity("要件、定義。", "要件定義"), 1.0);
    }

    #[test]
    fn disjoint_text_is_zero() {
        assert_eq!(similarity("あいうえお", "かきくけこ"), 0.0);
    }

    #[test]
    fn partial_overlap() {
        // abcd -> {abc, bcd}; bcde -> {bcd, cde}; 1 shared of 3 total.
        let s = similarity("abcd", "bcde");
        assert!((s - 1.0 / 3.0).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn symmetric() {
        let a = "利用部門を参画させ合意形成を図る";
        let b = "利用部門の主要メンバを早期に参画させ、要件の合意形成を図る。";
        assert_eq!(similarity(a, b), similarity(b, a));
        let s = similarity(a, b);
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn repeated_trigrams_count_once() {
        assert_eq!(similarity("aaaa", "aaa"), 1.0);
    }
}
