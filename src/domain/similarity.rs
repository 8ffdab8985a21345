//! Fuzzy string matching used to compare metadata candidates

use std::collections::HashMap;

/// Scores how well `candidate` matches `target`, in [0, 1].
///
/// Absent input scores 0.0. A case-insensitive, trimmed exact match scores
/// 1.0. Otherwise the score is the average of a character-coverage score
/// (tolerates reordering and "feat. X" suffixes) and a normalized edit
/// distance score (penalizes structural dissimilarity).
pub fn score(candidate: Option<&str>, target: Option<&str>) -> f64 {
    let (Some(candidate), Some(target)) = (candidate, target) else {
        return 0.0;
    };

    let candidate = candidate.trim().to_lowercase();
    let target = target.trim().to_lowercase();

    if candidate == target {
        return 1.0;
    }

    (coverage_score(&candidate, &target) + edit_score(&candidate, &target)) / 2.0
}

/// multiset character intersection size over the target's character count
fn coverage_score(candidate: &str, target: &str) -> f64 {
    let target_counts = char_counts(target);
    let target_size: usize = target_counts.values().sum();
    if target_size == 0 {
        return 0.0;
    }

    let candidate_counts = char_counts(candidate);
    let intersection: usize = candidate_counts
        .iter()
        .map(|(c, n)| (*n).min(target_counts.get(c).copied().unwrap_or(0)))
        .sum();

    intersection as f64 / target_size as f64
}

fn edit_score(candidate: &str, target: &str) -> f64 {
    let max_len = candidate.chars().count().max(target.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = strsim::levenshtein(target, candidate);
    1.0 - distance as f64 / max_len as f64
}

fn char_counts(s: &str) -> HashMap<char, usize> {
    let mut counts = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::score;

    #[test]
    fn absent_input_scores_zero() {
        assert_eq!(score(None, Some("anything")), 0.0);
        assert_eq!(score(Some("anything"), None), 0.0);
        assert_eq!(score(None, None), 0.0);
    }

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(score(Some("Song"), Some("Song")), 1.0);
        assert_eq!(score(Some("  song "), Some("SONG")), 1.0);
        assert_eq!(score(Some(""), Some("  ")), 1.0);
    }

    #[test]
    fn partial_match_averages_coverage_and_edit() {
        // candidate "abc" vs target "abd":
        //   coverage = |{a, b}| / 3 = 2/3
        //   edit     = 1 - 1/3     = 2/3
        let s = score(Some("abc"), Some("abd"));
        assert!((s - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn reordered_tokens_keep_high_coverage() {
        let s = score(Some("Band feat. Guest"), Some("Band"));
        // every character of the target appears in the candidate
        assert!(s > 0.5);
        assert!(s < 1.0);
    }

    #[test]
    fn empty_target_with_nonempty_candidate_is_defined() {
        let s = score(Some("abc"), Some(""));
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn disjoint_strings_score_low() {
        let s = score(Some("xyz"), Some("abc"));
        assert!(s < 0.25);
    }
}
