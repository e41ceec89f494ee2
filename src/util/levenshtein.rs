//! Bounded edit distances for fuzzy term matching.
//!
//! Fuzzy predicates accept terms within a small number of edits of the query
//! term. Adjacent transpositions count as a single edit, so "wrold" is one
//! edit away from "world".

use std::cmp::min;

/// Optimal string alignment distance between two strings, or `None` when it exceeds `max_edits`.
#[allow(clippy::needless_range_loop)]
pub fn bounded_distance(a: &str, b: &str, max_edits: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.len().abs_diff(b.len()) > max_edits {
        return None;
    }
    if a.is_empty() || b.is_empty() {
        let distance = a.len().max(b.len());
        return (distance <= max_edits).then_some(distance);
    }

    let width = b.len() + 1;
    let mut before_prev: Vec<usize> = vec![0; width];
    let mut prev: Vec<usize> = (0..width).collect();
    let mut curr: Vec<usize> = vec![0; width];

    for i in 1..=a.len() {
        curr[0] = i;
        let mut row_min = i;
        for j in 1..width {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = min(min(prev[j] + 1, curr[j - 1] + 1), prev[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = min(best, before_prev[j - 2] + 1);
            }
            curr[j] = best;
            row_min = min(row_min, best);
        }
        if row_min > max_edits {
            return None;
        }
        std::mem::swap(&mut before_prev, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev[b.len()];
    (distance <= max_edits).then_some(distance)
}

/// Matches candidate terms against one query term.
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    term: String,
    max_edits: usize,
    prefix_length: usize,
}

impl FuzzyMatcher {
    /// Create a matcher; `prefix_length` leading characters must match exactly.
    pub fn new<S: Into<String>>(term: S, max_edits: usize, prefix_length: usize) -> Self {
        FuzzyMatcher {
            term: term.into(),
            max_edits,
            prefix_length,
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn max_edits(&self) -> usize {
        self.max_edits
    }

    /// Edit distance to the candidate if it is within bounds.
    pub fn distance(&self, candidate: &str) -> Option<usize> {
        if self.prefix_length > 0 {
            let expected = self.term.chars().take(self.prefix_length);
            if !expected.eq(candidate.chars().take(self.prefix_length)) {
                return None;
            }
        }
        bounded_distance(&self.term, candidate, self.max_edits)
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.distance(candidate).is_some()
    }

    /// Similarity in `(0, 1]` used to weight fuzzy matches; 1 for an exact match.
    pub fn similarity(&self, candidate: &str) -> f32 {
        match self.distance(candidate) {
            Some(distance) => {
                let length = self.term.chars().count().min(candidate.chars().count()).max(1);
                1.0 - (distance as f32 / length as f32).min(0.9)
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_distance() {
        assert_eq!(bounded_distance("", "", 0), Some(0));
        assert_eq!(bounded_distance("word", "world", 1), Some(1));
        assert_eq!(bounded_distance("kitten", "sitting", 3), Some(3));
        assert_eq!(bounded_distance("kitten", "sitting", 2), None);
        assert_eq!(bounded_distance("a", "abc", 1), None);
        assert_eq!(bounded_distance("", "ab", 2), Some(2));
    }

    #[test]
    fn test_transposition_is_one_edit() {
        assert_eq!(bounded_distance("world", "wrold", 1), Some(1));
        assert_eq!(bounded_distance("search", "serach", 1), Some(1));
    }

    #[test]
    fn test_matcher_prefix() {
        let matcher = FuzzyMatcher::new("panda", 1, 2);
        assert!(matcher.is_match("pandas"));
        assert!(!matcher.is_match("xanda"));
        assert!(matcher.similarity("panda") > matcher.similarity("pandas"));
        assert_eq!(matcher.similarity("zebra"), 0.0);
    }
}
