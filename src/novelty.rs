//! Novelty accounting: distinct elements and distinct co-occurring pairs.
//!
//! Pure in-memory bookkeeping. Elements are recorded as they are drawn;
//! closing a round forms every unordered pair among that round's draws and
//! appends the cumulative counts to the two output curves.

use std::collections::HashSet;

use crate::pool::Element;

/// Canonical unordered pair key: `(min, max)`, equal elements excluded.
fn canonical_pair(a: Element, b: Element) -> Option<(Element, Element)> {
    if a == b {
        None
    } else {
        Some((a.min(b), a.max(b)))
    }
}

/// Tracks seen elements, seen pairs, and the two novelty curves.
#[derive(Debug, Default, Clone)]
pub struct NoveltyTracker {
    seen_elements: HashSet<Element>,
    seen_pairs: HashSet<(Element, Element)>,
    element_counts: Vec<u64>,
    pair_counts: Vec<u64>,
}

impl NoveltyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one drawn element; true when it was never seen before.
    ///
    /// First-time draws are what trigger pool expansion, so the caller needs
    /// the answer at draw time, not at the end of the round.
    pub fn record_element(&mut self, element: Element) -> bool {
        self.seen_elements.insert(element)
    }

    /// Close a round: form all pairs among `elements` and append the
    /// cumulative counts to both curves.
    ///
    /// `elements` is the full draw list of the round, repeats included; a
    /// repeated element contributes no pair with itself.
    pub fn finish_round(&mut self, elements: &[Element]) {
        for (i, &a) in elements.iter().enumerate() {
            for &b in &elements[i + 1..] {
                if let Some(pair) = canonical_pair(a, b) {
                    self.seen_pairs.insert(pair);
                }
            }
        }
        self.element_counts.push(self.seen_elements.len() as u64);
        self.pair_counts.push(self.seen_pairs.len() as u64);
    }

    /// Record every element of a round and close it in one call.
    pub fn observe_round(&mut self, elements: &[Element]) {
        for &element in elements {
            self.record_element(element);
        }
        self.finish_round(elements);
    }

    pub fn element_counts(&self) -> &[u64] {
        &self.element_counts
    }

    pub fn pair_counts(&self) -> &[u64] {
        &self.pair_counts
    }

    /// Consume the tracker, returning `(element_counts, pair_counts)`.
    pub fn into_curves(self) -> (Vec<u64>, Vec<u64>) {
        (self.element_counts, self.pair_counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_canonical_and_order_free() {
        let mut tracker = NoveltyTracker::new();
        tracker.observe_round(&[2, 1]);
        tracker.observe_round(&[1, 2]);
        assert_eq!(tracker.element_counts(), &[2, 2]);
        assert_eq!(tracker.pair_counts(), &[1, 1]);
    }

    #[test]
    fn repeated_elements_form_no_self_pair() {
        let mut tracker = NoveltyTracker::new();
        tracker.observe_round(&[5, 5, 5]);
        assert_eq!(tracker.element_counts(), &[1]);
        assert_eq!(tracker.pair_counts(), &[0]);
    }

    #[test]
    fn all_combinations_within_a_round_are_counted() {
        let mut tracker = NoveltyTracker::new();
        tracker.observe_round(&[0, 1, 2]);
        // C(3, 2) pairs.
        assert_eq!(tracker.pair_counts(), &[3]);
    }

    #[test]
    fn pairs_never_form_across_rounds() {
        let mut tracker = NoveltyTracker::new();
        tracker.observe_round(&[0]);
        tracker.observe_round(&[1]);
        assert_eq!(tracker.element_counts(), &[1, 2]);
        assert_eq!(tracker.pair_counts(), &[0, 0]);
    }

    #[test]
    fn curves_are_non_decreasing_and_bounded() {
        let mut tracker = NoveltyTracker::new();
        let rounds: &[&[Element]] = &[&[0, 1], &[1, 2, 3], &[0], &[4, 4, 2]];
        for round in rounds {
            tracker.observe_round(round);
        }
        let elements = tracker.element_counts();
        let pairs = tracker.pair_counts();
        assert_eq!(elements.len(), rounds.len());
        for i in 1..elements.len() {
            assert!(elements[i] >= elements[i - 1]);
            assert!(pairs[i] >= pairs[i - 1]);
        }
        for i in 0..elements.len() {
            let n = elements[i];
            assert!(pairs[i] <= n * (n - 1) / 2);
        }
    }

    #[test]
    fn record_element_reports_first_sightings_only() {
        let mut tracker = NoveltyTracker::new();
        assert!(tracker.record_element(3));
        assert!(!tracker.record_element(3));
        assert!(tracker.record_element(4));
    }

    #[test]
    fn empty_round_still_extends_the_curves() {
        let mut tracker = NoveltyTracker::new();
        tracker.observe_round(&[]);
        assert_eq!(tracker.element_counts(), &[0]);
        assert_eq!(tracker.pair_counts(), &[0]);
    }
}
