//! Temporal smoothing of recognition hits.
//!
//! A recogniser sampling a video a few times per second reports a person only
//! at the frames where it happened to get a clean look at them. This crate
//! turns those sparse timestamps into continuous appearance spans: two
//! consecutive hits belong to the same span when the gap between them is at
//! most the smoothing threshold.
//!
//! ```
//! use appearance_smoothing::{Span, merge_timestamps};
//!
//! let spans = merge_timestamps(&[1.0, 2.0, 3.0, 10.0, 11.0, 20.0], 3.0);
//! assert_eq!(
//!     spans,
//!     vec![Span::new(1.0, 3.0), Span::new(10.0, 11.0), Span::point(20.0)]
//! );
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Default maximum gap, in seconds, bridged inside a single span.
pub const DEFAULT_SMOOTHING_THRESHOLD_SECS: f64 = 3.0;

/// A closed time interval `[start, end]` in seconds. `start <= end` always holds
/// for spans produced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: f64,
    pub end: f64,
}

impl Span {
    pub fn new(start: f64, end: f64) -> Self {
        debug_assert!(start <= end, "span start {start} after end {end}");
        Self { start, end }
    }

    /// Zero-length span for a single observation.
    pub fn point(at: f64) -> Self {
        Self { start: at, end: at }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, at: f64) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Gap-bridging merger with a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoother {
    threshold: f64,
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_THRESHOLD_SECS)
    }
}

impl Smoother {
    /// Negative or NaN thresholds are treated as zero, so identical timestamps
    /// always collapse into one span.
    pub fn new(threshold_secs: f64) -> Self {
        Self {
            threshold: threshold_secs.max(0.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Merge one person's timestamps. Input order does not matter; NaN and
    /// infinite timestamps are discarded.
    pub fn merge(&self, timestamps: &[f64]) -> Vec<Span> {
        let mut sorted: Vec<f64> = timestamps.iter().copied().filter(|t| t.is_finite()).collect();
        sorted.sort_unstable_by(f64::total_cmp);
        self.merge_sorted(&sorted)
    }

    /// Merge timestamps that are already sorted ascending and finite.
    pub fn merge_sorted(&self, sorted: &[f64]) -> Vec<Span> {
        let mut iter = sorted.iter().copied();
        let Some(first) = iter.next() else {
            return Vec::new();
        };

        let mut spans = Vec::new();
        let mut current = Span::point(first);
        for at in iter {
            if at - current.end <= self.threshold {
                current.end = at;
            } else {
                spans.push(current);
                current = Span::point(at);
            }
        }
        spans.push(current);

        trace!(
            hits = sorted.len(),
            spans = spans.len(),
            threshold = self.threshold,
            "merged timestamps"
        );
        spans
    }

    /// Group `(key, timestamp)` hits by key and merge each group.
    ///
    /// Keys whose hits are all non-finite do not appear in the output.
    pub fn aggregate<K, I>(&self, hits: I) -> BTreeMap<K, Vec<Span>>
    where
        K: Ord,
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut grouped: BTreeMap<K, Vec<f64>> = BTreeMap::new();
        for (key, at) in hits {
            grouped.entry(key).or_default().push(at);
        }

        grouped
            .into_iter()
            .filter_map(|(key, timestamps)| {
                let spans = self.merge(&timestamps);
                (!spans.is_empty()).then_some((key, spans))
            })
            .collect()
    }
}

/// Merge timestamps with the given threshold. See [`Smoother::merge`].
pub fn merge_timestamps(timestamps: &[f64], threshold_secs: f64) -> Vec<Span> {
    Smoother::new(threshold_secs).merge(timestamps)
}

/// Group and merge keyed hits. See [`Smoother::aggregate`].
pub fn aggregate<K, I>(hits: I, threshold_secs: f64) -> BTreeMap<K, Vec<Span>>
where
    K: Ord,
    I: IntoIterator<Item = (K, f64)>,
{
    Smoother::new(threshold_secs).aggregate(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_example() {
        let spans = merge_timestamps(&[1.0, 2.0, 3.0, 10.0, 11.0, 20.0], 3.0);
        assert_eq!(
            spans,
            vec![Span::new(1.0, 3.0), Span::new(10.0, 11.0), Span::point(20.0)]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(merge_timestamps(&[], 3.0).is_empty());
    }

    #[test]
    fn test_single_timestamp_is_zero_length() {
        let spans = merge_timestamps(&[5.0], 3.0);
        assert_eq!(spans, vec![Span::point(5.0)]);
        assert_eq!(spans[0].duration(), 0.0);
    }

    #[test]
    fn test_unsorted_input() {
        let spans = merge_timestamps(&[20.0, 3.0, 1.0, 11.0, 2.0, 10.0], 3.0);
        assert_eq!(
            spans,
            vec![Span::new(1.0, 3.0), Span::new(10.0, 11.0), Span::point(20.0)]
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let spans = merge_timestamps(&[4.0, 4.0, 4.0], 0.0);
        assert_eq!(spans, vec![Span::point(4.0)]);
    }

    #[test]
    fn test_gap_equal_to_threshold_is_bridged() {
        let spans = merge_timestamps(&[0.0, 3.0, 6.0], 3.0);
        assert_eq!(spans, vec![Span::new(0.0, 6.0)]);

        let spans = merge_timestamps(&[0.0, 3.01], 3.0);
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_chained_small_gaps_extend_span() {
        // Each gap is measured from the current end, not the span start.
        let spans = merge_timestamps(&[0.0, 2.5, 5.0, 7.5], 3.0);
        assert_eq!(spans, vec![Span::new(0.0, 7.5)]);
    }

    #[test]
    fn test_non_finite_timestamps_are_discarded() {
        let spans = merge_timestamps(&[f64::NAN, 1.0, f64::INFINITY, 2.0], 3.0);
        assert_eq!(spans, vec![Span::new(1.0, 2.0)]);
    }

    #[test]
    fn test_negative_threshold_treated_as_zero() {
        let smoother = Smoother::new(-1.0);
        assert_eq!(smoother.threshold(), 0.0);
        assert_eq!(smoother.merge(&[1.0, 1.0, 2.0]).len(), 2);
    }

    #[test]
    fn test_aggregate_groups_by_key() {
        let hits = vec![(2, 10.0), (1, 0.0), (1, 1.0), (2, 30.0), (1, 9.0)];
        let result = aggregate(hits, 3.0);

        assert_eq!(result.len(), 2);
        assert_eq!(result[&1], vec![Span::new(0.0, 1.0), Span::point(9.0)]);
        assert_eq!(result[&2], vec![Span::point(10.0), Span::point(30.0)]);
    }

    #[test]
    fn test_aggregate_drops_keys_without_finite_hits() {
        let result = aggregate(vec![("a", f64::NAN), ("b", 1.0)], 3.0);
        assert!(!result.contains_key("a"));
        assert_eq!(result["b"], vec![Span::point(1.0)]);
    }

    #[test]
    fn test_span_serialization() {
        let json = serde_json::to_string(&Span::new(1.5, 2.5)).unwrap();
        assert_eq!(json, r#"{"start":1.5,"end":2.5}"#);
    }
}
