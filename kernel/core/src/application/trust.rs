// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Trust Scoring Application Services
//!
//! `SourceTracker` maintains bounded per-source feedback history;
//! `TrustScorer` composes tracked reliability with content signals into a
//! multi-dimension score. Scoring is pure so the verifier can call it
//! speculatively.
//!
//! The tracker is an explicitly constructed, injected component, never a
//! module-level singleton, so kernel instances are isolable in tests and
//! multiple agents can run with independent trust state.

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use tracing::debug;

use crate::domain::trust::{
    ContentSignals, Feedback, SourceId, TrustDimensions, TrustScore, TrustSource,
};

/// Reliability assumed for a source with no history.
pub const DEFAULT_RELIABILITY: f64 = 0.5;

const DEFAULT_MAX_TRACKED_SOURCES: usize = 10_000;

#[derive(Debug, Clone)]
struct SourceStats {
    positive: u64,
    negative: u64,
    neutral: u64,
    last_seen: DateTime<Utc>,
}

impl SourceStats {
    fn reliability(&self) -> f64 {
        let graded = self.positive + self.negative;
        if graded == 0 {
            DEFAULT_RELIABILITY
        } else {
            self.positive as f64 / graded as f64
        }
    }

    fn interactions(&self) -> u64 {
        self.positive + self.negative + self.neutral
    }
}

/// Bounded per-source feedback history.
///
/// Eviction is least-recently-SEEN, not insertion order: recording feedback
/// touches the entry, so the `lru` cache's eviction key is effectively
/// `last_seen`.
pub struct SourceTracker {
    stats: Mutex<LruCache<SourceId, SourceStats>>,
}

impl SourceTracker {
    pub fn new(max_sources: usize) -> Self {
        let capacity = NonZeroUsize::new(max_sources.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            stats: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_MAX_TRACKED_SOURCES)
    }

    /// Record feedback for a source, updating counters and recency.
    pub fn record(&self, source: &SourceId, feedback: Feedback) {
        let mut stats = self.stats.lock();
        let now = Utc::now();
        // get_mut touches recency; push evicts the least-recently-seen
        // entry when at capacity.
        if let Some(entry) = stats.get_mut(source) {
            entry.last_seen = now;
            match feedback {
                Feedback::Positive => entry.positive += 1,
                Feedback::Negative => entry.negative += 1,
                Feedback::Neutral => entry.neutral += 1,
            }
            return;
        }

        let mut entry = SourceStats {
            positive: 0,
            negative: 0,
            neutral: 0,
            last_seen: now,
        };
        match feedback {
            Feedback::Positive => entry.positive = 1,
            Feedback::Negative => entry.negative = 1,
            Feedback::Neutral => entry.neutral = 1,
        }
        if let Some((evicted, _)) = stats.push(source.clone(), entry) {
            if &evicted != source {
                debug!(source = %evicted, "Evicted least-recently-seen trust source");
            }
        }
    }

    /// Tracked reliability, or the 0.5 default for unknown sources. Reads
    /// use `peek` so they do not perturb eviction order.
    pub fn reliability(&self, source: &SourceId) -> f64 {
        self.stats
            .lock()
            .peek(source)
            .map(SourceStats::reliability)
            .unwrap_or(DEFAULT_RELIABILITY)
    }

    /// Total recorded interactions for a source.
    pub fn interactions(&self, source: &SourceId) -> u64 {
        self.stats
            .lock()
            .peek(source)
            .map(SourceStats::interactions)
            .unwrap_or(0)
    }

    pub fn tracked_sources(&self) -> usize {
        self.stats.lock().len()
    }

    /// Effective reliability for a source: historical data overrides the
    /// caller-supplied value once any interaction history exists.
    pub fn effective_reliability(&self, source: &TrustSource) -> f64 {
        if self.interactions(&source.id) > 0 {
            self.reliability(&source.id)
        } else {
            source.reliability.clamp(0.0, 1.0)
        }
    }
}

impl Default for SourceTracker {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Dimension weights for composed trust scores.
#[derive(Debug, Clone, Copy)]
pub struct TrustWeights {
    pub source_reliability: f64,
    pub content_quality: f64,
    pub consistency: f64,
    pub provenance: f64,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            source_reliability: 0.4,
            content_quality: 0.25,
            consistency: 0.2,
            provenance: 0.15,
        }
    }
}

/// Composes source reliability with content signals. Pure: holds no mutable
/// state and performs no side effects, so speculative calls during
/// verification are safe.
pub struct TrustScorer {
    weights: TrustWeights,
}

impl TrustScorer {
    pub fn new(weights: TrustWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, reliability: f64, signals: &ContentSignals) -> TrustScore {
        let dimensions = TrustDimensions {
            source_reliability: reliability.clamp(0.0, 1.0),
            content_quality: signals.quality.clamp(0.0, 1.0),
            consistency: signals.consistency.clamp(0.0, 1.0),
            provenance: signals.provenance.clamp(0.0, 1.0),
        };

        let score = self.weights.source_reliability * dimensions.source_reliability
            + self.weights.content_quality * dimensions.content_quality
            + self.weights.consistency * dimensions.consistency
            + self.weights.provenance * dimensions.provenance;

        let reasoning = format!(
            "reliability {:.2} (w {:.2}), quality {:.2} (w {:.2}), consistency {:.2} (w {:.2}), provenance {:.2} (w {:.2})",
            dimensions.source_reliability,
            self.weights.source_reliability,
            dimensions.content_quality,
            self.weights.content_quality,
            dimensions.consistency,
            self.weights.consistency,
            dimensions.provenance,
            self.weights.provenance,
        );

        TrustScore {
            score: score.clamp(0.0, 1.0),
            dimensions,
            reasoning,
            computed_at: Utc::now(),
        }
    }
}

impl Default for TrustScorer {
    fn default() -> Self {
        Self::new(TrustWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trust::SourceType;

    fn source(id: &str) -> SourceId {
        SourceId::new(id)
    }

    #[test]
    fn unknown_source_defaults_to_half() {
        let tracker = SourceTracker::new(10);
        assert_eq!(tracker.reliability(&source("nobody")), 0.5);
    }

    #[test]
    fn reliability_is_positive_over_graded() {
        let tracker = SourceTracker::new(10);
        let id = source("alice");
        tracker.record(&id, Feedback::Positive);
        tracker.record(&id, Feedback::Positive);
        tracker.record(&id, Feedback::Positive);
        tracker.record(&id, Feedback::Negative);
        // Neutral feedback counts interactions, not the ratio.
        tracker.record(&id, Feedback::Neutral);
        assert!((tracker.reliability(&id) - 0.75).abs() < 1e-9);
        assert_eq!(tracker.interactions(&id), 5);
    }

    #[test]
    fn history_overrides_caller_reliability() {
        let tracker = SourceTracker::new(10);
        let id = source("bob");
        let trust_source = TrustSource {
            id: id.clone(),
            source_type: SourceType::Agent,
            reliability: 0.95,
        };
        // No history yet: caller value is used.
        assert!((tracker.effective_reliability(&trust_source) - 0.95).abs() < 1e-9);

        tracker.record(&id, Feedback::Negative);
        tracker.record(&id, Feedback::Negative);
        // History exists: derived reliability wins.
        assert_eq!(tracker.effective_reliability(&trust_source), 0.0);
    }

    #[test]
    fn eviction_is_least_recently_seen() {
        let tracker = SourceTracker::new(2);
        tracker.record(&source("a"), Feedback::Positive);
        tracker.record(&source("b"), Feedback::Positive);
        // Touch "a" so "b" becomes the least-recently-seen entry.
        tracker.record(&source("a"), Feedback::Positive);
        tracker.record(&source("c"), Feedback::Positive);

        assert_eq!(tracker.tracked_sources(), 2);
        assert_eq!(tracker.interactions(&source("b")), 0, "b should be evicted");
        assert_eq!(tracker.interactions(&source("a")), 2);
        assert_eq!(tracker.interactions(&source("c")), 1);
    }

    #[test]
    fn scorer_composes_weighted_dimensions() {
        let scorer = TrustScorer::default();
        let score = scorer.score(
            1.0,
            &ContentSignals {
                quality: 1.0,
                consistency: 1.0,
                provenance: 1.0,
            },
        );
        assert!((score.score - 1.0).abs() < 1e-9);

        let low = scorer.score(0.0, &ContentSignals::default());
        assert!(low.score < 0.35);
        assert_eq!(low.dimensions.source_reliability, 0.0);
    }

    #[test]
    fn scorer_is_deterministic() {
        let scorer = TrustScorer::default();
        let signals = ContentSignals {
            quality: 0.7,
            consistency: 0.6,
            provenance: 0.4,
        };
        let a = scorer.score(0.8, &signals);
        let b = scorer.score(0.8, &signals);
        assert_eq!(a.score, b.score);
        assert_eq!(a.dimensions, b.dimensions);
    }
}
