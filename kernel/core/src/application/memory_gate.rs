// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Memory Gate Application Service
//!
//! Classifies a candidate memory write as allow/quarantine/reject from the
//! source's trust score plus a pluggable scoring model. The reference policy
//! is a weighted linear combination of trust, verification, age, interaction
//! history, semantic similarity, link hygiene, and core-identity
//! non-interference.
//!
//! # Determinism
//!
//! `evaluate` is deterministic: the same `(features, model-state)` input
//! always yields the same action. Model adaptation happens only through the
//! explicit `update` path.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::domain::memory::{
    GateAction, GateLabel, MemoryCandidate, MemoryFeatures, MemoryGateDecision,
    MemorySourceProfile, ModelPrediction,
};

/// Score at or above which a write is allowed.
pub const DEFAULT_ALLOW_THRESHOLD: f64 = 0.4;
/// Score at or above which (but below allow) a write is quarantined.
pub const DEFAULT_QUARANTINE_THRESHOLD: f64 = 0.2;

/// Source age at which the age feature saturates.
const AGE_SATURATION_DAYS: f64 = 30.0;
/// Interaction count at which the history feature saturates.
const INTERACTION_SATURATION: f64 = 20.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateThresholds {
    pub allow: f64,
    pub quarantine: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            allow: DEFAULT_ALLOW_THRESHOLD,
            quarantine: DEFAULT_QUARANTINE_THRESHOLD,
        }
    }
}

impl GateThresholds {
    pub fn classify(&self, probability: f64) -> GateAction {
        if probability >= self.allow {
            GateAction::Allow
        } else if probability >= self.quarantine {
            GateAction::Quarantine
        } else {
            GateAction::Reject
        }
    }
}

/// Pluggable scoring model behind a narrow contract.
pub trait ScoringModel: Send + Sync {
    fn predict(&self, features: &MemoryFeatures) -> ModelPrediction;

    /// Optional online adaptation from labeled gate outcomes. The default
    /// is a no-op for stateless models.
    fn update(&self, _features: &MemoryFeatures, _label: GateLabel) {}

    fn name(&self) -> &str;
}

/// Default model: fixed weighted linear combination, thresholded.
pub struct RuleBasedModel {
    weights: [f64; MemoryFeatures::DIM],
    thresholds: GateThresholds,
}

impl RuleBasedModel {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self {
            // Positional weights over MemoryFeatures::NAMES. Trust and
            // core-value clearance dominate; hygiene signals refine.
            weights: [0.30, 0.15, 0.05, 0.10, 0.10, 0.10, 0.20],
            thresholds,
        }
    }

    fn weighted_sum(&self, features: &MemoryFeatures) -> f64 {
        features
            .as_array()
            .iter()
            .zip(self.weights.iter())
            .map(|(x, w)| x * w)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}

impl Default for RuleBasedModel {
    fn default() -> Self {
        Self::new(GateThresholds::default())
    }
}

impl ScoringModel for RuleBasedModel {
    fn predict(&self, features: &MemoryFeatures) -> ModelPrediction {
        let probability = self.weighted_sum(features);
        let action = self.thresholds.classify(probability);

        let feature_importances = MemoryFeatures::NAMES
            .iter()
            .zip(features.as_array().iter().zip(self.weights.iter()))
            .map(|(name, (x, w))| (name.to_string(), x * w))
            .collect();

        // Distance from the nearest threshold, scaled into 0.5..1.0.
        let boundary = [self.thresholds.allow, self.thresholds.quarantine]
            .iter()
            .map(|t| (probability - t).abs())
            .fold(f64::INFINITY, f64::min);
        let confidence = (0.5 + boundary).min(1.0);

        ModelPrediction {
            accept_probability: probability,
            action,
            confidence,
            feature_importances,
        }
    }

    fn name(&self) -> &str {
        "rule-based"
    }
}

/// Persisted coefficient set for the logistic model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticCoefficients {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub learning_rate: f64,
    pub updates: u64,
}

impl Default for LogisticCoefficients {
    fn default() -> Self {
        Self {
            weights: vec![0.0; MemoryFeatures::DIM],
            bias: 0.0,
            learning_rate: 0.1,
            updates: 0,
        }
    }
}

/// Online logistic-regression drop-in. Adjusts coefficients from labeled
/// allow/reject outcomes via the gradient step `Δw = η·(target − p)·x`.
pub struct LogisticModel {
    coefficients: Mutex<LogisticCoefficients>,
    thresholds: GateThresholds,
}

impl LogisticModel {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self {
            coefficients: Mutex::new(LogisticCoefficients::default()),
            thresholds,
        }
    }

    pub fn with_coefficients(coefficients: LogisticCoefficients, thresholds: GateThresholds) -> Self {
        Self {
            coefficients: Mutex::new(coefficients),
            thresholds,
        }
    }

    pub fn coefficients(&self) -> LogisticCoefficients {
        self.coefficients.lock().clone()
    }

    pub fn load(path: &Path, thresholds: GateThresholds) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let coefficients: LogisticCoefficients = serde_json::from_str(&raw)?;
        anyhow::ensure!(
            coefficients.weights.len() == MemoryFeatures::DIM,
            "coefficient file has {} weights, expected {}",
            coefficients.weights.len(),
            MemoryFeatures::DIM
        );
        Ok(Self::with_coefficients(coefficients, thresholds))
    }

    pub fn persist(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(&self.coefficients())?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }

    fn probability(coefficients: &LogisticCoefficients, features: &MemoryFeatures) -> f64 {
        let z: f64 = features
            .as_array()
            .iter()
            .zip(coefficients.weights.iter())
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + coefficients.bias;
        Self::sigmoid(z)
    }
}

impl ScoringModel for LogisticModel {
    fn predict(&self, features: &MemoryFeatures) -> ModelPrediction {
        let coefficients = self.coefficients.lock();
        let probability = Self::probability(&coefficients, features);
        let action = self.thresholds.classify(probability);

        let feature_importances = MemoryFeatures::NAMES
            .iter()
            .zip(features.as_array().iter().zip(coefficients.weights.iter()))
            .map(|(name, (x, w))| (name.to_string(), x * w))
            .collect();

        ModelPrediction {
            accept_probability: probability,
            action,
            // Sigmoid distance from indifference.
            confidence: (probability - 0.5).abs() * 2.0,
            feature_importances,
        }
    }

    fn update(&self, features: &MemoryFeatures, label: GateLabel) {
        let mut coefficients = self.coefficients.lock();
        let p = Self::probability(&coefficients, features);
        let target = match label {
            GateLabel::Allowed => 1.0,
            GateLabel::Rejected => 0.0,
        };
        let eta = coefficients.learning_rate;
        let error = target - p;
        for (w, x) in coefficients.weights.iter_mut().zip(features.as_array()) {
            *w += eta * error * x;
        }
        coefficients.bias += eta * error;
        coefficients.updates += 1;
    }

    fn name(&self) -> &str {
        "online-logistic"
    }
}

/// The allow/quarantine/reject decision point for candidate memory writes.
pub struct MemoryGate {
    model: Box<dyn ScoringModel>,
    thresholds: GateThresholds,
}

impl MemoryGate {
    pub fn new(model: Box<dyn ScoringModel>, thresholds: GateThresholds) -> Self {
        Self { model, thresholds }
    }

    pub fn with_default_model() -> Self {
        let thresholds = GateThresholds::default();
        Self::new(Box::new(RuleBasedModel::new(thresholds)), thresholds)
    }

    /// Build the fixed-order feature vector from a candidate and its source.
    pub fn features(
        trust_score: f64,
        memory: &MemoryCandidate,
        source: &MemorySourceProfile,
    ) -> MemoryFeatures {
        MemoryFeatures {
            trust_score: trust_score.clamp(0.0, 1.0),
            source_verified: if source.verified { 1.0 } else { 0.0 },
            source_age: (source.age_days / AGE_SATURATION_DAYS).clamp(0.0, 1.0),
            prior_interactions: (source.prior_interactions as f64 / INTERACTION_SATURATION)
                .clamp(0.0, 1.0),
            semantic_similarity: memory.semantic_similarity.clamp(0.0, 1.0),
            no_external_links: if memory.has_external_links { 0.0 } else { 1.0 },
            core_value_clear: if memory.conflicts_with_core_values {
                0.0
            } else {
                1.0
            },
        }
    }

    pub fn evaluate(
        &self,
        trust_score: f64,
        memory: &MemoryCandidate,
        source: &MemorySourceProfile,
    ) -> MemoryGateDecision {
        let features = Self::features(trust_score, memory, source);
        let prediction = self.model.predict(&features);

        let reason = format!(
            "{} scored {:.3} (allow >= {:.2}, quarantine >= {:.2})",
            self.model.name(),
            prediction.accept_probability,
            self.thresholds.allow,
            self.thresholds.quarantine,
        );
        debug!(
            source = %source.source_id,
            action = %prediction.action,
            probability = prediction.accept_probability,
            "Memory gate decision"
        );

        MemoryGateDecision {
            action: prediction.action,
            reason,
            trust_score,
        }
    }

    /// Feed a labeled outcome back into the model (online adaptation).
    pub fn learn(
        &self,
        trust_score: f64,
        memory: &MemoryCandidate,
        source: &MemorySourceProfile,
        label: GateLabel,
    ) {
        let features = Self::features(trust_score, memory, source);
        self.model.update(&features, label);
    }
}
