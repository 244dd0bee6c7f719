// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Trust Domain Model
//!
//! A trust score is a 0-1 reliability measure for a request source, derived
//! from interaction history plus content signals. Reliability is derived,
//! not authoritative input: once a source has history, the tracker's view
//! overrides whatever the caller reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    User,
    System,
    Agent,
    External,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceType::User => "user",
            SourceType::System => "system",
            SourceType::Agent => "agent",
            SourceType::External => "external",
        };
        write!(f, "{}", s)
    }
}

/// A request source as seen by the kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustSource {
    pub id: SourceId,
    pub source_type: SourceType,
    /// Caller-reported reliability. Overridden by tracked history.
    pub reliability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Positive,
    Negative,
    Neutral,
}

/// Per-dimension breakdown of a computed trust score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustDimensions {
    pub source_reliability: f64,
    pub content_quality: f64,
    pub consistency: f64,
    pub provenance: f64,
}

/// Computed trust score with reasoning, safe to recompute speculatively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScore {
    pub score: f64,
    pub dimensions: TrustDimensions,
    pub reasoning: String,
    pub computed_at: DateTime<Utc>,
}

/// Content-level signals fed into scoring alongside source reliability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContentSignals {
    /// How well-formed and substantive the content is, 0-1.
    pub quality: f64,
    /// Agreement with what the kernel already believes, 0-1.
    pub consistency: f64,
    /// Strength of the provenance trail, 0-1.
    pub provenance: f64,
}

impl Default for ContentSignals {
    fn default() -> Self {
        Self {
            quality: 0.5,
            consistency: 0.5,
            provenance: 0.5,
        }
    }
}
