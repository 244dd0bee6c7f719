// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Governor Configuration Types
//
// Kubernetes-style manifest format (apiVersion/kind/metadata/spec) for the
// governance kernel: safe-mode policy, trust floors, memory-gate thresholds,
// workflow engine defaults, persistence, the optional durable backend, and
// audit retention. Optional adapters (PostgreSQL, the Temporal bridge) are
// configuration-time decisions resolved at startup, never runtime throws.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "GovernorConfig";

/// Top-level Kubernetes-style configuration manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfigManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GovernorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable configuration name.
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernorConfigSpec {
    /// Agent this kernel instance governs.
    pub agent_id: String,

    #[serde(default)]
    pub safe_mode: SafeModeConfig,

    #[serde(default)]
    pub trust: TrustConfig,

    #[serde(default)]
    pub memory_gate: MemoryGateConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    /// PostgreSQL persistence. Absent means in-memory stores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceConfig>,

    /// Durable workflow backend. Absent means the local engine only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable_backend: Option<DurableBackendConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeModeConfig {
    /// Consecutive pipeline failures before safe mode trips.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Minimum approver trust for exiting safe mode.
    #[serde(default = "default_exit_trust_floor")]
    pub exit_trust_floor: f64,
}

impl Default for SafeModeConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            exit_trust_floor: default_exit_trust_floor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Maximum tracked sources before least-recently-seen eviction.
    #[serde(default = "default_max_tracked_sources")]
    pub max_tracked_sources: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            max_tracked_sources: default_max_tracked_sources(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryGateConfig {
    #[serde(default = "default_allow_threshold")]
    pub allow_threshold: f64,

    #[serde(default = "default_quarantine_threshold")]
    pub quarantine_threshold: f64,
}

impl Default for MemoryGateConfig {
    fn default() -> Self {
        Self {
            allow_threshold: default_allow_threshold(),
            quarantine_threshold: default_quarantine_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default = "default_max_dead_letters")]
    pub max_dead_letters: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_dead_letters: default_max_dead_letters(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_ms")]
    pub retention_ms: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_ms: default_retention_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableBackendConfig {
    /// Temporal worker bridge endpoint, e.g. `http://temporal-worker:3000`.
    pub bridge_endpoint: String,
}

fn default_error_threshold() -> u32 {
    3
}

fn default_exit_trust_floor() -> f64 {
    0.8
}

fn default_max_tracked_sources() -> usize {
    10_000
}

fn default_allow_threshold() -> f64 {
    0.4
}

fn default_quarantine_threshold() -> f64 {
    0.2
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_dead_letters() -> usize {
    1_000
}

fn default_retention_ms() -> i64 {
    90 * 24 * 60 * 60 * 1000
}

impl GovernorConfigManifest {
    /// A runnable default configuration for embedded/dev use.
    pub fn default_for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "governor-default".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: GovernorConfigSpec {
                agent_id: agent_id.into(),
                ..Default::default()
            },
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: GovernorConfigManifest =
            serde_yaml::from_str(yaml).context("Failed to parse governor config YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize governor config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    /// Load from an explicit path, or the first discovery path that exists,
    /// or fall back to defaults.
    pub fn load_or_default(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(&path);
        }
        for path in Self::discovery_paths() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default_for_agent("default-agent"))
    }

    /// Discovery order: working directory, then the user config directory.
    pub fn discovery_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./governor-config.yaml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("aegis").join("governor-config.yaml"));
        }
        paths
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.api_version == API_VERSION,
            "Invalid apiVersion: expected '{}', got '{}'",
            API_VERSION,
            self.api_version
        );
        anyhow::ensure!(
            self.kind == KIND,
            "Invalid kind: expected '{}', got '{}'",
            KIND,
            self.kind
        );
        anyhow::ensure!(!self.spec.agent_id.is_empty(), "spec.agent_id must be set");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.spec.safe_mode.exit_trust_floor),
            "safe_mode.exit_trust_floor must be within 0.0..=1.0"
        );
        anyhow::ensure!(
            self.spec.memory_gate.allow_threshold >= self.spec.memory_gate.quarantine_threshold,
            "memory_gate.allow_threshold must be >= quarantine_threshold"
        );
        anyhow::ensure!(
            self.spec.workflow.default_timeout_ms > 0,
            "workflow.default_timeout_ms must be positive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_manifest_validates() {
        let manifest = GovernorConfigManifest::default_for_agent("agent-1");
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.spec.safe_mode.error_threshold, 3);
        assert_eq!(manifest.spec.safe_mode.exit_trust_floor, 0.8);
        assert_eq!(manifest.spec.workflow.default_timeout_ms, 30_000);
    }

    #[test]
    fn yaml_round_trip() {
        let manifest = GovernorConfigManifest::default_for_agent("agent-1");
        let yaml = manifest.to_yaml().unwrap();
        let back = GovernorConfigManifest::from_yaml(&yaml).unwrap();
        assert_eq!(back.spec.agent_id, "agent-1");
    }

    #[test]
    fn partial_spec_fills_defaults() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: GovernorConfig
metadata:
  name: minimal
spec:
  agent_id: agent-7
  safe_mode:
    error_threshold: 5
"#;
        let manifest = GovernorConfigManifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.spec.safe_mode.error_threshold, 5);
        // Unset fields take their declared defaults.
        assert_eq!(manifest.spec.safe_mode.exit_trust_floor, 0.8);
        assert_eq!(manifest.spec.workflow.max_dead_letters, 1_000);
        assert!(manifest.spec.persistence.is_none());
        assert!(manifest.spec.durable_backend.is_none());
    }

    #[test]
    fn wrong_kind_rejected() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: NodeConfig
metadata:
  name: wrong
spec:
  agent_id: agent-1
"#;
        assert!(GovernorConfigManifest::from_yaml(yaml).is_err());
    }

    #[test]
    fn inverted_gate_thresholds_rejected() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: GovernorConfig
metadata:
  name: inverted
spec:
  agent_id: agent-1
  memory_gate:
    allow_threshold: 0.1
    quarantine_threshold: 0.5
"#;
        assert!(GovernorConfigManifest::from_yaml(yaml).is_err());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governor-config.yaml");
        let manifest = GovernorConfigManifest::default_for_agent("agent-1");
        std::fs::write(&path, manifest.to_yaml().unwrap()).unwrap();

        let loaded = GovernorConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.agent_id, "agent-1");
    }
}
