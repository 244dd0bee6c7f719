// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Telemetry Initialization
//!
//! Structured tracing via `tracing-subscriber` is initialized by the CLI;
//! this module carries the metric name constants so dashboards and tests
//! reference one definition.

/// Role invocation counter, labeled by `role` and `outcome`.
pub const ROLE_EXECUTIONS_TOTAL: &str = "governor_role_executions_total";

/// Role latency histogram in seconds, labeled by `role`.
pub const ROLE_DURATION_SECONDS: &str = "governor_role_duration_seconds";

/// Safe-mode entry counter.
pub const SAFE_MODE_ENTERED_TOTAL: &str = "governor_safe_mode_entered_total";

/// Safe-mode exit-denied counter.
pub const SAFE_MODE_EXIT_DENIED_TOTAL: &str = "governor_safe_mode_exit_denied_total";

/// Stale snapshot writes skipped by the staleness guard.
pub const STALE_SNAPSHOT_SKIPPED_TOTAL: &str = "governor_stale_snapshot_skipped_total";
