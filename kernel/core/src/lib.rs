// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AEGIS Governor Core
//!
//! The autonomy governance kernel for AEGIS agent nodes. Sits between an
//! agent's decision-making and its effectful actions, enforcing that every
//! action is planned, executed, verified, trust-scored, and audited before
//! the agent is allowed to proceed.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Kernel state machine, five-role pipeline, workflow
//!   execution backends, trust-gated memory writes, hash-chained audit log

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod config;
pub mod telemetry;

pub use domain::*;
