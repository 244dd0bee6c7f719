// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Safe-Mode Controller
//!
//! Trip-wire that halts autonomous action after repeated pipeline failures.
//! Exit requires a trusted, high-reliability approver: source type user or
//! system AND trust at or above the configured floor. The controller, not
//! the state machine, owns the exit policy; the FSM only provides the
//! dedicated sink triggers.

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::events::PipelineEvent;
use crate::domain::state::{KernelStateMachine, StateTrigger};
use crate::domain::trust::SourceType;
use crate::infrastructure::event_bus::EventBus;

/// Consecutive-error threshold that trips safe mode.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 3;
/// Minimum approver trust for exiting safe mode.
pub const DEFAULT_EXIT_TRUST_FLOOR: f64 = 0.8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeModeStatus {
    pub active: bool,
    pub reason: Option<String>,
    pub entered_at: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
}

/// Typed verdict for an exit request; denials carry the reason string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitVerdict {
    Approved,
    Denied { reason: String },
}

pub struct SafeModeController {
    machine: Arc<KernelStateMachine>,
    bus: EventBus,
    threshold: u32,
    exit_trust_floor: f64,
    status: Mutex<SafeModeStatus>,
}

impl SafeModeController {
    pub fn new(
        machine: Arc<KernelStateMachine>,
        bus: EventBus,
        threshold: u32,
        exit_trust_floor: f64,
    ) -> Self {
        Self {
            machine,
            bus,
            threshold: threshold.max(1),
            exit_trust_floor,
            status: Mutex::new(SafeModeStatus {
                active: false,
                reason: None,
                entered_at: None,
                consecutive_errors: 0,
            }),
        }
    }

    pub fn with_defaults(machine: Arc<KernelStateMachine>, bus: EventBus) -> Self {
        Self::new(machine, bus, DEFAULT_ERROR_THRESHOLD, DEFAULT_EXIT_TRUST_FLOOR)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether the given consecutive-error count crosses the threshold.
    pub fn should_trigger(&self, consecutive_errors: u32) -> bool {
        consecutive_errors >= self.threshold
    }

    pub fn status(&self) -> SafeModeStatus {
        self.status.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.status.lock().active
    }

    /// Enter safe mode: drive the FSM into its sink state, record status,
    /// emit the `entered` event, bump the enter counter.
    pub fn enter(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let consecutive_errors = self.machine.consecutive_errors();
        self.machine.transition(StateTrigger::EscalateSafeMode);

        {
            let mut status = self.status.lock();
            status.active = true;
            status.reason = Some(reason.clone());
            status.entered_at = Some(Utc::now());
            status.consecutive_errors = consecutive_errors;
        }

        warn!(reason = %reason, consecutive_errors, "Entering safe mode");
        counter!(crate::telemetry::SAFE_MODE_ENTERED_TOTAL).increment(1);
        self.bus.publish(PipelineEvent::SafeModeEntered {
            reason,
            consecutive_errors,
            at: Utc::now(),
        });
    }

    /// Request an exit from safe mode on behalf of an approver.
    ///
    /// Allowed only if the approver is a user or system source AND its trust
    /// meets the floor. Denials emit an `exit-denied` event and leave safe
    /// mode active.
    pub fn request_exit(&self, approver_source: SourceType, approver_trust: f64) -> ExitVerdict {
        let denial = if !matches!(approver_source, SourceType::User | SourceType::System) {
            Some(format!(
                "approver source '{}' is not authorized to exit safe mode",
                approver_source
            ))
        } else if approver_trust < self.exit_trust_floor {
            Some(format!(
                "approver trust {:.2} is below the required floor {:.2}",
                approver_trust, self.exit_trust_floor
            ))
        } else {
            None
        };

        if let Some(reason) = denial {
            warn!(approver = %approver_source, reason = %reason, "Safe-mode exit denied");
            counter!(crate::telemetry::SAFE_MODE_EXIT_DENIED_TOTAL).increment(1);
            self.bus.publish(PipelineEvent::SafeModeExitDenied {
                approver: approver_source.to_string(),
                reason: reason.clone(),
                at: Utc::now(),
            });
            return ExitVerdict::Denied { reason };
        }

        {
            let mut status = self.status.lock();
            status.active = false;
            status.reason = None;
        }
        self.machine.transition(StateTrigger::SafeModeExit);
        self.machine.reset();

        info!(approver = %approver_source, trust = approver_trust, "Safe mode exited");
        self.bus.publish(PipelineEvent::SafeModeExited {
            approver: approver_source.to_string(),
            at: Utc::now(),
        });
        ExitVerdict::Approved
    }
}
