// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Kernel State Machine Domain Model
//!
//! The kernel state machine is the authoritative control-flow gate of the
//! governor: every pipeline stage is a state, every stage transition is
//! validated against a fixed transition table.
//!
//! # Invariants
//!
//! 1. Exactly one current state per kernel instance
//! 2. An undeclared `(state, trigger)` pair is rejected, not silently ignored,
//!    and does not mutate state
//! 3. `SafeMode` and `Error` are sink-like: reachable from any state via
//!    their dedicated entry triggers, exitable only through their dedicated
//!    exit triggers

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pipeline stage of the governance kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelState {
    Idle,
    Planning,
    Executing,
    Verifying,
    WritingMemory,
    Auditing,
    AwaitingApproval,
    SafeMode,
    Error,
}

impl std::fmt::Display for KernelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KernelState::Idle => "idle",
            KernelState::Planning => "planning",
            KernelState::Executing => "executing",
            KernelState::Verifying => "verifying",
            KernelState::WritingMemory => "writing_memory",
            KernelState::Auditing => "auditing",
            KernelState::AwaitingApproval => "awaiting_approval",
            KernelState::SafeMode => "safe_mode",
            KernelState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl KernelState {
    /// All states, in pipeline order. Used by the replay-path test and the
    /// CLI status rendering.
    pub const ALL: [KernelState; 9] = [
        KernelState::Idle,
        KernelState::Planning,
        KernelState::Executing,
        KernelState::Verifying,
        KernelState::WritingMemory,
        KernelState::Auditing,
        KernelState::AwaitingApproval,
        KernelState::SafeMode,
        KernelState::Error,
    ];

    pub fn parse(s: &str) -> Option<KernelState> {
        match s {
            "idle" => Some(KernelState::Idle),
            "planning" => Some(KernelState::Planning),
            "executing" => Some(KernelState::Executing),
            "verifying" => Some(KernelState::Verifying),
            "writing_memory" => Some(KernelState::WritingMemory),
            "auditing" => Some(KernelState::Auditing),
            "awaiting_approval" => Some(KernelState::AwaitingApproval),
            "safe_mode" => Some(KernelState::SafeMode),
            "error" => Some(KernelState::Error),
            _ => None,
        }
    }
}

/// Declared triggers for state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTrigger {
    PlanRequested,
    PlanReady,
    PlanRejected,
    ApprovalRequired,
    ApprovalGranted,
    ApprovalDenied,
    ExecutionComplete,
    VerificationPassed,
    WriteMemory,
    AuditComplete,
    FatalError,
    EscalateSafeMode,
    SafeModeExit,
    ErrorRecovered,
}

impl std::fmt::Display for StateTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StateTrigger::PlanRequested => "plan_requested",
            StateTrigger::PlanReady => "plan_ready",
            StateTrigger::PlanRejected => "plan_rejected",
            StateTrigger::ApprovalRequired => "approval_required",
            StateTrigger::ApprovalGranted => "approval_granted",
            StateTrigger::ApprovalDenied => "approval_denied",
            StateTrigger::ExecutionComplete => "execution_complete",
            StateTrigger::VerificationPassed => "verification_passed",
            StateTrigger::WriteMemory => "write_memory",
            StateTrigger::AuditComplete => "audit_complete",
            StateTrigger::FatalError => "fatal_error",
            StateTrigger::EscalateSafeMode => "escalate_safe_mode",
            StateTrigger::SafeModeExit => "safe_mode_exit",
            StateTrigger::ErrorRecovered => "error_recovered",
        };
        write!(f, "{}", s)
    }
}

/// Result of a transition attempt. Rejections carry the unchanged state in
/// both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub accepted: bool,
    pub from: KernelState,
    pub to: KernelState,
}

/// A single accepted state change, delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: KernelState,
    pub to: KernelState,
    pub trigger: StateTrigger,
}

/// Point-in-time capture of the machine, used by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: KernelState,
    pub consecutive_errors: u32,
    pub snapshot_at: DateTime<Utc>,
}

/// The fixed transition table: `(state, trigger) -> next state`.
///
/// Kept as a single exhaustive function so the compiler flags a new state or
/// trigger that has not been threaded through.
pub fn transition_table(state: KernelState, trigger: StateTrigger) -> Option<KernelState> {
    use KernelState::*;
    use StateTrigger::*;

    // Sink entries first: SafeMode and Error are reachable from any state
    // via their dedicated entry triggers, but only exitable through their
    // own exit triggers.
    match (state, trigger) {
        (SafeMode, SafeModeExit) => return Some(Idle),
        (SafeMode, _) => return None,
        (Error, ErrorRecovered) => return Some(Idle),
        (Error, EscalateSafeMode) => return Some(SafeMode),
        (Error, _) => return None,
        (_, EscalateSafeMode) => return Some(SafeMode),
        (_, FatalError) => return Some(Error),
        _ => {}
    }

    match (state, trigger) {
        (Idle, PlanRequested) => Some(Planning),
        (Planning, PlanReady) => Some(Executing),
        (Planning, PlanRejected) => Some(Idle),
        (Planning, ApprovalRequired) => Some(AwaitingApproval),
        (Executing, ApprovalRequired) => Some(AwaitingApproval),
        (AwaitingApproval, ApprovalGranted) => Some(Executing),
        (AwaitingApproval, ApprovalDenied) => Some(Idle),
        (Executing, ExecutionComplete) => Some(Verifying),
        (Verifying, VerificationPassed) => Some(WritingMemory),
        (WritingMemory, WriteMemory) => Some(Auditing),
        (Auditing, AuditComplete) => Some(Idle),
        _ => None,
    }
}

/// Replay sequence that reconstructs `target` from `Idle`, for restoring a
/// snapshot into a machine without a native restore hook.
///
/// Must be kept in lockstep with [`transition_table`]; the
/// `replay_paths_cover_every_state` test asserts every non-idle state has a
/// valid, loop-free path.
pub fn replay_path(target: KernelState) -> &'static [StateTrigger] {
    use StateTrigger::*;
    match target {
        KernelState::Idle => &[],
        KernelState::Planning => &[PlanRequested],
        KernelState::Executing => &[PlanRequested, PlanReady],
        KernelState::Verifying => &[PlanRequested, PlanReady, ExecutionComplete],
        KernelState::WritingMemory => {
            &[PlanRequested, PlanReady, ExecutionComplete, VerificationPassed]
        }
        KernelState::Auditing => &[
            PlanRequested,
            PlanReady,
            ExecutionComplete,
            VerificationPassed,
            WriteMemory,
        ],
        KernelState::AwaitingApproval => &[PlanRequested, ApprovalRequired],
        KernelState::SafeMode => &[EscalateSafeMode],
        KernelState::Error => &[FatalError],
    }
}

type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Handle returned by [`KernelStateMachine::on_state_change`]; pass back to
/// `remove_listener` to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

struct MachineInner {
    state: KernelState,
    consecutive_errors: u32,
}

/// The kernel state machine.
///
/// `transition()` is synchronous and returns immediately; persistence is
/// layered on top by `infrastructure::persistent_state`.
pub struct KernelStateMachine {
    inner: RwLock<MachineInner>,
    listeners: RwLock<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

impl KernelStateMachine {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MachineInner {
                state: KernelState::Idle,
                consecutive_errors: 0,
            }),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn current_state(&self) -> KernelState {
        self.inner.read().state
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.inner.read().consecutive_errors
    }

    /// Attempt a transition. Undeclared `(state, trigger)` pairs are rejected
    /// without mutating state.
    pub fn transition(&self, trigger: StateTrigger) -> TransitionOutcome {
        let change = {
            let mut inner = self.inner.write();
            let from = inner.state;
            let Some(to) = transition_table(from, trigger) else {
                return TransitionOutcome {
                    accepted: false,
                    from,
                    to: from,
                };
            };

            match trigger {
                StateTrigger::FatalError => {
                    inner.consecutive_errors += 1;
                }
                // Only the explicit success paths reset the counter.
                StateTrigger::ExecutionComplete | StateTrigger::WriteMemory => {
                    inner.consecutive_errors = 0;
                }
                _ => {}
            }

            inner.state = to;
            StateChange { from, to, trigger }
        };

        self.notify(&change);

        TransitionOutcome {
            accepted: true,
            from: change.from,
            to: change.to,
        }
    }

    /// Return to `Idle` and zero the error counter. Does not notify
    /// listeners: reset is an operator action, not a pipeline transition.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = KernelState::Idle;
        inner.consecutive_errors = 0;
    }

    /// Native snapshot-restore hook used by the persistence layer in
    /// preference to trigger replay. Does not notify listeners: restoration
    /// is recovery, not a pipeline transition.
    pub fn restore_snapshot(&self, snapshot: &StateSnapshot) {
        let mut inner = self.inner.write();
        inner.state = snapshot.state;
        inner.consecutive_errors = snapshot.consecutive_errors;
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read();
        StateSnapshot {
            state: inner.state,
            consecutive_errors: inner.consecutive_errors,
            snapshot_at: Utc::now(),
        }
    }

    /// Register a state-change listener. Returns a handle for unsubscription.
    pub fn on_state_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));
        ListenerHandle(id)
    }

    pub fn remove_listener(&self, handle: ListenerHandle) {
        self.listeners.write().retain(|(id, _)| *id != handle.0);
    }

    fn notify(&self, change: &StateChange) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(change);
        }
    }
}

impl Default for KernelStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TRIGGERS: [StateTrigger; 14] = [
        StateTrigger::PlanRequested,
        StateTrigger::PlanReady,
        StateTrigger::PlanRejected,
        StateTrigger::ApprovalRequired,
        StateTrigger::ApprovalGranted,
        StateTrigger::ApprovalDenied,
        StateTrigger::ExecutionComplete,
        StateTrigger::VerificationPassed,
        StateTrigger::WriteMemory,
        StateTrigger::AuditComplete,
        StateTrigger::FatalError,
        StateTrigger::EscalateSafeMode,
        StateTrigger::SafeModeExit,
        StateTrigger::ErrorRecovered,
    ];

    fn machine_in(state: KernelState) -> KernelStateMachine {
        let machine = KernelStateMachine::new();
        for trigger in replay_path(state) {
            assert!(machine.transition(*trigger).accepted);
        }
        assert_eq!(machine.current_state(), state);
        machine
    }

    #[test]
    fn happy_path_pipeline() {
        let machine = KernelStateMachine::new();
        let steps = [
            (StateTrigger::PlanRequested, KernelState::Planning),
            (StateTrigger::PlanReady, KernelState::Executing),
            (StateTrigger::ExecutionComplete, KernelState::Verifying),
            (StateTrigger::VerificationPassed, KernelState::WritingMemory),
            (StateTrigger::WriteMemory, KernelState::Auditing),
            (StateTrigger::AuditComplete, KernelState::Idle),
        ];
        for (trigger, expected) in steps {
            let outcome = machine.transition(trigger);
            assert!(outcome.accepted, "trigger {} rejected", trigger);
            assert_eq!(outcome.to, expected);
        }
    }

    #[test]
    fn undeclared_pairs_rejected_without_mutation() {
        for state in KernelState::ALL {
            for trigger in ALL_TRIGGERS {
                if transition_table(state, trigger).is_some() {
                    continue;
                }
                let machine = machine_in(state);
                let errors_before = machine.consecutive_errors();
                let outcome = machine.transition(trigger);
                assert!(!outcome.accepted, "({}, {}) should reject", state, trigger);
                assert_eq!(outcome.from, state);
                assert_eq!(outcome.to, state);
                assert_eq!(machine.current_state(), state);
                assert_eq!(machine.consecutive_errors(), errors_before);
            }
        }
    }

    #[test]
    fn fatal_error_counts_and_success_paths_reset() {
        let machine = KernelStateMachine::new();
        machine.transition(StateTrigger::PlanRequested);
        machine.transition(StateTrigger::FatalError);
        assert_eq!(machine.consecutive_errors(), 1);
        machine.transition(StateTrigger::ErrorRecovered);
        machine.transition(StateTrigger::PlanRequested);
        machine.transition(StateTrigger::FatalError);
        assert_eq!(machine.consecutive_errors(), 2);

        // AuditComplete does not reset the counter implicitly.
        machine.transition(StateTrigger::ErrorRecovered);
        machine.transition(StateTrigger::PlanRequested);
        machine.transition(StateTrigger::PlanReady);
        assert_eq!(machine.consecutive_errors(), 2);

        // ExecutionComplete is an explicit success path.
        machine.transition(StateTrigger::ExecutionComplete);
        assert_eq!(machine.consecutive_errors(), 0);
    }

    #[test]
    fn safe_mode_is_a_sink() {
        let machine = machine_in(KernelState::SafeMode);
        for trigger in ALL_TRIGGERS {
            if trigger == StateTrigger::SafeModeExit {
                continue;
            }
            assert!(!machine.transition(trigger).accepted);
            assert_eq!(machine.current_state(), KernelState::SafeMode);
        }
        let outcome = machine.transition(StateTrigger::SafeModeExit);
        assert!(outcome.accepted);
        assert_eq!(outcome.to, KernelState::Idle);
    }

    #[test]
    fn error_exits_only_through_dedicated_triggers() {
        let machine = machine_in(KernelState::Error);
        for trigger in ALL_TRIGGERS {
            if matches!(
                trigger,
                StateTrigger::ErrorRecovered | StateTrigger::EscalateSafeMode
            ) {
                continue;
            }
            assert!(!machine.transition(trigger).accepted);
        }
        assert!(machine.transition(StateTrigger::ErrorRecovered).accepted);
        assert_eq!(machine.current_state(), KernelState::Idle);
    }

    #[test]
    fn replay_paths_cover_every_state() {
        for state in KernelState::ALL {
            let machine = KernelStateMachine::new();
            let path = replay_path(state);
            let mut seen = vec![machine.current_state()];
            for trigger in path {
                let outcome = machine.transition(*trigger);
                assert!(outcome.accepted, "replay to {} broke at {}", state, trigger);
                assert!(
                    !seen.contains(&outcome.to),
                    "replay path to {} revisits {}",
                    state,
                    outcome.to
                );
                seen.push(outcome.to);
            }
            assert_eq!(machine.current_state(), state);
        }
    }

    #[test]
    fn reset_returns_to_idle_and_zeroes_errors() {
        let machine = KernelStateMachine::new();
        machine.transition(StateTrigger::PlanRequested);
        machine.transition(StateTrigger::FatalError);
        machine.reset();
        assert_eq!(machine.current_state(), KernelState::Idle);
        assert_eq!(machine.consecutive_errors(), 0);
    }

    #[test]
    fn listeners_fire_and_unsubscribe() {
        let machine = KernelStateMachine::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = machine.on_state_change(move |change| {
            sink.lock().push((change.from, change.to));
        });

        machine.transition(StateTrigger::PlanRequested);
        assert_eq!(
            seen.lock().as_slice(),
            &[(KernelState::Idle, KernelState::Planning)]
        );

        machine.remove_listener(handle);
        machine.transition(StateTrigger::PlanReady);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn restore_snapshot_sets_state_and_counter() {
        let machine = KernelStateMachine::new();
        machine.restore_snapshot(&StateSnapshot {
            state: KernelState::Verifying,
            consecutive_errors: 2,
            snapshot_at: Utc::now(),
        });
        assert_eq!(machine.current_state(), KernelState::Verifying);
        assert_eq!(machine.consecutive_errors(), 2);
    }
}
