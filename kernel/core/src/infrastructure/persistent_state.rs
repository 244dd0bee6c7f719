// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Persistent State Machine
//!
//! Wraps the kernel FSM with fire-and-forget-but-ordered snapshotting:
//! every accepted transition enqueues a snapshot onto a strictly serialized
//! single-writer queue. `transition()` stays synchronous and returns
//! immediately; persistence lands behind it in FIFO order per instance.
//!
//! Recovery reads the most recent snapshot (ordered by `snapshot_at` then
//! row id, not insertion order) and restores the FSM through its native
//! snapshot hook, falling back to replaying the fixed trigger sequence from
//! `Idle` for machines without one. The repository's stale-write guard is
//! the second line of defense against out-of-order or concurrent writers.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::repository::{RepositoryError, SnapshotRepository};
use crate::domain::state::{
    replay_path, KernelStateMachine, StateSnapshot, StateTrigger, TransitionOutcome,
};

pub struct PersistentStateMachine {
    machine: Arc<KernelStateMachine>,
    agent_id: String,
    repository: Arc<dyn SnapshotRepository>,
    // None once closed; sends after close are dropped with a warning.
    queue: parking_lot::Mutex<Option<mpsc::UnboundedSender<StateSnapshot>>>,
    writer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PersistentStateMachine {
    pub fn new(
        machine: Arc<KernelStateMachine>,
        agent_id: impl Into<String>,
        repository: Arc<dyn SnapshotRepository>,
    ) -> Self {
        let agent_id = agent_id.into();
        let (queue, mut rx) = mpsc::unbounded_channel::<StateSnapshot>();

        // Single consumer: snapshots persist strictly in enqueue order, so
        // concurrent transitions never interleave out of order in storage.
        let writer_repository = repository.clone();
        let writer_agent = agent_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                match writer_repository.save(&writer_agent, &snapshot).await {
                    Ok(outcome) => {
                        debug!(agent_id = %writer_agent, ?outcome, "Snapshot write finished")
                    }
                    Err(error) => {
                        // Persistence failures must not poison the pipeline;
                        // recovery falls back to the last good snapshot.
                        warn!(agent_id = %writer_agent, error = %error, "Snapshot write failed")
                    }
                }
            }
        });

        Self {
            machine,
            agent_id,
            repository,
            queue: parking_lot::Mutex::new(Some(queue)),
            writer: parking_lot::Mutex::new(Some(writer)),
        }
    }

    pub fn machine(&self) -> &KernelStateMachine {
        &self.machine
    }

    /// Transition the FSM; an accepted transition enqueues a snapshot write.
    pub fn transition(&self, trigger: StateTrigger) -> TransitionOutcome {
        let outcome = self.machine.transition(trigger);
        if outcome.accepted {
            let snapshot = self.machine.snapshot();
            let delivered = self
                .queue
                .lock()
                .as_ref()
                .map(|queue| queue.send(snapshot).is_ok())
                .unwrap_or(false);
            if !delivered {
                warn!(agent_id = %self.agent_id, "Snapshot queue closed; write dropped");
            }
        }
        outcome
    }

    /// Restore from the most recent persisted snapshot. Uses the FSM's
    /// native restore hook; `recover_by_replay` covers machines without one.
    pub async fn recover(&self) -> Result<Option<StateSnapshot>, RepositoryError> {
        let Some(persisted) = self.repository.latest(&self.agent_id).await? else {
            info!(agent_id = %self.agent_id, "No snapshot to recover");
            return Ok(None);
        };

        self.machine.restore_snapshot(&persisted.snapshot);
        info!(
            agent_id = %self.agent_id,
            state = %persisted.snapshot.state,
            consecutive_errors = persisted.snapshot.consecutive_errors,
            "Recovered kernel state from snapshot"
        );
        Ok(Some(persisted.snapshot))
    }

    /// Replay-based restoration: reconstruct the snapshot's state from
    /// `Idle` via the fixed trigger map. Restores the state only; the
    /// error counter needs the native hook.
    pub async fn recover_by_replay(&self) -> Result<Option<StateSnapshot>, RepositoryError> {
        let Some(persisted) = self.repository.latest(&self.agent_id).await? else {
            return Ok(None);
        };

        self.machine.reset();
        for trigger in replay_path(persisted.snapshot.state) {
            let outcome = self.machine.transition(*trigger);
            if !outcome.accepted {
                return Err(RepositoryError::Database(format!(
                    "replay to {} rejected trigger {}",
                    persisted.snapshot.state, trigger
                )));
            }
        }
        info!(
            agent_id = %self.agent_id,
            state = %persisted.snapshot.state,
            "Recovered kernel state by trigger replay"
        );
        Ok(Some(persisted.snapshot))
    }

    /// Flush the queue and stop the writer. Call before process exit so
    /// queued snapshots land.
    pub async fn close(&self) {
        // Dropping the sender ends the writer loop after it drains.
        self.queue.lock().take();
        let handle = self.writer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
