// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedded Kernel Assembly
//!
//! Composition root for an in-process kernel: wires the state machine,
//! safe-mode controller, trust subsystem, registries, in-memory stores, the
//! local workflow engine, and the five role adapters into an orchestrator.
//! PostgreSQL-backed deployments swap the repository implementations at
//! this seam; nothing downstream changes.

use std::sync::Arc;

use crate::application::audit::AuditService;
use crate::application::goal_manager::GoalManager;
use crate::application::memory_gate::{GateThresholds, MemoryGate, RuleBasedModel};
use crate::application::orchestrator::KernelOrchestrator;
use crate::application::roles::{
    ActionHandler, InProcessAuditor, InProcessExecutor, InProcessMemoryWriter, InProcessPlanner,
    InProcessVerifier,
};
use crate::application::safe_mode::SafeModeController;
use crate::application::trust::{SourceTracker, TrustScorer};
use crate::application::verification::ToolRegistry;
use crate::application::workflow_engine::{LocalWorkflowEngine, WorkflowEngine};
use crate::config::GovernorConfigManifest;
use crate::domain::repository::{EventStore, IdentityStore};
use crate::domain::state::KernelStateMachine;
use crate::infrastructure::entity_memory::{EntityMemoryStore, InMemoryEntityMemoryStore};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::event_store::InMemoryEventStore;
use crate::infrastructure::repositories::memory::InMemoryIdentityStore;
use crate::infrastructure::retention::RetentionManager;
use crate::domain::retention::RetentionPolicy;

/// Shared handles into an assembled kernel, for observers and tests.
#[derive(Clone)]
pub struct KernelHandles {
    pub machine: Arc<KernelStateMachine>,
    pub safe_mode: Arc<SafeModeController>,
    pub tracker: Arc<SourceTracker>,
    pub registry: Arc<ToolRegistry>,
    pub verifier: Arc<InProcessVerifier>,
    pub goal_manager: Arc<GoalManager>,
    pub events: Arc<dyn EventStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub entity_memory: Arc<dyn EntityMemoryStore>,
    pub workflow_engine: Arc<dyn WorkflowEngine>,
    pub retention: Arc<RetentionManager>,
    pub bus: EventBus,
}

/// Build an embedded kernel from configuration with in-memory persistence.
pub fn build_embedded_kernel(
    config: &GovernorConfigManifest,
    handler: Arc<dyn ActionHandler>,
) -> (Arc<KernelOrchestrator>, KernelHandles) {
    let machine = Arc::new(KernelStateMachine::new());
    let bus = EventBus::with_default_capacity();
    let safe_mode = Arc::new(SafeModeController::new(
        machine.clone(),
        bus.clone(),
        config.spec.safe_mode.error_threshold,
        config.spec.safe_mode.exit_trust_floor,
    ));

    let tracker = Arc::new(SourceTracker::new(config.spec.trust.max_tracked_sources));
    let goal_manager = Arc::new(GoalManager::new());
    let registry = Arc::new(ToolRegistry::new());
    let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let identities: Arc<dyn IdentityStore> = Arc::new(InMemoryIdentityStore::new());
    let entity_memory: Arc<dyn EntityMemoryStore> =
        Arc::new(InMemoryEntityMemoryStore::with_default_ttl());
    let workflow_engine: Arc<dyn WorkflowEngine> = Arc::new(LocalWorkflowEngine::new(
        config.spec.workflow.default_timeout_ms,
        config.spec.workflow.max_dead_letters,
    ));
    let retention = Arc::new(RetentionManager::new(RetentionPolicy {
        retention_ms: config.spec.retention.retention_ms,
    }));

    let thresholds = GateThresholds {
        allow: config.spec.memory_gate.allow_threshold,
        quarantine: config.spec.memory_gate.quarantine_threshold,
    };
    let gate = Arc::new(MemoryGate::new(
        Box::new(RuleBasedModel::new(thresholds)),
        thresholds,
    ));

    let planner = Arc::new(InProcessPlanner::new(goal_manager.clone(), tracker.clone()));
    let executor = Arc::new(InProcessExecutor::new(
        handler,
        Some(workflow_engine.clone()),
    ));
    let verifier = Arc::new(InProcessVerifier::new(registry.clone()));
    let memory_writer = Arc::new(InProcessMemoryWriter::new(
        gate,
        tracker.clone(),
        TrustScorer::default(),
        entity_memory.clone(),
    ));
    let auditor = Arc::new(InProcessAuditor::new(Arc::new(AuditService::new(
        events.clone(),
        identities.clone(),
    ))));

    let orchestrator = Arc::new(KernelOrchestrator::new(
        machine.clone(),
        safe_mode.clone(),
        tracker.clone(),
        planner,
        executor,
        verifier.clone(),
        memory_writer,
        auditor,
        events.clone(),
        bus.clone(),
    ));

    let handles = KernelHandles {
        machine,
        safe_mode,
        tracker,
        registry,
        verifier,
        goal_manager,
        events,
        identities,
        entity_memory,
        workflow_engine,
        retention,
        bus,
    };

    (orchestrator, handles)
}
