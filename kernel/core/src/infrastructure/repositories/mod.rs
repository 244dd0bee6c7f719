// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod memory;
pub mod postgres_state;
pub mod postgres_identity;
pub mod postgres_events;
pub mod postgres_entity_memory;

pub use memory::{InMemoryIdentityStore, InMemorySnapshotRepository};
pub use postgres_entity_memory::PgEntityMemoryStore;
pub use postgres_events::PgEventStore;
pub use postgres_identity::PgIdentityStore;
pub use postgres_state::PgSnapshotRepository;
