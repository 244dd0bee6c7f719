// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod config;
pub mod chain;
pub mod simulate;

pub use chain::ChainCommand;
pub use config::ConfigCommand;
pub use simulate::SimulateArgs;
