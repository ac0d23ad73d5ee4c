// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Embedded analytical store (spec §3, §4.1): agents, agent instances,
//! input requests, tasks, the singleton AFK row, and a read-through cache
//! for REST lookups. Backed by bundled SQLite in WAL mode.

mod error;
mod migrations;
mod model;
mod store;

pub use error::{Result, StoreError};
pub use model::{AfkState, Agent, AgentInstance, CacheScope, InputRequest, RequestStatus, Task, TaskStatus};
pub use store::Store;
