// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Identity Registry (C2), REST Client (C3), and User Resolver (C10).

mod client;
mod error;
mod identity;
mod narrow;
mod rate_limit;
mod resolver;

pub use client::RestClient;
pub use error::{RestError, Result, UserCandidate};
pub use identity::IdentityRegistry;
pub use narrow::{NarrowBuilder, NarrowTerm, TimeBound};
pub use resolver::{resolve as resolve_user_offline, ResolvedUser, ZulipUser};
