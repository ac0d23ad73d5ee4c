// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Identity Registry (spec §4.2): holds up to three credential bundles and
//! enforces the capability matrix before a call reaches the REST client.

use std::sync::Mutex;

use tracing::{info, warn};
use zulip_mcp_config::{allows, ApiCredentials, Credentials, IdentityKind, ToolFamily};

use crate::error::{RestError, Result};

/// Identity kinds in least-to-most-privileged order, used when a tool
/// doesn't request a specific identity and the matrix lists more than one
/// eligible kind (spec §4.2: "tool's default from the capability matrix").
const DEFAULT_ORDER: [IdentityKind; 3] = [IdentityKind::User, IdentityKind::Bot, IdentityKind::Admin];

pub struct IdentityRegistry {
    credentials: Credentials,
    current: Mutex<IdentityKind>,
}

impl IdentityRegistry {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials, current: Mutex::new(IdentityKind::User) }
    }

    pub fn has(&self, kind: IdentityKind) -> bool {
        self.credentials.has(kind)
    }

    /// The identity last activated by [`Self::switch_identity`] (spec §4.2
    /// "exposes `current()` solely for observability" — it does not gate
    /// [`Self::select`], which is stateless per call).
    pub fn current(&self) -> IdentityKind {
        *self.current.lock().expect("identity registry mutex poisoned")
    }

    pub fn check_capability(&self, kind: IdentityKind, family: ToolFamily) -> Result<()> {
        if allows(kind, family) {
            Ok(())
        } else {
            Err(RestError::CapabilityDenied { kind, family })
        }
    }

    /// Select the credential bundle for a call. `preferred_kind`, if given
    /// and configured, wins outright — even if the matrix would deny it
    /// (the capability check below is what actually rejects it, so callers
    /// get `CapabilityDenied` naming the identity they asked for, not a
    /// silently substituted one). Otherwise pick the least-privileged kind
    /// the matrix allows for `family`, falling back to USER.
    pub fn select(&self, family: ToolFamily, preferred_kind: Option<IdentityKind>) -> Result<(IdentityKind, ApiCredentials)> {
        let kind = match preferred_kind {
            Some(kind) => kind,
            None => DEFAULT_ORDER
                .into_iter()
                .find(|kind| self.has(*kind) && allows(*kind, family))
                .unwrap_or(IdentityKind::User),
        };
        self.check_capability(kind, family)?;
        let creds = self.credentials.get(kind).cloned().ok_or(RestError::IdentityUnavailable { kind })?;
        Ok((kind, creds))
    }

    /// Runtime identity switch (spec §4.2 "Identity switching"). Additive:
    /// validated via `probe` (a token round-trip, typically `GET
    /// /users/me`) before activation; a failed probe leaves the previous
    /// identity active.
    pub async fn switch_identity<F, Fut>(&self, kind: IdentityKind, probe: F) -> Result<()>
    where
        F: FnOnce(ApiCredentials) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let creds = self.credentials.get(kind).cloned().ok_or(RestError::IdentityUnavailable { kind })?;
        match probe(creds).await {
            Ok(()) => {
                *self.current.lock().expect("identity registry mutex poisoned") = kind;
                info!(%kind, "switched active identity");
                Ok(())
            }
            Err(err) => {
                warn!(%kind, %err, "identity switch probe failed; previous identity remains active");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(user: bool, bot: bool, admin: bool) -> Credentials {
        let make = |n: &str| ApiCredentials {
            email: format!("{n}@example.com"),
            api_key: "k".into(),
            site: "https://chat.example.com".into(),
            display_name: n.into(),
        };
        Credentials {
            user: user.then(|| make("user")),
            bot: bot.then(|| make("bot")),
            admin: admin.then(|| make("admin")),
        }
    }

    #[test]
    fn select_defaults_to_least_privileged_allowed_kind() {
        let registry = IdentityRegistry::new(creds(true, true, false));
        let (kind, selected) = registry.select(ToolFamily::StreamEvents, None).unwrap();
        // USER can't StreamEvents, BOT can — BOT should win by default order.
        assert_eq!(kind, IdentityKind::Bot);
        assert_eq!(selected.display_name, "bot");
    }

    #[test]
    fn select_falls_back_to_user_when_nothing_in_matrix_matches() {
        let registry = IdentityRegistry::new(creds(true, false, false));
        // UserManagement requires ADMIN; with none configured, default falls
        // back to USER, which then fails the capability check explicitly.
        let err = registry.select(ToolFamily::UserManagement, None).unwrap_err();
        assert!(matches!(err, RestError::CapabilityDenied { kind: IdentityKind::User, .. }));
    }

    #[test]
    fn select_preferred_kind_wins_even_if_unconventional() {
        let registry = IdentityRegistry::new(creds(true, true, true));
        let (_, selected) = registry.select(ToolFamily::Send, Some(IdentityKind::Admin)).unwrap();
        assert_eq!(selected.display_name, "admin");
    }

    #[test]
    fn select_preferred_kind_denied_reports_that_kind() {
        let registry = IdentityRegistry::new(creds(true, true, false));
        let err = registry.select(ToolFamily::UserManagement, Some(IdentityKind::Bot)).unwrap_err();
        assert!(matches!(err, RestError::CapabilityDenied { kind: IdentityKind::Bot, .. }));
    }

    #[tokio::test]
    async fn switch_identity_failed_probe_leaves_previous_active() {
        let registry = IdentityRegistry::new(creds(true, true, false));
        assert_eq!(registry.current(), IdentityKind::User);
        let result = registry
            .switch_identity(IdentityKind::Bot, |_| async { Err(RestError::Auth { status: 401, message: "no".into() }) })
            .await;
        assert!(result.is_err());
        assert_eq!(registry.current(), IdentityKind::User);
    }

    #[tokio::test]
    async fn switch_identity_successful_probe_activates() {
        let registry = IdentityRegistry::new(creds(true, true, false));
        registry.switch_identity(IdentityKind::Bot, |_| async { Ok(()) }).await.unwrap();
        assert_eq!(registry.current(), IdentityKind::Bot);
    }
}
