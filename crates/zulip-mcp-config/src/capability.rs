// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The static capability matrix (spec §4.2): which tool families each
//! identity kind is allowed to invoke.

use crate::credentials::IdentityKind;

/// A coarse grouping of tool surface operations (spec §4.2's "tool
/// families"). Every tool declares the single family it belongs to; the
/// Identity Registry checks membership against [`CAPABILITY_MATRIX`]
/// before a call is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolFamily {
    Read,
    Send,
    EditOwn,
    Search,
    Upload,
    Subscribe,
    React,
    StreamEvents,
    Scheduled,
    BulkRead,
    UserManagement,
    RealmSettings,
    Export,
    TopicDelete,
}

/// `(identity kind, families it may use)`, illustrative matrix from spec §4.2.
pub const CAPABILITY_MATRIX: &[(IdentityKind, &[ToolFamily])] = &[
    (
        IdentityKind::User,
        &[
            ToolFamily::Read,
            ToolFamily::Send,
            ToolFamily::EditOwn,
            ToolFamily::Search,
            ToolFamily::Upload,
            ToolFamily::Subscribe,
        ],
    ),
    (
        IdentityKind::Bot,
        &[
            ToolFamily::Send,
            ToolFamily::Read,
            ToolFamily::React,
            ToolFamily::StreamEvents,
            ToolFamily::Scheduled,
            ToolFamily::BulkRead,
        ],
    ),
    (
        IdentityKind::Admin,
        &[
            ToolFamily::Read,
            ToolFamily::Send,
            ToolFamily::EditOwn,
            ToolFamily::Search,
            ToolFamily::Upload,
            ToolFamily::Subscribe,
            ToolFamily::React,
            ToolFamily::StreamEvents,
            ToolFamily::Scheduled,
            ToolFamily::BulkRead,
            ToolFamily::UserManagement,
            ToolFamily::RealmSettings,
            ToolFamily::Export,
            ToolFamily::TopicDelete,
        ],
    ),
];

/// Whether `kind` is permitted to use tools in `family`.
pub fn allows(kind: IdentityKind, family: ToolFamily) -> bool {
    CAPABILITY_MATRIX
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, families)| families.contains(&family))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_can_send_but_not_manage_realm() {
        assert!(allows(IdentityKind::User, ToolFamily::Send));
        assert!(!allows(IdentityKind::User, ToolFamily::RealmSettings));
    }

    #[test]
    fn bot_can_react_and_stream_events() {
        assert!(allows(IdentityKind::Bot, ToolFamily::React));
        assert!(allows(IdentityKind::Bot, ToolFamily::StreamEvents));
        assert!(!allows(IdentityKind::Bot, ToolFamily::UserManagement));
    }

    #[test]
    fn admin_allows_everything_in_matrix() {
        for family in [
            ToolFamily::Read,
            ToolFamily::Send,
            ToolFamily::UserManagement,
            ToolFamily::RealmSettings,
            ToolFamily::Export,
            ToolFamily::TopicDelete,
        ] {
            assert!(allows(IdentityKind::Admin, family));
        }
    }
}
