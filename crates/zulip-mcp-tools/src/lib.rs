// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Validator (C4) and the seven tool-surface families (C5) plus the Chain
//! Executor (C8). The MCP Dispatcher (C9) depends on this crate for
//! [`ToolRegistry`] and never embeds tool business logic of its own.

pub mod chain;
pub mod context;
pub mod error;
pub mod families;
pub mod registry;
pub mod validator;

pub use context::ToolContext;
pub use error::ToolError;
pub use registry::{Tool, ToolCall, ToolOutput, ToolRegistry, ToolSchema};

/// Register every tool across all seven families plus the chain executor.
pub fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(families::messaging::SendMessageTool);
    registry.register(families::messaging::SearchMessagesTool);
    registry.register(families::messaging::EditMessageTool);
    registry.register(families::messaging::BulkOpsTool);
    registry.register(families::messaging::ReactTool { negate: false });
    registry.register(families::messaging::ReactTool { negate: true });
    registry.register(families::messaging::MessageHistoryTool);
    registry.register(families::messaging::CrossPostTool);

    registry.register(families::streams::ManageStreamsTool);
    registry.register(families::streams::ManageTopicsTool);
    registry.register(families::streams::GetStreamInfoTool);
    registry.register(families::streams::StreamAnalyticsTool);
    registry.register(families::streams::ManageStreamSettingsTool);

    registry.register(families::events::RegisterEventQueueTool);
    registry.register(families::events::GetEventsTool);
    registry.register(families::events::ListenEventsTool);
    registry.register(families::events::DeregisterEventQueueTool);

    registry.register(families::users::ListUsersTool);
    registry.register(families::users::GetUserTool);
    registry.register(families::users::OwnUserTool);
    registry.register(families::users::PresenceTool);
    registry.register(families::users::SwitchIdentityTool);
    registry.register(families::users::ManageGroupsTool);

    registry.register(families::search::AdvancedSearchTool);
    registry.register(families::search::AnalyticsTool);
    registry.register(families::search::DailySummaryTool);

    registry.register(families::files::UploadFileTool);
    registry.register(families::files::ManageFilesTool);

    registry.register(families::agents::RegisterAgentTool);
    registry.register(families::agents::AgentMessageTool);
    registry.register(families::agents::RequestUserInputTool);
    registry.register(families::agents::WaitForResponseTool);
    registry.register(families::agents::StartTaskTool);
    registry.register(families::agents::UpdateTaskProgressTool);
    registry.register(families::agents::CompleteTaskTool);
    registry.register(families::agents::ListInstancesTool);
    registry.register(families::agents::AfkEnableTool);
    registry.register(families::agents::AfkDisableTool);
    registry.register(families::agents::AfkStatusTool);

    registry.register(families::scheduler::CreateScheduledMessageTool);
    registry.register(families::scheduler::ListScheduledMessagesTool);
    registry.register(families::scheduler::UpdateScheduledMessageTool);
    registry.register(families::scheduler::CancelScheduledMessageTool);

    registry.register(chain::ChainExecuteTool);

    registry.register(families::diagnostics::StatusTool);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_registry_registers_every_family() {
        let registry = build_registry();
        let names = registry.names();
        assert!(names.contains(&"messaging.send".to_string()));
        assert!(names.contains(&"agents.register_agent".to_string()));
        assert!(names.contains(&"files.upload".to_string()));
        assert!(names.contains(&"scheduler.create".to_string()));
        assert!(names.contains(&"chain.execute".to_string()));
        assert!(names.contains(&"messaging.unreact".to_string()));
        assert!(names.contains(&"diagnostics.status".to_string()));
    }
}
