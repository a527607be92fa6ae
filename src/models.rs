//! Core data models read by the statistics layer.

use serde::{Deserialize, Serialize};

/// Application mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppMode {
    Completion,
    Workflow,
    Chat,
    AdvancedChat,
    AgentChat,
}

impl AppMode {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Workflow => "workflow",
            Self::Chat => "chat",
            Self::AdvancedChat => "advanced-chat",
            Self::AgentChat => "agent-chat",
        }
    }

    /// Parse from the stored string. Unknown modes yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completion" => Some(Self::Completion),
            "workflow" => Some(Self::Workflow),
            "chat" => Some(Self::Chat),
            "advanced-chat" => Some(Self::AdvancedChat),
            "agent-chat" => Some(Self::AgentChat),
            _ => None,
        }
    }

    /// Modes served by the session interaction metric.
    pub const CHAT_MODES: &'static [AppMode] =
        &[AppMode::Chat, AppMode::AgentChat, AppMode::AdvancedChat];

    /// Modes that record workflow runs.
    pub const WORKFLOW_MODES: &'static [AppMode] = &[AppMode::Workflow, AppMode::AdvancedChat];
}

/// Channel a message was produced through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeFrom {
    ServiceApi,
    WebApp,
    Explore,
    Debugger,
}

impl InvokeFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceApi => "service-api",
            Self::WebApp => "web-app",
            Self::Explore => "explore",
            Self::Debugger => "debugger",
        }
    }
}

/// Terminal (or in-flight) status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowRunStatus {
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl WorkflowRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

/// Feedback rating on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackRating {
    Like,
    Dislike,
}

impl FeedbackRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

/// Console account resolved from the authenticated caller.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub name: String,
    /// IANA timezone name, if the account has set one.
    pub timezone: Option<String>,
    pub current_tenant_id: Option<String>,
}

/// Application record.
#[derive(Debug, Clone)]
pub struct App {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub mode: AppMode,
    pub status: String,
}

impl App {
    /// Whether this app is served by an endpoint restricted to `modes`.
    ///
    /// An empty list accepts every mode.
    pub fn supports(&self, modes: &[AppMode]) -> bool {
        modes.is_empty() || modes.contains(&self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_mode_round_trips_through_storage_form() {
        for mode in [
            AppMode::Completion,
            AppMode::Workflow,
            AppMode::Chat,
            AppMode::AdvancedChat,
            AppMode::AgentChat,
        ] {
            assert_eq!(AppMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(AppMode::parse("channel"), None);
    }

    #[test]
    fn app_mode_serializes_kebab_case() {
        let json = serde_json::to_string(&AppMode::AdvancedChat).expect("serialize");
        assert_eq!(json, "\"advanced-chat\"");
    }

    #[test]
    fn enum_storage_strings() {
        assert_eq!(InvokeFrom::Debugger.as_str(), "debugger");
        assert_eq!(InvokeFrom::WebApp.as_str(), "web-app");
        assert_eq!(WorkflowRunStatus::Succeeded.as_str(), "succeeded");
        assert_eq!(FeedbackRating::Like.as_str(), "like");
    }

    #[test]
    fn app_supports_mode_lists() {
        let app = App {
            id: "a".to_string(),
            tenant_id: "t".to_string(),
            name: "bot".to_string(),
            mode: AppMode::Completion,
            status: "normal".to_string(),
        };
        assert!(app.supports(&[]));
        assert!(app.supports(&[AppMode::Completion]));
        assert!(!app.supports(AppMode::CHAT_MODES));
        assert!(!app.supports(AppMode::WORKFLOW_MODES));
    }
}
