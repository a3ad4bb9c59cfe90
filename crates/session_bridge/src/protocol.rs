//! Wire messages exchanged between the UI process and the agent host.
//!
//! Every message is one JSON object per line. UI requests carry a numeric
//! `id` and a kebab-case `command`; the host answers each request exactly
//! once with a `response` and may stream `notification`s for compose turns.

use std::fmt;

use serde::{Deserialize, Serialize};
use transcript::ConversationState;

pub type RequestId = u64;

/// UI to agent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Command {
    /// Starts a turn. A missing or unknown `threadId` creates the thread.
    Compose {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        context_files: Vec<String>,
        /// `data:<mime>;base64,<payload>` image attachment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    /// Cancels the thread's in-flight turn, or every turn when no thread is named.
    Cancel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },
    BranchThread {
        thread_id: String,
        source_thread_id: String,
    },
    DeleteThread {
        thread_id: String,
    },
    DeleteIndex {
        thread_id: String,
    },
    UpdateFile {
        thread_id: String,
        files: Vec<String>,
    },
    /// An empty `text` clears the command.
    UpdateCommand {
        thread_id: String,
        text: String,
    },
    GetThread {
        thread_id: String,
    },
}

impl Command {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compose { .. } => "compose",
            Self::Cancel { .. } => "cancel",
            Self::BranchThread { .. } => "branch-thread",
            Self::DeleteThread { .. } => "delete-thread",
            Self::DeleteIndex { .. } => "delete-index",
            Self::UpdateFile { .. } => "update-file",
            Self::UpdateCommand { .. } => "update-command",
            Self::GetThread { .. } => "get-thread",
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Self::Compose { thread_id, .. } | Self::Cancel { thread_id } => thread_id.as_deref(),
            Self::BranchThread { thread_id, .. }
            | Self::DeleteThread { thread_id }
            | Self::DeleteIndex { thread_id }
            | Self::UpdateFile { thread_id, .. }
            | Self::UpdateCommand { thread_id, .. }
            | Self::GetThread { thread_id } => Some(thread_id),
        }
    }
}

/// Agent to UI message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HostMessage {
    Response(Response),
    Notification(PhaseNotification),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub outcome: Outcome,
}

/// Fire-and-forget compose progress. `seq` starts at 0 for each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseNotification {
    pub request_id: RequestId,
    pub thread_id: String,
    pub seq: u64,
    pub phase: ComposePhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ComposePhase {
    Started,
    Generating,
    ToolCall { tool_name: String },
    ToolResult { tool_name: String },
    Completed,
    Cancelled,
    Failed,
}

impl ComposePhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    Ok { body: ResponseBody },
    Error { kind: ErrorKind, message: String },
}

impl Outcome {
    #[must_use]
    pub fn ack() -> Self {
        Self::Ok {
            body: ResponseBody::Ack,
        }
    }

    #[must_use]
    pub fn snapshot(state: ConversationState) -> Self {
        Self::Ok {
            body: ResponseBody::Snapshot(state),
        }
    }

    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ResponseBody {
    Snapshot(ConversationState),
    Ack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    ThreadBusy,
    ThreadNotFound,
    InvalidRequest,
    MissingSessionContext,
    AgentFailed,
    StoreFailure,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreadBusy => "thread-busy",
            Self::ThreadNotFound => "thread-not-found",
            Self::InvalidRequest => "invalid-request",
            Self::MissingSessionContext => "missing-session-context",
            Self::AgentFailed => "agent-failed",
            Self::StoreFailure => "store-failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
