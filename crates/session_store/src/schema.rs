use agent_runtime::RawMessage;
use serde::{Deserialize, Serialize};

/// First line of every thread file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadHeader {
    pub version: u32,
    pub thread_id: String,
    #[serde(default)]
    pub parent_thread_id: Option<String>,
    pub workspace_id: String,
    pub title: String,
    pub created_at: String,
}

impl ThreadHeader {
    #[must_use]
    pub fn v1(
        thread_id: impl Into<String>,
        parent_thread_id: Option<String>,
        workspace_id: impl Into<String>,
        title: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            version: 1,
            thread_id: thread_id.into(),
            parent_thread_id,
            workspace_id: workspace_id.into(),
            title: title.into(),
            created_at: created_at.into(),
        }
    }
}

/// One persisted raw agent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageRecord {
    pub ts: String,
    pub message: RawMessage,
}

/// Patch to the thread's auxiliary state. Absent fields are left unchanged;
/// an empty `command` clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateRecord {
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Caller-facing state patch; the store stamps it with a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatePatch {
    pub title: Option<String>,
    pub context_files: Option<Vec<String>>,
    pub command: Option<String>,
}

impl StatePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.context_files.is_none() && self.command.is_none()
    }

    pub(crate) fn into_record(self, ts: String) -> StateRecord {
        StateRecord {
            ts,
            title: self.title,
            context_files: self.context_files,
            command: self.command,
        }
    }
}

impl From<StateRecord> for StatePatch {
    fn from(record: StateRecord) -> Self {
        Self {
            title: record.title,
            context_files: record.context_files,
            command: record.command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonLine {
    Session(ThreadHeader),
    Message(MessageRecord),
    State(StateRecord),
}
