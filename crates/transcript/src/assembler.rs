//! Folding a thread's raw history into one conversation snapshot.

use agent_runtime::RawMessage;

use crate::adapter::adapt;
use crate::error::TranscriptError;
use crate::model::ConversationState;

/// Session record fields owned by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionMetadata {
    pub title: String,
    pub created_at: String,
    pub parent_thread_id: Option<String>,
    pub context_files: Vec<String>,
    pub command: Option<String>,
}

/// Explicit per-call context; there is no process-wide "current session".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionContext {
    pub thread_id: String,
    pub workspace_id: String,
    pub metadata: Option<SessionMetadata>,
    pub can_resume: Option<bool>,
}

impl SessionContext {
    #[must_use]
    pub fn new(
        thread_id: impl Into<String>,
        workspace_id: impl Into<String>,
        metadata: SessionMetadata,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            workspace_id: workspace_id.into(),
            metadata: Some(metadata),
            can_resume: None,
        }
    }

    #[must_use]
    pub fn with_can_resume(mut self, can_resume: bool) -> Self {
        self.can_resume = Some(can_resume);
        self
    }
}

/// Assembles an immutable snapshot from the full ordered raw history.
///
/// Messages keep raw emission order. The history is only read.
pub fn assemble(
    history: &[RawMessage],
    context: &SessionContext,
) -> Result<ConversationState, TranscriptError> {
    if context.thread_id.trim().is_empty() {
        return Err(TranscriptError::MissingSessionContext {
            missing: "thread id",
        });
    }

    let metadata = context
        .metadata
        .as_ref()
        .ok_or(TranscriptError::MissingSessionContext {
            missing: "session metadata",
        })?;

    let mut messages = Vec::with_capacity(history.len());
    for raw in history {
        messages.extend(adapt(raw)?);
    }

    tracing::trace!(
        thread_id = %context.thread_id,
        raw = history.len(),
        canonical = messages.len(),
        "assembled conversation snapshot"
    );

    Ok(ConversationState {
        thread_id: context.thread_id.clone(),
        parent_thread_id: metadata.parent_thread_id.clone(),
        workspace_id: context.workspace_id.clone(),
        title: metadata.title.clone(),
        created_at: metadata.created_at.clone(),
        can_resume: context.can_resume.unwrap_or(false),
        context_files: metadata.context_files.clone(),
        command: metadata.command.clone(),
        messages,
    })
}
