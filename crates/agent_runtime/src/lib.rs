//! Agent runtime collaborator contract and raw agent-framework message model.
//!
//! This crate defines only what crosses the boundary between the process that
//! hosts an agent graph and the transcript layer: the raw message union the
//! graph emits and the single-turn execution contract. It holds no transport,
//! persistence, or transcript shaping.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

mod messages;

pub use messages::{
    AiMessage, ContentSegment, HumanMessage, ImageUrlRef, MessageContent, RawMessage,
    SystemMessage, ToolInvocation, ToolResultMessage,
};

/// Identifier for one conversation turn.
pub type TurnId = u64;

/// Shared cooperative cancellation flag for a turn.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring a runtime before any turn starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInitError {
    message: String,
}

impl RuntimeInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RuntimeInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeInitError {}

impl From<String> for RuntimeInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for RuntimeInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Input required to run one turn.
///
/// `history` is the full persisted raw history of the thread, ending with the
/// human message that opened this turn. Runtimes are stateless across turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    pub thread_id: String,
    pub history: Vec<RawMessage>,
    pub context_files: Vec<String>,
    pub command: Option<String>,
}

impl TurnRequest {
    /// Returns the most recent human message, which is the input of this turn.
    #[must_use]
    pub fn latest_input(&self) -> Option<&HumanMessage> {
        self.history.iter().rev().find_map(|message| match message {
            RawMessage::Human(human) if !human.transient => Some(human),
            _ => None,
        })
    }
}

/// How a turn ended when the runtime did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
}

/// Immutable metadata describing an agent runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeProfile {
    pub runtime_id: String,
    pub model_id: String,
}

/// Agent graph execution interface for one turn.
pub trait AgentRuntime: Send + Sync + 'static {
    /// Returns runtime/model identity metadata.
    fn profile(&self) -> RuntimeProfile;

    /// Executes one turn and emits raw messages in causal order.
    ///
    /// Each logical emission is passed to `emit` exactly once. Runtimes poll
    /// `cancel` between emissions and stop producing messages once it is set,
    /// returning [`TurnOutcome::Cancelled`].
    fn run_turn(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RawMessage),
    ) -> Result<TurnOutcome, String>;
}
