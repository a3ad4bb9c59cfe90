//! Canonical transcript protocol and the transformation from raw agent output.
//!
//! An agent graph emits heterogeneous raw messages (see `agent_runtime`). This
//! crate classifies each one into zero or more canonical messages
//! ([`adapt`]) and folds a whole thread history plus session metadata into an
//! immutable [`ConversationState`] snapshot ([`assemble`]).
//!
//! Both transforms are pure and synchronous: they never suspend, never retry,
//! and never mutate their input. Assembling the same history twice yields
//! byte-identical serialized snapshots.
//!
//! Tool calls are emitted as two independent events (`start`, `end`) joined
//! only by `toolCallId`. Consumers that need the paired view build a
//! [`ToolCallIndex`] over a snapshot; the core transforms never buffer.

pub mod adapter;
pub mod assembler;
pub mod correlation;
pub mod data_url;
pub mod error;
pub mod model;

pub use adapter::adapt;
pub use assembler::{assemble, SessionContext, SessionMetadata};
pub use correlation::{ToolCallEntry, ToolCallIndex};
pub use error::TranscriptError;
pub use model::{
    AssistantMessage, CanonicalMessage, ConversationState, ImageAttachment, ToolMessage,
    ToolPayload, ToolPhase, UserMessage,
};
