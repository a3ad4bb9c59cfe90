//! Raw agent-framework message shapes.
//!
//! These mirror what an agent graph emits while it runs: human input, AI
//! output (possibly carrying pending tool invocations), tool results, and
//! framework-internal messages. Every kind carries an explicit `type`
//! discriminant so consumers dispatch with `match` rather than runtime type
//! inspection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One message as emitted by the agent graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawMessage {
    Human(HumanMessage),
    Ai(AiMessage),
    Tool(ToolResultMessage),
    System(SystemMessage),
    /// Framework control message of a kind this crate does not model.
    #[serde(other)]
    Unknown,
}

impl RawMessage {
    /// Returns the emission id, or `None` for unknown message kinds.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Human(message) => Some(&message.id),
            Self::Ai(message) => Some(&message.id),
            Self::Tool(message) => Some(&message.id),
            Self::System(message) => Some(&message.id),
            Self::Unknown => None,
        }
    }

    /// Returns the stable discriminant used on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Human(_) => "human",
            Self::Ai(_) => "ai",
            Self::Tool(_) => "tool",
            Self::System(_) => "system",
            Self::Unknown => "unknown",
        }
    }
}

impl From<HumanMessage> for RawMessage {
    fn from(message: HumanMessage) -> Self {
        Self::Human(message)
    }
}

impl From<AiMessage> for RawMessage {
    fn from(message: AiMessage) -> Self {
        Self::Ai(message)
    }
}

impl From<ToolResultMessage> for RawMessage {
    fn from(message: ToolResultMessage) -> Self {
        Self::Tool(message)
    }
}

/// Message content: either one plain string or an ordered list of typed segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Segments(Vec<ContentSegment>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<ContentSegment>> for MessageContent {
    fn from(segments: Vec<ContentSegment>) -> Self {
        Self::Segments(segments)
    }
}

/// A typed content segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSegment {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrlRef,
    },
    /// Any segment type without a transcript representation (reasoning, tool_use, ...).
    #[serde(other)]
    Other,
}

impl ContentSegment {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrlRef::Url(url.into()),
        }
    }
}

/// Image reference; frameworks emit both the bare string and the `{ "url": .. }` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageUrlRef {
    Url(String),
    Object { url: String },
}

impl ImageUrlRef {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) | Self::Object { url } => url,
        }
    }
}

/// Human-origin input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanMessage {
    pub id: String,
    #[serde(default)]
    pub content: MessageContent,
    /// System-injected placeholder that must never reach a transcript.
    #[serde(default, skip_serializing_if = "is_false")]
    pub transient: bool,
}

impl HumanMessage {
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            transient: false,
        }
    }

    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }
}

/// Pending tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolInvocation {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// AI-origin output, possibly one streamed chunk of a longer reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiMessage {
    pub id: String,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    /// Free-form framework metadata passed through to tool-start messages.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl AiMessage {
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            tool_calls: Vec::new(),
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn with_tool_call(mut self, invocation: ToolInvocation) -> Self {
        self.tool_calls.push(invocation);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Result of one tool invocation, linked back through `tool_call_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub id: String,
    pub tool_call_id: String,
    pub name: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ToolResultMessage {
    /// Constructs a successful tool result.
    #[must_use]
    pub fn success(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            is_error: false,
            metadata: Map::new(),
        }
    }

    /// Constructs a tool error result.
    #[must_use]
    pub fn error(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<Value>,
    ) -> Self {
        Self {
            is_error: true,
            ..Self::success(id, tool_call_id, name, content)
        }
    }
}

/// Framework system prompt or instruction message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub id: String,
    #[serde(default)]
    pub content: MessageContent,
}

fn is_false(value: &bool) -> bool {
    !*value
}
