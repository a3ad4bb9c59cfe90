//! Canonical transcript message model.
//!
//! Wire shape: messages carry a `"role"` discriminant and camelCase fields;
//! tool messages additionally carry a `"phase"` discriminant whose payload is
//! `arguments` for `start` and `result` for `end`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data_url;
use crate::error::TranscriptError;

/// One canonical transcript message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum CanonicalMessage {
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolMessage),
}

impl CanonicalMessage {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::User(message) => &message.id,
            Self::Assistant(message) => &message.id,
            Self::Tool(message) => &message.id,
        }
    }

    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::Tool(_) => "tool",
        }
    }

    #[must_use]
    pub fn as_tool(&self) -> Option<&ToolMessage> {
        match self {
            Self::Tool(message) => Some(message),
            _ => None,
        }
    }
}

impl From<UserMessage> for CanonicalMessage {
    fn from(message: UserMessage) -> Self {
        Self::User(message)
    }
}

impl From<AssistantMessage> for CanonicalMessage {
    fn from(message: AssistantMessage) -> Self {
        Self::Assistant(message)
    }
}

impl From<ToolMessage> for CanonicalMessage {
    fn from(message: ToolMessage) -> Self {
        Self::Tool(message)
    }
}

/// User turn input. `text` is empty only when an image is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
}

impl UserMessage {
    /// Builds a user message, rejecting one with neither text nor image.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        image: Option<ImageAttachment>,
    ) -> Result<Self, TranscriptError> {
        let id = id.into();
        let text = text.into();
        if text.is_empty() && image.is_none() {
            return Err(TranscriptError::EmptyUserMessage { id });
        }

        Ok(Self { id, text, image })
    }
}

/// Decoded image attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// MIME subtype, e.g. `png` for `image/png`.
    pub extension: String,
}

impl ImageAttachment {
    #[must_use]
    pub fn new(data: Vec<u8>, extension: impl Into<String>) -> Self {
        Self {
            data,
            extension: extension.into(),
        }
    }

    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("image/{}", self.extension)
    }

    /// Re-encodes the attachment in the boundary data URL format.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        data_url::encode(&self.mime_type(), &self.data)
    }
}

/// One text fragment of an assistant reply.
///
/// Several fragments emitted from the same raw message share its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    pub id: String,
    pub text: String,
}

impl AssistantMessage {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Tool-call lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Start,
    End,
}

impl ToolPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

impl fmt::Display for ToolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolPhase {
    type Err = TranscriptError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            other => Err(TranscriptError::UnknownToolPhase(other.to_string())),
        }
    }
}

/// Phase-specific tool payload. `end` carries the result where `start` carries arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ToolPayload {
    Start {
        arguments: Map<String, Value>,
    },
    End {
        result: Value,
        #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
}

/// One tool lifecycle event. `tool_call_id` is the join key between phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMessage {
    pub id: String,
    pub tool_name: String,
    pub tool_call_id: String,
    #[serde(flatten)]
    pub payload: ToolPayload,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ToolMessage {
    #[must_use]
    pub fn start(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        arguments: Map<String, Value>,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            payload: ToolPayload::Start { arguments },
            metadata,
        }
    }

    #[must_use]
    pub fn end(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        result: Value,
        is_error: bool,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            payload: ToolPayload::End { result, is_error },
            metadata,
        }
    }

    #[must_use]
    pub fn phase(&self) -> ToolPhase {
        match self.payload {
            ToolPayload::Start { .. } => ToolPhase::Start,
            ToolPayload::End { .. } => ToolPhase::End,
        }
    }

    #[must_use]
    pub fn arguments(&self) -> Option<&Map<String, Value>> {
        match &self.payload {
            ToolPayload::Start { arguments } => Some(arguments),
            ToolPayload::End { .. } => None,
        }
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ToolPayload::Start { .. } => None,
            ToolPayload::End { result, .. } => Some(result),
        }
    }
}

/// Immutable conversation snapshot delivered to the UI.
///
/// Rebuilt from the raw history on every change; `messages` keeps raw
/// emission order and is never re-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<String>,
    pub workspace_id: String,
    pub title: String,
    pub created_at: String,
    pub can_resume: bool,
    #[serde(default)]
    pub context_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub messages: Vec<CanonicalMessage>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn tool_phase_parses_known_values_and_rejects_others() {
        assert_eq!("start".parse::<ToolPhase>(), Ok(ToolPhase::Start));
        assert_eq!("end".parse::<ToolPhase>(), Ok(ToolPhase::End));
        assert_matches!(
            "running".parse::<ToolPhase>(),
            Err(TranscriptError::UnknownToolPhase(value)) if value == "running"
        );
    }

    #[test]
    fn tool_start_serializes_with_role_phase_and_camel_case_fields() {
        let mut arguments = Map::new();
        arguments.insert("query".to_string(), json!("foo"));
        let message = CanonicalMessage::from(ToolMessage::start(
            "a1",
            "search",
            "tc1",
            arguments,
            Map::new(),
        ));

        assert_eq!(
            serde_json::to_value(&message).expect("tool message should serialize"),
            json!({
                "role": "tool",
                "id": "a1",
                "toolName": "search",
                "toolCallId": "tc1",
                "phase": "start",
                "arguments": {"query": "foo"}
            })
        );
    }

    #[test]
    fn tool_end_deserializes_result_payload() {
        let message: CanonicalMessage = serde_json::from_value(json!({
            "role": "tool",
            "id": "t1",
            "toolName": "search",
            "toolCallId": "tc1",
            "phase": "end",
            "result": {"hits": 3},
            "isError": true
        }))
        .expect("tool end should deserialize");

        let tool = message.as_tool().expect("tool message");
        assert_eq!(tool.phase(), ToolPhase::End);
        assert_eq!(tool.result(), Some(&json!({"hits": 3})));
        assert_eq!(tool.arguments(), None);
        assert_matches!(tool.payload, ToolPayload::End { is_error: true, .. });
    }

    #[test]
    fn unknown_phase_on_the_wire_is_rejected() {
        let error = serde_json::from_value::<CanonicalMessage>(json!({
            "role": "tool",
            "id": "t1",
            "toolName": "search",
            "toolCallId": "tc1",
            "phase": "paused",
            "result": null
        }));

        assert!(error.is_err());
    }

    #[test]
    fn user_message_requires_text_or_image() {
        assert_matches!(
            UserMessage::new("u1", "", None),
            Err(TranscriptError::EmptyUserMessage { id }) if id == "u1"
        );

        let image_only = UserMessage::new("u2", "", Some(ImageAttachment::new(vec![1, 2], "png")))
            .expect("image-only user message is valid");
        assert_eq!(image_only.text, "");
    }

    #[test]
    fn image_attachment_serializes_bytes_as_base64() {
        let message = CanonicalMessage::from(
            UserMessage::new("u1", "see", Some(ImageAttachment::new(b"PNG".to_vec(), "png")))
                .expect("valid user message"),
        );

        let encoded = serde_json::to_value(&message).expect("user message should serialize");
        assert_eq!(encoded["image"], json!({"data": "UE5H", "extension": "png"}));

        let decoded: CanonicalMessage =
            serde_json::from_value(encoded).expect("user message should deserialize");
        assert_eq!(decoded, message);
    }

    #[test]
    fn image_attachment_reports_mime_and_data_url() {
        let image = ImageAttachment::new(vec![0xff, 0x00], "jpeg");
        assert_eq!(image.mime_type(), "image/jpeg");
        assert_eq!(image.to_data_url(), "data:image/jpeg;base64,/wA=");
    }
}
