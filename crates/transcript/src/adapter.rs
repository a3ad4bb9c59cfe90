//! Classification of one raw agent message into canonical messages.

use agent_runtime::{
    AiMessage, ContentSegment, HumanMessage, MessageContent, RawMessage, ToolResultMessage,
};

use crate::data_url;
use crate::error::TranscriptError;
use crate::model::{AssistantMessage, CanonicalMessage, ToolMessage, UserMessage};

/// Classifies one raw message into zero or more canonical messages, in order.
///
/// - human, non-transient: one user message (last text segment, first image)
/// - ai: one assistant message per text segment, then one tool `start` per invocation
/// - tool: one tool `end`
/// - anything else: nothing
pub fn adapt(message: &RawMessage) -> Result<Vec<CanonicalMessage>, TranscriptError> {
    match message {
        RawMessage::Human(human) => adapt_human(human),
        RawMessage::Ai(ai) => Ok(adapt_ai(ai)),
        RawMessage::Tool(result) => Ok(vec![adapt_tool_result(result).into()]),
        RawMessage::System(_) | RawMessage::Unknown => Ok(Vec::new()),
    }
}

fn adapt_human(human: &HumanMessage) -> Result<Vec<CanonicalMessage>, TranscriptError> {
    if human.transient {
        return Ok(Vec::new());
    }

    let (text, image_url) = match &human.content {
        MessageContent::Text(text) => (text.clone(), None),
        MessageContent::Segments(segments) => {
            let text = segments
                .iter()
                .rev()
                .find_map(|segment| match segment {
                    ContentSegment::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            (text, first_image_url(&human.id, segments))
        }
    };

    // First image wins; later image segments are not part of the transcript.
    let image = image_url.map(data_url::decode_image).transpose()?;
    let message = UserMessage::new(human.id.clone(), text, image)?;
    Ok(vec![message.into()])
}

fn first_image_url<'a>(id: &str, segments: &'a [ContentSegment]) -> Option<&'a str> {
    let mut images = segments.iter().filter_map(|segment| match segment {
        ContentSegment::ImageUrl { image_url } => Some(image_url.url()),
        _ => None,
    });

    let first = images.next();
    let ignored = images.count();
    if ignored > 0 {
        tracing::debug!(message_id = id, ignored, "dropping extra image segments");
    }

    first
}

fn adapt_ai(ai: &AiMessage) -> Vec<CanonicalMessage> {
    let mut out: Vec<CanonicalMessage> = Vec::with_capacity(1 + ai.tool_calls.len());

    match &ai.content {
        MessageContent::Text(text) => {
            out.push(AssistantMessage::new(&ai.id, text).into());
        }
        MessageContent::Segments(segments) => {
            out.extend(segments.iter().filter_map(|segment| match segment {
                ContentSegment::Text { text } => Some(AssistantMessage::new(&ai.id, text).into()),
                _ => None,
            }));
        }
    }

    out.extend(ai.tool_calls.iter().map(|invocation| {
        ToolMessage::start(
            &ai.id,
            &invocation.name,
            &invocation.id,
            invocation.args.clone(),
            ai.metadata.clone(),
        )
        .into()
    }));

    out
}

fn adapt_tool_result(result: &ToolResultMessage) -> ToolMessage {
    ToolMessage::end(
        &result.id,
        &result.name,
        &result.tool_call_id,
        result.content.clone(),
        result.is_error,
        result.metadata.clone(),
    )
}
