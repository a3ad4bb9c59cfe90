//! Deterministic scripted implementation of the `agent_runtime` contract.
//!
//! This crate contains no model or transport logic and is intended for local
//! development and contract-level integration testing of the transcript and
//! bridge layers.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use agent_runtime::{
    AgentRuntime, AiMessage, CancelSignal, ContentSegment, MessageContent, RawMessage,
    RuntimeProfile, ToolInvocation, ToolResultMessage, TurnOutcome, TurnRequest,
};
use serde_json::{json, Map, Value};

/// Stable runtime identifier used for explicit startup selection.
pub const MOCK_RUNTIME_ID: &str = "mock";

/// One scripted step of a mock turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Emits one AI message; one segment yields plain string content.
    Reply { segments: Vec<String> },
    /// Emits one AI message echoing the turn input text.
    EchoInput,
    /// Emits an AI message requesting the tool, then the tool result.
    ToolCall {
        name: String,
        args: Map<String, Value>,
        result: Value,
    },
    /// Fails the turn with the given error after earlier steps were emitted.
    Fail { error: String },
}

impl ScriptStep {
    #[must_use]
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply {
            segments: vec![text.into()],
        }
    }

    #[must_use]
    pub fn tool_call(name: impl Into<String>, args: Value, result: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };

        Self::ToolCall {
            name: name.into(),
            args,
            result,
        }
    }
}

/// Deterministic mock runtime used by bridge tests and the default host.
#[derive(Debug, Clone)]
pub struct MockRuntime {
    script: Vec<ScriptStep>,
    model_id: String,
    step_delay: Duration,
}

impl MockRuntime {
    /// Creates a mock runtime that plays `script` on every turn.
    #[must_use]
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            model_id: "mock".to_string(),
            step_delay: Duration::ZERO,
        }
    }

    /// Sleeps for `delay` before each scripted step.
    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        let trimmed = model_id.trim();
        if !trimmed.is_empty() {
            self.model_id = trimmed.to_string();
        }
        self
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new(vec![
            ScriptStep::Reply {
                segments: vec![
                    "Let me look through the workspace.".to_string(),
                    "Searching for related symbols first.".to_string(),
                ],
            },
            ScriptStep::tool_call(
                "search",
                json!({ "query": "workspace symbols" }),
                json!({ "hits": 3 }),
            ),
            ScriptStep::EchoInput,
        ])
    }
}

/// Allocates message ids that continue from the persisted history length.
struct IdSequence {
    next: usize,
}

impl IdSequence {
    fn after(history: &[RawMessage]) -> Self {
        Self {
            next: history.len() + 1,
        }
    }

    fn next(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}-{}", self.next);
        self.next += 1;
        id
    }
}

impl AgentRuntime for MockRuntime {
    fn profile(&self) -> RuntimeProfile {
        RuntimeProfile {
            runtime_id: MOCK_RUNTIME_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    fn run_turn(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RawMessage),
    ) -> Result<TurnOutcome, String> {
        let mut ids = IdSequence::after(&req.history);
        let input_text = req
            .latest_input()
            .map(|input| content_text(&input.content))
            .unwrap_or_default();

        for step in &self.script {
            if !self.step_delay.is_zero() {
                thread::sleep(self.step_delay);
            }

            if cancel.load(Ordering::SeqCst) {
                tracing::debug!(turn_id = req.turn_id, "mock runtime observed cancel");
                return Ok(TurnOutcome::Cancelled);
            }

            match step {
                ScriptStep::Reply { segments } => {
                    emit(AiMessage::new(ids.next("ai"), reply_content(segments)).into());
                }
                ScriptStep::EchoInput => {
                    emit(AiMessage::new(ids.next("ai"), format!("You said: {input_text}")).into());
                }
                ScriptStep::ToolCall { name, args, result } => {
                    // One sequence number per emitted message; the call id reuses the ai id.
                    let ai_id = ids.next("ai");
                    let call_id = format!("call-{ai_id}");
                    let message = AiMessage::new(ai_id, Vec::<ContentSegment>::new())
                        .with_tool_call(ToolInvocation::new(&call_id, name, args.clone()))
                        .with_metadata("model", self.model_id.clone());
                    emit(message.into());

                    if cancel.load(Ordering::SeqCst) {
                        return Ok(TurnOutcome::Cancelled);
                    }

                    emit(
                        ToolResultMessage::success(ids.next("tool"), call_id, name, result.clone())
                            .into(),
                    );
                }
                ScriptStep::Fail { error } => return Err(error.clone()),
            }
        }

        Ok(TurnOutcome::Completed)
    }
}

fn reply_content(segments: &[String]) -> MessageContent {
    match segments {
        [single] => MessageContent::Text(single.clone()),
        many => MessageContent::Segments(many.iter().map(ContentSegment::text).collect()),
    }
}

fn content_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Segments(segments) => segments
            .iter()
            .rev()
            .find_map(|segment| match segment {
                ContentSegment::Text { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use agent_runtime::HumanMessage;
    use pretty_assertions::assert_eq;

    use super::*;

    fn request(history: Vec<RawMessage>) -> TurnRequest {
        TurnRequest {
            turn_id: 7,
            thread_id: "thread-1".to_string(),
            history,
            context_files: Vec::new(),
            command: None,
        }
    }

    fn collect(runtime: &MockRuntime, cancel: CancelSignal) -> (Vec<RawMessage>, TurnOutcome) {
        let mut emitted = Vec::new();
        let outcome = runtime
            .run_turn(
                request(vec![HumanMessage::new("h-1", "fix the build").into()]),
                cancel,
                &mut |message| emitted.push(message),
            )
            .expect("mock turn should succeed");
        (emitted, outcome)
    }

    #[test]
    fn profile_exposes_explicit_mock_runtime_identity() {
        let profile = MockRuntime::new(Vec::new()).profile();

        assert_eq!(profile.runtime_id, MOCK_RUNTIME_ID);
        assert_eq!(profile.model_id, "mock");
        assert_eq!(
            MockRuntime::new(Vec::new())
                .with_model_id("  ")
                .profile()
                .model_id,
            "mock"
        );
    }

    #[test]
    fn default_script_emits_reply_tool_pair_and_echo() {
        let (emitted, outcome) = collect(&MockRuntime::default(), Arc::new(AtomicBool::new(false)));

        assert_eq!(outcome, TurnOutcome::Completed);
        let kinds: Vec<&str> = emitted.iter().map(RawMessage::kind).collect();
        assert_eq!(kinds, vec!["ai", "ai", "tool", "ai"]);

        let RawMessage::Ai(call) = &emitted[1] else {
            panic!("expected tool-call ai message");
        };
        let RawMessage::Tool(result) = &emitted[2] else {
            panic!("expected tool result");
        };
        assert_eq!(call.content, MessageContent::Segments(Vec::new()));
        assert_eq!(call.tool_calls[0].id, result.tool_call_id);
        assert_eq!(result.content, json!({ "hits": 3 }));

        let RawMessage::Ai(echo) = &emitted[3] else {
            panic!("expected echo reply");
        };
        assert_eq!(
            echo.content,
            MessageContent::Text("You said: fix the build".to_string())
        );
    }

    #[test]
    fn ids_continue_from_history_length() {
        let (emitted, _) = collect(
            &MockRuntime::new(vec![ScriptStep::reply("a"), ScriptStep::reply("b")]),
            Arc::new(AtomicBool::new(false)),
        );

        let ids: Vec<&str> = emitted.iter().filter_map(RawMessage::id).collect();
        assert_eq!(ids, vec!["ai-2", "ai-3"]);
    }

    #[test]
    fn ids_stay_unique_across_turns_with_tool_calls() {
        let runtime = MockRuntime::new(vec![
            ScriptStep::tool_call("a", json!({}), json!(1)),
            ScriptStep::tool_call("b", json!({}), json!(2)),
            ScriptStep::tool_call("c", json!({}), json!(3)),
            ScriptStep::reply("x"),
            ScriptStep::reply("y"),
        ]);
        let mut history: Vec<RawMessage> = Vec::new();

        for turn in 0..3 {
            history.push(HumanMessage::new(format!("h-{turn}"), "go").into());
            let mut emitted = Vec::new();
            runtime
                .run_turn(
                    request(history.clone()),
                    Arc::new(AtomicBool::new(false)),
                    &mut |message| emitted.push(message),
                )
                .expect("mock turn should succeed");
            history.extend(emitted);
        }

        let mut seen = HashSet::new();
        for id in history.iter().filter_map(RawMessage::id) {
            assert!(seen.insert(id), "raw id {id} emitted twice");
        }
        assert_eq!(seen.len(), 3 * 9);
    }

    #[test]
    fn cancel_set_before_turn_emits_nothing() {
        let (emitted, outcome) = collect(&MockRuntime::default(), Arc::new(AtomicBool::new(true)));

        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(emitted.is_empty());
    }

    #[test]
    fn fail_step_returns_error_after_prior_emissions() {
        let runtime = MockRuntime::new(vec![
            ScriptStep::reply("partial"),
            ScriptStep::Fail {
                error: "model overloaded".to_string(),
            },
        ]);
        let mut emitted = Vec::new();
        let error = runtime
            .run_turn(
                request(vec![HumanMessage::new("h-1", "go").into()]),
                Arc::new(AtomicBool::new(false)),
                &mut |message| emitted.push(message),
            )
            .expect_err("fail step should fail the turn");

        assert_eq!(error, "model overloaded");
        assert_eq!(emitted.len(), 1);
    }

    #[test]
    fn multi_segment_reply_uses_segmented_content() {
        let (emitted, _) = collect(
            &MockRuntime::new(vec![ScriptStep::Reply {
                segments: vec!["A".to_string(), "B".to_string()],
            }]),
            Arc::new(AtomicBool::new(false)),
        );

        let RawMessage::Ai(message) = &emitted[0] else {
            panic!("expected ai message");
        };
        assert_eq!(
            message.content,
            MessageContent::Segments(vec![ContentSegment::text("A"), ContentSegment::text("B")])
        );
    }
}
