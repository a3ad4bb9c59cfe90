//! Agent-side end of the bridge: owns the session store and the runtime.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use agent_runtime::{
    AgentRuntime, CancelSignal, ContentSegment, HumanMessage, MessageContent, RawMessage, TurnId,
    TurnOutcome, TurnRequest,
};
use session_store::{SessionDirectory, SessionStore, SessionStoreError, StatePatch};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use transcript::{assemble, data_url};

use crate::error::HostError;
use crate::protocol::{
    Command, ComposePhase, ErrorKind, HostMessage, Outcome, PhaseNotification, Request, RequestId,
    Response, ResponseBody,
};
use crate::transport::{spawn_line_reader, spawn_line_writer};

const TITLE_MAX_CHARS: usize = 80;

struct ActiveTurn {
    turn_id: TurnId,
    cancel: CancelSignal,
}

/// At most one in-flight turn per thread. A second compose is rejected.
pub struct TurnRegistry {
    next_turn_id: AtomicU64,
    active: Mutex<HashMap<String, ActiveTurn>>,
}

impl TurnRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_turn_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Registers a turn for `thread_id`, or returns `None` when one is in flight.
    pub fn begin(self: &Arc<Self>, thread_id: &str) -> Option<TurnGuard> {
        let mut active = lock_unpoisoned(&self.active);
        if active.contains_key(thread_id) {
            return None;
        }

        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        let cancel = Arc::new(AtomicBool::new(false));
        active.insert(
            thread_id.to_string(),
            ActiveTurn {
                turn_id,
                cancel: Arc::clone(&cancel),
            },
        );

        Some(TurnGuard {
            registry: Arc::clone(self),
            thread_id: thread_id.to_string(),
            turn_id,
            cancel,
        })
    }

    #[must_use]
    pub fn is_active(&self, thread_id: &str) -> bool {
        lock_unpoisoned(&self.active).contains_key(thread_id)
    }

    /// Signals the thread's in-flight turn. Returns whether one was running.
    pub fn cancel(&self, thread_id: &str) -> bool {
        match lock_unpoisoned(&self.active).get(thread_id) {
            Some(turn) => {
                turn.cancel.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Signals every in-flight turn. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let active = lock_unpoisoned(&self.active);
        for turn in active.values() {
            turn.cancel.store(true, Ordering::SeqCst);
        }
        active.len()
    }

    fn finish(&self, thread_id: &str, turn_id: TurnId) {
        let mut active = lock_unpoisoned(&self.active);
        if active.get(thread_id).map(|turn| turn.turn_id) == Some(turn_id) {
            active.remove(thread_id);
        }
    }
}

/// Keeps a thread marked busy until dropped.
pub struct TurnGuard {
    registry: Arc<TurnRegistry>,
    thread_id: String,
    turn_id: TurnId,
    cancel: CancelSignal,
}

impl TurnGuard {
    #[must_use]
    pub fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        Arc::clone(&self.cancel)
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.registry.finish(&self.thread_id, self.turn_id);
    }
}

type SharedStore = Arc<Mutex<SessionStore>>;

/// Numbers and sends phase notifications for one compose request.
struct PhaseSink {
    request_id: RequestId,
    thread_id: String,
    seq: u64,
    outbound: mpsc::UnboundedSender<HostMessage>,
}

impl PhaseSink {
    fn emit(&mut self, phase: ComposePhase) {
        let notification = PhaseNotification {
            request_id: self.request_id,
            thread_id: self.thread_id.clone(),
            seq: self.seq,
            phase,
        };
        self.seq += 1;
        // Notifications are fire-and-forget.
        let _ = self.outbound.send(HostMessage::Notification(notification));
    }

    fn emit_for(&mut self, message: &RawMessage) {
        match message {
            RawMessage::Ai(ai) => {
                if has_text(&ai.content) {
                    self.emit(ComposePhase::Generating);
                }
                for invocation in &ai.tool_calls {
                    self.emit(ComposePhase::ToolCall {
                        tool_name: invocation.name.clone(),
                    });
                }
            }
            RawMessage::Tool(result) => self.emit(ComposePhase::ToolResult {
                tool_name: result.name.clone(),
            }),
            RawMessage::Human(_) | RawMessage::System(_) | RawMessage::Unknown => {}
        }
    }
}

/// Serves bridge requests against one data directory and one runtime.
pub struct SessionHost {
    sessions: SessionDirectory,
    workspace_id: String,
    runtime: Arc<dyn AgentRuntime>,
    turns: Arc<TurnRegistry>,
    open_threads: Mutex<HashMap<String, SharedStore>>,
}

impl SessionHost {
    pub fn new(
        sessions: SessionDirectory,
        workspace_id: impl Into<String>,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            workspace_id: workspace_id.into(),
            runtime,
            turns: TurnRegistry::new(),
            open_threads: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn turns(&self) -> &Arc<TurnRegistry> {
        &self.turns
    }

    /// Serves a line-framed byte stream pair (stdio in production).
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbound, _reader) = spawn_line_reader::<_, Request>(reader);
        let (outbound, writer_task) = spawn_line_writer::<_, HostMessage>(writer);
        self.serve_channels(inbound, outbound).await;

        if let Err(error) = writer_task.await {
            tracing::warn!(%error, "bridge writer task ended abnormally");
        }
    }

    /// Serves requests until `inbound` closes, one task per request.
    ///
    /// When the UI goes away every in-flight turn is cancelled and allowed to
    /// persist what it produced before this returns.
    pub async fn serve_channels(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<Request>,
        outbound: mpsc::UnboundedSender<HostMessage>,
    ) {
        let runtime = self.runtime.profile();
        tracing::info!(
            runtime_id = %runtime.runtime_id,
            model_id = %runtime.model_id,
            workspace_id = %self.workspace_id,
            "session host serving"
        );

        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                request = inbound.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    let host = Arc::clone(&self);
                    let outbound = outbound.clone();
                    tasks.spawn(async move {
                        let id = request.id;
                        let outcome = host.handle(request, &outbound).await;
                        let _ = outbound.send(HostMessage::Response(Response { id, outcome }));
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(error) = joined {
                        tracing::error!(%error, "request task ended abnormally");
                    }
                }
            }
        }

        let cancelled = self.turns.cancel_all();
        if cancelled > 0 {
            tracing::info!(cancelled, "inbound closed; cancelling in-flight turns");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(error) = joined {
                tracing::error!(%error, "request task ended abnormally");
            }
        }
    }

    /// Handles one request and returns its single outcome. Compose phase
    /// notifications go to `outbound` while the turn runs.
    pub async fn handle(
        self: &Arc<Self>,
        request: Request,
        outbound: &mpsc::UnboundedSender<HostMessage>,
    ) -> Outcome {
        let Request { id, command } = request;
        let name = command.name();
        tracing::debug!(
            request_id = id,
            command = name,
            thread_id = ?command.thread_id(),
            "handling request"
        );

        let result = match command {
            Command::Compose {
                thread_id,
                text,
                context_files,
                image,
            } => {
                self.compose(id, thread_id, text, context_files, image, outbound)
                    .await
            }
            Command::Cancel { thread_id } => Ok(self.cancel(thread_id.as_deref())),
            Command::BranchThread {
                thread_id,
                source_thread_id,
            } => self.branch_thread(&thread_id, &source_thread_id),
            Command::DeleteThread { thread_id } => self.delete_thread(&thread_id),
            Command::DeleteIndex { thread_id } => self.delete_index(&thread_id),
            Command::UpdateFile { thread_id, files } => self.update_state(
                &thread_id,
                StatePatch {
                    context_files: Some(files),
                    ..StatePatch::default()
                },
            ),
            Command::UpdateCommand { thread_id, text } => self.update_state(
                &thread_id,
                StatePatch {
                    command: Some(text),
                    ..StatePatch::default()
                },
            ),
            Command::GetThread { thread_id } => self.get_thread(&thread_id),
        };

        match result {
            Ok(body) => Outcome::Ok { body },
            Err(error) => {
                tracing::warn!(
                    request_id = id,
                    command = name,
                    kind = %error.kind,
                    error = %error.message,
                    "request failed"
                );
                error.into()
            }
        }
    }

    async fn compose(
        self: &Arc<Self>,
        request_id: RequestId,
        thread_id: Option<String>,
        text: String,
        context_files: Vec<String>,
        image: Option<String>,
        outbound: &mpsc::UnboundedSender<HostMessage>,
    ) -> Result<ResponseBody, HostError> {
        let input = human_input(&text, image)?;
        let store = match thread_id.as_deref() {
            Some(thread_id) => self.thread_or_create(thread_id, &text)?,
            None => self.create_thread(&text)?,
        };
        let thread_id = lock_unpoisoned(&store).thread_id().to_string();

        let Some(turn) = self.turns.begin(&thread_id) else {
            return Err(HostError::new(
                ErrorKind::ThreadBusy,
                format!("thread '{thread_id}' already has a turn in flight"),
            ));
        };
        let turn_id = turn.turn_id();

        let turn_request = {
            let mut store_guard = lock_unpoisoned(&store);
            self.ensure_live(&thread_id, &store)?;
            let store = &mut *store_guard;
            if !context_files.is_empty() {
                store.update_state(StatePatch {
                    context_files: Some(context_files),
                    ..StatePatch::default()
                })?;
            }
            store.append_message(input.into())?;

            TurnRequest {
                turn_id,
                thread_id: thread_id.clone(),
                history: store.history().to_vec(),
                context_files: store.context_files().to_vec(),
                command: store.command().map(str::to_string),
            }
        };

        let mut phases = PhaseSink {
            request_id,
            thread_id: thread_id.clone(),
            seq: 0,
            outbound: outbound.clone(),
        };
        phases.emit(ComposePhase::Started);
        tracing::info!(request_id, turn_id, thread_id = %thread_id, "turn started");

        let (emitted_tx, mut emitted_rx) = mpsc::unbounded_channel::<RawMessage>();
        let runtime = Arc::clone(&self.runtime);
        let cancel = turn.cancel_signal();
        let worker = tokio::task::spawn_blocking(move || {
            let mut emit = move |message: RawMessage| {
                let _ = emitted_tx.send(message);
            };
            catch_unwind(AssertUnwindSafe(|| {
                runtime.run_turn(turn_request, cancel, &mut emit)
            }))
        });

        let mut store_error = None;
        while let Some(message) = emitted_rx.recv().await {
            if store_error.is_some() {
                continue;
            }

            let persisted = lock_unpoisoned(&store).append_message(message.clone());
            match persisted {
                Ok(()) => phases.emit_for(&message),
                Err(error) => {
                    tracing::error!(
                        turn_id,
                        thread_id = %thread_id,
                        %error,
                        "failed to persist agent output; cancelling turn"
                    );
                    turn.cancel_signal().store(true, Ordering::SeqCst);
                    store_error = Some(error);
                }
            }
        }

        let run_result = match worker.await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err("agent runtime panicked".to_string()),
            Err(error) => Err(format!("agent runtime task failed: {error}")),
        };
        drop(turn);

        if let Some(error) = store_error {
            phases.emit(ComposePhase::Failed);
            return Err(error.into());
        }

        match run_result {
            Ok(TurnOutcome::Completed) => {
                phases.emit(ComposePhase::Completed);
                tracing::info!(request_id, turn_id, thread_id = %thread_id, "turn completed");
            }
            Ok(TurnOutcome::Cancelled) => {
                phases.emit(ComposePhase::Cancelled);
                tracing::info!(request_id, turn_id, thread_id = %thread_id, "turn cancelled");
            }
            Err(error) => {
                phases.emit(ComposePhase::Failed);
                tracing::warn!(request_id, turn_id, thread_id = %thread_id, %error, "turn failed");
                return Err(HostError::new(ErrorKind::AgentFailed, error));
            }
        }

        let store = lock_unpoisoned(&store);
        snapshot(&store)
    }

    fn cancel(&self, thread_id: Option<&str>) -> ResponseBody {
        match thread_id {
            Some(thread_id) => {
                if !self.turns.cancel(thread_id) {
                    tracing::debug!(thread_id, "cancel requested with no turn in flight");
                }
            }
            None => {
                let cancelled = self.turns.cancel_all();
                tracing::debug!(cancelled, "cancel requested for every turn");
            }
        }
        ResponseBody::Ack
    }

    fn branch_thread(
        &self,
        thread_id: &str,
        source_thread_id: &str,
    ) -> Result<ResponseBody, HostError> {
        // Holding the source lock keeps a running turn from appending mid-clone.
        let source = self.thread(source_thread_id)?;
        let _source = lock_unpoisoned(&source);

        let branch = self.sessions.branch(thread_id, source_thread_id)?;
        let body = snapshot(&branch)?;
        lock_unpoisoned(&self.open_threads)
            .insert(thread_id.to_string(), Arc::new(Mutex::new(branch)));
        Ok(body)
    }

    /// Deletes a thread that has no turn in flight.
    ///
    /// Holds the thread's turn slot and store lock across the unlink, so no
    /// compose can start and no append can land on the removed file.
    fn delete_thread(self: &Arc<Self>, thread_id: &str) -> Result<ResponseBody, HostError> {
        let Some(_turn) = self.turns.begin(thread_id) else {
            return Err(HostError::new(
                ErrorKind::ThreadBusy,
                format!("thread '{thread_id}' has a turn in flight"),
            ));
        };

        let store = match self.thread(thread_id) {
            Ok(store) => Some(store),
            Err(error) if error.is_not_found() => return Err(error.into()),
            Err(error) => {
                tracing::warn!(thread_id, %error, "deleting unreadable thread");
                None
            }
        };
        let _store = store.as_ref().map(|store| lock_unpoisoned(store));
        self.sessions.delete_thread(thread_id)?;
        lock_unpoisoned(&self.open_threads).remove(thread_id);
        Ok(ResponseBody::Ack)
    }

    /// Fails when `store` is no longer the live handle for `thread_id`, which
    /// happens once the thread was deleted after the handle was taken. Call
    /// with the store locked.
    fn ensure_live(&self, thread_id: &str, store: &SharedStore) -> Result<(), HostError> {
        match lock_unpoisoned(&self.open_threads).get(thread_id) {
            Some(live) if Arc::ptr_eq(live, store) => Ok(()),
            _ => Err(HostError::new(
                ErrorKind::ThreadNotFound,
                format!("thread '{thread_id}' was deleted"),
            )),
        }
    }

    fn get_thread(&self, thread_id: &str) -> Result<ResponseBody, HostError> {
        let store = self.thread(thread_id)?;
        let store = lock_unpoisoned(&store);
        snapshot(&store)
    }

    fn delete_index(&self, thread_id: &str) -> Result<ResponseBody, HostError> {
        self.sessions.delete_index(thread_id)?;
        Ok(ResponseBody::Ack)
    }

    fn update_state(&self, thread_id: &str, patch: StatePatch) -> Result<ResponseBody, HostError> {
        let shared = self.thread(thread_id)?;
        let mut store = lock_unpoisoned(&shared);
        self.ensure_live(thread_id, &shared)?;
        store.update_state(patch)?;
        snapshot(&store)
    }

    /// Returns the shared handle for an existing thread, opening it on first use.
    fn thread(&self, thread_id: &str) -> Result<SharedStore, SessionStoreError> {
        let mut open_threads = lock_unpoisoned(&self.open_threads);
        if let Some(store) = open_threads.get(thread_id) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(Mutex::new(self.sessions.open(thread_id)?));
        open_threads.insert(thread_id.to_string(), Arc::clone(&store));
        Ok(store)
    }

    fn thread_or_create(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<SharedStore, SessionStoreError> {
        match self.thread(thread_id) {
            Err(error) if error.is_not_found() => {
                let store = self
                    .sessions
                    .create(thread_id, &self.workspace_id, &title_from(text))?;
                Ok(self.register(store))
            }
            other => other,
        }
    }

    fn create_thread(&self, text: &str) -> Result<SharedStore, SessionStoreError> {
        let store = self
            .sessions
            .create_new(&self.workspace_id, &title_from(text))?;
        Ok(self.register(store))
    }

    fn register(&self, store: SessionStore) -> SharedStore {
        let thread_id = store.thread_id().to_string();
        let store = Arc::new(Mutex::new(store));
        lock_unpoisoned(&self.open_threads).insert(thread_id, Arc::clone(&store));
        store
    }
}

fn snapshot(store: &SessionStore) -> Result<ResponseBody, HostError> {
    let state = assemble(store.history(), &store.session_context())?;
    Ok(ResponseBody::Snapshot(state))
}

/// Validates compose input up front so a malformed turn never reaches the store.
fn human_input(text: &str, image: Option<String>) -> Result<HumanMessage, HostError> {
    let id = format!("human-{}", uuid::Uuid::new_v4());
    let Some(image) = image else {
        if text.is_empty() {
            return Err(HostError::new(
                ErrorKind::InvalidRequest,
                "compose requires text or an image",
            ));
        }
        return Ok(HumanMessage::new(id, text));
    };

    data_url::decode_image(&image)
        .map_err(|error| HostError::new(ErrorKind::InvalidRequest, error.to_string()))?;

    let mut segments = Vec::with_capacity(2);
    if !text.is_empty() {
        segments.push(ContentSegment::text(text));
    }
    segments.push(ContentSegment::image_url(image));
    Ok(HumanMessage::new(id, segments))
}

fn title_from(text: &str) -> String {
    text.lines()
        .next()
        .unwrap_or_default()
        .trim()
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect()
}

fn has_text(content: &MessageContent) -> bool {
    match content {
        MessageContent::Text(text) => !text.is_empty(),
        MessageContent::Segments(segments) => segments
            .iter()
            .any(|segment| matches!(segment, ContentSegment::Text { text } if !text.is_empty())),
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use agent_runtime_mock::MockRuntime;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    use super::*;

    fn host() -> (TempDir, Arc<SessionHost>) {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let host = SessionHost::new(
            SessionDirectory::new(dir.path()),
            "ws-1",
            Arc::new(MockRuntime::default()),
        );
        (dir, host)
    }

    #[test]
    fn delete_claims_the_turn_slot() {
        let (_dir, host) = host();
        host.thread_or_create("t1", "hi").expect("thread created");

        let turn = host.turns().begin("t1").expect("turn registers");
        assert_matches!(
            host.delete_thread("t1"),
            Err(HostError { kind: ErrorKind::ThreadBusy, .. })
        );

        drop(turn);
        assert_matches!(host.delete_thread("t1"), Ok(ResponseBody::Ack));
        assert!(!host.turns().is_active("t1"));
        assert_matches!(
            host.delete_thread("t1"),
            Err(HostError { kind: ErrorKind::ThreadNotFound, .. })
        );
    }

    #[test]
    fn handle_taken_before_delete_cannot_write() {
        let (dir, host) = host();
        let stale = host.thread_or_create("t1", "hi").expect("thread created");
        host.ensure_live("t1", &stale).expect("fresh handle is live");

        host.delete_thread("t1").expect("thread deleted");

        assert_matches!(
            host.ensure_live("t1", &stale),
            Err(HostError { kind: ErrorKind::ThreadNotFound, .. })
        );
        assert_matches!(
            host.update_state("t1", StatePatch::default()),
            Err(HostError { kind: ErrorKind::ThreadNotFound, .. })
        );
        assert!(!dir.path().join("threads").join("t1.jsonl").exists());
    }

    #[test]
    fn recreated_thread_gets_a_new_live_handle() {
        let (_dir, host) = host();
        let stale = host.thread_or_create("t1", "hi").expect("thread created");
        host.delete_thread("t1").expect("thread deleted");

        let fresh = host.thread_or_create("t1", "again").expect("thread recreated");
        assert!(!Arc::ptr_eq(&stale, &fresh));
        host.ensure_live("t1", &fresh).expect("new handle is live");
        assert_matches!(
            host.ensure_live("t1", &stale),
            Err(HostError { kind: ErrorKind::ThreadNotFound, .. })
        );
    }

    #[test]
    fn registry_rejects_second_turn_until_guard_drops() {
        let registry = TurnRegistry::new();
        let first = registry.begin("t1").expect("first turn registers");

        assert!(registry.begin("t1").is_none());
        assert!(registry.begin("t2").is_some());
        assert!(registry.is_active("t1"));

        drop(first);
        assert!(!registry.is_active("t1"));
        assert!(registry.begin("t1").is_some());
    }

    #[test]
    fn registry_cancel_targets_one_thread_or_all() {
        let registry = TurnRegistry::new();
        let a = registry.begin("a").expect("a registers");
        let b = registry.begin("b").expect("b registers");

        assert!(registry.cancel("a"));
        assert!(a.cancel_signal().load(Ordering::SeqCst));
        assert!(!b.cancel_signal().load(Ordering::SeqCst));
        assert!(!registry.cancel("missing"));

        assert_eq!(registry.cancel_all(), 2);
        assert!(b.cancel_signal().load(Ordering::SeqCst));
    }

    #[test]
    fn turn_ids_increase() {
        let registry = TurnRegistry::new();
        let first = registry.begin("a").expect("a registers").turn_id();
        let second = registry.begin("b").expect("b registers").turn_id();
        assert!(second > first);
    }

    #[test]
    fn human_input_requires_text_or_valid_image() {
        assert_matches!(
            human_input("", None),
            Err(HostError { kind: ErrorKind::InvalidRequest, .. })
        );
        assert_matches!(
            human_input("look", Some("data:text/plain;base64,aGk=".to_string())),
            Err(HostError { kind: ErrorKind::InvalidRequest, .. })
        );

        let image_only = human_input("", Some("data:image/png;base64,AQI=".to_string()))
            .expect("image-only input is valid");
        assert_eq!(
            image_only.content,
            MessageContent::Segments(vec![ContentSegment::image_url("data:image/png;base64,AQI=")])
        );
        assert!(!image_only.transient);
    }

    #[test]
    fn title_uses_first_line_capped() {
        assert_eq!(title_from("  Fix the build\nmore detail"), "Fix the build");
        assert_eq!(title_from(&"x".repeat(200)).chars().count(), TITLE_MAX_CHARS);
        assert_eq!(title_from(""), "");
    }
}
