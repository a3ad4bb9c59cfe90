//! UI-side end of the bridge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use transcript::ConversationState;

use crate::error::BridgeError;
use crate::protocol::{
    Command, HostMessage, Outcome, PhaseNotification, Request, RequestId, Response, ResponseBody,
};
use crate::transport::{spawn_line_reader, spawn_line_writer};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Default)]
struct PendingTable {
    waiters: HashMap<RequestId, oneshot::Sender<Outcome>>,
    closed: bool,
}

/// Sends requests to the agent host and correlates responses by id.
///
/// Phase notifications are delivered on a separate channel returned at
/// construction, so a slow notification consumer never delays responses.
pub struct BridgeClient {
    outbound: mpsc::UnboundedSender<Request>,
    pending: Arc<Mutex<PendingTable>>,
    next_request_id: AtomicU64,
    request_timeout: Duration,
}

impl BridgeClient {
    /// Connects over a line-framed byte stream pair.
    pub fn connect<R, W>(
        reader: R,
        writer: W,
        request_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PhaseNotification>)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbound, _reader) = spawn_line_reader::<_, HostMessage>(reader);
        let (outbound, _writer) = spawn_line_writer::<_, Request>(writer);
        Self::from_channels(outbound, inbound, request_timeout)
    }

    /// Builds a client over already-typed channels.
    pub fn from_channels(
        outbound: mpsc::UnboundedSender<Request>,
        inbound: mpsc::UnboundedReceiver<HostMessage>,
        request_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PhaseNotification>) {
        let pending = Arc::new(Mutex::new(PendingTable::default()));
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch_inbound(
            inbound,
            Arc::clone(&pending),
            notifications_tx,
        ));

        let client = Self {
            outbound,
            pending,
            next_request_id: AtomicU64::new(1),
            request_timeout,
        };
        (client, notifications_rx)
    }

    /// Sends one command and waits for its single response.
    pub async fn request(&self, command: Command) -> Result<ResponseBody, BridgeError> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = lock_unpoisoned(&self.pending);
            if pending.closed {
                return Err(BridgeError::Disconnected);
            }
            pending.waiters.insert(id, tx);
        }

        tracing::debug!(request_id = id, command = command.name(), "sending bridge request");
        if self.outbound.send(Request { id, command }).is_err() {
            lock_unpoisoned(&self.pending).waiters.remove(&id);
            return Err(BridgeError::Disconnected);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Outcome::Ok { body })) => Ok(body),
            Ok(Ok(Outcome::Error { kind, message })) => Err(BridgeError::Remote { kind, message }),
            Ok(Err(_)) => Err(BridgeError::Disconnected),
            Err(_) => {
                lock_unpoisoned(&self.pending).waiters.remove(&id);
                tracing::warn!(request_id = id, "bridge request timed out");
                Err(BridgeError::Timeout {
                    id,
                    timeout: self.request_timeout,
                })
            }
        }
    }

    pub async fn compose(
        &self,
        thread_id: Option<String>,
        text: impl Into<String>,
        context_files: Vec<String>,
        image: Option<String>,
    ) -> Result<ConversationState, BridgeError> {
        let command = Command::Compose {
            thread_id,
            text: text.into(),
            context_files,
            image,
        };
        self.expect_snapshot(command).await
    }

    pub async fn cancel(&self, thread_id: Option<String>) -> Result<(), BridgeError> {
        self.expect_ack(Command::Cancel { thread_id }).await
    }

    pub async fn branch_thread(
        &self,
        thread_id: impl Into<String>,
        source_thread_id: impl Into<String>,
    ) -> Result<ConversationState, BridgeError> {
        self.expect_snapshot(Command::BranchThread {
            thread_id: thread_id.into(),
            source_thread_id: source_thread_id.into(),
        })
        .await
    }

    pub async fn delete_thread(&self, thread_id: impl Into<String>) -> Result<(), BridgeError> {
        self.expect_ack(Command::DeleteThread {
            thread_id: thread_id.into(),
        })
        .await
    }

    pub async fn delete_index(&self, thread_id: impl Into<String>) -> Result<(), BridgeError> {
        self.expect_ack(Command::DeleteIndex {
            thread_id: thread_id.into(),
        })
        .await
    }

    pub async fn update_files(
        &self,
        thread_id: impl Into<String>,
        files: Vec<String>,
    ) -> Result<ConversationState, BridgeError> {
        self.expect_snapshot(Command::UpdateFile {
            thread_id: thread_id.into(),
            files,
        })
        .await
    }

    pub async fn update_command(
        &self,
        thread_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<ConversationState, BridgeError> {
        self.expect_snapshot(Command::UpdateCommand {
            thread_id: thread_id.into(),
            text: text.into(),
        })
        .await
    }

    pub async fn get_thread(
        &self,
        thread_id: impl Into<String>,
    ) -> Result<ConversationState, BridgeError> {
        self.expect_snapshot(Command::GetThread {
            thread_id: thread_id.into(),
        })
        .await
    }

    async fn expect_snapshot(&self, command: Command) -> Result<ConversationState, BridgeError> {
        let name = command.name();
        match self.request(command).await? {
            ResponseBody::Snapshot(state) => Ok(state),
            ResponseBody::Ack => Err(BridgeError::UnexpectedBody { command: name }),
        }
    }

    async fn expect_ack(&self, command: Command) -> Result<(), BridgeError> {
        let name = command.name();
        match self.request(command).await? {
            ResponseBody::Ack => Ok(()),
            ResponseBody::Snapshot(_) => Err(BridgeError::UnexpectedBody { command: name }),
        }
    }
}

async fn dispatch_inbound(
    mut inbound: mpsc::UnboundedReceiver<HostMessage>,
    pending: Arc<Mutex<PendingTable>>,
    notifications: mpsc::UnboundedSender<PhaseNotification>,
) {
    while let Some(message) = inbound.recv().await {
        match message {
            HostMessage::Response(Response { id, outcome }) => {
                let waiter = lock_unpoisoned(&pending).waiters.remove(&id);
                match waiter {
                    Some(waiter) => {
                        // The caller may have given up; nothing else to deliver to.
                        let _ = waiter.send(outcome);
                    }
                    None => {
                        tracing::warn!(
                            request_id = id,
                            "dropping response for unknown or answered request"
                        );
                    }
                }
            }
            HostMessage::Notification(notification) => {
                let _ = notifications.send(notification);
            }
        }
    }

    let mut pending = lock_unpoisoned(&pending);
    pending.closed = true;
    let outstanding = pending.waiters.len();
    pending.waiters.clear();
    if outstanding > 0 {
        tracing::warn!(outstanding, "bridge closed with requests in flight");
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
