use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use agent_runtime::RawMessage;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use transcript::{SessionContext, SessionMetadata};

use crate::error::SessionStoreError;
use crate::schema::{JsonLine, MessageRecord, StatePatch, ThreadHeader};

/// Current auxiliary state after replaying every state patch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ThreadState {
    title: String,
    context_files: Vec<String>,
    command: Option<String>,
}

impl ThreadState {
    fn apply(&mut self, patch: StatePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(context_files) = patch.context_files {
            self.context_files = context_files;
        }
        if let Some(command) = patch.command {
            self.command = if command.is_empty() {
                None
            } else {
                Some(command)
            };
        }
    }
}

/// One open thread file.
#[derive(Debug)]
pub struct SessionStore {
    pub(crate) path: PathBuf,
    file: File,
    header: ThreadHeader,
    history: Vec<RawMessage>,
    message_ids: HashSet<String>,
    state: ThreadState,
    line_count: usize,
}

impl SessionStore {
    /// Creates a new thread file containing only `header`. Fails if it exists.
    pub fn create(path: &Path, header: ThreadHeader) -> Result<Self, SessionStoreError> {
        let path = path.to_path_buf();
        validate_header_line(&path, 1, &header)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| {
                SessionStoreError::io("creating threads directory", parent, source)
            })?;
        }

        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    SessionStoreError::ThreadExists {
                        thread_id: header.thread_id.clone(),
                    }
                } else {
                    SessionStoreError::io("creating thread file", &path, source)
                }
            })?;

        let state = ThreadState {
            title: header.title.clone(),
            ..ThreadState::default()
        };
        let mut store = Self {
            path,
            file,
            header,
            history: Vec::new(),
            message_ids: HashSet::new(),
            state,
            line_count: 0,
        };
        store.write_line(&JsonLine::Session(store.header.clone()))?;

        tracing::debug!(
            thread_id = %store.header.thread_id,
            path = %store.path.display(),
            "created thread file"
        );
        Ok(store)
    }

    pub fn open(path: &Path) -> Result<Self, SessionStoreError> {
        let path = path.to_path_buf();
        let read_file = File::open(&path)
            .map_err(|source| SessionStoreError::io("opening thread file", &path, source))?;
        let reader = BufReader::new(read_file);

        let mut header: Option<ThreadHeader> = None;
        let mut history = Vec::new();
        let mut message_ids = HashSet::new();
        let mut state = ThreadState::default();
        let mut line_count = 0;

        for (line_index, line_result) in reader.lines().enumerate() {
            let line_number = line_index + 1;
            line_count = line_number;
            let line = line_result
                .map_err(|source| SessionStoreError::io_line(&path, line_number, source))?;
            let parsed = parse_json_line(&path, line_number, &line)?;

            if line_number == 1 {
                match parsed {
                    JsonLine::Session(parsed_header) => {
                        validate_header_line(&path, line_number, &parsed_header)?;
                        state.title = parsed_header.title.clone();
                        header = Some(parsed_header);
                    }
                    JsonLine::Message(_) | JsonLine::State(_) => {
                        return Err(SessionStoreError::InvalidHeaderRecord {
                            path,
                            line: line_number,
                        });
                    }
                }

                continue;
            }

            match parsed {
                JsonLine::Session(_) => {
                    return Err(SessionStoreError::InvalidRecord {
                        path,
                        line: line_number,
                    });
                }
                JsonLine::Message(record) => {
                    validate_rfc3339(&path, line_number, "ts", &record.ts)?;
                    if let Some(id) = record.message.id() {
                        if !message_ids.insert(id.to_string()) {
                            return Err(SessionStoreError::DuplicateMessageId {
                                path,
                                line: line_number,
                                id: id.to_string(),
                            });
                        }
                    }
                    history.push(record.message);
                }
                JsonLine::State(record) => {
                    validate_rfc3339(&path, line_number, "ts", &record.ts)?;
                    state.apply(record.into());
                }
            }
        }

        let header =
            header.ok_or_else(|| SessionStoreError::MissingHeader { path: path.clone() })?;

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|source| {
                SessionStoreError::io("opening thread file for append", &path, source)
            })?;

        Ok(Self {
            path,
            file,
            header,
            history,
            message_ids,
            state,
            line_count,
        })
    }

    /// Persists one raw message. Raw message ids are unique within a thread.
    pub fn append_message(&mut self, message: RawMessage) -> Result<(), SessionStoreError> {
        if let Some(id) = message.id() {
            if self.message_ids.contains(id) {
                return Err(SessionStoreError::DuplicateMessageId {
                    path: self.path.clone(),
                    line: self.line_count + 1,
                    id: id.to_string(),
                });
            }
        }

        let id = message.id().map(str::to_string);
        let line = JsonLine::Message(MessageRecord {
            ts: now_rfc3339()?,
            message,
        });
        self.write_line(&line)?;

        if let Some(id) = id {
            self.message_ids.insert(id);
        }
        if let JsonLine::Message(record) = line {
            self.history.push(record.message);
        }
        Ok(())
    }

    pub fn update_state(&mut self, patch: StatePatch) -> Result<(), SessionStoreError> {
        if patch.is_empty() {
            return Ok(());
        }

        let record = patch.clone().into_record(now_rfc3339()?);
        self.write_line(&JsonLine::State(record))?;
        self.state.apply(patch);
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> &ThreadHeader {
        &self.header
    }

    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.header.thread_id
    }

    #[must_use]
    pub fn history(&self) -> &[RawMessage] {
        &self.history
    }

    /// A thread with persisted history can be continued by a stateless runtime.
    #[must_use]
    pub fn can_resume(&self) -> bool {
        !self.history.is_empty()
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.state.title
    }

    #[must_use]
    pub fn context_files(&self) -> &[String] {
        &self.state.context_files
    }

    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.state.command.as_deref()
    }

    #[must_use]
    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            title: self.state.title.clone(),
            created_at: self.header.created_at.clone(),
            parent_thread_id: self.header.parent_thread_id.clone(),
            context_files: self.state.context_files.clone(),
            command: self.state.command.clone(),
        }
    }

    /// Explicit assembly context for this thread.
    #[must_use]
    pub fn session_context(&self) -> SessionContext {
        SessionContext::new(
            self.header.thread_id.clone(),
            self.header.workspace_id.clone(),
            self.metadata(),
        )
        .with_can_resume(self.can_resume())
    }

    fn write_line(&mut self, line: &JsonLine) -> Result<(), SessionStoreError> {
        let mut encoded = serde_json::to_string(line)
            .map_err(|source| SessionStoreError::json_serialize(&self.path, source))?;
        encoded.push('\n');

        self.file
            .write_all(encoded.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| {
                SessionStoreError::io("appending thread record", &self.path, source)
            })?;
        self.line_count += 1;
        Ok(())
    }
}

pub fn now_rfc3339() -> Result<String, SessionStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(SessionStoreError::ClockFormat)
}

pub(crate) fn parse_json_line(
    path: &Path,
    line_number: usize,
    line: &str,
) -> Result<JsonLine, SessionStoreError> {
    serde_json::from_str::<JsonLine>(line)
        .map_err(|source| SessionStoreError::json_line(path, line_number, source))
}

pub(crate) fn validate_header_line(
    path: &Path,
    line_number: usize,
    header: &ThreadHeader,
) -> Result<(), SessionStoreError> {
    if header.version != 1 {
        return Err(SessionStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }

    crate::paths::validate_thread_id(&header.thread_id)?;
    validate_rfc3339(path, line_number, "created_at", &header.created_at)
}

pub(crate) fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), SessionStoreError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(SessionStoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}
