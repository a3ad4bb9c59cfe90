use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::SessionStoreError;
use crate::paths::{
    index_dir, thread_file_name, threads_dir, validate_thread_id, THREAD_FILE_EXTENSION,
};
use crate::schema::{StatePatch, ThreadHeader};
use crate::store::{now_rfc3339, SessionStore};

/// All threads under one data directory, keyed by thread id.
#[derive(Debug, Clone)]
pub struct SessionDirectory {
    data_dir: PathBuf,
}

impl SessionDirectory {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn thread_path(&self, thread_id: &str) -> Result<PathBuf, SessionStoreError> {
        validate_thread_id(thread_id)?;
        Ok(threads_dir(&self.data_dir).join(thread_file_name(thread_id)))
    }

    pub fn exists(&self, thread_id: &str) -> Result<bool, SessionStoreError> {
        Ok(self.thread_path(thread_id)?.is_file())
    }

    pub fn create(
        &self,
        thread_id: &str,
        workspace_id: &str,
        title: &str,
    ) -> Result<SessionStore, SessionStoreError> {
        let path = self.thread_path(thread_id)?;
        let header = ThreadHeader::v1(thread_id, None, workspace_id, title, now_rfc3339()?);
        SessionStore::create(&path, header)
    }

    /// Creates a thread under a freshly generated id.
    pub fn create_new(
        &self,
        workspace_id: &str,
        title: &str,
    ) -> Result<SessionStore, SessionStoreError> {
        self.create(&uuid::Uuid::new_v4().to_string(), workspace_id, title)
    }

    pub fn open(&self, thread_id: &str) -> Result<SessionStore, SessionStoreError> {
        let path = self.thread_path(thread_id)?;
        if !path.is_file() {
            return Err(SessionStoreError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            });
        }

        let store = SessionStore::open(&path)?;
        if store.thread_id() != thread_id {
            return Err(SessionStoreError::ThreadIdMismatch {
                path,
                expected: thread_id.to_string(),
                found: store.thread_id().to_string(),
            });
        }

        Ok(store)
    }

    /// Thread ids with a file on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>, SessionStoreError> {
        let root = threads_dir(&self.data_dir);
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(SessionStoreError::io("listing threads", &root, source)),
        };

        let mut thread_ids = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|source| SessionStoreError::io("listing threads", &root, source))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(THREAD_FILE_EXTENSION) {
                continue;
            }

            match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) if validate_thread_id(stem).is_ok() => thread_ids.push(stem.to_string()),
                _ => tracing::warn!(path = %path.display(), "skipping unrecognized thread file"),
            }
        }

        thread_ids.sort();
        Ok(thread_ids)
    }

    /// Creates `new_thread_id` with the source's raw history and state cloned
    /// at its current point. The new header records the source as parent.
    pub fn branch(
        &self,
        new_thread_id: &str,
        source_thread_id: &str,
    ) -> Result<SessionStore, SessionStoreError> {
        let source = self.open(source_thread_id)?;
        let path = self.thread_path(new_thread_id)?;

        let header = ThreadHeader::v1(
            new_thread_id,
            Some(source_thread_id.to_string()),
            source.header().workspace_id.clone(),
            source.title(),
            now_rfc3339()?,
        );
        let branch = populate_branch(&source, SessionStore::create(&path, header)?)?;

        tracing::info!(
            thread_id = new_thread_id,
            parent_thread_id = source_thread_id,
            messages = source.history().len(),
            "branched thread"
        );
        Ok(branch)
    }

    pub fn delete_thread(&self, thread_id: &str) -> Result<(), SessionStoreError> {
        let path = self.thread_path(thread_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(thread_id, "deleted thread");
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                Err(SessionStoreError::ThreadNotFound {
                    thread_id: thread_id.to_string(),
                })
            }
            Err(source) => Err(SessionStoreError::io("deleting thread file", &path, source)),
        }
    }

    /// Removes the thread's retrieval index. Returns whether anything was removed.
    pub fn delete_index(&self, thread_id: &str) -> Result<bool, SessionStoreError> {
        validate_thread_id(thread_id)?;
        let path = index_dir(&self.data_dir, thread_id);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::info!(thread_id, "deleted retrieval index");
                Ok(true)
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SessionStoreError::io("deleting retrieval index", &path, source)),
        }
    }
}

/// Copies the source's state and history into a freshly created branch. The
/// branch file is removed when any copy step fails.
fn populate_branch(
    source: &SessionStore,
    mut branch: SessionStore,
) -> Result<SessionStore, SessionStoreError> {
    let Err(error) = clone_into(source, &mut branch) else {
        return Ok(branch);
    };

    let path = branch.path().to_path_buf();
    drop(branch);
    if let Err(cleanup) = std::fs::remove_file(&path) {
        tracing::warn!(path = %path.display(), error = %cleanup, "failed to remove partial branch");
    }
    Err(error)
}

fn clone_into(source: &SessionStore, branch: &mut SessionStore) -> Result<(), SessionStoreError> {
    branch.update_state(StatePatch {
        title: None,
        context_files: (!source.context_files().is_empty())
            .then(|| source.context_files().to_vec()),
        command: source.command().map(str::to_string),
    })?;

    for message in source.history() {
        branch.append_message(message.clone())?;
    }
    Ok(())
}
