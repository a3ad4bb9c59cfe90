use std::path::{Path, PathBuf};

use crate::error::SessionStoreError;

pub const THREADS_DIR: &str = "threads";
pub const INDEX_DIR: &str = "index";
pub const THREAD_FILE_EXTENSION: &str = "jsonl";
pub const MAX_THREAD_ID_LEN: usize = 128;

#[must_use]
pub fn threads_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(THREADS_DIR)
}

/// Retrieval-index state kept per thread by external indexers.
#[must_use]
pub fn index_dir(data_dir: &Path, thread_id: &str) -> PathBuf {
    data_dir.join(INDEX_DIR).join(thread_id)
}

#[must_use]
pub fn thread_file_name(thread_id: &str) -> String {
    format!("{thread_id}.{THREAD_FILE_EXTENSION}")
}

/// Thread ids double as file stems, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_thread_id(thread_id: &str) -> Result<(), SessionStoreError> {
    let reason = if thread_id.is_empty() {
        "must not be empty"
    } else if thread_id.len() > MAX_THREAD_ID_LEN {
        "must be at most 128 characters"
    } else if !thread_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        "may only contain ASCII letters, digits, '-' and '_'"
    } else {
        return Ok(());
    };

    Err(SessionStoreError::InvalidThreadId {
        thread_id: thread_id.to_string(),
        reason,
    })
}
