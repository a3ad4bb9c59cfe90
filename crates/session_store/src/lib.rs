//! File-backed thread store: one JSONL file per conversation thread.
//!
//! Line 1 of every file is the thread header; each following line is either a
//! persisted raw agent message or a patch to the thread's auxiliary state
//! (title, context files, command). Files are append-only.

mod directory;
mod error;
mod paths;
mod schema;
mod store;

pub use directory::SessionDirectory;
pub use error::SessionStoreError;
pub use paths::{index_dir, thread_file_name, threads_dir, validate_thread_id, MAX_THREAD_ID_LEN};
pub use schema::{MessageRecord, StatePatch, StateRecord, ThreadHeader};
pub use store::{now_rfc3339, SessionStore};
