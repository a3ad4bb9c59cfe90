//! Message-passing bridge between a UI process and the agent host.
//!
//! The UI side ([`BridgeClient`]) issues requests and awaits exactly one
//! response per request; the agent side ([`SessionHost`]) runs turns, persists
//! raw output, and streams compose phase notifications while a turn is in
//! flight. Both ends speak newline-delimited JSON ([`protocol`]) over any
//! async byte stream ([`transport`]).

mod client;
mod error;
mod host;
pub mod protocol;
pub mod transport;

pub use client::{BridgeClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::BridgeError;
pub use host::{SessionHost, TurnGuard, TurnRegistry};
pub use protocol::{
    Command, ComposePhase, ErrorKind, HostMessage, Outcome, PhaseNotification, Request,
    RequestId, Response, ResponseBody,
};
