// ABOUTME: SSH client module for running remote commands and moving files.
// ABOUTME: Supports password, key and agent authentication with known_hosts verification.

mod auth;
mod client;
mod error;
mod exec;
mod input;
mod stream;
mod transfer;
mod validate;

pub use auth::{Auth, KeySource};
pub use client::{Session, SessionConfig};
pub use error::{Error, Result, TransferError};
pub use exec::{ExecutionResult, ExitStatus};
pub use input::RemoteInput;
pub use stream::{StreamHandle, StreamState};
pub use transfer::Payload;
pub use validate::is_valid_connection;
