//! Tunnel protocol engines.
//!
//! Each session owns an `input`/`output`/`state` channel triple. The
//! server role runs next to the real resource (a shell, local HTTP
//! services). The client role runs next to the user.
//!
//! - [`shell`]: byte-stream tunnel between a PTY and the local console.
//! - [`http`]: request/response tunnel with correlation and timeout.

pub mod http;
pub mod payload;
pub mod sentinel;
pub mod shell;

pub use payload::SessionStatus;
pub use sentinel::{SentinelWindow, EXIT_SENTINEL};

use tracing::warn;

use crate::relay::RelayChannel;

/// Delete a handled item without holding up the caller.
pub(crate) fn consume_later(channel: &RelayChannel, id: String) {
    let channel = channel.clone();
    tokio::spawn(async move {
        if let Err(e) = channel.consume(&id).await {
            warn!(path = %channel.path(), id = %id, error = %e, "failed to consume relay item");
        }
    });
}
