//! PTY (Pseudo-Terminal) support for the shell tunnel.
//!
//! The server side of a shell session runs the user's shell inside a PTY so
//! that interactive programs behave as they would on a real terminal. PTY
//! handles are blocking; [`ReadPump`] and [`WritePump`] bridge them to tokio
//! channels.

mod native;
mod pump;

pub use native::{default_shell, NativePty, SpawnedShell};
pub use pump::{ReadPump, WritePump};

/// Size of a PTY in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    /// Number of rows (height).
    pub rows: u16,
    /// Number of columns (width).
    pub cols: u16,
}

impl PtySize {
    /// Create a new PtySize with the given dimensions.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for PtySize {
    fn default() -> Self {
        Self { rows: 30, cols: 100 }
    }
}
