//! Exit sentinel detection for the shell client.

/// Typing this sequence leaves a shell session.
pub const EXIT_SENTINEL: &[u8; 3] = b"..1";

/// Trailing 3-byte window over everything read from the console.
///
/// The window carries across reads, so a sentinel split between two
/// chunks is still detected.
#[derive(Debug, Default, Clone)]
pub struct SentinelWindow {
    window: [u8; 3],
    filled: usize,
}

impl SentinelWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slide `chunk` into the window and report whether everything read
    /// so far now ends with the sentinel.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let tail = &chunk[chunk.len().saturating_sub(3)..];
        for &byte in tail {
            self.window.rotate_left(1);
            self.window[2] = byte;
        }
        self.filled = (self.filled + tail.len()).min(3);
        self.matches()
    }

    /// Whether the last three bytes read equal the sentinel.
    pub fn matches(&self) -> bool {
        self.filled == 3 && &self.window == EXIT_SENTINEL
    }
}
