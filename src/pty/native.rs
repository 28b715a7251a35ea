//! Native PTY implementation using portable-pty.

use portable_pty::{native_pty_system, CommandBuilder, PtySize as NativePtySize};
use std::io::{Read, Write};

use super::PtySize;
use crate::error::TunnelError;
use crate::Result;

/// Get the default shell for the current platform.
pub fn default_shell() -> String {
    #[cfg(unix)]
    {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
    #[cfg(windows)]
    {
        "powershell.exe".to_string()
    }
}

/// Wrapper around the native PTY system.
pub struct NativePty {
    pty_system: Box<dyn portable_pty::PtySystem + Send>,
}

impl NativePty {
    /// Create a new NativePty instance.
    pub fn new() -> Self {
        Self {
            pty_system: native_pty_system(),
        }
    }

    /// Spawn an interactive shell in a new PTY.
    ///
    /// The shell inherits the environment and starts in the user's home
    /// directory when one is known.
    pub fn spawn_interactive(&self, shell: &str, size: PtySize) -> Result<SpawnedShell> {
        let native_size = NativePtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = self
            .pty_system
            .openpty(native_size)
            .map_err(|e| TunnelError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.env("TERM", "xterm-256color");
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            cmd.cwd(home);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TunnelError::Pty(e.to_string()))?;

        // pair.slave drops here, so reads see EOF once the shell exits.
        Ok(SpawnedShell {
            master: pair.master,
            child,
        })
    }
}

impl Default for NativePty {
    fn default() -> Self {
        Self::new()
    }
}

/// A spawned shell process with PTY.
pub struct SpawnedShell {
    master: Box<dyn portable_pty::MasterPty + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
}

impl SpawnedShell {
    /// Process ID of the shell, if the platform reports one.
    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Take the writer (can only be called once).
    pub fn take_writer(&mut self) -> Result<Box<dyn Write + Send>> {
        self.master
            .take_writer()
            .map_err(|e| TunnelError::Pty(e.to_string()))
    }

    /// Clone a reader for the shell's output.
    pub fn take_reader(&mut self) -> Result<Box<dyn Read + Send>> {
        self.master
            .try_clone_reader()
            .map_err(|e| TunnelError::Pty(e.to_string()))
    }

    /// Wait for the shell to exit and return its exit code.
    ///
    /// The PTY master stays open until the shell is gone.
    pub async fn wait_exit(self) -> Result<i32> {
        let SpawnedShell { master, mut child } = self;
        let status = tokio::task::spawn_blocking(move || {
            let status = child.wait();
            drop(master);
            status
        })
        .await
        .map_err(|e| TunnelError::Pty(format!("wait task failed: {}", e)))??;

        Ok(status.exit_code() as i32)
    }
}
