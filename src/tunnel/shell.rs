//! Byte-stream tunnel between a served shell and a remote console.
//!
//! The server pipes PTY output into `output` and `input` items into the
//! PTY. The client does the reverse with its own console. Bytes travel
//! base64-encoded in the `data` field and are consumed once handled.

use std::io::{Read, Write};
use std::time::Duration;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::consume_later;
use super::payload::{self, SessionStatus};
use super::sentinel::SentinelWindow;
use crate::pty::{NativePty, PtySize, ReadPump, WritePump};
use crate::relay::{RelayChannel, SessionChannels, Subscription};
use crate::Result;

/// Console read size on the client.
pub const INPUT_CHUNK: usize = 1024;

/// How long buffered shell output may take to reach the relay after exit.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Server role: runs a shell in a PTY for one session.
pub struct ShellServer {
    channels: SessionChannels,
    program: String,
    size: PtySize,
}

impl ShellServer {
    pub fn new(channels: SessionChannels, program: impl Into<String>, size: PtySize) -> Self {
        Self {
            channels,
            program: program.into(),
            size,
        }
    }

    /// Serve until the shell exits, returning its exit code.
    ///
    /// The final `exited` state is published before returning.
    pub async fn run(self) -> Result<i32> {
        let ShellServer {
            channels,
            program,
            size,
        } = self;

        channels
            .state
            .set_record(&SessionStatus::Connected { port: None })
            .await?;
        let input = channels.input.subscribe().await?;

        let mut shell = NativePty::new().spawn_interactive(&program, size)?;
        info!(program = %program, pid = ?shell.pid(), "shell started");

        let (out_tx, out_rx) = mpsc::channel(64);
        tokio::spawn(ReadPump::new(shell.take_reader()?, out_tx).run());
        let forwarder = tokio::spawn(forward_output(out_rx, channels.output.clone()));

        let (in_tx, in_rx) = mpsc::channel(64);
        tokio::spawn(WritePump::new(shell.take_writer()?, in_rx).run());
        let relay_in = tokio::spawn(relay_input(input, channels.input.clone(), in_tx));

        let code = shell.wait_exit().await?;
        info!(code, "shell exited");
        relay_in.abort();

        if tokio::time::timeout(OUTPUT_DRAIN, forwarder).await.is_err() {
            debug!("shell output still open after exit, dropping the rest");
        }

        if let Err(e) = channels.state.set_record(&SessionStatus::Exited { code }).await {
            warn!(code, error = %e, "failed to publish exit state");
        }
        Ok(code)
    }
}

/// Append every PTY read to `output`, in order.
async fn forward_output(mut rx: mpsc::Receiver<Vec<u8>>, output: RelayChannel) {
    while let Some(chunk) = rx.recv().await {
        if chunk.is_empty() {
            continue;
        }
        if let Err(e) = output.append(payload::data_fields(&chunk)).await {
            warn!(error = %e, bytes = chunk.len(), "failed to relay shell output");
        }
    }
}

/// Decode `input` items into the PTY writer.
async fn relay_input(mut sub: Subscription, input: RelayChannel, tx: mpsc::Sender<Vec<u8>>) {
    while let Some(item) = sub.next().await {
        let delivered = match payload::data_from(&item.fields) {
            Some(bytes) => tx.send(bytes).await.is_ok(),
            None => {
                debug!(id = %item.id, "discarding malformed input item");
                true
            }
        };
        consume_later(&input, item.id);
        if !delivered {
            break;
        }
    }
}

/// Why the client stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The user typed the exit sentinel.
    Sentinel,
    /// The console input reached end of file.
    InputClosed,
}

/// Client role: attaches a console to a served shell.
pub struct ShellClient {
    channels: SessionChannels,
}

impl ShellClient {
    pub fn new(channels: SessionChannels) -> Self {
        Self { channels }
    }

    /// Attach the process console in raw mode.
    pub async fn run(self) -> Result<ClientExit> {
        enable_raw_mode()?;
        let result = self.run_with(std::io::stdin(), std::io::stdout()).await;
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "failed to restore terminal mode");
        }
        result
    }

    /// Run against arbitrary console streams.
    pub async fn run_with<R, W>(self, console_in: R, console_out: W) -> Result<ClientExit>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let channels = self.channels;
        channels
            .state
            .set_record(&SessionStatus::ClientConnected)
            .await?;
        let output = channels.output.subscribe().await?;

        let (print_tx, print_rx) = mpsc::channel(64);
        tokio::spawn(WritePump::new(console_out, print_rx).run());
        let printer = tokio::spawn(relay_output(output, channels.output.clone(), print_tx));

        let (read_tx, mut read_rx) = mpsc::channel(16);
        tokio::spawn(
            ReadPump::new(console_in, read_tx)
                .with_buffer_size(INPUT_CHUNK)
                .run(),
        );

        let mut window = SentinelWindow::new();
        let exit = loop {
            let Some(chunk) = read_rx.recv().await else {
                break ClientExit::InputClosed;
            };
            if window.push(&chunk) {
                break ClientExit::Sentinel;
            }
            if let Err(e) = channels.input.append(payload::data_fields(&chunk)).await {
                warn!(error = %e, bytes = chunk.len(), "failed to relay console input");
            }
        };

        debug!(?exit, "shell client finished");
        printer.abort();
        Ok(exit)
    }
}

/// Decode `output` items onto the console.
async fn relay_output(mut sub: Subscription, output: RelayChannel, tx: mpsc::Sender<Vec<u8>>) {
    while let Some(item) = sub.next().await {
        let printed = match payload::data_from(&item.fields) {
            Some(bytes) => tx.send(bytes).await.is_ok(),
            None => {
                debug!(id = %item.id, "discarding malformed output item");
                true
            }
        };
        consume_later(&output, item.id);
        if !printed {
            break;
        }
    }
}
