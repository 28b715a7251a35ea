//! Blocking I/O pumps.
//!
//! PTY handles and the process console only offer blocking `Read`/`Write`.
//! These pumps move that I/O onto the blocking thread pool and exchange
//! byte chunks with async code through tokio channels.

use std::io::{Read, Write};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// Reads a blocking source and forwards every non-empty read as a chunk.
pub struct ReadPump<R: Read + Send + 'static> {
    reader: R,
    tx: mpsc::Sender<Vec<u8>>,
    buffer_size: usize,
}

impl<R: Read + Send + 'static> ReadPump<R> {
    /// Create a pump reading up to 4096 bytes at a time.
    pub fn new(reader: R, tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            reader,
            tx,
            buffer_size: 4096,
        }
    }

    /// Create with custom buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Run until the source is exhausted or the receiver is dropped.
    ///
    /// The sender is dropped on return, so the receiver sees the end of
    /// the stream as `None`.
    pub async fn run(self) {
        let buffer_size = self.buffer_size;
        let mut reader = self.reader;
        let tx = self.tx;

        let result = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; buffer_size];

            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!("read pump: EOF");
                        break;
                    }
                    Ok(n) => {
                        trace!(bytes = n, "read pump: chunk");
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            debug!("read pump: channel closed");
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EIO on Unix means the PTY slave side is gone.
                        #[cfg(unix)]
                        if e.raw_os_error() == Some(libc::EIO) {
                            debug!("read pump: PTY closed (EIO)");
                            break;
                        }

                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            debug!("read pump: broken pipe");
                            break;
                        }

                        error!("read pump error: {}", e);
                        break;
                    }
                }
            }
        })
        .await;

        if let Err(e) = result {
            error!("read pump task panicked: {}", e);
        }
    }
}

/// Writes every received chunk to a blocking sink, flushing after each.
pub struct WritePump<W: Write + Send + 'static> {
    writer: W,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl<W: Write + Send + 'static> WritePump<W> {
    pub fn new(writer: W, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { writer, rx }
    }

    /// Run until every sender is dropped or the sink fails.
    pub async fn run(self) {
        let mut writer = self.writer;
        let mut rx = self.rx;

        let result = tokio::task::spawn_blocking(move || {
            while let Some(data) = rx.blocking_recv() {
                trace!(bytes = data.len(), "write pump: chunk");
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    if e.kind() == std::io::ErrorKind::BrokenPipe {
                        debug!("write pump: broken pipe");
                    } else {
                        error!("write pump error: {}", e);
                    }
                    break;
                }
            }
            debug!("write pump: finished");
        })
        .await;

        if let Err(e) = result {
            error!("write pump task panicked: {}", e);
        }
    }
}
