//! Bounded in-memory byte pipe between an async producer and a blocking consumer.
//!
//! The pipe carries owned chunks over a bounded `flume` channel. Its capacity
//! is the backpressure: once `capacity` chunks are in flight, the producer
//! waits until the consumer drains one.
//!
//! ## Shutdown
//!
//! - Producer done: dropping every [`PipeWriter`] makes the reader return EOF
//!   after the buffered chunks.
//! - Consumer done early: dropping the [`PipeReader`] makes every further send
//!   fail with `BrokenPipe`, so a producer blocked on a full pipe is released
//!   instead of waiting forever.

use std::io::{self, ErrorKind, Read, Write};

use flume::{Receiver, Sender};

/// Creates a pipe holding at most `capacity` chunks in flight.
pub fn bounded(capacity: usize) -> (PipeWriter, PipeReader) {
    let (sender, receiver) = flume::bounded(capacity);
    (PipeWriter { sender }, PipeReader { receiver, chunk: Vec::new(), position: 0 })
}

/// Sending half. Cloneable; the pipe closes when the last clone is dropped.
#[derive(Clone)]
pub struct PipeWriter {
    sender: Sender<Vec<u8>>,
}

impl PipeWriter {
    /// Sends one chunk, waiting asynchronously while the pipe is full.
    ///
    /// # Errors
    ///
    /// Returns `BrokenPipe` once the reader has been dropped.
    pub async fn send_async(&self, chunk: Vec<u8>) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.sender.send_async(chunk).await.map_err(|_| broken_pipe())
    }

    /// True once the consuming side has gone away.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sender.is_disconnected()
    }
}

impl Write for PipeWriter {
    /// Blocking send of a copy of `buf`.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.sender.send(buf.to_vec()).map_err(|_| broken_pipe())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Receiving half. Implements blocking [`Read`]; EOF once all writers are gone.
pub struct PipeReader {
    receiver: Receiver<Vec<u8>>,
    /// Chunk currently being handed out.
    chunk: Vec<u8>,
    /// Read position inside `chunk`.
    position: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        // Refill from the channel once the current chunk is spent.
        // A receive error means every writer was dropped: end of stream.
        while self.position == self.chunk.len() {
            match self.receiver.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.position = 0;
                }
                Err(_) => return Ok(0),
            }
        }

        let available = &self.chunk[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;

        Ok(n)
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(ErrorKind::BrokenPipe, "pipe reader closed")
}
