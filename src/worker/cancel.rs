//! Stops blocking codec work once its async run has been abandoned.
//!
//! Dropping the `JoinHandle` of a `spawn_blocking` task does not stop the
//! task. Sources handed to blocking work are wrapped with [`Cancel::guard`]
//! instead, so the next read after [`Cancel::cancel`] fails and the codec
//! unwinds through its normal error path.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation flag shared between an async run and its blocking task.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Wraps `inner` so that reads fail once this run is cancelled.
    pub fn guard<R: Read>(&self, inner: R) -> Guarded<R> {
        Guarded { inner, cancel: self.clone() }
    }
}

pub struct Guarded<R: Read> {
    inner: R,
    cancel: Cancel,
}

impl<R: Read> Read for Guarded<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Not `Interrupted`: readers retry that kind.
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("operation cancelled"));
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use super::*;

    #[test]
    fn test_reads_until_cancelled() {
        let cancel = Cancel::default();
        let mut source = cancel.guard(Cursor::new(vec![1u8; 10]));
        let mut buf = [0u8; 4];

        assert_eq!(source.read(&mut buf).unwrap(), 4);
        cancel.clone().cancel();
        assert!(cancel.is_cancelled());

        let err = source.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_independent_runs() {
        let first = Cancel::default();
        let second = Cancel::default();
        first.cancel();
        assert!(!second.is_cancelled());
        assert_eq!(second.guard(Cursor::new(b"ok".to_vec())).read(&mut [0u8; 2]).unwrap(), 2);
    }
}
