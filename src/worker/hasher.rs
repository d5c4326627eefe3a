use std::io::{self, Write};

/// Passes bytes through to `inner` while folding them into a BLAKE3 digest.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: blake3::Hasher,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, hasher: blake3::Hasher::new() }
    }

    /// Returns the inner writer and the lowercase hex digest of everything written.
    #[must_use]
    pub fn finalize(self) -> (W, String) {
        let digest = hex::encode(self.hasher.finalize().as_bytes());
        (self.inner, digest)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Only the bytes the inner writer accepted are hashed.
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
