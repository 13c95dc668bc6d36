//! Streaming digest adapters

use std::io::{self, Read, Write};

use super::algorithm::{DigestAlgorithm, Hasher};

/// A `Write` adapter that feeds every written byte through a digest.
///
/// Used when staging content and when serializing inventories, so bytes are
/// hashed in the same pass that writes them to disk.
pub struct DigestWriter<W: Write> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W, algorithm: DigestAlgorithm) -> Self {
        Self {
            inner,
            hasher: algorithm.hasher(),
        }
    }

    /// Consume the writer, returning the inner writer and the lowercase hex
    /// digest of everything written through it.
    pub fn finalize(self) -> (W, String) {
        (self.inner, self.hasher.finalize_hex())
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A `Read` adapter that verifies the stream against an expected digest.
///
/// The check fires exactly once, when the underlying reader reports EOF. A
/// mismatch surfaces as an `InvalidData` I/O error so content corruption can
/// never be silently read through.
pub struct FixityReader<R: Read> {
    inner: R,
    hasher: Option<Hasher>,
    expected: String,
    label: String,
}

impl<R: Read> FixityReader<R> {
    /// `label` identifies the stream in error messages, typically the
    /// content path being read.
    pub fn new(inner: R, algorithm: DigestAlgorithm, expected: &str, label: &str) -> Self {
        Self {
            inner,
            hasher: Some(algorithm.hasher()),
            expected: expected.to_lowercase(),
            label: label.to_string(),
        }
    }

    fn check(&mut self) -> io::Result<()> {
        if let Some(hasher) = self.hasher.take() {
            let actual = hasher.finalize_hex();
            if actual != self.expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Fixity check failed for {}: expected {} but was {}",
                        self.label, self.expected, actual
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for FixityReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            self.check()?;
        } else if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}
