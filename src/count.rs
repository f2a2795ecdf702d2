//! Byte-counting sink wrapper.

use std::io::{self, Write};

/// Write-only wrapper that forwards bytes to an inner sink while tracking
/// how many have passed through since the last counter reset.
///
/// The block compressor uses this to learn the compressed length of each
/// emitted member without seeking the sink.
#[derive(Debug)]
pub struct CountWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    /// Bytes written since construction or the last [`reset_count`](Self::reset_count).
    pub fn written(&self) -> u64 {
        self.count
    }

    pub fn reset_count(&mut self) {
        self.count = 0;
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
