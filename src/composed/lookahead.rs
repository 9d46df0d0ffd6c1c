use std::io::{self, Read};

/// Holds back the last `size` octets of a stream.
///
/// Every octet read from the inner reader is swapped against the oldest octet in a
/// fixed ring buffer, so callers see the stream delayed by `size` octets and, once the
/// inner reader is exhausted, the buffer holds exactly the trailing `size` octets.
#[derive(Debug)]
pub struct TruncatedLookahead<R> {
    inner: R,
    buf: Vec<u8>,
    /// Index of the oldest buffered octet.
    pos: usize,
    drained: bool,
}

impl<R: Read> TruncatedLookahead<R> {
    /// Fills the buffer, failing with `UnexpectedEof` if the stream is shorter than `size`.
    pub fn new(mut inner: R, size: usize) -> io::Result<Self> {
        let mut buf = vec![0u8; size];
        inner.read_exact(&mut buf)?;

        Ok(TruncatedLookahead {
            inner,
            buf,
            pos: 0,
            drained: false,
        })
    }

    /// The held back octets, oldest first.
    pub fn tail(&self) -> Vec<u8> {
        let mut tail = Vec::with_capacity(self.buf.len());
        tail.extend_from_slice(&self.buf[self.pos..]);
        tail.extend_from_slice(&self.buf[..self.pos]);
        tail
    }

    /// True once the inner reader has reported the end of the stream.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R: Read> Read for TruncatedLookahead<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.drained || out.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(out)?;
        if n == 0 {
            self.drained = true;
            return Ok(0);
        }
        if self.buf.is_empty() {
            return Ok(n);
        }

        let size = self.buf.len();
        for b in &mut out[..n] {
            std::mem::swap(b, &mut self.buf[self.pos]);
            self.pos = (self.pos + 1) % size;
        }
        Ok(n)
    }
}
