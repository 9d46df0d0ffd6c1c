//! Parsing helpers for [BufRead] based packet streams.

use std::io::{self, BufRead};

use bytes::{Bytes, BytesMut};

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "no more data available")
}

pub trait BufReadParsing: BufRead + Sized {
    fn read_u8(&mut self) -> io::Result<u8> {
        let arr = self.read_array::<1>()?;
        Ok(arr[0])
    }

    fn read_be_u16(&mut self) -> io::Result<u16> {
        let arr = self.read_array::<2>()?;
        Ok(u16::from_be_bytes(arr))
    }

    fn read_be_u32(&mut self) -> io::Result<u32> {
        let arr = self.read_array::<4>()?;
        Ok(u32::from_be_bytes(arr))
    }

    /// Returns the next byte without consuming it, `None` at the end of the stream.
    fn peek_u8(&mut self) -> io::Result<Option<u8>> {
        let buf = self.fill_buf()?;
        Ok(buf.first().copied())
    }

    fn has_remaining(&mut self) -> io::Result<bool> {
        let has_remaining = !self.fill_buf()?.is_empty();
        Ok(has_remaining)
    }

    fn read_array<const C: usize>(&mut self) -> io::Result<[u8; C]> {
        let mut arr = [0u8; C];
        let mut read = 0;

        while read < arr.len() {
            let buf = self.fill_buf()?;
            if buf.is_empty() {
                break;
            }

            let available = (arr.len() - read).min(buf.len());
            arr[read..read + available].copy_from_slice(&buf[..available]);
            read += available;
            self.consume(available);
        }
        if read != arr.len() {
            return Err(eof());
        }

        Ok(arr)
    }

    /// Reads exactly `size` bytes, appending them to `out`.
    fn take_bytes_into(&mut self, size: usize, out: &mut BytesMut) -> io::Result<()> {
        // Grow only as data arrives, a corrupt length must not trigger a huge allocation.
        out.reserve(size.min(1024));
        let mut missing = size;

        while missing > 0 {
            let buf = self.fill_buf()?;
            if buf.is_empty() {
                return Err(eof());
            }

            let available = missing.min(buf.len());
            out.extend_from_slice(&buf[..available]);
            missing -= available;
            self.consume(available);
        }

        Ok(())
    }

    fn take_bytes(&mut self, size: usize) -> io::Result<Bytes> {
        let mut out = BytesMut::new();
        self.take_bytes_into(size, &mut out)?;
        Ok(out.freeze())
    }

    /// Reads everything up to the end of the stream, appending it to `out`.
    fn rest_into(&mut self, out: &mut BytesMut) -> io::Result<()> {
        loop {
            let buf = self.fill_buf()?;
            if buf.is_empty() {
                return Ok(());
            }
            let len = buf.len();
            out.extend_from_slice(buf);
            self.consume(len);
        }
    }
}

impl<B: BufRead> BufReadParsing for B {}
