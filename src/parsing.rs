//! Parsing functions to parse data using [Buf].

use bytes::{Buf, Bytes};
use snafu::{Backtrace, Snafu};

/// Parsing errors
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{}: reading {:?}", context, typ))]
    TooShort {
        typ: Typ,
        context: &'static str,
        #[snafu(backtrace)]
        source: RemainingError,
    },
    #[snafu(display("expected {}, found {}", hex::encode(expected), hex::encode(found)))]
    TagMismatch {
        expected: Vec<u8>,
        found: Bytes,
        context: &'static str,
        backtrace: Option<Backtrace>,
    },
}

impl Error {
    /// Returns true if the error indictates that the input was too short.
    pub fn is_incomplete(&self) -> bool {
        match self {
            Self::TooShort { .. } => true,
            Self::TagMismatch { .. } => false,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("needed {}, remaining {}", needed, remaining))]
pub struct RemainingError {
    pub needed: usize,
    pub remaining: usize,
    backtrace: Option<Backtrace>,
}

#[derive(Debug)]
pub enum Typ {
    U8,
    U16Be,
    U32Be,
    Array(usize),
    Take(usize),
    Tag(Vec<u8>),
}

pub trait BufParsing: Buf + Sized {
    fn read_u8(&mut self) -> Result<u8, Error> {
        self.ensure_remaining(1).context_typ(Typ::U8, "u8")?;
        Ok(self.get_u8())
    }

    fn read_be_u16(&mut self) -> Result<u16, Error> {
        self.ensure_remaining(2).context_typ(Typ::U16Be, "u16 (be)")?;
        Ok(self.get_u16())
    }

    fn read_be_u32(&mut self) -> Result<u32, Error> {
        self.ensure_remaining(4).context_typ(Typ::U32Be, "u32 (be)")?;
        Ok(self.get_u32())
    }

    fn read_array<const C: usize>(&mut self) -> Result<[u8; C], Error> {
        self.ensure_remaining(C).context_typ(Typ::Array(C), "array")?;
        let mut arr = [0u8; C];
        self.copy_to_slice(&mut arr);
        Ok(arr)
    }

    fn read_take(&mut self, size: usize) -> Result<Bytes, Error> {
        self.ensure_remaining(size).context_typ(Typ::Take(size), "take")?;
        Ok(self.copy_to_bytes(size))
    }

    fn read_tag(&mut self, tag: &[u8]) -> Result<(), Error> {
        let found = self.read_take(tag.len())?;
        if found.as_ref() != tag {
            return Err(Error::TagMismatch {
                expected: tag.to_vec(),
                found,
                context: "tag",
                backtrace: snafu::GenerateImplicitData::generate(),
            });
        }
        Ok(())
    }

    fn rest(&mut self) -> Bytes {
        let len = self.remaining();
        self.copy_to_bytes(len)
    }

    fn ensure_remaining(&self, size: usize) -> Result<(), RemainingError> {
        if self.remaining() < size {
            return Err(RemainingError {
                needed: size,
                remaining: self.remaining(),
                backtrace: snafu::GenerateImplicitData::generate(),
            });
        }

        Ok(())
    }
}

impl<B: Buf> BufParsing for B {}

trait RemainingContext {
    fn context_typ(self, typ: Typ, context: &'static str) -> Result<(), Error>;
}

impl RemainingContext for Result<(), RemainingError> {
    fn context_typ(self, typ: Typ, context: &'static str) -> Result<(), Error> {
        self.map_err(|source| Error::TooShort {
            typ,
            context,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_numbers() {
        let mut buf = &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07][..];
        assert_eq!(buf.read_u8().unwrap(), 0x01);
        assert_eq!(buf.read_be_u16().unwrap(), 0x0203);
        assert_eq!(buf.read_be_u32().unwrap(), 0x0405_0607);
        assert!(buf.read_u8().unwrap_err().is_incomplete());
    }

    #[test]
    fn test_read_tag() {
        let mut buf = &b"PGPx"[..];
        buf.read_tag(b"PGP").unwrap();
        assert_eq!(buf.rest().as_ref(), b"x");

        let mut buf = &b"PGQ"[..];
        assert!(!buf.read_tag(b"PGP").unwrap_err().is_incomplete());
    }
}
