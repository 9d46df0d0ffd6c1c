use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Buf;
use num_bigint::BigUint;
use zeroize::Zeroize;

use crate::errors::{Error, Result};
use crate::parsing::BufParsing;
use crate::ser::Serialize;

/// Number of bits we accept when reading or writing MPIs.
/// The value is the same as gnupgs.
const MAX_EXTERN_MPI_BITS: u16 = 16384;

/// A multiprecision integer, stored big endian without leading zeros.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-3.2>
#[derive(Default, Clone, PartialEq, Eq, Zeroize, derive_more::Debug)]
pub struct Mpi(#[debug("{}", hex::encode(_0))] Vec<u8>);

impl Mpi {
    /// Parses a length-prefixed MPI from the given buffer.
    pub fn from_buf<B: Buf>(i: &mut B) -> Result<Self> {
        let len_bits = i.read_be_u16()?;

        if len_bits > MAX_EXTERN_MPI_BITS {
            return Err(Error::InvalidInput);
        }

        let len_bytes = (usize::from(len_bits) + 7) >> 3;
        let n = i.read_take(len_bytes)?;

        Ok(Mpi(strip_leading_zeros(&n).to_vec()))
    }

    /// Represent the data in `raw` as an Mpi.
    /// Note that `raw` is not expected to be length-prefixed!
    pub fn from_slice(raw: &[u8]) -> Self {
        Mpi(strip_leading_zeros(raw).to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of significant bits.
    pub fn bit_size(&self) -> usize {
        bit_size(&self.0)
    }

    /// Left pads the value with zeros to `size` bytes.
    pub fn to_padded(&self, size: usize) -> Result<Vec<u8>> {
        if self.0.len() > size {
            return Err(Error::InvalidKeyLength);
        }
        let mut out = vec![0u8; size - self.0.len()];
        out.extend_from_slice(&self.0);
        Ok(out)
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

/// Returns the bit length of a given slice.
#[inline]
fn bit_size(val: &[u8]) -> usize {
    if val.is_empty() {
        0
    } else {
        (val.len() * 8) - val[0].leading_zeros() as usize
    }
}

#[inline]
pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    bytes
        .iter()
        .position(|b| b != &0)
        .map_or(&[], |offset| &bytes[offset..])
}

impl AsRef<[u8]> for Mpi {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Mpi {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_u16::<BigEndian>(bit_size(&self.0) as u16)?;
        w.write_all(&self.0)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        2 + self.0.len()
    }
}

impl From<BigUint> for Mpi {
    fn from(other: BigUint) -> Self {
        Mpi::from_slice(&other.to_bytes_be())
    }
}

impl From<&BigUint> for Mpi {
    fn from(other: &BigUint) -> Self {
        Mpi::from_slice(&other.to_bytes_be())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_mpi() {
        // Decode the number `511` (`0x1FF` in hex).
        assert_eq!(
            Mpi::from_buf(&mut &[0x00, 0x09, 0x01, 0xFF][..]).unwrap(),
            Mpi::from_slice(&[0x01, 0xFF][..])
        );

        // Leading zero octets are not significant.
        let mpi = Mpi::from_buf(&mut &[0x00, 0x10, 0x00, 0x05][..]).unwrap();
        assert_eq!(mpi.as_bytes(), &[0x05]);
        assert_eq!(mpi.to_bytes().unwrap(), vec![0x00, 0x03, 0x05]);
    }

    #[test]
    fn test_mpi_too_long() {
        assert!(Mpi::from_buf(&mut &[0xFF, 0xFF, 0x01][..]).is_err());
    }

    #[test]
    fn test_padded() {
        let mpi = Mpi::from_slice(&[0x00, 0x01, 0x02]);
        assert_eq!(mpi.to_padded(4).unwrap(), vec![0, 0, 1, 2]);
        assert!(mpi.to_padded(1).is_err());
    }

    proptest! {
        #[test]
        fn mpi_write_len(v in proptest::collection::vec(any::<u8>(), 1..300)) {
            let mpi = Mpi::from_slice(&v);
            let buf = mpi.to_bytes()?;
            prop_assert_eq!(buf.len(), mpi.write_len());
            let back = Mpi::from_buf(&mut &buf[..])?;
            prop_assert_eq!(back, mpi);
        }
    }
}
