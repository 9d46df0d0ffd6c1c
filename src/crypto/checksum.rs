use byteorder::{BigEndian, ByteOrder};
use sha1::{Digest, Sha1};

use crate::errors::{Error, Result};

/// Two octet checksum: sum of all octets mod 65536.
#[inline]
pub fn calculate_simple(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)))
}

/// Checks the two octet checksum in `actual` against `data`.
#[inline]
pub fn simple(actual: &[u8], data: &[u8]) -> Result<()> {
    if actual.len() != 2 || BigEndian::read_u16(actual) != calculate_simple(data) {
        return Err(Error::SecretKeyChecksum);
    }

    Ok(())
}

/// SHA1 checksum, first 20 octets.
#[inline]
pub fn calculate_sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// Checks the SHA1 checksum in `hash` against `data`.
#[inline]
pub fn sha1(hash: &[u8], data: &[u8]) -> Result<()> {
    if hash != &calculate_sha1(data)[..] {
        return Err(Error::SecretKeyChecksum);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_checksum() {
        assert_eq!(calculate_simple(&[0xFF; 300]), (300u32 * 0xFF % 65536) as u16);

        let data = [1u8, 2, 3];
        simple(&[0, 6], &data).unwrap();
        assert!(simple(&[0, 7], &data).unwrap_err().is_data_validation());
    }

    #[test]
    fn test_sha1_checksum() {
        let data = b"secret material";
        sha1(&calculate_sha1(data), data).unwrap();
        assert!(sha1(&[0u8; 20], data).is_err());
    }
}
