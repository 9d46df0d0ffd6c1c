use std::fmt;

use crate::errors::{ensure_eq, Result};

/// Represents a Key ID, the low 64 bits of a key's fingerprint (or RSA modulus for v3 keys).
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Default)]
pub struct KeyId([u8; 8]);

impl AsRef<[u8]> for KeyId {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl KeyId {
    pub const WILDCARD: KeyId = KeyId([0u8; 8]);

    pub fn from_slice(input: &[u8]) -> Result<KeyId> {
        ensure_eq!(input.len(), 8, "invalid input length");
        let mut r = [0u8; 8];
        r.copy_from_slice(input);

        Ok(KeyId(r))
    }

    /// Builds the id from the last eight bytes of `input`, zero padding shorter input on the left.
    pub(crate) fn from_low_bytes(input: &[u8]) -> KeyId {
        let mut r = [0u8; 8];
        let take = input.len().min(8);
        r[8 - take..].copy_from_slice(&input[input.len() - take..]);
        KeyId(r)
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<[u8; 8]> for KeyId {
    fn from(value: [u8; 8]) -> Self {
        KeyId(value)
    }
}

impl From<u64> for KeyId {
    fn from(value: u64) -> Self {
        KeyId(value.to_be_bytes())
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyId({})", hex::encode(self.as_ref()))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_low_bytes() {
        let id = KeyId::from_low_bytes(&[0xAA, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(id.as_u64(), 0x0102_0304_0506_0708);

        let id = KeyId::from_low_bytes(&[1, 2]);
        assert_eq!(id.as_u64(), 0x0102);
        assert_eq!(id.to_string(), "0000000000000102");
    }
}
