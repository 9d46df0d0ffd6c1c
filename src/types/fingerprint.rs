use crate::errors::{bail, Result};
use crate::types::{KeyId, KeyVersion};

/// Represents a key fingerprint.
#[derive(Clone, Eq, PartialEq, Hash, derive_more::Debug)]
pub enum Fingerprint {
    /// MD5 over the RSA modulus and exponent of a v2 or v3 key.
    #[debug("V3({})", hex::encode(_0))]
    V3([u8; 16]),
    /// SHA-1 over the framed key packet body of a v4 key.
    #[debug("V4({})", hex::encode(_0))]
    V4([u8; 20]),
}

impl Fingerprint {
    /// Constructs a fingerprint from its raw bytes, for the given key version.
    pub fn new(version: KeyVersion, fp: &[u8]) -> Result<Self> {
        let fp = match version {
            KeyVersion::V2 | KeyVersion::V3 => Fingerprint::V3(fp.try_into().map_err(|_| {
                crate::format_err!("invalid v3 fingerprint length {}", fp.len())
            })?),
            KeyVersion::V4 => Fingerprint::V4(fp.try_into().map_err(|_| {
                crate::format_err!("invalid v4 fingerprint length {}", fp.len())
            })?),
            KeyVersion::Other(v) => bail!("unsupported key version {}", v),
        };

        Ok(fp)
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn version(&self) -> KeyVersion {
        match self {
            Fingerprint::V3(_) => KeyVersion::V3,
            Fingerprint::V4(_) => KeyVersion::V4,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Fingerprint::V3(fp) => &fp[..],
            Fingerprint::V4(fp) => &fp[..],
        }
    }

    /// The key id carried in the low 64 bits. Only meaningful for v4 keys.
    pub fn low_key_id(&self) -> KeyId {
        KeyId::from_low_bytes(self.as_bytes())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.as_bytes()))
    }
}

impl std::fmt::UpperHex for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode_upper(self.as_bytes()))
    }
}
