use std::io;

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{unsupported_err, Result};
use crate::parsing::BufParsing;
use crate::ser::Serialize;

const EXPBIAS: u32 = 6;

/// Coded iteration count used for newly protected keys and messages (65536 octets).
pub const DEFAULT_ITER_COUNT: u8 = 0x60;

/// String-to-key specifiers, deriving symmetric keys from passphrases.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-3.7>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum StringToKey {
    Simple {
        hash: HashAlgorithm,
    },
    Salted {
        hash: HashAlgorithm,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; 8],
    },
    IteratedAndSalted {
        hash: HashAlgorithm,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; 8],
        count: u8,
    },
    /// GnuPG extension (type 101) for keys whose secret part is absent or on a card.
    GnuDummy {
        hash: HashAlgorithm,
        mode: u8,
        #[debug("{}", hex::encode(serial))]
        serial: Bytes,
    },
}

impl StringToKey {
    /// Iterated and salted S2K with a fresh random salt.
    pub fn new_iterated<R: CryptoRng + Rng>(mut rng: R, hash: HashAlgorithm, count: u8) -> Self {
        let mut salt = [0u8; 8];
        rng.fill(&mut salt);

        StringToKey::IteratedAndSalted { hash, salt, count }
    }

    /// Salted S2K with a fresh random salt.
    pub fn new_salted<R: CryptoRng + Rng>(mut rng: R, hash: HashAlgorithm) -> Self {
        let mut salt = [0u8; 8];
        rng.fill(&mut salt);

        StringToKey::Salted { hash, salt }
    }

    pub fn from_buf<B: Buf>(i: &mut B) -> Result<Self> {
        let typ = i.read_u8()?;
        let hash = HashAlgorithm::from(i.read_u8()?);
        let s2k = match typ {
            0 => StringToKey::Simple { hash },
            1 => StringToKey::Salted {
                hash,
                salt: i.read_array::<8>()?,
            },
            3 => StringToKey::IteratedAndSalted {
                hash,
                salt: i.read_array::<8>()?,
                count: i.read_u8()?,
            },
            101 => {
                i.read_tag(b"GNU")?;
                let mode = i.read_u8()?;
                let serial = if mode == 2 {
                    let len = i.read_u8()?;
                    i.read_take(usize::from(len))?
                } else {
                    Bytes::new()
                };
                StringToKey::GnuDummy { hash, mode, serial }
            }
            _ => unsupported_err!("string to key type {}", typ),
        };

        Ok(s2k)
    }

    pub fn typ(&self) -> u8 {
        match self {
            StringToKey::Simple { .. } => 0,
            StringToKey::Salted { .. } => 1,
            StringToKey::IteratedAndSalted { .. } => 3,
            StringToKey::GnuDummy { .. } => 101,
        }
    }

    pub fn hash(&self) -> HashAlgorithm {
        match self {
            StringToKey::Simple { hash }
            | StringToKey::Salted { hash, .. }
            | StringToKey::IteratedAndSalted { hash, .. }
            | StringToKey::GnuDummy { hash, .. } => *hash,
        }
    }

    /// True if the key carrying this specifier has no secret material.
    pub fn is_gnu_dummy(&self) -> bool {
        matches!(self, StringToKey::GnuDummy { .. })
    }

    /// Converts a coded count into the count.
    /// Ref: <https://tools.ietf.org/html/rfc4880#section-3.7.1.3>
    pub fn count(&self) -> Option<usize> {
        match self {
            StringToKey::IteratedAndSalted { count, .. } => Some(decode_count(*count)),
            _ => None,
        }
    }

    /// Derives a key of `key_size` octets from the passphrase.
    pub fn derive_key(&self, passphrase: &[u8], key_size: usize) -> Result<Zeroizing<Vec<u8>>> {
        let digest_size = match self.hash().digest_size() {
            Some(size) => size,
            None => unsupported_err!("s2k hash {:?}", self.hash()),
        };
        let rounds = key_size.div_ceil(digest_size);
        debug!("s2k {} rounds with {:?}", rounds, self.hash());

        let mut key = Zeroizing::new(Vec::with_capacity(rounds * digest_size));
        for round in 0..rounds {
            let mut hasher = self.hash().new_hasher()?;
            // each further round is preloaded with one more zero octet
            hasher.update(&vec![0u8; round]);

            match self {
                StringToKey::Simple { .. } => hasher.update(passphrase),
                StringToKey::Salted { salt, .. } => {
                    hasher.update(salt);
                    hasher.update(passphrase);
                }
                StringToKey::IteratedAndSalted { salt, count, .. } => {
                    let mut data = Zeroizing::new(Vec::with_capacity(8 + passphrase.len()));
                    data.extend_from_slice(salt);
                    data.extend_from_slice(passphrase);

                    // the whole salt and passphrase are hashed at least once
                    let count = decode_count(*count).max(data.len());
                    for _ in 0..count / data.len() {
                        hasher.update(&data);
                    }
                    hasher.update(&data[..count % data.len()]);
                }
                StringToKey::GnuDummy { .. } => {
                    unsupported_err!("gnu dummy s2k does not derive keys")
                }
            }

            key.extend_from_slice(&hasher.finalize());
        }
        key.truncate(key_size);

        Ok(key)
    }
}

#[inline]
fn decode_count(c: u8) -> usize {
    ((16u32 + u32::from(c & 15)) << (u32::from(c >> 4) + EXPBIAS)) as usize
}

impl Serialize for StringToKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.typ())?;
        writer.write_u8(self.hash().into())?;
        match self {
            StringToKey::Simple { .. } => {}
            StringToKey::Salted { salt, .. } => writer.write_all(salt)?,
            StringToKey::IteratedAndSalted { salt, count, .. } => {
                writer.write_all(salt)?;
                writer.write_u8(*count)?;
            }
            StringToKey::GnuDummy { mode, serial, .. } => {
                writer.write_all(b"GNU")?;
                writer.write_u8(*mode)?;
                if *mode == 2 {
                    writer.write_u8(serial.len().try_into()?)?;
                    writer.write_all(serial)?;
                }
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        2 + match self {
            StringToKey::Simple { .. } => 0,
            StringToKey::Salted { .. } => 8,
            StringToKey::IteratedAndSalted { .. } => 9,
            StringToKey::GnuDummy { mode, serial, .. } => {
                4 + if *mode == 2 { 1 + serial.len() } else { 0 }
            }
        }
    }
}
