use std::io::{self, BufRead};

use log::{debug, warn};
use rand::{CryptoRng, Rng};

use crate::composed::signature::{read_signatures, read_trust};
use crate::composed::{Identity, PublicKey, SecretKey, UserIdentity};
use crate::errors::{bail, ensure, format_bail, unsupported_err, Result};
use crate::operator::{
    DigestFingerprintCalculator, KeyFingerprintCalculator, PbeSecretKeyDecryptor,
    PbeSecretKeyEncryptor,
};
use crate::packet::{Packet, PacketReader, PacketTrait};
use crate::ser::Serialize;
use crate::types::{KeyId, Tag};

/// Reads the user id and attribute groups following the direct signatures of a key.
fn read_identities<R: BufRead>(reader: &mut PacketReader<R>) -> Result<Vec<Identity>> {
    let mut ids = Vec::new();
    loop {
        let id = match reader.next_tag()? {
            Some(Tag::UserId | Tag::UserAttribute) => match reader.read_packet()? {
                Some(Packet::UserId(id)) => Some(UserIdentity::UserId(id)),
                Some(Packet::UserAttribute(attr)) => Some(UserIdentity::UserAttribute(attr)),
                Some(other) => {
                    warn!("skipping unreadable {:?} packet", other.tag());
                    None
                }
                None => break,
            },
            _ => break,
        };
        let trust = read_trust(reader)?;
        let sigs = read_signatures(reader)?;
        if let Some(id) = id {
            ids.push(Identity::new(id, trust, sigs));
        }
    }
    Ok(ids)
}

/// Reads a primary key's trust packet, direct signatures and identities.
fn read_master<R: BufRead>(reader: &mut PacketReader<R>, key: PublicKey) -> Result<PublicKey> {
    let trust = read_trust(reader)?;
    let key_sigs = read_signatures(reader)?;
    let ids = read_identities(reader)?;
    debug!(
        "ring master {}: {} direct signatures, {} identities",
        key.key_id(),
        key_sigs.len(),
        ids.len()
    );
    Ok(PublicKey::from_master_parts(key, trust, key_sigs, ids))
}

pub(crate) fn read_subkey<R: BufRead>(
    reader: &mut PacketReader<R>,
    key: PublicKey,
) -> Result<PublicKey> {
    let trust = read_trust(reader)?;
    let sigs = read_signatures(reader)?;
    Ok(PublicKey::from_subkey_parts(key, trust, sigs))
}

/// Skips a subkey of unsupported version with everything attached to it.
fn skip_subkey<R: BufRead>(reader: &mut PacketReader<R>, tag: Tag) -> Result<()> {
    warn!("skipping {:?} of unsupported version", tag);
    read_trust(reader)?;
    read_signatures(reader)?;
    Ok(())
}

/// A primary public key with its subkeys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRing {
    keys: Vec<PublicKey>,
}

impl PublicKeyRing {
    /// The first key must be the only primary key.
    pub fn new(keys: Vec<PublicKey>) -> Result<Self> {
        validate_keys(keys.iter().map(|k| k.is_master_key()))?;
        Ok(PublicKeyRing { keys })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(
            &mut PacketReader::new(bytes),
            &DigestFingerprintCalculator::default(),
        )
    }

    /// Reads a ring, starting at its public key packet and pulling packets for as long
    /// as they belong to the ring.
    pub fn from_reader<R: BufRead>(
        reader: &mut PacketReader<R>,
        calculator: &dyn KeyFingerprintCalculator,
    ) -> Result<Self> {
        let master = match reader.read_packet()? {
            Some(Packet::PublicKey(packet)) => PublicKey::new(packet, calculator)?,
            Some(Packet::Raw(raw)) if raw.tag() == Tag::PublicKey => {
                unsupported_err!("public key of unsupported version")
            }
            Some(other) => format_bail!(
                "public key ring must start with a public key, found {:?}",
                other.tag()
            ),
            None => format_bail!("public key ring must start with a public key, found nothing"),
        };
        let mut keys = vec![read_master(reader, master)?];

        while reader.next_tag()? == Some(Tag::PublicSubkey) {
            match reader.read_packet()? {
                Some(Packet::PublicSubkey(packet)) => {
                    let key = PublicKey::new(packet, calculator)?;
                    keys.push(read_subkey(reader, key)?);
                }
                _ => skip_subkey(reader, Tag::PublicSubkey)?,
            }
        }

        Ok(PublicKeyRing { keys })
    }

    /// The primary key.
    pub fn get_public_key(&self) -> &PublicKey {
        &self.keys[0]
    }

    pub fn get_public_key_by_id(&self, key_id: KeyId) -> Option<&PublicKey> {
        self.keys.iter().find(|k| k.key_id() == key_id)
    }

    pub fn public_keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn encryption_keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.keys.iter().filter(|k| k.is_encryption_key())
    }

    pub fn contains_key(&self, key_id: KeyId) -> bool {
        self.get_public_key_by_id(key_id).is_some()
    }

    /// Returns a copy with `key` added, or replacing the key with the same key id.
    ///
    /// Fails when adding a second primary key.
    pub fn insert_public_key(&self, key: PublicKey) -> Result<Self> {
        Ok(PublicKeyRing {
            keys: insert_key(&self.keys, key, |k| k.key_id(), |k| k.is_master_key())?,
        })
    }

    /// Returns a copy without the subkey `key_id`, `None` if there is no such subkey.
    pub fn remove_public_key(&self, key_id: KeyId) -> Option<Self> {
        Some(PublicKeyRing {
            keys: remove_key(&self.keys, key_id, |k| k.key_id())?,
        })
    }
}

impl Serialize for PublicKeyRing {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.keys.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.keys.write_len()
    }
}

super::impl_encode!(PublicKeyRing);

/// A primary secret key with its secret subkeys, plus subkeys only present as public keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKeyRing {
    keys: Vec<SecretKey>,
    extra_public_keys: Vec<PublicKey>,
}

impl SecretKeyRing {
    pub fn new(keys: Vec<SecretKey>, extra_public_keys: Vec<PublicKey>) -> Result<Self> {
        validate_keys(keys.iter().map(|k| k.is_master_key()))?;
        ensure!(
            extra_public_keys.iter().all(|k| !k.is_master_key()),
            "extra public keys must be subkeys"
        );
        Ok(SecretKeyRing {
            keys,
            extra_public_keys,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(
            &mut PacketReader::new(bytes),
            &DigestFingerprintCalculator::default(),
        )
    }

    /// Reads a ring starting at its secret key packet. Public subkeys found along the
    /// way are kept as extra public keys.
    pub fn from_reader<R: BufRead>(
        reader: &mut PacketReader<R>,
        calculator: &dyn KeyFingerprintCalculator,
    ) -> Result<Self> {
        let master = match reader.read_packet()? {
            Some(Packet::SecretKey(packet)) => {
                let public = PublicKey::new(packet.public_key().clone(), calculator)?;
                SecretKey::from_parts(packet, read_master(reader, public)?)
            }
            Some(Packet::Raw(raw)) if raw.tag() == Tag::SecretKey => {
                unsupported_err!("secret key of unsupported version")
            }
            Some(other) => format_bail!(
                "secret key ring must start with a secret key, found {:?}",
                other.tag()
            ),
            None => format_bail!("secret key ring must start with a secret key, found nothing"),
        };
        let mut keys = vec![master];
        let mut extra_public_keys = Vec::new();

        loop {
            match reader.next_tag()? {
                Some(tag @ Tag::SecretSubkey) => match reader.read_packet()? {
                    Some(Packet::SecretSubkey(packet)) => {
                        let public = PublicKey::new(packet.public_key().clone(), calculator)?;
                        keys.push(SecretKey::from_parts(packet, read_subkey(reader, public)?));
                    }
                    _ => skip_subkey(reader, tag)?,
                },
                Some(tag @ Tag::PublicSubkey) => match reader.read_packet()? {
                    Some(Packet::PublicSubkey(packet)) => {
                        let key = PublicKey::new(packet, calculator)?;
                        extra_public_keys.push(read_subkey(reader, key)?);
                    }
                    _ => skip_subkey(reader, tag)?,
                },
                _ => break,
            }
        }
        debug!(
            "secret ring {}: {} secret keys, {} extra public keys",
            keys[0].key_id(),
            keys.len(),
            extra_public_keys.len()
        );

        Ok(SecretKeyRing {
            keys,
            extra_public_keys,
        })
    }

    /// The primary secret key.
    pub fn get_secret_key(&self) -> &SecretKey {
        &self.keys[0]
    }

    pub fn get_secret_key_by_id(&self, key_id: KeyId) -> Option<&SecretKey> {
        self.keys.iter().find(|k| k.key_id() == key_id)
    }

    pub fn secret_keys(&self) -> &[SecretKey] {
        &self.keys
    }

    /// The public view of the primary key.
    pub fn get_public_key(&self) -> &PublicKey {
        self.keys[0].public_key()
    }

    /// Looks through the secret keys and the extra public keys.
    pub fn get_public_key_by_id(&self, key_id: KeyId) -> Option<&PublicKey> {
        self.public_keys().find(|k| k.key_id() == key_id)
    }

    /// Public views of all secret keys, followed by the extra public keys.
    pub fn public_keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.keys
            .iter()
            .map(|k| k.public_key())
            .chain(self.extra_public_keys.iter())
    }

    pub fn extra_public_keys(&self) -> &[PublicKey] {
        &self.extra_public_keys
    }

    pub fn contains_key(&self, key_id: KeyId) -> bool {
        self.get_public_key_by_id(key_id).is_some()
    }

    /// Returns a copy with `key` added, or replacing the secret key with the same key id.
    pub fn insert_secret_key(&self, key: SecretKey) -> Result<Self> {
        Ok(SecretKeyRing {
            keys: insert_key(&self.keys, key, |k| k.key_id(), |k| k.is_master_key())?,
            extra_public_keys: self.extra_public_keys.clone(),
        })
    }

    /// Returns a copy without the secret subkey `key_id`, `None` if there is none.
    pub fn remove_secret_key(&self, key_id: KeyId) -> Option<Self> {
        Some(SecretKeyRing {
            keys: remove_key(&self.keys, key_id, |k| k.key_id())?,
            extra_public_keys: self.extra_public_keys.clone(),
        })
    }

    /// Returns a copy with the public views taken from `ring` wherever it has the key,
    /// typically to pick up new certifications.
    pub fn replace_public_keys(&self, ring: &PublicKeyRing) -> Result<Self> {
        let keys = self
            .keys
            .iter()
            .map(|key| match ring.get_public_key_by_id(key.key_id()) {
                Some(public) => key.replace_public_key(public.clone()),
                None => Ok(key.clone()),
            })
            .collect::<Result<Vec<_>>>()?;
        let extra_public_keys = self
            .extra_public_keys
            .iter()
            .map(|key| {
                ring.get_public_key_by_id(key.key_id())
                    .unwrap_or(key)
                    .clone()
            })
            .collect();

        Ok(SecretKeyRing {
            keys,
            extra_public_keys,
        })
    }

    /// Returns a copy with every secret key re-protected under a new passphrase.
    pub fn copy_with_new_password<R: Rng + CryptoRng>(
        &self,
        rng: &mut R,
        old: Option<&dyn PbeSecretKeyDecryptor>,
        new: Option<&dyn PbeSecretKeyEncryptor>,
    ) -> Result<Self> {
        let keys = self
            .keys
            .iter()
            .map(|key| key.copy_with_new_password(&mut *rng, old, new))
            .collect::<Result<Vec<_>>>()?;

        Ok(SecretKeyRing {
            keys,
            extra_public_keys: self.extra_public_keys.clone(),
        })
    }

    /// The public ring matching this secret ring.
    pub fn to_public_ring(&self) -> PublicKeyRing {
        PublicKeyRing {
            keys: self.public_keys().cloned().collect(),
        }
    }
}

impl Serialize for SecretKeyRing {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.keys.to_writer(writer)?;
        self.extra_public_keys.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.keys.write_len() + self.extra_public_keys.write_len()
    }
}

super::impl_encode!(SecretKeyRing);

fn validate_keys(mut masters: impl Iterator<Item = bool>) -> Result<()> {
    match masters.next() {
        Some(true) => {}
        Some(false) => bail!("the first key of a ring must be a primary key"),
        None => bail!("a key ring needs at least one key"),
    }
    ensure!(
        masters.all(|master| !master),
        "a key ring holds exactly one primary key"
    );
    Ok(())
}

fn insert_key<K: Clone>(
    keys: &[K],
    key: K,
    key_id: impl Fn(&K) -> KeyId,
    is_master: impl Fn(&K) -> bool,
) -> Result<Vec<K>> {
    let mut keys = keys.to_vec();
    match keys.iter().position(|k| key_id(k) == key_id(&key)) {
        Some(pos) => {
            ensure!(
                is_master(&keys[pos]) == is_master(&key),
                "can not replace a primary key with a subkey or the other way around"
            );
            keys[pos] = key;
        }
        None => {
            ensure!(
                !is_master(&key),
                "can not add a primary key to a ring that already has one"
            );
            keys.push(key);
        }
    }
    Ok(keys)
}

fn remove_key<K: Clone>(keys: &[K], key_id: KeyId, id_of: impl Fn(&K) -> KeyId) -> Option<Vec<K>> {
    // the primary key at index 0 stays
    let pos = keys.iter().skip(1).position(|k| id_of(k) == key_id)? + 1;
    let mut keys = keys.to_vec();
    keys.remove(pos);
    Some(keys)
}
