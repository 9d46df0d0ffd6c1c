use std::collections::HashMap;
use std::io::{self, BufRead};
use std::sync::Arc;

use log::{debug, warn};

use crate::composed::{Object, ObjectFactory, PublicKey, PublicKeyRing, SecretKey, SecretKeyRing};
use crate::errors::{Error, Result};
use crate::packet::UserId;
use crate::ser::Serialize;
use crate::types::KeyId;

/// A ring that can live in a [KeyRingCollection].
pub trait KeyRing: Serialize + Clone + Sized {
    type Key;

    fn master_key_id(&self) -> KeyId;

    fn contains_key(&self, key_id: KeyId) -> bool;

    fn get_key(&self, key_id: KeyId) -> Option<&Self::Key>;

    /// User ids of the primary key.
    fn user_ids(&self) -> Vec<&UserId>;

    /// Unwraps a ring from a decoded object, handing back anything else.
    fn from_object(object: Object) -> std::result::Result<Self, Object>;
}

impl KeyRing for PublicKeyRing {
    type Key = PublicKey;

    fn master_key_id(&self) -> KeyId {
        self.get_public_key().key_id()
    }

    fn contains_key(&self, key_id: KeyId) -> bool {
        PublicKeyRing::contains_key(self, key_id)
    }

    fn get_key(&self, key_id: KeyId) -> Option<&PublicKey> {
        self.get_public_key_by_id(key_id)
    }

    fn user_ids(&self) -> Vec<&UserId> {
        self.get_public_key().user_ids().collect()
    }

    fn from_object(object: Object) -> std::result::Result<Self, Object> {
        match object {
            Object::PublicKeyRing(ring) => Ok(ring),
            other => Err(other),
        }
    }
}

impl KeyRing for SecretKeyRing {
    type Key = SecretKey;

    fn master_key_id(&self) -> KeyId {
        self.get_secret_key().key_id()
    }

    fn contains_key(&self, key_id: KeyId) -> bool {
        self.get_secret_key_by_id(key_id).is_some()
    }

    fn get_key(&self, key_id: KeyId) -> Option<&SecretKey> {
        self.get_secret_key_by_id(key_id)
    }

    fn user_ids(&self) -> Vec<&UserId> {
        self.get_public_key().user_ids().collect()
    }

    fn from_object(object: Object) -> std::result::Result<Self, Object> {
        match object {
            Object::SecretKeyRing(ring) => Ok(ring),
            other => Err(other),
        }
    }
}

/// Key rings indexed by their master key id, in insertion order.
///
/// Adding or removing a ring returns a new collection. Rings are shared between the
/// old and the new collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRingCollection<T> {
    rings: HashMap<KeyId, Arc<T>>,
    order: Vec<KeyId>,
}

pub type PublicKeyRingCollection = KeyRingCollection<PublicKeyRing>;
pub type SecretKeyRingCollection = KeyRingCollection<SecretKeyRing>;

impl<T> Default for KeyRingCollection<T> {
    fn default() -> Self {
        KeyRingCollection {
            rings: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: KeyRing> KeyRingCollection<T> {
    /// Fails with [Error::DuplicateKey] if two rings share a master key id.
    pub fn new(rings: Vec<T>) -> Result<Self> {
        let mut collection = KeyRingCollection::default();
        for ring in rings {
            collection.insert(Arc::new(ring))?;
        }
        Ok(collection)
    }

    /// Reads all rings from a packet stream. Objects other than rings of this kind are
    /// skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::from_objects(ObjectFactory::new(reader))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    pub fn from_objects(objects: impl IntoIterator<Item = Result<Object>>) -> Result<Self> {
        let mut collection = KeyRingCollection::default();
        for object in objects {
            match T::from_object(object?) {
                Ok(ring) => collection.insert(Arc::new(ring))?,
                Err(Object::Marker(_)) => {}
                Err(other) => warn!("ignoring {:?} object in key ring stream", other.tag()),
            }
        }
        debug!("read {} key rings", collection.len());
        Ok(collection)
    }

    fn insert(&mut self, ring: Arc<T>) -> Result<()> {
        let key_id = ring.master_key_id();
        if self.rings.contains_key(&key_id) {
            return Err(Error::DuplicateKey { key_id });
        }
        self.rings.insert(key_id, ring);
        self.order.push(key_id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Rings in insertion order.
    pub fn rings(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.rings.get(id).map(|r| r.as_ref()))
    }

    /// Finds the ring holding `key_id`, as its master key or as a subkey.
    pub fn get_ring(&self, key_id: KeyId) -> Option<&T> {
        if let Some(ring) = self.rings.get(&key_id) {
            return Some(ring.as_ref());
        }
        self.rings().find(|ring| ring.contains_key(key_id))
    }

    pub fn get_key(&self, key_id: KeyId) -> Option<&T::Key> {
        self.get_ring(key_id)?.get_key(key_id)
    }

    pub fn contains(&self, key_id: KeyId) -> bool {
        self.get_ring(key_id).is_some()
    }

    /// Rings whose primary key carries a matching user id.
    ///
    /// With `match_partial` the given id may appear anywhere in the user id.
    pub fn rings_for_user_id(
        &self,
        user_id: &str,
        match_partial: bool,
        ignore_case: bool,
    ) -> Vec<&T> {
        let needle = if ignore_case {
            user_id.to_lowercase()
        } else {
            user_id.to_string()
        };
        self.rings()
            .filter(|ring| {
                ring.user_ids().into_iter().any(|id| {
                    let id = String::from_utf8_lossy(id.id());
                    let id = if ignore_case {
                        id.to_lowercase()
                    } else {
                        id.into_owned()
                    };
                    if match_partial {
                        id.contains(&needle)
                    } else {
                        id == needle
                    }
                })
            })
            .collect()
    }

    /// Returns a copy with `ring` appended.
    pub fn add_ring(&self, ring: T) -> Result<Self> {
        let mut collection = self.clone();
        collection.insert(Arc::new(ring))?;
        Ok(collection)
    }

    /// Returns a copy without the ring whose master key is `key_id`.
    pub fn remove_ring(&self, key_id: KeyId) -> Result<Self> {
        if !self.rings.contains_key(&key_id) {
            return Err(Error::KeyNotFound { key_id });
        }
        let mut collection = self.clone();
        collection.rings.remove(&key_id);
        collection.order.retain(|id| *id != key_id);
        Ok(collection)
    }
}

impl<T: KeyRing> Serialize for KeyRingCollection<T> {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        for ring in self.rings() {
            ring.to_writer(writer)?;
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.rings().map(|ring| ring.write_len()).sum()
    }
}

impl<T: KeyRing> KeyRingCollection<T> {
    pub fn encode<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.to_writer(writer)
    }

    pub fn get_encoded(&self) -> Result<Vec<u8>> {
        self.to_bytes()
    }
}
