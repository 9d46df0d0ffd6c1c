use std::io;

use chrono::{DateTime, Utc};
use log::debug;

use crate::composed::Signature;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{ensure_eq, Result};
use crate::operator::KeyFingerprintCalculator;
use crate::packet::signature::preamble;
use crate::packet::{
    write_packet, PacketTrait, PublicKeyPacket, SignatureType, Trust, UserAttribute, UserId,
};
use crate::ser::Serialize;
use crate::types::{Fingerprint, KeyId, KeyVersion};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Certification classes consulted for the expiration of a primary key, most trusted first.
const MASTER_KEY_CERTIFICATION_TYPES: [SignatureType; 4] = [
    SignatureType::CertPositive,
    SignatureType::CertCasual,
    SignatureType::CertPersona,
    SignatureType::CertGeneric,
];

/// A user id or user attribute packet heading a group of certifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdentity {
    UserId(UserId),
    UserAttribute(UserAttribute),
}

impl UserIdentity {
    pub fn as_user_id(&self) -> Option<&UserId> {
        match self {
            UserIdentity::UserId(id) => Some(id),
            UserIdentity::UserAttribute(_) => None,
        }
    }

    pub fn as_user_attribute(&self) -> Option<&UserAttribute> {
        match self {
            UserIdentity::UserId(_) => None,
            UserIdentity::UserAttribute(attr) => Some(attr),
        }
    }

    /// Compares the identity content, ignoring how the packets were framed.
    pub fn matches(&self, other: &UserIdentity) -> bool {
        match (self, other) {
            (UserIdentity::UserId(a), UserIdentity::UserId(b)) => a.id() == b.id(),
            (UserIdentity::UserAttribute(a), UserIdentity::UserAttribute(b)) => {
                a.subpackets() == b.subpackets()
            }
            _ => false,
        }
    }
}

impl From<UserId> for UserIdentity {
    fn from(id: UserId) -> Self {
        UserIdentity::UserId(id)
    }
}

impl From<UserAttribute> for UserIdentity {
    fn from(attr: UserAttribute) -> Self {
        UserIdentity::UserAttribute(attr)
    }
}

impl Serialize for UserIdentity {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            UserIdentity::UserId(id) => write_packet(writer, id),
            UserIdentity::UserAttribute(attr) => write_packet(writer, attr),
        }
    }

    fn write_len(&self) -> usize {
        match self {
            UserIdentity::UserId(id) => id.write_len_with_header(),
            UserIdentity::UserAttribute(attr) => attr.write_len_with_header(),
        }
    }
}

/// A user id or attribute together with its trust packet and certifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    id: UserIdentity,
    trust: Option<Trust>,
    signatures: Vec<Signature>,
}

impl Identity {
    pub fn new(id: UserIdentity, trust: Option<Trust>, signatures: Vec<Signature>) -> Self {
        Identity {
            id,
            trust,
            signatures,
        }
    }

    pub fn id(&self) -> &UserIdentity {
        &self.id
    }

    pub fn trust(&self) -> Option<&Trust> {
        self.trust.as_ref()
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }
}

impl Serialize for Identity {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.id.to_writer(writer)?;
        if let Some(trust) = &self.trust {
            write_packet(writer, trust)?;
        }
        self.signatures.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.id.write_len()
            + self.trust.as_ref().map_or(0, |t| t.write_len_with_header())
            + self.signatures.write_len()
    }
}

/// A public key or subkey with everything attached to it in a key ring.
///
/// Values are never changed in place: adding or removing certifications returns a new
/// key, so rings holding the old value are unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    packet: PublicKeyPacket,
    fingerprint: Fingerprint,
    key_id: KeyId,
    trust: Option<Trust>,
    /// Direct key and key revocation signatures of a primary key.
    key_sigs: Vec<Signature>,
    ids: Vec<Identity>,
    /// Binding and revocation signatures, present only for subkeys.
    sub_sigs: Option<Vec<Signature>>,
}

impl PublicKey {
    /// Wraps a key packet, deriving fingerprint and key id once.
    pub fn new(packet: PublicKeyPacket, calculator: &dyn KeyFingerprintCalculator) -> Result<Self> {
        let fingerprint = calculator.fingerprint(&packet)?;
        let key_id = packet.key_id_for(&fingerprint);
        let sub_sigs = packet.is_subkey().then(Vec::new);
        debug!("public key {} ({:?})", key_id, packet.algorithm());

        Ok(PublicKey {
            packet,
            fingerprint,
            key_id,
            trust: None,
            key_sigs: Vec::new(),
            ids: Vec::new(),
            sub_sigs,
        })
    }

    /// Primary key as read from a ring.
    pub(crate) fn from_master_parts(
        key: PublicKey,
        trust: Option<Trust>,
        key_sigs: Vec<Signature>,
        ids: Vec<Identity>,
    ) -> Self {
        PublicKey {
            trust,
            key_sigs,
            ids,
            sub_sigs: None,
            ..key
        }
    }

    /// Subkey as read from a ring.
    pub(crate) fn from_subkey_parts(
        key: PublicKey,
        trust: Option<Trust>,
        sub_sigs: Vec<Signature>,
    ) -> Self {
        PublicKey {
            trust,
            sub_sigs: Some(sub_sigs),
            ..key
        }
    }

    /// Reframes the key as a primary key or a subkey.
    ///
    /// Signatures move between the direct and the binding lists, user ids only live on
    /// primary keys and are dropped from subkeys.
    pub(crate) fn with_subkey_framing(mut self, subkey: bool) -> Self {
        if subkey == !self.is_master_key() {
            return self;
        }
        self.packet = self.packet.with_subkey(subkey);
        if subkey {
            self.sub_sigs = Some(std::mem::take(&mut self.key_sigs));
            self.ids.clear();
        } else {
            self.key_sigs = self.sub_sigs.take().unwrap_or_default();
        }
        self
    }

    pub fn packet(&self) -> &PublicKeyPacket {
        &self.packet
    }

    pub fn version(&self) -> KeyVersion {
        self.packet.version()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.packet.created_at()
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.packet.algorithm()
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn bit_strength(&self) -> Option<usize> {
        self.packet.bit_strength()
    }

    pub fn is_master_key(&self) -> bool {
        self.sub_sigs.is_none()
    }

    pub fn is_encryption_key(&self) -> bool {
        self.packet.is_encryption_key()
    }

    pub fn trust(&self) -> Option<&Trust> {
        self.trust.as_ref()
    }

    /// Validity period in days, 0 means no expiry.
    ///
    /// For v4 keys this is [PublicKey::valid_seconds] rounded down, but never rounds a
    /// non zero period down to 0.
    pub fn valid_days(&self) -> u32 {
        match self.version() {
            KeyVersion::V2 | KeyVersion::V3 => u32::from(self.packet.expiration().unwrap_or(0)),
            _ => {
                let secs = self.valid_seconds();
                let days = u32::try_from(secs / SECONDS_PER_DAY).unwrap_or(u32::MAX);
                if days == 0 && secs > 0 {
                    1
                } else {
                    days
                }
            }
        }
    }

    /// Validity period in seconds from the creation time, 0 means no expiry.
    ///
    /// v4 primary keys take the key expiration time of the latest self certification,
    /// trying positive, casual, persona and generic certifications in that order before
    /// falling back to direct key signatures. Subkeys use their binding signatures.
    /// A key without any such signature is reported as not expiring.
    pub fn valid_seconds(&self) -> u64 {
        match self.version() {
            KeyVersion::V2 | KeyVersion::V3 => {
                u64::from(self.packet.expiration().unwrap_or(0)) * SECONDS_PER_DAY
            }
            _ => {
                let found = if self.is_master_key() {
                    MASTER_KEY_CERTIFICATION_TYPES
                        .iter()
                        .find_map(|typ| self.expiration_from_signatures(*typ, true))
                        .or_else(|| self.expiration_from_signatures(SignatureType::Key, true))
                } else {
                    self.expiration_from_signatures(SignatureType::SubkeyBinding, false)
                        .or_else(|| self.expiration_from_signatures(SignatureType::Key, false))
                };
                found.map(u64::from).unwrap_or(0)
            }
        }
    }

    fn expiration_from_signatures(&self, typ: SignatureType, self_signed: bool) -> Option<u32> {
        self.signatures_of_type(typ)
            .filter(|sig| !self_signed || sig.key_id() == Some(self.key_id))
            .filter_map(|sig| {
                sig.hashed_subpackets()
                    .key_expiration_time()
                    .map(|secs| (sig.creation_time(), secs))
            })
            .max_by_key(|(created, _)| *created)
            .map(|(_, secs)| secs)
    }

    /// True if a key revocation (primary keys) or subkey revocation (subkeys) is present.
    ///
    /// The signature itself is not checked.
    pub fn is_revoked(&self) -> bool {
        match &self.sub_sigs {
            None => self
                .key_sigs
                .iter()
                .any(|sig| sig.signature_type() == SignatureType::KeyRevocation),
            Some(sigs) => sigs
                .iter()
                .any(|sig| sig.signature_type() == SignatureType::SubkeyRevocation),
        }
    }

    /// Like [PublicKey::is_revoked], but primary keys only count revocations they issued
    /// themselves.
    pub fn has_revocation(&self) -> bool {
        match &self.sub_sigs {
            None => self.key_sigs.iter().any(|sig| {
                sig.signature_type() == SignatureType::KeyRevocation
                    && sig.key_id() == Some(self.key_id)
            }),
            Some(_) => self.is_revoked(),
        }
    }

    pub fn identities(&self) -> &[Identity] {
        &self.ids
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &UserId> {
        self.ids.iter().filter_map(|i| i.id.as_user_id())
    }

    pub fn user_attributes(&self) -> impl Iterator<Item = &UserAttribute> {
        self.ids.iter().filter_map(|i| i.id.as_user_attribute())
    }

    /// Every signature on the key: direct signatures, certifications, then bindings.
    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.key_sigs
            .iter()
            .chain(self.ids.iter().flat_map(|i| i.signatures.iter()))
            .chain(self.sub_sigs.iter().flatten())
    }

    pub fn signatures_of_type(&self, typ: SignatureType) -> impl Iterator<Item = &Signature> {
        self.signatures()
            .filter(move |sig| sig.signature_type() == typ)
    }

    /// Signatures directly on the key, the binding signatures for a subkey.
    pub fn key_signatures(&self) -> &[Signature] {
        self.sub_sigs.as_deref().unwrap_or(&self.key_sigs)
    }

    /// Certifications of `id`, `None` if the key carries no such user id.
    pub fn signatures_for_user_id(&self, id: &UserId) -> Option<&[Signature]> {
        self.identity(&UserIdentity::UserId(id.clone()))
            .map(|i| i.signatures())
    }

    pub fn signatures_for_user_attribute(&self, attribute: &UserAttribute) -> Option<&[Signature]> {
        self.identity(&UserIdentity::UserAttribute(attribute.clone()))
            .map(|i| i.signatures())
    }

    fn identity(&self, id: &UserIdentity) -> Option<&Identity> {
        self.ids.iter().find(|i| i.id.matches(id))
    }

    /// Returns a copy of the key with `signature` added to the certifications of `id`.
    pub fn add_certification_user_id(&self, id: &UserId, signature: Signature) -> PublicKey {
        self.add_certification_identity(UserIdentity::UserId(id.clone()), signature)
    }

    pub fn add_certification_user_attribute(
        &self,
        attribute: &UserAttribute,
        signature: Signature,
    ) -> PublicKey {
        self.add_certification_identity(UserIdentity::UserAttribute(attribute.clone()), signature)
    }

    fn add_certification_identity(&self, id: UserIdentity, signature: Signature) -> PublicKey {
        let mut key = self.clone();
        match key.ids.iter_mut().find(|i| i.id.matches(&id)) {
            Some(identity) => identity.signatures.push(signature),
            None => key.ids.push(Identity::new(id, None, vec![signature])),
        }
        key
    }

    /// Returns a copy of the key with a direct signature added, a binding signature
    /// for subkeys.
    pub fn add_certification(&self, signature: Signature) -> PublicKey {
        let mut key = self.clone();
        match &mut key.sub_sigs {
            Some(sigs) => sigs.push(signature),
            None => key.key_sigs.push(signature),
        }
        key
    }

    /// Returns a copy of the key without `signature` among the certifications of `id`,
    /// or `None` if it is not there. The user id stays, even without certifications,
    /// [PublicKey::remove_user_id] drops it.
    pub fn remove_certification_user_id(
        &self,
        id: &UserId,
        signature: &Signature,
    ) -> Option<PublicKey> {
        self.remove_certification_identity(&UserIdentity::UserId(id.clone()), signature)
    }

    pub fn remove_certification_user_attribute(
        &self,
        attribute: &UserAttribute,
        signature: &Signature,
    ) -> Option<PublicKey> {
        self.remove_certification_identity(
            &UserIdentity::UserAttribute(attribute.clone()),
            signature,
        )
    }

    fn remove_certification_identity(
        &self,
        id: &UserIdentity,
        signature: &Signature,
    ) -> Option<PublicKey> {
        let index = self.ids.iter().position(|i| i.id.matches(id))?;
        let pos = self.ids[index]
            .signatures
            .iter()
            .position(|sig| sig == signature)?;

        let mut key = self.clone();
        key.ids[index].signatures.remove(pos);
        Some(key)
    }

    /// Returns a copy of the key without `id` and its certifications.
    pub fn remove_user_id(&self, id: &UserId) -> Option<PublicKey> {
        self.remove_identity(&UserIdentity::UserId(id.clone()))
    }

    pub fn remove_user_attribute(&self, attribute: &UserAttribute) -> Option<PublicKey> {
        self.remove_identity(&UserIdentity::UserAttribute(attribute.clone()))
    }

    fn remove_identity(&self, id: &UserIdentity) -> Option<PublicKey> {
        let index = self.ids.iter().position(|i| i.id.matches(id))?;
        let mut key = self.clone();
        key.ids.remove(index);
        Some(key)
    }

    /// Returns a copy of the key without `signature`, wherever it is attached.
    pub fn remove_certification(&self, signature: &Signature) -> Option<PublicKey> {
        let mut key = self.clone();
        if let Some(pos) = key.key_sigs.iter().position(|sig| sig == signature) {
            key.key_sigs.remove(pos);
            return Some(key);
        }
        if let Some(sigs) = &mut key.sub_sigs {
            if let Some(pos) = sigs.iter().position(|sig| sig == signature) {
                sigs.remove(pos);
                return Some(key);
            }
        }

        let (index, pos) = key.ids.iter().enumerate().find_map(|(index, identity)| {
            identity
                .signatures
                .iter()
                .position(|sig| sig == signature)
                .map(|pos| (index, pos))
        })?;
        key.ids[index].signatures.remove(pos);
        Some(key)
    }

    /// Merges two copies of the same key, keeping every signature either of them has.
    pub fn join(&self, other: &PublicKey) -> Result<PublicKey> {
        ensure_eq!(
            self.fingerprint,
            other.fingerprint,
            "can only join copies of the same key"
        );
        ensure_eq!(
            self.is_master_key(),
            other.is_master_key(),
            "can not join a primary key with a subkey"
        );

        let mut key = self.clone();
        if key.trust.is_none() {
            key.trust = other.trust.clone();
        }
        merge_signatures(&mut key.key_sigs, &other.key_sigs);
        if let (Some(ours), Some(theirs)) = (&mut key.sub_sigs, &other.sub_sigs) {
            merge_signatures(ours, theirs);
        }
        for identity in &other.ids {
            match key.ids.iter_mut().find(|i| i.id.matches(&identity.id)) {
                Some(ours) => merge_signatures(&mut ours.signatures, &identity.signatures),
                None => key.ids.push(identity.clone()),
            }
        }
        debug!("joined two copies of {}", key.key_id);

        Ok(key)
    }

    /// The octets a signature over this key hashes: `0x99`, length and packet body.
    pub fn encode_for_hashing(&self) -> Result<Vec<u8>> {
        preamble::key(&self.packet)
    }

    /// Writes everything following the key packet itself.
    pub(crate) fn certifications_to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        if let Some(trust) = &self.trust {
            write_packet(writer, trust)?;
        }
        self.key_sigs.to_writer(writer)?;
        self.ids.to_writer(writer)?;
        if let Some(sigs) = &self.sub_sigs {
            sigs.to_writer(writer)?;
        }
        Ok(())
    }

    pub(crate) fn certifications_write_len(&self) -> usize {
        self.trust.as_ref().map_or(0, |t| t.write_len_with_header())
            + self.key_sigs.write_len()
            + self.ids.write_len()
            + self.sub_sigs.as_ref().map_or(0, |sigs| sigs.write_len())
    }
}

fn merge_signatures(ours: &mut Vec<Signature>, theirs: &[Signature]) {
    for sig in theirs {
        if !ours.contains(sig) {
            ours.push(sig.clone());
        }
    }
}

impl Serialize for PublicKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        write_packet(writer, &self.packet)?;
        self.certifications_to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.packet.write_len_with_header() + self.certifications_write_len()
    }
}

super::impl_encode!(PublicKey);
