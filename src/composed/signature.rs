use std::io::{self, BufRead};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::composed::PublicKey;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{format_bail, Result};
use crate::normalize_lines::CanonicalText;
use crate::operator::{ContentVerifier, ContentVerifierBuilderProvider};
use crate::packet::signature::preamble;
use crate::packet::{
    write_packet, OnePassSignature, Packet, PacketReader, PacketTrait, SignatureBytes,
    SignaturePacket, SignatureType, SignatureVersion, SubpacketVector, Trust, UserAttribute,
    UserId,
};
use crate::ser::Serialize;
use crate::types::{KeyId, Tag};

/// A signature packet, together with the trust packet that followed it in a key ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    packet: SignaturePacket,
    trust: Option<Trust>,
}

impl From<SignaturePacket> for Signature {
    fn from(packet: SignaturePacket) -> Self {
        Signature::new(packet)
    }
}

impl Signature {
    pub fn new(packet: SignaturePacket) -> Self {
        Signature {
            packet,
            trust: None,
        }
    }

    pub fn with_trust(packet: SignaturePacket, trust: Option<Trust>) -> Self {
        Signature { packet, trust }
    }

    pub fn packet(&self) -> &SignaturePacket {
        &self.packet
    }

    pub fn trust(&self) -> Option<&Trust> {
        self.trust.as_ref()
    }

    pub fn version(&self) -> SignatureVersion {
        self.packet.version()
    }

    pub fn signature_type(&self) -> SignatureType {
        self.packet.typ()
    }

    pub fn key_algorithm(&self) -> PublicKeyAlgorithm {
        self.packet.pub_alg()
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.packet.hash_alg()
    }

    /// Issuer of the signature, from the v3 key id field or the issuer subpackets.
    pub fn key_id(&self) -> Option<KeyId> {
        self.packet.issuer()
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.packet.created()
    }

    pub fn hashed_subpackets(&self) -> &SubpacketVector {
        self.packet.hashed_subpackets()
    }

    pub fn unhashed_subpackets(&self) -> &SubpacketVector {
        self.packet.unhashed_subpackets()
    }

    pub fn digest_prefix(&self) -> [u8; 2] {
        self.packet.digest_prefix()
    }

    pub fn signature_bytes(&self) -> &SignatureBytes {
        self.packet.signature()
    }

    pub fn is_certification(&self) -> bool {
        self.packet.is_certification()
    }

    pub fn has_subpackets(&self) -> bool {
        self.packet.has_subpackets()
    }

    /// The octets hashed after the signed content.
    pub fn signature_trailer(&self) -> Result<Vec<u8>> {
        self.packet.config().trailer()
    }

    /// Sets up a verifier for document signatures made by `key`.
    ///
    /// Text signatures are checked over the canonical form of the data.
    pub fn verifier(
        &self,
        provider: &dyn ContentVerifierBuilderProvider,
        key: &PublicKey,
    ) -> Result<SignatureVerifier<'_>> {
        Ok(SignatureVerifier {
            signature: self,
            inner: HashingVerifier::new(
                provider,
                key,
                self.key_algorithm(),
                self.hash_algorithm(),
                self.signature_type(),
            )?,
        })
    }

    /// Checks a certification of `id` on `key`, issued by `signer`.
    pub fn verify_certification_user_id(
        &self,
        provider: &dyn ContentVerifierBuilderProvider,
        signer: &PublicKey,
        key: &PublicKey,
        id: &UserId,
    ) -> Result<bool> {
        let pre = preamble::user_id(key.packet(), id, self.is_v4())?;
        self.verify_preamble(provider, signer, &pre)
    }

    /// Checks a certification of the attribute `attribute` on `key`, issued by `signer`.
    pub fn verify_certification_user_attribute(
        &self,
        provider: &dyn ContentVerifierBuilderProvider,
        signer: &PublicKey,
        key: &PublicKey,
        attribute: &UserAttribute,
    ) -> Result<bool> {
        let pre = preamble::user_attribute(key.packet(), attribute, self.is_v4())?;
        self.verify_preamble(provider, signer, &pre)
    }

    /// Checks a subkey binding, subkey revocation or primary key binding signature.
    ///
    /// `signer` is the master key for the first two and the subkey for the last.
    pub fn verify_certification_subkey(
        &self,
        provider: &dyn ContentVerifierBuilderProvider,
        signer: &PublicKey,
        master: &PublicKey,
        subkey: &PublicKey,
    ) -> Result<bool> {
        let pre = preamble::subkey_binding(master.packet(), subkey.packet())?;
        self.verify_preamble(provider, signer, &pre)
    }

    /// Checks a direct key or key revocation signature on `key`, issued by `signer`.
    pub fn verify_certification_key(
        &self,
        provider: &dyn ContentVerifierBuilderProvider,
        signer: &PublicKey,
        key: &PublicKey,
    ) -> Result<bool> {
        let pre = preamble::key(key.packet())?;
        self.verify_preamble(provider, signer, &pre)
    }

    fn is_v4(&self) -> bool {
        self.version() == SignatureVersion::V4
    }

    fn verify_preamble(
        &self,
        provider: &dyn ContentVerifierBuilderProvider,
        signer: &PublicKey,
        preamble: &[u8],
    ) -> Result<bool> {
        let mut verifier = provider
            .get(self.key_algorithm(), self.hash_algorithm())?
            .build(signer.packet())?;
        verifier.update(preamble);
        verifier.update(&self.signature_trailer()?);
        let ok = verifier.verify(self.digest_prefix(), self.signature_bytes())?;
        debug!(
            "{:?} signature by {} over {} preamble octets: {}",
            self.signature_type(),
            signer.key_id(),
            preamble.len(),
            ok
        );
        Ok(ok)
    }

    /// Reads a signature packet and the trust packet following it, if any.
    ///
    /// Signatures of unsupported versions come back as `None`.
    pub(crate) fn from_packet_reader<R: BufRead>(
        reader: &mut PacketReader<R>,
    ) -> Result<Option<Self>> {
        let packet = match reader.read_packet()? {
            Some(Packet::Signature(packet)) => Some(packet),
            Some(Packet::Raw(raw)) if raw.tag() == Tag::Signature => {
                warn!("skipping signature of unsupported version");
                None
            }
            Some(other) => format_bail!("expected a signature packet, found {:?}", other.tag()),
            None => format_bail!("expected a signature packet, found end of stream"),
        };
        let trust = read_trust(reader)?;

        Ok(packet.map(|packet| Signature::with_trust(packet, trust)))
    }
}

impl Serialize for Signature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        write_packet(writer, &self.packet)?;
        if let Some(trust) = &self.trust {
            write_packet(writer, trust)?;
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.packet.write_len_with_header()
            + self.trust.as_ref().map_or(0, |t| t.write_len_with_header())
    }
}

super::impl_encode!(Signature);

/// Reads an optional trust packet.
pub(crate) fn read_trust<R: BufRead>(reader: &mut PacketReader<R>) -> Result<Option<Trust>> {
    if reader.next_tag()? != Some(Tag::Trust) {
        return Ok(None);
    }
    match reader.read_packet()? {
        Some(Packet::Trust(trust)) => Ok(Some(trust)),
        other => format_bail!(
            "expected a trust packet, found {:?}",
            other.map(|p| p.tag())
        ),
    }
}

/// Reads `(signature, trust?)` pairs for as long as signature packets follow.
pub(crate) fn read_signatures<R: BufRead>(reader: &mut PacketReader<R>) -> Result<Vec<Signature>> {
    let mut sigs = Vec::new();
    while reader.next_tag()? == Some(Tag::Signature) {
        if let Some(sig) = Signature::from_packet_reader(reader)? {
            sigs.push(sig);
        }
    }
    Ok(sigs)
}

/// Digest state shared by detached and one-pass verification.
struct HashingVerifier {
    verifier: Box<dyn ContentVerifier>,
    text: Option<CanonicalText>,
}

impl HashingVerifier {
    fn new(
        provider: &dyn ContentVerifierBuilderProvider,
        key: &PublicKey,
        key_algorithm: PublicKeyAlgorithm,
        hash_algorithm: HashAlgorithm,
        typ: SignatureType,
    ) -> Result<Self> {
        let verifier = provider
            .get(key_algorithm, hash_algorithm)?
            .build(key.packet())?;
        Ok(HashingVerifier {
            verifier,
            text: (typ == SignatureType::Text).then(CanonicalText::new),
        })
    }

    fn update(&mut self, data: &[u8]) {
        let verifier = &mut self.verifier;
        match &mut self.text {
            Some(text) => text.update(data, |chunk| verifier.update(chunk)),
            None => verifier.update(data),
        }
    }

    fn verify(mut self, signature: &Signature) -> Result<bool> {
        self.verifier.update(&signature.signature_trailer()?);
        self.verifier
            .verify(signature.digest_prefix(), signature.signature_bytes())
    }
}

/// Verifies a document signature over data fed through [SignatureVerifier::update].
pub struct SignatureVerifier<'a> {
    signature: &'a Signature,
    inner: HashingVerifier,
}

impl std::fmt::Debug for SignatureVerifier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("signature", &self.signature)
            .finish()
    }
}

impl SignatureVerifier<'_> {
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn verify(self) -> Result<bool> {
        self.inner.verify(self.signature)
    }
}

impl io::Write for SignatureVerifier<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hashes the data announced by a one-pass signature packet, to be checked against
/// the signature packet that follows it.
pub struct OnePassSignatureVerifier {
    ops: OnePassSignature,
    inner: HashingVerifier,
}

impl std::fmt::Debug for OnePassSignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnePassSignatureVerifier")
            .field("ops", &self.ops)
            .finish()
    }
}

impl OnePassSignatureVerifier {
    pub fn new(
        ops: &OnePassSignature,
        provider: &dyn ContentVerifierBuilderProvider,
        key: &PublicKey,
    ) -> Result<Self> {
        Ok(OnePassSignatureVerifier {
            ops: ops.clone(),
            inner: HashingVerifier::new(
                provider,
                key,
                ops.pub_algorithm(),
                ops.hash_algorithm(),
                ops.typ(),
            )?,
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Checks `signature`, which must be the one announced by the one-pass packet.
    pub fn verify(self, signature: &Signature) -> Result<bool> {
        if signature.signature_type() != self.ops.typ()
            || signature.hash_algorithm() != self.ops.hash_algorithm()
            || signature.key_id().is_some_and(|id| id != self.ops.key_id())
        {
            debug!("signature does not match its one-pass packet {:?}", self.ops);
            return Ok(false);
        }
        self.inner.verify(signature)
    }
}

impl io::Write for OnePassSignatureVerifier {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A run of consecutive signature packets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureList(Vec<Signature>);

impl SignatureList {
    pub fn new(sigs: Vec<Signature>) -> Self {
        SignatureList(sigs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Signature> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Signature> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<Signature> {
        self.0
    }

    /// Reads signature packets for as long as they follow each other.
    pub fn from_packet_reader<R: BufRead>(reader: &mut PacketReader<R>) -> Result<Self> {
        Ok(SignatureList(read_signatures(reader)?))
    }
}

impl<'a> IntoIterator for &'a SignatureList {
    type Item = &'a Signature;
    type IntoIter = std::slice::Iter<'a, Signature>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for SignatureList {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.0.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.0.write_len()
    }
}

super::impl_encode!(SignatureList);

/// A run of consecutive one-pass signature packets.
///
/// The signatures that close them come in reverse order, the last one-pass packet
/// pairs with the first signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OnePassSignatureList(Vec<OnePassSignature>);

impl OnePassSignatureList {
    pub fn new(ops: Vec<OnePassSignature>) -> Self {
        OnePassSignatureList(ops)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&OnePassSignature> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OnePassSignature> {
        self.0.iter()
    }

    pub fn from_packet_reader<R: BufRead>(reader: &mut PacketReader<R>) -> Result<Self> {
        let mut list = Vec::new();
        while reader.next_tag()? == Some(Tag::OnePassSignature) {
            match reader.read_packet()? {
                Some(Packet::OnePassSignature(ops)) => list.push(ops),
                Some(Packet::Raw(_)) => warn!("skipping one-pass signature of unsupported version"),
                other => format_bail!(
                    "expected a one-pass signature packet, found {:?}",
                    other.map(|p| p.tag())
                ),
            }
        }
        Ok(OnePassSignatureList(list))
    }
}

impl Serialize for OnePassSignatureList {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        for ops in &self.0 {
            write_packet(writer, ops)?;
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.0.iter().map(|ops| ops.write_len_with_header()).sum()
    }
}

super::impl_encode!(OnePassSignatureList);
