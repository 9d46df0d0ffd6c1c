use std::io::{self, BufRead, Read};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use log::{debug, warn};
use subtle::ConstantTimeEq;

use crate::composed::TruncatedLookahead;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{format_bail, format_err, state_err, Error, Result};
use crate::operator::{
    DataDecryptor, DigestCalculator, PbeDataDecryptorFactory, PublicKeyDataDecryptorFactory,
};
use crate::packet::{
    write_packet, Packet, PacketBodyReader, PacketReader, PacketTrait,
    PublicKeyEncryptedSessionKey, SymEncryptedData, SymEncryptedProtectedData,
    SymKeyEncryptedSessionKey, SEIPD_VERSION,
};
use crate::ser::Serialize;
use crate::types::{KeyId, SessionKey, Tag};

/// Header of the modification detection code packet inside the encrypted stream.
pub(crate) const MDC_HEADER: [u8; 2] = [0xD3, 0x14];

/// Length of the trailing modification detection code packet, header included.
pub(crate) const MDC_LEN: usize = 22;

/// The encrypted body, either legacy or integrity protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedData {
    Legacy(SymEncryptedData),
    Protected(SymEncryptedProtectedData),
}

impl EncryptedData {
    /// The ciphertext, prefix included, without the version octet of protected data.
    pub fn ciphertext(&self) -> &Bytes {
        match self {
            EncryptedData::Legacy(p) => p.data(),
            EncryptedData::Protected(p) => p.data(),
        }
    }

    pub fn is_integrity_protected(&self) -> bool {
        matches!(self, EncryptedData::Protected(_))
    }
}

impl Serialize for EncryptedData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            EncryptedData::Legacy(p) => write_packet(writer, p),
            EncryptedData::Protected(p) => write_packet(writer, p),
        }
    }

    fn write_len(&self) -> usize {
        match self {
            EncryptedData::Legacy(p) => p.write_len_with_header(),
            EncryptedData::Protected(p) => p.write_len_with_header(),
        }
    }
}

enum SessionKeyPacket {
    Pbe(SymKeyEncryptedSessionKey),
    PublicKey(PublicKeyEncryptedSessionKey),
}

/// One way of recovering the session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedDataMethod {
    Pbe(PbeEncryptedData),
    PublicKey(PublicKeyEncryptedData),
}

impl EncryptedDataMethod {
    pub fn as_pbe(&self) -> Option<&PbeEncryptedData> {
        match self {
            EncryptedDataMethod::Pbe(m) => Some(m),
            EncryptedDataMethod::PublicKey(_) => None,
        }
    }

    pub fn as_public_key(&self) -> Option<&PublicKeyEncryptedData> {
        match self {
            EncryptedDataMethod::PublicKey(m) => Some(m),
            EncryptedDataMethod::Pbe(_) => None,
        }
    }
}

/// The encrypted session key packets of a message, followed by the encrypted data they unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedDataList {
    methods: Vec<EncryptedDataMethod>,
    data: Arc<EncryptedData>,
}

/// Reads session key packets up to the first packet of another kind.
fn read_session_keys<R: BufRead>(reader: &mut PacketReader<R>) -> Result<Vec<SessionKeyPacket>> {
    let mut keys = Vec::new();

    loop {
        match reader.next_tag()? {
            Some(Tag::PublicKeyEncryptedSessionKey | Tag::SymKeyEncryptedSessionKey) => {
                match reader.read_packet()? {
                    Some(Packet::PublicKeyEncryptedSessionKey(p)) => {
                        keys.push(SessionKeyPacket::PublicKey(p))
                    }
                    Some(Packet::SymKeyEncryptedSessionKey(p)) => {
                        keys.push(SessionKeyPacket::Pbe(p))
                    }
                    Some(other) => warn!("skipping unreadable {:?} packet", other.tag()),
                    None => break,
                }
            }
            Some(Tag::Marker) => {
                reader.skip_packet()?;
            }
            _ => break,
        }
    }

    Ok(keys)
}

/// Derives the passphrase key and unwraps the session key with it.
fn pbe_session_key(
    packet: &SymKeyEncryptedSessionKey,
    factory: &dyn PbeDataDecryptorFactory,
) -> Result<SessionKey> {
    let algorithm = packet.sym_algorithm();
    let key = factory.make_key_from_passphrase(algorithm, packet.s2k())?;
    match packet.encrypted_key() {
        None => Ok(SessionKey::new(algorithm, key)),
        Some(encrypted) => factory.recover_session_data(algorithm, &key, encrypted),
    }
}

fn public_key_session_key(
    packet: &PublicKeyEncryptedSessionKey,
    factory: &dyn PublicKeyDataDecryptorFactory,
) -> Result<SessionKey> {
    let data = factory.recover_session_data(packet.algorithm(), packet.values())?;
    SessionKey::from_checked_bytes(&data)
}

impl EncryptedDataList {
    /// Reads the session key packets and the data packet following them.
    ///
    /// The encrypted data is read into memory, see [EncryptedMessage] for decrypting
    /// straight off the stream.
    pub fn from_packet_reader<R: BufRead>(reader: &mut PacketReader<R>) -> Result<Self> {
        let keys = read_session_keys(reader)?;

        let data = match reader.read_packet()? {
            Some(Packet::SymEncryptedData(p)) => EncryptedData::Legacy(p),
            Some(Packet::SymEncryptedProtectedData(p)) => EncryptedData::Protected(p),
            Some(other) => format_bail!(
                "expected encrypted data after session keys, found {:?}",
                other.tag()
            ),
            None => format_bail!("missing encrypted data after session keys"),
        };
        debug!(
            "encrypted data list: {} session keys, protected={}",
            keys.len(),
            data.is_integrity_protected()
        );

        let data = Arc::new(data);
        let methods = keys
            .into_iter()
            .map(|key| match key {
                SessionKeyPacket::Pbe(packet) => EncryptedDataMethod::Pbe(PbeEncryptedData {
                    packet,
                    data: data.clone(),
                }),
                SessionKeyPacket::PublicKey(packet) => {
                    EncryptedDataMethod::PublicKey(PublicKeyEncryptedData {
                        packet,
                        data: data.clone(),
                    })
                }
            })
            .collect();

        Ok(EncryptedDataList { methods, data })
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&EncryptedDataMethod> {
        self.methods.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncryptedDataMethod> {
        self.methods.iter()
    }

    pub fn pbe_methods(&self) -> impl Iterator<Item = &PbeEncryptedData> {
        self.methods.iter().filter_map(EncryptedDataMethod::as_pbe)
    }

    pub fn public_key_methods(&self) -> impl Iterator<Item = &PublicKeyEncryptedData> {
        self.methods.iter().filter_map(EncryptedDataMethod::as_public_key)
    }

    /// Finds the public key method addressed to `key_id`.
    pub fn public_key_method(&self, key_id: &KeyId) -> Option<&PublicKeyEncryptedData> {
        self.public_key_methods().find(|m| m.key_id() == key_id)
    }

    pub fn encrypted_data(&self) -> &EncryptedData {
        &self.data
    }

    pub fn is_integrity_protected(&self) -> bool {
        self.data.is_integrity_protected()
    }
}

impl Serialize for EncryptedDataList {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        for method in &self.methods {
            match method {
                EncryptedDataMethod::Pbe(m) => write_packet(writer, &m.packet)?,
                EncryptedDataMethod::PublicKey(m) => write_packet(writer, &m.packet)?,
            }
        }
        self.data.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        let methods: usize = self
            .methods
            .iter()
            .map(|method| match method {
                EncryptedDataMethod::Pbe(m) => m.packet.write_len_with_header(),
                EncryptedDataMethod::PublicKey(m) => m.packet.write_len_with_header(),
            })
            .sum();
        methods + self.data.write_len()
    }
}

super::impl_encode!(EncryptedDataList);

/// Data encrypted to a passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbeEncryptedData {
    packet: SymKeyEncryptedSessionKey,
    data: Arc<EncryptedData>,
}

impl PbeEncryptedData {
    pub fn packet(&self) -> &SymKeyEncryptedSessionKey {
        &self.packet
    }

    pub fn is_integrity_protected(&self) -> bool {
        self.data.is_integrity_protected()
    }

    /// Derives the passphrase key and unwraps the session key with it.
    ///
    /// Without an encrypted key in the packet the derived key is the session key.
    pub fn session_key(&self, factory: &dyn PbeDataDecryptorFactory) -> Result<SessionKey> {
        pbe_session_key(&self.packet, factory)
    }

    /// The algorithm the data is encrypted with.
    pub fn symmetric_algorithm(
        &self,
        factory: &dyn PbeDataDecryptorFactory,
    ) -> Result<SymmetricKeyAlgorithm> {
        Ok(self.session_key(factory)?.algorithm())
    }

    /// Opens the plaintext stream. A quick check mismatch is an error.
    pub fn data_stream(&self, factory: &dyn PbeDataDecryptorFactory) -> Result<DecryptedStream> {
        let key = self.session_key(factory)?;
        let protected = self.data.is_integrity_protected();
        let decryptor = factory.create_data_decryptor(protected, &key)?;
        DecryptedStream::new(self.data.ciphertext().clone().reader(), protected, decryptor, true)
    }
}

/// Data encrypted to a public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEncryptedData {
    packet: PublicKeyEncryptedSessionKey,
    data: Arc<EncryptedData>,
}

impl PublicKeyEncryptedData {
    pub fn packet(&self) -> &PublicKeyEncryptedSessionKey {
        &self.packet
    }

    /// Key id of the recipient, zero for a hidden recipient.
    pub fn key_id(&self) -> &KeyId {
        self.packet.id()
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.packet.algorithm()
    }

    pub fn is_integrity_protected(&self) -> bool {
        self.data.is_integrity_protected()
    }

    pub fn session_key(&self, factory: &dyn PublicKeyDataDecryptorFactory) -> Result<SessionKey> {
        public_key_session_key(&self.packet, factory)
    }

    pub fn symmetric_algorithm(
        &self,
        factory: &dyn PublicKeyDataDecryptorFactory,
    ) -> Result<SymmetricKeyAlgorithm> {
        Ok(self.session_key(factory)?.algorithm())
    }

    /// Opens the plaintext stream.
    ///
    /// A quick check mismatch is only logged, so a failed decryption can not be told
    /// apart from a successful one by its error.
    pub fn data_stream(
        &self,
        factory: &dyn PublicKeyDataDecryptorFactory,
    ) -> Result<DecryptedStream> {
        let key = self.session_key(factory)?;
        let protected = self.data.is_integrity_protected();
        let decryptor = factory.create_data_decryptor(protected, &key)?;
        DecryptedStream::new(self.data.ciphertext().clone().reader(), protected, decryptor, false)
    }
}

/// Session key packets read off a stream, with the encrypted data packet still unread
/// behind them.
///
/// Decrypting consumes the message and reads the ciphertext as the plaintext is
/// read, one partial body chunk at a time.
pub struct EncryptedMessage<R> {
    keys: Vec<SessionKeyPacket>,
    protected: bool,
    body: PacketBodyReader<R>,
}

impl<R> std::fmt::Debug for EncryptedMessage<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedMessage")
            .field("session_keys", &self.keys.len())
            .field("protected", &self.protected)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> EncryptedMessage<R> {
    /// Reads the session key packets and the header of the encrypted data packet.
    pub fn from_packet_reader(mut reader: PacketReader<R>) -> Result<Self> {
        let keys = read_session_keys(&mut reader)?;
        let Some(header) = reader.read_header()? else {
            format_bail!("missing encrypted data after session keys");
        };
        let protected = match header.tag() {
            Tag::SymEncryptedData => false,
            Tag::SymEncryptedProtectedData => true,
            other => format_bail!("expected encrypted data after session keys, found {:?}", other),
        };

        let mut body = PacketBodyReader::new(reader.into_inner(), header.packet_length());
        if protected {
            let mut version = [0u8; 1];
            if body.read_exact(&mut version).is_err() {
                format_bail!("integrity protected data without a version");
            }
            if version[0] != SEIPD_VERSION {
                format_bail!("integrity protected data version {}", version[0]);
            }
        }
        debug!(
            "encrypted message: {} session keys, protected={}",
            keys.len(),
            protected
        );

        Ok(EncryptedMessage {
            keys,
            protected,
            body,
        })
    }

    pub fn is_integrity_protected(&self) -> bool {
        self.protected
    }

    pub fn pbe_packets(&self) -> impl Iterator<Item = &SymKeyEncryptedSessionKey> {
        self.keys.iter().filter_map(|key| match key {
            SessionKeyPacket::Pbe(p) => Some(p),
            SessionKeyPacket::PublicKey(_) => None,
        })
    }

    pub fn public_key_packets(&self) -> impl Iterator<Item = &PublicKeyEncryptedSessionKey> {
        self.keys.iter().filter_map(|key| match key {
            SessionKeyPacket::PublicKey(p) => Some(p),
            SessionKeyPacket::Pbe(_) => None,
        })
    }

    /// Decrypts with the `index`th passphrase packet. A quick check mismatch is an error.
    pub fn pbe_data_stream(
        self,
        index: usize,
        factory: &dyn PbeDataDecryptorFactory,
    ) -> Result<DecryptedStream<PacketBodyReader<R>>> {
        let packet = self
            .pbe_packets()
            .nth(index)
            .ok_or_else(|| format_err!("no passphrase session key at {}", index))?;
        let key = pbe_session_key(packet, factory)?;
        let decryptor = factory.create_data_decryptor(self.protected, &key)?;
        DecryptedStream::new(self.body, self.protected, decryptor, true)
    }

    /// Decrypts with the public key packet addressed to `key_id`.
    pub fn public_key_data_stream(
        self,
        key_id: &KeyId,
        factory: &dyn PublicKeyDataDecryptorFactory,
    ) -> Result<DecryptedStream<PacketBodyReader<R>>> {
        let packet = self
            .public_key_packets()
            .find(|p| p.id() == key_id)
            .ok_or_else(|| Error::KeyNotFound {
                key_id: key_id.clone(),
            })?;
        let key = public_key_session_key(packet, factory)?;
        let decryptor = factory.create_data_decryptor(self.protected, &key)?;
        DecryptedStream::new(self.body, self.protected, decryptor, false)
    }
}

/// Decrypts a ciphertext stream on demand.
struct DecryptingReader<S> {
    inner: S,
    decryptor: Box<dyn DataDecryptor>,
}

impl<S: Read> Read for DecryptingReader<S> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(out)?;
        if n == 0 {
            return Ok(0);
        }
        self.decryptor
            .decrypt(&mut out[..n])
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        Ok(n)
    }
}

enum Source<S> {
    Plain(DecryptingReader<S>),
    Protected(TruncatedLookahead<DecryptingReader<S>>),
}

/// The plaintext of an encrypted data packet.
///
/// For integrity protected data the trailing modification detection code is held
/// back from the caller and checked by [DecryptedStream::verify] once the stream has
/// been read to the end.
pub struct DecryptedStream<S = bytes::buf::Reader<Bytes>> {
    source: Source<S>,
    integrity: Option<Box<dyn DigestCalculator>>,
}

impl<S: Read> std::fmt::Debug for DecryptedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedStream")
            .field("is_integrity_protected", &self.is_integrity_protected())
            .finish()
    }
}

impl<S: Read> DecryptedStream<S> {
    fn new(
        mut ciphertext: S,
        protected: bool,
        mut decryptor: Box<dyn DataDecryptor>,
        strict: bool,
    ) -> Result<Self> {
        let bs = decryptor.block_size();
        let mut prefix = vec![0u8; bs + 2];
        ciphertext.read_exact(&mut prefix).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                Error::Format {
                    message: "encrypted data shorter than its prefix".to_string(),
                }
            } else {
                err.into()
            }
        })?;
        decryptor.decrypt(&mut prefix)?;

        let repeat = prefix[bs - 2..bs] == prefix[bs..];
        let zeroes = prefix[bs..] == [0, 0];
        if !repeat && !zeroes {
            if strict {
                return Err(Error::QuickCheck);
            }
            warn!("quick check mismatch on public key encrypted data");
        }

        let mut integrity = decryptor.integrity_calculator();
        if let Some(calc) = integrity.as_mut() {
            calc.update(&prefix);
        }

        let reader = DecryptingReader {
            inner: ciphertext,
            decryptor,
        };
        let source = if protected {
            let lookahead = TruncatedLookahead::new(reader, MDC_LEN).map_err(|err| {
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    debug!("integrity protected data without trailer: {}", err);
                    Error::MdcError
                } else {
                    err.into()
                }
            })?;
            Source::Protected(lookahead)
        } else {
            Source::Plain(reader)
        };

        Ok(DecryptedStream { source, integrity })
    }

    pub fn is_integrity_protected(&self) -> bool {
        matches!(self.source, Source::Protected(_))
    }

    /// Checks the modification detection code.
    ///
    /// Only valid for integrity protected data, after the stream was read to the end.
    pub fn verify(&mut self) -> Result<bool> {
        let Source::Protected(lookahead) = &self.source else {
            return Err(state_err!("data is not integrity protected"));
        };
        if !lookahead.is_drained() {
            return Err(state_err!("verify called before the stream was read to the end"));
        }
        let mut calc = self
            .integrity
            .take()
            .ok_or_else(|| state_err!("integrity already verified"))?;

        let trailer = lookahead.tail();
        if trailer[..2] != MDC_HEADER {
            debug!("modification detection code header missing");
            return Ok(false);
        }
        calc.update(&MDC_HEADER);
        let digest = calc.finish();

        Ok(bool::from(digest.as_slice().ct_eq(&trailer[2..])))
    }
}

impl<S: Read> Read for DecryptedStream<S> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.source {
            Source::Plain(r) => r.read(out)?,
            Source::Protected(r) => r.read(out)?,
        };
        if let Some(calc) = self.integrity.as_mut() {
            calc.update(&out[..n]);
        }
        Ok(n)
    }
}
