use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{bail, ensure, format_bail, unsupported_err, Error, Result};
use crate::packet::{PacketTrait, PublicKeyPacket};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{KeyVersion, PacketFraming, PacketHeaderVersion, PlainSecretParams, StringToKey, Tag};

/// How the secret material of a key is protected, the S2K usage octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S2kUsage {
    /// Plain MPIs followed by a two octet checksum.
    Unprotected,
    /// Encrypted, with a two octet checksum (usage 255).
    Checksum,
    /// Encrypted, with a SHA-1 checksum (usage 254).
    Sha1,
    /// Encrypted with the given algorithm and an MD5 simple S2K (any other usage octet).
    Legacy(SymmetricKeyAlgorithm),
}

impl S2kUsage {
    fn from_octet(usage: u8) -> Self {
        match usage {
            0 => S2kUsage::Unprotected,
            254 => S2kUsage::Sha1,
            255 => S2kUsage::Checksum,
            alg => S2kUsage::Legacy(SymmetricKeyAlgorithm::from(alg)),
        }
    }

    fn to_octet(self) -> u8 {
        match self {
            S2kUsage::Unprotected => 0,
            S2kUsage::Sha1 => 254,
            S2kUsage::Checksum => 255,
            S2kUsage::Legacy(alg) => alg.into(),
        }
    }
}

/// Secret-Key and Secret-Subkey Packet
///
/// The secret part is kept in its wire form, decryption happens on demand with a key
/// derived from the passphrase.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.3>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SecretKeyPacket {
    details: PublicKeyPacket,
    usage: S2kUsage,
    sym_algorithm: Option<SymmetricKeyAlgorithm>,
    s2k: Option<StringToKey>,
    #[debug("{}", hex::encode(iv))]
    iv: Bytes,
    #[debug("..")]
    secret_data: Bytes,
}

impl SecretKeyPacket {
    pub fn from_buf<B: Buf>(
        packet_version: PacketHeaderVersion,
        subkey: bool,
        i: &mut B,
    ) -> Result<Self> {
        let details = PublicKeyPacket::from_buf(packet_version, subkey, i)?;
        let usage = S2kUsage::from_octet(i.read_u8()?);
        let (sym_algorithm, s2k) = match usage {
            S2kUsage::Unprotected => (None, None),
            S2kUsage::Checksum | S2kUsage::Sha1 => {
                let alg = SymmetricKeyAlgorithm::from(i.read_u8()?);
                (Some(alg), Some(StringToKey::from_buf(i)?))
            }
            S2kUsage::Legacy(alg) => (Some(alg), None),
        };
        let has_iv = usage != S2kUsage::Unprotected && !s2k.as_ref().is_some_and(|s| s.is_gnu_dummy());
        let iv = match sym_algorithm {
            Some(alg) if has_iv => i.read_take(alg.block_size())?,
            _ => Bytes::new(),
        };
        let secret_data = i.rest();

        Ok(SecretKeyPacket {
            details,
            usage,
            sym_algorithm,
            s2k,
            iv,
            secret_data,
        })
    }

    /// Stores `params` without protection.
    pub fn new_unprotected(details: PublicKeyPacket, params: &PlainSecretParams) -> Result<Self> {
        let mut data = params.to_bytes()?;
        let checksum = checksum::calculate_simple(&data);
        data.write_u16::<BigEndian>(checksum)?;

        Ok(SecretKeyPacket {
            details,
            usage: S2kUsage::Unprotected,
            sym_algorithm: None,
            s2k: None,
            iv: Bytes::new(),
            secret_data: data.into(),
        })
    }

    /// Encrypts `params` under `key`, which was derived through `s2k`.
    pub fn new_protected<R: CryptoRng + Rng>(
        mut rng: R,
        details: PublicKeyPacket,
        params: &PlainSecretParams,
        sym_algorithm: SymmetricKeyAlgorithm,
        s2k: StringToKey,
        key: &[u8],
        use_sha1: bool,
    ) -> Result<Self> {
        ensure!(
            sym_algorithm.is_supported(),
            "can not protect keys with {:?}",
            sym_algorithm
        );
        let mut iv = vec![0u8; sym_algorithm.block_size()];
        rng.fill_bytes(&mut iv);

        if details.version() != KeyVersion::V4 {
            ensure!(!use_sha1, "{:?} keys only carry a simple checksum", details.version());
            let plain = Zeroizing::new(params.to_bytes()?);
            let mut data = crypt_v3_mpis(sym_algorithm, key, &iv, &plain, true)?;
            data.write_u16::<BigEndian>(checksum::calculate_simple(&plain))?;

            return Ok(SecretKeyPacket {
                details,
                usage: S2kUsage::Checksum,
                sym_algorithm: Some(sym_algorithm),
                s2k: Some(s2k),
                iv: iv.into(),
                secret_data: data.into(),
            });
        }

        let mut data = Zeroizing::new(params.to_bytes()?);
        let usage = if use_sha1 {
            let hash = checksum::calculate_sha1(&data);
            data.extend_from_slice(&hash);
            S2kUsage::Sha1
        } else {
            let checksum = checksum::calculate_simple(&data);
            data.write_u16::<BigEndian>(checksum)?;
            S2kUsage::Checksum
        };
        sym_algorithm.encrypt_with_iv_regular(key, &iv, &mut data)?;

        Ok(SecretKeyPacket {
            details,
            usage,
            sym_algorithm: Some(sym_algorithm),
            s2k: Some(s2k),
            iv: iv.into(),
            secret_data: Bytes::copy_from_slice(&data),
        })
    }

    pub fn public_key(&self) -> &PublicKeyPacket {
        &self.details
    }

    pub fn with_subkey(mut self, subkey: bool) -> Self {
        self.details = self.details.with_subkey(subkey);
        self
    }

    pub fn is_subkey(&self) -> bool {
        self.details.is_subkey()
    }

    pub fn usage(&self) -> S2kUsage {
        self.usage
    }

    /// True if a passphrase is needed to get at the secret material.
    pub fn is_encrypted(&self) -> bool {
        self.usage != S2kUsage::Unprotected
    }

    /// True if the packet carries no secret material at all (GnuPG stub).
    pub fn is_private_key_empty(&self) -> bool {
        self.s2k.as_ref().is_some_and(|s| s.is_gnu_dummy())
    }

    /// Algorithm protecting the secret material, [SymmetricKeyAlgorithm::Plaintext] if none.
    pub fn sym_algorithm(&self) -> SymmetricKeyAlgorithm {
        self.sym_algorithm.unwrap_or(SymmetricKeyAlgorithm::Plaintext)
    }

    pub fn s2k(&self) -> Option<&StringToKey> {
        self.s2k.as_ref()
    }

    /// The S2K to derive the protection key with, the implied MD5 one for legacy usage.
    pub fn key_s2k(&self) -> Option<StringToKey> {
        match self.usage {
            S2kUsage::Unprotected => None,
            S2kUsage::Legacy(_) => Some(StringToKey::Simple {
                hash: HashAlgorithm::Md5,
            }),
            S2kUsage::Checksum | S2kUsage::Sha1 => self.s2k.clone(),
        }
    }

    /// Recovers the secret parameters, `key` is required for protected keys.
    ///
    /// A wrong key surfaces as [Error::SecretKeyChecksum].
    pub fn decrypt(&self, key: Option<&[u8]>) -> Result<PlainSecretParams> {
        if self.is_private_key_empty() {
            unsupported_err!("secret key material is not available");
        }
        let algorithm = self.details.algorithm();
        let data: Zeroizing<Vec<u8>> = match (self.usage, key) {
            (S2kUsage::Unprotected, _) => Zeroizing::new(self.secret_data.to_vec()),
            (_, None) => bail!("secret key is protected, a key is required"),
            (_, Some(key)) if self.details.version() != KeyVersion::V4 => {
                if self.usage == S2kUsage::Sha1 {
                    unsupported_err!("sha1 checksum on {:?} keys", self.details.version());
                }
                let body_len = self
                    .secret_data
                    .len()
                    .checked_sub(2)
                    .ok_or(Error::SecretKeyChecksum)?;
                let (mpis, sum) = self.secret_data.split_at(body_len);
                let mut data =
                    Zeroizing::new(crypt_v3_mpis(self.sym_algorithm(), key, &self.iv, mpis, false)?);
                data.extend_from_slice(sum);
                data
            }
            (_, Some(key)) => {
                let mut data = Zeroizing::new(self.secret_data.to_vec());
                self.sym_algorithm()
                    .decrypt_with_iv_regular(key, &self.iv, &mut data)?;
                data
            }
        };

        let body_len = match self.usage {
            S2kUsage::Sha1 => {
                let body_len = data.len().checked_sub(20).ok_or(Error::SecretKeyChecksum)?;
                checksum::sha1(&data[body_len..], &data[..body_len])?;
                body_len
            }
            _ => {
                let body_len = data.len().checked_sub(2).ok_or(Error::SecretKeyChecksum)?;
                checksum::simple(&data[body_len..], &data[..body_len])?;
                body_len
            }
        };
        debug!("secret key checksum ok, {} octets", body_len);

        let mut body = &data[..body_len];
        let params = PlainSecretParams::from_buf(algorithm, &mut body)?;
        Ok(params)
    }
}

/// Runs CFB over the data of each MPI in `input`, as v2 and v3 keys protect them.
///
/// The two octet bit counts stay in the clear. The cipher restarts at every MPI,
/// using the last block of ciphertext written so far as its IV.
fn crypt_v3_mpis(
    alg: SymmetricKeyAlgorithm,
    key: &[u8],
    iv: &[u8],
    input: &[u8],
    encrypt: bool,
) -> Result<Vec<u8>> {
    let block_size = iv.len();
    let mut iv = iv.to_vec();
    let mut out = input.to_vec();
    let mut pos = 0;

    while pos < out.len() {
        if out.len() - pos < 2 {
            format_bail!("truncated mpi length in secret key");
        }
        let bits = u16::from_be_bytes([out[pos], out[pos + 1]]) as usize;
        let start = pos + 2;
        let end = start + (bits + 7) / 8;
        if end > out.len() {
            format_bail!("mpi of {} bits overruns secret key data", bits);
        }

        if encrypt {
            alg.encrypt_with_iv_regular(key, &iv, &mut out[start..end])?;
        } else {
            alg.decrypt_with_iv_regular(key, &iv, &mut out[start..end])?;
        }

        let ciphertext = if encrypt { &out[..] } else { input };
        if let Some(from) = end.checked_sub(block_size) {
            iv.copy_from_slice(&ciphertext[from..end]);
        }
        pos = end;
    }

    Ok(out)
}

impl Serialize for SecretKeyPacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.details.to_writer(writer)?;
        writer.write_u8(self.usage.to_octet())?;
        if matches!(self.usage, S2kUsage::Checksum | S2kUsage::Sha1) {
            writer.write_u8(self.sym_algorithm().into())?;
            if let Some(s2k) = &self.s2k {
                s2k.to_writer(writer)?;
            }
        }
        writer.write_all(&self.iv)?;
        writer.write_all(&self.secret_data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        let mut len = self.details.write_len() + 1;
        if matches!(self.usage, S2kUsage::Checksum | S2kUsage::Sha1) {
            len += 1 + self.s2k.as_ref().map_or(0, |s| s.write_len());
        }
        len + self.iv.len() + self.secret_data.len()
    }
}

impl PacketTrait for SecretKeyPacket {
    fn framing(&self) -> &PacketFraming {
        self.details.framing()
    }

    fn set_framing(&mut self, framing: PacketFraming) {
        self.details.set_framing(framing);
    }

    fn tag(&self) -> Tag {
        if self.details.is_subkey() {
            Tag::SecretSubkey
        } else {
            Tag::SecretKey
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::eddsa;
    use crate::crypto::public_key::PublicKeyAlgorithm;
    use crate::ser::u32_to_time;

    fn key_material() -> (PublicKeyPacket, PlainSecretParams) {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (public, secret) = eddsa::generate_key(&mut rng);
        let details = PublicKeyPacket::new(PublicKeyAlgorithm::EdDSALegacy, u32_to_time(1), public);
        (details, secret)
    }

    #[test]
    fn test_unprotected_roundtrip() {
        let (details, secret) = key_material();
        let packet = SecretKeyPacket::new_unprotected(details, &secret).unwrap();
        assert!(!packet.is_encrypted());

        let raw = packet.to_bytes().unwrap();
        let back = SecretKeyPacket::from_buf(PacketHeaderVersion::New, false, &mut &raw[..]).unwrap();
        assert_eq!(back, packet);
        assert_eq!(back.decrypt(None).unwrap(), secret);
    }

    #[test]
    fn test_protected_roundtrip() {
        let _ = pretty_env_logger::try_init();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let (details, secret) = key_material();

        for use_sha1 in [true, false] {
            let s2k = StringToKey::new_iterated(&mut rng, HashAlgorithm::Sha256, 0x10);
            let alg = SymmetricKeyAlgorithm::AES128;
            let key = s2k.derive_key(b"secret", alg.key_size()).unwrap();
            let packet = SecretKeyPacket::new_protected(
                &mut rng,
                details.clone(),
                &secret,
                alg,
                s2k.clone(),
                &key,
                use_sha1,
            )
            .unwrap();
            assert!(packet.is_encrypted());

            let raw = packet.to_bytes().unwrap();
            assert_eq!(raw.len(), packet.write_len());
            let back =
                SecretKeyPacket::from_buf(PacketHeaderVersion::New, false, &mut &raw[..]).unwrap();
            assert_eq!(back, packet);
            assert_eq!(back.key_s2k(), Some(s2k.clone()));
            assert_eq!(back.decrypt(Some(&key)).unwrap(), secret);

            let wrong = s2k.derive_key(b"wrong", alg.key_size()).unwrap();
            let err = back.decrypt(Some(&wrong)).unwrap_err();
            assert!(matches!(err, Error::SecretKeyChecksum), "{:?}", err);
        }
    }

    #[test]
    fn test_v3_protected_roundtrip() {
        let _ = pretty_env_logger::try_init();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (public, secret) = crate::crypto::rsa::generate_key(&mut rng, 1024).unwrap();
        let v4 = PublicKeyPacket::new(PublicKeyAlgorithm::RSA, u32_to_time(1), public)
            .to_bytes()
            .unwrap();
        // version 3 body: version, creation time, two octets of validity days, then v4 tail
        let mut raw = vec![3];
        raw.extend_from_slice(&v4[1..5]);
        raw.extend_from_slice(&[0, 0]);
        raw.extend_from_slice(&v4[5..]);
        let details = PublicKeyPacket::from_buf(PacketHeaderVersion::Old, false, &mut &raw[..]).unwrap();
        assert_eq!(details.version(), KeyVersion::V3);

        let s2k = StringToKey::new_iterated(&mut rng, HashAlgorithm::Sha256, 0x10);
        let alg = SymmetricKeyAlgorithm::AES128;
        let key = s2k.derive_key(b"secret", alg.key_size()).unwrap();
        assert!(SecretKeyPacket::new_protected(
            &mut rng,
            details.clone(),
            &secret,
            alg,
            s2k.clone(),
            &key,
            true,
        )
        .is_err());

        let packet =
            SecretKeyPacket::new_protected(&mut rng, details, &secret, alg, s2k, &key, false).unwrap();
        let plain = secret.to_bytes().unwrap();
        // bit counts and the checksum stay readable
        assert_eq!(packet.secret_data[..2], plain[..2]);
        assert_eq!(
            packet.secret_data[plain.len()..],
            checksum::calculate_simple(&plain).to_be_bytes()
        );
        assert_ne!(packet.secret_data[2..plain.len()], plain[2..]);

        let raw = packet.to_bytes().unwrap();
        let back = SecretKeyPacket::from_buf(PacketHeaderVersion::Old, false, &mut &raw[..]).unwrap();
        assert_eq!(back, packet);
        assert_eq!(back.decrypt(Some(&key)).unwrap(), secret);

        let wrong = [7u8; 16];
        let err = back.decrypt(Some(&wrong)).unwrap_err();
        assert!(matches!(err, Error::SecretKeyChecksum), "{:?}", err);
    }

    #[test]
    fn test_gnu_dummy() {
        let (details, _) = key_material();
        let mut raw = details.to_bytes().unwrap();
        raw.extend_from_slice(&[254, 0, 101, 2, b'G', b'N', b'U', 1]);
        let packet = SecretKeyPacket::from_buf(PacketHeaderVersion::New, true, &mut &raw[..]).unwrap();
        assert!(packet.is_private_key_empty());
        assert!(packet.is_subkey());
        assert_eq!(packet.to_bytes().unwrap(), raw);
        assert!(packet.decrypt(Some(b"x")).is_err());
    }
}
