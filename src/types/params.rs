use std::io;

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{unsupported_err, Result};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::Mpi;

/// DER body of the Ed25519 curve OID `1.3.6.1.4.1.11591.15.1`.
pub const ED25519_OID: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];

/// Algorithm specific public key material.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.2>
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicParams {
    Rsa {
        n: Mpi,
        e: Mpi,
    },
    Dsa {
        p: Mpi,
        q: Mpi,
        g: Mpi,
        y: Mpi,
    },
    Elgamal {
        p: Mpi,
        g: Mpi,
        y: Mpi,
    },
    /// RFC 6637 ECDSA, the curve is carried as a raw OID.
    Ecdsa {
        oid: Bytes,
        p: Mpi,
    },
    /// RFC 6637 ECDH, `kdf` holds the raw KDF parameter field.
    Ecdh {
        oid: Bytes,
        p: Mpi,
        kdf: Bytes,
    },
    /// EdDSA in its pre RFC 9580 framing, `q` is `0x40 || public point`.
    EdDsaLegacy {
        oid: Bytes,
        q: Mpi,
    },
    /// Material for algorithms this crate does not know, kept verbatim.
    Unknown {
        data: Bytes,
    },
}

fn read_oid<B: Buf>(i: &mut B) -> Result<Bytes> {
    let len = i.read_u8()?;
    if len == 0 || len == 0xFF {
        crate::format_bail!("invalid curve oid length {}", len);
    }
    Ok(i.read_take(usize::from(len))?)
}

impl PublicParams {
    /// Parses the public parameters for `alg`, consuming them from `i`.
    pub fn from_buf<B: Buf>(alg: PublicKeyAlgorithm, i: &mut B) -> Result<Self> {
        let params = match alg {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign => {
                let n = Mpi::from_buf(i)?;
                let e = Mpi::from_buf(i)?;
                PublicParams::Rsa { n, e }
            }
            PublicKeyAlgorithm::DSA => {
                let p = Mpi::from_buf(i)?;
                let q = Mpi::from_buf(i)?;
                let g = Mpi::from_buf(i)?;
                let y = Mpi::from_buf(i)?;
                PublicParams::Dsa { p, q, g, y }
            }
            PublicKeyAlgorithm::Elgamal | PublicKeyAlgorithm::ElgamalEncrypt => {
                let p = Mpi::from_buf(i)?;
                let g = Mpi::from_buf(i)?;
                let y = Mpi::from_buf(i)?;
                PublicParams::Elgamal { p, g, y }
            }
            PublicKeyAlgorithm::ECDSA => {
                let oid = read_oid(i)?;
                let p = Mpi::from_buf(i)?;
                PublicParams::Ecdsa { oid, p }
            }
            PublicKeyAlgorithm::ECDH => {
                let oid = read_oid(i)?;
                let p = Mpi::from_buf(i)?;
                let kdf_len = i.read_u8()?;
                let kdf = i.read_take(usize::from(kdf_len))?;
                PublicParams::Ecdh { oid, p, kdf }
            }
            PublicKeyAlgorithm::EdDSALegacy => {
                let oid = read_oid(i)?;
                let q = Mpi::from_buf(i)?;
                PublicParams::EdDsaLegacy { oid, q }
            }
            _ => PublicParams::Unknown { data: i.rest() },
        };

        Ok(params)
    }

    /// Bit strength of the key material, `None` when unknown.
    pub fn bit_strength(&self) -> Option<usize> {
        match self {
            PublicParams::Rsa { n, .. } => Some(n.bit_size()),
            PublicParams::Dsa { p, .. } => Some(p.bit_size()),
            PublicParams::Elgamal { p, .. } => Some(p.bit_size()),
            PublicParams::EdDsaLegacy { oid, .. } if oid.as_ref() == ED25519_OID => Some(256),
            PublicParams::Ecdsa { p, .. } | PublicParams::Ecdh { p, .. } => {
                // uncompressed point: 0x04 || x || y
                Some(p.len().saturating_sub(1) / 2 * 8)
            }
            PublicParams::EdDsaLegacy { .. } | PublicParams::Unknown { .. } => None,
        }
    }
}

impl Serialize for PublicParams {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PublicParams::Rsa { n, e } => {
                n.to_writer(writer)?;
                e.to_writer(writer)?;
            }
            PublicParams::Dsa { p, q, g, y } => {
                p.to_writer(writer)?;
                q.to_writer(writer)?;
                g.to_writer(writer)?;
                y.to_writer(writer)?;
            }
            PublicParams::Elgamal { p, g, y } => {
                p.to_writer(writer)?;
                g.to_writer(writer)?;
                y.to_writer(writer)?;
            }
            PublicParams::Ecdsa { oid, p } => {
                writer.write_u8(oid.len().try_into()?)?;
                writer.write_all(oid)?;
                p.to_writer(writer)?;
            }
            PublicParams::Ecdh { oid, p, kdf } => {
                writer.write_u8(oid.len().try_into()?)?;
                writer.write_all(oid)?;
                p.to_writer(writer)?;
                writer.write_u8(kdf.len().try_into()?)?;
                writer.write_all(kdf)?;
            }
            PublicParams::EdDsaLegacy { oid, q } => {
                writer.write_u8(oid.len().try_into()?)?;
                writer.write_all(oid)?;
                q.to_writer(writer)?;
            }
            PublicParams::Unknown { data } => {
                writer.write_all(data)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            PublicParams::Rsa { n, e } => n.write_len() + e.write_len(),
            PublicParams::Dsa { p, q, g, y } => {
                p.write_len() + q.write_len() + g.write_len() + y.write_len()
            }
            PublicParams::Elgamal { p, g, y } => p.write_len() + g.write_len() + y.write_len(),
            PublicParams::Ecdsa { oid, p } => 1 + oid.len() + p.write_len(),
            PublicParams::Ecdh { oid, p, kdf } => 1 + oid.len() + p.write_len() + 1 + kdf.len(),
            PublicParams::EdDsaLegacy { oid, q } => 1 + oid.len() + q.write_len(),
            PublicParams::Unknown { data } => data.len(),
        }
    }
}

/// Unencrypted secret key material.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, derive_more::Debug)]
pub enum PlainSecretParams {
    Rsa {
        #[debug("..")]
        d: Mpi,
        #[debug("..")]
        p: Mpi,
        #[debug("..")]
        q: Mpi,
        #[debug("..")]
        u: Mpi,
    },
    Dsa(#[debug("..")] Mpi),
    Elgamal(#[debug("..")] Mpi),
    Ecdsa(#[debug("..")] Mpi),
    Ecdh(#[debug("..")] Mpi),
    EdDsaLegacy(#[debug("..")] Mpi),
}

impl PlainSecretParams {
    /// Parses the secret MPIs for `alg`.
    pub fn from_buf<B: Buf>(alg: PublicKeyAlgorithm, i: &mut B) -> Result<Self> {
        let params = match alg {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign => {
                let d = Mpi::from_buf(i)?;
                let p = Mpi::from_buf(i)?;
                let q = Mpi::from_buf(i)?;
                let u = Mpi::from_buf(i)?;
                PlainSecretParams::Rsa { d, p, q, u }
            }
            PublicKeyAlgorithm::DSA => PlainSecretParams::Dsa(Mpi::from_buf(i)?),
            PublicKeyAlgorithm::Elgamal | PublicKeyAlgorithm::ElgamalEncrypt => {
                PlainSecretParams::Elgamal(Mpi::from_buf(i)?)
            }
            PublicKeyAlgorithm::ECDSA => PlainSecretParams::Ecdsa(Mpi::from_buf(i)?),
            PublicKeyAlgorithm::ECDH => PlainSecretParams::Ecdh(Mpi::from_buf(i)?),
            PublicKeyAlgorithm::EdDSALegacy => PlainSecretParams::EdDsaLegacy(Mpi::from_buf(i)?),
            _ => unsupported_err!("secret key material for {:?}", alg),
        };

        Ok(params)
    }

    fn mpis(&self) -> Vec<&Mpi> {
        match self {
            PlainSecretParams::Rsa { d, p, q, u } => vec![d, p, q, u],
            PlainSecretParams::Dsa(x)
            | PlainSecretParams::Elgamal(x)
            | PlainSecretParams::Ecdsa(x)
            | PlainSecretParams::Ecdh(x)
            | PlainSecretParams::EdDsaLegacy(x) => vec![x],
        }
    }
}

impl Serialize for PlainSecretParams {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        for mpi in self.mpis() {
            mpi.to_writer(writer)?;
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.mpis().iter().map(|m| m.write_len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsa_params_roundtrip() {
        let raw = [0x00, 0x09, 0x01, 0xFF, 0x00, 0x02, 0x03];
        let params = PublicParams::from_buf(PublicKeyAlgorithm::RSA, &mut &raw[..]).unwrap();
        assert_eq!(
            params,
            PublicParams::Rsa {
                n: Mpi::from_slice(&[0x01, 0xFF]),
                e: Mpi::from_slice(&[0x03]),
            }
        );
        assert_eq!(params.to_bytes().unwrap(), raw);
        assert_eq!(params.bit_strength(), Some(9));
    }

    #[test]
    fn test_eddsa_params_roundtrip() {
        let mut raw = vec![ED25519_OID.len() as u8];
        raw.extend_from_slice(ED25519_OID);
        raw.extend_from_slice(&[0x01, 0x07, 0x40]);
        raw.extend_from_slice(&[0xAB; 32]);
        let params =
            PublicParams::from_buf(PublicKeyAlgorithm::EdDSALegacy, &mut &raw[..]).unwrap();
        assert_eq!(params.to_bytes().unwrap(), raw);
        assert_eq!(params.bit_strength(), Some(256));
    }

    #[test]
    fn test_unknown_params_are_kept() {
        let raw = [1u8, 2, 3, 4];
        let params =
            PublicParams::from_buf(PublicKeyAlgorithm::Unknown(99), &mut &raw[..]).unwrap();
        assert_eq!(params.to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = PlainSecretParams::EdDsaLegacy(Mpi::from_slice(&[0x42; 32]));
        assert!(!format!("{:?}", secret).contains("42"));
    }
}
