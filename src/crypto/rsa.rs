//! RSA with PKCS#1 v1.5 padding, for both signatures and session key encryption.

use log::debug;
use num_bigint::{BigUint, ModInverse};
use rand::{CryptoRng, Rng};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{bail, unsupported_err, Result};
use crate::types::{Mpi, PlainSecretParams, PublicParams};

fn signature_scheme(hash: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    let scheme = match hash {
        HashAlgorithm::Md5 => Pkcs1v15Sign::new::<md5::Md5>(),
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        HashAlgorithm::Ripemd160 => Pkcs1v15Sign::new::<ripemd::Ripemd160>(),
        HashAlgorithm::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        _ => unsupported_err!("RSA signatures with hash {:?}", hash),
    };
    Ok(scheme)
}

fn public_key(params: &PublicParams) -> Result<RsaPublicKey> {
    match params {
        PublicParams::Rsa { n, e } => Ok(RsaPublicKey::new(n.to_biguint(), e.to_biguint())?),
        _ => bail!("expected RSA public parameters, got {:?}", params),
    }
}

/// Rebuilds the private key from its OpenPGP representation.
pub fn private_key(public: &PublicParams, secret: &PlainSecretParams) -> Result<RsaPrivateKey> {
    match (public, secret) {
        (PublicParams::Rsa { n, e }, PlainSecretParams::Rsa { d, p, q, .. }) => {
            let key = RsaPrivateKey::from_components(
                n.to_biguint(),
                e.to_biguint(),
                d.to_biguint(),
                vec![p.to_biguint(), q.to_biguint()],
            )?;
            Ok(key)
        }
        _ => bail!("expected RSA key material"),
    }
}

/// Generate an RSA KeyPair.
pub fn generate_key<R: Rng + CryptoRng>(
    rng: &mut R,
    bit_size: usize,
) -> Result<(PublicParams, PlainSecretParams)> {
    let key = RsaPrivateKey::new(rng, bit_size)?;

    // OpenPGP expects p < q and u = p^-1 mod q
    let (p, q) = {
        let primes = key.primes();
        if primes.len() != 2 {
            bail!("expected two primes, got {}", primes.len());
        }
        if primes[0] < primes[1] {
            (primes[0].clone(), primes[1].clone())
        } else {
            (primes[1].clone(), primes[0].clone())
        }
    };
    let u = p
        .clone()
        .mod_inverse(&q)
        .and_then(|u| u.to_biguint())
        .ok_or_else(|| crate::format_err!("invalid prime"))?;

    Ok((
        PublicParams::Rsa {
            n: key.n().into(),
            e: key.e().into(),
        },
        PlainSecretParams::Rsa {
            d: key.d().into(),
            p: p.into(),
            q: q.into(),
            u: u.into(),
        },
    ))
}

/// Sign using RSA, with PKCS1v15 padding.
pub fn sign(key: &RsaPrivateKey, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<Mpi>> {
    let sig = key.sign(signature_scheme(hash)?, digest)?;

    Ok(vec![Mpi::from_slice(&sig)])
}

/// Verify a RSA, PKCS1v15 padded signature.
pub fn verify(params: &PublicParams, hash: HashAlgorithm, hashed: &[u8], sig: &[Mpi]) -> Result<()> {
    let key = public_key(params)?;
    if sig.len() != 1 {
        bail!("RSA signatures consist of exactly one MPI");
    }

    // the MPI drops leading zeros, the signature primitive wants the full modulus size
    let sig = sig[0].to_padded(key.size())?;
    key.verify(signature_scheme(hash)?, hashed, &sig)?;

    Ok(())
}

/// RSA encryption using PKCS1v15 padding.
pub fn encrypt<R: CryptoRng + Rng>(
    rng: &mut R,
    params: &PublicParams,
    plaintext: &[u8],
) -> Result<Vec<Mpi>> {
    debug!("RSA encrypt");
    let key = public_key(params)?;
    let data = key.encrypt(rng, Pkcs1v15Encrypt, plaintext)?;

    Ok(vec![Mpi::from_slice(&data)])
}

/// RSA decryption using PKCS1v15 padding.
pub fn decrypt(key: &RsaPrivateKey, mpis: &[Mpi]) -> Result<Zeroizing<Vec<u8>>> {
    if mpis.len() != 1 {
        bail!("RSA encrypted session keys consist of exactly one MPI");
    }
    let ciphertext = mpis[0].to_padded(key.size())?;
    let m = key.decrypt(Pkcs1v15Encrypt, &ciphertext)?;

    Ok(Zeroizing::new(m))
}

/// The modulus as a big integer, used for v3 key ids.
pub(crate) fn modulus(params: &PublicParams) -> Option<BigUint> {
    match params {
        PublicParams::Rsa { n, .. } => Some(n.to_biguint()),
        _ => None,
    }
}
