//! EdDSA over Curve25519, in the legacy OpenPGP framing (algorithm 22).
//!
//! The public point is stored as `0x40 || A`, the secret as the 32 octet seed, and
//! signatures are the two 32 octet halves `R` and `S` as separate MPIs.

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::errors::{bail, ensure, ensure_eq, unsupported_err, Result};
use crate::types::{Mpi, PlainSecretParams, PublicParams, ED25519_OID};

fn verifying_key(params: &PublicParams) -> Result<VerifyingKey> {
    match params {
        PublicParams::EdDsaLegacy { oid, q } => {
            if oid.as_ref() != ED25519_OID {
                unsupported_err!("EdDSA curve with oid {}", hex::encode(oid));
            }
            let q = q.as_bytes();
            ensure_eq!(q.len(), 33, "invalid Q (len)");
            ensure_eq!(q[0], 0x40, "invalid Q (prefix)");
            let mut point = [0u8; 32];
            point.copy_from_slice(&q[1..]);
            Ok(VerifyingKey::from_bytes(&point)?)
        }
        _ => bail!("expected EdDSA public parameters, got {:?}", params),
    }
}

fn signing_key(secret: &PlainSecretParams) -> Result<SigningKey> {
    match secret {
        PlainSecretParams::EdDsaLegacy(seed) => {
            let seed = Zeroizing::new(seed.to_padded(32)?);
            let mut bytes = Zeroizing::new([0u8; 32]);
            bytes.copy_from_slice(&seed);
            Ok(SigningKey::from_bytes(&bytes))
        }
        _ => bail!("expected EdDSA secret parameters"),
    }
}

/// Generate an Ed25519 KeyPair.
pub fn generate_key<R: Rng + CryptoRng>(rng: &mut R) -> (PublicParams, PlainSecretParams) {
    let mut seed = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut seed[..]);
    let key = SigningKey::from_bytes(&seed);

    let mut q = Vec::with_capacity(33);
    q.push(0x40);
    q.extend_from_slice(key.verifying_key().as_bytes());

    (
        PublicParams::EdDsaLegacy {
            oid: ED25519_OID.to_vec().into(),
            q: Mpi::from_slice(&q),
        },
        PlainSecretParams::EdDsaLegacy(Mpi::from_slice(&seed[..])),
    )
}

/// Sign the given digest.
pub fn sign(public: &PublicParams, secret: &PlainSecretParams, digest: &[u8]) -> Result<Vec<Mpi>> {
    let key = signing_key(secret)?;
    ensure!(
        key.verifying_key() == verifying_key(public)?,
        "secret key does not match its public key"
    );
    let signature = key.sign(digest);

    Ok(vec![
        Mpi::from_slice(signature.r_bytes()),
        Mpi::from_slice(signature.s_bytes()),
    ])
}

/// Verify an EdDSA signature over the given digest.
pub fn verify(public: &PublicParams, digest: &[u8], sig: &[Mpi]) -> Result<()> {
    ensure_eq!(sig.len(), 2, "EdDSA signatures consist of two MPIs");
    let key = verifying_key(public)?;

    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&sig[0].to_padded(32)?);
    bytes[32..].copy_from_slice(&sig[1].to_padded(32)?);
    let signature = ed25519_dalek::Signature::from_bytes(&bytes);

    key.verify(digest, &signature)?;
    Ok(())
}
