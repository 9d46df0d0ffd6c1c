mod compression;
mod fingerprint;
mod key_id;
mod mpi;
mod packet;
mod params;
mod s2k;
mod session_key;

pub use self::{
    compression::CompressionAlgorithm,
    fingerprint::Fingerprint,
    key_id::KeyId,
    mpi::Mpi,
    packet::*,
    params::{PlainSecretParams, PublicParams, ED25519_OID},
    s2k::{StringToKey, DEFAULT_ITER_COUNT},
    session_key::SessionKey,
};
