//! # pgp-core
//!
//! An implementation of the OpenPGP message format, [RFC 4880].
//!
//! The crate reads and writes keys, key rings, signatures and encrypted data as
//! binary packet streams. Hashing, ciphers and public key math are reached through
//! the collaborator traits in [operator], which come with default implementations
//! on top of the RustCrypto crates.
//!
//! - [packet]: single packets and their framing.
//! - [composed]: keys, rings, collections, signatures, encrypted data and the
//!   generators producing them, plus the [composed::ObjectFactory] that turns a
//!   packet stream into these objects.
//!
//! [RFC 4880]: https://www.rfc-editor.org/rfc/rfc4880.html

#![forbid(unsafe_code)]

pub(crate) mod util;

pub mod composed;
pub mod crypto;
pub mod errors;
pub mod normalize_lines;
pub mod operator;
pub mod packet;
pub mod parsing;
pub mod parsing_reader;
pub mod ser;
pub mod types;

pub use self::composed::{
    EncryptedDataGenerator, EncryptedDataList, KeyPair, KeyRingParamsBuilder, Object,
    ObjectFactory, PublicKey, PublicKeyRing, PublicKeyRingCollection, SecretKey, SecretKeyRing,
    SecretKeyRingCollection, Signature, SignatureGenerator,
};
pub use self::errors::{Error, Result};
