//! # Composed objects
//!
//! Everything built out of more than one packet: keys with their certifications, key
//! rings and collections of them, signature lists, encrypted data with its session key
//! packets, and the generators producing them.
//!
//! ```rust
//! use pgp_core::composed::{KeyRingParamsBuilder, KeyType, SubkeyParamsBuilder};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(0);
//! let ring = KeyRingParamsBuilder::default()
//!     .key_type(KeyType::Ed25519)
//!     .can_sign(true)
//!     .primary_user_id("Alice <alice@example.org>".into())
//!     .subkeys(vec![SubkeyParamsBuilder::default()
//!         .key_type(KeyType::Rsa(2048))
//!         .can_encrypt(true)
//!         .build()
//!         .unwrap()])
//!     .build()
//!     .unwrap()
//!     .generate(&mut rng)
//!     .unwrap();
//!
//! assert_eq!(ring.secret_keys().len(), 2);
//! ```

/// Adds `encode` and `get_encoded` to a [crate::ser::Serialize] type.
macro_rules! impl_encode {
    ($name:ty) => {
        impl $name {
            /// Writes the binary encoding, packet headers included.
            pub fn encode<W: std::io::Write>(&self, writer: &mut W) -> $crate::errors::Result<()> {
                $crate::ser::Serialize::to_writer(self, writer)
            }

            pub fn get_encoded(&self) -> $crate::errors::Result<Vec<u8>> {
                $crate::ser::Serialize::to_bytes(self)
            }
        }
    };
}

pub(crate) use impl_encode;

mod collection;
mod encrypted;
mod encryption_generator;
mod key_ring_generator;
mod lookahead;
mod object_factory;
mod public_key;
mod ring;
mod secret_key;
mod signature;
mod signature_generator;

pub use self::collection::{
    KeyRing, KeyRingCollection, PublicKeyRingCollection, SecretKeyRingCollection,
};
pub use self::encrypted::{
    DecryptedStream, EncryptedData, EncryptedDataList, EncryptedDataMethod, EncryptedMessage,
    PbeEncryptedData, PublicKeyEncryptedData,
};
pub use self::encryption_generator::{
    EncryptedDataGenerator, EncryptedDataWriter, KeyEncryptionMethod, PbeKeyEncryptionMethod,
    PublicKeyKeyEncryptionMethod,
};
pub use self::key_ring_generator::{
    KeyRingGenerator, KeyRingParams, KeyRingParamsBuilder, KeyType, SubkeyParams,
    SubkeyParamsBuilder,
};
pub use self::lookahead::TruncatedLookahead;
pub use self::object_factory::{Object, ObjectFactory};
pub use self::public_key::{Identity, PublicKey, UserIdentity};
pub use self::ring::{PublicKeyRing, SecretKeyRing};
pub use self::secret_key::{KeyPair, PrivateKey, SecretKey};
pub use self::signature::{
    OnePassSignatureList, OnePassSignatureVerifier, Signature, SignatureList, SignatureVerifier,
};
pub use self::signature_generator::SignatureGenerator;
