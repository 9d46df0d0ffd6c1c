//! # Cryptography module
//!
//! Algorithm identifiers and the primitive operations behind the default
//! collaborators in [crate::operator].

pub mod checksum;
pub mod eddsa;
pub mod hash;
pub mod public_key;
pub mod rsa;
pub mod sym;
