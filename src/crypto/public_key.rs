use num_enum::{FromPrimitive, IntoPrimitive};

/// Public key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-9.1>
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum PublicKeyAlgorithm {
    /// RSA (Encrypt and Sign)
    RSA = 1,
    /// DEPRECATED: RSA (Encrypt-Only)
    RSAEncrypt = 2,
    /// DEPRECATED: RSA (Sign-Only)
    RSASign = 3,
    /// Elgamal (Encrypt-Only)
    ElgamalEncrypt = 16,
    /// DSA (Digital Signature Algorithm)
    DSA = 17,
    /// Elliptic Curve: RFC-6637
    ECDH = 18,
    /// ECDSA: RFC-6637
    ECDSA = 19,
    /// DEPRECATED: Elgamal (Encrypt and Sign)
    Elgamal = 20,
    /// Reserved for Diffie-Hellman (X9.42, as defined for IETF-S/MIME)
    DiffieHellman = 21,
    /// EdDSA with the framing from the RFC 4880bis drafts
    EdDSALegacy = 22,

    #[num_enum(catch_all)]
    Unknown(#[cfg_attr(test, proptest(strategy = "23u8.."))] u8),
}

impl PublicKeyAlgorithm {
    /// Can this algorithm produce signatures.
    pub fn can_sign(self) -> bool {
        matches!(
            self,
            PublicKeyAlgorithm::RSA
                | PublicKeyAlgorithm::RSASign
                | PublicKeyAlgorithm::DSA
                | PublicKeyAlgorithm::ECDSA
                | PublicKeyAlgorithm::Elgamal
                | PublicKeyAlgorithm::EdDSALegacy
        )
    }

    /// Can this algorithm be used to encrypt session keys.
    pub fn can_encrypt(self) -> bool {
        matches!(
            self,
            PublicKeyAlgorithm::RSA
                | PublicKeyAlgorithm::RSAEncrypt
                | PublicKeyAlgorithm::ElgamalEncrypt
                | PublicKeyAlgorithm::Elgamal
                | PublicKeyAlgorithm::ECDH
        )
    }

    /// True if both algorithms describe the same kind of key material.
    pub(crate) fn same_family(self, other: PublicKeyAlgorithm) -> bool {
        use PublicKeyAlgorithm::*;

        match (self, other) {
            (RSA | RSAEncrypt | RSASign, RSA | RSAEncrypt | RSASign) => true,
            (Elgamal | ElgamalEncrypt, Elgamal | ElgamalEncrypt) => true,
            (a, b) => a == b,
        }
    }
}
