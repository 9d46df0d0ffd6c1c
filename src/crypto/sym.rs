use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use camellia::{Camellia128, Camellia192, Camellia256};
use cast5::Cast5;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};
use cipher::{BlockCipher, BlockEncryptMut};
use des::TdesEde3;
use idea::Idea;
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};
use rand::{CryptoRng, Rng};
use twofish::Twofish;
use zeroize::Zeroizing;

use crate::errors::{bail, unimplemented_err, Result};

/// Available symmetric key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-9.2>
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum SymmetricKeyAlgorithm {
    /// Plaintext or unencrypted data
    #[cfg_attr(test, proptest(skip))]
    Plaintext = 0,
    /// IDEA
    IDEA = 1,
    /// Triple-DES
    TripleDES = 2,
    /// CAST5
    CAST5 = 3,
    /// Blowfish
    Blowfish = 4,
    // 5 & 6 are reserved for DES/SK
    /// AES with 128-bit key
    AES128 = 7,
    /// AES with 192-bit key
    AES192 = 8,
    /// AES with 256-bit key
    AES256 = 9,
    /// Twofish with 256-bit key
    Twofish = 10,
    /// [Camellia](https://tools.ietf.org/html/rfc5581#section-3) with 128-bit key
    Camellia128 = 11,
    /// [Camellia](https://tools.ietf.org/html/rfc5581#section-3) with 192-bit key
    Camellia192 = 12,
    /// [Camellia](https://tools.ietf.org/html/rfc5581#section-3) with 256-bit key
    Camellia256 = 13,

    #[num_enum(catch_all)]
    Other(#[cfg_attr(test, proptest(strategy = "14u8.."))] u8),
}

#[allow(clippy::derivable_impls)]
impl Default for SymmetricKeyAlgorithm {
    fn default() -> Self {
        Self::AES128
    }
}

impl zeroize::DefaultIsZeroes for SymmetricKeyAlgorithm {}

/// Direction a [CfbStream] transforms data in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfbDirection {
    Encrypt,
    Decrypt,
}

trait CfbCore {
    fn apply(&mut self, data: &mut [u8]);
}

struct CfbEncrypt<C: BlockEncryptMut + BlockCipher>(BufEncryptor<C>);
struct CfbDecrypt<C: BlockEncryptMut + BlockCipher>(BufDecryptor<C>);

impl<C: BlockEncryptMut + BlockCipher> CfbCore for CfbEncrypt<C> {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.encrypt(data);
    }
}

impl<C: BlockEncryptMut + BlockCipher> CfbCore for CfbDecrypt<C> {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.decrypt(data);
    }
}

fn new_core<C>(key: &[u8], iv: &[u8], direction: CfbDirection) -> Result<Box<dyn CfbCore>>
where
    C: BlockEncryptMut + BlockCipher + 'static,
    BufEncryptor<C>: KeyIvInit,
    BufDecryptor<C>: KeyIvInit,
{
    let core: Box<dyn CfbCore> = match direction {
        CfbDirection::Encrypt => Box::new(CfbEncrypt(BufEncryptor::<C>::new_from_slices(key, iv)?)),
        CfbDirection::Decrypt => Box::new(CfbDecrypt(BufDecryptor::<C>::new_from_slices(key, iv)?)),
    };
    Ok(core)
}

impl SymmetricKeyAlgorithm {
    /// The size of a single block in bytes.
    /// Based on <https://github.com/gpg/libgcrypt/blob/master/cipher>
    pub fn block_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::Plaintext => 0,
            SymmetricKeyAlgorithm::IDEA => 8,
            SymmetricKeyAlgorithm::TripleDES => 8,
            SymmetricKeyAlgorithm::CAST5 => 8,
            SymmetricKeyAlgorithm::Blowfish => 8,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 16,
            SymmetricKeyAlgorithm::AES256 => 16,
            SymmetricKeyAlgorithm::Twofish => 16,
            SymmetricKeyAlgorithm::Camellia128 => 16,
            SymmetricKeyAlgorithm::Camellia192 => 16,
            SymmetricKeyAlgorithm::Camellia256 => 16,
            SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// The size of the key in bytes.
    pub const fn key_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::Plaintext => 0,
            SymmetricKeyAlgorithm::IDEA => 16,
            SymmetricKeyAlgorithm::TripleDES => 24,
            SymmetricKeyAlgorithm::CAST5 => 16,
            SymmetricKeyAlgorithm::Blowfish => 16,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 24,
            SymmetricKeyAlgorithm::AES256 => 32,
            SymmetricKeyAlgorithm::Twofish => 32,
            SymmetricKeyAlgorithm::Camellia128 => 16,
            SymmetricKeyAlgorithm::Camellia192 => 24,
            SymmetricKeyAlgorithm::Camellia256 => 32,
            SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// True for the algorithms this crate can encrypt and decrypt with.
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_)
        )
    }

    fn new_core(self, key: &[u8], iv: &[u8], direction: CfbDirection) -> Result<Box<dyn CfbCore>> {
        match self {
            SymmetricKeyAlgorithm::Plaintext => {
                bail!("'Plaintext' is not a legal cipher for encrypted data")
            }
            SymmetricKeyAlgorithm::IDEA => new_core::<Idea>(key, iv, direction),
            SymmetricKeyAlgorithm::TripleDES => new_core::<TdesEde3>(key, iv, direction),
            SymmetricKeyAlgorithm::CAST5 => new_core::<Cast5>(key, iv, direction),
            SymmetricKeyAlgorithm::Blowfish => new_core::<Blowfish>(key, iv, direction),
            SymmetricKeyAlgorithm::AES128 => new_core::<Aes128>(key, iv, direction),
            SymmetricKeyAlgorithm::AES192 => new_core::<Aes192>(key, iv, direction),
            SymmetricKeyAlgorithm::AES256 => new_core::<Aes256>(key, iv, direction),
            SymmetricKeyAlgorithm::Twofish => new_core::<Twofish>(key, iv, direction),
            SymmetricKeyAlgorithm::Camellia128 => new_core::<Camellia128>(key, iv, direction),
            SymmetricKeyAlgorithm::Camellia192 => new_core::<Camellia192>(key, iv, direction),
            SymmetricKeyAlgorithm::Camellia256 => new_core::<Camellia256>(key, iv, direction),
            SymmetricKeyAlgorithm::Other(_) => {
                unimplemented_err!("SymmetricKeyAlgorithm {} is unsupported", u8::from(self))
            }
        }
    }

    /// Regular CFB encryption with the given IV, in place.
    pub fn encrypt_with_iv_regular(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        self.new_core(key, iv, CfbDirection::Encrypt)?.apply(data);
        Ok(())
    }

    /// Regular CFB decryption with the given IV, in place.
    pub fn decrypt_with_iv_regular(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        self.new_core(key, iv, CfbDirection::Decrypt)?.apply(data);
        Ok(())
    }

    /// Generates a new random session key for this algorithm.
    pub fn new_session_key<R: CryptoRng + Rng>(self, mut rng: R) -> Zeroizing<Vec<u8>> {
        let mut session_key = Zeroizing::new(vec![0u8; self.key_size()]);
        rng.fill_bytes(&mut session_key);
        session_key
    }

    /// Builds the random prefix that starts every encrypted data stream:
    /// one block of random data followed by a repeat of its last two octets.
    pub fn new_prefix<R: CryptoRng + Rng>(self, mut rng: R) -> Vec<u8> {
        let bs = self.block_size();
        let mut prefix = vec![0u8; bs + 2];
        rng.fill_bytes(&mut prefix[..bs]);
        prefix[bs] = prefix[bs - 2];
        prefix[bs + 1] = prefix[bs - 1];
        prefix
    }
}

/// A streaming CFB transform with a zero IV.
///
/// With `resync` set this is the OpenPGP CFB variant used by symmetrically encrypted
/// data packets: once the `block_size + 2` prefix octets have passed, the cipher is
/// restarted with the last `block_size` octets of prefix ciphertext as its IV.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-13.9>
pub struct CfbStream {
    alg: SymmetricKeyAlgorithm,
    key: Zeroizing<Vec<u8>>,
    direction: CfbDirection,
    core: Box<dyn CfbCore>,
    /// Prefix ciphertext collected so far, while a resync is pending.
    resync: Option<Vec<u8>>,
}

impl std::fmt::Debug for CfbStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CfbStream")
            .field("alg", &self.alg)
            .field("direction", &self.direction)
            .field("resync_pending", &self.resync.is_some())
            .finish()
    }
}

impl CfbStream {
    pub fn new(
        alg: SymmetricKeyAlgorithm,
        key: &[u8],
        direction: CfbDirection,
        resync: bool,
    ) -> Result<Self> {
        let iv = vec![0u8; alg.block_size()];
        let core = alg.new_core(key, &iv, direction)?;
        debug!("cfb stream {:?} {:?} resync={}", alg, direction, resync);

        Ok(CfbStream {
            alg,
            key: Zeroizing::new(key.to_vec()),
            direction,
            core,
            resync: resync.then(Vec::new),
        })
    }

    pub fn block_size(&self) -> usize {
        self.alg.block_size()
    }

    pub fn algorithm(&self) -> SymmetricKeyAlgorithm {
        self.alg
    }

    /// Transforms `data` in place.
    pub fn apply(&mut self, data: &mut [u8]) -> Result<()> {
        let prefix_len = self.alg.block_size() + 2;
        let Some(seen) = self.resync.as_mut() else {
            self.core.apply(data);
            return Ok(());
        };

        let take = (prefix_len - seen.len()).min(data.len());
        let (head, tail) = data.split_at_mut(take);
        match self.direction {
            CfbDirection::Encrypt => {
                self.core.apply(head);
                seen.extend_from_slice(head);
            }
            CfbDirection::Decrypt => {
                seen.extend_from_slice(head);
                self.core.apply(head);
            }
        }

        if seen.len() == prefix_len {
            self.core = self.alg.new_core(&self.key, &seen[2..], self.direction)?;
            self.resync = None;
            self.core.apply(tail);
        }

        Ok(())
    }
}
