use std::num::TryFromIntError;

use ed25519_dalek::SignatureError;
use snafu::{Backtrace, Snafu};

use crate::types::KeyId;

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

pub use crate::parsing::{Error as ParsingError, RemainingError};

/// Error types
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid input"))]
    InvalidInput,
    #[snafu(display("malformed packet stream: {message}"))]
    Format { message: String },
    #[snafu(transparent)]
    PacketParsing { source: ParsingError },
    #[snafu(transparent)]
    IO {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(transparent)]
    TryFromInt { source: TryFromIntError },
    #[snafu(transparent)]
    Utf8Error { source: std::str::Utf8Error },

    #[snafu(transparent)]
    Rsa { source: rsa::errors::Error },
    #[snafu(transparent)]
    Ed25519 { source: SignatureError },
    #[snafu(display("invalid key length"))]
    InvalidKeyLength,
    #[snafu(display("cfb: invalid key iv length"))]
    CfbInvalidKeyIvLength,
    #[snafu(display(
        "key algorithm mismatch: signer expects {expected:?}, key is {actual:?}"
    ))]
    KeyAlgorithmMismatch {
        expected: crate::crypto::public_key::PublicKeyAlgorithm,
        actual: crate::crypto::public_key::PublicKeyAlgorithm,
    },
    #[snafu(display("Not yet implemented: {message}"))]
    Unimplemented { message: String },
    /// Signals packet versions and parameters we don't support, but can safely ignore
    #[snafu(display("Unsupported: {message}"))]
    Unsupported { message: String },

    #[snafu(display("session key checksum mismatch"))]
    SessionKeyChecksum,
    #[snafu(display("quick check bytes mismatch, wrong key or corrupted data"))]
    QuickCheck,
    #[snafu(display("secret key checksum mismatch, wrong passphrase"))]
    SecretKeyChecksum,
    #[snafu(display("Modification Detection Code error"))]
    MdcError,

    #[snafu(display("duplicate key id {key_id:?}"))]
    DuplicateKey { key_id: KeyId },
    #[snafu(display("no key ring with key id {key_id:?}"))]
    KeyNotFound { key_id: KeyId },

    #[snafu(display("invalid state: {message}"))]
    InvalidState { message: String },
    #[snafu(display("{message}"))]
    Message { message: String },
}

impl Error {
    /// Returns true for failures that indicate a wrong key or passphrase, or tampered data.
    pub fn is_data_validation(&self) -> bool {
        matches!(
            self,
            Error::SessionKeyChecksum
                | Error::QuickCheck
                | Error::SecretKeyChecksum
                | Error::MdcError
        )
    }

    /// Returns true for malformed input.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Error::Format { .. } | Error::PacketParsing { .. } | Error::InvalidInput
        )
    }
}

impl From<cipher::InvalidLength> for Error {
    fn from(_: cipher::InvalidLength) -> Error {
        Error::CfbInvalidKeyIvLength
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::Message { message: err }
    }
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(err: derive_builder::UninitializedFieldError) -> Error {
        Error::Message {
            message: err.to_string(),
        }
    }
}

#[macro_export]
macro_rules! unimplemented_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unimplemented { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unimplemented { message: format!($fmt, $($arg)+)})
    };
}

#[macro_export]
macro_rules! unsupported_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unsupported { message: $e.to_string()})
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unsupported { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! bail {
    ($e:expr) => {
        return Err($crate::errors::Error::Message { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Message { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! format_bail {
    ($e:expr) => {
        return Err($crate::errors::Error::Format { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Format { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! format_err {
    ($e:expr) => {
        $crate::errors::Error::Message { message: $e.to_string() }
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::Message { message: format!($fmt, $($arg)+) }
    };
}

#[macro_export]
macro_rules! state_err {
    ($e:expr) => {
        $crate::errors::Error::InvalidState { message: $e.to_string() }
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::InvalidState { message: format!($fmt, $($arg)+) }
    };
}

#[macro_export(local_inner_macros)]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            bail!($fmt, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::bail!(r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr,) => ({
        $crate::ensure_eq!($left, $right)
    });
    ($left:expr, $right:expr, $($arg:tt)+) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::bail!(r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`: {}"#, left_val, right_val,
                           format_args!($($arg)+))
                }
            }
        }
    });
}

pub(crate) use {
    bail, ensure, ensure_eq, format_bail, format_err, state_err, unimplemented_err,
    unsupported_err,
};
