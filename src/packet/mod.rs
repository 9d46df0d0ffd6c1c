//! # Packet module
//!
//! Wire level representation of every packet this crate handles, plus the
//! framing around them: [PacketHeader], [PacketReader] and the body writers.
//!
//! ```rust
//! use pgp_core::packet::{read_packets, write_packet, Packet, UserId};
//! use pgp_core::ser::Serialize;
//!
//! let uid = UserId::from_str(Default::default(), "Alice <alice@example.org>");
//! let mut out = Vec::new();
//! write_packet(&mut out, &uid).unwrap();
//!
//! let packets = read_packets(&out).unwrap();
//! assert_eq!(packets, vec![Packet::UserId(uid)]);
//! assert_eq!(packets[0].to_bytes().unwrap(), out);
//! ```

mod header;
mod packet_sum;
mod packet_trait;
mod reader;
mod writer;

mod compressed_data;
mod key;
mod literal_data;
mod marker;
mod mod_detection_code;
mod one_pass_signature;
mod public_key_encrypted_session_key;
pub mod signature;
mod sym_encrypted_data;
mod sym_key_encrypted_session_key;
mod trust;
mod user_attribute;
mod user_id;

pub use self::compressed_data::*;
pub use self::header::*;
pub use self::key::*;
pub use self::literal_data::*;
pub use self::marker::*;
pub use self::mod_detection_code::*;
pub use self::one_pass_signature::*;
pub use self::packet_sum::*;
pub use self::packet_trait::PacketTrait;
pub(crate) use self::packet_trait::impl_packet_trait;
pub use self::public_key_encrypted_session_key::*;
pub use self::reader::*;
pub use self::signature::{
    KeyFlags, Notation, RevocationCode, RevocationKey, SignatureBytes, SignatureConfig,
    SignaturePacket, SignatureType, SignatureVersion, Subpacket, SubpacketData, SubpacketLength,
    SubpacketType, SubpacketVector, SubpacketVectorGenerator,
};
pub use self::sym_encrypted_data::*;
pub use self::sym_key_encrypted_session_key::*;
pub use self::trust::*;
pub use self::user_attribute::*;
pub use self::user_id::*;
pub use self::writer::*;
