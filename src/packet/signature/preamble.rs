//! Octets hashed ahead of the signature trailer for key related signatures.
//!
//! Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.4>

use byteorder::{BigEndian, WriteBytesExt};

use crate::errors::Result;
use crate::packet::{PublicKeyPacket, UserAttribute, UserId};
use crate::ser::Serialize;

/// `0x99`, two octet length and the public key packet body.
pub fn key(key: &PublicKeyPacket) -> Result<Vec<u8>> {
    let len = key.write_len();
    let mut out = Vec::with_capacity(3 + len);
    out.write_u8(0x99)?;
    out.write_u16::<BigEndian>(u16::try_from(len)?)?;
    key.to_writer(&mut out)?;
    Ok(out)
}

/// Primary key followed by the subkey, both in key framing.
pub fn subkey_binding(primary: &PublicKeyPacket, subkey: &PublicKeyPacket) -> Result<Vec<u8>> {
    let mut out = key(primary)?;
    out.extend_from_slice(&key(subkey)?);
    Ok(out)
}

/// The key followed by the user id. Version 4 signatures prefix the id with
/// `0xB4` and a four octet length, older versions hash the bare id.
pub fn user_id(primary: &PublicKeyPacket, id: &UserId, v4: bool) -> Result<Vec<u8>> {
    let mut out = key(primary)?;
    if v4 {
        out.write_u8(0xB4)?;
        out.write_u32::<BigEndian>(u32::try_from(id.id().len())?)?;
    }
    out.extend_from_slice(id.id());
    Ok(out)
}

/// Same as [user_id] for attributes, the v4 prefix octet is `0xD1`.
pub fn user_attribute(
    primary: &PublicKeyPacket,
    attribute: &UserAttribute,
    v4: bool,
) -> Result<Vec<u8>> {
    let mut out = key(primary)?;
    if v4 {
        out.write_u8(0xD1)?;
        out.write_u32::<BigEndian>(u32::try_from(attribute.write_len())?)?;
    }
    attribute.to_writer(&mut out)?;
    Ok(out)
}
