mod public;
mod secret;

pub use self::{
    public::PublicKeyPacket,
    secret::{S2kUsage, SecretKeyPacket},
};
