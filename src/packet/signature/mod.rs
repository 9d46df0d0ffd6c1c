mod de;
pub mod preamble;
mod ser;
mod subpacket;
mod types;

pub use self::{subpacket::*, types::*};
