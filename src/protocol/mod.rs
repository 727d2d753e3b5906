//! Wire protocol for the identity handshake and application messages.

pub mod frame;

pub use frame::{
    encode_accept, encode_identify, encode_message, Frame, ProtocolError, MAX_PAYLOAD_SIZE,
};
