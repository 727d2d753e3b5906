//! Tagged frame codec.
//!
//! Every frame is `FRAME_SIZE` bytes, zero-padded, with an ASCII tag:
//! - `ID:`  + 16 bytes: sender's peer identity
//! - `ACC`: acknowledgment of a received identity
//! - `MSG:` + up to 252 bytes: application payload
//!
//! There is no length field. Trailing zero bytes of a `MSG:` payload cannot
//! be told apart from padding and are stripped on decode.

use thiserror::Error;

use crate::net::FRAME_SIZE;
use crate::peer::PeerId;

const IDENTIFY_TAG: &[u8] = b"ID:";
const ACCEPT_TAG: &[u8] = b"ACC";
const MESSAGE_TAG: &[u8] = b"MSG:";

/// Largest application payload that fits in one frame.
pub const MAX_PAYLOAD_SIZE: usize = FRAME_SIZE - MESSAGE_TAG.len();

/// Wire protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame starts with no known tag.
    #[error("Unknown frame tag: {0:?}")]
    UnknownTag([u8; 4]),

    /// `ID:` frame whose identifier cannot be parsed.
    #[error("Malformed peer identity")]
    MalformedIdentity,

    /// Payload does not fit after the tag.
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Identify(PeerId),
    Accept,
    Message(Vec<u8>),
}

impl Frame {
    /// Encode to tag + payload. The pool pads it to a full frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Frame::Identify(id) => Ok(encode_identify(id)),
            Frame::Accept => Ok(encode_accept()),
            Frame::Message(payload) => encode_message(payload),
        }
    }

    /// Decode one frame read off the wire.
    pub fn decode(frame: &[u8]) -> Result<Frame, ProtocolError> {
        if let Some(rest) = frame.strip_prefix(IDENTIFY_TAG) {
            let id = rest
                .get(..PeerId::LEN)
                .and_then(PeerId::from_slice)
                .ok_or(ProtocolError::MalformedIdentity)?;
            return Ok(Frame::Identify(id));
        }

        if frame.starts_with(ACCEPT_TAG) {
            return Ok(Frame::Accept);
        }

        if let Some(rest) = frame.strip_prefix(MESSAGE_TAG) {
            let len = rest.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            return Ok(Frame::Message(rest[..len].to_vec()));
        }

        let mut tag = [0u8; 4];
        let n = frame.len().min(4);
        tag[..n].copy_from_slice(&frame[..n]);
        Err(ProtocolError::UnknownTag(tag))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Identify(_) => "identify",
            Frame::Accept => "accept",
            Frame::Message(_) => "message",
        }
    }
}

pub fn encode_identify(id: &PeerId) -> Vec<u8> {
    let mut out = Vec::with_capacity(IDENTIFY_TAG.len() + PeerId::LEN);
    out.extend_from_slice(IDENTIFY_TAG);
    out.extend_from_slice(id.as_bytes());
    out
}

pub fn encode_accept() -> Vec<u8> {
    ACCEPT_TAG.to_vec()
}

/// Encode an application payload without copying it into a `Frame` first.
pub fn encode_message(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut out = Vec::with_capacity(MESSAGE_TAG.len() + payload.len());
    out.extend_from_slice(MESSAGE_TAG);
    out.extend_from_slice(payload);
    Ok(out)
}
