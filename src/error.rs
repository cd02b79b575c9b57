use crate::protocol::{ResponseType, MIN_FRAME_LENGTH};
use std::fmt;

/// Which integrity gate rejected a checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStage {
    /// Raw frame bytes, checked while validating the frame.
    Frame,
    /// Checksum field of a decoded record.
    Record,
}

impl fmt::Display for ChecksumStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChecksumStage::Frame => write!(f, "Frame"),
            ChecksumStage::Record => write!(f, "Record"),
        }
    }
}

/// Errors produced while validating and decoding JBD BMS frames.
///
/// Every variant is recoverable; the caller decides whether to request again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Incomplete frame - received {0} bytes, minimum is {min}", min = MIN_FRAME_LENGTH)]
    IncompleteFrame(usize),
    #[error("Invalid start byte 0x{0:02X}")]
    InvalidStartByte(u8),
    #[error("Invalid end byte 0x{0:02X}")]
    InvalidEndByte(u8),
    #[error("Length mismatch - received={received} expected={expected}")]
    LengthMismatch { received: usize, expected: usize },
    /// The frame is well formed but the BMS reported a fault code.
    #[error("Device status error 0x{0:02X}")]
    DeviceStatusError(u8),
    #[error("Unknown response type 0x{0:02X}")]
    UnknownResponseType(u8),
    #[error("{stage} checksum mismatch - calculated=0x{calculated:04X} received=0x{received:04X}")]
    ChecksumMismatch {
        stage: ChecksumStage,
        calculated: u16,
        received: u16,
    },
    /// The decoder was asked to interpret a frame of an unsupported type.
    #[error("Decoding of response type 0x{0:02X} is not supported")]
    UnsupportedType(u8),
    #[error("Payload size mismatch - received={received} expected={expected}")]
    PayloadSizeMismatch { received: usize, expected: usize },
    /// Cell voltage payloads hold whole 16-bit entries for at most six cells.
    #[error("Malformed cell voltage payload of {0} bytes")]
    MalformedCellPayload(u8),
    /// A valid frame arrived, but for another request.
    #[error("Expected {expected} response, received {received}")]
    ResponseMismatch {
        expected: ResponseType,
        received: ResponseType,
    },
}
