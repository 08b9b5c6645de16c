use thiserror::Error;

/// Errors produced while encoding or decoding wire messages.
///
/// Every decode failure is fatal for the connection it came from; the codec
/// never resynchronises inside a corrupt stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("wrong network magic {0:02x?}")]
    WrongMagic([u8; 4]),
    #[error("command field is not printable ascii")]
    BadCommand,
    #[error("payload length {len} exceeds the {max}-byte cap")]
    OversizedPayload { len: u32, max: usize },
    #[error("payload checksum mismatch")]
    ChecksumMismatch,
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("non-minimal varint encoding")]
    NonMinimalVarint,
    #[error("invalid {0}")]
    Invalid(&'static str),
    #[error("command {0:?} does not fit the 12-byte header field")]
    UnencodableCommand(String),
}
