use thiserror::Error;

/// All errors produced by the SackStream transport.
///
/// The first group are validation failures raised at the core's input
/// boundary (receiver adapter and window tracker). They never describe a
/// protocol outcome; `Done`, `WouldBlock` and friends are result variants.
#[derive(Debug, Error)]
pub enum SackStreamError {
    #[error("invalid byte range: start {start} is past end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("payload length mismatch: range covers {expected} bytes, payload has {actual}")]
    PayloadLengthMismatch { expected: u64, actual: usize },

    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("sack range [{start}, {end}) reaches beyond stream length {stream_len}")]
    SackOutOfRange { start: u64, end: u64, stream_len: u64 },

    #[error("payload character U+{0:04X} does not encode a single byte")]
    InvalidPayloadByte(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unexpected {got} message, expected {expected}")]
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
    },

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SackStreamError {
    /// Whether this error rejects malformed input (as opposed to an I/O or
    /// decoding fault in the driver).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SackStreamError::InvalidRange { .. }
                | SackStreamError::PayloadLengthMismatch { .. }
                | SackStreamError::PayloadTooLarge { .. }
                | SackStreamError::SackOutOfRange { .. }
                | SackStreamError::InvalidPayloadByte(_)
                | SackStreamError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SackStreamError>;
