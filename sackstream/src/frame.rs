//! SackStream wire messages.
//!
//! One JSON object per datagram, discriminated by `type`:
//!
//! ```text
//! {"type":"data","seq":[start,end],"id":7,"payload":"..."}
//! {"type":"ack","sacks":[[0,cursor],[s1,e1],...],"id":7}
//! {"type":"fin"}
//! ```
//!
//! The payload string maps every byte to the character with the same code
//! point (ISO-8859-1), so ASCII text travels as-is and arbitrary bytes
//! survive the round trip.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SackStreamError};
use crate::range::ByteRange;

/// Message kinds, used for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Data,
    Ack,
    Fin,
}

impl FrameType {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Data => "data",
            FrameType::Ack => "ack",
            FrameType::Fin => "fin",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Stream bytes `seq` carried in packet `id`.
    Data {
        seq: ByteRange,
        id: u64,
        #[serde(with = "latin1")]
        payload: Bytes,
    },
    /// Cumulative range first, then every pending range, answering `id`.
    Ack { sacks: Vec<ByteRange>, id: u64 },
    /// All data acknowledged; the receiver may drop its state.
    Fin,
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Data { .. } => FrameType::Data,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Fin => FrameType::Fin,
        }
    }

    /// Serialize into one datagram.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Parse one datagram. Range ordering is not checked here; the receiver
    /// adapter and window tracker validate at their boundary.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Parse a datagram that must be an ack.
    pub fn decode_ack(data: &[u8]) -> Result<(Vec<ByteRange>, u64)> {
        match Self::decode(data)? {
            Frame::Ack { sacks, id } => Ok((sacks, id)),
            other => Err(SackStreamError::UnexpectedMessage {
                expected: FrameType::Ack.as_str(),
                got: other.frame_type().as_str(),
            }),
        }
    }
}

/// Byte <-> ISO-8859-1 string mapping for payloads.
pub mod latin1 {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::error::{Result, SackStreamError};

    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|&b| char::from(b)).collect()
    }

    /// Fails on any character above U+00FF.
    pub fn decode(text: &str) -> Result<Bytes> {
        text.chars()
            .map(|c| u8::try_from(c).map_err(|_| SackStreamError::InvalidPayloadByte(c as u32)))
            .collect::<Result<Vec<u8>>>()
            .map(Bytes::from)
    }

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).map_err(serde::de::Error::custom)
    }
}
