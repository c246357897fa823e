use thiserror::Error;

/// Everything that can go wrong while turning board bytes into samples.
///
/// Only [`DecodeError::StreamStalled`] is meant to reach the transport layer as
/// an actionable failure. The per-frame variants are recovered inside the
/// decoder and reported through [`crate::DecodeBatch::errors`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unknown packet type: {0:#04X}")]
    UnknownPacketType(u8),
    #[error("frame desync: sample {sample_number} ended with {stop_byte:#04X} instead of 0xCx")]
    FrameDesync { sample_number: u8, stop_byte: u8 },
    #[error("stream stalled: scanned {scanned} bytes without a valid frame")]
    StreamStalled { scanned: usize },
    #[error("malformed impedance packet: {0}")]
    MalformedImpedance(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DecodeError {
    /// Shorthand for the length check every fixed-size decoder starts with.
    pub(crate) fn check_len(data: &[u8], expected: usize) -> Result<()> {
        if data.len() != expected {
            return Err(DecodeError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
