//! Packet layouts and packet-type classification.
//!
//! # Raw (Cyton serial / WiFi high-speed) frame
//!
//! ```text
//! 0:[0xA0] | 1:[sample number] | 2..26:[8 x 3B channel] | 26..32:[3 x 2B aux] | 32:[0xCx]
//! ```
//!
//! The low nibble of the stop byte selects how the aux bytes are interpreted.
//!
//! # Ganglion BLE notification
//!
//! ```text
//! 0:[tag] | 1..20:[format dependent payload]
//! ```

use serde::{Deserialize, Serialize};

use crate::bitfield::encode_24_bit;

// ============================================================================
// Constants
// ============================================================================

pub const RAW_BYTE_START: u8 = 0xA0;
pub const RAW_BYTE_STOP: u8 = 0xC0;
pub const RAW_PACKET_SIZE: usize = 33;

pub const RAW_POSITION_SAMPLE_NUMBER: usize = 1;
pub const RAW_POSITION_CHANNEL_DATA_START: usize = 2;
pub const RAW_POSITION_AUX_START: usize = 26;
pub const RAW_POSITION_TIME_SYNC_TIME_START: usize = 28;
pub const RAW_POSITION_STOP_BYTE: usize = 32;
pub const RAW_AUX_BYTES: usize = 6;
pub const RAW_ACCEL_AXES: usize = 3;
pub const RAW_CHANNELS: usize = 8;

pub const BLE_PACKET_SIZE: usize = 20;

/// Sequence numbers of the raw format wrap at 256.
pub const RAW_SEQUENCE_MODULUS: u16 = 256;
/// Ganglion packet ids (0 for raw, 1-100 for compressed) wrap at 101.
pub const BLE_SEQUENCE_MODULUS: u16 = 101;

// ============================================================================
// Packet type
// ============================================================================

/// Every packet variant the decoder can see on either wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    // Ganglion BLE
    RawUncompressed,
    Compressed18BitWithAccel,
    Compressed19BitNoAccel,
    Impedance,
    AsciiMessageStart,
    AsciiMessageEnd,
    // Cyton raw stop-byte nibble
    StandardAccel,
    StandardRawAux,
    UserDefined,
    AccelTimeSyncSet,
    AccelTimeSynced,
    RawAuxTimeSyncSet,
    RawAuxTimeSynced,
    Unknown,
}

impl PacketType {
    /// Classify a Ganglion notification by its leading tag byte.
    pub fn from_ble_tag(tag: u8) -> Self {
        match tag {
            0 => PacketType::RawUncompressed,
            1..=100 => PacketType::Compressed18BitWithAccel,
            101..=200 => PacketType::Compressed19BitNoAccel,
            201..=205 => PacketType::Impedance,
            206 => PacketType::AsciiMessageStart,
            207 => PacketType::AsciiMessageEnd,
            _ => PacketType::Unknown,
        }
    }

    /// Classify a raw frame by the low nibble of its stop byte.
    pub fn from_stop_byte(stop_byte: u8) -> Self {
        match raw_packet_type_nibble(stop_byte) {
            0 => PacketType::StandardAccel,
            1 => PacketType::StandardRawAux,
            2 => PacketType::UserDefined,
            3 => PacketType::AccelTimeSyncSet,
            4 => PacketType::AccelTimeSynced,
            5 => PacketType::RawAuxTimeSyncSet,
            6 => PacketType::RawAuxTimeSynced,
            7 => PacketType::Impedance,
            _ => PacketType::Unknown,
        }
    }

    /// Raw packets whose aux bytes carry an accelerometer reading.
    pub fn carries_accel(self) -> bool {
        matches!(
            self,
            PacketType::StandardAccel | PacketType::AccelTimeSyncSet | PacketType::AccelTimeSynced
        )
    }

    /// Raw packets whose last four bytes carry the board time.
    pub fn is_time_synced(self) -> bool {
        matches!(
            self,
            PacketType::AccelTimeSyncSet
                | PacketType::AccelTimeSynced
                | PacketType::RawAuxTimeSyncSet
                | PacketType::RawAuxTimeSynced
        )
    }
}

/// `true` if `byte` has the `0xCx` stop byte shape.
#[inline]
pub fn is_stop_byte(byte: u8) -> bool {
    (byte & 0xF0) == RAW_BYTE_STOP
}

#[inline]
pub fn raw_packet_type_nibble(stop_byte: u8) -> u8 {
    stop_byte & 0x0F
}

/// Build a stop byte carrying `nibble` as its packet type.
#[inline]
pub fn make_stop_byte(nibble: u8) -> u8 {
    RAW_BYTE_STOP | (nibble & 0x0F)
}

// ============================================================================
// Raw frame
// ============================================================================

/// One undecoded packet and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub packet_type: PacketType,
    pub bytes: Vec<u8>,
}

impl RawFrame {
    /// Wrap a complete raw (33-byte) frame, classifying it by its stop byte.
    pub fn raw(bytes: Vec<u8>) -> Self {
        let packet_type = bytes
            .last()
            .map_or(PacketType::Unknown, |&b| PacketType::from_stop_byte(b));
        Self { packet_type, bytes }
    }

    /// Wrap a Ganglion notification, classifying it by its tag byte.
    pub fn ble(bytes: Vec<u8>) -> Self {
        let packet_type = bytes
            .first()
            .map_or(PacketType::Unknown, |&b| PacketType::from_ble_tag(b));
        Self { packet_type, bytes }
    }
}

/// Assemble a raw frame from channel counts, e.g. to replay or simulate a board.
///
/// Returns `None` unless exactly 8 channels are given, each fitting in 24 bits.
pub fn encode_raw_frame(
    sample_number: u8,
    channels: &[i32],
    aux: [u8; RAW_AUX_BYTES],
    packet_type_nibble: u8,
) -> Option<Vec<u8>> {
    if channels.len() != RAW_CHANNELS {
        return None;
    }
    let mut frame = Vec::with_capacity(RAW_PACKET_SIZE);
    frame.push(RAW_BYTE_START);
    frame.push(sample_number);
    for &count in channels {
        frame.extend(encode_24_bit(count)?);
    }
    frame.extend(aux);
    frame.push(make_stop_byte(packet_type_nibble));
    Some(frame)
}
