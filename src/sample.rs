//! Decoded sample records handed to the caller.

use serde::{Deserialize, Serialize};

use crate::packet::PacketType;

/// Auxiliary bytes that are not interpreted by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxData {
    #[default]
    None,
    /// Verbatim aux bytes of a raw-aux or user-defined packet.
    Raw(Vec<u8>),
    /// Aux bytes of both halves of a merged daisy sample.
    Daisy { lower: Vec<u8>, upper: Vec<u8> },
}

impl AuxData {
    /// The raw bytes of a single-board sample; empty otherwise.
    pub fn bytes(&self) -> &[u8] {
        match self {
            AuxData::Raw(bytes) => bytes,
            AuxData::None | AuxData::Daisy { .. } => &[],
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, AuxData::None)
    }
}

/// One timed observation from the board.
///
/// Channel values are in volts (or micro-volts) unless scaling was disabled,
/// in which case they hold raw ADC counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Board sample counter (0-255 on the Cyton, 0-200 on the Ganglion).
    pub sample_number: u8,
    pub channel_data: Vec<f64>,
    /// Accelerometer reading in g, when the packet completes one.
    pub accel_data: Option<[f64; 3]>,
    pub aux_data: AuxData,
    /// Last known impedance per channel (plus reference), when measured.
    pub impedance: Option<Vec<f64>>,
    /// Board clock of time-synced packets.
    pub board_time: Option<u32>,
    /// Receive time supplied by the caller, in microseconds.
    pub timestamp_us: Option<u64>,
    pub packet_type: PacketType,
    pub valid: bool,
}

impl Sample {
    #[inline]
    pub fn new(sample_number: u8, channel_data: Vec<f64>, packet_type: PacketType) -> Self {
        Self {
            sample_number,
            channel_data,
            accel_data: None,
            aux_data: AuxData::None,
            impedance: None,
            board_time: None,
            timestamp_us: None,
            packet_type,
            valid: true,
        }
    }

    /// Merge the two halves of a 16-channel Cyton + Daisy reading.
    ///
    /// Channels are `lower ++ upper`; timestamp, packet type and stop-byte
    /// semantics come from the lower half, the sample number from the upper.
    /// The board reports the accelerometer on only some samples, so a half
    /// with an all-zero reading defers to the other; two real readings are
    /// averaged.
    pub fn daisy(lower: Sample, upper: Sample) -> Sample {
        let accel_data = merge_accel(lower.accel_data, upper.accel_data);
        let aux_data = AuxData::Daisy {
            lower: lower.aux_data.bytes().to_vec(),
            upper: upper.aux_data.bytes().to_vec(),
        };

        let mut channel_data = lower.channel_data;
        channel_data.extend(upper.channel_data);

        Sample {
            sample_number: upper.sample_number,
            channel_data,
            accel_data,
            aux_data,
            impedance: lower.impedance.or(upper.impedance),
            board_time: lower.board_time.or(upper.board_time),
            timestamp_us: lower.timestamp_us,
            packet_type: lower.packet_type,
            valid: lower.valid && upper.valid,
        }
    }

    pub fn n_channels(&self) -> usize {
        self.channel_data.len()
    }
}

fn is_nonzero(accel: &[f64; 3]) -> bool {
    accel.iter().any(|&v| v != 0.0)
}

fn merge_accel(lower: Option<[f64; 3]>, upper: Option<[f64; 3]>) -> Option<[f64; 3]> {
    match (lower.filter(is_nonzero), upper.filter(is_nonzero)) {
        (Some(l), Some(u)) => Some([(l[0] + u[0]) / 2.0, (l[1] + u[1]) / 2.0, (l[2] + u[2]) / 2.0]),
        (Some(l), None) => Some(l),
        (None, Some(u)) => Some(u),
        (None, None) => lower.or(upper),
    }
}
