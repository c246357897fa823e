//! OpenBCI telemetry decoder with optional Python bindings.
//!
//! Turns the byte streams produced by OpenBCI biosensing boards into timed,
//! scaled samples:
//!
//! - **Cyton** (8 channels, 16 with the daisy module): fixed 33-byte frames
//!   over the serial dongle or the WiFi shield, see [`CytonDecoder`].
//! - **Ganglion** (4 channels): 20-byte BLE notifications carrying raw,
//!   18-bit or 19-bit delta-compressed samples, see [`GanglionDecoder`].
//!
//! The crate does no I/O of its own. Callers read bytes from whatever
//! transport they use and hand them to a decoder, which returns a
//! [`DecodeBatch`] of samples and loss statistics.
//!
//! # Timing
//!
//! Boards do not timestamp their samples (except time-synced Cyton packets,
//! which carry a board clock). Pass the receive time to `feed_at` /
//! `decode_notification_at` and use the sample numbers to detect gaps:
//!
//! 1. Stamp each transport read with a monotonic receive time
//! 2. Watch `DecodeBatch::sequence_gaps` for dropped packets
//! 3. Reconstruct sample times as `first_time + index / sample_rate`
//!
//! ```
//! use openbci_rs::{encode_raw_frame, CytonDecoder, DecoderConfig};
//!
//! let mut decoder = CytonDecoder::new(DecoderConfig::cyton()).unwrap();
//! let frame = encode_raw_frame(0, &[0, 1, 2, 3, 4, 5, 6, 7], [0; 6], 0).unwrap();
//! let batch = decoder.feed(&frame);
//! assert_eq!(batch.samples.len(), 1);
//! ```

mod assembler;
mod bitfield;
mod compression;
mod config;
mod decoder;
mod errors;
pub mod logging;
mod packet;
#[cfg(feature = "python")]
mod python;
mod sample;
mod scale;
mod stream;

pub use assembler::{ChannelState, SampleAssembler};
pub use bitfield::{
    encode_16_bit, encode_24_bit, interpret_16_bit_as_int_32, interpret_18_bit_as_int_32,
    interpret_19_bit_as_int_32, interpret_24_bit_as_int_32, interpret_8_bit_as_int_8,
    sign_extend,
};
pub use compression::{
    decompress_deltas_18bit, decompress_deltas_19bit, DeltaPair, DELTA_18BIT_PAYLOAD_LEN,
    DELTA_19BIT_PAYLOAD_LEN,
};
pub use config::{
    Board, DecoderConfig, CYTON_CHANNELS_PER_PACKET, DEFAULT_MAX_BYTES_TO_SKIP,
    GANGLION_CHANNELS_PER_PACKET,
};
pub use decoder::{CytonDecoder, DecodeBatch, GanglionDecoder};
pub use errors::*;
pub use packet::{
    encode_raw_frame, is_stop_byte, make_stop_byte, raw_packet_type_nibble, PacketType, RawFrame,
    BLE_PACKET_SIZE, BLE_SEQUENCE_MODULUS, RAW_BYTE_START, RAW_BYTE_STOP, RAW_PACKET_SIZE,
    RAW_SEQUENCE_MODULUS,
};
pub use sample::{AuxData, Sample};
pub use scale::{AdcFullScale, ScaleFactors};
pub use stream::{StreamSynchronizer, SyncStats};
