//! Board-level decoders: the public entry points of the crate.
//!
//! [`CytonDecoder`] consumes raw byte streams (serial dongle, raw TCP) or
//! back-to-back 33-byte packets (WiFi shield high-speed mode).
//! [`GanglionDecoder`] consumes one BLE notification at a time.
//!
//! Both return a [`DecodeBatch`] per call: the samples that completed plus
//! counters for everything that was dropped on the way. Per-frame problems
//! never abort a batch; they are collected in [`DecodeBatch::errors`] and
//! summarized in the log once per batch.

use log::{debug, warn};

use crate::assembler::{ChannelState, SampleAssembler};
use crate::config::{Board, DecoderConfig};
use crate::errors::{DecodeError, Result};
use crate::packet::{
    is_stop_byte, RawFrame, RAW_BYTE_START, RAW_PACKET_SIZE, RAW_POSITION_SAMPLE_NUMBER,
    RAW_POSITION_STOP_BYTE,
};
use crate::sample::Sample;
use crate::stream::{StreamSynchronizer, SyncStats};

// ============================================================================
// Batch
// ============================================================================

/// Result of one decode call, including loss statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeBatch {
    /// Samples completed by this call, in arrival order.
    pub samples: Vec<Sample>,
    /// Packets missing according to the sequence counter.
    pub sequence_gaps: usize,
    /// Frames rejected for a bad stop byte.
    pub desync_events: usize,
    /// Bytes discarded while looking for a start byte.
    pub skipped_bytes: usize,
    /// Sequence gaps plus unpaired daisy halves. A rejected frame is not
    /// counted here; it shows up as a sequence gap once the next frame lands.
    pub dropped_packets: usize,
    pub daisy_halves_dropped: usize,
    /// Text sent by the board (Ganglion ASCII messages).
    pub messages: Vec<String>,
    /// Per-frame errors, in the order they occurred.
    pub errors: Vec<DecodeError>,
    /// The scan budget ran out without finding a frame.
    pub stalled: bool,
}

impl DecodeBatch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fold `other` into `self`, e.g. to collect a whole capture file.
    pub fn merge(&mut self, other: DecodeBatch) {
        self.samples.extend(other.samples);
        self.sequence_gaps += other.sequence_gaps;
        self.desync_events += other.desync_events;
        self.skipped_bytes += other.skipped_bytes;
        self.dropped_packets += other.dropped_packets;
        self.daisy_halves_dropped += other.daisy_halves_dropped;
        self.messages.extend(other.messages);
        self.errors.extend(other.errors);
        self.stalled |= other.stalled;
    }

    /// Escalate a stalled stream to an error; everything else is recoverable.
    pub fn into_result(self) -> Result<Self> {
        if self.stalled {
            let stall = self
                .errors
                .iter()
                .find(|e| matches!(e, DecodeError::StreamStalled { .. }))
                .cloned()
                .unwrap_or(DecodeError::StreamStalled { scanned: 0 });
            return Err(stall);
        }
        Ok(self)
    }

    fn record(&mut self, error: DecodeError) {
        match error {
            DecodeError::FrameDesync { .. } => self.desync_events += 1,
            DecodeError::StreamStalled { .. } => self.stalled = true,
            _ => {}
        }
        self.errors.push(error);
    }

    fn log_summary(&self) {
        if self.desync_events > 0 {
            warn!(
                "Frame desyncs in batch: {} (suppressing per-frame logs)",
                self.desync_events
            );
        }
        if self.sequence_gaps > 0 {
            warn!(
                "Sequence gaps detected in batch: {} (suppressing per-frame logs)",
                self.sequence_gaps
            );
        }
        if self.daisy_halves_dropped > 0 {
            warn!(
                "Unpaired daisy halves dropped: {}",
                self.daisy_halves_dropped
            );
        }
        if self.stalled {
            warn!("Stream stalled: no valid frame within the scan budget");
        }
        let other = self
            .errors
            .iter()
            .filter(|e| {
                !matches!(
                    e,
                    DecodeError::FrameDesync { .. } | DecodeError::StreamStalled { .. }
                )
            })
            .count();
        if other > 0 {
            warn!("Undecodable packets in batch: {}", other);
        }
    }
}

// ============================================================================
// Cyton
// ============================================================================

/// Decoder for the Cyton (and Cyton + Daisy) raw 33-byte frame format.
#[derive(Debug, Clone)]
pub struct CytonDecoder {
    config: DecoderConfig,
    sync: StreamSynchronizer,
    assembler: SampleAssembler,
}

impl CytonDecoder {
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        if config.board != Board::Cyton {
            return Err(DecodeError::InvalidConfig(format!(
                "CytonDecoder cannot decode {:?} packets",
                config.board
            )));
        }
        debug!(
            "Cyton decoder: channels={}, daisy={}, scaled={}",
            config.channel_count(),
            config.daisy,
            config.scaled_output
        );
        Ok(Self {
            sync: StreamSynchronizer::new(
                config.board.channels_per_packet(),
                config.max_bytes_to_skip,
            ),
            assembler: SampleAssembler::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn state(&self) -> &ChannelState {
        self.assembler.state()
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    /// Packets lost since the decoder was created.
    pub fn dropped_packets(&self) -> usize {
        self.assembler.state().dropped_packets
    }

    /// Feed an arbitrary chunk of a raw byte stream.
    pub fn feed(&mut self, data: &[u8]) -> DecodeBatch {
        self.feed_inner(data, None)
    }

    /// Like [`feed`](Self::feed), stamping every completed sample with the
    /// caller's receive time.
    pub fn feed_at(&mut self, data: &[u8], timestamp_us: u64) -> DecodeBatch {
        self.feed_inner(data, Some(timestamp_us))
    }

    fn feed_inner(&mut self, data: &[u8], timestamp_us: Option<u64>) -> DecodeBatch {
        let mut batch = DecodeBatch::default();
        let skipped_before = self.sync.stats().skipped_bytes;

        for result in self.sync.push(data) {
            match result {
                Ok(frame) => self.decode_frame(&frame, timestamp_us, &mut batch),
                Err(e) => batch.record(e),
            }
        }

        batch.skipped_bytes = self.sync.stats().skipped_bytes - skipped_before;
        batch.log_summary();
        batch
    }

    /// Decode a buffer of back-to-back 33-byte packets (WiFi shield).
    ///
    /// Each packet must start with `0xA0` and end with a `0xCx` stop byte;
    /// no resynchronization is attempted. A trailing partial packet is
    /// reported as [`DecodeError::InvalidLength`].
    pub fn decode_packets(&mut self, data: &[u8]) -> DecodeBatch {
        self.decode_packets_inner(data, None)
    }

    pub fn decode_packets_at(&mut self, data: &[u8], timestamp_us: u64) -> DecodeBatch {
        self.decode_packets_inner(data, Some(timestamp_us))
    }

    fn decode_packets_inner(&mut self, data: &[u8], timestamp_us: Option<u64>) -> DecodeBatch {
        let mut batch = DecodeBatch::default();

        let chunks = data.chunks_exact(RAW_PACKET_SIZE);
        let remainder = chunks.remainder().len();
        for packet in chunks {
            if packet[0] != RAW_BYTE_START || !is_stop_byte(packet[RAW_POSITION_STOP_BYTE]) {
                batch.record(DecodeError::FrameDesync {
                    sample_number: packet[RAW_POSITION_SAMPLE_NUMBER],
                    stop_byte: packet[RAW_POSITION_STOP_BYTE],
                });
                continue;
            }
            self.decode_frame(&RawFrame::raw(packet.to_vec()), timestamp_us, &mut batch);
        }
        if remainder > 0 {
            batch.record(DecodeError::InvalidLength {
                expected: RAW_PACKET_SIZE,
                actual: remainder,
            });
        }

        batch.log_summary();
        batch
    }

    fn decode_frame(
        &mut self,
        frame: &RawFrame,
        timestamp_us: Option<u64>,
        batch: &mut DecodeBatch,
    ) {
        if let Err(e) = self.assembler.push_raw(frame, timestamp_us, batch) {
            debug!("Dropping frame: {}", e);
            batch.record(e);
        }
    }

    /// Forget any partial frame and pending daisy half, e.g. after the
    /// transport reconnects. Impedance and loss counters are kept.
    pub fn reset_stream(&mut self) {
        self.sync.reset();
        self.assembler.reset_stream();
    }
}

// ============================================================================
// Ganglion
// ============================================================================

/// Decoder for Ganglion BLE notifications.
#[derive(Debug, Clone)]
pub struct GanglionDecoder {
    config: DecoderConfig,
    assembler: SampleAssembler,
}

impl GanglionDecoder {
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        if config.board != Board::Ganglion {
            return Err(DecodeError::InvalidConfig(format!(
                "GanglionDecoder cannot decode {:?} packets",
                config.board
            )));
        }
        debug!(
            "Ganglion decoder: channels={}, scaled={}",
            config.channel_count(),
            config.scaled_output
        );
        Ok(Self {
            assembler: SampleAssembler::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn state(&self) -> &ChannelState {
        self.assembler.state()
    }

    pub fn dropped_packets(&self) -> usize {
        self.assembler.state().dropped_packets
    }

    /// Decode one notification (normally 20 bytes, tag first).
    pub fn decode_notification(&mut self, payload: &[u8]) -> DecodeBatch {
        self.decode_inner(payload, None)
    }

    pub fn decode_notification_at(&mut self, payload: &[u8], timestamp_us: u64) -> DecodeBatch {
        self.decode_inner(payload, Some(timestamp_us))
    }

    fn decode_inner(&mut self, payload: &[u8], timestamp_us: Option<u64>) -> DecodeBatch {
        let mut batch = DecodeBatch::default();
        let frame = RawFrame::ble(payload.to_vec());
        if let Err(e) = self.assembler.push_ble(&frame, timestamp_us, &mut batch) {
            debug!("Dropping notification {:02X?}: {}", payload, e);
            batch.record(e);
        }
        batch.log_summary();
        batch
    }
}
