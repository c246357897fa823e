//! Turns classified packets into [`Sample`]s.
//!
//! The assembler owns all per-connection decoding state: the last absolute
//! channel counts (Ganglion deltas are relative to them), the accelerometer
//! axes collected so far, the impedance table, the sequence counter and the
//! pending lower half of a daisy pair. Nothing here is shared between
//! connections; every decoder owns exactly one assembler.

use log::{debug, info};

use crate::bitfield::{
    interpret_16_bit_as_int_32, interpret_24_bit_as_int_32, interpret_8_bit_as_int_8,
};
use crate::compression::{decompress_deltas_18bit, decompress_deltas_19bit, DeltaPair};
use crate::config::{Board, DecoderConfig};
use crate::decoder::DecodeBatch;
use crate::errors::{DecodeError, Result};
use crate::packet::{
    PacketType, RawFrame, BLE_PACKET_SIZE, RAW_ACCEL_AXES, RAW_CHANNELS, RAW_PACKET_SIZE,
    RAW_POSITION_AUX_START, RAW_POSITION_CHANNEL_DATA_START, RAW_POSITION_SAMPLE_NUMBER,
    RAW_POSITION_STOP_BYTE, RAW_POSITION_TIME_SYNC_TIME_START,
};
use crate::sample::{AuxData, Sample};
use crate::scale::ScaleFactors;

/// Tag of the first Ganglion impedance packet (channel 1).
const BLE_IMPEDANCE_TAG_BASE: u8 = 201;
/// Offset between 19-bit packet tags and their packet id.
const BLE_19BIT_TAG_OFFSET: u8 = 100;
/// Byte of an 18-bit packet that carries one accelerometer axis.
const BLE_ACCEL_BYTE: usize = 19;
const IMPEDANCE_TERMINATOR: &[u8] = b"Z\n";

// ============================================================================
// Channel state
// ============================================================================

/// Decoding state of one board connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    /// Last absolute counts, one per channel of a single packet.
    pub last_counts: Vec<i32>,
    /// Accelerometer axes in counts, updated one axis at a time on some formats.
    pub last_accel: [i32; RAW_ACCEL_AXES],
    /// Last emitted channel values (scaled), reused by impedance samples.
    pub last_channel_data: Vec<f64>,
    /// Impedance per channel, reference electrode last.
    pub impedance: Vec<f64>,
    pub last_sequence: Option<u16>,
    /// Packets lost since the decoder was created.
    pub dropped_packets: usize,
    pending_lower: Option<Sample>,
}

impl ChannelState {
    pub fn new(channels_per_packet: usize, channel_count: usize) -> Self {
        Self {
            last_counts: vec![0; channels_per_packet],
            last_accel: [0; RAW_ACCEL_AXES],
            last_channel_data: vec![0.0; channel_count],
            impedance: vec![0.0; channel_count + 1],
            last_sequence: None,
            dropped_packets: 0,
            pending_lower: None,
        }
    }

    /// Record a sequence number and return how many packets went missing
    /// since the previous one. The first packet seen never counts as a gap.
    pub fn observe_sequence(&mut self, sequence: u16, modulus: u16) -> usize {
        let gap = match self.last_sequence {
            None => 0,
            Some(last) => {
                (i32::from(sequence) - i32::from(last) - 1).rem_euclid(i32::from(modulus)) as usize
            }
        };
        self.last_sequence = Some(sequence);
        self.dropped_packets += gap;
        gap
    }

    /// A daisy lower half is waiting for its successor.
    pub fn has_pending_half(&self) -> bool {
        self.pending_lower.is_some()
    }
}

// ============================================================================
// Assembler
// ============================================================================

/// Packet-to-sample conversion for one board connection.
#[derive(Debug, Clone)]
pub struct SampleAssembler {
    board: Board,
    daisy: bool,
    scale: ScaleFactors,
    modulus: u16,
    state: ChannelState,
    /// Text of a Ganglion ASCII message still being received.
    message: Vec<u8>,
}

impl SampleAssembler {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            board: config.board,
            daisy: config.daisy,
            scale: config.scale_factors(),
            modulus: config.board.sequence_modulus(),
            state: ChannelState::new(config.board.channels_per_packet(), config.channel_count()),
            message: Vec::new(),
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn scale_factors(&self) -> &ScaleFactors {
        &self.scale
    }

    pub fn board(&self) -> Board {
        self.board
    }

    /// Discard a pending daisy half and any partial ASCII message.
    pub fn reset_stream(&mut self) {
        self.state.pending_lower = None;
        self.message.clear();
    }

    // ------------------------------------------------------------------------
    // Raw frames (Cyton serial / WiFi)
    // ------------------------------------------------------------------------

    /// Decode one complete 33-byte frame into `batch`.
    ///
    /// In daisy mode an odd sample is held back until its upper half arrives,
    /// so a call may add zero samples.
    pub fn push_raw(
        &mut self,
        frame: &RawFrame,
        timestamp_us: Option<u64>,
        batch: &mut DecodeBatch,
    ) -> Result<()> {
        let bytes = frame.bytes.as_slice();
        DecodeError::check_len(bytes, RAW_PACKET_SIZE)?;
        let packet_type = PacketType::from_stop_byte(bytes[RAW_POSITION_STOP_BYTE]);

        match packet_type {
            PacketType::Unknown => {
                return Err(DecodeError::UnknownPacketType(bytes[RAW_POSITION_STOP_BYTE]))
            }
            PacketType::Impedance => return self.raw_impedance(bytes, timestamp_us, batch),
            _ => {}
        }

        let sample_number = bytes[RAW_POSITION_SAMPLE_NUMBER];
        let counts = decode_raw_channels(bytes)?;

        let gap = self
            .state
            .observe_sequence(u16::from(sample_number), self.modulus);
        batch.sequence_gaps += gap;
        batch.dropped_packets += gap;

        let offset = if self.daisy && sample_number % 2 == 0 {
            RAW_CHANNELS
        } else {
            0
        };
        let mut sample = Sample::new(
            sample_number,
            self.scale.scale_channels(&counts, offset),
            packet_type,
        );
        sample.timestamp_us = timestamp_us;
        self.state.last_counts = counts;

        let aux_end = if packet_type.is_time_synced() {
            sample.board_time = Some(board_time(bytes));
            RAW_POSITION_TIME_SYNC_TIME_START
        } else {
            RAW_POSITION_STOP_BYTE
        };
        let aux = &bytes[RAW_POSITION_AUX_START..aux_end];

        if !packet_type.carries_accel() {
            sample.aux_data = AuxData::Raw(aux.to_vec());
        } else if packet_type == PacketType::StandardAccel {
            let mut accel = [0; RAW_ACCEL_AXES];
            for (axis, chunk) in accel.iter_mut().zip(aux.chunks_exact(2)) {
                *axis = interpret_16_bit_as_int_32(chunk)?;
            }
            self.state.last_accel = accel;
            sample.accel_data = Some(self.scale.scale_accel(accel));
        } else {
            // One axis per packet, the full reading completes on Z.
            let value = interpret_16_bit_as_int_32(aux)?;
            match sample_number % 10 {
                7 => self.state.last_accel[0] = value,
                8 => self.state.last_accel[1] = value,
                9 => {
                    self.state.last_accel[2] = value;
                    sample.accel_data = Some(self.scale.scale_accel(self.state.last_accel));
                }
                _ => {}
            }
        }

        self.emit(sample, batch);
        Ok(())
    }

    /// Impedance frames carry the channel number at byte 1 and the value as
    /// ASCII digits from byte 2. Channel 0 is the reference electrode.
    fn raw_impedance(
        &mut self,
        bytes: &[u8],
        timestamp_us: Option<u64>,
        batch: &mut DecodeBatch,
    ) -> Result<()> {
        let channel = bytes[RAW_POSITION_SAMPLE_NUMBER];
        let digits: Vec<u8> = bytes[RAW_POSITION_CHANNEL_DATA_START..RAW_POSITION_STOP_BYTE]
            .iter()
            .copied()
            .take_while(u8::is_ascii_digit)
            .collect();
        let value = parse_impedance_digits(&digits)?;

        let reference = self.state.impedance.len() - 1;
        let slot = match usize::from(channel) {
            0 => reference,
            n if n <= reference => n - 1,
            n => {
                return Err(DecodeError::MalformedImpedance(format!(
                    "channel {n} out of range"
                )))
            }
        };
        self.state.impedance[slot] = value;
        debug!("impedance channel {channel}: {value}");

        batch
            .samples
            .push(self.impedance_sample(channel, timestamp_us));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Ganglion BLE notifications
    // ------------------------------------------------------------------------

    /// Decode one 20-byte Ganglion notification into `batch`.
    ///
    /// The packet type is taken from the tag byte; `frame.packet_type` is
    /// not trusted.
    pub fn push_ble(
        &mut self,
        frame: &RawFrame,
        timestamp_us: Option<u64>,
        batch: &mut DecodeBatch,
    ) -> Result<()> {
        let bytes = frame.bytes.as_slice();
        let Some(&tag) = bytes.first() else {
            return Err(DecodeError::InvalidLength {
                expected: BLE_PACKET_SIZE,
                actual: 0,
            });
        };

        let packet_type = PacketType::from_ble_tag(tag);

        match packet_type {
            // 206 chunks accumulate until a 207 closes the message.
            PacketType::AsciiMessageStart => {
                self.message.extend_from_slice(text_payload(bytes));
                return Ok(());
            }
            PacketType::AsciiMessageEnd => {
                self.message.extend_from_slice(text_payload(bytes));
                let text = String::from_utf8_lossy(&self.message).into_owned();
                self.message.clear();
                info!("ganglion message: {}", text.trim_end());
                batch.messages.push(text);
                return Ok(());
            }
            _ => {}
        }

        if !self.message.is_empty() {
            debug!(
                "discarding {} bytes of unterminated ganglion message",
                self.message.len()
            );
            self.message.clear();
        }

        match packet_type {
            PacketType::Impedance => self.ble_impedance(tag, &bytes[1..], timestamp_us, batch),
            PacketType::RawUncompressed => {
                DecodeError::check_len(bytes, BLE_PACKET_SIZE)?;
                let mut counts = vec![0; self.state.last_counts.len()];
                for (count, chunk) in counts.iter_mut().zip(bytes[1..].chunks_exact(3)) {
                    *count = interpret_24_bit_as_int_32(chunk)?;
                }
                self.observe_packet_id(0, batch);

                let mut sample = Sample::new(
                    0,
                    self.scale.scale_channels(&counts, 0),
                    PacketType::RawUncompressed,
                );
                sample.timestamp_us = timestamp_us;
                self.state.last_counts = counts;
                self.emit(sample, batch);
                Ok(())
            }
            PacketType::Compressed18BitWithAccel => {
                DecodeError::check_len(bytes, BLE_PACKET_SIZE)?;
                let deltas = decompress_deltas_18bit(&bytes[1..BLE_ACCEL_BYTE])?;
                let axis = i32::from(interpret_8_bit_as_int_8(bytes[BLE_ACCEL_BYTE]));
                match tag % 10 {
                    1 => self.state.last_accel[0] = axis,
                    2 => self.state.last_accel[1] = axis,
                    3 => self.state.last_accel[2] = axis,
                    _ => {}
                }
                self.observe_packet_id(tag, batch);
                self.apply_deltas(tag, deltas, packet_type, timestamp_us, batch);
                Ok(())
            }
            PacketType::Compressed19BitNoAccel => {
                DecodeError::check_len(bytes, BLE_PACKET_SIZE)?;
                let deltas = decompress_deltas_19bit(&bytes[1..])?;
                let packet_id = tag - BLE_19BIT_TAG_OFFSET;
                self.observe_packet_id(packet_id, batch);
                self.apply_deltas(packet_id, deltas, packet_type, timestamp_us, batch);
                Ok(())
            }
            _ => Err(DecodeError::UnknownPacketType(tag)),
        }
    }

    fn observe_packet_id(&mut self, packet_id: u8, batch: &mut DecodeBatch) {
        let gap = self
            .state
            .observe_sequence(u16::from(packet_id), self.modulus);
        batch.sequence_gaps += gap;
        batch.dropped_packets += gap;
    }

    /// Subtract each delta from the previous absolute reading, oldest sample
    /// first. Sample numbers are `(packet_id - 1) * 2 + 1` and `+ 2`.
    fn apply_deltas(
        &mut self,
        packet_id: u8,
        deltas: DeltaPair,
        packet_type: PacketType,
        timestamp_us: Option<u64>,
        batch: &mut DecodeBatch,
    ) {
        let base = u16::from(packet_id.saturating_sub(1)) * 2;
        for (k, delta) in deltas.iter().enumerate() {
            for (count, d) in self.state.last_counts.iter_mut().zip(delta) {
                *count = count.wrapping_sub(*d);
            }

            let sample_number = (base + k as u16 + 1) as u8;
            let mut sample = Sample::new(
                sample_number,
                self.scale.scale_channels(&self.state.last_counts, 0),
                packet_type,
            );
            sample.timestamp_us = timestamp_us;
            if packet_type == PacketType::Compressed18BitWithAccel {
                sample.accel_data = Some(self.scale.scale_accel(self.state.last_accel));
            }
            self.emit(sample, batch);
        }
    }

    /// Ganglion impedance: tag 201 + channel, value as ASCII digits ending in
    /// `Z\n`, transmitted doubled. Tag 205 is the reference electrode.
    fn ble_impedance(
        &mut self,
        tag: u8,
        payload: &[u8],
        timestamp_us: Option<u64>,
        batch: &mut DecodeBatch,
    ) -> Result<()> {
        let end = payload
            .windows(IMPEDANCE_TERMINATOR.len())
            .position(|w| w == IMPEDANCE_TERMINATOR)
            .ok_or_else(|| DecodeError::MalformedImpedance("missing Z terminator".into()))?;
        let value = parse_impedance_digits(&payload[..end])? / 2.0;

        let slot = usize::from(tag - BLE_IMPEDANCE_TAG_BASE);
        let Some(entry) = self.state.impedance.get_mut(slot) else {
            return Err(DecodeError::MalformedImpedance(format!(
                "no impedance slot for tag {tag}"
            )));
        };
        *entry = value;
        debug!("impedance slot {slot}: {value}");

        let channel = tag - BLE_IMPEDANCE_TAG_BASE + 1;
        batch
            .samples
            .push(self.impedance_sample(channel, timestamp_us));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    fn impedance_sample(&self, channel: u8, timestamp_us: Option<u64>) -> Sample {
        let mut sample = Sample::new(
            channel,
            self.state.last_channel_data.clone(),
            PacketType::Impedance,
        );
        sample.impedance = Some(self.state.impedance.clone());
        sample.timestamp_us = timestamp_us;
        sample
    }

    /// Hand a data sample to the batch, pairing daisy halves first.
    fn emit(&mut self, sample: Sample, batch: &mut DecodeBatch) {
        if !self.daisy {
            self.push_sample(sample, batch);
            return;
        }

        if sample.sample_number % 2 == 1 {
            if let Some(orphan) = self.state.pending_lower.replace(sample) {
                debug!("daisy half {} had no successor", orphan.sample_number);
                self.drop_half(batch);
            }
            return;
        }

        match self.state.pending_lower.take() {
            Some(lower) if lower.sample_number.wrapping_add(1) == sample.sample_number => {
                self.push_sample(Sample::daisy(lower, sample), batch);
            }
            Some(lower) => {
                debug!(
                    "daisy halves {} and {} do not pair",
                    lower.sample_number, sample.sample_number
                );
                self.drop_half(batch);
                self.drop_half(batch);
            }
            None => {
                debug!("daisy half {} had no predecessor", sample.sample_number);
                self.drop_half(batch);
            }
        }
    }

    fn drop_half(&mut self, batch: &mut DecodeBatch) {
        self.state.dropped_packets += 1;
        batch.dropped_packets += 1;
        batch.daisy_halves_dropped += 1;
    }

    fn push_sample(&mut self, sample: Sample, batch: &mut DecodeBatch) {
        self.state.last_channel_data.clone_from(&sample.channel_data);
        batch.samples.push(sample);
    }
}

fn decode_raw_channels(bytes: &[u8]) -> Result<Vec<i32>> {
    bytes[RAW_POSITION_CHANNEL_DATA_START..RAW_POSITION_AUX_START]
        .chunks_exact(3)
        .map(interpret_24_bit_as_int_32)
        .collect()
}

/// Payload of an ASCII notification without its NUL padding.
fn text_payload(bytes: &[u8]) -> &[u8] {
    let payload = &bytes[1..];
    let end = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &payload[..end]
}

fn board_time(bytes: &[u8]) -> u32 {
    let mut time = [0u8; 4];
    time.copy_from_slice(&bytes[RAW_POSITION_TIME_SYNC_TIME_START..RAW_POSITION_STOP_BYTE]);
    u32::from_be_bytes(time)
}

fn parse_impedance_digits(digits: &[u8]) -> Result<f64> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::MalformedImpedance(format!(
            "expected ASCII digits, got {digits:02X?}"
        )));
    }
    let text = std::str::from_utf8(digits)
        .map_err(|e| DecodeError::MalformedImpedance(e.to_string()))?;
    text.parse::<f64>()
        .map_err(|e| DecodeError::MalformedImpedance(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitfield::encode_24_bit;
    use crate::compression::pack_fields;
    use crate::packet::encode_raw_frame;

    fn unscaled(config: DecoderConfig) -> SampleAssembler {
        SampleAssembler::new(&DecoderConfig {
            scaled_output: false,
            ..config
        })
    }

    fn raw(sample_number: u8, first: i32, aux: [u8; 6], nibble: u8) -> RawFrame {
        let channels: Vec<i32> = (first..first + 8).collect();
        RawFrame::raw(encode_raw_frame(sample_number, &channels, aux, nibble).unwrap())
    }

    fn ganglion_raw(counts: [i32; 4]) -> RawFrame {
        let mut bytes = vec![0u8];
        for count in counts {
            bytes.extend(encode_24_bit(count).unwrap());
        }
        bytes.extend([0u8; 7]);
        RawFrame::ble(bytes)
    }

    /// Deltas must be even when positive and odd when negative to survive the
    /// LSB sign flag.
    fn field(delta: i32, width: u32) -> u32 {
        (delta as u32) & ((1u32 << width) - 1)
    }

    fn ganglion_19bit(packet_id: u8, deltas: [[i32; 4]; 2]) -> RawFrame {
        let fields: Vec<u32> = deltas.iter().flatten().map(|&d| field(d, 19)).collect();
        let mut bytes = vec![packet_id + 100];
        bytes.extend(pack_fields(&fields, 19));
        RawFrame::ble(bytes)
    }

    fn ganglion_18bit(packet_id: u8, deltas: [[i32; 4]; 2], accel: i8) -> RawFrame {
        let fields: Vec<u32> = deltas.iter().flatten().map(|&d| field(d, 18)).collect();
        let mut bytes = vec![packet_id];
        bytes.extend(pack_fields(&fields, 18));
        bytes.push(accel as u8);
        RawFrame::ble(bytes)
    }

    fn ble_text(tag: u8, text: &[u8]) -> RawFrame {
        let mut bytes = vec![tag];
        bytes.extend_from_slice(text);
        bytes.resize(BLE_PACKET_SIZE, 0);
        RawFrame::ble(bytes)
    }

    #[test]
    fn sequence_gaps() {
        let mut state = ChannelState::new(8, 8);
        let gaps: Vec<usize> = [5, 6, 9].iter().map(|&s| state.observe_sequence(s, 256)).collect();
        assert_eq!(gaps, vec![0, 0, 2]);
        assert_eq!(state.dropped_packets, 2);

        assert_eq!(state.observe_sequence(255, 256), 245);
        assert_eq!(state.observe_sequence(1, 256), 1);
        assert_eq!(state.observe_sequence(2, 256), 0);
    }

    #[test]
    fn ganglion_packet_ids_wrap_at_101() {
        let mut state = ChannelState::new(4, 4);
        assert_eq!(state.observe_sequence(99, 101), 0);
        assert_eq!(state.observe_sequence(100, 101), 0);
        assert_eq!(state.observe_sequence(0, 101), 0);
        assert_eq!(state.observe_sequence(1, 101), 0);
        assert_eq!(state.observe_sequence(4, 101), 2);
    }

    #[test]
    fn standard_accel_frame() {
        let mut assembler = unscaled(DecoderConfig::cyton());
        let mut batch = DecodeBatch::default();
        let frame = raw(7, -3, [0x00, 0x10, 0xFF, 0xF0, 0x01, 0x00], 0);

        assembler.push_raw(&frame, Some(42), &mut batch).unwrap();

        let sample = &batch.samples[0];
        assert_eq!(sample.sample_number, 7);
        assert_eq!(sample.channel_data, vec![-3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sample.accel_data, Some([16.0, -16.0, 256.0]));
        assert_eq!(sample.timestamp_us, Some(42));
        assert!(sample.aux_data.is_none());
        assert_eq!(assembler.state().last_accel, [16, -16, 256]);
    }

    #[test]
    fn raw_aux_and_user_defined_keep_bytes() {
        let mut assembler = unscaled(DecoderConfig::cyton());
        let mut batch = DecodeBatch::default();
        assembler.push_raw(&raw(1, 0, [1, 2, 3, 4, 5, 6], 1), None, &mut batch).unwrap();
        assembler.push_raw(&raw(2, 0, [9, 8, 7, 6, 5, 4], 2), None, &mut batch).unwrap();

        assert_eq!(batch.samples[0].aux_data, AuxData::Raw(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(batch.samples[1].aux_data, AuxData::Raw(vec![9, 8, 7, 6, 5, 4]));
        assert_eq!(batch.samples[1].packet_type, PacketType::UserDefined);
        assert_eq!(batch.samples[1].accel_data, None);
    }

    #[test]
    fn time_synced_accel_completes_on_z() {
        let mut assembler = unscaled(DecoderConfig::cyton());
        let mut batch = DecodeBatch::default();
        let time = 0x0102_0304u32.to_be_bytes();
        for (sample_number, axis) in [(17u8, 0x0001u16), (18, 0x0002), (19, 0xFFFF)] {
            let a = axis.to_be_bytes();
            let aux = [a[0], a[1], time[0], time[1], time[2], time[3]];
            assembler
                .push_raw(&raw(sample_number, 0, aux, 4), None, &mut batch)
                .unwrap();
        }

        assert_eq!(batch.samples.len(), 3);
        assert_eq!(batch.samples[0].accel_data, None);
        assert_eq!(batch.samples[1].accel_data, None);
        assert_eq!(batch.samples[2].accel_data, Some([1.0, 2.0, -1.0]));
        assert!(batch.samples.iter().all(|s| s.board_time == Some(0x0102_0304)));
    }

    #[test]
    fn raw_aux_time_synced_splits_aux_and_time() {
        let mut assembler = unscaled(DecoderConfig::cyton());
        let mut batch = DecodeBatch::default();
        assembler
            .push_raw(&raw(3, 0, [0xAB, 0xCD, 0, 0, 1, 0], 6), None, &mut batch)
            .unwrap();
        assert_eq!(batch.samples[0].aux_data, AuxData::Raw(vec![0xAB, 0xCD]));
        assert_eq!(batch.samples[0].board_time, Some(256));
    }

    #[test]
    fn unknown_stop_nibble_is_rejected() {
        let mut assembler = unscaled(DecoderConfig::cyton());
        let mut batch = DecodeBatch::default();
        let result = assembler.push_raw(&raw(3, 0, [0; 6], 0x0A), None, &mut batch);
        assert_eq!(result, Err(DecodeError::UnknownPacketType(0xCA)));
        assert!(batch.samples.is_empty());
    }

    #[test]
    fn raw_impedance_frames() {
        let mut assembler = unscaled(DecoderConfig::cyton());
        let mut batch = DecodeBatch::default();

        let mut bytes = vec![0u8; RAW_PACKET_SIZE];
        bytes[0] = 0xA0;
        bytes[1] = 3;
        bytes[2..7].copy_from_slice(b"12345");
        bytes[RAW_POSITION_STOP_BYTE] = 0xC7;
        assembler.push_raw(&RawFrame::raw(bytes.clone()), None, &mut batch).unwrap();

        bytes[1] = 0;
        bytes[2..7].copy_from_slice(b"00777");
        assembler.push_raw(&RawFrame::raw(bytes.clone()), None, &mut batch).unwrap();

        let impedance = batch.samples[1].impedance.clone().unwrap();
        assert_eq!(impedance.len(), 9);
        assert_eq!(impedance[2], 12345.0);
        assert_eq!(impedance[8], 777.0);
        assert_eq!(batch.samples[1].n_channels(), 8);
        assert_eq!(batch.samples[1].packet_type, PacketType::Impedance);

        bytes[2] = b'Z';
        let result = assembler.push_raw(&RawFrame::raw(bytes), None, &mut batch);
        assert!(matches!(result, Err(DecodeError::MalformedImpedance(_))));
    }

    #[test]
    fn daisy_pairs_odd_then_even() {
        let mut assembler = unscaled(DecoderConfig::cyton_daisy());
        let mut batch = DecodeBatch::default();

        assembler.push_raw(&raw(1, 1, [0; 6], 1), Some(10), &mut batch).unwrap();
        assert!(batch.samples.is_empty());
        assert!(assembler.state().has_pending_half());

        assembler.push_raw(&raw(2, 9, [0; 6], 1), Some(20), &mut batch).unwrap();
        assert_eq!(batch.samples.len(), 1);
        let merged = &batch.samples[0];
        assert_eq!(merged.n_channels(), 16);
        assert_eq!(merged.channel_data[0], 1.0);
        assert_eq!(merged.channel_data[15], 16.0);
        assert_eq!(merged.timestamp_us, Some(10));
        assert_eq!(merged.sample_number, 2);
    }

    #[test]
    fn daisy_drops_unpaired_halves() {
        let mut assembler = unscaled(DecoderConfig::cyton_daisy());
        let mut batch = DecodeBatch::default();

        assembler.push_raw(&raw(1, 0, [0; 6], 1), None, &mut batch).unwrap();
        assembler.push_raw(&raw(3, 0, [0; 6], 1), None, &mut batch).unwrap();
        assembler.push_raw(&raw(4, 0, [0; 6], 1), None, &mut batch).unwrap();

        assert_eq!(batch.samples.len(), 1);
        assert_eq!(batch.samples[0].sample_number, 4);
        assert_eq!(batch.daisy_halves_dropped, 1);
        // sample 2 missing plus the orphaned half 1
        assert_eq!(batch.dropped_packets, 2);
    }

    #[test]
    fn ganglion_deltas_stack_on_raw_reading() {
        let mut assembler = unscaled(DecoderConfig::ganglion());
        let mut batch = DecodeBatch::default();

        assembler
            .push_ble(&ganglion_raw([1000, -2000, 3000, 0]), None, &mut batch)
            .unwrap();
        assembler
            .push_ble(
                &ganglion_19bit(1, [[2, -3, 4, 10], [-1, 0, 6, -5]]),
                Some(5),
                &mut batch,
            )
            .unwrap();

        assert_eq!(batch.samples.len(), 3);
        assert_eq!(batch.samples[0].channel_data, vec![1000.0, -2000.0, 3000.0, 0.0]);
        assert_eq!(batch.samples[1].sample_number, 1);
        assert_eq!(batch.samples[1].channel_data, vec![998.0, -1997.0, 2996.0, -10.0]);
        assert_eq!(batch.samples[2].sample_number, 2);
        assert_eq!(batch.samples[2].channel_data, vec![999.0, -1997.0, 2990.0, -5.0]);
        assert_eq!(batch.samples[2].timestamp_us, Some(5));
        assert_eq!(batch.samples[2].accel_data, None);
        assert_eq!(batch.sequence_gaps, 0);
    }

    #[test]
    fn ganglion_18bit_collects_accel_axes() {
        let mut assembler = unscaled(DecoderConfig::ganglion());
        let mut batch = DecodeBatch::default();
        let zero = [[0; 4]; 2];

        assembler.push_ble(&ganglion_18bit(1, zero, 5), None, &mut batch).unwrap();
        assembler.push_ble(&ganglion_18bit(2, zero, -6), None, &mut batch).unwrap();
        assembler.push_ble(&ganglion_18bit(3, zero, 7), None, &mut batch).unwrap();

        assert_eq!(batch.samples.len(), 6);
        assert_eq!(batch.samples[5].sample_number, 6);
        assert_eq!(batch.samples[5].accel_data, Some([5.0, -6.0, 7.0]));
        assert_eq!(batch.samples[0].accel_data, Some([5.0, 0.0, 0.0]));
    }

    #[test]
    fn ganglion_gap_detection() {
        let mut assembler = unscaled(DecoderConfig::ganglion());
        let mut batch = DecodeBatch::default();
        let zero = [[0; 4]; 2];
        assembler.push_ble(&ganglion_19bit(10, zero), None, &mut batch).unwrap();
        assembler.push_ble(&ganglion_19bit(13, zero), None, &mut batch).unwrap();
        assert_eq!(batch.sequence_gaps, 2);
        assert_eq!(batch.samples[3].sample_number, 26);
    }

    #[test]
    fn ganglion_impedance_is_halved() {
        let mut assembler = unscaled(DecoderConfig::ganglion());
        let mut batch = DecodeBatch::default();

        assembler.push_ble(&ble_text(202, b"2468Z\n"), None, &mut batch).unwrap();
        assembler.push_ble(&ble_text(205, b"100Z\n"), None, &mut batch).unwrap();

        assert_eq!(batch.samples.len(), 2);
        let impedance = batch.samples[1].impedance.clone().unwrap();
        assert_eq!(impedance, vec![0.0, 1234.0, 0.0, 0.0, 50.0]);
        assert_eq!(batch.samples[0].sample_number, 2);

        let result = assembler.push_ble(&ble_text(201, b"12"), None, &mut batch);
        assert!(matches!(result, Err(DecodeError::MalformedImpedance(_))));
    }

    #[test]
    fn ganglion_ascii_messages() {
        let mut assembler = unscaled(DecoderConfig::ganglion());
        let mut batch = DecodeBatch::default();

        assembler.push_ble(&ble_text(206, b"Ganglion v2."), None, &mut batch).unwrap();
        assert!(batch.messages.is_empty());
        assembler.push_ble(&ble_text(207, b"0.1$$$"), None, &mut batch).unwrap();

        assert_eq!(batch.messages, vec!["Ganglion v2.0.1$$$".to_string()]);
        assert!(batch.samples.is_empty());
    }

    #[test]
    fn ganglion_message_spans_several_chunks() {
        let mut assembler = unscaled(DecoderConfig::ganglion());
        let mut batch = DecodeBatch::default();

        assembler.push_ble(&ble_text(206, b"Ganglion v2.0.0 "), None, &mut batch).unwrap();
        assembler.push_ble(&ble_text(206, b"Starting stream "), None, &mut batch).unwrap();
        assembler.push_ble(&ble_text(207, b"$$$"), None, &mut batch).unwrap();
        assert_eq!(
            batch.messages,
            vec!["Ganglion v2.0.0 Starting stream $$$".to_string()]
        );

        // a data packet in between discards the partial text
        assembler.push_ble(&ble_text(206, b"lost "), None, &mut batch).unwrap();
        assembler.push_ble(&ganglion_raw([0; 4]), None, &mut batch).unwrap();
        assembler.push_ble(&ble_text(207, b"kept"), None, &mut batch).unwrap();
        assert_eq!(batch.messages[1], "kept");
    }

    #[test]
    fn ble_type_comes_from_the_tag() {
        let mut assembler = unscaled(DecoderConfig::ganglion());
        let mut batch = DecodeBatch::default();

        // a Cyton impedance frame: tag 0xA0, stop byte 0xC7
        let mut bytes = vec![0u8; RAW_PACKET_SIZE];
        bytes[0] = 0xA0;
        bytes[1..6].copy_from_slice(b"124Z\n");
        bytes[RAW_POSITION_STOP_BYTE] = 0xC7;
        let frame = RawFrame::raw(bytes);
        assert_eq!(frame.packet_type, PacketType::Impedance);

        assert_eq!(
            assembler.push_ble(&frame, None, &mut batch),
            Err(DecodeError::UnknownPacketType(0xA0))
        );

        // a mislabelled 19-bit packet still decodes as one
        let mut frame = ganglion_19bit(4, [[0; 4]; 2]);
        frame.packet_type = PacketType::Impedance;
        assembler.push_ble(&frame, None, &mut batch).unwrap();
        assert_eq!(batch.samples.len(), 2);
        assert_eq!(batch.samples[1].packet_type, PacketType::Compressed19BitNoAccel);
        assert_eq!(batch.samples[1].sample_number, 8);
    }

    #[test]
    fn ganglion_rejects_bad_notifications() {
        let mut assembler = unscaled(DecoderConfig::ganglion());
        let mut batch = DecodeBatch::default();

        assert_eq!(
            assembler.push_ble(&RawFrame::ble(vec![250; 20]), None, &mut batch),
            Err(DecodeError::UnknownPacketType(250))
        );
        assert_eq!(
            assembler.push_ble(&RawFrame::ble(vec![150; 12]), None, &mut batch),
            Err(DecodeError::InvalidLength {
                expected: 20,
                actual: 12
            })
        );
        assert!(assembler.push_ble(&RawFrame::ble(Vec::new()), None, &mut batch).is_err());
        assert_eq!(assembler.state().last_sequence, None);
    }
}
