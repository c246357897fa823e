use openbci_rs::{
    encode_24_bit, encode_raw_frame, AuxData, CytonDecoder, DecodeError, DecoderConfig,
    GanglionDecoder, PacketType, RAW_PACKET_SIZE,
};

const CHANNELS: [i32; 8] = [0x10, -0x10, 0x7FFFFF, -0x800000, 0, 1, -1, 0x123456];

fn frame(sample_number: u8, aux: [u8; 6], nibble: u8) -> Vec<u8> {
    encode_raw_frame(sample_number, &CHANNELS, aux, nibble).unwrap()
}

fn unscaled(config: DecoderConfig) -> DecoderConfig {
    DecoderConfig {
        scaled_output: false,
        ..config
    }
}

#[test]
fn garbage_and_corruption_between_frames() {
    let mut stream = vec![0x01, 0x02, 0x03, 0x04, 0x05];
    stream.extend(frame(1, [0; 6], 0));
    let mut corrupted = frame(2, [0; 6], 0);
    corrupted[RAW_PACKET_SIZE - 1] = 0x00;
    stream.extend(corrupted);
    stream.extend(frame(3, [0; 6], 0));

    let mut decoder = CytonDecoder::new(unscaled(DecoderConfig::cyton())).unwrap();
    let batch = decoder.feed(&stream);

    assert_eq!(batch.samples.len(), 2);
    assert_eq!(batch.samples[0].sample_number, 1);
    assert_eq!(batch.samples[1].sample_number, 3);
    assert!(batch.skipped_bytes >= 1);
    assert_eq!(batch.desync_events, 1);
    assert_eq!(batch.sequence_gaps, 1);
    assert_eq!(batch.dropped_packets, 1);
    assert_eq!(decoder.dropped_packets(), 1);
    assert!(batch.errors.contains(&DecodeError::FrameDesync {
        sample_number: 2,
        stop_byte: 0x00
    }));

    let expected: Vec<f64> = CHANNELS.iter().map(|&c| f64::from(c)).collect();
    assert_eq!(batch.samples[0].channel_data, expected);
}

#[test]
fn byte_at_a_time_matches_bulk_feed() {
    let mut stream = Vec::new();
    for n in 0..10u8 {
        stream.extend(frame(n, [0, 1, 0, 2, 0, 3], 0));
    }

    let mut bulk = CytonDecoder::new(DecoderConfig::cyton()).unwrap();
    let expected = bulk.feed(&stream).samples;

    let mut trickle = CytonDecoder::new(DecoderConfig::cyton()).unwrap();
    let mut samples = Vec::new();
    for byte in &stream {
        samples.extend(trickle.feed(std::slice::from_ref(byte)).samples);
    }

    assert_eq!(samples.len(), 10);
    assert_eq!(samples, expected);
}

#[test]
fn volts_scaling_at_default_gain() {
    let mut decoder = CytonDecoder::new(DecoderConfig::cyton()).unwrap();
    let batch = decoder.feed(&frame(0, [0; 6], 0));

    let scale = 4.5 / 8_388_607.0 / 24.0;
    let sample = &batch.samples[0];
    assert!((sample.channel_data[2] - 0x7FFFFF as f64 * scale).abs() < 1e-12);
    assert!((sample.channel_data[2] - 4.5 / 24.0).abs() < 1e-9);
}

#[test]
fn daisy_stream_produces_sixteen_channels() {
    let config = unscaled(DecoderConfig::cyton_daisy());
    let mut decoder = CytonDecoder::new(config).unwrap();

    let mut stream = Vec::new();
    stream.extend(frame(1, [1, 1, 1, 1, 1, 1], 1));
    stream.extend(frame(2, [2, 2, 2, 2, 2, 2], 1));
    stream.extend(frame(3, [0; 6], 1));
    stream.extend(frame(4, [0; 6], 1));
    let batch = decoder.feed_at(&stream, 500);

    assert_eq!(batch.samples.len(), 2);
    let first = &batch.samples[0];
    assert_eq!(first.n_channels(), 16);
    assert_eq!(first.sample_number, 2);
    assert_eq!(first.timestamp_us, Some(500));
    assert_eq!(
        first.aux_data,
        AuxData::Daisy {
            lower: vec![1; 6],
            upper: vec![2; 6]
        }
    );
    assert_eq!(first.channel_data[8], f64::from(CHANNELS[0]));
}

#[test]
fn wifi_packets_decode_back_to_back() {
    let mut decoder = CytonDecoder::new(DecoderConfig::cyton()).unwrap();
    let mut data = Vec::new();
    for n in 100..104u8 {
        data.extend(frame(n, [0; 6], 0));
    }
    let batch = decoder.decode_packets_at(&data, 9);
    assert_eq!(batch.samples.len(), 4);
    assert!(batch.errors.is_empty());
    assert!(batch
        .samples
        .iter()
        .all(|s| s.packet_type == PacketType::StandardAccel && s.timestamp_us == Some(9)));
}

#[test]
fn ganglion_raw_then_compressed() {
    let mut decoder = GanglionDecoder::new(unscaled(DecoderConfig::ganglion())).unwrap();

    let mut raw = vec![0u8];
    for count in [100, 200, -300, 0] {
        raw.extend(encode_24_bit(count).unwrap());
    }
    raw.resize(20, 0);
    let batch = decoder.decode_notification(&raw);
    assert_eq!(batch.samples[0].channel_data, vec![100.0, 200.0, -300.0, 0.0]);

    // 19-bit packet id 1 whose deltas are all zero
    let mut compressed = vec![101u8];
    compressed.resize(20, 0);
    let batch = decoder.decode_notification(&compressed);
    assert_eq!(batch.samples.len(), 2);
    assert_eq!(batch.samples[0].sample_number, 1);
    assert_eq!(batch.samples[1].sample_number, 2);
    for sample in &batch.samples {
        assert_eq!(sample.channel_data, vec![100.0, 200.0, -300.0, 0.0]);
    }

    // deltas of -1 on every channel raise each reading by one per sample
    let mut minus_one = vec![102u8];
    minus_one.resize(20, 0xFF);
    let batch = decoder.decode_notification(&minus_one);
    assert_eq!(batch.samples[1].channel_data, vec![102.0, 202.0, -298.0, 2.0]);
    assert_eq!(batch.sequence_gaps, 0);
}

#[test]
fn ganglion_impedance_and_messages() {
    let mut decoder = GanglionDecoder::new(DecoderConfig::ganglion()).unwrap();

    let mut packet = vec![203u8];
    packet.extend_from_slice(b"5000Z\n");
    packet.resize(20, 0);
    let batch = decoder.decode_notification(&packet);
    assert_eq!(batch.samples.len(), 1);
    assert_eq!(batch.samples[0].packet_type, PacketType::Impedance);
    assert_eq!(
        batch.samples[0].impedance,
        Some(vec![0.0, 0.0, 2500.0, 0.0, 0.0])
    );

    let mut messages = Vec::new();
    let chunks: [(u8, &[u8]); 3] = [(206, b"Ganglion v2.0.0 "), (206, b"Starting "), (207, b"$$$")];
    for (tag, text) in chunks {
        let mut chunk = vec![tag];
        chunk.extend_from_slice(text);
        chunk.resize(20, 0);
        messages.extend(decoder.decode_notification(&chunk).messages);
    }
    assert_eq!(messages, vec!["Ganglion v2.0.0 Starting $$$".to_string()]);
}

#[test]
fn sample_serializes_to_json() {
    let mut decoder = CytonDecoder::new(unscaled(DecoderConfig::cyton())).unwrap();
    let batch = decoder.feed(&frame(5, [0; 6], 1));
    let json = serde_json::to_value(&batch.samples[0]).unwrap();
    assert_eq!(json["sample_number"], 5);
    assert_eq!(json["packet_type"], "standard_raw_aux");
    assert_eq!(json["channel_data"][0], 16.0);
}
