//! Frame synchronization over a continuous raw byte stream.
//!
//! Serial and raw TCP transports deliver bytes in arbitrary chunks with no
//! framing of their own, and a lost bit shifts every following byte. The
//! synchronizer scans for the `0xA0` start byte, collects one fixed-size
//! frame and checks its `0xCx` stop byte. A bad stop byte drops the frame and
//! the next scan resynchronizes on the following start byte.
//!
//! ```text
//! AwaitStart -> ReadChannelData -> ReadAuxData -> ReadEndByte -> AwaitStart
//! ```

use log::debug;

use crate::errors::{DecodeError, Result};
use crate::packet::{
    is_stop_byte, RawFrame, RAW_AUX_BYTES, RAW_BYTE_START, RAW_POSITION_SAMPLE_NUMBER,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// Discarding bytes until the start byte.
    AwaitStart,
    /// Sample number plus 3 bytes per channel.
    ReadChannelData,
    /// 3 x 2 aux bytes.
    ReadAuxData,
    ReadEndByte,
}

/// Running counters of one synchronizer, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub frames: usize,
    /// Bytes discarded while looking for a start byte.
    pub skipped_bytes: usize,
    /// Scans that had to discard at least one byte before a start byte.
    pub skip_events: usize,
    pub desync_events: usize,
    pub stalls: usize,
}

/// Incremental raw-frame scanner. State persists across [`push`](Self::push) calls.
#[derive(Debug, Clone)]
pub struct StreamSynchronizer {
    state: SyncState,
    channels_per_packet: usize,
    max_bytes_to_skip: usize,
    frame: Vec<u8>,
    /// Bytes skipped in the current start-byte scan.
    skipped: usize,
    /// Bytes consumed since the last valid frame (or stall report).
    scanned: usize,
    stats: SyncStats,
}

impl StreamSynchronizer {
    pub fn new(channels_per_packet: usize, max_bytes_to_skip: usize) -> Self {
        let mut sync = Self {
            state: SyncState::AwaitStart,
            channels_per_packet,
            max_bytes_to_skip,
            frame: Vec::new(),
            skipped: 0,
            scanned: 0,
            stats: SyncStats::default(),
        };
        sync.frame.reserve(sync.frame_size());
        sync
    }

    /// Start byte + sample number + channels + aux + stop byte.
    pub fn frame_size(&self) -> usize {
        self.channel_data_end() + RAW_AUX_BYTES + 1
    }

    fn channel_data_end(&self) -> usize {
        RAW_POSITION_SAMPLE_NUMBER + 1 + 3 * self.channels_per_packet
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Drop any partial frame and start scanning afresh.
    pub fn reset(&mut self) {
        self.state = SyncState::AwaitStart;
        self.frame.clear();
        self.skipped = 0;
        self.scanned = 0;
    }

    /// Consume `data` and return every frame completed or rejected on the way.
    ///
    /// Rejections are [`DecodeError::FrameDesync`] for a bad stop byte and
    /// [`DecodeError::StreamStalled`] when the scan budget runs out; both leave
    /// the synchronizer ready for more input.
    pub fn push(&mut self, data: &[u8]) -> Vec<Result<RawFrame>> {
        let mut out = Vec::new();

        for &byte in data {
            self.scanned += 1;

            match self.state {
                SyncState::AwaitStart => {
                    if byte == RAW_BYTE_START {
                        if self.skipped > 0 {
                            debug!("skipped {} bytes before start byte", self.skipped);
                            self.stats.skip_events += 1;
                            self.skipped = 0;
                        }
                        self.frame.clear();
                        self.frame.push(byte);
                        self.state = SyncState::ReadChannelData;
                    } else {
                        self.skipped += 1;
                        self.stats.skipped_bytes += 1;
                    }
                }
                SyncState::ReadChannelData => {
                    self.frame.push(byte);
                    if self.frame.len() == self.channel_data_end() {
                        self.state = SyncState::ReadAuxData;
                    }
                }
                SyncState::ReadAuxData => {
                    self.frame.push(byte);
                    if self.frame.len() == self.channel_data_end() + RAW_AUX_BYTES {
                        self.state = SyncState::ReadEndByte;
                    }
                }
                SyncState::ReadEndByte => {
                    self.frame.push(byte);
                    self.state = SyncState::AwaitStart;
                    if is_stop_byte(byte) {
                        self.stats.frames += 1;
                        self.scanned = 0;
                        out.push(Ok(RawFrame::raw(std::mem::take(&mut self.frame))));
                    } else {
                        let sample_number = self.frame[RAW_POSITION_SAMPLE_NUMBER];
                        debug!(
                            "unexpected stop byte {:#04X} for sample {}: {:02X?}",
                            byte, sample_number, self.frame
                        );
                        self.stats.desync_events += 1;
                        self.frame.clear();
                        out.push(Err(DecodeError::FrameDesync {
                            sample_number,
                            stop_byte: byte,
                        }));
                    }
                }
            }

            if self.scanned >= self.max_bytes_to_skip {
                self.stats.stalls += 1;
                out.push(Err(DecodeError::StreamStalled {
                    scanned: self.scanned,
                }));
                self.scanned = 0;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{encode_raw_frame, PacketType, RAW_PACKET_SIZE};

    fn frame(sample_number: u8) -> Vec<u8> {
        encode_raw_frame(sample_number, &[1, 2, 3, 4, 5, 6, 7, 8], [0, 0, 0, 1, 0, 2], 0).unwrap()
    }

    fn frames_of(results: &[Result<RawFrame>]) -> Vec<&RawFrame> {
        results.iter().filter_map(|r| r.as_ref().ok()).collect()
    }

    #[test]
    fn frame_size_matches_cyton_packet() {
        assert_eq!(StreamSynchronizer::new(8, 3000).frame_size(), RAW_PACKET_SIZE);
    }

    #[test]
    fn resyncs_after_garbage_and_bad_stop_byte() {
        let mut stream = vec![0x01, 0x02, 0x03, 0x04, 0x05];
        stream.extend(frame(1));
        let mut corrupted = frame(2);
        corrupted[32] = 0x00;
        stream.extend(corrupted);
        stream.extend(frame(3));

        let mut sync = StreamSynchronizer::new(8, 3000);
        let results = sync.push(&stream);

        let frames = frames_of(&results);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].bytes[1], 1);
        assert_eq!(frames[1].bytes[1], 3);
        assert_eq!(frames[0].packet_type, PacketType::StandardAccel);

        let desyncs: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(
            desyncs,
            vec![&DecodeError::FrameDesync {
                sample_number: 2,
                stop_byte: 0x00
            }]
        );

        let stats = sync.stats();
        assert!(stats.skip_events >= 1);
        assert_eq!(stats.skipped_bytes, 5);
        assert_eq!(stats.desync_events, 1);
        assert_eq!(stats.frames, 2);
    }

    #[test]
    fn frames_split_across_chunks() {
        let mut stream = frame(10);
        stream.extend(frame(11));

        let mut sync = StreamSynchronizer::new(8, 3000);
        let mut frames = Vec::new();
        for chunk in stream.chunks(7) {
            for result in sync.push(chunk) {
                frames.push(result.unwrap());
            }
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].bytes, frame(11));
    }

    #[test]
    fn reports_stall_when_budget_runs_out() {
        let mut sync = StreamSynchronizer::new(8, 100);
        let results = sync.push(&[0x55; 250]);
        assert_eq!(
            results,
            vec![
                Err(DecodeError::StreamStalled { scanned: 100 }),
                Err(DecodeError::StreamStalled { scanned: 100 }),
            ]
        );
        assert_eq!(sync.stats().stalls, 2);

        // the budget restarts, so a good frame still comes through
        let results = sync.push(&frame(0));
        assert_eq!(frames_of(&results).len(), 1);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut sync = StreamSynchronizer::new(8, 3000);
        let full = frame(5);
        assert!(sync.push(&full[..20]).is_empty());
        sync.reset();
        let results = sync.push(&full);
        assert_eq!(frames_of(&results).len(), 1);
    }
}
