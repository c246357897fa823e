//! Decoder configuration.
//!
//! A [`DecoderConfig`] is fixed for the lifetime of one board connection; the
//! scale factors and channel count derived from it never change mid-stream.

use serde::{Deserialize, Serialize};

use crate::errors::{DecodeError, Result};
use crate::packet::{BLE_SEQUENCE_MODULUS, RAW_SEQUENCE_MODULUS};
use crate::scale::{ScaleFactors, ADS1299_DEFAULT_GAIN, GANGLION_GAIN};

/// Bytes the stream scanner may consume without finding a frame before the
/// stream is reported as stalled.
pub const DEFAULT_MAX_BYTES_TO_SKIP: usize = 3000;

/// Channels carried by one Cyton frame (the daisy board adds a second frame).
pub const CYTON_CHANNELS_PER_PACKET: usize = 8;
pub const GANGLION_CHANNELS_PER_PACKET: usize = 4;

/// Supported board families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Board {
    /// Cyton over serial dongle or WiFi shield (raw 33-byte frames).
    #[default]
    Cyton,
    /// Ganglion over BLE (20-byte notifications).
    Ganglion,
}

impl Board {
    pub fn channels_per_packet(self) -> usize {
        match self {
            Board::Cyton => CYTON_CHANNELS_PER_PACKET,
            Board::Ganglion => GANGLION_CHANNELS_PER_PACKET,
        }
    }

    /// Wraparound of the sequence counter used for gap detection.
    pub fn sequence_modulus(self) -> u16 {
        match self {
            Board::Cyton => RAW_SEQUENCE_MODULUS,
            Board::Ganglion => BLE_SEQUENCE_MODULUS,
        }
    }

    fn default_gain(self) -> f64 {
        match self {
            Board::Cyton => ADS1299_DEFAULT_GAIN,
            Board::Ganglion => GANGLION_GAIN,
        }
    }
}

/// Everything a decoder needs to know about the connection it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub board: Board,
    /// Cyton with a daisy module: two frames merge into one 16-channel sample.
    pub daisy: bool,
    /// Per-channel gains. Empty means the board default on every channel.
    pub gains: Vec<f64>,
    /// Report channel data in micro-volts instead of volts.
    pub micro_volts: bool,
    /// When `false`, samples carry raw ADC counts.
    pub scaled_output: bool,
    pub max_bytes_to_skip: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            board: Board::Cyton,
            daisy: false,
            gains: Vec::new(),
            micro_volts: false,
            scaled_output: true,
            max_bytes_to_skip: DEFAULT_MAX_BYTES_TO_SKIP,
        }
    }
}

impl DecoderConfig {
    pub fn cyton() -> Self {
        Self::default()
    }

    pub fn cyton_daisy() -> Self {
        Self {
            daisy: true,
            ..Self::default()
        }
    }

    pub fn ganglion() -> Self {
        Self {
            board: Board::Ganglion,
            ..Self::default()
        }
    }

    /// Channels per emitted sample: 4, 8 or 16.
    pub fn channel_count(&self) -> usize {
        let per_packet = self.board.channels_per_packet();
        if self.daisy {
            per_packet * 2
        } else {
            per_packet
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.daisy && self.board != Board::Cyton {
            return Err(DecodeError::InvalidConfig(
                "daisy mode is only available on the Cyton".into(),
            ));
        }
        if !self.gains.is_empty() && self.gains.len() != self.channel_count() {
            return Err(DecodeError::InvalidConfig(format!(
                "expected {} gains, got {}",
                self.channel_count(),
                self.gains.len()
            )));
        }
        if let Some(gain) = self.gains.iter().find(|g| !g.is_finite() || **g <= 0.0) {
            return Err(DecodeError::InvalidConfig(format!(
                "gain must be a positive number, got {gain}"
            )));
        }
        if self.max_bytes_to_skip == 0 {
            return Err(DecodeError::InvalidConfig(
                "max_bytes_to_skip must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Gains with board defaults filled in.
    pub fn effective_gains(&self) -> Vec<f64> {
        if self.gains.is_empty() {
            vec![self.board.default_gain(); self.channel_count()]
        } else {
            self.gains.clone()
        }
    }

    pub fn scale_factors(&self) -> ScaleFactors {
        if !self.scaled_output {
            return ScaleFactors::unity(self.channel_count());
        }
        let gains = self.effective_gains();
        match self.board {
            Board::Cyton => ScaleFactors::ads1299(&gains, self.micro_volts),
            Board::Ganglion => ScaleFactors::ganglion(&gains, self.micro_volts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_counts() {
        assert_eq!(DecoderConfig::cyton().channel_count(), 8);
        assert_eq!(DecoderConfig::cyton_daisy().channel_count(), 16);
        assert_eq!(DecoderConfig::ganglion().channel_count(), 4);
    }

    #[test]
    fn rejects_daisy_ganglion() {
        let config = DecoderConfig {
            daisy: true,
            ..DecoderConfig::ganglion()
        };
        assert!(matches!(config.validate(), Err(DecodeError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_bad_gains() {
        let mut config = DecoderConfig::cyton();
        config.gains = vec![24.0; 4];
        assert!(config.validate().is_err());
        config.gains = vec![24.0, 24.0, 24.0, 0.0, 24.0, 24.0, 24.0, 24.0];
        assert!(config.validate().is_err());
        config.gains = vec![8.0; 8];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_gains_per_board() {
        assert_eq!(DecoderConfig::cyton_daisy().effective_gains(), vec![24.0; 16]);
        assert_eq!(DecoderConfig::ganglion().effective_gains(), vec![51.0; 4]);
    }

    #[test]
    fn unscaled_output_uses_unity_factors() {
        let config = DecoderConfig {
            scaled_output: false,
            ..DecoderConfig::cyton()
        };
        assert_eq!(config.scale_factors(), ScaleFactors::unity(8));
    }

    #[test]
    fn deserializes_partial_json() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{"board": "ganglion", "micro_volts": true}"#).unwrap();
        assert_eq!(config.board, Board::Ganglion);
        assert!(config.micro_volts);
        assert!(config.scaled_output);
        assert_eq!(config.max_bytes_to_skip, DEFAULT_MAX_BYTES_TO_SKIP);
    }
}
