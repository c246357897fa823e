//! Conversion from ADC counts to physical units.

/// Reference voltage of the ADS1299 on the Cyton (V).
pub const ADS1299_VREF: f64 = 4.5;
/// Programmable gain the Cyton firmware starts with on every channel.
pub const ADS1299_DEFAULT_GAIN: f64 = 24.0;
/// Accelerometer scale on the Cyton, +/-4G range: 2 mg per 16 counts.
pub const CYTON_ACCEL_SCALE_FACTOR_GAIN: f64 = 0.002 / 16.0;

/// Reference voltage of the MCP3912 on the Ganglion (V).
pub const GANGLION_VREF: f64 = 1.2;
/// Fixed front-end gain of the Ganglion.
pub const GANGLION_GAIN: f64 = 51.0;
/// The MCP3912 full scale is 1.5x its signed 24-bit count range.
pub const GANGLION_FULL_SCALE_RATIO: f64 = 1.5;
/// Ganglion accelerometer: 0.016 mg per count.
pub const GANGLION_ACCEL_SCALE_FACTOR_GAIN: f64 = 0.000016;

const MICRO_VOLTS_PER_VOLT: f64 = 1_000_000.0;

/// Count range of the ADC used to derive the per-count voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdcFullScale {
    /// Signed 24-bit converter: `2^23 - 1`.
    #[default]
    Signed24,
    /// Unsigned 24-bit converter: `2^24 - 1`.
    Unsigned24,
}

impl AdcFullScale {
    pub fn counts(self) -> f64 {
        match self {
            AdcFullScale::Signed24 => ((1u32 << 23) - 1) as f64,
            AdcFullScale::Unsigned24 => ((1u32 << 24) - 1) as f64,
        }
    }
}

/// Per-channel multipliers computed once when a decoder is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleFactors {
    channels: Vec<f64>,
    accel: f64,
}

impl ScaleFactors {
    /// `vref / full_scale / gain` for every gain, times 1e6 when `micro_volts`.
    pub fn new(vref: f64, full_scale: f64, gains: &[f64], micro_volts: bool, accel: f64) -> Self {
        let channels = gains
            .iter()
            .map(|&gain| {
                let scale_factor = vref / full_scale / gain;
                if micro_volts {
                    scale_factor * MICRO_VOLTS_PER_VOLT
                } else {
                    scale_factor
                }
            })
            .collect();
        Self { channels, accel }
    }

    /// Scale factors of the Cyton's ADS1299 for the given channel gains.
    pub fn ads1299(gains: &[f64], micro_volts: bool) -> Self {
        Self::new(
            ADS1299_VREF,
            AdcFullScale::Signed24.counts(),
            gains,
            micro_volts,
            CYTON_ACCEL_SCALE_FACTOR_GAIN,
        )
    }

    /// Scale factors of the Ganglion front end for the given channel gains.
    pub fn ganglion(gains: &[f64], micro_volts: bool) -> Self {
        Self::new(
            GANGLION_VREF,
            AdcFullScale::Signed24.counts() * GANGLION_FULL_SCALE_RATIO,
            gains,
            micro_volts,
            GANGLION_ACCEL_SCALE_FACTOR_GAIN,
        )
    }

    /// Identity factors, for callers that want raw counts.
    pub fn unity(n_channels: usize) -> Self {
        Self {
            channels: vec![1.0; n_channels],
            accel: 1.0,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel(&self, index: usize) -> f64 {
        self.channels.get(index).copied().unwrap_or(1.0)
    }

    pub fn accel(&self) -> f64 {
        self.accel
    }

    /// Scale `counts` starting at channel `offset` (the upper daisy half uses 8).
    pub fn scale_channels(&self, counts: &[i32], offset: usize) -> Vec<f64> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &count)| f64::from(count) * self.channel(offset + i))
            .collect()
    }

    pub fn scale_accel(&self, counts: [i32; 3]) -> [f64; 3] {
        counts.map(|count| f64::from(count) * self.accel)
    }
}
