//! Ganglion delta decompression.
//!
//! Compressed Ganglion packets carry two samples of four channels each as
//! deltas from the previous absolute reading. Each delta is rebuilt into a
//! 3-byte mini-buffer by shifting and masking the payload bytes below, then
//! sign-extended by [`crate::bitfield`].
//!
//! ```text
//! 19-bit: 8 deltas x 19 bits = 152 bits = 19 bytes
//! 18-bit: 8 deltas x 18 bits = 144 bits = 18 bytes (+1 accelerometer byte on the wire)
//! ```

use crate::bitfield::{interpret_18_bit_as_int_32, interpret_19_bit_as_int_32};
use crate::errors::{DecodeError, Result};

/// Deltas of one compressed packet: `[sample][channel]`.
pub type DeltaPair = [[i32; 4]; 2];

pub const DELTA_19BIT_PAYLOAD_LEN: usize = 19;
pub const DELTA_18BIT_PAYLOAD_LEN: usize = 18;

/// Unpack the 19-byte payload of a "19-bit compression without accelerometer" packet.
pub fn decompress_deltas_19bit(buffer: &[u8]) -> Result<DeltaPair> {
    DecodeError::check_len(buffer, DELTA_19BIT_PAYLOAD_LEN)?;
    let b = buffer;

    let mini_buffers: [[u8; 3]; 8] = [
        // Sample 1 - Channel 1
        [
            b[0] >> 5,
            ((b[0] & 0x1F) << 3) | (b[1] >> 5),
            ((b[1] & 0x1F) << 3) | (b[2] >> 5),
        ],
        // Sample 1 - Channel 2
        [
            (b[2] & 0x1F) >> 2,
            (b[2] << 6) | (b[3] >> 2),
            (b[3] << 6) | (b[4] >> 2),
        ],
        // Sample 1 - Channel 3
        [
            ((b[4] & 0x03) << 1) | (b[5] >> 7),
            ((b[5] & 0x7F) << 1) | (b[6] >> 7),
            ((b[6] & 0x7F) << 1) | (b[7] >> 7),
        ],
        // Sample 1 - Channel 4
        [
            (b[7] & 0x7F) >> 4,
            ((b[7] & 0x0F) << 4) | (b[8] >> 4),
            ((b[8] & 0x0F) << 4) | (b[9] >> 4),
        ],
        // Sample 2 - Channel 1
        [
            (b[9] & 0x0F) >> 1,
            (b[9] << 7) | (b[10] >> 1),
            (b[10] << 7) | (b[11] >> 1),
        ],
        // Sample 2 - Channel 2
        [
            ((b[11] & 0x01) << 2) | (b[12] >> 6),
            (b[12] << 2) | (b[13] >> 6),
            (b[13] << 2) | (b[14] >> 6),
        ],
        // Sample 2 - Channel 3
        [
            (b[14] & 0x38) >> 3,
            ((b[14] & 0x07) << 5) | ((b[15] & 0xF8) >> 3),
            ((b[15] & 0x07) << 5) | ((b[16] & 0xF8) >> 3),
        ],
        // Sample 2 - Channel 4
        [b[16] & 0x07, b[17], b[18]],
    ];

    collect_pair(&mini_buffers, interpret_19_bit_as_int_32)
}

/// Unpack the 18 delta bytes of a "18-bit compression with accelerometer" packet.
///
/// The trailing accelerometer byte of the wire payload must already be split off.
pub fn decompress_deltas_18bit(buffer: &[u8]) -> Result<DeltaPair> {
    DecodeError::check_len(buffer, DELTA_18BIT_PAYLOAD_LEN)?;

    // Both samples share one 9-byte layout.
    let first = mini_buffers_18bit(&buffer[..9]);
    let second = mini_buffers_18bit(&buffer[9..]);

    let mut mini_buffers = [[0u8; 3]; 8];
    mini_buffers[..4].copy_from_slice(&first);
    mini_buffers[4..].copy_from_slice(&second);

    collect_pair(&mini_buffers, interpret_18_bit_as_int_32)
}

fn mini_buffers_18bit(b: &[u8]) -> [[u8; 3]; 4] {
    [
        // Channel 1
        [
            b[0] >> 6,
            ((b[0] & 0x3F) << 2) | (b[1] >> 6),
            ((b[1] & 0x3F) << 2) | (b[2] >> 6),
        ],
        // Channel 2
        [
            (b[2] & 0x3F) >> 4,
            (b[2] << 4) | (b[3] >> 4),
            (b[3] << 4) | (b[4] >> 4),
        ],
        // Channel 3
        [
            (b[4] & 0x0F) >> 2,
            (b[4] << 6) | (b[5] >> 2),
            (b[5] << 6) | (b[6] >> 2),
        ],
        // Channel 4
        [b[6] & 0x03, b[7], b[8]],
    ]
}

fn collect_pair(
    mini_buffers: &[[u8; 3]; 8],
    interpret: fn(&[u8]) -> Result<i32>,
) -> Result<DeltaPair> {
    let mut deltas = [[0i32; 4]; 2];
    for (i, mini) in mini_buffers.iter().enumerate() {
        deltas[i / 4][i % 4] = interpret(mini)?;
    }
    Ok(deltas)
}

/// Pack `width`-bit fields MSB first, the way the Ganglion firmware does.
#[cfg(test)]
pub(crate) fn pack_fields(fields: &[u32], width: u32) -> Vec<u8> {
    let total_bits = fields.len() * width as usize;
    let mut out = vec![0u8; total_bits.div_ceil(8)];
    let mut bit = 0usize;
    for &field in fields {
        for i in (0..width).rev() {
            if (field >> i) & 1 == 1 {
                out[bit / 8] |= 0x80 >> (bit % 8);
            }
            bit += 1;
        }
    }
    out
}
