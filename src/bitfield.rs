//! Bit-level integer conversions shared by every OpenBCI wire format.
//!
//! The boards transmit ADC counts as big-endian two's-complement integers
//! (24-bit channels, 16-bit accelerometer/aux) except for the Ganglion
//! compressed formats, which pack 18- or 19-bit deltas across byte boundaries
//! and carry the sign in the least-significant bit of the packed field.

use crate::errors::{DecodeError, Result};

/// Sign-extend the low `width` bits of `raw` to a full `i32`.
///
/// Bits above `width` are ignored. `width` must be in `1..=32`.
#[inline]
pub fn sign_extend(raw: u32, width: u32) -> i32 {
    debug_assert!((1..=32).contains(&width), "width out of range: {width}");
    let shift = 32 - width;
    ((raw << shift) as i32) >> shift
}

/// Decode a 3-byte big-endian two's-complement channel value.
///
/// `[0x81, 0xA1, 0x01]` decodes to `-8281855`.
pub fn interpret_24_bit_as_int_32(data: &[u8]) -> Result<i32> {
    DecodeError::check_len(data, 3)?;
    let raw = (u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2]);
    Ok(sign_extend(raw, 24))
}

/// Decode a 2-byte big-endian two's-complement value (accelerometer / aux).
pub fn interpret_16_bit_as_int_32(data: &[u8]) -> Result<i32> {
    DecodeError::check_len(data, 2)?;
    Ok(i32::from(i16::from_be_bytes([data[0], data[1]])))
}

/// Decode a Ganglion 19-bit delta from its 3-byte mini-buffer.
///
/// The firmware flags negative values with bit 0 of the last byte; in that
/// case bits 19..31 are filled with ones, otherwise the value is taken as is.
pub fn interpret_19_bit_as_int_32(data: &[u8]) -> Result<i32> {
    interpret_lsb_signed(data, 19)
}

/// Decode a Ganglion 18-bit delta from its 3-byte mini-buffer.
///
/// Same sign convention as [`interpret_19_bit_as_int_32`], extended from bit 18.
pub fn interpret_18_bit_as_int_32(data: &[u8]) -> Result<i32> {
    interpret_lsb_signed(data, 18)
}

fn interpret_lsb_signed(data: &[u8], width: u32) -> Result<i32> {
    DecodeError::check_len(data, 3)?;
    let raw = (u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2]);
    if data[2] & 0x01 != 0 {
        Ok((raw | (u32::MAX << width)) as i32)
    } else {
        Ok(raw as i32)
    }
}

/// Reinterpret one byte as a signed 8-bit value (Ganglion accelerometer axis).
#[inline]
pub fn interpret_8_bit_as_int_8(byte: u8) -> i8 {
    byte as i8
}

/// Encode a value as a 3-byte big-endian two's-complement field.
///
/// Returns `None` when `value` does not fit in 24 bits.
pub fn encode_24_bit(value: i32) -> Option<[u8; 3]> {
    if !(-(1 << 23)..(1 << 23)).contains(&value) {
        return None;
    }
    let [_, b0, b1, b2] = value.to_be_bytes();
    Some([b0, b1, b2])
}

/// Encode a value as a 2-byte big-endian two's-complement field.
pub fn encode_16_bit(value: i32) -> Option<[u8; 2]> {
    i16::try_from(value).ok().map(i16::to_be_bytes)
}
