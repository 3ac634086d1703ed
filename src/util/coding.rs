//! Varint and fixed-width integer coding, plus checksum masking.
//!
//! Multi-byte fixed-width integers are little-endian on disk. Varints
//! use the standard 7-bits-per-byte encoding with the high bit as a
//! continuation marker.

use bytes::BufMut;

/// Appends a varint-encoded u32 to `dst`.
pub fn put_varint32(dst: &mut impl BufMut, value: u32) {
    put_varint64(dst, value as u64);
}

/// Appends a varint-encoded u64 to `dst`.
pub fn put_varint64(dst: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Decodes a varint-encoded u64 from the front of `data`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// buffer is truncated or the encoding overflows 64 bits.
pub fn decode_varint64(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        if shift > 63 {
            return None;
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

/// Decodes a varint-encoded u32 from the front of `data`.
pub fn decode_varint32(data: &[u8]) -> Option<(u32, usize)> {
    let (value, n) = decode_varint64(data)?;
    if value > u32::MAX as u64 {
        return None;
    }
    Some((value as u32, n))
}

/// Reads a fixed little-endian u32 from `data` at `offset`.
pub fn get_fixed32(data: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    if end > data.len() {
        return None;
    }
    Some(u32::from_le_bytes(data[offset..end].try_into().unwrap()))
}

/// Reads a fixed little-endian u64 from `data` at `offset`.
pub fn get_fixed64(data: &[u8], offset: usize) -> Option<u64> {
    let end = offset.checked_add(8)?;
    if end > data.len() {
        return None;
    }
    Some(u64::from_le_bytes(data[offset..end].try_into().unwrap()))
}

/// Delta added after rotation when masking a checksum.
const MASK_DELTA: u32 = 0xa282_ead8;

/// Masks a CRC before storing it on disk.
///
/// Storing the raw CRC of data that itself embeds CRCs degrades the
/// checksum's error-detection properties, so the stored form is rotated
/// and offset.
pub fn mask_checksum(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Inverts [`mask_checksum`].
pub fn unmask_checksum(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}
