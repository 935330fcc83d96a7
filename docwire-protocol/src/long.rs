//! 64-bit integer carried as a high/low pair of 32-bit words.
//!
//! Request ids, context ids, row counts and LOB offsets all travel as 8-byte
//! integers whose word order depends on the negotiated byte order. `Long`
//! keeps the two words explicit so that the word order is a property of the
//! encoder, never of the value.

use crate::error::ProtocolError;
use std::cmp::Ordering;
use std::fmt;

const TWO_PWR_32: f64 = 4_294_967_296.0;
const TWO_PWR_63: f64 = 9_223_372_036_854_775_808.0;

/// A two's-complement 64-bit integer stored as `{ high, low }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Long {
    pub high: i32,
    pub low: i32,
}

impl Long {
    pub const ZERO: Long = Long::new(0, 0);
    pub const ONE: Long = Long::new(0, 1);
    /// All bits set. Doubles as the "no context" / "unlimited rows" sentinel.
    pub const NEG_ONE: Long = Long::new(-1, -1);
    pub const MAX: Long = Long::new(i32::MAX, -1);
    pub const MIN: Long = Long::new(i32::MIN, 0);

    pub const fn new(high: i32, low: i32) -> Self {
        Self { high, low }
    }

    pub const fn from_i64(value: i64) -> Self {
        Self {
            high: (value >> 32) as i32,
            low: value as i32,
        }
    }

    pub const fn to_i64(self) -> i64 {
        ((self.high as i64) << 32) | (self.low as u32 as i64)
    }

    /// Converts a floating point value, truncating toward zero.
    ///
    /// NaN and infinities map to zero; finite values outside the signed
    /// 64-bit range saturate to [`Long::MIN`] / [`Long::MAX`].
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() {
            return Long::ZERO;
        }
        if value <= -TWO_PWR_63 {
            return Long::MIN;
        }
        if value >= TWO_PWR_63 {
            return Long::MAX;
        }
        if value < 0.0 {
            return Long::from_f64(-value).negate();
        }
        let magnitude = value.trunc();
        let high = (magnitude / TWO_PWR_32).floor();
        let low = magnitude - high * TWO_PWR_32;
        Long::new(high as u32 as i32, low as u32 as i32)
    }

    pub fn is_zero(&self) -> bool {
        self.high == 0 && self.low == 0
    }

    pub fn is_negative(&self) -> bool {
        self.high < 0
    }

    /// Bitwise NOT of both words.
    pub fn not(self) -> Self {
        Long::new(!self.high, !self.low)
    }

    /// Wrapping addition; the carry out of the low word flows into the high word.
    pub fn add(self, other: Long) -> Self {
        let low = (self.low as u32 as u64) + (other.low as u32 as u64);
        let carry = (low >> 32) as u32;
        let high = (self.high as u32)
            .wrapping_add(other.high as u32)
            .wrapping_add(carry);
        Long::new(high as i32, low as u32 as i32)
    }

    /// Two's-complement negation: NOT, then add one.
    pub fn negate(self) -> Self {
        self.not().add(Long::ONE)
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.high.to_be_bytes());
        out[4..].copy_from_slice(&self.low.to_be_bytes());
        out
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.low.to_le_bytes());
        out[4..].copy_from_slice(&self.high.to_le_bytes());
        out
    }

    /// Reads eight bytes with the high word first.
    pub fn read_be(buf: &[u8], offset: usize) -> Result<Self, ProtocolError> {
        let bytes = window(buf, offset)?;
        let high = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let low = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Long::new(high as i32, low as i32))
    }

    /// Reads eight bytes with the low word first.
    pub fn read_le(buf: &[u8], offset: usize) -> Result<Self, ProtocolError> {
        let bytes = window(buf, offset)?;
        let low = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let high = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Long::new(high as i32, low as i32))
    }

    pub fn write_be(self, buf: &mut [u8], offset: usize) -> Result<(), ProtocolError> {
        window_mut(buf, offset)?.copy_from_slice(&self.to_be_bytes());
        Ok(())
    }

    pub fn write_le(self, buf: &mut [u8], offset: usize) -> Result<(), ProtocolError> {
        window_mut(buf, offset)?.copy_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

fn window(buf: &[u8], offset: usize) -> Result<&[u8], ProtocolError> {
    offset
        .checked_add(8)
        .and_then(|end| buf.get(offset..end))
        .ok_or(ProtocolError::OffsetOutOfRange {
            offset,
            size: 8,
            len: buf.len(),
        })
}

fn window_mut(buf: &mut [u8], offset: usize) -> Result<&mut [u8], ProtocolError> {
    let len = buf.len();
    offset
        .checked_add(8)
        .and_then(move |end| buf.get_mut(offset..end))
        .ok_or(ProtocolError::OffsetOutOfRange {
            offset,
            size: 8,
            len,
        })
}

impl From<i64> for Long {
    fn from(value: i64) -> Self {
        Long::from_i64(value)
    }
}

impl From<i32> for Long {
    fn from(value: i32) -> Self {
        Long::from_i64(value as i64)
    }
}

impl From<Long> for i64 {
    fn from(value: Long) -> Self {
        value.to_i64()
    }
}

impl Ord for Long {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_i64().cmp(&other.to_i64())
    }
}

impl PartialOrd for Long {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Long {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_i64())
    }
}
