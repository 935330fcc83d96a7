//! Byte buffer tagged with the byte order of the connection it belongs to.
//!
//! Every typed accessor takes an explicit offset and dispatches to the big- or
//! little-endian primitive according to the stored flag. Reads and writes past
//! the end of the buffer fail with [`ProtocolError::OffsetOutOfRange`].

use crate::error::ProtocolError;
use crate::long::Long;
use bytes::{Bytes, BytesMut};
use serde::Serialize;

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width numeric kinds that an [`XBuffer`] can read and write.
pub trait Scalar: Copy + sealed::Sealed {
    /// Encoded width in bytes.
    const SIZE: usize;

    fn decode(bytes: &[u8], big_endian: bool) -> Self;
    fn encode(self, out: &mut [u8], big_endian: bool);
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn decode(bytes: &[u8], big_endian: bool) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    if big_endian {
                        <$ty>::from_be_bytes(raw)
                    } else {
                        <$ty>::from_le_bytes(raw)
                    }
                }

                fn encode(self, out: &mut [u8], big_endian: bool) {
                    let raw = if big_endian {
                        self.to_be_bytes()
                    } else {
                        self.to_le_bytes()
                    };
                    out[..Self::SIZE].copy_from_slice(&raw);
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, f32, f64);

/// A byte buffer plus the byte order its multi-byte fields use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XBuffer {
    buf: BytesMut,
    big_endian: bool,
}

impl XBuffer {
    pub fn new(buf: BytesMut, big_endian: bool) -> Self {
        Self { buf, big_endian }
    }

    pub fn from_slice(bytes: &[u8], big_endian: bool) -> Self {
        Self::new(BytesMut::from(bytes), big_endian)
    }

    /// Allocates a zero-filled buffer of `size` bytes.
    pub fn with_size(size: usize, big_endian: bool) -> Self {
        Self::new(BytesMut::zeroed(size), big_endian)
    }

    /// Buffer holding the UTF-8 bytes of `text`.
    pub fn from_text(text: &str, big_endian: bool) -> Self {
        Self::from_slice(text.as_bytes(), big_endian)
    }

    /// Buffer holding the JSON rendering of `value`.
    pub fn from_json<T: Serialize>(value: &T, big_endian: bool) -> Result<Self, ProtocolError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::new(BytesMut::from(&bytes[..]), big_endian))
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    fn range(&self, offset: usize, size: usize) -> Result<std::ops::Range<usize>, ProtocolError> {
        match offset.checked_add(size) {
            Some(end) if end <= self.buf.len() => Ok(offset..end),
            _ => Err(ProtocolError::OffsetOutOfRange {
                offset,
                size,
                len: self.buf.len(),
            }),
        }
    }

    pub fn read<T: Scalar>(&self, offset: usize) -> Result<T, ProtocolError> {
        let range = self.range(offset, T::SIZE)?;
        Ok(T::decode(&self.buf[range], self.big_endian))
    }

    pub fn write<T: Scalar>(&mut self, value: T, offset: usize) -> Result<(), ProtocolError> {
        let range = self.range(offset, T::SIZE)?;
        value.encode(&mut self.buf[range], self.big_endian);
        Ok(())
    }

    /// Reads an unsigned integer of `byte_len` bytes (1 to 6).
    pub fn read_uint(&self, offset: usize, byte_len: usize) -> Result<u64, ProtocolError> {
        if !(1..=6).contains(&byte_len) {
            return Err(ProtocolError::InvalidByteLength(byte_len));
        }
        let range = self.range(offset, byte_len)?;
        let bytes = &self.buf[range];
        let value = if self.big_endian {
            bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
        } else {
            bytes.iter().rev().fold(0u64, |acc, b| (acc << 8) | *b as u64)
        };
        Ok(value)
    }

    /// Reads a sign-extended integer of `byte_len` bytes (1 to 6).
    pub fn read_int(&self, offset: usize, byte_len: usize) -> Result<i64, ProtocolError> {
        let raw = self.read_uint(offset, byte_len)?;
        let shift = 64 - 8 * byte_len as u32;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Writes the low `byte_len` bytes (1 to 6) of `value`.
    pub fn write_uint(
        &mut self,
        value: u64,
        offset: usize,
        byte_len: usize,
    ) -> Result<(), ProtocolError> {
        if !(1..=6).contains(&byte_len) {
            return Err(ProtocolError::InvalidByteLength(byte_len));
        }
        let range = self.range(offset, byte_len)?;
        let big_endian = self.big_endian;
        let out = &mut self.buf[range];
        for i in 0..byte_len {
            let byte = (value >> (8 * i)) as u8;
            if big_endian {
                out[byte_len - 1 - i] = byte;
            } else {
                out[i] = byte;
            }
        }
        Ok(())
    }

    pub fn write_int(&mut self, value: i64, offset: usize, byte_len: usize) -> Result<(), ProtocolError> {
        self.write_uint(value as u64, offset, byte_len)
    }

    pub fn read_long(&self, offset: usize) -> Result<Long, ProtocolError> {
        if self.big_endian {
            Long::read_be(&self.buf, offset)
        } else {
            Long::read_le(&self.buf, offset)
        }
    }

    pub fn write_long(&mut self, value: Long, offset: usize) -> Result<(), ProtocolError> {
        if self.big_endian {
            value.write_be(&mut self.buf, offset)
        } else {
            value.write_le(&mut self.buf, offset)
        }
    }

    /// Copies raw bytes without any byte-order conversion.
    pub fn write_buffer(&mut self, bytes: &[u8], offset: usize) -> Result<(), ProtocolError> {
        let range = self.range(offset, bytes.len())?;
        self.buf[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Copies `start..end` into a new buffer with the same byte order.
    pub fn slice(&self, start: usize, end: usize) -> Result<XBuffer, ProtocolError> {
        if start > end {
            return Err(ProtocolError::OffsetOutOfRange {
                offset: start,
                size: 0,
                len: end,
            });
        }
        let range = self.range(start, end - start)?;
        Ok(XBuffer::from_slice(&self.buf[range], self.big_endian))
    }
}

impl AsRef<[u8]> for XBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_read_dispatches_on_byte_order() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        let be = XBuffer::from_slice(&bytes, true);
        let le = XBuffer::from_slice(&bytes, false);

        assert_eq!(be.read::<u32>(0).unwrap(), 0x0102_0304);
        assert_eq!(le.read::<u32>(0).unwrap(), 0x0403_0201);
        assert_eq!(be.read::<u16>(2).unwrap(), 0x0304);
        assert_eq!(le.read::<u16>(2).unwrap(), 0x0403);
        assert_eq!(be.read::<u8>(3).unwrap(), 0x04);
    }

    #[test]
    fn test_write_signed() {
        let mut buf = XBuffer::with_size(8, false);
        buf.write(-1i32, 0).unwrap();
        buf.write(-2i16, 4).unwrap();
        buf.write(-3i8, 6).unwrap();
        assert_eq!(buf.as_bytes(), &[0xff, 0xff, 0xff, 0xff, 0xfe, 0xff, 0xfd, 0x00]);
        assert_eq!(buf.read::<i32>(0).unwrap(), -1);
        assert_eq!(buf.read::<i16>(4).unwrap(), -2);
        assert_eq!(buf.read::<i8>(6).unwrap(), -3);
    }

    #[test]
    fn test_float_roundtrip() {
        for big_endian in [true, false] {
            let mut buf = XBuffer::with_size(12, big_endian);
            buf.write(1.5f32, 0).unwrap();
            buf.write(-2.25f64, 4).unwrap();
            assert_eq!(buf.read::<f32>(0).unwrap(), 1.5);
            assert_eq!(buf.read::<f64>(4).unwrap(), -2.25);
        }
    }

    #[test]
    fn test_every_accessor_rejects_bad_offset() {
        let mut buf = XBuffer::with_size(4, true);
        assert!(matches!(
            buf.read::<u32>(1),
            Err(ProtocolError::OffsetOutOfRange { offset: 1, size: 4, len: 4 })
        ));
        assert!(buf.read::<u8>(4).is_err());
        assert!(buf.read::<i8>(4).is_err());
        assert!(buf.read::<u16>(3).is_err());
        assert!(buf.read::<i16>(3).is_err());
        assert!(buf.read::<i32>(usize::MAX).is_err());
        assert!(buf.read::<f32>(2).is_err());
        assert!(buf.read::<f64>(0).is_err());
        assert!(buf.read_long(0).is_err());
        assert!(buf.read_uint(2, 3).is_err());
        assert!(buf.write(0u32, 2).is_err());
        assert!(buf.write(0f64, 0).is_err());
        assert!(buf.write_long(Long::ONE, 0).is_err());
        assert!(buf.write_buffer(&[1, 2, 3], 2).is_err());
        assert!(buf.write_uint(1, 3, 2).is_err());
    }

    #[test]
    fn test_variable_width_integers() {
        let mut be = XBuffer::with_size(6, true);
        be.write_uint(0x01_0203, 0, 3).unwrap();
        assert_eq!(&be.as_bytes()[..3], &[0x01, 0x02, 0x03]);
        assert_eq!(be.read_uint(0, 3).unwrap(), 0x01_0203);

        let mut le = XBuffer::with_size(6, false);
        le.write_int(-2, 0, 3).unwrap();
        assert_eq!(&le.as_bytes()[..3], &[0xfe, 0xff, 0xff]);
        assert_eq!(le.read_int(0, 3).unwrap(), -2);
        assert_eq!(le.read_uint(0, 3).unwrap(), 0xff_fffe);

        le.write_uint(0x0102_0304_0506, 0, 6).unwrap();
        assert_eq!(le.read_uint(0, 6).unwrap(), 0x0102_0304_0506);
    }

    #[test]
    fn test_invalid_byte_length() {
        let buf = XBuffer::with_size(16, true);
        assert!(matches!(buf.read_uint(0, 0), Err(ProtocolError::InvalidByteLength(0))));
        assert!(matches!(buf.read_int(0, 7), Err(ProtocolError::InvalidByteLength(7))));
    }

    #[test]
    fn test_long_word_order() {
        let value = Long::new(0x0102_0304, 0x0506_0708);

        let mut be = XBuffer::with_size(8, true);
        be.write_long(value, 0).unwrap();
        assert_eq!(be.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut le = XBuffer::with_size(8, false);
        le.write_long(value, 0).unwrap();
        assert_eq!(le.as_bytes(), &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(le.read_long(0).unwrap(), value);
    }

    #[test]
    fn test_write_buffer_is_raw_copy() {
        let mut buf = XBuffer::with_size(14, true);
        let node_id = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        buf.write_buffer(&node_id, 2).unwrap();
        assert_eq!(&buf.as_bytes()[2..], &node_id);
    }

    #[test]
    fn test_slice_keeps_byte_order() {
        let buf = XBuffer::from_slice(&[0, 0, 0, 1, 0, 0, 0, 2], true);
        let tail = buf.slice(4, 8).unwrap();
        assert!(tail.is_big_endian());
        assert_eq!(tail.read::<i32>(0).unwrap(), 2);
        assert!(buf.slice(6, 9).is_err());
        assert!(buf.slice(5, 4).is_err());
        assert!(buf.slice(8, 8).unwrap().is_empty());
    }

    #[test]
    fn test_constructors() {
        let text = XBuffer::from_text("abc", false);
        assert_eq!(text.as_bytes(), b"abc");

        let json = XBuffer::from_json(&serde_json::json!({"a": 1}), false).unwrap();
        assert_eq!(json.as_bytes(), br#"{"a":1}"#);

        let zeroed = XBuffer::with_size(5, true);
        assert_eq!(zeroed.len(), 5);
        assert!(zeroed.as_bytes().iter().all(|b| *b == 0));
    }

    proptest! {
        #[test]
        fn prop_i32_roundtrip(value in any::<i32>(), big_endian in any::<bool>(), offset in 0usize..8) {
            let mut buf = XBuffer::with_size(12, big_endian);
            buf.write(value, offset).unwrap();
            prop_assert_eq!(buf.read::<i32>(offset).unwrap(), value);
        }

        #[test]
        fn prop_long_roundtrip(value in any::<i64>(), big_endian in any::<bool>()) {
            let mut buf = XBuffer::with_size(8, big_endian);
            buf.write_long(Long::from(value), 0).unwrap();
            prop_assert_eq!(buf.read_long(0).unwrap().to_i64(), value);
        }
    }
}
