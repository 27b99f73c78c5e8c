//! Byte buffer for the partition transport.
//!
//! Values are packed little-endian, one after the other, with no type
//! tags: the reader must unpack in exactly the order the writer packed.
//! Strings and variable-length arrays carry a `u32` length prefix;
//! fixed-size arrays do not.

use crate::core::errors::SimError;
use crate::core::time::TimeValue;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommBuffer {
    data: Vec<u8>,
    pos: usize,
}

/// Values that can travel through a `CommBuffer`
pub trait Packable: Sized {
    fn pack(&self, buf: &mut CommBuffer) -> Result<(), SimError>;

    fn unpack(buf: &mut CommBuffer) -> Result<Self, SimError>;
}

impl CommBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap received bytes for unpacking
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes not yet unpacked
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_fully_read(&self) -> bool {
        self.remaining() == 0
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.pos = 0;
    }

    pub fn pack<T: Packable>(&mut self, value: &T) -> Result<(), SimError> {
        value.pack(self)
    }

    pub fn unpack<T: Packable>(&mut self) -> Result<T, SimError> {
        T::unpack(self)
    }

    /// Pack a fixed-size array; the receiver must know the length
    pub fn pack_slice<T: Packable>(&mut self, values: &[T]) -> Result<(), SimError> {
        for v in values {
            v.pack(self)?;
        }
        Ok(())
    }

    pub fn unpack_into<T: Packable>(&mut self, out: &mut [T]) -> Result<(), SimError> {
        for slot in out.iter_mut() {
            *slot = T::unpack(self)?;
        }
        Ok(())
    }

    /// Pack a variable-length array with its length
    pub fn pack_array<T: Packable>(&mut self, values: &[T]) -> Result<(), SimError> {
        let len = length_prefix(values.len(), "array elements")?;
        self.pack(&len)?;
        self.pack_slice(values)
    }

    pub fn unpack_array<T: Packable>(&mut self) -> Result<Vec<T>, SimError> {
        let len = self.unpack::<u32>()? as usize;
        // every element takes at least one byte
        if len > self.remaining() {
            return Err(SimError::Comm(format!(
                "array length {} exceeds the {} bytes left in the buffer",
                len,
                self.remaining()
            )));
        }
        (0..len).map(|_| T::unpack(self)).collect()
    }

    pub fn pack_bytes(&mut self, bytes: &[u8]) -> Result<(), SimError> {
        let len = length_prefix(bytes.len(), "bytes")?;
        self.pack(&len)?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn pack_str(&mut self, s: &str) -> Result<(), SimError> {
        self.pack_bytes(s.as_bytes())
    }

    pub fn unpack_bytes(&mut self) -> Result<Vec<u8>, SimError> {
        let len = self.unpack::<u32>()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn put(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn take(&mut self, n: usize) -> Result<&[u8], SimError> {
        if n > self.remaining() {
            return Err(SimError::Comm(format!(
                "premature end of buffer: {} bytes wanted, {} left",
                n,
                self.remaining()
            )));
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], SimError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Length prefix for `len` items; refuses lengths a `u32` cannot carry
fn length_prefix(len: usize, what: &str) -> Result<u32, SimError> {
    u32::try_from(len).map_err(|_| SimError::Comm(format!("{} {} are too many to pack", len, what)))
}

macro_rules! packable_le {
    ($($t:ty),*) => {
        $(
            impl Packable for $t {
                fn pack(&self, buf: &mut CommBuffer) -> Result<(), SimError> {
                    buf.put(&self.to_le_bytes());
                    Ok(())
                }

                fn unpack(buf: &mut CommBuffer) -> Result<Self, SimError> {
                    Ok(<$t>::from_le_bytes(buf.take_array()?))
                }
            }
        )*
    };
}

packable_le!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Packable for bool {
    fn pack(&self, buf: &mut CommBuffer) -> Result<(), SimError> {
        buf.put(&[u8::from(*self)]);
        Ok(())
    }

    fn unpack(buf: &mut CommBuffer) -> Result<Self, SimError> {
        match u8::unpack(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SimError::Comm(format!("invalid bool byte {}", other))),
        }
    }
}

impl Packable for String {
    fn pack(&self, buf: &mut CommBuffer) -> Result<(), SimError> {
        buf.pack_str(self)
    }

    fn unpack(buf: &mut CommBuffer) -> Result<Self, SimError> {
        let len = u32::unpack(buf)? as usize;
        let bytes = buf.take(len)?.to_vec();
        String::from_utf8(bytes).map_err(|e| SimError::Comm(format!("invalid UTF-8 string: {}", e)))
    }
}

impl Packable for Option<String> {
    fn pack(&self, buf: &mut CommBuffer) -> Result<(), SimError> {
        buf.pack(&self.is_some())?;
        match self {
            Some(s) => buf.pack_str(s),
            None => Ok(()),
        }
    }

    fn unpack(buf: &mut CommBuffer) -> Result<Self, SimError> {
        if bool::unpack(buf)? {
            Ok(Some(String::unpack(buf)?))
        } else {
            Ok(None)
        }
    }
}

impl Packable for TimeValue {
    fn pack(&self, buf: &mut CommBuffer) -> Result<(), SimError> {
        buf.pack(&self.raw())
    }

    fn unpack(buf: &mut CommBuffer) -> Result<Self, SimError> {
        Ok(TimeValue::from_raw(i64::unpack(buf)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_values_come_back_in_order() {
        let mut buf = CommBuffer::new();
        buf.pack(&7u8).unwrap();
        buf.pack(&-3i16).unwrap();
        buf.pack(&true).unwrap();
        buf.pack(&123_456_789_012i64).unwrap();
        buf.pack(&2.5f64).unwrap();
        buf.pack(&"hello, partition".to_string()).unwrap();
        buf.pack(&TimeValue::from_millis(15)).unwrap();

        let mut rx = CommBuffer::from_bytes(buf.into_bytes());
        assert_eq!(rx.unpack::<u8>().unwrap(), 7);
        assert_eq!(rx.unpack::<i16>().unwrap(), -3);
        assert!(rx.unpack::<bool>().unwrap());
        assert_eq!(rx.unpack::<i64>().unwrap(), 123_456_789_012);
        assert_eq!(rx.unpack::<f64>().unwrap(), 2.5);
        assert_eq!(rx.unpack::<String>().unwrap(), "hello, partition");
        assert_eq!(rx.unpack::<TimeValue>().unwrap(), TimeValue::from_millis(15));
        assert!(rx.is_fully_read());
    }

    #[test]
    fn test_arrays() {
        let mut buf = CommBuffer::new();
        buf.pack_slice(&[1u32, 2, 3]).unwrap();
        buf.pack_array(&[9i64, 8]).unwrap();
        buf.pack(&None::<String>).unwrap();
        let mut rx = CommBuffer::from_bytes(buf.into_bytes());
        let mut fixed = [0u32; 3];
        rx.unpack_into(&mut fixed).unwrap();
        assert_eq!(fixed, [1, 2, 3]);
        assert_eq!(rx.unpack_array::<i64>().unwrap(), vec![9, 8]);
        assert_eq!(rx.unpack::<Option<String>>().unwrap(), None);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_length_prefix_is_refused() {
        let too_long = u32::MAX as usize + 1;
        assert!(matches!(length_prefix(too_long, "bytes"), Err(SimError::Comm(_))));
        assert_eq!(length_prefix(u32::MAX as usize, "bytes").unwrap(), u32::MAX);
    }

    #[test]
    fn test_strings_carry_their_byte_length() {
        let mut buf = CommBuffer::new();
        buf.pack(&"héllo".to_string()).unwrap();
        buf.pack(&Some("x".to_string())).unwrap();
        let mut rx = CommBuffer::from_bytes(buf.into_bytes());
        assert_eq!(rx.unpack::<u32>().unwrap(), 6);
        let mut text = [0u8; 6];
        rx.unpack_into(&mut text).unwrap();
        assert_eq!(&text, "héllo".as_bytes());
        assert_eq!(rx.unpack::<Option<String>>().unwrap(), Some("x".to_string()));
        assert!(rx.is_fully_read());
    }

    #[test]
    fn test_reading_past_the_end_fails() {
        let mut buf = CommBuffer::new();
        buf.pack(&1u16).unwrap();
        let mut rx = CommBuffer::from_bytes(buf.into_bytes());
        assert!(rx.unpack::<u32>().is_err());
        let mut bogus = CommBuffer::from_bytes(vec![200, 0, 0, 0]);
        assert!(bogus.unpack::<String>().is_err());
    }
}
