use crate::core::errors::SimError;
use std::fmt;

/// Order-sensitive 32-bit hash: each value rotates the state left by one
/// bit and is xor-ed in. 64-bit values go in as two 32-bit halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hasher {
    value: u32,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_u32(&mut self, x: u32) {
        self.value = self.value.rotate_left(1) ^ x;
    }

    pub fn add_u64(&mut self, x: u64) {
        self.add_u32(x as u32);
        self.add_u32((x >> 32) as u32);
    }

    pub fn add_i64(&mut self, x: i64) {
        self.add_u64(x as u64);
    }

    pub fn add_str(&mut self, s: &str) {
        for chunk in s.as_bytes().chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.add_u32(u32::from_le_bytes(word));
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }

    /// Parse the `xxxx-xxxx` form (the dash is optional)
    pub fn parse(text: &str) -> Result<u32, SimError> {
        let hex: String = text.chars().filter(|c| *c != '-').collect();
        if hex.len() != 8 {
            return Err(SimError::Config(format!("malformed fingerprint '{}'", text)));
        }
        u32::from_str_radix(&hex, 16)
            .map_err(|_| SimError::Config(format!("malformed fingerprint '{}'", text)))
    }

    pub fn equals(&self, text: &str) -> Result<bool, SimError> {
        Ok(Self::parse(text)? == self.value)
    }
}

impl fmt::Display for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}-{:04x}", self.value >> 16, self.value & 0xffff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_xor() {
        let mut h = Hasher::new();
        h.add_u32(1);
        h.add_u32(1);
        // rotl(1,1) ^ 1 == 3
        assert_eq!(h.value(), 3);
    }

    #[test]
    fn test_order_matters() {
        let mut a = Hasher::new();
        a.add_u64(5);
        a.add_u64(9);
        let mut b = Hasher::new();
        b.add_u64(9);
        b.add_u64(5);
        assert_ne!(a.value(), b.value());
    }

    #[test]
    fn test_string_form_roundtrip() {
        let mut h = Hasher::new();
        h.add_str("hello");
        let s = h.to_string();
        assert_eq!(s.len(), 9);
        assert!(h.equals(&s).unwrap());
        assert!(h.equals(&s.replace('-', "")).unwrap());
        assert!(Hasher::parse("xyz").is_err());
    }
}
