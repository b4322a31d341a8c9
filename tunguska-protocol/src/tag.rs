//! Field tag codec.
//!
//! Every struct field is named by a 4-character tag drawn from a 64
//! character alphabet (ASCII 0x20..=0x5F). On the wire the four 6-bit
//! characters are packed big-endian into 3 bytes:
//!
//! ```text
//! D2 5C F4  ->  110100 100101 110011 110100  -> +32 each -> "TEST"
//! ```

use crate::error::ProtocolError;
use std::fmt;

/// A decompressed 4-character field tag. Names shorter than four
/// characters are padded with trailing spaces, matching the wire form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag([u8; 4]);

impl Tag {
    /// Builds a tag from a name of at most four characters from the
    /// 6-bit alphabet.
    pub fn new(name: &str) -> Result<Self, ProtocolError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 {
            return Err(ProtocolError::InvalidTag(name.to_string()));
        }
        let mut chars = [b' '; 4];
        for (i, &b) in bytes.iter().enumerate() {
            if !(0x20..0x60).contains(&b) {
                return Err(ProtocolError::InvalidTag(name.to_string()));
            }
            chars[i] = b;
        }
        Ok(Self(chars))
    }

    /// Unpacks three wire bytes into the 4-character tag.
    pub fn decompress(raw: [u8; 3]) -> Self {
        let v = u32::from_be_bytes([0, raw[0], raw[1], raw[2]]);
        Self([
            ((v >> 18 & 0x3F) + 32) as u8,
            ((v >> 12 & 0x3F) + 32) as u8,
            ((v >> 6 & 0x3F) + 32) as u8,
            ((v & 0x3F) + 32) as u8,
        ])
    }

    /// Packs the tag into its 3-byte wire form.
    pub fn compress(&self) -> [u8; 3] {
        let mut v = 0u32;
        for (i, &c) in self.0.iter().enumerate() {
            v |= ((c as u32) - 32) << (18 - 6 * i);
        }
        let bytes = v.to_be_bytes();
        [bytes[1], bytes[2], bytes[3]]
    }

    pub fn as_str(&self) -> &str {
        // Invariant: every byte is ASCII in 0x20..0x60.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:?})", self.as_str())
    }
}

impl TryFrom<&str> for Tag {
    type Error = ProtocolError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_example() {
        let tag = Tag::new("TEST").unwrap();
        assert_eq!(tag.compress(), [0xD2, 0x5C, 0xF4]);
        assert_eq!(Tag::decompress([0xD2, 0x5C, 0xF4]), tag);
    }

    #[test]
    fn test_roundtrip_alphabet() {
        for name in ["AUTH", "EXTB", "EXTI", "ERRC", "A1_ ", "ZZZZ", "    "] {
            let tag = Tag::new(name).unwrap();
            assert_eq!(Tag::decompress(tag.compress()), tag);
            assert_eq!(tag.as_str(), name);
        }
    }

    #[test]
    fn test_short_names_padded() {
        let tag = Tag::new("SID").unwrap();
        assert_eq!(tag.as_str(), "SID ");
        assert_eq!(Tag::decompress(tag.compress()), tag);
    }

    #[test]
    fn test_rejects_out_of_alphabet() {
        assert!(Tag::new("").is_err());
        assert!(Tag::new("TOOLONG").is_err());
        // Lowercase is outside the 6-bit alphabet.
        assert!(Tag::new("auth").is_err());
    }
}
