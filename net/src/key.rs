use std::fmt;

/// Number of bytes in every [`EncodingKey`].
pub const ENCODING_SIZE: usize = 3;

/// Compact identifier handed out by the topic registry for a `topic@host` pair.
///
/// Keys are big-endian counters. The all-zero key is never issued and is used
/// as the "unknown" sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodingKey([u8; ENCODING_SIZE]);

impl EncodingKey {
    /// The first key the registry hands out.
    pub const FIRST: EncodingKey = EncodingKey([0, 0, 1]);
    /// Sentinel for "no such topic".
    pub const UNKNOWN: EncodingKey = EncodingKey([0, 0, 0]);

    pub const fn new(bytes: [u8; ENCODING_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a key from a wire slice. Returns `None` unless exactly
    /// [`ENCODING_SIZE`] bytes are given.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; ENCODING_SIZE]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; ENCODING_SIZE] {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }

    /// Return the key following this one.
    ///
    /// The lowest-order byte is incremented and carries to the left. Wrapping
    /// past `FF FF FF` lands on [`EncodingKey::FIRST`] so the sentinel is
    /// never produced.
    pub fn next(&self) -> Self {
        let mut bytes = self.0;
        for byte in bytes.iter_mut().rev() {
            let (value, overflow) = byte.overflowing_add(1);
            *byte = value;
            if !overflow {
                return Self(bytes);
            }
        }
        Self::FIRST
    }
}

impl fmt::Display for EncodingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_increments_lowest_byte() {
        assert_eq!(EncodingKey::FIRST.next(), EncodingKey::new([0, 0, 2]));
    }

    #[test]
    fn next_carries_across_bytes() {
        assert_eq!(EncodingKey::new([0, 0, 255]).next(), EncodingKey::new([0, 1, 0]));
        assert_eq!(EncodingKey::new([0, 255, 255]).next(), EncodingKey::new([1, 0, 0]));
    }

    #[test]
    fn wrap_skips_sentinel() {
        assert_eq!(EncodingKey::new([255, 255, 255]).next(), EncodingKey::FIRST);
    }

    #[test]
    fn from_slice_requires_exact_length() {
        assert!(EncodingKey::from_slice(&[1, 2]).is_none());
        assert_eq!(EncodingKey::from_slice(&[1, 2, 3]), Some(EncodingKey::new([1, 2, 3])));
    }
}
