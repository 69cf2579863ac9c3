//! Little-endian base-128 varints and padded little-endian words.
//!
//! rbyd varints carry 7 value bits per byte, least-significant digit
//! first, with the top bit as the continuation flag. Values are 32-bit:
//! digits that would land above bit 31 are discarded rather than
//! rejected, so any byte sequence decodes to *some* value and the
//! commit checksum is what rejects garbage.

/// Read a varint from a byte slice, returning `(value, bytes_consumed)`.
///
/// Never fails: an empty slice decodes to `(0, 0)` and a slice that ends
/// mid-varint decodes to the digits seen so far. Reads at the tail of a
/// block rely on this.
pub fn read_leb128(buf: &[u8]) -> (u32, usize) {
    let mut word: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        let shift = 7 * i;
        if shift < 32 {
            // Shifting discards digit bits above bit 31 (32-bit saturating).
            word |= u32::from(byte & 0x7f) << shift;
        }
        if byte & 0x80 == 0 {
            return (word, i + 1);
        }
    }
    (word, buf.len())
}

/// Compute the number of bytes needed to encode a value as a varint.
pub const fn leb128_len(value: u32) -> usize {
    if value < 1 << 7 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 21 {
        3
    } else if value < 1 << 28 {
        4
    } else {
        5
    }
}

/// Write a varint to a byte buffer, returning the number of bytes written.
///
/// The buffer must have at least `leb128_len(value)` bytes available.
pub fn write_leb128(buf: &mut [u8], value: u32) -> usize {
    let len = leb128_len(value);
    let mut v = value;
    for slot in buf.iter_mut().take(len - 1) {
        *slot = (v as u8 & 0x7f) | 0x80;
        v >>= 7;
    }
    buf[len - 1] = v as u8;
    len
}

/// Read a little-endian `u32`, zero-padding a short slice.
pub fn read_le32(buf: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    let n = buf.len().min(4);
    bytes[..n].copy_from_slice(&buf[..n]);
    u32::from_le_bytes(bytes)
}

/// Write a little-endian `u32`, returning the number of bytes written (4).
pub fn write_le32(buf: &mut [u8], value: u32) -> usize {
    buf[..4].copy_from_slice(&value.to_le_bytes());
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leb128_roundtrip() {
        let test_values: &[u32] = &[
            0,
            1,
            127,
            128,
            0x3fff,
            0x4000,
            0x001f_ffff,
            0x0020_0000,
            0x0fff_ffff,
            0x1000_0000,
            u32::MAX,
        ];

        let mut buf = [0u8; 5];
        for &value in test_values {
            let written = write_leb128(&mut buf, value);
            let (decoded, consumed) = read_leb128(&buf[..written]);
            assert_eq!(decoded, value, "roundtrip failed for {value}");
            assert_eq!(written, consumed, "length mismatch for {value}");
            assert_eq!(written, leb128_len(value), "leb128_len mismatch for {value}");
        }
    }

    #[test]
    fn leb128_golden_vectors() {
        // Little-endian digit order: low 7 bits come first.
        let cases: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (129, &[0x81, 0x01]),
            (0x3fff, &[0xff, 0x7f]),
            (0x4000, &[0x80, 0x80, 0x01]),
            (u32::MAX, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];

        let mut buf = [0u8; 5];
        for &(value, expected) in cases {
            let written = write_leb128(&mut buf, value);
            assert_eq!(&buf[..written], expected, "encoding of {value:#x}");
            let (decoded, consumed) = read_leb128(expected);
            assert_eq!(decoded, value);
            assert_eq!(consumed, expected.len());
        }
    }

    #[test]
    fn leb128_saturates_at_32_bits() {
        // A 5th digit larger than 0x0f overflows bit 31; the overflow is
        // silently discarded, matching the on-disk decoder contract.
        let (value, consumed) = read_leb128(&[0xff, 0xff, 0xff, 0xff, 0x7f]);
        assert_eq!(value, u32::MAX);
        assert_eq!(consumed, 5);

        // Digits past the 5th contribute nothing at all.
        let (value, consumed) = read_leb128(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert_eq!(value, 0);
        assert_eq!(consumed, 7);
    }

    #[test]
    fn leb128_truncated_input() {
        assert_eq!(read_leb128(&[]), (0, 0));
        // Continuation bit set but no further bytes: decode what was seen.
        assert_eq!(read_leb128(&[0x81]), (1, 1));
        assert_eq!(read_leb128(&[0x80, 0x80]), (0, 2));
    }

    #[test]
    fn leb128_stops_at_first_terminator() {
        let buf = [0x05, 0xcc, 0xcc];
        let (value, consumed) = read_leb128(&buf);
        assert_eq!(value, 5);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn le32_pads_short_reads() {
        assert_eq!(read_le32(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(read_le32(&[0x78, 0x56]), 0x0000_5678);
        assert_eq!(read_le32(&[]), 0);
        // Extra bytes are ignored.
        assert_eq!(read_le32(&[0x01, 0x00, 0x00, 0x00, 0xff]), 1);
    }

    #[test]
    fn le32_roundtrip() {
        let mut buf = [0u8; 4];
        for value in [0, 1, 0xdead_beef, u32::MAX] {
            assert_eq!(write_le32(&mut buf, value), 4);
            assert_eq!(read_le32(&buf), value);
        }
    }
}
