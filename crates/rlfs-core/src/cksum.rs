//! Rolling CRC-32C over the rbyd log.
//!
//! The commit protocol keys the next tag's valid bit off the parity of
//! the running checksum, and perturbed commits fold a fixed constant
//! into the running value between updates. Both operate on the plain
//! `u32` state that `crc32c_append` takes and returns.

/// Constant folded into the running checksum while a perturbed commit
/// is in effect.
pub const PERTURB: u32 = 0xfca4_2daf;

/// Continue a CRC-32C (Castagnoli, reflected) over `data`.
///
/// An initial state of 0 starts a fresh checksum; chaining calls with
/// the previous return value checksums a concatenation.
pub fn crc32c(crc: u32, data: &[u8]) -> u32 {
    ::crc32c::crc32c_append(crc, data)
}

/// Bit parity of a word: true when an odd number of bits are set.
pub fn parity(word: u32) -> bool {
    word.count_ones() & 1 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32c_check_value() {
        // The standard CRC-32C check input.
        assert_eq!(crc32c(0, b"123456789"), 0xe306_9283);
    }

    #[test]
    fn crc32c_empty_is_identity() {
        assert_eq!(crc32c(0, b""), 0);
        assert_eq!(crc32c(0xdead_beef, b""), 0xdead_beef);
    }

    #[test]
    fn crc32c_chains() {
        let whole = crc32c(0, b"hello world");
        let split = crc32c(crc32c(0, b"hello "), b"world");
        assert_eq!(whole, split);
    }

    #[test]
    fn parity_counts_bits() {
        assert!(!parity(0));
        assert!(parity(1));
        assert!(!parity(3));
        assert!(parity(0x8000_0000));
        assert!(!parity(0x8000_0001));
        assert!(!parity(u32::MAX));
    }
}
