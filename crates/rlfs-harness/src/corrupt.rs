//! Helpers for damaging block images in controlled ways.

/// Flip one bit.
pub fn flip_bit(image: &mut [u8], off: usize, bit: u8) {
    image[off] ^= 1 << bit;
}

/// Zero everything from `off` onward, simulating a torn append.
pub fn zero_from(image: &mut [u8], off: usize) {
    for b in &mut image[off..] {
        *b = 0;
    }
}

/// Overwrite a range with a fill byte.
pub fn smash(image: &mut [u8], off: usize, len: usize, fill: u8) {
    for b in &mut image[off..off + len] {
        *b = fill;
    }
}
