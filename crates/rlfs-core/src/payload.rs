//! Decoders for structured tag payloads.
//!
//! All of these are infallible in the on-disk sense: a short payload
//! decodes through zero-padding, and the commit checksum is what
//! guarantees the bytes were what the writer put there. Fields are
//! plain structs so callers read them by name.

use rlfs_types::{read_le32, read_leb128};

/// A branch pointer to a child rbyd: payload of a `0x32c` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchPtr {
    pub block: u32,
    pub trunk: u32,
    pub cksum: u32,
}

pub fn decode_branch(data: &[u8]) -> BranchPtr {
    let (block, d) = read_leb128(data);
    let (trunk, d_) = read_leb128(&data[d..]);
    let cksum = read_le32(&data[d + d_..]);
    BranchPtr {
        block,
        trunk,
        cksum,
    }
}

/// A b-tree root: total weight plus a branch pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtreePtr {
    pub weight: u32,
    pub branch: BranchPtr,
}

pub fn decode_btree(data: &[u8]) -> BtreePtr {
    let (weight, d) = read_leb128(data);
    BtreePtr {
        weight,
        branch: decode_branch(&data[d..]),
    }
}

/// An inlined sub-tree root: weight plus a trunk in the same block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrubPtr {
    pub weight: u32,
    pub trunk: u32,
}

pub fn decode_shrub(data: &[u8]) -> ShrubPtr {
    let (weight, d) = read_leb128(data);
    let (trunk, _) = read_leb128(&data[d..]);
    ShrubPtr { weight, trunk }
}

/// Decode a metadata-directory pointer: a list of candidate blocks.
pub fn decode_mdir(data: &[u8]) -> Vec<u32> {
    let mut blocks = Vec::new();
    let mut d = 0;
    while d < data.len() {
        let (block, d_) = read_leb128(&data[d..]);
        blocks.push(block);
        d += d_;
    }
    blocks
}

/// An out-of-line data block pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bptr {
    pub size: u32,
    pub block: u32,
    pub off: u32,
    /// Checksummed prefix length.
    pub cksize: u32,
    pub cksum: u32,
}

pub fn decode_bptr(data: &[u8]) -> Bptr {
    let (size, mut d) = read_leb128(data);
    let (block, d_) = read_leb128(&data[d..]);
    d += d_;
    let (off, d_) = read_leb128(&data[d..]);
    d += d_;
    let (cksize, d_) = read_leb128(&data[d..]);
    d += d_;
    let cksum = read_le32(&data[d..]);
    Bptr {
        size,
        block,
        off,
        cksize,
        cksum,
    }
}

/// Decode a name payload into its directory id and name bytes.
pub fn decode_name(data: &[u8]) -> (u32, &[u8]) {
    let (did, d) = read_leb128(data);
    (did, &data[d.min(data.len())..])
}
