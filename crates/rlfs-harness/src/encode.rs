//! Encoders mirroring the payload decoders, for building fixtures.

use rlfs_types::leb128::{leb128_len, write_le32, write_leb128};

fn push_leb128(out: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 5];
    let len = write_leb128(&mut buf, value);
    out.extend_from_slice(&buf[..len]);
}

fn push_le32(out: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    write_le32(&mut buf, value);
    out.extend_from_slice(&buf);
}

pub fn encode_branch(block: u32, trunk: u32, cksum: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(leb128_len(block) + leb128_len(trunk) + 4);
    push_leb128(&mut out, block);
    push_leb128(&mut out, trunk);
    push_le32(&mut out, cksum);
    out
}

pub fn encode_btree(weight: u32, block: u32, trunk: u32, cksum: u32) -> Vec<u8> {
    let mut out = Vec::new();
    push_leb128(&mut out, weight);
    out.extend_from_slice(&encode_branch(block, trunk, cksum));
    out
}

pub fn encode_shrub(weight: u32, trunk: u32) -> Vec<u8> {
    let mut out = Vec::new();
    push_leb128(&mut out, weight);
    push_leb128(&mut out, trunk);
    out
}

pub fn encode_mdir(blocks: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for &block in blocks {
        push_leb128(&mut out, block);
    }
    out
}

pub fn encode_name(did: u32, name: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(leb128_len(did) + name.len());
    push_leb128(&mut out, did);
    out.extend_from_slice(name);
    out
}

pub fn encode_grm(mids: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    push_leb128(&mut out, mids.len() as u32);
    for &mid in mids {
        push_leb128(&mut out, mid);
    }
    out
}
