//! Decode and query engine for rbyd metadata.
//!
//! An rbyd is a log-structured, checksummed, append-only weighted
//! binary search tree packed into one block (or a redundant pair).
//! This crate scans the log into a queryable snapshot ([`rbyd::Rbyd`]),
//! stitches rbyds into b-trees ([`btree`]), and mounts whole metadata
//! trees ([`mtree`]). Everything is strictly read-only.
//!
//! Corruption on disk is a result, not an error: invalid commits roll
//! back to the previous one, invalid blocks degrade, and traversals
//! report what they could reach.

pub mod btree;
pub mod cksum;
pub mod mtree;
pub mod payload;
pub mod rbyd;

pub use btree::{Attr, BtreeLookup, BtreeName, BtreeNode, NameMatch};
pub use cksum::{crc32c, parity, PERTURB};
pub use mtree::{DirEntry, DirIter, FsConfig, GState, MetaTree, MtreeEntry, MtreeName};
pub use payload::{
    decode_bptr, decode_branch, decode_btree, decode_mdir, decode_name, decode_shrub, Bptr,
    BranchPtr, BtreePtr, ShrubPtr,
};
pub use rbyd::{AltColor, AltEdge, Entry, GcksumDelta, Rbyd};
