//! Read-only decode and query engine for rbyd metadata trees.
//!
//! An rbyd packs a log-structured, checksummed, append-only weighted
//! binary search tree into a single block. Filesystem metadata stitches
//! rbyds into b-trees and hangs them off a redundant mroot pair. This
//! crate fetches, validates, and queries those structures from disk
//! images without ever writing.
//!
//! ```no_run
//! use rlfs::{Bd, FileBd, Rbyd};
//!
//! # fn main() -> rlfs::Result<()> {
//! let bd = FileBd::open("disk.img")?;
//! let rbyd = Rbyd::fetch(&bd, 4096, &[0, 1], None, None)?;
//! for entry in &rbyd {
//!     println!("{} {:?} w{}", entry.rid, entry.tag, entry.weight);
//! }
//! # Ok(())
//! # }
//! ```

pub use rlfs_bd::{resolve_geometry, Bd, FileBd, MemoryBd};
pub use rlfs_core::{
    btree, cksum, mtree, payload, rbyd, Attr, BtreeLookup, BtreeName, DirEntry, Entry, FsConfig,
    GState, GcksumDelta, MetaTree, MtreeEntry, MtreeName, NameMatch, Rbyd,
};
pub use rlfs_error::{Result, RlfsError};
pub use rlfs_types::{BdGeometry, FormatRev, RbydAddr, Tag, TagType};
