//! On-disk primitives shared by the rlfs crates.
//!
//! Everything here is pure data: varint and word codecs, the tag codec
//! with its per-revision bit tables, and textual block addresses. No I/O
//! happens in this crate.

pub mod addr;
pub mod leb128;
pub mod tag;

pub use addr::{AddrParseError, BdGeometry, GeometryParseError, RbydAddr};
pub use leb128::{leb128_len, read_le32, read_leb128, write_le32, write_leb128};
pub use tag::{decode_tag, FormatRev, RawTag, Tag, TagTable, TagType};
