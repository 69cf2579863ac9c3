//! The rbyd tag codec.
//!
//! A tag is the record header of the rbyd append log: a 2-byte big-endian
//! type/flags word followed by two varints (weight, then size for leaf
//! tags or backward jump distance for alt tags).
//!
//! Word layout:
//!
//! ```text
//! v--- ---- ---- ----   bit 15: valid/parity bit
//! -1cd kkkk -kkk kkkk   alt:  c = color (red/black), d = direction (gt/le),
//!                             k = 12-bit discriminator key
//! -tt- tttt -ttt tttt   leaf: 13-bit type code (plus shrub flag at bit 12)
//! ```
//!
//! Decoding never fails. Short slices are zero-padded, and a garbage
//! header simply decodes to a tag whose parity/checksum validation will
//! reject the log run it sits in.

use std::fmt;

use crate::leb128::read_leb128;

pub const TAG_NULL: u16 = 0x0000;
pub const TAG_CONFIG: u16 = 0x0000;
pub const TAG_MAGIC: u16 = 0x0003;
pub const TAG_VERSION: u16 = 0x0004;
pub const TAG_RCOMPAT: u16 = 0x0005;
pub const TAG_WCOMPAT: u16 = 0x0006;
pub const TAG_OCOMPAT: u16 = 0x0007;
pub const TAG_GEOMETRY: u16 = 0x0009;
pub const TAG_NAMELIMIT: u16 = 0x000c;
pub const TAG_FILELIMIT: u16 = 0x000d;
pub const TAG_GDELTA: u16 = 0x0100;
pub const TAG_GRMDELTA: u16 = 0x0100;
pub const TAG_NAME: u16 = 0x0200;
pub const TAG_REG: u16 = 0x0201;
pub const TAG_DIR: u16 = 0x0202;
pub const TAG_BOOKMARK: u16 = 0x0204;
pub const TAG_STICKYNOTE: u16 = 0x0205;
pub const TAG_STRUCT: u16 = 0x0300;
pub const TAG_DATA: u16 = 0x0300;
pub const TAG_BLOCK: u16 = 0x0304;
pub const TAG_BSHRUB: u16 = 0x0308;
pub const TAG_BTREE: u16 = 0x030c;
pub const TAG_MROOT: u16 = 0x0311;
pub const TAG_MDIR: u16 = 0x0315;
pub const TAG_MTREE: u16 = 0x031c;
pub const TAG_DID: u16 = 0x0320;
pub const TAG_BRANCH: u16 = 0x032c;
pub const TAG_ATTR: u16 = 0x0400;
pub const TAG_UATTR: u16 = 0x0400;
pub const TAG_SATTR: u16 = 0x0500;

/// Shrub flag: the tag belongs to an inlined sub-tree, not the main trunk.
pub const TAG_SHRUB: u16 = 0x1000;

pub const TAG_ALT: u16 = 0x4000;
/// Alt color flag: red when set, black when clear.
pub const TAG_R: u16 = 0x2000;
/// Alt direction flag: greater-than when set, less-or-equal when clear.
pub const TAG_GT: u16 = 0x1000;

pub const TAG_CKSUM: u16 = 0x3000;
/// Checksum-tag perturb flag.
pub const TAG_P: u16 = 0x0001;
/// Checksum-tag q flag (format revision 0 only).
pub const TAG_Q: u16 = 0x0002;
pub const TAG_NOTE: u16 = 0x3100;
pub const TAG_ECKSUM: u16 = 0x3200;
pub const TAG_GCKSUMDELTA: u16 = 0x3300;

/// A raw tag header as decoded from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTag {
    /// The valid/parity bit (word bit 15).
    pub valid: bool,
    /// The 15-bit tag value.
    pub tag: Tag,
    /// Logical records spanned by this tag.
    pub weight: u32,
    /// Payload length for leaf tags; backward jump distance for alt tags.
    pub size: u32,
    /// Bytes consumed by the header: 2 + len(weight) + len(size).
    pub header_len: u32,
}

/// Decode one tag header from a byte cursor.
///
/// Slices shorter than the 4-byte minimum are zero-padded; varints cut
/// off by the end of the slice decode to their digits so far. The
/// returned `header_len` is what the cursor actually consumed.
pub fn decode_tag(buf: &[u8]) -> RawTag {
    let mut pad = [0u8; 4];
    let data: &[u8] = if buf.len() >= 4 {
        buf
    } else {
        pad[..buf.len()].copy_from_slice(buf);
        &pad
    };

    let word = (u16::from(data[0]) << 8) | u16::from(data[1]);
    let (weight, d) = read_leb128(&data[2..]);
    let (size, d_) = read_leb128(&data[2 + d..]);

    RawTag {
        valid: word & 0x8000 != 0,
        tag: Tag(word & 0x7fff),
        weight,
        size,
        header_len: (2 + d + d_) as u32,
    }
}

/// A 15-bit tag value (the type/flags word without its valid bit).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tag(pub u16);

impl Tag {
    pub const NULL: Self = Self(TAG_NULL);

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Null tags terminate lookup: they carry no record.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_alt(self) -> bool {
        self.0 & TAG_ALT != 0
    }

    /// Alt direction: true for greater-than, false for less-or-equal.
    #[inline]
    pub const fn is_gt(self) -> bool {
        self.0 & TAG_GT != 0
    }

    /// Alt color, red when set. Only affects rendering height, never lookup.
    #[inline]
    pub const fn is_red(self) -> bool {
        self.0 & TAG_R != 0
    }

    #[inline]
    pub const fn is_shrub(self) -> bool {
        self.0 & TAG_SHRUB != 0
    }

    /// The 12-bit discriminator used in ordered descent and alt partitions.
    #[inline]
    pub const fn key(self) -> u16 {
        self.0 & 0x0fff
    }

    /// The low subtype byte of a leaf tag.
    #[inline]
    pub const fn subtype(self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// Whether this tag sits in the commit family (`0x3xxx`): checksum,
    /// note, erased-state checksum, gcksum-delta. Commit-family tags never
    /// contribute to trunk evaluation.
    #[inline]
    pub const fn is_commit_family(self) -> bool {
        self.0 & 0xf000 == TAG_CKSUM
    }

    /// Whether this tag is an actual checksum commit tag (`0x30xx`).
    #[inline]
    pub const fn is_cksum(self) -> bool {
        self.0 & 0xff00 == TAG_CKSUM
    }

    /// The perturb flag of a checksum tag.
    #[inline]
    pub const fn perturbs(self) -> bool {
        self.0 & TAG_P != 0
    }

    /// Whether this is a name-family tag (`0x02xx`, shrub flag clear).
    #[inline]
    pub const fn is_name(self) -> bool {
        self.0 & 0xff00 == TAG_NAME
    }

    /// Whether this is a branch pointer to a child rbyd block.
    #[inline]
    pub const fn is_branch(self) -> bool {
        self.0 & 0x0fff == TAG_BRANCH
    }

    /// Classify the tag under a format revision's bit table.
    pub fn classify(self, rev: FormatRev) -> TagType {
        if self.is_alt() {
            return TagType::Alt;
        }
        if self.is_commit_family() {
            return match self.0 & 0x7f00 {
                TAG_CKSUM => TagType::Cksum,
                TAG_NOTE => TagType::Note,
                TAG_ECKSUM => TagType::Ecksum,
                TAG_GCKSUMDELTA if rev.table().has_gcksum_delta => TagType::GcksumDelta,
                _ => TagType::Unknown,
            };
        }
        if self.0 & 0x6fff == TAG_NULL {
            return TagType::Null;
        }
        match self.0 & 0x6f00 {
            TAG_CONFIG => TagType::Config,
            TAG_GDELTA => TagType::GDelta,
            TAG_NAME => TagType::Name,
            TAG_STRUCT => TagType::Struct,
            _ if self.0 & 0x6e00 == TAG_ATTR => TagType::Attr,
            _ => TagType::Unknown,
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:#06x})", self.0)
    }
}

impl From<u16> for Tag {
    fn from(bits: u16) -> Self {
        Self(bits & 0x7fff)
    }
}

/// Tag classification, decoded once from the bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    /// No record; terminates lookup.
    Null,
    /// Filesystem configuration (`0x00xx`): magic, version, limits.
    Config,
    /// Global-state delta (`0x01xx`).
    GDelta,
    /// Name record (`0x02xx`): reg, dir, bookmark, stickynote.
    Name,
    /// Structure record (`0x03xx`): data, block, btree, mroot, mdir, branch.
    Struct,
    /// Custom attribute (`0x04xx`/`0x05xx`).
    Attr,
    /// Internal binary-search node: a backward jump with a partition rule.
    Alt,
    /// Commit checksum tag.
    Cksum,
    /// Padding note; checksummed but otherwise inert.
    Note,
    /// Erased-state checksum.
    Ecksum,
    /// Global checksum delta (format revision 2 only).
    GcksumDelta,
    /// Not assigned in the selected format revision.
    Unknown,
}

/// On-disk tag-layout generation.
///
/// Three generations share the scan and lookup algorithms and differ only
/// in the commit-family low bits. The differences are kept as static
/// table data rather than branches so a fourth generation stays a data
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatRev {
    /// Checksum tags carry `p` and `q` flags; no gcksum-delta subtype.
    V0,
    /// Checksum tags carry only the `p` flag; no gcksum-delta subtype.
    V1,
    /// Checksum tags carry only the `p` flag; gcksum-delta at `0x3300`.
    #[default]
    V2,
}

/// Per-revision commit-family bit assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagTable {
    /// Mask of flag bits in a checksum tag's low byte.
    pub cksum_flag_mask: u16,
    /// Whether `0x3300` decodes as a gcksum-delta.
    pub has_gcksum_delta: bool,
}

static TAG_TABLES: [TagTable; 3] = [
    TagTable {
        cksum_flag_mask: TAG_P | TAG_Q,
        has_gcksum_delta: false,
    },
    TagTable {
        cksum_flag_mask: TAG_P,
        has_gcksum_delta: false,
    },
    TagTable {
        cksum_flag_mask: TAG_P,
        has_gcksum_delta: true,
    },
];

impl FormatRev {
    pub const fn table(self) -> &'static TagTable {
        match self {
            Self::V0 => &TAG_TABLES[0],
            Self::V1 => &TAG_TABLES[1],
            Self::V2 => &TAG_TABLES[2],
        }
    }
}
