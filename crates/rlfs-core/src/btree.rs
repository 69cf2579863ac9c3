//! B-tree traversal and name search over rbyd blocks.
//!
//! Inner rbyds carry branch tags whose payloads point at child rbyds;
//! a record's b-tree id is its rbyd id plus the weight of everything
//! left of the branch path. Traversal rebases ids at each descent and
//! verifies every child against the checksum stored in its parent.

use std::cmp::Ordering;

use rlfs_bd::Bd;
use rlfs_error::Result;
use rlfs_types::tag::{TAG_NAME, TAG_STRUCT};
use rlfs_types::Tag;

use crate::payload::{decode_branch, decode_name, BranchPtr};
use crate::rbyd::Rbyd;

/// An owned copy of one record's tag and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub tag: Tag,
    /// Offset of the tag header in its block.
    pub off: u32,
    pub header_len: u32,
    pub data: Vec<u8>,
}

/// One level of a b-tree search path, outermost first.
#[derive(Debug, Clone)]
pub struct BtreeNode {
    /// B-tree id covered at this level.
    pub bid: i64,
    pub weight: u32,
    pub rbyd: Rbyd,
    /// Rbyd-local id at this level.
    pub rid: i64,
    pub attrs: Vec<Attr>,
}

/// Result of [`Rbyd::btree_lookup`].
#[derive(Debug, Clone)]
pub struct BtreeLookup {
    /// True when the queried bid lies past the last record.
    pub done: bool,
    pub bid: i64,
    pub weight: u32,
    /// The rbyd the search ended in. Degraded when a child failed to
    /// fetch; the path still reports every level reached.
    pub rbyd: Rbyd,
    pub rid: i64,
    /// Every tag co-located at the found record. Empty on a degraded
    /// child so traversal can continue past the damage.
    pub attrs: Vec<Attr>,
    pub path: Vec<BtreeNode>,
}

/// Result of [`Rbyd::name_lookup`]: the match, or the closest
/// predecessor when `found` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameMatch {
    pub found: bool,
    pub rid: i64,
    pub tag: Tag,
    pub weight: u32,
}

/// Result of [`Rbyd::btree_name_lookup`].
#[derive(Debug, Clone)]
pub struct BtreeName {
    pub bid: i64,
    /// The struct tag at the match, [`Tag::NULL`] if it had none.
    pub tag: Tag,
    pub weight: u32,
    pub data: Vec<u8>,
}

impl Rbyd {
    /// Look up a b-tree id starting from this rbyd as the root.
    ///
    /// Collects every tag co-located at the target record and records
    /// the full search path. `depth` limits descent; `None` (or zero)
    /// means unlimited.
    ///
    /// A degraded child stops the descent but is not an error: the
    /// result carries `done: false`, empty attrs, and the partial path,
    /// so callers can step over the damage by querying the next bid.
    pub fn btree_lookup<B: Bd + ?Sized>(
        &self,
        bd: &B,
        block_size: u32,
        bid: i64,
        depth: Option<u32>,
    ) -> Result<BtreeLookup> {
        let mut rbyd = self.clone();
        let mut rid = bid;
        let mut depth_ = 1u32;
        let mut path = Vec::new();

        // A degraded root reports one not-done position so traversal
        // sees it, then reports done.
        if !rbyd.is_valid() {
            return Ok(BtreeLookup {
                done: bid > 0,
                bid,
                weight: 0,
                rbyd,
                rid: -1,
                attrs: Vec::new(),
                path,
            });
        }

        loop {
            // Collect all tags at this rid.
            let mut attrs: Vec<Attr> = Vec::new();
            let mut branch: Option<BranchPtr> = None;
            let mut rid_ = rid;
            let mut w = 0u32;
            let mut tag = 0u16;
            let mut first = true;
            while let Some(entry) = rbyd.lookup(rid_, tag + 0x1) {
                if !first && entry.rid != rid_ {
                    break;
                }
                if first {
                    // The first tag pins the record's weight range.
                    rid_ = entry.rid;
                    w = entry.weight;
                    first = false;
                }
                tag = entry.tag.bits();

                if entry.tag.is_branch() {
                    branch = Some(decode_branch(entry.data));
                }
                attrs.push(Attr {
                    tag: entry.tag,
                    off: entry.off,
                    header_len: entry.header_len,
                    data: entry.data.to_vec(),
                });
            }

            path.push(BtreeNode {
                bid: bid + (rid_ - rid),
                weight: w,
                rbyd: rbyd.clone(),
                rid: rid_,
                attrs: attrs.clone(),
            });

            let descend = branch.filter(|_| depth.map_or(true, |d| d == 0 || depth_ < d));
            if let Some(ptr) = descend {
                let child = Rbyd::fetch_as(
                    bd,
                    block_size,
                    &[ptr.block],
                    Some(ptr.trunk),
                    Some(ptr.cksum),
                    rbyd.format,
                )?;
                if !child.is_valid() {
                    return Ok(BtreeLookup {
                        done: false,
                        bid: bid + (rid_ - rid),
                        weight: w,
                        rbyd: child,
                        rid: -1,
                        attrs: Vec::new(),
                        path,
                    });
                }
                rid -= rid_ - (i64::from(w) - 1);
                rbyd = child;
                depth_ += 1;
            } else {
                return Ok(BtreeLookup {
                    done: attrs.is_empty(),
                    bid: bid + (rid_ - rid),
                    weight: w,
                    rbyd,
                    rid: rid_,
                    attrs,
                    path,
                });
            }
        }
    }

    /// Binary search this rbyd's records by `(did, name)`.
    ///
    /// Generic names at rid 0 and records with no name tag at all
    /// compare as a low sentinel, so they never outrank a real name.
    /// Without an exact match the closest predecessor is returned with
    /// `found: false`.
    pub fn name_lookup(&self, did: u32, name: &[u8]) -> NameMatch {
        let mut best = NameMatch {
            found: false,
            rid: -1,
            tag: Tag::NULL,
            weight: 0,
        };
        let mut lower: i64 = 0;
        let mut upper: i64 = i64::from(self.weight);

        while lower < upper {
            let Some(entry) = self.lookup(lower + (upper - 1 - lower) / 2, TAG_NAME) else {
                break;
            };
            let (rid, tag) = (entry.rid, entry.tag);
            let w = i64::from(entry.weight);

            let (did_, name_): (u32, &[u8]) =
                if (tag.bits() == TAG_NAME && rid - (w - 1) == 0) || !tag.is_name() {
                    (0, b"")
                } else {
                    decode_name(entry.data)
                };

            match (did_, name_).cmp(&(did, name)) {
                Ordering::Greater => upper = rid - (w - 1),
                Ordering::Less => {
                    lower = rid + 1;
                    best = NameMatch {
                        found: false,
                        rid,
                        tag,
                        weight: entry.weight,
                    };
                }
                Ordering::Equal => {
                    return NameMatch {
                        found: true,
                        rid,
                        tag,
                        weight: entry.weight,
                    };
                }
            }
        }

        best
    }

    /// Search a whole b-tree by `(did, name)`, descending through inner
    /// name partitions to the owning leaf.
    pub fn btree_name_lookup<B: Bd + ?Sized>(
        &self,
        bd: &B,
        block_size: u32,
        did: u32,
        name: &[u8],
    ) -> Result<BtreeName> {
        let mut rbyd = self.clone();
        let mut bid: i64 = 0;

        loop {
            let m = rbyd.name_lookup(did, name);

            enum Step {
                Descend(BranchPtr),
                Leaf(Tag, Vec<u8>),
            }
            let step = match rbyd.lookup(m.rid, TAG_STRUCT) {
                Some(entry) if entry.tag.is_branch() => Step::Descend(decode_branch(entry.data)),
                Some(entry) => Step::Leaf(entry.tag, entry.data.to_vec()),
                None => Step::Leaf(Tag::NULL, Vec::new()),
            };

            match step {
                Step::Descend(ptr) => {
                    bid += m.rid - (i64::from(m.weight) - 1);
                    rbyd = Rbyd::fetch_as(
                        bd,
                        block_size,
                        &[ptr.block],
                        Some(ptr.trunk),
                        Some(ptr.cksum),
                        rbyd.format,
                    )?;
                }
                Step::Leaf(tag, data) => {
                    return Ok(BtreeName {
                        bid: bid + m.rid,
                        tag,
                        weight: m.weight,
                        data,
                    });
                }
            }
        }
    }
}
