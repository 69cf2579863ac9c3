//! A single rbyd: one fetched block image plus the scan results that
//! make it queryable.
//!
//! Fetching scans the append log commit by commit, validating each
//! against its rolling checksum, and settles on the last trunk that a
//! valid commit covers. Lookup then descends the threaded binary search
//! tree rooted at that trunk. Both directions are read-only; a fetched
//! [`Rbyd`] is an immutable snapshot.

use std::fmt;
use std::sync::Arc;

use rlfs_bd::Bd;
use rlfs_error::{Result, RlfsError};
use rlfs_types::tag::{TAG_CKSUM, TAG_P, TAG_R, TAG_SHRUB};
use rlfs_types::{decode_tag, read_le32, FormatRev, Tag, TagType};

use crate::cksum::{crc32c, parity, PERTURB};

/// One record (or in-progress query position) in an rbyd's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    /// Record id: the upper edge of this record's weight range, minus one.
    /// Weight-zero records sit at the id below them, so `-1` is valid.
    pub rid: i64,
    pub tag: Tag,
    /// Records spanned, including this one.
    pub weight: u32,
    /// Offset of the tag header within the block.
    pub off: u32,
    /// Bytes of tag header before the payload.
    pub header_len: u32,
    /// The payload, clamped to the block.
    pub data: &'a [u8],
}

/// One alt edge crossed during a traced lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AltEdge {
    /// Offset of the alt's tag header.
    pub off: u32,
    /// Offset descent continued at.
    pub to: u32,
    /// Whether the alt's jump was taken.
    pub followed: bool,
    pub color: AltColor,
}

/// Render color of an alt edge. Red alts pair with their successor;
/// two reds in a row render as yellow. Color never affects lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltColor {
    Black,
    Red,
    Yellow,
}

/// A gcksum-delta captured from the log: a commit-family tag carrying a
/// correction to the filesystem's global checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcksumDelta {
    pub tag: Tag,
    pub weight: u32,
    /// Offset of the tag header within the block.
    pub off: u32,
    pub header_len: u32,
    pub data: Vec<u8>,
}

/// A fetched rbyd block (or redundant block group).
#[derive(Debug, Clone)]
pub struct Rbyd {
    /// Candidate blocks, winner first.
    pub blocks: Vec<u32>,
    /// The winning block's full image.
    pub data: Arc<[u8]>,
    /// Revision counter from the first four bytes.
    pub rev: u32,
    /// End of the last valid commit; appends would resume here.
    pub eoff: u32,
    /// Root of the current tree. Zero means no valid tree was found.
    pub trunk: u32,
    /// Total records in the tree.
    pub weight: u32,
    /// Canonical checksum of the committed content.
    pub cksum: u32,
    /// On-disk format revision the scan decoded under. Descents into
    /// child rbyds inherit it.
    pub format: FormatRev,
    /// The last committed gcksum-delta, when the format has one.
    pub gcksum_delta: Option<GcksumDelta>,
}

impl Rbyd {
    /// The winning block.
    pub fn block(&self) -> u32 {
        self.blocks[0]
    }

    /// Whether a valid tree was found. A degraded rbyd still carries its
    /// revision and checksum for diagnostics.
    pub fn is_valid(&self) -> bool {
        self.trunk != 0
    }

    /// Fetch an rbyd from one or more candidate blocks.
    ///
    /// With several candidates, each block is scanned and the freshest
    /// valid copy wins: later by revision under 32-bit sequence
    /// arithmetic, with the longer trunk breaking revision ties. Losing
    /// blocks are retained after the winner, rotated so recovery can
    /// still find them.
    ///
    /// `trunk` pins the scan to the best commit covering that offset
    /// instead of the newest. `cksum` is an expected canonical checksum;
    /// on mismatch the result is degraded rather than an error.
    pub fn fetch<B: Bd + ?Sized>(
        bd: &B,
        block_size: u32,
        blocks: &[u32],
        trunk: Option<u32>,
        cksum: Option<u32>,
    ) -> Result<Self> {
        Self::fetch_as(bd, block_size, blocks, trunk, cksum, FormatRev::default())
    }

    /// [`Self::fetch`] under an explicit on-disk format revision.
    pub fn fetch_as<B: Bd + ?Sized>(
        bd: &B,
        block_size: u32,
        blocks: &[u32],
        trunk: Option<u32>,
        cksum: Option<u32>,
        format: FormatRev,
    ) -> Result<Self> {
        match blocks {
            [] => Err(RlfsError::NoBlocks),
            [block] => {
                let data: Arc<[u8]> = bd.read_block(*block, block_size)?.into();
                Ok(Self::scan(*block, data, trunk, cksum, format))
            }
            blocks => {
                let rbyds = blocks
                    .iter()
                    .map(|&block| Self::fetch_as(bd, block_size, &[block], trunk, cksum, format))
                    .collect::<Result<Vec<_>>>()?;

                // Pick the most recent valid copy: strictly newer by
                // sequence arithmetic, or same revision with a longer
                // trunk.
                let mut i = 0;
                for (i_, rbyd) in rbyds.iter().enumerate() {
                    let newer = rbyd.rev != rbyds[i].rev
                        && rbyd.rev.wrapping_sub(rbyds[i].rev) & 0x8000_0000 == 0;
                    if rbyd.is_valid()
                        && (!rbyds[i].is_valid()
                            || newer
                            || (rbyd.rev == rbyds[i].rev && rbyd.trunk > rbyds[i].trunk))
                    {
                        i = i_;
                    }
                }

                let mut rbyd = rbyds[i].clone();
                rbyd.blocks.extend(
                    (0..rbyds.len() - 1).map(|j| rbyds[(i + 1 + j) % rbyds.len()].block()),
                );
                tracing::debug!(winner = %rbyd, rev = rbyd.rev, "rbyd revision selection");
                Ok(rbyd)
            }
        }
    }

    /// Re-scan this rbyd's block image with an explicit trunk.
    ///
    /// Shrub roots live in the same log as the tree that points at them;
    /// re-scanning the already-read image keeps the two views coherent.
    pub fn fetch_trunk(&self, trunk: u32) -> Self {
        Self::scan(
            self.block(),
            Arc::clone(&self.data),
            Some(trunk),
            None,
            self.format,
        )
    }

    fn scan(
        block: u32,
        data: Arc<[u8]>,
        trunk: Option<u32>,
        expected_cksum: Option<u32>,
        format: FormatRev,
    ) -> Self {
        let len = data.len();
        let trunk = trunk.filter(|&t| t != 0);

        let rev = read_le32(&data);

        // Three layers of checksum state: `cksum` is the last committed
        // canonical checksum, `cksum_` the canonical checksum up to the
        // current position, and `cksum__` the raw rolling state with any
        // perturb constant still folded in.
        let mut cksum = 0u32;
        let mut cksum_ = crc32c(0, &data[..4.min(len)]);
        let mut cksum__ = cksum_;
        let mut perturb = false;

        let mut eoff = 0usize;
        let mut eoff_: Option<usize> = None;
        let mut j = 4usize;

        // Trunk tracking: `trunk_run` is the in-progress run, `trunk_cand`
        // the last completed run, `trunk_ok` the last committed one.
        // Weights mirror the same three stages.
        let mut trunk_ok = 0usize;
        let mut trunk_cand = 0usize;
        let mut trunk_run = 0usize;
        let mut weight = 0u32;
        let mut weight_cand = 0u32;
        let mut weight_run = 0u32;

        // Gcksum-deltas stage like trunks: captured where seen, owned
        // by the commit that validates them.
        let mut gcksum_delta: Option<GcksumDelta> = None;
        let mut gcksum_stage: Option<GcksumDelta> = None;

        while j < len && trunk.map_or(true, |t| eoff <= t as usize) {
            let raw = decode_tag(&data[j..]);
            let (tag, d) = (raw.tag, raw.header_len as usize);

            if raw.valid != parity(cksum__) {
                break;
            }
            cksum__ ^= if raw.valid { 0x0000_0080 } else { 0 };
            cksum__ = crc32c(cksum__, &data[j..(j + d).min(len)]);
            j += d;
            let size = raw.size as usize;
            if !tag.is_alt() && j + size > len {
                break;
            }

            if !tag.is_alt() {
                match tag.classify(format) {
                    TagType::Cksum => {
                        // A cksum tag's payload holds the expected rolling
                        // checksum; compare rather than accumulate.
                        let stored = read_le32(&data[j..(j + 4).min(len)]);
                        if cksum__ != stored {
                            break;
                        }
                        // Commit everything staged so far.
                        eoff = eoff_.unwrap_or(j + size);
                        cksum = cksum_;
                        trunk_ok = trunk_cand;
                        weight = weight_cand;
                        gcksum_delta = gcksum_stage.take();
                        perturb = tag.bits() & format.table().cksum_flag_mask & TAG_P != 0;
                        cksum__ = cksum_ ^ if perturb { PERTURB } else { 0 };
                    }
                    kind => {
                        cksum__ = crc32c(cksum__, &data[j..j + size]);
                        if kind == TagType::GcksumDelta {
                            gcksum_stage = Some(GcksumDelta {
                                tag,
                                weight: raw.weight,
                                off: (j - d) as u32,
                                header_len: d as u32,
                                data: data[j..j + size].to_vec(),
                            });
                        }
                    }
                }
            }

            // Commit-family tags are bookkeeping and never extend a trunk.
            if tag.bits() & 0xf000 != TAG_CKSUM {
                let past_pinned =
                    trunk.is_some_and(|t| j - d > t as usize) && trunk_run == 0;
                if !past_pinned {
                    if trunk_run == 0 {
                        trunk_run = j - d;
                        weight_run = 0;
                    }
                    weight_run += raw.weight;

                    if !tag.is_alt() {
                        // A leaf ends the run. Shrub runs stay off the
                        // main trunk unless this run was pinned exactly.
                        if tag.bits() & TAG_SHRUB == 0
                            || trunk == Some(trunk_run as u32)
                        {
                            trunk_cand = trunk_run;
                            weight_cand = weight_run;
                            if trunk.is_some_and(|t| j + size > t as usize) {
                                // The pinned trunk sits inside this
                                // not-yet-committed region; accept it as
                                // if committed.
                                eoff_ = Some(j + size);
                                eoff = j + size;
                                cksum = cksum__ ^ if perturb { PERTURB } else { 0 };
                                trunk_ok = trunk_cand;
                                weight = weight_cand;
                                gcksum_delta = gcksum_stage.clone();
                            }
                        }
                        trunk_run = 0;
                    }
                }

                cksum_ = cksum__ ^ if perturb { PERTURB } else { 0 };
            }

            if !tag.is_alt() {
                j += size;
            }
        }

        if let Some(expected) = expected_cksum {
            if cksum != expected {
                tracing::warn!(
                    block = format_args!("{block:#x}"),
                    cksum = format_args!("{cksum:#010x}"),
                    expected = format_args!("{expected:#010x}"),
                    "rbyd checksum mismatch",
                );
                return Self {
                    blocks: vec![block],
                    data,
                    rev,
                    eoff: 0,
                    trunk: 0,
                    weight: 0,
                    cksum,
                    format,
                    gcksum_delta,
                };
            }
        }

        Self {
            blocks: vec![block],
            data,
            rev,
            eoff: eoff as u32,
            trunk: trunk_ok as u32,
            weight,
            cksum,
            format,
            gcksum_delta,
        }
    }

    /// Look up the first record at or after `(rid, tag)`.
    ///
    /// Returns `None` once the query passes the last record. The query
    /// tag is clamped to at least `0x1` so a zero tag means "first tag
    /// at this rid".
    pub fn lookup(&self, rid: i64, tag: u16) -> Option<Entry<'_>> {
        self.walk(rid, tag, None)
    }

    /// [`Self::lookup`], also recording every alt edge crossed.
    pub fn lookup_traced(
        &self,
        rid: i64,
        tag: u16,
        path: &mut Vec<AltEdge>,
    ) -> Option<Entry<'_>> {
        self.walk(rid, tag, Some(path))
    }

    fn walk(&self, rid: i64, tag: u16, mut path: Option<&mut Vec<AltEdge>>) -> Option<Entry<'_>> {
        if !self.is_valid() {
            return None;
        }

        let data = &self.data[..];
        let len = data.len();
        let tag = tag.max(0x1);
        let mut lower: i64 = 0;
        let mut upper: i64 = i64::from(self.weight);
        let mut j = self.trunk as usize;

        loop {
            let raw = decode_tag(&data[j.min(len)..]);
            let alt = raw.tag;
            let (w, d) = (i64::from(raw.weight), raw.header_len as usize);

            if alt.is_alt() {
                let jump = raw.size as usize;
                let follow = if alt.is_gt() {
                    (rid, tag & 0xfff) > (upper - w - 1, alt.key())
                } else {
                    (rid, tag & 0xfff) <= (lower + w - 1, alt.key())
                };

                let from = j;
                if follow {
                    // A zero jump would revisit this alt; only corrupt
                    // data encodes one.
                    if jump == 0 {
                        return None;
                    }
                    if alt.is_gt() {
                        lower += upper - lower - w;
                    } else {
                        upper -= upper - lower - w;
                    }
                    j = j.saturating_sub(jump);
                } else {
                    if alt.is_gt() {
                        upper -= w;
                    } else {
                        lower += w;
                    }
                    j += d;
                }

                if let Some(path) = path.as_deref_mut() {
                    let color = if alt.bits() & TAG_R != 0 {
                        // A red alt pairs with its successor; peek at it
                        // to tell red from yellow.
                        let next_off = if follow { from + d } else { j };
                        let next = decode_tag(&data[next_off.min(len)..]);
                        if next.tag.bits() & TAG_R != 0 && next.tag.is_alt() {
                            AltColor::Yellow
                        } else {
                            AltColor::Red
                        }
                    } else {
                        AltColor::Black
                    };
                    path.push(AltEdge {
                        off: from as u32,
                        to: j as u32,
                        followed: follow,
                        color,
                    });
                }
            } else {
                let rid_ = upper - 1;
                let w_ = upper - lower;

                if alt.is_null() || (rid_, alt.bits()) < (rid, tag) {
                    return None;
                }

                let start = (j + d).min(len);
                let end = (j + d + raw.size as usize).min(len);
                return Some(Entry {
                    rid: rid_,
                    tag: alt,
                    weight: w_ as u32,
                    off: j as u32,
                    header_len: d as u32,
                    data: &data[start..end],
                });
            }
        }
    }

    /// Iterate every record in id/tag order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            rbyd: self,
            rid: -1,
            tag: 0,
        }
    }
}

impl fmt::Display for Rbyd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.blocks.len() == 1 {
            write!(f, "{:#x}.{:x}", self.block(), self.trunk)
        } else {
            write!(f, "0x{{")?;
            for (i, block) in self.blocks.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{block:x}")?;
            }
            write!(f, "}}.{:x}", self.trunk)
        }
    }
}

impl PartialEq for Rbyd {
    fn eq(&self, other: &Self) -> bool {
        self.block() == other.block() && self.trunk == other.trunk
    }
}

impl Eq for Rbyd {}

/// Iterator over an rbyd's records, in `(rid, tag)` order.
pub struct Iter<'a> {
    rbyd: &'a Rbyd,
    rid: i64,
    tag: u16,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Entry<'a>> {
        let entry = self.rbyd.lookup(self.rid, self.tag + 0x1)?;
        self.rid = entry.rid;
        self.tag = entry.tag.bits();
        Some(entry)
    }
}

impl<'a> IntoIterator for &'a Rbyd {
    type Item = Entry<'a>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
