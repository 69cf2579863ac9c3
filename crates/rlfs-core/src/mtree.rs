//! The metadata tree: mroot chains, mdirs, and the mtree b-tree.
//!
//! A filesystem's metadata starts at a redundant mroot pair. Each
//! mroot may point at a further mroot (a chain, ending at the active
//! one), at a single mdir, or at an mtree whose leaves hold mdir
//! pointers. Directories are flat runs of name records sharing a
//! directory id, anchored by a bookmark record.

use std::collections::{BTreeMap, BTreeSet};

use rlfs_bd::Bd;
use rlfs_error::Result;
use rlfs_types::tag::{
    TAG_ATTR, TAG_BOOKMARK, TAG_CONFIG, TAG_DID, TAG_FILELIMIT, TAG_GDELTA, TAG_GEOMETRY,
    TAG_GRMDELTA, TAG_MAGIC, TAG_MDIR, TAG_MROOT, TAG_MTREE, TAG_NAME, TAG_NAMELIMIT,
    TAG_OCOMPAT, TAG_RCOMPAT, TAG_VERSION, TAG_WCOMPAT,
};
use rlfs_types::{read_leb128, Tag};

use crate::payload::{decode_btree, decode_mdir, decode_name};
use crate::rbyd::Rbyd;

/// One mdir found through the mtree.
#[derive(Debug, Clone)]
pub struct MtreeEntry {
    /// Metadata b-tree id; `-1` for an inlined mroot, `0` for a sole mdir.
    pub mbid: i64,
    pub weight: u32,
    pub mdir: Rbyd,
}

/// Result of [`Rbyd::mtree_name_lookup`].
#[derive(Debug, Clone)]
pub struct MtreeName {
    pub found: bool,
    pub mbid: i64,
    pub mweight: u32,
    pub mdir: Rbyd,
    pub rid: i64,
    pub tag: Tag,
    pub weight: u32,
}

impl Rbyd {
    /// Look up the mdir holding a metadata b-tree id, treating this
    /// rbyd as the mroot. Returns `None` past the last mdir or when the
    /// path is corrupted.
    pub fn mtree_lookup<B: Bd + ?Sized>(
        &self,
        bd: &B,
        block_size: u32,
        mbid: i64,
    ) -> Result<Option<MtreeEntry>> {
        let mtree_ptr = self
            .lookup(-1, TAG_MTREE)
            .filter(|e| e.rid == -1 && e.tag.bits() == TAG_MTREE)
            .map(|e| decode_btree(e.data));

        if let Some(ptr) = mtree_ptr {
            let mtree = Rbyd::fetch_as(
                bd,
                block_size,
                &[ptr.branch.block],
                Some(ptr.branch.trunk),
                Some(ptr.branch.cksum),
                self.format,
            )?;
            if !mtree.is_valid() {
                return Ok(None);
            }

            let found = mtree.btree_lookup(bd, block_size, mbid, None)?;
            if found.done {
                return Ok(None);
            }
            let Some(attr) = found.attrs.iter().find(|a| a.tag.bits() == TAG_MDIR) else {
                return Ok(None);
            };

            let blocks = decode_mdir(&attr.data);
            let mdir = Rbyd::fetch_as(bd, block_size, &blocks, None, None, self.format)?;
            return Ok(Some(MtreeEntry {
                mbid: found.bid,
                weight: found.weight,
                mdir,
            }));
        }

        let mdir_blocks = self
            .lookup(-1, TAG_MDIR)
            .filter(|e| e.rid == -1 && e.tag.bits() == TAG_MDIR)
            .map(|e| decode_mdir(e.data));

        if let Some(blocks) = mdir_blocks {
            let mdir = Rbyd::fetch_as(bd, block_size, &blocks, None, None, self.format)?;
            return Ok(Some(MtreeEntry {
                mbid: 0,
                weight: 0,
                mdir,
            }));
        }

        // No mtree and no mdir: metadata is inlined in the mroot itself.
        if mbid == -1 {
            return Ok(Some(MtreeEntry {
                mbid: -1,
                weight: 0,
                mdir: self.clone(),
            }));
        }
        Ok(None)
    }

    /// Search the whole metadata tree by `(did, name)`, treating this
    /// rbyd as the mroot. Returns `None` when the path is corrupted;
    /// otherwise the owning mdir plus the match (or predecessor).
    pub fn mtree_name_lookup<B: Bd + ?Sized>(
        &self,
        bd: &B,
        block_size: u32,
        did: u32,
        name: &[u8],
    ) -> Result<Option<MtreeName>> {
        let mtree_ptr = self
            .lookup(-1, TAG_MTREE)
            .filter(|e| e.rid == -1 && e.tag.bits() == TAG_MTREE)
            .map(|e| decode_btree(e.data));

        let (mbid, mweight, mdir) = if let Some(ptr) = mtree_ptr {
            let mtree = Rbyd::fetch_as(
                bd,
                block_size,
                &[ptr.branch.block],
                Some(ptr.branch.trunk),
                Some(ptr.branch.cksum),
                self.format,
            )?;
            if !mtree.is_valid() {
                return Ok(None);
            }

            let found = mtree.btree_name_lookup(bd, block_size, did, name)?;
            if found.tag.bits() != TAG_MDIR {
                return Ok(None);
            }

            let blocks = decode_mdir(&found.data);
            let mdir = Rbyd::fetch_as(bd, block_size, &blocks, None, None, self.format)?;
            (found.bid, found.weight, mdir)
        } else if let Some(blocks) = self
            .lookup(-1, TAG_MDIR)
            .filter(|e| e.rid == -1 && e.tag.bits() == TAG_MDIR)
            .map(|e| decode_mdir(e.data))
        {
            (
                0,
                0,
                Rbyd::fetch_as(bd, block_size, &blocks, None, None, self.format)?,
            )
        } else {
            (-1, 0, self.clone())
        };

        let m = mdir.name_lookup(did, name);
        Ok(Some(MtreeName {
            found: m.found,
            mbid,
            mweight,
            mdir,
            rid: m.rid,
            tag: m.tag,
            weight: m.weight,
        }))
    }

    /// Iterate a directory's entries in name order, treating this rbyd
    /// as the mroot. Iteration starts at the directory's bookmark and
    /// ends at the first record with a different directory id, crossing
    /// mdir boundaries as needed.
    pub fn read_dir<'a, B: Bd + ?Sized>(
        &'a self,
        bd: &'a B,
        block_size: u32,
        did: u32,
    ) -> Result<DirIter<'a, B>> {
        let anchor = self.mtree_name_lookup(bd, block_size, did, b"")?;
        let state = anchor
            .filter(|a| a.found)
            .map(|a| (a.mbid, a.mweight, a.mdir, a.rid));
        Ok(DirIter {
            mroot: self,
            bd,
            block_size,
            did,
            state,
        })
    }
}

/// One directory entry from [`DirIter`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub mbid: i64,
    pub mweight: u32,
    pub mdir: Rbyd,
    pub rid: i64,
    pub tag: Tag,
    pub weight: u32,
}

/// Iterator over one directory, bookmark first.
pub struct DirIter<'a, B: Bd + ?Sized> {
    mroot: &'a Rbyd,
    bd: &'a B,
    block_size: u32,
    did: u32,
    state: Option<(i64, u32, Rbyd, i64)>,
}

impl<B: Bd + ?Sized> Iterator for DirIter<'_, B> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Result<DirEntry>> {
        let (mbid, mweight, mdir, rid) = self.state.take()?;

        let entry = mdir.lookup(rid, TAG_NAME)?;
        let (did_, name) = decode_name(entry.data);
        if did_ != self.did {
            return None;
        }

        let out = DirEntry {
            name: name.to_vec(),
            mbid,
            mweight,
            mdir: mdir.clone(),
            rid: entry.rid,
            tag: entry.tag,
            weight: entry.weight,
        };

        // Advance, rolling over into the next mdir when this one ends.
        let mut rid_ = entry.rid + i64::from(entry.weight);
        let weight = i64::from(mdir.weight);
        if rid_ < weight {
            self.state = Some((mbid, mweight, mdir, rid_));
        } else {
            rid_ -= weight;
            match self.mroot.mtree_lookup(self.bd, self.block_size, mbid + 1) {
                // A sole mdir reports itself for every mbid; stop
                // instead of wrapping back to its first record.
                Ok(Some(next)) if next.mbid != mbid || next.mdir != mdir => {
                    self.state = Some((next.mbid, next.weight, next.mdir, rid_));
                }
                Ok(Some(_)) | Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }
        }

        Some(Ok(out))
    }
}

/// Filesystem configuration, parsed eagerly from the active mroot.
#[derive(Debug, Clone, Default)]
pub struct FsConfig {
    /// Every config and custom-attribute payload, keyed by tag bits.
    pub entries: BTreeMap<u16, Vec<u8>>,
    pub magic: Option<Vec<u8>>,
    pub version: Option<(u32, u32)>,
    pub rcompat: Option<Vec<u8>>,
    pub wcompat: Option<Vec<u8>>,
    pub ocompat: Option<Vec<u8>>,
    /// Block size and count, stored off-by-one on disk.
    pub geometry: Option<(u32, u32)>,
    pub name_limit: Option<u32>,
    pub file_limit: Option<u32>,
}

impl FsConfig {
    pub fn from_mroot(mroot: &Rbyd) -> Self {
        let mut entries = BTreeMap::new();

        let mut tag = 0u16;
        while let Some(entry) = mroot.lookup(-1, tag + 0x1) {
            if entry.rid != -1 || entry.tag.bits() & 0xff00 != TAG_CONFIG {
                break;
            }
            tag = entry.tag.bits();
            entries.insert(tag, entry.data.to_vec());
        }

        // Custom attributes on the mroot ride along with the config.
        let mut tag = TAG_ATTR;
        while let Some(entry) = mroot.lookup(-1, tag + 0x1) {
            if entry.rid != -1 || entry.tag.bits() & 0xfe00 != TAG_ATTR {
                break;
            }
            tag = entry.tag.bits();
            entries.insert(tag, entry.data.to_vec());
        }

        let leb = |data: &[u8]| read_leb128(data).0;
        let leb2 = |data: &[u8]| {
            let (a, d) = read_leb128(data);
            let (b, _) = read_leb128(&data[d..]);
            (a, b)
        };

        Self {
            magic: entries.get(&TAG_MAGIC).cloned(),
            version: entries.get(&TAG_VERSION).map(|d| leb2(d)),
            rcompat: entries.get(&TAG_RCOMPAT).cloned(),
            wcompat: entries.get(&TAG_WCOMPAT).cloned(),
            ocompat: entries.get(&TAG_OCOMPAT).cloned(),
            geometry: entries.get(&TAG_GEOMETRY).map(|d| {
                let (size, count) = leb2(d);
                (size + 1, count + 1)
            }),
            name_limit: entries.get(&TAG_NAMELIMIT).map(|d| leb(d)),
            file_limit: entries.get(&TAG_FILELIMIT).map(|d| leb(d)),
            entries,
        }
    }
}

/// Where one gstate delta came from, for diagnostics.
#[derive(Debug, Clone)]
pub struct GDeltaSource {
    pub mbid: i64,
    pub mweight: u32,
    pub block: u32,
    pub off: u32,
    pub data: Vec<u8>,
}

/// Global state, accumulated by xor over every mdir's gdelta tags.
#[derive(Debug, Clone)]
pub struct GState {
    /// Accumulated state, keyed by gdelta tag bits.
    pub gstate: BTreeMap<u16, Vec<u8>>,
    /// Per-tag delta provenance, in visit order.
    pub gdelta: BTreeMap<u16, Vec<GDeltaSource>>,
    /// Records per mtree leaf; scales metadata ids for grm decoding.
    pub mleaf_weight: u32,
}

impl GState {
    pub fn new(mleaf_weight: u32) -> Self {
        Self {
            gstate: BTreeMap::new(),
            gdelta: BTreeMap::new(),
            mleaf_weight,
        }
    }

    /// Fold one mdir's gdelta tags into the accumulated state.
    pub fn xor(&mut self, mbid: i64, mweight: u32, mdir: &Rbyd) {
        let mut tag = TAG_GDELTA - 0x1;
        while let Some(entry) = mdir.lookup(-1, tag + 0x1) {
            if entry.rid != -1 || entry.tag.bits() & 0xff00 != TAG_GDELTA {
                break;
            }
            tag = entry.tag.bits();

            self.gdelta.entry(tag).or_default().push(GDeltaSource {
                mbid,
                mweight,
                block: mdir.block(),
                off: entry.off + entry.header_len,
                data: entry.data.to_vec(),
            });

            let state = self.gstate.entry(tag).or_default();
            if state.len() < entry.data.len() {
                state.resize(entry.data.len(), 0);
            }
            for (a, b) in state.iter_mut().zip(entry.data) {
                *a ^= b;
            }
        }
    }

    /// Decode the accumulated grm: pending metadata-id removals, at
    /// most two. A count above two means the state is unknown to us
    /// and decodes as none.
    pub fn grm(&self) -> Vec<(i64, i64)> {
        let Some(data) = self.gstate.get(&TAG_GRMDELTA) else {
            return Vec::new();
        };

        let (count, mut d) = read_leb128(data);
        let mut rms = Vec::new();
        if count <= 2 {
            for _ in 0..count {
                let (mid, d_) = read_leb128(&data[d.min(data.len())..]);
                d += d_;
                let mid = i64::from(mid);
                let mlw = i64::from(self.mleaf_weight);
                rms.push((mid - mid % mlw, mid % mlw));
            }
        }
        rms
    }
}

/// One directory-id record found while mounting, used to reconcile
/// dirs against bookmarks.
#[derive(Debug, Clone)]
struct DidRecord {
    did: u32,
    mbid: i64,
    mweight: u32,
    rid: i64,
}

/// A mounted metadata tree: the active mroot plus everything a full
/// pass over the metadata collects.
#[derive(Debug, Clone)]
pub struct MetaTree {
    /// The active mroot, at the end of the mroot chain.
    pub mroot: Rbyd,
    /// Length of the mroot chain.
    pub mdepth: u32,
    pub config: FsConfig,
    pub gstate: GState,
    /// Total weight of the mtree, zero without one.
    pub mtree_weight: u32,
    /// Largest rbyd weight seen across all mdirs.
    pub rbyd_weight: u32,
    /// Set when any metadata block failed validation, an mroot cycle
    /// was found, or dirs and bookmarks disagree.
    pub corrupted: bool,
    pub block_size: u32,
}

impl MetaTree {
    /// Mount a filesystem's metadata: walk the mroot chain, then every
    /// mdir, collecting config, gstate, and consistency checks.
    ///
    /// Corruption never fails the mount; it degrades it. Only I/O
    /// errors surface as `Err`.
    pub fn mount<B: Bd + ?Sized>(bd: &B, block_size: u32, mroots: &[u32]) -> Result<Self> {
        let mleaf_weight = (block_size / 8).max(1).next_power_of_two();

        let mut corrupted = false;
        let mut mtree_weight = 0u32;
        let mut rbyd_weight = 0u32;
        let mut gstate = GState::new(mleaf_weight);
        let mut config = FsConfig::default();
        // The root directory's did is implicit.
        let mut dir_dids = vec![DidRecord {
            did: 0,
            mbid: -1,
            mweight: 0,
            rid: -1,
        }];
        let mut bookmark_dids: Vec<DidRecord> = Vec::new();

        let collect_dids = |mbid: i64,
                            mweight: u32,
                            mdir: &Rbyd,
                            dir_dids: &mut Vec<DidRecord>,
                            bookmark_dids: &mut Vec<DidRecord>| {
            for entry in mdir {
                if entry.tag.bits() == TAG_DID {
                    let (did, _) = decode_name(entry.data);
                    dir_dids.push(DidRecord {
                        did,
                        mbid,
                        mweight,
                        rid: entry.rid,
                    });
                } else if entry.tag.bits() == TAG_BOOKMARK {
                    let (did, _) = decode_name(entry.data);
                    bookmark_dids.push(DidRecord {
                        did,
                        mbid,
                        mweight,
                        rid: entry.rid,
                    });
                }
            }
        };

        // Walk the mroot chain to the active mroot.
        let mut mroot = Rbyd::fetch(bd, block_size, mroots, None, None)?;
        let mut mdepth = 1u32;
        let mut mseen: BTreeSet<Vec<u32>> = BTreeSet::new();
        loop {
            if !mroot.is_valid() {
                corrupted = true;
                break;
            }
            if !mseen.insert(mroot.blocks.clone()) {
                tracing::warn!(mroot = %mroot, "mroot chain cycle");
                corrupted = true;
                break;
            }

            rbyd_weight = rbyd_weight.max(mroot.weight);
            // Every mroot in the chain contributes gstate; only the
            // active one contributes config.
            gstate.xor(-1, 0, &mroot);
            config = FsConfig::from_mroot(&mroot);

            collect_dids(-1, 0, &mroot, &mut dir_dids, &mut bookmark_dids);

            let next = mroot
                .lookup(-1, TAG_MROOT)
                .filter(|e| e.rid == -1 && e.tag.bits() == TAG_MROOT)
                .map(|e| decode_mdir(e.data));
            match next {
                Some(blocks) => {
                    mroot = Rbyd::fetch_as(bd, block_size, &blocks, None, None, mroot.format)?;
                    mdepth += 1;
                }
                None => break,
            }
        }

        // A sole mdir hangs directly off the active mroot.
        let mdir_blocks = mroot
            .lookup(-1, TAG_MDIR)
            .filter(|e| e.rid == -1 && e.tag.bits() == TAG_MDIR)
            .map(|e| decode_mdir(e.data));
        if let Some(blocks) = mdir_blocks {
            let mdir = Rbyd::fetch_as(bd, block_size, &blocks, None, None, mroot.format)?;
            if !mdir.is_valid() {
                corrupted = true;
            } else {
                rbyd_weight = rbyd_weight.max(mdir.weight);
                gstate.xor(0, 0, &mdir);
                collect_dids(0, 0, &mdir, &mut dir_dids, &mut bookmark_dids);
            }
        }

        // The mtree proper: walk every leaf mdir.
        let mtree_ptr = mroot
            .lookup(-1, TAG_MTREE)
            .filter(|e| e.rid == -1 && e.tag.bits() == TAG_MTREE)
            .map(|e| decode_btree(e.data));
        if let Some(ptr) = mtree_ptr {
            let mtree = Rbyd::fetch_as(
                bd,
                block_size,
                &[ptr.branch.block],
                Some(ptr.branch.trunk),
                Some(ptr.branch.cksum),
                mroot.format,
            )?;
            mtree_weight = ptr.weight;

            let mut mbid: i64 = -1;
            loop {
                let found = mtree.btree_lookup(bd, block_size, mbid + 1, None)?;
                if found.done {
                    break;
                }
                mbid = found.bid;

                if !found.rbyd.is_valid() {
                    corrupted = true;
                    continue;
                }

                let Some(attr) = found.attrs.iter().find(|a| a.tag.bits() == TAG_MDIR) else {
                    continue;
                };
                let blocks = decode_mdir(&attr.data);
                let mdir = Rbyd::fetch_as(bd, block_size, &blocks, None, None, mroot.format)?;
                if !mdir.is_valid() {
                    tracing::warn!(mdir = %mdir, mbid, "mdir failed validation");
                    corrupted = true;
                    continue;
                }

                rbyd_weight = rbyd_weight.max(mdir.weight);
                gstate.xor(mbid, found.weight, &mdir);
                collect_dids(mbid, found.weight, &mdir, &mut dir_dids, &mut bookmark_dids);
            }
        }

        // Every directory needs its bookmark and vice versa, except
        // entries with a pending grm removal.
        let grm = gstate.grm();
        let grmed = |records: &[DidRecord]| -> BTreeSet<u32> {
            records
                .iter()
                .filter(|r| {
                    let mbase = (r.mbid - i64::from(r.mweight.saturating_sub(1))).max(0);
                    !grm.contains(&(mbase, r.rid))
                })
                .map(|r| r.did)
                .collect()
        };
        if grmed(&dir_dids) != grmed(&bookmark_dids) {
            corrupted = true;
        }

        Ok(Self {
            mroot,
            mdepth,
            config,
            gstate,
            mtree_weight,
            rbyd_weight,
            corrupted,
            block_size,
        })
    }
}
