//! Builds valid rbyd block images for tests.
//!
//! Records are laid out as a backward chain: each record appends one
//! less-or-equal alt spanning everything before it, then its leaf. The
//! resulting tree is maximally unbalanced but satisfies every lookup
//! invariant, which is all the decode paths care about.
//!
//! Records must be pushed in `(rid, tag)` order. Commits may be
//! interleaved freely; later records chain onto earlier commits the
//! way real appends do.

use rlfs_core::cksum::{crc32c, parity, PERTURB};
use rlfs_types::leb128::{leb128_len, write_le32, write_leb128};
use rlfs_types::tag::{TAG_ALT, TAG_CKSUM, TAG_GCKSUMDELTA, TAG_NOTE, TAG_P};

/// Incrementally builds one rbyd block image.
pub struct RbydBuilder {
    data: Vec<u8>,
    /// Rolling checksum, perturb folded in, exactly as a scan would
    /// hold it at the current offset.
    crc: u32,
    /// Canonical checksum: content tags only, perturb folded out.
    /// Commit-family tags (notes, the cksum tag itself) contribute to
    /// `crc` within their commit but never to this.
    canonical: u32,
    perturb: bool,
    /// Offset of the run holding the previous record, jump target for
    /// the next record's alt.
    prev_run: Option<u32>,
    /// Key of the previous record, partition point for the next alt.
    prev_key: u16,
    /// Total weight pushed so far.
    weight: u32,
    /// Offset of the latest run; becomes the trunk once committed.
    trunk: u32,
    /// Canonical checksum of the last commit.
    committed_cksum: u32,
}

impl RbydBuilder {
    pub fn new(rev: u32) -> Self {
        let data = rev.to_le_bytes().to_vec();
        let crc = crc32c(0, &data);
        Self {
            data,
            crc,
            canonical: crc,
            perturb: false,
            prev_run: None,
            prev_key: 0,
            weight: 0,
            trunk: 0,
            committed_cksum: 0,
        }
    }

    /// Current append offset.
    pub fn off(&self) -> u32 {
        self.data.len() as u32
    }

    /// Offset of the latest record run. This is what a commit promotes
    /// to the block's trunk.
    pub fn trunk(&self) -> u32 {
        self.trunk
    }

    /// Total weight of records pushed so far.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Canonical checksum as of the last [`Self::commit`].
    pub fn cksum(&self) -> u32 {
        self.committed_cksum
    }

    fn write_tag(&mut self, word: u16, weight: u32, size: u32) {
        let v = parity(self.crc);
        let word = word | if v { 0x8000 } else { 0 };

        let mut header = [0u8; 12];
        header[0] = (word >> 8) as u8;
        header[1] = (word & 0xff) as u8;
        let mut len = 2;
        len += write_leb128(&mut header[len..], weight);
        len += write_leb128(&mut header[len..], size);

        self.crc ^= if v { 0x0000_0080 } else { 0 };
        self.crc = crc32c(self.crc, &header[..len]);
        self.data.extend_from_slice(&header[..len]);
    }

    /// Append one record: its chaining alt (for all but the first
    /// record) and its leaf tag plus payload.
    pub fn push(&mut self, tag: u16, weight: u32, payload: &[u8]) {
        assert_eq!(tag & TAG_ALT, 0, "records must be leaf tags");

        let run = self.off();
        if let Some(prev_run) = self.prev_run {
            // One alt covering every record before this one.
            let alt = TAG_ALT | (self.prev_key & 0xfff);
            let jump = run - prev_run;
            self.write_tag(alt, self.weight, jump);
        }

        self.write_tag(tag, weight, payload.len() as u32);
        self.crc = crc32c(self.crc, payload);
        self.data.extend_from_slice(payload);
        self.canonical = self.crc ^ if self.perturb { PERTURB } else { 0 };

        self.prev_run = Some(run);
        self.prev_key = tag & 0xfff;
        self.weight += weight;
        self.trunk = run;
    }

    /// Start a fresh tree within the same log. Records pushed next
    /// chain among themselves only, the way a shrub's records sit
    /// apart from the main tree.
    pub fn start_tree(&mut self) {
        self.prev_run = None;
        self.prev_key = 0;
        self.weight = 0;
    }

    /// Append a note tag: checksummed padding with no tree effect.
    pub fn push_note(&mut self, payload: &[u8]) {
        self.write_tag(TAG_NOTE, 0, payload.len() as u32);
        self.crc = crc32c(self.crc, payload);
        self.data.extend_from_slice(payload);
    }

    /// Append a gcksum-delta tag. Like a note it rides in the commit
    /// family, outside the canonical checksum.
    pub fn push_gcksum_delta(&mut self, payload: &[u8]) {
        self.write_tag(TAG_GCKSUMDELTA, 0, payload.len() as u32);
        self.crc = crc32c(self.crc, payload);
        self.data.extend_from_slice(payload);
    }

    /// Commit everything pushed so far.
    ///
    /// The checksum tag's payload holds the rolling checksum including
    /// its own header; the canonical checksum excludes both the header
    /// and any perturb constant in effect.
    pub fn commit(&mut self, perturb: bool) {
        let word = TAG_CKSUM | if perturb { TAG_P } else { 0 };
        self.write_tag(word, 0, 4);
        let mut payload = [0u8; 4];
        write_le32(&mut payload, self.crc);
        self.data.extend_from_slice(&payload);

        self.committed_cksum = self.canonical;
        self.perturb = perturb;
        self.crc = self.canonical ^ if perturb { PERTURB } else { 0 };
    }

    /// Byte length a record pushed now would occupy, alt included.
    pub fn record_len(&self, tag: u16, weight: u32, payload_len: u32) -> u32 {
        let mut len = 0;
        if let Some(prev_run) = self.prev_run {
            // The alt's jump varint depends on the current offset.
            let jump = self.off() - prev_run;
            len += 2 + leb128_len(self.weight) + leb128_len(jump);
        }
        let _ = tag;
        len as u32 + 2 + leb128_len(weight) as u32 + leb128_len(payload_len) as u32 + payload_len
    }

    /// Finish the image, padded with zeros to `block_size`.
    pub fn build(&self, block_size: u32) -> Vec<u8> {
        let mut data = self.data.clone();
        assert!(
            data.len() <= block_size as usize,
            "image exceeds block size"
        );
        data.resize(block_size as usize, 0);
        data
    }
}
