//! Mounting metadata trees: mroot chains, config, gstate, directories.

use rlfs_bd::{Bd, MemoryBd};
use rlfs_core::MetaTree;
use rlfs_harness::{encode_btree, encode_grm, encode_mdir, encode_name, RbydBuilder};
use rlfs_types::tag::{
    TAG_BOOKMARK, TAG_DID, TAG_DIR, TAG_GEOMETRY, TAG_GRMDELTA, TAG_MAGIC, TAG_MDIR, TAG_MROOT,
    TAG_MTREE, TAG_NAME, TAG_REG, TAG_VERSION,
};

const BLOCK_SIZE: u32 = 512;

fn leb(value: u32) -> Vec<u8> {
    let mut buf = [0u8; 5];
    let len = rlfs_types::write_leb128(&mut buf, value);
    buf[..len].to_vec()
}

/// Standard config prologue: magic, version, geometry.
fn push_config(b: &mut RbydBuilder, block_count: u32) {
    b.push(TAG_MAGIC, 0, b"littlefs");
    b.push(TAG_VERSION, 0, &[leb(3), leb(0)].concat());
    b.push(
        TAG_GEOMETRY,
        0,
        &[leb(BLOCK_SIZE - 1), leb(block_count - 1)].concat(),
    );
}

/// A self-contained mroot: config plus inlined directory records.
fn inline_mroot(rev: u32) -> Vec<u8> {
    let mut b = RbydBuilder::new(rev);
    push_config(&mut b, 4);
    // Root bookmark, one directory, and its bookmark.
    b.push(TAG_BOOKMARK, 1, &encode_name(0, b""));
    b.push(TAG_DIR, 1, &encode_name(0, b"subdir"));
    b.push(TAG_DID, 0, &leb(2));
    b.push(TAG_BOOKMARK, 1, &encode_name(2, b""));
    b.commit(false);
    b.build(BLOCK_SIZE)
}

#[test]
fn mounts_an_inline_mroot() {
    let blank = vec![0u8; BLOCK_SIZE as usize];
    let bd = MemoryBd::from_blocks(BLOCK_SIZE, &[inline_mroot(2), blank]);

    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();
    assert!(!fs.corrupted);
    assert_eq!(fs.mdepth, 1);
    assert_eq!(fs.config.magic.as_deref(), Some(&b"littlefs"[..]));
    assert_eq!(fs.config.version, Some((3, 0)));
    assert_eq!(fs.config.geometry, Some((BLOCK_SIZE, 4)));
    assert_eq!(fs.mtree_weight, 0);
    assert_eq!(fs.rbyd_weight, 3);
}

#[test]
fn reads_an_inline_directory() {
    let blank = vec![0u8; BLOCK_SIZE as usize];
    let bd = MemoryBd::from_blocks(BLOCK_SIZE, &[inline_mroot(2), blank]);
    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();

    // The root directory: its bookmark, then its entries.
    let entries: Vec<_> = fs
        .mroot
        .read_dir(&bd, BLOCK_SIZE, 0)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].tag.bits(), TAG_BOOKMARK);
    assert_eq!(entries[0].name, b"");
    assert_eq!(entries[1].tag.bits(), TAG_DIR);
    assert_eq!(entries[1].name, b"subdir");

    // The subdirectory is empty apart from its bookmark.
    let entries: Vec<_> = fs
        .mroot
        .read_dir(&bd, BLOCK_SIZE, 2)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tag.bits(), TAG_BOOKMARK);

    // A directory id nothing anchors yields nothing.
    let entries: Vec<_> = fs
        .mroot
        .read_dir(&bd, BLOCK_SIZE, 9)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(entries.is_empty());
}

#[test]
fn follows_an_mroot_chain() {
    // Blocks 0-1: stale mroot pointing at blocks 2-3.
    let mut outer = RbydBuilder::new(9);
    push_config(&mut outer, 8);
    outer.push(TAG_MROOT, 0, &encode_mdir(&[2, 3]));
    outer.commit(false);

    let blank = vec![0u8; BLOCK_SIZE as usize];
    let bd = MemoryBd::from_blocks(
        BLOCK_SIZE,
        &[
            outer.build(BLOCK_SIZE),
            blank.clone(),
            inline_mroot(1),
            blank,
        ],
    );

    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();
    assert!(!fs.corrupted);
    assert_eq!(fs.mdepth, 2);
    assert_eq!(fs.mroot.block(), 2);
    // Config comes from the active mroot, not the stale one.
    assert_eq!(fs.config.geometry, Some((BLOCK_SIZE, 4)));
}

#[test]
fn mroot_cycle_is_corruption() {
    let mut b = RbydBuilder::new(1);
    push_config(&mut b, 4);
    // Points back at itself.
    b.push(TAG_MROOT, 0, &encode_mdir(&[0, 1]));
    b.commit(false);

    let blank = vec![0u8; BLOCK_SIZE as usize];
    let bd = MemoryBd::from_blocks(BLOCK_SIZE, &[b.build(BLOCK_SIZE), blank]);

    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();
    assert!(fs.corrupted);
}

#[test]
fn missing_bookmark_is_corruption() {
    let mut b = RbydBuilder::new(1);
    push_config(&mut b, 4);
    b.push(TAG_BOOKMARK, 1, &encode_name(0, b""));
    b.push(TAG_DIR, 1, &encode_name(0, b"subdir"));
    // A did record with no matching bookmark anywhere.
    b.push(TAG_DID, 0, &leb(2));
    b.commit(false);

    let blank = vec![0u8; BLOCK_SIZE as usize];
    let bd = MemoryBd::from_blocks(BLOCK_SIZE, &[b.build(BLOCK_SIZE), blank]);

    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();
    assert!(fs.corrupted);
}

#[test]
fn grm_pending_removal_excuses_a_mismatch() {
    // Same layout as above, but a grm marks the orphaned did record's
    // position (rid 1, alongside its directory entry) as pending
    // removal.
    let mut b = RbydBuilder::new(1);
    push_config(&mut b, 4);
    b.push(TAG_GRMDELTA, 0, &encode_grm(&[1]));
    b.push(TAG_BOOKMARK, 1, &encode_name(0, b""));
    b.push(TAG_DIR, 1, &encode_name(0, b"subdir"));
    b.push(TAG_DID, 0, &leb(2));
    b.commit(false);

    let blank = vec![0u8; BLOCK_SIZE as usize];
    let bd = MemoryBd::from_blocks(BLOCK_SIZE, &[b.build(BLOCK_SIZE), blank]);

    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();
    assert_eq!(fs.gstate.grm(), vec![(0, 1)]);
    assert!(!fs.corrupted);
}

#[test]
fn gstate_accumulates_by_xor() {
    // A stale mroot and the active one carry identical grm deltas,
    // which must cancel to nothing.
    let delta = encode_grm(&[1]);
    let mut outer = RbydBuilder::new(9);
    outer.push(TAG_GRMDELTA, 0, &delta);
    outer.push(TAG_MROOT, 0, &encode_mdir(&[2, 3]));
    outer.commit(false);

    let mut inner = RbydBuilder::new(1);
    push_config(&mut inner, 4);
    inner.push(TAG_GRMDELTA, 0, &delta);
    inner.push(TAG_BOOKMARK, 1, &encode_name(0, b""));
    inner.commit(false);

    let blank = vec![0u8; BLOCK_SIZE as usize];
    let bd = MemoryBd::from_blocks(
        BLOCK_SIZE,
        &[
            outer.build(BLOCK_SIZE),
            blank.clone(),
            inner.build(BLOCK_SIZE),
            blank,
        ],
    );

    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();
    assert!(!fs.corrupted);
    assert!(fs.gstate.grm().is_empty());
    let accumulated = &fs.gstate.gstate[&TAG_GRMDELTA];
    assert!(accumulated.iter().all(|&b| b == 0));
    // Both sources are remembered for diagnostics.
    assert_eq!(fs.gstate.gdelta[&TAG_GRMDELTA].len(), 2);
}

/// Builds a filesystem whose mtree splits one directory across two
/// mdirs: mroot on 0-1, mtree root on 2, mdirs on 3 and 4.
fn split_dir_fs() -> MemoryBd {
    let mut mdir0 = RbydBuilder::new(1);
    mdir0.push(TAG_BOOKMARK, 1, &encode_name(0, b""));
    mdir0.push(TAG_REG, 1, &encode_name(0, b"a"));
    mdir0.commit(false);

    let mut mdir1 = RbydBuilder::new(1);
    mdir1.push(TAG_REG, 1, &encode_name(0, b"b"));
    mdir1.commit(false);

    let mut mtree = RbydBuilder::new(2);
    mtree.push(TAG_NAME, 1, b"");
    mtree.push(TAG_MDIR, 0, &encode_mdir(&[3]));
    mtree.push(TAG_REG, 1, &encode_name(0, b"b"));
    mtree.push(TAG_MDIR, 0, &encode_mdir(&[4]));
    mtree.commit(false);

    let mut mroot = RbydBuilder::new(3);
    push_config(&mut mroot, 8);
    mroot.push(
        TAG_MTREE,
        0,
        &encode_btree(2, 2, mtree.trunk(), mtree.cksum()),
    );
    mroot.commit(false);

    let blank = vec![0u8; BLOCK_SIZE as usize];
    MemoryBd::from_blocks(
        BLOCK_SIZE,
        &[
            mroot.build(BLOCK_SIZE),
            blank,
            mtree.build(BLOCK_SIZE),
            mdir0.build(BLOCK_SIZE),
            mdir1.build(BLOCK_SIZE),
        ],
    )
}

#[test]
fn mounts_through_an_mtree() {
    let bd = split_dir_fs();
    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();
    assert!(!fs.corrupted);
    assert_eq!(fs.mtree_weight, 2);
    assert_eq!(fs.rbyd_weight, 2);
}

#[test]
fn mtree_lookup_finds_each_mdir() {
    let bd = split_dir_fs();
    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();

    let first = fs
        .mroot
        .mtree_lookup(&bd, BLOCK_SIZE, 0)
        .unwrap()
        .unwrap();
    assert_eq!(first.mbid, 0);
    assert_eq!(first.mdir.block(), 3);

    let second = fs
        .mroot
        .mtree_lookup(&bd, BLOCK_SIZE, 1)
        .unwrap()
        .unwrap();
    assert_eq!(second.mbid, 1);
    assert_eq!(second.mdir.block(), 4);

    assert!(fs.mroot.mtree_lookup(&bd, BLOCK_SIZE, 2).unwrap().is_none());
}

#[test]
fn directory_iteration_crosses_mdir_boundaries() {
    let bd = split_dir_fs();
    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();

    let entries: Vec<_> = fs
        .mroot
        .read_dir(&bd, BLOCK_SIZE, 0)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec![b"".to_vec(), b"a".to_vec(), b"b".to_vec()]);
    // The third entry lives in the second mdir.
    assert_eq!(entries[2].mbid, 1);
    assert_eq!(entries[2].mdir.block(), 4);
}

#[test]
fn sole_mdir_directory_does_not_repeat() {
    // A directory that exactly fills the one mdir hanging off the
    // mroot. The mdir answers every mbid, so iteration has to notice
    // it wrapped rather than yield the same records again.
    let mut mdir = RbydBuilder::new(1);
    mdir.push(TAG_BOOKMARK, 1, &encode_name(0, b""));
    mdir.push(TAG_REG, 1, &encode_name(0, b"a"));
    mdir.commit(false);

    let mut mroot = RbydBuilder::new(2);
    push_config(&mut mroot, 4);
    mroot.push(TAG_MDIR, 0, &encode_mdir(&[2]));
    mroot.commit(false);

    let blank = vec![0u8; BLOCK_SIZE as usize];
    let bd = MemoryBd::from_blocks(
        BLOCK_SIZE,
        &[mroot.build(BLOCK_SIZE), blank, mdir.build(BLOCK_SIZE)],
    );

    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();
    assert!(!fs.corrupted);

    let entries: Vec<_> = fs
        .mroot
        .read_dir(&bd, BLOCK_SIZE, 0)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].tag.bits(), TAG_BOOKMARK);
    assert_eq!(entries[1].name, b"a");
}

#[test]
fn mtree_name_lookup_routes_to_the_owning_mdir() {
    let bd = split_dir_fs();
    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();

    let m = fs
        .mroot
        .mtree_name_lookup(&bd, BLOCK_SIZE, 0, b"b")
        .unwrap()
        .unwrap();
    assert!(m.found);
    assert_eq!(m.mdir.block(), 4);
    assert_eq!(m.rid, 0);
    assert_eq!(m.tag.bits(), TAG_REG);

    let m = fs
        .mroot
        .mtree_name_lookup(&bd, BLOCK_SIZE, 0, b"a")
        .unwrap()
        .unwrap();
    assert!(m.found);
    assert_eq!(m.mdir.block(), 3);
    assert_eq!(m.rid, 1);
}

#[test]
fn degraded_mdir_corrupts_the_mount_but_not_the_rest() {
    let bd = split_dir_fs();
    let mut broken = bd.read_block(4, BLOCK_SIZE).unwrap();
    broken[10] ^= 0xff;
    let bd = MemoryBd::from_blocks(
        BLOCK_SIZE,
        &[
            bd.read_block(0, BLOCK_SIZE).unwrap(),
            bd.read_block(1, BLOCK_SIZE).unwrap(),
            bd.read_block(2, BLOCK_SIZE).unwrap(),
            bd.read_block(3, BLOCK_SIZE).unwrap(),
            broken,
        ],
    );

    let fs = MetaTree::mount(&bd, BLOCK_SIZE, &[0, 1]).unwrap();
    assert!(fs.corrupted);
    // The intact mdir still resolves.
    let first = fs
        .mroot
        .mtree_lookup(&bd, BLOCK_SIZE, 0)
        .unwrap()
        .unwrap();
    assert_eq!(first.mdir.block(), 3);
    assert!(first.mdir.is_valid());
}
