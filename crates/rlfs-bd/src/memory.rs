use rlfs_error::Result;

use crate::traits::Bd;

/// An in-memory block device, mainly for tests and fixtures.
#[derive(Debug, Clone, Default)]
pub struct MemoryBd {
    data: Vec<u8>,
}

impl MemoryBd {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Assemble a device from per-block images. Blocks shorter than
    /// `block_size` are padded with zeros.
    pub fn from_blocks(block_size: u32, blocks: &[Vec<u8>]) -> Self {
        let block_size = block_size as usize;
        let mut data = Vec::with_capacity(block_size * blocks.len());
        for block in blocks {
            assert!(block.len() <= block_size, "block image too large");
            data.extend_from_slice(block);
            data.resize(data.len() + (block_size - block.len()), 0);
        }
        Self { data }
    }
}

impl Bd for MemoryBd {
    fn read_block(&self, block: u32, block_size: u32) -> Result<Vec<u8>> {
        let mut out = vec![0u8; block_size as usize];
        let off = u64::from(block) * u64::from(block_size);
        if let Ok(off) = usize::try_from(off) {
            if off < self.data.len() {
                let n = (self.data.len() - off).min(out.len());
                out[..n].copy_from_slice(&self.data[off..off + n]);
            }
        }
        Ok(out)
    }

    fn extent(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use rlfs_types::BdGeometry;

    use super::*;
    use crate::traits::resolve_geometry;

    #[test]
    fn from_blocks_pads_and_orders() {
        let bd = MemoryBd::from_blocks(16, &[vec![1, 2, 3], vec![4]]);
        assert_eq!(bd.extent().unwrap(), 32);

        let b0 = bd.read_block(0, 16).unwrap();
        assert_eq!(&b0[..3], &[1, 2, 3]);
        assert_eq!(&b0[3..], &[0u8; 13][..]);

        let b1 = bd.read_block(1, 16).unwrap();
        assert_eq!(b1[0], 4);
    }

    #[test]
    fn out_of_range_reads_are_zero() {
        let bd = MemoryBd::new(vec![0xff; 16]);
        assert_eq!(bd.read_block(5, 16).unwrap(), vec![0u8; 16]);
    }

    #[test]
    fn geometry_inference() {
        let bd = MemoryBd::new(vec![0; 512 * 4]);
        let geom = resolve_geometry(&bd, BdGeometry::new(512, 0)).unwrap();
        assert_eq!(geom.block_count, 4);

        // Explicit counts win over the extent.
        let geom = resolve_geometry(&bd, BdGeometry::new(512, 2)).unwrap();
        assert_eq!(geom.block_count, 2);

        // A ragged extent cannot be inferred from.
        let bd = MemoryBd::new(vec![0; 1000]);
        assert!(resolve_geometry(&bd, BdGeometry::new(512, 0)).is_err());
    }
}
