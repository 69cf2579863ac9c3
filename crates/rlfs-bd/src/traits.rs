use rlfs_error::{Result, RlfsError};
use rlfs_types::BdGeometry;

/// A read-only block device.
///
/// Implementations take `&self`: the engine never writes, and decode
/// paths may hold several blocks' contents at once.
pub trait Bd {
    /// Read one block's contents.
    ///
    /// Always returns exactly `block_size` bytes. A read past the end of
    /// the underlying storage, or a partial block at the tail, is
    /// zero-filled rather than failing: the decode layer treats zeroed
    /// bytes as padding and the commit checksums reject anything that
    /// was genuinely truncated.
    fn read_block(&self, block: u32, block_size: u32) -> Result<Vec<u8>>;

    /// Total byte extent of the underlying storage.
    fn extent(&self) -> Result<u64>;
}

impl<T: Bd + ?Sized> Bd for &T {
    fn read_block(&self, block: u32, block_size: u32) -> Result<Vec<u8>> {
        (**self).read_block(block, block_size)
    }

    fn extent(&self) -> Result<u64> {
        (**self).extent()
    }
}

/// Resolve a geometry against a device.
///
/// An explicit block count is taken at face value; a count of zero is
/// inferred from the device extent, which must then be a whole number of
/// blocks.
pub fn resolve_geometry<B: Bd + ?Sized>(bd: &B, geometry: BdGeometry) -> Result<BdGeometry> {
    if geometry.block_size == 0 {
        return Err(RlfsError::ZeroBlockSize);
    }
    if geometry.block_count != 0 {
        return Ok(geometry);
    }

    let extent = bd.extent()?;
    let block_size = u64::from(geometry.block_size);
    if extent % block_size != 0 {
        return Err(RlfsError::BadGeometry {
            block_size: geometry.block_size,
            extent,
        });
    }
    let block_count = u32::try_from(extent / block_size).map_err(|_| RlfsError::BadGeometry {
        block_size: geometry.block_size,
        extent,
    })?;

    Ok(BdGeometry::new(geometry.block_size, block_count))
}
