use thiserror::Error;

/// Primary error type for rlfs operations.
///
/// Only I/O failures and caller usage errors surface as `Err`. Corruption
/// found on disk is never an error: a bad commit resolves to the previous
/// one, a bad block resolves to a degraded (`trunk == 0`) instance, and
/// traversals report a corruption flag while continuing past the damage.
#[derive(Error, Debug)]
pub enum RlfsError {
    // === I/O Errors ===
    /// File I/O error from the backing device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block index lies outside the device.
    #[error("block {block:#x} out of range: device holds {block_count} blocks")]
    BlockOutOfRange { block: u32, block_count: u32 },

    // === Usage Errors ===
    /// A fetch was requested with no block addresses at all.
    #[error("no blocks given to fetch")]
    NoBlocks,

    /// The device extent and the requested geometry disagree.
    #[error("bad geometry: block size {block_size} for extent {extent}")]
    BadGeometry { block_size: u32, extent: u64 },

    /// Block size of zero (or otherwise unusable).
    #[error("block size cannot be zero")]
    ZeroBlockSize,
}

/// Convenience alias used throughout the rlfs crates.
pub type Result<T> = std::result::Result<T, RlfsError>;
