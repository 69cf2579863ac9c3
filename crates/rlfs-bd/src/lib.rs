//! Block-device access for the rlfs decode engine.
//!
//! The [`Bd`] trait is the only seam between the decode layer and
//! storage: everything above it works on whole-block byte buffers.
//! [`FileBd`] reads disk images; [`MemoryBd`] backs tests and fixtures.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileBd;
pub use memory::MemoryBd;
pub use traits::{resolve_geometry, Bd};
