//! Fixture tooling for exercising the rlfs decode engine.
//!
//! [`RbydBuilder`] writes valid rbyd block images record by record;
//! [`encode`] mirrors the payload decoders; [`corrupt`] damages images
//! on purpose. Only tests depend on this crate.

pub mod builder;
pub mod corrupt;
pub mod encode;

pub use builder::RbydBuilder;
pub use encode::{encode_branch, encode_btree, encode_grm, encode_mdir, encode_name, encode_shrub};
