//! Auxiliary structures and geometry for crystal structures.

pub mod lattice;
pub mod misc;
pub mod structure;
