//! Crystallographic reference data and space-group operations.

pub mod symmetry_operation;
pub mod symmetry_reference;
