//! # protomatch: crystal-prototype matching for AFLOW prototype labels
//!
//! `protomatch` decides whether a periodic structure is an instance of a crystal prototype given by
//! an AFLOW prototype label, and if so recovers the free-parameter vector (cell parameters and
//! internal Wyckoff coordinates) that regenerates the structure from the label. It can also
//! confirm that regenerating the structure reproduces it in the labelled orientation.
//!
//! The engine consists of:
//! - a label parser and Wyckoff run-length codec ([`prototype::label`]),
//! - an orbit extractor grouping atoms into symmetry orbits and cross-checking them against a label
//!   ([`prototype::orbits`]),
//! - an equation builder turning symbolic placement equations into affine maps
//!   ([`prototype::equations`]),
//! - an alignment resolver and a parameter solver searching the internal origin shifts of a space
//!   group for a consistent matching of orbits to equations ([`drivers::alignment`],
//!   [`drivers::parameter_solver`]), and
//! - an orientation confirmer ([`drivers::orientation`]).
//!
//! Symmetry detection, prototype designation, structure building, equation generation and
//! structure comparison are consumed through the capability traits in [`interfaces`]. The
//! [`interfaces::aflow`] module implements them with the AFLOW executable and
//! [`interfaces::moyo`] implements symmetry detection natively.
//!
//! ## Examples and usage
//!
//! For most items, their usages are illustrated in test functions. The `protomatch` binary runs
//! batches of resolutions described in a YAML input file, see [`interfaces::input::Input`].
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod auxiliary;
pub mod drivers;
pub mod interfaces;
pub mod io;
pub mod prototype;
pub mod symmetry;

#[cfg(test)]
mod testing;

use crate::auxiliary::structure::Structure;
use crate::drivers::orientation::{confirm_orientation, OrientationConfirmationParams};
use crate::drivers::parameter_solver::{resolve_free_parameters, PrototypeResolutionParams};
use crate::interfaces::ExternalCapabilities;
use crate::prototype::equations::NoEquationCache;
use crate::prototype::parameters::FreeParameterVector;
use crate::prototype::ResolutionError;

pub use crate::prototype::label::parse_label;

/// Resolves the free-parameter vector of a structure against a nominal prototype label, with
/// default control parameters and no equation caching.
///
/// # Arguments
///
/// * `structure` - The candidate structure, in a primitive or conventional cell.
/// * `nominal_label` - The prototype label.
/// * `capabilities` - External capabilities.
pub fn resolve(
    structure: &Structure,
    nominal_label: &str,
    capabilities: ExternalCapabilities<'_>,
) -> Result<FreeParameterVector, ResolutionError> {
    resolve_free_parameters(
        structure,
        nominal_label,
        capabilities,
        &NoEquationCache,
        &PrototypeResolutionParams::default(),
    )
    .map(|result| result.free_parameters)
}

/// Checks, with default tolerances, whether rebuilding a designation reproduces a reference
/// structure in the labelled orientation.
///
/// # Arguments
///
/// * `reference_structure` - The structure whose orientation is to be reproduced.
/// * `species` - Real species in virtual-species order.
/// * `label` - The prototype label.
/// * `parameter_values` - The full free-parameter vector.
/// * `capabilities` - External capabilities.
pub fn verify_orientation(
    reference_structure: &Structure,
    species: &[String],
    label: &str,
    parameter_values: &[f64],
    capabilities: ExternalCapabilities<'_>,
) -> Result<bool, ResolutionError> {
    confirm_orientation(
        reference_structure,
        species,
        label,
        parameter_values,
        capabilities,
        &OrientationConfirmationParams::default(),
    )
}
