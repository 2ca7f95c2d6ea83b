//! Prototype labels, free parameters, placement equations and atomic orbits.

use std::error::Error;
use std::fmt;

use itertools::Itertools;

use crate::auxiliary::structure::StructureError;
use crate::interfaces::ExternalToolError;
use crate::prototype::label::MalformedLabelError;
use crate::symmetry::symmetry_reference::SymmetryReferenceError;

pub mod equations;
pub mod expression;
pub mod generation;
pub mod label;
pub mod orbits;
pub mod parameters;

// ================
// Error definition
// ================

/// Errors raised while resolving a structure against a prototype.
///
/// Variants fall into four kinds: malformed input, failures of an external capability, consistency
/// violations between a structure and a label, and failure to find any consistent assignment of
/// orbits to equation sets.
#[derive(Debug, Clone)]
pub enum ResolutionError {
    MalformedLabel(MalformedLabelError),

    MalformedParameters(String),

    ParameterCountMismatch {
        expected: usize,
        found: usize,
    },

    SymmetryDetectionFailure(String),

    External(ExternalToolError),

    Structure(StructureError),

    AtomCountMismatch {
        label: String,
        expected: u32,
        found: usize,
    },

    SpaceGroupMismatch {
        label: String,
        expected: u32,
        detected: u32,
    },

    SpeciesCountMismatch {
        label: String,
        expected: usize,
        found: usize,
    },

    WyckoffInconsistency {
        label: String,
        position: usize,
        label_letter: char,
        detected_letter: char,
    },

    OrbitCountMismatch {
        label: String,
        expected: usize,
        found: usize,
    },

    InconsistentEquationCount {
        label: String,
        reason: String,
    },

    NonAffineEquation {
        label: String,
        expression: String,
    },

    SymmetryReference(SymmetryReferenceError),

    LabelMismatch {
        nominal: String,
        detected: String,
    },

    HigherSymmetryDetected {
        label: String,
        parameter_values: Vec<f64>,
    },

    AlignmentFailure {
        nominal: String,
        detected: String,
    },

    ParameterResolutionFailure {
        label: String,
        unmatched_equation_sets: Vec<usize>,
        unmatched_orbits: Vec<usize>,
    },
}

impl ResolutionError {
    /// Whether the error originates in an external capability, so that retrying (e.g. with other
    /// tolerances) may succeed.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::SymmetryDetectionFailure(_) | Self::External(_) | Self::AlignmentFailure { .. }
        )
    }

    /// Whether the error is a disagreement between a structure and a label.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            Self::AtomCountMismatch { .. }
                | Self::SpaceGroupMismatch { .. }
                | Self::SpeciesCountMismatch { .. }
                | Self::WyckoffInconsistency { .. }
                | Self::OrbitCountMismatch { .. }
        )
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLabel(err) => write!(f, "{err}"),
            Self::MalformedParameters(msg) => write!(f, "Malformed parameters: {msg}."),
            Self::ParameterCountMismatch { expected, found } => write!(
                f,
                "Parameter count mismatch: {expected} expected, {found} found."
            ),
            Self::SymmetryDetectionFailure(msg) => {
                write!(f, "Symmetry detection failed: {msg}.")
            }
            Self::External(err) => write!(f, "{err}"),
            Self::Structure(err) => write!(f, "{err}"),
            Self::AtomCountMismatch {
                label,
                expected,
                found,
            } => write!(
                f,
                "Atom count mismatch for `{label}`: {expected} expected, {found} found."
            ),
            Self::SpaceGroupMismatch {
                label,
                expected,
                detected,
            } => write!(
                f,
                "Space group mismatch for `{label}`: {expected} expected, {detected} detected."
            ),
            Self::SpeciesCountMismatch {
                label,
                expected,
                found,
            } => write!(
                f,
                "Species count mismatch for `{label}`: {expected} expected, {found} found."
            ),
            Self::WyckoffInconsistency {
                label,
                position,
                label_letter,
                detected_letter,
            } => write!(
                f,
                "Wyckoff inconsistency for `{label}` at orbit {position}: label has {label_letter}, \
                 detected {detected_letter}, which are not in the same Wyckoff set."
            ),
            Self::OrbitCountMismatch {
                label,
                expected,
                found,
            } => write!(
                f,
                "Orbit count mismatch for `{label}`: {expected} expected, {found} found."
            ),
            Self::InconsistentEquationCount { label, reason } => {
                write!(f, "Inconsistent equations for `{label}`: {reason}.")
            }
            Self::NonAffineEquation { label, expression } => write!(
                f,
                "Equation `{expression}` for `{label}` is not affine in its parameters."
            ),
            Self::SymmetryReference(err) => write!(f, "{err}"),
            Self::LabelMismatch { nominal, detected } => write!(
                f,
                "Detected prototype `{detected}` is not equivalent to `{nominal}`."
            ),
            Self::HigherSymmetryDetected {
                label,
                parameter_values,
            } => write!(
                f,
                "Parameters imply a higher symmetry; the structure is `{label}` with parameters [{}].",
                parameter_values.iter().map(|v| format!("{v:.8}")).join(", ")
            ),
            Self::AlignmentFailure { nominal, detected } => write!(
                f,
                "Unable to align the structure with a rebuilt `{detected}` (nominal `{nominal}`)."
            ),
            Self::ParameterResolutionFailure {
                label,
                unmatched_equation_sets,
                unmatched_orbits,
            } => write!(
                f,
                "Unable to resolve parameters for `{label}`: unmatched equation sets [{}], \
                 unmatched orbits [{}].",
                unmatched_equation_sets.iter().join(", "),
                unmatched_orbits.iter().join(", ")
            ),
        }
    }
}

impl Error for ResolutionError {}

impl From<MalformedLabelError> for ResolutionError {
    fn from(err: MalformedLabelError) -> Self {
        Self::MalformedLabel(err)
    }
}

impl From<SymmetryReferenceError> for ResolutionError {
    fn from(err: SymmetryReferenceError) -> Self {
        Self::SymmetryReference(err)
    }
}

impl From<ExternalToolError> for ResolutionError {
    fn from(err: ExternalToolError) -> Self {
        Self::External(err)
    }
}

impl From<StructureError> for ResolutionError {
    fn from(err: StructureError) -> Self {
        Self::Structure(err)
    }
}
