//! Interfaces between the prototype engine and other software.
//!
//! The engine never talks to a crystallography program directly. It goes through the capability
//! traits defined here, each exchanging explicit request and response structures. [`aflow`] and
//! [`moyo`] provide concrete implementations.

use std::error::Error;
use std::fmt;

use anyhow;
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::auxiliary::structure::Structure;
use crate::symmetry::symmetry_reference::SymmetryReference;

pub mod aflow;
pub mod cli;
pub mod input;
pub mod moyo;

#[cfg(test)]
#[path = "interfaces_tests.rs"]
mod interfaces_tests;

/// Number of header lines preceding the equation lines in an equations-only POSCAR.
const EQUATION_POSCAR_HEADER_LINES: usize = 7;

// ================
// Error definition
// ================

/// Error raised at the boundary of an external capability.
#[derive(Debug, Clone)]
pub enum ExternalToolError {
    /// The tool could not be started or communicated with.
    Invocation(String),

    /// The tool ran but exited unsuccessfully.
    NonZeroExit {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The tool's output could not be interpreted.
    MalformedResponse(String),
}

impl fmt::Display for ExternalToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invocation(msg) => write!(f, "External tool invocation error: {msg}."),
            Self::NonZeroExit {
                command,
                status,
                stderr,
            } => write!(
                f,
                "External tool `{command}` exited with status {}: {}",
                status.map_or("?".to_string(), |s| s.to_string()),
                stderr.trim()
            ),
            Self::MalformedResponse(msg) => write!(f, "Malformed external tool response: {msg}."),
        }
    }
}

impl Error for ExternalToolError {}

// ==================
// Struct definitions
// ==================

/// Response of a symmetry-detection capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymmetryDataset {
    pub space_group_number: u32,

    /// Orbit id of every atom; atoms with the same id are symmetry-equivalent.
    pub orbits: Vec<usize>,

    /// Wyckoff letter of every atom.
    pub wyckoff_letters: Vec<char>,
}

impl SymmetryDataset {
    /// Checks that the dataset describes exactly `n_atoms` atoms.
    pub fn validate(&self, n_atoms: usize) -> Result<(), ExternalToolError> {
        if self.orbits.len() != n_atoms || self.wyckoff_letters.len() != n_atoms {
            return Err(ExternalToolError::MalformedResponse(format!(
                "symmetry dataset has {} orbit ids and {} Wyckoff letters for {n_atoms} atoms",
                self.orbits.len(),
                self.wyckoff_letters.len()
            )));
        }
        Ok(())
    }
}

/// The prototype designation of a structure as reported by a designation capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrototypeDesignation {
    pub label: String,
    pub parameter_names: Vec<String>,
    pub parameter_values: Vec<f64>,
}

/// Outcome of building a structure from a designation.
#[derive(Clone, Debug)]
pub enum BuildOutcome {
    Built(Structure),

    /// The parameters imply a higher symmetry than the label. The builder reports the label and
    /// parameters the structure really has.
    HigherSymmetryDetected {
        label: String,
        parameter_values: Vec<f64>,
    },
}

/// Rigid motion relating two matched structures.
///
/// With `reference` and `candidate` the arguments of [`StructureComparer::compare`], Cartesian
/// positions satisfy $`\mathbf{r}_{\mathrm{ref}} \approx \mathbf{R}\mathbf{r}_{\mathrm{cand}} +
/// \mathbf{t}`$ up to lattice translations of the reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidMotion {
    /// Integral matrix relating the candidate's lattice to the reference's.
    pub basis_transformation: Matrix3<f64>,

    /// Cartesian rotation $`\mathbf{R}`$ acting on column vectors.
    pub rotation: Matrix3<f64>,

    /// Cartesian origin shift $`\mathbf{t}`$.
    pub origin_shift: Vector3<f64>,
}

/// One line of symbolic placement equations: three coordinate expressions and a virtual species.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquationLine {
    pub expressions: [String; 3],
    pub species: String,
}

/// Response of an equation-generation capability: one line per atom of the primitive cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquationResponse {
    pub lines: Vec<EquationLine>,
}

impl EquationResponse {
    /// Parses an equations-only POSCAR, whose body lines read `<e1> <e2> <e3> <species>` after a
    /// seven-line header.
    pub fn from_equation_poscar(text: &str) -> Result<Self, ExternalToolError> {
        let lines = text
            .lines()
            .skip(EQUATION_POSCAR_HEADER_LINES)
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let fields = line.split_whitespace().collect_vec();
                if fields.len() != 4 {
                    return Err(ExternalToolError::MalformedResponse(format!(
                        "expected three coordinate expressions and a species in `{line}`"
                    )));
                }
                Ok(EquationLine {
                    expressions: [
                        fields[0].to_string(),
                        fields[1].to_string(),
                        fields[2].to_string(),
                    ],
                    species: fields[3].to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if lines.is_empty() {
            return Err(ExternalToolError::MalformedResponse(
                "no equation lines found".to_string(),
            ));
        }
        Ok(Self { lines })
    }
}

// =================
// Trait definitions
// =================

/// Trait for handling an input specification.
pub trait InputHandle {
    /// Handles the input section and runs appropriate calculations.
    fn handle(&self) -> Result<(), anyhow::Error>;
}

/// Finds the space group, orbits and Wyckoff letters of a structure.
pub trait SymmetryDetector {
    fn detect(&self, structure: &Structure) -> Result<SymmetryDataset, ExternalToolError>;
}

/// Finds the prototype designation (label and free parameters) of a structure.
pub trait PrototypeDesignator {
    fn designation(&self, structure: &Structure) -> Result<PrototypeDesignation, ExternalToolError>;
}

/// Builds the primitive structure of a prototype designation.
pub trait PrototypeBuilder {
    /// # Arguments
    ///
    /// * `species` - Real species assigned to the virtual species `A`, `B`, ... in order.
    /// * `label` - The prototype label.
    /// * `parameter_values` - The full free-parameter vector.
    fn build(
        &self,
        species: &[String],
        label: &str,
        parameter_values: &[f64],
    ) -> Result<BuildOutcome, ExternalToolError>;
}

/// Produces the symbolic placement equations of a prototype.
pub trait EquationGenerator {
    fn equations(
        &self,
        label: &str,
        parameter_values: &[f64],
    ) -> Result<EquationResponse, ExternalToolError>;
}

/// Compares two structures and recovers the rigid motion between them.
pub trait StructureComparer {
    /// Returns `None` if the structures do not match.
    fn compare(
        &self,
        reference: &Structure,
        candidate: &Structure,
    ) -> Result<Option<RigidMotion>, ExternalToolError>;
}

/// Bundle of the capabilities a resolution needs.
#[derive(Clone, Copy)]
pub struct ExternalCapabilities<'a> {
    pub detector: &'a (dyn SymmetryDetector + Sync),
    pub designator: &'a (dyn PrototypeDesignator + Sync),
    pub builder: &'a (dyn PrototypeBuilder + Sync),
    pub generator: &'a (dyn EquationGenerator + Sync),
    pub comparer: &'a (dyn StructureComparer + Sync),
    pub reference: &'a (dyn SymmetryReference + Sync),
}
