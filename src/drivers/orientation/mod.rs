//! Confirmation that a designation reproduces a structure in its labelled orientation.

use std::fmt;

use anyhow::{self, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use log;
use serde::{Deserialize, Serialize};

use crate::auxiliary::structure::{Cell, Structure};
use crate::drivers::alignment::AlignmentResolver;
use crate::drivers::ProtoMatchDriver;
use crate::interfaces::{BuildOutcome, ExternalCapabilities};
use crate::io::format::{log_title, nice_bool, protomatch_error, protomatch_output, ProtoMatchOutput};
use crate::prototype::label::PrototypeLabel;
use crate::prototype::ResolutionError;
use crate::symmetry::symmetry_reference::cartesian_rotation_is_in_point_group;


// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

const fn default_tolerance() -> f64 {
    1e-4
}

/// A structure containing control parameters for orientation confirmation.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct OrientationConfirmationParams {
    /// Absolute tolerance on cell lengths (Å) and angles (degrees) when comparing the shapes of
    /// the two cells.
    #[builder(default = "default_tolerance()")]
    #[serde(default = "default_tolerance")]
    pub cell_tolerance: f64,

    /// Absolute tolerance on each element of the fractional rotation when looking it up in the
    /// point group.
    #[builder(default = "default_tolerance()")]
    #[serde(default = "default_tolerance")]
    pub rotation_tolerance: f64,
}

impl OrientationConfirmationParams {
    /// Returns a builder to construct a [`OrientationConfirmationParams`] structure.
    pub fn builder() -> OrientationConfirmationParamsBuilder {
        OrientationConfirmationParamsBuilder::default()
    }
}

impl Default for OrientationConfirmationParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `OrientationConfirmationParams`.")
    }
}

impl fmt::Display for OrientationConfirmationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cell shape tolerance: {:.3e}", self.cell_tolerance)?;
        writeln!(f, "Rotation tolerance: {:.3e}", self.rotation_tolerance)?;
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain orientation confirmation results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrientationConfirmationResult {
    /// The control parameters used.
    pub parameters: OrientationConfirmationParams,

    /// The label the structure was rebuilt from.
    pub label: String,

    /// Boolean indicating if the rebuilt structure lies in the orientation of the reference
    /// structure.
    pub confirmed: bool,
}

impl fmt::Display for OrientationConfirmationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Label: {}", self.label)?;
        writeln!(f, "Orientation confirmed: {}", nice_bool(self.confirmed))?;
        writeln!(f)?;
        Ok(())
    }
}

// =========
// Functions
// =========

/// Checks whether rebuilding a designation reproduces a reference structure in the labelled
/// orientation, not merely up to an arbitrary symmetry operation.
///
/// The two cells are first compared in standard form. Both structures are then placed in one
/// explicit cell built from the shared lengths and angles, and the rotation between them is
/// looked up in the point group of the label's space group.
///
/// # Arguments
///
/// * `reference_structure` - The structure whose orientation is to be reproduced.
/// * `species` - Real species in virtual-species order.
/// * `label` - The prototype label.
/// * `parameter_values` - The full free-parameter vector.
/// * `capabilities` - External capabilities. Only the builder, the comparer and the symmetry
/// reference are used.
/// * `params` - Control parameters.
///
/// # Returns
///
/// `Ok(false)` if the cells differ in shape, if the comparer finds no match, or if the rotation
/// lies outside the point group.
pub fn confirm_orientation(
    reference_structure: &Structure,
    species: &[String],
    label: &str,
    parameter_values: &[f64],
    capabilities: ExternalCapabilities<'_>,
    params: &OrientationConfirmationParams,
) -> Result<bool, ResolutionError> {
    let parsed = label.parse::<PrototypeLabel>()?;
    let rebuilt = match capabilities
        .builder
        .build(species, label, parameter_values)?
    {
        BuildOutcome::Built(rebuilt) => rebuilt,
        BuildOutcome::HigherSymmetryDetected {
            label,
            parameter_values,
        } => {
            return Err(ResolutionError::HigherSymmetryDetected {
                label,
                parameter_values,
            })
        }
    };

    let reference_cell = reference_structure.cell.standard_form()?;
    if !reference_cell.has_same_shape(&rebuilt.cell.standard_form()?, params.cell_tolerance) {
        log::debug!(
            "Cell of `{label}` ({}) differs in shape from the reference cell ({}).",
            rebuilt.cell.lengths_and_angles().iter().map(|x| format!("{x:.5}")).join(", "),
            reference_structure
                .cell
                .lengths_and_angles()
                .iter()
                .map(|x| format!("{x:.5}"))
                .join(", ")
        );
        return Ok(false);
    }

    let explicit_cell = Cell::from_lengths_and_angles(&reference_cell.lengths_and_angles())?;
    let explicit_reference = reference_structure.with_cell(explicit_cell.clone());
    let explicit_rebuilt = rebuilt.with_cell(explicit_cell.clone());
    let aligner = AlignmentResolver::new(capabilities.comparer, capabilities.reference);
    let Some(motion) = aligner.rigid_motion(&explicit_reference, &explicit_rebuilt)? else {
        log::debug!("No rigid motion maps `{label}` onto the reference structure.");
        return Ok(false);
    };
    let in_point_group = cartesian_rotation_is_in_point_group(
        &motion.rotation,
        parsed.space_group_number(),
        &explicit_cell,
        capabilities.reference,
        params.rotation_tolerance,
    )?;
    log::debug!(
        "Rotation between `{label}` and the reference structure {} the point group.",
        if in_point_group { "lies in" } else { "lies outside" }
    );
    Ok(in_point_group)
}

// ------
// Driver
// ------

/// A driver for orientation confirmation.
#[derive(Clone, Builder)]
pub struct OrientationConfirmationDriver<'a> {
    /// The control parameters for orientation confirmation.
    parameters: &'a OrientationConfirmationParams,

    /// The structure whose orientation is to be reproduced.
    reference_structure: &'a Structure,

    /// Real species in virtual-species order.
    species: &'a [String],

    /// The prototype label to rebuild.
    label: &'a str,

    /// The full free-parameter vector of the label.
    parameter_values: &'a [f64],

    /// The external capabilities used during confirmation.
    capabilities: ExternalCapabilities<'a>,

    /// The result of the confirmation.
    #[builder(setter(skip), default = "None")]
    result: Option<OrientationConfirmationResult>,
}

impl<'a> OrientationConfirmationDriver<'a> {
    /// Returns a builder to construct a [`OrientationConfirmationDriver`] structure.
    pub fn builder() -> OrientationConfirmationDriverBuilder<'a> {
        OrientationConfirmationDriverBuilder::default()
    }

    /// Executes orientation confirmation.
    fn confirm(&mut self) -> Result<(), anyhow::Error> {
        log_title("Orientation Confirmation");
        protomatch_output!("");
        let params = self.parameters;
        params.log_output_display();

        let confirmed = confirm_orientation(
            self.reference_structure,
            self.species,
            self.label,
            self.parameter_values,
            self.capabilities,
            params,
        )
        .map_err(|err| {
            protomatch_error!("{err}");
            err
        })?;
        let result = OrientationConfirmationResult {
            parameters: params.clone(),
            label: self.label.to_string(),
            confirmed,
        };
        result.log_output_display();
        self.result = Some(result);
        Ok(())
    }
}

impl<'a> ProtoMatchDriver for OrientationConfirmationDriver<'a> {
    type Params = OrientationConfirmationParams;

    type Outcome = OrientationConfirmationResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No orientation confirmation results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.confirm()
    }
}
