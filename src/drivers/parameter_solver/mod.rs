//! Resolution of the free parameters of a structure against a nominal prototype label.

use std::fmt;

use anyhow::{self, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use log;
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::auxiliary::misc::wrap_unit;
use crate::auxiliary::structure::Structure;
use crate::drivers::alignment::{align_to_frame, AlignmentResolver};
use crate::drivers::ProtoMatchDriver;
use crate::interfaces::{BuildOutcome, ExternalCapabilities};
use crate::io::format::{
    log_micsec_begin, log_micsec_end, log_subtitle, log_title, nice_bool, protomatch_error,
    protomatch_output, write_subtitle, ProtoMatchOutput,
};
use crate::io::{write_protomatch_binary, ProtoMatchFileType};
use crate::prototype::equations::{
    EquationBuilder, EquationCache, EquivalentEqnSet, NoEquationCache,
};
use crate::prototype::label::{labels_are_equivalent, real_to_virtual_species_map, PrototypeLabel};
use crate::prototype::orbits::{CellKind, EquivalentAtomSet, OrbitExtractor};
use crate::prototype::parameters::{FreeParameterVector, ParameterName};
use crate::prototype::ResolutionError;
use crate::symmetry::symmetry_reference::SymmetryReference;

#[cfg(test)]
#[path = "parameter_solver_tests.rs"]
mod parameter_solver_tests;

/// Zero singular values are those below this fraction of the largest.
const SVD_EPSILON: f64 = 1e-12;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

const fn default_max_residual() -> f64 {
    1e-5
}
const fn default_tolerance() -> f64 {
    1e-4
}

/// A structure containing control parameters for prototype parameter resolution.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct PrototypeResolutionParams {
    /// Largest Euclidean residual, in fractional units, at which a site of an equation set is
    /// accepted as matching an atom.
    #[builder(default = "default_max_residual()")]
    #[serde(default = "default_max_residual")]
    pub max_residual: f64,

    /// Tolerance for deciding whether two origin shifts differ by a lattice translation.
    #[builder(default = "default_tolerance()")]
    #[serde(default = "default_tolerance")]
    pub shift_tolerance: f64,

    /// Cartesian distance below which two atoms of the aligned structure are merged.
    #[builder(default = "default_tolerance()")]
    #[serde(default = "default_tolerance")]
    pub duplicate_tolerance: f64,

    /// Boolean indicating if the matched orbits are to be written to the output.
    #[builder(default = "false")]
    #[serde(default)]
    pub write_orbits: bool,

    /// Optional name for saving the result as a binary file of type [`ProtoMatchFileType::Res`].
    /// If `None`, the result will not be saved.
    #[builder(default = "None")]
    #[serde(default)]
    pub result_save_name: Option<String>,
}

impl PrototypeResolutionParams {
    /// Returns a builder to construct a [`PrototypeResolutionParams`] structure.
    pub fn builder() -> PrototypeResolutionParamsBuilder {
        PrototypeResolutionParamsBuilder::default()
    }
}

impl Default for PrototypeResolutionParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `PrototypeResolutionParams`.")
    }
}

impl fmt::Display for PrototypeResolutionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Maximum matching residual: {:.3e}", self.max_residual)?;
        writeln!(f, "Origin-shift tolerance: {:.3e}", self.shift_tolerance)?;
        writeln!(f, "Duplicate-atom tolerance: {:.3e}", self.duplicate_tolerance)?;
        writeln!(f, "Report matched orbits: {}", nice_bool(self.write_orbits))?;
        writeln!(
            f,
            "Save resolution results to file: {}",
            if let Some(name) = self.result_save_name.as_ref() {
                format!("{name}.{}", ProtoMatchFileType::Res.ext())
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain prototype parameter resolution results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrototypeResolutionResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: PrototypeResolutionParams,

    /// The label the structure was resolved against.
    pub nominal_label: String,

    /// The label reported by the designation capability.
    pub detected_label: String,

    /// Cumulative fractional origin shift at which all orbits were matched.
    pub internal_shift: Vector3<f64>,

    /// Orbits of the aligned structure at the accepted origin shift.
    pub orbits: Vec<EquivalentAtomSet>,

    /// The resolved free-parameter vector.
    pub free_parameters: FreeParameterVector,
}

impl fmt::Display for PrototypeResolutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nominal label: {}", self.nominal_label)?;
        writeln!(f, "Detected label: {}", self.detected_label)?;
        writeln!(
            f,
            "Accepted origin shift: ({})",
            self.internal_shift.iter().map(|x| format!("{x:+.4}")).join(", ")
        )?;
        writeln!(f, "Free parameters:")?;
        write!(f, "{}", self.free_parameters)?;
        writeln!(f)?;
        if self.parameters.write_orbits {
            write_subtitle(f, "Matched orbits")?;
            for orbit in self.orbits.iter() {
                write!(f, "{orbit}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Outcome of matching orbits to equation sets at one origin shift.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitMatching {
    /// Solved internal parameters across all matched equation sets.
    pub internal: Vec<(ParameterName, f64)>,

    /// Indices of the equation sets for which no orbit matched.
    pub unmatched_equation_sets: Vec<usize>,

    /// Indices of the orbits left without an equation set.
    pub unmatched_orbits: Vec<usize>,
}

impl OrbitMatching {
    pub fn is_complete(&self) -> bool {
        self.unmatched_equation_sets.is_empty() && self.unmatched_orbits.is_empty()
    }
}

// =========
// Functions
// =========

/// Integer lattice translations tried when matching a site to an atom.
fn neighbouring_translations() -> impl Iterator<Item = Vector3<f64>> {
    (0..3)
        .map(|_| [-1.0, 0.0, 1.0])
        .multi_cartesian_product()
        .map(|n| Vector3::new(n[0], n[1], n[2]))
}

/// Solves a site's placement equations for the orbit parameters in the least-squares sense.
///
/// # Returns
///
/// The solution and the Euclidean norm of its residual, or `None` if the system cannot be solved,
/// in which case the site does not match.
fn solve_site(
    eqn_set: &EquivalentEqnSet,
    site: usize,
    target: &Vector3<f64>,
) -> Option<(DVector<f64>, f64)> {
    let rhs = target - eqn_set.const_vectors.get(site)?;
    let rhs = DVector::from_column_slice(rhs.as_slice());
    let matrix = eqn_set.coeff_matrices.get(site)?;
    if matrix.ncols() == 0 {
        return Some((DVector::zeros(0), rhs.norm()));
    }
    let solution = match matrix.clone().svd(true, true).solve(&rhs, SVD_EPSILON) {
        Ok(solution) => solution,
        Err(err) => {
            log::debug!(
                "Least squares failed for site {site} of {}{}: {err}",
                eqn_set.species,
                eqn_set.wyckoff_letter
            );
            return None;
        }
    };
    let residual = (matrix * &solution - rhs).norm();
    Some((solution, residual))
}

/// Assigns orbits to equation sets and solves for the internal parameters.
///
/// Equation sets are visited in label order. Each takes the first unmatched orbit of the same
/// virtual species whose Wyckoff letter shares a Wyckoff set with its own, for which some site,
/// some orbit position and some integer translation in $`\{-1, 0, 1\}^3`$ give a least-squares
/// residual below `max_residual`.
///
/// # Arguments
///
/// * `eqn_sets` - Equation sets of the nominal label.
/// * `orbits` - Orbits of the aligned and shifted structure.
/// * `species_map` - Real to virtual species map.
/// * `sg` - Space group number.
/// * `reference` - Source of the Wyckoff sets.
/// * `max_residual` - Acceptance threshold.
pub fn match_orbits<R>(
    eqn_sets: &[EquivalentEqnSet],
    orbits: &[EquivalentAtomSet],
    species_map: &[(String, String)],
    sg: u32,
    reference: &R,
    max_residual: f64,
) -> Result<OrbitMatching, ResolutionError>
where
    R: SymmetryReference + ?Sized,
{
    let virtual_species_of = |real: &str| {
        species_map
            .iter()
            .find(|(r, _)| r == real)
            .map(|(_, v)| v.as_str())
    };
    let mut orbit_matched = vec![false; orbits.len()];
    let mut internal = vec![];
    let mut unmatched_equation_sets = vec![];

    for (eqn_index, eqn_set) in eqn_sets.iter().enumerate() {
        let mut solved: Option<(usize, DVector<f64>)> = None;
        'orbits: for (orbit_index, orbit) in orbits.iter().enumerate() {
            if orbit_matched[orbit_index]
                || virtual_species_of(&orbit.species) != Some(eqn_set.species.as_str())
                || !reference.are_in_same_wyckoff_set(
                    eqn_set.wyckoff_letter,
                    orbit.wyckoff_letter,
                    sg,
                )?
            {
                continue;
            }
            for site in 0..eqn_set.multiplicity() {
                for position in orbit.positions.iter() {
                    for translation in neighbouring_translations() {
                        let Some((solution, residual)) =
                            solve_site(eqn_set, site, &(position - translation))
                        else {
                            continue;
                        };
                        if residual < max_residual {
                            solved = Some((orbit_index, solution));
                            break 'orbits;
                        }
                    }
                }
            }
        }
        match solved {
            Some((orbit_index, solution)) => {
                log::debug!(
                    "Equation set {eqn_index} ({}{}) matched to orbit {orbit_index}.",
                    eqn_set.species,
                    eqn_set.wyckoff_letter
                );
                orbit_matched[orbit_index] = true;
                internal.extend(
                    eqn_set
                        .param_names
                        .iter()
                        .cloned()
                        .zip(solution.iter().map(|v| wrap_unit(*v, 0.0))),
                );
            }
            None => unmatched_equation_sets.push(eqn_index),
        }
    }
    Ok(OrbitMatching {
        internal,
        unmatched_equation_sets,
        unmatched_orbits: orbit_matched.iter().positions(|matched| !matched).collect_vec(),
    })
}

/// Resolves the free-parameter vector of a structure against a nominal prototype label.
///
/// The structure is designated, rebuilt from its designation, aligned to the rebuilt frame, and
/// then searched over the space group's internal origin shifts until every orbit is matched to an
/// equation set of the label.
///
/// # Arguments
///
/// * `structure` - The candidate structure, in a primitive or conventional cell.
/// * `nominal_label` - The prototype label to resolve against.
/// * `capabilities` - External capabilities.
/// * `cache` - Store for equation sets.
/// * `params` - Control parameters.
///
/// # Returns
///
/// The result on success. Consistency violations found at every origin shift are surfaced as the
/// last such violation.
pub fn resolve_free_parameters(
    structure: &Structure,
    nominal_label: &str,
    capabilities: ExternalCapabilities<'_>,
    cache: &dyn EquationCache,
    params: &PrototypeResolutionParams,
) -> Result<PrototypeResolutionResult, ResolutionError> {
    let reference = capabilities.reference;
    let label = nominal_label.parse::<PrototypeLabel>()?;
    let sg = label.space_group_number();

    let designation = capabilities.designator.designation(structure)?;
    let detected_label = designation.label.parse::<PrototypeLabel>()?;
    if !labels_are_equivalent(&label, &detected_label, false, reference)? {
        return Err(ResolutionError::LabelMismatch {
            nominal: label.to_string(),
            detected: detected_label.to_string(),
        });
    }

    let species = structure.unique_species();
    let rebuilt = match capabilities.builder.build(
        &species,
        &designation.label,
        &designation.parameter_values,
    )? {
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

    let aligner = AlignmentResolver::new(capabilities.comparer, reference);
    let motion = aligner.rigid_motion(structure, &rebuilt)?.ok_or_else(|| {
        ResolutionError::AlignmentFailure {
            nominal: label.to_string(),
            detected: designation.label.clone(),
        }
    })?;
    let aligned = align_to_frame(structure, &motion, &rebuilt.cell, params.duplicate_tolerance)?;

    let eqn_sets = EquationBuilder::new(capabilities.generator, reference, cache)
        .build(&label, &designation.parameter_values)?;
    let cell_names = label.cell_parameter_names();
    let n_internal = eqn_sets
        .iter()
        .flat_map(|eqn_set| eqn_set.param_names.iter())
        .unique()
        .count();
    if designation.parameter_values.len() != cell_names.len() + n_internal {
        return Err(ResolutionError::ParameterCountMismatch {
            expected: cell_names.len() + n_internal,
            found: designation.parameter_values.len(),
        });
    }
    let cell_values = designation.parameter_values[..cell_names.len()].to_vec();

    let shifts = std::iter::once(Vector3::zeros())
        .chain(aligner.enumerate_internal_shifts(sg, params.shift_tolerance)?)
        .collect_vec();
    let species_map = real_to_virtual_species_map(&species);
    let extractor = OrbitExtractor::new(capabilities.detector, reference, CellKind::Primitive);

    let mut cumulative_shift = Vector3::zeros();
    let mut last_violation: Option<ResolutionError> = None;
    let mut last_matching: Option<OrbitMatching> = None;
    for shift in shifts.iter() {
        cumulative_shift += shift;
        let shifted = aligned.translated(&cumulative_shift).wrapped();
        let orbits = match extractor.extract(&shifted, Some(&label)) {
            Ok(orbits) => orbits,
            Err(err) if err.is_consistency_violation() => {
                log::debug!("Origin shift {:?} rejected: {err}", cumulative_shift.as_slice());
                last_violation = Some(err);
                continue;
            }
            Err(err) => return Err(err),
        };
        let matching = match_orbits(
            &eqn_sets,
            &orbits,
            &species_map,
            sg,
            reference,
            params.max_residual,
        )?;
        if matching.is_complete() {
            let free_parameters = FreeParameterVector::from_parts(
                cell_names,
                cell_values,
                matching.internal,
            )?;
            return Ok(PrototypeResolutionResult {
                parameters: params.clone(),
                nominal_label: label.to_string(),
                detected_label: designation.label,
                internal_shift: cumulative_shift,
                orbits,
                free_parameters,
            });
        }
        log::debug!(
            "Origin shift {:?} leaves equation sets {:?} unmatched.",
            cumulative_shift.as_slice(),
            matching.unmatched_equation_sets
        );
        last_matching = Some(matching);
    }

    match (last_matching, last_violation) {
        (Some(matching), _) => Err(ResolutionError::ParameterResolutionFailure {
            label: label.to_string(),
            unmatched_equation_sets: matching.unmatched_equation_sets,
            unmatched_orbits: matching.unmatched_orbits,
        }),
        (None, Some(violation)) => Err(violation),
        (None, None) => Err(ResolutionError::ParameterResolutionFailure {
            label: label.to_string(),
            unmatched_equation_sets: (0..eqn_sets.len()).collect_vec(),
            unmatched_orbits: vec![],
        }),
    }
}

// ------
// Driver
// ------

/// A driver for prototype parameter resolution.
#[derive(Clone, Builder)]
pub struct PrototypeResolutionDriver<'a> {
    /// The control parameters for prototype parameter resolution.
    parameters: &'a PrototypeResolutionParams,

    /// The structure whose free parameters are sought.
    structure: &'a Structure,

    /// The prototype label to resolve against.
    nominal_label: &'a str,

    /// The external capabilities used during resolution.
    capabilities: ExternalCapabilities<'a>,

    /// The store for equation sets. Defaults to no caching.
    #[builder(default = "&NoEquationCache as &dyn EquationCache")]
    cache: &'a dyn EquationCache,

    /// The result of the resolution.
    #[builder(setter(skip), default = "None")]
    result: Option<PrototypeResolutionResult>,
}

impl<'a> PrototypeResolutionDriver<'a> {
    /// Returns a builder to construct a [`PrototypeResolutionDriver`] structure.
    pub fn builder() -> PrototypeResolutionDriverBuilder<'a> {
        PrototypeResolutionDriverBuilder::default()
    }

    /// Executes prototype parameter resolution.
    fn resolve(&mut self) -> Result<(), anyhow::Error> {
        log_title("Prototype Parameter Resolution");
        protomatch_output!("");
        let params = self.parameters;
        params.log_output_display();

        log_subtitle(&format!("Structure to resolve against `{}`", self.nominal_label));
        protomatch_output!("");
        self.structure.log_output_display();
        protomatch_output!("");

        log_micsec_begin("Origin-shift search");
        let result = resolve_free_parameters(
            self.structure,
            self.nominal_label,
            self.capabilities,
            self.cache,
            params,
        );
        log_micsec_end("Origin-shift search");
        protomatch_output!("");

        let result = result.map_err(|err| {
            protomatch_error!("{err}");
            err
        })?;
        result.log_output_display();

        if let Some(name) = params.result_save_name.as_ref() {
            write_protomatch_binary(name, ProtoMatchFileType::Res, &result)?;
            protomatch_output!(
                "Resolution results saved as {name}.{}.",
                ProtoMatchFileType::Res.ext()
            );
            protomatch_output!("");
        }

        self.result = Some(result);
        Ok(())
    }
}

impl<'a> ProtoMatchDriver for PrototypeResolutionDriver<'a> {
    type Params = PrototypeResolutionParams;

    type Outcome = PrototypeResolutionResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No prototype resolution results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.resolve()
    }
}
