//! Structures generated from prototype designations.

use itertools::Itertools;

use crate::auxiliary::lattice::{expand_cell_parameters, primitive_cell_from_parameters};
use crate::auxiliary::structure::{Site, Structure, WRAP_EPSILON};
use crate::auxiliary::misc::wrap_unit;
use crate::prototype::equations::EquivalentEqnSet;
use crate::prototype::label::PrototypeLabel;
use crate::prototype::parameters::FreeParameterVector;
use crate::prototype::ResolutionError;

#[cfg(test)]
#[path = "generation_tests.rs"]
mod generation_tests;

/// Names a plain parameter array after a label's cell parameters and its equations' internal
/// parameters.
///
/// # Arguments
///
/// * `label` - The prototype label, which fixes the cell block.
/// * `eqn_sets` - The label's equation sets, which fix the internal block.
/// * `values` - The values, cell block first then internal parameters in index-then-axis order.
pub fn parameter_vector_for_label(
    label: &PrototypeLabel,
    eqn_sets: &[EquivalentEqnSet],
    values: &[f64],
) -> Result<FreeParameterVector, ResolutionError> {
    let cell_names = label.cell_parameter_names();
    let internal_names = eqn_sets
        .iter()
        .flat_map(|eqn_set| eqn_set.param_names.iter().cloned())
        .unique()
        .sorted_by_key(|name| name.sort_key())
        .collect_vec();
    let expected = cell_names.len() + internal_names.len();
    if values.len() != expected {
        return Err(ResolutionError::ParameterCountMismatch {
            expected,
            found: values.len(),
        });
    }
    FreeParameterVector::new(
        cell_names.into_iter().chain(internal_names).collect_vec(),
        values.to_vec(),
    )
}

/// Builds the primitive structure of a designation by evaluating its equation sets.
///
/// # Arguments
///
/// * `species` - Real species for the virtual species `A`, `B`, ... in order.
/// * `label` - The prototype label.
/// * `eqn_sets` - The label's equation sets.
/// * `parameters` - The free-parameter vector.
///
/// # Returns
///
/// The structure in the standard primitive cell, with fractional coordinates wrapped into
/// $`[0, 1)`$ and atoms in equation order.
pub fn build_structure_from_equations(
    species: &[String],
    label: &PrototypeLabel,
    eqn_sets: &[EquivalentEqnSet],
    parameters: &FreeParameterVector,
) -> Result<Structure, ResolutionError> {
    if species.len() != label.n_species() {
        return Err(ResolutionError::SpeciesCountMismatch {
            label: label.to_string(),
            expected: label.n_species(),
            found: species.len(),
        });
    }
    let virtual_species = label.virtual_species();
    let cellpar = expand_cell_parameters(label.pearson_symbol().family, parameters.cell_values())?;
    let cell = primitive_cell_from_parameters(&label.bravais_lattice()?, &cellpar)?;

    let mut sites = vec![];
    for eqn_set in eqn_sets.iter() {
        let real_species = virtual_species
            .iter()
            .position(|v| *v == eqn_set.species)
            .map(|i| &species[i])
            .ok_or_else(|| ResolutionError::InconsistentEquationCount {
                label: label.to_string(),
                reason: format!("unknown virtual species {}", eqn_set.species),
            })?;
        let values = eqn_set
            .param_names
            .iter()
            .map(|name| {
                parameters.get(name).ok_or_else(|| {
                    ResolutionError::MalformedParameters(format!("no value given for {name}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        for site in 0..eqn_set.multiplicity() {
            let position = eqn_set.site_position(site, &values).ok_or_else(|| {
                ResolutionError::ParameterCountMismatch {
                    expected: eqn_set.param_names.len(),
                    found: values.len(),
                }
            })?;
            sites.push(Site::new(
                real_species,
                position.map(|x| wrap_unit(x, WRAP_EPSILON)),
            ));
        }
    }
    Ok(Structure::new(cell, sites))
}
