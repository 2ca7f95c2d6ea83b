//! Symmetry-equivalent atomic orbits of a structure.

use std::cmp::Ordering;
use std::fmt;

use itertools::Itertools;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::auxiliary::misc::wrap_unit;
use crate::auxiliary::structure::{Structure, WRAP_EPSILON};
use crate::interfaces::{SymmetryDataset, SymmetryDetector};
use crate::prototype::label::PrototypeLabel;
use crate::prototype::ResolutionError;
use crate::symmetry::symmetry_reference::SymmetryReference;

#[cfg(test)]
#[path = "orbits_tests.rs"]
mod orbits_tests;

// ==================
// Struct definitions
// ==================

/// The atoms of one detected orbit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquivalentAtomSet {
    /// Real species.
    pub species: String,

    /// Wyckoff letter as detected.
    pub wyckoff_letter: char,

    /// Fractional positions wrapped into $`[0, 1)`$ and sorted lexicographically.
    pub positions: Vec<Vector3<f64>>,
}

impl fmt::Display for EquivalentAtomSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}), {} atom{}:",
            self.species,
            self.wyckoff_letter,
            self.positions.len(),
            if self.positions.len() == 1 { "" } else { "s" }
        )?;
        for position in self.positions.iter() {
            writeln!(
                f,
                "  {:>12.8} {:>12.8} {:>12.8}",
                position[0], position[1], position[2]
            )?;
        }
        Ok(())
    }
}

/// Whether a structure is given in its primitive or its conventional cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Primitive,
    Conventional,
}

// =========
// Functions
// =========

/// Checks a structure's atom count against the count implied by a label's Pearson symbol.
pub fn check_number_of_atoms(
    n_atoms: usize,
    label: &PrototypeLabel,
    cell_kind: CellKind,
) -> Result<(), ResolutionError> {
    let expected = label.implied_atom_count(cell_kind == CellKind::Primitive)?;
    if usize::try_from(expected).ok() != Some(n_atoms) {
        return Err(ResolutionError::AtomCountMismatch {
            label: label.to_string(),
            expected,
            found: n_atoms,
        });
    }
    Ok(())
}

/// Groups atoms by detected orbit, ordered by species then Wyckoff letter.
///
/// Orbits with equal species and letter keep the order of their orbit ids.
pub fn group_positions_by_orbit(
    structure: &Structure,
    dataset: &SymmetryDataset,
) -> Vec<EquivalentAtomSet> {
    let orbit_ids = dataset.orbits.iter().copied().sorted().dedup().collect_vec();
    orbit_ids
        .into_iter()
        .filter_map(|orbit_id| {
            let members = dataset
                .orbits
                .iter()
                .positions(|id| *id == orbit_id)
                .collect_vec();
            let first = *members.first()?;
            let positions = members
                .iter()
                .map(|&i| structure.sites[i].position.map(|x| wrap_unit(x, WRAP_EPSILON)))
                .sorted_by(|p, q| lexicographic(p, q))
                .collect_vec();
            Some(EquivalentAtomSet {
                species: structure.sites[first].species.clone(),
                wyckoff_letter: dataset.wyckoff_letters[first],
                positions,
            })
        })
        .sorted_by(|o1, o2| {
            o1.species
                .cmp(&o2.species)
                .then(o1.wyckoff_letter.cmp(&o2.wyckoff_letter))
        })
        .collect_vec()
}

fn lexicographic(p: &Vector3<f64>, q: &Vector3<f64>) -> Ordering {
    p.iter()
        .zip(q.iter())
        .map(|(a, b)| a.total_cmp(b))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Cross-checks detected orbits against a label.
///
/// # Arguments
///
/// * `orbits` - Orbits in canonical order, see [`group_positions_by_orbit`].
/// * `detected_sg` - The detected space group number.
/// * `n_species` - Number of distinct species in the structure.
/// * `label` - The nominal label.
/// * `reference` - Source of the Wyckoff sets.
pub fn check_orbits_against_label<R>(
    orbits: &[EquivalentAtomSet],
    detected_sg: u32,
    n_species: usize,
    label: &PrototypeLabel,
    reference: &R,
) -> Result<(), ResolutionError>
where
    R: SymmetryReference + ?Sized,
{
    let label_str = label.to_string();
    let sg = label.space_group_number();
    if detected_sg != sg {
        return Err(ResolutionError::SpaceGroupMismatch {
            label: label_str,
            expected: sg,
            detected: detected_sg,
        });
    }
    if label.n_species() != n_species {
        return Err(ResolutionError::SpeciesCountMismatch {
            label: label_str,
            expected: label.n_species(),
            found: n_species,
        });
    }
    let label_letters = label.flattened_wyckoff_letters();
    if label_letters.len() != orbits.len() {
        return Err(ResolutionError::OrbitCountMismatch {
            label: label_str,
            expected: label_letters.len(),
            found: orbits.len(),
        });
    }
    for (position, (label_letter, orbit)) in label_letters.iter().zip(orbits.iter()).enumerate() {
        let detected_letter = orbit.wyckoff_letter;
        if !reference.are_in_same_wyckoff_set(*label_letter, detected_letter, sg)? {
            return Err(ResolutionError::WyckoffInconsistency {
                label: label_str,
                position,
                label_letter: *label_letter,
                detected_letter,
            });
        }
        if *label_letter != detected_letter {
            log::info!(
                "Wyckoff shuffle in `{label_str}`: orbit {position} of {} is at {detected_letter} \
                 where the label has {label_letter}.",
                orbit.species
            );
        }
    }
    Ok(())
}

// =========
// Extractor
// =========

/// Extracts orbits from a structure through a symmetry-detection capability.
pub struct OrbitExtractor<'a> {
    detector: &'a dyn SymmetryDetector,
    reference: &'a dyn SymmetryReference,
    cell_kind: CellKind,
}

impl<'a> OrbitExtractor<'a> {
    pub fn new(
        detector: &'a dyn SymmetryDetector,
        reference: &'a dyn SymmetryReference,
        cell_kind: CellKind,
    ) -> Self {
        Self {
            detector,
            reference,
            cell_kind,
        }
    }

    /// Extracts the orbits of a structure, optionally validating them against a label.
    ///
    /// # Arguments
    ///
    /// * `structure` - The structure, in the cell kind this extractor was created for.
    /// * `expected_label` - If given, the atom count, space group, species count and Wyckoff
    /// letters are checked against this label.
    ///
    /// # Returns
    ///
    /// The orbits, ordered by species then Wyckoff letter.
    pub fn extract(
        &self,
        structure: &Structure,
        expected_label: Option<&PrototypeLabel>,
    ) -> Result<Vec<EquivalentAtomSet>, ResolutionError> {
        if let Some(label) = expected_label {
            check_number_of_atoms(structure.n_atoms(), label, self.cell_kind)?;
        }
        let dataset = self
            .detector
            .detect(structure)
            .map_err(|err| ResolutionError::SymmetryDetectionFailure(err.to_string()))?;
        dataset
            .validate(structure.n_atoms())
            .map_err(|err| ResolutionError::SymmetryDetectionFailure(err.to_string()))?;
        let orbits = group_positions_by_orbit(structure, &dataset);
        if let Some(label) = expected_label {
            check_orbits_against_label(
                &orbits,
                dataset.space_group_number,
                structure.unique_species().len(),
                label,
                self.reference,
            )?;
        }
        Ok(orbits)
    }
}
