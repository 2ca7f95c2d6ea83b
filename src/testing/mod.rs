//! In-process stand-ins for the external capabilities, used by the unit tests.

use std::collections::HashMap;

use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};

use crate::auxiliary::lattice::conventional_cell_parameters;
use crate::auxiliary::structure::Structure;
use crate::interfaces::{
    BuildOutcome, EquationGenerator, EquationResponse, ExternalToolError, PrototypeBuilder,
    PrototypeDesignation, PrototypeDesignator, RigidMotion, StructureComparer, SymmetryDataset,
    SymmetryDetector,
};
use crate::prototype::equations::partition_equation_lines;
use crate::prototype::generation::{build_structure_from_equations, parameter_vector_for_label};
use crate::prototype::label::PrototypeLabel;
use crate::symmetry::symmetry_operation::SpaceGroupOperation;
use crate::symmetry::symmetry_reference::TabulatedSymmetryReference;

pub(crate) const CF4_225_EQUATIONS: &str = "\
A_cF4_225_a & Fm-3m
1.0
  0.0000 2.0000 2.0000
  2.0000 0.0000 2.0000
  2.0000 2.0000 0.0000
1
Direct(1) [A1]
0.00000000000000 0.00000000000000 0.00000000000000 A
";

pub(crate) const HR3_166_EQUATIONS: &str = "\
AB2_hR3_166_a_c & R-3m
1.0
  1.6024 -0.9251 1.9804
  0.0000 1.8503 1.9804
 -1.6024 -0.9251 1.9804
1 2
Direct(3) [A1B2]
0.00000000000000 0.00000000000000 0.00000000000000 A
x2 x2 x2 B
-x2 -x2 -x2 B
";

/// Reference tables for the space groups used in the tests.
pub(crate) fn toy_symmetry_reference() -> TabulatedSymmetryReference {
    let letters = |s: &str| s.chars().collect_vec();
    let multiplicities_166 = [
        ('a', 3),
        ('b', 3),
        ('c', 6),
        ('d', 9),
        ('e', 9),
        ('f', 18),
        ('g', 18),
        ('h', 18),
        ('i', 36),
    ];
    let multiplicities_225 = [
        ('a', 4),
        ('b', 4),
        ('c', 8),
        ('d', 24),
        ('e', 24),
        ('f', 32),
        ('g', 48),
        ('h', 48),
        ('i', 96),
        ('j', 96),
        ('k', 96),
        ('l', 192),
    ];
    let cyclic = Matrix3::new(0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0);
    let ops_166 = [Matrix3::identity(), cyclic, cyclic.transpose()]
        .into_iter()
        .flat_map(|w| [w, -w])
        .map(|w| SpaceGroupOperation::new(w, Vector3::zeros()))
        .collect_vec();
    let ops_225 = [Matrix3::identity(), -Matrix3::identity()]
        .into_iter()
        .map(|w| SpaceGroupOperation::new(w, Vector3::zeros()))
        .collect_vec();

    TabulatedSymmetryReference::builder()
        .wyckoff_multiplicities(
            [
                (166, multiplicities_166.into_iter().collect()),
                (225, multiplicities_225.into_iter().collect()),
            ]
            .into_iter()
            .collect(),
        )
        .wyckoff_sets(
            [
                (
                    166,
                    ["ab", "c", "de", "fg", "h", "i"].map(letters).to_vec(),
                ),
                (
                    225,
                    ["ab", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l"]
                        .map(letters)
                        .to_vec(),
                ),
            ]
            .into_iter()
            .collect(),
        )
        .possible_primitive_shifts(
            [
                (166, vec![Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)]),
                (225, vec![Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)]),
            ]
            .into_iter()
            .collect(),
        )
        .primitive_operations([(166, ops_166), (225, ops_225)].into_iter().collect())
        .build()
        .expect("Unable to build the toy symmetry reference.")
}

/// Serves canned equations-only POSCARs keyed by label.
pub(crate) struct ToyEquationGenerator {
    poscars: HashMap<String, &'static str>,
}

impl ToyEquationGenerator {
    pub(crate) fn new() -> Self {
        Self {
            poscars: [
                ("A_cF4_225_a".to_string(), CF4_225_EQUATIONS),
                ("AB2_hR3_166_a_c".to_string(), HR3_166_EQUATIONS),
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl EquationGenerator for ToyEquationGenerator {
    fn equations(&self, label: &str, _: &[f64]) -> Result<EquationResponse, ExternalToolError> {
        let poscar = self.poscars.get(label).ok_or_else(|| ExternalToolError::NonZeroExit {
            command: format!("equations {label}"),
            status: Some(1),
            stderr: format!("unknown prototype {label}"),
        })?;
        EquationResponse::from_equation_poscar(poscar)
    }
}

/// Builds structures by evaluating the toy equations on the standard primitive cell.
pub(crate) struct ToyBuilder {
    generator: ToyEquationGenerator,
    reference: TabulatedSymmetryReference,
}

impl ToyBuilder {
    pub(crate) fn new() -> Self {
        Self {
            generator: ToyEquationGenerator::new(),
            reference: toy_symmetry_reference(),
        }
    }
}

impl PrototypeBuilder for ToyBuilder {
    fn build(
        &self,
        species: &[String],
        label: &str,
        parameter_values: &[f64],
    ) -> Result<BuildOutcome, ExternalToolError> {
        let to_external = |err: crate::prototype::ResolutionError| {
            ExternalToolError::MalformedResponse(err.to_string())
        };
        let parsed = label
            .parse::<PrototypeLabel>()
            .map_err(|err| ExternalToolError::MalformedResponse(err.to_string()))?;
        let response = self.generator.equations(label, parameter_values)?;
        let eqn_sets =
            partition_equation_lines(&parsed, &response.lines, &self.reference).map_err(to_external)?;
        let parameters =
            parameter_vector_for_label(&parsed, &eqn_sets, parameter_values).map_err(to_external)?;
        build_structure_from_equations(species, &parsed, &eqn_sets, &parameters)
            .map(BuildOutcome::Built)
            .map_err(to_external)
    }
}

/// Reports a fixed label, measuring the cell parameters from the structure and returning fixed
/// guesses for the internal parameters.
pub(crate) struct ToyDesignator {
    pub(crate) label: String,
    pub(crate) internal_names: Vec<String>,
    pub(crate) internal_guesses: Vec<f64>,
}

impl PrototypeDesignator for ToyDesignator {
    fn designation(&self, structure: &Structure) -> Result<PrototypeDesignation, ExternalToolError> {
        let label = self
            .label
            .parse::<PrototypeLabel>()
            .map_err(|err| ExternalToolError::MalformedResponse(err.to_string()))?;
        let lattice = label
            .bravais_lattice()
            .map_err(|err| ExternalToolError::MalformedResponse(err.to_string()))?;
        let primitive_count = label
            .implied_atom_count(true)
            .map_err(|err| ExternalToolError::MalformedResponse(err.to_string()))?;
        let cellpar = structure.cell.lengths_and_angles();
        let cell_values = if structure.n_atoms() == primitive_count as usize {
            conventional_cell_parameters(&cellpar, &lattice)
                .map_err(|err| ExternalToolError::MalformedResponse(err.to_string()))?
        } else {
            // Conventional cubic cells only.
            vec![cellpar[0]]
        };
        let parameter_names = label
            .cell_parameter_names()
            .iter()
            .map(|name| name.to_string())
            .chain(self.internal_names.iter().cloned())
            .collect_vec();
        Ok(PrototypeDesignation {
            label: self.label.clone(),
            parameter_names,
            parameter_values: cell_values
                .into_iter()
                .chain(self.internal_guesses.iter().copied())
                .collect_vec(),
        })
    }
}

/// Assigns one orbit per species with a fixed Wyckoff letter per species.
pub(crate) struct SpeciesOrbitDetector {
    pub(crate) space_group_number: u32,
    pub(crate) letters: HashMap<String, char>,
}

impl SymmetryDetector for SpeciesOrbitDetector {
    fn detect(&self, structure: &Structure) -> Result<SymmetryDataset, ExternalToolError> {
        let species = structure.unique_species();
        let orbits = structure
            .sites
            .iter()
            .map(|site| species.iter().position(|sp| *sp == site.species).unwrap_or(0))
            .collect_vec();
        let wyckoff_letters = structure
            .sites
            .iter()
            .map(|site| {
                self.letters.get(&site.species).copied().ok_or_else(|| {
                    ExternalToolError::MalformedResponse(format!(
                        "no Wyckoff letter for {}",
                        site.species
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SymmetryDataset {
            space_group_number: self.space_group_number,
            orbits,
            wyckoff_letters,
        })
    }
}

/// Matches two structures whose lattices coincide up to a rotation or an integral change of
/// basis, pinning the origin on an atom of the rarest species.
pub(crate) struct FractionalComparer {
    pub(crate) tolerance: f64,
}

impl StructureComparer for FractionalComparer {
    fn compare(
        &self,
        reference: &Structure,
        candidate: &Structure,
    ) -> Result<Option<RigidMotion>, ExternalToolError> {
        let c_ref = reference.cell.lattice();
        let c_cand = candidate.cell.lattice();
        let direct = c_ref.transpose()
            * c_cand
                .transpose()
                .try_inverse()
                .ok_or_else(|| ExternalToolError::MalformedResponse("singular cell".to_string()))?;
        let (rotation, basis_transformation) =
            if (direct.transpose() * direct - Matrix3::identity()).amax() < 1e-6 {
                (direct, Matrix3::identity())
            } else {
                let m = c_ref
                    * c_cand.try_inverse().ok_or_else(|| {
                        ExternalToolError::MalformedResponse("singular cell".to_string())
                    })?;
                if (m - m.map(f64::round)).amax() > 1e-6 {
                    return Ok(None);
                }
                (Matrix3::identity(), m.map(f64::round))
            };

        let species = reference.unique_species();
        let Some(rarest) = species
            .iter()
            .min_by_key(|sp| reference.sites.iter().filter(|s| s.species == **sp).count())
        else {
            return Ok(None);
        };
        let anchor_ref = reference
            .sites
            .iter()
            .find(|s| s.species == *rarest)
            .map(|s| reference.cell.to_cartesian(&s.position));
        let anchor_cand = candidate
            .sites
            .iter()
            .find(|s| s.species == *rarest)
            .map(|s| candidate.cell.to_cartesian(&s.position));
        let (Some(anchor_ref), Some(anchor_cand)) = (anchor_ref, anchor_cand) else {
            return Ok(None);
        };
        let origin_shift = anchor_ref - rotation * anchor_cand;

        let maps_onto_reference = candidate.sites.iter().all(|site| {
            let image = rotation * candidate.cell.to_cartesian(&site.position) + origin_shift;
            reference
                .cell
                .to_fractional(&image)
                .map(|frac| {
                    reference.sites.iter().any(|r| {
                        r.species == site.species
                            && reference.cell.periodic_distance(&r.position, &frac)
                                < self.tolerance
                    })
                })
                .unwrap_or(false)
        });
        if maps_onto_reference {
            Ok(Some(RigidMotion {
                basis_transformation,
                rotation,
                origin_shift,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Always reports the same rigid motion.
pub(crate) struct FixedComparer {
    pub(crate) motion: Option<RigidMotion>,
}

impl StructureComparer for FixedComparer {
    fn compare(&self, _: &Structure, _: &Structure) -> Result<Option<RigidMotion>, ExternalToolError> {
        Ok(self.motion.clone())
    }
}
