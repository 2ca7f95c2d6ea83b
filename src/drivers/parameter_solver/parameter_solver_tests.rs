use std::collections::HashMap;

use approx::assert_relative_eq;
use nalgebra::{DMatrix, Matrix3, Rotation3, Vector3};
use tempfile::TempDir;

use crate::auxiliary::structure::{Cell, Site, Structure};
use crate::drivers::parameter_solver::{
    match_orbits, resolve_free_parameters, solve_site, PrototypeResolutionDriver,
    PrototypeResolutionParams, PrototypeResolutionResult,
};
use crate::drivers::ProtoMatchDriver;
use crate::interfaces::{
    BuildOutcome, ExternalCapabilities, ExternalToolError, PrototypeBuilder, RigidMotion,
    StructureComparer,
};
use crate::io::{read_protomatch_binary, ProtoMatchFileType};
use crate::prototype::equations::{
    EquationBuilder, EquivalentEqnSet, NoEquationCache, SharedEquationCache,
};
use crate::prototype::label::{parse_label, real_to_virtual_species_map};
use crate::prototype::orbits::EquivalentAtomSet;
use crate::prototype::parameters::ParameterName;
use crate::prototype::ResolutionError;
use crate::symmetry::symmetry_reference::TabulatedSymmetryReference;
use crate::testing::{
    toy_symmetry_reference, FixedComparer, FractionalComparer, SpeciesOrbitDetector, ToyBuilder,
    ToyDesignator, ToyEquationGenerator,
};

const HR3_LABEL: &str = "AB2_hR3_166_a_c";
const HR3_VALUES: [f64; 3] = [3.2047217, 5.9412636, 0.24969054];

/// Owns one set of in-process capabilities.
struct ToyWorld {
    detector: SpeciesOrbitDetector,
    designator: ToyDesignator,
    builder: Box<dyn PrototypeBuilder + Sync>,
    generator: ToyEquationGenerator,
    comparer: Box<dyn StructureComparer + Sync>,
    reference: TabulatedSymmetryReference,
}

impl ToyWorld {
    fn rhombohedral(bi_letter: char) -> Self {
        Self {
            detector: SpeciesOrbitDetector {
                space_group_number: 166,
                letters: HashMap::from([("Bi".to_string(), bi_letter), ("Te".to_string(), 'c')]),
            },
            designator: ToyDesignator {
                label: HR3_LABEL.to_string(),
                internal_names: vec!["x2".to_string()],
                internal_guesses: vec![0.25],
            },
            builder: Box::new(ToyBuilder::new()),
            generator: ToyEquationGenerator::new(),
            comparer: Box::new(FractionalComparer { tolerance: 0.1 }),
            reference: toy_symmetry_reference(),
        }
    }

    fn capabilities(&self) -> ExternalCapabilities<'_> {
        ExternalCapabilities {
            detector: &self.detector,
            designator: &self.designator,
            builder: &*self.builder,
            generator: &self.generator,
            comparer: &*self.comparer,
            reference: &self.reference,
        }
    }

    fn resolve(&self, structure: &Structure) -> Result<PrototypeResolutionResult, ResolutionError> {
        resolve_free_parameters(
            structure,
            HR3_LABEL,
            self.capabilities(),
            &NoEquationCache,
            &PrototypeResolutionParams::default(),
        )
    }
}

/// Always returns the same structure.
struct EchoBuilder {
    structure: Structure,
}

impl PrototypeBuilder for EchoBuilder {
    fn build(&self, _: &[String], _: &str, _: &[f64]) -> Result<BuildOutcome, ExternalToolError> {
        Ok(BuildOutcome::Built(self.structure.clone()))
    }
}

/// Always reports a higher symmetry.
struct PromotingBuilder;

impl PrototypeBuilder for PromotingBuilder {
    fn build(&self, _: &[String], _: &str, _: &[f64]) -> Result<BuildOutcome, ExternalToolError> {
        Ok(BuildOutcome::HigherSymmetryDetected {
            label: "A_cF4_225_a".to_string(),
            parameter_values: vec![4.5],
        })
    }
}

fn bi2te3_like() -> Structure {
    let species = vec!["Bi".to_string(), "Te".to_string()];
    match ToyBuilder::new().build(&species, HR3_LABEL, &HR3_VALUES).unwrap() {
        BuildOutcome::Built(structure) => structure,
        BuildOutcome::HigherSymmetryDetected { .. } => panic!("Unexpected higher symmetry."),
    }
}

fn conventional_fcc(a: f64) -> Structure {
    Structure::new(
        Cell::from_lengths_and_angles(&[a, a, a, 90.0, 90.0, 90.0]).unwrap(),
        [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.5, 0.5),
            Vector3::new(0.5, 0.0, 0.5),
            Vector3::new(0.5, 0.5, 0.0),
        ]
        .into_iter()
        .map(|position| Site::new("Cu", position))
        .collect(),
    )
}

#[test]
fn test_parameter_solver_fcc_conventional_cell() {
    let mut world = ToyWorld::rhombohedral('a');
    world.detector = SpeciesOrbitDetector {
        space_group_number: 225,
        letters: HashMap::from([("Cu".to_string(), 'a')]),
    };
    world.designator = ToyDesignator {
        label: "A_cF4_225_a".to_string(),
        internal_names: vec![],
        internal_guesses: vec![],
    };
    let result = resolve_free_parameters(
        &conventional_fcc(3.6),
        "A_cF4_225_a",
        world.capabilities(),
        &NoEquationCache,
        &PrototypeResolutionParams::default(),
    )
    .unwrap();
    assert_eq!(result.free_parameters.len(), 1);
    assert_eq!(result.free_parameters.names()[0].to_string(), "a");
    assert_relative_eq!(result.free_parameters.values()[0], 3.6, epsilon = 1e-10);
    assert_eq!(result.orbits.len(), 1);
}

#[test]
fn test_parameter_solver_rhombohedral_round_trip() {
    let world = ToyWorld::rhombohedral('a');
    let result = world.resolve(&bi2te3_like()).unwrap();
    assert_eq!(result.free_parameters.len(), 3);
    for (resolved, expected) in result.free_parameters.values().iter().zip(HR3_VALUES.iter()) {
        assert_relative_eq!(resolved, expected, epsilon = 1e-5);
    }
    assert_relative_eq!(result.internal_shift, Vector3::zeros());
}

#[test]
fn test_parameter_solver_rotated_translated_permuted() {
    let world = ToyWorld::rhombohedral('a');
    let original = world.resolve(&bi2te3_like()).unwrap();

    let rotation = *Rotation3::from_euler_angles(0.7, 0.4, -1.3).matrix();
    let mut moved = bi2te3_like()
        .rotated(&rotation)
        .translated(&Vector3::new(0.13, 0.27, 0.41));
    moved.sites.reverse();
    let result = world.resolve(&moved).unwrap();
    for (resolved, expected) in result
        .free_parameters
        .values()
        .iter()
        .zip(original.free_parameters.values().iter())
    {
        assert_relative_eq!(resolved, expected, epsilon = 1e-8);
    }
}

#[test]
fn test_parameter_solver_searches_origin_shifts() {
    let mut world = ToyWorld::rhombohedral('b');
    let structure = bi2te3_like();
    world.comparer = Box::new(FixedComparer {
        motion: Some(RigidMotion {
            basis_transformation: Matrix3::identity(),
            rotation: Matrix3::identity(),
            origin_shift: structure.cell.to_cartesian(&Vector3::from_element(0.5)),
        }),
    });
    let result = world.resolve(&structure).unwrap();
    assert_relative_eq!(result.internal_shift, Vector3::from_element(0.5));
    for (resolved, expected) in result.free_parameters.values().iter().zip(HR3_VALUES.iter()) {
        assert_relative_eq!(resolved, expected, epsilon = 1e-5);
    }
}

#[test]
fn test_parameter_solver_exhausted_shift_search() {
    let mut world = ToyWorld::rhombohedral('a');
    let structure = bi2te3_like();
    world.comparer = Box::new(FixedComparer {
        motion: Some(RigidMotion {
            basis_transformation: Matrix3::identity(),
            rotation: Matrix3::identity(),
            origin_shift: structure.cell.to_cartesian(&Vector3::from_element(0.1)),
        }),
    });
    match world.resolve(&structure) {
        Err(ResolutionError::ParameterResolutionFailure {
            unmatched_equation_sets,
            unmatched_orbits,
            ..
        }) => {
            assert_eq!(unmatched_equation_sets, vec![0]);
            assert_eq!(unmatched_orbits, vec![0]);
        }
        other => panic!("Unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_parameter_solver_space_group_mismatch() {
    let mut world = ToyWorld::rhombohedral('a');
    world.detector.space_group_number = 164;
    let err = world.resolve(&bi2te3_like()).unwrap_err();
    assert!(err.is_consistency_violation());
    assert!(matches!(
        err,
        ResolutionError::SpaceGroupMismatch {
            expected: 166,
            detected: 164,
            ..
        }
    ));
}

#[test]
fn test_parameter_solver_wyckoff_set_invariance() {
    let accepted = ToyWorld::rhombohedral('b').resolve(&bi2te3_like()).unwrap();
    for (resolved, expected) in accepted.free_parameters.values().iter().zip(HR3_VALUES.iter()) {
        assert_relative_eq!(resolved, expected, epsilon = 1e-5);
    }
    assert!(matches!(
        ToyWorld::rhombohedral('c').resolve(&bi2te3_like()),
        Err(ResolutionError::WyckoffInconsistency {
            label_letter: 'a',
            detected_letter: 'c',
            ..
        })
    ));
}

#[test]
fn test_parameter_solver_label_mismatch() {
    let mut world = ToyWorld::rhombohedral('a');
    world.designator.label = "AB2_hR3_166_b_c".to_string();
    assert!(matches!(
        world.resolve(&bi2te3_like()),
        Err(ResolutionError::LabelMismatch { .. })
    ));
    assert!(matches!(
        resolve_free_parameters(
            &bi2te3_like(),
            "AB2_hR3",
            world.capabilities(),
            &NoEquationCache,
            &PrototypeResolutionParams::default(),
        ),
        Err(ResolutionError::MalformedLabel(_))
    ));
}

#[test]
fn test_parameter_solver_external_failures() {
    let mut world = ToyWorld::rhombohedral('a');
    world.comparer = Box::new(FixedComparer { motion: None });
    let err = world.resolve(&bi2te3_like()).unwrap_err();
    assert!(matches!(err, ResolutionError::AlignmentFailure { .. }));
    assert!(err.is_external());

    world.builder = Box::new(PromotingBuilder);
    match world.resolve(&bi2te3_like()) {
        Err(ResolutionError::HigherSymmetryDetected {
            label,
            parameter_values,
        }) => {
            assert_eq!(label, "A_cF4_225_a");
            assert_eq!(parameter_values, vec![4.5]);
        }
        other => panic!("Unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_parameter_solver_parameter_count_mismatch() {
    let mut world = ToyWorld::rhombohedral('a');
    world.designator.internal_names = vec!["x2".to_string(), "x3".to_string()];
    world.designator.internal_guesses = vec![0.25, 0.1];
    world.builder = Box::new(EchoBuilder {
        structure: bi2te3_like(),
    });
    assert!(matches!(
        world.resolve(&bi2te3_like()),
        Err(ResolutionError::ParameterCountMismatch {
            expected: 3,
            found: 4
        })
    ));
}

#[test]
fn test_parameter_solver_match_orbits_reports_unmatched() {
    let label = parse_label(HR3_LABEL).unwrap();
    let generator = ToyEquationGenerator::new();
    let reference = toy_symmetry_reference();
    let eqn_sets = EquationBuilder::new(&generator, &reference, &NoEquationCache)
        .build(&label, &HR3_VALUES)
        .unwrap();
    let species_map = real_to_virtual_species_map(&["Bi".to_string(), "Te".to_string()]);
    let orbits = vec![
        EquivalentAtomSet {
            species: "Bi".to_string(),
            wyckoff_letter: 'a',
            positions: vec![Vector3::zeros()],
        },
        EquivalentAtomSet {
            species: "Te".to_string(),
            wyckoff_letter: 'c',
            positions: vec![Vector3::from_element(0.3), Vector3::from_element(0.7)],
        },
    ];
    let matching = match_orbits(&eqn_sets, &orbits, &species_map, 166, &reference, 1e-5).unwrap();
    assert!(matching.is_complete());
    assert_eq!(matching.internal.len(), 1);
    assert_relative_eq!(matching.internal[0].1, 0.3, epsilon = 1e-12);

    // Species swapped: nothing can match.
    let swapped = real_to_virtual_species_map(&["Te".to_string(), "Zn".to_string()]);
    let matching = match_orbits(&eqn_sets, &orbits, &swapped, 166, &reference, 1e-5).unwrap();
    assert_eq!(matching.unmatched_equation_sets, vec![0, 1]);
    assert_eq!(matching.unmatched_orbits, vec![0, 1]);
}

#[test]
fn test_parameter_solver_degenerate_site_is_a_non_match() {
    // A parameter that moves nothing: the least-squares system is rank-deficient.
    let eqn_set = EquivalentEqnSet {
        species: "A".to_string(),
        wyckoff_letter: 'a',
        param_names: vec![ParameterName::Internal { axis: 'x', index: 1 }],
        coeff_matrices: vec![DMatrix::zeros(3, 1)],
        const_vectors: vec![Vector3::zeros()],
    };
    let (solution, residual) = solve_site(&eqn_set, 0, &Vector3::from_element(0.3)).unwrap();
    assert_relative_eq!(solution[0], 0.0, epsilon = 1e-12);
    assert_relative_eq!(residual, 0.3 * 3f64.sqrt(), epsilon = 1e-12);
    assert!(solve_site(&eqn_set, 1, &Vector3::zeros()).is_none());

    let reference = toy_symmetry_reference();
    let species_map = real_to_virtual_species_map(&["Bi".to_string()]);
    let orbits = vec![EquivalentAtomSet {
        species: "Bi".to_string(),
        wyckoff_letter: 'a',
        positions: vec![Vector3::from_element(0.3)],
    }];
    let matching = match_orbits(
        &[eqn_set.clone()],
        &orbits,
        &species_map,
        166,
        &reference,
        1e-5,
    )
    .unwrap();
    assert_eq!(matching.unmatched_equation_sets, vec![0]);
    assert_eq!(matching.unmatched_orbits, vec![0]);

    let matching = match_orbits(
        &[eqn_set],
        &[EquivalentAtomSet {
            positions: vec![Vector3::zeros()],
            ..orbits[0].clone()
        }],
        &species_map,
        166,
        &reference,
        1e-5,
    )
    .unwrap();
    assert!(matching.is_complete());
    assert_relative_eq!(matching.internal[0].1, 0.0, epsilon = 1e-12);
}

#[test]
fn test_parameter_solver_driver() {
    let world = ToyWorld::rhombohedral('a');
    let dir = TempDir::new().unwrap();
    let save_name = dir.path().join("bi2te3").to_string_lossy().to_string();
    let params = PrototypeResolutionParams::builder()
        .write_orbits(true)
        .result_save_name(Some(save_name.clone()))
        .build()
        .unwrap();
    let structure = bi2te3_like();
    let cache = SharedEquationCache::new();
    let mut driver = PrototypeResolutionDriver::builder()
        .parameters(&params)
        .structure(&structure)
        .nominal_label(HR3_LABEL)
        .capabilities(world.capabilities())
        .cache(&cache)
        .build()
        .unwrap();
    assert!(driver.result().is_err());
    driver.run().unwrap();
    let result = driver.result().unwrap();
    assert_eq!(cache.len(), 1);
    assert!(result.to_string().contains("Matched orbits"));

    let saved: PrototypeResolutionResult =
        read_protomatch_binary(&save_name, ProtoMatchFileType::Res).unwrap();
    assert_eq!(saved.free_parameters, result.free_parameters);
}
