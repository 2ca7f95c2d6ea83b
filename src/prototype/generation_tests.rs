use approx::assert_relative_eq;
use nalgebra::Vector3;

use crate::interfaces::EquationResponse;
use crate::prototype::equations::partition_equation_lines;
use crate::prototype::generation::{build_structure_from_equations, parameter_vector_for_label};
use crate::prototype::label::parse_label;
use crate::prototype::ResolutionError;
use crate::testing::{toy_symmetry_reference, CF4_225_EQUATIONS, HR3_166_EQUATIONS};

#[test]
fn test_generation_rhombohedral_structure() {
    let label = parse_label("AB2_hR3_166_a_c").unwrap();
    let response = EquationResponse::from_equation_poscar(HR3_166_EQUATIONS).unwrap();
    let eqn_sets =
        partition_equation_lines(&label, &response.lines, &toy_symmetry_reference()).unwrap();
    let parameters =
        parameter_vector_for_label(&label, &eqn_sets, &[3.2047217, 5.9412636, 0.24969054]).unwrap();
    assert_eq!(
        parameters.names().iter().map(|n| n.to_string()).collect::<Vec<_>>(),
        vec!["a", "c/a", "x2"]
    );

    let species = vec!["Bi".to_string(), "Te".to_string()];
    let structure = build_structure_from_equations(&species, &label, &eqn_sets, &parameters).unwrap();
    assert_eq!(structure.n_atoms(), 3);
    assert_eq!(structure.sites[0].species, "Bi");
    assert_eq!(structure.sites[1].species, "Te");
    assert_relative_eq!(
        structure.sites[1].position,
        Vector3::from_element(0.24969054),
        epsilon = 1e-12
    );
    assert_relative_eq!(
        structure.sites[2].position,
        Vector3::from_element(1.0 - 0.24969054),
        epsilon = 1e-12
    );

    // The rhombohedral cell reproduces the hexagonal a and c.
    let a: f64 = 3.2047217;
    let c = a * 5.9412636;
    let cellpar = structure.cell.lengths_and_angles();
    let rhombohedral_length = (a * a / 3.0 + c * c / 9.0).sqrt();
    assert_relative_eq!(cellpar[0], rhombohedral_length, epsilon = 1e-10);
    assert_relative_eq!(cellpar[3], cellpar[4], epsilon = 1e-10);
    assert_relative_eq!(structure.cell.volume(), 3f64.sqrt() / 2.0 * a * a * c / 3.0, epsilon = 1e-8);
}

#[test]
fn test_generation_parameter_count_mismatch() {
    let label = parse_label("A_cF4_225_a").unwrap();
    let response = EquationResponse::from_equation_poscar(CF4_225_EQUATIONS).unwrap();
    let eqn_sets =
        partition_equation_lines(&label, &response.lines, &toy_symmetry_reference()).unwrap();
    assert!(matches!(
        parameter_vector_for_label(&label, &eqn_sets, &[3.6, 0.1]),
        Err(ResolutionError::ParameterCountMismatch {
            expected: 1,
            found: 2
        })
    ));
}

#[test]
fn test_generation_species_count_mismatch() {
    let label = parse_label("A_cF4_225_a").unwrap();
    let response = EquationResponse::from_equation_poscar(CF4_225_EQUATIONS).unwrap();
    let eqn_sets =
        partition_equation_lines(&label, &response.lines, &toy_symmetry_reference()).unwrap();
    let parameters = parameter_vector_for_label(&label, &eqn_sets, &[3.6]).unwrap();
    let species = vec!["Cu".to_string(), "Au".to_string()];
    assert!(matches!(
        build_structure_from_equations(&species, &label, &eqn_sets, &parameters),
        Err(ResolutionError::SpeciesCountMismatch { .. })
    ));
    let structure =
        build_structure_from_equations(&species[..1], &label, &eqn_sets, &parameters).unwrap();
    assert_relative_eq!(structure.cell.volume(), 3.6f64.powi(3) / 4.0, epsilon = 1e-10);
}
