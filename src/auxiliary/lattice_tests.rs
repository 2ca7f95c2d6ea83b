use approx::assert_relative_eq;
use nalgebra::Matrix3;

use crate::auxiliary::lattice::{
    change_of_basis_to_conventional, conventional_cell_parameters, expand_cell_parameters,
    primitive_cell_from_parameters, BravaisLattice, Centering, LatticeFamily,
};

#[test]
fn test_lattice_bravais_from_space_group() {
    let cases = [
        (1, "aP"),
        (12, "mC"),
        (14, "mP"),
        (38, "oA"),
        (63, "oC"),
        (69, "oF"),
        (71, "oI"),
        (62, "oP"),
        (139, "tI"),
        (129, "tP"),
        (166, "hR"),
        (194, "hP"),
        (225, "cF"),
        (229, "cI"),
        (221, "cP"),
    ];
    for (sg, symbol) in cases {
        assert_eq!(
            BravaisLattice::from_space_group(sg).unwrap().to_string(),
            symbol
        );
    }
    assert!(BravaisLattice::from_space_group(0).is_err());
    assert!(BravaisLattice::from_space_group(231).is_err());
}

#[test]
fn test_lattice_centering_divisors() {
    assert_eq!(Centering::P.divisor(), 1);
    assert_eq!(Centering::A.divisor(), 2);
    assert_eq!(Centering::R.divisor(), 3);
    assert_eq!(Centering::F.divisor(), 4);
}

#[test]
fn test_lattice_primitive_cell_volumes() {
    let cellpar = [3.0, 4.0, 5.0, 90.0, 90.0, 90.0];
    let of = BravaisLattice::new(LatticeFamily::Orthorhombic, Centering::F);
    let cell = primitive_cell_from_parameters(&of, &cellpar).unwrap();
    assert_relative_eq!(cell.volume(), 60.0 / 4.0, epsilon = 1e-10);

    let cf = BravaisLattice::new(LatticeFamily::Cubic, Centering::F);
    let cell = primitive_cell_from_parameters(&cf, &[4.0, 4.0, 4.0, 90.0, 90.0, 90.0]).unwrap();
    assert_relative_eq!(cell.volume(), 16.0, epsilon = 1e-10);
    let [a, b, c, alpha, beta, gamma] = cell.lengths_and_angles();
    assert_relative_eq!(a, 4.0 / 2.0f64.sqrt(), epsilon = 1e-10);
    assert_relative_eq!(b, a, epsilon = 1e-10);
    assert_relative_eq!(c, a, epsilon = 1e-10);
    assert_relative_eq!(alpha, 60.0, epsilon = 1e-8);
    assert_relative_eq!(beta, 60.0, epsilon = 1e-8);
    assert_relative_eq!(gamma, 60.0, epsilon = 1e-8);
}

#[test]
fn test_lattice_conventional_parameters_round_trip() {
    let cases: [(LatticeFamily, Centering, Vec<f64>); 8] = [
        (LatticeFamily::Cubic, Centering::F, vec![4.05]),
        (LatticeFamily::Cubic, Centering::I, vec![3.3]),
        (LatticeFamily::Tetragonal, Centering::I, vec![3.1, 1.7]),
        (LatticeFamily::Hexagonal, Centering::R, vec![3.2047217, 5.9412636 / 3.2047217]),
        (LatticeFamily::Orthorhombic, Centering::C, vec![3.0, 1.4, 1.9]),
        (LatticeFamily::Orthorhombic, Centering::A, vec![3.0, 1.4, 1.9]),
        (LatticeFamily::Orthorhombic, Centering::I, vec![3.0, 1.4, 1.9]),
        (LatticeFamily::Monoclinic, Centering::C, vec![5.0, 0.7, 1.2, 103.0]),
    ];
    for (family, centering, values) in cases {
        let lattice = BravaisLattice::new(family, centering);
        let cellpar = expand_cell_parameters(family, &values).unwrap();
        let cell = primitive_cell_from_parameters(&lattice, &cellpar).unwrap();
        let recovered = conventional_cell_parameters(&cell.lengths_and_angles(), &lattice).unwrap();
        assert_eq!(recovered.len(), values.len());
        for (x, y) in recovered.iter().zip(values.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-8);
        }
    }
}

#[test]
fn test_lattice_change_of_basis() {
    let cf = BravaisLattice::new(LatticeFamily::Cubic, Centering::F);
    let p = change_of_basis_to_conventional(&cf).unwrap();
    assert_relative_eq!(p.determinant(), 4.0, epsilon = 1e-10);
    assert_eq!(p, p.map(f64::round));

    let hr = BravaisLattice::new(LatticeFamily::Hexagonal, Centering::R);
    let p = change_of_basis_to_conventional(&hr).unwrap();
    assert_relative_eq!(p.determinant().abs(), 3.0, epsilon = 1e-10);

    let cp = BravaisLattice::new(LatticeFamily::Cubic, Centering::P);
    assert_eq!(change_of_basis_to_conventional(&cp).unwrap(), Matrix3::identity());
}

#[test]
fn test_lattice_inconsistent_primitive_cell() {
    let ti = BravaisLattice::new(LatticeFamily::Tetragonal, Centering::I);
    // An acute primitive angle cannot come from a body-centred tetragonal lattice.
    assert!(conventional_cell_parameters(&[3.0, 3.0, 3.0, 80.0, 80.0, 80.0], &ti).is_err());
    assert!(expand_cell_parameters(LatticeFamily::Hexagonal, &[3.0]).is_err());
}
