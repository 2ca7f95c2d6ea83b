use approx::assert_relative_eq;
use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::auxiliary::structure::Cell;
use crate::symmetry::symmetry_operation::{
    cartesian_to_fractional_rotation, unique_internal_translations, SpaceGroupOperation,
};

#[test]
fn test_symmetry_operation_deserialise_rows() {
    let json = r#"{"W": [[0, -1, 0], [1, -1, 0], [0, 0, 1]], "w": [0.0, 0.0, 0.5]}"#;
    let op: SpaceGroupOperation = serde_json::from_str(json).unwrap();
    assert_eq!(op.rotation[(0, 1)], -1.0);
    assert_eq!(op.rotation[(1, 0)], 1.0);
    assert_eq!(op.translation, Vector3::new(0.0, 0.0, 0.5));
    assert_eq!(op.to_string(), "(-y, x-y, z+0.5000)");

    let back = serde_json::to_string(&op).unwrap();
    let again: SpaceGroupOperation = serde_json::from_str(&back).unwrap();
    assert_eq!(again, op);
}

#[test]
fn test_symmetry_operation_fractional_rotation_hexagonal() {
    let cell = Cell::from_lengths_and_angles(&[3.0, 3.0, 5.0, 90.0, 90.0, 120.0]).unwrap();
    let sixfold = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_3);
    let w = cartesian_to_fractional_rotation(sixfold.matrix(), &cell).unwrap();
    assert_relative_eq!(w, w.map(f64::round), epsilon = 1e-10);
    assert_relative_eq!(w.determinant(), 1.0, epsilon = 1e-10);

    let op = SpaceGroupOperation::new(w.map(f64::round), Vector3::zeros());
    let a = cell.vector(0);
    let rotated_a = cell.to_fractional(&(sixfold * a)).unwrap();
    assert_relative_eq!(op.apply(&Vector3::x()), rotated_a, epsilon = 1e-10);
}

#[test]
fn test_symmetry_operation_fractional_rotation_generic_is_not_integral() {
    let cell = Cell::from_lengths_and_angles(&[3.0, 3.0, 5.0, 90.0, 90.0, 120.0]).unwrap();
    let fourfold = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
    let w = cartesian_to_fractional_rotation(fourfold.matrix(), &cell).unwrap();
    assert!((w - w.map(f64::round)).amax() > 1e-3);
    assert_ne!(w, Matrix3::identity());
}

#[test]
fn test_symmetry_operation_unique_internal_translations() {
    let translations = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(0.5, 0.5, 0.5),
        Vector3::new(-0.5, 0.5, 1.5),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.25, 0.0, 0.0),
        Vector3::new(0.25 + 1e-6, -1.0, 0.0),
    ];
    let unique = unique_internal_translations(translations.iter(), 1e-4);
    assert_eq!(unique.len(), 2);
    assert_relative_eq!(unique[0], Vector3::new(0.5, 0.5, 0.5));
    assert_relative_eq!(unique[1], Vector3::new(0.25, 0.0, 0.0));
}
