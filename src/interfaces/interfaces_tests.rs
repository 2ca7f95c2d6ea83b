use crate::interfaces::{EquationResponse, ExternalToolError, SymmetryDataset};
use crate::testing::HR3_166_EQUATIONS;

#[test]
fn test_interfaces_equation_poscar_parsing() {
    let response = EquationResponse::from_equation_poscar(HR3_166_EQUATIONS).unwrap();
    assert_eq!(response.lines.len(), 3);
    assert_eq!(response.lines[0].species, "A");
    assert_eq!(response.lines[1].expressions[0], "x2");
    assert_eq!(response.lines[2].expressions[2], "-x2");
    assert_eq!(response.lines[2].species, "B");
}

#[test]
fn test_interfaces_equation_poscar_malformed() {
    let header = "title\n1.0\n1 0 0\n0 1 0\n0 0 1\n1\nDirect\n";
    assert!(matches!(
        EquationResponse::from_equation_poscar(header),
        Err(ExternalToolError::MalformedResponse(_))
    ));
    let bad = format!("{header}x2 x2 A\n");
    assert!(matches!(
        EquationResponse::from_equation_poscar(&bad),
        Err(ExternalToolError::MalformedResponse(_))
    ));
}

#[test]
fn test_interfaces_symmetry_dataset_validation() {
    let dataset = SymmetryDataset {
        space_group_number: 225,
        orbits: vec![0, 0, 0, 0],
        wyckoff_letters: vec!['a'; 4],
    };
    assert!(dataset.validate(4).is_ok());
    assert!(dataset.validate(1).is_err());
}

#[test]
fn test_interfaces_external_tool_error_display() {
    let err = ExternalToolError::NonZeroExit {
        command: "aflow --proto=A_cF4_225_a".to_string(),
        status: Some(1),
        stderr: "bad\n".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "External tool `aflow --proto=A_cF4_225_a` exited with status 1: bad"
    );
}
