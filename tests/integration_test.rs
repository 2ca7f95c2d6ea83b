use std::fs;

use itertools::Itertools;

use protomatch::interfaces::moyo::{MoyoParams, MoyoSymmetryDetector};
use protomatch::interfaces::SymmetryDetector;
use protomatch::io::poscar::read_poscar;
use protomatch::parse_label;
use protomatch::prototype::label::{
    encode_wyckoff_run_length, expand_wyckoff_run_length, real_to_virtual_species_map,
    reduced_stoichiometry, space_group_numbers_are_enantiomorphic,
};

const ROOT: &str = env!("CARGO_MANIFEST_DIR");

#[test]
fn test_label_round_trip() {
    let label = parse_label("A2B3_hR5_166_c_ac").unwrap();
    assert_eq!(label.to_string(), "A2B3_hR5_166_c_ac");
    assert_eq!(label.space_group_number(), 166);
    assert_eq!(label.reduced_stoichiometry(), vec![2, 3]);
    assert_eq!(label.implied_atom_count(true).unwrap(), 5);
    assert_eq!(reduced_stoichiometry("A2B3_hR5_166_c_ac").unwrap(), vec![2, 3]);

    let expanded = expand_wyckoff_run_length("a2fg").unwrap();
    assert_eq!(expanded, "affg");
    assert_eq!(
        encode_wyckoff_run_length(&expanded.chars().collect_vec()),
        "a2fg"
    );

    assert!(parse_label("A2B3_hR5_166").is_err());
    assert!(space_group_numbers_are_enantiomorphic(212, 213));
    assert!(!space_group_numbers_are_enantiomorphic(212, 212));
}

#[test]
fn test_poscar_symmetry_matches_label() {
    let text = fs::read_to_string(format!("{ROOT}/tests/input/bi2te3.vasp")).unwrap();
    let structure = read_poscar(&text, None).unwrap();
    assert_eq!(structure.n_atoms(), 5);

    let species = structure.unique_species();
    let species_map = real_to_virtual_species_map(&species);
    assert_eq!(
        species_map,
        vec![
            ("Bi".to_string(), "A".to_string()),
            ("Te".to_string(), "B".to_string())
        ]
    );

    let label = parse_label("A2B3_hR5_166_c_ac").unwrap();
    let detector = MoyoSymmetryDetector::new(MoyoParams::default());
    let dataset = detector.detect(&structure).unwrap();
    assert_eq!(dataset.space_group_number, label.space_group_number());
    assert_eq!(dataset.orbits.iter().unique().count(), 3);
    assert_eq!(
        dataset.wyckoff_letters.iter().sorted().collect::<String>(),
        "acccc"
    );
}

#[test]
fn test_poscar_without_species_line() {
    let text = fs::read_to_string(format!("{ROOT}/tests/input/cu.vasp")).unwrap();
    assert!(read_poscar(&text, None).is_err());
    let structure = read_poscar(&text, Some(&["Cu".to_string()])).unwrap();
    let dataset = MoyoSymmetryDetector::new(MoyoParams::default())
        .detect(&structure)
        .unwrap();
    assert_eq!(dataset.space_group_number, 225);
    assert_eq!(dataset.wyckoff_letters, vec!['a']);
}
