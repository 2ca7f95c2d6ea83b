//! Read-only crystallographic reference data keyed by space-group number.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::format_err;
use derive_builder::Builder;
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::auxiliary::lattice::BravaisLattice;
use crate::auxiliary::structure::Cell;
use crate::symmetry::symmetry_operation::{cartesian_to_fractional_rotation, SpaceGroupOperation};

#[cfg(test)]
#[path = "symmetry_reference_tests.rs"]
mod symmetry_reference_tests;

/// File names of the JSON tables read by [`TabulatedSymmetryReference::from_json_dir`].
pub const WYCKOFF_MULTIPLICITIES_FILE: &str = "wyckoff_multiplicities.json";
pub const WYCKOFF_SETS_FILE: &str = "wyckoff_sets.json";
pub const POSSIBLE_PRIMITIVE_SHIFTS_FILE: &str = "possible_primitive_shifts.json";
pub const PRIMITIVE_GENPOS_OPS_FILE: &str = "primitive_GENPOS_ops.json";

// ================
// Error definition
// ================

/// Error for lookups that the reference tables cannot answer.
#[derive(Debug, Clone)]
pub struct SymmetryReferenceError(pub String);

impl fmt::Display for SymmetryReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symmetry reference error: {}.", self.0)
    }
}

impl Error for SymmetryReferenceError {}

fn check_space_group(sg: u32) -> Result<(), SymmetryReferenceError> {
    if (1..=230).contains(&sg) {
        Ok(())
    } else {
        Err(SymmetryReferenceError(format!(
            "space group number {sg} is outside [1, 230]"
        )))
    }
}

// =================
// Trait definitions
// =================

/// Lookup capability for Wyckoff multiplicities, Wyckoff sets, primitive shifts and general
/// position operations.
///
/// All quantities refer to the settings of the AFLOW prototype library: multiplicities per
/// conventional cell and operations in the standard primitive basis.
pub trait SymmetryReference {
    /// Multiplicity of a Wyckoff position per conventional cell.
    fn wyckoff_multiplicity(&self, sg: u32, letter: char) -> Result<u32, SymmetryReferenceError>;

    /// Partition of the space group's Wyckoff letters into Wyckoff sets.
    fn wyckoff_sets(&self, sg: u32) -> Result<Vec<Vec<char>>, SymmetryReferenceError>;

    /// Translations of normaliser operations that do not leave the primitive cell, in the
    /// primitive basis.
    fn possible_primitive_shifts(&self, sg: u32)
        -> Result<Vec<Vector3<f64>>, SymmetryReferenceError>;

    /// General-position operations in the primitive basis.
    fn primitive_operations(
        &self,
        sg: u32,
    ) -> Result<Vec<SpaceGroupOperation>, SymmetryReferenceError>;

    /// Number of lattice points in the conventional cell of the space group.
    fn centering_divisor(&self, sg: u32) -> Result<u32, SymmetryReferenceError> {
        Ok(BravaisLattice::from_space_group(sg)?.centering.divisor())
    }

    /// Multiplicity of a Wyckoff position per primitive cell.
    fn primitive_wyckoff_multiplicity(
        &self,
        sg: u32,
        letter: char,
    ) -> Result<usize, SymmetryReferenceError> {
        let conventional = self.wyckoff_multiplicity(sg, letter)?;
        let divisor = self.centering_divisor(sg)?;
        if conventional % divisor != 0 {
            return Err(SymmetryReferenceError(format!(
                "multiplicity {conventional} of Wyckoff position {letter} in space group {sg} \
                 is not divisible by the centring divisor {divisor}"
            )));
        }
        usize::try_from(conventional / divisor)
            .map_err(|err| SymmetryReferenceError(err.to_string()))
    }

    /// Checks whether two Wyckoff letters belong to the same Wyckoff set.
    fn are_in_same_wyckoff_set(
        &self,
        letter_1: char,
        letter_2: char,
        sg: u32,
    ) -> Result<bool, SymmetryReferenceError> {
        Ok(self
            .wyckoff_sets(sg)?
            .iter()
            .find(|wyckoff_set| wyckoff_set.contains(&letter_1))
            .map(|wyckoff_set| wyckoff_set.contains(&letter_2))
            .unwrap_or(false))
    }

    /// Distinct rotational parts of the primitive general-position operations, i.e. the point
    /// group in the primitive basis.
    fn point_group_rotations(&self, sg: u32) -> Result<Vec<Matrix3<f64>>, SymmetryReferenceError> {
        let mut rotations: Vec<Matrix3<f64>> = vec![];
        for op in self.primitive_operations(sg)? {
            if !rotations
                .iter()
                .any(|w| (w - op.rotation).amax() < 1e-8)
            {
                rotations.push(op.rotation);
            }
        }
        Ok(rotations)
    }
}

/// Checks whether a Cartesian rotation belongs to the point group of a space group.
///
/// # Arguments
///
/// * `rotation` - Cartesian rotation matrix acting on column vectors.
/// * `sg` - Space group number.
/// * `cell` - Primitive cell in the standard setting of the prototype library.
/// * `reference` - Source of the primitive general-position operations.
/// * `tolerance` - Absolute tolerance on each element of the fractional rotation.
pub fn cartesian_rotation_is_in_point_group<R>(
    rotation: &Matrix3<f64>,
    sg: u32,
    cell: &Cell,
    reference: &R,
    tolerance: f64,
) -> Result<bool, SymmetryReferenceError>
where
    R: SymmetryReference + ?Sized,
{
    let fractional = cartesian_to_fractional_rotation(rotation, cell)
        .ok_or_else(|| SymmetryReferenceError("singular cell".to_string()))?;
    Ok(reference
        .point_group_rotations(sg)?
        .iter()
        .any(|w| (w - fractional).amax() < tolerance))
}

// ==================
// Struct definitions
// ==================

/// A Wyckoff set as stored on disk: either a list of letters or a single string of letters.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawWyckoffSet {
    Letters(Vec<String>),
    Joined(String),
}

impl RawWyckoffSet {
    fn letters(self) -> Vec<char> {
        match self {
            Self::Letters(letters) => letters.iter().flat_map(|s| s.chars()).collect_vec(),
            Self::Joined(joined) => joined.chars().collect_vec(),
        }
    }
}

/// A [`SymmetryReference`] backed by in-memory tables.
#[derive(Clone, Debug, Default, Builder)]
pub struct TabulatedSymmetryReference {
    /// Conventional-cell multiplicities, keyed by space group then letter.
    #[builder(default)]
    wyckoff_multiplicities: HashMap<u32, HashMap<char, u32>>,

    #[builder(default)]
    wyckoff_sets: HashMap<u32, Vec<Vec<char>>>,

    #[builder(default)]
    possible_primitive_shifts: HashMap<u32, Vec<Vector3<f64>>>,

    #[builder(default)]
    primitive_operations: HashMap<u32, Vec<SpaceGroupOperation>>,
}

impl TabulatedSymmetryReference {
    /// Returns a builder to construct a [`TabulatedSymmetryReference`] structure.
    pub fn builder() -> TabulatedSymmetryReferenceBuilder {
        TabulatedSymmetryReferenceBuilder::default()
    }

    /// Loads the reference tables from a directory containing the four JSON files
    /// [`WYCKOFF_MULTIPLICITIES_FILE`], [`WYCKOFF_SETS_FILE`], [`POSSIBLE_PRIMITIVE_SHIFTS_FILE`] and
    /// [`PRIMITIVE_GENPOS_OPS_FILE`], each keyed by space-group numbers given as strings.
    pub fn from_json_dir<P: AsRef<Path>>(dir: P) -> Result<Self, anyhow::Error> {
        let dir = dir.as_ref();
        let multiplicities: HashMap<String, HashMap<String, u32>> =
            read_json(dir.join(WYCKOFF_MULTIPLICITIES_FILE))?;
        let sets: HashMap<String, Vec<RawWyckoffSet>> = read_json(dir.join(WYCKOFF_SETS_FILE))?;
        let shifts: HashMap<String, Vec<[f64; 3]>> =
            read_json(dir.join(POSSIBLE_PRIMITIVE_SHIFTS_FILE))?;
        let operations: HashMap<String, Vec<SpaceGroupOperation>> =
            read_json(dir.join(PRIMITIVE_GENPOS_OPS_FILE))?;

        let wyckoff_multiplicities = multiplicities
            .into_iter()
            .map(|(sg, table)| {
                let table = table
                    .into_iter()
                    .map(|(letter, mult)| Ok((single_letter(&letter)?, mult)))
                    .collect::<Result<HashMap<_, _>, anyhow::Error>>()?;
                Ok((parse_space_group_key(&sg)?, table))
            })
            .collect::<Result<HashMap<_, _>, anyhow::Error>>()?;
        let wyckoff_sets = sets
            .into_iter()
            .map(|(sg, sets)| {
                Ok((
                    parse_space_group_key(&sg)?,
                    sets.into_iter().map(RawWyckoffSet::letters).collect_vec(),
                ))
            })
            .collect::<Result<HashMap<_, _>, anyhow::Error>>()?;
        let possible_primitive_shifts = shifts
            .into_iter()
            .map(|(sg, shifts)| {
                Ok((
                    parse_space_group_key(&sg)?,
                    shifts.into_iter().map(Vector3::from).collect_vec(),
                ))
            })
            .collect::<Result<HashMap<_, _>, anyhow::Error>>()?;
        let primitive_operations = operations
            .into_iter()
            .map(|(sg, ops)| Ok((parse_space_group_key(&sg)?, ops)))
            .collect::<Result<HashMap<_, _>, anyhow::Error>>()?;

        log::debug!(
            "Loaded symmetry reference tables for {} space groups from {}.",
            wyckoff_multiplicities.len(),
            dir.display()
        );
        Ok(Self {
            wyckoff_multiplicities,
            wyckoff_sets,
            possible_primitive_shifts,
            primitive_operations,
        })
    }

    fn missing(table: &str, sg: u32) -> SymmetryReferenceError {
        SymmetryReferenceError(format!("no {table} tabulated for space group {sg}"))
    }
}

impl SymmetryReference for TabulatedSymmetryReference {
    fn wyckoff_multiplicity(&self, sg: u32, letter: char) -> Result<u32, SymmetryReferenceError> {
        check_space_group(sg)?;
        self.wyckoff_multiplicities
            .get(&sg)
            .ok_or_else(|| Self::missing("Wyckoff multiplicities", sg))?
            .get(&letter)
            .copied()
            .ok_or_else(|| {
                SymmetryReferenceError(format!(
                    "space group {sg} has no Wyckoff position {letter}"
                ))
            })
    }

    fn wyckoff_sets(&self, sg: u32) -> Result<Vec<Vec<char>>, SymmetryReferenceError> {
        check_space_group(sg)?;
        self.wyckoff_sets
            .get(&sg)
            .cloned()
            .ok_or_else(|| Self::missing("Wyckoff sets", sg))
    }

    fn possible_primitive_shifts(
        &self,
        sg: u32,
    ) -> Result<Vec<Vector3<f64>>, SymmetryReferenceError> {
        check_space_group(sg)?;
        self.possible_primitive_shifts
            .get(&sg)
            .cloned()
            .ok_or_else(|| Self::missing("primitive shifts", sg))
    }

    fn primitive_operations(
        &self,
        sg: u32,
    ) -> Result<Vec<SpaceGroupOperation>, SymmetryReferenceError> {
        check_space_group(sg)?;
        self.primitive_operations
            .get(&sg)
            .cloned()
            .ok_or_else(|| Self::missing("general-position operations", sg))
    }
}

fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, anyhow::Error> {
    let path = path.as_ref();
    let reader = BufReader::new(
        File::open(path).map_err(|err| format_err!("Unable to open {}: {err}", path.display()))?,
    );
    serde_json::from_reader(reader)
        .map_err(|err| format_err!("Unable to parse {}: {err}", path.display()))
}

fn parse_space_group_key(key: &str) -> Result<u32, anyhow::Error> {
    let sg = key
        .trim()
        .parse::<u32>()
        .map_err(|_| format_err!("Invalid space-group key `{key}`."))?;
    check_space_group(sg)?;
    Ok(sg)
}

fn single_letter(key: &str) -> Result<char, anyhow::Error> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() || c == 'A' => Ok(c),
        _ => Err(format_err!("Invalid Wyckoff letter `{key}`.")),
    }
}
