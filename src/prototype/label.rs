//! AFLOW prototype labels.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auxiliary::lattice::{
    cell_parameter_count, BravaisLattice, Centering, LatticeFamily,
};
use crate::prototype::parameters::ParameterName;
use crate::symmetry::symmetry_reference::{SymmetryReference, SymmetryReferenceError};

#[cfg(test)]
#[path = "label_tests.rs"]
mod label_tests;

lazy_static! {
    static ref STOICHIOMETRY_RE: Regex =
        Regex::new(r"^([A-Z])([0-9]*)").expect("Regex pattern invalid.");
    static ref PEARSON_RE: Regex =
        Regex::new(r"^([a-z])([A-Z])([0-9]+)$").expect("Regex pattern invalid.");
}

/// Pairs of enantiomorphic space groups.
const ENANTIOMORPHIC_PAIRS: [(u32, u32); 11] = [
    (76, 78),
    (91, 95),
    (92, 96),
    (144, 145),
    (151, 153),
    (152, 154),
    (169, 170),
    (171, 172),
    (178, 179),
    (180, 181),
    (212, 213),
];

// ================
// Error definition
// ================

/// Error for prototype labels that cannot be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedLabelError(pub String);

impl fmt::Display for MalformedLabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Malformed prototype label: {}.", self.0)
    }
}

impl Error for MalformedLabelError {}

// ==================
// Struct definitions
// ==================

/// The Pearson symbol of a prototype: lattice family, centring and atom count.
///
/// The atom count is per conventional cell, except for rhombohedral lattices where it is per
/// primitive rhombohedral cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PearsonSymbol {
    pub family: LatticeFamily,
    pub centering: Centering,
    pub atom_count: u32,
}

impl PearsonSymbol {
    /// Number of atoms in the conventional cell.
    pub fn conventional_atom_count(&self) -> u32 {
        if self.centering == Centering::R {
            self.atom_count * 3
        } else {
            self.atom_count
        }
    }
}

impl FromStr for PearsonSymbol {
    type Err = MalformedLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = PEARSON_RE
            .captures(s)
            .ok_or_else(|| MalformedLabelError(format!("invalid Pearson symbol `{s}`")))?;
        let family = caps[1]
            .chars()
            .next()
            .and_then(LatticeFamily::from_char)
            .ok_or_else(|| MalformedLabelError(format!("unknown lattice family in `{s}`")))?;
        let centering = caps[2]
            .chars()
            .next()
            .and_then(Centering::from_char)
            .ok_or_else(|| MalformedLabelError(format!("unknown centring in `{s}`")))?;
        let atom_count = caps[3]
            .parse::<u32>()
            .map_err(|_| MalformedLabelError(format!("invalid atom count in `{s}`")))?;
        if atom_count == 0 {
            return Err(MalformedLabelError(format!(
                "Pearson symbol `{s}` has no atoms"
            )));
        }
        Ok(Self {
            family,
            centering,
            atom_count,
        })
    }
}

impl fmt::Display for PearsonSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.family.as_char(),
            self.centering.as_char(),
            self.atom_count
        )
    }
}

/// A decoded prototype label such as `AB2_hR3_166_a_c`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrototypeLabel {
    /// Species slots (`A`, `B`, ...) with their reduced multiplicities.
    stoichiometry: Vec<(char, u32)>,

    pearson_symbol: PearsonSymbol,

    space_group_number: u32,

    /// Expanded Wyckoff letters, one sequence per species slot.
    wyckoff_sequences: Vec<Vec<char>>,
}

impl PrototypeLabel {
    pub fn stoichiometry(&self) -> &[(char, u32)] {
        &self.stoichiometry
    }

    pub fn pearson_symbol(&self) -> &PearsonSymbol {
        &self.pearson_symbol
    }

    pub fn space_group_number(&self) -> u32 {
        self.space_group_number
    }

    pub fn wyckoff_sequences(&self) -> &[Vec<char>] {
        &self.wyckoff_sequences
    }

    /// Virtual species names (`A`, `B`, ...) in slot order.
    pub fn virtual_species(&self) -> Vec<String> {
        self.stoichiometry
            .iter()
            .map(|(slot, _)| slot.to_string())
            .collect_vec()
    }

    /// Number of species slots.
    pub fn n_species(&self) -> usize {
        self.stoichiometry.len()
    }

    /// All Wyckoff letters in label order, flattened across species.
    pub fn flattened_wyckoff_letters(&self) -> Vec<char> {
        self.wyckoff_sequences.iter().flatten().copied().collect_vec()
    }

    /// Reduced multiplicity of each species slot.
    pub fn reduced_stoichiometry(&self) -> Vec<u32> {
        self.stoichiometry.iter().map(|(_, n)| *n).collect_vec()
    }

    /// Formal Bravais lattice of the label's space group (distinguishing `oA` from `oC`).
    pub fn bravais_lattice(&self) -> Result<BravaisLattice, SymmetryReferenceError> {
        BravaisLattice::from_space_group(self.space_group_number)
    }

    /// Number of lattice points in the conventional cell.
    pub fn centering_divisor(&self) -> u32 {
        self.pearson_symbol.centering.divisor()
    }

    /// Number of atoms implied by the Pearson symbol in the conventional or primitive cell.
    pub fn implied_atom_count(&self, primitive: bool) -> Result<u32, MalformedLabelError> {
        let conventional = self.pearson_symbol.conventional_atom_count();
        if !primitive {
            return Ok(conventional);
        }
        let divisor = self.centering_divisor();
        if conventional % divisor != 0 {
            return Err(MalformedLabelError(format!(
                "{conventional} atoms cannot be divided among {divisor} lattice points in `{self}`"
            )));
        }
        Ok(conventional / divisor)
    }

    /// Sums the Wyckoff multiplicities of the label's letters per conventional cell.
    pub fn wyckoff_atom_count<R>(&self, reference: &R) -> Result<u32, SymmetryReferenceError>
    where
        R: SymmetryReference + ?Sized,
    {
        self.flattened_wyckoff_letters()
            .iter()
            .map(|letter| reference.wyckoff_multiplicity(self.space_group_number, *letter))
            .sum()
    }

    /// Names of the cell parameters, which always lead the free-parameter vector.
    pub fn cell_parameter_names(&self) -> Vec<ParameterName> {
        let names: &[&str] = match self.pearson_symbol.family {
            LatticeFamily::Cubic => &["a"],
            LatticeFamily::Tetragonal | LatticeFamily::Hexagonal => &["a", "c/a"],
            LatticeFamily::Orthorhombic => &["a", "b/a", "c/a"],
            LatticeFamily::Monoclinic => &["a", "b/a", "c/a", "beta"],
            LatticeFamily::Triclinic => &["a", "b/a", "c/a", "alpha", "beta", "gamma"],
        };
        debug_assert_eq!(names.len(), cell_parameter_count(self.pearson_symbol.family));
        names
            .iter()
            .map(|name| ParameterName::Cell(name.to_string()))
            .collect_vec()
    }
}

impl FromStr for PrototypeLabel {
    type Err = MalformedLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sections = s.split('_').collect_vec();
        if sections.len() < 4 {
            return Err(MalformedLabelError(format!(
                "`{s}` has fewer than four `_`-separated sections"
            )));
        }
        let stoichiometry = parse_stoichiometry(sections[0])?;
        let pearson_symbol = sections[1].parse::<PearsonSymbol>()?;
        let space_group_number = sections[2]
            .parse::<u32>()
            .ok()
            .filter(|sg| (1..=230).contains(sg))
            .ok_or_else(|| {
                MalformedLabelError(format!("invalid space group number `{}`", sections[2]))
            })?;
        let wyckoff_sections = &sections[3..];
        if wyckoff_sections.len() != stoichiometry.len() {
            return Err(MalformedLabelError(format!(
                "`{s}` has {} Wyckoff sections for {} species",
                wyckoff_sections.len(),
                stoichiometry.len()
            )));
        }
        let wyckoff_sequences = wyckoff_sections
            .iter()
            .map(|section| {
                let expanded = expand_wyckoff_run_length(section)?;
                if expanded.is_empty() {
                    Err(MalformedLabelError(format!("empty Wyckoff section in `{s}`")))
                } else {
                    Ok(expanded.chars().collect_vec())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            stoichiometry,
            pearson_symbol,
            space_group_number,
            wyckoff_sequences,
        })
    }
}

impl fmt::Display for PrototypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formula = self
            .stoichiometry
            .iter()
            .map(|(slot, n)| {
                if *n == 1 {
                    slot.to_string()
                } else {
                    format!("{slot}{n}")
                }
            })
            .join("");
        let wyckoff = self
            .wyckoff_sequences
            .iter()
            .map(|letters| encode_wyckoff_run_length(letters))
            .join("_");
        write!(
            f,
            "{formula}_{}_{}_{wyckoff}",
            self.pearson_symbol, self.space_group_number
        )
    }
}

// =========
// Functions
// =========

/// Parses a prototype label.
pub fn parse_label(label: &str) -> Result<PrototypeLabel, MalformedLabelError> {
    label.parse()
}

fn parse_stoichiometry(formula: &str) -> Result<Vec<(char, u32)>, MalformedLabelError> {
    if formula.is_empty() || !formula.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(MalformedLabelError(format!(
            "invalid stoichiometric formula `{formula}`"
        )));
    }
    let mut stoichiometry = vec![];
    let mut rest = formula;
    while !rest.is_empty() {
        let caps = STOICHIOMETRY_RE.captures(rest).ok_or_else(|| {
            MalformedLabelError(format!("invalid stoichiometric formula `{formula}`"))
        })?;
        let slot = caps[1]
            .chars()
            .next()
            .ok_or_else(|| MalformedLabelError(format!("empty species slot in `{formula}`")))?;
        let count = if caps[2].is_empty() {
            1
        } else {
            caps[2].parse::<u32>().map_err(|_| {
                MalformedLabelError(format!("invalid multiplicity in `{formula}`"))
            })?
        };
        if count == 0 {
            return Err(MalformedLabelError(format!(
                "zero multiplicity in `{formula}`"
            )));
        }
        let expected_slot = (b'A' + stoichiometry.len() as u8) as char;
        if slot != expected_slot {
            return Err(MalformedLabelError(format!(
                "species slot `{slot}` found where `{expected_slot}` was expected in `{formula}`"
            )));
        }
        stoichiometry.push((slot, count));
        rest = &rest[caps[0].len()..];
    }
    Ok(stoichiometry)
}

/// Parses the reduced multiplicity of each species slot from the leading formula of a label.
pub fn reduced_stoichiometry(label: &str) -> Result<Vec<u32>, MalformedLabelError> {
    let formula = label.split('_').next().unwrap_or_default();
    Ok(parse_stoichiometry(formula)?
        .into_iter()
        .map(|(_, n)| n)
        .collect_vec())
}

/// Expands a run-length-encoded Wyckoff section, e.g. `ef2h2kl` into `efhhkkl`.
///
/// # Arguments
///
/// * `section` - A Wyckoff section of a prototype label. A letter without a preceding count occurs
/// once.
///
/// # Returns
///
/// The expanded letters, or an error if a count is not followed by a letter or the section
/// contains anything other than digits and letters.
pub fn expand_wyckoff_run_length(section: &str) -> Result<String, MalformedLabelError> {
    let mut expanded = String::new();
    let mut pending: Option<usize> = None;
    for c in section.chars() {
        if let Some(d) = c.to_digit(10) {
            let count = pending.unwrap_or(0) * 10 + d as usize;
            pending = Some(count);
        } else if c.is_ascii_lowercase() || c == 'A' {
            match pending.take() {
                Some(0) => {
                    return Err(MalformedLabelError(format!(
                        "zero count in Wyckoff section `{section}`"
                    )))
                }
                Some(n) => expanded.extend(std::iter::repeat(c).take(n)),
                None => expanded.push(c),
            }
        } else {
            return Err(MalformedLabelError(format!(
                "invalid character `{c}` in Wyckoff section `{section}`"
            )));
        }
    }
    if pending.is_some() {
        return Err(MalformedLabelError(format!(
            "dangling count at the end of Wyckoff section `{section}`"
        )));
    }
    Ok(expanded)
}

/// Compresses consecutive repeated letters back into the run-length form used by labels.
pub fn encode_wyckoff_run_length(letters: &[char]) -> String {
    letters
        .iter()
        .group_by(|c| **c)
        .into_iter()
        .map(|(c, group)| match group.count() {
            1 => c.to_string(),
            n => format!("{n}{c}"),
        })
        .join("")
}

/// Checks whether two space groups form an enantiomorphic pair.
pub fn space_group_numbers_are_enantiomorphic(sg_1: u32, sg_2: u32) -> bool {
    ENANTIOMORPHIC_PAIRS
        .iter()
        .any(|&(x, y)| (sg_1, sg_2) == (x, y) || (sg_1, sg_2) == (y, x))
}

/// Checks whether two labels describe the same prototype.
///
/// Stoichiometry and Pearson symbols must agree, and the space groups must be equal (or
/// enantiomorphic if allowed). For space groups above 16 the expanded Wyckoff letters must be
/// identical; for triclinic and monoclinic groups letters only need to share Wyckoff sets,
/// position by position, as AFLOW's choice between them is arbitrary.
pub fn labels_are_equivalent<R>(
    label_1: &PrototypeLabel,
    label_2: &PrototypeLabel,
    allow_enantiomorph: bool,
    reference: &R,
) -> Result<bool, SymmetryReferenceError>
where
    R: SymmetryReference + ?Sized,
{
    if label_1 == label_2 {
        return Ok(true);
    }
    if label_1.stoichiometry != label_2.stoichiometry
        || label_1.pearson_symbol != label_2.pearson_symbol
    {
        return Ok(false);
    }
    let sg_1 = label_1.space_group_number;
    let sg_2 = label_2.space_group_number;
    if sg_1 != sg_2 && !(allow_enantiomorph && space_group_numbers_are_enantiomorphic(sg_1, sg_2))
    {
        return Ok(false);
    }
    let letters_1 = label_1.flattened_wyckoff_letters();
    let letters_2 = label_2.flattened_wyckoff_letters();
    if label_1.wyckoff_sequences.iter().map(Vec::len).collect_vec()
        != label_2.wyckoff_sequences.iter().map(Vec::len).collect_vec()
    {
        return Ok(false);
    }
    let equivalent = if sg_1 > 16 {
        letters_1 == letters_2
    } else {
        letters_1
            .iter()
            .zip(letters_2.iter())
            .map(|(l1, l2)| reference.are_in_same_wyckoff_set(*l1, *l2, sg_1))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .all(|same| same)
    };
    if equivalent {
        log::warn!("Labels {label_1} and {label_2} differ textually but are equivalent.");
    }
    Ok(equivalent)
}

/// Maps real species to AFLOW virtual species: alphabetised real species become `A`, `B`, ....
pub fn real_to_virtual_species_map(species: &[String]) -> Vec<(String, String)> {
    species
        .iter()
        .sorted()
        .dedup()
        .enumerate()
        .map(|(i, sp)| (sp.clone(), ((b'A' + i as u8) as char).to_string()))
        .collect_vec()
}
