//! Bravais lattices and the standard primitive cells used by the prototype library.

use std::fmt;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::auxiliary::structure::{Cell, StructureError};
use crate::symmetry::symmetry_reference::SymmetryReferenceError;

#[cfg(test)]
#[path = "lattice_tests.rs"]
mod lattice_tests;

const C_CENTRED_ORTHORHOMBIC_GROUPS: [u32; 11] = [20, 21, 35, 36, 37, 63, 64, 65, 66, 67, 68];
const A_CENTRED_ORTHORHOMBIC_GROUPS: [u32; 4] = [38, 39, 40, 41];
const F_CENTRED_ORTHORHOMBIC_GROUPS: [u32; 5] = [22, 42, 43, 69, 70];
const I_CENTRED_ORTHORHOMBIC_GROUPS: [u32; 9] = [23, 24, 44, 45, 46, 71, 72, 73, 74];
const C_CENTRED_MONOCLINIC_GROUPS: [u32; 5] = [5, 8, 9, 12, 15];
const I_CENTRED_TETRAGONAL_GROUPS: [u32; 19] = [
    79, 80, 82, 87, 88, 97, 98, 107, 108, 109, 110, 119, 120, 121, 122, 139, 140, 141, 142,
];
const RHOMBOHEDRAL_GROUPS: [u32; 7] = [146, 148, 155, 160, 161, 166, 167];
const F_CENTRED_CUBIC_GROUPS: [u32; 11] = [196, 202, 203, 209, 210, 216, 219, 225, 226, 227, 228];
const I_CENTRED_CUBIC_GROUPS: [u32; 10] = [197, 199, 204, 206, 211, 214, 217, 220, 229, 230];

// =================
// Enum definitions
// =================

/// Crystal families as encoded by the first letter of a Pearson symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LatticeFamily {
    Triclinic,
    Monoclinic,
    Orthorhombic,
    Tetragonal,
    Hexagonal,
    Cubic,
}

impl LatticeFamily {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'a' => Some(Self::Triclinic),
            'm' => Some(Self::Monoclinic),
            'o' => Some(Self::Orthorhombic),
            't' => Some(Self::Tetragonal),
            'h' => Some(Self::Hexagonal),
            'c' => Some(Self::Cubic),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Triclinic => 'a',
            Self::Monoclinic => 'm',
            Self::Orthorhombic => 'o',
            Self::Tetragonal => 't',
            Self::Hexagonal => 'h',
            Self::Cubic => 'c',
        }
    }

    /// Returns the family of a space group.
    pub fn from_space_group(sg: u32) -> Result<Self, SymmetryReferenceError> {
        match sg {
            1..=2 => Ok(Self::Triclinic),
            3..=15 => Ok(Self::Monoclinic),
            16..=74 => Ok(Self::Orthorhombic),
            75..=142 => Ok(Self::Tetragonal),
            143..=194 => Ok(Self::Hexagonal),
            195..=230 => Ok(Self::Cubic),
            _ => Err(SymmetryReferenceError(format!(
                "space group number {sg} is outside [1, 230]"
            ))),
        }
    }
}

/// Lattice centring as encoded by the second letter of a Pearson symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Centering {
    P,
    C,
    A,
    I,
    F,
    R,
}

impl Centering {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'P' => Some(Self::P),
            'C' => Some(Self::C),
            'A' => Some(Self::A),
            'I' => Some(Self::I),
            'F' => Some(Self::F),
            'R' => Some(Self::R),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::P => 'P',
            Self::C => 'C',
            Self::A => 'A',
            Self::I => 'I',
            Self::F => 'F',
            Self::R => 'R',
        }
    }

    /// Returns the number of lattice points in the conventional cell.
    pub fn divisor(&self) -> u32 {
        match self {
            Self::P => 1,
            Self::C | Self::A | Self::I => 2,
            Self::R => 3,
            Self::F => 4,
        }
    }
}

// ==================
// Struct definitions
// ==================

/// One of the fifteen formal Bravais lattices, i.e. the fourteen Bravais lattices with `oA`
/// distinguished from `oC`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BravaisLattice {
    pub family: LatticeFamily,
    pub centering: Centering,
}

impl BravaisLattice {
    pub fn new(family: LatticeFamily, centering: Centering) -> Self {
        Self { family, centering }
    }

    /// Determines the formal Bravais lattice of a space group.
    pub fn from_space_group(sg: u32) -> Result<Self, SymmetryReferenceError> {
        let family = LatticeFamily::from_space_group(sg)?;
        let centering = match family {
            LatticeFamily::Triclinic => Centering::P,
            LatticeFamily::Monoclinic if C_CENTRED_MONOCLINIC_GROUPS.contains(&sg) => Centering::C,
            LatticeFamily::Orthorhombic if C_CENTRED_ORTHORHOMBIC_GROUPS.contains(&sg) => {
                Centering::C
            }
            LatticeFamily::Orthorhombic if A_CENTRED_ORTHORHOMBIC_GROUPS.contains(&sg) => {
                Centering::A
            }
            LatticeFamily::Orthorhombic if F_CENTRED_ORTHORHOMBIC_GROUPS.contains(&sg) => {
                Centering::F
            }
            LatticeFamily::Orthorhombic if I_CENTRED_ORTHORHOMBIC_GROUPS.contains(&sg) => {
                Centering::I
            }
            LatticeFamily::Tetragonal if I_CENTRED_TETRAGONAL_GROUPS.contains(&sg) => Centering::I,
            LatticeFamily::Hexagonal if RHOMBOHEDRAL_GROUPS.contains(&sg) => Centering::R,
            LatticeFamily::Cubic if F_CENTRED_CUBIC_GROUPS.contains(&sg) => Centering::F,
            LatticeFamily::Cubic if I_CENTRED_CUBIC_GROUPS.contains(&sg) => Centering::I,
            _ => Centering::P,
        };
        Ok(Self::new(family, centering))
    }

    /// Returns the primitive lattice of the same family, whose cell is the conventional cell of
    /// this lattice.
    pub fn conventional(&self) -> Self {
        Self::new(self.family, Centering::P)
    }

    pub fn is_primitive(&self) -> bool {
        self.centering == Centering::P
    }
}

impl fmt::Display for BravaisLattice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.family.as_char(), self.centering.as_char())
    }
}

// =========
// Functions
// =========

/// Constructs the standard primitive cell of a formal Bravais lattice.
///
/// The cells follow Mehl *et al.*, *Comput. Mater. Sci.* **136**, S1 (2017), with rows being the
/// lattice vectors. Only the parameters relevant to the lattice are read; e.g. a cubic lattice
/// only uses `a`.
///
/// # Arguments
///
/// * `lattice` - The formal Bravais lattice.
/// * `cellpar` - Conventional $`(a, b, c, \alpha, \beta, \gamma)`$, angles in degrees.
///
/// # Returns
///
/// The primitive cell.
pub fn primitive_cell_from_parameters(
    lattice: &BravaisLattice,
    cellpar: &[f64; 6],
) -> Result<Cell, StructureError> {
    let [a, b, c, alpha, beta, gamma] = *cellpar;
    let (cos_beta, sin_beta) = (beta.to_radians().cos(), beta.to_radians().sin());
    let s3 = 3.0f64.sqrt();
    let rows = match (lattice.family, lattice.centering) {
        (LatticeFamily::Triclinic, Centering::P) => {
            return Cell::from_lengths_and_angles(&[a, b, c, alpha, beta, gamma]);
        }
        (LatticeFamily::Monoclinic, Centering::P) => [
            [a, 0.0, 0.0],
            [0.0, b, 0.0],
            [c * cos_beta, 0.0, c * sin_beta],
        ],
        (LatticeFamily::Monoclinic, Centering::C) => [
            [a / 2.0, -b / 2.0, 0.0],
            [a / 2.0, b / 2.0, 0.0],
            [c * cos_beta, 0.0, c * sin_beta],
        ],
        (LatticeFamily::Orthorhombic, Centering::P) => {
            [[a, 0.0, 0.0], [0.0, b, 0.0], [0.0, 0.0, c]]
        }
        (LatticeFamily::Orthorhombic, Centering::C) => [
            [a / 2.0, -b / 2.0, 0.0],
            [a / 2.0, b / 2.0, 0.0],
            [0.0, 0.0, c],
        ],
        (LatticeFamily::Orthorhombic, Centering::A) => [
            [a, 0.0, 0.0],
            [0.0, b / 2.0, -c / 2.0],
            [0.0, b / 2.0, c / 2.0],
        ],
        (LatticeFamily::Orthorhombic, Centering::I) => [
            [-a / 2.0, b / 2.0, c / 2.0],
            [a / 2.0, -b / 2.0, c / 2.0],
            [a / 2.0, b / 2.0, -c / 2.0],
        ],
        (LatticeFamily::Orthorhombic, Centering::F) => [
            [0.0, b / 2.0, c / 2.0],
            [a / 2.0, 0.0, c / 2.0],
            [a / 2.0, b / 2.0, 0.0],
        ],
        (LatticeFamily::Tetragonal, Centering::P) => {
            [[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, c]]
        }
        (LatticeFamily::Tetragonal, Centering::I) => [
            [-a / 2.0, a / 2.0, c / 2.0],
            [a / 2.0, -a / 2.0, c / 2.0],
            [a / 2.0, a / 2.0, -c / 2.0],
        ],
        (LatticeFamily::Hexagonal, Centering::P) => [
            [a / 2.0, -s3 * a / 2.0, 0.0],
            [a / 2.0, s3 * a / 2.0, 0.0],
            [0.0, 0.0, c],
        ],
        (LatticeFamily::Hexagonal, Centering::R) => [
            [a / 2.0, -a / (2.0 * s3), c / 3.0],
            [0.0, a / s3, c / 3.0],
            [-a / 2.0, -a / (2.0 * s3), c / 3.0],
        ],
        (LatticeFamily::Cubic, Centering::P) => [[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]],
        (LatticeFamily::Cubic, Centering::I) => [
            [-a / 2.0, a / 2.0, a / 2.0],
            [a / 2.0, -a / 2.0, a / 2.0],
            [a / 2.0, a / 2.0, -a / 2.0],
        ],
        (LatticeFamily::Cubic, Centering::F) => [
            [0.0, a / 2.0, a / 2.0],
            [a / 2.0, 0.0, a / 2.0],
            [a / 2.0, a / 2.0, 0.0],
        ],
        _ => {
            return Err(StructureError(format!(
                "`{lattice}` is not a Bravais lattice"
            )))
        }
    };
    Ok(Cell::from_vectors(
        &Vector3::from(rows[0]),
        &Vector3::from(rows[1]),
        &Vector3::from(rows[2]),
    ))
}

/// Returns the change-of-basis matrix $`\mathbf{P}`$ from the primitive cell of a formal Bravais
/// lattice to its conventional cell, in the column convention of the International Tables:
/// $`(\mathbf{a}', \mathbf{b}', \mathbf{c}') = (\mathbf{a}, \mathbf{b}, \mathbf{c})\mathbf{P}`$.
pub fn change_of_basis_to_conventional(
    lattice: &BravaisLattice,
) -> Result<Matrix3<f64>, StructureError> {
    if lattice.is_primitive() {
        return Ok(Matrix3::identity());
    }
    // Any generic parameters do; the result is integral for every valid lattice.
    let cellpar = [1.1, 1.3, 1.7, 90.0, 101.0, 90.0];
    let old_basis = primitive_cell_from_parameters(lattice, &cellpar)?
        .lattice()
        .transpose();
    let new_basis = primitive_cell_from_parameters(&lattice.conventional(), &cellpar)?
        .lattice()
        .transpose();
    let p = old_basis
        .try_inverse()
        .ok_or_else(|| StructureError(format!("singular primitive cell for `{lattice}`")))?
        * new_basis;
    let rounded = p.map(f64::round);
    if (p - rounded).amax() > 1e-8 {
        return Err(StructureError(format!(
            "non-integral change of basis for `{lattice}`"
        )));
    }
    Ok(rounded)
}

/// Converts primitive-cell lengths and angles into the cell parameters of a prototype designation.
///
/// # Arguments
///
/// * `cellpar_prim` - $`(a, b, c, \alpha, \beta, \gamma)`$ of the primitive cell in the standard
/// orientation, angles in degrees.
/// * `lattice` - The formal Bravais lattice of the prototype.
///
/// # Returns
///
/// The cell parameters in prototype order: `a`, followed by the ratios and angles relevant to the
/// lattice family (e.g. `a, c/a` for tetragonal lattices).
pub fn conventional_cell_parameters(
    cellpar_prim: &[f64; 6],
    lattice: &BravaisLattice,
) -> Result<Vec<f64>, StructureError> {
    let [ap, bp, cp, alphap, betap, gammap] = *cellpar_prim;
    if ap <= 0.0 || bp <= 0.0 || cp <= 0.0 {
        return Err(StructureError("non-positive primitive cell length".to_string()));
    }
    if [alphap, betap, gammap]
        .iter()
        .any(|angle| *angle <= 0.0 || *angle >= 180.0)
    {
        return Err(StructureError(
            "primitive cell angle outside (0, 180)".to_string(),
        ));
    }
    let cos_alpha = alphap.to_radians().cos();
    let cos_beta = betap.to_radians().cos();
    let cos_gamma = gammap.to_radians().cos();
    let checked_sqrt = |x: f64| {
        if x < 0.0 {
            Err(StructureError(format!(
                "primitive cell ({ap}, {bp}, {cp}, {alphap}, {betap}, {gammap}) is inconsistent \
                 with a `{lattice}` lattice"
            )))
        } else {
            Ok(x.sqrt())
        }
    };
    let params = match (lattice.family, lattice.centering) {
        (LatticeFamily::Triclinic, _) => vec![ap, bp / ap, cp / ap, alphap, betap, gammap],
        (LatticeFamily::Monoclinic, Centering::P) => vec![ap, bp / ap, cp / ap, betap],
        (LatticeFamily::Orthorhombic, Centering::P) => vec![ap, bp / ap, cp / ap],
        (LatticeFamily::Tetragonal, Centering::P) | (LatticeFamily::Hexagonal, Centering::P) => {
            vec![ap, cp / ap]
        }
        (LatticeFamily::Cubic, Centering::P) => vec![ap],
        (LatticeFamily::Monoclinic, Centering::C) => {
            let a = ap * checked_sqrt(2.0 + 2.0 * cos_gamma)?;
            let b = ap * checked_sqrt(2.0 - 2.0 * cos_gamma)?;
            let beta = (cos_alpha / checked_sqrt((1.0 + cos_gamma) / 2.0)?)
                .clamp(-1.0, 1.0)
                .acos()
                .to_degrees();
            vec![a, b / a, cp / a, beta]
        }
        (LatticeFamily::Orthorhombic, Centering::C) => {
            let a = bp * checked_sqrt(2.0 + 2.0 * cos_gamma)?;
            let b = bp * checked_sqrt(2.0 - 2.0 * cos_gamma)?;
            vec![a, b / a, cp / a]
        }
        (LatticeFamily::Orthorhombic, Centering::A) => {
            let b = bp * checked_sqrt(2.0 + 2.0 * cos_alpha)?;
            let c = bp * checked_sqrt(2.0 - 2.0 * cos_alpha)?;
            vec![ap, b / ap, c / ap]
        }
        (LatticeFamily::Orthorhombic, Centering::I) => {
            let a = ap * checked_sqrt(2.0 + 2.0 * cos_alpha)?;
            let b = ap * checked_sqrt(2.0 + 2.0 * cos_beta)?;
            let c = ap * checked_sqrt(-2.0 * (cos_alpha + cos_beta))?;
            vec![a, b / a, c / a]
        }
        (LatticeFamily::Orthorhombic, Centering::F) => {
            let (ap2, bp2, cp2) = (ap * ap, bp * bp, cp * cp);
            let a = checked_sqrt(2.0 * (-ap2 + bp2 + cp2))?;
            let b = checked_sqrt(2.0 * (ap2 - bp2 + cp2))?;
            let c = checked_sqrt(2.0 * (ap2 + bp2 - cp2))?;
            vec![a, b / a, c / a]
        }
        (LatticeFamily::Tetragonal, Centering::I) => {
            let a = ap * checked_sqrt(2.0 + 2.0 * cos_alpha)?;
            let c = 2.0 * ap * checked_sqrt(-cos_alpha)?;
            vec![a, c / a]
        }
        (LatticeFamily::Hexagonal, Centering::R) => {
            let a = ap * checked_sqrt(2.0 - 2.0 * cos_alpha)?;
            let c = ap * checked_sqrt(3.0 + 6.0 * cos_alpha)?;
            vec![a, c / a]
        }
        (LatticeFamily::Cubic, Centering::F) => vec![ap * 2.0f64.sqrt()],
        (LatticeFamily::Cubic, Centering::I) => vec![ap * 2.0 / 3.0f64.sqrt()],
        _ => {
            return Err(StructureError(format!(
                "`{lattice}` is not a Bravais lattice"
            )))
        }
    };
    Ok(params)
}

/// Expands the cell block of a prototype parameter vector into conventional
/// $`(a, b, c, \alpha, \beta, \gamma)`$.
///
/// # Arguments
///
/// * `family` - The lattice family, which fixes how many cell parameters there are.
/// * `cell_values` - `a` followed by the family's ratios and angles.
pub fn expand_cell_parameters(
    family: LatticeFamily,
    cell_values: &[f64],
) -> Result<[f64; 6], StructureError> {
    let expected = cell_parameter_count(family);
    if cell_values.len() != expected {
        return Err(StructureError(format!(
            "{} cell parameters given where {expected} are needed",
            cell_values.len()
        )));
    }
    let a = cell_values[0];
    Ok(match family {
        LatticeFamily::Cubic => [a, a, a, 90.0, 90.0, 90.0],
        LatticeFamily::Tetragonal => [a, a, a * cell_values[1], 90.0, 90.0, 90.0],
        LatticeFamily::Hexagonal => [a, a, a * cell_values[1], 90.0, 90.0, 120.0],
        LatticeFamily::Orthorhombic => [
            a,
            a * cell_values[1],
            a * cell_values[2],
            90.0,
            90.0,
            90.0,
        ],
        LatticeFamily::Monoclinic => [
            a,
            a * cell_values[1],
            a * cell_values[2],
            90.0,
            cell_values[3],
            90.0,
        ],
        LatticeFamily::Triclinic => [
            a,
            a * cell_values[1],
            a * cell_values[2],
            cell_values[3],
            cell_values[4],
            cell_values[5],
        ],
    })
}

/// Number of cell parameters in a prototype designation for a lattice family.
pub fn cell_parameter_count(family: LatticeFamily) -> usize {
    match family {
        LatticeFamily::Cubic => 1,
        LatticeFamily::Tetragonal | LatticeFamily::Hexagonal => 2,
        LatticeFamily::Orthorhombic => 3,
        LatticeFamily::Monoclinic => 4,
        LatticeFamily::Triclinic => 6,
    }
}
