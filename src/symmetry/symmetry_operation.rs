//! Space-group operations in the primitive setting.

use std::fmt;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::auxiliary::misc::wrap_unit;
use crate::auxiliary::structure::Cell;

#[cfg(test)]
#[path = "symmetry_operation_tests.rs"]
mod symmetry_operation_tests;

// ==================
// Struct definitions
// ==================

/// A space-group operation $`(\mathbf{W}, \mathbf{w})`$ acting on fractional coordinates as
/// $`\mathbf{x}' = \mathbf{W}\mathbf{x} + \mathbf{w}`$.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSpaceGroupOperation", into = "RawSpaceGroupOperation")]
pub struct SpaceGroupOperation {
    /// The rotational part $`\mathbf{W}`$.
    pub rotation: Matrix3<f64>,

    /// The translational part $`\mathbf{w}`$.
    pub translation: Vector3<f64>,
}

/// Tabulated form of an operation, with $`\mathbf{W}`$ given row by row.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawSpaceGroupOperation {
    #[serde(rename = "W")]
    rotation: [[f64; 3]; 3],

    #[serde(rename = "w")]
    translation: [f64; 3],
}

impl From<RawSpaceGroupOperation> for SpaceGroupOperation {
    fn from(raw: RawSpaceGroupOperation) -> Self {
        let rows = raw.rotation;
        Self {
            rotation: Matrix3::new(
                rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
                rows[2][1], rows[2][2],
            ),
            translation: Vector3::from(raw.translation),
        }
    }
}

impl From<SpaceGroupOperation> for RawSpaceGroupOperation {
    fn from(op: SpaceGroupOperation) -> Self {
        let w = op.rotation;
        Self {
            rotation: [
                [w[(0, 0)], w[(0, 1)], w[(0, 2)]],
                [w[(1, 0)], w[(1, 1)], w[(1, 2)]],
                [w[(2, 0)], w[(2, 1)], w[(2, 2)]],
            ],
            translation: [op.translation[0], op.translation[1], op.translation[2]],
        }
    }
}

impl SpaceGroupOperation {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Applies the operation to a fractional position.
    pub fn apply(&self, position: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * position + self.translation
    }
}

impl fmt::Display for SpaceGroupOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axes = ['x', 'y', 'z'];
        let components = (0..3)
            .map(|i| {
                let mut term = String::new();
                for (j, axis) in axes.iter().enumerate() {
                    let w = self.rotation[(i, j)];
                    if w.abs() > 1e-8 {
                        let sign = if w < 0.0 { "-" } else if term.is_empty() { "" } else { "+" };
                        if (w.abs() - 1.0).abs() < 1e-8 {
                            term.push_str(&format!("{sign}{axis}"));
                        } else {
                            term.push_str(&format!("{sign}{:.3}{axis}", w.abs()));
                        }
                    }
                }
                let t = self.translation[i];
                if t.abs() > 1e-8 {
                    term.push_str(&format!("{t:+.4}"));
                }
                if term.is_empty() {
                    "0".to_string()
                } else {
                    term
                }
            })
            .collect::<Vec<_>>();
        write!(f, "({})", components.join(", "))
    }
}

// =========
// Functions
// =========

/// Converts a Cartesian rotation into its fractional representation with respect to a cell.
///
/// With $`\mathbf{C}`$ the matrix whose rows are the lattice vectors, a Cartesian rotation
/// $`\mathbf{R}`$ acts on fractional column vectors as $`(\mathbf{C}\mathbf{R}^{\mathsf{T}}
/// \mathbf{C}^{-1})^{\mathsf{T}}`$, i.e. $`(\mathbf{C}^{\mathsf{T}})^{-1}\mathbf{R}\mathbf{C}^{\mathsf{T}}`$,
/// which is the form tabulated in the International Tables.
///
/// # Returns
///
/// The fractional rotation, or `None` if the cell is singular.
pub fn cartesian_to_fractional_rotation(
    rotation: &Matrix3<f64>,
    cell: &Cell,
) -> Option<Matrix3<f64>> {
    let ct = cell.lattice().transpose();
    ct.try_inverse().map(|ct_inv| ct_inv * rotation * ct)
}

/// Collects the distinct translational parts of a set of operations, modulo lattice translations,
/// excluding pure lattice translations.
///
/// # Arguments
///
/// * `translations` - Candidate fractional translations.
/// * `tolerance` - Absolute tolerance on each wrapped component.
///
/// # Returns
///
/// The unique translations, wrapped into $`[0, 1)`$, in first-seen order.
pub fn unique_internal_translations<'a, I>(translations: I, tolerance: f64) -> Vec<Vector3<f64>>
where
    I: IntoIterator<Item = &'a Vector3<f64>>,
{
    let same_modulo_lattice = |u: &Vector3<f64>, v: &Vector3<f64>| {
        (u - v).iter().all(|d| (d - d.round()).abs() < tolerance)
    };
    let mut unique: Vec<Vector3<f64>> = vec![];
    for translation in translations {
        let wrapped = translation.map(|x| wrap_unit(x, tolerance));
        if same_modulo_lattice(&wrapped, &Vector3::zeros()) {
            continue;
        }
        if !unique.iter().any(|u| same_modulo_lattice(u, &wrapped)) {
            unique.push(wrapped);
        }
    }
    unique
}
