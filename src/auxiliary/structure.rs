//! Periodic atomic structures.

use std::error::Error;
use std::fmt;

use approx::abs_diff_eq;
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::auxiliary::misc::wrap_unit;

#[cfg(test)]
#[path = "structure_tests.rs"]
mod structure_tests;

/// Tolerance below which a wrapped coordinate just under one is folded onto zero.
pub(crate) const WRAP_EPSILON: f64 = 1e-10;

// ==================
// Struct definitions
// ==================

/// Error arising from geometrically invalid cells or structures.
#[derive(Debug, Clone)]
pub struct StructureError(pub String);

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Structure error: {}.", self.0)
    }
}

impl Error for StructureError {}

/// A unit cell whose rows are the three lattice vectors in Cartesian coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    lattice: Matrix3<f64>,
}

impl Cell {
    /// Constructs a cell from a matrix whose rows are the lattice vectors.
    pub fn new(lattice: Matrix3<f64>) -> Self {
        Self { lattice }
    }

    /// Constructs a cell from three lattice vectors.
    pub fn from_vectors(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> Self {
        Self::new(Matrix3::from_rows(&[a.transpose(), b.transpose(), c.transpose()]))
    }

    /// Constructs a cell from its lengths and angles (angles in degrees).
    ///
    /// The first lattice vector is placed along $`x`$ and the second in the $`xy`$ plane, which is
    /// the convention used by the prototype tooling when reporting cells.
    ///
    /// # Arguments
    ///
    /// * `cellpar` - $`(a, b, c, \alpha, \beta, \gamma)`$.
    ///
    /// # Returns
    ///
    /// The cell, or an error if the angles cannot close a parallelepiped.
    pub fn from_lengths_and_angles(cellpar: &[f64; 6]) -> Result<Self, StructureError> {
        let [a, b, c, alpha, beta, gamma] = *cellpar;
        if a <= 0.0 || b <= 0.0 || c <= 0.0 {
            return Err(StructureError(format!(
                "non-positive cell lengths ({a}, {b}, {c})"
            )));
        }
        let snap = |x: f64| if x.abs() < 1e-12 { 0.0 } else { x };
        let cos_alpha = snap(alpha.to_radians().cos());
        let cos_beta = snap(beta.to_radians().cos());
        let cos_gamma = snap(gamma.to_radians().cos());
        let sin_gamma = snap(gamma.to_radians().sin());
        if sin_gamma == 0.0 {
            return Err(StructureError(format!("degenerate angle gamma = {gamma}")));
        }
        let cy = (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let cz_sq = 1.0 - cos_beta * cos_beta - cy * cy;
        if cz_sq <= 0.0 {
            return Err(StructureError(format!(
                "angles ({alpha}, {beta}, {gamma}) do not define a cell"
            )));
        }
        Ok(Self::from_vectors(
            &Vector3::new(a, 0.0, 0.0),
            &Vector3::new(b * cos_gamma, b * sin_gamma, 0.0),
            &Vector3::new(c * cos_beta, c * cy, c * cz_sq.sqrt()),
        ))
    }

    /// Returns the matrix whose rows are the lattice vectors.
    pub fn lattice(&self) -> &Matrix3<f64> {
        &self.lattice
    }

    /// Returns the `i`th lattice vector.
    pub fn vector(&self, i: usize) -> Vector3<f64> {
        self.lattice.row(i).transpose()
    }

    pub fn volume(&self) -> f64 {
        self.lattice.determinant().abs()
    }

    /// Returns $`(a, b, c, \alpha, \beta, \gamma)`$ with angles in degrees.
    pub fn lengths_and_angles(&self) -> [f64; 6] {
        let (a, b, c) = (self.vector(0), self.vector(1), self.vector(2));
        let angle = |u: &Vector3<f64>, v: &Vector3<f64>| {
            (u.dot(v) / (u.norm() * v.norm()))
                .clamp(-1.0, 1.0)
                .acos()
                .to_degrees()
        };
        [
            a.norm(),
            b.norm(),
            c.norm(),
            angle(&b, &c),
            angle(&a, &c),
            angle(&a, &b),
        ]
    }

    /// Returns the same cell rebuilt from its lengths and angles, i.e. in the orientation where
    /// $`\mathbf{a}`$ lies along $`x`$ and $`\mathbf{b}`$ in the $`xy`$ plane.
    pub fn standard_form(&self) -> Result<Self, StructureError> {
        Self::from_lengths_and_angles(&self.lengths_and_angles())
    }

    /// Converts fractional coordinates into Cartesian coordinates.
    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.lattice.transpose() * frac
    }

    /// Converts Cartesian coordinates into fractional coordinates.
    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Result<Vector3<f64>, StructureError> {
        self.lattice
            .transpose()
            .try_inverse()
            .map(|inv| inv * cart)
            .ok_or_else(|| StructureError("singular lattice".to_string()))
    }

    /// Returns the Cartesian length of the shortest image of a fractional displacement.
    pub fn periodic_distance(&self, frac_a: &Vector3<f64>, frac_b: &Vector3<f64>) -> f64 {
        let diff = (frac_a - frac_b).map(|x| x - x.round());
        self.to_cartesian(&diff).norm()
    }

    /// Checks whether two cells have the same lengths and angles within an absolute tolerance.
    pub fn has_same_shape(&self, other: &Self, tolerance: f64) -> bool {
        self.lengths_and_angles()
            .iter()
            .zip(other.lengths_and_angles().iter())
            .all(|(x, y)| abs_diff_eq!(x, y, epsilon = tolerance))
    }
}

/// A single atom in a periodic structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Chemical species (or any other label distinguishing atom kinds).
    pub species: String,

    /// Fractional coordinates with respect to the structure's cell.
    pub position: Vector3<f64>,
}

impl Site {
    pub fn new(species: &str, position: Vector3<f64>) -> Self {
        Self {
            species: species.to_string(),
            position,
        }
    }
}

/// A periodic structure: a cell and a list of atoms in fractional coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub cell: Cell,
    pub sites: Vec<Site>,
}

impl Structure {
    pub fn new(cell: Cell, sites: Vec<Site>) -> Self {
        Self { cell, sites }
    }

    /// Constructs a structure from Cartesian positions.
    pub fn from_cartesian(
        cell: Cell,
        species: &[String],
        positions: &[Vector3<f64>],
    ) -> Result<Self, StructureError> {
        if species.len() != positions.len() {
            return Err(StructureError(format!(
                "{} species given for {} positions",
                species.len(),
                positions.len()
            )));
        }
        let sites = species
            .iter()
            .zip(positions.iter())
            .map(|(sp, pos)| Ok(Site::new(sp, cell.to_fractional(pos)?)))
            .collect::<Result<Vec<_>, StructureError>>()?;
        Ok(Self::new(cell, sites))
    }

    pub fn n_atoms(&self) -> usize {
        self.sites.len()
    }

    /// Returns the distinct species present, sorted alphabetically.
    pub fn unique_species(&self) -> Vec<String> {
        self.sites
            .iter()
            .map(|site| site.species.clone())
            .sorted()
            .dedup()
            .collect_vec()
    }

    pub fn cartesian_positions(&self) -> Vec<Vector3<f64>> {
        self.sites
            .iter()
            .map(|site| self.cell.to_cartesian(&site.position))
            .collect_vec()
    }

    /// Returns a copy with every fractional coordinate wrapped into $`[0, 1)`$.
    pub fn wrapped(&self) -> Self {
        let sites = self
            .sites
            .iter()
            .map(|site| Site {
                species: site.species.clone(),
                position: site.position.map(|x| wrap_unit(x, WRAP_EPSILON)),
            })
            .collect_vec();
        Self::new(self.cell.clone(), sites)
    }

    /// Returns a copy translated by a fractional vector.
    pub fn translated(&self, shift: &Vector3<f64>) -> Self {
        let sites = self
            .sites
            .iter()
            .map(|site| Site {
                species: site.species.clone(),
                position: site.position + shift,
            })
            .collect_vec();
        Self::new(self.cell.clone(), sites)
    }

    /// Returns a copy in which the cell is replaced while keeping fractional coordinates, which
    /// strains the atoms along with the cell.
    pub fn with_cell(&self, cell: Cell) -> Self {
        Self::new(cell, self.sites.clone())
    }

    /// Returns a copy rigidly rotated by a Cartesian rotation matrix.
    pub fn rotated(&self, rotation: &Matrix3<f64>) -> Self {
        let lattice = self.cell.lattice() * rotation.transpose();
        self.with_cell(Cell::new(lattice))
    }

    /// Returns a copy in which sites lying on top of an earlier site of the same species (modulo
    /// lattice translations) have been dropped.
    pub fn deduplicated(&self, tolerance: f64) -> Self {
        let mut sites: Vec<Site> = Vec::with_capacity(self.sites.len());
        for site in self.sites.iter() {
            let duplicated = sites.iter().any(|kept| {
                kept.species == site.species
                    && self.cell.periodic_distance(&kept.position, &site.position) < tolerance
            });
            if !duplicated {
                sites.push(site.clone());
            }
        }
        Self::new(self.cell.clone(), sites)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, alpha, beta, gamma] = self.cell.lengths_and_angles();
        writeln!(
            f,
            "Cell: a = {a:.6}, b = {b:.6}, c = {c:.6}, α = {alpha:.4}°, β = {beta:.4}°, γ = {gamma:.4}°"
        )?;
        writeln!(f, "{:>8} {:>12} {:>12} {:>12}", "Species", "x", "y", "z")?;
        for site in self.sites.iter() {
            writeln!(
                f,
                "{:>8} {:>12.8} {:>12.8} {:>12.8}",
                site.species, site.position[0], site.position[1], site.position[2]
            )?;
        }
        Ok(())
    }
}
