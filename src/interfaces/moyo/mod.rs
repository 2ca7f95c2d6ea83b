//! Symmetry detection with the `moyo` crate.

use std::fmt;

use derive_builder::Builder;
use itertools::Itertools;
use log;
use ::moyo::base::{AngleTolerance, Cell as MoyoCell, Lattice};
use ::moyo::data::Setting;
use ::moyo::MoyoDataset;
use serde::{Deserialize, Serialize};

use crate::auxiliary::structure::Structure;
use crate::interfaces::{ExternalToolError, SymmetryDataset, SymmetryDetector};


const fn default_symprec() -> f64 {
    1e-4
}

/// A structure containing control parameters for symmetry detection with `moyo`.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct MoyoParams {
    /// Cartesian distance tolerance for symmetry search.
    #[builder(default = "default_symprec()")]
    #[serde(default = "default_symprec")]
    pub symprec: f64,

    /// Angle tolerance in radians. If `None`, `moyo`'s default is used.
    #[builder(default = "None")]
    #[serde(default)]
    pub angle_tolerance: Option<f64>,
}

impl MoyoParams {
    /// Returns a builder to construct a [`MoyoParams`] structure.
    pub fn builder() -> MoyoParamsBuilder {
        MoyoParamsBuilder::default()
    }
}

impl Default for MoyoParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `MoyoParams`.")
    }
}

impl fmt::Display for MoyoParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Symmetry precision: {:.3e}", self.symprec)?;
        writeln!(
            f,
            "Angle tolerance: {}",
            self.angle_tolerance
                .map(|tol| format!("{tol:.3e} rad"))
                .unwrap_or_else(|| "default".to_string())
        )?;
        Ok(())
    }
}

/// Detects space groups, orbits and Wyckoff letters natively.
#[derive(Clone, Debug)]
pub struct MoyoSymmetryDetector {
    params: MoyoParams,
}

impl MoyoSymmetryDetector {
    pub fn new(params: MoyoParams) -> Self {
        Self { params }
    }

    fn to_moyo_cell(structure: &Structure) -> MoyoCell {
        let basis = [0, 1, 2].map(|i| {
            let v = structure.cell.vector(i);
            [v[0], v[1], v[2]]
        });
        let species = structure.unique_species();
        let numbers = structure
            .sites
            .iter()
            .map(|site| {
                species
                    .iter()
                    .position(|sp| *sp == site.species)
                    .map_or(0, |i| i as i32 + 1)
            })
            .collect_vec();
        let positions = structure
            .sites
            .iter()
            .map(|site| site.position)
            .collect_vec();
        MoyoCell::new(Lattice::from_basis(basis), positions, numbers)
    }
}

impl SymmetryDetector for MoyoSymmetryDetector {
    fn detect(&self, structure: &Structure) -> Result<SymmetryDataset, ExternalToolError> {
        let cell = Self::to_moyo_cell(structure);
        let angle_tolerance = self
            .params
            .angle_tolerance
            .map_or(AngleTolerance::Default, AngleTolerance::Radian);
        let dataset = MoyoDataset::new(
            &cell,
            self.params.symprec,
            angle_tolerance,
            Setting::Spglib,
            true,
        )
        .map_err(|err| {
            ExternalToolError::Invocation(format!("moyo symmetry search failed: {err:?}"))
        })?;
        let space_group_number = u32::try_from(dataset.number).map_err(|_| {
            ExternalToolError::MalformedResponse(format!(
                "moyo reported space group {}",
                dataset.number
            ))
        })?;
        log::debug!(
            "moyo detected space group {space_group_number} with Wyckoff letters [{}].",
            dataset.wyckoffs.iter().join(", ")
        );
        let result = SymmetryDataset {
            space_group_number,
            orbits: dataset.orbits.clone(),
            wyckoff_letters: dataset.wyckoffs.clone(),
        };
        result.validate(structure.n_atoms())?;
        Ok(result)
    }
}
