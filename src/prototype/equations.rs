//! Symbolic placement equations grouped by Wyckoff orbit.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use itertools::Itertools;
use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::auxiliary::misc::HashableFloat;
use crate::interfaces::{EquationGenerator, EquationLine};
use crate::prototype::expression::AffineExpression;
use crate::prototype::label::PrototypeLabel;
use crate::prototype::parameters::ParameterName;
use crate::prototype::ResolutionError;
use crate::symmetry::symmetry_reference::SymmetryReference;

#[cfg(test)]
#[path = "equations_tests.rs"]
mod equations_tests;

// ==================
// Struct definitions
// ==================

/// Affine placement equations of all sites in one Wyckoff orbit of a prototype.
///
/// Site $`i`$ sits at $`\mathbf{M}_i\mathbf{p} + \mathbf{c}_i`$ where $`\mathbf{p}`$ collects the
/// orbit's internal parameters in [`Self::param_names`] order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquivalentEqnSet {
    /// Virtual species, e.g. `A`.
    pub species: String,

    /// Wyckoff letter as declared in the label.
    pub wyckoff_letter: char,

    /// Internal parameters of this orbit, in index-then-axis order.
    pub param_names: Vec<ParameterName>,

    /// One $`3 \times n`$ matrix per site.
    pub coeff_matrices: Vec<DMatrix<f64>>,

    /// One constant vector per site.
    pub const_vectors: Vec<Vector3<f64>>,
}

impl EquivalentEqnSet {
    /// Number of sites in the orbit per primitive cell.
    pub fn multiplicity(&self) -> usize {
        self.coeff_matrices.len()
    }

    /// Evaluates the position of a site for given parameter values.
    pub fn site_position(&self, site: usize, values: &[f64]) -> Option<Vector3<f64>> {
        let matrix = self.coeff_matrices.get(site)?;
        if values.len() != matrix.ncols() {
            return None;
        }
        let p = matrix * DVector::from_column_slice(values);
        Some(Vector3::new(p[0], p[1], p[2]) + self.const_vectors[site])
    }
}

impl fmt::Display for EquivalentEqnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}): {} site{} in [{}]",
            self.species,
            self.wyckoff_letter,
            self.multiplicity(),
            if self.multiplicity() == 1 { "" } else { "s" },
            self.param_names.iter().join(", ")
        )
    }
}

/// Cache key: a label and the exact bit patterns of its parameter values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EquationCacheKey {
    label: String,
    values: Vec<(u64, i16, i8)>,
}

impl EquationCacheKey {
    pub fn new(label: &str, parameter_values: &[f64]) -> Self {
        Self {
            label: label.to_string(),
            values: parameter_values
                .iter()
                .map(|v| v.integer_decode())
                .collect_vec(),
        }
    }
}

// =================
// Trait definitions
// =================

/// A memoisation store for equation sets, injected into [`EquationBuilder`].
pub trait EquationCache: Send + Sync {
    fn get(&self, key: &EquationCacheKey) -> Option<Vec<EquivalentEqnSet>>;

    fn insert(&self, key: EquationCacheKey, value: Vec<EquivalentEqnSet>);
}

/// A cache that never remembers anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEquationCache;

impl EquationCache for NoEquationCache {
    fn get(&self, _: &EquationCacheKey) -> Option<Vec<EquivalentEqnSet>> {
        None
    }

    fn insert(&self, _: EquationCacheKey, _: Vec<EquivalentEqnSet>) {}
}

/// A cache shared between concurrent resolutions. Entries are written once and read many times.
#[derive(Debug, Default)]
pub struct SharedEquationCache {
    entries: RwLock<HashMap<EquationCacheKey, Vec<EquivalentEqnSet>>>,
}

impl SharedEquationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EquationCache for SharedEquationCache {
    fn get(&self, key: &EquationCacheKey) -> Option<Vec<EquivalentEqnSet>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn insert(&self, key: EquationCacheKey, value: Vec<EquivalentEqnSet>) {
        // Entries are only ever added whole, so a map left behind by a panicking writer is
        // still consistent.
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| {
            log::warn!("Equation cache lock poisoned by a panicking resolution; recovering.");
            poisoned.into_inner()
        });
        entries.entry(key).or_insert(value);
    }
}

// =======
// Builder
// =======

/// Obtains placement equations for a label and groups them into per-orbit affine maps.
pub struct EquationBuilder<'a> {
    generator: &'a dyn EquationGenerator,
    reference: &'a dyn SymmetryReference,
    cache: &'a dyn EquationCache,
}

impl<'a> EquationBuilder<'a> {
    pub fn new(
        generator: &'a dyn EquationGenerator,
        reference: &'a dyn SymmetryReference,
        cache: &'a dyn EquationCache,
    ) -> Self {
        Self {
            generator,
            reference,
            cache,
        }
    }

    /// Builds the equation sets of a label, one per expanded Wyckoff letter in label order.
    ///
    /// # Arguments
    ///
    /// * `label` - The prototype label.
    /// * `parameter_values` - A full free-parameter vector for the label. The values only steer
    /// the generator; the returned equations are symbolic in the internal parameters.
    pub fn build(
        &self,
        label: &PrototypeLabel,
        parameter_values: &[f64],
    ) -> Result<Vec<EquivalentEqnSet>, ResolutionError> {
        let key = EquationCacheKey::new(&label.to_string(), parameter_values);
        if let Some(cached) = self.cache.get(&key) {
            log::debug!("Equation sets for `{label}` taken from cache.");
            return Ok(cached);
        }
        let response = self
            .generator
            .equations(&label.to_string(), parameter_values)?;
        let eqn_sets = partition_equation_lines(label, &response.lines, self.reference)?;
        self.cache.insert(key, eqn_sets.clone());
        Ok(eqn_sets)
    }
}

/// Splits equation lines into per-orbit runs and converts each run into affine maps.
///
/// Runs follow the label's expanded Wyckoff letters, each as long as the letter's primitive-cell
/// multiplicity. All lines of a run must share one species and one set of parameter names. The
/// species must stay the same within a Wyckoff section and change between sections.
pub fn partition_equation_lines<R>(
    label: &PrototypeLabel,
    lines: &[EquationLine],
    reference: &R,
) -> Result<Vec<EquivalentEqnSet>, ResolutionError>
where
    R: SymmetryReference + ?Sized,
{
    let label_str = label.to_string();
    let inconsistent = |reason: String| ResolutionError::InconsistentEquationCount {
        label: label_str.clone(),
        reason,
    };
    let sg = label.space_group_number();

    let mut eqn_sets: Vec<EquivalentEqnSet> = vec![];
    let mut cursor = 0;
    let mut previous_species: Option<String> = None;
    for (section_index, section) in label.wyckoff_sequences().iter().enumerate() {
        let mut section_species: Option<String> = None;
        for letter in section.iter() {
            let multiplicity = reference.primitive_wyckoff_multiplicity(sg, *letter)?;
            if multiplicity == 0 {
                return Err(inconsistent(format!(
                    "Wyckoff position {letter} has no sites in the primitive cell"
                )));
            }
            let run = lines.get(cursor..cursor + multiplicity).ok_or_else(|| {
                inconsistent(format!(
                    "ran out of equation lines at Wyckoff position {letter} of section {}",
                    section_index + 1
                ))
            })?;
            cursor += multiplicity;

            let species = run[0].species.clone();
            if run.iter().any(|line| line.species != species) {
                return Err(inconsistent(format!(
                    "mixed species in the run of Wyckoff position {letter}"
                )));
            }
            match &section_species {
                None => {
                    if previous_species.as_ref() == Some(&species) {
                        return Err(inconsistent(format!(
                            "species {species} does not change at Wyckoff section {}",
                            section_index + 1
                        )));
                    }
                    section_species = Some(species.clone());
                }
                Some(current) if *current != species => {
                    return Err(inconsistent(format!(
                        "species changes from {current} to {species} within Wyckoff section {}",
                        section_index + 1
                    )));
                }
                Some(_) => {}
            }

            eqn_sets.push(affine_equation_set(&label_str, &species, *letter, run)?);
        }
        previous_species = section_species;
    }
    if cursor != lines.len() {
        return Err(inconsistent(format!(
            "{} equation lines given where the label accounts for {cursor}",
            lines.len()
        )));
    }
    Ok(eqn_sets)
}

fn affine_equation_set(
    label: &str,
    species: &str,
    letter: char,
    run: &[EquationLine],
) -> Result<EquivalentEqnSet, ResolutionError> {
    let parsed = run
        .iter()
        .map(|line| {
            line.expressions
                .iter()
                .map(|text| {
                    text.parse::<AffineExpression>().map_err(|err| {
                        log::debug!("Unable to decompose `{text}`: {err}");
                        ResolutionError::NonAffineEquation {
                            label: label.to_string(),
                            expression: text.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let names_of = |exprs: &[AffineExpression]| -> Result<Vec<ParameterName>, ResolutionError> {
        exprs
            .iter()
            .flat_map(|expr| expr.symbols())
            .unique()
            .map(|name| name.parse::<ParameterName>())
            .collect::<Result<Vec<_>, _>>()
            .map(|names| {
                names
                    .into_iter()
                    .sorted_by_key(|name| name.sort_key())
                    .collect_vec()
            })
    };
    let param_names = names_of(&parsed[0])?;
    if param_names.iter().any(|name| !name.is_internal()) {
        return Err(ResolutionError::InconsistentEquationCount {
            label: label.to_string(),
            reason: format!(
                "Wyckoff position {letter} depends on non-internal parameters [{}]",
                param_names.iter().join(", ")
            ),
        });
    }
    for exprs in parsed.iter().skip(1) {
        if names_of(exprs)? != param_names {
            return Err(ResolutionError::InconsistentEquationCount {
                label: label.to_string(),
                reason: format!(
                    "sites of Wyckoff position {letter} depend on different parameters"
                ),
            });
        }
    }

    let n = param_names.len();
    let symbol_names = param_names.iter().map(|name| name.to_string()).collect_vec();
    let (coeff_matrices, const_vectors): (Vec<_>, Vec<_>) = parsed
        .iter()
        .map(|exprs| {
            let matrix = DMatrix::from_fn(3, n, |i, j| exprs[i].coefficient(&symbol_names[j]));
            let constant = Vector3::new(exprs[0].constant, exprs[1].constant, exprs[2].constant);
            (matrix, constant)
        })
        .unzip();
    Ok(EquivalentEqnSet {
        species: species.to_string(),
        wyckoff_letter: letter,
        param_names,
        coeff_matrices,
        const_vectors,
    })
}
