//! Free-parameter names and vectors of prototype designations.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::prototype::ResolutionError;

#[cfg(test)]
#[path = "parameters_tests.rs"]
mod parameters_tests;

lazy_static! {
    static ref INTERNAL_PARAMETER_RE: Regex =
        Regex::new(r"^([xyz])([0-9]+)$").expect("Regex pattern invalid.");
}

// ==================
// Enum definitions
// ==================

/// The name of a free parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterName {
    /// A cell parameter: the lattice scale `a`, a length ratio such as `c/a`, or an angle.
    Cell(String),

    /// An internal coordinate such as `x2`, attached to a 1-based atom index.
    Internal { axis: char, index: u32 },
}

impl ParameterName {
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Sort key putting internal parameters in index-then-axis order. Cell parameters have no key.
    pub fn sort_key(&self) -> Option<u64> {
        match self {
            Self::Cell(_) => None,
            Self::Internal { axis, index } => Some(1000 * u64::from(*index) + u64::from(*axis)),
        }
    }
}

impl FromStr for ParameterName {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(caps) = INTERNAL_PARAMETER_RE.captures(s) {
            let axis = caps[1].chars().next().unwrap_or('x');
            let index = caps[2].parse::<u32>().map_err(|_| {
                ResolutionError::MalformedParameters(format!("invalid atom index in `{s}`"))
            })?;
            Ok(Self::Internal { axis, index })
        } else if s.is_empty() {
            Err(ResolutionError::MalformedParameters(
                "empty parameter name".to_string(),
            ))
        } else {
            Ok(Self::Cell(s.to_string()))
        }
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell(name) => write!(f, "{name}"),
            Self::Internal { axis, index } => write!(f, "{axis}{index}"),
        }
    }
}

/// Returns the index-then-axis sort key of an internal parameter name such as `x2`.
pub fn internal_parameter_sort_key(name: &str) -> Result<u64, ResolutionError> {
    name.parse::<ParameterName>()?.sort_key().ok_or_else(|| {
        ResolutionError::MalformedParameters(format!("`{name}` is not an internal parameter"))
    })
}

/// Splits a parameter array into its cell block and its internal block.
///
/// # Arguments
///
/// * `names` - The parameter names, cell parameters first.
/// * `values` - Values in the same order as `names`.
///
/// # Returns
///
/// The cell values and the internal values, or an error if the lengths differ or an internal
/// parameter precedes a cell parameter.
pub fn split_parameter_array<T: Clone>(
    names: &[ParameterName],
    values: &[T],
) -> Result<(Vec<T>, Vec<T>), ResolutionError> {
    if names.len() != values.len() {
        return Err(ResolutionError::ParameterCountMismatch {
            expected: names.len(),
            found: values.len(),
        });
    }
    let n_cell = names.iter().take_while(|name| !name.is_internal()).count();
    if names[n_cell..].iter().any(|name| !name.is_internal()) {
        return Err(ResolutionError::MalformedParameters(format!(
            "cell parameters follow internal parameters in [{}]",
            names.iter().join(", ")
        )));
    }
    Ok((values[..n_cell].to_vec(), values[n_cell..].to_vec()))
}

// ==================
// Struct definitions
// ==================

/// An ordered free-parameter vector: the cell block (starting with `a`) followed by the internal
/// parameters in index-then-axis order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FreeParameterVector {
    names: Vec<ParameterName>,
    values: Vec<f64>,
}

impl FreeParameterVector {
    /// Constructs a parameter vector from names and values given in their final order.
    pub fn new(names: Vec<ParameterName>, values: Vec<f64>) -> Result<Self, ResolutionError> {
        split_parameter_array(&names, &values)?;
        let sorted = names
            .iter()
            .filter_map(ParameterName::sort_key)
            .tuple_windows()
            .all(|(k1, k2)| k1 < k2);
        if !sorted {
            return Err(ResolutionError::MalformedParameters(format!(
                "internal parameters [{}] are not in index-then-axis order",
                names.iter().filter(|name| name.is_internal()).join(", ")
            )));
        }
        Ok(Self { names, values })
    }

    /// Assembles a parameter vector from a cell block and unordered internal parameters.
    pub fn from_parts(
        cell_names: Vec<ParameterName>,
        cell_values: Vec<f64>,
        internal: Vec<(ParameterName, f64)>,
    ) -> Result<Self, ResolutionError> {
        if cell_names.len() != cell_values.len() {
            return Err(ResolutionError::ParameterCountMismatch {
                expected: cell_names.len(),
                found: cell_values.len(),
            });
        }
        let (internal_names, internal_values): (Vec<_>, Vec<_>) = internal
            .into_iter()
            .sorted_by_key(|(name, _)| name.sort_key())
            .unzip();
        Self::new(
            cell_names.into_iter().chain(internal_names).collect_vec(),
            cell_values.into_iter().chain(internal_values).collect_vec(),
        )
    }

    pub fn names(&self) -> &[ParameterName] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of cell parameters.
    pub fn n_cell(&self) -> usize {
        self.names.iter().filter(|name| !name.is_internal()).count()
    }

    pub fn cell_values(&self) -> &[f64] {
        &self.values[..self.n_cell()]
    }

    pub fn internal_values(&self) -> &[f64] {
        &self.values[self.n_cell()..]
    }

    /// Looks up a parameter by name.
    pub fn get(&self, name: &ParameterName) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }
}

impl fmt::Display for FreeParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .names
            .iter()
            .map(|name| name.to_string().chars().count())
            .max()
            .unwrap_or(1);
        for (name, value) in self.names.iter().zip(self.values.iter()) {
            writeln!(f, "  {:>width$}: {value:>14.8}", name.to_string())?;
        }
        Ok(())
    }
}
