//! Reading and writing of VASP POSCAR files.

use std::error::Error;
use std::fmt;

use itertools::Itertools;
use nalgebra::Vector3;

use crate::auxiliary::structure::{Cell, Site, Structure, StructureError};

#[cfg(test)]
#[path = "poscar_tests.rs"]
mod poscar_tests;

/// Error arising from a malformed POSCAR.
#[derive(Debug, Clone)]
pub struct PoscarError(pub String);

impl fmt::Display for PoscarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POSCAR error: {}.", self.0)
    }
}

impl Error for PoscarError {}

impl From<StructureError> for PoscarError {
    fn from(err: StructureError) -> Self {
        PoscarError(err.to_string())
    }
}

fn parse_floats(line: &str, n: usize, what: &str) -> Result<Vec<f64>, PoscarError> {
    let values = line
        .split_whitespace()
        .take(n)
        .map(|field| field.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PoscarError(format!("invalid {what} `{}`: {err}", line.trim())))?;
    if values.len() != n {
        return Err(PoscarError(format!(
            "expected {n} numbers for {what}, found `{}`",
            line.trim()
        )));
    }
    Ok(values)
}

/// Parses a POSCAR.
///
/// Both the VASP 4 layout (no species line) and the VASP 5 layout are accepted. A negative
/// scale factor is read as the target cell volume.
///
/// # Arguments
///
/// * `text` - The POSCAR contents.
/// * `species_override` - Species to use instead of those on the species line. Required for the
/// VASP 4 layout.
///
/// # Returns
///
/// The structure, with the atoms in file order.
pub fn read_poscar(text: &str, species_override: Option<&[String]>) -> Result<Structure, PoscarError> {
    let mut lines = text.lines();
    let mut next_line = |what: &str| {
        lines
            .next()
            .ok_or_else(|| PoscarError(format!("file ends before the {what}")))
    };
    next_line("comment line")?;
    let scale = parse_floats(next_line("scale factor")?, 1, "scale factor")?[0];
    let mut vectors = (0..3)
        .map(|i| {
            parse_floats(next_line("lattice vectors")?, 3, &format!("lattice vector {}", i + 1))
                .map(|v| Vector3::new(v[0], v[1], v[2]))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let first = next_line("species counts")?;
    let (file_species, counts_line) = if first
        .split_whitespace()
        .next()
        .map_or(false, |field| field.parse::<usize>().is_ok())
    {
        (None, first)
    } else {
        (
            Some(first.split_whitespace().map(String::from).collect_vec()),
            next_line("species counts")?,
        )
    };
    let counts = counts_line
        .split_whitespace()
        .map(|field| field.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PoscarError(format!("invalid species counts `{counts_line}`: {err}")))?;
    let species = match (species_override, file_species) {
        (Some(species), _) => species.to_vec(),
        (None, Some(species)) => species,
        (None, None) => {
            return Err(PoscarError(
                "no species line and no species given".to_string(),
            ))
        }
    };
    if species.len() != counts.len() {
        return Err(PoscarError(format!(
            "{} species given for {} species counts",
            species.len(),
            counts.len()
        )));
    }

    let mut mode = next_line("coordinate mode")?.trim();
    if mode.to_lowercase().starts_with('s') {
        mode = next_line("coordinate mode")?.trim();
    }
    let cartesian = matches!(mode.chars().next(), Some('c' | 'C' | 'k' | 'K'));

    let unscaled = Cell::from_vectors(&vectors[0], &vectors[1], &vectors[2]);
    let factor = if scale < 0.0 {
        (-scale / unscaled.volume()).cbrt()
    } else {
        scale
    };
    vectors.iter_mut().for_each(|v| *v *= factor);
    let cell = Cell::from_vectors(&vectors[0], &vectors[1], &vectors[2]);

    let mut sites = Vec::with_capacity(counts.iter().sum());
    for (sp, count) in species.iter().zip(counts.iter()) {
        for _ in 0..*count {
            let v = parse_floats(next_line("atomic positions")?, 3, "atomic position")?;
            let position = Vector3::new(v[0], v[1], v[2]);
            let position = if cartesian {
                cell.to_fractional(&(position * factor))?
            } else {
                position
            };
            sites.push(Site::new(sp, position));
        }
    }
    Ok(Structure::new(cell, sites))
}

/// Writes a structure as a VASP 5 POSCAR in direct coordinates, with atoms grouped by species in
/// alphabetical order.
pub fn write_poscar(structure: &Structure, comment: &str) -> String {
    let species = structure.unique_species();
    let mut lines = vec![comment.to_string(), "1.0".to_string()];
    lines.extend((0..3).map(|i| {
        let v = structure.cell.vector(i);
        format!("  {:>20.14} {:>20.14} {:>20.14}", v[0], v[1], v[2])
    }));
    lines.push(species.iter().join(" "));
    lines.push(
        species
            .iter()
            .map(|sp| structure.sites.iter().filter(|s| s.species == *sp).count())
            .join(" "),
    );
    lines.push("Direct".to_string());
    for sp in species.iter() {
        lines.extend(
            structure
                .sites
                .iter()
                .filter(|site| site.species == *sp)
                .map(|site| {
                    format!(
                        "  {:>18.14} {:>18.14} {:>18.14} {}",
                        site.position[0], site.position[1], site.position[2], site.species
                    )
                }),
        );
    }
    lines.join("\n") + "\n"
}
