//! Alignment of a candidate structure to the frame of a rebuilt reference structure.

use itertools::Itertools;
use nalgebra::Vector3;

use crate::auxiliary::misc::wrap_unit;
use crate::auxiliary::structure::{Cell, Site, Structure, WRAP_EPSILON};
use crate::interfaces::{RigidMotion, StructureComparer};
use crate::prototype::ResolutionError;
use crate::symmetry::symmetry_operation::unique_internal_translations;
use crate::symmetry::symmetry_reference::SymmetryReference;


/// Recovers the rigid motion between a candidate structure and a structure rebuilt from its
/// designation, and enumerates the origin shifts that leave a space group's description
/// unchanged.
pub struct AlignmentResolver<'a> {
    comparer: &'a dyn StructureComparer,
    reference: &'a dyn SymmetryReference,
}

impl<'a> AlignmentResolver<'a> {
    pub fn new(
        comparer: &'a dyn StructureComparer,
        reference: &'a dyn SymmetryReference,
    ) -> Self {
        Self {
            comparer,
            reference,
        }
    }

    /// Finds the rigid motion carrying the rebuilt structure onto the candidate.
    ///
    /// # Returns
    ///
    /// The motion with $`\mathbf{r}_{\mathrm{cand}} \approx \mathbf{R}\mathbf{r}_{\mathrm{rebuilt}}
    /// + \mathbf{t}`$, or `None` if the comparer finds no correspondence.
    pub fn rigid_motion(
        &self,
        candidate: &Structure,
        rebuilt: &Structure,
    ) -> Result<Option<RigidMotion>, ResolutionError> {
        let motion = self.comparer.compare(candidate, rebuilt)?;
        if let Some(motion) = motion.as_ref() {
            log::debug!(
                "Rigid motion found: rotation {:?}, origin shift {:?}.",
                motion.rotation.as_slice(),
                motion.origin_shift.as_slice()
            );
        }
        Ok(motion)
    }

    /// Returns the distinct non-zero fractional translations of the general-position operations
    /// and of the normaliser shifts of a space group, in the primitive basis.
    pub fn enumerate_internal_shifts(
        &self,
        sg: u32,
        tolerance: f64,
    ) -> Result<Vec<Vector3<f64>>, ResolutionError> {
        let translations = self
            .reference
            .primitive_operations(sg)?
            .into_iter()
            .map(|op| op.translation)
            .chain(self.reference.possible_primitive_shifts(sg)?)
            .collect_vec();
        Ok(unique_internal_translations(translations.iter(), tolerance))
    }
}

/// Expresses a candidate structure in the frame and cell of the rebuilt structure.
///
/// Every atom is moved by the inverse of `motion`, re-expressed in fractional coordinates of
/// `frame`, wrapped into $`[0, 1)`$, and atoms falling on top of earlier atoms of the same species
/// are dropped. A conventional-cell candidate thereby collapses onto the primitive cell of
/// `frame`.
///
/// # Arguments
///
/// * `candidate` - The structure to align.
/// * `motion` - The rigid motion found by [`AlignmentResolver::rigid_motion`].
/// * `frame` - The cell of the rebuilt structure.
/// * `duplicate_tolerance` - Cartesian distance below which two atoms are considered the same.
pub fn align_to_frame(
    candidate: &Structure,
    motion: &RigidMotion,
    frame: &Cell,
    duplicate_tolerance: f64,
) -> Result<Structure, ResolutionError> {
    let inverse_rotation = motion.rotation.transpose();
    let sites = candidate
        .sites
        .iter()
        .map(|site| {
            let cart = candidate.cell.to_cartesian(&site.position);
            let aligned = inverse_rotation * (cart - motion.origin_shift);
            let frac = frame.to_fractional(&aligned)?;
            Ok(Site::new(
                &site.species,
                frac.map(|x| wrap_unit(x, WRAP_EPSILON)),
            ))
        })
        .collect::<Result<Vec<_>, ResolutionError>>()?;
    Ok(Structure::new(frame.clone(), sites).deduplicated(duplicate_tolerance))
}
