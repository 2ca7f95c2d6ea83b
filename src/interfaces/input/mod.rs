//! YAML input files for the `protomatch` binary.

use std::fs;
use std::path::PathBuf;

use anyhow::{self, format_err};
use serde::{Deserialize, Serialize};

use crate::drivers::batch::{BatchJob, BatchResolutionDriver, BatchResolutionParams};
use crate::drivers::orientation::OrientationConfirmationParams;
use crate::drivers::parameter_solver::PrototypeResolutionParams;
use crate::drivers::ProtoMatchDriver;
use crate::interfaces::aflow::{AflowCli, AflowParams};
use crate::interfaces::moyo::{MoyoParams, MoyoSymmetryDetector};
use crate::interfaces::{ExternalCapabilities, InputHandle};
use crate::io::format::{
    log_subtitle, protomatch_error, protomatch_output, protomatch_warn, ProtoMatchOutput,
};
use crate::io::poscar::read_poscar;
use crate::symmetry::symmetry_reference::TabulatedSymmetryReference;

#[cfg(test)]
#[path = "input_tests.rs"]
mod input_tests;

/// A serialisable/deserialisable structure describing one structure to resolve.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSpecification {
    /// A name for the job. If not specified, the file stem of the POSCAR is used.
    #[serde(default)]
    pub name: Option<String>,

    /// Path to a POSCAR file containing the candidate structure.
    pub poscar: PathBuf,

    /// Species overriding those of the POSCAR, required for POSCARs without a species line.
    #[serde(default)]
    pub species: Option<Vec<String>>,

    /// The nominal prototype label.
    pub label: String,

    /// Whether to confirm the orientation of the resolved structure. If not specified, the
    /// input-wide setting is used.
    #[serde(default)]
    pub verify_orientation: Option<bool>,
}

impl JobSpecification {
    /// Reads the POSCAR of this job and assembles a batch job.
    pub fn to_batch_job(&self, verify_orientation: bool) -> Result<BatchJob, anyhow::Error> {
        let text = fs::read_to_string(&self.poscar).map_err(|err| {
            format_err!("Unable to read POSCAR {}: {err}", self.poscar.display())
        })?;
        let structure = read_poscar(&text, self.species.as_deref())?;
        let name = self.name.clone().unwrap_or_else(|| {
            self.poscar
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_else(|| self.poscar.display().to_string())
        });
        Ok(BatchJob {
            name,
            structure,
            label: self.label.clone(),
            verify_orientation: self.verify_orientation.unwrap_or(verify_orientation),
        })
    }
}

/// A structure containing `protomatch` input parameters which can be serialised into and
/// deserialised from a YAML input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Input {
    /// Parameters for invoking AFLOW, which provides designation, building, equation generation
    /// and comparison.
    #[serde(default)]
    pub aflow: AflowParams,

    /// Parameters for symmetry detection.
    #[serde(default)]
    pub moyo: MoyoParams,

    /// Directory containing the JSON symmetry reference tables.
    pub symmetry_data: PathBuf,

    /// Parameters for prototype parameter resolution.
    #[serde(default)]
    pub resolution: PrototypeResolutionParams,

    /// Parameters for orientation confirmation.
    #[serde(default)]
    pub orientation: OrientationConfirmationParams,

    /// Whether to confirm orientations for jobs not specifying this themselves.
    #[serde(default)]
    pub verify_orientation: bool,

    /// Optional name for saving the job outcomes as a YAML file.
    #[serde(default)]
    pub result_save_name: Option<String>,

    /// The structures to resolve.
    pub jobs: Vec<JobSpecification>,
}

impl Input {
    /// Reads the POSCARs of all jobs.
    pub fn batch_jobs(&self) -> Result<Vec<BatchJob>, anyhow::Error> {
        self.jobs
            .iter()
            .map(|job| job.to_batch_job(self.verify_orientation))
            .collect()
    }

    pub fn batch_params(&self) -> BatchResolutionParams {
        BatchResolutionParams {
            resolution: self.resolution.clone(),
            orientation: self.orientation.clone(),
            result_save_name: self.result_save_name.clone(),
        }
    }
}

impl InputHandle for Input {
    fn handle(&self) -> Result<(), anyhow::Error> {
        let jobs = self.batch_jobs().map_err(|err| {
            protomatch_error!("{err}");
            err
        })?;
        let reference =
            TabulatedSymmetryReference::from_json_dir(&self.symmetry_data).map_err(|err| {
                protomatch_error!(
                    "Unable to load symmetry reference tables from {}: {err}",
                    self.symmetry_data.display()
                );
                err
            })?;

        log_subtitle("External programs");
        protomatch_output!("");
        self.aflow.log_output_display();
        self.moyo.log_output_display();
        let aflow = AflowCli::new(self.aflow.clone());
        match aflow.version() {
            Ok(version) => protomatch_output!("AFLOW version: {version}"),
            Err(err) => protomatch_warn!("Unable to determine the AFLOW version: {err}"),
        }
        protomatch_output!("");

        let detector = MoyoSymmetryDetector::new(self.moyo.clone());
        let capabilities = ExternalCapabilities {
            detector: &detector,
            designator: &aflow,
            builder: &aflow,
            generator: &aflow,
            comparer: &aflow,
            reference: &reference,
        };
        let params = self.batch_params();
        let mut driver = BatchResolutionDriver::builder()
            .parameters(&params)
            .jobs(&jobs)
            .capabilities(capabilities)
            .build()?;
        driver.run()?;
        let n_failed = driver
            .result()?
            .outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .count();
        if n_failed > 0 {
            protomatch_warn!("{n_failed} job(s) could not be resolved.");
        }
        Ok(())
    }
}
