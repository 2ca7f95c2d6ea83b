//! Resolution of many independent structures in parallel.

use std::fmt;

use anyhow::{self, format_err};
use derive_builder::Builder;
use log;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::auxiliary::structure::Structure;
use crate::drivers::orientation::{confirm_orientation, OrientationConfirmationParams};
use crate::drivers::parameter_solver::{resolve_free_parameters, PrototypeResolutionParams};
use crate::drivers::ProtoMatchDriver;
use crate::interfaces::ExternalCapabilities;
use crate::io::format::{
    log_macsec_begin, log_macsec_end, log_title, nice_bool, protomatch_output, protomatch_warn,
    ProtoMatchOutput,
};
use crate::io::write_protomatch_yaml;
use crate::prototype::equations::{EquationCache, SharedEquationCache};
use crate::prototype::parameters::FreeParameterVector;


// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for batch resolution.
#[derive(Clone, Builder, Debug, Default, Serialize, Deserialize)]
pub struct BatchResolutionParams {
    /// Control parameters for each individual resolution. The per-job result is never saved to a
    /// binary file.
    #[builder(default)]
    #[serde(default)]
    pub resolution: PrototypeResolutionParams,

    /// Control parameters for orientation confirmation, used by jobs that ask for it.
    #[builder(default)]
    #[serde(default)]
    pub orientation: OrientationConfirmationParams,

    /// Optional name for saving the job outcomes as a YAML file. If `None`, the outcomes will not
    /// be saved.
    #[builder(default = "None")]
    #[serde(default)]
    pub result_save_name: Option<String>,
}

impl BatchResolutionParams {
    /// Returns a builder to construct a [`BatchResolutionParams`] structure.
    pub fn builder() -> BatchResolutionParamsBuilder {
        BatchResolutionParamsBuilder::default()
    }
}

impl fmt::Display for BatchResolutionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolution)?;
        write!(f, "{}", self.orientation)?;
        writeln!(
            f,
            "Save job outcomes to file: {}",
            if let Some(name) = self.result_save_name.as_ref() {
                format!("{name}.yml")
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(f)?;
        Ok(())
    }
}

/// One structure to be resolved against one label.
#[derive(Clone, Debug)]
pub struct BatchJob {
    /// A name identifying the job in the output.
    pub name: String,

    /// The candidate structure.
    pub structure: Structure,

    /// The nominal prototype label.
    pub label: String,

    /// Boolean indicating if the resolved parameters are to be checked by rebuilding the
    /// structure in its labelled orientation.
    pub verify_orientation: bool,
}

// ------
// Result
// ------

/// The outcome of one batch job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchJobOutcome {
    pub name: String,

    pub label: String,

    /// The resolved parameters, if resolution succeeded.
    pub parameters: Option<FreeParameterVector>,

    /// The error that stopped the job, if any.
    pub error: Option<String>,

    /// Whether the resolved parameters reproduce the structure in its labelled orientation, if
    /// this was asked for and could be decided.
    pub orientation_confirmed: Option<bool>,
}

impl BatchJobOutcome {
    pub fn is_success(&self) -> bool {
        self.parameters.is_some() && self.error.is_none()
    }
}

impl fmt::Display for BatchJobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Label: {}", self.label)?;
        if let Some(parameters) = self.parameters.as_ref() {
            writeln!(f, "Free parameters:")?;
            write!(f, "{parameters}")?;
        }
        if let Some(confirmed) = self.orientation_confirmed {
            writeln!(f, "Orientation confirmed: {}", nice_bool(confirmed))?;
        }
        if let Some(error) = self.error.as_ref() {
            writeln!(f, "Failed: {error}")?;
        }
        Ok(())
    }
}

/// A structure to contain batch resolution results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchResolutionResult {
    /// The control parameters used.
    pub parameters: BatchResolutionParams,

    /// One outcome per job, in job order.
    pub outcomes: Vec<BatchJobOutcome>,
}

impl BatchResolutionResult {
    pub fn n_succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_success())
            .count()
    }
}

impl fmt::Display for BatchResolutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_width = self
            .outcomes
            .iter()
            .map(|outcome| outcome.name.chars().count())
            .max()
            .unwrap_or(4)
            .max(4);
        let label_width = self
            .outcomes
            .iter()
            .map(|outcome| outcome.label.chars().count())
            .max()
            .unwrap_or(5)
            .max(5);
        let table_width = name_width + label_width + 28;
        writeln!(f, "{}", "┈".repeat(table_width))?;
        writeln!(
            f,
            " {:<name_width$}  {:<label_width$}  {:>9}  {:>11}",
            "Name", "Label", "Resolved", "Orientation"
        )?;
        writeln!(f, "{}", "┈".repeat(table_width))?;
        for outcome in self.outcomes.iter() {
            writeln!(
                f,
                " {:<name_width$}  {:<label_width$}  {:>9}  {:>11}",
                outcome.name,
                outcome.label,
                nice_bool(outcome.is_success()),
                outcome
                    .orientation_confirmed
                    .map(nice_bool)
                    .unwrap_or_else(|| "--".to_string())
            )?;
        }
        writeln!(f, "{}", "┈".repeat(table_width))?;
        writeln!(
            f,
            "{} of {} job(s) resolved.",
            self.n_succeeded(),
            self.outcomes.len()
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// =========
// Functions
// =========

/// Runs one job to completion. Failures are recorded in the outcome rather than returned.
pub fn run_batch_job(
    job: &BatchJob,
    capabilities: ExternalCapabilities<'_>,
    cache: &dyn EquationCache,
    params: &BatchResolutionParams,
) -> BatchJobOutcome {
    let mut resolution_params = params.resolution.clone();
    resolution_params.result_save_name = None;
    let mut outcome = BatchJobOutcome {
        name: job.name.clone(),
        label: job.label.clone(),
        parameters: None,
        error: None,
        orientation_confirmed: None,
    };
    let result = match resolve_free_parameters(
        &job.structure,
        &job.label,
        capabilities,
        cache,
        &resolution_params,
    ) {
        Ok(result) => result,
        Err(err) => {
            log::info!("Job `{}` failed: {err}", job.name);
            outcome.error = Some(err.to_string());
            return outcome;
        }
    };
    if job.verify_orientation {
        match confirm_orientation(
            &job.structure,
            &job.structure.unique_species(),
            &job.label,
            result.free_parameters.values(),
            capabilities,
            &params.orientation,
        ) {
            Ok(confirmed) => outcome.orientation_confirmed = Some(confirmed),
            Err(err) => {
                log::info!("Orientation of job `{}` undecided: {err}", job.name);
                outcome.error = Some(format!("orientation confirmation failed: {err}"));
            }
        }
    }
    outcome.parameters = Some(result.free_parameters);
    outcome
}

// ------
// Driver
// ------

/// A driver resolving independent jobs in parallel, sharing one equation cache.
#[derive(Clone, Builder)]
pub struct BatchResolutionDriver<'a> {
    /// The control parameters for batch resolution.
    parameters: &'a BatchResolutionParams,

    /// The jobs to run.
    jobs: &'a [BatchJob],

    /// The external capabilities shared by all jobs.
    capabilities: ExternalCapabilities<'a>,

    /// The result of the batch.
    #[builder(setter(skip), default = "None")]
    result: Option<BatchResolutionResult>,
}

impl<'a> BatchResolutionDriver<'a> {
    /// Returns a builder to construct a [`BatchResolutionDriver`] structure.
    pub fn builder() -> BatchResolutionDriverBuilder<'a> {
        BatchResolutionDriverBuilder::default()
    }

    /// Executes all jobs.
    fn run_jobs(&mut self) -> Result<(), anyhow::Error> {
        log_title("Batch Prototype Resolution");
        protomatch_output!("");
        let params = self.parameters;
        params.log_output_display();

        let cache = SharedEquationCache::new();
        let capabilities = self.capabilities;
        let outcomes = self
            .jobs
            .par_iter()
            .map(|job| run_batch_job(job, capabilities, &cache, params))
            .collect::<Vec<_>>();
        log::debug!("{} equation set(s) cached during the batch.", cache.len());

        for outcome in outcomes.iter() {
            log_macsec_begin(&format!("Job `{}`", outcome.name));
            protomatch_output!("");
            outcome.log_output_display();
            if let Some(error) = outcome.error.as_ref() {
                protomatch_warn!("Job `{}` did not complete: {error}", outcome.name);
            }
            if outcome.orientation_confirmed == Some(false) {
                protomatch_warn!(
                    "Job `{}` was resolved outside its labelled orientation.",
                    outcome.name
                );
            }
            log_macsec_end(&format!("Job `{}`", outcome.name));
            protomatch_output!("");
        }

        let result = BatchResolutionResult {
            parameters: params.clone(),
            outcomes,
        };
        result.log_output_display();

        if let Some(name) = params.result_save_name.as_ref() {
            write_protomatch_yaml(name, &result)?;
            protomatch_output!("Job outcomes saved as {name}.yml.");
            protomatch_output!("");
        }

        self.result = Some(result);
        Ok(())
    }
}

impl<'a> ProtoMatchDriver for BatchResolutionDriver<'a> {
    type Params = BatchResolutionParams;

    type Outcome = BatchResolutionResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No batch resolution results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.run_jobs()
    }
}
