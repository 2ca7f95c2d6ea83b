//! The AFLOW command-line program as an implementation of the external capabilities.
//!
//! Every capability is one or two invocations of the `aflow` executable. Structures are passed as
//! POSCARs, either on standard input or through files in a temporary directory, and responses
//! are read from standard output, mostly as JSON.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use derive_builder::Builder;
use itertools::Itertools;
use lazy_static::lazy_static;
use log;
use nalgebra::{Matrix3, Vector3};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;

use crate::auxiliary::structure::Structure;
use crate::interfaces::{
    BuildOutcome, EquationGenerator, EquationResponse, ExternalToolError, PrototypeBuilder,
    PrototypeDesignation, PrototypeDesignator, RigidMotion, StructureComparer,
};
use crate::io::poscar::{read_poscar, write_poscar};
use crate::symmetry::symmetry_operation::SpaceGroupOperation;


/// The sentence AFLOW prints when `--proto` refuses parameters implying a higher symmetry.
const HIGHER_SYMMETRY_MESSAGE: &str =
    "The structure has a higher symmetry than indicated by the label";

lazy_static! {
    static ref PROTO_RE: Regex = Regex::new(r"--proto=(\S+)").expect("Regex pattern invalid.");
    static ref PARAMS_RE: Regex = Regex::new(r"--params=(\S+)").expect("Regex pattern invalid.");
}

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

fn default_executable() -> String {
    "aflow".to_string()
}

const fn default_np() -> usize {
    1
}

/// A structure containing control parameters for invoking AFLOW.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct AflowParams {
    /// Name or path of the AFLOW executable.
    #[builder(setter(into), default = "default_executable()")]
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Number of processes, passed as `--np`.
    #[builder(default = "default_np()")]
    #[serde(default = "default_np")]
    pub np: usize,

    /// Directory in which temporary POSCARs are written. If `None`, the system temporary
    /// directory is used.
    #[builder(default = "None")]
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl AflowParams {
    /// Returns a builder to construct a [`AflowParams`] structure.
    pub fn builder() -> AflowParamsBuilder {
        AflowParamsBuilder::default()
    }
}

impl Default for AflowParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `AflowParams`.")
    }
}

impl fmt::Display for AflowParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AFLOW executable: {}", self.executable)?;
        writeln!(f, "Number of processes: {}", self.np)?;
        writeln!(
            f,
            "Working directory: {}",
            self.work_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "system temporary directory".to_string())
        )?;
        Ok(())
    }
}

// ---------
// Responses
// ---------

/// JSON response of `aflow --prototype`.
#[derive(Deserialize)]
struct RawDesignation {
    aflow_prototype_label: String,
    aflow_prototype_params_list: Vec<String>,
    aflow_prototype_params_values: Vec<f64>,
}

/// One operation of the JSON response of `aflow --spacegroup`.
#[derive(Deserialize)]
struct RawAflowOperation {
    #[serde(rename = "Uf")]
    rotation: [[f64; 3]; 3],

    ftau: [f64; 3],
}

// ---
// CLI
// ---

/// Invokes the AFLOW executable.
#[derive(Clone, Debug)]
pub struct AflowCli {
    params: AflowParams,
}

impl AflowCli {
    pub fn new(params: AflowParams) -> Self {
        Self { params }
    }

    /// Runs AFLOW with the given arguments, optionally feeding text on standard input.
    ///
    /// # Returns
    ///
    /// Standard output, or an error carrying standard error if AFLOW exits unsuccessfully.
    fn run(&self, args: &[String], stdin: Option<&str>) -> Result<String, ExternalToolError> {
        let all_args = std::iter::once(format!("--np={}", self.params.np))
            .chain(args.iter().cloned())
            .collect_vec();
        let command_line = format!("{} {}", self.params.executable, all_args.join(" "));
        log::debug!("Running `{command_line}`.");

        let mut child = Command::new(&self.params.executable)
            .args(&all_args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ExternalToolError::Invocation(format!("failed to start `{command_line}`: {err}"))
            })?;
        if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(text.as_bytes()).map_err(|err| {
                ExternalToolError::Invocation(format!("failed to write to `{command_line}`: {err}"))
            })?;
        }
        let output = child.wait_with_output().map_err(|err| {
            ExternalToolError::Invocation(format!("failed to wait for `{command_line}`: {err}"))
        })?;
        if !output.status.success() {
            return Err(ExternalToolError::NonZeroExit {
                command: command_line,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|err| {
            ExternalToolError::MalformedResponse(format!("non-UTF-8 output of `{command_line}`: {err}"))
        })
    }

    fn temp_dir(&self) -> Result<TempDir, ExternalToolError> {
        let dir = match self.params.work_dir.as_ref() {
            Some(work_dir) => tempfile::Builder::new()
                .prefix("protomatch")
                .tempdir_in(work_dir),
            None => tempfile::Builder::new().prefix("protomatch").tempdir(),
        };
        dir.map_err(|err| {
            ExternalToolError::Invocation(format!("failed to create a temporary directory: {err}"))
        })
    }

    /// Returns the version string reported by `aflow --version`.
    pub fn version(&self) -> Result<String, ExternalToolError> {
        Ok(self.run(&["--version".to_string()], None)?.trim().to_string())
    }

    /// Returns the space-group operations of a structure reported by `aflow --spacegroup`, with
    /// rotations and translations in the structure's fractional basis.
    pub fn space_group_operations(
        &self,
        structure: &Structure,
    ) -> Result<Vec<SpaceGroupOperation>, ExternalToolError> {
        let output = self.run(
            &[
                "--spacegroup".to_string(),
                "--quiet".to_string(),
                "--print=json".to_string(),
                "--screen_only".to_string(),
            ],
            Some(&write_poscar(structure, "protomatch")),
        )?;
        parse_space_group_response(&output)
    }
}

impl PrototypeDesignator for AflowCli {
    fn designation(&self, structure: &Structure) -> Result<PrototypeDesignation, ExternalToolError> {
        let primitive = self.run(
            &["--prim".to_string()],
            Some(&write_poscar(structure, "protomatch")),
        )?;
        let output = self.run(
            &["--prototype".to_string(), "--print=json".to_string()],
            Some(&primitive),
        )?;
        parse_designation_response(&output)
    }
}

impl PrototypeBuilder for AflowCli {
    fn build(
        &self,
        species: &[String],
        label: &str,
        parameter_values: &[f64],
    ) -> Result<BuildOutcome, ExternalToolError> {
        let args = vec![
            format!("--proto={label}"),
            format!("--params={}", parameter_values.iter().join(",")),
        ];
        match self.run(&args, None) {
            Ok(poscar) => {
                let structure = read_poscar(&poscar, Some(species))
                    .map_err(|err| ExternalToolError::MalformedResponse(err.to_string()))?;
                Ok(BuildOutcome::Built(structure.wrapped()))
            }
            Err(ExternalToolError::NonZeroExit {
                command,
                status,
                stderr,
            }) if stderr.contains(HIGHER_SYMMETRY_MESSAGE) => {
                log::warn!("`{command}` refused to build `{label}`: higher symmetry detected.");
                let (label, parameter_values) = parse_higher_symmetry_message(&stderr)
                    .ok_or(ExternalToolError::NonZeroExit {
                        command,
                        status,
                        stderr,
                    })?;
                Ok(BuildOutcome::HigherSymmetryDetected {
                    label,
                    parameter_values,
                })
            }
            Err(err) => Err(err),
        }
    }
}

impl EquationGenerator for AflowCli {
    fn equations(
        &self,
        label: &str,
        parameter_values: &[f64],
    ) -> Result<EquationResponse, ExternalToolError> {
        let output = self.run(
            &[
                format!("--proto={label}"),
                format!("--params={}", parameter_values.iter().join(",")),
                "--equations_only".to_string(),
            ],
            None,
        )?;
        EquationResponse::from_equation_poscar(&output)
    }
}

impl StructureComparer for AflowCli {
    fn compare(
        &self,
        reference: &Structure,
        candidate: &Structure,
    ) -> Result<Option<RigidMotion>, ExternalToolError> {
        let dir = self.temp_dir()?;
        let reference_path = dir.path().join("reference.vasp");
        let candidate_path = dir.path().join("candidate.vasp");
        for (path, structure) in [(&reference_path, reference), (&candidate_path, candidate)] {
            std::fs::write(path, write_poscar(structure, "protomatch")).map_err(|err| {
                ExternalToolError::Invocation(format!(
                    "failed to write {}: {err}",
                    path.display()
                ))
            })?;
        }
        let output = self.run(
            &[
                "--print=JSON".to_string(),
                format!(
                    "--compare_materials={},{}",
                    reference_path.display(),
                    candidate_path.display()
                ),
                "--screen_only".to_string(),
                "--no_scale_volume".to_string(),
                "--optimize_match".to_string(),
                "--quiet".to_string(),
            ],
            None,
        )?;
        parse_comparison_response(&output)
    }
}

// =========
// Functions
// =========

fn matrix_from_rows(value: &Value, what: &str) -> Result<Matrix3<f64>, ExternalToolError> {
    let rows: [[f64; 3]; 3] = serde_json::from_value(value.clone())
        .map_err(|err| ExternalToolError::MalformedResponse(format!("invalid {what}: {err}")))?;
    Ok(Matrix3::from_fn(|i, j| rows[i][j]))
}

/// Parses the JSON printed by `aflow --prototype --print=json`.
pub fn parse_designation_response(json: &str) -> Result<PrototypeDesignation, ExternalToolError> {
    let raw: RawDesignation = serde_json::from_str(json).map_err(|err| {
        ExternalToolError::MalformedResponse(format!("invalid prototype designation: {err}"))
    })?;
    if raw.aflow_prototype_params_list.len() != raw.aflow_prototype_params_values.len() {
        return Err(ExternalToolError::MalformedResponse(format!(
            "{} parameter names but {} values in the designation of `{}`",
            raw.aflow_prototype_params_list.len(),
            raw.aflow_prototype_params_values.len(),
            raw.aflow_prototype_label
        )));
    }
    Ok(PrototypeDesignation {
        label: raw.aflow_prototype_label,
        parameter_names: raw.aflow_prototype_params_list,
        parameter_values: raw.aflow_prototype_params_values,
    })
}

/// Parses the JSON printed by `aflow --compare_materials=...`.
///
/// AFLOW reports the rotation for row vectors; it is transposed here to act on column vectors.
///
/// # Returns
///
/// `None` if AFLOW reports no duplicate structure.
pub fn parse_comparison_response(json: &str) -> Result<Option<RigidMotion>, ExternalToolError> {
    let value: Value = serde_json::from_str(json).map_err(|err| {
        ExternalToolError::MalformedResponse(format!("invalid comparison output: {err}"))
    })?;
    let Some(duplicate) = value
        .get(0)
        .and_then(|entry| entry.get("structures_duplicate"))
        .and_then(|duplicates| duplicates.get(0))
    else {
        log::info!("AFLOW failed to match the structures.");
        return Ok(None);
    };
    let field = |name: &str| {
        duplicate.get(name).ok_or_else(|| {
            ExternalToolError::MalformedResponse(format!("comparison output lacks `{name}`"))
        })
    };
    let basis_transformation = matrix_from_rows(field("basis_transformation")?, "basis transformation")?;
    let rotation = matrix_from_rows(field("rotation")?, "rotation")?.transpose();
    let origin_shift: [f64; 3] = serde_json::from_value(field("origin_shift")?.clone())
        .map_err(|err| ExternalToolError::MalformedResponse(format!("invalid origin shift: {err}")))?;
    Ok(Some(RigidMotion {
        basis_transformation,
        rotation,
        origin_shift: Vector3::from(origin_shift),
    }))
}

/// Extracts the label and parameters AFLOW suggests after refusing to build a structure.
pub fn parse_higher_symmetry_message(stderr: &str) -> Option<(String, Vec<f64>)> {
    let label = PROTO_RE.captures(stderr)?.get(1)?.as_str().to_string();
    let parameter_values = match PARAMS_RE.captures(stderr) {
        Some(caps) => caps
            .get(1)?
            .as_str()
            .split(',')
            .map(|v| v.parse::<f64>().ok())
            .collect::<Option<Vec<_>>>()?,
        None => vec![],
    };
    Some((label, parameter_values))
}

/// Parses the JSON printed by `aflow --spacegroup --print=json`.
pub fn parse_space_group_response(json: &str) -> Result<Vec<SpaceGroupOperation>, ExternalToolError> {
    let value: Value = serde_json::from_str(json).map_err(|err| {
        ExternalToolError::MalformedResponse(format!("invalid space-group output: {err}"))
    })?;
    let operations = value.get("sgroup").cloned().ok_or_else(|| {
        ExternalToolError::MalformedResponse("space-group output lacks `sgroup`".to_string())
    })?;
    let raw: Vec<RawAflowOperation> = serde_json::from_value(operations).map_err(|err| {
        ExternalToolError::MalformedResponse(format!("invalid space-group operation: {err}"))
    })?;
    Ok(raw
        .into_iter()
        .map(|op| {
            SpaceGroupOperation::new(
                Matrix3::from_fn(|i, j| op.rotation[i][j]),
                Vector3::from(op.ftau),
            )
        })
        .collect_vec())
}
