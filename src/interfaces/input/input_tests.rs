use std::path::PathBuf;

use approx::assert_relative_eq;

use crate::interfaces::input::{Input, JobSpecification};
use crate::interfaces::InputHandle;
use crate::io::read_protomatch_yaml;

const ROOT: &str = env!("CARGO_MANIFEST_DIR");

#[test]
fn test_interfaces_input_full() {
    let name = format!("{ROOT}/tests/input/input_full.yml");
    let inp = read_protomatch_yaml::<Input, _>(&name).unwrap();

    assert_eq!(inp.aflow.executable, "/opt/aflow/bin/aflow");
    assert_eq!(inp.aflow.np, 4);
    assert_eq!(inp.aflow.work_dir, Some(PathBuf::from("/tmp/protomatch")));
    assert_relative_eq!(inp.moyo.symprec, 1e-3);
    assert!(inp.moyo.angle_tolerance.is_none());
    assert_eq!(inp.symmetry_data, PathBuf::from("data/aflow_tables"));
    assert_relative_eq!(inp.resolution.max_residual, 1e-4);
    assert_relative_eq!(inp.resolution.shift_tolerance, 1e-4);
    assert!(inp.resolution.write_orbits);
    assert_relative_eq!(inp.orientation.rotation_tolerance, 1e-3);
    assert_relative_eq!(inp.orientation.cell_tolerance, 1e-4);

    let params = inp.batch_params();
    assert_eq!(params.result_save_name.as_deref(), Some("bi2te3_batch"));

    let jobs = inp
        .jobs
        .iter()
        .map(|job| JobSpecification {
            poscar: PathBuf::from(ROOT).join(&job.poscar),
            ..job.clone()
        })
        .map(|job| job.to_batch_job(inp.verify_orientation))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].name, "Bi2Te3");
    assert_eq!(jobs[1].name, "bi2te3");
    assert!(jobs[0].verify_orientation);
    assert!(!jobs[1].verify_orientation);
    assert_eq!(jobs[0].label, "A2B3_hR5_166_c_ac");
    assert_eq!(jobs[0].structure.n_atoms(), 5);
    assert_eq!(jobs[0].structure.unique_species(), vec!["Bi", "Te"]);
}

#[test]
fn test_interfaces_input_minimal() {
    let name = format!("{ROOT}/tests/input/input_minimal.yml");
    let inp = read_protomatch_yaml::<Input, _>(&name).unwrap();

    assert_eq!(inp.aflow.executable, "aflow");
    assert_eq!(inp.aflow.np, 1);
    assert!(inp.aflow.work_dir.is_none());
    assert_relative_eq!(inp.moyo.symprec, 1e-4);
    assert_relative_eq!(inp.resolution.max_residual, 1e-5);
    assert!(!inp.resolution.write_orbits);
    assert!(!inp.verify_orientation);
    assert!(inp.result_save_name.is_none());

    let job = JobSpecification {
        poscar: PathBuf::from(ROOT).join(&inp.jobs[0].poscar),
        ..inp.jobs[0].clone()
    };
    let batch_job = job.to_batch_job(inp.verify_orientation).unwrap();
    assert_eq!(batch_job.name, "cu");
    assert!(!batch_job.verify_orientation);
    assert_eq!(batch_job.structure.n_atoms(), 1);
    assert_relative_eq!(
        batch_job.structure.cell.lengths_and_angles()[0],
        3.6 / 2f64.sqrt(),
        epsilon = 1e-10
    );
}

#[test]
fn test_interfaces_input_missing_poscar() {
    let name = format!("{ROOT}/tests/input/input_minimal.yml");
    let mut inp = read_protomatch_yaml::<Input, _>(&name).unwrap();
    inp.jobs[0].poscar = PathBuf::from(ROOT).join("tests/input/no_such_file.vasp");
    assert!(inp.batch_jobs().is_err());
    assert!(inp.handle().is_err());
}
