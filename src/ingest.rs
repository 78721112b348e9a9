//! Per-run bundle production
//!
//! Workers produce one experiment each: draw a configuration, run the
//! simulator, then call [`matrix_from_run`] on the realized configuration
//! text and the raw log to get a one-experiment [`ResultsMatrix`], and
//! [`write_bundle`] to drop it into the dataset directory. Bundles land via
//! write-to-temp-then-rename, so a merging agent never observes a partial
//! file. Ids derive from per-worker seeds and are expected (not guaranteed)
//! unique; a collision surfaces at merge time as the store's documented
//! duplicate-id no-op.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dataset::BUNDLE_PREFIX;
use crate::matrix::ResultsMatrix;
use crate::template::{extract_configuration, SweepTemplate};
use crate::{simlog, Error, Result};

/// Experiment id for a worker seed, e.g. `sample_00000000075bcd15`.
#[must_use]
pub fn sample_id(seed: u64) -> String {
    format!("{BUNDLE_PREFIX}{seed:016x}")
}

/// Build a one-experiment matrix from a run's outputs.
///
/// The configuration vector comes from the realized configuration text in
/// the template's parameter order; the time and observable axes come from
/// the parsed log (first-bucket observable order).
///
/// # Errors
///
/// Propagates extraction and log-parse errors; returns
/// [`Error::SchemaMismatch`] if the log's buckets disagree with each other.
pub fn matrix_from_run(
    template: &SweepTemplate,
    exp_id: &str,
    config_text: &str,
    log_text: &str,
    tags: &str,
) -> Result<ResultsMatrix> {
    let configuration = extract_configuration(config_text, template.parameters())?;
    let log = simlog::parse(log_text, None)?;

    let observables = log.observables().to_vec();
    let times = log.times().to_vec();
    let mut data = Vec::with_capacity(times.len() * observables.len());
    for &time in &times {
        for name in &observables {
            let value = log.value(time, name).ok_or_else(|| {
                Error::SchemaMismatch(format!("time {time} has no value for '{name}'"))
            })?;
            data.push(value);
        }
    }

    let mut matrix = ResultsMatrix::new(
        template.run_id(),
        template.parameter_names(),
        observables,
        times,
        1,
    );
    matrix.add_experiment(exp_id, tags, &configuration, &data)?;
    Ok(matrix)
}

/// Write a one-experiment matrix as a self-contained bundle file named after
/// its experiment id, atomically.
///
/// Returns the final bundle path.
///
/// # Errors
///
/// Returns [`Error::Dataset`] unless the matrix holds exactly one row whose
/// id starts with `sample_`, plus IO/storage errors from the write.
pub fn write_bundle<P: AsRef<Path>>(directory: P, matrix: &ResultsMatrix) -> Result<PathBuf> {
    if matrix.len() != 1 {
        return Err(Error::Dataset(format!(
            "a bundle holds exactly one experiment, this matrix has {}",
            matrix.len()
        )));
    }
    let id = matrix.row(0).id().to_string();
    if !id.starts_with(BUNDLE_PREFIX) {
        return Err(Error::Dataset(format!(
            "bundle id '{id}' does not start with '{BUNDLE_PREFIX}'"
        )));
    }

    let dir = directory.as_ref();
    let tmp_path = dir.join(format!("{id}.parquet.tmp"));
    let final_path = dir.join(format!("{id}.parquet"));
    matrix.save(&tmp_path)?;
    fs::rename(&tmp_path, &final_path)?;
    debug!(bundle = %id, "wrote run bundle");
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "EXPLORE-PARAMETER Temp REAL 0.5 2.0\nset temperature ${Temp}\n";

    fn template() -> SweepTemplate {
        SweepTemplate::parse("run-a", TEMPLATE).unwrap()
    }

    const LOG: &str = "Time = 0\nKE\n1.0 0.1\n\nTime = 10\nKE\n1.5 0.1\n\n";

    #[test]
    fn test_sample_id_format() {
        assert_eq!(sample_id(0x1234), "sample_0000000000001234");
        assert_eq!(sample_id(u64::MAX), "sample_ffffffffffffffff");
    }

    #[test]
    fn test_matrix_from_run() {
        let config = "BIND-PARAMETER Temp 1.25\nset temperature 1.25\n";
        let matrix = matrix_from_run(&template(), "sample_01", config, LOG, "hot").unwrap();

        assert_eq!(matrix.run_id(), "run-a");
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.parameters(), &["Temp".to_string()]);
        assert_eq!(matrix.observables(), &["KE".to_string()]);
        assert_eq!(matrix.times(), &[0, 10]);
        let row = matrix.experiment("sample_01").unwrap();
        assert_eq!(row.configuration(), &[1.25]);
        assert_eq!(row.data(), &[1.0, 1.5]);
        assert_eq!(matrix.tagged("hot"), &[0]);
    }

    #[test]
    fn test_matrix_from_run_unbound_parameter() {
        let err = matrix_from_run(&template(), "sample_01", "no bindings here", LOG, "")
            .unwrap_err();
        assert!(matches!(err, Error::ParameterNotBound(_)));
    }

    #[test]
    fn test_write_bundle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = "BIND-PARAMETER Temp 0.75\n";
        let matrix = matrix_from_run(&template(), "sample_02", config, LOG, "").unwrap();

        let path = write_bundle(dir.path(), &matrix).unwrap();
        assert_eq!(path, dir.path().join("sample_02.parquet"));
        assert!(!dir.path().join("sample_02.parquet.tmp").exists());

        let loaded = ResultsMatrix::load(&path).unwrap();
        assert_eq!(loaded, matrix);
    }

    #[test]
    fn test_write_bundle_rejects_multi_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut matrix = ResultsMatrix::new(
            "run-a",
            vec!["Temp".to_string()],
            vec!["KE".to_string()],
            vec![0],
            2,
        );
        matrix.add_experiment("sample_01", "", &[1.0], &[1.0]).unwrap();
        matrix.add_experiment("sample_02", "", &[2.0], &[2.0]).unwrap();
        assert!(write_bundle(dir.path(), &matrix).is_err());
    }

    #[test]
    fn test_write_bundle_rejects_foreign_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut matrix = ResultsMatrix::new(
            "run-a",
            vec!["Temp".to_string()],
            vec!["KE".to_string()],
            vec![0],
            1,
        );
        matrix.add_experiment("s1", "", &[1.0], &[1.0]).unwrap();
        assert!(write_bundle(dir.path(), &matrix).is_err());
    }
}
