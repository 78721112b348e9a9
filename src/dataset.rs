//! Dataset directory - accumulated results plus unmerged run bundles
//!
//! On disk a dataset is a directory holding an id marker (`run_id.txt`), the
//! exact template body (`<run_id>.template`), a canonical snapshot
//! (`<run_id>.parquet`), and any number of per-run bundle files
//! (`sample_*.parquet`, file stem = experiment id). Workers drop bundles in
//! via write-to-temp-then-rename; a single merging agent absorbs them into
//! the accumulated matrix and flushes a new snapshot. Concurrent mergers on
//! one directory are out of contract.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::matrix::ResultsMatrix;
use crate::template::{Parameter, SweepTemplate};
use crate::{Error, Result};

/// Name of the id marker file inside a dataset directory.
pub const ID_MARKER_FILE: &str = "run_id.txt";

/// Bundle filename prefix; the rest of the stem is the experiment id's tail.
pub const BUNDLE_PREFIX: &str = "sample_";

const SNAPSHOT_EXT: &str = "parquet";

/// An open dataset directory.
#[derive(Debug)]
pub struct Dataset {
    run_id: String,
    dir: PathBuf,
    template: SweepTemplate,
    matrix: Option<ResultsMatrix>,
    dirty_count: usize,
}

impl Dataset {
    /// Open a dataset directory, initialising it from `template` on first
    /// use.
    ///
    /// If the directory already carries an id marker or template file, both
    /// must match the supplied template exactly (trimmed marker equals the
    /// run id, template file equals the body byte-for-byte). Any snapshot is
    /// loaded and any unmerged bundles are absorbed before returning, so
    /// [`Self::dirty_count`] reflects the rows absorbed since the last flush.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateMismatch`] when the directory belongs to a
    /// different template, [`Error::Dataset`] for a malformed directory, and
    /// IO/storage errors from reading snapshots.
    pub fn open_or_init<P: AsRef<Path>>(template: &SweepTemplate, directory: P) -> Result<Self> {
        let dir = directory.as_ref();
        fs::create_dir_all(dir)?;

        let marker_path = dir.join(ID_MARKER_FILE);
        let template_path = dir.join(format!("{}.template", template.run_id()));

        if marker_path.exists() || template_path.exists() {
            let marker = fs::read_to_string(&marker_path)?;
            if marker.trim() != template.run_id() {
                return Err(Error::TemplateMismatch(format!(
                    "'{}' contains run id '{}', expected '{}'",
                    marker_path.display(),
                    marker.trim(),
                    template.run_id()
                )));
            }
            let body = fs::read_to_string(&template_path)?;
            if body != template.body() {
                return Err(Error::TemplateMismatch(format!(
                    "'{}' does not match the supplied template body",
                    template_path.display()
                )));
            }
        } else {
            fs::write(&marker_path, template.run_id())?;
            fs::write(&template_path, template.body())?;
            info!(run_id = template.run_id(), dir = %dir.display(), "initialised dataset directory");
        }

        Self::open_prepared(template.clone(), dir)
    }

    /// Open an existing dataset directory, reading the template from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dataset`] when the directory, id marker, or template
    /// file is missing or invalid.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let dir = directory.as_ref();
        if !dir.is_dir() {
            return Err(Error::Dataset(format!(
                "'{}' is not a directory",
                dir.display()
            )));
        }
        let marker_path = dir.join(ID_MARKER_FILE);
        if !marker_path.is_file() {
            return Err(Error::Dataset(format!(
                "'{}' has no {ID_MARKER_FILE}; not a dataset directory",
                dir.display()
            )));
        }
        let run_id = fs::read_to_string(&marker_path)?.trim().to_string();
        let template = SweepTemplate::from_file(dir.join(format!("{run_id}.template")))?;
        Self::open_prepared(template, dir)
    }

    fn open_prepared(template: SweepTemplate, dir: &Path) -> Result<Self> {
        let run_id = template.run_id().to_string();
        let snapshot_path = dir.join(format!("{run_id}.{SNAPSHOT_EXT}"));

        let matrix = if snapshot_path.is_file() {
            let matrix = ResultsMatrix::load(&snapshot_path)?;
            if matrix.run_id() != run_id {
                return Err(Error::Dataset(format!(
                    "snapshot '{}' holds run id '{}', expected '{run_id}'",
                    snapshot_path.display(),
                    matrix.run_id()
                )));
            }
            debug!(run_id = %run_id, rows = matrix.len(), "loaded accumulated snapshot");
            Some(matrix)
        } else {
            None
        };

        let mut dataset = Self {
            run_id,
            dir: dir.to_path_buf(),
            template,
            matrix,
            dirty_count: 0,
        };
        dataset.absorb_bundles()?;
        Ok(dataset)
    }

    /// Get the run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the dataset directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Get the template this dataset was created from.
    #[must_use]
    pub const fn template(&self) -> &SweepTemplate {
        &self.template
    }

    /// Look up one of the template's parameters by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.template.parameter(name)
    }

    /// The accumulated matrix, if any rows have ever been absorbed.
    #[must_use]
    pub const fn matrix(&self) -> Option<&ResultsMatrix> {
        self.matrix.as_ref()
    }

    /// Rows absorbed since the last flush.
    #[must_use]
    pub const fn dirty_count(&self) -> usize {
        self.dirty_count
    }

    /// Canonical snapshot path.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{SNAPSHOT_EXT}", self.run_id))
    }

    /// Scan the directory for `sample_*` bundles and merge any whose
    /// experiment id the accumulated matrix does not already contain.
    /// Returns the number of rows absorbed.
    ///
    /// # Errors
    ///
    /// Returns storage errors from unreadable bundles and
    /// [`Error::SchemaMismatch`] when a bundle's axes disagree with the
    /// accumulated matrix.
    pub fn absorb_bundles(&mut self) -> Result<usize> {
        let canonical = format!("{}.{SNAPSHOT_EXT}", self.run_id);
        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(BUNDLE_PREFIX) && name.ends_with(".parquet") && name != canonical {
                names.push(name);
            }
        }
        names.sort();

        let mut added = 0;
        for name in names {
            let id = name.trim_end_matches(".parquet");
            if self.matrix.as_ref().is_some_and(|m| m.contains(id)) {
                continue;
            }
            let bundle = ResultsMatrix::load(self.dir.join(&name))?;
            let absorbed = match self.matrix.as_mut() {
                None => {
                    let rows = bundle.len();
                    self.matrix = Some(bundle);
                    rows
                }
                Some(matrix) => matrix.add_bundle(&bundle)?,
            };
            if absorbed > 0 {
                debug!(bundle = %name, rows = absorbed, "absorbed run bundle");
            }
            self.dirty_count += absorbed;
            added += absorbed;
        }
        if added > 0 {
            info!(run_id = %self.run_id, rows = added, "absorbed unmerged bundles");
        }
        Ok(added)
    }

    /// Persist the accumulated matrix to the canonical snapshot path.
    ///
    /// A no-op when nothing has been absorbed since the last flush. The
    /// snapshot is written to a temporary sibling first and renamed into
    /// place, so the canonical path never holds a half-written file.
    ///
    /// # Errors
    ///
    /// Returns IO/storage errors from writing the snapshot.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty_count == 0 {
            return Ok(());
        }
        let matrix = self.matrix.as_ref().ok_or_else(|| {
            Error::Dataset("dirty rows recorded but no accumulated matrix exists".to_string())
        })?;
        let final_path = self.snapshot_path();
        let tmp_path = self.dir.join(format!("{}.{SNAPSHOT_EXT}.tmp", self.run_id));
        matrix.save(&tmp_path)?;
        fs::rename(&tmp_path, &final_path)?;
        info!(
            run_id = %self.run_id,
            rows = matrix.len(),
            flushed = self.dirty_count,
            "flushed snapshot"
        );
        self.dirty_count = 0;
        Ok(())
    }
}
