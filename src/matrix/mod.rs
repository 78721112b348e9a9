//! Results matrix - the growable experiment store
//!
//! The result of one experiment is a (times × observables) slab of doubles;
//! a matrix is a bundle of such slabs, one row per experiment, plus each
//! row's parameter configuration. The three schema axes (parameters,
//! observables, times) are fixed at creation; rows are append-only with an
//! explicit `(count, capacity)` pair and amortized 1.5x growth.
//!
//! Write pattern is append-only with idempotent ids: adding a row whose id
//! is already present is a successful no-op, which is what makes merging
//! independently produced bundles safe to repeat.
//!
//! The id and tag indexes are derived from the row arrays and rebuilt on
//! load; they are never persisted, so they cannot drift from the rows.

mod snapshot;

use rustc_hash::FxHashMap;

use crate::{Error, Result};

const EMPTY_ROWS: &[usize] = &[];

/// Borrowed view of one experiment row.
#[derive(Debug, Clone, Copy)]
pub struct ExperimentRow<'a> {
    id: &'a str,
    tags: &'a str,
    configuration: &'a [f64],
    data: &'a [f64],
    n_observables: usize,
}

impl<'a> ExperimentRow<'a> {
    /// Experiment id.
    #[must_use]
    pub const fn id(&self) -> &'a str {
        self.id
    }

    /// The raw `;`-joined tag string as stored.
    #[must_use]
    pub const fn tag_string(&self) -> &'a str {
        self.tags
    }

    /// Tags as individual tokens, empty tokens dropped.
    pub fn tags(&self) -> impl Iterator<Item = &'a str> {
        self.tags.split(';').filter(|t| !t.is_empty())
    }

    /// Parameter configuration, in schema parameter order.
    #[must_use]
    pub const fn configuration(&self) -> &'a [f64] {
        self.configuration
    }

    /// The full (times × observables) data slab, time-major.
    #[must_use]
    pub const fn data(&self) -> &'a [f64] {
        self.data
    }

    /// One value by axis positions.
    #[must_use]
    pub fn value(&self, time_pos: usize, observable_pos: usize) -> f64 {
        self.data[time_pos * self.n_observables + observable_pos]
    }
}

/// Growable, schema-fixed store of experiment results.
#[derive(Debug, Clone)]
pub struct ResultsMatrix {
    run_id: String,
    parameters: Vec<String>,
    observables: Vec<String>,
    times: Vec<i64>,
    parameter_index: FxHashMap<String, usize>,
    observable_index: FxHashMap<String, usize>,
    time_index: FxHashMap<i64, usize>,
    /// Rows `0..count` are live; `count..capacity` are reserved space.
    count: usize,
    capacity: usize,
    ids: Vec<String>,
    tags: Vec<String>,
    configurations: Vec<f64>,
    data: Vec<f64>,
    id_index: FxHashMap<String, usize>,
    tag_index: FxHashMap<String, Vec<usize>>,
}

impl ResultsMatrix {
    /// Create an empty matrix with the given schema axes and `reserve` rows
    /// of pre-allocated capacity.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        parameters: Vec<String>,
        observables: Vec<String>,
        times: Vec<i64>,
        reserve: usize,
    ) -> Self {
        let parameter_index = parameters
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let observable_index = observables
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let time_index = times.iter().enumerate().map(|(i, &t)| (t, i)).collect();
        let slab = times.len() * observables.len();
        Self {
            run_id: run_id.into(),
            configurations: vec![0.0; reserve * parameters.len()],
            data: vec![0.0; reserve * slab],
            ids: vec![String::new(); reserve],
            tags: vec![String::new(); reserve],
            parameters,
            observables,
            times,
            parameter_index,
            observable_index,
            time_index,
            count: 0,
            capacity: reserve,
            id_index: FxHashMap::default(),
            tag_index: FxHashMap::default(),
        }
    }

    /// Get the run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Schema parameter names, in order.
    #[must_use]
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Schema observable names, in order.
    #[must_use]
    pub fn observables(&self) -> &[String] {
        &self.observables
    }

    /// Schema time steps, in order.
    #[must_use]
    pub fn times(&self) -> &[i64] {
        &self.times
    }

    /// Number of live rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether the matrix holds no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Allocated row capacity (always `>= len()`).
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a row with this experiment id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.id_index.contains_key(id)
    }

    /// Axis position of a parameter name.
    #[must_use]
    pub fn parameter_position(&self, name: &str) -> Option<usize> {
        self.parameter_index.get(name).copied()
    }

    /// Axis position of an observable name.
    #[must_use]
    pub fn observable_position(&self, name: &str) -> Option<usize> {
        self.observable_index.get(name).copied()
    }

    /// Axis position of a time step.
    #[must_use]
    pub fn time_position(&self, time: i64) -> Option<usize> {
        self.time_index.get(&time).copied()
    }

    /// View a live row by index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    #[must_use]
    pub fn row(&self, index: usize) -> ExperimentRow<'_> {
        assert!(index < self.count, "row {index} out of range");
        let p = self.parameters.len();
        let slab = self.slab_len();
        ExperimentRow {
            id: &self.ids[index],
            tags: &self.tags[index],
            configuration: &self.configurations[index * p..(index + 1) * p],
            data: &self.data[index * slab..(index + 1) * slab],
            n_observables: self.observables.len(),
        }
    }

    /// View a row by experiment id.
    #[must_use]
    pub fn experiment(&self, id: &str) -> Option<ExperimentRow<'_>> {
        self.id_index.get(id).map(|&i| self.row(i))
    }

    /// Row indices tagged with `tag`, in append order.
    #[must_use]
    pub fn tagged(&self, tag: &str) -> &[usize] {
        self.tag_index.get(tag).map_or(EMPTY_ROWS, Vec::as_slice)
    }

    /// Tags known to the matrix, in arbitrary order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tag_index.keys().map(String::as_str)
    }

    const fn slab_len(&self) -> usize {
        self.times.len() * self.observables.len()
    }

    /// Grow the backing arrays so that `n` more rows fit.
    fn ensure_capacity(&mut self, n: usize) {
        if self.count + n <= self.capacity {
            return;
        }
        let new_capacity = (self.count + 10)
            .max(self.count + n)
            .max(self.capacity * 3 / 2);
        self.ids.resize(new_capacity, String::new());
        self.tags.resize(new_capacity, String::new());
        self.configurations
            .resize(new_capacity * self.parameters.len(), 0.0);
        self.data.resize(new_capacity * self.slab_len(), 0.0);
        self.capacity = new_capacity;
    }

    fn check_shapes(&self, configuration: &[f64], data: &[f64]) -> Result<()> {
        if configuration.len() != self.parameters.len() {
            return Err(Error::ShapeMismatch {
                expected: format!("configuration of length {}", self.parameters.len()),
                actual: format!("length {}", configuration.len()),
            });
        }
        if data.len() != self.slab_len() {
            return Err(Error::ShapeMismatch {
                expected: format!(
                    "data of shape {}x{}",
                    self.times.len(),
                    self.observables.len()
                ),
                actual: format!("{} values", data.len()),
            });
        }
        Ok(())
    }

    /// Write one pre-validated, known-new row.
    fn push_row(&mut self, id: &str, tags: &str, configuration: &[f64], data: &[f64]) {
        self.ensure_capacity(1);
        let index = self.count;
        let p = self.parameters.len();
        let slab = self.slab_len();

        self.ids[index] = id.to_string();
        self.tags[index] = tags.to_string();
        self.configurations[index * p..(index + 1) * p].copy_from_slice(configuration);
        self.data[index * slab..(index + 1) * slab].copy_from_slice(data);
        self.id_index.insert(id.to_string(), index);

        let mut seen: Vec<&str> = Vec::new();
        for tag in tags.split(';').filter(|t| !t.is_empty()) {
            if seen.contains(&tag) {
                continue;
            }
            seen.push(tag);
            self.tag_index.entry(tag.to_string()).or_default().push(index);
        }

        self.count += 1;
    }

    /// Add one experiment row.
    ///
    /// Returns `Ok(true)` if the row was added, `Ok(false)` if an experiment
    /// with this id is already present (a no-op, nothing is mutated).
    ///
    /// `data` is the (times × observables) slab flattened time-major; `tags`
    /// is a `;`-joined tag string, empty tokens ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if `configuration` or `data` do not
    /// match the schema axes.
    pub fn add_experiment(
        &mut self,
        id: &str,
        tags: &str,
        configuration: &[f64],
        data: &[f64],
    ) -> Result<bool> {
        self.check_shapes(configuration, data)?;
        if self.contains(id) {
            return Ok(false);
        }
        self.push_row(id, tags, configuration, data);
        Ok(true)
    }

    /// Bulk form of [`Self::add_experiment`].
    ///
    /// `configurations` and `data` are the per-row slices concatenated in id
    /// order; `tags` supplies one tag string per row when present. Rows whose
    /// id is already present are skipped; capacity grows at most once for the
    /// whole batch; the end state is identical to calling `add_experiment`
    /// once per row in order. Returns the number of rows actually added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the flattened slices or the tag
    /// vector do not match `ids.len()` rows of this schema.
    pub fn add_experiments(
        &mut self,
        ids: &[String],
        tags: Option<&[String]>,
        configurations: &[f64],
        data: &[f64],
    ) -> Result<usize> {
        let n = ids.len();
        let p = self.parameters.len();
        let slab = self.slab_len();
        if configurations.len() != n * p || data.len() != n * slab {
            return Err(Error::ShapeMismatch {
                expected: format!("{n} rows of {p} parameters and {slab} data values"),
                actual: format!(
                    "{} configuration values, {} data values",
                    configurations.len(),
                    data.len()
                ),
            });
        }
        if let Some(tags) = tags {
            if tags.len() != n {
                return Err(Error::ShapeMismatch {
                    expected: format!("{n} tag strings"),
                    actual: format!("{}", tags.len()),
                });
            }
        }

        let new_rows = ids.iter().filter(|id| !self.contains(id)).count();
        self.ensure_capacity(new_rows);

        let mut added = 0;
        for (i, id) in ids.iter().enumerate() {
            if self.contains(id) {
                continue;
            }
            let row_tags = tags.map_or("", |t| t[i].as_str());
            self.push_row(
                id,
                row_tags,
                &configurations[i * p..(i + 1) * p],
                &data[i * slab..(i + 1) * slab],
            );
            added += 1;
        }
        Ok(added)
    }

    /// Check that `other` shares this matrix's schema axes exactly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] naming the first axis that differs.
    pub fn check_schema(&self, other: &Self) -> Result<()> {
        if self.parameters != other.parameters {
            return Err(Error::SchemaMismatch(format!(
                "parameter axes differ: {:?} vs {:?}",
                self.parameters, other.parameters
            )));
        }
        if self.observables != other.observables {
            return Err(Error::SchemaMismatch(format!(
                "observable axes differ: {:?} vs {:?}",
                self.observables, other.observables
            )));
        }
        if self.times != other.times {
            return Err(Error::SchemaMismatch(format!(
                "time axes differ: {:?} vs {:?}",
                self.times, other.times
            )));
        }
        Ok(())
    }

    /// Merge all of `other`'s rows into this matrix.
    ///
    /// `other` is left unchanged; rows whose id is already present are
    /// skipped. Returns the number of rows added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the schema axes differ in any
    /// element; neither matrix is mutated in that case.
    pub fn add_bundle(&mut self, other: &Self) -> Result<usize> {
        self.check_schema(other)?;
        let p = self.parameters.len();
        let slab = self.slab_len();
        self.add_experiments(
            &other.ids[..other.count],
            Some(&other.tags[..other.count]),
            &other.configurations[..other.count * p],
            &other.data[..other.count * slab],
        )
    }
}

/// Equality over run id, schema axes, and live rows. Reserved capacity and
/// the derived indexes are not state.
impl PartialEq for ResultsMatrix {
    fn eq(&self, other: &Self) -> bool {
        let p = self.parameters.len();
        let slab = self.slab_len();
        self.run_id == other.run_id
            && self.parameters == other.parameters
            && self.observables == other.observables
            && self.times == other.times
            && self.count == other.count
            && self.ids[..self.count] == other.ids[..other.count]
            && self.tags[..self.count] == other.tags[..other.count]
            && self.configurations[..self.count * p] == other.configurations[..other.count * p]
            && self.data[..self.count * slab] == other.data[..other.count * slab]
    }
}
