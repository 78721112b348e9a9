//! Parquet snapshot container for [`ResultsMatrix`]
//!
//! One record batch per file: `experiment` and `tags` utf8 columns plus
//! fixed-size list columns for the per-row configuration and data slabs.
//! The run id and the three schema axes travel as JSON-encoded key-value
//! metadata on the Arrow schema, so a snapshot is self-describing even at
//! zero rows. Only live rows are written; the id and tag indexes are rebuilt
//! from the loaded rows, never persisted.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ResultsMatrix;
use crate::{Error, Result};

const META_RUN_ID: &str = "run_id";
const META_PARAMETERS: &str = "parameters";
const META_OBSERVABLES: &str = "observables";
const META_TIMES: &str = "times";
const META_SAVED_AT: &str = "saved_at";

fn encode_axis<T: Serialize>(axis: &[T]) -> Result<String> {
    serde_json::to_string(axis).map_err(|e| Error::Snapshot(format!("encoding axis: {e}")))
}

fn decode_axis<T: DeserializeOwned>(meta: &HashMap<String, String>, key: &str) -> Result<Vec<T>> {
    let raw = meta
        .get(key)
        .ok_or_else(|| Error::Snapshot(format!("missing '{key}' attribute")))?;
    serde_json::from_str(raw).map_err(|e| Error::Snapshot(format!("invalid '{key}' axis: {e}")))
}

fn string_column(batch: &RecordBatch, name: &str) -> Result<Vec<String>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::Snapshot(format!("missing column '{name}'")))?;
    let array = column
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::Snapshot(format!("column '{name}' is not utf8")))?;
    Ok((0..array.len()).map(|i| array.value(i).to_string()).collect())
}

/// Flatten a fixed-size list column of doubles, checking the row width.
#[allow(clippy::cast_possible_wrap)]
fn slab_column(batch: &RecordBatch, name: &str, width: usize) -> Result<Vec<f64>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::Snapshot(format!("missing column '{name}'")))?;
    let array = column
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| Error::Snapshot(format!("column '{name}' is not a fixed-size list")))?;
    if array.value_length() != width as i32 {
        return Err(Error::Snapshot(format!(
            "column '{name}' has row width {}, schema requires {width}",
            array.value_length()
        )));
    }
    let values = array
        .values()
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| Error::Snapshot(format!("column '{name}' does not hold doubles")))?;
    Ok(values.values().to_vec())
}

impl ResultsMatrix {
    /// Write the live rows to a Parquet snapshot at `path`.
    ///
    /// Zero live rows is valid and round-trips to an empty matrix with the
    /// same run id and axes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] / [`Error::Parquet`] / [`Error::Arrow`] when the
    /// file cannot be written.
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = self.parameters.len();
        let slab = self.slab_len();

        let mut metadata = HashMap::new();
        metadata.insert(META_RUN_ID.to_string(), self.run_id.clone());
        metadata.insert(META_PARAMETERS.to_string(), encode_axis(&self.parameters)?);
        metadata.insert(META_OBSERVABLES.to_string(), encode_axis(&self.observables)?);
        metadata.insert(META_TIMES.to_string(), encode_axis(&self.times)?);
        metadata.insert(META_SAVED_AT.to_string(), chrono::Utc::now().to_rfc3339());

        let item = Arc::new(Field::new("item", DataType::Float64, false));
        let schema = Arc::new(Schema::new_with_metadata(
            vec![
                Field::new("experiment", DataType::Utf8, false),
                Field::new("tags", DataType::Utf8, false),
                Field::new(
                    "configuration",
                    DataType::FixedSizeList(item.clone(), p as i32),
                    false,
                ),
                Field::new("data", DataType::FixedSizeList(item.clone(), slab as i32), false),
            ],
            metadata,
        ));

        let ids = StringArray::from_iter_values(self.ids[..self.count].iter());
        let tags = StringArray::from_iter_values(self.tags[..self.count].iter());
        let configurations = FixedSizeListArray::try_new(
            item.clone(),
            p as i32,
            Arc::new(Float64Array::from(
                self.configurations[..self.count * p].to_vec(),
            )),
            None,
        )?;
        let data = FixedSizeListArray::try_new(
            item,
            slab as i32,
            Arc::new(Float64Array::from(self.data[..self.count * slab].to_vec())),
            None,
        )?;

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(ids),
                Arc::new(tags),
                Arc::new(configurations),
                Arc::new(data),
            ],
        )?;

        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Load a matrix from a Parquet snapshot, rebuilding both derived
    /// indexes from the stored rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Snapshot`] when the file is missing required
    /// metadata or columns, plus the usual IO/Parquet/Arrow errors.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let meta = schema.metadata();

        let run_id = meta
            .get(META_RUN_ID)
            .ok_or_else(|| Error::Snapshot(format!("missing '{META_RUN_ID}' attribute")))?
            .clone();
        let parameters: Vec<String> = decode_axis(meta, META_PARAMETERS)?;
        let observables: Vec<String> = decode_axis(meta, META_OBSERVABLES)?;
        let times: Vec<i64> = decode_axis(meta, META_TIMES)?;

        let p = parameters.len();
        let slab = times.len() * observables.len();
        let mut matrix = Self::new(run_id, parameters, observables, times, 0);

        for batch in builder.build()? {
            let batch = batch?;
            let ids = string_column(&batch, "experiment")?;
            let tags = string_column(&batch, "tags")?;
            let configurations = slab_column(&batch, "configuration", p)?;
            let data = slab_column(&batch, "data", slab)?;
            matrix.add_experiments(&ids, Some(&tags), &configurations, &data)?;
        }
        Ok(matrix)
    }
}
