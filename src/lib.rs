//! # sweep-db: Embedded Results Store for Parameter-Sweep Experiments
//!
//! sweep-db drives the bookkeeping side of parameter-sweep simulation
//! campaigns: templates declare explorable parameters, workers realize a
//! configuration per run and parse the simulator's log, and every run's
//! (times × observables) result lands as one row of a growable, schema-fixed
//! [`ResultsMatrix`]. Independently produced per-run bundles merge
//! idempotently by experiment id, and a [`Dataset`] directory accumulates
//! them into a Parquet snapshot.
//!
//! The store is synchronous and single-writer by design: workers only ever
//! write self-contained bundle files, and one merging agent folds bundles in
//! and flushes snapshots.
//!
//! ## Example
//!
//! ```rust
//! use sweep_db::{ResultsMatrix, simlog};
//!
//! let log = simlog::parse("Time = 100\nKE\n1.5 0.2\n\n", None)?;
//! assert_eq!(log.value(100, "KE"), Some(1.5));
//!
//! let mut matrix = ResultsMatrix::new(
//!     "demo",
//!     vec!["Temp".to_string()],
//!     vec!["KE".to_string()],
//!     vec![100],
//!     10,
//! );
//! matrix.add_experiment("sample_01", "baseline", &[1.25], &[1.5])?;
//! assert!(matrix.contains("sample_01"));
//! # Ok::<(), sweep_db::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod dataset;
pub mod error;
pub mod ingest;
pub mod matrix;
pub mod simlog;
pub mod template;

pub use dataset::Dataset;
pub use error::{Error, Result};
pub use matrix::{ExperimentRow, ResultsMatrix};
pub use simlog::ParsedLog;
pub use template::{extract_configuration, Parameter, ParameterKind, SweepTemplate};
