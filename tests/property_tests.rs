//! Property-based tests for the results matrix
//!
//! Mathematical invariants of the store: round trips are exact, adds and
//! merges are idempotent by id, bulk and sequential writes agree, growth
//! never disturbs existing rows.

use proptest::prelude::*;
use sweep_db::ResultsMatrix;

/// Rows of (id, tag string, configuration, data) for a P=2, T=2, O=1 schema.
fn row_strategy() -> impl Strategy<Value = (String, String, Vec<f64>, Vec<f64>)> {
    (
        "[a-z][a-z0-9]{0,8}",
        prop::sample::select(vec!["", "a", "a;b", "swept;hot", ";;"]),
        prop::collection::vec(-1.0e6..1.0e6f64, 2),
        prop::collection::vec(-1.0e6..1.0e6f64, 2),
    )
        .prop_map(|(id, tag, config, data)| (id, tag.to_string(), config, data))
}

fn build(rows: &[(String, String, Vec<f64>, Vec<f64>)]) -> ResultsMatrix {
    let mut m = ResultsMatrix::new(
        "prop",
        vec!["T".to_string(), "Rho".to_string()],
        vec!["KE".to_string()],
        vec![0, 10],
        0,
    );
    for (id, tags, config, data) in rows {
        m.add_experiment(id, tags, config, data).unwrap();
    }
    m
}

proptest! {
    /// Any matrix survives a save/load cycle exactly, indexes included.
    #[test]
    fn prop_snapshot_round_trip(rows in prop::collection::vec(row_strategy(), 0..24)) {
        let matrix = build(&rows);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.parquet");
        matrix.save(&path).unwrap();
        let loaded = ResultsMatrix::load(&path).unwrap();

        prop_assert_eq!(&matrix, &loaded);
        for i in 0..matrix.len() {
            let row = matrix.row(i);
            prop_assert!(loaded.contains(row.id()));
            for tag in row.tags() {
                prop_assert!(loaded.tagged(tag).contains(&i));
            }
        }
    }

    /// Replaying every add leaves the matrix unchanged and reports no-ops.
    #[test]
    fn prop_add_is_idempotent(rows in prop::collection::vec(row_strategy(), 1..24)) {
        let mut matrix = build(&rows);
        let before = matrix.clone();
        for (id, tags, config, data) in &rows {
            let added = matrix.add_experiment(id, tags, config, data).unwrap();
            prop_assert!(!added);
        }
        prop_assert_eq!(&matrix, &before);
    }

    /// The bulk add produces exactly the state of sequential adds.
    #[test]
    fn prop_bulk_add_matches_sequential(rows in prop::collection::vec(row_strategy(), 0..24)) {
        let sequential = build(&rows);

        let ids: Vec<String> = rows.iter().map(|r| r.0.clone()).collect();
        let tags: Vec<String> = rows.iter().map(|r| r.1.clone()).collect();
        let configs: Vec<f64> = rows.iter().flat_map(|r| r.2.clone()).collect();
        let data: Vec<f64> = rows.iter().flat_map(|r| r.3.clone()).collect();

        let mut bulk = ResultsMatrix::new(
            "prop",
            vec!["T".to_string(), "Rho".to_string()],
            vec!["KE".to_string()],
            vec![0, 10],
            0,
        );
        bulk.add_experiments(&ids, Some(&tags), &configs, &data).unwrap();

        prop_assert_eq!(&bulk, &sequential);
    }

    /// Merging a bundle twice adds its rows exactly once.
    #[test]
    fn prop_merge_is_idempotent(
        left in prop::collection::vec(row_strategy(), 0..12),
        right in prop::collection::vec(row_strategy(), 0..12),
    ) {
        let mut acc = build(&left);
        let bundle = build(&right);

        acc.add_bundle(&bundle).unwrap();
        let after_first = acc.clone();
        let second = acc.add_bundle(&bundle).unwrap();

        prop_assert_eq!(second, 0);
        prop_assert_eq!(&acc, &after_first);
    }

    /// Growth never disturbs rows written before it.
    #[test]
    fn prop_growth_preserves_first_row(
        first in row_strategy(),
        rest in prop::collection::vec(row_strategy(), 30..60),
    ) {
        let mut rows = vec![first.clone()];
        rows.extend(rest);
        let matrix = build(&rows);

        let row = matrix.experiment(&first.0).unwrap();
        prop_assert_eq!(row.configuration(), first.2.as_slice());
        prop_assert_eq!(row.data(), first.3.as_slice());
    }
}
