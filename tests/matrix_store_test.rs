//! Results matrix integration tests
//!
//! Covers the store's contract end to end: snapshot round trips, idempotent
//! adds, schema-checked merges, capacity growth, and tag indexing.

use sweep_db::{Error, ResultsMatrix};

fn schema(
    parameters: &[&str],
    observables: &[&str],
    times: &[i64],
    reserve: usize,
) -> ResultsMatrix {
    ResultsMatrix::new(
        "itest",
        parameters.iter().map(ToString::to_string).collect(),
        observables.iter().map(ToString::to_string).collect(),
        times.to_vec(),
        reserve,
    )
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn test_round_trip_multiple_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("itest.parquet");

    let mut m = schema(&["T", "Rho"], &["KE", "PE"], &[0, 100, 200], 2);
    for i in 0..20_u32 {
        let v = f64::from(i);
        m.add_experiment(
            &format!("sample_{i:04}"),
            if i % 2 == 0 { "even" } else { "odd;prime?" },
            &[v, v / 3.0],
            &[v, -v, v + 0.25, v * 7.0, v - 1.0, 1.0 / (v + 1.0)],
        )
        .unwrap();
    }

    m.save(&path).unwrap();
    let loaded = ResultsMatrix::load(&path).unwrap();
    assert_eq!(m, loaded);
    assert_eq!(loaded.tagged("even").len(), 10);
    assert_eq!(loaded.tagged("odd").len(), 10);
    assert_eq!(loaded.tagged("prime?").len(), 10);
}

#[test]
fn test_round_trip_zero_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.parquet");

    let m = schema(&["T"], &["KE"], &[0, 10], 0);
    m.save(&path).unwrap();
    let loaded = ResultsMatrix::load(&path).unwrap();
    assert_eq!(m, loaded);
    assert!(loaded.is_empty());
    assert_eq!(loaded.parameters(), &["T".to_string()]);
    assert_eq!(loaded.times(), &[0, 10]);
}

// =============================================================================
// Idempotent add
// =============================================================================

#[test]
fn test_second_add_with_same_id_changes_nothing() {
    let mut m = schema(&["T"], &["KE"], &[0, 10], 4);
    assert!(m.add_experiment("s1", "a", &[1.0], &[2.0, 2.5]).unwrap());

    let before = m.clone();
    assert!(!m.add_experiment("s1", "b", &[5.0], &[6.0, 6.5]).unwrap());
    assert_eq!(m, before);
    assert_eq!(m.tagged("a"), &[0]);
    assert!(m.tagged("b").is_empty());
}

// =============================================================================
// Merge
// =============================================================================

#[test]
fn test_merge_rejects_same_length_different_observables() {
    let mut a = schema(&["T"], &["KE", "PE"], &[0], 2);
    a.add_experiment("s1", "", &[1.0], &[1.0, 2.0]).unwrap();
    let a_before = a.clone();

    let mut b = schema(&["T"], &["KE", "Pressure"], &[0], 2);
    b.add_experiment("s2", "", &[2.0], &[3.0, 4.0]).unwrap();
    let b_before = b.clone();

    let err = a.add_bundle(&b).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(_)));
    assert_eq!(a, a_before);
    assert_eq!(b, b_before);
}

#[test]
fn test_merge_of_disjoint_bundles_accumulates() {
    let mut acc = schema(&["T"], &["KE"], &[0, 10], 0);
    for batch in 0..5 {
        let mut bundle = schema(&["T"], &["KE"], &[0, 10], 1);
        let v = f64::from(batch);
        bundle
            .add_experiment(&format!("sample_{batch}"), "swept", &[v], &[v, v])
            .unwrap();
        assert_eq!(acc.add_bundle(&bundle).unwrap(), 1);
    }
    assert_eq!(acc.len(), 5);
    assert_eq!(acc.tagged("swept"), &[0, 1, 2, 3, 4]);
}

// =============================================================================
// Capacity growth
// =============================================================================

#[test]
fn test_growth_preserves_previous_rows() {
    let mut m = schema(&["T"], &["KE"], &[0, 10], 1);
    m.add_experiment("s0", "", &[0.5], &[0.25, 0.125]).unwrap();
    let capacity_before = m.capacity();

    for i in 1..100_u32 {
        let v = f64::from(i);
        m.add_experiment(&format!("s{i}"), "", &[v], &[v, v]).unwrap();
    }
    assert!(m.capacity() > capacity_before);
    assert_eq!(m.experiment("s0").unwrap().configuration(), &[0.5]);
    assert_eq!(m.experiment("s0").unwrap().data(), &[0.25, 0.125]);
    assert_eq!(m.experiment("s57").unwrap().configuration(), &[57.0]);
}

// =============================================================================
// End-to-end scenario
// =============================================================================

#[test]
fn test_two_experiment_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.parquet");

    let mut m = ResultsMatrix::new(
        "scenario",
        vec!["T".to_string()],
        vec!["KE".to_string()],
        vec![0, 10],
        10,
    );
    assert!(m.add_experiment("s1", "", &[1.0], &[2.0, 2.5]).unwrap());
    assert!(m.add_experiment("s2", "tagA", &[1.5], &[3.0, 3.1]).unwrap());

    assert_eq!(m.len(), 2);
    assert!(m.contains("s1"));
    assert_eq!(m.tagged("tagA"), &[1]);

    m.save(&path).unwrap();
    let loaded = ResultsMatrix::load(&path).unwrap();
    assert_eq!(loaded, m);
    assert_eq!(loaded.experiment("s1").unwrap().data(), &[2.0, 2.5]);
    assert_eq!(loaded.experiment("s2").unwrap().data(), &[3.0, 3.1]);
    assert_eq!(loaded.experiment("s2").unwrap().value(1, 0), 3.1);
}
