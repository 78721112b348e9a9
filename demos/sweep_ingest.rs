//! Sweep Ingest Example
//!
//! Walks the full worker-to-dataset path without a real simulator: draw a
//! configuration from a template, fake the simulator's log output, package
//! the run as a bundle, and absorb it into a dataset directory.
//!
//! Run with: cargo run --example sweep_ingest

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sweep_db::ingest::{matrix_from_run, sample_id, write_bundle};
use sweep_db::{Dataset, SweepTemplate};

const TEMPLATE_BODY: &str = "box 20 20 20\n\
    EXPLORE-PARAMETER Temp REAL 0.5 2.0\n\
    EXPLORE-PARAMETER Steps INTEGER 500 5000\n\
    set temperature ${Temp}\n\
    run ${Steps}\n";

/// Stand-in for the simulator: a log with two time buckets of two
/// observables each.
fn fake_simulator_log(rng: &mut StdRng) -> String {
    let ke0: f64 = rng.gen_range(0.5..3.0);
    let pe0: f64 = rng.gen_range(-2.0..0.0);
    format!(
        "Time = 0\nKE\n{ke0} 0.1\n\nPE\n{pe0} 0.1\n\n\
         Time = 1000\nKE\n{} 0.1\n\nPE\n{} 0.1\n\n",
        ke0 * 1.5,
        pe0 * 0.5,
    )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sweep_db=debug".into()),
        )
        .init();

    println!("=== sweep-db: run ingestion walkthrough ===\n");

    // ------------------------------------------------------------------
    // 1. Parse the sweep template
    // ------------------------------------------------------------------
    println!("1. Parsing template...");
    let template = SweepTemplate::parse("demo-sweep", TEMPLATE_BODY)?;
    for p in template.parameters() {
        println!("   {} {:?} in [{}, {}]", p.name(), p.kind(), p.min(), p.max());
    }

    // ------------------------------------------------------------------
    // 2. Open (and initialise) the dataset directory
    // ------------------------------------------------------------------
    let root = tempfile::tempdir()?;
    let dataset_dir = root.path().join(template.run_id());
    println!("\n2. Opening dataset at {}...", dataset_dir.display());
    Dataset::open_or_init(&template, &dataset_dir)?;

    // ------------------------------------------------------------------
    // 3. Produce a few "runs", each written as a self-contained bundle
    // ------------------------------------------------------------------
    println!("\n3. Producing runs...");
    for seed in 1..=5_u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let id = sample_id(rng.gen());

        let bindings = template.draw(&mut rng);
        let realized = template.substitute(&bindings)?;
        let log_text = fake_simulator_log(&mut rng);

        let matrix = matrix_from_run(&template, &id, &realized, &log_text, "demo;random")?;
        let path = write_bundle(&dataset_dir, &matrix)?;
        println!("   {} -> {}", id, path.display());
    }

    // ------------------------------------------------------------------
    // 4. Absorb the bundles and flush a snapshot
    // ------------------------------------------------------------------
    println!("\n4. Merging bundles...");
    let mut dataset = Dataset::open_or_init(&template, &dataset_dir)?;
    let matrix = dataset.matrix().expect("bundles were absorbed");
    println!("   {} experiments, {} dirty", matrix.len(), dataset.dirty_count());

    let tagged = matrix.tagged("demo").len();
    println!("   {tagged} rows tagged 'demo'");
    for i in 0..matrix.len() {
        let row = matrix.row(i);
        println!(
            "   {}: Temp={:.3} Steps={} KE(t=1000)={:.3}",
            row.id(),
            row.configuration()[0],
            row.configuration()[1],
            row.value(1, 0),
        );
    }

    dataset.flush()?;
    println!("\n5. Snapshot at {}", dataset.snapshot_path().display());

    // Reopening finds everything already merged.
    let reopened = Dataset::open_or_init(&template, &dataset_dir)?;
    println!(
        "   reopened: {} experiments, {} dirty",
        reopened.matrix().map_or(0, sweep_db::ResultsMatrix::len),
        reopened.dirty_count()
    );

    Ok(())
}
