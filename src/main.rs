//! FeatNorm - Corpus Feature Normalizer

use anyhow::{Context, bail};
use clap::Parser;
use std::process;
use featnorm::features::FeatureStore;
use featnorm::processing::{CohortResolver, CorpusBuilder, NormalizationMode};
use featnorm::storage::{DirectoryStore, RecordStore};
use featnorm::{init_logging, Args, Config, Manifest};

fn main() {
    let args = Args::parse();

    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if args.verbose {
        println!("{}", featnorm::get_library_info());
        println!();
    }

    if let Some(path) = &args.write_default_config {
        Config::create_default_config(path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = Config::from_args_and_config(args.clone())?;

    if !config.manifest_path.exists() {
        bail!("Manifest does not exist: {}", config.manifest_path.display());
    }

    let manifest = Manifest::load(&config.manifest_path)
        .with_context(|| format!("Loading {}", config.manifest_path.display()))?;
    let tables = manifest.boundary_tables()?;
    let features = manifest.feature_store();
    for table in &tables {
        if !features.contains(table.speaker()) {
            bail!("No feature file listed for speaker {}", table.speaker());
        }
    }

    let output = DirectoryStore::new(&config.output_path);
    let convention = config.naming_convention()?;
    let cohort_table = manifest.cohort_table();
    let resolver: &dyn CohortResolver = match &convention {
        Some(convention) => convention,
        None => &cohort_table,
    };

    println!("=== FeatNorm Corpus Builder ===");
    println!("Manifest: {}", config.manifest_path.display());
    println!("Output: {}", config.output_path.display());
    println!("Mode: {} ({})", config.mode().name(),
             if config.training() { "training" } else { "evaluation" });
    println!("Workers: {}", config.workers());
    println!("===============================\n");

    let mut builder = CorpusBuilder::new(config.builder_config(), &features, &output, &output);
    if config.mode() == NormalizationMode::Gender {
        builder = builder.with_cohorts(resolver);
    }
    if !config.training() && config.mode().uses_cohort_statistics() {
        if let Some(path) = &config.statistics_path {
            let statistics = DirectoryStore::new(path)
                .load_statistics()?
                .with_context(|| format!("No statistics found under {}", path.display()))?;
            builder = builder.with_statistics(statistics);
        }
    }

    let summary = builder.run(&tables)?;

    println!("=== Processing Complete ===");
    println!("Time: {:.2}s", summary.processing_time.as_secs_f64());
    println!("Speakers: {}", summary.speakers);
    println!("Utterances: {}", summary.utterances);
    println!("Frames: {}", summary.frames);
    if args.verbose {
        println!("Cohorts: {}", summary.cohorts.join(", "));
    }

    Ok(())
}
