use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use rayon::prelude::*;

use dynein_conformation_rust_lib::config::Config;
use dynein_conformation_rust_lib::metadata::MetadataFile;
use dynein_conformation_rust_lib::output::{
    append_bending_overview, write_pooled_outputs, write_sample_outputs,
};
use dynein_conformation_rust_lib::pipeline::{
    find_sample_dirs, list_sample_names, load_sample, process_sample, PooledAnalysis, SampleAnalysis,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Doublet bending and dynein class statistics for axoneme tomograms")]
struct Args {
    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Path to the per-sample metadata file
    #[clap(short, long, default_value = "metadata.toml")]
    metadata: String,

    /// Directory holding one subdirectory per sample (overrides config)
    #[clap(short, long)]
    input: Option<String>,

    /// Output directory (overrides config)
    #[clap(short, long)]
    output: Option<String>,

    /// Write a metadata template for the samples found and stop
    #[clap(long)]
    init_metadata: bool,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if Path::new(&args.config).exists() {
        Config::from_file(&args.config).with_context(|| format!("loading {}", args.config))?
    } else {
        warn!("{} not found, using default configuration", args.config);
        Config::default()
    };

    // Override config with command-line arguments
    if let Some(input) = args.input.clone() {
        config.input_path = input;
    }
    if let Some(output) = args.output.clone() {
        config.output_base_dir = output;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn analyse(name: &str, dir: &Path, metadata: &MetadataFile, config: &Config) -> Result<SampleAnalysis> {
    info!("Processing: {}", name);
    let sample_meta = metadata.sample(name)?;
    let input = load_sample(dir, name).with_context(|| format!("loading {}", name))?;
    let analysis = process_sample(&input, sample_meta, config)?;
    Ok(analysis)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(&args)?;

    let metadata_path = PathBuf::from(&args.metadata);
    if args.init_metadata || !metadata_path.exists() {
        let names = list_sample_names(&config.input_path)
            .with_context(|| format!("listing samples in {}", config.input_path))?;
        MetadataFile::template(names)
            .save_to_file(&metadata_path)
            .with_context(|| format!("writing {}", metadata_path.display()))?;
        info!(
            "Metadata template written to {}; fill it in and set ready_for_analysis = true",
            metadata_path.display()
        );
        return Ok(());
    }

    let metadata = MetadataFile::from_file(&metadata_path)?;
    metadata.ensure_ready()?;

    let start_time = Instant::now();

    let output_base = PathBuf::from(&config.output_base_dir);
    fs::create_dir_all(&output_base)?;

    let samples: Vec<(String, PathBuf)> = find_sample_dirs(&config.input_path)?
        .into_iter()
        .filter(|(name, _)| {
            let known = metadata.samples.contains_key(name);
            if !known {
                warn!("{} has no metadata entry, moving on", name);
            }
            known
        })
        .collect();
    info!("Found {} samples", samples.len());

    // Samples are independent; results come back in name order either way
    let results: Vec<(String, Result<SampleAnalysis>)> = if config.use_parallel {
        samples
            .par_iter()
            .map(|(name, dir)| (name.clone(), analyse(name, dir, &metadata, &config)))
            .collect()
    } else {
        samples
            .iter()
            .map(|(name, dir)| (name.clone(), analyse(name, dir, &metadata, &config)))
            .collect()
    };

    let overview_path = output_base.join("overview_bending_results.txt");
    if overview_path.exists() {
        fs::remove_file(&overview_path)?;
    }

    let mut pooled = PooledAnalysis::new(&config);
    let mut failed = 0;

    for (name, result) in results {
        let analysis = match result {
            Ok(analysis) => analysis,
            Err(e) => {
                error!("Error processing {}: {:#}", name, e);
                failed += 1;
                continue;
            }
        };

        write_sample_outputs(&analysis, &output_base)?;
        append_bending_overview(&analysis.bend, &overview_path)?;
        pooled.add(&analysis)?;
    }

    write_pooled_outputs(&pooled.finalize(), &config, &output_base)?;

    if failed > 0 {
        warn!("{} samples failed, see the log above", failed);
    }

    let elapsed = start_time.elapsed();
    info!("Processing completed in {:.2} seconds", elapsed.as_secs_f64());

    Ok(())
}
