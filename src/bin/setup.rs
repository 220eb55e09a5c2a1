//! fedagg-setup: create the server encryption context and publish it
//!
//! Generates CKKS keys for a secure aggregation deployment and writes the
//! public context snapshot clients need before round 1.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Parser;
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ckks_fedagg::config::{AggregatorConfig, DEFAULT_PUBLIC_CONTEXT_PATH};
use ckks_fedagg::params::CkksParams;
use ckks_fedagg::EncryptionContext;

#[derive(Parser)]
#[command(name = "fedagg-setup")]
#[command(about = "Generate and publish the CKKS context for secure aggregation")]
#[command(version)]
struct Args {
    /// Aggregator configuration (JSON). Defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for the public context and metadata
    #[arg(long, default_value = "fedagg_data")]
    output_dir: PathBuf,

    /// Ring dimension override (8192 or 16384)
    #[arg(long)]
    ring_dim: Option<usize>,

    /// Random seed for deterministic key generation (testing only)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AggregatorConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AggregatorConfig::default(),
    };

    if let Some(ring_dim) = args.ring_dim {
        config.encryption = match ring_dim {
            8192 => CkksParams {
                galois_keys: config.encryption.galois_keys,
                ..CkksParams::secure_128_n8192()
            },
            16384 => CkksParams {
                galois_keys: config.encryption.galois_keys,
                ..CkksParams::secure_128_n16384()
            },
            _ => {
                return Err(eyre::eyre!(
                    "Invalid ring dimension: {}. Must be 8192 or 16384",
                    ring_dim
                ));
            }
        };
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config
        .validate()
        .map_err(|e| eyre::eyre!("Invalid configuration: {}", e))?;

    info!("Secure aggregation setup");
    info!("Output directory: {}", args.output_dir.display());
    info!("Ring dimension: {}", config.encryption.poly_modulus_degree);
    info!("Modulus chain: {:?}", config.encryption.coeff_mod_bit_sizes);
    info!("Aggregation mode: {:?}", config.aggregation.mode);

    let total_start = Instant::now();

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Generating keys...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let ctx = match config.seed {
        Some(seed) => EncryptionContext::create_with_seed(config.encryption.clone(), seed),
        None => EncryptionContext::create(config.encryption.clone()),
    }
    .with_context(|| "Failed to create encryption context")?;

    pb.finish_with_message("Keys generated");

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory: {}", args.output_dir.display())
    })?;

    let context_path = args.output_dir.join(DEFAULT_PUBLIC_CONTEXT_PATH);
    let context_size = ctx
        .save_public(&context_path)
        .with_context(|| format!("Failed to write {}", context_path.display()))?;

    save_metadata(&args.output_dir, &config, &ctx, context_size)?;

    let total_time = total_start.elapsed();
    info!("Total setup time: {:.2?}", total_time);

    println!();
    println!("=== Setup Complete ===");
    println!("Output directory: {}", args.output_dir.display());
    println!("Context id: {}", hex::encode(ctx.context_id()));
    println!("Ring dimension: {}", ctx.params().poly_modulus_degree);
    println!("Slots per ciphertext: {}", ctx.slot_count());
    println!(
        "Public context size: {:.2} MB",
        context_size as f64 / (1024.0 * 1024.0)
    );
    println!("Total time: {:.2?}", total_time);

    Ok(())
}

fn save_metadata(
    output_dir: &Path,
    config: &AggregatorConfig,
    ctx: &EncryptionContext,
    context_size: usize,
) -> Result<()> {
    #[derive(Serialize)]
    struct Metadata<'a> {
        version: &'a str,
        context_id: String,
        poly_modulus_degree: usize,
        coeff_mod_bit_sizes: &'a [u32],
        moduli: Vec<String>,
        global_scale: f64,
        slot_count: usize,
        galois_keys: usize,
        aggregation: &'a ckks_fedagg::config::AggregationSettings,
        public_context_bytes: usize,
    }

    let params = ctx.params();
    let metadata = Metadata {
        version: env!("CARGO_PKG_VERSION"),
        context_id: hex::encode(ctx.context_id()),
        poly_modulus_degree: params.poly_modulus_degree,
        coeff_mod_bit_sizes: &params.coeff_mod_bit_sizes,
        moduli: ctx.ring().all_moduli().iter().map(u64::to_string).collect(),
        global_scale: params.global_scale,
        slot_count: ctx.slot_count(),
        galois_keys: ctx.galois_keys().map_or(0, |k| k.len()),
        aggregation: &config.aggregation,
        public_context_bytes: context_size,
    };

    let meta_path = output_dir.join("metadata.json");
    let meta_file = File::create(&meta_path)
        .with_context(|| format!("Failed to create {}", meta_path.display()))?;
    serde_json::to_writer_pretty(meta_file, &metadata)?;

    info!("Metadata saved to {}", meta_path.display());
    Ok(())
}
