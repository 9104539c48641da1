//! SEDA Package CLI
//!
//! Checks, summarizes and normalizes SEDA transfer manifests.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use seda_package::graph::{
    cycle_groups, normalize_unique_data_object_groups, regenerate_continuous_ids, statistics,
};
use seda_package::{
    digest_file, ArchiveTransfer, DigestAlgorithm, SedaConfig, SedaVersion, UnitLayout,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "seda-tool")]
#[command(about = "Check, summarize and normalize SEDA transfer manifests")]
struct Cli {
    /// Configuration file, layered over seda.toml and SEDA__* variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Imbricate,
    Flat,
}

impl From<LayoutArg> for UnitLayout {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Imbricate => UnitLayout::Imbricate,
            LayoutArg::Flat => UnitLayout::Flat,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Sha256,
    Sha512,
}

impl From<AlgorithmArg> for DigestAlgorithm {
    fn from(algorithm: AlgorithmArg) -> Self {
        match algorithm {
            AlgorithmArg::Sha256 => DigestAlgorithm::Sha256,
            AlgorithmArg::Sha512 => DigestAlgorithm::Sha512,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Read a manifest and verify its references and unit tree
    Check {
        manifest: PathBuf,
        /// Read as this SEDA version instead of the declared namespace
        #[arg(long)]
        seda_version: Option<String>,
    },

    /// Print package statistics
    Stats {
        manifest: PathBuf,
        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Give every unit a single group, renumber ids and write the manifest back
    Normalize {
        manifest: PathBuf,
        /// Output manifest
        #[arg(short, long)]
        output: PathBuf,
        /// Unit layout of the output (defaults to the configured one)
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,
        /// Keep the original ids
        #[arg(long)]
        keep_ids: bool,
    },

    /// Print the digest of a content file
    Digest {
        file: PathBuf,
        #[arg(short, long, value_enum, default_value = "sha512")]
        algorithm: AlgorithmArg,
    },

    /// Show the effective configuration, or save it
    Config {
        /// Write the configuration to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_manifest(config: &SedaConfig, path: &Path, version: Option<SedaVersion>) -> anyhow::Result<ArchiveTransfer> {
    let mut options = config.import_options();
    options.version = version;
    let progress = config.progress_logger();
    ArchiveTransfer::from_file(path, &options, &progress)
        .with_context(|| format!("failed to read manifest {}", path.display()))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SedaConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Check { manifest, seda_version } => {
            let version = seda_version.as_deref().map(SedaVersion::parse).transpose()?;
            let transfer = load_manifest(&config, &manifest, version)?;
            let pkg = &transfer.package;
            println!(
                "{}: {} units, {} groups, {} binary and {} physical objects ({})",
                manifest.display(),
                pkg.unit_count(),
                pkg.group_count(),
                pkg.binary_count(),
                pkg.physical_count(),
                transfer.version,
            );

            let cycles = cycle_groups(pkg);
            if !cycles.is_empty() {
                for group in &cycles {
                    println!("  cycle between units: {}", group.join(", "));
                }
                bail!("{} cycle(s) in the unit graph", cycles.len());
            }
            println!("  references and unit tree are consistent");
            Ok(())
        }

        Commands::Stats { manifest, json } => {
            let transfer = load_manifest(&config, &manifest, None)?;
            let stats = statistics(&transfer.package);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Units:               {}", stats.unit_count);
                println!("  roots:             {}", stats.root_count);
                println!("  unreachable:       {}", stats.unreachable_unit_count);
                println!("  max depth:         {}", stats.max_depth);
                println!("Groups:              {}", stats.group_count);
                println!("Binary objects:      {}", stats.binary_count);
                println!("  ungrouped:         {}", stats.ungrouped_binary_count);
                println!("  total size:        {}", stats.total_size);
                println!("Physical objects:    {}", stats.physical_count);
                println!("  ungrouped:         {}", stats.ungrouped_physical_count);
                println!("Cycle groups:        {}", stats.cycle_group_count);
            }
            Ok(())
        }

        Commands::Normalize {
            manifest,
            output,
            layout,
            keep_ids,
        } => {
            let mut transfer = load_manifest(&config, &manifest, None)?;
            let progress = config.progress_logger();

            let created = normalize_unique_data_object_groups(&mut transfer.package, &progress)
                .context("group normalization failed")?;
            if !keep_ids {
                regenerate_continuous_ids(&mut transfer.package)?;
            }

            let mut options = config.export_options();
            options.version = Some(transfer.version);
            if let Some(layout) = layout {
                options.layout = layout.into();
            }
            transfer
                .write_to_file(&output, &options, &progress)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "{} groups created, manifest written to {} ({} layout)",
                created,
                output.display(),
                options.layout
            );
            Ok(())
        }

        Commands::Digest { file, algorithm } => {
            let algorithm = DigestAlgorithm::from(algorithm);
            let hex = digest_file(&file, algorithm)?;
            println!("{}  {}  {}", algorithm, hex, file.display());
            Ok(())
        }

        Commands::Config { save } => {
            match save {
                Some(path) => {
                    config.save(&path)?;
                    println!("Configuration saved to {}", path.display());
                }
                None => print!("{}", toml::to_string_pretty(&config)?),
            }
            Ok(())
        }
    }
}
