//! searchlift CLI
//!
//! Moves documents and index mappings between search clusters and files.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use searchlift::config::DriverConfig;
use searchlift::drivers::create_driver;
use searchlift::{MigrationConfig, Pipeline, TransferOptions};

#[derive(Parser)]
#[command(name = "searchlift")]
#[command(version)]
#[command(about = "Move documents and index mappings between search clusters and files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a migration from a config file
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Replicate metadata and fetch data, but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Batch size override
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Show the option schema each driver declares
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            config,
            dry_run,
            batch_size,
        } => {
            if let Err(e) = run_migration(&config, dry_run, batch_size).await {
                error!("Migration failed: {e}");
                std::process::exit(1);
            }
        }
        Commands::Validate { config } => {
            if let Err(e) = validate_config(&config) {
                error!("{e}");
                std::process::exit(1);
            }
        }
        Commands::Info => {
            print_driver_info();
        }
    }

    Ok(())
}

async fn run_migration(
    config_path: &PathBuf,
    dry_run: bool,
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    info!("Loading configuration from {:?}", config_path);

    let mut config = MigrationConfig::from_file(config_path)?;
    if dry_run {
        config.options.dry_run = true;
    }
    if let Some(size) = batch_size {
        config.options.batch_size = size;
    }
    config.validate()?;

    let mut pipeline = Pipeline::new(config);
    let stats = pipeline.run().await?;

    println!("\nMigration complete");
    println!("   Documents: {}", stats.transferred);
    println!("   Batches:   {}", stats.batches);
    println!("   Duration:  {:.2}s", stats.duration_secs);
    println!("   Throughput: {:.0} docs/sec", stats.throughput());

    Ok(())
}

fn validate_config(config_path: &PathBuf) -> anyhow::Result<()> {
    let config = MigrationConfig::from_file(config_path)?;
    config.validate()?;

    println!("Configuration is valid");
    println!("   Source: {}", config.source.id());
    println!("   Target: {}", config.target.id());
    println!("   Batch size: {}", config.options.batch_size);

    Ok(())
}

fn print_driver_info() {
    let options = TransferOptions::default();
    let configs = [
        serde_yaml::from_str::<DriverConfig>("type: elasticsearch\nurl: http://localhost:9200"),
        serde_yaml::from_str::<DriverConfig>("type: csv\nfile: out.csv"),
        serde_yaml::from_str::<DriverConfig>("type: kv"),
    ];

    for config in configs.into_iter().flatten() {
        let info = create_driver(&config, &options).info();
        println!("\n{} ({}) v{}", info.name, info.id, info.version);
        println!("   {}", info.description);
        for opt in &info.options {
            let kind = if opt.flag { "flag" } else { "value" };
            let required = if opt.required { ", required" } else { "" };
            let default = opt
                .default
                .map(|d| format!(", default {d}"))
                .unwrap_or_default();
            println!(
                "   -{}, {:<18} {} ({kind}{required}{default})",
                opt.abbr, opt.name, opt.help
            );
        }
    }
}
