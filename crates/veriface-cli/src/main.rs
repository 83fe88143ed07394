use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use veriface_core::{
    AnalyzeOptions, FaceAnalyzer, MockAnalyzer, OnnxAnalyzer, Verification, Verifier,
};
use veriface_db::{Database, PoolOptions};

mod config;
mod worker;

use config::{AnalyzerKind, Config};

#[derive(Parser)]
#[command(name = "veriface", about = "Veriface gender verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create any missing database tables
    InitDb,
    /// Classify one or more face images
    Verify {
        /// Image files to verify
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Print one JSON object per image
        #[arg(long)]
        json: bool,
    },
    /// Show analyzer mode and database reachability
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::InitDb => {
            let db = open_database(&config)?;
            db.init_db().context("schema initialization failed")?;
            println!("Database initialized: {}", config.database_url);
        }
        Commands::Verify { images, json } => {
            let verifier = build_verifier(&config)?;
            run_verify(&config, verifier, images, json).await?;
        }
        Commands::Status => {
            print_status(&config);
        }
    }

    Ok(())
}

fn open_database(config: &Config) -> Result<Database> {
    let options = PoolOptions {
        max_size: config.db_pool_size,
        connect_timeout: config.db_connect_timeout(),
    };
    Database::connect(&config.database_url, &options)
        .with_context(|| format!("cannot open database {}", config.database_url))
}

/// Construct the analyzer selected by configuration. ONNX fails fast if models are missing.
fn build_verifier(config: &Config) -> Result<Verifier> {
    let analyzer: Arc<dyn FaceAnalyzer> = match config.analyzer {
        AnalyzerKind::Onnx => Arc::new(
            OnnxAnalyzer::load(&config.model_dir)
                .with_context(|| format!("loading models from {}", config.model_dir.display()))?,
        ),
        AnalyzerKind::Mock => Arc::new(MockAnalyzer),
    };

    let options = AnalyzeOptions {
        detector_backend: config.detector_backend,
        ..AnalyzeOptions::default()
    };
    Ok(Verifier::new(analyzer, options, config.staging_dir.clone()))
}

async fn run_verify(
    config: &Config,
    verifier: Verifier,
    images: Vec<PathBuf>,
    json: bool,
) -> Result<()> {
    if !verifier.is_authoritative() {
        eprintln!(
            "warning: {} analyzer active, results are random",
            verifier.analyzer_name().to_uppercase()
        );
    }

    let mut tasks = Vec::with_capacity(images.len());
    for path in images {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let task = tokio::spawn(worker::verify(verifier.clone(), bytes, config.verify_timeout()));
        tasks.push((path, task));
    }

    for (path, task) in tasks {
        let outcome = task.await.context("verification task panicked")?;
        if json {
            let line = serde_json::json!({
                "image": path.display().to_string(),
                "analyzer": verifier.analyzer_name(),
                "authoritative": verifier.is_authoritative(),
                "result": outcome.into_report(),
            });
            println!("{line}");
        } else {
            match outcome {
                Verification::Verified(label) => println!("{}: {label}", path.display()),
                Verification::Rejected(reason) => println!("{}: {reason}", path.display()),
            }
        }
    }
    Ok(())
}

fn print_status(config: &Config) {
    let analyzer = match config.analyzer {
        AnalyzerKind::Onnx => format!("onnx ({})", config.model_dir.display()),
        AnalyzerKind::Mock => "MOCK (random, non-authoritative)".to_string(),
    };
    let database = match open_database(config).and_then(|db| db.ping().map_err(Into::into)) {
        Ok(()) => "reachable".to_string(),
        Err(err) => format!("unreachable: {err:#}"),
    };

    let status = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "environment": format!("{:?}", config.environment).to_lowercase(),
        "analyzer": analyzer,
        "detector_backend": config.detector_backend.to_string(),
        "staging_dir": config.staging_dir.display().to_string(),
        "database": config.database_url,
        "database_status": database,
    });
    println!("{status:#}");
}
