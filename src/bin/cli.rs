use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pagesentry::config::Config;
use pagesentry::download::{DownloadClassifier, DownloadEvent, DownloadMode};
use pagesentry::error::SentryError;
use pagesentry::output::OutputFormat;
use pagesentry::page::PageSnapshot;
use pagesentry::rulepack::RuleEngine;
use pagesentry::rules::DetectorRegistry;
use pagesentry::ScanOptions;

#[derive(Parser)]
#[command(
    name = "pagesentry",
    about = "Phishing, malicious-script and drive-by download detection for web pages",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a page snapshot (JSON) and decide whether to warn
    Scan {
        /// Path to the snapshot file
        snapshot: PathBuf,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Analysis backend base URL (offline when unset)
        #[arg(long, env = "PAGESENTRY_BACKEND")]
        backend: Option<String>,

        /// Rule-pack file or directory (repeatable)
        #[arg(long, short = 'r')]
        rules: Vec<PathBuf>,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Classify a download by URL and filename
    Classify {
        url: String,
        filename: String,

        /// Block every download regardless of content
        #[arg(long)]
        full_block: bool,
    },

    /// Validate a rule-pack file without loading it anywhere
    CheckRules { path: PathBuf },

    /// List all built-in detectors
    ListDetectors {
        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,
    },

    /// Generate a starter .pagesentry.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan {
            snapshot,
            config,
            backend,
            rules,
            format,
            output,
        } => cmd_scan(snapshot, config, backend, rules, format, output).await,
        Commands::Classify {
            url,
            filename,
            full_block,
        } => cmd_classify(url, filename, full_block),
        Commands::CheckRules { path } => cmd_check_rules(path),
        Commands::ListDetectors { format } => cmd_list_detectors(format),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

async fn cmd_scan(
    snapshot: PathBuf,
    config: Option<PathBuf>,
    backend: Option<String>,
    rules: Vec<PathBuf>,
    format_str: String,
    output_path: Option<PathBuf>,
) -> Result<i32, SentryError> {
    let format = OutputFormat::from_str_lenient(&format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    });

    let page = PageSnapshot::load(&snapshot)?;
    let options = ScanOptions {
        config_path: config,
        backend_url: backend,
        rules,
    };

    let report = pagesentry::scan_page(&page, &options).await?;
    let rendered = pagesentry::render_report(&report, format)?;

    match output_path {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    // Exit code: 0 = no warning, 1 = the page would be flagged
    Ok(if report.decision.is_warned() { 1 } else { 0 })
}

fn cmd_classify(url: String, filename: String, full_block: bool) -> Result<i32, SentryError> {
    let mode = if full_block {
        DownloadMode::FullBlock
    } else {
        DownloadMode::SmartMonitor
    };
    let mut classifier = DownloadClassifier::new();
    let classification = classifier.classify(&DownloadEvent::new(url, filename), mode);

    let verdict = if classification.is_block() { "BLOCK" } else { "ALLOW" };
    println!("{} ({}): {}", verdict, mode, classification.reason);

    Ok(if classification.is_block() { 1 } else { 0 })
}

fn cmd_check_rules(path: PathBuf) -> Result<i32, SentryError> {
    let source = std::fs::read_to_string(&path)?;
    let mut engine = RuleEngine::new();

    match engine.load_plugin(&source) {
        Ok(summary) => {
            println!(
                "OK  {} ({} rules, sha256 {})",
                summary.name, summary.rule_count, summary.digest
            );
            Ok(0)
        }
        Err(e) if e.is_rule_pack_rejection() => {
            println!("REJECTED  {}: {}", path.display(), e);
            Ok(1)
        }
        Err(e) => Err(e),
    }
}

fn cmd_list_detectors(format_str: String) -> Result<i32, SentryError> {
    let registry = DetectorRegistry::new();
    let detectors = registry.list();

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&detectors)?;
            println!("{}", json);
        }
        _ => {
            println!("{:<24} {:<22} {:<10} DESCRIPTION", "ID", "NAME", "SEVERITY");
            println!("{}", "-".repeat(96));
            for d in &detectors {
                println!(
                    "{:<24} {:<22} {:<10} {}",
                    d.id.as_str(),
                    d.name,
                    d.default_severity.to_string(),
                    d.description,
                );
            }
        }
    }

    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, SentryError> {
    let path = PathBuf::from(".pagesentry.toml");

    if path.exists() && !force {
        eprintln!(".pagesentry.toml already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created .pagesentry.toml");

    Ok(0)
}
