//! bimgraph CLI.
//!
//! Imports IFC building models into a property graph (Neo4j or FalkorDB),
//! plus the small operational commands that go with an importer: statistics
//! and a guarded full clear.
//!
//! Exit codes: 0 for full or partial success (and for an empty input
//! directory), 1 for setup errors or a run where every file failed, 130 when
//! interrupted.

use anyhow::Result;
use bimgraph_cli::config::{self, Backend};
use bimgraph_cli::convert::{self, Converter};
use bimgraph_store::GraphStore;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "bimgraph",
    version,
    about = "Import IFC building models into a property graph"
)]
struct Cli {
    /// Log level
    #[arg(
        long,
        global = true,
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    log_level: String,

    /// Disable the timestamped log file under logs/
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import every .ifc file from a directory
    Import {
        /// Input directory containing IFC files
        #[arg(long, default_value = "input")]
        input_dir: PathBuf,

        /// Graph backend to write to
        #[arg(long, value_enum, default_value_t = Backend::Neo4j)]
        backend: Backend,

        /// Delete all existing graph data before importing (asks first)
        #[arg(long)]
        clear_db: bool,

        /// Skip the confirmation prompt when clearing
        #[arg(long, requires = "clear_db")]
        force_clear: bool,

        /// Print database statistics after the run
        #[arg(long)]
        stats: bool,

        /// Compare extracted counts against stored totals after the run
        #[arg(long)]
        validate: bool,
    },

    /// Print graph statistics
    Stats {
        #[arg(long, value_enum, default_value_t = Backend::Neo4j)]
        backend: Backend,
    },

    /// Delete every node and relationship in the graph
    Clear {
        #[arg(long, value_enum, default_value_t = Backend::Neo4j)]
        backend: Backend,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_file = if cli.no_log_file {
        None
    } else {
        Some(log_file_path())
    };
    if let Err(err) = init_tracing(&cli.log_level, log_file.as_deref()) {
        eprintln!("Error: failed to initialize logging: {err:#}");
        std::process::exit(1);
    }
    if let Some(path) = &log_file {
        tracing::info!(log_file = %path.display(), "file logging enabled");
    }

    // One file at a time, one connection: a current-thread runtime is all
    // the importer needs.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Error: failed to create runtime: {err}");
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(run(cli.command));
    std::process::exit(code);
}

async fn run(command: Commands) -> i32 {
    match command {
        Commands::Import {
            input_dir,
            backend,
            clear_db,
            force_clear,
            stats,
            validate,
        } => run_import(&input_dir, backend, clear_db, force_clear, stats, validate).await,
        Commands::Stats { backend } => run_stats(backend).await,
        Commands::Clear { backend, force } => run_clear(backend, force).await,
    }
}

async fn run_import(
    input_dir: &Path,
    backend: Backend,
    clear_db: bool,
    force_clear: bool,
    stats: bool,
    validate: bool,
) -> i32 {
    println!("{}", "bimgraph: IFC to property graph importer".bold());

    if !input_dir.is_dir() {
        tracing::error!(dir = %input_dir.display(), "input directory does not exist");
        eprintln!("Error: input directory not found: {}", input_dir.display());
        return 1;
    }

    let files = match convert::discover_files(input_dir) {
        Ok(files) => files,
        Err(err) => {
            tracing::error!(dir = %input_dir.display(), error = %err, "cannot list input directory");
            eprintln!("Error: cannot read {}: {err}", input_dir.display());
            return 1;
        }
    };
    if files.is_empty() {
        tracing::warn!(dir = %input_dir.display(), "no IFC files found");
        println!(
            "{} no IFC files found in {}",
            "Warning:".yellow(),
            input_dir.display()
        );
        return 0;
    }

    println!("Found {} IFC file(s):", files.len());
    for file in &files {
        println!("  {}", file.file_name().unwrap_or_default().to_string_lossy());
    }

    println!("\nConnecting to {backend}...");
    let store = match config::open_store(backend).await {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(backend = %backend, error = %err, "connection failed");
            eprintln!("Error: cannot connect to {backend}: {err:#}");
            return 1;
        }
    };
    println!("{}", "Connected.".green());

    if clear_db && !clear_with_confirmation(store.as_ref(), force_clear).await {
        println!("Proceeding without clearing the database...");
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    println!("\nStarting conversion...");
    let converter = Converter::new(store);
    let results = converter.convert_files(&files, &interrupted).await;

    if interrupted.load(Ordering::SeqCst) {
        println!("\n{}", "Interrupted.".red());
        converter.store().close().await;
        return 130;
    }

    let stats_report = if stats {
        println!("\nCollecting statistics...");
        match converter.store().stats().await {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::error!(error = %err, "statistics collection failed");
                None
            }
        }
    } else {
        None
    };

    if validate {
        if let Some(first) = files.first() {
            match converter.validate_file(first).await {
                Ok(report) => convert::print_validation(&report),
                Err(err) => println!("Validation failed: {err:#}"),
            }
        }
    }

    convert::print_summary(&results, stats_report.as_ref());
    converter.store().close().await;
    convert::exit_code(&results)
}

async fn run_stats(backend: Backend) -> i32 {
    let store = match config::open_store(backend).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error: cannot connect to {backend}: {err:#}");
            return 1;
        }
    };
    let code = match store.stats().await {
        Ok(report) => {
            convert::print_stats(&report);
            0
        }
        Err(err) => {
            eprintln!("Error: statistics query failed: {err}");
            1
        }
    };
    store.close().await;
    code
}

async fn run_clear(backend: Backend, force: bool) -> i32 {
    let store = match config::open_store(backend).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error: cannot connect to {backend}: {err:#}");
            return 1;
        }
    };
    let cleared = clear_with_confirmation(store.as_ref(), force).await;
    store.close().await;
    if cleared {
        0
    } else {
        1
    }
}

/// Ask before wiping the graph, unless forced. Returns whether the clear
/// actually ran and succeeded.
async fn clear_with_confirmation(store: &dyn GraphStore, force: bool) -> bool {
    if force {
        tracing::info!("clearing database without confirmation");
        println!("\nForce clearing database...");
    } else {
        println!(
            "\n{} this will delete ALL data in the target graph!",
            "WARNING:".red().bold()
        );
        if !confirm("Do you want to continue? (yes/no): ") {
            tracing::info!("database clear cancelled by user");
            println!("Database clear cancelled.");
            return false;
        }
        println!("Clearing database...");
    }

    match store.clear().await {
        Ok(()) => {
            tracing::info!("database cleared");
            println!("{}", "Database cleared.".green());
            true
        }
        Err(err) => {
            tracing::error!(error = %err, "database clear failed");
            println!("{} database clear failed: {err}", "Warning:".yellow());
            false
        }
    }
}

fn confirm(prompt: &str) -> bool {
    loop {
        print!("{prompt}");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => return true,
            "no" | "n" => return false,
            _ => println!("Please enter 'yes' or 'no'"),
        }
    }
}

fn log_file_path() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from("logs").join(format!("bimgraph_import_{stamp}.log"))
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let console = tracing_subscriber::fmt::layer().with_target(false);
    let registry = tracing_subscriber::registry().with(filter).with(console);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = Arc::new(std::fs::File::create(path)?);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(move || Arc::clone(&file)),
                )
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}
