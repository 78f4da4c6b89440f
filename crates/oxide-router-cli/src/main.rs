//! oxide-route CLI
//!
//! Command-line tool for checking, querying and benchmarking route tables.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use oxide_router::Method;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_router_cli::{bench, static_paths, MatchLine, RouteTable, WarmState};

/// Inspect and exercise oxide-router route tables.
#[derive(Parser)]
#[command(name = "oxide-route")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Route table (JSON).
    #[arg(short, long, env = "OXIDE_ROUTES", default_value = "routes.json")]
    routes: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the router and print its build metadata.
    Check,

    /// Match paths and print one JSON line per path.
    Match {
        /// HTTP method.
        method: Method,

        /// Request paths.
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print the compiled layout.
    Layout,

    /// Match paths repeatedly and report throughput and cache statistics.
    Bench {
        /// HTTP method.
        #[arg(short, long, default_value = "GET")]
        method: Method,

        /// Rounds over the path list.
        #[arg(short = 'n', long, default_value_t = 10_000)]
        iterations: usize,

        /// Warm-state file, loaded before and written after the run.
        #[arg(long)]
        state: Option<PathBuf>,

        /// Request paths (static routes of the method if not specified).
        paths: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let table = RouteTable::load(&cli.routes)?;
    let mut router = table.build()?;

    match cli.command {
        Commands::Check => {
            info!(routes = router.routes().len(), "route table is valid");
            match router.metadata() {
                Some(metadata) => println!("{}", serde_json::to_string_pretty(metadata)?),
                None => info!("metadata pass is disabled; nothing to print"),
            }
        }

        Commands::Match { method, paths } => {
            let mut unmatched = 0;
            for path in &paths {
                let line = MatchLine::resolve(&mut router, method, path);
                if !line.is_match() {
                    unmatched += 1;
                }
                println!("{}", serde_json::to_string(&line)?);
            }
            if unmatched > 0 {
                anyhow::bail!("{unmatched} of {} paths did not match", paths.len());
            }
        }

        Commands::Layout => {
            println!("{}", serde_json::to_string_pretty(&router.layout_snapshot())?);
        }

        Commands::Bench {
            method,
            iterations,
            state,
            paths,
        } => {
            if let Some(path) = state.as_deref().filter(|p| p.exists()) {
                WarmState::load(path)?.apply(&mut router);
            }
            let paths = if paths.is_empty() {
                static_paths(&router, method)
            } else {
                paths
            };
            if paths.is_empty() {
                anyhow::bail!("no paths to benchmark; pass some or register static {method} routes");
            }

            info!(paths = paths.len(), iterations, "benchmarking");
            let report = bench(&mut router, method, &paths, iterations);
            println!("{}", serde_json::to_string_pretty(&report)?);

            if let Some(path) = &state {
                WarmState::capture(&router).save(path)?;
                info!("Wrote warm state to {}", path.display());
            }
        }
    }

    Ok(())
}
