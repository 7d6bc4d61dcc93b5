//! hypotree - hypothesis tree state machine
//!
//! Usage:
//!   hypotree serve                                  → JSON-lines requests on stdin, responses on stdout
//!   hypotree call create_tree -p '{"description": "..."}' → run one action, print the result
//!   hypotree list                                   → list known tree ids
//!   hypotree init-config                            → print a default config file
//!   hypotree version                                → show version

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use hypotree_core::{HypotreeConfig, StoreBackend};
use hypotree_dispatch::{serve, Dispatcher};
use hypotree_engine::{AggregationPolicy, TreeManager};
use hypotree_store::open_store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "hypotree.toml";

#[derive(Parser)]
#[command(
    name = "hypotree",
    about = "Hypothesis tree state machine for root-cause analysis",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for tree documents (overrides config and HYPOTREE_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Also write logs to a daily-rolled file in this directory
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-lines requests on stdin, answer on stdout
    Serve,
    /// Run a single action and print its result
    Call {
        /// Action name (create_tree, add_child, set_result, ...)
        action: String,
        /// Action params as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },
    /// List known tree ids
    List,
    /// Print the effective configuration as TOML
    InitConfig,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("hypotree v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let _log_guard = init_tracing(cli.log_file.as_ref());
    let config = load_config(&cli);

    match cli.command {
        Commands::InitConfig => {
            print!("{}", config.to_toml());
        }
        Commands::Serve => {
            let dispatcher = Arc::new(build_dispatcher(&config));
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            serve(dispatcher, stdin, tokio::io::stdout()).await?;
        }
        Commands::Call { action, params } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("--params is not valid JSON")?;
            let dispatcher = build_dispatcher(&config);
            let result = dispatcher.call(&action, &params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::List => {
            let dispatcher = build_dispatcher(&config);
            for id in dispatcher.manager().list_trees().await? {
                println!("{}", id);
            }
        }
        Commands::Version => {}
    }

    Ok(())
}

/// stdout carries protocol output, so logs go to stderr (and optionally a file).
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hypotree.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hypotree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

fn load_config(cli: &Cli) -> HypotreeConfig {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = HypotreeConfig::load(&path).with_env();
    if let Some(store) = &cli.store {
        config.store.path = store.clone();
    }
    config
}

fn build_dispatcher(config: &HypotreeConfig) -> Dispatcher {
    let store = open_store(&config.store);
    if config.store.backend == StoreBackend::Memory {
        tracing::warn!("Memory store: trees will not outlive this process");
    }
    tracing::info!("Tree store: {}", store.location());
    let manager = TreeManager::with_policy(store, AggregationPolicy::from(&config.aggregation))
        .with_cache_limit(config.cache.max_trees);
    Dispatcher::new(Arc::new(manager))
}
