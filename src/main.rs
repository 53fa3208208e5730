//! Covenant — run, check and configure the demo covenant

use clap::{Parser, Subcommand};
use covenant::demo;
use covenant_runtime::{Container, CovenantConfig};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "covenant",
    about = "Covenant: typed journal routing between branches"
)]
struct Cli {
    /// Config file (default: covenant.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send messages through the chat/agent demo covenant
    Demo {
        /// Messages to send (default: a few canned ones)
        messages: Vec<String>,
        /// Repeat the message list this many times
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
    /// Validate the demo covenant and print its compiled graph
    Check,
    /// Print the effective configuration as TOML
    Config,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Some(Commands::Demo { messages, count }) => {
            run_demo(&config, messages, count).await?;
        }

        Some(Commands::Check) => {
            let mut container = Container::new();
            let covenant = demo::build(&config, &mut container)?;
            println!("{}", covenant.describe()?);
            let order: Vec<String> = covenant
                .daemon_order()
                .iter()
                .map(|d| d.to_string())
                .collect();
            println!("daemon start order: {}", order.join(" -> "));
        }

        Some(Commands::Config) => {
            print!("{}", config.to_toml());
        }

        Some(Commands::Version) => {
            println!("covenant v{}", env!("CARGO_PKG_VERSION"));
        }

        // No subcommand = demo with canned messages
        None => {
            run_demo(&config, Vec::new(), 1).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CovenantConfig> {
    match path {
        // An explicit path must exist and parse.
        Some(path) => Ok(CovenantConfig::try_load(path)?),
        None => Ok(CovenantConfig::load(Path::new("covenant.toml"))),
    }
}

async fn run_demo(config: &CovenantConfig, messages: Vec<String>, count: usize) -> anyhow::Result<()> {
    let messages = if messages.is_empty() {
        vec![
            "hello".to_string(),
            "how are the journals today?".to_string(),
            "goodbye".to_string(),
        ]
    } else {
        messages
    };
    let messages: Vec<String> = std::iter::repeat(messages).take(count).flatten().collect();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted; cancelling");
            on_signal.cancel();
        }
    });

    let outcome = demo::run(config, &messages, &cancel).await?;
    for reply in &outcome.replies {
        println!("{}", reply);
    }
    tracing::info!(
        "demo done: {} prompt(s) routed, {} reply window(s) flushed",
        outcome.prompts_routed,
        outcome.windows_flushed
    );
    Ok(())
}
