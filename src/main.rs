//! tracesim: replay recorded traces through simulation plugins
//!
//! `replay` feeds a JSON trace document to a built-in plugin or a plugin module and writes the
//! adjusted document back out. `plugins` and `functions` print what is available.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

use tracesim::plugins::BUILTIN_PLUGINS;
use tracesim::replay::{self, Config};
use tracesim::trace::{CollectiveOp, P2PFunc, SingleRankFunc};

#[derive(Parser)]
#[command(name = "tracesim")]
#[command(about = "Replay recorded traces through simulation plugins")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plugin over a trace document
    Replay {
        /// Trace document to read, or - for stdin
        input: PathBuf,

        /// Built-in plugin name or path to a plugin module
        #[arg(short, long, default_value = "noop")]
        plugin: String,

        /// Where to write the processed document (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Parameter passed through to the plugin, may be repeated
        #[arg(long = "plugin-param")]
        plugin_params: Vec<String>,

        /// Length of one clock tick in seconds
        #[arg(long, default_value_t = 1e-9)]
        clock_resolution: f64,

        /// Deliver function events by function id instead of by their tag
        #[arg(long)]
        route_functions: bool,

        #[arg(long)]
        pretty: bool,
    },
    /// List the built-in plugins
    Plugins,
    /// Print the function slot names a trace header's id tables are indexed by
    Functions,
}

fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_functions() -> Result<()> {
    let table = serde_json::json!({
        "single_rank": SingleRankFunc::ALL.iter().map(|f| f.name()).collect::<Vec<_>>(),
        "collective": CollectiveOp::ALL.iter().map(|f| f.name()).collect::<Vec<_>>(),
        "p2p": P2PFunc::ALL.iter().map(|f| f.name()).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            input,
            plugin,
            output,
            plugin_params,
            clock_resolution,
            route_functions,
            pretty,
        } => {
            let config = Config {
                verbosity: cli.verbose,
                plugin,
                input,
                output,
                plugin_params,
                clock_resolution,
                route_functions,
                pretty,
            };
            init_tracing(config.log_level());
            let summary = replay::run(&config)?;
            for (callback, count) in &summary.callbacks {
                tracing::debug!("{callback}: {count}");
            }
            Ok(())
        }
        Commands::Plugins => {
            for name in BUILTIN_PLUGINS {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Functions => print_functions(),
    }
}
