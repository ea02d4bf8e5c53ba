//! Replay a trace document through a plugin.
//!
//! A trace document is JSON with two members: `header`, the [`SetupParams`] of the trace, and
//! `events`, the [`TraceEvent`]s in delivery order. Replaying hands every event to the plugin
//! and keeps whatever the plugin wrote back, so the output document has the same shape as the
//! input.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Level};

use crate::framework::{
    FunctionRoute, Plugin, PluginHost, PluginLibrary, SetupParams, TraceEvent,
};
use crate::plugins::{self, BUILTIN_PLUGINS};

/// Replay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Verbosity level (0 = warn, 1 = info, 2 = debug, 3+ = trace)
    pub verbosity: u8,
    /// Built-in plugin name or path to a plugin module
    pub plugin: String,
    /// Trace document to read, `-` for stdin
    pub input: PathBuf,
    /// Where to write the processed document (None = stdout)
    pub output: Option<PathBuf>,
    /// Parameters passed through to the plugin
    pub plugin_params: Vec<String>,
    /// Length of one clock tick in seconds
    pub clock_resolution: f64,
    /// Deliver function events by function id instead of by their tag
    pub route_functions: bool,
    /// Pretty-print the output document
    pub pretty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbosity: 0,
            plugin: "noop".to_string(),
            input: PathBuf::from("-"),
            output: None,
            plugin_params: Vec::new(),
            clock_resolution: 1e-9,
            route_functions: false,
            pretty: false,
        }
    }
}

impl Config {
    /// Most verbose level to log at.
    pub fn log_level(&self) -> Level {
        match self.verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// A trace as the replay driver reads and writes it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceDocument {
    pub header: SetupParams,
    #[serde(default)]
    pub events: Vec<TraceEvent>,
}

/// What a replay delivered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: u64,
    /// Deliveries per callback name.
    pub callbacks: BTreeMap<&'static str, u64>,
}

/// Resolve a plugin by built-in name, or load it from a module path.
pub fn load_plugin(spec: &str) -> Result<Box<dyn Plugin>> {
    if let Some(plugin) = plugins::builtin(spec) {
        debug!("Using built-in plugin {spec}");
        return Ok(plugin);
    }
    let path = Path::new(spec);
    if !path.exists() {
        bail!(
            "Unknown plugin '{}': expected one of {} or a path to a plugin module",
            spec,
            BUILTIN_PLUGINS.join(", ")
        );
    }
    Ok(Box::new(PluginLibrary::open(path)?))
}

pub fn read_document(path: &Path) -> Result<TraceDocument> {
    let reader: Box<dyn Read> = if path == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(path)
            .with_context(|| format!("Failed to open trace document {}", path.display()))?;
        Box::new(BufReader::new(file))
    };
    serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse trace document {}", path.display()))
}

pub fn write_document(doc: &TraceDocument, output: Option<&Path>, pretty: bool) -> Result<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Failed to create output file {}", path.display())
        })?)),
        None => Box::new(io::stdout().lock()),
    };
    if pretty {
        serde_json::to_writer_pretty(&mut writer, doc)?;
    } else {
        serde_json::to_writer(&mut writer, doc)?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Drive `plugin` through the whole lifecycle over the events of `doc`, in place.
pub fn replay(
    plugin: Box<dyn Plugin>,
    doc: &mut TraceDocument,
    config: &Config,
) -> Result<ReplaySummary> {
    let mut host = PluginHost::new(plugin);
    host.load_params(config.plugin_params.clone());
    host.set_clock_resolution(config.clock_resolution);
    host.setup(&doc.header).context("Invalid trace header")?;
    host.initialize()?;

    let mut summary = ReplaySummary::default();
    for event in doc.events.iter_mut() {
        let routed = match event {
            TraceEvent::Function(ev) | TraceEvent::MpiFunction(ev) if config.route_functions => {
                Some(host.deliver_function(ev))
            }
            _ => None,
        };
        let callback = match routed {
            Some(FunctionRoute::Function) => "process_function_event",
            Some(FunctionRoute::MpiFunction) => "process_mpi_function_event",
            None => {
                host.deliver(event);
                event.callback()
            }
        };
        *summary.callbacks.entry(callback).or_default() += 1;
        summary.events += 1;
    }

    host.finalize()?;
    info!("Replayed {} events", summary.events);
    Ok(summary)
}

/// Read the configured document, replay it and write the result.
pub fn run(config: &Config) -> Result<ReplaySummary> {
    let mut doc = read_document(&config.input)?;
    if doc.events.is_empty() {
        warn!("Trace document {} has no events", config.input.display());
    }
    let plugin = load_plugin(&config.plugin)?;
    let summary = replay(plugin, &mut doc, config)?;
    write_document(&doc, config.output.as_deref(), config.pretty)?;
    Ok(summary)
}
