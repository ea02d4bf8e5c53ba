//! tracesim library - plugin framework for simulating changes to recorded traces.
//!
//! A trace engine replays a recorded parallel-program trace event by event and hands each
//! event to a plugin, which may move end timestamps to model a different machine or library.
//!
//! # Modules
//!
//! - [`buffer`] - Fixed-layout serialization of records into caller-provided buffers
//! - [`hash`] - Chained hash table and the keyed map built on it
//! - [`trace`] - Function id classification and the event records plugins receive
//! - [`framework`] - The [`Plugin`] contract, its context and lifecycle host, module loading
//! - [`plugins`] - Built-in reference plugins
//! - [`replay`] - Replay of JSON trace documents through a plugin
//!
//! # Example
//!
//! ```no_run
//! use tracesim::replay::{self, Config};
//!
//! let config = Config {
//!     plugin: "double".to_string(),
//!     input: "trace.json".into(),
//!     output: Some("doubled.json".into()),
//!     ..Default::default()
//! };
//! replay::run(&config).expect("Failed to replay trace");
//! ```

pub mod buffer;
pub mod framework;
pub mod hash;
pub mod plugins;
pub mod replay;
pub mod trace;

pub use buffer::{BVector, Bufferizable, SMALL_BUFFER};
pub use framework::{Plugin, PluginContext, PluginHost, SetupParams, TraceEvent};
pub use replay::Config;
