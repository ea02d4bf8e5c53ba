//! The plugin contract and the machinery that drives it.
//!
//! A trace engine creates one plugin per trace and drives it through a fixed lifecycle:
//!
//! 1. optional [`PluginContext::load_params`] and [`PluginContext::set_clock_resolution`]
//! 2. [`PluginContext::setup`], which copies the trace's id tables once
//! 3. [`Plugin::initialize`]
//! 4. one callback per event, in trace order
//! 5. [`Plugin::finalize`]
//!
//! [`PluginHost`] enforces that order for in-process use. Plugins built as shared objects
//! export their factory with [`declare_plugin!`](crate::declare_plugin) and are loaded with
//! [`PluginLibrary::open`].
//!
//! Callbacks receive records by mutable reference. Only end timestamps are writable; the
//! records expose no other setters.

pub mod host;
mod loader;
mod table;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hash::HashMap;
use crate::trace::{CollOpInfo, CommId, FuncEventInfo, FunctionId, P2PInfo, Timestamp};

pub use host::{LifecycleState, PluginHost, TraceEvent};
pub use loader::{CreateFn, DestroyFn, PluginLibrary, CREATE_SYMBOL, DESTROY_SYMBOL};
pub use table::{FunctionKind, FunctionRoute, FunctionTable, P2PRoute, SetupError};

/// A simulation module consuming trace events.
///
/// Every callback runs to completion on the engine's thread before the next event is
/// delivered. The hooks have no error channel; a plugin that can fail during start-up or
/// shutdown overrides [`try_initialize`](Plugin::try_initialize) or
/// [`try_finalize`](Plugin::try_finalize) instead.
pub trait Plugin {
    /// Called once after setup, before any event.
    fn initialize(&mut self, ctx: &PluginContext);

    /// Called once after the last event.
    fn finalize(&mut self, ctx: &PluginContext);

    /// An application function call.
    fn process_function_event(&mut self, ctx: &PluginContext, event: &mut FuncEventInfo);

    /// A stretch of a thread with tracing off, including the gap before its first event.
    fn process_non_tracing_event(&mut self, ctx: &PluginContext, event: &mut FuncEventInfo);

    /// An MPI call that involves only the calling rank.
    fn process_mpi_function_event(&mut self, ctx: &PluginContext, event: &mut FuncEventInfo);

    /// One collective operation. There is a single call per operation, covering every
    /// participating thread.
    fn process_coll_op(&mut self, ctx: &PluginContext, coll_op: &mut CollOpInfo);

    /// A matched message whose send was blocking, synchronous or a send-receive.
    fn process_p2p(&mut self, ctx: &PluginContext, message: &mut P2PInfo);

    /// A matched message whose send was non-blocking, together with the send call's own
    /// event.
    fn process_nonblocking_send(
        &mut self,
        ctx: &PluginContext,
        event: &mut FuncEventInfo,
        message: &mut P2PInfo,
    );

    /// Every message completed by one wait-all or wait-some call. No per-message function
    /// event exists for these.
    fn process_p2p_wait_all_some(&mut self, ctx: &PluginContext, messages: &mut [P2PInfo]);

    fn try_initialize(&mut self, ctx: &PluginContext) -> anyhow::Result<()> {
        self.initialize(ctx);
        Ok(())
    }

    fn try_finalize(&mut self, ctx: &PluginContext) -> anyhow::Result<()> {
        self.finalize(ctx);
        Ok(())
    }
}

/// Per-trace data handed to setup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupParams {
    /// Trace id per [`SingleRankFunc`](crate::trace::SingleRankFunc) slot.
    pub single_rank_ids: Vec<FunctionId>,
    /// Trace id per [`CollectiveOp`](crate::trace::CollectiveOp) slot.
    pub collective_ids: Vec<FunctionId>,
    /// Trace id per [`P2PFunc`](crate::trace::P2PFunc) slot.
    pub p2p_ids: Vec<FunctionId>,
    #[serde(default)]
    pub communicators: BTreeMap<CommId, String>,
    #[serde(default)]
    pub trace_path: Option<PathBuf>,
    #[serde(default)]
    pub trace_start: Timestamp,
    #[serde(default)]
    pub trace_end: Timestamp,
    #[serde(default)]
    pub thread_count: u32,
}

/// Everything a plugin may read while processing a trace.
#[derive(Clone, Debug)]
pub struct PluginContext {
    params: Vec<String>,
    clock_resolution: f64,
    trace_path: Option<PathBuf>,
    trace_start: Timestamp,
    trace_end: Timestamp,
    thread_count: u32,
    functions: FunctionTable,
    communicators: HashMap<CommId, String>,
}

impl Default for PluginContext {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            clock_resolution: 1e-9,
            trace_path: None,
            trace_start: 0,
            trace_end: 0,
            thread_count: 0,
            functions: FunctionTable::default(),
            communicators: HashMap::new(),
        }
    }
}

impl PluginContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command-line parameters the engine did not recognise. They are passed through
    /// unvalidated.
    pub fn load_params(&mut self, params: Vec<String>) {
        self.params = params;
    }

    /// Length of one clock tick in seconds.
    pub fn set_clock_resolution(&mut self, seconds: f64) {
        self.clock_resolution = seconds;
    }

    /// Copy the trace's id tables and metadata.
    pub fn setup(&mut self, params: &SetupParams) -> Result<(), SetupError> {
        self.functions = FunctionTable::new(
            &params.single_rank_ids,
            &params.collective_ids,
            &params.p2p_ids,
        )?;

        let mut communicators: HashMap<CommId, String> =
            HashMap::with_buckets(params.communicators.len().max(1));
        for (id, name) in &params.communicators {
            communicators.insert(*id, name.clone());
        }
        self.communicators = communicators;

        self.trace_path = params.trace_path.clone();
        self.trace_start = params.trace_start;
        self.trace_end = params.trace_end;
        self.thread_count = params.thread_count;

        debug!(
            "Set up {} functions, {} communicators, {} threads",
            self.functions.present_count(),
            self.communicators.count(),
            self.thread_count
        );
        Ok(())
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn clock_resolution(&self) -> f64 {
        self.clock_resolution
    }

    pub fn ticks_to_seconds(&self, ticks: Timestamp) -> f64 {
        ticks as f64 * self.clock_resolution
    }

    /// Directory or file the trace was read from, if known.
    pub fn trace_path(&self) -> Option<&Path> {
        self.trace_path.as_deref()
    }

    pub fn trace_start(&self) -> Timestamp {
        self.trace_start
    }

    pub fn trace_end(&self) -> Timestamp {
        self.trace_end
    }

    pub fn thread_count(&self) -> u32 {
        self.thread_count
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn communicator_name(&self, id: CommId) -> Option<&str> {
        self.communicators.find(&id).map(String::as_str)
    }

    pub fn communicators(&self) -> &HashMap<CommId, String> {
        &self.communicators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{NOT_PRESENT, NUM_COLLECTIVES, NUM_P2P, NUM_SINGLE_RANKS};

    fn params() -> SetupParams {
        SetupParams {
            single_rank_ids: vec![NOT_PRESENT; NUM_SINGLE_RANKS],
            collective_ids: vec![NOT_PRESENT; NUM_COLLECTIVES],
            p2p_ids: vec![NOT_PRESENT; NUM_P2P],
            communicators: BTreeMap::from([(0, "MPI_COMM_WORLD".into()), (1, "row".into())]),
            trace_path: Some(PathBuf::from("/traces/run.stf")),
            trace_start: 10,
            trace_end: 5000,
            thread_count: 4,
        }
    }

    #[test]
    fn test_setup_copies_metadata() {
        let mut ctx = PluginContext::new();
        ctx.load_params(vec!["--scale=2".into()]);
        ctx.set_clock_resolution(1e-6);
        ctx.setup(&params()).unwrap();

        assert_eq!(ctx.params(), ["--scale=2"]);
        assert_eq!(ctx.communicator_name(0), Some("MPI_COMM_WORLD"));
        assert_eq!(ctx.communicator_name(1), Some("row"));
        assert_eq!(ctx.communicator_name(2), None);
        assert_eq!(ctx.communicators().count(), 2);
        assert_eq!(ctx.trace_path(), Some(Path::new("/traces/run.stf")));
        assert_eq!(ctx.trace_end() - ctx.trace_start(), 4990);
        assert_eq!(ctx.thread_count(), 4);
        assert!((ctx.ticks_to_seconds(2_000_000) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_setup_rejects_bad_tables() {
        let mut ctx = PluginContext::new();
        let mut bad = params();
        bad.p2p_ids.pop();
        assert!(matches!(
            ctx.setup(&bad),
            Err(SetupError::WrongLength { got: 20, .. })
        ));
    }

    #[test]
    fn test_setup_params_json() {
        let json = serde_json::to_string(&params()).unwrap();
        let back: SetupParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params());
    }
}
