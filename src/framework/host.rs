//! In-process driver that enforces the plugin lifecycle.

use std::fmt;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{FunctionRoute, P2PRoute, Plugin, PluginContext, SetupError, SetupParams};
use crate::trace::{CollOpInfo, FuncEventInfo, P2PInfo};

/// Position of a plugin in its lifecycle. Transitions only ever move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Uninitialized,
    Configured,
    Initialized,
    Processing,
    Finalized,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Configured => "configured",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Processing => "processing",
            LifecycleState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// One event as the engine delivers it, tagged with the callback it goes to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Function(FuncEventInfo),
    NonTracing(FuncEventInfo),
    MpiFunction(FuncEventInfo),
    CollOp(CollOpInfo),
    #[serde(rename = "p2p")]
    P2P(P2PInfo),
    NonBlockingSend {
        event: FuncEventInfo,
        message: P2PInfo,
    },
    WaitAllSome {
        messages: Vec<P2PInfo>,
    },
}

impl TraceEvent {
    /// Name of the callback the event is delivered to.
    pub fn callback(&self) -> &'static str {
        match self {
            TraceEvent::Function(_) => "process_function_event",
            TraceEvent::NonTracing(_) => "process_non_tracing_event",
            TraceEvent::MpiFunction(_) => "process_mpi_function_event",
            TraceEvent::CollOp(_) => "process_coll_op",
            TraceEvent::P2P(_) => "process_p2p",
            TraceEvent::NonBlockingSend { .. } => "process_nonblocking_send",
            TraceEvent::WaitAllSome { .. } => "process_p2p_wait_all_some",
        }
    }
}

/// Owns a plugin and its context and delivers events to it in lifecycle order.
///
/// Calling a method in the wrong state is a bug in the engine and panics.
pub struct PluginHost {
    plugin: Box<dyn Plugin>,
    ctx: PluginContext,
    state: LifecycleState,
    delivered: u64,
}

impl PluginHost {
    pub fn new(plugin: Box<dyn Plugin>) -> Self {
        Self {
            plugin,
            ctx: PluginContext::new(),
            state: LifecycleState::Uninitialized,
            delivered: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    /// Number of events delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn expect_state(&self, call: &str, allowed: &[LifecycleState]) {
        assert!(
            allowed.contains(&self.state),
            "PluginHost::{call} called while {}",
            self.state
        );
    }

    fn transition(&mut self, to: LifecycleState) {
        debug!("Plugin lifecycle {} -> {}", self.state, to);
        self.state = to;
    }

    pub fn load_params(&mut self, params: Vec<String>) {
        self.expect_state("load_params", &[LifecycleState::Uninitialized]);
        self.ctx.load_params(params);
    }

    pub fn set_clock_resolution(&mut self, seconds: f64) {
        self.expect_state("set_clock_resolution", &[LifecycleState::Uninitialized]);
        self.ctx.set_clock_resolution(seconds);
    }

    /// Copy the trace's tables into the context. On error the host stays uninitialized.
    pub fn setup(&mut self, params: &SetupParams) -> Result<(), SetupError> {
        self.expect_state("setup", &[LifecycleState::Uninitialized]);
        self.ctx.setup(params)?;
        self.transition(LifecycleState::Configured);
        Ok(())
    }

    /// Run the plugin's start-up hook. On error the host stays configured.
    pub fn initialize(&mut self) -> anyhow::Result<()> {
        self.expect_state("initialize", &[LifecycleState::Configured]);
        self.plugin
            .try_initialize(&self.ctx)
            .context("Plugin failed to initialize")?;
        self.transition(LifecycleState::Initialized);
        Ok(())
    }

    fn begin_event(&mut self, call: &str) {
        self.expect_state(
            call,
            &[LifecycleState::Initialized, LifecycleState::Processing],
        );
        if self.state == LifecycleState::Initialized {
            self.transition(LifecycleState::Processing);
        }
        self.delivered += 1;
    }

    /// Deliver one event to the callback its variant names.
    pub fn deliver(&mut self, event: &mut TraceEvent) {
        self.begin_event("deliver");
        let ctx = &self.ctx;
        let plugin = self.plugin.as_mut();
        match event {
            TraceEvent::Function(ev) => plugin.process_function_event(ctx, ev),
            TraceEvent::NonTracing(ev) => plugin.process_non_tracing_event(ctx, ev),
            TraceEvent::MpiFunction(ev) => plugin.process_mpi_function_event(ctx, ev),
            TraceEvent::CollOp(op) => plugin.process_coll_op(ctx, op),
            TraceEvent::P2P(msg) => plugin.process_p2p(ctx, msg),
            TraceEvent::NonBlockingSend { event, message } => {
                plugin.process_nonblocking_send(ctx, event, message)
            }
            TraceEvent::WaitAllSome { messages } => plugin.process_p2p_wait_all_some(ctx, messages),
        }
    }

    /// Deliver a function event, choosing the callback from its function id.
    pub fn deliver_function(&mut self, event: &mut FuncEventInfo) -> FunctionRoute {
        self.begin_event("deliver_function");
        let route = self.ctx.functions().function_route(event.func());
        match route {
            FunctionRoute::Function => self.plugin.process_function_event(&self.ctx, event),
            FunctionRoute::MpiFunction => self.plugin.process_mpi_function_event(&self.ctx, event),
        }
        route
    }

    /// Deliver a matched message, choosing the callback from its send call. `send_event` is
    /// the send call's own event and only reaches the plugin for non-blocking sends.
    pub fn deliver_message(
        &mut self,
        send_event: &mut FuncEventInfo,
        message: &mut P2PInfo,
    ) -> P2PRoute {
        self.begin_event("deliver_message");
        let route = self.ctx.functions().p2p_route(message.send_fid());
        match route {
            P2PRoute::P2P => self.plugin.process_p2p(&self.ctx, message),
            P2PRoute::NonBlockingSend => {
                self.plugin
                    .process_nonblocking_send(&self.ctx, send_event, message)
            }
        }
        route
    }

    /// Run the plugin's shutdown hook. The host is finalized even if the hook fails.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.expect_state(
            "finalize",
            &[LifecycleState::Initialized, LifecycleState::Processing],
        );
        let result = self
            .plugin
            .try_finalize(&self.ctx)
            .context("Plugin failed to finalize");
        self.transition(LifecycleState::Finalized);
        info!("Delivered {} events", self.delivered);
        result
    }

    pub fn into_plugin(self) -> Box<dyn Plugin> {
        self.plugin
    }
}
