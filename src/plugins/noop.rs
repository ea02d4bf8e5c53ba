use crate::framework::{Plugin, PluginContext};
use crate::trace::{CollOpInfo, FuncEventInfo, P2PInfo};

/// Leaves every event untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPlugin;

impl Plugin for NoopPlugin {
    fn initialize(&mut self, _ctx: &PluginContext) {}

    fn finalize(&mut self, _ctx: &PluginContext) {}

    fn process_function_event(&mut self, _ctx: &PluginContext, _event: &mut FuncEventInfo) {}

    fn process_non_tracing_event(&mut self, _ctx: &PluginContext, _event: &mut FuncEventInfo) {}

    fn process_mpi_function_event(&mut self, _ctx: &PluginContext, _event: &mut FuncEventInfo) {}

    fn process_coll_op(&mut self, _ctx: &PluginContext, _coll_op: &mut CollOpInfo) {}

    fn process_p2p(&mut self, _ctx: &PluginContext, _message: &mut P2PInfo) {}

    fn process_nonblocking_send(
        &mut self,
        _ctx: &PluginContext,
        _event: &mut FuncEventInfo,
        _message: &mut P2PInfo,
    ) {
    }

    fn process_p2p_wait_all_some(&mut self, _ctx: &PluginContext, _messages: &mut [P2PInfo]) {}
}
