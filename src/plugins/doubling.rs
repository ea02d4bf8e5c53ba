use tracing::info;

use crate::framework::{Plugin, PluginContext};
use crate::trace::{CollOpInfo, FuncEventInfo, P2PInfo, Timestamp};

/// Extends every interval by its own original length, so `end` becomes `end + (end - start)`.
///
/// For messages the receive side is always stretched. The send side is stretched too when the
/// send was an `MPI_Ssend`, since such a send cannot complete before the receive does.
#[derive(Clone, Debug, Default)]
pub struct DoublingPlugin {
    stretched: u64,
}

fn doubled(start: Timestamp, end: Timestamp) -> Timestamp {
    end.saturating_add(end.saturating_sub(start))
}

impl DoublingPlugin {
    /// Number of intervals stretched so far.
    pub fn stretched(&self) -> u64 {
        self.stretched
    }

    fn double_event(&mut self, event: &mut FuncEventInfo) {
        event.set_end_time(doubled(event.start_time(), event.end_time()));
        self.stretched += 1;
    }

    fn double_recv(&mut self, message: &mut P2PInfo) {
        message.set_recv_end_time(doubled(message.recv_start_time(), message.recv_end_time()));
        self.stretched += 1;
    }

    fn double_send(&mut self, message: &mut P2PInfo) {
        message.set_send_end_time(doubled(message.send_start_time(), message.send_end_time()));
        self.stretched += 1;
    }
}

impl Plugin for DoublingPlugin {
    fn initialize(&mut self, _ctx: &PluginContext) {
        self.stretched = 0;
    }

    fn finalize(&mut self, _ctx: &PluginContext) {
        info!("Doubled {} intervals", self.stretched);
    }

    fn process_function_event(&mut self, _ctx: &PluginContext, event: &mut FuncEventInfo) {
        self.double_event(event);
    }

    fn process_non_tracing_event(&mut self, _ctx: &PluginContext, event: &mut FuncEventInfo) {
        self.double_event(event);
    }

    fn process_mpi_function_event(&mut self, _ctx: &PluginContext, event: &mut FuncEventInfo) {
        self.double_event(event);
    }

    fn process_coll_op(&mut self, _ctx: &PluginContext, coll_op: &mut CollOpInfo) {
        for event in coll_op.threads_mut() {
            self.double_event(event);
        }
    }

    fn process_p2p(&mut self, ctx: &PluginContext, message: &mut P2PInfo) {
        self.double_recv(message);
        if ctx.functions().is_sync_send(message.send_fid()) {
            self.double_send(message);
        }
    }

    fn process_nonblocking_send(
        &mut self,
        ctx: &PluginContext,
        event: &mut FuncEventInfo,
        message: &mut P2PInfo,
    ) {
        self.double_event(event);
        if ctx.functions().is_sync_send(message.send_fid()) {
            self.double_send(message);
        }
    }

    fn process_p2p_wait_all_some(&mut self, ctx: &PluginContext, messages: &mut [P2PInfo]) {
        for message in messages {
            self.double_recv(message);
            if ctx.functions().is_sync_send(message.send_fid()) {
                self.double_send(message);
            }
        }
    }
}
