//! Event records handed to plugin callbacks.
//!
//! Records are built by the trace engine. Plugins may only rewrite the end timestamps: the
//! other fields have getters but no setters.
//!
//! Each record is also [`Bufferizable`] with a fixed little-endian layout, so batches of events
//! can cross a buffer boundary inside a [`BVector`](crate::buffer::BVector).

use plain::Plain;
use serde::{Deserialize, Deserializer, Serialize};

use crate::buffer::{
    bufferize_items, capacity, debufferize_items, items_bufferized_size, read_plain, write_plain,
    BufResult, Bufferizable, ObjectCodec, SmallBuffer,
};
use crate::trace::ids::FunctionId;

/// Thread id as assigned by a trace.
pub type ThreadId = u32;

/// Communicator id as assigned by a trace.
pub type CommId = u32;

/// Timestamp in clock ticks.
pub type Timestamp = u64;

/// Root id stored on the wire for a collective without a root.
pub const NO_ROOT: u32 = u32::MAX;

/// One traced function call, or a pseudo-event covering a stretch with tracing off.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncEventInfo {
    thread_id: ThreadId,
    func: FunctionId,
    #[serde(default)]
    size_sent: u32,
    #[serde(default)]
    size_recv: u32,
    start_time: Timestamp,
    end_time: Timestamp,
}

impl FuncEventInfo {
    pub fn new(
        thread_id: ThreadId,
        func: FunctionId,
        size_sent: u32,
        size_recv: u32,
        start_time: Timestamp,
        end_time: Timestamp,
    ) -> Self {
        Self {
            thread_id,
            func,
            size_sent,
            size_recv,
            start_time,
            end_time,
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn func(&self) -> FunctionId {
        self.func
    }

    pub fn size_sent(&self) -> u32 {
        self.size_sent
    }

    pub fn size_recv(&self) -> u32 {
        self.size_recv
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    pub fn duration(&self) -> Timestamp {
        self.end_time.saturating_sub(self.start_time)
    }

    pub fn set_end_time(&mut self, end_time: Timestamp) {
        self.end_time = end_time;
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct RawFuncEvent {
    thread_id: u32,
    func: u32,
    size_sent: u32,
    size_recv: u32,
    start_time: u64,
    end_time: u64,
}

// SAFETY: repr(C) with only integer fields and no padding.
unsafe impl Plain for RawFuncEvent {}

impl Bufferizable<'_> for FuncEventInfo {
    fn bufferized_size(&self) -> u32 {
        std::mem::size_of::<RawFuncEvent>() as u32
    }

    fn bufferize(&self, buf: &mut [u8]) -> BufResult<u32> {
        let raw = RawFuncEvent {
            thread_id: self.thread_id.to_le(),
            func: self.func.to_le(),
            size_sent: self.size_sent.to_le(),
            size_recv: self.size_recv.to_le(),
            start_time: self.start_time.to_le(),
            end_time: self.end_time.to_le(),
        };
        write_plain(&raw, buf)
    }

    fn debufferize(&mut self, buf: &[u8]) -> BufResult<u32> {
        let raw: RawFuncEvent = read_plain(buf)?;
        *self = Self {
            thread_id: u32::from_le(raw.thread_id),
            func: u32::from_le(raw.func),
            size_sent: u32::from_le(raw.size_sent),
            size_recv: u32::from_le(raw.size_recv),
            start_time: u64::from_le(raw.start_time),
            end_time: u64::from_le(raw.end_time),
        };
        Ok(self.bufferized_size())
    }
}

/// One matched send/receive pair.
///
/// Build one with [`P2PInfo::new`] and the `with_*` methods. The receive's immediate start
/// equals the receive start unless the receive was posted with a non-blocking call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2PInfo {
    send_start_time: Timestamp,
    send_end_time: Timestamp,
    recv_start_time: Timestamp,
    recv_end_time: Timestamp,
    irecv_start_time: Timestamp,
    #[serde(default)]
    backwards: bool,
    sender: ThreadId,
    receiver: ThreadId,
    #[serde(default)]
    communicator: CommId,
    #[serde(default)]
    tag: u32,
    #[serde(default)]
    message_size: u32,
    send_fid: FunctionId,
    recv_fid: FunctionId,
}

impl P2PInfo {
    /// Message from `sender` to `receiver`, posted with the calls `send_fid` and `recv_fid`.
    pub fn new(
        sender: ThreadId,
        receiver: ThreadId,
        send_fid: FunctionId,
        recv_fid: FunctionId,
    ) -> Self {
        Self {
            sender,
            receiver,
            send_fid,
            recv_fid,
            ..Self::default()
        }
    }

    pub fn with_send(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.send_start_time = start;
        self.send_end_time = end;
        self
    }

    /// Set the receive interval; the immediate receive start follows `start`.
    pub fn with_recv(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.recv_start_time = start;
        self.recv_end_time = end;
        self.irecv_start_time = start;
        self
    }

    pub fn with_irecv_start(mut self, start: Timestamp) -> Self {
        self.irecv_start_time = start;
        self
    }

    pub fn with_message(mut self, communicator: CommId, tag: u32, size: u32) -> Self {
        self.communicator = communicator;
        self.tag = tag;
        self.message_size = size;
        self
    }

    /// Mark the message as travelling to a lower-ranked receiver.
    pub fn with_backwards(mut self, backwards: bool) -> Self {
        self.backwards = backwards;
        self
    }

    pub fn send_start_time(&self) -> Timestamp {
        self.send_start_time
    }

    pub fn send_end_time(&self) -> Timestamp {
        self.send_end_time
    }

    pub fn recv_start_time(&self) -> Timestamp {
        self.recv_start_time
    }

    pub fn recv_end_time(&self) -> Timestamp {
        self.recv_end_time
    }

    pub fn irecv_start_time(&self) -> Timestamp {
        self.irecv_start_time
    }

    pub fn is_backwards(&self) -> bool {
        self.backwards
    }

    pub fn sender(&self) -> ThreadId {
        self.sender
    }

    pub fn receiver(&self) -> ThreadId {
        self.receiver
    }

    pub fn communicator(&self) -> CommId {
        self.communicator
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn message_size(&self) -> u32 {
        self.message_size
    }

    pub fn send_fid(&self) -> FunctionId {
        self.send_fid
    }

    pub fn recv_fid(&self) -> FunctionId {
        self.recv_fid
    }

    pub fn send_duration(&self) -> Timestamp {
        self.send_end_time.saturating_sub(self.send_start_time)
    }

    pub fn recv_duration(&self) -> Timestamp {
        self.recv_end_time.saturating_sub(self.recv_start_time)
    }

    pub fn set_send_end_time(&mut self, end_time: Timestamp) {
        self.send_end_time = end_time;
    }

    pub fn set_recv_end_time(&mut self, end_time: Timestamp) {
        self.recv_end_time = end_time;
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct RawP2P {
    send_start_time: u64,
    send_end_time: u64,
    recv_start_time: u64,
    recv_end_time: u64,
    irecv_start_time: u64,
    backwards: u32,
    sender: u32,
    receiver: u32,
    communicator: u32,
    tag: u32,
    message_size: u32,
    send_fid: u32,
    recv_fid: u32,
}

// SAFETY: repr(C) with only integer fields and no padding.
unsafe impl Plain for RawP2P {}

impl Bufferizable<'_> for P2PInfo {
    fn bufferized_size(&self) -> u32 {
        std::mem::size_of::<RawP2P>() as u32
    }

    fn bufferize(&self, buf: &mut [u8]) -> BufResult<u32> {
        let raw = RawP2P {
            send_start_time: self.send_start_time.to_le(),
            send_end_time: self.send_end_time.to_le(),
            recv_start_time: self.recv_start_time.to_le(),
            recv_end_time: self.recv_end_time.to_le(),
            irecv_start_time: self.irecv_start_time.to_le(),
            backwards: u32::from(self.backwards).to_le(),
            sender: self.sender.to_le(),
            receiver: self.receiver.to_le(),
            communicator: self.communicator.to_le(),
            tag: self.tag.to_le(),
            message_size: self.message_size.to_le(),
            send_fid: self.send_fid.to_le(),
            recv_fid: self.recv_fid.to_le(),
        };
        write_plain(&raw, buf)
    }

    fn debufferize(&mut self, buf: &[u8]) -> BufResult<u32> {
        let raw: RawP2P = read_plain(buf)?;
        *self = Self {
            send_start_time: u64::from_le(raw.send_start_time),
            send_end_time: u64::from_le(raw.send_end_time),
            recv_start_time: u64::from_le(raw.recv_start_time),
            recv_end_time: u64::from_le(raw.recv_end_time),
            irecv_start_time: u64::from_le(raw.irecv_start_time),
            backwards: u32::from_le(raw.backwards) != 0,
            sender: u32::from_le(raw.sender),
            receiver: u32::from_le(raw.receiver),
            communicator: u32::from_le(raw.communicator),
            tag: u32::from_le(raw.tag),
            message_size: u32::from_le(raw.message_size),
            send_fid: u32::from_le(raw.send_fid),
            recv_fid: u32::from_le(raw.recv_fid),
        };
        Ok(self.bufferized_size())
    }
}

/// One collective operation, with one event per participating thread.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollOpInfo {
    first_time: Timestamp,
    #[serde(default)]
    communicator: CommId,
    coll_op_id: FunctionId,
    #[serde(default, deserialize_with = "deserialize_root")]
    root: Option<ThreadId>,
    #[serde(default)]
    root_index: u32,
    threads: Vec<FuncEventInfo>,
}

impl CollOpInfo {
    /// `root_index` is the position of the root's event in `threads` and is ignored when
    /// `root` is `None`. A root of [`NO_ROOT`] means no root.
    pub fn new(
        first_time: Timestamp,
        communicator: CommId,
        coll_op_id: FunctionId,
        root: Option<ThreadId>,
        root_index: u32,
        threads: Vec<FuncEventInfo>,
    ) -> Self {
        Self {
            first_time,
            communicator,
            coll_op_id,
            root: root_thread(root),
            root_index,
            threads,
        }
    }

    pub fn first_time(&self) -> Timestamp {
        self.first_time
    }

    pub fn communicator(&self) -> CommId {
        self.communicator
    }

    pub fn coll_op_id(&self) -> FunctionId {
        self.coll_op_id
    }

    pub fn root(&self) -> Option<ThreadId> {
        self.root
    }

    pub fn root_index(&self) -> u32 {
        self.root_index
    }

    /// Event of the root thread, if the operation has one.
    pub fn root_event(&self) -> Option<&FuncEventInfo> {
        self.root?;
        self.threads.get(self.root_index as usize)
    }

    pub fn threads(&self) -> &[FuncEventInfo] {
        &self.threads
    }

    /// Per-thread events. The set of participants is fixed, only the events can change.
    pub fn threads_mut(&mut self) -> &mut [FuncEventInfo] {
        &mut self.threads
    }

    pub fn into_threads(self) -> Vec<FuncEventInfo> {
        self.threads
    }
}

/// [`NO_ROOT`] is the wire spelling of a missing root and never a thread id.
fn root_thread(root: Option<ThreadId>) -> Option<ThreadId> {
    root.filter(|thread| *thread != NO_ROOT)
}

fn deserialize_root<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ThreadId>, D::Error> {
    Option::<ThreadId>::deserialize(d).map(root_thread)
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct RawCollOp {
    first_time: u64,
    communicator: u32,
    coll_op_id: u32,
    root: u32,
    root_index: u32,
}

// SAFETY: repr(C) with only integer fields and no padding.
unsafe impl Plain for RawCollOp {}

const COLLOP_HEADER: u32 = std::mem::size_of::<RawCollOp>() as u32;

type ThreadsCodec = ObjectCodec<FuncEventInfo>;

impl Bufferizable<'_> for CollOpInfo {
    fn bufferized_size(&self) -> u32 {
        COLLOP_HEADER.saturating_add(items_bufferized_size::<ThreadsCodec>(&self.threads))
    }

    fn bufferize(&self, buf: &mut [u8]) -> BufResult<u32> {
        if capacity(buf) < self.bufferized_size() {
            return Err(SmallBuffer);
        }
        let raw = RawCollOp {
            first_time: self.first_time.to_le(),
            communicator: self.communicator.to_le(),
            coll_op_id: self.coll_op_id.to_le(),
            root: self.root.unwrap_or(NO_ROOT).to_le(),
            root_index: self.root_index.to_le(),
        };
        let header = write_plain(&raw, buf)?;
        let threads = bufferize_items::<ThreadsCodec>(&self.threads, &mut buf[header as usize..])?;
        Ok(header + threads)
    }

    fn debufferize(&mut self, buf: &[u8]) -> BufResult<u32> {
        let raw: RawCollOp = read_plain(buf)?;
        let (threads, used) = debufferize_items::<ThreadsCodec>(&buf[COLLOP_HEADER as usize..])?;
        let root = u32::from_le(raw.root);
        *self = Self {
            first_time: u64::from_le(raw.first_time),
            communicator: u32::from_le(raw.communicator),
            coll_op_id: u32::from_le(raw.coll_op_id),
            root: root_thread(Some(root)),
            root_index: u32::from_le(raw.root_index),
            threads,
        };
        Ok(COLLOP_HEADER + used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{AlignedBuf, BVector};

    fn event(thread_id: u32, start: u64, end: u64) -> FuncEventInfo {
        FuncEventInfo::new(thread_id, 7, 0, 0, start, end)
    }

    #[test]
    fn test_wire_sizes() {
        assert_eq!(std::mem::size_of::<RawFuncEvent>(), 32);
        assert_eq!(std::mem::size_of::<RawP2P>(), 72);
        assert_eq!(std::mem::size_of::<RawCollOp>(), 24);
    }

    #[test]
    fn test_func_event_layout_is_little_endian() {
        let ev = FuncEventInfo::new(1, 2, 3, 4, 0x0102, 0x0304);
        let buf = AlignedBuf::bufferized(&ev).unwrap();
        assert_eq!(buf.len(), 32);
        assert_eq!(&buf.as_slice()[0..4], &[1, 0, 0, 0]);
        assert_eq!(&buf.as_slice()[16..18], &[0x02, 0x01]);

        let mut copy = FuncEventInfo::default();
        assert_eq!(copy.debufferize(buf.as_slice()), Ok(32));
        assert_eq!(copy, ev);
    }

    #[test]
    fn test_func_event_small_buffer() {
        let ev = event(0, 1, 2);
        let mut buf = [0u8; 31];
        assert_eq!(ev.bufferize(&mut buf), Err(SmallBuffer));
        let mut copy = FuncEventInfo::default();
        assert_eq!(copy.debufferize(&buf), Err(SmallBuffer));
    }

    #[test]
    fn test_duration_and_end_time() {
        let mut ev = event(3, 100, 150);
        assert_eq!(ev.duration(), 50);
        ev.set_end_time(200);
        assert_eq!(ev.end_time(), 200);
        assert_eq!(ev.start_time(), 100);
        assert_eq!(ev.thread_id(), 3);
    }

    #[test]
    fn test_p2p_builder() {
        let msg = P2PInfo::new(0, 1, 10, 20)
            .with_send(5, 9)
            .with_recv(6, 12)
            .with_message(2, 99, 4096)
            .with_backwards(true);
        assert_eq!(msg.irecv_start_time(), 6);
        assert_eq!(msg.send_duration(), 4);
        assert_eq!(msg.recv_duration(), 6);
        assert!(msg.is_backwards());
        assert_eq!(msg.tag(), 99);

        let msg = msg.with_irecv_start(3);
        assert_eq!(msg.irecv_start_time(), 3);
        assert_eq!(msg.recv_start_time(), 6);
    }

    #[test]
    fn test_p2p_bufferize() {
        let mut msg = P2PInfo::new(4, 2, 10, 20)
            .with_send(1, 2)
            .with_recv(3, 4)
            .with_backwards(true);
        msg.set_recv_end_time(8);
        let buf = AlignedBuf::bufferized(&msg).unwrap();
        assert_eq!(buf.len(), 72);

        let mut copy = P2PInfo::default();
        copy.debufferize(buf.as_slice()).unwrap();
        assert_eq!(copy, msg);
    }

    #[test]
    fn test_collop_root() {
        let op = CollOpInfo::new(0, 0, 3, Some(11), 1, vec![event(10, 0, 1), event(11, 0, 2)]);
        assert_eq!(op.root_event().map(|e| e.thread_id()), Some(11));

        let op = CollOpInfo::new(0, 0, 3, None, 1, vec![event(10, 0, 1), event(11, 0, 2)]);
        assert!(op.root_event().is_none());
    }

    #[test]
    fn test_collop_bufferize_nests_threads() {
        let op = CollOpInfo::new(
            42,
            1,
            9,
            None,
            0,
            vec![event(0, 0, 10), event(1, 0, 10), event(2, 0, 10)],
        );
        // header, vector header, three 32 byte events
        assert_eq!(op.bufferized_size(), 24 + 8 + 96);
        let buf = AlignedBuf::bufferized(&op).unwrap();
        assert_eq!(&buf.as_slice()[16..20], &NO_ROOT.to_le_bytes());
        assert_eq!(&buf.as_slice()[24..28], &3u32.to_ne_bytes());

        let mut copy = CollOpInfo::default();
        assert_eq!(copy.debufferize(buf.as_slice()), Ok(op.bufferized_size()));
        assert_eq!(copy, op);
        assert_eq!(copy.root(), None);
    }

    #[test]
    fn test_collop_no_root_sentinel_means_no_root() {
        let op = CollOpInfo::new(5, 0, 9, Some(NO_ROOT), 0, vec![event(0, 0, 10)]);
        assert_eq!(op.root(), None);
        assert!(op.root_event().is_none());

        let buf = AlignedBuf::bufferized(&op).unwrap();
        let mut copy = CollOpInfo::default();
        copy.debufferize(buf.as_slice()).unwrap();
        assert_eq!(copy, op);

        let json = format!(r#"{{"first_time":0,"coll_op_id":4,"root":{NO_ROOT},"threads":[]}}"#);
        let op: CollOpInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(op.root(), None);
        let op: CollOpInfo =
            serde_json::from_str(r#"{"first_time":0,"coll_op_id":4,"root":2,"threads":[]}"#)
                .unwrap();
        assert_eq!(op.root(), Some(2));
    }

    #[test]
    fn test_event_batch_in_bvector() {
        type Batch<'a> = BVector<'a, ObjectCodec<P2PInfo>>;
        let batch: Batch = (0..4)
            .map(|i| P2PInfo::new(i, i + 1, 3, 5).with_send(u64::from(i), 100))
            .collect();
        let buf = AlignedBuf::bufferized(&batch).unwrap();

        let mut copy = Batch::new();
        copy.debufferize(buf.as_slice()).unwrap();
        assert_eq!(copy, batch);
        assert_eq!(copy[3].sender(), 3);
    }

    #[test]
    fn test_serde_defaults() {
        let ev: FuncEventInfo =
            serde_json::from_str(r#"{"thread_id":1,"func":5,"start_time":100,"end_time":150}"#)
                .unwrap();
        assert_eq!(ev, FuncEventInfo::new(1, 5, 0, 0, 100, 150));

        let op: CollOpInfo =
            serde_json::from_str(r#"{"first_time":0,"coll_op_id":4,"threads":[]}"#).unwrap();
        assert_eq!(op.root(), None);
    }
}
