use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::HashMap;
use crate::trace::{
    CollectiveOp, CollectiveShape, FunctionId, P2PFunc, P2PKind, SingleRankFunc, NOT_PRESENT,
    NUM_COLLECTIVES, NUM_P2P, NUM_SINGLE_RANKS,
};

/// Problems with the id tables handed to setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// An id table does not have one entry per slot.
    WrongLength {
        table: &'static str,
        expected: usize,
        got: usize,
    },
    /// The same trace id was assigned to two slots.
    DuplicateId {
        id: FunctionId,
        first: FunctionKind,
        second: FunctionKind,
    },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::WrongLength {
                table,
                expected,
                got,
            } => write!(
                f,
                "{table} id table has {got} entries, expected {expected}"
            ),
            SetupError::DuplicateId { id, first, second } => write!(
                f,
                "function id {id} assigned to both {first} and {second}"
            ),
        }
    }
}

impl std::error::Error for SetupError {}

/// Category of a function id present in a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "category", content = "function", rename_all = "snake_case")]
pub enum FunctionKind {
    SingleRank(SingleRankFunc),
    Collective(CollectiveOp),
    #[serde(rename = "p2p")]
    P2P(P2PFunc),
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::SingleRank(func) => write!(f, "single-rank {func}"),
            FunctionKind::Collective(op) => write!(f, "collective {op}"),
            FunctionKind::P2P(func) => write!(f, "point-to-point {func}"),
        }
    }
}

/// Callback a function event is delivered to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionRoute {
    /// `process_function_event`: application code or an unclassified call.
    Function,
    /// `process_mpi_function_event`: a single-rank MPI call.
    MpiFunction,
}

/// Callback a matched message is delivered to, decided by its send call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum P2PRoute {
    /// `process_p2p`: blocking, synchronous and combined send-receive calls.
    P2P,
    /// `process_nonblocking_send`: the send returns before delivery, so its event travels
    /// with the message.
    NonBlockingSend,
}

/// Maps the function ids of one trace to slots, built once at setup.
///
/// Every predicate is total: ids the trace never assigned, including [`NOT_PRESENT`], answer
/// false.
#[derive(Clone, Debug)]
pub struct FunctionTable {
    single_ranks: [FunctionId; NUM_SINGLE_RANKS],
    collectives: [FunctionId; NUM_COLLECTIVES],
    p2p: [FunctionId; NUM_P2P],
    kinds: HashMap<FunctionId, FunctionKind>,
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self {
            single_ranks: [NOT_PRESENT; NUM_SINGLE_RANKS],
            collectives: [NOT_PRESENT; NUM_COLLECTIVES],
            p2p: [NOT_PRESENT; NUM_P2P],
            kinds: HashMap::new(),
        }
    }
}

fn copy_table<const N: usize>(
    table: &'static str,
    ids: &[FunctionId],
) -> Result<[FunctionId; N], SetupError> {
    ids.try_into().map_err(|_| SetupError::WrongLength {
        table,
        expected: N,
        got: ids.len(),
    })
}

impl FunctionTable {
    /// Build a table from one id per slot of [`SingleRankFunc`], [`CollectiveOp`] and
    /// [`P2PFunc`], using [`NOT_PRESENT`] for calls the trace does not contain.
    pub fn new(
        single_rank_ids: &[FunctionId],
        collective_ids: &[FunctionId],
        p2p_ids: &[FunctionId],
    ) -> Result<Self, SetupError> {
        let mut table = Self {
            single_ranks: copy_table("single-rank", single_rank_ids)?,
            collectives: copy_table("collective", collective_ids)?,
            p2p: copy_table("point-to-point", p2p_ids)?,
            kinds: HashMap::new(),
        };

        let single_ranks = SingleRankFunc::ALL
            .iter()
            .map(|f| (table.single_ranks[f.slot()], FunctionKind::SingleRank(*f)));
        let collectives = CollectiveOp::ALL
            .iter()
            .map(|op| (table.collectives[op.slot()], FunctionKind::Collective(*op)));
        let p2p = P2PFunc::ALL
            .iter()
            .map(|f| (table.p2p[f.slot()], FunctionKind::P2P(*f)));

        let mut kinds: HashMap<FunctionId, FunctionKind> = HashMap::new();
        for (id, kind) in single_ranks.chain(collectives).chain(p2p) {
            if id == NOT_PRESENT {
                continue;
            }
            let stored = *kinds.insert_once(id, kind);
            if stored != kind {
                return Err(SetupError::DuplicateId {
                    id,
                    first: stored,
                    second: kind,
                });
            }
        }
        table.kinds = kinds;
        Ok(table)
    }

    /// Number of slots whose call occurs in the trace.
    pub fn present_count(&self) -> usize {
        self.kinds.count()
    }

    pub fn kind(&self, id: FunctionId) -> Option<FunctionKind> {
        self.kinds.find(&id).copied()
    }

    pub fn single_rank(&self, id: FunctionId) -> Option<SingleRankFunc> {
        match self.kind(id)? {
            FunctionKind::SingleRank(func) => Some(func),
            _ => None,
        }
    }

    pub fn collective(&self, id: FunctionId) -> Option<CollectiveOp> {
        match self.kind(id)? {
            FunctionKind::Collective(op) => Some(op),
            _ => None,
        }
    }

    pub fn p2p(&self, id: FunctionId) -> Option<P2PFunc> {
        match self.kind(id)? {
            FunctionKind::P2P(func) => Some(func),
            _ => None,
        }
    }

    /// Trace id of a single-rank call, if the trace contains it.
    pub fn single_rank_id(&self, func: SingleRankFunc) -> Option<FunctionId> {
        present(self.single_ranks[func.slot()])
    }

    pub fn collective_id(&self, op: CollectiveOp) -> Option<FunctionId> {
        present(self.collectives[op.slot()])
    }

    pub fn p2p_id(&self, func: P2PFunc) -> Option<FunctionId> {
        present(self.p2p[func.slot()])
    }

    pub fn is_single_rank(&self, id: FunctionId) -> bool {
        self.single_rank(id).is_some()
    }

    pub fn is_collective(&self, id: FunctionId) -> bool {
        self.collective(id).is_some()
    }

    pub fn is_p2p(&self, id: FunctionId) -> bool {
        self.p2p(id).is_some()
    }

    fn has_shape(&self, id: FunctionId, shape: CollectiveShape) -> bool {
        self.collective(id).is_some_and(|op| op.shape() == shape)
    }

    pub fn is_all_to_all(&self, id: FunctionId) -> bool {
        self.has_shape(id, CollectiveShape::AllToAll)
    }

    pub fn is_one_to_all(&self, id: FunctionId) -> bool {
        self.has_shape(id, CollectiveShape::OneToAll)
    }

    pub fn is_all_to_one(&self, id: FunctionId) -> bool {
        self.has_shape(id, CollectiveShape::AllToOne)
    }

    pub fn is_all(&self, id: FunctionId) -> bool {
        self.has_shape(id, CollectiveShape::All)
    }

    fn has_p2p_kind(&self, id: FunctionId, kind: P2PKind) -> bool {
        self.p2p(id).is_some_and(|func| func.kind() == Some(kind))
    }

    /// Send that does not wait for the matching receive.
    pub fn is_send(&self, id: FunctionId) -> bool {
        self.has_p2p_kind(id, P2PKind::Send)
    }

    /// Send that completes only once the matching receive has started.
    pub fn is_sync_send(&self, id: FunctionId) -> bool {
        self.has_p2p_kind(id, P2PKind::SyncSend)
    }

    pub fn is_send_recv(&self, id: FunctionId) -> bool {
        self.has_p2p_kind(id, P2PKind::SendRecv)
    }

    /// Receive, or a test/wait call completing one.
    pub fn is_recv(&self, id: FunctionId) -> bool {
        self.has_p2p_kind(id, P2PKind::Recv)
    }

    pub fn function_route(&self, id: FunctionId) -> FunctionRoute {
        if self.is_single_rank(id) {
            FunctionRoute::MpiFunction
        } else {
            FunctionRoute::Function
        }
    }

    pub fn p2p_route(&self, send_fid: FunctionId) -> P2PRoute {
        match self.p2p(send_fid) {
            Some(func) if func.is_nonblocking_send() => P2PRoute::NonBlockingSend,
            _ => P2PRoute::P2P,
        }
    }
}

fn present(id: FunctionId) -> Option<FunctionId> {
    (id != NOT_PRESENT).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ids laid out as single ranks from 100, collectives from 300 and P2P from 400.
    fn table() -> FunctionTable {
        let single: Vec<u32> = (0..NUM_SINGLE_RANKS as u32).map(|i| 100 + i).collect();
        let coll: Vec<u32> = (0..NUM_COLLECTIVES as u32).map(|i| 300 + i).collect();
        let p2p: Vec<u32> = (0..NUM_P2P as u32).map(|i| 400 + i).collect();
        FunctionTable::new(&single, &coll, &p2p).unwrap()
    }

    #[test]
    fn test_wrong_length() {
        let err = FunctionTable::new(&[1, 2], &[], &[]).unwrap_err();
        assert_eq!(
            err,
            SetupError::WrongLength {
                table: "single-rank",
                expected: NUM_SINGLE_RANKS,
                got: 2
            }
        );
        assert_eq!(err.to_string(), "single-rank id table has 2 entries, expected 93");
    }

    #[test]
    fn test_duplicate_id() {
        let single = vec![NOT_PRESENT; NUM_SINGLE_RANKS];
        let mut coll = vec![NOT_PRESENT; NUM_COLLECTIVES];
        let mut p2p = vec![NOT_PRESENT; NUM_P2P];
        coll[CollectiveOp::Bcast.slot()] = 9;
        p2p[P2PFunc::Send.slot()] = 9;

        let err = FunctionTable::new(&single, &coll, &p2p).unwrap_err();
        assert!(matches!(err, SetupError::DuplicateId { id: 9, .. }));
        assert!(err.to_string().contains("MPI_Bcast"));
    }

    #[test]
    fn test_not_present_answers_false() {
        let single = vec![NOT_PRESENT; NUM_SINGLE_RANKS];
        let coll = vec![NOT_PRESENT; NUM_COLLECTIVES];
        let mut p2p = vec![NOT_PRESENT; NUM_P2P];
        p2p[P2PFunc::Recv.slot()] = 1;
        let table = FunctionTable::new(&single, &coll, &p2p).unwrap();

        assert_eq!(table.present_count(), 1);
        assert!(table.is_recv(1));
        for id in [NOT_PRESENT, 0, 2] {
            assert!(!table.is_single_rank(id));
            assert!(!table.is_collective(id));
            assert!(!table.is_p2p(id));
            assert!(!table.is_all(id));
            assert!(!table.is_sync_send(id));
        }
        assert_eq!(table.p2p_id(P2PFunc::Recv), Some(1));
        assert_eq!(table.p2p_id(P2PFunc::Send), None);
    }

    #[test]
    fn test_default_table_is_empty() {
        let table = FunctionTable::default();
        assert_eq!(table.present_count(), 0);
        assert!(!table.is_p2p(NOT_PRESENT));
        assert_eq!(table.function_route(5), FunctionRoute::Function);
    }

    #[test]
    fn test_classification_follows_input_table() {
        let table = table();
        assert_eq!(table.present_count(), NUM_SINGLE_RANKS + NUM_COLLECTIVES + NUM_P2P);
        assert_eq!(table.single_rank(100 + 60), Some(SingleRankFunc::Init));
        assert_eq!(table.collective(300 + 5), Some(CollectiveOp::Barrier));
        assert_eq!(table.p2p(400 + 10), Some(P2PFunc::Ssend));
        assert_eq!(table.single_rank_id(SingleRankFunc::Finalize), Some(135));
        assert_eq!(table.kind(99), None);
    }

    #[test]
    fn test_collective_shapes() {
        let table = table();
        let id = |op: CollectiveOp| table.collective_id(op).unwrap();
        assert!(table.is_all_to_all(id(CollectiveOp::Allreduce)));
        assert!(table.is_all_to_all(id(CollectiveOp::ReduceScatter)));
        assert!(table.is_one_to_all(id(CollectiveOp::Scatterv)));
        assert!(table.is_all_to_one(id(CollectiveOp::Reduce)));
        assert!(table.is_all(id(CollectiveOp::Scan)));
        assert!(!table.is_all(id(CollectiveOp::Bcast)));
        assert!(!table.is_all_to_all(table.p2p_id(P2PFunc::Send).unwrap()));
    }

    #[test]
    fn test_p2p_flavors() {
        let table = table();
        let id = |f: P2PFunc| table.p2p_id(f).unwrap();
        assert!(table.is_send(id(P2PFunc::Bsend)));
        assert!(table.is_send(id(P2PFunc::Rsend)));
        assert!(table.is_sync_send(id(P2PFunc::Ssend)));
        assert!(!table.is_sync_send(id(P2PFunc::Issend)));
        assert!(!table.is_send(id(P2PFunc::Issend)));
        assert!(!table.is_send_recv(id(P2PFunc::Issend)));
        assert!(!table.is_recv(id(P2PFunc::Issend)));
        assert!(table.is_p2p(id(P2PFunc::Issend)));
        assert!(!table.is_send(id(P2PFunc::Ssend)));
        assert!(table.is_send_recv(id(P2PFunc::SendrecvReplace)));
        assert!(table.is_recv(id(P2PFunc::Testsome)));
        assert!(!table.is_recv(id(P2PFunc::Sendrecv)));
    }

    #[test]
    fn test_routes() {
        let table = table();
        assert_eq!(table.function_route(100), FunctionRoute::MpiFunction);
        assert_eq!(table.function_route(7), FunctionRoute::Function);
        assert_eq!(table.function_route(300), FunctionRoute::Function);

        let id = |f: P2PFunc| table.p2p_id(f).unwrap();
        let nonblocking = [
            P2PFunc::Isend,
            P2PFunc::Ibsend,
            P2PFunc::Irsend,
            P2PFunc::Start,
            P2PFunc::Startall,
        ];
        for func in nonblocking {
            assert_eq!(table.p2p_route(id(func)), P2PRoute::NonBlockingSend);
        }
        for func in [P2PFunc::Send, P2PFunc::Ssend, P2PFunc::Issend, P2PFunc::Sendrecv] {
            assert_eq!(table.p2p_route(id(func)), P2PRoute::P2P);
        }
        assert_eq!(table.p2p_route(NOT_PRESENT), P2PRoute::P2P);
    }
}
