//! Closed enumerations of the MPI calls a trace can classify.
//!
//! Each enumeration names the fixed slots of one classification table. A trace assigns its
//! own numeric function id to every slot; see [`FunctionTable`](crate::framework::FunctionTable).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Function id as assigned by a trace.
pub type FunctionId = u32;

/// Function id stored in a slot whose call does not occur in the trace.
pub const NOT_PRESENT: FunctionId = u32::MAX;

pub const NUM_SINGLE_RANKS: usize = 93;
pub const NUM_COLLECTIVES: usize = 14;
pub const NUM_P2P: usize = 21;

macro_rules! slot_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident[$count:expr] {
            $($variant:ident = $slot:literal => $label:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant = $slot,
            )*
        }

        impl $name {
            pub const COUNT: usize = $count;

            /// Every variant, indexed by slot.
            pub const ALL: [$name; $count] = [$($name::$variant,)*];

            pub const fn slot(self) -> usize {
                self as usize
            }

            /// Canonical MPI name, e.g. `MPI_Send`.
            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)*
                }
            }

            pub fn from_slot(slot: usize) -> Option<Self> {
                Self::ALL.get(slot).copied()
            }

            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.name() == name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

slot_enum! {
    /// MPI calls that involve only the calling rank.
    pub enum SingleRankFunc[NUM_SINGLE_RANKS] {
        Abort = 0 => "MPI_Abort",
        Address = 1 => "MPI_Address",
        AttrDelete = 2 => "MPI_Attr_delete",
        AttrGet = 3 => "MPI_Attr_get",
        AttrPut = 4 => "MPI_Attr_put",
        Buffer = 5 => "MPI_Buffer",
        BufferAttach = 6 => "MPI_Buffer_attach",
        BufferDetach = 7 => "MPI_Buffer_detach",
        Cancel = 8 => "MPI_Cancel",
        CartCoords = 9 => "MPI_Cart_coords",
        CartCreate = 10 => "MPI_Cart_create",
        CartdimGet = 11 => "MPI_Cartdim_get",
        CartGet = 12 => "MPI_Cart_get",
        CartMap = 13 => "MPI_Cart_map",
        CartRank = 14 => "MPI_Cart_rank",
        CartShift = 15 => "MPI_Cart_shift",
        CartSub = 16 => "MPI_Cart_sub",
        CommCompare = 17 => "MPI_Comm_compare",
        CommCreate = 18 => "MPI_Comm_create",
        CommDup = 19 => "MPI_Comm_dup",
        CommFree = 20 => "MPI_Comm_free",
        CommGroup = 21 => "MPI_Comm_group",
        CommRank = 22 => "MPI_Comm_rank",
        CommRemoteGroup = 23 => "MPI_Comm_remote_group",
        CommRemoteSize = 24 => "MPI_Comm_remote_size",
        CommTestInter = 25 => "MPI_Comm_test_inter",
        CommSize = 26 => "MPI_Comm_size",
        CommSplit = 27 => "MPI_Comm_split",
        DimsCreate = 28 => "MPI_Dims_create",
        ErrhandlerCreate = 29 => "MPI_Errhandler_create",
        ErrhandlerFree = 30 => "MPI_Errhandler_free",
        ErrhandlerGet = 31 => "MPI_Errhandler_get",
        ErrhandlerSet = 32 => "MPI_Errhandler_set",
        ErrorClass = 33 => "MPI_Error_class",
        ErrorString = 34 => "MPI_Error_string",
        Finalize = 35 => "MPI_Finalize",
        Graph = 36 => "MPI_Graph",
        GetElements = 37 => "MPI_Get_elements",
        GetProcessorName = 38 => "MPI_Get_processor_name",
        GetCount = 39 => "MPI_Get_count",
        GraphCreate = 40 => "MPI_Graph_create",
        GraphdimsGet = 41 => "MPI_Graphdims_get",
        GraphGet = 42 => "MPI_Graph_get",
        GraphMap = 43 => "MPI_Graph_map",
        GraphNeighbors = 44 => "MPI_Graph_neighbors",
        GraphNeighborsCount = 45 => "MPI_Graph_neighbors_count",
        GroupCompare = 46 => "MPI_Group_compare",
        GroupDifference = 47 => "MPI_Group_difference",
        GroupExcl = 48 => "MPI_Group_excl",
        GroupFree = 49 => "MPI_Group_free",
        GroupIncl = 50 => "MPI_Group_incl",
        GroupIntersection = 51 => "MPI_Group_intersection",
        GroupRangeExcl = 52 => "MPI_Group_range_excl",
        GroupRangeIncl = 53 => "MPI_Group_range_incl",
        GroupRank = 54 => "MPI_Group_rank",
        GroupSize = 55 => "MPI_Group_size",
        GroupTranslateRanks = 56 => "MPI_Group_translate_ranks",
        GroupUnion = 57 => "MPI_Group_union",
        IntercommCreate = 58 => "MPI_Intercomm_create",
        IntercommMerge = 59 => "MPI_Intercomm_merge",
        Init = 60 => "MPI_Init",
        Initialized = 61 => "MPI_Initialized",
        Iprobe = 62 => "MPI_Iprobe",
        KeyvalCreate = 63 => "MPI_Keyval_create",
        KeyvalFree = 64 => "MPI_Keyval_free",
        Pack = 65 => "MPI_Pack",
        PackSize = 66 => "MPI_Pack_size",
        Pcontrol = 67 => "MPI_Pcontrol",
        Probe = 68 => "MPI_Probe",
        RequestFree = 69 => "MPI_Request_free",
        TestCancelled = 70 => "MPI_Test_cancelled",
        TopoTest = 71 => "MPI_Topo_test",
        TypeCommit = 72 => "MPI_Type_commit",
        TypeContiguous = 73 => "MPI_Type_contiguous",
        TypeExtent = 74 => "MPI_Type_extent",
        TypeFree = 75 => "MPI_Type_free",
        TypeHindexed = 76 => "MPI_Type_hindexed",
        TypeHvector = 77 => "MPI_Type_hvector",
        TypeIndexed = 78 => "MPI_Type_indexed",
        TypeLb = 79 => "MPI_Type_lb",
        TypeSize = 80 => "MPI_Type_size",
        TypeStruct = 81 => "MPI_Type_struct",
        TypeUb = 82 => "MPI_Type_ub",
        TypeVector = 83 => "MPI_Type_vector",
        Unpack = 84 => "MPI_Unpack",
        Wtick = 85 => "MPI_Wtick",
        Wtime = 86 => "MPI_Wtime",
        BsendInit = 87 => "MPI_Bsend_init",
        Irecv = 88 => "MPI_Irecv",
        RecvInit = 89 => "MPI_Recv_init",
        RsendInit = 90 => "MPI_Rsend_init",
        SendInit = 91 => "MPI_Send_init",
        SsendInit = 92 => "MPI_Ssend_init",
    }
}

slot_enum! {
    /// Collective operations.
    pub enum CollectiveOp[NUM_COLLECTIVES] {
        Alltoall = 0 => "MPI_Alltoall",
        Alltoallv = 1 => "MPI_Alltoallv",
        Allgather = 2 => "MPI_Allgather",
        Allgatherv = 3 => "MPI_Allgatherv",
        Allreduce = 4 => "MPI_Allreduce",
        Barrier = 5 => "MPI_Barrier",
        Bcast = 6 => "MPI_Bcast",
        Gather = 7 => "MPI_Gather",
        Gatherv = 8 => "MPI_Gatherv",
        Reduce = 9 => "MPI_Reduce",
        ReduceScatter = 10 => "MPI_Reduce_scatter",
        Scan = 11 => "MPI_Scan",
        Scatter = 12 => "MPI_Scatter",
        Scatterv = 13 => "MPI_Scatterv",
    }
}

slot_enum! {
    /// Point-to-point sends, receives and their completion calls.
    pub enum P2PFunc[NUM_P2P] {
        Bsend = 0 => "MPI_Bsend",
        Ibsend = 1 => "MPI_Ibsend",
        Irsend = 2 => "MPI_Irsend",
        Isend = 3 => "MPI_Isend",
        Issend = 4 => "MPI_Issend",
        Recv = 5 => "MPI_Recv",
        Rsend = 6 => "MPI_Rsend",
        Send = 7 => "MPI_Send",
        Sendrecv = 8 => "MPI_Sendrecv",
        SendrecvReplace = 9 => "MPI_Sendrecv_replace",
        Ssend = 10 => "MPI_Ssend",
        Start = 11 => "MPI_Start",
        Startall = 12 => "MPI_Startall",
        Test = 13 => "MPI_Test",
        Testall = 14 => "MPI_Testall",
        Testany = 15 => "MPI_Testany",
        Testsome = 16 => "MPI_Testsome",
        Wait = 17 => "MPI_Wait",
        Waitall = 18 => "MPI_Waitall",
        Waitany = 19 => "MPI_Waitany",
        Waitsome = 20 => "MPI_Waitsome",
    }
}

/// Data movement pattern of a collective operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectiveShape {
    /// Every rank contributes to and receives from every other rank.
    AllToAll,
    /// The root distributes data to every rank.
    OneToAll,
    /// The root collects data from every rank.
    AllToOne,
    /// Every rank participates without data asymmetry.
    All,
}

impl CollectiveOp {
    pub const fn shape(self) -> CollectiveShape {
        use CollectiveOp::*;
        match self {
            Alltoall | Alltoallv | Allgather | Allgatherv | Allreduce | ReduceScatter => {
                CollectiveShape::AllToAll
            }
            Bcast | Scatter | Scatterv => CollectiveShape::OneToAll,
            Gather | Gatherv | Reduce => CollectiveShape::AllToOne,
            Barrier | Scan => CollectiveShape::All,
        }
    }

    /// True when the operation has a distinguished root rank.
    pub const fn is_rooted(self) -> bool {
        matches!(
            self.shape(),
            CollectiveShape::OneToAll | CollectiveShape::AllToOne
        )
    }
}

/// Flavor of a point-to-point call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum P2PKind {
    /// Send that may complete before the matching receive starts.
    Send,
    /// Send that completes only after the matching receive has started.
    SyncSend,
    /// Combined send and receive.
    SendRecv,
    /// Receive, or a test/wait call completing one.
    Recv,
}

impl P2PFunc {
    /// Flavor of the call. `MPI_Issend` belongs to none of them.
    pub const fn kind(self) -> Option<P2PKind> {
        use P2PFunc::*;
        match self {
            Bsend | Ibsend | Isend | Send | Start | Startall | Irsend | Rsend => {
                Some(P2PKind::Send)
            }
            Ssend => Some(P2PKind::SyncSend),
            Sendrecv | SendrecvReplace => Some(P2PKind::SendRecv),
            Recv | Test | Testall | Testany | Testsome | Wait | Waitall | Waitany | Waitsome => {
                Some(P2PKind::Recv)
            }
            Issend => None,
        }
    }

    /// Send whose call returns before the transfer completes, so its own duration and the
    /// message delivery are tracked separately.
    pub const fn is_nonblocking_send(self) -> bool {
        use P2PFunc::*;
        matches!(self, Isend | Ibsend | Irsend | Start | Startall)
    }

    /// Completion calls that can finish several messages at once.
    pub const fn is_multi_completion(self) -> bool {
        use P2PFunc::*;
        matches!(self, Waitall | Waitsome | Testall | Testsome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_match_positions() {
        for (i, f) in SingleRankFunc::ALL.iter().enumerate() {
            assert_eq!(f.slot(), i);
        }
        for (i, op) in CollectiveOp::ALL.iter().enumerate() {
            assert_eq!(op.slot(), i);
        }
        for (i, f) in P2PFunc::ALL.iter().enumerate() {
            assert_eq!(f.slot(), i);
        }
    }

    #[test]
    fn test_known_slots() {
        assert_eq!(SingleRankFunc::Finalize.slot(), 35);
        assert_eq!(SingleRankFunc::Init.slot(), 60);
        assert_eq!(SingleRankFunc::SsendInit.slot(), NUM_SINGLE_RANKS - 1);
        assert_eq!(CollectiveOp::Barrier.slot(), 5);
        assert_eq!(CollectiveOp::Scatterv.slot(), NUM_COLLECTIVES - 1);
        assert_eq!(P2PFunc::Ssend.slot(), 10);
        assert_eq!(P2PFunc::Waitsome.slot(), NUM_P2P - 1);
    }

    #[test]
    fn test_names() {
        assert_eq!(P2PFunc::SendrecvReplace.name(), "MPI_Sendrecv_replace");
        assert_eq!(CollectiveOp::from_name("MPI_Allreduce"), Some(CollectiveOp::Allreduce));
        assert_eq!(SingleRankFunc::from_slot(88), Some(SingleRankFunc::Irecv));
        assert_eq!(SingleRankFunc::from_slot(NUM_SINGLE_RANKS), None);
        assert_eq!(P2PFunc::from_name("MPI_Nope"), None);
        assert_eq!(CollectiveOp::Gatherv.to_string(), "MPI_Gatherv");
    }

    #[test]
    fn test_serde_uses_mpi_names() {
        let json = serde_json::to_string(&P2PFunc::Isend).unwrap();
        assert_eq!(json, "\"MPI_Isend\"");
        let op: CollectiveOp = serde_json::from_str("\"MPI_Bcast\"").unwrap();
        assert_eq!(op, CollectiveOp::Bcast);
    }

    #[test]
    fn test_shapes_partition_collectives() {
        let count = |shape| {
            CollectiveOp::ALL
                .iter()
                .filter(|op| op.shape() == shape)
                .count()
        };
        assert_eq!(count(CollectiveShape::AllToAll), 6);
        assert_eq!(count(CollectiveShape::OneToAll), 3);
        assert_eq!(count(CollectiveShape::AllToOne), 3);
        assert_eq!(count(CollectiveShape::All), 2);
        assert!(CollectiveOp::Bcast.is_rooted());
        assert!(!CollectiveOp::Barrier.is_rooted());
    }

    #[test]
    fn test_p2p_kinds() {
        assert_eq!(P2PFunc::Ssend.kind(), Some(P2PKind::SyncSend));
        assert_eq!(P2PFunc::Issend.kind(), None);
        assert_eq!(P2PFunc::Rsend.kind(), Some(P2PKind::Send));
        assert_eq!(P2PFunc::Waitany.kind(), Some(P2PKind::Recv));
        let sync: Vec<_> = P2PFunc::ALL
            .iter()
            .filter(|f| f.kind() == Some(P2PKind::SyncSend))
            .collect();
        assert_eq!(sync, [&P2PFunc::Ssend]);
        assert!(P2PFunc::Isend.is_nonblocking_send());
        assert!(!P2PFunc::Issend.is_nonblocking_send());
        assert!(!P2PFunc::Send.is_nonblocking_send());
        assert!(P2PFunc::Waitall.is_multi_completion());
    }
}
