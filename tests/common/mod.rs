//! Common test utilities for tracesim integration tests.

#![allow(dead_code)]

use tracesim::trace::{
    CollectiveOp, FunctionId, P2PFunc, SingleRankFunc, NOT_PRESENT, NUM_COLLECTIVES, NUM_P2P,
    NUM_SINGLE_RANKS,
};
use tracesim::SetupParams;

const SINGLE_RANK_BASE: FunctionId = 1000;
const COLLECTIVE_BASE: FunctionId = 2000;
const P2P_BASE: FunctionId = 3000;

/// An application function id that no table contains.
pub const USER_FUNCTION: FunctionId = 42;

pub fn single_rank_id(func: SingleRankFunc) -> FunctionId {
    SINGLE_RANK_BASE + func.slot() as FunctionId
}

pub fn collective_id(op: CollectiveOp) -> FunctionId {
    COLLECTIVE_BASE + op.slot() as FunctionId
}

pub fn p2p_id(func: P2PFunc) -> FunctionId {
    P2P_BASE + func.slot() as FunctionId
}

/// Header in which every MPI function was seen in the trace.
pub fn full_header() -> SetupParams {
    SetupParams {
        single_rank_ids: SingleRankFunc::ALL.iter().map(|f| single_rank_id(*f)).collect(),
        collective_ids: CollectiveOp::ALL.iter().map(|op| collective_id(*op)).collect(),
        p2p_ids: P2PFunc::ALL.iter().map(|f| p2p_id(*f)).collect(),
        thread_count: 4,
        trace_end: 1_000_000,
        ..Default::default()
    }
}

/// Header in which no MPI function was seen.
pub fn empty_header() -> SetupParams {
    SetupParams {
        single_rank_ids: vec![NOT_PRESENT; NUM_SINGLE_RANKS],
        collective_ids: vec![NOT_PRESENT; NUM_COLLECTIVES],
        p2p_ids: vec![NOT_PRESENT; NUM_P2P],
        ..Default::default()
    }
}
