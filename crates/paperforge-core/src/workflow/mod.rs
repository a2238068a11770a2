//! Workflow engine core: the fixed research pipeline and its machinery.
//!
//! - `node` -- node identities, the `ResearchNode` trait, and node errors
//! - `routing` -- declarative routing decisions between pipeline phases
//! - `ledger` -- token/cost accumulation onto the task record
//! - `checkpoint` -- the `CheckpointRecorder` port and in-memory recorders
//! - `executor` -- per-node timeout/retry/circuit-breaker wrapper
//! - `engine` -- the fixed-topology workflow engine

pub mod checkpoint;
pub mod engine;
pub mod executor;
pub mod ledger;
pub mod node;
pub mod routing;
