//! Shared domain types for Paperforge.
//!
//! This crate contains the core domain types used across the Paperforge
//! pipeline: the research task record, sources, contradictions, generation
//! request/response shapes, and checkpoint log entries.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod checkpoint;
pub mod llm;
pub mod research;
