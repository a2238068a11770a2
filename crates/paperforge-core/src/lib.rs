//! Workflow orchestration core for Paperforge.
//!
//! This crate defines the "ports" (the `TextGenerator`, `PricingLookup`, and
//! `CheckpointRecorder` traits) that the infrastructure layer implements, and
//! the engine that drives the fixed research pipeline over them. It depends
//! only on `paperforge-types` -- never on any HTTP or storage crate.

pub mod llm;
pub mod nodes;
pub mod resilience;
pub mod service;
pub mod workflow;
