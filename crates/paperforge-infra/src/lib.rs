//! Infrastructure implementations for Paperforge.
//!
//! Concrete adapters behind the ports defined in `paperforge-core`:
//!
//! - `llm` -- the OpenRouter `TextGenerator` and the static pricing table
//! - `audit` -- JSONL-file `CheckpointRecorder`
//! - `config` -- TOML application configuration

pub mod audit;
pub mod config;
pub mod llm;
