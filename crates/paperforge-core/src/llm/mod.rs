//! Generative-text and pricing ports.
//!
//! - `generator` -- the `TextGenerator` trait the pipeline nodes call
//! - `pricing` -- the `PricingLookup` trait the usage ledger bills against

pub mod generator;
pub mod pricing;

pub use generator::TextGenerator;
pub use pricing::PricingLookup;
