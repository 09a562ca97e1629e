//! LRCLIB lyrics filter: quality gate, script-based language tagging and
//! two-layer deduplication over a single streaming pass.

pub mod classify;
pub mod engine;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod quality;
pub mod safety;
pub mod store;
