// elfwatch/src/engine/mod.rs
//
// Scoring, per-elf profiles and the workshop rollup.

pub mod profile;
pub mod scorer;
pub mod workshop;

pub use profile::{analyze, analyze_enriched, predict};
pub use workshop::workshop_summary;
