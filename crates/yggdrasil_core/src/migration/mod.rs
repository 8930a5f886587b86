//! Legacy document migration.
//!
//! # Responsibility
//! - Classify legacy documents into trees by keyword.
//! - Normalize them into canonical leaves.
//! - Drive batch runs (dry-run or live) and report per-file outcomes.

pub mod classifier;
pub mod normalizer;
pub mod orchestrator;
