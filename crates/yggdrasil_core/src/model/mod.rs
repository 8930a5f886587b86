//! Domain model for the knowledge forest.
//!
//! # Responsibility
//! - Define Tree/Branch/Limb/Resource records and their typed identifiers.
//! - Define the canonical leaf document emitted by legacy migration.
//!
//! # Invariants
//! - Nodes are addressed by opaque typed ids, never by re-parsed path strings.
//! - Name uniqueness is scoped to the immediate parent.

pub mod leaf;
pub mod taxonomy;
