//! Repository layer: persistence contracts and the SQLite implementation.
//!
//! # Responsibility
//! - Define the taxonomy data access contract used by services, the
//!   structure scanner and the migration orchestrator.
//! - Isolate SQL details from use-case orchestration.
//!
//! # Invariants
//! - Multi-statement mutations run inside one immediate transaction, so
//!   callers never observe a half-applied change.
//! - Repository APIs return semantic errors (`NotFound`, `Validation`) in
//!   addition to store transport errors.

pub mod taxonomy_repo;
