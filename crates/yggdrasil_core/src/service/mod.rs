//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep the CLI and migration batch decoupled from storage details.

pub mod structure;
pub mod taxonomy_service;
