//! Core of the Yggdrasil knowledge forest.
//!
//! Classifies legacy documents into a Tree → Branch → Limb → Resource
//! taxonomy, normalizes them into canonical leaves and keeps the taxonomy
//! in SQLite with full-text search and cross references.

pub mod config;
pub mod db;
pub mod logging;
pub mod migration;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{ConfigError, YggdrasilConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use migration::classifier::{
    CanonicalPatterns, Classifier, ClassifierError, KeywordRule, KeywordTable, TreeSuggestion,
    UNKNOWN_TREE,
};
pub use migration::normalizer::{
    normalize, title_case, LegacyAnalysis, LegacyDocument, LegacyDocumentError,
};
pub use migration::orchestrator::{
    FileOutcome, FileStatus, MigrationError, MigrationMode, MigrationOptions,
    MigrationOrchestrator, MigrationReport,
};
pub use model::leaf::{CanonicalLeaf, LeafType, ResourceStub};
pub use model::taxonomy::{
    Branch, BranchId, CrossReference, Limb, LimbId, NewResource, NodeKind, NodeRef, Resource,
    ResourceId, TaxonomyPath, Tree, TreeId, ValidationError,
};
pub use repo::taxonomy_repo::{
    LeafPlacement, MergeOutcome, RepoError, RepoResult, SqliteTaxonomyRepository,
    TaxonomyRepository,
};
pub use search::fts::{search_resources, SearchError, SearchHit, SearchQuery, SearchResult};
pub use service::structure::{scan_structure, StructureCounts, StructureSummary};
pub use service::taxonomy_service::{TaxonomyService, TaxonomyServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
