//! Canonical leaf document.
//!
//! A leaf is the normalized shape every legacy document is converted into
//! before it is merged into the taxonomy store or written out as JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Branch every migrated leaf is parked under until it is re-filed by hand.
pub const LEGACY_BRANCH: &str = "Legacy";
/// Category assigned to resource stubs derived from legacy `subfields`.
pub const SUBFIELD_CATEGORY: &str = "subfield";

/// Metadata keys every migrated leaf carries.
pub const META_MIGRATED_FROM: &str = "migrated_from";
pub const META_ORIGINAL_FIELD: &str = "original_field";
pub const META_MIGRATION_DATE: &str = "migration_date";
pub const META_REQUIRES_REVIEW: &str = "requires_review";

/// Distinguishes auto-converted leaves from natively authored ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafType {
    Native,
    MigratedContent,
}

/// Resource entry inside a leaf document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStub {
    pub title: String,
    pub category: String,
    pub description: String,
}

/// Normalized leaf record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalLeaf {
    /// Limb the leaf is filed under.
    pub limb: String,
    pub leaf_name: String,
    pub leaf_type: LeafType,
    /// Human-readable `tree → branch → limb` placement.
    pub tree_path: String,
    pub resources: Vec<ResourceStub>,
    pub metadata: Map<String, Value>,
}

impl CanonicalLeaf {
    /// Legacy source path recorded in metadata, if any.
    pub fn migrated_from(&self) -> Option<&str> {
        self.metadata.get(META_MIGRATED_FROM).and_then(Value::as_str)
    }

    pub fn requires_review(&self) -> bool {
        self.metadata
            .get(META_REQUIRES_REVIEW)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
