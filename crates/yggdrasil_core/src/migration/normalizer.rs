//! Legacy document parsing and leaf normalization.
//!
//! # Responsibility
//! - Decode a legacy document into its typed shape (`field`, `subfields`,
//!   pass-through extras).
//! - Map an analysed document to a [`CanonicalLeaf`] with every canonical
//!   field populated.
//! - Derive the store placement of a leaf.
//!
//! # Invariants
//! - [`normalize`] is pure: the migration date is an input.
//! - Every leaf carries the four provenance metadata keys, and
//!   `requires_review` is always `true`.
//! - One resource stub per subfield, verbatim and in document order.
//! - The limb name is unique per source path: the stem for files at the
//!   batch root, the `/`-joined relative path without extension below it.

use crate::migration::classifier::TreeSuggestion;
use crate::model::leaf::{
    CanonicalLeaf, LeafType, ResourceStub, LEGACY_BRANCH, META_MIGRATED_FROM,
    META_MIGRATION_DATE, META_ORIGINAL_FIELD, META_REQUIRES_REVIEW, SUBFIELD_CATEGORY,
};
use crate::model::taxonomy::{NewResource, TaxonomyPath, TREE_PATH_SEPARATOR};
use crate::repo::taxonomy_repo::LeafPlacement;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const FIELD_KEY: &str = "field";
const SUBFIELDS_KEY: &str = "subfields";
const RESERVED_PREFIX: &str = "legacy_";
const RESERVED_KEYS: &[&str] = &[
    META_MIGRATED_FROM,
    META_ORIGINAL_FIELD,
    META_MIGRATION_DATE,
    META_REQUIRES_REVIEW,
];

/// Legacy document could not be decoded.
#[derive(Debug)]
pub enum LegacyDocumentError {
    Io { path: PathBuf, source: std::io::Error },
    /// Text is not valid JSON.
    Parse(serde_json::Error),
    /// JSON is valid but not a legacy document.
    InvalidShape(String),
}

impl Display for LegacyDocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read `{}`: {source}", path.display()),
            Self::Parse(err) => write!(f, "invalid JSON: {err}"),
            Self::InvalidShape(message) => write!(f, "unexpected document shape: {message}"),
        }
    }
}

impl Error for LegacyDocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidShape(_) => None,
        }
    }
}

impl From<serde_json::Error> for LegacyDocumentError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Typed view of a legacy document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyDocument {
    pub field: Option<String>,
    pub subfields: Vec<String>,
    /// Every other top-level key, passed through into leaf metadata.
    pub extra: Map<String, Value>,
}

impl LegacyDocument {
    /// Reads and parses one UTF-8 document from disk.
    pub fn read(path: &Path) -> Result<(Self, String), LegacyDocumentError> {
        let text = std::fs::read_to_string(path).map_err(|source| LegacyDocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = Self::parse(&text)?;
        Ok((document, text))
    }

    /// Parses document text. `field` must be a string and `subfields` an
    /// array of strings; `null` counts as absent for both.
    pub fn parse(text: &str) -> Result<Self, LegacyDocumentError> {
        let Value::Object(mut object) = serde_json::from_str::<Value>(text)? else {
            return Err(LegacyDocumentError::InvalidShape(
                "top-level value must be an object".to_string(),
            ));
        };

        let field = match object.remove(FIELD_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => Some(value),
            Some(other) => {
                return Err(LegacyDocumentError::InvalidShape(format!(
                    "`{FIELD_KEY}` must be a string, got {}",
                    json_kind(&other)
                )))
            }
        };

        let subfields = match object.remove(SUBFIELDS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::String(value) => Ok(value),
                    other => Err(LegacyDocumentError::InvalidShape(format!(
                        "`{SUBFIELDS_KEY}[{index}]` must be a string, got {}",
                        json_kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(LegacyDocumentError::InvalidShape(format!(
                    "`{SUBFIELDS_KEY}` must be an array, got {}",
                    json_kind(&other)
                )))
            }
        };

        Ok(Self {
            field,
            subfields,
            extra: object,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Classification record for one legacy file.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyAnalysis {
    /// Path relative to the batch root, `/`-separated.
    pub source_path: String,
    /// File name with extension.
    pub file_name: String,
    /// File name without extension.
    pub stem: String,
    pub suggested_tree: TreeSuggestion,
    pub document: LegacyDocument,
}

/// Converts an analysed legacy document into a canonical leaf.
pub fn normalize(analysis: &LegacyAnalysis, migration_date: NaiveDate) -> CanonicalLeaf {
    let resources = analysis
        .document
        .subfields
        .iter()
        .map(|subfield| ResourceStub {
            title: subfield.clone(),
            category: SUBFIELD_CATEGORY.to_string(),
            description: format!("Subfield from legacy {}", analysis.file_name),
        })
        .collect();

    let mut metadata = Map::new();
    for (key, value) in &analysis.document.extra {
        if RESERVED_KEYS.contains(&key.as_str()) {
            metadata.insert(format!("{RESERVED_PREFIX}{key}"), value.clone());
        } else {
            metadata.insert(key.clone(), value.clone());
        }
    }
    metadata.insert(
        META_MIGRATED_FROM.to_string(),
        Value::String(analysis.source_path.clone()),
    );
    metadata.insert(
        META_ORIGINAL_FIELD.to_string(),
        Value::String(analysis.document.field.clone().unwrap_or_default()),
    );
    metadata.insert(
        META_MIGRATION_DATE.to_string(),
        Value::String(migration_date.format("%Y-%m-%d").to_string()),
    );
    metadata.insert(META_REQUIRES_REVIEW.to_string(), Value::Bool(true));

    let limb = limb_name(analysis);
    CanonicalLeaf {
        leaf_name: title_case(&analysis.stem),
        leaf_type: LeafType::MigratedContent,
        tree_path: [analysis.suggested_tree.as_str(), LEGACY_BRANCH, limb.as_str()]
            .join(TREE_PATH_SEPARATOR),
        limb,
        resources,
        metadata,
    }
}

fn limb_name(analysis: &LegacyAnalysis) -> String {
    match analysis.source_path.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{}", analysis.stem),
        None => analysis.stem.clone(),
    }
}

/// Store placement of a normalized leaf: `<tree> / Legacy / <limb>`.
/// Titles are trimmed; stubs with a blank title have no store counterpart.
pub fn leaf_placement(leaf: &CanonicalLeaf, tree: &TreeSuggestion) -> LeafPlacement {
    LeafPlacement {
        path: TaxonomyPath::new(tree.as_str(), LEGACY_BRANCH, leaf.limb.as_str()),
        limb_description: Some(leaf.leaf_name.clone()),
        source_path: leaf.migrated_from().map(str::to_string),
        resources: leaf
            .resources
            .iter()
            .filter(|stub| !stub.title.trim().is_empty())
            .map(|stub| NewResource {
                category: Some(stub.category.clone()),
                description: Some(stub.description.clone()),
                metadata: leaf.metadata.clone(),
                ..NewResource::new(stub.title.trim())
            })
            .collect(),
    }
}

/// Replaces `_`/`-` with spaces and upper-cases the first letter of every
/// alphabetic run, lower-casing the rest (`"quantum_mech"` → `"Quantum Mech"`).
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for ch in text.chars() {
        let ch = if ch == '_' || ch == '-' { ' ' } else { ch };
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}
