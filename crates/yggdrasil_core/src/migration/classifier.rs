//! Filename-driven tree classification.
//!
//! # Responsibility
//! - Map a legacy document's file stem (optionally its body) to a tree.
//! - Recognize files that are already canonical output and must not be
//!   migrated again.
//!
//! # Invariants
//! - Keywords are matched in declaration order; the first hit wins.
//! - Matching is a lower-cased substring test, nothing more.
//! - Classification is a pure function of the table and the input.

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identifier rendered for documents no keyword matches.
pub const UNKNOWN_TREE: &str = "unknown_tree";

/// Built-in keyword table. Order is significant.
pub const DEFAULT_KEYWORDS: &[(&str, &str)] = &[
    ("philosophy", "philosophy_tree"),
    ("religion", "religion_tree"),
    ("science", "science_tree"),
    ("math", "science_tree"),
    ("physics", "science_tree"),
    ("quantum", "science_tree"),
    ("history", "history_tree"),
    ("literature", "literature_tree"),
    ("art", "arts_tree"),
    ("psychology", "science_tree"),
    ("neuroscience", "science_tree"),
    ("ai", "science_tree"),
    ("machine_learning", "science_tree"),
    ("data", "science_tree"),
];

/// File-name patterns of canonical structure files.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    r"^master_tree_structure\.json$",
    r"_branches\.json$",
    r"_leaf\.json$",
];

/// Invalid classifier table or pattern set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    /// Keyword at `index` is blank after trim.
    EmptyKeyword { index: usize },
    /// Keyword maps to a blank tree identifier.
    EmptyTree { keyword: String },
    /// Exclusion pattern does not compile.
    InvalidPattern { pattern: String, message: String },
}

impl Display for ClassifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKeyword { index } => write!(f, "keyword #{index} must not be blank"),
            Self::EmptyTree { keyword } => {
                write!(f, "keyword `{keyword}` must map to a non-blank tree")
            }
            Self::InvalidPattern { pattern, message } => {
                write!(f, "invalid exclude pattern `{pattern}`: {message}")
            }
        }
    }
}

impl Error for ClassifierError {}

/// One `keyword -> tree` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordRule {
    pub keyword: String,
    pub tree: String,
}

impl KeywordRule {
    pub fn new(keyword: impl Into<String>, tree: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            tree: tree.into(),
        }
    }
}

/// Ordered keyword table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    rules: Vec<KeywordRule>,
}

impl KeywordTable {
    /// Builds a table; keywords are lower-cased, both sides trimmed.
    pub fn new(rules: Vec<KeywordRule>) -> Result<Self, ClassifierError> {
        let mut normalized = Vec::with_capacity(rules.len());
        for (index, rule) in rules.into_iter().enumerate() {
            let keyword = rule.keyword.trim().to_lowercase();
            if keyword.is_empty() {
                return Err(ClassifierError::EmptyKeyword { index });
            }
            let tree = rule.tree.trim().to_string();
            if tree.is_empty() {
                return Err(ClassifierError::EmptyTree { keyword });
            }
            normalized.push(KeywordRule { keyword, tree });
        }
        Ok(Self { rules: normalized })
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// First rule whose keyword occurs in `lowered`.
    fn first_match(&self, lowered: &str) -> Option<&KeywordRule> {
        self.rules
            .iter()
            .find(|rule| lowered.contains(rule.keyword.as_str()))
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            rules: DEFAULT_KEYWORDS
                .iter()
                .map(|(keyword, tree)| KeywordRule::new(*keyword, *tree))
                .collect(),
        }
    }
}

/// Classification result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TreeSuggestion {
    Known(String),
    Unknown,
}

impl TreeSuggestion {
    /// Tree identifier; [`UNKNOWN_TREE`] for the sentinel.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(tree) => tree,
            Self::Unknown => UNKNOWN_TREE,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl Display for TreeSuggestion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TreeSuggestion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Keyword classifier with optional body fallback.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    table: KeywordTable,
    match_body: bool,
}

impl Classifier {
    pub fn new(table: KeywordTable) -> Self {
        Self {
            table,
            match_body: false,
        }
    }

    /// Enables scanning the body when the file stem matches nothing.
    pub fn with_body_fallback(mut self, enabled: bool) -> Self {
        self.match_body = enabled;
        self
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    /// Suggests a tree for a file stem (name without extension).
    pub fn classify(&self, stem: &str, body: Option<&str>) -> TreeSuggestion {
        if let Some(rule) = self.table.first_match(&stem.to_lowercase()) {
            return TreeSuggestion::Known(rule.tree.clone());
        }
        if self.match_body {
            if let Some(rule) = body.and_then(|text| self.table.first_match(&text.to_lowercase())) {
                return TreeSuggestion::Known(rule.tree.clone());
            }
        }
        TreeSuggestion::Unknown
    }
}

/// Compiled exclusion set for canonical output files.
#[derive(Debug, Clone)]
pub struct CanonicalPatterns {
    patterns: Vec<Regex>,
}

impl CanonicalPatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ClassifierError> {
        let compiled = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|err| ClassifierError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns: compiled })
    }

    pub fn defaults() -> Result<Self, ClassifierError> {
        Self::new(DEFAULT_EXCLUDE_PATTERNS)
    }

    /// True when `file_name` is canonical output rather than legacy input.
    pub fn is_canonical(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(file_name))
    }
}
