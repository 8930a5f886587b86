//! Taxonomy records: Tree, Branch, Limb, Resource and cross references.
//!
//! # Invariants
//! - `Tree.name` is globally unique, `Branch.name` unique within its tree,
//!   `Limb.name` unique within its branch, `Resource.title` unique within
//!   its limb.
//! - `Resource.tree_path` equals [`tree_path`] over its ancestors' names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Separator used by every human-readable taxonomy path.
pub const TREE_PATH_SEPARATOR: &str = " → ";

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an identifier loaded from storage.
            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

node_id!(
    /// Opaque key of a top-level knowledge domain.
    TreeId
);
node_id!(
    /// Opaque key of a subdivision within a tree.
    BranchId
);
node_id!(
    /// Opaque key of a category within a branch.
    LimbId
);
node_id!(
    /// Opaque key of one content item.
    ResourceId
);
node_id!(CrossReferenceId);

/// Level of a node in the four-level hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Tree,
    Branch,
    Limb,
    Resource,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Tree => "tree",
            Self::Branch => "branch",
            Self::Limb => "limb",
            Self::Resource => "resource",
        };
        f.write_str(label)
    }
}

/// Typed reference to any taxonomy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Tree(TreeId),
    Branch(BranchId),
    Limb(LimbId),
    Resource(ResourceId),
}

impl NodeRef {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Tree(_) => NodeKind::Tree,
            Self::Branch(_) => NodeKind::Branch,
            Self::Limb(_) => NodeKind::Limb,
            Self::Resource(_) => NodeKind::Resource,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Tree(id) => id.as_uuid(),
            Self::Branch(id) => id.as_uuid(),
            Self::Limb(id) => id.as_uuid(),
            Self::Resource(id) => id.as_uuid(),
        }
    }
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.uuid())
    }
}

/// Top-level knowledge domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tree {
    pub id: TreeId,
    pub name: String,
    pub description: Option<String>,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}

/// Subdivision of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub id: BranchId,
    /// Owning tree; lookup only.
    pub tree_id: TreeId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

/// Category within a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Limb {
    pub id: LimbId,
    pub branch_id: BranchId,
    pub name: String,
    pub description: Option<String>,
    /// Legacy document this limb was migrated from, relative to the batch
    /// root. Unique across the store.
    pub source_path: Option<String>,
    pub created_at: i64,
}

/// One content item ("leaf") owned by exactly one limb.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub id: ResourceId,
    pub limb_id: LimbId,
    pub title: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub source_url: Option<String>,
    /// Ordered key-concept tags.
    pub key_concepts: Vec<String>,
    /// Open metadata bag.
    pub metadata: Map<String, Value>,
    /// Derived `Tree → Branch → Limb → Title` path.
    pub tree_path: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Last scrape time in epoch ms, when the content came from a scrape.
    pub scraped_at: Option<i64>,
}

/// Insert payload for [`Resource`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewResource {
    pub title: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub source_url: Option<String>,
    pub key_concepts: Vec<String>,
    pub metadata: Map<String, Value>,
    pub scraped_at: Option<i64>,
}

impl NewResource {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Checks required fields before any SQL runs.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(())
    }
}

/// Directed relation between two resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossReference {
    pub id: CrossReferenceId,
    pub resource_id: ResourceId,
    pub related_resource_id: ResourceId,
    /// Relationship tag, e.g. `related` or `cited-by`.
    pub relationship_type: String,
    pub created_at: i64,
}

/// Name path of a limb: tree, branch, limb.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaxonomyPath {
    pub tree: String,
    pub branch: String,
    pub limb: String,
}

impl TaxonomyPath {
    pub fn new(
        tree: impl Into<String>,
        branch: impl Into<String>,
        limb: impl Into<String>,
    ) -> Self {
        Self {
            tree: tree.into(),
            branch: branch.into(),
            limb: limb.into(),
        }
    }

    /// Path string of a resource titled `title` under this limb.
    pub fn resource_path(&self, title: &str) -> String {
        tree_path(&self.tree, &self.branch, &self.limb, title)
    }
}

impl Display for TaxonomyPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{TREE_PATH_SEPARATOR}{}{TREE_PATH_SEPARATOR}{}",
            self.tree, self.branch, self.limb
        )
    }
}

/// Builds the canonical `Tree → Branch → Limb → Title` string.
pub fn tree_path(tree: &str, branch: &str, limb: &str, title: &str) -> String {
    [tree, branch, limb, title].join(TREE_PATH_SEPARATOR)
}

/// Rejected taxonomy mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Node name is blank after trim.
    EmptyName(NodeKind),
    /// Resource title is blank after trim.
    EmptyTitle,
    /// A resource with the same title already exists under the limb.
    DuplicateTitle { limb_id: LimbId, title: String },
    /// A sibling with the same name already exists.
    DuplicateName { kind: NodeKind, name: String },
    /// Relationship tag is blank after trim.
    EmptyRelationshipType,
    /// Cross reference from a resource to itself.
    SelfReference(ResourceId),
    /// The same (from, to, type) cross reference already exists.
    DuplicateCrossReference {
        resource_id: ResourceId,
        related_resource_id: ResourceId,
        relationship_type: String,
    },
    /// The legacy source is already recorded on another limb.
    SourceAlreadyMigrated { source_path: String, limb_id: LimbId },
    /// The limb already records a different legacy source.
    LimbSourceConflict {
        limb_id: LimbId,
        recorded: String,
        source_path: String,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName(kind) => write!(f, "{kind} name must not be blank"),
            Self::EmptyTitle => write!(f, "resource title must not be blank"),
            Self::DuplicateTitle { limb_id, title } => {
                write!(f, "resource `{title}` already exists in limb {limb_id}")
            }
            Self::DuplicateName { kind, name } => {
                write!(f, "{kind} `{name}` already exists under the same parent")
            }
            Self::EmptyRelationshipType => write!(f, "relationship type must not be blank"),
            Self::SelfReference(id) => write!(f, "resource {id} cannot reference itself"),
            Self::DuplicateCrossReference {
                resource_id,
                related_resource_id,
                relationship_type,
            } => write!(
                f,
                "cross reference {resource_id} -[{relationship_type}]-> {related_resource_id} already exists"
            ),
            Self::SourceAlreadyMigrated {
                source_path,
                limb_id,
            } => write!(f, "`{source_path}` was already migrated into limb {limb_id}"),
            Self::LimbSourceConflict {
                limb_id,
                recorded,
                source_path,
            } => write!(
                f,
                "limb {limb_id} already holds `{recorded}`; refusing to merge `{source_path}` into it"
            ),
        }
    }
}

impl Error for ValidationError {}
