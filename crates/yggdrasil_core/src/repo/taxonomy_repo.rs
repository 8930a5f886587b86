//! Taxonomy repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist Tree/Branch/Limb/Resource rows and cross references.
//! - Keep `resources.tree_path` consistent with ancestor names.
//! - Provide the atomic leaf merge used by legacy migration.
//!
//! # Invariants
//! - Listings are ordered by name (resources by title).
//! - Duplicate-title checks run in the same transaction as the insert.
//! - Deletes rely on `ON DELETE CASCADE`; no descendant rows survive.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::taxonomy::{
    Branch, BranchId, CrossReference, CrossReferenceId, Limb, LimbId, NewResource, NodeKind,
    NodeRef, Resource, ResourceId, TaxonomyPath, Tree, TreeId, ValidationError,
    TREE_PATH_SEPARATOR,
};
use rusqlite::{params, Connection, OptionalExtension, Params, Row, Transaction, TransactionBehavior};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TREE_SELECT_SQL: &str = "SELECT
    tree_uuid,
    name,
    description,
    created_at,
    updated_at
FROM trees";

const BRANCH_SELECT_SQL: &str = "SELECT
    branch_uuid,
    tree_uuid,
    name,
    description,
    created_at
FROM branches";

const LIMB_SELECT_SQL: &str = "SELECT
    limb_uuid,
    branch_uuid,
    name,
    description,
    source_path,
    created_at
FROM limbs";

const RESOURCE_SELECT_SQL: &str = "SELECT
    resource_uuid,
    limb_uuid,
    title,
    author,
    category,
    description,
    content,
    source_url,
    key_concepts,
    metadata,
    tree_path,
    created_at,
    updated_at,
    scraped_at
FROM resources";

const CROSS_REFERENCE_SELECT_SQL: &str = "SELECT
    reference_uuid,
    resource_uuid,
    related_resource_uuid,
    relationship_type,
    created_at
FROM resource_cross_references";

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from taxonomy persistence and lookup operations.
#[derive(Debug)]
pub enum RepoError {
    /// Rejected mutation (blank/duplicate names, duplicate titles, ...).
    Validation(ValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Strict lookup missed.
    NotFound { kind: NodeKind, key: String },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl RepoError {
    fn not_found(kind: NodeKind, key: impl Display) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// True for the duplicate-title rejection migration treats as a skip.
    pub fn is_duplicate_title(&self) -> bool {
        matches!(
            self,
            Self::Validation(ValidationError::DuplicateTitle { .. })
        )
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, key } => write!(f, "{kind} not found: {key}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "taxonomy repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid taxonomy data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::UninitializedConnection { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Where and what to write for one migrated leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafPlacement {
    /// Tree/branch/limb the leaf lands in; missing levels are created.
    pub path: TaxonomyPath,
    /// Description applied to the limb when it is created.
    pub limb_description: Option<String>,
    /// Legacy source recorded on the limb for the already-migrated index.
    pub source_path: Option<String>,
    pub resources: Vec<NewResource>,
}

/// Result of merging (or probing) one leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Target limb; `None` only for a probe whose limb does not exist yet.
    pub limb_id: Option<LimbId>,
    /// Whether the limb is (or would be) newly created.
    pub limb_created: bool,
    /// Titles inserted (or that would be inserted).
    pub created: Vec<String>,
    /// Titles rejected by the duplicate-title guard.
    pub duplicates: Vec<String>,
}

impl MergeOutcome {
    /// Every stub collided with an existing title and nothing new landed.
    pub fn is_duplicate_only(&self) -> bool {
        !self.limb_created && self.created.is_empty() && !self.duplicates.is_empty()
    }
}

/// Repository interface for the four-level taxonomy.
pub trait TaxonomyRepository {
    /// Returns the tree named `name`, creating it when missing.
    fn get_or_create_tree(&self, name: &str) -> RepoResult<Tree>;
    /// Returns the branch `name` under `tree_id`, creating it when missing.
    fn get_or_create_branch(&self, tree_id: TreeId, name: &str) -> RepoResult<Branch>;
    /// Returns the limb `name` under `branch_id`, creating it when missing.
    fn get_or_create_limb(&self, branch_id: BranchId, name: &str) -> RepoResult<Limb>;
    /// Resolves a full name path, creating every missing ancestor atomically.
    fn get_or_create_path(&self, path: &TaxonomyPath) -> RepoResult<Limb>;

    fn find_tree(&self, name: &str) -> RepoResult<Option<Tree>>;
    fn find_branch(&self, tree_id: TreeId, name: &str) -> RepoResult<Option<Branch>>;
    fn find_limb(&self, branch_id: BranchId, name: &str) -> RepoResult<Option<Limb>>;
    fn find_resource(&self, limb_id: LimbId, title: &str) -> RepoResult<Option<Resource>>;
    fn get_resource(&self, resource_id: ResourceId) -> RepoResult<Option<Resource>>;

    fn list_trees(&self) -> RepoResult<Vec<Tree>>;
    fn list_branches(&self, tree_id: TreeId) -> RepoResult<Vec<Branch>>;
    fn list_limbs(&self, branch_id: BranchId) -> RepoResult<Vec<Limb>>;
    fn list_resources(&self, limb_id: LimbId) -> RepoResult<Vec<Resource>>;

    /// Inserts one resource; rejects blank and duplicate titles.
    fn add_resource(&self, limb_id: LimbId, resource: &NewResource) -> RepoResult<Resource>;
    /// Replaces scraped content and refreshes `scraped_at`/`updated_at`.
    fn refresh_resource(&self, resource_id: ResourceId, content: Option<&str>) -> RepoResult<()>;
    /// Renames one node and rewrites every affected `tree_path`.
    fn rename_node(&self, node: NodeRef, name: &str) -> RepoResult<()>;
    fn set_description(&self, node: NodeRef, description: Option<&str>) -> RepoResult<()>;
    /// Deletes one node and its subtree; returns the removed descendant count.
    fn delete_node(&self, node: NodeRef) -> RepoResult<usize>;

    fn add_cross_reference(
        &self,
        resource_id: ResourceId,
        related_resource_id: ResourceId,
        relationship_type: &str,
    ) -> RepoResult<CrossReference>;
    /// Lists references from or to `resource_id`.
    fn list_cross_references(&self, resource_id: ResourceId) -> RepoResult<Vec<CrossReference>>;

    /// Writes one leaf in a single transaction.
    fn merge_leaf(&self, placement: &LeafPlacement) -> RepoResult<MergeOutcome>;
    /// Computes what [`TaxonomyRepository::merge_leaf`] would do without writing.
    fn probe_leaf(&self, placement: &LeafPlacement) -> RepoResult<MergeOutcome>;
}

/// SQLite-backed taxonomy repository.
pub struct SqliteTaxonomyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaxonomyRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn immediate(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl TaxonomyRepository for SqliteTaxonomyRepository<'_> {
    fn get_or_create_tree(&self, name: &str) -> RepoResult<Tree> {
        let tx = self.immediate()?;
        let (tree, _) = ensure_tree(&tx, name)?;
        tx.commit()?;
        Ok(tree)
    }

    fn get_or_create_branch(&self, tree_id: TreeId, name: &str) -> RepoResult<Branch> {
        let tx = self.immediate()?;
        let (branch, _) = ensure_branch(&tx, tree_id, name)?;
        tx.commit()?;
        Ok(branch)
    }

    fn get_or_create_limb(&self, branch_id: BranchId, name: &str) -> RepoResult<Limb> {
        let tx = self.immediate()?;
        let (limb, _) = ensure_limb(&tx, branch_id, name, None)?;
        tx.commit()?;
        Ok(limb)
    }

    fn get_or_create_path(&self, path: &TaxonomyPath) -> RepoResult<Limb> {
        let tx = self.immediate()?;
        let (limb, _) = ensure_path(&tx, path, None)?;
        tx.commit()?;
        Ok(limb)
    }

    fn find_tree(&self, name: &str) -> RepoResult<Option<Tree>> {
        find_tree_by_name(self.conn, name)
    }

    fn find_branch(&self, tree_id: TreeId, name: &str) -> RepoResult<Option<Branch>> {
        find_branch_by_name(self.conn, tree_id, name)
    }

    fn find_limb(&self, branch_id: BranchId, name: &str) -> RepoResult<Option<Limb>> {
        find_limb_by_name(self.conn, branch_id, name)
    }

    fn find_resource(&self, limb_id: LimbId, title: &str) -> RepoResult<Option<Resource>> {
        query_one(
            self.conn,
            &format!("{RESOURCE_SELECT_SQL} WHERE limb_uuid = ?1 AND title = ?2;"),
            params![limb_id.to_string(), title],
            parse_resource_row,
        )
    }

    fn get_resource(&self, resource_id: ResourceId) -> RepoResult<Option<Resource>> {
        load_resource(self.conn, resource_id)
    }

    fn list_trees(&self) -> RepoResult<Vec<Tree>> {
        query_all(
            self.conn,
            &format!("{TREE_SELECT_SQL} ORDER BY name ASC;"),
            [],
            parse_tree_row,
        )
    }

    fn list_branches(&self, tree_id: TreeId) -> RepoResult<Vec<Branch>> {
        query_all(
            self.conn,
            &format!("{BRANCH_SELECT_SQL} WHERE tree_uuid = ?1 ORDER BY name ASC;"),
            [tree_id.to_string()],
            parse_branch_row,
        )
    }

    fn list_limbs(&self, branch_id: BranchId) -> RepoResult<Vec<Limb>> {
        query_all(
            self.conn,
            &format!("{LIMB_SELECT_SQL} WHERE branch_uuid = ?1 ORDER BY name ASC;"),
            [branch_id.to_string()],
            parse_limb_row,
        )
    }

    fn list_resources(&self, limb_id: LimbId) -> RepoResult<Vec<Resource>> {
        query_all(
            self.conn,
            &format!("{RESOURCE_SELECT_SQL} WHERE limb_uuid = ?1 ORDER BY title ASC;"),
            [limb_id.to_string()],
            parse_resource_row,
        )
    }

    fn add_resource(&self, limb_id: LimbId, resource: &NewResource) -> RepoResult<Resource> {
        let tx = self.immediate()?;
        let created = insert_resource(&tx, limb_id, resource)?;
        tx.commit()?;
        Ok(created)
    }

    fn refresh_resource(&self, resource_id: ResourceId, content: Option<&str>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE resources
             SET content = ?2,
                 scraped_at = (strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE resource_uuid = ?1;",
            params![resource_id.to_string(), content],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(NodeKind::Resource, resource_id));
        }
        Ok(())
    }

    fn rename_node(&self, node: NodeRef, name: &str) -> RepoResult<()> {
        if node.kind() == NodeKind::Resource {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyTitle.into());
            }
        } else {
            require_name(node.kind(), name)?;
        }
        let tx = self.immediate()?;
        match node {
            NodeRef::Tree(id) => {
                let tree = load_tree(&tx, id)?.ok_or_else(|| RepoError::not_found(NodeKind::Tree, id))?;
                if tree.name != name && find_tree_by_name(&tx, name)?.is_some() {
                    return Err(duplicate_name(NodeKind::Tree, name));
                }
                tx.execute(
                    "UPDATE trees
                     SET name = ?2,
                         updated_at = (strftime('%s', 'now') * 1000)
                     WHERE tree_uuid = ?1;",
                    params![id.to_string(), name],
                )?;
                refresh_tree_paths(
                    &tx,
                    "limb_uuid IN (
                        SELECT l.limb_uuid
                        FROM limbs l
                        INNER JOIN branches b ON b.branch_uuid = l.branch_uuid
                        WHERE b.tree_uuid = ?1
                    )",
                    id.to_string(),
                )?;
            }
            NodeRef::Branch(id) => {
                let branch =
                    load_branch(&tx, id)?.ok_or_else(|| RepoError::not_found(NodeKind::Branch, id))?;
                if branch.name != name && find_branch_by_name(&tx, branch.tree_id, name)?.is_some() {
                    return Err(duplicate_name(NodeKind::Branch, name));
                }
                tx.execute(
                    "UPDATE branches SET name = ?2 WHERE branch_uuid = ?1;",
                    params![id.to_string(), name],
                )?;
                refresh_tree_paths(
                    &tx,
                    "limb_uuid IN (SELECT limb_uuid FROM limbs WHERE branch_uuid = ?1)",
                    id.to_string(),
                )?;
            }
            NodeRef::Limb(id) => {
                let limb = load_limb(&tx, id)?.ok_or_else(|| RepoError::not_found(NodeKind::Limb, id))?;
                if limb.name != name && find_limb_by_name(&tx, limb.branch_id, name)?.is_some() {
                    return Err(duplicate_name(NodeKind::Limb, name));
                }
                tx.execute(
                    "UPDATE limbs SET name = ?2 WHERE limb_uuid = ?1;",
                    params![id.to_string(), name],
                )?;
                refresh_tree_paths(&tx, "limb_uuid = ?1", id.to_string())?;
            }
            NodeRef::Resource(id) => {
                let resource = load_resource(&tx, id)?
                    .ok_or_else(|| RepoError::not_found(NodeKind::Resource, id))?;
                if resource.title != name && title_exists(&tx, resource.limb_id, name)? {
                    return Err(ValidationError::DuplicateTitle {
                        limb_id: resource.limb_id,
                        title: name.to_string(),
                    }
                    .into());
                }
                tx.execute(
                    "UPDATE resources
                     SET title = ?2,
                         updated_at = (strftime('%s', 'now') * 1000)
                     WHERE resource_uuid = ?1;",
                    params![id.to_string(), name],
                )?;
                refresh_tree_paths(&tx, "resource_uuid = ?1", id.to_string())?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn set_description(&self, node: NodeRef, description: Option<&str>) -> RepoResult<()> {
        let sql = match node {
            NodeRef::Tree(_) => {
                "UPDATE trees
                 SET description = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE tree_uuid = ?1;"
            }
            NodeRef::Branch(_) => "UPDATE branches SET description = ?2 WHERE branch_uuid = ?1;",
            NodeRef::Limb(_) => "UPDATE limbs SET description = ?2 WHERE limb_uuid = ?1;",
            NodeRef::Resource(_) => {
                "UPDATE resources
                 SET description = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE resource_uuid = ?1;"
            }
        };
        let changed = self
            .conn
            .execute(sql, params![node.uuid().to_string(), description])?;
        if changed == 0 {
            return Err(RepoError::not_found(node.kind(), node.uuid()));
        }
        Ok(())
    }

    fn delete_node(&self, node: NodeRef) -> RepoResult<usize> {
        let tx = self.immediate()?;
        let key = node.uuid().to_string();
        let (count_sql, delete_sql) = match node {
            NodeRef::Tree(_) => (
                Some(
                    "SELECT
                        (SELECT COUNT(*) FROM branches WHERE tree_uuid = ?1)
                      + (SELECT COUNT(*)
                         FROM limbs l
                         INNER JOIN branches b ON b.branch_uuid = l.branch_uuid
                         WHERE b.tree_uuid = ?1)
                      + (SELECT COUNT(*)
                         FROM resources r
                         INNER JOIN limbs l ON l.limb_uuid = r.limb_uuid
                         INNER JOIN branches b ON b.branch_uuid = l.branch_uuid
                         WHERE b.tree_uuid = ?1);",
                ),
                "DELETE FROM trees WHERE tree_uuid = ?1;",
            ),
            NodeRef::Branch(_) => (
                Some(
                    "SELECT
                        (SELECT COUNT(*) FROM limbs WHERE branch_uuid = ?1)
                      + (SELECT COUNT(*)
                         FROM resources r
                         INNER JOIN limbs l ON l.limb_uuid = r.limb_uuid
                         WHERE l.branch_uuid = ?1);",
                ),
                "DELETE FROM branches WHERE branch_uuid = ?1;",
            ),
            NodeRef::Limb(_) => (
                Some("SELECT COUNT(*) FROM resources WHERE limb_uuid = ?1;"),
                "DELETE FROM limbs WHERE limb_uuid = ?1;",
            ),
            NodeRef::Resource(_) => (None, "DELETE FROM resources WHERE resource_uuid = ?1;"),
        };

        let descendants: i64 = match count_sql {
            Some(sql) => tx.query_row(sql, [&key], |row| row.get(0))?,
            None => 0,
        };
        let changed = tx.execute(delete_sql, [&key])?;
        if changed == 0 {
            return Err(RepoError::not_found(node.kind(), key));
        }
        tx.commit()?;

        usize::try_from(descendants)
            .map_err(|_| RepoError::InvalidData(format!("negative descendant count {descendants}")))
    }

    fn add_cross_reference(
        &self,
        resource_id: ResourceId,
        related_resource_id: ResourceId,
        relationship_type: &str,
    ) -> RepoResult<CrossReference> {
        if relationship_type.trim().is_empty() {
            return Err(ValidationError::EmptyRelationshipType.into());
        }
        if resource_id == related_resource_id {
            return Err(ValidationError::SelfReference(resource_id).into());
        }

        let tx = self.immediate()?;
        for id in [resource_id, related_resource_id] {
            if load_resource(&tx, id)?.is_none() {
                return Err(RepoError::not_found(NodeKind::Resource, id));
            }
        }

        let exists: i64 = tx.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM resource_cross_references
                WHERE resource_uuid = ?1
                  AND related_resource_uuid = ?2
                  AND relationship_type = ?3
            );",
            params![
                resource_id.to_string(),
                related_resource_id.to_string(),
                relationship_type
            ],
            |row| row.get(0),
        )?;
        if exists == 1 {
            return Err(ValidationError::DuplicateCrossReference {
                resource_id,
                related_resource_id,
                relationship_type: relationship_type.to_string(),
            }
            .into());
        }

        let reference_id = CrossReferenceId::new();
        tx.execute(
            "INSERT INTO resource_cross_references (
                reference_uuid,
                resource_uuid,
                related_resource_uuid,
                relationship_type
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                reference_id.to_string(),
                resource_id.to_string(),
                related_resource_id.to_string(),
                relationship_type,
            ],
        )?;
        let created = query_one(
            &tx,
            &format!("{CROSS_REFERENCE_SELECT_SQL} WHERE reference_uuid = ?1;"),
            [reference_id.to_string()],
            parse_cross_reference_row,
        )?
        .ok_or_else(|| RepoError::InvalidData(format!("cross reference {reference_id} vanished")))?;
        tx.commit()?;
        Ok(created)
    }

    fn list_cross_references(&self, resource_id: ResourceId) -> RepoResult<Vec<CrossReference>> {
        query_all(
            self.conn,
            &format!(
                "{CROSS_REFERENCE_SELECT_SQL}
                 WHERE resource_uuid = ?1 OR related_resource_uuid = ?1
                 ORDER BY created_at ASC, reference_uuid ASC;"
            ),
            [resource_id.to_string()],
            parse_cross_reference_row,
        )
    }

    fn merge_leaf(&self, placement: &LeafPlacement) -> RepoResult<MergeOutcome> {
        let tx = self.immediate()?;
        let (limb, limb_created) =
            ensure_path(&tx, &placement.path, placement.limb_description.as_deref())?;

        if let Some(source_path) = placement.source_path.as_deref() {
            ensure_source_free(&tx, source_path, limb.id)?;
            ensure_limb_unclaimed(&limb, source_path)?;
            if limb.source_path.is_none() {
                tx.execute(
                    "UPDATE limbs SET source_path = ?2 WHERE limb_uuid = ?1;",
                    params![limb.id.to_string(), source_path],
                )?;
            }
        }

        let mut outcome = MergeOutcome {
            limb_id: Some(limb.id),
            limb_created,
            ..MergeOutcome::default()
        };
        for resource in &placement.resources {
            match insert_resource(&tx, limb.id, resource) {
                Ok(created) => outcome.created.push(created.title),
                Err(err) if err.is_duplicate_title() => {
                    outcome.duplicates.push(resource.title.clone());
                }
                Err(err) => return Err(err),
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn probe_leaf(&self, placement: &LeafPlacement) -> RepoResult<MergeOutcome> {
        require_name(NodeKind::Tree, &placement.path.tree)?;
        require_name(NodeKind::Branch, &placement.path.branch)?;
        require_name(NodeKind::Limb, &placement.path.limb)?;
        for resource in &placement.resources {
            resource.validate()?;
        }

        let existing_limb = match find_tree_by_name(self.conn, &placement.path.tree)? {
            None => None,
            Some(tree) => match find_branch_by_name(self.conn, tree.id, &placement.path.branch)? {
                None => None,
                Some(branch) => find_limb_by_name(self.conn, branch.id, &placement.path.limb)?,
            },
        };

        if let (Some(source_path), Some(limb)) =
            (placement.source_path.as_deref(), existing_limb.as_ref())
        {
            ensure_source_free(self.conn, source_path, limb.id)?;
            ensure_limb_unclaimed(limb, source_path)?;
        } else if let Some(source_path) = placement.source_path.as_deref() {
            if let Some(owner) = limb_by_source(self.conn, source_path)? {
                return Err(ValidationError::SourceAlreadyMigrated {
                    source_path: source_path.to_string(),
                    limb_id: owner.id,
                }
                .into());
            }
        }

        let mut outcome = MergeOutcome {
            limb_id: existing_limb.as_ref().map(|limb| limb.id),
            limb_created: existing_limb.is_none(),
            ..MergeOutcome::default()
        };
        let mut seen = HashSet::new();
        for resource in &placement.resources {
            let stored = match existing_limb.as_ref() {
                Some(limb) => title_exists(self.conn, limb.id, &resource.title)?,
                None => false,
            };
            if stored || !seen.insert(resource.title.as_str()) {
                outcome.duplicates.push(resource.title.clone());
            } else {
                outcome.created.push(resource.title.clone());
            }
        }
        Ok(outcome)
    }
}

fn duplicate_name(kind: NodeKind, name: &str) -> RepoError {
    ValidationError::DuplicateName {
        kind,
        name: name.to_string(),
    }
    .into()
}

fn ensure_path(
    conn: &Connection,
    path: &TaxonomyPath,
    limb_description: Option<&str>,
) -> RepoResult<(Limb, bool)> {
    let (tree, _) = ensure_tree(conn, &path.tree)?;
    let (branch, _) = ensure_branch(conn, tree.id, &path.branch)?;
    ensure_limb(conn, branch.id, &path.limb, limb_description)
}

fn require_name(kind: NodeKind, name: &str) -> RepoResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName(kind).into());
    }
    Ok(())
}

fn ensure_tree(conn: &Connection, name: &str) -> RepoResult<(Tree, bool)> {
    require_name(NodeKind::Tree, name)?;
    if let Some(tree) = find_tree_by_name(conn, name)? {
        return Ok((tree, false));
    }
    let id = TreeId::new();
    conn.execute(
        "INSERT INTO trees (tree_uuid, name) VALUES (?1, ?2);",
        params![id.to_string(), name],
    )?;
    let tree = load_tree(conn, id)?.ok_or_else(|| RepoError::not_found(NodeKind::Tree, id))?;
    Ok((tree, true))
}

fn ensure_branch(conn: &Connection, tree_id: TreeId, name: &str) -> RepoResult<(Branch, bool)> {
    require_name(NodeKind::Branch, name)?;
    if load_tree(conn, tree_id)?.is_none() {
        return Err(RepoError::not_found(NodeKind::Tree, tree_id));
    }
    if let Some(branch) = find_branch_by_name(conn, tree_id, name)? {
        return Ok((branch, false));
    }
    let id = BranchId::new();
    conn.execute(
        "INSERT INTO branches (branch_uuid, tree_uuid, name) VALUES (?1, ?2, ?3);",
        params![id.to_string(), tree_id.to_string(), name],
    )?;
    let branch =
        load_branch(conn, id)?.ok_or_else(|| RepoError::not_found(NodeKind::Branch, id))?;
    Ok((branch, true))
}

fn ensure_limb(
    conn: &Connection,
    branch_id: BranchId,
    name: &str,
    description: Option<&str>,
) -> RepoResult<(Limb, bool)> {
    require_name(NodeKind::Limb, name)?;
    if load_branch(conn, branch_id)?.is_none() {
        return Err(RepoError::not_found(NodeKind::Branch, branch_id));
    }
    if let Some(limb) = find_limb_by_name(conn, branch_id, name)? {
        return Ok((limb, false));
    }
    let id = LimbId::new();
    conn.execute(
        "INSERT INTO limbs (limb_uuid, branch_uuid, name, description) VALUES (?1, ?2, ?3, ?4);",
        params![id.to_string(), branch_id.to_string(), name, description],
    )?;
    let limb = load_limb(conn, id)?.ok_or_else(|| RepoError::not_found(NodeKind::Limb, id))?;
    Ok((limb, true))
}

fn ensure_source_free(conn: &Connection, source_path: &str, limb_id: LimbId) -> RepoResult<()> {
    match limb_by_source(conn, source_path)? {
        Some(owner) if owner.id != limb_id => Err(ValidationError::SourceAlreadyMigrated {
            source_path: source_path.to_string(),
            limb_id: owner.id,
        }
        .into()),
        _ => Ok(()),
    }
}

fn ensure_limb_unclaimed(limb: &Limb, source_path: &str) -> RepoResult<()> {
    match limb.source_path.as_deref() {
        Some(recorded) if recorded != source_path => Err(ValidationError::LimbSourceConflict {
            limb_id: limb.id,
            recorded: recorded.to_string(),
            source_path: source_path.to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

fn limb_by_source(conn: &Connection, source_path: &str) -> RepoResult<Option<Limb>> {
    query_one(
        conn,
        &format!("{LIMB_SELECT_SQL} WHERE source_path = ?1;"),
        [source_path],
        parse_limb_row,
    )
}

fn insert_resource(
    conn: &Connection,
    limb_id: LimbId,
    resource: &NewResource,
) -> RepoResult<Resource> {
    resource.validate()?;
    let path = limb_path(conn, limb_id)?.ok_or_else(|| RepoError::not_found(NodeKind::Limb, limb_id))?;
    if title_exists(conn, limb_id, &resource.title)? {
        return Err(ValidationError::DuplicateTitle {
            limb_id,
            title: resource.title.clone(),
        }
        .into());
    }

    let id = ResourceId::new();
    conn.execute(
        "INSERT INTO resources (
            resource_uuid,
            limb_uuid,
            title,
            author,
            category,
            description,
            content,
            source_url,
            key_concepts,
            metadata,
            tree_path,
            scraped_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
        params![
            id.to_string(),
            limb_id.to_string(),
            resource.title.as_str(),
            resource.author.as_deref(),
            resource.category.as_deref(),
            resource.description.as_deref(),
            resource.content.as_deref(),
            resource.source_url.as_deref(),
            encode_json(&resource.key_concepts)?,
            encode_json(&resource.metadata)?,
            path.resource_path(&resource.title),
            resource.scraped_at,
        ],
    )?;

    load_resource(conn, id)?.ok_or_else(|| RepoError::not_found(NodeKind::Resource, id))
}

fn title_exists(conn: &Connection, limb_id: LimbId, title: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM resources WHERE limb_uuid = ?1 AND title = ?2
        );",
        params![limb_id.to_string(), title],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn limb_path(conn: &Connection, limb_id: LimbId) -> RepoResult<Option<TaxonomyPath>> {
    let names: Option<(String, String, String)> = conn
        .query_row(
            "SELECT t.name, b.name, l.name
             FROM limbs l
             INNER JOIN branches b ON b.branch_uuid = l.branch_uuid
             INNER JOIN trees t ON t.tree_uuid = b.tree_uuid
             WHERE l.limb_uuid = ?1;",
            [limb_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    Ok(names.map(|(tree, branch, limb)| TaxonomyPath::new(tree, branch, limb)))
}

/// Recomputes `tree_path` for resources matched by `scope` (bound to `?1`).
fn refresh_tree_paths(conn: &Connection, scope: &str, key: String) -> RepoResult<usize> {
    let sql = format!(
        "UPDATE resources
         SET tree_path = (
             SELECT t.name || ?2 || b.name || ?2 || l.name || ?2 || resources.title
             FROM limbs l
             INNER JOIN branches b ON b.branch_uuid = l.branch_uuid
             INNER JOIN trees t ON t.tree_uuid = b.tree_uuid
             WHERE l.limb_uuid = resources.limb_uuid
         )
         WHERE {scope};"
    );
    Ok(conn.execute(&sql, params![key, TREE_PATH_SEPARATOR])?)
}

fn find_tree_by_name(conn: &Connection, name: &str) -> RepoResult<Option<Tree>> {
    query_one(
        conn,
        &format!("{TREE_SELECT_SQL} WHERE name = ?1;"),
        [name],
        parse_tree_row,
    )
}

fn find_branch_by_name(
    conn: &Connection,
    tree_id: TreeId,
    name: &str,
) -> RepoResult<Option<Branch>> {
    query_one(
        conn,
        &format!("{BRANCH_SELECT_SQL} WHERE tree_uuid = ?1 AND name = ?2;"),
        params![tree_id.to_string(), name],
        parse_branch_row,
    )
}

fn find_limb_by_name(conn: &Connection, branch_id: BranchId, name: &str) -> RepoResult<Option<Limb>> {
    query_one(
        conn,
        &format!("{LIMB_SELECT_SQL} WHERE branch_uuid = ?1 AND name = ?2;"),
        params![branch_id.to_string(), name],
        parse_limb_row,
    )
}

fn load_tree(conn: &Connection, id: TreeId) -> RepoResult<Option<Tree>> {
    query_one(
        conn,
        &format!("{TREE_SELECT_SQL} WHERE tree_uuid = ?1;"),
        [id.to_string()],
        parse_tree_row,
    )
}

fn load_branch(conn: &Connection, id: BranchId) -> RepoResult<Option<Branch>> {
    query_one(
        conn,
        &format!("{BRANCH_SELECT_SQL} WHERE branch_uuid = ?1;"),
        [id.to_string()],
        parse_branch_row,
    )
}

fn load_limb(conn: &Connection, id: LimbId) -> RepoResult<Option<Limb>> {
    query_one(
        conn,
        &format!("{LIMB_SELECT_SQL} WHERE limb_uuid = ?1;"),
        [id.to_string()],
        parse_limb_row,
    )
}

fn load_resource(conn: &Connection, id: ResourceId) -> RepoResult<Option<Resource>> {
    query_one(
        conn,
        &format!("{RESOURCE_SELECT_SQL} WHERE resource_uuid = ?1;"),
        [id.to_string()],
        parse_resource_row,
    )
}

fn query_one<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    parse: fn(&Row<'_>) -> RepoResult<T>,
) -> RepoResult<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(parse(row)?)),
        None => Ok(None),
    }
}

fn query_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    parse: fn(&Row<'_>) -> RepoResult<T>,
) -> RepoResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse(row)?);
    }
    Ok(items)
}

fn parse_tree_row(row: &Row<'_>) -> RepoResult<Tree> {
    Ok(Tree {
        id: TreeId::from_uuid(parse_uuid_column(row, "tree_uuid", "trees.tree_uuid")?),
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_branch_row(row: &Row<'_>) -> RepoResult<Branch> {
    Ok(Branch {
        id: BranchId::from_uuid(parse_uuid_column(row, "branch_uuid", "branches.branch_uuid")?),
        tree_id: TreeId::from_uuid(parse_uuid_column(row, "tree_uuid", "branches.tree_uuid")?),
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_limb_row(row: &Row<'_>) -> RepoResult<Limb> {
    Ok(Limb {
        id: LimbId::from_uuid(parse_uuid_column(row, "limb_uuid", "limbs.limb_uuid")?),
        branch_id: BranchId::from_uuid(parse_uuid_column(row, "branch_uuid", "limbs.branch_uuid")?),
        name: row.get("name")?,
        description: row.get("description")?,
        source_path: row.get("source_path")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_resource_row(row: &Row<'_>) -> RepoResult<Resource> {
    let key_concepts_text: String = row.get("key_concepts")?;
    let key_concepts: Vec<String> = serde_json::from_str(&key_concepts_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid resources.key_concepts `{key_concepts_text}`: {err}"))
    })?;

    let metadata_text: String = row.get("metadata")?;
    let metadata: Map<String, Value> = serde_json::from_str(&metadata_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid resources.metadata `{metadata_text}`: {err}"))
    })?;

    Ok(Resource {
        id: ResourceId::from_uuid(parse_uuid_column(row, "resource_uuid", "resources.resource_uuid")?),
        limb_id: LimbId::from_uuid(parse_uuid_column(row, "limb_uuid", "resources.limb_uuid")?),
        title: row.get("title")?,
        author: row.get("author")?,
        category: row.get("category")?,
        description: row.get("description")?,
        content: row.get("content")?,
        source_url: row.get("source_url")?,
        key_concepts,
        metadata,
        tree_path: row.get("tree_path")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        scraped_at: row.get("scraped_at")?,
    })
}

fn parse_cross_reference_row(row: &Row<'_>) -> RepoResult<CrossReference> {
    Ok(CrossReference {
        id: CrossReferenceId::from_uuid(parse_uuid_column(
            row,
            "reference_uuid",
            "resource_cross_references.reference_uuid",
        )?),
        resource_id: ResourceId::from_uuid(parse_uuid_column(
            row,
            "resource_uuid",
            "resource_cross_references.resource_uuid",
        )?),
        related_resource_id: ResourceId::from_uuid(parse_uuid_column(
            row,
            "related_resource_uuid",
            "resource_cross_references.related_resource_uuid",
        )?),
        relationship_type: row.get("relationship_type")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_uuid_column(row: &Row<'_>, name: &str, column: &'static str) -> RepoResult<Uuid> {
    let value: String = row.get(name)?;
    Uuid::parse_str(&value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn encode_json<T: serde::Serialize>(value: &T) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode json column: {err}")))
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
