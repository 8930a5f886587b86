//! Taxonomy use-case service.
//!
//! # Responsibility
//! - Normalize names, titles and relationship tags above the repository.
//! - Provide strict (NotFound on miss) and auto-creating navigation.
//! - Expose the structure scan over the same repository handle.
//!
//! # Invariants
//! - Names and titles are trimmed before they reach storage.
//! - Relationship tags are trimmed and lower-cased.
//! - Strict lookups never create nodes.

use crate::model::taxonomy::{
    Branch, BranchId, CrossReference, Limb, LimbId, NewResource, NodeKind, NodeRef, Resource,
    ResourceId, TaxonomyPath, Tree, TreeId, ValidationError, TREE_PATH_SEPARATOR,
};
use crate::repo::taxonomy_repo::{
    LeafPlacement, MergeOutcome, RepoError, TaxonomyRepository,
};
use crate::service::structure::{scan_structure, StructureSummary};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from taxonomy service operations.
#[derive(Debug)]
pub enum TaxonomyServiceError {
    /// Strict lookup missed.
    NotFound { kind: NodeKind, key: String },
    /// Mutation rejected by a taxonomy invariant.
    Validation(ValidationError),
    /// Repository-level failure.
    Repo(RepoError),
}

impl TaxonomyServiceError {
    fn not_found(kind: NodeKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }
}

impl Display for TaxonomyServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, key } => write!(f, "{kind} not found: {key}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaxonomyServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound { .. } => None,
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for TaxonomyServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { kind, key } => Self::NotFound { kind, key },
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationError> for TaxonomyServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

pub type TaxonomyServiceResult<T> = Result<T, TaxonomyServiceError>;

/// Taxonomy service facade.
pub struct TaxonomyService<R: TaxonomyRepository> {
    repo: R,
}

impl<R: TaxonomyRepository> TaxonomyService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn ensure_tree(&self, name: &str) -> TaxonomyServiceResult<Tree> {
        let name = normalize_name(NodeKind::Tree, name)?;
        Ok(self.repo.get_or_create_tree(&name)?)
    }

    pub fn ensure_branch(&self, tree_id: TreeId, name: &str) -> TaxonomyServiceResult<Branch> {
        let name = normalize_name(NodeKind::Branch, name)?;
        Ok(self.repo.get_or_create_branch(tree_id, &name)?)
    }

    pub fn ensure_limb(&self, branch_id: BranchId, name: &str) -> TaxonomyServiceResult<Limb> {
        let name = normalize_name(NodeKind::Limb, name)?;
        Ok(self.repo.get_or_create_limb(branch_id, &name)?)
    }

    /// Returns the limb at `tree/branch/limb`, creating missing ancestors.
    pub fn ensure_path(&self, tree: &str, branch: &str, limb: &str) -> TaxonomyServiceResult<Limb> {
        let path = normalize_path(tree, branch, limb)?;
        Ok(self.repo.get_or_create_path(&path)?)
    }

    pub fn find_tree(&self, name: &str) -> TaxonomyServiceResult<Tree> {
        let name = name.trim();
        self.repo
            .find_tree(name)?
            .ok_or_else(|| TaxonomyServiceError::not_found(NodeKind::Tree, name))
    }

    pub fn find_branch(&self, tree_id: TreeId, name: &str) -> TaxonomyServiceResult<Branch> {
        let name = name.trim();
        self.repo.find_branch(tree_id, name)?.ok_or_else(|| {
            TaxonomyServiceError::not_found(NodeKind::Branch, format!("{tree_id}/{name}"))
        })
    }

    pub fn find_limb(&self, branch_id: BranchId, name: &str) -> TaxonomyServiceResult<Limb> {
        let name = name.trim();
        self.repo.find_limb(branch_id, name)?.ok_or_else(|| {
            TaxonomyServiceError::not_found(NodeKind::Limb, format!("{branch_id}/{name}"))
        })
    }

    /// Strictly resolves a name path to its limb.
    pub fn resolve_path(&self, tree: &str, branch: &str, limb: &str) -> TaxonomyServiceResult<Limb> {
        let tree_node = self.find_tree(tree)?;
        let branch_node = self.repo.find_branch(tree_node.id, branch.trim())?.ok_or_else(|| {
            TaxonomyServiceError::not_found(
                NodeKind::Branch,
                join_path(&[tree.trim(), branch.trim()]),
            )
        })?;
        self.repo
            .find_limb(branch_node.id, limb.trim())?
            .ok_or_else(|| {
                TaxonomyServiceError::not_found(
                    NodeKind::Limb,
                    join_path(&[tree.trim(), branch.trim(), limb.trim()]),
                )
            })
    }

    pub fn get_resource_by_path(
        &self,
        tree: &str,
        branch: &str,
        limb: &str,
        title: &str,
    ) -> TaxonomyServiceResult<Resource> {
        let limb_node = self.resolve_path(tree, branch, limb)?;
        self.repo
            .find_resource(limb_node.id, title.trim())?
            .ok_or_else(|| {
                TaxonomyServiceError::not_found(
                    NodeKind::Resource,
                    join_path(&[tree.trim(), branch.trim(), limb.trim(), title.trim()]),
                )
            })
    }

    pub fn get_resource(&self, resource_id: ResourceId) -> TaxonomyServiceResult<Resource> {
        self.repo
            .get_resource(resource_id)?
            .ok_or_else(|| TaxonomyServiceError::not_found(NodeKind::Resource, resource_id.to_string()))
    }

    pub fn list_trees(&self) -> TaxonomyServiceResult<Vec<Tree>> {
        Ok(self.repo.list_trees()?)
    }

    pub fn list_branches(&self, tree_id: TreeId) -> TaxonomyServiceResult<Vec<Branch>> {
        Ok(self.repo.list_branches(tree_id)?)
    }

    pub fn list_limbs(&self, branch_id: BranchId) -> TaxonomyServiceResult<Vec<Limb>> {
        Ok(self.repo.list_limbs(branch_id)?)
    }

    pub fn list_resources(&self, limb_id: LimbId) -> TaxonomyServiceResult<Vec<Resource>> {
        Ok(self.repo.list_resources(limb_id)?)
    }

    /// Adds one resource; duplicate titles under the limb are rejected.
    pub fn add_resource(
        &self,
        limb_id: LimbId,
        mut resource: NewResource,
    ) -> TaxonomyServiceResult<Resource> {
        resource.title = resource.title.trim().to_string();
        resource.validate()?;
        Ok(self.repo.add_resource(limb_id, &resource)?)
    }

    pub fn refresh_resource(
        &self,
        resource_id: ResourceId,
        content: Option<&str>,
    ) -> TaxonomyServiceResult<()> {
        Ok(self.repo.refresh_resource(resource_id, content)?)
    }

    pub fn rename_node(&self, node: NodeRef, name: &str) -> TaxonomyServiceResult<()> {
        let name = match node {
            NodeRef::Resource(_) => {
                let title = name.trim();
                if title.is_empty() {
                    return Err(ValidationError::EmptyTitle.into());
                }
                title.to_string()
            }
            other => normalize_name(other.kind(), name)?,
        };
        Ok(self.repo.rename_node(node, &name)?)
    }

    /// Sets or clears a description; blank text clears it.
    pub fn set_description(
        &self,
        node: NodeRef,
        description: Option<&str>,
    ) -> TaxonomyServiceResult<()> {
        let description = description.map(str::trim).filter(|text| !text.is_empty());
        Ok(self.repo.set_description(node, description)?)
    }

    /// Deletes a node with its subtree; returns removed descendant count.
    pub fn delete_node(&self, node: NodeRef) -> TaxonomyServiceResult<usize> {
        let removed = self.repo.delete_node(node)?;
        log::info!(
            "event=taxonomy_delete module=service status=ok kind={} descendants={removed}",
            node.kind()
        );
        Ok(removed)
    }

    pub fn add_cross_reference(
        &self,
        resource_id: ResourceId,
        related_resource_id: ResourceId,
        relationship_type: &str,
    ) -> TaxonomyServiceResult<CrossReference> {
        let relationship_type = normalize_relationship_type(relationship_type)?;
        Ok(self
            .repo
            .add_cross_reference(resource_id, related_resource_id, &relationship_type)?)
    }

    pub fn list_cross_references(
        &self,
        resource_id: ResourceId,
    ) -> TaxonomyServiceResult<Vec<CrossReference>> {
        Ok(self.repo.list_cross_references(resource_id)?)
    }

    pub fn merge_leaf(&self, placement: &LeafPlacement) -> TaxonomyServiceResult<MergeOutcome> {
        Ok(self.repo.merge_leaf(placement)?)
    }

    pub fn probe_leaf(&self, placement: &LeafPlacement) -> TaxonomyServiceResult<MergeOutcome> {
        Ok(self.repo.probe_leaf(placement)?)
    }

    /// Read-only nested summary of the whole store.
    pub fn structure(&self) -> TaxonomyServiceResult<StructureSummary> {
        Ok(scan_structure(&self.repo)?)
    }
}

fn normalize_name(kind: NodeKind, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName(kind));
    }
    Ok(trimmed.to_string())
}

fn normalize_path(tree: &str, branch: &str, limb: &str) -> Result<TaxonomyPath, ValidationError> {
    Ok(TaxonomyPath::new(
        normalize_name(NodeKind::Tree, tree)?,
        normalize_name(NodeKind::Branch, branch)?,
        normalize_name(NodeKind::Limb, limb)?,
    ))
}

fn normalize_relationship_type(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyRelationshipType);
    }
    Ok(trimmed.to_lowercase())
}

fn join_path(parts: &[&str]) -> String {
    parts.join(TREE_PATH_SEPARATOR)
}
