//! Structure scanner.
//!
//! # Responsibility
//! - Walk the whole store read-only and produce a nested summary.
//! - Serve as the "already migrated" index for the migration batch.
//!
//! # Invariants
//! - Trees, branches, limbs and resource titles are sorted
//!   lexicographically (byte order), independent of SQL collation.
//! - The scan performs no writes.

use crate::repo::taxonomy_repo::{RepoResult, TaxonomyRepository};
use serde::Serialize;
use std::collections::BTreeSet;

/// Nested summary of the canonical store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructureSummary {
    pub trees: Vec<TreeSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    pub name: String,
    pub branches: Vec<BranchSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchSummary {
    pub name: String,
    pub limbs: Vec<LimbSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimbSummary {
    pub name: String,
    /// Legacy document the limb was migrated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Resource titles.
    pub resources: Vec<String>,
}

/// Node totals per level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StructureCounts {
    pub trees: usize,
    pub branches: usize,
    pub limbs: usize,
    pub resources: usize,
}

impl StructureSummary {
    pub fn counts(&self) -> StructureCounts {
        let mut counts = StructureCounts {
            trees: self.trees.len(),
            ..StructureCounts::default()
        };
        for branch in self.trees.iter().flat_map(|tree| &tree.branches) {
            counts.branches += 1;
            counts.limbs += branch.limbs.len();
            counts.resources += branch.limbs.iter().map(|limb| limb.resources.len()).sum::<usize>();
        }
        counts
    }

    /// Legacy sources already recorded in the store.
    pub fn migrated_sources(&self) -> BTreeSet<String> {
        self.limbs()
            .filter_map(|limb| limb.source_path.clone())
            .collect()
    }

    pub fn tree(&self, name: &str) -> Option<&TreeSummary> {
        self.trees.iter().find(|tree| tree.name == name)
    }

    fn limbs(&self) -> impl Iterator<Item = &LimbSummary> {
        self.trees
            .iter()
            .flat_map(|tree| &tree.branches)
            .flat_map(|branch| &branch.limbs)
    }

    /// Indented plain-text rendering, one node per line.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for tree in &self.trees {
            out.push_str(&format!("{}\n", tree.name));
            for branch in &tree.branches {
                out.push_str(&format!("  {}\n", branch.name));
                for limb in &branch.limbs {
                    match limb.source_path.as_deref() {
                        Some(source) => out.push_str(&format!("    {} ({source})\n", limb.name)),
                        None => out.push_str(&format!("    {}\n", limb.name)),
                    }
                    for title in &limb.resources {
                        out.push_str(&format!("      - {title}\n"));
                    }
                }
            }
        }
        let counts = self.counts();
        out.push_str(&format!(
            "{} trees, {} branches, {} limbs, {} resources\n",
            counts.trees, counts.branches, counts.limbs, counts.resources
        ));
        out
    }
}

/// Scans every level of the store into a sorted summary.
pub fn scan_structure<R: TaxonomyRepository + ?Sized>(repo: &R) -> RepoResult<StructureSummary> {
    let mut trees = Vec::new();
    for tree in repo.list_trees()? {
        let mut branches = Vec::new();
        for branch in repo.list_branches(tree.id)? {
            let mut limbs = Vec::new();
            for limb in repo.list_limbs(branch.id)? {
                let mut resources: Vec<String> = repo
                    .list_resources(limb.id)?
                    .into_iter()
                    .map(|resource| resource.title)
                    .collect();
                resources.sort();
                limbs.push(LimbSummary {
                    name: limb.name,
                    source_path: limb.source_path,
                    resources,
                });
            }
            limbs.sort_by(|a, b| a.name.cmp(&b.name));
            branches.push(BranchSummary {
                name: branch.name,
                limbs,
            });
        }
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        trees.push(TreeSummary {
            name: tree.name,
            branches,
        });
    }
    trees.sort_by(|a, b| a.name.cmp(&b.name));

    let summary = StructureSummary { trees };
    let counts = summary.counts();
    log::debug!(
        "event=structure_scan module=service status=ok trees={} branches={} limbs={} resources={}",
        counts.trees,
        counts.branches,
        counts.limbs,
        counts.resources
    );
    Ok(summary)
}
