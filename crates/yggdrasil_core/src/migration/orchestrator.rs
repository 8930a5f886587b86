//! Batch migration driver.
//!
//! # Responsibility
//! - Enumerate legacy documents under a root, excluding canonical output
//!   and sources the store already holds.
//! - Drive classify → normalize → merge per file and collect a report.
//!
//! # Invariants
//! - A single file's failure never aborts the batch.
//! - Dry-run performs every step except writes and yields the same report
//!   shape as live mode.
//! - Files are processed one at a time in sorted path order.
//! - Only a missing or unreadable root (or a failing initial store scan)
//!   is fatal.

use crate::migration::classifier::{CanonicalPatterns, Classifier};
use crate::migration::normalizer::{
    leaf_placement, normalize, LegacyAnalysis, LegacyDocument, LegacyDocumentError,
};
use crate::model::leaf::CanonicalLeaf;
use crate::model::taxonomy::ValidationError;
use crate::repo::taxonomy_repo::{MergeOutcome, TaxonomyRepository};
use crate::service::taxonomy_service::{TaxonomyService, TaxonomyServiceError};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

const LEGACY_EXTENSION: &str = "json";
const LEAF_FILE_SUFFIX: &str = "_migrated_leaf.json";

/// Fatal batch errors. Per-file problems never surface here.
#[derive(Debug)]
pub enum MigrationError {
    RootNotFound(PathBuf),
    RootUnreadable { path: PathBuf, source: std::io::Error },
    /// Leaf output directory cannot be created.
    LeafOutput { path: PathBuf, source: std::io::Error },
    /// Initial store scan failed.
    Store(TaxonomyServiceError),
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RootNotFound(path) => write!(f, "root path `{}` does not exist", path.display()),
            Self::RootUnreadable { path, source } => {
                write!(f, "root path `{}` is unreadable: {source}", path.display())
            }
            Self::LeafOutput { path, source } => write!(
                f,
                "cannot prepare leaf output directory `{}`: {source}",
                path.display()
            ),
            Self::Store(err) => write!(f, "store scan failed: {err}"),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::RootNotFound(_) => None,
            Self::RootUnreadable { source, .. } => Some(source),
            Self::LeafOutput { source, .. } => Some(source),
            Self::Store(err) => Some(err),
        }
    }
}

/// Whether the batch writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MigrationMode {
    /// Analysis only; the store and filesystem are untouched.
    #[default]
    DryRun,
    Execute,
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub mode: MigrationMode,
    /// Descend into subdirectories of the root.
    pub recursive: bool,
    /// Live mode also writes each leaf here as `<stem>_migrated_leaf.json`,
    /// mirroring the source's subdirectory under the root.
    pub leaf_output_dir: Option<PathBuf>,
    /// Date stamped into leaf metadata.
    pub migration_date: NaiveDate,
}

impl MigrationOptions {
    pub fn new(mode: MigrationMode) -> Self {
        Self {
            mode,
            recursive: false,
            leaf_output_dir: None,
            migration_date: chrono::Local::now().date_naive(),
        }
    }

    pub fn dry_run(&self) -> bool {
        self.mode == MigrationMode::DryRun
    }
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self::new(MigrationMode::DryRun)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Success,
    Failed,
    /// Every resource already existed, or the write was rejected as a duplicate.
    Skipped,
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Outcome of one legacy file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    /// Path relative to the root.
    pub file: String,
    /// Absent when the document could not be decoded.
    pub suggested_tree: Option<String>,
    pub status: FileStatus,
    /// Resource stubs in the leaf.
    pub resources: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregated batch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub root: String,
    pub dry_run: bool,
    pub total_files: usize,
    pub successful_migrations: usize,
    pub failed_migrations: usize,
    pub skipped: usize,
    /// Files excluded because the store already records their source.
    pub already_migrated: Vec<String>,
    pub cancelled: bool,
    /// Suggested tree → decoded file count.
    pub tree_distribution: BTreeMap<String, usize>,
    pub files_processed: Vec<FileOutcome>,
}

impl MigrationReport {
    fn new(root: &Path, dry_run: bool) -> Self {
        Self {
            root: root.display().to_string(),
            dry_run,
            total_files: 0,
            successful_migrations: 0,
            failed_migrations: 0,
            skipped: 0,
            already_migrated: Vec::new(),
            cancelled: false,
            tree_distribution: BTreeMap::new(),
            files_processed: Vec::new(),
        }
    }

    fn record(&mut self, outcome: FileOutcome) {
        match outcome.status {
            FileStatus::Success => self.successful_migrations += 1,
            FileStatus::Failed => self.failed_migrations += 1,
            FileStatus::Skipped => self.skipped += 1,
        }
        if let Some(tree) = outcome.suggested_tree.as_ref() {
            *self.tree_distribution.entry(tree.clone()).or_insert(0) += 1;
        }
        self.files_processed.push(outcome);
    }

    /// Human-readable summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { "dry run" } else { "execute" };
        out.push_str(&format!("Migration of {} ({mode})\n", self.root));
        for outcome in &self.files_processed {
            let tree = outcome.suggested_tree.as_deref().unwrap_or("-");
            match outcome.message.as_deref() {
                Some(message) => out.push_str(&format!(
                    "  [{}] {} -> {tree}: {message}\n",
                    outcome.status, outcome.file
                )),
                None => out.push_str(&format!(
                    "  [{}] {} -> {tree} ({} resources)\n",
                    outcome.status, outcome.file, outcome.resources
                )),
            }
        }
        out.push_str(&format!("Total files processed: {}\n", self.total_files));
        out.push_str(&format!("Successful migrations: {}\n", self.successful_migrations));
        out.push_str(&format!("Failed migrations: {}\n", self.failed_migrations));
        out.push_str(&format!("Skipped: {}\n", self.skipped));
        if !self.already_migrated.is_empty() {
            out.push_str(&format!("Already migrated: {}\n", self.already_migrated.len()));
        }
        if self.cancelled {
            out.push_str("Run cancelled before all files were processed\n");
        }
        out.push_str("Tree distribution:\n");
        for (tree, count) in &self.tree_distribution {
            out.push_str(&format!("  {tree}: {count}\n"));
        }
        out
    }
}

struct Candidate {
    path: PathBuf,
    relative: String,
}

/// Runs migration batches against one store handle.
pub struct MigrationOrchestrator<'a, R: TaxonomyRepository> {
    service: &'a TaxonomyService<R>,
    classifier: Classifier,
    patterns: CanonicalPatterns,
    options: MigrationOptions,
}

impl<'a, R: TaxonomyRepository> MigrationOrchestrator<'a, R> {
    pub fn new(
        service: &'a TaxonomyService<R>,
        classifier: Classifier,
        patterns: CanonicalPatterns,
        options: MigrationOptions,
    ) -> Self {
        Self {
            service,
            classifier,
            patterns,
            options,
        }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Migrates every legacy document under `root`.
    pub fn run(&self, root: &Path) -> Result<MigrationReport, MigrationError> {
        self.run_with_cancel(root, &AtomicBool::new(false))
    }

    /// Like [`Self::run`], stopping before the next file once `cancel` is set.
    /// Leaves written before cancellation are kept.
    pub fn run_with_cancel(
        &self,
        root: &Path,
        cancel: &AtomicBool,
    ) -> Result<MigrationReport, MigrationError> {
        let dry_run = self.options.dry_run();
        info!(
            "event=migration_scan module=migration status=start dry_run={dry_run} recursive={}",
            self.options.recursive
        );

        check_root(root)?;
        let migrated = self
            .service
            .structure()
            .map_err(MigrationError::Store)?
            .migrated_sources();
        if !dry_run {
            self.prepare_leaf_output()?;
        }

        let mut report = MigrationReport::new(root, dry_run);
        let mut candidates = Vec::new();
        for candidate in self.enumerate(root)? {
            if migrated.contains(&candidate.relative) {
                report.already_migrated.push(candidate.relative);
            } else {
                candidates.push(candidate);
            }
        }
        report.total_files = candidates.len();
        info!(
            "event=migration_scan module=migration status=ok candidates={} already_migrated={}",
            report.total_files,
            report.already_migrated.len()
        );

        for candidate in &candidates {
            if cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                warn!(
                    "event=migration_cancel module=migration status=cancelled processed={}",
                    report.files_processed.len()
                );
                break;
            }
            let outcome = self.process(candidate);
            debug!(
                "event=migration_file module=migration status={} tree={}",
                outcome.status,
                outcome.suggested_tree.as_deref().unwrap_or("-")
            );
            report.record(outcome);
        }

        info!(
            "event=migration_report module=migration status=ok dry_run={} total={} success={} failed={} skipped={}",
            report.dry_run,
            report.total_files,
            report.successful_migrations,
            report.failed_migrations,
            report.skipped
        );
        Ok(report)
    }

    fn enumerate(&self, root: &Path) -> Result<Vec<Candidate>, MigrationError> {
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };
        let mut candidates = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(MigrationError::RootUnreadable {
                        path: root.to_path_buf(),
                        source: err.into(),
                    })
                }
                Err(err) => {
                    warn!("event=migration_scan module=migration status=skip_entry error={err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(LEGACY_EXTENSION));
            let file_name = entry.file_name().to_string_lossy();
            if !is_json || self.patterns.is_canonical(&file_name) {
                continue;
            }
            candidates.push(Candidate {
                path: path.to_path_buf(),
                relative: relative_source(root, path),
            });
        }
        candidates.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(candidates)
    }

    fn process(&self, candidate: &Candidate) -> FileOutcome {
        let analysis = match self.analyze(candidate) {
            Ok(analysis) => analysis,
            Err(err) => {
                return FileOutcome {
                    file: candidate.relative.clone(),
                    suggested_tree: None,
                    status: FileStatus::Failed,
                    resources: 0,
                    message: Some(err.to_string()),
                }
            }
        };

        let leaf = normalize(&analysis, self.options.migration_date);
        let placement = leaf_placement(&leaf, &analysis.suggested_tree);
        let merged = if self.options.dry_run() {
            self.service.probe_leaf(&placement)
        } else {
            self.service.merge_leaf(&placement)
        };

        let (status, message) = match merged {
            Ok(outcome) if outcome.is_duplicate_only() => (
                FileStatus::Skipped,
                Some(format!(
                    "all {} resources already exist",
                    outcome.duplicates.len()
                )),
            ),
            Ok(outcome) => match self.emit_leaf(&analysis, &leaf, &outcome) {
                Ok(()) => (FileStatus::Success, None),
                Err(message) => (FileStatus::Failed, Some(message)),
            },
            Err(TaxonomyServiceError::Validation(
                err @ (ValidationError::DuplicateTitle { .. }
                | ValidationError::SourceAlreadyMigrated { .. }),
            )) => (FileStatus::Skipped, Some(err.to_string())),
            Err(err) => (FileStatus::Failed, Some(err.to_string())),
        };

        FileOutcome {
            file: candidate.relative.clone(),
            suggested_tree: Some(analysis.suggested_tree.to_string()),
            status,
            resources: leaf.resources.len(),
            message,
        }
    }

    fn analyze(&self, candidate: &Candidate) -> Result<LegacyAnalysis, LegacyDocumentError> {
        let (document, body) = LegacyDocument::read(&candidate.path)?;
        let stem = candidate
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = candidate
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suggested_tree = self.classifier.classify(&stem, Some(&body));
        Ok(LegacyAnalysis {
            source_path: candidate.relative.clone(),
            file_name,
            stem,
            suggested_tree,
            document,
        })
    }

    fn prepare_leaf_output(&self) -> Result<(), MigrationError> {
        if let Some(dir) = self.options.leaf_output_dir.as_ref() {
            std::fs::create_dir_all(dir).map_err(|source| MigrationError::LeafOutput {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn emit_leaf(
        &self,
        analysis: &LegacyAnalysis,
        leaf: &CanonicalLeaf,
        outcome: &MergeOutcome,
    ) -> Result<(), String> {
        let Some(dir) = self.options.leaf_output_dir.as_ref() else {
            return Ok(());
        };
        if self.options.dry_run() {
            return Ok(());
        }
        let mut path = dir.to_path_buf();
        if let Some((subdir, _)) = analysis.source_path.rsplit_once('/') {
            path.extend(subdir.split('/'));
            std::fs::create_dir_all(&path)
                .map_err(|err| format!("cannot create `{}`: {err}", path.display()))?;
        }
        path.push(format!("{}{LEAF_FILE_SUFFIX}", analysis.stem));
        let json = serde_json::to_string_pretty(leaf)
            .map_err(|err| format!("cannot encode leaf: {err}"))?;
        std::fs::write(&path, json).map_err(|err| {
            format!(
                "leaf stored ({} resources) but `{}` could not be written: {err}",
                outcome.created.len(),
                path.display()
            )
        })
    }
}

fn check_root(root: &Path) -> Result<(), MigrationError> {
    if !root.exists() {
        return Err(MigrationError::RootNotFound(root.to_path_buf()));
    }
    std::fs::read_dir(root)
        .map(|_| ())
        .map_err(|source| MigrationError::RootUnreadable {
            path: root.to_path_buf(),
            source,
        })
}

fn relative_source(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
