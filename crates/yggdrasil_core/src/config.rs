//! Migration configuration.
//!
//! # Responsibility
//! - Merge built-in defaults with an optional JSON config file.
//! - Build the classifier and exclusion set a batch runs with.
//!
//! # Invariants
//! - Unknown config keys are rejected.
//! - Invalid keyword rules or patterns fail before any file is touched.
//!
//! Environment (`YGGDRASIL_CONFIG`, `YGGDRASIL_DB`, `YGGDRASIL_LOG`,
//! `YGGDRASIL_LOG_DIR`) and CLI layers sit above this one and override
//! individual fields after [`YggdrasilConfig::load`].

use crate::migration::classifier::{
    CanonicalPatterns, Classifier, ClassifierError, KeywordRule, KeywordTable, DEFAULT_EXCLUDE_PATTERNS,
};
use crate::migration::orchestrator::{MigrationMode, MigrationOptions};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: Option<PathBuf>, source: serde_json::Error },
    Invalid(ClassifierError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                source,
            } => write!(f, "invalid config `{}`: {source}", path.display()),
            Self::Parse { path: None, source } => write!(f, "invalid config: {source}"),
            Self::Invalid(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(err) => Some(err),
        }
    }
}

impl From<ClassifierError> for ConfigError {
    fn from(value: ClassifierError) -> Self {
        Self::Invalid(value)
    }
}

/// On-disk shape; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    keywords: Option<Vec<KeywordRule>>,
    exclude_patterns: Option<Vec<String>>,
    recursive: Option<bool>,
    match_body: Option<bool>,
    leaf_output_dir: Option<PathBuf>,
}

/// Effective migration settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YggdrasilConfig {
    /// Ordered `keyword -> tree` rules.
    pub keywords: Vec<KeywordRule>,
    /// File-name regexes of canonical output files.
    pub exclude_patterns: Vec<String>,
    pub recursive: bool,
    pub match_body: bool,
    pub leaf_output_dir: Option<PathBuf>,
}

impl Default for YggdrasilConfig {
    fn default() -> Self {
        Self {
            keywords: KeywordTable::default().rules().to_vec(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
            recursive: false,
            match_body: false,
            leaf_output_dir: None,
        }
    }
}

impl YggdrasilConfig {
    /// Defaults, overlaid with `path` when given, then validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        let config = Self::default().overlay(file);
        config.validate()?;
        log::info!(
            "event=config_load module=config status=ok keywords={} exclude_patterns={}",
            config.keywords.len(),
            config.exclude_patterns.len()
        );
        Ok(config)
    }

    /// Parses config JSON text over the defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(text)
            .map_err(|source| ConfigError::Parse { path: None, source })?;
        let config = Self::default().overlay(file);
        config.validate()?;
        Ok(config)
    }

    fn overlay(mut self, file: ConfigFile) -> Self {
        if let Some(keywords) = file.keywords {
            self.keywords = keywords;
        }
        if let Some(patterns) = file.exclude_patterns {
            self.exclude_patterns = patterns;
        }
        if let Some(recursive) = file.recursive {
            self.recursive = recursive;
        }
        if let Some(match_body) = file.match_body {
            self.match_body = match_body;
        }
        if file.leaf_output_dir.is_some() {
            self.leaf_output_dir = file.leaf_output_dir;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.classifier()?;
        self.canonical_patterns()?;
        Ok(())
    }

    pub fn classifier(&self) -> Result<Classifier, ConfigError> {
        let table = KeywordTable::new(self.keywords.clone())?;
        Ok(Classifier::new(table).with_body_fallback(self.match_body))
    }

    pub fn canonical_patterns(&self) -> Result<CanonicalPatterns, ConfigError> {
        Ok(CanonicalPatterns::new(self.exclude_patterns.as_slice())?)
    }

    /// Batch options for `mode`, dated today.
    pub fn migration_options(&self, mode: MigrationMode) -> MigrationOptions {
        MigrationOptions {
            recursive: self.recursive,
            leaf_output_dir: self.leaf_output_dir.clone(),
            ..MigrationOptions::new(mode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, YggdrasilConfig};
    use crate::migration::classifier::{ClassifierError, TreeSuggestion};
    use crate::migration::orchestrator::MigrationMode;
    use std::io::Write;

    #[test]
    fn defaults_use_built_in_table() {
        let config = YggdrasilConfig::load(None).unwrap();
        assert_eq!(config.keywords.len(), 14);
        assert_eq!(config.keywords[0].keyword, "philosophy");
        assert_eq!(config.exclude_patterns.len(), 3);
        assert!(!config.recursive);
    }

    #[test]
    fn file_overrides_only_given_keys() {
        let config = YggdrasilConfig::from_json_str(
            r#"{"keywords": [{"keyword": "Stoic", "tree": "philosophy_tree"}], "recursive": true}"#,
        )
        .unwrap();
        assert_eq!(config.keywords.len(), 1);
        assert!(config.recursive);
        assert_eq!(config.exclude_patterns.len(), 3);

        let classifier = config.classifier().unwrap();
        assert_eq!(
            classifier.classify("late_stoics", None),
            TreeSuggestion::Known("philosophy_tree".to_string())
        );
        assert!(classifier.classify("quantum", None).is_unknown());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = YggdrasilConfig::from_json_str(r#"{"recurse": true}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_rules_fail_fast() {
        let err =
            YggdrasilConfig::from_json_str(r#"{"exclude_patterns": ["(bad"]}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(ClassifierError::InvalidPattern { .. })
        ));

        let err = YggdrasilConfig::from_json_str(r#"{"keywords": [{"keyword": "", "tree": "x"}]}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(ClassifierError::EmptyKeyword { index: 0 })
        ));
    }

    #[test]
    fn load_reads_file_and_builds_options() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"leaf_output_dir": "/tmp/leaves", "match_body": true}}"#).unwrap();

        let config = YggdrasilConfig::load(Some(file.path())).unwrap();
        assert!(config.match_body);
        let options = config.migration_options(MigrationMode::Execute);
        assert!(!options.dry_run());
        assert_eq!(
            options.leaf_output_dir.as_deref(),
            Some(std::path::Path::new("/tmp/leaves"))
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = YggdrasilConfig::load(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
