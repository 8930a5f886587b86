//! SQLite FTS5-based search implementation.
//!
//! # Responsibility
//! - Provide keyword search over resource title, description, content and
//!   key concepts.
//! - Return typed hits with stable IDs and display paths.
//!
//! # Invariants
//! - Index rows are maintained by triggers, including cascade deletes.
//! - Result ordering is deterministic by rank, then title, then id.

use crate::db::DbError;
use crate::model::taxonomy::ResourceId;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type for search APIs.
pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for query parsing, DB interaction and result decoding.
#[derive(Debug)]
pub enum SearchError {
    /// User-provided query cannot be parsed by FTS5 syntax.
    InvalidQuery {
        query: String,
        message: String,
    },
    Db(DbError),
    InvalidData(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery { query, message } => {
                write!(f, "invalid full-text query `{query}`: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid search row: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidQuery { .. } => None,
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for SearchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Search options for full-text query behavior.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// User query text.
    pub text: String,
    /// Restrict hits to resources under this tree name.
    pub tree: Option<String>,
    /// Maximum number of hits to return.
    pub limit: u32,
    /// Whether to pass text directly as raw FTS5 expression.
    pub raw_fts_syntax: bool,
}

impl SearchQuery {
    /// Creates a query with default limit and no tree filter.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tree: None,
            limit: 20,
            raw_fts_syntax: false,
        }
    }

    pub fn with_tree(mut self, tree: impl Into<String>) -> Self {
        self.tree = Some(tree.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// Single search hit returned by [`search_resources`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SearchHit {
    pub resource_id: ResourceId,
    pub title: String,
    pub tree_path: String,
    pub snippet: String,
}

/// Searches resources via FTS5 and returns ranked results.
///
/// Returns an empty list for blank queries and zero limits.
pub fn search_resources(conn: &Connection, query: &SearchQuery) -> SearchResult<Vec<SearchHit>> {
    let Some(match_expr) = build_match_expression(query)? else {
        return Ok(Vec::new());
    };

    if query.limit == 0 {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT
            r.resource_uuid AS resource_uuid,
            r.title AS title,
            r.tree_path AS tree_path,
            snippet(resources_fts, -1, '[', ']', ' ... ', 10) AS snippet
         FROM resources_fts
         JOIN resources r ON r.resource_uuid = resources_fts.resource_uuid
         JOIN limbs l ON l.limb_uuid = r.limb_uuid
         JOIN branches b ON b.branch_uuid = l.branch_uuid
         JOIN trees t ON t.tree_uuid = b.tree_uuid
         WHERE resources_fts MATCH ?",
    );
    let mut bind_values: Vec<Value> = vec![Value::Text(match_expr.clone())];

    if let Some(tree) = query.tree.as_deref() {
        sql.push_str(" AND t.name = ?");
        bind_values.push(Value::Text(tree.to_string()));
    }

    sql.push_str(" ORDER BY bm25(resources_fts), r.title ASC, r.resource_uuid ASC LIMIT ?");
    bind_values.push(Value::Integer(i64::from(query.limit)));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query(params_from_iter(bind_values))
        .map_err(|err| map_query_error(err, &match_expr))?;
    let mut hits = Vec::new();

    while let Some(row) = rows
        .next()
        .map_err(|err| map_query_error(err, &match_expr))?
    {
        hits.push(parse_search_hit(row)?);
    }

    log::debug!(
        "event=search_resources module=search status=ok hits={} tree_filter={}",
        hits.len(),
        query.tree.is_some()
    );
    Ok(hits)
}

fn parse_search_hit(row: &Row<'_>) -> SearchResult<SearchHit> {
    let uuid_text: String = row.get("resource_uuid")?;
    let resource_id = Uuid::parse_str(&uuid_text)
        .map(ResourceId::from_uuid)
        .map_err(|_| SearchError::InvalidData(format!("invalid uuid `{uuid_text}`")))?;

    Ok(SearchHit {
        resource_id,
        title: row.get("title")?,
        tree_path: row.get("tree_path")?,
        snippet: row.get("snippet")?,
    })
}

fn build_match_expression(query: &SearchQuery) -> SearchResult<Option<String>> {
    let text = query.text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    if query.raw_fts_syntax {
        return Ok(Some(text.to_string()));
    }

    let terms = text
        .split_whitespace()
        .filter(|term| !term.is_empty())
        .map(escape_fts_term)
        .collect::<Vec<_>>();

    if terms.is_empty() {
        return Ok(None);
    }

    Ok(Some(terms.join(" AND ")))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn map_query_error(err: rusqlite::Error, query: &str) -> SearchError {
    if is_match_syntax_error(&err) {
        return SearchError::InvalidQuery {
            query: query.to_string(),
            message: err.to_string(),
        };
    }

    SearchError::Db(DbError::Sqlite(err))
}

fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
        }
        _ => false,
    }
}
