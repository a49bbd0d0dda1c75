//! Pre-processing pass for catalog function calls in SQL text.
//!
//! Recognized calls: the function name (any case), `(`, optional whitespace,
//! at most one single-quoted literal (`''` escapes a quote), optional
//! whitespace, `)`. Calls inside string literals, quoted identifiers and
//! comments are ignored. Anything else passes through untouched.
//!
//! - `openhexa_dataset_files(['workspace'])` is replaced by a temporary table
//!   holding the catalog listing.
//! - `get_dataset_file_url(...)` stays in the text and runs as a scalar
//!   function; a literal path is only checked for shape here so a malformed
//!   one fails before the query runs.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::{Arc, LazyLock};

use ohduck_client::{CatalogService, DatasetFilePath};
use ohduck_core::duck::{FILE_URL_FUNCTION, FileListingRow};
use ohduck_core::{BrokeredConnection, Error};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Table-valued catalog function.
pub const DATASET_FILES_FUNCTION: &str = "openhexa_dataset_files";

/// Prefix of temporary relations holding dataset listings.
pub const LISTING_RELATION_PREFIX: &str = "__ohduck_files_";

static CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({DATASET_FILES_FUNCTION}|{FILE_URL_FUNCTION})\(\s*(?:'((?:[^']|'')*)')?\s*\)"
    ))
    .unwrap_or_else(|e| unreachable!("call pattern is a constant: {e}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    DatasetFiles,
    FileUrl,
}

/// One recognized call in the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCall {
    pub kind: CallKind,
    /// Unescaped literal argument.
    pub argument: Option<String>,
    /// Byte range of the whole call in the original text.
    pub start: usize,
    pub end: usize,
}

/// Byte ranges of string literals, quoted identifiers and comments in `sql`.
/// Unterminated ones run to the end of the text.
fn opaque_spans(sql: &str) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..].iter().position(|&b| b == b'\n').map_or(bytes.len(), |n| i + n + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
            }
            _ => {
                i += 1;
                continue;
            }
        }
        spans.push(start..i);
    }
    spans
}

/// Find every recognized catalog call in `sql`, in order.
pub fn scan(sql: &str) -> Vec<CatalogCall> {
    let spans = opaque_spans(sql);
    let mut calls = Vec::new();
    let mut pos = 0;
    while let Some(caps) = CALL_PATTERN.captures_at(sql, pos) {
        let Some(whole) = caps.get(0) else { break };
        if spans.iter().any(|span| span.contains(&whole.start())) {
            // Function names are ASCII, so the next byte is a char boundary.
            pos = whole.start() + 1;
            continue;
        }
        pos = whole.end();

        let kind = match caps.get(1) {
            Some(name) if name.as_str().eq_ignore_ascii_case(DATASET_FILES_FUNCTION) => CallKind::DatasetFiles,
            _ => CallKind::FileUrl,
        };
        let argument = caps.get(2).map(|m| m.as_str().replace("''", "'"));
        calls.push(CatalogCall { kind, argument, start: whole.start(), end: whole.end() });
    }
    calls
}

/// Temporary relation name for a listing of `workspace` (all workspaces when `None`).
pub fn listing_relation(workspace: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    match workspace {
        Some(ws) => {
            hasher.update(b"ws:");
            hasher.update(ws.as_bytes());
        }
        None => hasher.update(b"*"),
    }
    let digest = hex::encode(hasher.finalize());
    format!("{LISTING_RELATION_PREFIX}{}", &digest[..16])
}

/// Outcome of preparing one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    pub sql: String,
    /// Temporary relations created for this query.
    pub relations: Vec<String>,
}

/// Rewrites catalog listing calls against the catalog.
#[derive(Clone)]
pub struct Rewriter {
    catalog: Arc<dyn CatalogService>,
}

impl Rewriter {
    pub fn new(catalog: Arc<dyn CatalogService>) -> Self {
        Self { catalog }
    }

    /// Materialize what `sql` needs on `conn` and return the text to execute.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` when a literal file path is malformed. Catalog
    /// listing failures are logged and produce an empty relation.
    pub async fn prepare(&self, conn: &BrokeredConnection, sql: &str) -> Result<PreparedQuery, Error> {
        let calls = scan(sql);
        if calls.is_empty() {
            return Ok(PreparedQuery { sql: sql.to_string(), relations: Vec::new() });
        }

        for path in calls.iter().filter(|c| c.kind == CallKind::FileUrl).filter_map(|c| c.argument.as_deref()) {
            DatasetFilePath::parse(path)?;
        }

        let workspaces: BTreeSet<Option<String>> =
            calls.iter().filter(|c| c.kind == CallKind::DatasetFiles).map(|c| c.argument.clone()).collect();
        let mut relations = Vec::with_capacity(workspaces.len());
        for workspace in workspaces {
            let relation = listing_relation(workspace.as_deref());
            let rows = self.listing_rows(workspace.as_deref()).await;
            conn.materialize_file_listing(&relation, rows).await?;
            relations.push(relation);
        }

        let mut rewritten = String::with_capacity(sql.len());
        let mut cursor = 0;
        for call in calls.iter().filter(|c| c.kind == CallKind::DatasetFiles) {
            rewritten.push_str(&sql[cursor..call.start]);
            rewritten.push_str(&listing_relation(call.argument.as_deref()));
            cursor = call.end;
        }
        rewritten.push_str(&sql[cursor..]);

        tracing::debug!(relations = relations.len(), "rewrote catalog calls");
        Ok(PreparedQuery { sql: rewritten, relations })
    }

    async fn listing_rows(&self, workspace: Option<&str>) -> Vec<FileListingRow> {
        match self.catalog.dataset_files(workspace).await {
            Ok(records) => records.into_iter().map(FileListingRow::from).collect(),
            Err(e) => {
                tracing::warn!(workspace = workspace.unwrap_or("*"), error = %e, "dataset listing failed, using empty result");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for Rewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rewriter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCatalog, memory_connection};

    fn rewriter(catalog: Arc<FakeCatalog>) -> Rewriter {
        Rewriter::new(catalog)
    }

    #[test]
    fn test_scan_recognizes_calls() {
        let calls = scan("SELECT * FROM OpenHexa_Dataset_Files() JOIN openhexa_dataset_files( 'it''s' ) USING (x)");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].kind, CallKind::DatasetFiles);
        assert_eq!(calls[0].argument, None);
        assert_eq!(calls[1].argument.as_deref(), Some("it's"));

        let calls = scan("SELECT get_dataset_file_url('ws/ds/v1/a.csv')");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::FileUrl);
        assert_eq!(calls[0].argument.as_deref(), Some("ws/ds/v1/a.csv"));
    }

    #[test]
    fn test_scan_passes_through_other_forms() {
        for sql in [
            "SELECT get_dataset_file_url(path) FROM t",
            "SELECT * FROM openhexa_dataset_files('a', 'b')",
            "SELECT * FROM openhexa_dataset_files(\"ws\")",
            "SELECT * FROM my_openhexa_dataset_files()",
            "SELECT * FROM openhexa_dataset_files ()",
        ] {
            assert!(scan(sql).is_empty(), "{sql}");
        }
    }

    #[test]
    fn test_scan_ignores_quoted_text_and_comments() {
        let sql = "SELECT 'openhexa_dataset_files()' AS s, \"get_dataset_file_url('a/b/c/d')\" AS q -- openhexa_dataset_files()\n\
                   FROM openhexa_dataset_files('ws') /* get_dataset_file_url('x') */ WHERE note = 'it''s openhexa_dataset_files()'";
        let calls = scan(sql);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::DatasetFiles);
        assert_eq!(calls[0].argument.as_deref(), Some("ws"));

        assert!(scan("SELECT 1 -- openhexa_dataset_files()").is_empty());
        assert!(scan("SELECT '/* openhexa_dataset_files() */'").is_empty());
        assert!(scan("SELECT 1 /* unterminated openhexa_dataset_files()").is_empty());
    }

    #[test]
    fn test_scan_finds_call_after_quoted_name() {
        let calls = scan("SELECT 'get_dataset_file_url(', openhexa_dataset_files() AS t");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::DatasetFiles);
    }

    #[test]
    fn test_listing_relation_is_stable_identifier() {
        let a = listing_relation(Some("malaria"));
        assert_eq!(a, listing_relation(Some("malaria")));
        assert_ne!(a, listing_relation(None));
        assert_ne!(a, listing_relation(Some("supply")));
        assert!(a.starts_with(LISTING_RELATION_PREFIX));
        assert!(ohduck_core::duck::is_identifier(&a));
    }

    #[tokio::test]
    async fn test_prepare_without_calls_is_identity() {
        let catalog = FakeCatalog::new();
        let conn = memory_connection(&catalog).await;
        let prepared = rewriter(catalog.clone()).prepare(&conn, "SELECT 1").await.unwrap();
        assert_eq!(prepared.sql, "SELECT 1");
        assert_eq!(catalog.listing_calls(), 0);
    }

    #[tokio::test]
    async fn test_prepare_leaves_string_literals_alone() {
        let catalog = FakeCatalog::new();
        let conn = memory_connection(&catalog).await;
        let sql = "SELECT 'call openhexa_dataset_files() for a listing' AS hint";

        let prepared = rewriter(catalog.clone()).prepare(&conn, sql).await.unwrap();
        assert_eq!(prepared.sql, sql);
        assert!(prepared.relations.is_empty());
        assert_eq!(catalog.listing_calls(), 0);

        let result = conn.query(&prepared.sql, 10).await.unwrap();
        assert_eq!(result.rows, vec![vec![serde_json::json!("call openhexa_dataset_files() for a listing")]]);
    }

    #[tokio::test]
    async fn test_prepare_materializes_listing() {
        let catalog = FakeCatalog::new().with_file("malaria/cases/v1/a.csv", "https://signed/a");
        let conn = memory_connection(&catalog).await;
        let rewriter = rewriter(catalog.clone());

        let prepared = rewriter
            .prepare(&conn, "SELECT file_path FROM openhexa_dataset_files('malaria') ORDER BY 1")
            .await
            .unwrap();
        assert_eq!(prepared.sql, format!("SELECT file_path FROM {} ORDER BY 1", listing_relation(Some("malaria"))));
        assert_eq!(prepared.relations.len(), 1);

        let result = conn.query(&prepared.sql, 10).await.unwrap();
        assert_eq!(result.rows, vec![vec![serde_json::json!("malaria/cases/v1/a.csv")]]);
    }

    #[tokio::test]
    async fn test_listing_failure_yields_empty_relation() {
        let catalog = FakeCatalog::new().failing_listing();
        let conn = memory_connection(&catalog).await;
        let prepared = rewriter(catalog).prepare(&conn, "SELECT count(*) AS n FROM openhexa_dataset_files()").await.unwrap();
        let result = conn.query(&prepared.sql, 10).await.unwrap();
        assert_eq!(result.rows, vec![vec![serde_json::json!(0)]]);
    }

    #[tokio::test]
    async fn test_url_calls_resolve_at_query_time() {
        let catalog = FakeCatalog::new().with_file("ws/ds/v1/a.csv", "https://signed/a");
        let conn = memory_connection(&catalog).await;

        let sql = "SELECT get_dataset_file_url('ws/ds/v1/a.csv') AS a, get_dataset_file_url('ws/ds/v1/none.csv') AS b";
        let prepared = rewriter(catalog.clone()).prepare(&conn, sql).await.unwrap();
        assert_eq!(prepared.sql, sql);
        assert_eq!(catalog.url_calls(), 0);

        let result = conn.query(&prepared.sql, 10).await.unwrap();
        assert_eq!(result.rows, vec![vec![serde_json::json!("https://signed/a"), serde_json::Value::Null]]);
        assert_eq!(catalog.url_calls(), 2);
    }

    #[tokio::test]
    async fn test_url_of_listed_column() {
        let catalog = FakeCatalog::new()
            .with_file("ws/ds/v1/a.csv", "https://signed/a")
            .with_file("ws/ds/v1/b.csv", "https://signed/b");
        let conn = memory_connection(&catalog).await;

        let sql = "SELECT file_path, get_dataset_file_url(file_path) AS url FROM openhexa_dataset_files('ws') ORDER BY 1";
        let prepared = rewriter(catalog.clone()).prepare(&conn, sql).await.unwrap();
        let result = conn.query(&prepared.sql, 10).await.unwrap();
        assert_eq!(
            result.rows,
            vec![
                vec![serde_json::json!("ws/ds/v1/a.csv"), serde_json::json!("https://signed/a")],
                vec![serde_json::json!("ws/ds/v1/b.csv"), serde_json::json!("https://signed/b")],
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_literal_path_fails() {
        let catalog = FakeCatalog::new();
        let conn = memory_connection(&catalog).await;
        let err = rewriter(catalog.clone()).prepare(&conn, "SELECT get_dataset_file_url('only/two')").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(catalog.url_calls(), 0);
    }
}
