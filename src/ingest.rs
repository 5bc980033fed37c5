//! Bulk key import.
//!
//! Keys arrive as newline-separated text. Each chunk is inserted in one
//! transaction; if the chunk fails (typically a duplicate key) it is rolled
//! back and replayed row by row so one bad key never sinks the batch.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::error::{AppError, Result, is_unique_violation};

pub const CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Non-blank lines received
    pub submitted: usize,
    pub inserted: usize,
    pub failed: usize,
    pub skipped_blank: usize,
    pub failures: Vec<RowFailure>,
}

/// Split raw text into keys: one per line, trimmed, trailing dashes dropped.
/// Returns the keys and the number of blank lines skipped.
pub fn parse_keys(raw: &str) -> (Vec<String>, usize) {
    let mut keys = Vec::new();
    let mut blank = 0;
    for line in raw.lines() {
        let key = line.trim().trim_end_matches('-').trim_end();
        if key.is_empty() {
            blank += 1;
        } else {
            keys.push(key.to_string());
        }
    }
    (keys, blank)
}

/// Import `raw` keys into the pool for `fsn`. The product must exist.
pub fn import_keys(conn: &mut Connection, fsn: &str, raw: &str) -> Result<IngestReport> {
    if queries::get_product(conn, fsn)?.is_none() {
        return Err(AppError::NotFound(format!("Product {} not found", fsn)));
    }

    let (keys, skipped_blank) = parse_keys(raw);
    let mut report = IngestReport {
        submitted: keys.len(),
        skipped_blank,
        ..Default::default()
    };

    for chunk in keys.chunks(CHUNK_SIZE) {
        match insert_chunk(conn, fsn, chunk) {
            Ok(()) => report.inserted += chunk.len(),
            Err(e) if is_row_error(&e) => {
                tracing::info!(
                    fsn = %fsn,
                    chunk_len = chunk.len(),
                    error = %e,
                    "Chunk insert failed, retrying row by row"
                );
                insert_rows(conn, fsn, chunk, &mut report)?;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        fsn = %fsn,
        submitted = report.submitted,
        inserted = report.inserted,
        failed = report.failed,
        "Imported license keys"
    );
    Ok(report)
}

fn insert_chunk(conn: &mut Connection, fsn: &str, chunk: &[String]) -> Result<()> {
    let tx = conn.transaction()?;
    for key in chunk {
        queries::insert_license_key(&tx, fsn, key)?;
    }
    tx.commit()?;
    Ok(())
}

fn insert_rows(
    conn: &Connection,
    fsn: &str,
    chunk: &[String],
    report: &mut IngestReport,
) -> Result<()> {
    for key in chunk {
        match queries::insert_license_key(conn, fsn, key) {
            Ok(_) => report.inserted += 1,
            Err(e) if is_row_error(&e) => {
                report.failed += 1;
                report.failures.push(RowFailure {
                    key: key.clone(),
                    reason: row_failure_reason(&e),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Errors that belong to a specific row rather than the connection.
fn is_row_error(err: &AppError) -> bool {
    matches!(err, AppError::Database(rusqlite::Error::SqliteFailure(e, _))
        if e.code == rusqlite::ErrorCode::ConstraintViolation)
}

fn row_failure_reason(err: &AppError) -> String {
    match err {
        AppError::Database(e) if is_unique_violation(e) => "duplicate key".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys_cleans_lines() {
        let (keys, blank) = parse_keys("  AAAA-BBBB-\n\nCCCC-DDDD\r\n   \nEEEE--\n");
        assert_eq!(keys, vec!["AAAA-BBBB", "CCCC-DDDD", "EEEE"]);
        assert_eq!(blank, 2);
    }

    #[test]
    fn test_parse_keys_empty_input() {
        let (keys, blank) = parse_keys("");
        assert!(keys.is_empty());
        assert_eq!(blank, 0);
    }
}
