// scrubline/src/store.rs
//! SQLite persistence gateway.
//!
//! One SQLite transaction per source unit. Beginning a unit deletes the
//! source's previous rows inside the transaction, so a commit replaces them
//! and a rollback keeps them. Audit rows go through `INSERT OR IGNORE`
//! against a unique index and are never deleted.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{Connection, OptionalExtension, Row, Statement, params};
use std::path::{Path, PathBuf};

use scrubline_core::{OwnerScope, PersistenceGateway, RecordRow, RedactionApplication, RowKind};

pub struct SqliteGateway {
    conn: Connection,
    open: Option<String>,
}

/// `<data dir>/scrubline/scrubline.db`.
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Could not determine the user data directory; pass --db")?;
    Ok(data_dir.join("scrubline").join("scrubline.db"))
}

impl SqliteGateway {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(include_str!("schema.sql"))
            .context("Failed to apply database schema")?;
        Ok(Self { conn, open: None })
    }

    /// Inserts a manual redaction outside of any ingest unit. Returns `false`
    /// when an identical entry exists.
    pub fn record_manual(&mut self, application: &RedactionApplication) -> Result<bool> {
        if self.open.is_some() {
            bail!("cannot record a manual redaction while a unit is open");
        }
        self.insert_application(application)
    }

    /// Audit rows in insertion order, optionally for one source.
    pub fn applications(&self, source_id: Option<&str>) -> Result<Vec<RedactionApplication>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, prompt_index, field_path, rule_id, rule_fingerprint, reason, actor, applied_at
             FROM redactions WHERE (?1 IS NULL OR source_id = ?1) ORDER BY id",
        )?;
        let rows = stmt.query_map(params![source_id], application_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read redactions")
    }

    pub fn record_count(&self, source_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// The committed rows of `source_id` in source order.
    pub fn stored_rows(&self, source_id: &str) -> Result<Vec<RecordRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT position, prompt_index, kind, record_type, payload_type, timestamp, fields, payload, metadata
             FROM records WHERE source_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![source_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<u32>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                [row.get::<_, String>(6)?, row.get::<_, String>(7)?, row.get::<_, String>(8)?],
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (position, prompt_index, kind, record_type, payload_type, timestamp, [fields, payload, metadata]) = row?;
            let position = position as usize;
            let corrupt = |column: &str| format!("Corrupt {} column for {} #{}", column, source_id, position);
            let kind = RowKind::parse(&kind).with_context(|| corrupt("kind"))?;
            records.push(RecordRow {
                source_id: source_id.to_string(),
                position,
                prompt_index,
                kind,
                record_type,
                payload_type,
                timestamp,
                fields: serde_json::from_str(&fields).with_context(|| corrupt("fields"))?,
                payload: serde_json::from_str(&payload).with_context(|| corrupt("payload"))?,
                metadata: serde_json::from_str(&metadata).with_context(|| corrupt("metadata"))?,
            });
        }
        Ok(records)
    }

    /// Inserts audit rows produced outside an ingest unit in one transaction.
    /// Returns how many were new.
    pub fn record_applications(&mut self, applications: &[RedactionApplication]) -> Result<usize> {
        if self.open.is_some() {
            bail!("cannot record redactions while a unit is open");
        }
        let tx = self.conn.transaction().context("Failed to begin transaction")?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(INSERT_APPLICATION)?;
            for application in applications {
                inserted += execute_insert_application(&mut stmt, application)?;
            }
        }
        tx.commit().context("Failed to commit redactions")?;
        debug!("Recorded {} of {} redaction(s)", inserted, applications.len());
        Ok(inserted)
    }

    /// When `source_id` was last committed.
    pub fn ingested_at(&self, source_id: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT ingested_at FROM sources WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn insert_application(&self, application: &RedactionApplication) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(INSERT_APPLICATION)?;
        Ok(execute_insert_application(&mut stmt, application)? == 1)
    }
}

const INSERT_APPLICATION: &str = "INSERT OR IGNORE INTO redactions
     (source_id, prompt_index, field_path, rule_id, rule_fingerprint, reason, actor, applied_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

fn execute_insert_application(stmt: &mut Statement<'_>, application: &RedactionApplication) -> Result<usize> {
    stmt.execute(params![
        application.scope.source_id,
        application.scope.prompt_index,
        application.field_path,
        application.rule_id,
        application.fingerprint,
        application.reason,
        application.actor,
        application.applied_at.to_rfc3339(),
    ])
    .context("Failed to insert redaction")
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<RedactionApplication> {
    let applied_at: String = row.get(7)?;
    let applied_at = DateTime::parse_from_rfc3339(&applied_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok(RedactionApplication {
        scope: OwnerScope::new(row.get::<_, String>(0)?, row.get(1)?),
        field_path: row.get(2)?,
        rule_id: row.get(3)?,
        fingerprint: row.get(4)?,
        reason: row.get(5)?,
        actor: row.get(6)?,
        applied_at,
    })
}

impl PersistenceGateway for SqliteGateway {
    fn begin(&mut self, source_id: &str) -> Result<()> {
        if let Some(open) = &self.open {
            bail!("cannot begin '{}': unit '{}' is still open", source_id, open);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE").context("Failed to begin transaction")?;
        self.open = Some(source_id.to_string());

        let removed = self
            .conn
            .execute("DELETE FROM records WHERE source_id = ?1", params![source_id])
            .context("Failed to clear previous rows")?;
        self.conn
            .execute(
                "INSERT INTO sources (source_id, ingested_at) VALUES (?1, ?2)
                 ON CONFLICT(source_id) DO UPDATE SET ingested_at = excluded.ingested_at",
                params![source_id, Utc::now().to_rfc3339()],
            )
            .context("Failed to register source")?;
        debug!("Opened unit {} ({} previous row(s) replaced)", source_id, removed);
        Ok(())
    }

    fn stage_records(&mut self, rows: &[RecordRow]) -> Result<()> {
        if self.open.is_none() {
            bail!("stage_records called without an open unit");
        }
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO records
             (source_id, position, prompt_index, kind, record_type, payload_type, timestamp, fields, payload, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.source_id,
                row.position as i64,
                row.prompt_index,
                row.kind.as_str(),
                row.record_type,
                row.payload_type,
                row.timestamp,
                serde_json::to_string(&row.fields)?,
                serde_json::to_string(&row.payload)?,
                serde_json::to_string(&row.metadata)?,
            ])
            .with_context(|| format!("Failed to insert {} #{}", row.source_id, row.position))?;
        }
        Ok(())
    }

    fn insert_application_if_absent(&mut self, application: &RedactionApplication) -> Result<bool> {
        if self.open.is_none() {
            bail!("insert_application_if_absent called without an open unit");
        }
        self.insert_application(application)
    }

    fn commit(&mut self) -> Result<()> {
        let Some(source_id) = self.open.take() else {
            bail!("commit called without an open unit");
        };
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            // Leave the unit open so the caller's rollback releases it.
            self.open = Some(source_id.clone());
            return Err(e).with_context(|| format!("Failed to commit {}", source_id));
        }
        debug!("Committed unit {}", source_id);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some(source_id) = self.open.take() {
            self.conn
                .execute_batch("ROLLBACK")
                .with_context(|| format!("Failed to roll back {}", source_id))?;
            debug!("Rolled back unit {}", source_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use serde_json::json;
    use tempfile::tempdir;

    fn row(source: &str, position: usize, field: &str) -> RecordRow {
        RecordRow {
            source_id: source.to_string(),
            position,
            prompt_index: Some(1),
            kind: RowKind::Prompt,
            record_type: "event_msg".to_string(),
            payload_type: Some("user_message".to_string()),
            timestamp: None,
            fields: BTreeMap::from([("prompt.message".to_string(), field.to_string())]),
            payload: json!({"message": field}),
            metadata: json!({}),
        }
    }

    fn rule_application(source: &str, prompt: Option<u32>) -> RedactionApplication {
        RedactionApplication {
            scope: OwnerScope::new(source, prompt),
            rule_id: Some("email".to_string()),
            fingerprint: "f".repeat(64),
            field_path: "prompt.message".to_string(),
            reason: None,
            actor: None,
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn test_open_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("db.sqlite");
        let gw = SqliteGateway::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(gw.record_count("nothing").unwrap(), 0);
    }

    #[test]
    fn test_commit_replaces_rows() {
        let mut gw = SqliteGateway::open_in_memory().unwrap();
        gw.begin("a").unwrap();
        gw.stage_records(&[row("a", 1, "x"), row("a", 2, "y")]).unwrap();
        gw.commit().unwrap();
        assert_eq!(gw.record_count("a").unwrap(), 2);
        assert!(gw.ingested_at("a").unwrap().is_some());

        gw.begin("a").unwrap();
        gw.stage_records(&[row("a", 1, "z")]).unwrap();
        gw.commit().unwrap();
        let records = gw.stored_rows("a").unwrap();
        assert_eq!(records, vec![row("a", 1, "z")]);
    }

    #[test]
    fn test_rollback_keeps_previous_rows() {
        let mut gw = SqliteGateway::open_in_memory().unwrap();
        gw.begin("a").unwrap();
        gw.stage_records(&[row("a", 1, "x")]).unwrap();
        gw.commit().unwrap();

        gw.begin("a").unwrap();
        gw.stage_records(&[row("a", 1, "new"), row("a", 2, "new")]).unwrap();
        assert!(gw.insert_application_if_absent(&rule_application("a", Some(1))).unwrap());
        gw.rollback().unwrap();

        let records = gw.stored_rows("a").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields["prompt.message"], "x");
        assert!(gw.applications(None).unwrap().is_empty());
    }

    #[test]
    fn test_insert_or_ignore_on_unique_key() {
        let mut gw = SqliteGateway::open_in_memory().unwrap();
        gw.begin("a").unwrap();
        assert!(gw.insert_application_if_absent(&rule_application("a", Some(1))).unwrap());
        assert!(!gw.insert_application_if_absent(&rule_application("a", Some(1))).unwrap());
        assert!(gw.insert_application_if_absent(&rule_application("a", None)).unwrap());
        assert!(!gw.insert_application_if_absent(&rule_application("a", None)).unwrap());
        gw.commit().unwrap();

        let stored = gw.applications(Some("a")).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].rule_id.as_deref(), Some("email"));
        assert!(gw.applications(Some("b")).unwrap().is_empty());
    }

    #[test]
    fn test_manual_entries_outside_units() {
        let mut gw = SqliteGateway::open_in_memory().unwrap();
        let manual = RedactionApplication::manual(OwnerScope::new("a", Some(1)), "prompt.message", "<X>", None, None);
        assert!(gw.record_manual(&manual).unwrap());
        assert!(!gw.record_manual(&manual).unwrap());

        gw.begin("a").unwrap();
        assert!(gw.record_manual(&manual).is_err());
        gw.rollback().unwrap();

        let stored = gw.applications(None).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_manual());
    }

    #[test]
    fn test_record_applications_outside_units() {
        let mut gw = SqliteGateway::open_in_memory().unwrap();
        let batch = [rule_application("a", Some(1)), rule_application("a", Some(2))];
        assert_eq!(gw.record_applications(&batch).unwrap(), 2);
        assert_eq!(gw.record_applications(&batch).unwrap(), 0);

        gw.begin("a").unwrap();
        assert!(gw.record_applications(&batch).is_err());
        gw.rollback().unwrap();
        assert_eq!(gw.applications(Some("a")).unwrap().len(), 2);
    }
}
