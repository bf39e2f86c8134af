// 🗄️ Link Store - durable nature id → entity links + diagnostic event log
//
// SQLite in WAL mode. Links written here are read back as the existing-link
// index of the next run, so an interrupted batch resumes without creating
// duplicate entities.

use crate::batch::{BatchReport, Diagnostic};
use crate::resolver::ExistingLinks;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One entry of the diagnostics audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub nature_id: String,
    pub data: serde_json::Value,
}

impl LinkEvent {
    pub fn new(event_type: &str, nature_id: &str, data: serde_json::Value) -> Self {
        LinkEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            nature_id: nature_id.to_string(),
            data,
        }
    }
}

pub struct LinkStore {
    conn: Connection,
}

impl LinkStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open link database: {:?}", path))?;
        Self::setup(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> Result<Self> {
        // WAL for crash recovery; in-memory databases answer "memory"
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS links (
                nature_id TEXT PRIMARY KEY,
                entity_id TEXT NOT NULL,
                linked_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                nature_id TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_nature_id ON events(nature_id)",
            [],
        )?;

        Ok(LinkStore { conn })
    }

    // ------------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------------

    /// All stored links as the resolver's existing-link index
    pub fn existing_links(&self) -> Result<ExistingLinks> {
        let mut stmt = self.conn.prepare("SELECT nature_id, entity_id FROM links")?;
        let links = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<ExistingLinks, _>>()?;
        Ok(links)
    }

    /// Store a link, replacing any earlier one for the same nature id
    pub fn record_link(&self, nature_id: &str, entity_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO links (nature_id, entity_id, linked_at)
             VALUES (?1, ?2, ?3)",
            params![nature_id, entity_id, Utc::now().to_rfc3339()],
        )?;
        debug!(nature_id, entity_id, "stored link");
        Ok(())
    }

    /// Import a `{nature_id: entity_id}` JSON file, e.g. an export of links
    /// already present in the knowledge base
    pub fn import_links<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read links file: {:?}", path))?;
        let links: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse links file: {:?}", path))?;

        let tx = self.conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for (nature_id, entity_id) in &links {
            tx.execute(
                "INSERT OR REPLACE INTO links (nature_id, entity_id, linked_at)
                 VALUES (?1, ?2, ?3)",
                params![nature_id, entity_id, now],
            )?;
        }
        tx.commit()?;

        info!(count = links.len(), "imported links from {:?}", path);
        Ok(links.len())
    }

    pub fn link_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    pub fn insert_event(&self, event: &LinkEvent) -> Result<()> {
        let data_json = serde_json::to_string(&event.data)?;

        self.conn.execute(
            "INSERT INTO events (event_id, timestamp, event_type, nature_id, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.nature_id,
                data_json,
            ],
        )?;
        Ok(())
    }

    /// Append a batch diagnostic to the event log
    pub fn record_diagnostic(&self, diagnostic: &Diagnostic) -> Result<LinkEvent> {
        let event = LinkEvent::new(
            diagnostic.event_type(),
            &diagnostic.nature_id,
            serde_json::to_value(diagnostic)?,
        );
        self.insert_event(&event)?;
        Ok(event)
    }

    /// Persist what a batch produced: the links its collaborator confirmed
    /// and every diagnostic. Returns the number of links stored.
    pub fn record_batch(&self, report: &BatchReport) -> Result<usize> {
        for link in &report.new_links {
            self.record_link(&link.nature_id, &link.entity_id)?;
        }
        for diagnostic in &report.diagnostics {
            self.record_diagnostic(diagnostic)?;
        }
        info!(
            links = report.new_links.len(),
            diagnostics = report.diagnostics.len(),
            "stored batch results"
        );
        Ok(report.new_links.len())
    }

    /// Events for one nature id, oldest first
    pub fn events_for(&self, nature_id: &str) -> Result<Vec<LinkEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, nature_id, data
             FROM events
             WHERE nature_id = ?1
             ORDER BY id ASC",
        )?;

        let events = stmt
            .query_map(params![nature_id], |row| {
                let timestamp_str: String = row.get(1)?;
                let data_json: String = row.get(4)?;

                Ok(LinkEvent {
                    event_id: row.get(0)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                        })?
                        .with_timezone(&Utc),
                    event_type: row.get(2)?,
                    nature_id: row.get(3)?,
                    data: serde_json::from_str(&data_json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
                    })?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

// ============================================================================
// TESTS
// ============================================================================
