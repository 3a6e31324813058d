//! SQLite implementation of SectionStorage
//!
//! One row per section; the image list is stored as a JSON array so that a
//! record reads back exactly as it is served. List mutations run inside an
//! immediate transaction, making each append/remove a single atomic update.

use crate::error::{StoreError, StoreResult};
use crate::metadata::config::MetadataConfig;
use crate::metadata::{Image, Section, SectionStorage};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use log::{debug, info, warn};

const SELECT_COLUMNS: &str = "SELECT section_id, name, images, created_at, updated_at FROM sections";

/// SQLite implementation of SectionStorage
pub struct SQLiteSectionStore {
    conn: Mutex<Connection>,
}

impl SQLiteSectionStore {
    /// Open (or create) the database described by `config`
    pub fn open(config: &MetadataConfig) -> StoreResult<Self> {
        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                    info!("Created metadata directory: {}", parent.display());
                }
            }
            Connection::open(&config.db_path)?
        };

        if config.wal_mode {
            let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
            if !mode.eq_ignore_ascii_case("wal") {
                warn!("SQLite refused WAL mode, journal_mode is {}", mode);
            }
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sections (
                section_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                images TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database, handy for tests
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(&MetadataConfig {
            db_path: ":memory:".to_string(),
            wal_mode: false,
            ..MetadataConfig::default()
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("SQLite connection lock poisoned".to_string()))
    }

    fn load(conn: &Connection, section_id: &str) -> StoreResult<Option<Section>> {
        let sql = format!("{} WHERE section_id = ?1", SELECT_COLUMNS);
        let section = conn
            .query_row(&sql, params![section_id], row_to_section)
            .optional()?;
        Ok(section)
    }

    fn store_images(conn: &Connection, section: &Section) -> StoreResult<()> {
        let images = serde_json::to_string(&section.images)?;
        conn.execute(
            "UPDATE sections SET images = ?1, updated_at = ?2 WHERE section_id = ?3",
            params![images, format_timestamp(&section.updated_at), section.section_id],
        )?;
        Ok(())
    }

    /// Read-modify-write of one record's image list inside an immediate transaction
    fn update_images<F>(&self, section_id: &str, mutate: F) -> StoreResult<Section>
    where
        F: FnOnce(&mut Vec<Image>) -> StoreResult<()>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut section = Self::load(&tx, section_id)?
            .ok_or_else(|| StoreError::NotFound("Section not found".to_string()))?;
        mutate(&mut section.images)?;
        section.touch();
        Self::store_images(&tx, &section)?;
        tx.commit()?;
        Ok(section)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_section(row: &Row<'_>) -> rusqlite::Result<Section> {
    let images_json: String = row.get(2)?;
    let images: Vec<Image> = serde_json::from_str(&images_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(Section {
        section_id: row.get(0)?,
        name: row.get(1)?,
        images,
        created_at: parse_timestamp(3, row.get(3)?)?,
        updated_at: parse_timestamp(4, row.get(4)?)?,
    })
}

impl SectionStorage for SQLiteSectionStore {
    fn list_sections(&self) -> StoreResult<Vec<Section>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(SELECT_COLUMNS)?;
        let rows = stmt.query_map([], row_to_section)?;

        let mut sections = Vec::new();
        for row in rows {
            sections.push(row?);
        }
        Ok(sections)
    }

    fn get_section(&self, section_id: &str) -> StoreResult<Option<Section>> {
        let conn = self.lock()?;
        Self::load(&conn, section_id)
    }

    fn create_section(&self, section_id: &str, name: &str) -> StoreResult<Section> {
        let section = Section::new(section_id, name);
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO sections (section_id, name, images, created_at, updated_at) VALUES (?1, ?2, '[]', ?3, ?4)",
            params![
                section.section_id,
                section.name,
                format_timestamp(&section.created_at),
                format_timestamp(&section.updated_at)
            ],
        );
        match result {
            Ok(_) => {
                debug!("Created section record {}", section_id);
                Ok(section)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Conflict(section_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn append_image(&self, section_id: &str, image: &Image) -> StoreResult<Section> {
        self.update_images(section_id, |images| {
            images.push(image.clone());
            Ok(())
        })
    }

    fn remove_image_at(&self, section_id: &str, index: usize) -> StoreResult<Section> {
        self.update_images(section_id, |images| {
            if index >= images.len() {
                return Err(StoreError::NotFound("Image not found".to_string()));
            }
            images.remove(index);
            Ok(())
        })
    }

    fn delete_section(&self, section_id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM sections WHERE section_id = ?1", params![section_id])?;
        debug!("Deleted section record {} ({} rows)", section_id, removed);
        Ok(())
    }
}
