//! SQLite implementation of cache generation storage.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use super::traits::{CacheStorage, CachedEntry, StoredResponse};
use crate::db::Database;
use crate::http::CacheKey;

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

type EntryRow = (String, u16, String, Vec<u8>, String, String);

fn read_entry_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
  ))
}

/// Turn a raw row into an entry, rejecting rows whose body was damaged.
fn decode_entry(key: &CacheKey, row: EntryRow) -> Result<Option<CachedEntry>> {
  let (generation, status, headers, body, digest, cached_at) = row;

  if body_digest(&body) != digest {
    warn!(
      generation = %generation,
      url = %key.url,
      "Cached body does not match its digest, ignoring entry"
    );
    return Ok(None);
  }

  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to parse cached headers for {}: {}", key.url, e))?;

  Ok(Some(CachedEntry {
    generation,
    response: StoredResponse {
      status,
      headers,
      body,
    },
    cached_at: parse_datetime(&cached_at)?,
  }))
}

impl CacheStorage for SqliteStorage {
  fn open_generation(&self, name: &str) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open cache generation {}: {}", name, e))?;
    Ok(())
  }

  fn generation_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache generation: {}", e))?;

    Ok(names)
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cached_responses WHERE generation = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let removed = tx
      .execute("DELETE FROM cache_generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache generation {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn put(&self, generation: &str, key: &CacheKey, response: &StoredResponse) -> Result<()> {
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
    let digest = body_digest(&response.body);

    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to open cache generation {}: {}", generation, e))?;

    tx.execute(
      "INSERT OR REPLACE INTO cached_responses
         (generation, method, url, status, headers, body, body_sha256, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        key.method,
        key.url,
        response.status,
        headers,
        response.body,
        digest
      ],
    )
    .map_err(|e| eyre!("Failed to store response for {}: {}", key.url, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<CachedEntry>> {
    let row = {
      let conn = self.db.conn()?;
      conn
        .query_row(
          "SELECT generation, status, headers, body, body_sha256, cached_at
           FROM cached_responses
           WHERE generation = ? AND method = ? AND url = ?",
          params![generation, key.method, key.url],
          read_entry_row,
        )
        .optional()
        .map_err(|e| eyre!("Failed to query cache: {}", e))?
    };

    match row {
      Some(row) => decode_entry(key, row),
      None => Ok(None),
    }
  }

  fn match_any(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
    let rows: Vec<EntryRow> = {
      let conn = self.db.conn()?;
      let mut stmt = conn
        .prepare(
          "SELECT cr.generation, cr.status, cr.headers, cr.body, cr.body_sha256, cr.cached_at
           FROM cached_responses cr
           INNER JOIN cache_generations cg ON cg.name = cr.generation
           WHERE cr.method = ? AND cr.url = ?
           ORDER BY cg.rowid",
        )
        .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

      let rows = stmt
        .query_map(params![key.method, key.url], read_entry_row)
        .map_err(|e| eyre!("Failed to query cache: {}", e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| eyre!("Failed to read cached entry: {}", e))?;
      rows
    };

    for row in rows {
      if let Some(entry) = decode_entry(key, row)? {
        return Ok(Some(entry));
      }
    }
    Ok(None)
  }

  fn entry_count(&self, generation: &str) -> Result<usize> {
    let conn = self.db.conn()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cached_responses WHERE generation = ?",
        params![generation],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", generation, e))?;
    Ok(count as usize)
  }

  fn registered_version(&self) -> Result<Option<String>> {
    let conn = self.db.conn()?;
    conn
      .query_row(
        "SELECT version FROM worker_registration WHERE id = 1",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read worker registration: {}", e))
  }

  fn set_registered_version(&self, version: &str) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO worker_registration (id, version, registered_at)
         VALUES (1, ?, datetime('now'))",
        params![version],
      )
      .map_err(|e| eyre!("Failed to store worker registration: {}", e))?;
    Ok(())
  }
}

/// Hex SHA-256 of a body, stored next to it to detect damaged rows.
pub fn body_digest(body: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(body);
  hex::encode(hasher.finalize())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
