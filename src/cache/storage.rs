//! Cache storage trait and its SQLite and in-memory implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use url::Url;

use super::traits::{cache_key, CachedResponse, EntrySummary};
use crate::http::{Request, Response, ResponseKind};

/// Trait for named blob store backends.
///
/// Every call is atomic on its own. Nothing here offers read-modify-write,
/// so concurrent callers need no further coordination.
pub trait CacheStorage: Send + Sync {
  /// Open the named store, creating it if absent. Returns true if it was created.
  fn open(&self, name: &str) -> Result<bool>;

  /// Names of all existing stores.
  fn names(&self) -> Result<Vec<String>>;

  /// Delete a store and all of its entries. Returns true if it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Look up the snapshot stored for a request.
  fn get(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Store a snapshot, overwriting any previous one for the same request.
  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store several snapshots at once. Either all of them land or none do.
  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Store the pre-fetched manifest and mark the store as installed, atomically.
  fn commit_install(&self, name: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Whether an install completed for the store. Stores that only ever
  /// received fetch writes are not installed.
  fn is_installed(&self, name: &str) -> Result<bool>;

  /// List the entries of a store, ordered by URL.
  fn entries(&self, name: &str) -> Result<Vec<EntrySummary>>;
}

/// One in-memory store.
#[derive(Default)]
struct MemoryStore {
  installed: bool,
  /// entry key -> (request URL, snapshot)
  entries: HashMap<String, (String, CachedResponse)>,
}

/// Storage that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStorage {
  stores: Mutex<BTreeMap<String, MemoryStore>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, MemoryStore>>> {
    self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn insert_memory_entries(store: &mut MemoryStore, entries: &[(Request, Response)]) {
  let cached_at = Utc::now();
  for (request, response) in entries {
    store.entries.insert(
      cache_key(request),
      (
        request.cache_url().to_string(),
        CachedResponse {
          response: response.clone(),
          cached_at,
        },
      ),
    );
  }
}

impl CacheStorage for MemoryStorage {
  fn open(&self, name: &str) -> Result<bool> {
    let mut stores = self.lock()?;
    if stores.contains_key(name) {
      return Ok(false);
    }
    stores.insert(name.to_string(), MemoryStore::default());
    Ok(true)
  }

  fn names(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.keys().cloned().collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    Ok(self.lock()?.remove(name).is_some())
  }

  fn get(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>> {
    let stores = self.lock()?;
    Ok(
      stores
        .get(name)
        .and_then(|store| store.entries.get(&cache_key(request)))
        .map(|(_, cached)| cached.clone()),
    )
  }

  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
    self.put_all(name, &[(request.clone(), response.clone())])
  }

  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut stores = self.lock()?;
    insert_memory_entries(stores.entry(name.to_string()).or_default(), entries);
    Ok(())
  }

  fn commit_install(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut stores = self.lock()?;
    let store = stores.entry(name.to_string()).or_default();
    insert_memory_entries(store, entries);
    store.installed = true;
    Ok(())
  }

  fn is_installed(&self, name: &str) -> Result<bool> {
    Ok(self.lock()?.get(name).is_some_and(|store| store.installed))
  }

  fn entries(&self, name: &str) -> Result<Vec<EntrySummary>> {
    let stores = self.lock()?;
    let mut entries: Vec<EntrySummary> = stores
      .get(name)
      .map(|store| {
        store
          .entries
          .values()
          .map(|(url, cached)| EntrySummary {
            url: url.clone(),
            status: cached.response.status,
            cached_at: cached.cached_at,
          })
          .collect()
      })
      .unwrap_or_default();
    entries.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(entries)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Database that is discarded when dropped.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per version string ever deployed and not yet evicted
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity
CREATE TABLE IF NOT EXISTS entries (
    store TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    url TEXT NOT NULL,
    response_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    kind TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, entry_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_store ON entries(store);

-- Stores whose manifest pre-population completed
CREATE TABLE IF NOT EXISTS installs (
    name TEXT PRIMARY KEY,
    installed_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Write one snapshot; creates the store row if it is missing.
fn insert_entry(conn: &Connection, name: &str, request: &Request, response: &Response) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO stores (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to create store {}: {}", name, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries
         (store, entry_key, url, response_url, status, status_text, headers, body, kind, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        name,
        cache_key(request),
        request.cache_url().as_str(),
        response.url.as_str(),
        response.status,
        response.status_text,
        headers,
        response.body,
        response.kind.as_str(),
      ],
    )
    .map_err(|e| eyre!("Failed to store entry {}: {}", request.url, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;
    let inserted = conn
      .execute(
        "INSERT OR IGNORE INTO stores (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open store {}: {}", name, e))?;

    Ok(inserted > 0)
  }

  fn names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM stores ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read store name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE store = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    tx.execute("DELETE FROM installs WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to clear install marker of {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM stores WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete store {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn get(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT response_url, status, status_text, headers, body, kind, cached_at FROM entries
         WHERE store = ? AND entry_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(String, u16, String, String, Vec<u8>, String, String)> = stmt
      .query_row(params![name, cache_key(request)], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
          row.get(5)?,
          row.get(6)?,
        ))
      })
      .optional()
      .map_err(|e| eyre!("Failed to read entry {}: {}", request.url, e))?;

    let Some((url, status, status_text, headers, body, kind, cached_at)) = row else {
      return Ok(None);
    };

    let response = Response {
      url: Url::parse(&url).map_err(|e| eyre!("Invalid cached URL '{}': {}", url, e))?,
      status,
      status_text,
      headers: serde_json::from_str(&headers)
        .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?,
      body,
      kind: ResponseKind::parse(&kind)
        .ok_or_else(|| eyre!("Unknown response kind '{}'", kind))?,
    };

    Ok(Some(CachedResponse {
      response,
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    insert_entry(&conn, name, request, response)
  }

  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (request, response) in entries {
      insert_entry(&tx, name, request, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn commit_install(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO stores (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to create store {}: {}", name, e))?;
    for (request, response) in entries {
      insert_entry(&tx, name, request, response)?;
    }
    tx.execute(
      "INSERT OR REPLACE INTO installs (name, installed_at) VALUES (?, datetime('now'))",
      params![name],
    )
    .map_err(|e| eyre!("Failed to mark store {} installed: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn is_installed(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;
    let found: Option<String> = conn
      .query_row(
        "SELECT name FROM installs WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read install marker of {}: {}", name, e))?;

    Ok(found.is_some())
  }

  fn entries(&self, name: &str) -> Result<Vec<EntrySummary>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT url, status, cached_at FROM entries WHERE store = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![name], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, u16>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list entries: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read entry: {}", e))?;

    rows
      .into_iter()
      .map(|(url, status, cached_at)| {
        Ok(EntrySummary {
          url,
          status,
          cached_at: parse_datetime(&cached_at)?,
        })
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
