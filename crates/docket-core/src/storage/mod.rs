//! Storage Layer
//!
//! One SQLite file per logical corpus. The `Store` owns a writer and a
//! reader connection (WAL journaling, foreign keys on) plus the in-memory
//! vector indexes, so all methods take `&self` and `Arc<Store>` is
//! `Send + Sync` for callers that dispatch from async shells.

mod cascade;
mod documents;
mod embeddings;
mod entities;
mod graph;
pub mod migrations;
mod provenance;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use lru::LruCache;
use rusqlite::{Connection, OpenFlags};
use std::num::NonZeroUsize;

use crate::error::{Result, StoreError};
use crate::model::{DatabaseInfo, DatabaseMetadata};
use crate::search::VectorIndex;

pub use cascade::CascadeDeleteReport;

pub(crate) use entities::{NewEntityRow, NewMentionRow, RelationshipRow};
pub(crate) use graph::{NewEdgeRow, NewNodeRow};

/// Query-embedding LRU capacity
const QUERY_CACHE_SIZE: usize = 100;

// ============================================================================
// STORE
// ============================================================================

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("name", &self.name).field("path", &self.path).finish()
    }
}

/// Handle to one open database file
pub struct Store {
    name: String,
    path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    /// Chunk/image/extraction embeddings, keyed by embedding id
    embedding_index: Mutex<VectorIndex>,
    /// Entity-name embeddings, keyed by KG node id
    entity_index: Mutex<VectorIndex>,
    /// Memoized query embeddings for semantic entity search
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Store {
    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a new database file and run the full migration chain.
    ///
    /// Fails with `AlreadyExists` if the file is present. The file is
    /// created 0600 and its directory 0700 on unix.
    pub fn create(root: Option<&Path>, name: &str) -> Result<Store> {
        validate_name(name)?;
        let root = resolve_root(root)?;
        std::fs::create_dir_all(&root).map_err(map_permission)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(&root, perms);
        }

        let path = root.join(format!("{name}.db"));
        if path.exists() {
            return Err(StoreError::AlreadyExists(format!(
                "database '{name}' at {}",
                path.display()
            )));
        }

        tracing::info!("Creating database '{}' at {}", name, path.display());
        let store = Self::open_at(name, path)?;
        store.init_metadata()?;
        Ok(store)
    }

    /// Open an existing database, run pending migrations, verify the schema.
    pub fn open(root: Option<&Path>, name: &str) -> Result<Store> {
        validate_name(name)?;
        let root = resolve_root(root)?;
        let path = root.join(format!("{name}.db"));
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "database '{name}' at {}",
                path.display()
            )));
        }
        Self::open_at(name, path)
    }

    fn open_at(name: &str, path: PathBuf) -> Result<Store> {
        let writer = Connection::open(&path).map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::CannotOpen =>
            {
                StoreError::PermissionDenied(format!("cannot open {}", path.display()))
            }
            other => StoreError::Database(other),
        })?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        configure_connection(&writer)?;
        migrations::apply_migrations(&writer)?;
        migrations::verify_schema(&writer)?;

        let reader = Connection::open(&path)?;
        configure_connection(&reader)?;

        let store = Store {
            name: name.to_string(),
            path,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            embedding_index: Mutex::new(
                VectorIndex::new().map_err(|e| StoreError::VectorIndex(e.to_string()))?,
            ),
            entity_index: Mutex::new(
                VectorIndex::new().map_err(|e| StoreError::VectorIndex(e.to_string()))?,
            ),
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        };

        store.load_vector_indexes()?;
        Ok(store)
    }

    /// Enumerate `*.db` files under the root, reading metadata read-only.
    /// Files that fail to open are skipped.
    pub fn list(root: Option<&Path>) -> Result<Vec<DatabaseInfo>> {
        let root = resolve_root(root)?;
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match read_metadata_readonly(&path) {
                Ok(metadata) => {
                    let file_size = entry.metadata().map(|m| m.len() as i64).unwrap_or(0);
                    out.push(DatabaseInfo {
                        name: stem.to_string(),
                        path: path.display().to_string(),
                        file_size,
                        metadata,
                    });
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable database {}: {}", path.display(), e);
                }
            }
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Remove the database file plus journal/shared-memory siblings.
    pub fn delete(root: Option<&Path>, name: &str) -> Result<()> {
        validate_name(name)?;
        let root = resolve_root(root)?;
        let path = root.join(format!("{name}.db"));
        if !path.exists() {
            return Err(StoreError::NotFound(format!("database '{name}'")));
        }
        std::fs::remove_file(&path).map_err(map_permission)?;
        for suffix in ["-wal", "-shm"] {
            let sibling = root.join(format!("{name}.db{suffix}"));
            if sibling.exists() {
                let _ = std::fs::remove_file(sibling);
            }
        }
        tracing::info!("Deleted database '{}'", name);
        Ok(())
    }

    /// Database name this store was opened as
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    fn init_metadata(&self) -> Result<()> {
        let now = now_rfc3339();
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR IGNORE INTO database_metadata (id, name, created_at, updated_at)
             VALUES (1, ?1, ?2, ?2)",
            rusqlite::params![self.name, now],
        )?;
        Ok(())
    }

    /// Read the denormalized metadata row
    pub fn metadata(&self) -> Result<DatabaseMetadata> {
        let reader = self.reader()?;
        read_metadata_row(&reader)
    }

    /// Current schema version of the open database
    pub fn schema_version(&self) -> Result<u32> {
        let reader = self.reader()?;
        Ok(migrations::get_current_version(&reader)?)
    }

    /// Run `PRAGMA foreign_key_check`; `IntegrityViolation` on any dangling
    /// reference
    pub fn verify_integrity(&self) -> Result<()> {
        let reader = self.reader()?;
        migrations::verify_foreign_keys(&reader)
    }

    /// Recompute denormalized totals and bump the last-modified timestamp.
    /// Runs on the supplied connection so write operations can call it
    /// inside their own transaction.
    pub(crate) fn refresh_metadata(conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE database_metadata SET
                document_count = (SELECT COUNT(*) FROM documents),
                chunk_count = (SELECT COUNT(*) FROM chunks),
                embedding_count = (SELECT COUNT(*) FROM embeddings),
                entity_count = (SELECT COUNT(*) FROM entities),
                node_count = (SELECT COUNT(*) FROM knowledge_nodes),
                edge_count = (SELECT COUNT(*) FROM knowledge_edges),
                updated_at = ?1
             WHERE id = 1",
            [now_rfc3339()],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    pub(crate) fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::IntegrityViolation("writer lock poisoned".into()))
    }

    pub(crate) fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::IntegrityViolation("reader lock poisoned".into()))
    }

    pub(crate) fn embedding_index(&self) -> Result<MutexGuard<'_, VectorIndex>> {
        self.embedding_index
            .lock()
            .map_err(|_| StoreError::IntegrityViolation("embedding index lock poisoned".into()))
    }

    pub(crate) fn entity_index(&self) -> Result<MutexGuard<'_, VectorIndex>> {
        self.entity_index
            .lock()
            .map_err(|_| StoreError::IntegrityViolation("entity index lock poisoned".into()))
    }

    pub(crate) fn query_cache(&self) -> Result<MutexGuard<'_, LruCache<String, Vec<f32>>>> {
        self.query_cache
            .lock()
            .map_err(|_| StoreError::IntegrityViolation("query cache lock poisoned".into()))
    }

    /// Rebuild both vector indexes from the relational tables
    fn load_vector_indexes(&self) -> Result<()> {
        let rows: Vec<(String, Vec<u8>)> = {
            let reader = self.reader()?;
            let mut stmt = reader.prepare("SELECT id, vector FROM embeddings")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        {
            let mut index = self.embedding_index()?;
            for (id, blob) in rows {
                let vector = blob_to_vector(&blob);
                if let Err(e) = index.insert(&id, &vector) {
                    tracing::warn!("Failed to index embedding {}: {}", id, e);
                }
            }
        }

        let rows: Vec<(String, Vec<u8>)> = {
            let reader = self.reader()?;
            let mut stmt = reader.prepare("SELECT node_id, vector FROM entity_embeddings")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut index = self.entity_index()?;
        for (id, blob) in rows {
            let vector = blob_to_vector(&blob);
            if let Err(e) = index.insert(&id, &vector) {
                tracing::warn!("Failed to index entity embedding {}: {}", id, e);
            }
        }

        Ok(())
    }
}

// ============================================================================
// CONNECTION / PATH HELPERS
// ============================================================================

/// Apply the standard PRAGMA set to a connection
fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -64000;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

/// Database names are path components; restrict to `[A-Za-z0-9_-]+`
fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Explicit root, or the platform data directory
fn resolve_root(root: Option<&Path>) -> Result<PathBuf> {
    match root {
        Some(p) => Ok(p.to_path_buf()),
        None => {
            let dirs = ProjectDirs::from("dev", "docket", "core").ok_or_else(|| {
                StoreError::PermissionDenied("could not determine data directory".into())
            })?;
            Ok(dirs.data_dir().to_path_buf())
        }
    }
}

fn map_permission(e: std::io::Error) -> StoreError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        StoreError::PermissionDenied(e.to_string())
    } else {
        StoreError::Io(e)
    }
}

fn read_metadata_readonly(path: &Path) -> Result<DatabaseMetadata> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    read_metadata_row(&conn)
}

fn read_metadata_row(conn: &Connection) -> Result<DatabaseMetadata> {
    let row = conn.query_row(
        "SELECT name, created_at, updated_at, document_count, chunk_count,
                embedding_count, entity_count, node_count, edge_count
         FROM database_metadata WHERE id = 1",
        [],
        |row| {
            Ok(DatabaseMetadata {
                name: row.get(0)?,
                created_at: parse_timestamp_col(row, 1)?,
                updated_at: parse_timestamp_col(row, 2)?,
                document_count: row.get(3)?,
                chunk_count: row.get(4)?,
                embedding_count: row.get(5)?,
                entity_count: row.get(6)?,
                node_count: row.get(7)?,
                edge_count: row.get(8)?,
            })
        },
    )?;
    Ok(row)
}

// ============================================================================
// ROW / VALUE HELPERS (shared by the CRUD modules)
// ============================================================================

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parse an RFC3339 TEXT column by index
pub(crate) fn parse_timestamp_col(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    parse_timestamp(&value, idx)
}

pub(crate) fn parse_timestamp(value: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Invalid timestamp '{}': {}", value, e),
                )),
            )
        })
}

/// Vec<String> <-> JSON TEXT column
pub(crate) fn to_json_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn from_json_array(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap_or_default()
}

/// f32 slice <-> little-endian BLOB
pub(crate) fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub(crate) fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
