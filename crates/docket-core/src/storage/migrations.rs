//! Database Migrations
//!
//! Forward-only migration chain. Each step runs inside its own transaction
//! with deferred foreign keys, and the runner verifies `PRAGMA
//! foreign_key_check` comes back empty before moving on. Re-running the
//! chain at the target version is a no-op.

use crate::error::{Result, StoreError};

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: provenance DAG, documents, OCR, chunks, embeddings, entities",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Knowledge graph: nodes, entity links, typed edges",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Full-text shadow tables for chunks, image descriptions, extractions",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Edge contradiction tracking; entities rebuilt with medical types",
        up: MIGRATION_V4_UP,
    },
    Migration {
        version: 5,
        description: "Entity-name embeddings; chunk FTS rebuilt with porter tokenizer",
        up: MIGRATION_V5_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
///
/// The provenance table comes first: every other artifact table carries a
/// NOT NULL provenance_id FK into it. parent_id and source_id are
/// self-referential, which is why cascade delete walks provenance rows in
/// descending chain_depth order.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS provenance (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL CHECK (type IN (
        'DOCUMENT', 'OCR_RESULT', 'CHUNK', 'IMAGE', 'VLM_DESCRIPTION',
        'EMBEDDING', 'EXTRACTION', 'FORM_FILL', 'ENTITY_EXTRACTION',
        'KNOWLEDGE_GRAPH', 'COMPARISON'
    )),
    processor TEXT NOT NULL,
    processor_version TEXT NOT NULL,
    parameters TEXT,
    content_hash TEXT NOT NULL,
    input_hash TEXT,
    source_id TEXT REFERENCES provenance(id),
    source_type TEXT CHECK (source_type IS NULL OR source_type IN (
        'FILE', 'DOCUMENT', 'OCR_RESULT', 'CHUNK', 'IMAGE', 'EXTRACTION', 'KG_NODE'
    )),
    parent_id TEXT REFERENCES provenance(id),
    parent_ids TEXT NOT NULL DEFAULT '[]',
    root_document_id TEXT NOT NULL,
    chain_depth INTEGER NOT NULL DEFAULT 0,
    chain_path TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_provenance_parent ON provenance(parent_id);
CREATE INDEX IF NOT EXISTS idx_provenance_source ON provenance(source_id);
CREATE INDEX IF NOT EXISTS idx_provenance_root ON provenance(root_document_id);
CREATE INDEX IF NOT EXISTS idx_provenance_root_depth ON provenance(root_document_id, chain_depth);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0,
    file_type TEXT NOT NULL DEFAULT 'pdf',
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'processing', 'complete', 'failed')),
    page_count INTEGER,
    title TEXT,
    author TEXT,
    subject TEXT,
    upload_ref TEXT,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_file_hash ON documents(file_hash);
CREATE INDEX IF NOT EXISTS idx_documents_file_path ON documents(file_path);
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
CREATE INDEX IF NOT EXISTS idx_documents_provenance ON documents(provenance_id);

CREATE TABLE IF NOT EXISTS ocr_results (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    extracted_text TEXT NOT NULL,
    text_length INTEGER NOT NULL,
    request_id TEXT,
    quality_mode TEXT NOT NULL DEFAULT 'balanced'
        CHECK (quality_mode IN ('fast', 'balanced', 'accurate')),
    page_count INTEGER NOT NULL DEFAULT 0,
    quality_score REAL,
    cost REAL,
    content_hash TEXT NOT NULL,
    blocks TEXT,
    extras TEXT,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ocr_results_document ON ocr_results(document_id);
CREATE INDEX IF NOT EXISTS idx_ocr_results_provenance ON ocr_results(provenance_id);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    ocr_result_id TEXT NOT NULL REFERENCES ocr_results(id),
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    character_start INTEGER NOT NULL,
    character_end INTEGER NOT NULL,
    page_number INTEGER,
    overlap_previous INTEGER NOT NULL DEFAULT 0,
    overlap_next INTEGER NOT NULL DEFAULT 0,
    text_hash TEXT NOT NULL,
    embedding_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (embedding_status IN ('pending', 'complete', 'failed')),
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL,
    CHECK (character_start >= 0 AND character_start < character_end)
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
CREATE INDEX IF NOT EXISTS idx_chunks_ocr_result ON chunks(ocr_result_id);
CREATE INDEX IF NOT EXISTS idx_chunks_embedding_status ON chunks(embedding_status);
CREATE INDEX IF NOT EXISTS idx_chunks_provenance ON chunks(provenance_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_document_index ON chunks(document_id, chunk_index);

CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    page_number INTEGER,
    image_hash TEXT NOT NULL,
    vlm_description TEXT,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_images_document ON images(document_id);
CREATE INDEX IF NOT EXISTS idx_images_provenance ON images(provenance_id);

CREATE TABLE IF NOT EXISTS extractions (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    schema_name TEXT,
    extraction_json TEXT NOT NULL,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_extractions_document ON extractions(document_id);
CREATE INDEX IF NOT EXISTS idx_extractions_provenance ON extractions(provenance_id);

CREATE TABLE IF NOT EXISTS form_fills (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    form_name TEXT,
    fill_json TEXT NOT NULL,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_form_fills_document ON form_fills(document_id);
CREATE INDEX IF NOT EXISTS idx_form_fills_provenance ON form_fills(provenance_id);

CREATE TABLE IF NOT EXISTS comparisons (
    id TEXT PRIMARY KEY,
    document_ids TEXT NOT NULL DEFAULT '[]',
    summary TEXT,
    comparison_json TEXT NOT NULL,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comparisons_provenance ON comparisons(provenance_id);

-- Exactly one owner per embedding row, enforced at write time
CREATE TABLE IF NOT EXISTS embeddings (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    chunk_id TEXT REFERENCES chunks(id),
    image_id TEXT REFERENCES images(id),
    extraction_id TEXT REFERENCES extractions(id),
    vector BLOB NOT NULL,
    dimensions INTEGER NOT NULL DEFAULT 768,
    model_name TEXT NOT NULL,
    model_version TEXT,
    task_type TEXT NOT NULL DEFAULT 'search_document'
        CHECK (task_type IN ('search_document', 'search_query')),
    original_text TEXT,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL,
    CHECK (chunk_id IS NOT NULL OR image_id IS NOT NULL OR extraction_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_embeddings_document ON embeddings(document_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_chunk ON embeddings(chunk_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_image ON embeddings(image_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_extraction ON embeddings(extraction_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_provenance ON embeddings(provenance_id);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    entity_type TEXT NOT NULL CHECK (entity_type IN (
        'person', 'organization', 'date', 'amount', 'case_number',
        'location', 'statute', 'exhibit', 'other'
    )),
    raw_text TEXT NOT NULL,
    normalized_text TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.0,
    aliases TEXT NOT NULL DEFAULT '[]',
    agreement_count INTEGER NOT NULL DEFAULT 1,
    metadata TEXT,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_document ON entities(document_id);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_normalized ON entities(normalized_text);
CREATE INDEX IF NOT EXISTS idx_entities_provenance ON entities(provenance_id);

CREATE TABLE IF NOT EXISTS entity_mentions (
    id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL REFERENCES entities(id),
    document_id TEXT NOT NULL REFERENCES documents(id),
    chunk_id TEXT REFERENCES chunks(id),
    page_number INTEGER,
    character_start INTEGER,
    character_end INTEGER,
    context TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mentions_entity ON entity_mentions(entity_id);
CREATE INDEX IF NOT EXISTS idx_mentions_document ON entity_mentions(document_id);
CREATE INDEX IF NOT EXISTS idx_mentions_chunk ON entity_mentions(chunk_id);

CREATE TABLE IF NOT EXISTS entity_extraction_segments (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    segment_index INTEGER NOT NULL,
    character_start INTEGER NOT NULL,
    character_end INTEGER NOT NULL,
    entity_count INTEGER NOT NULL DEFAULT 0,
    relationship_count INTEGER NOT NULL DEFAULT 0,
    token_usage TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_segments_document ON entity_extraction_segments(document_id);

CREATE TABLE IF NOT EXISTS database_metadata (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    document_count INTEGER NOT NULL DEFAULT 0,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    embedding_count INTEGER NOT NULL DEFAULT 0,
    entity_count INTEGER NOT NULL DEFAULT 0,
    node_count INTEGER NOT NULL DEFAULT 0,
    edge_count INTEGER NOT NULL DEFAULT 0
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Knowledge graph tables
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS knowledge_nodes (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL CHECK (entity_type IN (
        'person', 'organization', 'date', 'amount', 'case_number',
        'location', 'statute', 'exhibit', 'medication', 'diagnosis',
        'medical_device', 'other'
    )),
    canonical_name TEXT NOT NULL,
    normalized_name TEXT NOT NULL,
    aliases TEXT NOT NULL DEFAULT '[]',
    document_count INTEGER NOT NULL DEFAULT 0,
    mention_count INTEGER NOT NULL DEFAULT 0,
    edge_count INTEGER NOT NULL DEFAULT 0,
    avg_confidence REAL NOT NULL DEFAULT 0.0,
    importance_score REAL NOT NULL DEFAULT 0.0,
    metadata TEXT,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_type ON knowledge_nodes(entity_type);
CREATE INDEX IF NOT EXISTS idx_nodes_normalized ON knowledge_nodes(normalized_name);
CREATE INDEX IF NOT EXISTS idx_nodes_type_normalized ON knowledge_nodes(entity_type, normalized_name);
CREATE INDEX IF NOT EXISTS idx_nodes_mention_count ON knowledge_nodes(mention_count);
CREATE INDEX IF NOT EXISTS idx_nodes_provenance ON knowledge_nodes(provenance_id);

CREATE TABLE IF NOT EXISTS node_entity_links (
    id TEXT PRIMARY KEY,
    node_id TEXT NOT NULL REFERENCES knowledge_nodes(id),
    entity_id TEXT NOT NULL REFERENCES entities(id),
    document_id TEXT NOT NULL REFERENCES documents(id),
    similarity REAL NOT NULL DEFAULT 1.0,
    method TEXT NOT NULL DEFAULT 'exact'
        CHECK (method IN ('exact', 'fuzzy', 'ai', 'gemini_coreference')),
    created_at TEXT NOT NULL,
    UNIQUE (node_id, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_links_node ON node_entity_links(node_id);
CREATE INDEX IF NOT EXISTS idx_links_entity ON node_entity_links(entity_id);
CREATE INDEX IF NOT EXISTS idx_links_document ON node_entity_links(document_id);

-- Raw per-document relationships as extracted; knowledge_edges are derived
-- from these, which is what makes full rebuilds possible
CREATE TABLE IF NOT EXISTS entity_relationships (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    source_entity_id TEXT NOT NULL REFERENCES entities(id),
    target_entity_id TEXT NOT NULL REFERENCES entities(id),
    relationship_type TEXT NOT NULL CHECK (relationship_type IN (
        'co_located', 'co_mentioned', 'works_at', 'represents', 'located_in',
        'filed_in', 'cites', 'references', 'party_to', 'related_to',
        'precedes', 'occurred_at'
    )),
    confidence REAL NOT NULL DEFAULT 0.0,
    evidence TEXT,
    valid_from TEXT,
    valid_until TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entity_relationships_document
    ON entity_relationships(document_id);
CREATE INDEX IF NOT EXISTS idx_entity_relationships_source
    ON entity_relationships(source_entity_id);
CREATE INDEX IF NOT EXISTS idx_entity_relationships_target
    ON entity_relationships(target_entity_id);

-- Direction invariant baked in: source sorts before target, one row per
-- (source, target, type)
CREATE TABLE IF NOT EXISTS knowledge_edges (
    id TEXT PRIMARY KEY,
    source_node_id TEXT NOT NULL REFERENCES knowledge_nodes(id),
    target_node_id TEXT NOT NULL REFERENCES knowledge_nodes(id),
    relationship_type TEXT NOT NULL CHECK (relationship_type IN (
        'co_located', 'co_mentioned', 'works_at', 'represents', 'located_in',
        'filed_in', 'cites', 'references', 'party_to', 'related_to',
        'precedes', 'occurred_at'
    )),
    weight REAL NOT NULL DEFAULT 0.0,
    normalized_weight REAL NOT NULL DEFAULT 0.0,
    evidence_count INTEGER NOT NULL DEFAULT 1,
    document_ids TEXT NOT NULL DEFAULT '[]',
    valid_from TEXT,
    valid_until TEXT,
    metadata TEXT,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (source_node_id, target_node_id, relationship_type),
    CHECK (source_node_id < target_node_id)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON knowledge_edges(source_node_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON knowledge_edges(target_node_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON knowledge_edges(relationship_type);
CREATE INDEX IF NOT EXISTS idx_edges_normalized_weight ON knowledge_edges(normalized_weight);
CREATE INDEX IF NOT EXISTS idx_edges_valid_from ON knowledge_edges(valid_from);
CREATE INDEX IF NOT EXISTS idx_edges_valid_until ON knowledge_edges(valid_until);
CREATE INDEX IF NOT EXISTS idx_edges_provenance ON knowledge_edges(provenance_id);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Full-text shadow tables
///
/// chunks_fts mirrors chunks.text through external content; the image and
/// extraction tables get standalone FTS copies because their triggers are
/// conditional (only image-owned embeddings with description text are
/// indexed).
const MIGRATION_V3_UP: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    id,
    text,
    content='chunks',
    content_rowid='rowid'
);

INSERT INTO chunks_fts(rowid, id, text) SELECT rowid, id, text FROM chunks;

CREATE TRIGGER IF NOT EXISTS chunks_fts_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, id, text) VALUES (NEW.rowid, NEW.id, NEW.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, id, text)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, id, text)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text);
    INSERT INTO chunks_fts(rowid, id, text) VALUES (NEW.rowid, NEW.id, NEW.text);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS image_descriptions_fts USING fts5(
    id UNINDEXED,
    original_text
);

INSERT INTO image_descriptions_fts(id, original_text)
    SELECT id, original_text FROM embeddings
    WHERE image_id IS NOT NULL AND original_text IS NOT NULL;

CREATE TRIGGER IF NOT EXISTS image_descriptions_fts_ai AFTER INSERT ON embeddings
WHEN NEW.image_id IS NOT NULL AND NEW.original_text IS NOT NULL BEGIN
    INSERT INTO image_descriptions_fts(id, original_text)
    VALUES (NEW.id, NEW.original_text);
END;

CREATE TRIGGER IF NOT EXISTS image_descriptions_fts_ad AFTER DELETE ON embeddings
WHEN OLD.image_id IS NOT NULL AND OLD.original_text IS NOT NULL BEGIN
    DELETE FROM image_descriptions_fts WHERE id = OLD.id;
END;

CREATE TRIGGER IF NOT EXISTS image_descriptions_fts_au AFTER UPDATE ON embeddings BEGIN
    DELETE FROM image_descriptions_fts WHERE id = OLD.id;
    INSERT INTO image_descriptions_fts(id, original_text)
    SELECT NEW.id, NEW.original_text
    WHERE NEW.image_id IS NOT NULL AND NEW.original_text IS NOT NULL;
END;

CREATE VIRTUAL TABLE IF NOT EXISTS extractions_fts USING fts5(
    id UNINDEXED,
    extraction_json
);

INSERT INTO extractions_fts(id, extraction_json)
    SELECT id, extraction_json FROM extractions;

CREATE TRIGGER IF NOT EXISTS extractions_fts_ai AFTER INSERT ON extractions BEGIN
    INSERT INTO extractions_fts(id, extraction_json)
    VALUES (NEW.id, NEW.extraction_json);
END;

CREATE TRIGGER IF NOT EXISTS extractions_fts_ad AFTER DELETE ON extractions BEGIN
    DELETE FROM extractions_fts WHERE id = OLD.id;
END;

CREATE TRIGGER IF NOT EXISTS extractions_fts_au AFTER UPDATE ON extractions BEGIN
    DELETE FROM extractions_fts WHERE id = OLD.id;
    INSERT INTO extractions_fts(id, extraction_json)
    VALUES (NEW.id, NEW.extraction_json);
END;

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// V4: Contradiction tracking on edges; entities rebuilt so the CHECK set
/// accepts the medical types. The rebuild copies every row; child FKs
/// (entity_mentions, node_entity_links) re-bind to the renamed table.
const MIGRATION_V4_UP: &str = r#"
ALTER TABLE knowledge_edges ADD COLUMN contradiction_count INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_edges_contradictions ON knowledge_edges(contradiction_count);

CREATE TABLE entities_new (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    entity_type TEXT NOT NULL CHECK (entity_type IN (
        'person', 'organization', 'date', 'amount', 'case_number',
        'location', 'statute', 'exhibit', 'medication', 'diagnosis',
        'medical_device', 'other'
    )),
    raw_text TEXT NOT NULL,
    normalized_text TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.0,
    aliases TEXT NOT NULL DEFAULT '[]',
    agreement_count INTEGER NOT NULL DEFAULT 1,
    metadata TEXT,
    provenance_id TEXT NOT NULL REFERENCES provenance(id),
    created_at TEXT NOT NULL
);

INSERT INTO entities_new SELECT * FROM entities;
DROP TABLE entities;
ALTER TABLE entities_new RENAME TO entities;

CREATE INDEX IF NOT EXISTS idx_entities_document ON entities(document_id);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_normalized ON entities(normalized_text);
CREATE INDEX IF NOT EXISTS idx_entities_provenance ON entities(provenance_id);

UPDATE schema_version SET version = 4, applied_at = datetime('now');
"#;

/// V5: On-demand entity-name embeddings for semantic entity search, plus a
/// porter-tokenizer rebuild of chunks_fts (stemming improves recall on OCR
/// text)
const MIGRATION_V5_UP: &str = r#"
CREATE TABLE IF NOT EXISTS entity_embeddings (
    node_id TEXT PRIMARY KEY REFERENCES knowledge_nodes(id),
    vector BLOB NOT NULL,
    dimensions INTEGER NOT NULL DEFAULT 768,
    model_name TEXT NOT NULL,
    task_type TEXT NOT NULL DEFAULT 'search_document'
        CHECK (task_type IN ('search_document', 'search_query')),
    embedded_text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

DROP TRIGGER IF EXISTS chunks_fts_ai;
DROP TRIGGER IF EXISTS chunks_fts_ad;
DROP TRIGGER IF EXISTS chunks_fts_au;
DROP TABLE IF EXISTS chunks_fts;

CREATE VIRTUAL TABLE chunks_fts USING fts5(
    id, text,
    content='chunks',
    content_rowid='rowid',
    tokenize='porter ascii'
);

INSERT INTO chunks_fts(chunks_fts) VALUES('rebuild');

CREATE TRIGGER chunks_fts_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, id, text) VALUES (NEW.rowid, NEW.id, NEW.text);
END;

CREATE TRIGGER chunks_fts_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, id, text)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text);
END;

CREATE TRIGGER chunks_fts_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, id, text)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text);
    INSERT INTO chunks_fts(rowid, id, text) VALUES (NEW.rowid, NEW.id, NEW.text);
END;

UPDATE schema_version SET version = 5, applied_at = datetime('now');
"#;

/// Current target schema version
pub const CURRENT_VERSION: u32 = 5;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations, one transaction per step
///
/// Each step runs with deferred foreign keys (the V4 table rebuild drops a
/// referenced table mid-transaction) and must leave `PRAGMA
/// foreign_key_check` empty before it commits.
pub fn apply_migrations(conn: &rusqlite::Connection) -> Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            let tx = conn.unchecked_transaction()?;
            tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;
            tx.execute_batch(migration.up)?;
            verify_foreign_keys(&tx)?;
            tx.commit()?;

            applied += 1;
        }
    }

    Ok(applied)
}

/// Fail if `PRAGMA foreign_key_check` reports any dangling reference
pub fn verify_foreign_keys(conn: &rusqlite::Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let mut rows = stmt.query([])?;
    if let Some(row) = rows.next()? {
        let table: String = row.get(0)?;
        let referenced: String = row.get(2).unwrap_or_else(|_| "?".to_string());
        return Err(StoreError::IntegrityViolation(format!(
            "foreign_key_check failed: {table} references missing row in {referenced}"
        )));
    }
    Ok(())
}

/// Tables that must exist after migration for an open to succeed
pub const REQUIRED_TABLES: &[&str] = &[
    "provenance",
    "documents",
    "ocr_results",
    "chunks",
    "images",
    "extractions",
    "form_fills",
    "comparisons",
    "embeddings",
    "entities",
    "entity_mentions",
    "entity_relationships",
    "entity_extraction_segments",
    "knowledge_nodes",
    "node_entity_links",
    "knowledge_edges",
    "entity_embeddings",
    "database_metadata",
    "schema_version",
    "chunks_fts",
    "image_descriptions_fts",
    "extractions_fts",
];

/// Indexes that must exist after migration
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_documents_file_hash",
    "idx_documents_file_path",
    "idx_chunks_embedding_status",
    "idx_edges_contradictions",
    "idx_mentions_chunk",
    "idx_entities_type",
];

/// Verify the schema contract after migration; SchemaMismatch names what is
/// missing
pub fn verify_schema(conn: &rusqlite::Connection) -> Result<()> {
    for table in REQUIRED_TABLES {
        let found: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1
             AND type IN ('table', 'view')",
            [table],
            |row| row.get(0),
        )?;
        if found == 0 {
            return Err(StoreError::SchemaMismatch(format!("missing table {table}")));
        }
    }
    for index in REQUIRED_INDEXES {
        let found: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1 AND type = 'index'",
            [index],
            |row| row.get(0),
        )?;
        if found == 0 {
            return Err(StoreError::SchemaMismatch(format!("missing index {index}")));
        }
    }
    Ok(())
}
