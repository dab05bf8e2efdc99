//! Schema DDL and SQLite pragmas, mirroring `original_source/roar/db/engine.py`:
//! WAL journal mode, foreign keys on, and an FTS5 shadow table over
//! `jobs(command, script)` kept in sync via triggers.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hash TEXT NOT NULL UNIQUE,
    started_at REAL NOT NULL,
    ended_at REAL,
    current_step INTEGER NOT NULL DEFAULT 0,
    current_build_step INTEGER NOT NULL DEFAULT 0,
    git_repo TEXT,
    git_commit_start TEXT,
    git_commit_end TEXT,
    git_branch TEXT,
    is_active INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_single_active
    ON sessions (is_active) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS artifacts (
    id TEXT PRIMARY KEY,
    size INTEGER NOT NULL,
    first_seen_at REAL NOT NULL,
    first_seen_path TEXT,
    source_type TEXT,
    source_url TEXT,
    uploaded_to TEXT,
    synced_at REAL,
    metadata TEXT
);

CREATE TABLE IF NOT EXISTS artifact_hashes (
    artifact_id TEXT NOT NULL REFERENCES artifacts(id) ON DELETE CASCADE,
    algorithm TEXT NOT NULL,
    digest TEXT NOT NULL,
    PRIMARY KEY (algorithm, digest)
);

CREATE INDEX IF NOT EXISTS idx_artifact_hashes_artifact
    ON artifact_hashes (artifact_id);

CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_uid TEXT NOT NULL UNIQUE,
    session_id INTEGER REFERENCES sessions(id) ON DELETE SET NULL,
    timestamp REAL NOT NULL,
    command TEXT NOT NULL,
    script TEXT,
    step_identity TEXT,
    step_number INTEGER,
    step_name TEXT,
    job_type TEXT NOT NULL DEFAULT 'run',
    git_repo TEXT,
    git_commit TEXT,
    git_branch TEXT,
    duration_seconds REAL,
    exit_code INTEGER,
    status TEXT,
    synced_at REAL,
    metadata TEXT,
    telemetry TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_session_step
    ON jobs (session_id, job_type, step_number);

CREATE TABLE IF NOT EXISTS job_io (
    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    artifact_id TEXT NOT NULL REFERENCES artifacts(id) ON DELETE CASCADE,
    direction TEXT NOT NULL CHECK (direction IN ('input', 'output')),
    path TEXT NOT NULL,
    hash TEXT,
    size INTEGER,
    position INTEGER NOT NULL,
    PRIMARY KEY (job_id, direction, position)
);

CREATE INDEX IF NOT EXISTS idx_job_io_artifact ON job_io (artifact_id);

CREATE TABLE IF NOT EXISTS hash_cache (
    path TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    digest TEXT NOT NULL,
    size INTEGER NOT NULL,
    mtime REAL NOT NULL,
    cached_at REAL NOT NULL,
    PRIMARY KEY (path, algorithm)
);

CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at REAL NOT NULL,
    metadata TEXT
);

CREATE TABLE IF NOT EXISTS collection_members (
    collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    artifact_id TEXT REFERENCES artifacts(id) ON DELETE CASCADE,
    child_collection_id INTEGER REFERENCES collections(id) ON DELETE CASCADE,
    PRIMARY KEY (collection_id, position)
);

CREATE VIRTUAL TABLE IF NOT EXISTS jobs_fts USING fts5(
    command,
    script,
    content=jobs,
    content_rowid=id
);

CREATE TRIGGER IF NOT EXISTS jobs_ai AFTER INSERT ON jobs BEGIN
    INSERT INTO jobs_fts(rowid, command, script) VALUES (new.id, new.command, new.script);
END;

CREATE TRIGGER IF NOT EXISTS jobs_ad AFTER DELETE ON jobs BEGIN
    INSERT INTO jobs_fts(jobs_fts, rowid, command, script)
    VALUES ('delete', old.id, old.command, old.script);
END;

CREATE TRIGGER IF NOT EXISTS jobs_au AFTER UPDATE ON jobs BEGIN
    INSERT INTO jobs_fts(jobs_fts, rowid, command, script)
    VALUES ('delete', old.id, old.command, old.script);
    INSERT INTO jobs_fts(rowid, command, script) VALUES (new.id, new.command, new.script);
END;
"#;

/// Open a connection at `path`, set the standard pragmas, and create the
/// schema if it doesn't already exist. `path` of `":memory:"` is accepted
/// for tests.
pub fn open(path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(conn)
}
