/// Schema for the application database.
pub const SCHEMA: &str = r#"
-- One row per cache generation, rowid gives creation order
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses, keyed by generation + method + url
CREATE TABLE IF NOT EXISTS cached_responses (
    generation TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    body_sha256 TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, method, url)
);

CREATE INDEX IF NOT EXISTS idx_cached_responses_key
    ON cached_responses(method, url);

-- Version of the worker that was last installed and activated
CREATE TABLE IF NOT EXISTS worker_registration (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version TEXT NOT NULL,
    registered_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- String key/value store backing the reading ledger
CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
