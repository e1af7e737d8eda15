pub const SCHEMA: &str = r#"
-- file_info: one row per collected file
CREATE TABLE IF NOT EXISTS file_info (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    size INTEGER,
    hash TEXT,
    created_at TEXT,
    modified_at TEXT,
    file_type TEXT,
    captured_at TEXT,
    save_to TEXT,
    UNIQUE (save_to, name),
    UNIQUE (size, hash, captured_at)
);

CREATE INDEX IF NOT EXISTS idx_file_info_hash ON file_info(hash);
"#;
