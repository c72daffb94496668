//! Canonical SQLite schema for bugtrail.
//!
//! - `tickets` keeps the present scalar and single-reference fields
//! - `ticket_blocked_by` and `ticket_labels` model the many-valued relations
//! - `change_records` is the append-only history; each row carries either a
//!   reverse diff (`old_values`) or a `comment`, never both
//! - `store_meta` records the schema version alongside `PRAGMA user_version`

/// Migration v1: core tables.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE CHECK (length(trim(username)) > 0),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS labels (
    label_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    description TEXT NOT NULL DEFAULT '',
    color TEXT NOT NULL DEFAULT '#ffffff'
);

CREATE TABLE IF NOT EXISTS tickets (
    ticket_id INTEGER PRIMARY KEY,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT NOT NULL DEFAULT '',
    authored_by INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
    created_at_us INTEGER NOT NULL,
    is_open INTEGER NOT NULL DEFAULT 1 CHECK (is_open IN (0, 1)),
    is_locked INTEGER NOT NULL DEFAULT 0 CHECK (is_locked IN (0, 1)),
    assignee_id INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
    dupe_of_id INTEGER REFERENCES tickets(ticket_id) ON DELETE SET NULL,
    CHECK (dupe_of_id IS NULL OR dupe_of_id <> ticket_id)
);

CREATE TABLE IF NOT EXISTS ticket_blocked_by (
    ticket_id INTEGER NOT NULL REFERENCES tickets(ticket_id) ON DELETE CASCADE,
    blocker_id INTEGER NOT NULL REFERENCES tickets(ticket_id) ON DELETE CASCADE,
    PRIMARY KEY (ticket_id, blocker_id)
);

CREATE TABLE IF NOT EXISTS ticket_labels (
    ticket_id INTEGER NOT NULL REFERENCES tickets(ticket_id) ON DELETE CASCADE,
    label_id INTEGER NOT NULL REFERENCES labels(label_id) ON DELETE CASCADE,
    PRIMARY KEY (ticket_id, label_id)
);

CREATE TABLE IF NOT EXISTS change_records (
    record_id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticket_id INTEGER NOT NULL REFERENCES tickets(ticket_id) ON DELETE CASCADE,
    authored_by INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
    authored_at_us INTEGER NOT NULL,
    old_values TEXT,
    comment TEXT,
    CHECK ((old_values IS NULL) <> (comment IS NULL))
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes and append-only guards on history.
///
/// `authored_by` stays writable so deleting a user can null it out.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_change_records_ticket_time
    ON change_records(ticket_id, authored_at_us, record_id);

CREATE INDEX IF NOT EXISTS idx_tickets_open_created
    ON tickets(is_open, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_tickets_assignee
    ON tickets(assignee_id);

CREATE INDEX IF NOT EXISTS idx_ticket_blocked_by_blocker
    ON ticket_blocked_by(blocker_id, ticket_id);

CREATE INDEX IF NOT EXISTS idx_ticket_labels_label
    ON ticket_labels(label_id, ticket_id);

CREATE TRIGGER IF NOT EXISTS change_records_no_update
BEFORE UPDATE OF ticket_id, authored_at_us, old_values, comment ON change_records
BEGIN
    SELECT RAISE(ABORT, 'change records are append-only');
END;

CREATE TRIGGER IF NOT EXISTS change_records_no_delete
BEFORE DELETE ON change_records
BEGIN
    SELECT RAISE(ABORT, 'change records are append-only');
END;

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by the history and listing query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_change_records_ticket_time",
    "idx_tickets_open_created",
    "idx_tickets_assignee",
    "idx_ticket_blocked_by_blocker",
    "idx_ticket_labels_label",
];
