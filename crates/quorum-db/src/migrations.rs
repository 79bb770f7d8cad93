use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE units (
                tenant_id             TEXT NOT NULL,
                unit_id               TEXT NOT NULL,
                owner_participant_id  TEXT NOT NULL,
                fraction_ppm          INTEGER NOT NULL CHECK (fraction_ppm >= 0),
                created_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (tenant_id, unit_id)
            );

            CREATE INDEX idx_units_owner ON units(tenant_id, owner_participant_id);

            CREATE TABLE sessions (
                id               TEXT PRIMARY KEY,
                tenant_id        TEXT NOT NULL,
                title            TEXT NOT NULL,
                description      TEXT NOT NULL DEFAULT '',
                scheduled_start  TEXT NOT NULL,
                scheduled_end    TEXT NOT NULL,
                status           TEXT NOT NULL CHECK (status IN ('SCHEDULED', 'OPEN', 'CLOSED')),
                privacy          TEXT NOT NULL CHECK (privacy IN ('OPEN', 'SECRET')),
                options_json     TEXT NOT NULL,
                live_stream_ref  TEXT,
                attachment_ref   TEXT,
                created_by       TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                closed_at        TEXT
            );

            CREATE INDEX idx_sessions_tenant ON sessions(tenant_id, scheduled_start);

            -- One ballot per (session, unit): the primary key is the
            -- at-most-once guarantee, enforced by SQLite itself.
            CREATE TABLE ballots (
                session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                unit_id     TEXT NOT NULL,
                option_id   TEXT NOT NULL,
                cast_by     TEXT NOT NULL,
                cast_at     TEXT NOT NULL,
                receipt_id  TEXT NOT NULL UNIQUE,
                PRIMARY KEY (session_id, unit_id)
            );

            CREATE TABLE chat_messages (
                seq                    INTEGER PRIMARY KEY AUTOINCREMENT,
                id                     TEXT NOT NULL UNIQUE,
                session_id             TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                sender_participant_id  TEXT NOT NULL,
                sender_display_name    TEXT NOT NULL,
                content                TEXT NOT NULL,
                sent_at                TEXT NOT NULL
            );

            CREATE INDEX idx_chat_session ON chat_messages(session_id, seq);

            CREATE TABLE minutes (
                session_id    TEXT PRIMARY KEY REFERENCES sessions(id) ON DELETE CASCADE,
                text          TEXT NOT NULL,
                sha256        TEXT NOT NULL,
                generated_at  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
