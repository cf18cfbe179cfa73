use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                token       TEXT NOT NULL UNIQUE,
                coins       INTEGER NOT NULL CHECK (coins >= 0),
                last_claim  TEXT
            );

            CREATE TABLE bots (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                name                TEXT NOT NULL,
                webhook_url         TEXT NOT NULL,
                status              TEXT NOT NULL CHECK (status IN ('running', 'stopped')),
                creds_path          TEXT NOT NULL,
                deployed_on         TEXT NOT NULL,
                last_active         TEXT NOT NULL,
                messages_processed  INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_bots_user ON bots(user_id);

            CREATE TABLE transactions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                kind        TEXT NOT NULL,
                amount      INTEGER NOT NULL,
                timestamp   TEXT NOT NULL
            );

            CREATE INDEX idx_transactions_user ON transactions(user_id, timestamp);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                bot_id          TEXT NOT NULL REFERENCES bots(id),
                user_id         TEXT NOT NULL REFERENCES users(id),
                phone_number    TEXT NOT NULL,
                body            TEXT NOT NULL,
                status          TEXT NOT NULL CHECK (status IN ('queued', 'delivered')),
                sent_at         TEXT NOT NULL,
                delivered_at    TEXT
            );

            CREATE INDEX idx_messages_status ON messages(status);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
