use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS favorites (
            product_id  TEXT PRIMARY KEY,
            favorited   INTEGER NOT NULL DEFAULT 0,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_favorites_flag
            ON favorites(favorited, updated_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
