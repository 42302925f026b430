use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Favorites --

    /// Whether a product is favorited locally. Missing row reads as false.
    pub fn is_favorite(&self, product_id: &str) -> Result<bool> {
        self.with_conn(|conn| query_favorite(conn, product_id))
    }

    pub fn set_favorite(&self, product_id: &str, favorited: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO favorites (product_id, favorited, updated_at)
                 VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(product_id) DO UPDATE
                 SET favorited = ?2, updated_at = datetime('now')",
                rusqlite::params![product_id, favorited as i64],
            )?;
            Ok(())
        })
    }

    /// Currently favorited product ids, most recently updated first.
    pub fn favorite_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT product_id FROM favorites
                 WHERE favorited = 1
                 ORDER BY updated_at DESC",
            )?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// Drop all favorite rows. Used on logout.
    pub fn clear_favorites(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM favorites", [])?;
            Ok(())
        })
    }
}

fn query_favorite(conn: &Connection, product_id: &str) -> Result<bool> {
    let flag: Option<i64> = match conn.query_row(
        "SELECT favorited FROM favorites WHERE product_id = ?1",
        [product_id],
        |row| row.get(0),
    ) {
        Ok(v) => Some(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(flag.unwrap_or(0) != 0)
}

#[cfg(test)]
mod tests {
    use crate::Database;

    #[test]
    fn missing_row_reads_as_not_favorited() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.is_favorite("p1").unwrap());
    }

    #[test]
    fn set_and_flip_favorite() {
        let db = Database::open_in_memory().unwrap();

        db.set_favorite("p1", true).unwrap();
        assert!(db.is_favorite("p1").unwrap());

        db.set_favorite("p1", false).unwrap();
        assert!(!db.is_favorite("p1").unwrap());
    }

    #[test]
    fn favorite_ids_lists_only_favorited() {
        let db = Database::open_in_memory().unwrap();
        db.set_favorite("p1", true).unwrap();
        db.set_favorite("p2", false).unwrap();
        db.set_favorite("p3", true).unwrap();

        let ids = db.favorite_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"p1".to_string()));
        assert!(ids.contains(&"p3".to_string()));
    }

    #[test]
    fn clear_wipes_favorites() {
        let db = Database::open_in_memory().unwrap();
        db.set_favorite("p1", true).unwrap();
        db.clear_favorites().unwrap();
        assert!(!db.is_favorite("p1").unwrap());
        assert!(db.favorite_ids().unwrap().is_empty());
    }
}
