//! Artifact repository: reads and writes for the `item_artifacts` table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw row from `item_artifacts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRow {
    pub city_id: String,
    pub item_id: String,
    pub item_text: Option<String>,
    pub image: Option<String>,
    pub updated_at: String,
}

impl ArtifactRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            city_id: row.get("city_id")?,
            item_id: row.get("item_id")?,
            item_text: row.get("item_text")?,
            image: row.get("image")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Finds the row for one item.
pub fn find(
    db: &Database,
    city_id: &str,
    item_id: &str,
) -> Result<Option<ArtifactRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM item_artifacts WHERE city_id = ?1 AND item_id = ?2",
                params![city_id, item_id],
                ArtifactRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns the stored artifact reference for one item, if any.
pub fn read_image(
    db: &Database,
    city_id: &str,
    item_id: &str,
) -> Result<Option<String>, DatabaseError> {
    Ok(find(db, city_id, item_id)?.and_then(|row| row.image))
}

/// Sets the artifact reference for an item, creating the row if needed.
/// Returns the number of rows touched.
pub fn upsert_image(
    db: &Database,
    city_id: &str,
    item_id: &str,
    image: &str,
) -> Result<usize, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO item_artifacts (city_id, item_id, image, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(city_id, item_id) DO UPDATE SET image = excluded.image,
             updated_at = excluded.updated_at",
            params![city_id, item_id, image, now],
        )?;
        Ok(changed)
    })
}

/// Records the text of an item so batch runs can enumerate a city's items.
pub fn upsert_item_text(
    db: &Database,
    city_id: &str,
    item_id: &str,
    item_text: &str,
) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO item_artifacts (city_id, item_id, item_text, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(city_id, item_id) DO UPDATE SET item_text = excluded.item_text,
             updated_at = excluded.updated_at",
            params![city_id, item_id, item_text, now],
        )?;
        Ok(())
    })
}

/// Lists every row for a city, ordered by item id.
pub fn list_by_city(db: &Database, city_id: &str) -> Result<Vec<ArtifactRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM item_artifacts WHERE city_id = ?1 ORDER BY item_id")?;
        let rows = stmt
            .query_map(params![city_id], ArtifactRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_item() {
        let db = Database::open_in_memory().unwrap();
        assert!(find(&db, "paris", "louvre").unwrap().is_none());
        assert!(read_image(&db, "paris", "louvre").unwrap().is_none());
    }

    #[test]
    fn test_upsert_image_creates_and_updates() {
        let db = Database::open_in_memory().unwrap();

        upsert_image(&db, "paris", "louvre", "/images/a.png").unwrap();
        assert_eq!(
            read_image(&db, "paris", "louvre").unwrap().as_deref(),
            Some("/images/a.png")
        );

        upsert_image(&db, "paris", "louvre", "/images/b.png").unwrap();
        assert_eq!(
            read_image(&db, "paris", "louvre").unwrap().as_deref(),
            Some("/images/b.png")
        );
    }

    #[test]
    fn test_item_text_and_image_are_independent() {
        let db = Database::open_in_memory().unwrap();

        upsert_item_text(&db, "paris", "louvre", "Visit the Louvre").unwrap();
        upsert_image(&db, "paris", "louvre", "/images/a.png").unwrap();
        upsert_item_text(&db, "paris", "louvre", "See the Mona Lisa").unwrap();

        let row = find(&db, "paris", "louvre").unwrap().unwrap();
        assert_eq!(row.item_text.as_deref(), Some("See the Mona Lisa"));
        assert_eq!(row.image.as_deref(), Some("/images/a.png"));
    }

    #[test]
    fn test_list_by_city_is_scoped_and_ordered() {
        let db = Database::open_in_memory().unwrap();
        upsert_item_text(&db, "paris", "b", "B").unwrap();
        upsert_item_text(&db, "paris", "a", "A").unwrap();
        upsert_item_text(&db, "rome", "c", "C").unwrap();

        let rows = list_by_city(&db, "paris").unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
