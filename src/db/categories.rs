use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::Category;

const CATEGORY_COLUMNS: &str = "id, name, description, sort_order, is_active";

fn map_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        order: row.get(3)?,
        is_active: row.get(4)?,
    })
}

pub fn list(conn: &Connection, active_only: bool) -> rusqlite::Result<Vec<Category>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories
         WHERE (?1 = 0 OR is_active = 1)
         ORDER BY sort_order, id"
    ))?;
    let categories = stmt
        .query_map(params![active_only], map_category)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(categories)
}

pub fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<Category>> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
        params![id],
        map_category,
    )
    .optional()
}

/// True when another category (not `except_id`) already uses `name`.
pub fn name_taken(conn: &Connection, name: &str, except_id: Option<i64>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM categories WHERE name = ?1 AND (?2 IS NULL OR id != ?2)",
        params![name, except_id],
        |r| r.get(0),
    )
}

pub fn insert(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
    order: i64,
) -> rusqlite::Result<Category> {
    conn.execute(
        "INSERT INTO categories (name, description, sort_order) VALUES (?1, ?2, ?3)",
        params![name, description, order],
    )?;
    let id = conn.last_insert_rowid();
    find(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub struct CategoryChanges<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub order: Option<i64>,
    pub is_active: Option<bool>,
}

pub fn update(conn: &Connection, id: i64, changes: &CategoryChanges<'_>) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE categories SET
            name = COALESCE(?2, name),
            description = COALESCE(?3, description),
            sort_order = COALESCE(?4, sort_order),
            is_active = COALESCE(?5, is_active)
         WHERE id = ?1",
        params![
            id,
            changes.name,
            changes.description,
            changes.order,
            changes.is_active
        ],
    )?;
    Ok(changed > 0)
}

/// Posts in the category keep existing with no category.
pub fn delete(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let changed = conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}
