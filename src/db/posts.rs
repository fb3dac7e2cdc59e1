use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{PostImage, PostListItem, PostStatus};

const POST_COLUMNS: &str = "p.id, p.user_id, u.nickname, p.category_id, c.name, p.title, \
     p.content, p.status, p.view_count, p.like_count, p.comment_count, p.created_at, p.updated_at";

const POST_FROM: &str = "FROM posts p
     JOIN users u ON u.id = p.user_id
     LEFT JOIN categories c ON c.id = p.category_id";

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostListItem> {
    Ok(PostListItem {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_nickname: row.get(2)?,
        category_id: row.get(3)?,
        category_name: row.get(4)?,
        title: row.get(5)?,
        content: row.get(6)?,
        status: row.get(7)?,
        view_count: row.get(8)?,
        like_count: row.get(9)?,
        comment_count: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Filters for a post listing. `status: None` matches every status.
#[derive(Debug, Default, Clone)]
pub struct PostFilter<'a> {
    pub status: Option<PostStatus>,
    pub category_id: Option<i64>,
    pub search: Option<&'a str>,
}

/// Newest first, with the total match count.
pub fn list(
    conn: &Connection,
    filter: &PostFilter<'_>,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<(Vec<PostListItem>, i64)> {
    const WHERE: &str = "WHERE (?1 IS NULL OR p.status = ?1)
       AND (?2 IS NULL OR p.category_id = ?2)
       AND (?3 IS NULL OR instr(p.title, ?3) > 0 OR instr(p.content, ?3) > 0)";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {POST_FROM} {WHERE}"),
        params![filter.status, filter.category_id, filter.search],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS} {POST_FROM} {WHERE}
         ORDER BY p.created_at DESC, p.id DESC
         LIMIT ?4 OFFSET ?5"
    ))?;
    let posts = stmt
        .query_map(
            params![filter.status, filter.category_id, filter.search, limit, offset],
            map_post,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok((posts, total))
}

pub fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<PostListItem>> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} {POST_FROM} WHERE p.id = ?1"),
        params![id],
        map_post,
    )
    .optional()
}

pub fn images(conn: &Connection, post_id: i64) -> rusqlite::Result<Vec<PostImage>> {
    let mut stmt = conn.prepare(
        "SELECT id, image_url, position FROM post_images
         WHERE post_id = ?1 ORDER BY position, id",
    )?;
    let images = stmt
        .query_map(params![post_id], |r| {
            Ok(PostImage {
                id: r.get(0)?,
                image_url: r.get(1)?,
                order: r.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(images)
}

/// Replace a post's images with `urls`, in order.
pub fn replace_images(conn: &Connection, post_id: i64, urls: &[String]) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM post_images WHERE post_id = ?1", params![post_id])?;
    let mut stmt =
        conn.prepare("INSERT INTO post_images (post_id, image_url, position) VALUES (?1, ?2, ?3)")?;
    for (position, url) in urls.iter().enumerate() {
        stmt.execute(params![post_id, url, position as i64])?;
    }
    Ok(())
}

/// Shift `comment_count` by `delta`, never below zero.
pub fn adjust_comment_count(conn: &Connection, post_id: i64, delta: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE posts SET comment_count = MAX(comment_count + ?2, 0) WHERE id = ?1",
        params![post_id, delta],
    )?;
    Ok(())
}

pub fn set_status(conn: &Connection, id: i64, status: PostStatus) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE posts SET status = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![id, status],
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn conn() -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, email, nickname) VALUES (1, 'a@example.com', 'alice');
             INSERT INTO categories (id, name) VALUES (1, 'free'), (2, 'qna');",
        )
        .unwrap();
        conn
    }

    fn insert_post(conn: &Connection, title: &str, category: Option<i64>, status: &str) -> i64 {
        conn.execute(
            "INSERT INTO posts (user_id, category_id, title, content, status)
             VALUES (1, ?1, ?2, 'body text', ?3)",
            params![category, title, status],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn list_filters_by_status_category_and_search() {
        let conn = conn();
        insert_post(&conn, "rust tips", Some(1), "published");
        insert_post(&conn, "sqlite question", Some(2), "published");
        insert_post(&conn, "rust draft", Some(1), "draft");
        insert_post(&conn, "gone", None, "deleted");

        let published = PostFilter {
            status: Some(PostStatus::Published),
            ..PostFilter::default()
        };
        let (posts, total) = list(&conn, &published, 20, 0).unwrap();
        assert_eq!(total, 2);
        // newest first
        assert_eq!(posts[0].title, "sqlite question");

        let (posts, _) = list(
            &conn,
            &PostFilter {
                category_id: Some(1),
                ..published.clone()
            },
            20,
            0,
        )
        .unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].category_name.as_deref(), Some("free"));

        let (posts, total) = list(
            &conn,
            &PostFilter {
                search: Some("rust"),
                ..PostFilter::default()
            },
            20,
            0,
        )
        .unwrap();
        assert_eq!(total, 2);
        assert_eq!(posts.len(), 2);

        let (_, total) = list(&conn, &PostFilter::default(), 20, 0).unwrap();
        assert_eq!(total, 4);
    }

    #[test]
    fn list_paginates() {
        let conn = conn();
        for i in 0..5 {
            insert_post(&conn, &format!("post {i}"), None, "published");
        }
        let (page, total) = list(&conn, &PostFilter::default(), 2, 4).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "post 0");
    }

    #[test]
    fn images_are_replaced_in_order() {
        let conn = conn();
        let id = insert_post(&conn, "pics", None, "published");
        replace_images(&conn, id, &["a.png".into(), "b.png".into()]).unwrap();
        replace_images(&conn, id, &["c.png".into(), "d.png".into(), "e.png".into()]).unwrap();

        let urls: Vec<String> = images(&conn, id)
            .unwrap()
            .into_iter()
            .map(|i| i.image_url)
            .collect();
        assert_eq!(urls, vec!["c.png", "d.png", "e.png"]);
    }

    #[test]
    fn comment_count_never_goes_negative() {
        let conn = conn();
        let id = insert_post(&conn, "t", None, "published");
        adjust_comment_count(&conn, id, 1).unwrap();
        adjust_comment_count(&conn, id, -1).unwrap();
        adjust_comment_count(&conn, id, -1).unwrap();
        assert_eq!(find(&conn, id).unwrap().unwrap().comment_count, 0);
    }

    #[test]
    fn deleting_category_keeps_posts() {
        let conn = conn();
        let id = insert_post(&conn, "t", Some(2), "published");
        conn.execute("DELETE FROM categories WHERE id = 2", []).unwrap();
        let post = find(&conn, id).unwrap().unwrap();
        assert_eq!(post.category_id, None);
    }
}
