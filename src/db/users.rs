use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{Provider, Role, User};

const USER_COLUMNS: &str = "id, email, password_hash, nickname, profile_image_url, role, \
     is_active, created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        nickname: row.get(3)?,
        profile_image_url: row.get(4)?,
        role: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub struct NewUser<'a> {
    pub email: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub nickname: &'a str,
    pub profile_image_url: Option<&'a str>,
    pub role: Role,
}

pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        map_user,
    )
    .optional()
}

pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        params![email],
        map_user,
    )
    .optional()
}

pub fn email_taken(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![email],
        |r| r.get(0),
    )
}

pub fn nickname_taken(conn: &Connection, nickname: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE nickname = ?1",
        params![nickname],
        |r| r.get(0),
    )
}

pub fn admin_exists(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE role = 'admin'",
        [],
        |r| r.get(0),
    )
}

pub fn insert(conn: &Connection, user: &NewUser<'_>) -> rusqlite::Result<User> {
    conn.execute(
        "INSERT INTO users (email, password_hash, nickname, profile_image_url, role)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.email,
            user.password_hash,
            user.nickname,
            user.profile_image_url,
            user.role
        ],
    )?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Admin listing with optional substring search over email and nickname.
pub fn list(
    conn: &Connection,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<(Vec<User>, i64)> {
    const FILTER: &str =
        "(?1 IS NULL OR instr(COALESCE(email, ''), ?1) > 0 OR instr(nickname, ?1) > 0)";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users WHERE {FILTER}"),
        params![search],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {FILTER}
         ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let users = stmt
        .query_map(params![search, limit, offset], map_user)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok((users, total))
}

/// Applies the moderator-editable fields; returns false when no such user.
pub fn update_moderation(
    conn: &Connection,
    id: i64,
    is_active: Option<bool>,
    role: Option<Role>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET
            is_active = COALESCE(?2, is_active),
            role = COALESCE(?3, role),
            updated_at = datetime('now')
         WHERE id = ?1",
        params![id, is_active, role],
    )?;
    Ok(changed > 0)
}

// --- Linked provider accounts ---

pub fn find_by_provider(
    conn: &Connection,
    provider: Provider,
    provider_user_id: &str,
) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM users u
             JOIN oauth_accounts a ON a.user_id = u.id
             WHERE a.provider = ?1 AND a.provider_user_id = ?2",
            prefixed_columns("u")
        ),
        params![provider, provider_user_id],
        map_user,
    )
    .optional()
}

pub fn link_provider(
    conn: &Connection,
    user_id: i64,
    provider: Provider,
    provider_user_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO oauth_accounts (user_id, provider, provider_user_id, access_token, refresh_token)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, provider, provider_user_id, access_token, refresh_token],
    )?;
    Ok(())
}

pub fn refresh_provider_tokens(
    conn: &Connection,
    provider: Provider,
    provider_user_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE oauth_accounts SET
            access_token = ?3,
            refresh_token = COALESCE(?4, refresh_token),
            updated_at = datetime('now')
         WHERE provider = ?1 AND provider_user_id = ?2",
        params![provider, provider_user_id, access_token, refresh_token],
    )?;
    Ok(())
}

fn prefixed_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn conn() -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        pool.get().unwrap()
    }

    fn new_user<'a>(email: Option<&'a str>, nickname: &'a str) -> NewUser<'a> {
        NewUser {
            email,
            password_hash: Some("hash"),
            nickname,
            profile_image_url: None,
            role: Role::User,
        }
    }

    #[test]
    fn insert_and_find_user() {
        let conn = conn();
        let user = insert(&conn, &new_user(Some("a@example.com"), "alice")).unwrap();
        assert_eq!(user.nickname, "alice");
        assert_eq!(user.role, Role::User);
        assert!(user.is_active);

        let found = find_by_email(&conn, "a@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(email_taken(&conn, "a@example.com").unwrap());
        assert!(nickname_taken(&conn, "alice").unwrap());
        assert!(!nickname_taken(&conn, "bob").unwrap());
    }

    #[test]
    fn email_is_unique_but_may_be_null() {
        let conn = conn();
        insert(&conn, &new_user(Some("a@example.com"), "alice")).unwrap();
        assert!(insert(&conn, &new_user(Some("a@example.com"), "alice2")).is_err());
        insert(&conn, &new_user(None, "kakao_user_1")).unwrap();
        insert(&conn, &new_user(None, "kakao_user_2")).unwrap();
    }

    #[test]
    fn list_searches_email_and_nickname() {
        let conn = conn();
        insert(&conn, &new_user(Some("alice@example.com"), "alice")).unwrap();
        insert(&conn, &new_user(Some("bob@example.com"), "bobby")).unwrap();
        insert(&conn, &new_user(None, "carol")).unwrap();

        let (all, total) = list(&conn, None, 20, 0).unwrap();
        assert_eq!((all.len(), total), (3, 3));

        let (hits, total) = list(&conn, Some("bob"), 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(hits[0].nickname, "bobby");

        let (hits, _) = list(&conn, Some("carol"), 20, 0).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn update_moderation_keeps_unset_fields() {
        let conn = conn();
        let user = insert(&conn, &new_user(Some("a@example.com"), "alice")).unwrap();

        assert!(update_moderation(&conn, user.id, Some(false), None).unwrap());
        let after = find_by_id(&conn, user.id).unwrap().unwrap();
        assert!(!after.is_active);
        assert_eq!(after.role, Role::User);

        assert!(update_moderation(&conn, user.id, None, Some(Role::Admin)).unwrap());
        let after = find_by_id(&conn, user.id).unwrap().unwrap();
        assert!(!after.is_active);
        assert_eq!(after.role, Role::Admin);
        assert!(admin_exists(&conn).unwrap());

        assert!(!update_moderation(&conn, 9999, Some(true), None).unwrap());
    }

    #[test]
    fn provider_link_resolves_user_and_refreshes_tokens() {
        let conn = conn();
        let user = insert(&conn, &new_user(None, "naver_user_abc")).unwrap();
        link_provider(&conn, user.id, Provider::Naver, "abc", "t1", Some("r1")).unwrap();

        let found = find_by_provider(&conn, Provider::Naver, "abc").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(find_by_provider(&conn, Provider::Google, "abc")
            .unwrap()
            .is_none());

        refresh_provider_tokens(&conn, Provider::Naver, "abc", "t2", None).unwrap();
        let (access, refresh): (String, String) = conn
            .query_row(
                "SELECT access_token, refresh_token FROM oauth_accounts",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(access, "t2");
        assert_eq!(refresh, "r1");

        assert!(link_provider(&conn, user.id, Provider::Naver, "abc", "t3", None).is_err());
    }
}
