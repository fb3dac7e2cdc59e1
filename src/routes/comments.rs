use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::comment_tree::{build_tree, CommentNode, CommentRow};
use crate::db::models::PostStatus;
use crate::db::posts;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Path, Query, ValidatedJson};
use crate::state::AppState;
use crate::validation::not_blank;

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct ListCommentsQuery {
    pub post_id: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    pub post_id: i64,

    #[validate(
        length(min = 1, max = 1000, message = "Comment must be 1 to 1000 characters"),
        custom(function = "not_blank")
    )]
    pub content: String,

    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(
        length(min = 1, max = 1000, message = "Comment must be 1 to 1000 characters"),
        custom(function = "not_blank")
    )]
    pub content: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/comments", get(list_comments).post(create_comment))
        .route(
            "/api/comments/{id}",
            put(update_comment).delete(delete_comment),
        )
}

// --- Handlers ---

async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<ListCommentsQuery>,
) -> AppResult<Json<Value>> {
    let post_id = query
        .post_id
        .ok_or_else(|| AppError::BadRequest("post_id is required".into()))?;

    let rows = {
        let conn = state.db.get()?;
        require_published_post(&conn, post_id)?;
        query_comment_rows(&conn, post_id)?
    };

    let comments: Vec<CommentNode> = build_tree(rows);
    Ok(Json(json!({ "comments": comments })))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    require_published_post(&tx, req.post_id)?;

    if let Some(parent_id) = req.parent_id {
        let (parent_post, parent_deleted): (i64, bool) = tx
            .query_row(
                "SELECT post_id, is_deleted FROM comments WHERE id = ?1",
                params![parent_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .ok_or(AppError::NotFound)?;
        if parent_post != req.post_id {
            return Err(AppError::BadRequest(
                "Parent comment belongs to a different post".into(),
            ));
        }
        if parent_deleted {
            return Err(AppError::BadRequest(
                "Cannot reply to a deleted comment".into(),
            ));
        }
    }

    tx.execute(
        "INSERT INTO comments (post_id, user_id, parent_id, content) VALUES (?1, ?2, ?3, ?4)",
        params![req.post_id, user.id, req.parent_id, req.content],
    )?;
    let comment_id = tx.last_insert_rowid();
    posts::adjust_comment_count(&tx, req.post_id, 1)?;
    tx.commit()?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": comment_id, "message": "Comment created" })),
    ))
}

async fn update_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateCommentRequest>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    require_owned_comment(&tx, id, &user)?;
    tx.execute(
        "UPDATE comments SET content = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![id, req.content],
    )?;
    tx.commit()?;

    Ok(Json(json!({ "id": id, "message": "Comment updated" })))
}

/// Soft delete: replies stay attached under a tombstone.
async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let post_id = require_owned_comment(&tx, id, &user)?;
    tx.execute(
        "UPDATE comments SET is_deleted = 1, updated_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    posts::adjust_comment_count(&tx, post_id, -1)?;
    tx.commit()?;

    Ok(Json(json!({ "message": "Comment deleted" })))
}

// --- Query helpers ---

fn require_published_post(conn: &Connection, post_id: i64) -> AppResult<()> {
    let status: Option<PostStatus> = conn
        .query_row(
            "SELECT status FROM posts WHERE id = ?1",
            params![post_id],
            |r| r.get(0),
        )
        .optional()?;
    match status {
        Some(PostStatus::Published) => Ok(()),
        _ => Err(AppError::NotFound),
    }
}

/// Live comment owned by `user`; returns its post id.
fn require_owned_comment(conn: &Connection, id: i64, user: &CurrentUser) -> AppResult<i64> {
    let (owner_id, post_id, is_deleted): (i64, i64, bool) = conn
        .query_row(
            "SELECT user_id, post_id, is_deleted FROM comments WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?
        .ok_or(AppError::NotFound)?;

    if is_deleted {
        return Err(AppError::NotFound);
    }
    if owner_id != user.id {
        return Err(AppError::Forbidden("Not the author of this comment".into()));
    }
    Ok(post_id)
}

fn query_comment_rows(conn: &Connection, post_id: i64) -> AppResult<Vec<CommentRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.post_id, c.user_id, u.nickname, c.parent_id, c.content,
                c.is_deleted, c.created_at, c.updated_at
         FROM comments c
         JOIN users u ON u.id = c.user_id
         WHERE c.post_id = ?1
         ORDER BY c.created_at, c.id",
    )?;

    let rows = stmt
        .query_map(params![post_id], |r| {
            Ok(CommentRow {
                id: r.get(0)?,
                post_id: r.get(1)?,
                user_id: r.get(2)?,
                author_nickname: r.get(3)?,
                parent_id: r.get(4)?,
                content: r.get(5)?,
                is_deleted: r.get(6)?,
                created_at: r.get(7)?,
                updated_at: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
