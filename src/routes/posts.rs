use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::db::categories;
use crate::db::models::{PostImage, PostListItem, PostStatus};
use crate::db::posts::{self, PostFilter};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Path, Query, ValidatedJson};
use crate::state::AppState;
use crate::validation::{not_blank, preview, Pagination};

const PREVIEW_CHARS: usize = 200;

// --- Request / response types ---

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub category_id: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostListItem>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostListItem,
    pub images: Vec<PostImage>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(
        length(min = 1, max = 500, message = "Title must be 1 to 500 characters"),
        custom(function = "not_blank")
    )]
    pub title: String,

    #[validate(
        length(min = 1, message = "Content is required"),
        custom(function = "not_blank")
    )]
    pub content: String,

    pub category_id: Option<i64>,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 images per post"))]
    pub images: Vec<String>,

    pub status: Option<PostStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(
        length(min = 1, max = 500, message = "Title must be 1 to 500 characters"),
        custom(function = "not_blank")
    )]
    pub title: Option<String>,

    #[validate(
        length(min = 1, message = "Content is required"),
        custom(function = "not_blank")
    )]
    pub content: Option<String>,

    /// Absent keeps the category, `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub category_id: Option<Option<i64>>,

    #[validate(length(max = 20, message = "At most 20 images per post"))]
    pub images: Option<Vec<String>>,

    pub status: Option<PostStatus>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub message: &'static str,
    pub liked: bool,
    pub like_count: i64,
}

/// Distinguishes an explicit `null` from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route(
            "/api/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/api/posts/{id}/like", post(toggle_like))
}

// --- Handlers ---

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> AppResult<Json<PostPage>> {
    let pagination = Pagination::new(query.page, query.per_page);
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let filter = PostFilter {
        status: Some(PostStatus::Published),
        category_id: query.category_id,
        search,
    };

    let (mut posts, total) = {
        let conn = state.db.get()?;
        posts::list(&conn, &filter, pagination.limit(), pagination.offset())?
    };
    for post in &mut posts {
        post.content = preview(&post.content, PREVIEW_CHARS);
    }

    Ok(Json(PostPage {
        posts,
        total,
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

/// Every successful read counts as a view.
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PostDetail>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let changed = tx.execute(
        "UPDATE posts SET view_count = view_count + 1 WHERE id = ?1 AND status = 'published'",
        params![id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }

    let post = posts::find(&tx, id)?.ok_or(AppError::NotFound)?;
    let images = posts::images(&tx, id)?;
    tx.commit()?;

    Ok(Json(PostDetail { post, images }))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let status = req.status.unwrap_or(PostStatus::Published);
    if status == PostStatus::Deleted {
        return Err(AppError::BadRequest(
            "Status must be published or draft".into(),
        ));
    }

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(category_id) = req.category_id {
        ensure_category(&tx, category_id)?;
    }

    tx.execute(
        "INSERT INTO posts (user_id, category_id, title, content, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            req.category_id,
            req.title.trim(),
            req.content,
            status
        ],
    )?;
    let post_id = tx.last_insert_rowid();
    posts::replace_images(&tx, post_id, &req.images)?;
    tx.commit()?;

    tracing::info!(post_id, user_id = user.id, "Post created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": post_id, "message": "Post created" })),
    ))
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdatePostRequest>,
) -> AppResult<Json<Value>> {
    if req.status == Some(PostStatus::Deleted) {
        return Err(AppError::BadRequest(
            "Status must be published or draft".into(),
        ));
    }

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    require_owned_post(&tx, id, &user)?;
    if let Some(Some(category_id)) = req.category_id {
        ensure_category(&tx, category_id)?;
    }

    tx.execute(
        "UPDATE posts SET
            title = COALESCE(?2, title),
            content = COALESCE(?3, content),
            category_id = CASE WHEN ?6 THEN ?4 ELSE category_id END,
            status = COALESCE(?5, status),
            updated_at = datetime('now')
         WHERE id = ?1",
        params![
            id,
            req.title.as_deref().map(str::trim),
            req.content,
            req.category_id.flatten(),
            req.status,
            req.category_id.is_some()
        ],
    )?;
    if let Some(images) = &req.images {
        posts::replace_images(&tx, id, images)?;
    }
    tx.commit()?;

    Ok(Json(json!({ "id": id, "message": "Post updated" })))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    require_owned_post(&tx, id, &user)?;
    posts::set_status(&tx, id, PostStatus::Deleted)?;
    tx.commit()?;

    tracing::info!(post_id = id, user_id = user.id, "Post deleted");
    Ok(Json(json!({ "message": "Post deleted" })))
}

/// Like on first call, unlike on the next.
async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<LikeResponse>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let published: bool = tx
        .query_row(
            "SELECT status = 'published' FROM posts WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?
        .unwrap_or(false);
    if !published {
        return Err(AppError::NotFound);
    }

    let removed = tx.execute(
        "DELETE FROM post_likes WHERE user_id = ?1 AND post_id = ?2",
        params![user.id, id],
    )?;
    let liked = removed == 0;

    if liked {
        tx.execute(
            "INSERT INTO post_likes (user_id, post_id) VALUES (?1, ?2)",
            params![user.id, id],
        )?;
        tx.execute(
            "UPDATE posts SET like_count = like_count + 1 WHERE id = ?1",
            params![id],
        )?;
    } else {
        tx.execute(
            "UPDATE posts SET like_count = MAX(like_count - 1, 0) WHERE id = ?1",
            params![id],
        )?;
    }

    let like_count: i64 = tx.query_row(
        "SELECT like_count FROM posts WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    tx.commit()?;

    Ok(Json(LikeResponse {
        message: if liked { "Post liked" } else { "Like removed" },
        liked,
        like_count,
    }))
}

// --- Query helpers ---

/// The post must exist, not be deleted, and belong to `user`.
fn require_owned_post(conn: &Connection, id: i64, user: &CurrentUser) -> AppResult<()> {
    let (owner_id, status): (i64, PostStatus) = conn
        .query_row(
            "SELECT user_id, status FROM posts WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
        .ok_or(AppError::NotFound)?;

    if status == PostStatus::Deleted {
        return Err(AppError::NotFound);
    }
    if owner_id != user.id {
        return Err(AppError::Forbidden("Not the author of this post".into()));
    }
    Ok(())
}

fn ensure_category(conn: &Connection, category_id: i64) -> AppResult<()> {
    match categories::find(conn, category_id)? {
        Some(category) if category.is_active => Ok(()),
        _ => Err(AppError::BadRequest(format!(
            "Unknown category: {category_id}"
        ))),
    }
}
