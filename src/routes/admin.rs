use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::db::categories::{self, CategoryChanges};
use crate::db::models::{Category, PostListItem, PostStatus, Report, ReportStatus, Role, User};
use crate::db::posts::{self, PostFilter};
use crate::db::{reports, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, Path, Query, ValidatedJson};
use crate::state::AppState;
use crate::validation::{not_blank, Pagination};

// --- Request / response types ---

#[derive(Debug, Deserialize)]
pub struct AdminReportsQuery {
    /// A report status, or `all`. Defaults to `pending`.
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessReportRequest {
    pub status: ReportStatus,

    #[validate(length(max = 1000, message = "Note must be at most 1000 characters"))]
    pub admin_note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminUsersQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    pub is_active: Option<bool>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct AdminPostsQuery {
    pub status: Option<PostStatus>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters"),
        custom(function = "not_blank")
    )]
    pub name: String,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCategoryRequest {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters"),
        custom(function = "not_blank")
    )]
    pub name: Option<String>,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,

    pub order: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    #[serde(flatten)]
    pub items: T,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Serialize)]
pub struct Reports {
    pub reports: Vec<Report>,
}

#[derive(Debug, Serialize)]
pub struct Users {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct Posts {
    pub posts: Vec<PostListItem>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/reports", get(list_reports))
        .route("/api/admin/reports/{id}", put(process_report))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/{id}", put(update_user))
        .route("/api/admin/posts", get(list_posts))
        .route("/api/admin/posts/{id}", delete(delete_post))
        .route(
            "/api/admin/categories",
            get(list_categories).post(create_category),
        )
        .route(
            "/api/admin/categories/{id}",
            put(update_category).delete(delete_category),
        )
}

// --- Reports ---

fn parse_status_filter(raw: Option<&str>) -> AppResult<Option<ReportStatus>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Some(ReportStatus::Pending)),
        Some("all") => Ok(None),
        Some(other) => other
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Unknown report status: {other}"))),
    }
}

async fn list_reports(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AdminReportsQuery>,
) -> AppResult<Json<Page<Reports>>> {
    let status = parse_status_filter(query.status.as_deref())?;
    let pagination = Pagination::new(query.page, query.per_page);

    let (reports, total) = {
        let conn = state.db.get()?;
        reports::list(&conn, None, status, pagination.limit(), pagination.offset())?
    };

    Ok(Json(Page {
        items: Reports { reports },
        total,
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

async fn process_report(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<ProcessReportRequest>,
) -> AppResult<Json<Value>> {
    let report = {
        let mut conn = state.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = reports::find(&tx, id)?.ok_or(AppError::NotFound)?;

        // Reopening must not collide with a newer pending report
        if req.status == ReportStatus::Pending && current.status != ReportStatus::Pending {
            if let Some(target) = current.target() {
                if reports::pending_exists(&tx, current.reporter_id, target)? {
                    return Err(AppError::Conflict(
                        "The reporter already has a pending report on this item".into(),
                    ));
                }
            }
        }

        if !reports::process(&tx, id, req.status, req.admin_note.as_deref(), admin.id)? {
            return Err(AppError::NotFound);
        }
        let report = reports::find(&tx, id)?.ok_or(AppError::NotFound)?;
        tx.commit()?;
        report
    };

    tracing::info!(report_id = id, admin = admin.id, status = %req.status, "Report processed");
    Ok(Json(json!({ "message": "Report updated", "report": report })))
}

// --- Users ---

async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AdminUsersQuery>,
) -> AppResult<Json<Page<Users>>> {
    let pagination = Pagination::new(query.page, query.per_page);
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let (users, total) = {
        let conn = state.db.get()?;
        users::list(&conn, search, pagination.limit(), pagination.offset())?
    };

    Ok(Json(Page {
        items: Users { users },
        total,
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<Value>> {
    if id == admin.id && (req.is_active == Some(false) || req.role == Some(Role::User)) {
        return Err(AppError::BadRequest(
            "Admins cannot demote or deactivate themselves".into(),
        ));
    }

    let user = {
        let mut conn = state.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !users::update_moderation(&tx, id, req.is_active, req.role)? {
            return Err(AppError::NotFound);
        }
        let user = users::find_by_id(&tx, id)?.ok_or(AppError::NotFound)?;
        tx.commit()?;
        user
    };

    tracing::info!(
        user_id = id,
        admin = admin.id,
        is_active = user.is_active,
        role = %user.role,
        "User moderated"
    );
    Ok(Json(json!({ "message": "User updated", "user": user })))
}

// --- Posts ---

/// Every post, deleted ones included unless a status is given.
async fn list_posts(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AdminPostsQuery>,
) -> AppResult<Json<Page<Posts>>> {
    let pagination = Pagination::new(query.page, query.per_page);
    let filter = PostFilter {
        status: query.status,
        category_id: None,
        search: query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()),
    };

    let (posts, total) = {
        let conn = state.db.get()?;
        posts::list(&conn, &filter, pagination.limit(), pagination.offset())?
    };

    Ok(Json(Page {
        items: Posts { posts },
        total,
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

async fn delete_post(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    {
        let mut conn = state.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !posts::set_status(&tx, id, PostStatus::Deleted)? {
            return Err(AppError::NotFound);
        }
        tx.commit()?;
    }

    tracing::info!(post_id = id, admin = admin.id, "Post removed by moderator");
    Ok(Json(json!({ "message": "Post deleted" })))
}

// --- Categories ---

async fn list_categories(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let categories: Vec<Category> = categories::list(&conn, false)?;
    Ok(Json(json!({ "categories": categories })))
}

async fn create_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ValidatedJson(req): ValidatedJson<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let name = req.name.trim();

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if categories::name_taken(&tx, name, None)? {
        return Err(AppError::Conflict(format!("Category '{name}' already exists")));
    }
    let category = categories::insert(&tx, name, req.description.as_deref(), req.order)?;
    tx.commit()?;

    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateCategoryRequest>,
) -> AppResult<Json<Category>> {
    let name = req.name.as_deref().map(str::trim);

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if let Some(name) = name {
        if categories::name_taken(&tx, name, Some(id))? {
            return Err(AppError::Conflict(format!("Category '{name}' already exists")));
        }
    }

    let changes = CategoryChanges {
        name,
        description: req.description.as_deref(),
        order: req.order,
        is_active: req.is_active,
    };
    if !categories::update(&tx, id, &changes)? {
        return Err(AppError::NotFound);
    }
    let category = categories::find(&tx, id)?.ok_or(AppError::NotFound)?;
    tx.commit()?;

    Ok(Json(category))
}

async fn delete_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !categories::delete(&tx, id)? {
        return Err(AppError::NotFound);
    }
    tx.commit()?;

    Ok(Json(json!({ "message": "Category deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_status_filter_defaults_to_pending() {
        assert_eq!(parse_status_filter(None).unwrap(), Some(ReportStatus::Pending));
        assert_eq!(parse_status_filter(Some("")).unwrap(), Some(ReportStatus::Pending));
        assert_eq!(parse_status_filter(Some("all")).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("resolved")).unwrap(),
            Some(ReportStatus::Resolved)
        );
        assert!(parse_status_filter(Some("closed")).is_err());
    }
}
