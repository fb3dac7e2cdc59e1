use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::db::models::{Report, ReportStatus, ReportType};
use crate::db::reports::{self, ReportTarget};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Query, ValidatedJson};
use crate::state::AppState;
use crate::validation::{not_blank, Pagination};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportRequest {
    pub report_type: ReportType,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,

    #[validate(
        length(min = 10, max = 500, message = "Reason must be 10 to 500 characters"),
        custom(function = "not_blank")
    )]
    pub reason: String,
}

impl CreateReportRequest {
    fn target(&self) -> AppResult<ReportTarget> {
        match (self.report_type, self.post_id, self.comment_id) {
            (ReportType::Post, Some(id), _) => Ok(ReportTarget::Post(id)),
            (ReportType::Comment, _, Some(id)) => Ok(ReportTarget::Comment(id)),
            (ReportType::Post, None, _) => Err(AppError::BadRequest(
                "post_id is required for a post report".into(),
            )),
            (ReportType::Comment, _, None) => Err(AppError::BadRequest(
                "comment_id is required for a comment report".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListReportsQuery {
    pub status: Option<ReportStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReportPage {
    pub reports: Vec<Report>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/reports", get(my_reports).post(create_report))
}

/// One pending report per reporter and target; resolved reports do not block.
async fn create_report(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateReportRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let target = req.target()?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !target_exists(&tx, target)? {
        return Err(AppError::NotFound);
    }
    if reports::pending_exists(&tx, user.id, target)? {
        return Err(AppError::Conflict(
            "You already have a pending report on this item".into(),
        ));
    }

    let report_id = reports::insert(&tx, user.id, target, req.reason.trim())?;
    tx.commit()?;

    tracing::info!(report_id, reporter = user.id, ?target, "Report filed");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": report_id, "message": "Report submitted" })),
    ))
}

/// The caller's own reports, newest first.
async fn my_reports(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListReportsQuery>,
) -> AppResult<Json<ReportPage>> {
    let pagination = Pagination::new(query.page, query.per_page);

    let (reports, total) = {
        let conn = state.db.get()?;
        reports::list(
            &conn,
            Some(user.id),
            query.status,
            pagination.limit(),
            pagination.offset(),
        )?
    };

    Ok(Json(ReportPage {
        reports,
        total,
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

/// Reports may only target live content.
fn target_exists(conn: &Connection, target: ReportTarget) -> AppResult<bool> {
    let found = match target {
        ReportTarget::Post(id) => conn
            .query_row(
                "SELECT 1 FROM posts WHERE id = ?1 AND status != 'deleted'",
                params![id],
                |_| Ok(()),
            )
            .optional()?,
        ReportTarget::Comment(id) => conn
            .query_row(
                "SELECT 1 FROM comments WHERE id = ?1 AND is_deleted = 0",
                params![id],
                |_| Ok(()),
            )
            .optional()?,
    };
    Ok(found.is_some())
}
