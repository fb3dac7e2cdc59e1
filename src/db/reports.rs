use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{Report, ReportStatus, ReportType, REPORT_COLUMNS};

/// What a report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTarget {
    Post(i64),
    Comment(i64),
}

impl ReportTarget {
    pub fn report_type(&self) -> ReportType {
        match self {
            ReportTarget::Post(_) => ReportType::Post,
            ReportTarget::Comment(_) => ReportType::Comment,
        }
    }

    fn columns(&self) -> (Option<i64>, Option<i64>) {
        match *self {
            ReportTarget::Post(id) => (Some(id), None),
            ReportTarget::Comment(id) => (None, Some(id)),
        }
    }
}

impl Report {
    pub fn target(&self) -> Option<ReportTarget> {
        match self.report_type {
            ReportType::Post => self.post_id.map(ReportTarget::Post),
            ReportType::Comment => self.comment_id.map(ReportTarget::Comment),
        }
    }
}

/// Whether `reporter_id` already has a pending report on this exact target.
pub fn pending_exists(
    conn: &Connection,
    reporter_id: i64,
    target: ReportTarget,
) -> rusqlite::Result<bool> {
    let sql = match target {
        ReportTarget::Post(_) => {
            "SELECT COUNT(*) > 0 FROM reports
             WHERE reporter_id = ?1 AND report_type = 'post' AND post_id = ?2
               AND status = 'pending'"
        }
        ReportTarget::Comment(_) => {
            "SELECT COUNT(*) > 0 FROM reports
             WHERE reporter_id = ?1 AND report_type = 'comment' AND comment_id = ?2
               AND status = 'pending'"
        }
    };
    let id = match target {
        ReportTarget::Post(id) | ReportTarget::Comment(id) => id,
    };
    conn.query_row(sql, params![reporter_id, id], |r| r.get(0))
}

pub fn insert(
    conn: &Connection,
    reporter_id: i64,
    target: ReportTarget,
    reason: &str,
) -> rusqlite::Result<i64> {
    let (post_id, comment_id) = target.columns();
    conn.execute(
        "INSERT INTO reports (reporter_id, report_type, post_id, comment_id, reason)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![reporter_id, target.report_type(), post_id, comment_id, reason],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<Report>> {
    conn.query_row(
        &format!(
            "SELECT {REPORT_COLUMNS} FROM reports r JOIN users u ON u.id = r.reporter_id
             WHERE r.id = ?1"
        ),
        params![id],
        Report::from_row,
    )
    .optional()
}

/// Newest first. `reporter_id` narrows to one user's reports, `status` to one state.
pub fn list(
    conn: &Connection,
    reporter_id: Option<i64>,
    status: Option<ReportStatus>,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<(Vec<Report>, i64)> {
    const WHERE: &str = "WHERE (?1 IS NULL OR r.reporter_id = ?1) AND (?2 IS NULL OR r.status = ?2)";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM reports r {WHERE}"),
        params![reporter_id, status],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports r JOIN users u ON u.id = r.reporter_id
         {WHERE}
         ORDER BY r.created_at DESC, r.id DESC
         LIMIT ?3 OFFSET ?4"
    ))?;
    let reports = stmt
        .query_map(params![reporter_id, status, limit, offset], Report::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok((reports, total))
}

/// Record a moderator decision. Returns false when no such report.
pub fn process(
    conn: &Connection,
    id: i64,
    status: ReportStatus,
    admin_note: Option<&str>,
    processed_by: i64,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE reports SET
            status = ?2,
            admin_note = COALESCE(?3, admin_note),
            processed_by = ?4,
            processed_at = datetime('now')
         WHERE id = ?1",
        params![id, status, admin_note, processed_by],
    )?;
    Ok(changed > 0)
}
