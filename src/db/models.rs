use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Closed set of lowercase string values stored in a TEXT column.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!("invalid ", stringify!($name), ": {}"),
                        other
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(Role {
    User => "user",
    Admin => "admin",
});

text_enum!(PostStatus {
    Published => "published",
    Draft => "draft",
    Deleted => "deleted",
});

text_enum!(ReportType {
    Post => "post",
    Comment => "comment",
});

text_enum!(ReportStatus {
    Pending => "pending",
    Processing => "processing",
    Resolved => "resolved",
    Rejected => "rejected",
});

text_enum!(
    /// Third-party identity provider.
    Provider {
        Kakao => "kakao",
        Naver => "naver",
        Google => "google",
    }
);

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub nickname: String,
    pub profile_image_url: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Public projection returned alongside a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: Option<String>,
    pub nickname: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub order: i64,
    pub is_active: bool,
}

/// Row shape shared by the public and admin post listings.
#[derive(Debug, Clone, Serialize)]
pub struct PostListItem {
    pub id: i64,
    pub user_id: i64,
    pub author_nickname: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostImage {
    pub id: i64,
    pub image_url: String,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: i64,
    pub reporter_id: i64,
    pub reporter_nickname: String,
    pub report_type: ReportType,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub reason: String,
    pub status: ReportStatus,
    pub admin_note: Option<String>,
    pub processed_by: Option<i64>,
    pub processed_at: Option<String>,
    pub created_at: String,
}

pub const REPORT_COLUMNS: &str = "r.id, r.reporter_id, u.nickname, r.report_type, r.post_id, \
     r.comment_id, r.reason, r.status, r.admin_note, r.processed_by, r.processed_at, r.created_at";

impl Report {
    /// Maps a row selected with [`REPORT_COLUMNS`] from `reports r JOIN users u`.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            reporter_id: row.get(1)?,
            reporter_nickname: row.get(2)?,
            report_type: row.get(3)?,
            post_id: row.get(4)?,
            comment_id: row.get(5)?,
            reason: row.get(6)?,
            status: row.get(7)?,
            admin_note: row.get(8)?,
            processed_by: row.get(9)?,
            processed_at: row.get(10)?,
            created_at: row.get(11)?,
        })
    }
}
