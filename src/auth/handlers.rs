use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::issue_token;
use crate::db::models::{Role, User, UserSummary};
use crate::db::users::{self, NewUser};
use crate::error::{AppError, AppResult};
use crate::extractors::{Path, Query, ValidatedJson};
use crate::oauth::{OAuthClient, OAuthError, OAuthProfile, Provider, TokenSet};
use crate::state::AppState;
use crate::validation::{not_blank, password_strength};

// -- Request / response types --

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(
        length(min = 8, max = 100, message = "Password must be 8 to 100 characters"),
        custom(function = "password_strength")
    )]
    pub password: String,

    #[validate(
        length(min = 2, max = 50, message = "Nickname must be 2 to 50 characters"),
        custom(function = "not_blank")
    )]
    pub nickname: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct OAuthStartResponse {
    pub auth_url: String,
    pub provider: Provider,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn parse_provider(raw: &str) -> AppResult<Provider> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Unsupported provider: {raw}")))
}

/// The very first account on a fresh install administers it.
fn initial_role(conn: &Connection) -> rusqlite::Result<Role> {
    Ok(if users::admin_exists(conn)? {
        Role::User
    } else {
        Role::Admin
    })
}

fn auth_response(user: &User, state: &AppState) -> AppResult<AuthResponse> {
    let token = issue_token(user.id, user.role, &state.config.auth)?;
    Ok(AuthResponse {
        token,
        user: UserSummary::from(user),
    })
}

// -- Password login --

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = {
        let conn = state.db.get()?;
        users::find_by_email(&conn, req.email.trim())?
    };

    let user = user.ok_or(AppError::Unauthorized)?;
    let hash = user.password_hash.clone().ok_or(AppError::Unauthorized)?;

    if !verify_password(req.password, hash).await? {
        tracing::info!(user_id = user.id, "Rejected login: wrong password");
        return Err(AppError::Unauthorized);
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(auth_response(&user, &state)?))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = req.email.trim().to_string();
    let nickname = req.nickname.trim().to_string();
    let password_hash = hash_password(req.password, state.config.auth.bcrypt_cost).await?;

    let user = {
        let mut conn = state.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if users::email_taken(&tx, &email)? {
            return Err(AppError::Conflict("Email is already registered".into()));
        }
        if users::nickname_taken(&tx, &nickname)? {
            return Err(AppError::Conflict("Nickname is already taken".into()));
        }

        let role = initial_role(&tx)?;
        let user = users::insert(
            &tx,
            &NewUser {
                email: Some(&email),
                password_hash: Some(&password_hash),
                nickname: &nickname,
                profile_image_url: None,
                role,
            },
        )?;
        tx.commit()?;
        user
    };

    tracing::info!(user_id = user.id, role = %user.role, "Registered new user");
    Ok((StatusCode::CREATED, Json(auth_response(&user, &state)?)))
}

// -- OAuth --

/// GET /api/auth/oauth/{provider}: hand the client the provider's consent URL
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> AppResult<Json<OAuthStartResponse>> {
    let provider = parse_provider(&provider)?;

    let csrf_state = if OAuthClient::uses_state(provider) {
        Some(state.oauth_states.lock().await.issue(provider))
    } else {
        None
    };

    let auth_url = state
        .oauth
        .authorization_url(provider, csrf_state.as_deref())?;

    Ok(Json(OAuthStartResponse { auth_url, provider }))
}

/// GET /api/auth/callback/{provider}: finish the code grant and send the
/// browser back to the frontend with a token
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Response> {
    let provider = parse_provider(&provider)?;

    if let Some(error) = query.error {
        return Err(OAuthError::Denied(query.error_description.unwrap_or(error)).into());
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".into()))?;

    if OAuthClient::uses_state(provider) {
        let csrf_state = query.state.as_deref().ok_or(OAuthError::InvalidState)?;
        if !state
            .oauth_states
            .lock()
            .await
            .redeem(csrf_state, provider)
        {
            return Err(OAuthError::InvalidState.into());
        }
    }

    let tokens = state
        .oauth
        .exchange_code(provider, &code, query.state.as_deref())
        .await?;
    let profile = state
        .oauth
        .fetch_profile(provider, &tokens.access_token)
        .await?;

    let user = {
        let mut conn = state.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let user = resolve_oauth_user(&tx, provider, &profile, &tokens)?;
        tx.commit()?;
        user
    };

    if !user.is_active {
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    let token = issue_token(user.id, user.role, &state.config.auth)?;
    let location = frontend_callback_url(state.oauth.frontend_url(), &token, provider)?;

    tracing::info!(user_id = user.id, %provider, "OAuth login");
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// Find the account linked to this provider identity, or create one.
fn resolve_oauth_user(
    conn: &Connection,
    provider: Provider,
    profile: &OAuthProfile,
    tokens: &TokenSet,
) -> AppResult<User> {
    let pid = profile.provider_user_id.as_str();

    if let Some(user) = users::find_by_provider(conn, provider, pid)? {
        users::refresh_provider_tokens(
            conn,
            provider,
            pid,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
        )?;
        return Ok(user);
    }

    // An address already owned by another account is not claimed
    let email = match profile.email.as_deref() {
        Some(email) if !users::email_taken(conn, email)? => Some(email),
        _ => None,
    };
    let nickname = profile.display_nickname(provider);
    let role = initial_role(conn)?;

    let user = users::insert(
        conn,
        &NewUser {
            email,
            password_hash: None,
            nickname: &nickname,
            profile_image_url: None,
            role,
        },
    )?;
    users::link_provider(
        conn,
        user.id,
        provider,
        pid,
        &tokens.access_token,
        tokens.refresh_token.as_deref(),
    )?;

    tracing::info!(user_id = user.id, %provider, "Created account from OAuth profile");
    Ok(user)
}

fn frontend_callback_url(frontend: &str, token: &str, provider: Provider) -> AppResult<String> {
    let base = format!("{}/auth/callback", frontend.trim_end_matches('/'));
    let url = Url::parse_with_params(&base, &[("token", token), ("provider", provider.as_str())])
        .map_err(OAuthError::from)?;
    Ok(url.into())
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

    fn tokens(access: &str) -> TokenSet {
        TokenSet {
            access_token: access.into(),
            refresh_token: Some("refresh".into()),
        }
    }

    fn profile(id: &str, email: Option<&str>) -> OAuthProfile {
        OAuthProfile {
            provider_user_id: id.into(),
            nickname: None,
            email: email.map(String::from),
        }
    }

    #[test]
    fn first_oauth_login_creates_user_and_link() {
        let conn = conn();
        let user = resolve_oauth_user(
            &conn,
            Provider::Kakao,
            &profile("1234567890", Some("k@example.com")),
            &tokens("a1"),
        )
        .unwrap();
        assert_eq!(user.nickname, "kakao_user_12345678");
        assert_eq!(user.email.as_deref(), Some("k@example.com"));
        assert!(user.password_hash.is_none());

        let links: i64 = conn
            .query_row("SELECT COUNT(*) FROM oauth_accounts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(links, 1);
    }

    #[test]
    fn repeat_oauth_login_reuses_user() {
        let conn = conn();
        let first =
            resolve_oauth_user(&conn, Provider::Google, &profile("g1", None), &tokens("a1"))
                .unwrap();
        let second =
            resolve_oauth_user(&conn, Provider::Google, &profile("g1", None), &tokens("a2"))
                .unwrap();
        assert_eq!(first.id, second.id);

        let (users, access): (i64, String) = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM users), access_token FROM oauth_accounts",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(users, 1);
        assert_eq!(access, "a2");
    }

    #[test]
    fn taken_email_is_not_claimed() {
        let conn = conn();
        users::insert(
            &conn,
            &NewUser {
                email: Some("shared@example.com"),
                password_hash: Some("hash"),
                nickname: "owner",
                profile_image_url: None,
                role: Role::User,
            },
        )
        .unwrap();

        let user = resolve_oauth_user(
            &conn,
            Provider::Naver,
            &profile("n1", Some("shared@example.com")),
            &tokens("a1"),
        )
        .unwrap();
        assert!(user.email.is_none());
    }

    #[test]
    fn first_account_is_admin() {
        let conn = conn();
        assert_eq!(initial_role(&conn).unwrap(), Role::Admin);
        resolve_oauth_user(&conn, Provider::Kakao, &profile("1", None), &tokens("a")).unwrap();
        assert_eq!(initial_role(&conn).unwrap(), Role::User);
    }

    #[test]
    fn frontend_url_carries_token_and_provider() {
        let url = frontend_callback_url("http://localhost:3000/", "abc.def", Provider::Naver)
            .unwrap();
        assert_eq!(
            url,
            "http://localhost:3000/auth/callback?token=abc.def&provider=naver"
        );
    }

    #[test]
    fn unknown_provider_is_bad_request() {
        assert!(matches!(
            parse_provider("facebook"),
            Err(AppError::BadRequest(_))
        ));
    }
}
