use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::{error, info};
use uuid::Uuid;

use crate::web::{
    ApiMessage, AppState, data, json_error,
    responses::{ApiResult, internal_error},
};

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct DbUserAuth {
    pub id: Uuid,
    pub password_hash: String,
    pub is_active: bool,
}

/// Identity of the caller resolved from the session cookie.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub is_superuser: bool,
}

impl AuthUser {
    pub fn is_self(&self, target: Uuid) -> bool {
        self.id == target
    }

    pub fn is_superuser(&self) -> bool {
        self.is_superuser
    }
}

pub const SESSION_COOKIE: &str = "auth_token";
pub const SESSION_TTL_DAYS: i64 = 7;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

pub struct JsonAuthError {
    pub status: StatusCode,
    pub message: &'static str,
}

impl JsonAuthError {
    fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Not authenticated",
        }
    }
}

pub async fn process_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<TokenResponse>)> {
    let email = normalize_email(&body.email);
    let mut tx = data::begin(state.pool_ref()).await?;

    let user = fetch_user_by_email(&mut tx, &email)
        .await
        .map_err(|err| internal_error(err.into()))?
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&body.password, &user.password_hash) {
        return Err(invalid_credentials());
    }
    if !user.is_active {
        return Err(json_error(StatusCode::BAD_REQUEST, "Inactive user"));
    }

    let session_token = Uuid::new_v4();
    let expires_at = Utc::now() + ChronoDuration::days(SESSION_TTL_DAYS);

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(session_token)
        .bind(user.id)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            error!(?err, user_id = %user.id, "failed to create session");
            internal_error(err.into())
        })?;

    data::commit(tx).await?;
    info!(user_id = %user.id, "user logged in");

    let mut cookie = Cookie::new(SESSION_COOKIE, session_token.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));

    let jar = jar.add(cookie);
    Ok((
        jar,
        Json(TokenResponse {
            access_token: session_token.to_string(),
            token_type: "bearer",
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Json<ApiMessage>) {
    let mut jar = jar;

    if let Some(token) = session_token(&headers) {
        if let Err(err) = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(token)
            .execute(state.pool_ref())
            .await
        {
            error!(?err, "failed to remove session during logout");
        }
    }

    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));
    jar = jar.remove(removal);

    (jar, Json(ApiMessage::new("Logged out")))
}

/// Resolves the caller inside the request's unit of work.
///
/// The session token is taken from an `Authorization: Bearer` header when one
/// is present, otherwise from the `auth_token` cookie.
pub async fn current_user_or_json_error(
    conn: &mut PgConnection,
    headers: &HeaderMap,
) -> Result<AuthUser, JsonAuthError> {
    let token = session_token(headers).ok_or_else(JsonAuthError::unauthenticated)?;

    match fetch_user_by_session(conn, token).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(JsonAuthError::unauthenticated()),
        Err(err) => {
            error!(?err, "failed to validate session");
            Err(JsonAuthError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Internal server error",
            })
        }
    }
}

/// Same as [`current_user_or_json_error`] but already shaped for handlers.
pub async fn require_user(conn: &mut PgConnection, headers: &HeaderMap) -> ApiResult<AuthUser> {
    current_user_or_json_error(conn, headers)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))
}

fn session_token(headers: &HeaderMap) -> Option<Uuid> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<Uuid> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?;
    Uuid::parse_str(token.trim()).ok()
}

fn cookie_token(headers: &HeaderMap) -> Option<Uuid> {
    let jar = CookieJar::from_headers(headers);
    let cookie = jar.get(SESSION_COOKIE)?;
    Uuid::parse_str(cookie.value()).ok()
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = PasswordHash::new(password_hash);
    match parsed {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// Emails are stored and compared trimmed and lower-cased.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

pub async fn fetch_user_by_email(
    conn: &mut PgConnection,
    email: &str,
) -> sqlx::Result<Option<DbUserAuth>> {
    sqlx::query_as::<_, DbUserAuth>(
        "SELECT id, password_hash, is_active FROM users WHERE LOWER(email) = LOWER($1)",
    )
    .bind(email)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn fetch_user_by_session(
    conn: &mut PgConnection,
    token: Uuid,
) -> sqlx::Result<Option<AuthUser>> {
    sqlx::query_as::<_, AuthUser>(
        "SELECT users.id, users.email, users.is_superuser FROM sessions JOIN users ON users.id = sessions.user_id WHERE sessions.id = $1 AND sessions.expires_at > NOW() AND users.is_active = TRUE",
    )
    .bind(token)
    .fetch_optional(&mut *conn)
    .await
}

fn invalid_credentials() -> (StatusCode, Json<ApiMessage>) {
    json_error(StatusCode::BAD_REQUEST, "Incorrect email or password")
}
