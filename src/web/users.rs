use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Deserializer};
use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;

use crate::web::{
    ApiMessage, AppState, admin,
    auth::{self, AuthUser},
    data,
    guard::{self, Access},
    models::{UserPublic, UserRow},
    responses::{ApiError, ApiResult, bad_request, conflict, internal_error, not_found},
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(admin::create_user))
        .route(
            "/users/me",
            get(read_user_me)
                .patch(update_user_me)
                .delete(delete_user_me),
        )
        .route("/users/me/password", patch(update_password_me))
        .route("/users/non-superusers", get(admin::read_non_superusers))
        .route(
            "/users/:user_id",
            get(read_user_by_id)
                .patch(admin::update_user)
                .delete(admin::delete_user),
        )
        .route("/users/:user_id/get-dataset", get(download_dataset))
}

#[derive(Deserialize)]
pub struct UserUpdateMe {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub full_name: Option<Option<String>>,
}

#[derive(Deserialize)]
pub struct UpdatePassword {
    pub current_password: String,
    pub new_password: String,
}

/// Keeps an explicit `null` apart from an absent field: absent stays `None`,
/// `null` becomes `Some(None)`.
pub(crate) fn nullable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Blank names clear the stored value.
pub fn clean_full_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Applies a `full_name` patch: absent leaves it, `null` or blank clears it.
pub(crate) fn patch_full_name(current: &mut Option<String>, patch: Option<Option<String>>) {
    if let Some(value) = patch {
        *current = value.as_deref().and_then(clean_full_name);
    }
}

/// Validates and normalizes a requested email address.
pub fn clean_email(raw: &str) -> ApiResult<String> {
    let email = auth::normalize_email(raw);
    if !auth::is_plausible_email(&email) {
        return Err(bad_request("Invalid email address"));
    }
    Ok(email)
}

pub fn validate_password_change(
    current_matches: bool,
    current_password: &str,
    new_password: &str,
) -> Result<(), &'static str> {
    if !current_matches {
        return Err("Incorrect password");
    }
    if current_password == new_password {
        return Err("New password cannot be the same as the current one");
    }
    validate_new_password(new_password)
}

pub fn validate_new_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err("Password must be at least 8 characters long");
    }
    Ok(())
}

/// Fails with 409 when `email` already belongs to a user other than `owner`.
pub async fn ensure_email_available(
    conn: &mut PgConnection,
    email: &str,
    owner: Option<Uuid>,
) -> ApiResult<()> {
    let existing = data::find_user_by_email(conn, email)
        .await
        .map_err(|err| internal_error(err.into()))?;

    match existing {
        Some(user) if Some(user.id) != owner => {
            Err(conflict("User with this email already exists"))
        }
        _ => Ok(()),
    }
}

/// Maps a failed user write, turning a lost uniqueness race into 409.
pub fn user_write_error(err: sqlx::Error) -> ApiError {
    if data::is_unique_violation(&err) {
        conflict("User with this email already exists")
    } else {
        internal_error(err.into())
    }
}

pub(crate) async fn load_user(conn: &mut PgConnection, id: Uuid) -> ApiResult<UserRow> {
    data::fetch_user(conn, id)
        .await
        .map_err(|err| internal_error(err.into()))?
        .ok_or_else(|| not_found("The user with this id does not exist in the system"))
}

async fn read_user_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<UserPublic>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let caller = auth::require_user(&mut tx, &headers).await?;
    guard::require(&caller, Access::Authenticated)?;
    let user = load_user(&mut tx, caller.id).await?;
    data::commit(tx).await?;

    Ok(Json(UserPublic::from(&user)))
}

async fn update_user_me(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserUpdateMe>,
) -> ApiResult<Json<UserPublic>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let caller = auth::require_user(&mut tx, &headers).await?;
    guard::require(&caller, Access::Authenticated)?;
    let mut user = load_user(&mut tx, caller.id).await?;

    if let Some(raw) = body.email.as_deref() {
        let email = clean_email(raw)?;
        ensure_email_available(&mut tx, &email, Some(caller.id)).await?;
        user.email = email;
    }
    patch_full_name(&mut user.full_name, body.full_name);

    let user = data::save_user(&mut tx, &user)
        .await
        .map_err(user_write_error)?;
    data::commit(tx).await?;

    Ok(Json(UserPublic::from(&user)))
}

async fn update_password_me(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdatePassword>,
) -> ApiResult<Json<ApiMessage>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let caller = auth::require_user(&mut tx, &headers).await?;
    guard::require(&caller, Access::Authenticated)?;
    let mut user = load_user(&mut tx, caller.id).await?;

    let current_matches = auth::verify_password(&body.current_password, &user.password_hash);
    validate_password_change(current_matches, &body.current_password, &body.new_password)
        .map_err(bad_request)?;

    user.password_hash = auth::hash_password(&body.new_password)
        .map_err(|err| internal_error(anyhow::anyhow!("failed to hash password: {err}")))?;
    data::save_user(&mut tx, &user)
        .await
        .map_err(|err| internal_error(err.into()))?;
    data::commit(tx).await?;

    info!(user_id = %caller.id, "password updated");
    Ok(Json(ApiMessage::new("Password updated successfully")))
}

async fn delete_user_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ApiMessage>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let caller = auth::require_user(&mut tx, &headers).await?;
    guard::require(&caller, Access::DeleteUser(caller.id))?;

    data::delete_user(&mut tx, caller.id)
        .await
        .map_err(|err| internal_error(err.into()))?;
    data::commit(tx).await?;

    info!(user_id = %caller.id, "user deleted own account");
    Ok(Json(ApiMessage::new("User deleted successfully")))
}

async fn read_user_by_id(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserPublic>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let caller = auth::require_user(&mut tx, &headers).await?;
    guard::require(&caller, Access::SelfOrSuperuser(user_id))?;

    let user = load_user(&mut tx, user_id).await?;
    data::commit(tx).await?;

    Ok(Json(UserPublic::from(&user)))
}

async fn download_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Response> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let caller = auth::require_user(&mut tx, &headers).await?;
    guard::require(&caller, Access::SelfOrSuperuser(user_id))?;

    if !caller.is_self(user_id) {
        load_user(&mut tx, user_id).await?;
    }

    let entries = data::fetch_completed_dataset(&mut tx, user_id)
        .await
        .map_err(|err| internal_error(err.into()))?;
    data::commit(tx).await?;

    let body = serde_json::to_string_pretty(&entries).map_err(|err| internal_error(err.into()))?;
    log_export(&caller, user_id, entries.len());

    Ok(dataset_response(user_id, body))
}

fn log_export(caller: &AuthUser, user_id: Uuid, rows: usize) {
    info!(caller_id = %caller.id, %user_id, rows, "exported revision dataset");
}

fn dataset_response(user_id: Uuid, body: String) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        header::HeaderValue::from_str(&format!(
            r#"attachment; filename="dataset_{user_id}.json""#
        ))
        .unwrap_or_else(|_| header::HeaderValue::from_static("attachment")),
    );

    (headers, body).into_response()
}
