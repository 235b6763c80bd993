use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::web::{
    ApiMessage, AppState,
    auth,
    data::{self, NewUser},
    guard::{self, Access},
    models::{NonSuperUsersResponse, UserPublic, UserReviseStats},
    responses::{ApiResult, bad_request, internal_error},
    users::{
        clean_email, clean_full_name, ensure_email_available, load_user, nullable,
        patch_full_name, user_write_error, validate_new_password,
    },
};

use super::auth::require_superuser;

const DEFAULT_PAGE_LIMIT: i64 = 100;
const MAX_PAGE_LIMIT: i64 = 1000;

#[derive(Deserialize)]
pub(crate) struct UserCreate {
    email: String,
    password: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    is_superuser: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Default, Deserialize)]
pub(crate) struct UserUpdate {
    #[serde(default)]
    email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    full_name: Option<Option<String>>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    is_superuser: Option<bool>,
}

#[derive(Default, Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default)]
    skip: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

impl PageQuery {
    /// Returns `(offset, limit)` with out-of-range values pulled back into bounds.
    fn bounds(&self) -> (i64, i64) {
        let skip = self.skip.unwrap_or(0).max(0);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        (skip, limit)
    }
}

pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserCreate>,
) -> ApiResult<(StatusCode, Json<UserPublic>)> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let admin = require_superuser(&mut tx, &headers).await?;

    let email = clean_email(&body.email)?;
    validate_new_password(&body.password).map_err(bad_request)?;
    ensure_email_available(&mut tx, &email, None).await?;

    let password_hash = auth::hash_password(&body.password)
        .map_err(|err| internal_error(anyhow::anyhow!("failed to hash password: {err}")))?;
    let full_name = body.full_name.as_deref().and_then(clean_full_name);

    let user = data::insert_user(
        &mut tx,
        NewUser {
            email: &email,
            password_hash: &password_hash,
            full_name: full_name.as_deref(),
            is_active: body.is_active,
            is_superuser: body.is_superuser,
        },
    )
    .await
    .map_err(user_write_error)?;
    data::commit(tx).await?;

    info!(admin = %admin.email, user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(UserPublic::from(&user))))
}

pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UserUpdate>,
) -> ApiResult<Json<UserPublic>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let admin = require_superuser(&mut tx, &headers).await?;
    let mut user = load_user(&mut tx, user_id).await?;

    if let Some(raw) = body.email.as_deref() {
        let email = clean_email(raw)?;
        ensure_email_available(&mut tx, &email, Some(user_id)).await?;
        user.email = email;
    }
    patch_full_name(&mut user.full_name, body.full_name);
    if let Some(password) = body.password.as_deref() {
        validate_new_password(password).map_err(bad_request)?;
        user.password_hash = auth::hash_password(password)
            .map_err(|err| internal_error(anyhow::anyhow!("failed to hash password: {err}")))?;
    }
    if let Some(is_active) = body.is_active {
        user.is_active = is_active;
    }
    if let Some(is_superuser) = body.is_superuser {
        user.is_superuser = is_superuser;
    }

    let user = data::save_user(&mut tx, &user)
        .await
        .map_err(user_write_error)?;
    data::commit(tx).await?;

    info!(admin = %admin.email, %user_id, "user updated");
    Ok(Json(UserPublic::from(&user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiMessage>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let admin = require_superuser(&mut tx, &headers).await?;
    load_user(&mut tx, user_id).await?;
    guard::require(&admin, Access::DeleteUser(user_id))?;

    data::delete_user(&mut tx, user_id)
        .await
        .map_err(|err| internal_error(err.into()))?;
    data::commit(tx).await?;

    info!(admin = %admin.email, %user_id, "user deleted");
    Ok(Json(ApiMessage::new("User deleted successfully")))
}

pub async fn read_non_superusers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<NonSuperUsersResponse>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    require_superuser(&mut tx, &headers).await?;
    let (skip, limit) = query.bounds();

    let total_comments = data::count_completed_revisions(&mut tx)
        .await
        .map_err(|err| internal_error(err.into()))?;
    let rows = data::fetch_revise_stats(&mut tx, skip, limit)
        .await
        .map_err(|err| internal_error(err.into()))?;
    data::commit(tx).await?;

    Ok(Json(NonSuperUsersResponse {
        total_comments,
        users: rows.into_iter().map(UserReviseStats::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_match_the_listing_contract() {
        assert_eq!(PageQuery::default().bounds(), (0, 100));
    }

    #[test]
    fn page_bounds_are_clamped() {
        let query = PageQuery {
            skip: Some(-5),
            limit: Some(0),
        };
        assert_eq!(query.bounds(), (0, 1));

        let query = PageQuery {
            skip: Some(40),
            limit: Some(50_000),
        };
        assert_eq!(query.bounds(), (40, 1000));
    }

    #[test]
    fn create_defaults_to_active_non_superuser() {
        let body: UserCreate = serde_json::from_str(
            r#"{"email": "r@example.com", "password": "long-enough"}"#,
        )
        .unwrap();
        assert!(body.is_active);
        assert!(!body.is_superuser);
        assert!(body.full_name.is_none());
    }

    #[test]
    fn update_leaves_absent_fields_unset() {
        let body: UserUpdate = serde_json::from_str(r#"{"is_active": false}"#).unwrap();
        assert_eq!(body.is_active, Some(false));
        assert!(body.email.is_none());
        assert!(body.password.is_none());
        assert!(body.is_superuser.is_none());
        assert!(body.full_name.is_none());
    }

    #[test]
    fn update_keeps_explicit_null_full_name() {
        let body: UserUpdate = serde_json::from_str(r#"{"full_name": null}"#).unwrap();
        assert_eq!(body.full_name, Some(None));
    }
}
