use axum::http::HeaderMap;
use sqlx::PgConnection;

use crate::web::{
    auth::{self, AuthUser},
    guard::{self, Access},
    responses::ApiResult,
};

pub async fn require_superuser(
    conn: &mut PgConnection,
    headers: &HeaderMap,
) -> ApiResult<AuthUser> {
    let caller = auth::require_user(conn, headers).await?;
    guard::require(&caller, Access::Superuser)?;
    Ok(caller)
}
