use axum::{Json, Router, extract::State, http::HeaderMap, routing::get};

use crate::web::{
    AppState, auth, data,
    guard::{self, Access},
    models::SamplesResponse,
    responses::{ApiResult, internal_error},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/samples", get(list_samples))
}

// TODO: add skip/limit once sample sets outgrow a single response.
async fn list_samples(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SamplesResponse>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let caller = auth::require_user(&mut tx, &headers).await?;
    guard::require(&caller, Access::Authenticated)?;

    let samples = data::fetch_samples(&mut tx)
        .await
        .map_err(|err| internal_error(err.into()))?;
    data::commit(tx).await?;

    Ok(Json(SamplesResponse { samples }))
}
