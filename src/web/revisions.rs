use axum::{Json, Router, extract::State, http::HeaderMap, routing::put};
use serde::Deserialize;
use tracing::info;

use crate::web::{
    AppState, auth, data,
    guard::{self, Access},
    models::RevisionRow,
    responses::{ApiResult, bad_request, internal_error, not_found},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/revisions", put(record_revision))
}

#[derive(Debug, Deserialize)]
pub struct RecordRevisionRequest {
    pub comment_id: String,
    pub principle_id: String,
    #[serde(default)]
    pub is_revise_completed: bool,
}

impl RecordRevisionRequest {
    fn validate(&self) -> Result<(), &'static str> {
        if self.comment_id.trim().is_empty() {
            return Err("comment_id must not be empty");
        }
        if self.principle_id.trim().is_empty() {
            return Err("principle_id must not be empty");
        }
        Ok(())
    }
}

/// Stores the caller's review of one sample against one principle.
async fn record_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RecordRevisionRequest>,
) -> ApiResult<Json<RevisionRow>> {
    body.validate().map_err(bad_request)?;

    let mut tx = data::begin(state.pool_ref()).await?;
    let caller = auth::require_user(&mut tx, &headers).await?;
    guard::require(&caller, Access::Authenticated)?;

    let revision = data::upsert_revision(
        &mut tx,
        caller.id,
        &body.comment_id,
        &body.principle_id,
        body.is_revise_completed,
    )
    .await
    .map_err(|err| {
        if data::is_foreign_key_violation(&err) {
            not_found("Sample or principle not found")
        } else {
            internal_error(err.into())
        }
    })?;
    data::commit(tx).await?;

    info!(
        user_id = %caller.id,
        comment_id = %revision.comment_id,
        principle_id = %revision.principle_id,
        completed = revision.is_revise_completed,
        "revision recorded"
    );
    Ok(Json(revision))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_flag_defaults_to_pending() {
        let body: RecordRevisionRequest =
            serde_json::from_str(r#"{"comment_id": "c-1", "principle_id": "P1"}"#).unwrap();
        assert!(!body.is_revise_completed);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn blank_ids_are_rejected() {
        let body = RecordRevisionRequest {
            comment_id: "  ".into(),
            principle_id: "P1".into(),
            is_revise_completed: true,
        };
        assert_eq!(body.validate(), Err("comment_id must not be empty"));
    }
}
