use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, patch},
};
use serde::Deserialize;
use tracing::info;

use crate::web::{
    AppState,
    admin::require_superuser,
    auth, data,
    guard::{self, Access},
    models::{PrincipleRow, PrincipleSchema, PrinciplesResponse},
    responses::{ApiResult, internal_error, not_found},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/principles", get(list_principles))
        .route("/principles/:principle_id", patch(update_principle))
}

/// Partial update; only present fields are written.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePrincipleRequest {
    #[serde(default)]
    pub label_name: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub inclusion_criteria: Option<String>,
    #[serde(default)]
    pub exclusion_criteria: Option<String>,
}

impl UpdatePrincipleRequest {
    pub fn apply(self, principle: &mut PrincipleRow) {
        if let Some(name) = self.label_name {
            principle.name = name;
        }
        if let Some(definition) = self.definition {
            principle.definition = definition;
        }
        if let Some(inclusion) = self.inclusion_criteria {
            principle.inclusion_criteria = Some(inclusion);
        }
        if let Some(exclusion) = self.exclusion_criteria {
            principle.exclusion_criteria = Some(exclusion);
        }
    }
}

async fn list_principles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PrinciplesResponse>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let caller = auth::require_user(&mut tx, &headers).await?;
    guard::require(&caller, Access::Authenticated)?;

    let rows = data::fetch_principles(&mut tx)
        .await
        .map_err(|err| internal_error(err.into()))?;
    data::commit(tx).await?;

    Ok(Json(PrinciplesResponse {
        principles: rows.into_iter().map(PrincipleSchema::from).collect(),
    }))
}

async fn update_principle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(principle_id): Path<String>,
    Json(body): Json<UpdatePrincipleRequest>,
) -> ApiResult<Json<PrincipleSchema>> {
    let mut tx = data::begin(state.pool_ref()).await?;
    let admin = require_superuser(&mut tx, &headers).await?;

    let mut principle = data::fetch_principle_for_update(&mut tx, &principle_id)
        .await
        .map_err(|err| internal_error(err.into()))?
        .ok_or_else(|| not_found(format!("Principle with id {principle_id} not found")))?;

    body.apply(&mut principle);

    let principle = data::update_principle(&mut tx, &principle)
        .await
        .map_err(|err| internal_error(err.into()))?;
    data::commit(tx).await?;

    info!(admin = %admin.email, %principle_id, "principle updated");
    Ok(Json(PrincipleSchema::from(principle)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principle() -> PrincipleRow {
        PrincipleRow {
            id: "P7".into(),
            name: "Attribution".into(),
            definition: "Claims credited to a source".into(),
            inclusion_criteria: Some("Named sources".into()),
            exclusion_criteria: None,
        }
    }

    #[test]
    fn definition_only_update_leaves_other_fields() {
        let mut row = principle();
        let request: UpdatePrincipleRequest =
            serde_json::from_str(r#"{"definition": "Claims tied to a named source"}"#).unwrap();

        request.apply(&mut row);

        assert_eq!(row.definition, "Claims tied to a named source");
        assert_eq!(row.name, "Attribution");
        assert_eq!(row.inclusion_criteria.as_deref(), Some("Named sources"));
        assert_eq!(row.exclusion_criteria, None);
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let mut row = principle();
        UpdatePrincipleRequest::default().apply(&mut row);
        assert_eq!(row, principle());
    }

    #[test]
    fn label_name_maps_to_name() {
        let mut row = principle();
        UpdatePrincipleRequest {
            label_name: Some("Sourcing".into()),
            exclusion_criteria: Some("Anonymous claims".into()),
            ..Default::default()
        }
        .apply(&mut row);

        assert_eq!(row.name, "Sourcing");
        assert_eq!(row.exclusion_criteria.as_deref(), Some("Anonymous claims"));
    }
}
