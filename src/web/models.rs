use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
}

/// Profile fields safe to return to clients.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct UserPublic {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl From<&UserRow> for UserPublic {
    fn from(row: &UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email.clone(),
            full_name: row.full_name.clone(),
            is_active: row.is_active,
            is_superuser: row.is_superuser,
        }
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct UserReviseStatsRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub revised_count: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct UserReviseStats {
    #[serde(flatten)]
    pub profile: UserPublic,
    pub revised_count: i64,
}

impl From<UserReviseStatsRow> for UserReviseStats {
    fn from(row: UserReviseStatsRow) -> Self {
        Self {
            profile: UserPublic {
                id: row.id,
                email: row.email,
                full_name: row.full_name,
                is_active: row.is_active,
                is_superuser: row.is_superuser,
            },
            revised_count: row.revised_count,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NonSuperUsersResponse {
    pub total_comments: i64,
    pub users: Vec<UserReviseStats>,
}

#[derive(Clone, Debug, FromRow, PartialEq)]
pub struct PrincipleRow {
    pub id: String,
    pub name: String,
    pub definition: String,
    pub inclusion_criteria: Option<String>,
    pub exclusion_criteria: Option<String>,
}

/// Wire shape of a principle; `name` travels as `label_name`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PrincipleSchema {
    pub id: String,
    pub label_name: String,
    pub definition: String,
    pub inclusion_criteria: String,
    pub exclusion_criteria: String,
}

impl From<PrincipleRow> for PrincipleSchema {
    fn from(row: PrincipleRow) -> Self {
        Self {
            id: row.id,
            label_name: row.name,
            definition: row.definition,
            inclusion_criteria: row.inclusion_criteria.unwrap_or_default(),
            exclusion_criteria: row.exclusion_criteria.unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PrinciplesResponse {
    pub principles: Vec<PrincipleSchema>,
}

#[derive(Clone, Debug, FromRow, Serialize, PartialEq)]
pub struct SampleRow {
    pub id: String,
    pub preceding: String,
    pub target: String,
    pub following: String,
    pub a1_score: f64,
    pub a2_score: f64,
    pub a3_score: f64,
    pub principle_id: String,
    pub llm_justification: String,
    pub llm_evidence_quote: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SamplesResponse {
    pub samples: Vec<SampleRow>,
}

#[derive(Clone, Debug, FromRow, Serialize)]
pub struct RevisionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub comment_id: String,
    pub principle_id: String,
    pub is_revise_completed: bool,
    pub updated_at: DateTime<Utc>,
}

/// One line of a user's exported dataset.
#[derive(Clone, Debug, FromRow, Serialize, PartialEq)]
pub struct DatasetEntry {
    pub comment_id: String,
    pub principle_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn revise_stats_flatten_profile_fields() {
        let id = Uuid::new_v4();
        let stats = UserReviseStats::from(UserReviseStatsRow {
            id,
            email: "r@example.com".into(),
            full_name: None,
            is_active: true,
            is_superuser: false,
            revised_count: 4,
        });

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            value,
            json!({
                "id": id,
                "email": "r@example.com",
                "full_name": null,
                "is_active": true,
                "is_superuser": false,
                "revised_count": 4,
            })
        );
    }

    #[test]
    fn principle_schema_renders_missing_criteria_as_empty() {
        let schema = PrincipleSchema::from(PrincipleRow {
            id: "P1".into(),
            name: "Hedging".into(),
            definition: "Softened claims".into(),
            inclusion_criteria: None,
            exclusion_criteria: Some("Direct quotes".into()),
        });

        assert_eq!(schema.label_name, "Hedging");
        assert_eq!(schema.inclusion_criteria, "");
        assert_eq!(schema.exclusion_criteria, "Direct quotes");
    }

    #[test]
    fn user_public_never_carries_the_password_hash() {
        let row = UserRow {
            id: Uuid::new_v4(),
            email: "r@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            full_name: Some("R".into()),
            is_active: true,
            is_superuser: false,
        };
        let body = serde_json::to_string(&UserPublic::from(&row)).unwrap();
        assert!(!body.contains("argon2"));
        assert!(!body.contains("password"));
    }
}
