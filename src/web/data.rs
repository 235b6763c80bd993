use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{
    DatasetEntry, PrincipleRow, RevisionRow, SampleRow, UserReviseStatsRow, UserRow,
};
use super::responses::{ApiResult, internal_error};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const USER_COLUMNS: &str = "id, email, password_hash, full_name, is_active, is_superuser";

/// Opens the unit of work for one request. Dropping it without [`commit`] rolls back.
pub async fn begin(pool: &PgPool) -> ApiResult<Transaction<'static, Postgres>> {
    pool.begin().await.map_err(|err| internal_error(err.into()))
}

pub async fn commit(tx: Transaction<'_, Postgres>) -> ApiResult<()> {
    tx.commit().await.map_err(|err| internal_error(err.into()))
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_error_code(err, UNIQUE_VIOLATION)
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_error_code(err, FOREIGN_KEY_VIOLATION)
}

fn has_error_code(err: &sqlx::Error, code: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(code),
        _ => false,
    }
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: Option<&'a str>,
    pub is_active: bool,
    pub is_superuser: bool,
}

pub async fn fetch_user(conn: &mut PgConnection, id: Uuid) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn find_user_by_email(
    conn: &mut PgConnection,
    email: &str,
) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
    ))
    .bind(email)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn insert_user(conn: &mut PgConnection, user: NewUser<'_>) -> sqlx::Result<UserRow> {
    sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (id, email, password_hash, full_name, is_active, is_superuser)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.full_name)
    .bind(user.is_active)
    .bind(user.is_superuser)
    .fetch_one(&mut *conn)
    .await
}

/// Writes back every mutable column of an already loaded user.
pub async fn save_user(conn: &mut PgConnection, user: &UserRow) -> sqlx::Result<UserRow> {
    sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET email = $2, password_hash = $3, full_name = $4, is_active = $5, is_superuser = $6
         WHERE id = $1
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.full_name.as_deref())
    .bind(user.is_active)
    .bind(user.is_superuser)
    .fetch_one(&mut *conn)
    .await
}

pub async fn delete_user(conn: &mut PgConnection, id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Completed revisions owned by non-superusers.
pub async fn count_completed_revisions(conn: &mut PgConnection) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(r.id)
         FROM user_comment_revisions r
         JOIN users u ON u.id = r.user_id
         WHERE u.is_superuser = FALSE AND r.is_revise_completed = TRUE",
    )
    .fetch_one(&mut *conn)
    .await
}

/// One row per non-superuser with their completed revision count, zero included.
pub async fn fetch_revise_stats(
    conn: &mut PgConnection,
    skip: i64,
    limit: i64,
) -> sqlx::Result<Vec<UserReviseStatsRow>> {
    sqlx::query_as::<_, UserReviseStatsRow>(
        "SELECT u.id, u.email, u.full_name, u.is_active, u.is_superuser, COUNT(r.id) AS revised_count
         FROM users u
         LEFT JOIN user_comment_revisions r
           ON r.user_id = u.id AND r.is_revise_completed = TRUE
         WHERE u.is_superuser = FALSE
         GROUP BY u.id
         ORDER BY u.created_at, u.id
         OFFSET $1 LIMIT $2",
    )
    .bind(skip)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
}

pub async fn fetch_completed_dataset(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> sqlx::Result<Vec<DatasetEntry>> {
    sqlx::query_as::<_, DatasetEntry>(
        "SELECT comment_id, principle_id FROM user_comment_revisions
         WHERE user_id = $1 AND is_revise_completed = TRUE
         ORDER BY comment_id, principle_id",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn fetch_principles(conn: &mut PgConnection) -> sqlx::Result<Vec<PrincipleRow>> {
    sqlx::query_as::<_, PrincipleRow>(
        "SELECT id, name, definition, inclusion_criteria, exclusion_criteria FROM principles ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await
}

pub async fn fetch_principle_for_update(
    conn: &mut PgConnection,
    id: &str,
) -> sqlx::Result<Option<PrincipleRow>> {
    sqlx::query_as::<_, PrincipleRow>(
        "SELECT id, name, definition, inclusion_criteria, exclusion_criteria FROM principles WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

/// Rewrites the editable columns of an existing principle.
pub async fn update_principle(
    conn: &mut PgConnection,
    principle: &PrincipleRow,
) -> sqlx::Result<PrincipleRow> {
    sqlx::query_as::<_, PrincipleRow>(
        "UPDATE principles
         SET name = $2, definition = $3, inclusion_criteria = $4, exclusion_criteria = $5
         WHERE id = $1
         RETURNING id, name, definition, inclusion_criteria, exclusion_criteria",
    )
    .bind(&principle.id)
    .bind(&principle.name)
    .bind(&principle.definition)
    .bind(principle.inclusion_criteria.as_deref())
    .bind(principle.exclusion_criteria.as_deref())
    .fetch_one(&mut *conn)
    .await
}

/// Insert-or-replace keyed on the principle id.
pub async fn upsert_principle(
    conn: &mut PgConnection,
    principle: &PrincipleRow,
) -> sqlx::Result<PrincipleRow> {
    sqlx::query_as::<_, PrincipleRow>(
        "INSERT INTO principles (id, name, definition, inclusion_criteria, exclusion_criteria)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET
             name = EXCLUDED.name,
             definition = EXCLUDED.definition,
             inclusion_criteria = EXCLUDED.inclusion_criteria,
             exclusion_criteria = EXCLUDED.exclusion_criteria
         RETURNING id, name, definition, inclusion_criteria, exclusion_criteria",
    )
    .bind(&principle.id)
    .bind(&principle.name)
    .bind(&principle.definition)
    .bind(principle.inclusion_criteria.as_deref())
    .bind(principle.exclusion_criteria.as_deref())
    .fetch_one(&mut *conn)
    .await
}

pub async fn fetch_samples(conn: &mut PgConnection) -> sqlx::Result<Vec<SampleRow>> {
    sqlx::query_as::<_, SampleRow>(
        "SELECT id, preceding, target, following, a1_score, a2_score, a3_score, principle_id, llm_justification, llm_evidence_quote
         FROM samples ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await
}

pub async fn upsert_sample(conn: &mut PgConnection, sample: &SampleRow) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO samples (id, preceding, target, following, a1_score, a2_score, a3_score, principle_id, llm_justification, llm_evidence_quote)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (id) DO UPDATE SET
             preceding = EXCLUDED.preceding,
             target = EXCLUDED.target,
             following = EXCLUDED.following,
             a1_score = EXCLUDED.a1_score,
             a2_score = EXCLUDED.a2_score,
             a3_score = EXCLUDED.a3_score,
             principle_id = EXCLUDED.principle_id,
             llm_justification = EXCLUDED.llm_justification,
             llm_evidence_quote = EXCLUDED.llm_evidence_quote",
    )
    .bind(&sample.id)
    .bind(&sample.preceding)
    .bind(&sample.target)
    .bind(&sample.following)
    .bind(sample.a1_score)
    .bind(sample.a2_score)
    .bind(sample.a3_score)
    .bind(&sample.principle_id)
    .bind(&sample.llm_justification)
    .bind(&sample.llm_evidence_quote)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Records the caller's review of a sample against a principle, replacing any earlier state.
pub async fn upsert_revision(
    conn: &mut PgConnection,
    user_id: Uuid,
    comment_id: &str,
    principle_id: &str,
    is_revise_completed: bool,
) -> sqlx::Result<RevisionRow> {
    sqlx::query_as::<_, RevisionRow>(
        "INSERT INTO user_comment_revisions (id, user_id, comment_id, principle_id, is_revise_completed)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (user_id, comment_id, principle_id) DO UPDATE SET
             is_revise_completed = EXCLUDED.is_revise_completed,
             updated_at = NOW()
         RETURNING id, user_id, comment_id, principle_id, is_revise_completed, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(comment_id)
    .bind(principle_id)
    .bind(is_revise_completed)
    .fetch_one(&mut *conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self as fixtures, test_pool};

    #[tokio::test]
    async fn revise_stats_count_completed_rows_per_reviewer() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let mut conn = pool.acquire().await.unwrap();

        let ada = fixtures::user(&mut conn, "ada@example.org", false).await;
        fixtures::user(&mut conn, "bob@example.org", false).await;
        let admin = fixtures::user(&mut conn, "admin@example.org", true).await;
        fixtures::principle(&mut conn, "P1").await;
        for id in ["s1", "s2", "s3"] {
            fixtures::sample(&mut conn, id, "P1").await;
        }

        upsert_revision(&mut conn, ada.id, "s1", "P1", true).await.unwrap();
        upsert_revision(&mut conn, ada.id, "s2", "P1", true).await.unwrap();
        upsert_revision(&mut conn, ada.id, "s3", "P1", false).await.unwrap();
        upsert_revision(&mut conn, admin.id, "s1", "P1", true).await.unwrap();

        let total = count_completed_revisions(&mut conn).await.unwrap();
        let stats = fetch_revise_stats(&mut conn, 0, 100).await.unwrap();
        let mut counts: Vec<(&str, i64)> = stats
            .iter()
            .map(|row| (row.email.as_str(), row.revised_count))
            .collect();
        counts.sort();

        assert_eq!(total, 2);
        assert_eq!(counts, vec![("ada@example.org", 2), ("bob@example.org", 0)]);
        assert_eq!(counts.iter().map(|(_, count)| count).sum::<i64>(), total);
        assert!(stats.iter().all(|row| !row.is_superuser));
    }

    #[tokio::test]
    async fn revise_stats_page_through_reviewers() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let mut conn = pool.acquire().await.unwrap();

        for email in ["a@example.org", "b@example.org", "c@example.org"] {
            fixtures::user(&mut conn, email, false).await;
        }

        let page = fetch_revise_stats(&mut conn, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].email, "b@example.org");
    }

    #[tokio::test]
    async fn reopening_a_revision_drops_it_from_the_totals() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let mut conn = pool.acquire().await.unwrap();

        let ada = fixtures::user(&mut conn, "ada@example.org", false).await;
        fixtures::principle(&mut conn, "P1").await;
        fixtures::sample(&mut conn, "s1", "P1").await;

        let first = upsert_revision(&mut conn, ada.id, "s1", "P1", true).await.unwrap();
        let reopened = upsert_revision(&mut conn, ada.id, "s1", "P1", false).await.unwrap();

        assert_eq!(first.id, reopened.id);
        assert_eq!(count_completed_revisions(&mut conn).await.unwrap(), 0);
        assert!(fetch_completed_dataset(&mut conn, ada.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_lists_completed_pairs_and_is_empty_without_them() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let mut conn = pool.acquire().await.unwrap();

        let ada = fixtures::user(&mut conn, "ada@example.org", false).await;
        let bob = fixtures::user(&mut conn, "bob@example.org", false).await;
        fixtures::principle(&mut conn, "P1").await;
        fixtures::principle(&mut conn, "P2").await;
        fixtures::sample(&mut conn, "s1", "P1").await;
        fixtures::sample(&mut conn, "s2", "P2").await;

        upsert_revision(&mut conn, ada.id, "s2", "P2", true).await.unwrap();
        upsert_revision(&mut conn, ada.id, "s1", "P1", true).await.unwrap();
        upsert_revision(&mut conn, bob.id, "s1", "P1", false).await.unwrap();

        let ada_rows = fetch_completed_dataset(&mut conn, ada.id).await.unwrap();
        assert_eq!(
            ada_rows,
            vec![
                DatasetEntry {
                    comment_id: "s1".into(),
                    principle_id: "P1".into(),
                },
                DatasetEntry {
                    comment_id: "s2".into(),
                    principle_id: "P2".into(),
                },
            ]
        );

        let bob_rows = fetch_completed_dataset(&mut conn, bob.id).await.unwrap();
        assert!(bob_rows.is_empty());
        assert_eq!(serde_json::to_string_pretty(&bob_rows).unwrap(), "[]");
    }

    #[tokio::test]
    async fn case_variant_email_is_a_unique_violation() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let mut conn = pool.acquire().await.unwrap();

        fixtures::user(&mut conn, "ada@example.org", false).await;
        let err = insert_user(
            &mut conn,
            NewUser {
                email: "ADA@Example.org",
                password_hash: "hash",
                full_name: None,
                is_active: true,
                is_superuser: false,
            },
        )
        .await
        .unwrap_err();

        assert!(is_unique_violation(&err));
        assert!(find_user_by_email(&mut conn, "Ada@EXAMPLE.org").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn revision_for_unknown_sample_is_a_foreign_key_violation() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let mut conn = pool.acquire().await.unwrap();

        let ada = fixtures::user(&mut conn, "ada@example.org", false).await;
        fixtures::principle(&mut conn, "P1").await;

        let err = upsert_revision(&mut conn, ada.id, "missing", "P1", true)
            .await
            .unwrap_err();
        assert!(is_foreign_key_violation(&err));
    }

    #[tokio::test]
    async fn principle_update_rewrites_only_existing_rows() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let mut conn = pool.acquire().await.unwrap();

        let mut row = fixtures::principle(&mut conn, "P1").await;
        row.definition = "Revised definition".into();
        let saved = update_principle(&mut conn, &row).await.unwrap();
        assert_eq!(saved, row);

        row.id = "P9".into();
        assert!(matches!(
            update_principle(&mut conn, &row).await,
            Err(sqlx::Error::RowNotFound)
        ));
    }
}
