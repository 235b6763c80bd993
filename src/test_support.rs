//! Postgres fixtures for tests that need a real database.
//!
//! Set `TEST_DATABASE_URL` (or `DATABASE_URL`) to run them. Each call to
//! [`test_pool`] creates a fresh schema, so tests never see each other's rows.

use sqlx::{PgConnection, PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::web::{
    auth,
    data::{self, NewUser},
    models::{PrincipleRow, SampleRow, UserRow},
};

fn test_db_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .ok()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

fn schema_db_url(base: &str, schema: &str) -> String {
    let separator = if base.contains('?') { "&" } else { "?" };
    format!("{base}{separator}options=-csearch_path%3D{schema}")
}

/// A migrated pool scoped to a new schema, or `None` when no database is configured.
pub async fn test_pool() -> Option<PgPool> {
    let Some(base) = test_db_url() else {
        eprintln!("skipping database test; set TEST_DATABASE_URL to enable");
        return None;
    };
    let schema = format!("review_test_{}", Uuid::new_v4().simple());

    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&base)
        .await
        .expect("connect to test database");
    sqlx::query(&format!("CREATE SCHEMA {schema}"))
        .execute(&admin)
        .await
        .expect("create test schema");
    admin.close().await;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&schema_db_url(&base, &schema))
        .await
        .expect("connect to test schema");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");

    Some(pool)
}

pub async fn user(conn: &mut PgConnection, email: &str, is_superuser: bool) -> UserRow {
    let password_hash = auth::hash_password("fixture-password").expect("hash password");
    data::insert_user(
        conn,
        NewUser {
            email,
            password_hash: &password_hash,
            full_name: None,
            is_active: true,
            is_superuser,
        },
    )
    .await
    .expect("insert user")
}

pub async fn principle(conn: &mut PgConnection, id: &str) -> PrincipleRow {
    data::upsert_principle(
        conn,
        &PrincipleRow {
            id: id.to_string(),
            name: format!("Principle {id}"),
            definition: "Fixture definition".to_string(),
            inclusion_criteria: None,
            exclusion_criteria: None,
        },
    )
    .await
    .expect("insert principle")
}

pub fn sample_row(id: &str, principle_id: &str) -> SampleRow {
    SampleRow {
        id: id.to_string(),
        preceding: String::new(),
        target: format!("Target sentence {id}."),
        following: String::new(),
        a1_score: 1.0,
        a2_score: 0.5,
        a3_score: 0.0,
        principle_id: principle_id.to_string(),
        llm_justification: String::new(),
        llm_evidence_quote: String::new(),
    }
}

pub async fn sample(conn: &mut PgConnection, id: &str, principle_id: &str) {
    data::upsert_sample(conn, &sample_row(id, principle_id))
        .await
        .expect("insert sample");
}
