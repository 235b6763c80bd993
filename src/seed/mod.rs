//! Startup seeding: initial accounts plus principle and sample imports.
//!
//! Each JSON file is imported inside a single transaction with one savepoint per
//! record, so a bad record is logged and skipped without losing the rest. The
//! file is removed once its transaction commits with no failed records; otherwise
//! it stays in place so the next start retries it.

use std::{io::ErrorKind, path::Path};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, de::DeserializeOwned};
use sqlx::{Acquire, PgConnection, PgPool};
use tracing::{error, info, warn};

use crate::{
    config::{AppConfig, SeedAccount},
    web::{
        auth,
        data::{self, NewUser},
        models::{PrincipleRow, SampleRow},
    },
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub failed: usize,
}

pub async fn run(pool: &PgPool, config: &AppConfig) -> Result<()> {
    info!("creating initial data");

    if let Some(account) = &config.first_superuser {
        ensure_account(pool, account, true).await?;
    }
    for account in &config.initial_users {
        ensure_account(pool, account, false).await?;
    }

    log_outcome::<SeedPrinciple>(
        import_file::<SeedPrinciple>(pool, &config.principles_seed_path()).await,
    );
    log_outcome::<SeedSample>(
        import_file::<SeedSample>(pool, &config.samples_seed_path()).await,
    );

    info!("initial data created");
    Ok(())
}

fn log_outcome<R: SeedRecord>(result: Result<Option<ImportOutcome>>) {
    match result {
        Ok(Some(outcome)) => info!(
            kind = R::KIND,
            imported = outcome.imported,
            failed = outcome.failed,
            "seed records loaded"
        ),
        Ok(None) => {}
        Err(err) => error!(?err, kind = R::KIND, "seed import rolled back"),
    }
}

/// Creates the account unless a user with the same email already exists.
async fn ensure_account(pool: &PgPool, account: &SeedAccount, is_superuser: bool) -> Result<()> {
    let email = auth::normalize_email(&account.email);
    let mut conn = pool.acquire().await.context("failed to acquire connection")?;

    if data::find_user_by_email(&mut conn, &email)
        .await
        .context("failed to look up seed account")?
        .is_some()
    {
        return Ok(());
    }

    let password_hash = auth::hash_password(&account.password)
        .map_err(|err| anyhow!("failed to hash seed account password: {err}"))?;

    data::insert_user(
        &mut conn,
        NewUser {
            email: &email,
            password_hash: &password_hash,
            full_name: account.full_name.as_deref(),
            is_active: true,
            is_superuser,
        },
    )
    .await
    .with_context(|| format!("failed to insert seed account {email}"))?;

    info!(%email, is_superuser, "seeded account");
    Ok(())
}

/// A record that can be read from a seed file and written idempotently.
trait SeedRecord: DeserializeOwned {
    const KIND: &'static str;

    fn key(&self) -> &str;

    async fn write(&self, conn: &mut PgConnection) -> sqlx::Result<()>;
}

async fn import_file<R: SeedRecord>(pool: &PgPool, path: &Path) -> Result<Option<ImportOutcome>> {
    let Some(records) = read_records::<R>(path).await else {
        return Ok(None);
    };
    info!(kind = R::KIND, path = %path.display(), count = records.len(), "loading seed file");

    let mut tx = pool.begin().await.context("failed to start seed transaction")?;
    let mut outcome = ImportOutcome::default();

    for record in &records {
        let mut savepoint = Acquire::begin(&mut tx)
            .await
            .context("failed to open seed savepoint")?;

        match record.write(&mut savepoint).await {
            Ok(()) => {
                savepoint
                    .commit()
                    .await
                    .context("failed to release seed savepoint")?;
                outcome.imported += 1;
            }
            Err(err) => {
                error!(?err, kind = R::KIND, key = record.key(), "failed to import seed record");
                savepoint
                    .rollback()
                    .await
                    .context("failed to roll back seed savepoint")?;
                outcome.failed += 1;
            }
        }
    }

    tx.commit()
        .await
        .with_context(|| format!("failed to commit {} import", R::KIND))?;

    if outcome.failed == 0 {
        remove_seed_file(path).await;
    } else {
        warn!(
            kind = R::KIND,
            path = %path.display(),
            failed = outcome.failed,
            "kept seed file for retry"
        );
    }

    Ok(Some(outcome))
}

/// Reads and parses a seed file. Missing or malformed files are logged and skipped.
async fn read_records<R: DeserializeOwned>(path: &Path) -> Option<Vec<R>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "seed file not found, skipping");
            return None;
        }
        Err(err) => {
            error!(?err, path = %path.display(), "failed to read seed file");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(records) => Some(records),
        Err(err) => {
            error!(?err, path = %path.display(), "failed to decode seed file");
            None
        }
    }
}

async fn remove_seed_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "deleted seed file"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(?err, path = %path.display(), "failed to delete seed file"),
    }
}

/// Seed files carry ids either as strings or as bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedId {
    Text(String),
    Number(i64),
}

impl From<SeedId> for String {
    fn from(id: SeedId) -> Self {
        match id {
            SeedId::Text(text) => text,
            SeedId::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(from = "RawPrinciple")]
struct SeedPrinciple(PrincipleRow);

#[derive(Debug, Deserialize)]
struct RawPrinciple {
    id: SeedId,
    name: String,
    definition: String,
    #[serde(default)]
    inclusion_criteria: Option<String>,
    #[serde(default)]
    exclusion_criteria: Option<String>,
}

impl From<RawPrinciple> for SeedPrinciple {
    fn from(raw: RawPrinciple) -> Self {
        Self(PrincipleRow {
            id: raw.id.into(),
            name: raw.name,
            definition: raw.definition,
            inclusion_criteria: raw.inclusion_criteria,
            exclusion_criteria: raw.exclusion_criteria,
        })
    }
}

impl SeedRecord for SeedPrinciple {
    const KIND: &'static str = "principle";

    fn key(&self) -> &str {
        &self.0.id
    }

    async fn write(&self, conn: &mut PgConnection) -> sqlx::Result<()> {
        data::upsert_principle(conn, &self.0).await.map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
#[serde(from = "RawSample")]
struct SeedSample(SampleRow);

#[derive(Debug, Deserialize)]
struct RawSample {
    id: SeedId,
    #[serde(default)]
    preceding: Option<String>,
    target: String,
    #[serde(default)]
    following: Option<String>,
    #[serde(rename = "A1_Score")]
    a1_score: f64,
    #[serde(rename = "A2_Score")]
    a2_score: f64,
    #[serde(rename = "A3_Score")]
    a3_score: f64,
    principle_id: SeedId,
    #[serde(default)]
    llm_justification: Option<String>,
    #[serde(default)]
    llm_evidence_quote: Option<String>,
}

impl From<RawSample> for SeedSample {
    fn from(raw: RawSample) -> Self {
        Self(SampleRow {
            id: raw.id.into(),
            preceding: raw.preceding.unwrap_or_default(),
            target: raw.target,
            following: raw.following.unwrap_or_default(),
            a1_score: raw.a1_score,
            a2_score: raw.a2_score,
            a3_score: raw.a3_score,
            principle_id: raw.principle_id.into(),
            llm_justification: raw.llm_justification.unwrap_or_default(),
            llm_evidence_quote: raw.llm_evidence_quote.unwrap_or_default(),
        })
    }
}

impl SeedRecord for SeedSample {
    const KIND: &'static str = "sample";

    fn key(&self) -> &str {
        &self.0.id
    }

    async fn write(&self, conn: &mut PgConnection) -> sqlx::Result<()> {
        data::upsert_sample(conn, &self.0).await
    }
}
