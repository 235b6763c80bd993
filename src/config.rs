use std::{env, path::PathBuf};

use anyhow::{Context, Result, anyhow};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const INITIAL_USER_SLOTS: usize = 3;

/// Account created at startup when no user with the same email exists yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedAccount {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
    pub first_superuser: Option<SeedAccount>,
    pub initial_users: Vec<SeedAccount>,
    pub seed_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup so callers other
    /// than the process environment (tests) can provide values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = get("DATABASE_URL").context("DATABASE_URL env var is missing")?;

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got {raw}"))?,
            None => DEFAULT_PORT,
        };

        let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().with_context(|| {
                format!("DATABASE_MAX_CONNECTIONS must be a positive integer, got {raw}")
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than zero"));
        }

        let first_superuser = seed_account(
            &get,
            "FIRST_SUPERUSER",
            "FIRST_SUPERUSER_PASSWORD",
            "FIRST_SUPERUSER_FULL_NAME",
        )?;

        let mut initial_users = Vec::new();
        for slot in 1..=INITIAL_USER_SLOTS {
            let account = seed_account(
                &get,
                &format!("USER_{slot}_EMAIL"),
                &format!("USER_{slot}_PASSWORD"),
                &format!("USER_{slot}_FULL_NAME"),
            )?;
            initial_users.extend(account);
        }

        let seed_dir = get("SEED_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            database_url,
            port,
            max_connections,
            first_superuser,
            initial_users,
            seed_dir,
        })
    }

    pub fn principles_seed_path(&self) -> PathBuf {
        self.seed_dir.join("principles.json")
    }

    pub fn samples_seed_path(&self) -> PathBuf {
        self.seed_dir.join("samples.json")
    }
}

fn seed_account<G>(
    get: &G,
    email_key: &str,
    password_key: &str,
    name_key: &str,
) -> Result<Option<SeedAccount>>
where
    G: Fn(&str) -> Option<String>,
{
    match (get(email_key), get(password_key)) {
        (Some(email), Some(password)) => Ok(Some(SeedAccount {
            email,
            password,
            full_name: get(name_key),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(anyhow!("{email_key} is set but {password_key} is missing")),
        (None, Some(_)) => Err(anyhow!("{password_key} is set but {email_key} is missing")),
    }
}
