use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use quorum_types::models::WeightingMode;
use quorum_voting::minutes::DEFAULT_LEGAL_BASIS;

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me", "secret", "changeme"];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub weighting: WeightingMode,
    pub legal_basis: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("QUORUM_HOST", "0.0.0.0");
        let port: u16 = var("QUORUM_PORT", "3000")
            .parse()
            .context("QUORUM_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let jwt_secret = lookup("QUORUM_JWT_SECRET").context("QUORUM_JWT_SECRET is required")?;
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("QUORUM_JWT_SECRET is empty or a placeholder");
        }

        let weighting = var("QUORUM_WEIGHTING", "per_unit")
            .parse::<WeightingMode>()
            .map_err(anyhow::Error::msg)?;

        Ok(Self {
            addr,
            db_path: PathBuf::from(var("QUORUM_DB_PATH", "quorum.db")),
            jwt_secret,
            weighting,
            legal_basis: var("QUORUM_LEGAL_BASIS", DEFAULT_LEGAL_BASIS),
        })
    }
}
