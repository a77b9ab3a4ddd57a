//! Connection configuration.
//!
//! All connection parameters come from the process environment; a missing
//! required key is a setup error that names every absent key, reported
//! before anything touches the graph.

use bimgraph_store::{FalkorStore, GraphStore, Neo4jStore};
use clap::ValueEnum;
use std::env;
use std::fmt;

/// Which graph engine a run writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Neo4j,
    Falkordb,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Neo4j => write!(f, "neo4j"),
            Backend::Falkordb => write!(f, "falkordb"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variables not set: {0}")]
    MissingKeys(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Neo4jConfig {
    pub const REQUIRED_KEYS: [&'static str; 4] =
        ["NEO4J_URI", "NEO4J_USER", "NEO4J_PASSWORD", "NEO4J_DATABASE"];

    pub fn from_env() -> Result<Self, ConfigError> {
        let [uri, user, password, database] = require(Self::REQUIRED_KEYS)?;
        Ok(Self {
            uri,
            user,
            password,
            database,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FalkorConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub graph: String,
}

impl FalkorConfig {
    pub const REQUIRED_KEYS: [&'static str; 3] =
        ["FALKORDB_HOST", "FALKORDB_PORT", "FALKORDB_GRAPH"];

    pub fn from_env() -> Result<Self, ConfigError> {
        let [host, port, graph] = require(Self::REQUIRED_KEYS)?;
        let port = port.parse().map_err(|_| ConfigError::InvalidValue {
            key: "FALKORDB_PORT".to_string(),
            value: port.clone(),
        })?;
        Ok(Self {
            host,
            port,
            username: env::var("FALKORDB_USERNAME").ok().filter(|v| !v.is_empty()),
            password: env::var("FALKORDB_PASSWORD").ok().filter(|v| !v.is_empty()),
            graph,
        })
    }
}

/// Read a fixed set of required keys, collecting every missing name before
/// failing.
fn require<const N: usize>(keys: [&'static str; N]) -> Result<[String; N], ConfigError> {
    let mut values = Vec::with_capacity(N);
    let mut missing = Vec::new();

    for key in keys {
        match env::var(key) {
            Ok(value) if !value.is_empty() => values.push(value),
            _ => missing.push(key),
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::MissingKeys(missing.join(", ")));
    }
    Ok(values
        .try_into()
        .expect("value count matches the key count"))
}

/// Read the selected backend's configuration and open a connection.
pub async fn open_store(backend: Backend) -> anyhow::Result<Box<dyn GraphStore>> {
    match backend {
        Backend::Neo4j => {
            let cfg = Neo4jConfig::from_env()?;
            let store =
                Neo4jStore::connect(&cfg.uri, &cfg.user, &cfg.password, &cfg.database).await?;
            Ok(Box::new(store))
        }
        Backend::Falkordb => {
            let cfg = FalkorConfig::from_env()?;
            let store = FalkorStore::connect(
                &cfg.host,
                cfg.port,
                cfg.username.as_deref(),
                cfg.password.as_deref(),
                &cfg.graph,
            )
            .await?;
            Ok(Box::new(store))
        }
    }
}
