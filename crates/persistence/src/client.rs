//! ScyllaDB client and connection management: config sourced from
//! `ragflow-config`'s `PersistenceConfig` (not its own env-var parsing),
//! keyspace owned by the client, `ensure_schema` run once at startup.

use std::sync::Arc;
use std::time::Duration;

use scylla::{Session, SessionBuilder};

use crate::error::PersistenceError;
use crate::schema;

/// Connection attempts before `connect` gives up. A freshly-started
/// ScyllaDB container in docker-compose can take a few seconds past this
/// process's own startup to accept connections.
const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BACKOFF_BASE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl From<&ragflow_config::PersistenceConfig> for ScyllaConfig {
    fn from(config: &ragflow_config::PersistenceConfig) -> Self {
        Self {
            hosts: config.scylla_hosts.clone(),
            keyspace: config.keyspace.clone(),
            replication_factor: config.replication_factor,
        }
    }
}

#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    config: ScyllaConfig,
}

impl ScyllaClient {
    /// Connects with a bounded retry: each failed attempt waits
    /// `CONNECT_BACKOFF_BASE * attempt` before trying again, then the last
    /// error is returned once `CONNECT_ATTEMPTS` is exhausted.
    pub async fn connect(config: ScyllaConfig) -> Result<Self, PersistenceError> {
        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "connecting to ScyllaDB");

        let mut last_err = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match SessionBuilder::new().known_nodes(&config.hosts).build().await {
                Ok(session) => return Ok(Self { session: Arc::new(session), config }),
                Err(err) => {
                    tracing::warn!(attempt, max_attempts = CONNECT_ATTEMPTS, error = %err, "ScyllaDB connection attempt failed");
                    last_err = Some(err);
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(CONNECT_BACKOFF_BASE * attempt).await;
                    }
                }
            }
        }
        Err(last_err.expect("loop runs at least once").into())
    }

    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        schema::create_keyspace(&self.session, &self.config.keyspace, self.config.replication_factor).await?;
        schema::create_tables(&self.session, &self.config.keyspace).await?;
        tracing::info!(keyspace = %self.config.keyspace, "schema ensured");
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_sourced_from_persistence_settings() {
        let settings = ragflow_config::PersistenceConfig {
            enabled: true,
            scylla_hosts: vec!["scylla-1:9042".to_string(), "scylla-2:9042".to_string()],
            keyspace: "ragflow_test".to_string(),
            replication_factor: 3,
        };
        let config = ScyllaConfig::from(&settings);
        assert_eq!(config.hosts, settings.scylla_hosts);
        assert_eq!(config.keyspace, "ragflow_test");
        assert_eq!(config.replication_factor, 3);
    }
}
