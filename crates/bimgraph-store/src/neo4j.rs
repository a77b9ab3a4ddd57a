//! Neo4j backend over the Bolt driver.

use crate::cypher::{CypherValue, Statement};
use crate::{is_connection_error, GraphStore, StoreError, StoreResult, WRITE_ATTEMPTS};
use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Connection to a Neo4j server, shared for a whole batch run.
///
/// The driver pools Bolt connections internally; the lock only exists so a
/// reconnect can swap the pool out underneath retrying writes.
pub struct Neo4jStore {
    uri: String,
    user: String,
    password: String,
    database: String,
    graph: RwLock<Graph>,
}

impl Neo4jStore {
    /// Connect and verify the server answers a trivial query.
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        database: &str,
    ) -> StoreResult<Self> {
        let graph = open_graph(uri, user, password, database)?;
        let store = Self {
            uri: uri.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
            graph: RwLock::new(graph),
        };
        store.ping().await?;
        tracing::info!(uri, database, "Neo4j connection established");
        Ok(store)
    }

    async fn reconnect(&self) {
        match open_graph(&self.uri, &self.user, &self.password, &self.database) {
            Ok(graph) => {
                *self.graph.write().await = graph;
                tracing::info!(uri = %self.uri, "reconnected to Neo4j");
            }
            Err(err) => {
                tracing::warn!(error = %err, "Neo4j reconnect failed");
            }
        }
    }

    fn build_query(stmt: &Statement) -> Query {
        let mut query = Query::new(stmt.text.clone());
        for (key, value) in &stmt.params {
            query = match value {
                CypherValue::Str(s) => query.param(key, s.as_str()),
                CypherValue::Int(n) => query.param(key, *n),
                CypherValue::Float(f) => query.param(key, *f),
                CypherValue::Bool(b) => query.param(key, *b),
            };
        }
        query
    }

    /// Run a statement and return its first row, if any.
    /// Connection-looking failures reconnect and retry once.
    async fn first_row(&self, stmt: &Statement) -> StoreResult<Option<neo4rs::Row>> {
        let mut attempt = 0;
        loop {
            let outcome = {
                let graph = self.graph.read().await;
                match graph.execute(Self::build_query(stmt)).await {
                    Ok(mut stream) => stream.next().await,
                    Err(err) => Err(err),
                }
            };
            match outcome {
                Ok(row) => return Ok(row),
                Err(err) => {
                    let text = err.to_string();
                    attempt += 1;
                    if attempt < WRITE_ATTEMPTS && is_connection_error(&text) {
                        tracing::warn!(error = %text, "Neo4j query failed, reconnecting");
                        self.reconnect().await;
                        continue;
                    }
                    return Err(StoreError::Query(text));
                }
            }
        }
    }
}

fn open_graph(uri: &str, user: &str, password: &str, database: &str) -> StoreResult<Graph> {
    let config = ConfigBuilder::default()
        .uri(uri)
        .user(user)
        .password(password)
        .db(database)
        .build()
        .map_err(|err| StoreError::Connection(err.to_string()))?;
    Graph::connect(config).map_err(|err| StoreError::Connection(err.to_string()))
}

#[async_trait]
impl GraphStore for Neo4jStore {
    fn backend_name(&self) -> &'static str {
        "neo4j"
    }

    async fn execute(&self, stmt: &Statement) -> StoreResult<bool> {
        Ok(self.first_row(stmt).await?.is_some())
    }

    async fn fetch_count(&self, query: &str) -> StoreResult<i64> {
        let row = self
            .first_row(&Statement::raw(query))
            .await?
            .ok_or_else(|| StoreError::NoResult(format!("count query `{query}`")))?;
        row.get::<i64>("count")
            .map_err(|err| StoreError::Query(err.to_string()))
    }

    async fn fetch_distribution(&self, query: &str) -> StoreResult<BTreeMap<String, i64>> {
        let mut attempt = 0;
        loop {
            let outcome: Result<BTreeMap<String, i64>, neo4rs::Error> = {
                let graph = self.graph.read().await;
                match graph.execute(Query::new(query.to_string())).await {
                    Ok(mut stream) => {
                        let mut counts = BTreeMap::new();
                        loop {
                            match stream.next().await {
                                Ok(Some(row)) => {
                                    // `type` is null for nodes missing the
                                    // property; skip those rows.
                                    let Ok(key) = row.get::<String>("type") else {
                                        continue;
                                    };
                                    let Ok(count) = row.get::<i64>("count") else {
                                        continue;
                                    };
                                    counts.insert(key, count);
                                }
                                Ok(None) => break Ok(counts),
                                Err(err) => break Err(err),
                            }
                        }
                    }
                    Err(err) => Err(err),
                }
            };
            match outcome {
                Ok(counts) => return Ok(counts),
                Err(err) => {
                    let text = err.to_string();
                    attempt += 1;
                    if attempt < WRITE_ATTEMPTS && is_connection_error(&text) {
                        tracing::warn!(error = %text, "Neo4j query failed, reconnecting");
                        self.reconnect().await;
                        continue;
                    }
                    return Err(StoreError::Query(text));
                }
            }
        }
    }

    async fn close(&self) {
        // The driver has no explicit shutdown; dropping the pool closes the
        // sockets when the store goes away.
        tracing::info!("Neo4j connection closed");
    }
}
