//! FalkorDB backend.
//!
//! FalkorDB speaks the Redis protocol: every query goes out as
//! `GRAPH.QUERY <graph> <text>`. Parameters ride in front of the query as a
//! `CYPHER k=v …` prefix of rendered literals, which is how the official
//! clients implement parameter binding. Replies come back as nested arrays,
//! `[header, rows, stats]` for reading queries and `[stats]` for pure
//! writes, decoded here just far enough for the importer's needs.

use crate::cypher::Statement;
use crate::{is_connection_error, GraphStore, StoreError, StoreResult, WRITE_ATTEMPTS};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tokio::sync::Mutex;

/// Connection to a FalkorDB graph, shared for a whole batch run.
pub struct FalkorStore {
    client: redis::Client,
    graph_name: String,
    con: Mutex<MultiplexedConnection>,
}

impl FalkorStore {
    /// Connect and verify the graph answers a trivial query.
    pub async fn connect(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        graph_name: &str,
    ) -> StoreResult<Self> {
        let url = connection_url(host, port, username, password);
        let client = redis::Client::open(url.as_str())
            .map_err(|err| StoreError::Connection(err.to_string()))?;
        let con = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| StoreError::Connection(err.to_string()))?;

        let store = Self {
            client,
            graph_name: graph_name.to_string(),
            con: Mutex::new(con),
        };
        store.ping().await?;
        tracing::info!(host, port, graph = graph_name, "FalkorDB connection established");
        Ok(store)
    }

    async fn reconnect(&self) {
        match self.client.get_multiplexed_async_connection().await {
            Ok(con) => {
                *self.con.lock().await = con;
                tracing::info!(graph = %self.graph_name, "reconnected to FalkorDB");
            }
            Err(err) => {
                tracing::warn!(error = %err, "FalkorDB reconnect failed");
            }
        }
    }

    async fn run(&self, query_text: &str) -> StoreResult<Value> {
        let mut attempt = 0;
        loop {
            // Multiplexed connections are cheap clones over one socket; the
            // lock is only held long enough to take the current handle.
            let mut con = self.con.lock().await.clone();
            let result: Result<Value, redis::RedisError> = redis::cmd("GRAPH.QUERY")
                .arg(&self.graph_name)
                .arg(query_text)
                .query_async(&mut con)
                .await;

            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let text = err.to_string();
                    attempt += 1;
                    if attempt < WRITE_ATTEMPTS && is_connection_error(&text) {
                        tracing::warn!(error = %text, "FalkorDB query failed, reconnecting");
                        self.reconnect().await;
                        continue;
                    }
                    return Err(StoreError::Query(text));
                }
            }
        }
    }
}

fn connection_url(host: &str, port: u16, username: Option<&str>, password: Option<&str>) -> String {
    match (username, password) {
        (Some(user), Some(pass)) => format!("redis://{user}:{pass}@{host}:{port}/"),
        (None, Some(pass)) => format!("redis://:{pass}@{host}:{port}/"),
        _ => format!("redis://{host}:{port}/"),
    }
}

/// Render a statement into a single query argument, parameters first.
fn render(stmt: &Statement) -> String {
    if stmt.params.is_empty() {
        return stmt.text.clone();
    }
    let mut out = String::from("CYPHER ");
    for (key, value) in &stmt.params {
        let _ = write!(out, "{key}={} ", value.to_literal());
    }
    out.push_str(&stmt.text);
    out
}

/// The result-set rows of a reply, when it has any.
fn result_rows(reply: &Value) -> Option<&[Value]> {
    let Value::Array(sections) = reply else {
        return None;
    };
    if sections.len() == 3 {
        if let Value::Array(rows) = &sections[1] {
            return Some(rows);
        }
    }
    None
}

fn cell_i64(cell: &Value) -> Option<i64> {
    match cell {
        Value::Int(n) => Some(*n),
        Value::BulkString(bytes) => std::str::from_utf8(bytes).ok()?.parse().ok(),
        Value::SimpleString(s) => s.parse().ok(),
        Value::Double(d) => Some(*d as i64),
        _ => None,
    }
}

fn cell_string(cell: &Value) -> Option<String> {
    match cell {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl GraphStore for FalkorStore {
    fn backend_name(&self) -> &'static str {
        "falkordb"
    }

    async fn execute(&self, stmt: &Statement) -> StoreResult<bool> {
        let reply = self.run(&render(stmt)).await?;
        Ok(result_rows(&reply).is_some_and(|rows| !rows.is_empty()))
    }

    async fn fetch_count(&self, query: &str) -> StoreResult<i64> {
        let reply = self.run(query).await?;
        result_rows(&reply)
            .and_then(|rows| rows.first())
            .and_then(|row| match row {
                Value::Array(cells) => cells.first(),
                _ => None,
            })
            .and_then(cell_i64)
            .ok_or_else(|| StoreError::Query(format!("unexpected reply for `{query}`")))
    }

    async fn fetch_distribution(&self, query: &str) -> StoreResult<BTreeMap<String, i64>> {
        let reply = self.run(query).await?;
        let mut counts = BTreeMap::new();
        for row in result_rows(&reply).unwrap_or_default() {
            let Value::Array(cells) = row else {
                continue;
            };
            // Null keys (elements without the property) are skipped.
            let (Some(key), Some(count)) = (
                cells.first().and_then(cell_string),
                cells.get(1).and_then(cell_i64),
            ) else {
                continue;
            };
            counts.insert(key, count);
        }
        Ok(counts)
    }

    async fn close(&self) {
        tracing::info!("FalkorDB connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::{merge_edge, CypherValue};

    #[test]
    fn render_without_params_is_the_bare_text() {
        assert_eq!(render(&Statement::raw("RETURN 1")), "RETURN 1");
    }

    #[test]
    fn render_prefixes_parameters_as_literals() {
        let stmt = Statement {
            text: "MATCH (n {globalId: $gid}) RETURN n".to_string(),
            params: vec![
                ("gid", CypherValue::Str("it's".to_string())),
                ("size", CypherValue::Int(42)),
            ],
        };
        let rendered = render(&stmt);
        assert!(rendered.starts_with("CYPHER gid='it\\'s' size=42 MATCH"));
    }

    #[test]
    fn render_handles_edge_statements() {
        let rendered = render(&merge_edge("CONTAINED_IN", "a", "b", "rel"));
        assert!(rendered.starts_with("CYPHER fromId='a' toId='b' relId='rel' MATCH"));
        assert!(rendered.contains("MERGE (from)-[r:CONTAINED_IN]->(to)"));
    }

    fn read_reply(rows: Vec<Value>) -> Value {
        Value::Array(vec![
            Value::Array(vec![Value::BulkString(b"count".to_vec())]),
            Value::Array(rows),
            Value::Array(vec![Value::BulkString(
                b"Query internal execution time: 0.1 ms".to_vec(),
            )]),
        ])
    }

    #[test]
    fn count_reply_decodes_the_scalar() {
        let reply = read_reply(vec![Value::Array(vec![Value::Int(12)])]);
        let rows = result_rows(&reply).unwrap();
        assert_eq!(rows.len(), 1);
        let Value::Array(cells) = &rows[0] else {
            panic!("row must be an array");
        };
        assert_eq!(cell_i64(&cells[0]), Some(12));
    }

    #[test]
    fn write_only_reply_has_no_rows() {
        let reply = Value::Array(vec![Value::Array(vec![Value::BulkString(
            b"Nodes deleted: 3".to_vec(),
        )])]);
        assert!(result_rows(&reply).is_none());
    }

    #[test]
    fn distribution_rows_decode_as_pairs() {
        let reply = read_reply(vec![
            Value::Array(vec![Value::BulkString(b"IfcWall".to_vec()), Value::Int(5)]),
            Value::Array(vec![Value::BulkString(b"IfcDoor".to_vec()), Value::Int(2)]),
            // Null key: element without an ifcClass
            Value::Array(vec![Value::Nil, Value::Int(1)]),
        ]);
        let rows = result_rows(&reply).unwrap();
        let mut counts = BTreeMap::new();
        for row in rows {
            let Value::Array(cells) = row else { continue };
            if let (Some(key), Some(count)) = (
                cells.first().and_then(cell_string),
                cells.get(1).and_then(cell_i64),
            ) {
                counts.insert(key, count);
            }
        }
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["IfcWall"], 5);
        assert_eq!(counts["IfcDoor"], 2);
    }

    #[test]
    fn connection_urls_carry_credentials() {
        assert_eq!(
            connection_url("localhost", 6379, None, None),
            "redis://localhost:6379/"
        );
        assert_eq!(
            connection_url("db", 6379, None, Some("s3cret")),
            "redis://:s3cret@db:6379/"
        );
        assert_eq!(
            connection_url("db", 6379, Some("falkor"), Some("s3cret")),
            "redis://falkor:s3cret@db:6379/"
        );
    }
}
