//! In-memory `Database` for exercising the query sets without a server.

use std::collections::VecDeque;

use crate::config::DbConfig;
use crate::connection::{Database, DatabaseType};
use crate::error::SiteDbError;
use crate::rows::JsonRow;
use crate::state::ConnectionState;
use crate::value::SqlValue;

/// Replays scripted query results in order and records every statement.
pub(crate) struct ScriptedDatabase {
    db_type: DatabaseType,
    config: DbConfig,
    state: ConnectionState,
    results: VecDeque<Result<Vec<JsonRow>, SiteDbError>>,
    affected: VecDeque<u64>,
    pub statements: Vec<(String, Vec<SqlValue>)>,
}

impl ScriptedDatabase {
    pub fn new(db_type: DatabaseType) -> Self {
        ScriptedDatabase {
            db_type,
            config: DbConfig::new(db_type, "scripted", "tester"),
            state: ConnectionState::Connected,
            results: VecDeque::new(),
            affected: VecDeque::new(),
            statements: Vec::new(),
        }
    }

    /// Queues the rows returned by the next `query_rows` call.
    pub fn returns(mut self, rows: serde_json::Value) -> Self {
        let rows = rows
            .as_array()
            .expect("scripted rows must be a JSON array")
            .iter()
            .map(|row| row.as_object().expect("scripted row must be an object").clone())
            .collect();
        self.results.push_back(Ok(rows));
        self
    }

    /// Makes the next `query_rows` call fail.
    pub fn fails(mut self, message: &str) -> Self {
        self.results
            .push_back(Err(SiteDbError::QueryError(message.to_string())));
        self
    }

    /// Queues the affected-row count for the next `execute` call (default 1).
    pub fn affects(mut self, rows: u64) -> Self {
        self.affected.push_back(rows);
        self
    }

    pub fn last_sql(&self) -> &str {
        self.statements.last().map(|(sql, _)| sql.as_str()).unwrap_or("")
    }

    pub fn sql_log(&self) -> Vec<&str> {
        self.statements.iter().map(|(sql, _)| sql.as_str()).collect()
    }
}

impl Database for ScriptedDatabase {
    fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    fn config(&self) -> &DbConfig {
        &self.config
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn connect(&mut self) -> Result<(), SiteDbError> {
        self.state = ConnectionState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SiteDbError> {
        if self.state.needs_disconnect()? {
            self.state = ConnectionState::Disconnected;
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SiteDbError> {
        self.state.require_connected()?;
        self.statements.push((sql.to_string(), params.to_vec()));
        Ok(self.affected.pop_front().unwrap_or(1))
    }

    fn query_rows(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<JsonRow>, SiteDbError> {
        self.state.require_connected()?;
        self.statements.push((sql.to_string(), params.to_vec()));
        self.results.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn begin(&mut self) -> Result<(), SiteDbError> {
        self.state = self.state.begin()?;
        self.statements.push((self.db_type.begin_statement().to_string(), Vec::new()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SiteDbError> {
        self.state = self.state.finish()?;
        self.statements.push(("COMMIT".to_string(), Vec::new()));
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SiteDbError> {
        self.state = self.state.finish()?;
        self.statements.push(("ROLLBACK".to_string(), Vec::new()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_commits_on_success() {
        let mut db = ScriptedDatabase::new(DatabaseType::PostgreSQL);
        let value = db
            .transaction(|db| db.execute("INSERT INTO t VALUES (1)", &[]))
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(db.sql_log(), vec!["BEGIN", "INSERT INTO t VALUES (1)", "COMMIT"]);
        assert_eq!(db.state(), ConnectionState::Connected);
    }

    #[test]
    fn transaction_rolls_back_on_failure() {
        let mut db = ScriptedDatabase::new(DatabaseType::MySQL).fails("duplicate key");
        let err = db
            .transaction(|db| db.query_rows("SELECT 1", &[]))
            .unwrap_err();
        assert!(matches!(err, SiteDbError::QueryError(_)));
        assert_eq!(db.sql_log(), vec!["START TRANSACTION", "SELECT 1", "ROLLBACK"]);
        assert!(!db.in_transaction());
    }

    #[test]
    fn server_time_uses_display_zone() {
        let mut db = ScriptedDatabase::new(DatabaseType::PostgreSQL)
            .returns(json!([{ "now": "2023-06-13T19:05:09" }]));
        db.config.display_timezone = chrono_tz::America::Vancouver;
        assert_eq!(db.server_time().unwrap(), "13/06/2023 12:05:09");
    }

    #[test]
    fn server_time_placeholder_when_no_row() {
        let mut db = ScriptedDatabase::new(DatabaseType::MySQL).returns(json!([]));
        assert_eq!(db.server_time().unwrap(), crate::connection::TIME_NOT_FOUND);
    }

    #[test]
    fn disconnect_refused_mid_transaction() {
        let mut db = ScriptedDatabase::new(DatabaseType::PostgreSQL);
        db.begin().unwrap();
        assert!(db.disconnect().unwrap_err().is_busy());
        assert!(db.is_connected());
        db.rollback().unwrap();
        db.disconnect().unwrap();
        assert!(!db.is_connected());
    }

    #[test]
    fn query_one_returns_first_row() {
        #[derive(Debug, serde::Deserialize)]
        struct Row {
            n: i64,
        }
        let mut db = ScriptedDatabase::new(DatabaseType::MySQL).returns(json!([{ "n": 1 }, { "n": 2 }]));
        let row: Option<Row> = db.query_one("SELECT n FROM t", &[]).unwrap();
        assert_eq!(row.unwrap().n, 1);
    }
}
