//! Scripted driver shared by the integration tests.
//!
//! `MockDriver` hands out `MockHandle`s that record every statement they run
//! and fail on demand, so lifecycle behavior can be asserted without a server.

#![allow(dead_code)]

use db_adapter::db::{Driver, DriverHandle, RawMutation, RawResult, Statement, StatementKind};
use db_adapter::error::{DbError, DbResult};
use db_adapter::models::{ConnectionConfig, DatabaseType, Row};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Id the mock reports for every insert.
pub const MOCK_INSERT_ID: i64 = 7;

/// Counters and failure switches shared between a driver and its handles.
#[derive(Debug)]
pub struct Script {
    pub connects: usize,
    pub closes: usize,
    pub runs: usize,
    pub probes: usize,
    /// Fail the next N connects.
    pub fail_connects: usize,
    /// Fail the next N probes with a transient error.
    pub fail_probes: usize,
    /// Fail the next N handle closes.
    pub fail_closes: usize,
    /// Handles (by connect number, starting at 1) whose runs fail transiently.
    pub broken_handles: HashSet<usize>,
    /// Errors returned by the next non-probe runs, in order.
    pub run_errors: VecDeque<DbError>,
    /// How long each connect takes.
    pub connect_delay: Duration,
    /// Rows returned for read statements.
    pub select_rows: Vec<Row>,
    /// Every non-probe statement, in run order.
    pub statements: Vec<Statement>,
}

impl Default for Script {
    fn default() -> Self {
        let mut row = Row::new();
        row.insert("count".to_string(), json!(0));
        Self {
            connects: 0,
            closes: 0,
            runs: 0,
            probes: 0,
            fail_connects: 0,
            fail_probes: 0,
            fail_closes: 0,
            broken_handles: HashSet::new(),
            run_errors: VecDeque::new(),
            connect_delay: Duration::ZERO,
            select_rows: vec![row],
            statements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    pub script: Arc<Mutex<Script>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect or change the script.
    pub fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        f(&mut self.script.lock().unwrap())
    }

    pub fn connects(&self) -> usize {
        self.with(|s| s.connects)
    }

    pub fn closes(&self) -> usize {
        self.with(|s| s.closes)
    }

    pub fn runs(&self) -> usize {
        self.with(|s| s.runs)
    }

    pub fn probes(&self) -> usize {
        self.with(|s| s.probes)
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.with(|s| s.statements.clone())
    }
}

#[derive(Debug)]
pub struct MockHandle {
    script: Arc<Mutex<Script>>,
    number: usize,
    dialect: DatabaseType,
}

impl MockHandle {
    fn respond(&self, statement: &Statement) -> DbResult<RawResult> {
        let mut script = self.script.lock().unwrap();

        if statement.is_probe() {
            script.probes += 1;
            if script.fail_probes > 0 {
                script.fail_probes -= 1;
                return Err(DbError::transient("server has gone away", None));
            }
            return Ok(RawResult::Rows(Vec::new()));
        }

        script.runs += 1;
        script.statements.push(statement.clone());
        if script.broken_handles.contains(&self.number) {
            return Err(DbError::transient("connection reset by peer", None));
        }
        if let Some(err) = script.run_errors.pop_front() {
            return Err(err);
        }

        if statement.kind == StatementKind::Select {
            return Ok(RawResult::Rows(script.select_rows.clone()));
        }
        Ok(RawResult::Mutation(self.mutation(statement.kind)))
    }

    fn mutation(&self, kind: StatementKind) -> RawMutation {
        let is_insert = kind == StatementKind::Insert;
        match self.dialect {
            DatabaseType::MySQL => RawMutation::MySql {
                last_insert_id: if is_insert { MOCK_INSERT_ID as u64 } else { 0 },
                rows_affected: 1,
            },
            DatabaseType::PostgreSQL => {
                let mut returning = Vec::new();
                if is_insert {
                    let mut row = Row::new();
                    row.insert("id".to_string(), json!(MOCK_INSERT_ID));
                    returning.push(row);
                }
                RawMutation::Postgres {
                    rows_affected: 1,
                    returning,
                }
            }
            // SQLite keeps reporting the last rowid after updates
            DatabaseType::SQLite => RawMutation::Sqlite {
                last_insert_rowid: MOCK_INSERT_ID,
                changes: 1,
            },
        }
    }
}

impl Driver for MockDriver {
    type Handle = MockHandle;

    async fn connect(&self, config: &ConnectionConfig) -> DbResult<MockHandle> {
        let delay = self.with(|s| s.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        script.connects += 1;
        if script.fail_connects > 0 {
            script.fail_connects -= 1;
            return Err(DbError::connection("connection refused", "start the server"));
        }
        Ok(MockHandle {
            script: Arc::clone(&self.script),
            number: script.connects,
            dialect: config.db_type,
        })
    }
}

impl DriverHandle for MockHandle {
    async fn run(&self, statement: &Statement) -> DbResult<RawResult> {
        self.respond(statement)
    }

    async fn close(&self) -> DbResult<()> {
        let mut script = self.script.lock().unwrap();
        script.closes += 1;
        if script.fail_closes > 0 {
            script.fail_closes -= 1;
            return Err(DbError::transient("broken pipe", None));
        }
        Ok(())
    }
}

pub fn postgres_config() -> ConnectionConfig {
    ConnectionConfig::new(DatabaseType::PostgreSQL, "records").with_host("db.internal", None)
}

pub fn config_for(db_type: DatabaseType) -> ConnectionConfig {
    match db_type {
        DatabaseType::SQLite => ConnectionConfig::sqlite("records.db"),
        other => ConnectionConfig::new(other, "records").with_host("db.internal", None),
    }
}
