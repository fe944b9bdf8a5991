//! Dialect translation.
//!
//! Pure functions that turn a canonical query (SQL text with `?` placeholders and an
//! ordered parameter list) into what a specific engine expects, and reduce each
//! engine's raw result into [`SelectResult`] or [`MutationResult`].
//!
//! # Placeholders
//!
//! | Dialect | Style | Example |
//! |---------|-------|---------|
//! | MySQL | positional, native | `WHERE id = ?` |
//! | SQLite | positional, native | `WHERE id = ?` |
//! | PostgreSQL | numbered | `WHERE id = $1` |
//!
//! SQL is tokenized with the sqlparser dialect of the target engine, so only
//! real placeholder tokens are rewritten: string literals (including MySQL
//! backslash escapes and PostgreSQL dollar quoting), quoted identifiers and
//! comments are left alone.

use crate::db::driver::{RawMutation, RawResult};
use crate::error::{DbError, DbResult};
use crate::models::query::json_as_i64;
use crate::models::{DatabaseType, MutationResult, Outcome, QueryParam, SelectResult};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Location, Token, Tokenizer};
use std::borrow::Cow;

/// Query used by the keep-alive task and connection checks.
pub const PROBE_SQL: &str = "SELECT 1";

/// Column PostgreSQL inserts return when the statement has no RETURNING clause.
pub const DEFAULT_RETURNING_COLUMN: &str = "id";

/// How a dialect marks bind parameters in statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`, bound by position.
    Positional,
    /// `$1`, `$2`, ... bound in order.
    Numbered,
}

impl DatabaseType {
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            Self::PostgreSQL => PlaceholderStyle::Numbered,
            Self::MySQL | Self::SQLite => PlaceholderStyle::Positional,
        }
    }

    /// Servers that close idle connections on their side and need keep-alive probes.
    pub fn drops_idle_connections(&self) -> bool {
        matches!(self, Self::MySQL | Self::PostgreSQL)
    }

    /// Column type for a DDL token such as `{pk}` or `{timestamp}`.
    fn ddl_type(&self, token: DdlToken) -> &'static str {
        use DdlToken::*;
        match (self, token) {
            (Self::MySQL, PrimaryKey) => "BIGINT AUTO_INCREMENT PRIMARY KEY",
            (Self::PostgreSQL, PrimaryKey) => "BIGSERIAL PRIMARY KEY",
            (Self::SQLite, PrimaryKey) => "INTEGER PRIMARY KEY AUTOINCREMENT",
            (Self::SQLite, Reference) => "INTEGER",
            (_, Reference) => "BIGINT",
            (Self::SQLite, String) => "TEXT",
            (_, String) => "VARCHAR(255)",
            (_, Text) => "TEXT",
            (Self::MySQL, Int) => "INT",
            (_, Int) => "INTEGER",
            (_, Bool) => "BOOLEAN",
            (Self::MySQL, Timestamp) => "DATETIME DEFAULT CURRENT_TIMESTAMP",
            (Self::PostgreSQL, Timestamp) => "TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
            (Self::SQLite, Timestamp) => "TEXT DEFAULT CURRENT_TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DdlToken {
    PrimaryKey,
    Reference,
    String,
    Text,
    Int,
    Bool,
    Timestamp,
}

const DDL_TOKENS: &[(&str, DdlToken)] = &[
    ("{pk}", DdlToken::PrimaryKey),
    ("{ref}", DdlToken::Reference),
    ("{string}", DdlToken::String),
    ("{text}", DdlToken::Text),
    ("{int}", DdlToken::Int),
    ("{bool}", DdlToken::Bool),
    ("{timestamp}", DdlToken::Timestamp),
];

/// Render a portable DDL template for `db_type`.
pub fn render_ddl(db_type: DatabaseType, template: &str) -> String {
    DDL_TOKENS
        .iter()
        .fold(template.to_string(), |sql, (token, kind)| {
            sql.replace(token, db_type.ddl_type(*kind))
        })
}

/// A dialect-neutral query: SQL text with `?` placeholders plus ordered values.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalQuery {
    sql: Cow<'static, str>,
    params: Vec<QueryParam>,
}

impl CanonicalQuery {
    /// Create a query from compile-time SQL text.
    pub fn new(sql: &'static str, params: &[QueryParam]) -> Self {
        Self {
            sql: Cow::Borrowed(sql),
            params: params.to_vec(),
        }
    }

    /// SQL produced inside the crate from static templates (e.g. rendered DDL).
    pub(crate) fn rendered(sql: String) -> Self {
        Self {
            sql: Cow::Owned(sql),
            params: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }
}

/// Statement category, decided by the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL and anything else; executed as a mutation.
    Other,
}

impl StatementKind {
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Select)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Other => "other",
        }
    }

    fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "SELECT" | "WITH" | "SHOW" | "PRAGMA" | "EXPLAIN" | "VALUES" | "DESCRIBE"
            | "DESC" => Self::Select,
            "INSERT" | "REPLACE" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One bound value and the marker it is bound under (`?` or `$n`).
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub marker: String,
    pub value: QueryParam,
}

/// A query translated for one dialect, ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub bindings: Vec<Binding>,
    pub kind: StatementKind,
    /// The driver must fetch rows rather than just execute.
    pub returns_rows: bool,
}

impl Statement {
    /// The keep-alive probe.
    pub fn probe() -> Self {
        Self {
            sql: PROBE_SQL.to_string(),
            bindings: Vec::new(),
            kind: StatementKind::Select,
            returns_rows: true,
        }
    }

    /// Bound values in bind order.
    pub fn values(&self) -> impl Iterator<Item = &QueryParam> {
        self.bindings.iter().map(|b| &b.value)
    }

    pub fn is_probe(&self) -> bool {
        self.sql == PROBE_SQL
    }
}

/// Get the sqlparser dialect matching the given database type.
fn sql_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

struct Analysis {
    kind: StatementKind,
    has_returning: bool,
    /// Positions of canonical `?` placeholders, in order of appearance.
    placeholders: Vec<Location>,
}

fn analyze(db_type: DatabaseType, sql: &str) -> DbResult<Analysis> {
    let dialect = sql_dialect(db_type);
    let tokens = Tokenizer::new(dialect.as_ref(), sql)
        .tokenize_with_location()
        .map_err(|e| DbError::invalid_input(format!("Failed to tokenize SQL: {}", e)))?;

    let keyword = tokens
        .iter()
        .find_map(|t| match &t.token {
            Token::Whitespace(_) | Token::LParen => None,
            Token::Word(w) => Some(Some(w.value.to_ascii_uppercase())),
            _ => Some(None),
        })
        .flatten()
        .ok_or_else(|| DbError::invalid_input("Empty or unrecognized SQL statement"))?;

    let has_returning = tokens.iter().any(|t| {
        matches!(&t.token, Token::Word(w) if w.quote_style.is_none()
            && w.value.eq_ignore_ascii_case("RETURNING"))
    });

    let mut placeholders = Vec::new();
    for t in &tokens {
        match &t.token {
            // PostgreSQL tokenizes a bare `?` as an operator
            Token::Question => placeholders.push(t.span.start),
            Token::Placeholder(p) if p == "?" => placeholders.push(t.span.start),
            Token::Placeholder(p) if p.starts_with('?') => {
                return Err(DbError::invalid_input(format!(
                    "Unsupported placeholder '{}'; use '?'",
                    p
                )));
            }
            _ => {}
        }
    }

    Ok(Analysis {
        kind: StatementKind::from_keyword(&keyword),
        has_returning,
        placeholders,
    })
}

/// Classify a statement by its leading keyword.
pub fn classify(db_type: DatabaseType, sql: &str) -> DbResult<StatementKind> {
    analyze(db_type, sql).map(|a| a.kind)
}

/// Translate a canonical query for `db_type`.
///
/// Fails with `InvalidInput` when the SQL does not tokenize for the dialect or
/// when the placeholder count does not match the number of parameters.
pub fn translate(db_type: DatabaseType, query: &CanonicalQuery) -> DbResult<Statement> {
    let analysis = analyze(db_type, query.sql())?;

    if analysis.placeholders.len() != query.params().len() {
        return Err(DbError::invalid_input(format!(
            "Statement has {} placeholders but {} parameters were supplied",
            analysis.placeholders.len(),
            query.params().len()
        )));
    }

    let (mut sql, markers) =
        rewrite_placeholders(query.sql(), &analysis.placeholders, db_type.placeholder_style());

    let mut returns_rows = analysis.kind.is_read();
    if db_type == DatabaseType::PostgreSQL {
        if analysis.kind == StatementKind::Insert && !analysis.has_returning {
            sql = format!(
                "{} RETURNING {}",
                sql.trim_end().trim_end_matches(';').trim_end(),
                DEFAULT_RETURNING_COLUMN
            );
        }
        returns_rows = returns_rows || analysis.kind == StatementKind::Insert || analysis.has_returning;
    }

    let bindings = markers
        .into_iter()
        .zip(query.params().iter().cloned())
        .map(|(marker, value)| Binding { marker, value })
        .collect();

    Ok(Statement {
        sql,
        bindings,
        kind: analysis.kind,
        returns_rows,
    })
}

/// Replace the `?` at each tokenizer location with the dialect's marker.
///
/// Locations are 1-based line/column pairs counted in chars, the way the
/// tokenizer reports them.
fn rewrite_placeholders(
    sql: &str,
    placeholders: &[Location],
    style: PlaceholderStyle,
) -> (String, Vec<String>) {
    let mut out = String::with_capacity(sql.len() + placeholders.len() * 2);
    let mut markers = Vec::with_capacity(placeholders.len());
    let mut pending = placeholders.iter().peekable();
    let (mut line, mut column) = (1u64, 1u64);

    for c in sql.chars() {
        let at_placeholder = c == '?'
            && pending
                .next_if(|loc| loc.line == line && loc.column == column)
                .is_some();
        if at_placeholder {
            let marker = match style {
                PlaceholderStyle::Positional => "?".to_string(),
                PlaceholderStyle::Numbered => format!("${}", markers.len() + 1),
            };
            out.push_str(&marker);
            markers.push(marker);
        } else {
            out.push(c);
        }

        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    (out, markers)
}

/// Reduce a raw driver result to the canonical outcome for a statement of `kind`.
pub fn normalize(raw: RawResult, kind: StatementKind) -> DbResult<Outcome> {
    match (raw, kind) {
        (RawResult::Rows(rows), StatementKind::Select) => {
            Ok(Outcome::Select(SelectResult::from_rows(rows)))
        }
        (RawResult::Rows(rows), kind) => {
            // Mutation answered with RETURNING rows only
            let inserted_id = if kind == StatementKind::Insert {
                rows.first()
                    .and_then(|row| row.values().next())
                    .and_then(json_as_i64)
            } else {
                None
            };
            Ok(Outcome::Mutation(MutationResult {
                inserted_id,
                affected_row_count: rows.len() as u64,
            }))
        }
        (RawResult::Mutation(_), StatementKind::Select) => Err(DbError::internal(
            "Driver returned a mutation summary for a read statement",
        )),
        (RawResult::Mutation(raw), kind) => Ok(Outcome::Mutation(normalize_mutation(raw, kind))),
    }
}

/// Reduce a driver-specific mutation summary to a [`MutationResult`].
///
/// Inserted ids are only reported for INSERT statements; engines report 0 when
/// no key was generated.
pub fn normalize_mutation(raw: RawMutation, kind: StatementKind) -> MutationResult {
    let is_insert = kind == StatementKind::Insert;
    match raw {
        RawMutation::MySql {
            last_insert_id,
            rows_affected,
        } => MutationResult {
            inserted_id: i64::try_from(last_insert_id)
                .ok()
                .filter(|id| is_insert && *id > 0),
            affected_row_count: rows_affected,
        },
        RawMutation::Sqlite {
            last_insert_rowid,
            changes,
        } => MutationResult {
            inserted_id: Some(last_insert_rowid).filter(|id| is_insert && *id > 0),
            affected_row_count: changes,
        },
        RawMutation::Postgres {
            rows_affected,
            returning,
        } => {
            let inserted_id = if is_insert {
                returning
                    .first()
                    .and_then(|row| row.values().next())
                    .and_then(json_as_i64)
            } else {
                None
            };
            let affected_row_count = if rows_affected == 0 {
                returning.len() as u64
            } else {
                rows_affected
            };
            MutationResult {
                inserted_id,
                affected_row_count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;
    use serde_json::json;

    fn params(values: &[i64]) -> Vec<QueryParam> {
        values.iter().map(|v| QueryParam::Int(*v)).collect()
    }

    #[test]
    fn test_positional_dialects_pass_through() {
        let query = CanonicalQuery::new(
            "SELECT * FROM records WHERE id = ? AND status_id = ?",
            &params(&[1, 2]),
        );
        for db in [DatabaseType::MySQL, DatabaseType::SQLite] {
            let stmt = translate(db, &query).unwrap();
            assert_eq!(stmt.sql, query.sql());
            assert_eq!(stmt.bindings[0].marker, "?");
            assert_eq!(stmt.values().cloned().collect::<Vec<_>>(), params(&[1, 2]));
            assert!(stmt.returns_rows);
        }
    }

    #[test]
    fn test_postgres_numbers_placeholders() {
        let query = CanonicalQuery::new(
            "UPDATE records SET title = ? WHERE id = ?",
            &[QueryParam::from("t"), QueryParam::Int(9)],
        );
        let stmt = translate(DatabaseType::PostgreSQL, &query).unwrap();
        assert_eq!(stmt.sql, "UPDATE records SET title = $1 WHERE id = $2");
        assert_eq!(stmt.bindings[1].marker, "$2");
        assert_eq!(stmt.bindings[1].value, QueryParam::Int(9));
        assert_eq!(stmt.kind, StatementKind::Update);
        assert!(!stmt.returns_rows);
    }

    #[test]
    fn test_placeholders_in_literals_and_comments_are_ignored() {
        let sql = "SELECT '?', \"a?\" FROM t -- what?\nWHERE x = ? /* ? */ AND y = 'it''s ?'";
        let stmt = translate(
            DatabaseType::PostgreSQL,
            &CanonicalQuery::new(sql, &params(&[5])),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT '?', \"a?\" FROM t -- what?\nWHERE x = $1 /* ? */ AND y = 'it''s ?'"
        );
        assert_eq!(stmt.bindings.len(), 1);
    }

    #[test]
    fn test_mysql_backslash_escapes_and_backticks() {
        let sql = "UPDATE `records?` SET title = 'it\\'s ?' WHERE id = ?";
        let stmt = translate(DatabaseType::MySQL, &CanonicalQuery::new(sql, &params(&[3])))
            .unwrap();
        assert_eq!(stmt.sql, sql);
        assert_eq!(stmt.bindings.len(), 1);
        assert_eq!(stmt.kind, StatementKind::Update);
    }

    #[test]
    fn test_postgres_dollar_quoted_text_is_skipped() {
        let sql = "SELECT $$a ? b$$ AS x FROM records WHERE id = ?";
        let stmt = translate(
            DatabaseType::PostgreSQL,
            &CanonicalQuery::new(sql, &params(&[1])),
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT $$a ? b$$ AS x FROM records WHERE id = $1");
    }

    #[test]
    fn test_placeholders_after_multibyte_text() {
        let sql = "SELECT * FROM comments\nWHERE body = 'héllo ✓' AND id = ? AND record_id = ?";
        let stmt = translate(
            DatabaseType::PostgreSQL,
            &CanonicalQuery::new(sql, &params(&[1, 2])),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM comments\nWHERE body = 'héllo ✓' AND id = $1 AND record_id = $2"
        );
    }

    #[test]
    fn test_numbered_sqlite_placeholders_rejected() {
        let query = CanonicalQuery::new("SELECT * FROM t WHERE a = ?1", &params(&[1]));
        let err = translate(DatabaseType::SQLite, &query).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_placeholder_count_mismatch() {
        let query = CanonicalQuery::new("SELECT * FROM t WHERE a = ? AND b = ?", &params(&[1]));
        let err = translate(DatabaseType::MySQL, &query).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_postgres_insert_gets_returning_id() {
        let query = CanonicalQuery::new("INSERT INTO statuses (name) VALUES (?);", &[
            QueryParam::from("New"),
        ]);
        let stmt = translate(DatabaseType::PostgreSQL, &query).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO statuses (name) VALUES ($1) RETURNING id");
        assert!(stmt.returns_rows);

        let query = CanonicalQuery::new(
            "INSERT INTO statuses (name) VALUES (?) RETURNING status_key",
            &[QueryParam::from("New")],
        );
        let stmt = translate(DatabaseType::PostgreSQL, &query).unwrap();
        assert!(stmt.sql.ends_with("RETURNING status_key"));

        let stmt = translate(DatabaseType::MySQL, &query).unwrap();
        assert!(!stmt.returns_rows);
    }

    #[test]
    fn test_classify_leading_keyword() {
        let kind = |sql| classify(DatabaseType::MySQL, sql).unwrap();
        assert_eq!(kind("select 1"), StatementKind::Select);
        assert_eq!(kind("  -- note\n/* c */ (SELECT 1)"), StatementKind::Select);
        assert_eq!(kind("WITH x AS (SELECT 1) SELECT * FROM x"), StatementKind::Select);
        assert_eq!(kind("insert into t values (1)"), StatementKind::Insert);
        assert_eq!(kind("REPLACE INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(kind("UPDATE t SET a = 1"), StatementKind::Update);
        assert_eq!(kind("DELETE FROM t"), StatementKind::Delete);
        assert_eq!(kind("CREATE TABLE IF NOT EXISTS t (id INT)"), StatementKind::Other);
        assert!(classify(DatabaseType::SQLite, "   ").is_err());
    }

    #[test]
    fn test_normalization_equivalence() {
        let mut returned = Row::new();
        returned.insert("id".to_string(), json!(7));

        let raws = [
            RawMutation::MySql {
                last_insert_id: 7,
                rows_affected: 1,
            },
            RawMutation::Sqlite {
                last_insert_rowid: 7,
                changes: 1,
            },
            RawMutation::Postgres {
                rows_affected: 1,
                returning: vec![returned],
            },
        ];

        let expected = MutationResult {
            inserted_id: Some(7),
            affected_row_count: 1,
        };
        for raw in raws {
            assert_eq!(normalize_mutation(raw, StatementKind::Insert), expected);
        }
    }

    #[test]
    fn test_inserted_id_only_for_inserts() {
        let raw = RawMutation::Sqlite {
            last_insert_rowid: 41,
            changes: 3,
        };
        let result = normalize_mutation(raw, StatementKind::Update);
        assert_eq!(result.inserted_id, None);
        assert_eq!(result.affected_row_count, 3);

        let raw = RawMutation::MySql {
            last_insert_id: 0,
            rows_affected: 1,
        };
        assert_eq!(normalize_mutation(raw, StatementKind::Insert).inserted_id, None);
    }

    #[test]
    fn test_normalize_select_rows() {
        let mut row = Row::new();
        row.insert("name".to_string(), json!("New"));
        let outcome = normalize(RawResult::Rows(vec![row]), StatementKind::Select).unwrap();
        let select = outcome.into_select().unwrap();
        assert_eq!(select.columns, vec!["name".to_string()]);
        assert_eq!(select.row_count(), 1);

        let err = normalize(
            RawResult::Mutation(RawMutation::Sqlite {
                last_insert_rowid: 0,
                changes: 0,
            }),
            StatementKind::Select,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_render_ddl() {
        let template = "CREATE TABLE IF NOT EXISTS t (id {pk}, owner_id {ref}, name {string}, created_at {timestamp})";
        let mysql = render_ddl(DatabaseType::MySQL, template);
        assert!(mysql.contains("BIGINT AUTO_INCREMENT PRIMARY KEY"));
        assert!(mysql.contains("DATETIME DEFAULT CURRENT_TIMESTAMP"));

        let pg = render_ddl(DatabaseType::PostgreSQL, template);
        assert!(pg.contains("BIGSERIAL PRIMARY KEY"));
        assert!(pg.contains("VARCHAR(255)"));

        let sqlite = render_ddl(DatabaseType::SQLite, template);
        assert!(sqlite.contains("INTEGER PRIMARY KEY AUTOINCREMENT"));
        for rendered in [mysql, pg, sqlite] {
            assert!(!rendered.contains('{'));
        }
    }

    #[test]
    fn test_keepalive_dialects() {
        assert!(DatabaseType::MySQL.drops_idle_connections());
        assert!(DatabaseType::PostgreSQL.drops_idle_connections());
        assert!(!DatabaseType::SQLite.drops_idle_connections());
        assert!(Statement::probe().is_probe());
    }
}
