//! Schema bootstrapper.
//!
//! Brings an empty or partially initialized database to a ready state on every
//! start. Tables are created with `CREATE TABLE IF NOT EXISTS` semantics and
//! reference tables are seeded only while empty, so running the bootstrap any
//! number of times converges on the same schema and row counts.
//!
//! Nothing here is fatal: a table that fails to create or a seed that fails is
//! logged and reported, and the remaining work carries on.

use crate::db::dialect::{CanonicalQuery, render_ddl};
use crate::db::driver::Driver;
use crate::db::facade::Database;
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use tracing::{debug, info, warn};

/// One table of the schema: its name and a portable DDL template.
///
/// The template may use the dialect tokens understood by [`render_ddl`].
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub ddl: &'static str,
}

/// The full, compiled-in schema.
pub type SchemaDefinition = &'static [TableDef];

/// A literal seed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeedValue {
    Text(&'static str),
    Int(i64),
    Bool(bool),
    Null,
}

impl From<&SeedValue> for QueryParam {
    fn from(value: &SeedValue) -> Self {
        match *value {
            SeedValue::Text(s) => QueryParam::from(s),
            SeedValue::Int(v) => QueryParam::Int(v),
            SeedValue::Bool(v) => QueryParam::Bool(v),
            SeedValue::Null => QueryParam::Null,
        }
    }
}

/// A named batch of seed rows. Each row matches the placeholders of the
/// owning [`SeedSpec::insert_sql`].
#[derive(Debug, Clone, Copy)]
pub struct SeedGroup {
    pub label: &'static str,
    pub rows: &'static [&'static [SeedValue]],
}

/// Reference data for one table, inserted once while the table is empty.
#[derive(Debug, Clone, Copy)]
pub struct SeedSpec {
    pub table: &'static str,
    /// Must return the current row count in its first column.
    pub check_sql: &'static str,
    pub insert_sql: &'static str,
    pub groups: &'static [SeedGroup],
}

impl SeedSpec {
    /// Total number of rows across all groups.
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.rows.len()).sum()
    }
}

/// Result of seeding one table.
#[derive(Debug)]
pub enum SeedOutcome {
    Inserted(usize),
    Skipped { existing: i64 },
    Failed(DbError),
}

impl SeedOutcome {
    pub fn inserted(&self) -> usize {
        match self {
            Self::Inserted(n) => *n,
            _ => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Result of creating the schema.
#[derive(Debug, Default)]
pub struct SchemaReport {
    /// Tables whose DDL ran successfully (including ones that already existed).
    pub created: Vec<&'static str>,
    /// `DbError::SchemaInit` per table that failed.
    pub failures: Vec<DbError>,
}

/// Everything a bootstrap pass did.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub schema: SchemaReport,
    pub seeds: Vec<(&'static str, SeedOutcome)>,
}

impl BootstrapReport {
    /// True if no table or seed failed.
    pub fn is_clean(&self) -> bool {
        self.schema.failures.is_empty() && !self.seeds.iter().any(|(_, o)| o.is_failed())
    }

    pub fn inserted_rows(&self) -> usize {
        self.seeds.iter().map(|(_, o)| o.inserted()).sum()
    }

    pub fn seed_outcome(&self, table: &str) -> Option<&SeedOutcome> {
        self.seeds
            .iter()
            .find(|(name, _)| *name == table)
            .map(|(_, outcome)| outcome)
    }
}

/// Create every table of `schema`, continuing past failures.
pub async fn initialize_schema<D: Driver>(db: &Database<D>, schema: &[TableDef]) -> SchemaReport {
    let db_type = db.manager().db_type();
    let mut report = SchemaReport::default();

    for table in schema {
        let sql = render_ddl(db_type, table.ddl);
        match db.manager().execute(&CanonicalQuery::rendered(sql)).await {
            Ok(_) => {
                debug!(table = table.name, "Table ready");
                report.created.push(table.name);
            }
            Err(e) => {
                let err = DbError::schema_init(table.name, e.to_string());
                warn!(table = table.name, error = %e, "Failed to create table, continuing");
                report.failures.push(err);
            }
        }
    }

    info!(
        dialect = %db_type,
        tables = report.created.len(),
        failures = report.failures.len(),
        "Schema initialized"
    );
    report
}

/// Seed one reference table if it is empty. Errors are logged and returned as
/// [`SeedOutcome::Failed`], never raised.
pub async fn seed<D: Driver>(db: &Database<D>, spec: &SeedSpec) -> SeedOutcome {
    match try_seed(db, spec).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let err = match e {
                DbError::Seed { .. } => e,
                other => DbError::seed(spec.table, other.to_string()),
            };
            warn!(table = spec.table, error = %err, "Seeding failed");
            SeedOutcome::Failed(err)
        }
    }
}

async fn try_seed<D: Driver>(db: &Database<D>, spec: &SeedSpec) -> DbResult<SeedOutcome> {
    let existing = db
        .query(spec.check_sql, &[])
        .await?
        .scalar_i64()
        .ok_or_else(|| DbError::seed(spec.table, "Check query did not return a row count"))?;

    if existing != 0 {
        info!(table = spec.table, existing, "Seed skipped, table already populated");
        return Ok(SeedOutcome::Skipped { existing });
    }

    let mut inserted = 0;
    for group in spec.groups {
        for row in group.rows {
            let params: Vec<QueryParam> = row.iter().map(QueryParam::from).collect();
            db.insert(spec.insert_sql, &params).await?;
            inserted += 1;
        }
        debug!(table = spec.table, group = group.label, rows = group.rows.len(), "Seed group inserted");
    }

    info!(table = spec.table, inserted, "Seeded reference table");
    Ok(SeedOutcome::Inserted(inserted))
}

/// Create the schema, then seed every spec. Never fails; inspect the report.
pub async fn bootstrap<D: Driver>(
    db: &Database<D>,
    schema: &[TableDef],
    seeds: &[SeedSpec],
) -> BootstrapReport {
    let schema = initialize_schema(db, schema).await;

    let mut report = BootstrapReport {
        schema,
        seeds: Vec::with_capacity(seeds.len()),
    };
    for spec in seeds {
        let outcome = seed(db, spec).await;
        report.seeds.push((spec.table, outcome));
    }

    info!(
        tables = report.schema.created.len(),
        schema_failures = report.schema.failures.len(),
        seeded_rows = report.inserted_rows(),
        clean = report.is_clean(),
        "Bootstrap finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionConfig;

    const WIDGETS: SeedSpec = SeedSpec {
        table: "widgets",
        check_sql: "SELECT COUNT(*) FROM widgets",
        insert_sql: "INSERT INTO widgets (name, enabled) VALUES (?, ?)",
        groups: &[
            SeedGroup {
                label: "basic",
                rows: &[
                    &[SeedValue::Text("a"), SeedValue::Bool(true)],
                    &[SeedValue::Text("b"), SeedValue::Bool(false)],
                ],
            },
            SeedGroup {
                label: "extra",
                rows: &[&[SeedValue::Text("c"), SeedValue::Null]],
            },
        ],
    };

    const SCHEMA: &[TableDef] = &[
        TableDef {
            name: "widgets",
            ddl: "CREATE TABLE IF NOT EXISTS widgets (id {pk}, name {string} NOT NULL, enabled {bool})",
        },
        TableDef {
            name: "broken",
            ddl: "CREATE TABLE IF NOT EXISTS broken (",
        },
    ];

    #[test]
    fn test_seed_value_params() {
        assert_eq!(QueryParam::from(&SeedValue::Int(3)), QueryParam::Int(3));
        assert_eq!(QueryParam::from(&SeedValue::Null), QueryParam::Null);
        assert_eq!(
            QueryParam::from(&SeedValue::Text("x")),
            QueryParam::String("x".to_string())
        );
        assert_eq!(WIDGETS.row_count(), 3);
    }

    #[tokio::test]
    async fn test_bootstrap_continues_past_failures() {
        let db = Database::from_config(ConnectionConfig::sqlite(":memory:"));
        db.connect().await.unwrap();

        let report = bootstrap(&db, SCHEMA, &[WIDGETS]).await;
        assert_eq!(report.schema.created, vec!["widgets"]);
        assert_eq!(report.schema.failures.len(), 1);
        assert!(matches!(
            report.schema.failures[0],
            DbError::SchemaInit { ref table, .. } if table == "broken"
        ));
        assert!(matches!(report.seed_outcome("widgets"), Some(SeedOutcome::Inserted(3))));
        assert!(!report.is_clean());

        let again = bootstrap(&db, SCHEMA, &[WIDGETS]).await;
        assert!(matches!(
            again.seed_outcome("widgets"),
            Some(SeedOutcome::Skipped { existing: 3 })
        ));
        assert_eq!(again.inserted_rows(), 0);
    }

    #[tokio::test]
    async fn test_seed_missing_table_is_reported() {
        let db = Database::from_config(ConnectionConfig::sqlite(":memory:"));
        db.connect().await.unwrap();

        let outcome = seed(&db, &WIDGETS).await;
        match outcome {
            SeedOutcome::Failed(DbError::Seed { table, .. }) => assert_eq!(table, "widgets"),
            other => panic!("expected a seed failure, got {:?}", other),
        }
    }
}
