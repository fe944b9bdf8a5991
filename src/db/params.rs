//! Parameter binding for translated statements.
//!
//! Each function binds the values of a [`Statement`] in marker order onto a
//! dialect-specific sqlx query.

use crate::db::dialect::Statement;
use crate::models::QueryParam;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Encode, MySql, Postgres, Sqlite, Type};

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;
type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;
type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// NULL sent to PostgreSQL with an unspecified parameter type (OID 0), so the
/// server infers the type from context instead of assuming TEXT.
#[derive(Debug, Clone, Copy)]
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(query: MySqlQuery<'q>, param: &'q QueryParam) -> MySqlQuery<'q> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(query: PgQuery<'q>, param: &'q QueryParam) -> PgQuery<'q> {
    match param {
        QueryParam::Null => query.bind(UntypedNull),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: SqliteQuery<'q>,
    param: &'q QueryParam,
) -> SqliteQuery<'q> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Build a MySQL query with every binding of `statement` applied.
pub(crate) fn mysql_query(statement: &Statement) -> MySqlQuery<'_> {
    statement
        .values()
        .fold(sqlx::query(&statement.sql), bind_mysql_param)
}

/// Build a PostgreSQL query with every binding of `statement` applied.
pub(crate) fn postgres_query(statement: &Statement) -> PgQuery<'_> {
    statement
        .values()
        .fold(sqlx::query(&statement.sql), bind_postgres_param)
}

/// Build a SQLite query with every binding of `statement` applied.
pub(crate) fn sqlite_query(statement: &Statement) -> SqliteQuery<'_> {
    statement
        .values()
        .fold(sqlx::query(&statement.sql), bind_sqlite_param)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_null_leaves_type_to_server() {
        let info = <UntypedNull as Type<Postgres>>::type_info();
        assert_eq!(info, PgTypeInfo::with_oid(Oid(0)));
        assert_ne!(info, <String as Type<Postgres>>::type_info());
        assert_ne!(info, <i64 as Type<Postgres>>::type_info());

        let mut buf = PgArgumentBuffer::default();
        let encoded = UntypedNull.encode_by_ref(&mut buf);
        assert!(matches!(encoded, Ok(IsNull::Yes)));
    }
}
