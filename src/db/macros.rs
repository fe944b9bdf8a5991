//! Declarative macros shared across the database layer.
//!
//! `impl_db_dispatch!` generates per-dialect match arms over [`DbPool`] while
//! keeping call sites linear; `params!` builds a parameter slice from literals
//! and variables. Both expand at compile time with zero runtime overhead.
//!
//! [`DbPool`]: crate::db::pool::DbPool

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `DbPool` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Build a `[QueryParam; N]` array from values convertible into [`QueryParam`].
///
/// ```
/// use db_adapter::params;
/// use db_adapter::models::QueryParam;
///
/// let title = String::from("Printer on fire");
/// let values = params![title, 3, true, None::<i64>];
/// assert_eq!(values[1], QueryParam::Int(3));
/// assert!(values[3].is_null());
/// ```
///
/// [`QueryParam`]: crate::models::QueryParam
#[macro_export]
macro_rules! params {
    () => {{
        let empty: [$crate::models::QueryParam; 0] = [];
        empty
    }};
    ($($value:expr),+ $(,)?) => {
        [$($crate::models::QueryParam::from($value)),+]
    };
}
