//! Compiled-in schema and reference data of the record-keeping application.
//!
//! No foreign keys are declared, so tables can be created in any order.
//! `{pk}`, `{ref}`, `{string}`, `{text}`, `{int}`, `{bool}` and `{timestamp}`
//! are rendered per dialect at bootstrap time.

use super::bootstrap::{SchemaDefinition, SeedGroup, SeedSpec, TableDef};
use super::bootstrap::SeedValue::{Bool, Int, Text};

pub const SCHEMA: SchemaDefinition = &[
    // Reference tables
    TableDef {
        name: "statuses",
        ddl: "CREATE TABLE IF NOT EXISTS statuses (
            id {pk},
            name {string} NOT NULL,
            color {string},
            sort_order {int} NOT NULL DEFAULT 0,
            is_closed {bool} NOT NULL DEFAULT FALSE,
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "priorities",
        ddl: "CREATE TABLE IF NOT EXISTS priorities (
            id {pk},
            name {string} NOT NULL,
            weight {int} NOT NULL DEFAULT 0,
            color {string},
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "outcomes",
        ddl: "CREATE TABLE IF NOT EXISTS outcomes (
            id {pk},
            name {string} NOT NULL,
            is_resolved {bool} NOT NULL DEFAULT FALSE,
            sort_order {int} NOT NULL DEFAULT 0,
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "record_kinds",
        ddl: "CREATE TABLE IF NOT EXISTS record_kinds (
            id {pk},
            name {string} NOT NULL,
            description {text},
            icon {string},
            created_at {timestamp}
        )",
    },
    // Data tables
    TableDef {
        name: "users",
        ddl: "CREATE TABLE IF NOT EXISTS users (
            id {pk},
            email {string} NOT NULL,
            display_name {string},
            password_hash {string},
            role {string} NOT NULL DEFAULT 'member',
            is_active {bool} NOT NULL DEFAULT TRUE,
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "records",
        ddl: "CREATE TABLE IF NOT EXISTS records (
            id {pk},
            kind_id {ref},
            title {string} NOT NULL,
            description {text},
            status_id {ref},
            priority_id {ref},
            outcome_id {ref},
            owner_id {ref},
            assignee_id {ref},
            due_on {string},
            created_at {timestamp},
            updated_at {timestamp}
        )",
    },
    TableDef {
        name: "record_fields",
        ddl: "CREATE TABLE IF NOT EXISTS record_fields (
            id {pk},
            record_id {ref} NOT NULL,
            field_key {string} NOT NULL,
            field_value {text},
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "comments",
        ddl: "CREATE TABLE IF NOT EXISTS comments (
            id {pk},
            record_id {ref} NOT NULL,
            author_id {ref},
            body {text} NOT NULL,
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "attachments",
        ddl: "CREATE TABLE IF NOT EXISTS attachments (
            id {pk},
            record_id {ref} NOT NULL,
            file_name {string} NOT NULL,
            content_type {string},
            size_bytes {ref},
            storage_key {string} NOT NULL,
            uploaded_by {ref},
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "saved_views",
        ddl: "CREATE TABLE IF NOT EXISTS saved_views (
            id {pk},
            owner_id {ref},
            name {string} NOT NULL,
            view_type {string} NOT NULL DEFAULT 'list',
            filters {text},
            is_default {bool} NOT NULL DEFAULT FALSE,
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "activity_log",
        ddl: "CREATE TABLE IF NOT EXISTS activity_log (
            id {pk},
            record_id {ref},
            actor_id {ref},
            action {string} NOT NULL,
            details {text},
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "chat_sessions",
        ddl: "CREATE TABLE IF NOT EXISTS chat_sessions (
            id {pk},
            user_id {ref},
            title {string},
            created_at {timestamp}
        )",
    },
    TableDef {
        name: "chat_messages",
        ddl: "CREATE TABLE IF NOT EXISTS chat_messages (
            id {pk},
            session_id {ref} NOT NULL,
            role {string} NOT NULL,
            content {text} NOT NULL,
            created_at {timestamp}
        )",
    },
];

pub const STATUSES: SeedSpec = SeedSpec {
    table: "statuses",
    check_sql: "SELECT COUNT(*) AS count FROM statuses",
    insert_sql: "INSERT INTO statuses (name, color, sort_order, is_closed) VALUES (?, ?, ?, ?)",
    groups: &[SeedGroup {
        label: "workflow",
        rows: &[
            &[Text("Open"), Text("#3b82f6"), Int(1), Bool(false)],
            &[Text("In Progress"), Text("#f59e0b"), Int(2), Bool(false)],
            &[Text("Blocked"), Text("#ef4444"), Int(3), Bool(false)],
            &[Text("Resolved"), Text("#10b981"), Int(4), Bool(true)],
            &[Text("Closed"), Text("#6b7280"), Int(5), Bool(true)],
        ],
    }],
};

pub const PRIORITIES: SeedSpec = SeedSpec {
    table: "priorities",
    check_sql: "SELECT COUNT(*) AS count FROM priorities",
    insert_sql: "INSERT INTO priorities (name, weight, color) VALUES (?, ?, ?)",
    groups: &[SeedGroup {
        label: "levels",
        rows: &[
            &[Text("Low"), Int(1), Text("#9ca3af")],
            &[Text("Medium"), Int(2), Text("#3b82f6")],
            &[Text("High"), Int(3), Text("#f97316")],
            &[Text("Urgent"), Int(4), Text("#dc2626")],
        ],
    }],
};

pub const OUTCOMES: SeedSpec = SeedSpec {
    table: "outcomes",
    check_sql: "SELECT COUNT(*) AS count FROM outcomes",
    insert_sql: "INSERT INTO outcomes (name, is_resolved, sort_order) VALUES (?, ?, ?)",
    groups: &[
        SeedGroup {
            label: "resolved",
            rows: &[
                &[Text("Completed"), Bool(true), Int(1)],
                &[Text("Fixed"), Bool(true), Int(2)],
                &[Text("Workaround Provided"), Bool(true), Int(3)],
            ],
        },
        SeedGroup {
            label: "unresolved",
            rows: &[
                &[Text("Won't Fix"), Bool(false), Int(4)],
                &[Text("Duplicate"), Bool(false), Int(5)],
                &[Text("Cannot Reproduce"), Bool(false), Int(6)],
            ],
        },
    ],
};

pub const RECORD_KINDS: SeedSpec = SeedSpec {
    table: "record_kinds",
    check_sql: "SELECT COUNT(*) AS count FROM record_kinds",
    insert_sql: "INSERT INTO record_kinds (name, description, icon) VALUES (?, ?, ?)",
    groups: &[SeedGroup {
        label: "default",
        rows: &[
            &[Text("Task"), Text("A unit of planned work"), Text("check-square")],
            &[Text("Incident"), Text("Something broke and needs attention"), Text("alert-triangle")],
            &[Text("Request"), Text("A request from a customer or colleague"), Text("inbox")],
            &[Text("Note"), Text("Free-form information worth keeping"), Text("file-text")],
        ],
    }],
};

/// Reference tables seeded on every start.
pub const SEEDS: &[SeedSpec] = &[STATUSES, PRIORITIES, OUTCOMES, RECORD_KINDS];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::dialect::{CanonicalQuery, StatementKind, classify, render_ddl, translate};
    use crate::models::{DatabaseType, QueryParam};
    use std::collections::HashSet;

    #[test]
    fn test_table_names_unique() {
        let names: HashSet<_> = SCHEMA.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), SCHEMA.len());
        assert_eq!(SCHEMA.len(), 13);
    }

    #[test]
    fn test_ddl_renders_for_every_dialect() {
        for db in [DatabaseType::MySQL, DatabaseType::PostgreSQL, DatabaseType::SQLite] {
            for table in SCHEMA {
                let sql = render_ddl(db, table.ddl);
                assert!(!sql.contains('{'), "{} has unrendered tokens", table.name);
                assert!(sql.contains(table.name));
                assert!(!sql.to_uppercase().contains("REFERENCES"));
            }
        }
    }

    #[test]
    fn test_seed_rows_match_placeholders() {
        for spec in SEEDS {
            for db in [DatabaseType::MySQL, DatabaseType::PostgreSQL, DatabaseType::SQLite] {
                assert_eq!(classify(db, spec.check_sql).unwrap(), StatementKind::Select);
                assert_eq!(classify(db, spec.insert_sql).unwrap(), StatementKind::Insert);
            }
            assert!(SCHEMA.iter().any(|t| t.name == spec.table));

            for group in spec.groups {
                for row in group.rows {
                    let params: Vec<QueryParam> = row.iter().map(QueryParam::from).collect();
                    let query = CanonicalQuery::new(spec.insert_sql, &params);
                    assert!(translate(DatabaseType::PostgreSQL, &query).is_ok());
                }
            }
        }
    }

    #[test]
    fn test_seed_sizes() {
        assert_eq!(STATUSES.row_count(), 5);
        assert_eq!(PRIORITIES.row_count(), 4);
        assert_eq!(OUTCOMES.groups.len(), 2);
        assert!(OUTCOMES.groups.iter().all(|g| g.rows.len() == 3));
        assert_eq!(OUTCOMES.row_count(), 6);
        assert_eq!(RECORD_KINDS.row_count(), 4);
    }
}
