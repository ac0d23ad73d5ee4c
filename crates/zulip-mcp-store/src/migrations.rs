// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Idempotent schema migrations (spec §3, §4.1). Each migration is
//! `CREATE TABLE IF NOT EXISTS` plus additive `ALTER TABLE` statements, so
//! re-applying them against an already-migrated store is a no-op. Applied
//! versions are recorded in `schema_migrations`; migration failure at
//! startup is fatal (spec §4.1).

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};

struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
            CREATE TABLE IF NOT EXISTS afk_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                is_afk INTEGER NOT NULL,
                reason TEXT,
                auto_return_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agents (
                agent_id TEXT PRIMARY KEY,
                agent_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS agent_instances (
                instance_id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                session_id TEXT,
                project_dir TEXT,
                host TEXT,
                started_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS input_requests (
                request_id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                question TEXT NOT NULL,
                context TEXT,
                options TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                responded_at TEXT,
                response TEXT
            );

            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                outputs TEXT,
                metrics TEXT
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                payload TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (scope, key)
            );

            CREATE INDEX IF NOT EXISTS idx_input_requests_agent_status
                ON input_requests(agent_id, status);

            CREATE INDEX IF NOT EXISTS idx_agent_instances_agent
                ON agent_instances(agent_id);
        "#,
    },
];

/// Apply all migrations with `version` greater than the store's current
/// schema version. Safe to call on every startup.
pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|source| StoreError::Migration { version: 0, source })?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|source| StoreError::Migration { version: 0, source })?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        conn.execute_batch(migration.sql)
            .map_err(|source| StoreError::Migration { version: migration.version, source })?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|source| StoreError::Migration { version: migration.version, source })?;
        info!(version = migration.version, "applied store migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        apply(&conn).unwrap();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn apply_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        for table in [
            "afk_state",
            "agents",
            "agent_instances",
            "input_requests",
            "tasks",
            "cache_entries",
        ] {
            let exists: u32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    rusqlite::params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "expected table {table} to exist");
        }
    }
}
