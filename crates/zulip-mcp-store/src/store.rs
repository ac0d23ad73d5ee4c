// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The [`Store`] façade (spec §4.1). Writes are serialized through a
//! process-level mutex around a single writer [`Connection`] and wrapped in
//! an explicit transaction with rollback on error; reads open a fresh
//! connection each call and run concurrently with the writer under WAL mode.
//! Typed methods validate terminal-state monotonicity for requests and
//! tasks before writing, per spec §3/§4.1.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::model::{AfkState, Agent, AgentInstance, CacheScope, InputRequest, RequestStatus, Task, TaskStatus};

pub struct Store {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl Store {
    /// Open (creating if necessary) the store at `path`, apply migrations,
    /// and ensure the singleton AFK row exists (spec §4.1 "Policies").
    /// Migration failure is fatal.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Open {
                    path: path.display().to_string(),
                    source: rusqlite::Error::ModuleError(source.to_string()),
                })?;
            }
        }
        let conn = Connection::open(&path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|source| StoreError::Open { path: path.display().to_string(), source })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|source| StoreError::Open { path: path.display().to_string(), source })?;
        migrations::apply(&conn)?;

        let store = Self { path, writer: Mutex::new(conn) };
        store.ensure_afk_row()?;
        info!(path = %store.path.display(), "store initialized");
        Ok(store)
    }

    /// Open a short-lived read connection. Concurrent readers never observe
    /// a torn multi-statement write because writes run inside an explicit
    /// transaction (spec §5 "Concurrency & Resource Model").
    fn read_conn(&self) -> Result<Connection> {
        Connection::open(&self.path).map_err(|source| StoreError::Open {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Run `f` inside a `BEGIN ... COMMIT` transaction on the single writer
    /// connection, serialized by `writer`'s mutex. Any error inside `f`
    /// rolls the transaction back (via `Transaction`'s `Drop`) before the
    /// error propagates — no partial state leaks (spec §4.1).
    fn with_write_txn<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&rusqlite::Transaction) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.writer.lock().expect("store writer mutex poisoned");
        let tx = conn
            .transaction()
            .map_err(|source| StoreError::Write { operation: operation.to_string(), source })?;
        let result = f(&tx).map_err(|source| StoreError::Write { operation: operation.to_string(), source })?;
        tx.commit()
            .map_err(|source| StoreError::Write { operation: operation.to_string(), source })?;
        Ok(result)
    }

    // ── AFK state (single row, spec §3/§4.7) ──────────────────────────────

    fn ensure_afk_row(&self) -> Result<()> {
        self.with_write_txn("ensure_afk_row", |tx| {
            tx.execute(
                "INSERT OR IGNORE INTO afk_state (id, is_afk, reason, auto_return_at, updated_at)
                 VALUES (1, 0, NULL, NULL, ?1)",
                params![Utc::now().to_rfc3339()],
            )
        })
    }

    pub fn get_afk(&self) -> Result<AfkState> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT is_afk, reason, auto_return_at, updated_at FROM afk_state WHERE id = 1",
            [],
            row_to_afk_state,
        )
        .map_err(|source| StoreError::Write { operation: "get_afk".into(), source })
    }

    /// `enable(hours?, reason?)` / `disable()` from spec §4.7. Idempotent:
    /// enabling twice overwrites with the latest parameters (spec §8 law).
    pub fn set_afk(
        &self,
        is_afk: bool,
        reason: Option<String>,
        auto_return_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.with_write_txn("set_afk", |tx| {
            tx.execute(
                "UPDATE afk_state SET is_afk = ?1, reason = ?2, auto_return_at = ?3, updated_at = ?4 WHERE id = 1",
                params![
                    is_afk as i64,
                    reason,
                    auto_return_at.map(|d| d.to_rfc3339()),
                    Utc::now().to_rfc3339()
                ],
            )
        })
    }

    // ── Agents / instances (spec §3, §4.5 register_agent) ─────────────────

    /// Upsert an agent row keyed by `agent_id` (unique). Safe to call
    /// repeatedly for the same agent_type (spec §8 idempotence law).
    pub fn upsert_agent(&self, agent_id: &str, agent_type: &str, metadata: &serde_json::Value) -> Result<()> {
        self.with_write_txn("upsert_agent", |tx| {
            tx.execute(
                "INSERT INTO agents (agent_id, agent_type, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(agent_id) DO UPDATE SET agent_type = excluded.agent_type, metadata = excluded.metadata",
                params![agent_id, agent_type, Utc::now().to_rfc3339(), metadata.to_string()],
            )
        })
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT agent_id, agent_type, created_at, metadata FROM agents WHERE agent_id = ?1",
            params![agent_id],
            row_to_agent,
        )
        .optional()
        .map_err(|source| StoreError::Write { operation: "get_agent".into(), source })
    }

    /// Always creates a new row — every registration call produces a fresh
    /// instance (spec §3, §8 idempotence law: "two instance rows").
    pub fn create_instance(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        project_dir: Option<&str>,
        host: Option<&str>,
    ) -> Result<String> {
        let instance_id = Uuid::new_v4().to_string();
        self.with_write_txn("create_instance", |tx| {
            tx.execute(
                "INSERT INTO agent_instances (instance_id, agent_id, session_id, project_dir, host, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![instance_id, agent_id, session_id, project_dir, host, Utc::now().to_rfc3339()],
            )
        })?;
        Ok(instance_id)
    }

    /// Enumerate recent instances (spec §4.5 `list_instances`). Read
    /// failures are absorbed to an empty list and logged (spec §4.1).
    pub fn list_instances(&self, limit: u32) -> Vec<AgentInstance> {
        let result = (|| -> Result<Vec<AgentInstance>> {
            let conn = self.read_conn()?;
            let mut stmt = conn.prepare(
                "SELECT instance_id, agent_id, session_id, project_dir, host, started_at
                 FROM agent_instances ORDER BY started_at DESC LIMIT ?1",
            ).map_err(|source| StoreError::Write { operation: "list_instances".into(), source })?;
            let rows = stmt
                .query_map(params![limit], row_to_instance)
                .map_err(|source| StoreError::Write { operation: "list_instances".into(), source })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|source| StoreError::Write { operation: "list_instances".into(), source })?);
            }
            Ok(out)
        })();
        result.unwrap_or_else(|err| {
            warn!(%err, "list_instances read failed; returning empty list");
            Vec::new()
        })
    }

    // ── Input requests (spec §3, §4.5 request_user_input / wait_for_response) ──

    /// Create a pending request row. Request ids are the short (first 8
    /// hex chars) form of a UUID, per spec §3 "request_id (UUID short form)".
    pub fn create_request(
        &self,
        agent_id: &str,
        question: &str,
        context: Option<&str>,
        options: &[String],
    ) -> Result<String> {
        let request_id = short_id();
        let options_json = serde_json::to_string(options).unwrap_or_else(|_| "[]".to_string());
        self.with_write_txn("create_request", |tx| {
            tx.execute(
                "INSERT INTO input_requests
                    (request_id, agent_id, question, context, options, status, created_at, responded_at, response)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, NULL, NULL)",
                params![request_id, agent_id, question, context, options_json, Utc::now().to_rfc3339()],
            )
        })?;
        Ok(request_id)
    }

    pub fn get_request(&self, request_id: &str) -> Result<Option<InputRequest>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT request_id, agent_id, question, context, options, status, created_at, responded_at, response
             FROM input_requests WHERE request_id = ?1",
            params![request_id],
            row_to_request,
        )
        .optional()
        .map_err(|source| StoreError::Write { operation: "get_request".into(), source })
    }

    /// Most-recent pending request for `agent_id`, used by the listener's
    /// fallback correlation rule (spec §4.6 rule c). Read failures return
    /// an empty list (spec §4.1).
    pub fn list_pending_for_agent(&self, agent_id: &str) -> Vec<InputRequest> {
        let result = (|| -> Result<Vec<InputRequest>> {
            let conn = self.read_conn()?;
            let mut stmt = conn.prepare(
                "SELECT request_id, agent_id, question, context, options, status, created_at, responded_at, response
                 FROM input_requests WHERE agent_id = ?1 AND status = 'pending' ORDER BY created_at DESC",
            ).map_err(|source| StoreError::Write { operation: "list_pending_for_agent".into(), source })?;
            let rows = stmt
                .query_map(params![agent_id], row_to_request)
                .map_err(|source| StoreError::Write { operation: "list_pending_for_agent".into(), source })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|source| StoreError::Write { operation: "list_pending_for_agent".into(), source })?);
            }
            Ok(out)
        })();
        result.unwrap_or_else(|err| {
            warn!(%err, "list_pending_for_agent read failed; returning empty list");
            Vec::new()
        })
    }

    /// All pending requests, used by the listener to scan for explicit
    /// request-id matches embedded anywhere in an inbound message body
    /// (spec §4.6 rule a/b).
    pub fn list_all_pending(&self) -> Vec<InputRequest> {
        let result = (|| -> Result<Vec<InputRequest>> {
            let conn = self.read_conn()?;
            let mut stmt = conn.prepare(
                "SELECT request_id, agent_id, question, context, options, status, created_at, responded_at, response
                 FROM input_requests WHERE status = 'pending' ORDER BY created_at DESC",
            ).map_err(|source| StoreError::Write { operation: "list_all_pending".into(), source })?;
            let rows = stmt
                .query_map([], row_to_request)
                .map_err(|source| StoreError::Write { operation: "list_all_pending".into(), source })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|source| StoreError::Write { operation: "list_all_pending".into(), source })?);
            }
            Ok(out)
        })();
        result.unwrap_or_else(|err| {
            warn!(%err, "list_all_pending read failed; returning empty list");
            Vec::new()
        })
    }

    /// Transition `request_id` to a terminal status. Idempotent: a row
    /// already in a terminal status is left untouched and `false` is
    /// returned (spec §3 "only one terminal transition per row", §4.1
    /// "transitions from terminal status are silently ignored (idempotent)
    /// and logged"). Returns `true` iff this call performed the transition.
    pub fn transition_request(
        &self,
        request_id: &str,
        new_status: RequestStatus,
        response: Option<&str>,
    ) -> Result<bool> {
        self.with_write_txn("transition_request", |tx| {
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM input_requests WHERE request_id = ?1",
                    params![request_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(current) = current else {
                return Ok(false);
            };
            let status = RequestStatus::parse(&current).unwrap_or(RequestStatus::Pending);
            if status.is_terminal() {
                return Ok(false);
            }
            tx.execute(
                "UPDATE input_requests SET status = ?1, response = ?2, responded_at = ?3 WHERE request_id = ?4",
                params![new_status.as_str(), response, Utc::now().to_rfc3339(), request_id],
            )?;
            Ok(true)
        })
        .map(|transitioned| {
            if !transitioned {
                warn!(request_id, "ignored terminal-state transition attempt (idempotent no-op)");
            }
            transitioned
        })
    }

    // ── Tasks (spec §3, §4.5 start_task / update_task_progress / complete_task) ──

    pub fn create_task(&self, agent_id: &str, name: &str, description: Option<&str>) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        self.with_write_txn("create_task", |tx| {
            tx.execute(
                "INSERT INTO tasks (task_id, agent_id, name, description, status, progress, started_at, completed_at, outputs, metrics)
                 VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, NULL, NULL, NULL)",
                params![task_id, agent_id, name, description, Utc::now().to_rfc3339()],
            )
        })?;
        Ok(task_id)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT task_id, agent_id, name, description, status, progress, started_at, completed_at, outputs, metrics
             FROM tasks WHERE task_id = ?1",
            params![task_id],
            row_to_task,
        )
        .optional()
        .map_err(|source| StoreError::Write { operation: "get_task".into(), source })
    }

    /// Update progress. Ignored (returns `false`) if the task is already
    /// terminal, or if `progress` would move backwards (spec §8 "progress
    /// is monotonically non-decreasing until status becomes terminal").
    pub fn update_task_progress(
        &self,
        task_id: &str,
        progress: u8,
        outputs: Option<&serde_json::Value>,
    ) -> Result<bool> {
        self.with_write_txn("update_task_progress", |tx| {
            let row: Option<(String, u8)> = tx
                .query_row(
                    "SELECT status, progress FROM tasks WHERE task_id = ?1",
                    params![task_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((status_str, current_progress)) = row else {
                return Ok(false);
            };
            let status = TaskStatus::parse(&status_str).unwrap_or(TaskStatus::Pending);
            if status.is_terminal() || progress < current_progress {
                return Ok(false);
            }
            let next_status = if status == TaskStatus::Pending { TaskStatus::Active } else { status };
            tx.execute(
                "UPDATE tasks SET status = ?1, progress = ?2, outputs = ?3 WHERE task_id = ?4",
                params![
                    next_status.as_str(),
                    progress,
                    outputs.map(|v| v.to_string()),
                    task_id
                ],
            )?;
            Ok(true)
        })
        .map(|updated| {
            if !updated {
                warn!(task_id, "ignored non-monotonic or post-terminal task progress update");
            }
            updated
        })
    }

    /// Finalize a task. `status` must be `Completed` or `Failed`; ignored
    /// if the task is already terminal.
    pub fn complete_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        outputs: Option<&serde_json::Value>,
        metrics: Option<&serde_json::Value>,
    ) -> Result<bool> {
        debug_assert!(status.is_terminal(), "complete_task requires a terminal status");
        self.with_write_txn("complete_task", |tx| {
            let current: Option<String> = tx
                .query_row("SELECT status FROM tasks WHERE task_id = ?1", params![task_id], |row| row.get(0))
                .optional()?;
            let Some(current) = current else {
                return Ok(false);
            };
            if TaskStatus::parse(&current).unwrap_or(TaskStatus::Pending).is_terminal() {
                return Ok(false);
            }
            let progress = if status == TaskStatus::Completed { 100 } else {
                tx.query_row("SELECT progress FROM tasks WHERE task_id = ?1", params![task_id], |row| row.get(0))?
            };
            tx.execute(
                "UPDATE tasks SET status = ?1, progress = ?2, completed_at = ?3, outputs = ?4, metrics = ?5 WHERE task_id = ?6",
                params![
                    status.as_str(),
                    progress,
                    Utc::now().to_rfc3339(),
                    outputs.map(|v| v.to_string()),
                    metrics.map(|v| v.to_string()),
                    task_id
                ],
            )?;
            Ok(true)
        })
    }

    // ── Read-through cache (spec §3, §4.3 caching) ────────────────────────

    /// Fetch a cached payload regardless of age; callers compare
    /// `fetched_at` against their own TTL (staleness is enforced in code,
    /// not SQL, per spec §3).
    pub fn get_cached(&self, scope: CacheScope, key: &str) -> Option<(String, DateTime<Utc>)> {
        let result = (|| -> Result<Option<(String, DateTime<Utc>)>> {
            let conn = self.read_conn()?;
            conn.query_row(
                "SELECT payload, fetched_at FROM cache_entries WHERE scope = ?1 AND key = ?2",
                params![scope.as_str(), key],
                |row| {
                    let payload: String = row.get(0)?;
                    let fetched_at: String = row.get(1)?;
                    Ok((payload, fetched_at))
                },
            )
            .optional()
            .map_err(|source| StoreError::Write { operation: "get_cached".into(), source })
            .map(|opt| opt.map(|(payload, fetched_at)| (payload, parse_dt(&fetched_at))))
        })();
        result.unwrap_or_else(|err| {
            warn!(%err, "cache read failed; treating as miss");
            None
        })
    }

    pub fn put_cached(&self, scope: CacheScope, key: &str, payload: &str) -> Result<()> {
        self.with_write_txn("put_cached", |tx| {
            tx.execute(
                "INSERT INTO cache_entries (scope, key, payload, fetched_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(scope, key) DO UPDATE SET payload = excluded.payload, fetched_at = excluded.fetched_at",
                params![scope.as_str(), key, payload, Utc::now().to_rfc3339()],
            )
        })
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_afk_state(row: &rusqlite::Row) -> rusqlite::Result<AfkState> {
    let is_afk: i64 = row.get(0)?;
    let reason: Option<String> = row.get(1)?;
    let auto_return_at: Option<String> = row.get(2)?;
    let updated_at: String = row.get(3)?;
    Ok(AfkState {
        is_afk: is_afk != 0,
        reason,
        auto_return_at: auto_return_at.map(|s| parse_dt(&s)),
        updated_at: parse_dt(&updated_at),
    })
}

fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<Agent> {
    let metadata: String = row.get(3)?;
    Ok(Agent {
        agent_id: row.get(0)?,
        agent_type: row.get(1)?,
        created_at: parse_dt(&row.get::<_, String>(2)?),
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
    })
}

fn row_to_instance(row: &rusqlite::Row) -> rusqlite::Result<AgentInstance> {
    Ok(AgentInstance {
        instance_id: row.get(0)?,
        agent_id: row.get(1)?,
        session_id: row.get(2)?,
        project_dir: row.get(3)?,
        host: row.get(4)?,
        started_at: parse_dt(&row.get::<_, String>(5)?),
    })
}

fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<InputRequest> {
    let options: String = row.get(4)?;
    let status: String = row.get(5)?;
    let responded_at: Option<String> = row.get(7)?;
    Ok(InputRequest {
        request_id: row.get(0)?,
        agent_id: row.get(1)?,
        question: row.get(2)?,
        context: row.get(3)?,
        options: serde_json::from_str(&options).unwrap_or_default(),
        status: RequestStatus::parse(&status).unwrap_or(RequestStatus::Pending),
        created_at: parse_dt(&row.get::<_, String>(6)?),
        responded_at: responded_at.map(|s| parse_dt(&s)),
        response: row.get(8)?,
    })
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let status: String = row.get(4)?;
    let progress: i64 = row.get(5)?;
    let completed_at: Option<String> = row.get(7)?;
    let outputs: Option<String> = row.get(8)?;
    let metrics: Option<String> = row.get(9)?;
    Ok(Task {
        task_id: row.get(0)?,
        agent_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Pending),
        progress: progress.clamp(0, 100) as u8,
        started_at: parse_dt(&row.get::<_, String>(6)?),
        completed_at: completed_at.map(|s| parse_dt(&s)),
        outputs: outputs.and_then(|s| serde_json::from_str(&s).ok()),
        metrics: metrics.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = Store::init(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn init_creates_afk_row() {
        let (_dir, store) = temp_store();
        let afk = store.get_afk().unwrap();
        assert!(!afk.is_afk);
    }

    #[test]
    fn init_twice_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        Store::init(&path).unwrap();
        let store2 = Store::init(&path).unwrap();
        assert!(!store2.get_afk().unwrap().is_afk);
    }

    #[test]
    fn set_afk_enable_twice_keeps_one_row_latest_params() {
        let (_dir, store) = temp_store();
        store.set_afk(true, Some("lunch".into()), None).unwrap();
        store.set_afk(true, Some("meeting".into()), None).unwrap();
        let afk = store.get_afk().unwrap();
        assert!(afk.is_afk);
        assert_eq!(afk.reason.as_deref(), Some("meeting"));
    }

    #[test]
    fn register_same_agent_type_twice_one_agent_two_instances() {
        let (_dir, store) = temp_store();
        store.upsert_agent("a1", "coder", &serde_json::json!({})).unwrap();
        store.upsert_agent("a1", "coder", &serde_json::json!({})).unwrap();
        store.create_instance("a1", None, None, None).unwrap();
        store.create_instance("a1", None, None, None).unwrap();
        assert!(store.get_agent("a1").unwrap().is_some());
        let instances = store.list_instances(10);
        assert_eq!(instances.iter().filter(|i| i.agent_id == "a1").count(), 2);
    }

    #[test]
    fn request_lifecycle_pending_to_answered() {
        let (_dir, store) = temp_store();
        store.upsert_agent("a1", "coder", &serde_json::json!({})).unwrap();
        let id = store.create_request("a1", "Go?", None, &["Y".into(), "N".into()]).unwrap();
        let req = store.get_request(&id).unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        let transitioned = store.transition_request(&id, RequestStatus::Answered, Some("Y")).unwrap();
        assert!(transitioned);
        let req = store.get_request(&id).unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Answered);
        assert_eq!(req.response.as_deref(), Some("Y"));
    }

    #[test]
    fn request_terminal_transition_is_final_idempotent() {
        let (_dir, store) = temp_store();
        store.upsert_agent("a1", "coder", &serde_json::json!({})).unwrap();
        let id = store.create_request("a1", "Go?", None, &[]).unwrap();
        assert!(store.transition_request(&id, RequestStatus::Answered, Some("Y")).unwrap());
        // Second terminal transition attempt is ignored.
        let second = store.transition_request(&id, RequestStatus::Timeout, None).unwrap();
        assert!(!second);
        let req = store.get_request(&id).unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Answered);
    }

    #[test]
    fn list_pending_for_agent_excludes_terminal() {
        let (_dir, store) = temp_store();
        store.upsert_agent("a1", "coder", &serde_json::json!({})).unwrap();
        let pending = store.create_request("a1", "Q1", None, &[]).unwrap();
        let answered = store.create_request("a1", "Q2", None, &[]).unwrap();
        store.transition_request(&answered, RequestStatus::Answered, Some("x")).unwrap();
        let still_pending = store.list_pending_for_agent("a1");
        assert_eq!(still_pending.len(), 1);
        assert_eq!(still_pending[0].request_id, pending);
    }

    #[test]
    fn task_progress_is_monotonic() {
        let (_dir, store) = temp_store();
        store.upsert_agent("a1", "coder", &serde_json::json!({})).unwrap();
        let task_id = store.create_task("a1", "build", None).unwrap();
        assert!(store.update_task_progress(&task_id, 10, None).unwrap());
        assert!(store.update_task_progress(&task_id, 50, None).unwrap());
        // Attempting to move backwards is ignored.
        assert!(!store.update_task_progress(&task_id, 20, None).unwrap());
        let task = store.get_task(&task_id).unwrap().unwrap();
        assert_eq!(task.progress, 50);
        assert_eq!(task.status, TaskStatus::Active);
    }

    #[test]
    fn task_complete_sets_completed_at_and_is_terminal() {
        let (_dir, store) = temp_store();
        store.upsert_agent("a1", "coder", &serde_json::json!({})).unwrap();
        let task_id = store.create_task("a1", "build", None).unwrap();
        store.update_task_progress(&task_id, 40, None).unwrap();
        assert!(store.complete_task(&task_id, TaskStatus::Completed, None, None).unwrap());
        let task = store.get_task(&task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(task.completed_at.is_some());
        // Further progress updates after terminal are ignored.
        assert!(!store.update_task_progress(&task_id, 100, None).unwrap());
    }

    #[test]
    fn cache_round_trip() {
        let (_dir, store) = temp_store();
        store.put_cached(CacheScope::Streams, "flags=false", r#"[{"name":"general"}]"#).unwrap();
        let (payload, _fetched_at) = store.get_cached(CacheScope::Streams, "flags=false").unwrap();
        assert!(payload.contains("general"));
    }

    #[test]
    fn cache_miss_returns_none() {
        let (_dir, store) = temp_store();
        assert!(store.get_cached(CacheScope::Users, "nope").is_none());
    }

    #[test]
    fn concurrent_reads_do_not_block_on_each_other() {
        let (_dir, store) = temp_store();
        store.upsert_agent("a1", "coder", &serde_json::json!({})).unwrap();
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.get_agent("a1").unwrap().is_some()
            }));
        }
        for h in handles {
            assert!(h.join().unwrap());
        }
    }
}
