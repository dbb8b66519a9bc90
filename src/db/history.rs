//! Task lifecycle audit log.
//!
//! One row per transition, written in the same transaction as the change it
//! records. Completion history per worker is derived from this log and the task
//! rows rather than kept as separate sets.

use super::{Database, now_ms};
use crate::types::{Id, TaskHistoryEvent};
use anyhow::Result;
use rusqlite::{Connection, params};

pub const EVENT_CREATED: &str = "created";
pub const EVENT_COMPLETED: &str = "completed";
pub const EVENT_REOPENED: &str = "reopened";
pub const EVENT_UPDATED: &str = "updated";

pub(crate) fn record_event(
    conn: &Connection,
    task_id: Id,
    worker_id: Option<Id>,
    event: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO task_history (task_id, worker_id, event, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![task_id, worker_id, event, now_ms()],
    )?;
    Ok(())
}

pub(crate) fn task_history_internal(conn: &Connection, task_id: Id) -> Result<Vec<TaskHistoryEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_id, worker_id, event, timestamp
         FROM task_history WHERE task_id = ?1
         ORDER BY id",
    )?;
    let events = stmt
        .query_map(params![task_id], |row| {
            Ok(TaskHistoryEvent {
                id: row.get(0)?,
                task_id: row.get(1)?,
                worker_id: row.get(2)?,
                event: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

impl Database {
    /// History of a task, oldest first.
    pub fn get_task_history(&self, task_id: Id) -> Result<Vec<TaskHistoryEvent>> {
        self.with_conn(|conn| task_history_internal(conn, task_id))
    }
}
