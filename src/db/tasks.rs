//! Task CRUD and the completion transition.

use super::history::{EVENT_COMPLETED, EVENT_CREATED, EVENT_REOPENED, EVENT_UPDATED, record_event};
use super::{Database, now_ms, query_ids};
use crate::auth::{Identity, may_complete};
use crate::error::ServiceError;
use crate::types::{EntityKind, Id, Priority, Task};
use crate::validation::{DATE_FORMAT, TaskInput, ValidTask};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

pub(crate) const TASK_COLUMNS: &str = "t.id, t.name, t.description, t.deadline, t.is_completed, \
     t.priority, t.task_type_id, t.project_id, t.created_at, t.updated_at";

/// Map a row selected with `TASK_COLUMNS`. Assignees and tags are loaded separately.
pub fn parse_task_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let deadline: String = row.get(3)?;
    let deadline = NaiveDate::parse_from_str(&deadline, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let priority: String = row.get(5)?;
    let priority = priority.parse::<Priority>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;

    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        deadline,
        is_completed: row.get::<_, i32>(4)? != 0,
        priority,
        task_type_id: row.get(6)?,
        project_id: row.get(7)?,
        assigned: Vec::new(),
        tags: Vec::new(),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn load_task_links(conn: &Connection, task: &mut Task) -> Result<()> {
    task.assigned = query_ids(
        conn,
        "SELECT worker_id FROM task_assignees WHERE task_id = ?1 ORDER BY worker_id",
        task.id,
    )?;
    task.tags = query_ids(
        conn,
        "SELECT tag_id FROM task_tags WHERE task_id = ?1 ORDER BY tag_id",
        task.id,
    )?;
    Ok(())
}

/// Run a task query and load each row's links.
pub(crate) fn query_tasks<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let mut tasks = stmt
        .query_map(params, parse_task_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for task in &mut tasks {
        load_task_links(conn, task)?;
    }
    Ok(tasks)
}

pub(crate) fn get_task_internal(conn: &Connection, id: Id) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {} FROM tasks t WHERE t.id = ?1", TASK_COLUMNS),
            params![id],
            parse_task_row,
        )
        .optional()?;

    match task {
        Some(mut task) => {
            load_task_links(conn, &mut task)?;
            Ok(Some(task))
        }
        None => Ok(None),
    }
}

/// Tasks assigned to a worker, in id order.
pub(crate) fn tasks_for_worker_internal(conn: &Connection, worker_id: Id) -> Result<Vec<Task>> {
    query_tasks(
        conn,
        &format!(
            "SELECT {} FROM tasks t
             JOIN task_assignees a ON a.task_id = t.id
             WHERE a.worker_id = ?1
             ORDER BY t.id",
            TASK_COLUMNS
        ),
        params![worker_id],
    )
}

pub(crate) fn tasks_for_project_internal(conn: &Connection, project_id: Id) -> Result<Vec<Task>> {
    query_tasks(
        conn,
        &format!(
            "SELECT {} FROM tasks t WHERE t.project_id = ?1 ORDER BY t.id",
            TASK_COLUMNS
        ),
        params![project_id],
    )
}

/// Replace a task's assignee and tag sets.
fn sync_task_links(conn: &Connection, task_id: Id, valid: &ValidTask) -> Result<()> {
    conn.execute("DELETE FROM task_assignees WHERE task_id = ?1", params![task_id])?;
    conn.execute("DELETE FROM task_tags WHERE task_id = ?1", params![task_id])?;
    for worker_id in &valid.assigned {
        conn.execute(
            "INSERT INTO task_assignees (task_id, worker_id) VALUES (?1, ?2)",
            params![task_id, worker_id],
        )?;
    }
    for tag_id in &valid.tags {
        conn.execute(
            "INSERT INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
            params![task_id, tag_id],
        )?;
    }
    Ok(())
}

/// Outcome of a completion request that passed the ownership check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The task moved from open to completed.
    Completed(Task),
    /// The task was already completed; nothing changed.
    AlreadyCompleted(Task),
}

impl Database {
    /// Create a task with its assignees and tags.
    ///
    /// Validation, including the existence of every referenced record, runs in the
    /// same transaction as the inserts; a rejected input leaves nothing behind.
    pub fn create_task(&self, input: &TaskInput, actor: Option<Id>) -> Result<Task> {
        self.with_transaction(|tx| {
            let valid = input.validate(tx)?;
            let now = now_ms();

            tx.execute(
                "INSERT INTO tasks (name, description, deadline, is_completed, priority,
                                    task_type_id, project_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    &valid.name,
                    &valid.description,
                    valid.deadline.format(DATE_FORMAT).to_string(),
                    valid.is_completed as i32,
                    valid.priority.as_str(),
                    valid.task_type_id,
                    valid.project_id,
                    now,
                    now
                ],
            )?;
            let id = tx.last_insert_rowid();
            sync_task_links(tx, id, &valid)?;
            record_event(tx, id, actor, EVENT_CREATED)?;
            if valid.is_completed {
                record_event(tx, id, actor, EVENT_COMPLETED)?;
            }

            debug!(task_id = id, assigned = ?valid.assigned, "Created task");

            Ok(Task {
                id,
                name: valid.name,
                description: valid.description,
                deadline: valid.deadline,
                is_completed: valid.is_completed,
                priority: valid.priority,
                task_type_id: valid.task_type_id,
                project_id: valid.project_id,
                assigned: valid.assigned,
                tags: valid.tags,
                created_at: now,
                updated_at: now,
            })
        })
    }

    pub fn get_task(&self, id: Id) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, id))
    }

    /// Replace every field of a task, including its completion flag.
    pub fn update_task(&self, id: Id, input: &TaskInput, actor: Option<Id>) -> Result<Task> {
        self.with_transaction(|tx| {
            let existing = get_task_internal(tx, id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Task, id))?;
            let valid = input.validate(tx)?;
            let now = now_ms();

            tx.execute(
                "UPDATE tasks SET name = ?1, description = ?2, deadline = ?3, is_completed = ?4,
                        priority = ?5, task_type_id = ?6, project_id = ?7, updated_at = ?8
                 WHERE id = ?9",
                params![
                    &valid.name,
                    &valid.description,
                    valid.deadline.format(DATE_FORMAT).to_string(),
                    valid.is_completed as i32,
                    valid.priority.as_str(),
                    valid.task_type_id,
                    valid.project_id,
                    now,
                    id
                ],
            )?;
            sync_task_links(tx, id, &valid)?;

            let event = match (existing.is_completed, valid.is_completed) {
                (false, true) => EVENT_COMPLETED,
                (true, false) => EVENT_REOPENED,
                _ => EVENT_UPDATED,
            };
            record_event(tx, id, actor, event)?;

            get_task_internal(tx, id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Task, id).into())
        })
    }

    pub fn delete_task(&self, id: Id) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(ServiceError::not_found(EntityKind::Task, id).into());
            }
            Ok(())
        })
    }

    /// Mark a task completed on behalf of `viewer`.
    ///
    /// The load, the ownership check and the write happen under one transaction,
    /// so a concurrent reassignment cannot slip between check and write. Completing
    /// a completed task is a no-op and records nothing.
    pub fn complete_task(&self, task_id: Id, viewer: &Identity) -> Result<Completion> {
        self.with_transaction(|tx| {
            let task = get_task_internal(tx, task_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task_id))?;

            if task.is_completed {
                return Ok(Completion::AlreadyCompleted(task));
            }

            if !may_complete(&task, viewer) {
                return Err(ServiceError::forbidden(
                    "only an assigned worker or a superuser may complete this task",
                )
                .into());
            }

            let now = now_ms();
            let changed = tx.execute(
                "UPDATE tasks SET is_completed = 1, updated_at = ?1
                 WHERE id = ?2 AND is_completed = 0",
                params![now, task_id],
            )?;
            if changed == 0 {
                // Another process sharing the database file completed it first.
                let task = get_task_internal(tx, task_id)?
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task_id))?;
                return Ok(Completion::AlreadyCompleted(task));
            }

            let actor = viewer.principal().map(|p| p.worker_id);
            record_event(tx, task_id, actor, EVENT_COMPLETED)?;

            info!(task_id, worker_id = ?actor, "Task completed");

            Ok(Completion::Completed(Task {
                is_completed: true,
                updated_at: now,
                ..task
            }))
        })
    }

    pub fn tasks_for_worker(&self, worker_id: Id) -> Result<Vec<Task>> {
        self.with_conn(|conn| tasks_for_worker_internal(conn, worker_id))
    }
}
