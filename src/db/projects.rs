//! Project CRUD.

use super::Database;
use crate::config::OnDelete;
use crate::error::ServiceError;
use crate::types::{EntityKind, Id, Page, PageRequest, Project};
use crate::validation::ProjectInput;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

fn parse_project_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

pub(crate) fn get_project_internal(conn: &Connection, id: Id) -> Result<Option<Project>> {
    Ok(conn
        .query_row(
            "SELECT id, name, description FROM projects WHERE id = ?1",
            params![id],
            parse_project_row,
        )
        .optional()?)
}

pub(crate) fn get_projects_many(conn: &Connection, ids: &[Id]) -> Result<Vec<Project>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, name, description FROM projects WHERE id IN ({}) ORDER BY id",
        super::placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let projects = stmt
        .query_map(params_from_iter(ids.iter()), parse_project_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
}

/// Projects holding at least one task assigned to the worker.
pub(crate) fn projects_for_worker_internal(conn: &Connection, worker_id: Id) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT p.id, p.name, p.description FROM projects p
         JOIN tasks t ON t.project_id = p.id
         JOIN task_assignees a ON a.task_id = t.id
         WHERE a.worker_id = ?1
         ORDER BY p.id",
    )?;
    let projects = stmt
        .query_map(params![worker_id], parse_project_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
}

impl Database {
    pub fn create_project(&self, input: &ProjectInput) -> Result<Project> {
        let valid = input.validate()?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (name, description) VALUES (?1, ?2)",
                params![&valid.name, &valid.description],
            )?;
            Ok(Project {
                id: conn.last_insert_rowid(),
                name: valid.name,
                description: valid.description,
            })
        })
    }

    pub fn get_project(&self, id: Id) -> Result<Option<Project>> {
        self.with_conn(|conn| get_project_internal(conn, id))
    }

    pub fn update_project(&self, id: Id, input: &ProjectInput) -> Result<Project> {
        let valid = input.validate()?;
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE projects SET name = ?1, description = ?2 WHERE id = ?3",
                params![&valid.name, &valid.description, id],
            )?;
            if updated == 0 {
                return Err(ServiceError::not_found(EntityKind::Project, id).into());
            }
            Ok(Project {
                id,
                name: valid.name,
                description: valid.description,
            })
        })
    }

    /// Delete a project. Its tasks follow `policy`; team links always go.
    pub fn delete_project(&self, id: Id, policy: OnDelete) -> Result<()> {
        self.with_transaction(|tx| {
            if get_project_internal(tx, id)?.is_none() {
                return Err(ServiceError::not_found(EntityKind::Project, id).into());
            }
            if policy == OnDelete::Restrict {
                let count: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM tasks WHERE project_id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                if count > 0 {
                    return Err(ServiceError::conflict(format!(
                        "project {} still has {} task(s)",
                        id, count
                    ))
                    .into());
                }
            }
            tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    pub fn list_projects(&self, request: PageRequest) -> Result<Page<Project>> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
            let mut stmt = conn.prepare(
                "SELECT id, name, description FROM projects ORDER BY id LIMIT ?1 OFFSET ?2",
            )?;
            let items = stmt
                .query_map(params![request.limit(), request.offset()], parse_project_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Page::new(items, request, total))
        })
    }
}
