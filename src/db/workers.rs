//! Worker CRUD, credentials and capability grants.

use super::{Database, now_ms, placeholders};
use crate::error::ServiceError;
use crate::types::{EntityKind, Id, Page, PageRequest, Worker};
use crate::validation::{MIN_PASSWORD_LEN, ValidWorker, WorkerInput};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

const WORKER_COLUMNS: &str =
    "id, username, first_name, last_name, email, position_id, is_superuser, created_at";

fn parse_worker_row(row: &Row<'_>) -> rusqlite::Result<Worker> {
    Ok(Worker {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        position_id: row.get(5)?,
        is_superuser: row.get::<_, i32>(6)? != 0,
        capabilities: Vec::new(),
        created_at: row.get(7)?,
    })
}

fn load_capabilities(conn: &Connection, worker: &mut Worker) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT entity_kind FROM worker_capabilities WHERE worker_id = ?1 ORDER BY entity_kind",
    )?;
    let kinds = stmt
        .query_map(params![worker.id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    // Unknown kinds are skipped.
    let mut capabilities: Vec<EntityKind> = kinds.iter().filter_map(|k| k.parse().ok()).collect();
    capabilities.sort();
    worker.capabilities = capabilities;
    Ok(())
}

fn write_capabilities(conn: &Connection, worker_id: Id, kinds: &[EntityKind]) -> Result<()> {
    conn.execute(
        "DELETE FROM worker_capabilities WHERE worker_id = ?1",
        params![worker_id],
    )?;
    let mut stmt =
        conn.prepare("INSERT INTO worker_capabilities (worker_id, entity_kind) VALUES (?1, ?2)")?;
    for kind in kinds {
        stmt.execute(params![worker_id, kind.as_str()])?;
    }
    Ok(())
}

pub(crate) fn get_worker_internal(conn: &Connection, id: Id) -> Result<Option<Worker>> {
    let worker = conn
        .query_row(
            &format!("SELECT {} FROM workers WHERE id = ?1", WORKER_COLUMNS),
            params![id],
            parse_worker_row,
        )
        .optional()?;

    match worker {
        Some(mut worker) => {
            load_capabilities(conn, &mut worker)?;
            Ok(Some(worker))
        }
        None => Ok(None),
    }
}

/// Fetch several workers in id order. Unknown ids are skipped.
pub(crate) fn get_workers_many(conn: &Connection, ids: &[Id]) -> Result<Vec<Worker>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {} FROM workers WHERE id IN ({}) ORDER BY id",
        WORKER_COLUMNS,
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut workers = stmt
        .query_map(params_from_iter(ids.iter()), parse_worker_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for worker in &mut workers {
        load_capabilities(conn, worker)?;
    }
    Ok(workers)
}

fn insert_worker(conn: &Connection, valid: &ValidWorker, password_hash: &str) -> Result<Worker> {
    let now = now_ms();
    conn.execute(
        "INSERT INTO workers (username, first_name, last_name, email, position_id, is_superuser, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &valid.username,
            &valid.first_name,
            &valid.last_name,
            &valid.email,
            valid.position_id,
            valid.is_superuser as i32,
            password_hash,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    write_capabilities(conn, id, &valid.capabilities)?;

    Ok(Worker {
        id,
        username: valid.username.clone(),
        first_name: valid.first_name.clone(),
        last_name: valid.last_name.clone(),
        email: valid.email.clone(),
        position_id: valid.position_id,
        is_superuser: valid.is_superuser,
        capabilities: valid.capabilities.clone(),
        created_at: now,
    })
}

/// Hash for a password that can pass validation. Runs before the connection
/// lock is taken; passwords that validation will reject are not hashed.
fn hash_password(password: &str, bcrypt_cost: u32) -> Result<Option<String>> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Ok(None);
    }
    Ok(Some(bcrypt::hash(password, bcrypt_cost)?))
}

impl Database {
    /// Create a worker, hashing the password with the given bcrypt cost.
    pub fn create_worker(&self, input: &WorkerInput, bcrypt_cost: u32) -> Result<Worker> {
        let hash = hash_password(&input.password, bcrypt_cost)?;
        self.with_transaction(|tx| {
            let valid = input.validate(tx, None)?;
            let hash = hash.as_deref().ok_or_else(|| {
                ServiceError::Internal("validated password was not hashed".to_string())
            })?;
            let worker = insert_worker(tx, &valid, hash)?;
            debug!(worker_id = worker.id, username = %worker.username, "Created worker");
            Ok(worker)
        })
    }

    pub fn get_worker(&self, id: Id) -> Result<Option<Worker>> {
        self.with_conn(|conn| get_worker_internal(conn, id))
    }

    pub fn get_worker_by_username(&self, username: &str) -> Result<Option<Worker>> {
        self.with_conn(|conn| {
            let id: Option<Id> = conn
                .query_row(
                    "SELECT id FROM workers WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()?;
            match id {
                Some(id) => get_worker_internal(conn, id),
                None => Ok(None),
            }
        })
    }

    /// Replace a worker's fields. An empty password keeps the stored hash.
    pub fn update_worker(&self, id: Id, input: &WorkerInput, bcrypt_cost: u32) -> Result<Worker> {
        let hash = hash_password(&input.password, bcrypt_cost)?;
        self.with_transaction(|tx| {
            if get_worker_internal(tx, id)?.is_none() {
                return Err(ServiceError::not_found(EntityKind::Worker, id).into());
            }
            let valid = input.validate(tx, Some(id))?;

            tx.execute(
                "UPDATE workers SET username = ?1, first_name = ?2, last_name = ?3, email = ?4,
                        position_id = ?5, is_superuser = ?6
                 WHERE id = ?7",
                params![
                    &valid.username,
                    &valid.first_name,
                    &valid.last_name,
                    &valid.email,
                    valid.position_id,
                    valid.is_superuser as i32,
                    id
                ],
            )?;
            if valid.password.is_some() {
                let hash = hash.as_deref().ok_or_else(|| {
                    ServiceError::Internal("validated password was not hashed".to_string())
                })?;
                tx.execute(
                    "UPDATE workers SET password_hash = ?1 WHERE id = ?2",
                    params![hash, id],
                )?;
            }
            write_capabilities(tx, id, &valid.capabilities)?;

            get_worker_internal(tx, id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Worker, id).into())
        })
    }

    /// Delete a worker. Assignments, memberships and sessions go with it; tasks stay.
    pub fn delete_worker(&self, id: Id) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM workers WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(ServiceError::not_found(EntityKind::Worker, id).into());
            }
            Ok(())
        })
    }

    /// List workers, optionally filtered by a case-insensitive username fragment.
    pub fn list_workers(&self, username: Option<&str>, request: PageRequest) -> Result<Page<Worker>> {
        let needle = username.map(str::trim).filter(|s| !s.is_empty());
        self.with_conn(|conn| {
            let filter = if needle.is_some() {
                "WHERE icontains(username, ?1)"
            } else {
                "WHERE ?1 IS NULL"
            };

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM workers {}", filter),
                params![needle],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM workers {} ORDER BY id LIMIT ?2 OFFSET ?3",
                WORKER_COLUMNS, filter
            ))?;
            let mut items = stmt
                .query_map(
                    params![needle, request.limit(), request.offset()],
                    parse_worker_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            for worker in &mut items {
                load_capabilities(conn, worker)?;
            }

            Ok(Page::new(items, request, total))
        })
    }

    /// The worker whose username and password match, if any.
    pub fn verify_credentials(&self, username: &str, password: &str) -> Result<Option<Worker>> {
        let stored: Option<(Id, String)> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, password_hash FROM workers WHERE username = ?1",
                    params![username],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?)
        })?;

        let Some((id, hash)) = stored else {
            return Ok(None);
        };
        // Verification runs outside the connection lock.
        if !bcrypt::verify(password, &hash)? {
            return Ok(None);
        }
        self.get_worker(id)
    }

    /// Grant or revoke the manage capability for one kind.
    pub fn set_capability(&self, worker_id: Id, kind: EntityKind, granted: bool) -> Result<Worker> {
        self.with_transaction(|tx| {
            if get_worker_internal(tx, worker_id)?.is_none() {
                return Err(ServiceError::not_found(EntityKind::Worker, worker_id).into());
            }
            if granted {
                tx.execute(
                    "INSERT OR IGNORE INTO worker_capabilities (worker_id, entity_kind) VALUES (?1, ?2)",
                    params![worker_id, kind.as_str()],
                )?;
            } else {
                tx.execute(
                    "DELETE FROM worker_capabilities WHERE worker_id = ?1 AND entity_kind = ?2",
                    params![worker_id, kind.as_str()],
                )?;
            }
            get_worker_internal(tx, worker_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Worker, worker_id).into())
        })
    }
}
