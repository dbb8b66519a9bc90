//! Positions, task types and tags: records that carry nothing but a name.

use super::Database;
use crate::config::OnDelete;
use crate::error::ServiceError;
use crate::types::{EntityKind, Id, NamedRecord, Page, PageRequest};
use crate::validation::NamedInput;
use anyhow::Result;
use rusqlite::{Connection, params, params_from_iter};

/// Which name-only table an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedTable {
    Position,
    TaskType,
    Tag,
}

impl NamedTable {
    pub fn kind(&self) -> EntityKind {
        match self {
            NamedTable::Position => EntityKind::Position,
            NamedTable::TaskType => EntityKind::TaskType,
            NamedTable::Tag => EntityKind::Tag,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            NamedTable::Position => "positions",
            NamedTable::TaskType => "task_types",
            NamedTable::Tag => "tags",
        }
    }

    /// Records that require this one, as `(table, column, label)`.
    /// Tags are only linked through a junction table and never block deletion.
    fn dependents(&self) -> Option<(&'static str, &'static str, &'static str)> {
        match self {
            NamedTable::Position => Some(("workers", "position_id", "worker(s)")),
            NamedTable::TaskType => Some(("tasks", "task_type_id", "task(s)")),
            NamedTable::Tag => None,
        }
    }
}

pub(crate) fn get_named_internal(conn: &Connection, table: NamedTable, id: Id) -> Result<Option<NamedRecord>> {
    let sql = format!("SELECT id, name FROM {} WHERE id = ?1", table.table());
    let result = conn.query_row(&sql, params![id], |row| {
        Ok(NamedRecord {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    });

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fetch several records, in id order. Unknown ids are skipped.
pub(crate) fn get_named_many(conn: &Connection, table: NamedTable, ids: &[Id]) -> Result<Vec<NamedRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, name FROM {} WHERE id IN ({}) ORDER BY id",
        table.table(),
        super::placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok(NamedRecord {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

impl Database {
    pub fn create_named(&self, table: NamedTable, input: &NamedInput) -> Result<NamedRecord> {
        let name = input.validate()?;
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO {} (name) VALUES (?1)", table.table()),
                params![&name],
            )?;
            Ok(NamedRecord {
                id: conn.last_insert_rowid(),
                name,
            })
        })
    }

    pub fn get_named(&self, table: NamedTable, id: Id) -> Result<Option<NamedRecord>> {
        self.with_conn(|conn| get_named_internal(conn, table, id))
    }

    /// First record with exactly this name, by id.
    pub fn find_named(&self, table: NamedTable, name: &str) -> Result<Option<NamedRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, name FROM {} WHERE name = ?1 ORDER BY id LIMIT 1",
                table.table()
            );
            match conn.query_row(&sql, params![name], |row| {
                Ok(NamedRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            }) {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn update_named(&self, table: NamedTable, id: Id, input: &NamedInput) -> Result<NamedRecord> {
        let name = input.validate()?;
        self.with_conn(|conn| {
            let updated = conn.execute(
                &format!("UPDATE {} SET name = ?1 WHERE id = ?2", table.table()),
                params![&name, id],
            )?;
            if updated == 0 {
                return Err(ServiceError::not_found(table.kind(), id).into());
            }
            Ok(NamedRecord { id, name })
        })
    }

    /// Delete a record. Under `OnDelete::Restrict` the deletion is refused while
    /// any worker or task still requires the record; under `Cascade` those go too.
    pub fn delete_named(&self, table: NamedTable, id: Id, policy: OnDelete) -> Result<()> {
        self.with_transaction(|tx| {
            if get_named_internal(tx, table, id)?.is_none() {
                return Err(ServiceError::not_found(table.kind(), id).into());
            }

            if let (OnDelete::Restrict, Some((dep_table, column, label))) = (policy, table.dependents()) {
                let count: i64 = tx.query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", dep_table, column),
                    params![id],
                    |row| row.get(0),
                )?;
                if count > 0 {
                    return Err(ServiceError::conflict(format!(
                        "{} {} is still referenced by {} {}",
                        table.kind(),
                        id,
                        count,
                        label
                    ))
                    .into());
                }
            }

            tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", table.table()),
                params![id],
            )?;
            Ok(())
        })
    }

    pub fn list_named(&self, table: NamedTable, request: PageRequest) -> Result<Page<NamedRecord>> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table.table()),
                [],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT id, name FROM {} ORDER BY id LIMIT ?1 OFFSET ?2",
                table.table()
            ))?;
            let items = stmt
                .query_map(params![request.limit(), request.offset()], |row| {
                    Ok(NamedRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Page::new(items, request, total))
        })
    }
}
