//! Teams and their member and project sets.

use super::{Database, query_ids};
use crate::error::ServiceError;
use crate::types::{EntityKind, Id, Page, PageRequest, Team};
use crate::validation::{TeamInput, ValidTeam};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

fn load_team_links(conn: &Connection, team: &mut Team) -> Result<()> {
    team.members = query_ids(
        conn,
        "SELECT worker_id FROM team_members WHERE team_id = ?1 ORDER BY worker_id",
        team.id,
    )?;
    team.projects = query_ids(
        conn,
        "SELECT project_id FROM team_projects WHERE team_id = ?1 ORDER BY project_id",
        team.id,
    )?;
    Ok(())
}

fn sync_team_links(conn: &Connection, team_id: Id, valid: &ValidTeam) -> Result<()> {
    conn.execute("DELETE FROM team_members WHERE team_id = ?1", params![team_id])?;
    conn.execute("DELETE FROM team_projects WHERE team_id = ?1", params![team_id])?;
    for worker_id in &valid.members {
        conn.execute(
            "INSERT INTO team_members (team_id, worker_id) VALUES (?1, ?2)",
            params![team_id, worker_id],
        )?;
    }
    for project_id in &valid.projects {
        conn.execute(
            "INSERT INTO team_projects (team_id, project_id) VALUES (?1, ?2)",
            params![team_id, project_id],
        )?;
    }
    Ok(())
}

fn query_teams<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Team>> {
    let mut stmt = conn.prepare(sql)?;
    let mut teams = stmt
        .query_map(params, |row| {
            Ok(Team {
                id: row.get(0)?,
                name: row.get(1)?,
                members: Vec::new(),
                projects: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for team in &mut teams {
        load_team_links(conn, team)?;
    }
    Ok(teams)
}

pub(crate) fn get_team_internal(conn: &Connection, id: Id) -> Result<Option<Team>> {
    let name: Option<String> = conn
        .query_row("SELECT name FROM teams WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;

    match name {
        Some(name) => {
            let mut team = Team {
                id,
                name,
                members: Vec::new(),
                projects: Vec::new(),
            };
            load_team_links(conn, &mut team)?;
            Ok(Some(team))
        }
        None => Ok(None),
    }
}

pub(crate) fn teams_for_worker_internal(conn: &Connection, worker_id: Id) -> Result<Vec<Team>> {
    query_teams(
        conn,
        "SELECT t.id, t.name FROM teams t
         JOIN team_members m ON m.team_id = t.id
         WHERE m.worker_id = ?1 ORDER BY t.id",
        params![worker_id],
    )
}

pub(crate) fn teams_for_project_internal(conn: &Connection, project_id: Id) -> Result<Vec<Team>> {
    query_teams(
        conn,
        "SELECT t.id, t.name FROM teams t
         JOIN team_projects tp ON tp.team_id = t.id
         WHERE tp.project_id = ?1 ORDER BY t.id",
        params![project_id],
    )
}

impl Database {
    pub fn create_team(&self, input: &TeamInput) -> Result<Team> {
        self.with_transaction(|tx| {
            let valid = input.validate(tx)?;
            tx.execute("INSERT INTO teams (name) VALUES (?1)", params![&valid.name])?;
            let id = tx.last_insert_rowid();
            sync_team_links(tx, id, &valid)?;
            Ok(Team {
                id,
                name: valid.name,
                members: valid.members,
                projects: valid.projects,
            })
        })
    }

    pub fn get_team(&self, id: Id) -> Result<Option<Team>> {
        self.with_conn(|conn| get_team_internal(conn, id))
    }

    /// Replace a team's name, members and projects.
    pub fn update_team(&self, id: Id, input: &TeamInput) -> Result<Team> {
        self.with_transaction(|tx| {
            if get_team_internal(tx, id)?.is_none() {
                return Err(ServiceError::not_found(EntityKind::Team, id).into());
            }
            let valid = input.validate(tx)?;
            tx.execute(
                "UPDATE teams SET name = ?1 WHERE id = ?2",
                params![&valid.name, id],
            )?;
            sync_team_links(tx, id, &valid)?;
            Ok(Team {
                id,
                name: valid.name,
                members: valid.members,
                projects: valid.projects,
            })
        })
    }

    /// Delete a team. Its workers and projects are untouched.
    pub fn delete_team(&self, id: Id) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM teams WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(ServiceError::not_found(EntityKind::Team, id).into());
            }
            Ok(())
        })
    }

    /// List teams, optionally filtered by a case-insensitive name fragment.
    pub fn list_teams(&self, name: Option<&str>, request: PageRequest) -> Result<Page<Team>> {
        let needle = name.map(str::trim).filter(|s| !s.is_empty());
        self.with_conn(|conn| {
            let filter = if needle.is_some() {
                "WHERE icontains(t.name, ?1)"
            } else {
                "WHERE ?1 IS NULL"
            };

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM teams t {}", filter),
                params![needle],
                |row| row.get(0),
            )?;
            let items = query_teams(
                conn,
                &format!(
                    "SELECT t.id, t.name FROM teams t {} ORDER BY t.id LIMIT ?2 OFFSET ?3",
                    filter
                ),
                params![needle, request.limit(), request.offset()],
            )?;
            Ok(Page::new(items, request, total))
        })
    }
}
