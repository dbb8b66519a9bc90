//! Per-entity input schemas.
//!
//! Inputs hold what a form submitted, as strings, so a rejected submission can be
//! handed back unchanged next to its field errors. `validate` turns an input into
//! a typed record or a `ValidationFailed` listing every offending field. Checks
//! that need the store (references, uniqueness) take the connection the following
//! write will use; nothing here writes.

use crate::db::placeholders;
use crate::error::{FieldErrors, ServiceError, ServiceResult};
use crate::types::{EntityKind, Id, Priority};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Longest accepted name, matching the width of the original form fields.
pub const MAX_NAME_LEN: usize = 255;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 150;

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 8;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn required_text(errors: &mut FieldErrors, field: &str, value: &str, max: Option<usize>) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(field, "this field is required");
    } else if let Some(max) = max {
        if trimmed.chars().count() > max {
            errors.add(field, format!("must be at most {} characters", max));
        }
    }
    trimmed.to_string()
}

fn optional_text(errors: &mut FieldErrors, field: &str, value: &str, max: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() > max {
        errors.add(field, format!("must be at most {} characters", max));
    }
    trimmed.to_string()
}

/// HTML checkbox semantics: absent or empty is false.
pub fn parse_checkbox(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "" | "false" | "off" | "0" | "no" => Ok(false),
        "true" | "on" | "1" | "yes" => Ok(true),
        other => Err(format!("'{}' is not a boolean", other)),
    }
}

/// Parse a comma-separated id list, sorted and deduplicated.
pub fn parse_id_list(value: &str) -> Result<Vec<Id>, String> {
    let mut ids = BTreeSet::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = part
            .parse::<Id>()
            .map_err(|_| format!("'{}' is not a valid id", part))?;
        ids.insert(id);
    }
    Ok(ids.into_iter().collect())
}

fn parse_optional_id(value: &str) -> Result<Option<Id>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<Id>()
        .map(Some)
        .map_err(|_| format!("'{}' is not a valid id", trimmed))
}

fn id_list(errors: &mut FieldErrors, field: &str, value: &str) -> Vec<Id> {
    parse_id_list(value).unwrap_or_else(|reason| {
        errors.add(field, reason);
        Vec::new()
    })
}

fn optional_id(errors: &mut FieldErrors, field: &str, value: &str) -> Option<Id> {
    parse_optional_id(value).unwrap_or_else(|reason| {
        errors.add(field, reason);
        None
    })
}

fn required_id(errors: &mut FieldErrors, field: &str, value: &str) -> Option<Id> {
    let id = optional_id(errors, field, value);
    if id.is_none() && value.trim().is_empty() {
        errors.add(field, "this field is required");
    }
    id
}

fn checkbox(errors: &mut FieldErrors, field: &str, value: &str) -> bool {
    parse_checkbox(value).unwrap_or_else(|reason| {
        errors.add(field, reason);
        false
    })
}

/// Ids from `ids` that do not exist in `table`.
pub(crate) fn missing_ids(conn: &Connection, table: &'static str, ids: &[Id]) -> anyhow::Result<Vec<Id>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id FROM {} WHERE id IN ({})",
        table,
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let found: BTreeSet<Id> = stmt
        .query_map(params_from_iter(ids.iter()), |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
}

fn check_references(
    conn: &Connection,
    errors: &mut FieldErrors,
    field: &str,
    table: &'static str,
    ids: &[Id],
) -> ServiceResult<()> {
    let missing = missing_ids(conn, table, ids)?;
    if !missing.is_empty() {
        let listed: Vec<String> = missing.iter().map(Id::to_string).collect();
        errors.add(field, format!("unknown id(s): {}", listed.join(", ")));
    }
    Ok(())
}

/// Positions, task types and tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedInput {
    pub name: String,
}

impl NamedInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> ServiceResult<String> {
        let mut errors = FieldErrors::new();
        let name = required_text(&mut errors, "name", &self.name, Some(MAX_NAME_LEN));
        errors.into_result()?;
        Ok(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectInput {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidProject {
    pub name: String,
    pub description: String,
}

impl ProjectInput {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> ServiceResult<ValidProject> {
        let mut errors = FieldErrors::new();
        let name = required_text(&mut errors, "name", &self.name, Some(MAX_NAME_LEN));
        let description = required_text(&mut errors, "description", &self.description, None);
        errors.into_result()?;
        Ok(ValidProject { name, description })
    }
}

/// Team form. `members` and `projects` are comma-separated ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamInput {
    pub name: String,
    pub members: String,
    pub projects: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTeam {
    pub name: String,
    pub members: Vec<Id>,
    pub projects: Vec<Id>,
}

impl TeamInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn members(mut self, ids: &[Id]) -> Self {
        self.members = join_ids(ids);
        self
    }

    pub fn projects(mut self, ids: &[Id]) -> Self {
        self.projects = join_ids(ids);
        self
    }

    pub fn validate(&self, conn: &Connection) -> ServiceResult<ValidTeam> {
        let mut errors = FieldErrors::new();
        let name = required_text(&mut errors, "name", &self.name, Some(MAX_NAME_LEN));
        let members = id_list(&mut errors, "members", &self.members);
        let projects = id_list(&mut errors, "projects", &self.projects);
        check_references(conn, &mut errors, "members", "workers", &members)?;
        check_references(conn, &mut errors, "projects", "projects", &projects)?;
        errors.into_result()?;
        Ok(ValidTeam {
            name,
            members,
            projects,
        })
    }
}

/// Worker form. `password` is required on create; on update an empty password
/// keeps the current one. `capabilities` is a comma-separated list of entity kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerInput {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub position: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_superuser: String,
    pub capabilities: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidWorker {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub position_id: Id,
    pub password: Option<String>,
    pub is_superuser: bool,
    pub capabilities: Vec<EntityKind>,
}

impl WorkerInput {
    pub fn new(username: impl Into<String>, position_id: Id, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            position: position_id.to_string(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn names(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = "on".to_string();
        self
    }

    pub fn capabilities(mut self, kinds: &[EntityKind]) -> Self {
        self.capabilities = kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",");
        self
    }

    /// `existing` is the id of the worker being updated, `None` on create.
    pub fn validate(&self, conn: &Connection, existing: Option<Id>) -> ServiceResult<ValidWorker> {
        let mut errors = FieldErrors::new();

        let username = required_text(&mut errors, "username", &self.username, Some(MAX_USERNAME_LEN));
        if !username.is_empty()
            && !username
                .chars()
                .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
        {
            errors.add("username", "may contain only letters, digits and @/./+/-/_");
        }
        if !errors.contains("username") {
            let taken: Option<Id> = conn
                .query_row(
                    "SELECT id FROM workers WHERE username = ?1",
                    [&username],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some_and(|id| Some(id) != existing) {
                errors.add("username", "a worker with that username already exists");
            }
        }

        let first_name = optional_text(&mut errors, "first_name", &self.first_name, MAX_USERNAME_LEN);
        let last_name = optional_text(&mut errors, "last_name", &self.last_name, MAX_USERNAME_LEN);

        let email = self.email.trim().to_string();
        if !email.is_empty() {
            let valid = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
            if !valid {
                errors.add("email", "enter a valid email address");
            }
        }

        let position_id = required_id(&mut errors, "position", &self.position);
        if let Some(id) = position_id {
            check_references(conn, &mut errors, "position", "positions", &[id])?;
        }

        let password = if self.password.is_empty() {
            if existing.is_none() {
                errors.add("password", "this field is required");
            }
            None
        } else {
            if self.password.chars().count() < MIN_PASSWORD_LEN {
                errors.add(
                    "password",
                    format!("must be at least {} characters", MIN_PASSWORD_LEN),
                );
            }
            Some(self.password.clone())
        };

        let is_superuser = checkbox(&mut errors, "is_superuser", &self.is_superuser);

        let mut capabilities = BTreeSet::new();
        for part in self.capabilities.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse::<EntityKind>() {
                Ok(kind) => {
                    capabilities.insert(kind);
                }
                Err(reason) => errors.add("capabilities", reason),
            }
        }

        errors.into_result()?;
        Ok(ValidWorker {
            username,
            first_name,
            last_name,
            email,
            position_id: position_id.unwrap_or_default(),
            password,
            is_superuser,
            capabilities: capabilities.into_iter().collect(),
        })
    }
}

/// Task form. `assigned` and `tags` are comma-separated ids, `project` may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskInput {
    pub name: String,
    pub description: String,
    pub deadline: String,
    pub is_completed: String,
    pub priority: String,
    pub task_type: String,
    pub project: String,
    pub assigned: String,
    pub tags: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTask {
    pub name: String,
    pub description: String,
    pub deadline: NaiveDate,
    pub is_completed: bool,
    pub priority: Priority,
    pub task_type_id: Id,
    pub project_id: Option<Id>,
    pub assigned: Vec<Id>,
    pub tags: Vec<Id>,
}

impl TaskInput {
    pub fn new(
        name: impl Into<String>,
        deadline: NaiveDate,
        priority: Priority,
        task_type_id: Id,
    ) -> Self {
        Self {
            name: name.into(),
            description: "-".to_string(),
            deadline: deadline.format(DATE_FORMAT).to_string(),
            priority: priority.as_str().to_string(),
            task_type: task_type_id.to_string(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn project(mut self, project_id: Id) -> Self {
        self.project = project_id.to_string();
        self
    }

    pub fn assigned(mut self, ids: &[Id]) -> Self {
        self.assigned = join_ids(ids);
        self
    }

    pub fn tags(mut self, ids: &[Id]) -> Self {
        self.tags = join_ids(ids);
        self
    }

    pub fn completed(mut self, done: bool) -> Self {
        self.is_completed = if done { "on" } else { "" }.to_string();
        self
    }

    pub fn validate(&self, conn: &Connection) -> ServiceResult<ValidTask> {
        let mut errors = FieldErrors::new();

        let name = required_text(&mut errors, "name", &self.name, Some(MAX_NAME_LEN));
        let description = required_text(&mut errors, "description", &self.description, None);

        let deadline = if self.deadline.trim().is_empty() {
            errors.add("deadline", "this field is required");
            None
        } else {
            NaiveDate::parse_from_str(self.deadline.trim(), DATE_FORMAT)
                .map_err(|_| errors.add("deadline", "enter a valid date (YYYY-MM-DD)"))
                .ok()
        };

        let priority = if self.priority.trim().is_empty() {
            errors.add("priority", "this field is required");
            None
        } else {
            self.priority
                .parse::<Priority>()
                .map_err(|reason| errors.add("priority", reason))
                .ok()
        };

        let is_completed = checkbox(&mut errors, "is_completed", &self.is_completed);

        let task_type_id = required_id(&mut errors, "task_type", &self.task_type);
        if let Some(id) = task_type_id {
            check_references(conn, &mut errors, "task_type", "task_types", &[id])?;
        }

        let project_id = optional_id(&mut errors, "project", &self.project);
        if let Some(id) = project_id {
            check_references(conn, &mut errors, "project", "projects", &[id])?;
        }

        let assigned = id_list(&mut errors, "assigned", &self.assigned);
        if assigned.is_empty() && !errors.contains("assigned") {
            errors.add("assigned", "at least one worker must be assigned");
        }
        check_references(conn, &mut errors, "assigned", "workers", &assigned)?;

        let tags = id_list(&mut errors, "tags", &self.tags);
        check_references(conn, &mut errors, "tags", "tags", &tags)?;

        errors.into_result()?;

        match (deadline, priority, task_type_id) {
            (Some(deadline), Some(priority), Some(task_type_id)) => Ok(ValidTask {
                name,
                description,
                deadline,
                is_completed,
                priority,
                task_type_id,
                project_id,
                assigned,
                tags,
            }),
            _ => Err(ServiceError::Internal(
                "task validation passed without typed fields".to_string(),
            )),
        }
    }
}

fn join_ids(ids: &[Id]) -> String {
    ids.iter().map(Id::to_string).collect::<Vec<_>>().join(",")
}
