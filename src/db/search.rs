//! Filtered, paginated task listing.
//!
//! The filter is a conjunction of predicates compiled to a parameterized WHERE
//! clause. `icontains` is the case-insensitive substring function registered on
//! every connection.

use super::Database;
use super::tasks::{TASK_COLUMNS, query_tasks};
use crate::types::{Id, Page, PageRequest, Task};
use anyhow::Result;
use rusqlite::ToSql;
use rusqlite::params_from_iter;

/// Task list filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSearch {
    /// Substring matched against the task name or its project's name.
    pub query: Option<String>,
    /// Only tasks assigned to this worker.
    pub assigned_to: Option<Id>,
}

impl TaskSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        let trimmed = query.trim();
        self.query = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn assigned_to(mut self, worker_id: Id) -> Self {
        self.assigned_to = Some(worker_id);
        self
    }

    /// WHERE clause (including the keyword, or empty) and its parameters.
    fn where_clause(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut predicates: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(query) = &self.query {
            predicates.push("(icontains(t.name, ?) OR icontains(p.name, ?))");
            params.push(Box::new(query.clone()));
            params.push(Box::new(query.clone()));
        }

        if let Some(worker_id) = self.assigned_to {
            predicates.push(
                "EXISTS (SELECT 1 FROM task_assignees a WHERE a.task_id = t.id AND a.worker_id = ?)",
            );
            params.push(Box::new(worker_id));
        }

        if predicates.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", predicates.join(" AND ")), params)
        }
    }
}

impl Database {
    /// List tasks matching `search`, ordered by id.
    pub fn search_tasks(&self, search: &TaskSearch, request: PageRequest) -> Result<Page<Task>> {
        let (where_clause, mut params) = search.where_clause();
        let from = "FROM tasks t LEFT JOIN projects p ON p.id = t.project_id";

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) {} {}", from, where_clause),
                params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            params.push(Box::new(request.limit()));
            params.push(Box::new(request.offset()));
            let items = query_tasks(
                conn,
                &format!(
                    "SELECT {} {} {} ORDER BY t.id LIMIT ? OFFSET ?",
                    TASK_COLUMNS, from, where_clause
                ),
                params_from_iter(params.iter()),
            )?;

            Ok(Page::new(items, request, total))
        })
    }
}
