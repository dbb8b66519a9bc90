//! Core types for the task manager.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned record identifier.
pub type Id = i64;

/// The kinds of record the store holds. Capabilities are granted per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Position,
    TaskType,
    Tag,
    Project,
    Team,
    Worker,
    Task,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Position,
        EntityKind::TaskType,
        EntityKind::Tag,
        EntityKind::Project,
        EntityKind::Team,
        EntityKind::Worker,
        EntityKind::Task,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Position => "position",
            EntityKind::TaskType => "task_type",
            EntityKind::Tag => "tag",
            EntityKind::Project => "project",
            EntityKind::Team => "team",
            EntityKind::Worker => "worker",
            EntityKind::Task => "task",
        }
    }

    /// Path segment of the kind's list route.
    pub fn route(&self) -> &'static str {
        match self {
            EntityKind::Position => "/positions",
            EntityKind::TaskType => "/task-types",
            EntityKind::Tag => "/tags",
            EntityKind::Project => "/projects",
            EntityKind::Team => "/teams",
            EntityKind::Worker => "/workers",
            EntityKind::Task => "/tasks",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| format!("unknown entity kind: {}", s))
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Urgent, Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == lowered)
            .ok_or_else(|| {
                format!(
                    "must be one of: {}",
                    Priority::ALL.map(|p| p.as_str()).join(", ")
                )
            })
    }
}

/// A record that only carries a name: positions, task types and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRecord {
    pub id: Id,
    pub name: String,
}

pub type Position = NamedRecord;
pub type TaskType = NamedRecord;
pub type Tag = NamedRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Id,
    pub name: String,
    pub members: Vec<Id>,
    pub projects: Vec<Id>,
}

/// A person who can sign in and be assigned tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub position_id: Id,
    pub is_superuser: bool,
    /// Kinds this worker may manage. Superusers hold every kind implicitly.
    pub capabilities: Vec<EntityKind>,
    pub created_at: i64,
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.username, self.first_name, self.last_name)
    }
}

/// Lifecycle state derived from `Task::is_completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Open,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub deadline: NaiveDate,
    pub is_completed: bool,
    pub priority: Priority,
    pub task_type_id: Id,
    pub project_id: Option<Id>,
    pub assigned: Vec<Id>,
    pub tags: Vec<Id>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn state(&self) -> TaskState {
        if self.is_completed {
            TaskState::Completed
        } else {
            TaskState::Open
        }
    }

    pub fn is_assigned_to(&self, worker_id: Id) -> bool {
        self.assigned.contains(&worker_id)
    }
}

/// A row of the task completion audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistoryEvent {
    pub id: i64,
    pub task_id: Id,
    pub worker_id: Option<Id>,
    pub event: String,
    pub timestamp: i64,
}

/// Pagination request, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, page_size: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let size = i64::from(request.page_size);
        let total_pages = ((total + size - 1) / size).max(1) as u32;
        Self {
            items,
            page: request.page,
            page_size: request.page_size,
            total,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Task plus everything its detail view shows.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub state: TaskState,
    pub task_type: TaskType,
    pub project: Option<Project>,
    pub assignees: Vec<Worker>,
    pub tag_records: Vec<Tag>,
    pub can_complete: bool,
    pub history: Vec<TaskHistoryEvent>,
}

/// Worker plus derived task history and memberships.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerDetail {
    #[serde(flatten)]
    pub worker: Worker,
    pub position: Position,
    pub assigned_tasks: Vec<Task>,
    pub completed_tasks: Vec<Task>,
    pub pending_tasks: Vec<Task>,
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub member_records: Vec<Worker>,
    pub project_records: Vec<Project>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub tasks: Vec<Task>,
    pub teams: Vec<Team>,
}

/// Landing view for a signed-in worker.
#[derive(Debug, Clone, Serialize)]
pub struct HomeView {
    pub worker: Worker,
    pub projects: Vec<Project>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_parses_route_style_names() {
        assert_eq!("task-type".parse::<EntityKind>().unwrap(), EntityKind::TaskType);
        assert_eq!("Worker".parse::<EntityKind>().unwrap(), EntityKind::Worker);
        assert!("manager".parse::<EntityKind>().is_err());
    }

    #[test]
    fn priority_rejects_unknown_values() {
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        let err = "critical".parse::<Priority>().unwrap_err();
        assert!(err.contains("urgent, high, medium, low"));
    }

    #[test]
    fn page_counts_partial_last_page() {
        let request = PageRequest::new(Some(2), 5);
        let page: Page<i32> = Page::new(vec![6, 7], request, 7);
        assert_eq!(page.total_pages, 2);
        assert_eq!(request.offset(), 5);
        assert!(!page.has_next());
    }

    #[test]
    fn empty_listing_still_has_one_page() {
        let page: Page<i32> = Page::new(vec![], PageRequest::new(None, 5), 0);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.page, 1);
    }
}
