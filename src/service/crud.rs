//! Generic list/detail/create/update/delete flow.
//!
//! Each entity kind plugs into the flow through [`Resource`], which names its
//! record, detail, form and filter types and maps the generic steps onto the
//! store. The flow itself owns the permission gate and the logging.

use super::TaskManager;
use crate::auth::{self, Action, Identity, Principal};
use crate::db::history::task_history_internal;
use crate::db::projects::{get_project_internal, get_projects_many};
use crate::db::reference::{NamedTable, get_named_internal, get_named_many};
use crate::db::search::TaskSearch;
use crate::db::tasks::{tasks_for_project_internal, tasks_for_worker_internal};
use crate::db::teams::{teams_for_project_internal, teams_for_worker_internal};
use crate::db::workers::get_workers_many;
use crate::error::{ServiceError, ServiceResult};
use crate::types::{
    EntityKind, Id, NamedRecord, Page, PageRequest, Project, ProjectDetail, Task, TaskDetail,
    Team, TeamDetail, Worker, WorkerDetail,
};
use crate::validation::{NamedInput, ProjectInput, TaskInput, TeamInput, WorkerInput, parse_checkbox};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

/// One entity kind as seen by the CRUD flow.
pub trait Resource: Send + Sync + 'static {
    const KIND: EntityKind;

    type Record: Serialize + Clone + Send + 'static;
    type Detail: Serialize + Send + 'static;
    /// Submitted form state; `Default` is the empty create form.
    type Input: Serialize + DeserializeOwned + Default + Send + 'static;
    /// List filter parsed from the query string.
    type Filter: DeserializeOwned + Default + Send + 'static;

    fn id(record: &Self::Record) -> Id;

    fn list(
        tm: &TaskManager,
        filter: &Self::Filter,
        viewer: &Principal,
        page: PageRequest,
    ) -> ServiceResult<Page<Self::Record>>;

    fn get(tm: &TaskManager, id: Id) -> ServiceResult<Option<Self::Record>>;

    fn detail(tm: &TaskManager, record: Self::Record, viewer: &Identity) -> ServiceResult<Self::Detail>;

    /// Form pre-filled with a record's current values.
    fn form(record: &Self::Record) -> Self::Input;

    fn create(tm: &TaskManager, input: &Self::Input, actor: &Principal) -> ServiceResult<Self::Record>;

    fn update(
        tm: &TaskManager,
        id: Id,
        input: &Self::Input,
        actor: &Principal,
    ) -> ServiceResult<Self::Record>;

    fn delete(tm: &TaskManager, id: Id, actor: &Principal) -> ServiceResult<()>;
}

/// Filter for kinds whose list takes no parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoFilter {}

fn checkbox<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    parse_checkbox(raw.as_deref().unwrap_or_default()).map_err(serde::de::Error::custom)
}

/// Task list filter: free text plus "only mine".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskFilter {
    pub query: Option<String>,
    #[serde(deserialize_with = "checkbox")]
    pub show_my_tasks: bool,
}

impl TaskFilter {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            show_my_tasks: false,
        }
    }

    pub fn mine() -> Self {
        Self {
            query: None,
            show_my_tasks: true,
        }
    }

    fn to_search(&self, viewer: &Principal) -> TaskSearch {
        let mut search = TaskSearch::new();
        if let Some(query) = &self.query {
            search = search.query(query.as_str());
        }
        if self.show_my_tasks {
            search = search.assigned_to(viewer.worker_id);
        }
        search
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerFilter {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeamFilter {
    pub name: Option<String>,
}

macro_rules! named_resource {
    ($resource:ident, $kind:expr, $table:expr, $policy:ident) => {
        pub struct $resource;

        impl Resource for $resource {
            const KIND: EntityKind = $kind;

            type Record = NamedRecord;
            type Detail = NamedRecord;
            type Input = NamedInput;
            type Filter = NoFilter;

            fn id(record: &NamedRecord) -> Id {
                record.id
            }

            fn list(
                tm: &TaskManager,
                _filter: &NoFilter,
                _viewer: &Principal,
                page: PageRequest,
            ) -> ServiceResult<Page<NamedRecord>> {
                Ok(tm.db().list_named($table, page)?)
            }

            fn get(tm: &TaskManager, id: Id) -> ServiceResult<Option<NamedRecord>> {
                Ok(tm.db().get_named($table, id)?)
            }

            fn detail(_tm: &TaskManager, record: NamedRecord, _viewer: &Identity) -> ServiceResult<NamedRecord> {
                Ok(record)
            }

            fn form(record: &NamedRecord) -> NamedInput {
                NamedInput::new(record.name.clone())
            }

            fn create(tm: &TaskManager, input: &NamedInput, _actor: &Principal) -> ServiceResult<NamedRecord> {
                Ok(tm.db().create_named($table, input)?)
            }

            fn update(
                tm: &TaskManager,
                id: Id,
                input: &NamedInput,
                _actor: &Principal,
            ) -> ServiceResult<NamedRecord> {
                Ok(tm.db().update_named($table, id, input)?)
            }

            fn delete(tm: &TaskManager, id: Id, _actor: &Principal) -> ServiceResult<()> {
                let policy = named_policy!(tm, $policy);
                Ok(tm.db().delete_named($table, id, policy)?)
            }
        }
    };
}

// Tags have no dependents that could block deletion.
macro_rules! named_policy {
    ($tm:expr, none) => {
        crate::config::OnDelete::Cascade
    };
    ($tm:expr, $field:ident) => {
        $tm.config().delete_policy.$field
    };
}

named_resource!(Positions, EntityKind::Position, NamedTable::Position, position);
named_resource!(TaskTypes, EntityKind::TaskType, NamedTable::TaskType, task_type);
named_resource!(Tags, EntityKind::Tag, NamedTable::Tag, none);

pub struct Projects;

impl Resource for Projects {
    const KIND: EntityKind = EntityKind::Project;

    type Record = Project;
    type Detail = ProjectDetail;
    type Input = ProjectInput;
    type Filter = NoFilter;

    fn id(record: &Project) -> Id {
        record.id
    }

    fn list(tm: &TaskManager, _filter: &NoFilter, _viewer: &Principal, page: PageRequest) -> ServiceResult<Page<Project>> {
        Ok(tm.db().list_projects(page)?)
    }

    fn get(tm: &TaskManager, id: Id) -> ServiceResult<Option<Project>> {
        Ok(tm.db().get_project(id)?)
    }

    fn detail(tm: &TaskManager, project: Project, _viewer: &Identity) -> ServiceResult<ProjectDetail> {
        Ok(tm.db().with_conn(|conn| {
            Ok(ProjectDetail {
                tasks: tasks_for_project_internal(conn, project.id)?,
                teams: teams_for_project_internal(conn, project.id)?,
                project,
            })
        })?)
    }

    fn form(project: &Project) -> ProjectInput {
        ProjectInput::new(project.name.clone(), project.description.clone())
    }

    fn create(tm: &TaskManager, input: &ProjectInput, _actor: &Principal) -> ServiceResult<Project> {
        Ok(tm.db().create_project(input)?)
    }

    fn update(tm: &TaskManager, id: Id, input: &ProjectInput, _actor: &Principal) -> ServiceResult<Project> {
        Ok(tm.db().update_project(id, input)?)
    }

    fn delete(tm: &TaskManager, id: Id, _actor: &Principal) -> ServiceResult<()> {
        Ok(tm.db().delete_project(id, tm.config().delete_policy.project)?)
    }
}

pub struct Teams;

impl Resource for Teams {
    const KIND: EntityKind = EntityKind::Team;

    type Record = Team;
    type Detail = TeamDetail;
    type Input = TeamInput;
    type Filter = TeamFilter;

    fn id(record: &Team) -> Id {
        record.id
    }

    fn list(tm: &TaskManager, filter: &TeamFilter, _viewer: &Principal, page: PageRequest) -> ServiceResult<Page<Team>> {
        Ok(tm.db().list_teams(filter.name.as_deref(), page)?)
    }

    fn get(tm: &TaskManager, id: Id) -> ServiceResult<Option<Team>> {
        Ok(tm.db().get_team(id)?)
    }

    fn detail(tm: &TaskManager, team: Team, _viewer: &Identity) -> ServiceResult<TeamDetail> {
        Ok(tm.db().with_conn(|conn| {
            Ok(TeamDetail {
                member_records: get_workers_many(conn, &team.members)?,
                project_records: get_projects_many(conn, &team.projects)?,
                team,
            })
        })?)
    }

    fn form(team: &Team) -> TeamInput {
        TeamInput::new(team.name.clone())
            .members(&team.members)
            .projects(&team.projects)
    }

    fn create(tm: &TaskManager, input: &TeamInput, _actor: &Principal) -> ServiceResult<Team> {
        Ok(tm.db().create_team(input)?)
    }

    fn update(tm: &TaskManager, id: Id, input: &TeamInput, _actor: &Principal) -> ServiceResult<Team> {
        Ok(tm.db().update_team(id, input)?)
    }

    fn delete(tm: &TaskManager, id: Id, _actor: &Principal) -> ServiceResult<()> {
        Ok(tm.db().delete_team(id)?)
    }
}

pub struct Workers;

impl Workers {
    /// Only superusers hand out superuser status or capabilities.
    fn check_privileges(input: &WorkerInput, current: Option<&Worker>, actor: &Principal) -> ServiceResult<()> {
        if actor.is_superuser {
            return Ok(());
        }
        let wants_superuser = parse_checkbox(&input.is_superuser).unwrap_or(false);
        let mut wants_caps: Vec<EntityKind> = input
            .capabilities
            .split(',')
            .filter_map(|k| k.parse().ok())
            .collect();
        wants_caps.sort();
        wants_caps.dedup();

        let (has_superuser, has_caps) = match current {
            Some(worker) => (worker.is_superuser, worker.capabilities.clone()),
            None => (false, Vec::new()),
        };
        if wants_superuser != has_superuser || wants_caps != has_caps {
            return Err(ServiceError::forbidden(
                "only a superuser may change superuser status or capabilities",
            ));
        }
        Ok(())
    }

    /// A worker outranking the actor can only be changed by a superuser.
    fn check_target(target: &Worker, actor: &Principal) -> ServiceResult<()> {
        if actor.is_superuser {
            return Ok(());
        }
        if target.is_superuser {
            return Err(ServiceError::forbidden("only a superuser may change a superuser"));
        }
        if target.capabilities.iter().any(|kind| !actor.capabilities.contains(kind)) {
            return Err(ServiceError::forbidden(
                "cannot change a worker holding capabilities you lack",
            ));
        }
        Ok(())
    }

    fn current(tm: &TaskManager, id: Id) -> ServiceResult<Worker> {
        tm.db()
            .get_worker(id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Worker, id))
    }
}

impl Resource for Workers {
    const KIND: EntityKind = EntityKind::Worker;

    type Record = Worker;
    type Detail = WorkerDetail;
    type Input = WorkerInput;
    type Filter = WorkerFilter;

    fn id(record: &Worker) -> Id {
        record.id
    }

    fn list(tm: &TaskManager, filter: &WorkerFilter, _viewer: &Principal, page: PageRequest) -> ServiceResult<Page<Worker>> {
        Ok(tm.db().list_workers(filter.username.as_deref(), page)?)
    }

    fn get(tm: &TaskManager, id: Id) -> ServiceResult<Option<Worker>> {
        Ok(tm.db().get_worker(id)?)
    }

    fn detail(tm: &TaskManager, worker: Worker, _viewer: &Identity) -> ServiceResult<WorkerDetail> {
        Ok(tm.db().with_conn(|conn| {
            let position = get_named_internal(conn, NamedTable::Position, worker.position_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Position, worker.position_id))?;
            let assigned_tasks = tasks_for_worker_internal(conn, worker.id)?;
            let (completed_tasks, pending_tasks): (Vec<Task>, Vec<Task>) =
                assigned_tasks.iter().cloned().partition(|t| t.is_completed);
            Ok(WorkerDetail {
                position,
                assigned_tasks,
                completed_tasks,
                pending_tasks,
                teams: teams_for_worker_internal(conn, worker.id)?,
                worker,
            })
        })?)
    }

    fn form(worker: &Worker) -> WorkerInput {
        let mut input = WorkerInput::new(worker.username.clone(), worker.position_id, "")
            .names(worker.first_name.clone(), worker.last_name.clone())
            .email(worker.email.clone())
            .capabilities(&worker.capabilities);
        if worker.is_superuser {
            input = input.superuser();
        }
        input
    }

    fn create(tm: &TaskManager, input: &WorkerInput, actor: &Principal) -> ServiceResult<Worker> {
        Self::check_privileges(input, None, actor)?;
        Ok(tm.db().create_worker(input, tm.config().auth.bcrypt_cost)?)
    }

    fn update(tm: &TaskManager, id: Id, input: &WorkerInput, actor: &Principal) -> ServiceResult<Worker> {
        let current = Self::current(tm, id)?;
        Self::check_target(&current, actor)?;
        Self::check_privileges(input, Some(&current), actor)?;
        Ok(tm.db().update_worker(id, input, tm.config().auth.bcrypt_cost)?)
    }

    fn delete(tm: &TaskManager, id: Id, actor: &Principal) -> ServiceResult<()> {
        Self::check_target(&Self::current(tm, id)?, actor)?;
        Ok(tm.db().delete_worker(id)?)
    }
}

pub struct Tasks;

impl Resource for Tasks {
    const KIND: EntityKind = EntityKind::Task;

    type Record = Task;
    type Detail = TaskDetail;
    type Input = TaskInput;
    type Filter = TaskFilter;

    fn id(record: &Task) -> Id {
        record.id
    }

    fn list(tm: &TaskManager, filter: &TaskFilter, viewer: &Principal, page: PageRequest) -> ServiceResult<Page<Task>> {
        Ok(tm.db().search_tasks(&filter.to_search(viewer), page)?)
    }

    fn get(tm: &TaskManager, id: Id) -> ServiceResult<Option<Task>> {
        Ok(tm.db().get_task(id)?)
    }

    fn detail(tm: &TaskManager, task: Task, viewer: &Identity) -> ServiceResult<TaskDetail> {
        Ok(tm.db().with_conn(|conn| {
            let task_type = get_named_internal(conn, NamedTable::TaskType, task.task_type_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::TaskType, task.task_type_id))?;
            let project = match task.project_id {
                Some(id) => get_project_internal(conn, id)?,
                None => None,
            };
            Ok(TaskDetail {
                state: task.state(),
                task_type,
                project,
                assignees: get_workers_many(conn, &task.assigned)?,
                tag_records: get_named_many(conn, NamedTable::Tag, &task.tags)?,
                can_complete: auth::can_complete(&task, viewer),
                history: task_history_internal(conn, task.id)?,
                task,
            })
        })?)
    }

    fn form(task: &Task) -> TaskInput {
        let mut input = TaskInput::new(task.name.clone(), task.deadline, task.priority, task.task_type_id)
            .description(task.description.clone())
            .assigned(&task.assigned)
            .tags(&task.tags)
            .completed(task.is_completed);
        if let Some(project_id) = task.project_id {
            input = input.project(project_id);
        }
        input
    }

    fn create(tm: &TaskManager, input: &TaskInput, actor: &Principal) -> ServiceResult<Task> {
        Ok(tm.db().create_task(input, Some(actor.worker_id))?)
    }

    fn update(tm: &TaskManager, id: Id, input: &TaskInput, actor: &Principal) -> ServiceResult<Task> {
        Ok(tm.db().update_task(id, input, Some(actor.worker_id))?)
    }

    fn delete(tm: &TaskManager, id: Id, _actor: &Principal) -> ServiceResult<()> {
        Ok(tm.db().delete_task(id)?)
    }
}

impl TaskManager {
    pub fn list<R: Resource>(
        &self,
        identity: &Identity,
        filter: &R::Filter,
        page: Option<u32>,
    ) -> ServiceResult<Page<R::Record>> {
        let principal = auth::check(identity, R::KIND, Action::List)?;
        R::list(self, filter, principal, self.page_request(page))
    }

    pub fn detail<R: Resource>(&self, identity: &Identity, id: Id) -> ServiceResult<R::Detail> {
        auth::check(identity, R::KIND, Action::Detail)?;
        let record = R::get(self, id)?.ok_or_else(|| ServiceError::not_found(R::KIND, id))?;
        R::detail(self, record, identity)
    }

    /// Empty form for a create page.
    pub fn create_form<R: Resource>(&self, identity: &Identity) -> ServiceResult<R::Input> {
        auth::check(identity, R::KIND, Action::Create)?;
        Ok(R::Input::default())
    }

    pub fn create<R: Resource>(&self, identity: &Identity, input: &R::Input) -> ServiceResult<R::Record> {
        let principal = auth::check(identity, R::KIND, Action::Create)?;
        let record = R::create(self, input, principal)?;
        info!(kind = %R::KIND, id = R::id(&record), worker = %principal.username, "Created");
        Ok(record)
    }

    /// Form pre-filled with the record's current values.
    pub fn update_form<R: Resource>(&self, identity: &Identity, id: Id) -> ServiceResult<R::Input> {
        auth::check(identity, R::KIND, Action::Update)?;
        let record = R::get(self, id)?.ok_or_else(|| ServiceError::not_found(R::KIND, id))?;
        Ok(R::form(&record))
    }

    pub fn update<R: Resource>(&self, identity: &Identity, id: Id, input: &R::Input) -> ServiceResult<R::Record> {
        let principal = auth::check(identity, R::KIND, Action::Update)?;
        let record = R::update(self, id, input, principal)?;
        info!(kind = %R::KIND, id, worker = %principal.username, "Updated");
        Ok(record)
    }

    /// The record a delete confirmation page shows.
    pub fn delete_confirmation<R: Resource>(&self, identity: &Identity, id: Id) -> ServiceResult<R::Record> {
        auth::check(identity, R::KIND, Action::Delete)?;
        R::get(self, id)?.ok_or_else(|| ServiceError::not_found(R::KIND, id))
    }

    pub fn delete<R: Resource>(&self, identity: &Identity, id: Id) -> ServiceResult<()> {
        let principal = auth::check(identity, R::KIND, Action::Delete)?;
        R::delete(self, id, principal)?;
        info!(kind = %R::KIND, id, worker = %principal.username, "Deleted");
        Ok(())
    }
}
