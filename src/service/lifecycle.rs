//! Task completion, sign-in and administration.

use super::TaskManager;
use super::crud::Tasks;
use crate::auth::{self, Identity};
use crate::db::projects::projects_for_worker_internal;
use crate::db::reference::NamedTable;
use crate::db::sessions::Session;
use crate::db::tasks::Completion;
use crate::db::workers::get_worker_internal;
use crate::error::{ServiceError, ServiceResult};
use crate::types::{EntityKind, HomeView, Id, Task, Worker};
use crate::validation::{NamedInput, TaskInput, WorkerInput};
use tracing::{info, warn};

impl TaskManager {
    /// Move a task from open to completed.
    ///
    /// Only an assigned worker or a superuser may complete a task. Completing an
    /// already completed task succeeds without changing anything.
    pub fn complete_task(&self, identity: &Identity, task_id: Id) -> ServiceResult<Task> {
        let principal = auth::require_authenticated(identity)?;
        match self.db().complete_task(task_id, identity)? {
            Completion::Completed(task) => {
                info!(task_id, worker = %principal.username, "Completed task");
                Ok(task)
            }
            Completion::AlreadyCompleted(task) => Ok(task),
        }
    }

    /// Create a task together with its assignee set.
    pub fn create_task(&self, identity: &Identity, input: &TaskInput) -> ServiceResult<Task> {
        self.create::<Tasks>(identity, input)
    }

    /// Whether `viewer` would be allowed to complete `task` now.
    pub fn can_complete(&self, task: &Task, viewer: &Identity) -> bool {
        auth::can_complete(task, viewer)
    }

    /// The signed-in worker and the projects holding tasks assigned to them.
    pub fn home(&self, identity: &Identity) -> ServiceResult<HomeView> {
        let principal = auth::require_authenticated(identity)?;
        let worker_id = principal.worker_id;
        Ok(self.db().with_conn(|conn| {
            let worker = get_worker_internal(conn, worker_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Worker, worker_id))?;
            Ok(HomeView {
                projects: projects_for_worker_internal(conn, worker_id)?,
                worker,
            })
        })?)
    }

    /// Check credentials and open a session.
    pub fn login(&self, username: &str, password: &str) -> ServiceResult<Session> {
        let Some(worker) = self.db().verify_credentials(username.trim(), password)? else {
            warn!(username = %username.trim(), "Failed login");
            return Err(ServiceError::AuthenticationRequired);
        };
        let session = self
            .db()
            .create_session(worker.id, self.config().auth.session_ttl_ms())?;
        info!(worker = %worker.username, "Signed in");
        Ok(session)
    }

    pub fn logout(&self, token: &str) -> ServiceResult<()> {
        Ok(self.db().delete_session(token)?)
    }

    /// Identity behind a session token; unknown or expired tokens are anonymous.
    pub fn identify(&self, token: Option<&str>) -> ServiceResult<Identity> {
        match token {
            Some(token) if !token.is_empty() => Ok(self.db().resolve_session(token)?),
            _ => Ok(Identity::Anonymous),
        }
    }

    /// Create a superuser, finding or creating its position by name.
    pub fn create_superuser(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
        position: &str,
    ) -> ServiceResult<Worker> {
        let position = match self.db().find_named(NamedTable::Position, position.trim())? {
            Some(existing) => existing,
            None => self
                .db()
                .create_named(NamedTable::Position, &NamedInput::new(position))?,
        };

        let mut input = WorkerInput::new(username, position.id, password).superuser();
        if let Some(email) = email {
            input = input.email(email);
        }
        let worker = self
            .db()
            .create_worker(&input, self.config().auth.bcrypt_cost)?;
        info!(worker = %worker.username, "Created superuser");
        Ok(worker)
    }

    /// Grant or revoke `manage:<kind>` for a worker, from the administration CLI.
    pub fn set_capability(&self, username: &str, kind: EntityKind, granted: bool) -> ServiceResult<Worker> {
        let worker = self
            .db()
            .get_worker_by_username(username)?
            .ok_or_else(|| ServiceError::invalid("username", format!("no worker named '{}'", username)))?;
        let worker = self.db().set_capability(worker.id, kind, granted)?;
        info!(worker = %worker.username, capability = %kind, granted, "Changed capability");
        Ok(worker)
    }
}
