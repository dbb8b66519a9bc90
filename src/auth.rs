//! Identity and permission gate.
//!
//! Resolution of who is calling happens in the session store; everything here is
//! pure so the same rules can be evaluated by the service layer and by anything
//! rendering the UI.

use crate::error::{ServiceError, ServiceResult};
use crate::types::{EntityKind, Id, Task, Worker};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

/// The caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Identity {
    Anonymous,
    Worker(Principal),
}

/// An authenticated worker and what it may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub worker_id: Id,
    pub username: String,
    pub is_superuser: bool,
    pub capabilities: BTreeSet<EntityKind>,
}

impl From<&Worker> for Principal {
    fn from(worker: &Worker) -> Self {
        Self {
            worker_id: worker.id,
            username: worker.username.clone(),
            is_superuser: worker.is_superuser,
            capabilities: worker.capabilities.iter().copied().collect(),
        }
    }
}

impl Identity {
    pub fn worker(worker: &Worker) -> Self {
        Identity::Worker(Principal::from(worker))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Identity::Anonymous => None,
            Identity::Worker(p) => Some(p),
        }
    }
}

/// A named permission. The only kind of capability is the right to manage
/// (create, update, delete and, for reference tables, list) one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Manage(EntityKind),
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Manage(kind) => write!(f, "manage:{}", kind),
        }
    }
}

/// The generic operations of the CRUD orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Detail,
    Create,
    Update,
    Delete,
}

/// Whether `identity` holds `capability`. Superusers hold everything.
pub fn authorize(identity: &Identity, capability: Capability) -> bool {
    match identity {
        Identity::Anonymous => false,
        Identity::Worker(p) => {
            p.is_superuser
                || match capability {
                    Capability::Manage(kind) => p.capabilities.contains(&kind),
                }
        }
    }
}

/// Fail with `AuthenticationRequired` for anonymous callers.
pub fn require_authenticated(identity: &Identity) -> ServiceResult<&Principal> {
    identity.principal().ok_or(ServiceError::AuthenticationRequired)
}

/// Capability an action on a kind needs beyond being signed in.
///
/// Tasks, workers and teams may be listed by anyone signed in; the reference tables
/// need the manage capability even to list. Any signed-in worker may create and edit
/// tasks, but deleting a task needs `manage:task` like every other kind.
pub fn required_capability(kind: EntityKind, action: Action) -> Option<Capability> {
    let manage = Some(Capability::Manage(kind));
    match action {
        Action::Detail => None,
        Action::List => match kind {
            EntityKind::Task | EntityKind::Worker | EntityKind::Team => None,
            _ => manage,
        },
        Action::Create | Action::Update => match kind {
            EntityKind::Task => None,
            _ => manage,
        },
        Action::Delete => manage,
    }
}

/// Authentication first, then the capability table.
pub fn check(identity: &Identity, kind: EntityKind, action: Action) -> ServiceResult<&Principal> {
    let principal = require_authenticated(identity)?;
    if let Some(capability) = required_capability(kind, action) {
        if !authorize(identity, capability) {
            warn!(
                worker = %principal.username,
                capability = %capability,
                action = ?action,
                "Permission denied"
            );
            return Err(ServiceError::forbidden(format!("requires {}", capability)));
        }
    }
    Ok(principal)
}

/// Whether `viewer` may mark `task` as completed right now.
pub fn can_complete(task: &Task, viewer: &Identity) -> bool {
    !task.is_completed && may_complete(task, viewer)
}

/// Ownership rule of the completion transition, ignoring the current state.
pub fn may_complete(task: &Task, viewer: &Identity) -> bool {
    match viewer.principal() {
        None => false,
        Some(p) => p.is_superuser || task.is_assigned_to(p.worker_id),
    }
}
