//! Operations exposed to the HTTP layer and the CLI.
//!
//! Every operation takes the caller's [`Identity`](crate::auth::Identity)
//! explicitly. Authentication and capability checks run before the store is
//! touched; store failures come back as [`ServiceError`](crate::error::ServiceError).

mod crud;
mod lifecycle;

pub use crud::{
    NoFilter, Positions, Projects, Resource, Tags, TaskFilter, TaskTypes, Tasks, TeamFilter, Teams,
    WorkerFilter, Workers,
};

use crate::config::Config;
use crate::db::Database;
use crate::types::PageRequest;
use std::sync::Arc;

/// Facade over the store and configuration shared by all request handlers.
#[derive(Clone)]
pub struct TaskManager {
    db: Arc<Database>,
    config: Arc<Config>,
}

impl TaskManager {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Page request at the configured page size.
    pub fn page_request(&self, page: Option<u32>) -> PageRequest {
        PageRequest::new(page, self.config.pagination.effective_page_size())
    }
}
