//! Tiered configuration.
//!
//! Configuration is merged field-by-field from, lowest to highest priority:
//! 1. **Defaults** compiled into the binary
//! 2. **Project** `$CWD/task-manager/config.yaml`
//! 3. **User** `~/.task-manager/config.yaml`
//! 4. **Environment** variables
//!
//! CLI flags are applied on top by the binary.
//!
//! ## Environment Variables
//! - `TASK_MANAGER_CONFIG_PATH` - Explicit config file (overrides all tiers)
//! - `TASK_MANAGER_DB_PATH` - Database path
//! - `TASK_MANAGER_PORT` - HTTP port
//! - `TASK_MANAGER_PAGE_SIZE` - Records per listing page
//! - `TASK_MANAGER_USER_DIR` - User config dir (default: `~/.task-manager`)
//! - `TASK_MANAGER_PROJECT_DIR` - Project config dir (default: `./task-manager`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
