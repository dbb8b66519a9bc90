//! Login sessions: opaque tokens mapped to workers.

use super::workers::get_worker_internal;
use super::{Database, now_ms};
use crate::auth::Identity;
use crate::types::Id;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub worker_id: Id,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Database {
    /// Open a session for a worker that lasts `ttl_ms`.
    pub fn create_session(&self, worker_id: Id, ttl_ms: i64) -> Result<Session> {
        let token = Uuid::new_v4().to_string();
        let now = now_ms();
        let expires_at = now + ttl_ms;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, worker_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![&token, worker_id, now, expires_at],
            )?;
            Ok(Session {
                token,
                worker_id,
                created_at: now,
                expires_at,
            })
        })
    }

    /// Resolve a token to the identity it belongs to. Unknown and expired tokens
    /// resolve to `Anonymous`.
    pub fn resolve_session(&self, token: &str) -> Result<Identity> {
        self.with_conn(|conn| {
            let worker_id: Option<Id> = conn
                .query_row(
                    "SELECT worker_id FROM sessions WHERE token = ?1 AND expires_at > ?2",
                    params![token, now_ms()],
                    |row| row.get(0),
                )
                .optional()?;

            let worker = match worker_id {
                Some(id) => get_worker_internal(conn, id)?,
                None => None,
            };
            Ok(worker.map_or(Identity::Anonymous, |w| Identity::worker(&w)))
        })
    }

    /// End a session. Ending an unknown session is not an error.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
            Ok(())
        })
    }

    /// Drop expired sessions, returning how many were removed.
    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![now_ms()],
            )?;
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::reference::NamedTable;
    use crate::validation::{NamedInput, WorkerInput};

    fn worker(db: &Database) -> Id {
        let position = db
            .create_named(NamedTable::Position, &NamedInput::new("Tester"))
            .unwrap();
        db.create_worker(&WorkerInput::new("dana", position.id, "password1"), 4)
            .unwrap()
            .id
    }

    #[test]
    fn live_session_resolves_to_its_worker() {
        let db = Database::open_in_memory().unwrap();
        let id = worker(&db);
        let session = db.create_session(id, 60_000).unwrap();

        let identity = db.resolve_session(&session.token).unwrap();
        assert_eq!(identity.principal().map(|p| p.worker_id), Some(id));

        db.delete_session(&session.token).unwrap();
        assert_eq!(db.resolve_session(&session.token).unwrap(), Identity::Anonymous);
    }

    #[test]
    fn expired_session_is_anonymous_and_purged() {
        let db = Database::open_in_memory().unwrap();
        let id = worker(&db);
        let session = db.create_session(id, -1).unwrap();

        assert_eq!(db.resolve_session(&session.token).unwrap(), Identity::Anonymous);
        assert_eq!(db.purge_expired_sessions().unwrap(), 1);
    }
}
