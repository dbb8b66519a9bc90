//! Integration tests for the permission gate in front of every operation.

use chrono::NaiveDate;
use task_manager::auth::Identity;
use task_manager::config::Config;
use task_manager::db::Database;
use task_manager::db::reference::NamedTable;
use task_manager::error::{ErrorCode, ServiceError};
use task_manager::service::{
    NoFilter, Positions, Projects, Resource, Tags, TaskManager, TaskTypes, Tasks, Teams, Workers,
};
use task_manager::types::{EntityKind, Id, Priority, Worker};
use task_manager::validation::{NamedInput, ProjectInput, TaskInput, WorkerInput};

struct Fixture {
    tm: TaskManager,
    position: Id,
    task_type: Id,
}

fn setup() -> Fixture {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    let position = db
        .create_named(NamedTable::Position, &NamedInput::new("Developer"))
        .unwrap()
        .id;
    let task_type = db
        .create_named(NamedTable::TaskType, &NamedInput::new("Feature"))
        .unwrap()
        .id;
    Fixture {
        tm: TaskManager::new(db, config),
        position,
        task_type,
    }
}

impl Fixture {
    fn worker(&self, username: &str) -> Worker {
        self.tm
            .db()
            .create_worker(&WorkerInput::new(username, self.position, "password123"), 4)
            .expect("Failed to create worker")
    }

    fn manager(&self, username: &str, kinds: &[EntityKind]) -> Worker {
        self.tm
            .db()
            .create_worker(
                &WorkerInput::new(username, self.position, "password123").capabilities(kinds),
                4,
            )
            .expect("Failed to create manager")
    }

    fn task_input(&self, name: &str, assigned: &[Id]) -> TaskInput {
        let deadline = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        TaskInput::new(name, deadline, Priority::Medium, self.task_type).assigned(assigned)
    }
}

/// Every generic operation on `R` for `identity`, as error codes in a fixed order.
fn gate_codes<R: Resource>(tm: &TaskManager, identity: &Identity, id: Id) -> Vec<Option<ErrorCode>> {
    let code = |r: Result<(), ServiceError>| r.err().map(|e| e.code());
    vec![
        code(tm.list::<R>(identity, &R::Filter::default(), None).map(|_| ())),
        code(tm.detail::<R>(identity, id).map(|_| ())),
        code(tm.create_form::<R>(identity).map(|_| ())),
        code(tm.create::<R>(identity, &R::Input::default()).map(|_| ())),
        code(tm.update_form::<R>(identity, id).map(|_| ())),
        code(tm.update::<R>(identity, id, &R::Input::default()).map(|_| ())),
        code(tm.delete_confirmation::<R>(identity, id).map(|_| ())),
        code(tm.delete::<R>(identity, id)),
    ]
}

mod anonymous_tests {
    use super::*;

    fn assert_all_need_login<R: Resource>(tm: &TaskManager, id: Id) {
        let codes = gate_codes::<R>(tm, &Identity::Anonymous, id);
        assert!(
            codes.iter().all(|c| *c == Some(ErrorCode::AuthenticationRequired)),
            "{}: {:?}",
            R::KIND,
            codes
        );
    }

    #[test]
    fn anonymous_callers_are_stopped_for_every_kind() {
        let fx = setup();
        let alice = fx.worker("alice");
        let task = fx.tm.db().create_task(&fx.task_input("Plan", &[alice.id]), None).unwrap();

        assert_all_need_login::<Positions>(&fx.tm, fx.position);
        assert_all_need_login::<TaskTypes>(&fx.tm, fx.task_type);
        assert_all_need_login::<Tags>(&fx.tm, 1);
        assert_all_need_login::<Projects>(&fx.tm, 1);
        assert_all_need_login::<Teams>(&fx.tm, 1);
        assert_all_need_login::<Workers>(&fx.tm, alice.id);
        assert_all_need_login::<Tasks>(&fx.tm, task.id);

        assert!(matches!(
            fx.tm.complete_task(&Identity::Anonymous, task.id),
            Err(ServiceError::AuthenticationRequired)
        ));
        assert!(fx.tm.db().get_task(task.id).unwrap().is_some());
        assert!(fx.tm.db().get_worker(alice.id).unwrap().is_some());
    }

    #[test]
    fn authentication_is_checked_before_lookup() {
        let fx = setup();
        let err = fx.tm.detail::<Tasks>(&Identity::Anonymous, 12345).unwrap_err();
        assert!(matches!(err, ServiceError::AuthenticationRequired));
    }
}

mod capability_tests {
    use super::*;

    #[test]
    fn plain_worker_can_work_with_tasks() {
        let fx = setup();
        let alice = fx.worker("alice");
        let identity = Identity::worker(&alice);

        let task = fx.tm.create::<Tasks>(&identity, &fx.task_input("Plan", &[alice.id])).unwrap();
        fx.tm
            .update::<Tasks>(&identity, task.id, &fx.task_input("Plan better", &[alice.id]))
            .unwrap();
        fx.tm.list::<Tasks>(&identity, &Default::default(), None).unwrap();
        fx.tm.list::<Workers>(&identity, &Default::default(), None).unwrap();
        fx.tm.list::<Teams>(&identity, &Default::default(), None).unwrap();
        fx.tm.detail::<Workers>(&identity, alice.id).unwrap();
    }

    #[test]
    fn plain_worker_cannot_delete_tasks() {
        let fx = setup();
        let alice = fx.worker("alice");
        let identity = Identity::worker(&alice);
        let task = fx.tm.create::<Tasks>(&identity, &fx.task_input("Plan", &[alice.id])).unwrap();

        let err = fx.tm.delete::<Tasks>(&identity, task.id).unwrap_err();

        assert!(matches!(err, ServiceError::Forbidden { .. }));
        assert!(fx.tm.db().get_task(task.id).unwrap().is_some());
    }

    #[test]
    fn permission_is_checked_before_lookup() {
        let fx = setup();
        let alice = fx.worker("alice");
        let err = fx.tm.delete::<Tasks>(&Identity::worker(&alice), 12345).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden { .. }));
    }

    #[test]
    fn reference_tables_need_manage_even_to_list() {
        let fx = setup();
        let alice = fx.worker("alice");
        let identity = Identity::worker(&alice);

        for result in [
            fx.tm.list::<Positions>(&identity, &NoFilter::default(), None).map(|_| ()),
            fx.tm.list::<Tags>(&identity, &NoFilter::default(), None).map(|_| ()),
            fx.tm.create::<Tags>(&identity, &NamedInput::new("ui")).map(|_| ()),
            fx.tm
                .create::<Projects>(&identity, &ProjectInput::new("Apollo", "moon"))
                .map(|_| ()),
        ] {
            assert!(matches!(result, Err(ServiceError::Forbidden { .. })));
        }
    }

    #[test]
    fn granted_capability_opens_its_kind_only() {
        let fx = setup();
        let tagger = fx.manager("tagger", &[EntityKind::Tag]);
        let identity = Identity::worker(&tagger);

        let tag = fx.tm.create::<Tags>(&identity, &NamedInput::new("ui")).unwrap();
        fx.tm.update::<Tags>(&identity, tag.id, &NamedInput::new("frontend")).unwrap();
        assert_eq!(fx.tm.list::<Tags>(&identity, &NoFilter::default(), None).unwrap().total, 1);
        fx.tm.delete::<Tags>(&identity, tag.id).unwrap();

        let err = fx
            .tm
            .create::<Positions>(&identity, &NamedInput::new("QA"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden { .. }));
    }

    #[test]
    fn grant_via_administration_takes_effect() {
        let fx = setup();
        fx.worker("alice");

        let alice = fx.tm.set_capability("alice", EntityKind::Task, true).unwrap();
        assert_eq!(alice.capabilities, vec![EntityKind::Task]);

        let identity = Identity::worker(&alice);
        let task = fx.tm.create::<Tasks>(&identity, &fx.task_input("Plan", &[alice.id])).unwrap();
        fx.tm.delete::<Tasks>(&identity, task.id).unwrap();
        assert!(fx.tm.db().get_task(task.id).unwrap().is_none());
    }

    #[test]
    fn granting_to_unknown_worker_fails() {
        let fx = setup();
        let err = fx.tm.set_capability("ghost", EntityKind::Task, true).unwrap_err();
        assert!(err.field_errors().unwrap().contains("username"));
    }

    #[test]
    fn superuser_passes_every_gate() {
        let fx = setup();
        let root = fx
            .tm
            .create_superuser("root", "password123", None, "Administrator")
            .unwrap();
        let identity = Identity::worker(&root);

        fx.tm.list::<Positions>(&identity, &NoFilter::default(), None).unwrap();
        let project = fx
            .tm
            .create::<Projects>(&identity, &ProjectInput::new("Apollo", "moon"))
            .unwrap();
        fx.tm.delete::<Projects>(&identity, project.id).unwrap();
    }
}

mod privilege_tests {
    use super::*;

    #[test]
    fn worker_manager_cannot_mint_superusers() {
        let fx = setup();
        let manager = fx.manager("hr", &[EntityKind::Worker]);
        let identity = Identity::worker(&manager);

        let err = fx
            .tm
            .create::<Workers>(
                &identity,
                &WorkerInput::new("mallory", fx.position, "password123").superuser(),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden { .. }));
        assert!(fx.tm.db().get_worker_by_username("mallory").unwrap().is_none());

        let err = fx
            .tm
            .create::<Workers>(
                &identity,
                &WorkerInput::new("mallory", fx.position, "password123")
                    .capabilities(&[EntityKind::Task]),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden { .. }));

        let plain = fx
            .tm
            .create::<Workers>(&identity, &WorkerInput::new("dave", fx.position, "password123"))
            .unwrap();
        assert!(!plain.is_superuser);
    }

    #[test]
    fn worker_manager_keeps_existing_capabilities_on_edit() {
        let fx = setup();
        let manager = fx.manager("hr", &[EntityKind::Worker]);
        let peer = fx.manager("recruiter", &[EntityKind::Worker]);

        let input = WorkerInput::new("recruiter", fx.position, "")
            .names("Rita", "Cruz")
            .capabilities(&peer.capabilities);
        let updated = fx
            .tm
            .update::<Workers>(&Identity::worker(&manager), peer.id, &input)
            .unwrap();

        assert_eq!(updated.first_name, "Rita");
        assert_eq!(updated.capabilities, vec![EntityKind::Worker]);
    }

    #[test]
    fn worker_manager_cannot_take_over_a_superuser() {
        let fx = setup();
        let root = fx
            .tm
            .create_superuser("root", "password123", Some("root@example.com"), "Administrator")
            .unwrap();
        let manager = fx.manager("hr", &[EntityKind::Worker]);
        let identity = Identity::worker(&manager);

        let reset = WorkerInput::new("root", fx.position, "owned-by-hr").superuser();
        let err = fx.tm.update::<Workers>(&identity, root.id, &reset).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden { .. }));
        assert!(fx.tm.login("root", "owned-by-hr").is_err());
        assert!(fx.tm.login("root", "password123").is_ok());

        let err = fx.tm.delete::<Workers>(&identity, root.id).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden { .. }));
        assert!(fx.tm.db().get_worker(root.id).unwrap().is_some());
    }

    #[test]
    fn worker_manager_cannot_touch_workers_with_other_capabilities() {
        let fx = setup();
        let manager = fx.manager("hr", &[EntityKind::Worker]);
        let tagger = fx.manager("tagger", &[EntityKind::Tag]);
        let identity = Identity::worker(&manager);

        let input = WorkerInput::new("tagger", fx.position, "new-password")
            .capabilities(&tagger.capabilities);
        let err = fx.tm.update::<Workers>(&identity, tagger.id, &input).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden { .. }));

        let err = fx.tm.delete::<Workers>(&identity, tagger.id).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden { .. }));
        assert!(fx.tm.db().get_worker(tagger.id).unwrap().is_some());
    }

    #[test]
    fn worker_manager_can_remove_plain_workers() {
        let fx = setup();
        let manager = fx.manager("hr", &[EntityKind::Worker]);
        let dave = fx.worker("dave");

        fx.tm.delete::<Workers>(&Identity::worker(&manager), dave.id).unwrap();
        assert!(fx.tm.db().get_worker(dave.id).unwrap().is_none());

        let err = fx.tm.delete::<Workers>(&Identity::worker(&manager), dave.id).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
