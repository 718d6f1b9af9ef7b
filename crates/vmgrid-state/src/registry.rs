//! Capability traits the scheduler core consumes.
//!
//! [`Registry`] is the consistent store for framework identity and
//! application records; [`TaskDatabase`] is the local per-task placement
//! bookkeeping. Both are object-safe so callers hold `Arc<dyn …>` and tests
//! can substitute failing doubles.

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, epoch_secs};
use crate::types::{Application, TaskRecord};

/// Framework identity and application records.
pub trait Registry: Send + Sync {
    /// Record the framework ID. Same ID again is a no-op; a different ID is
    /// a `FrameworkIdMismatch`.
    fn register_framework_id(&self, id: &str) -> StateResult<()>;

    /// Whether exactly this ID is the one registered. No side effects.
    fn framework_id_has_registered(&self, id: &str) -> StateResult<bool>;

    /// The registered framework ID, if any.
    fn registered_framework_id(&self) -> StateResult<Option<String>>;

    /// Create or overwrite an application record atomically.
    fn register_application(&self, app: &Application) -> StateResult<()>;

    /// Snapshot of all applications, in no particular order.
    fn list_applications(&self) -> StateResult<Vec<Application>>;

    /// Fetch one application; `NotFound` when absent.
    fn fetch_application(&self, id: &str) -> StateResult<Application>;

    /// Remove an application record. Absent records are not an error.
    fn delete_application(&self, id: &str) -> StateResult<()>;
}

/// Local task store used for best-effort placement bookkeeping.
pub trait TaskDatabase: Send + Sync {
    /// Fetch a task record; `NotFound` when absent.
    fn get_task(&self, app_id: &str, task_id: &str) -> StateResult<TaskRecord>;

    /// Write a task record under `app_id`.
    fn update_task(&self, app_id: &str, record: &TaskRecord) -> StateResult<()>;

    /// Drop a task record. Absent records are not an error.
    fn remove_task(&self, app_id: &str, task_id: &str) -> StateResult<()>;
}

impl Registry for StateStore {
    fn register_framework_id(&self, id: &str) -> StateResult<()> {
        self.put_framework_id(id)
    }

    fn framework_id_has_registered(&self, id: &str) -> StateResult<bool> {
        Ok(self
            .get_framework()?
            .is_some_and(|record| record.framework_id == id))
    }

    fn registered_framework_id(&self) -> StateResult<Option<String>> {
        Ok(self.get_framework()?.map(|record| record.framework_id))
    }

    fn register_application(&self, app: &Application) -> StateResult<()> {
        let mut app = app.clone();
        let now = epoch_secs();
        if app.created_at == 0 {
            app.created_at = now;
        }
        app.updated_at = now;
        self.put_application(&app)
    }

    fn list_applications(&self) -> StateResult<Vec<Application>> {
        StateStore::list_applications(self)
    }

    fn fetch_application(&self, id: &str) -> StateResult<Application> {
        self.get_application(id)?
            .ok_or_else(|| StateError::NotFound(format!("application {id}")))
    }

    fn delete_application(&self, id: &str) -> StateResult<()> {
        if !StateStore::delete_application(self, id)? {
            debug!(app_id = %id, "application already absent");
        }
        Ok(())
    }
}

impl TaskDatabase for StateStore {
    fn get_task(&self, app_id: &str, task_id: &str) -> StateResult<TaskRecord> {
        self.get_task_record(app_id, task_id)?
            .ok_or_else(|| StateError::NotFound(format!("task {app_id}:{task_id}")))
    }

    fn update_task(&self, app_id: &str, record: &TaskRecord) -> StateResult<()> {
        let mut record = record.clone();
        record.app_id = app_id.to_string();
        record.updated_at = epoch_secs();
        self.put_task(&record)
    }

    fn remove_task(&self, app_id: &str, task_id: &str) -> StateResult<()> {
        if !self.delete_task(app_id, task_id)? {
            debug!(%app_id, %task_id, "task record already absent");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KvmSpec, TaskPhase};
    use std::collections::HashMap;

    fn registry() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    fn app(id: &str) -> Application {
        Application {
            id: id.to_string(),
            instances: 1,
            kvm: KvmSpec {
                cpus: 1.0,
                mem: 1024.0,
                disk: 0.0,
                image: "/images/base.qcow2".to_string(),
                vnc_port: None,
            },
            labels: HashMap::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn register_framework_twice_keeps_value() {
        let reg = registry();
        assert!(!reg.framework_id_has_registered("fw").unwrap());

        reg.register_framework_id("fw").unwrap();
        reg.register_framework_id("fw").unwrap();

        assert!(reg.framework_id_has_registered("fw").unwrap());
        assert_eq!(reg.registered_framework_id().unwrap().as_deref(), Some("fw"));
    }

    #[test]
    fn has_registered_is_false_for_other_id() {
        let reg = registry();
        reg.register_framework_id("fw").unwrap();
        assert!(!reg.framework_id_has_registered("other").unwrap());
    }

    #[test]
    fn fetch_missing_application_is_not_found() {
        let err = registry().fetch_application("ghost").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn register_application_stamps_timestamps() {
        let reg = registry();
        reg.register_application(&app("web")).unwrap();
        let stored = reg.fetch_application("web").unwrap();
        assert!(stored.created_at > 0);
        assert_eq!(stored.created_at, stored.updated_at);
    }

    #[test]
    fn register_application_twice_does_not_duplicate() {
        let reg = registry();
        reg.register_application(&app("web")).unwrap();
        reg.register_application(&app("web")).unwrap();
        assert_eq!(Registry::list_applications(&reg).unwrap().len(), 1);
    }

    #[test]
    fn delete_application_is_idempotent() {
        let reg = registry();
        reg.register_application(&app("web")).unwrap();

        Registry::delete_application(&reg, "web").unwrap();
        Registry::delete_application(&reg, "web").unwrap();
        assert!(reg.fetch_application("web").unwrap_err().is_not_found());
    }

    #[test]
    fn task_database_round_trip() {
        let db = registry();
        assert!(db.get_task("web", "t1").unwrap_err().is_not_found());

        let record = TaskRecord {
            id: "t1".to_string(),
            name: "0.web".to_string(),
            app_id: "web".to_string(),
            kvm: app("web").kvm,
            phase: TaskPhase::Pending,
            agent_id: String::new(),
            executor_id: String::new(),
            ip_addr: String::new(),
            vnc_addr: String::new(),
            created_at: 1,
            updated_at: 1,
        };
        db.update_task("web", &record).unwrap();

        let mut stored = db.get_task("web", "t1").unwrap();
        stored.agent_id = "a1".to_string();
        db.update_task("web", &stored).unwrap();

        assert_eq!(db.get_task("web", "t1").unwrap().agent_id, "a1");

        db.remove_task("web", "t1").unwrap();
        db.remove_task("web", "t1").unwrap();
        assert!(db.get_task("web", "t1").unwrap_err().is_not_found());
    }
}
