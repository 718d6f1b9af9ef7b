//! StateStore — redb-backed persistence for vmgrid.
//!
//! Provides typed operations over the framework identity, applications, and
//! task records. All values are JSON-serialized into redb's `&[u8]` value
//! columns. Supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const DEFAULT_CLUSTER: &str = "default";

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Cluster identity the framework ID is registered under.
    cluster: Arc<str>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            cluster: Arc::from(DEFAULT_CLUSTER),
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            cluster: Arc::from(DEFAULT_CLUSTER),
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Scope framework registration to a named cluster.
    pub fn with_cluster(mut self, cluster: &str) -> Self {
        self.cluster = Arc::from(cluster);
        self
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(FRAMEWORKS).map_err(map_err!(Table))?;
        txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
        txn.open_table(TASKS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn put<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        prefix: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let item: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }

    fn remove(&self, table: TableDefinition<&str, &[u8]>, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Framework ──────────────────────────────────────────────────

    /// The framework ID registered for this store's cluster, if any.
    pub fn get_framework(&self) -> StateResult<Option<FrameworkRecord>> {
        self.get(FRAMEWORKS, &self.cluster)
    }

    /// Record the framework ID for this cluster.
    ///
    /// Check and insert happen in one write transaction. Re-registering the
    /// same ID is a no-op; a different ID fails with `FrameworkIdMismatch`
    /// and leaves the stored value untouched.
    pub fn put_framework_id(&self, framework_id: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(FRAMEWORKS).map_err(map_err!(Table))?;
            let existing: Option<FrameworkRecord> =
                match table.get(&*self.cluster).map_err(map_err!(Read))? {
                    Some(guard) => Some(
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                    ),
                    None => None,
                };

            match existing {
                Some(record) if record.framework_id == framework_id => {
                    debug!(cluster = %self.cluster, %framework_id, "framework id already registered");
                    return Ok(());
                }
                Some(record) => {
                    return Err(StateError::FrameworkIdMismatch {
                        stored: record.framework_id,
                        requested: framework_id.to_string(),
                    });
                }
                None => {
                    let record = FrameworkRecord {
                        cluster: self.cluster.to_string(),
                        framework_id: framework_id.to_string(),
                        registered_at: epoch_secs(),
                    };
                    let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                    table
                        .insert(&*self.cluster, value.as_slice())
                        .map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(cluster = %self.cluster, %framework_id, "framework id registered");
        Ok(())
    }

    // ── Applications ───────────────────────────────────────────────

    /// Insert or overwrite an application record.
    pub fn put_application(&self, app: &Application) -> StateResult<()> {
        self.put(APPLICATIONS, &app.id, app)?;
        debug!(app_id = %app.id, "application stored");
        Ok(())
    }

    /// Get an application by ID.
    pub fn get_application(&self, id: &str) -> StateResult<Option<Application>> {
        self.get(APPLICATIONS, id)
    }

    /// List all applications.
    pub fn list_applications(&self) -> StateResult<Vec<Application>> {
        self.scan(APPLICATIONS, "")
    }

    /// Delete an application by ID. Returns true if it existed.
    pub fn delete_application(&self, id: &str) -> StateResult<bool> {
        let existed = self.remove(APPLICATIONS, id)?;
        debug!(app_id = %id, existed, "application deleted");
        Ok(existed)
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Insert or update a task record.
    pub fn put_task(&self, task: &TaskRecord) -> StateResult<()> {
        self.put(TASKS, &task.table_key(), task)
    }

    /// Get a task record by application and task ID.
    pub fn get_task_record(&self, app_id: &str, task_id: &str) -> StateResult<Option<TaskRecord>> {
        self.get(TASKS, &task_key(app_id, task_id))
    }

    /// List all task records owned by an application.
    pub fn list_tasks_for_app(&self, app_id: &str) -> StateResult<Vec<TaskRecord>> {
        self.scan(TASKS, &format!("{app_id}:"))
    }

    /// List every task record.
    pub fn list_tasks(&self) -> StateResult<Vec<TaskRecord>> {
        self.scan(TASKS, "")
    }

    /// Delete a task record. Returns true if it existed.
    pub fn delete_task(&self, app_id: &str, task_id: &str) -> StateResult<bool> {
        self.remove(TASKS, &task_key(app_id, task_id))
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_kvm() -> KvmSpec {
        KvmSpec {
            cpus: 2.0,
            mem: 2048.0,
            disk: 10240.0,
            image: "/var/lib/images/ubuntu.qcow2".to_string(),
            vnc_port: Some(5901),
        }
    }

    fn test_app(id: &str) -> Application {
        Application {
            id: id.to_string(),
            instances: 2,
            kvm: test_kvm(),
            labels: HashMap::new(),
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_task(app_id: &str, index: u32) -> TaskRecord {
        TaskRecord {
            id: format!("task-{index}"),
            name: format!("{index}.{app_id}"),
            app_id: app_id.to_string(),
            kvm: test_kvm(),
            phase: TaskPhase::Pending,
            agent_id: String::new(),
            executor_id: String::new(),
            ip_addr: String::new(),
            vnc_addr: String::new(),
            created_at: 1000,
            updated_at: 1000,
        }
    }

    // ── Framework ──────────────────────────────────────────────────

    #[test]
    fn framework_register_then_read() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_framework().unwrap().is_none());

        store.put_framework_id("fw-1").unwrap();
        let record = store.get_framework().unwrap().unwrap();
        assert_eq!(record.framework_id, "fw-1");
        assert_eq!(record.cluster, "default");
    }

    #[test]
    fn framework_same_id_twice_is_noop() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_framework_id("fw-1").unwrap();
        let first = store.get_framework().unwrap().unwrap();

        store.put_framework_id("fw-1").unwrap();
        assert_eq!(store.get_framework().unwrap().unwrap(), first);
    }

    #[test]
    fn framework_different_id_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_framework_id("fw-1").unwrap();

        let err = store.put_framework_id("fw-2").unwrap_err();
        assert!(matches!(
            err,
            StateError::FrameworkIdMismatch { ref stored, ref requested }
                if stored == "fw-1" && requested == "fw-2"
        ));
        assert_eq!(store.get_framework().unwrap().unwrap().framework_id, "fw-1");
    }

    #[test]
    fn framework_ids_are_scoped_per_cluster() {
        let a = StateStore::open_in_memory().unwrap().with_cluster("east");
        let b = a.clone().with_cluster("west");

        a.put_framework_id("fw-east").unwrap();
        b.put_framework_id("fw-west").unwrap();

        assert_eq!(a.get_framework().unwrap().unwrap().framework_id, "fw-east");
        assert_eq!(b.get_framework().unwrap().unwrap().framework_id, "fw-west");
    }

    // ── Applications ───────────────────────────────────────────────

    #[test]
    fn application_put_get_list_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_application(&test_app("web")).unwrap();
        store.put_application(&test_app("db")).unwrap();

        assert_eq!(store.get_application("web").unwrap(), Some(test_app("web")));
        assert_eq!(store.list_applications().unwrap().len(), 2);

        assert!(store.delete_application("web").unwrap());
        assert!(!store.delete_application("web").unwrap());
        assert!(store.get_application("web").unwrap().is_none());
    }

    #[test]
    fn application_overwrite_is_last_writer_wins() {
        let store = StateStore::open_in_memory().unwrap();
        let mut app = test_app("web");
        store.put_application(&app).unwrap();

        app.instances = 5;
        app.updated_at = 2000;
        store.put_application(&app).unwrap();

        let stored = store.get_application("web").unwrap().unwrap();
        assert_eq!(stored.instances, 5);
        assert_eq!(store.list_applications().unwrap().len(), 1);
    }

    // ── Tasks ──────────────────────────────────────────────────────

    #[test]
    fn task_records_are_scoped_by_app() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_task(&test_task("web", 0)).unwrap();
        store.put_task(&test_task("web", 1)).unwrap();
        store.put_task(&test_task("db", 0)).unwrap();

        assert_eq!(store.list_tasks_for_app("web").unwrap().len(), 2);
        assert_eq!(store.list_tasks_for_app("db").unwrap().len(), 1);
        assert_eq!(store.list_tasks().unwrap().len(), 3);

        assert!(store.get_task_record("db", "task-1").unwrap().is_none());
        assert!(store.delete_task("web", "task-0").unwrap());
        assert_eq!(store.list_tasks_for_app("web").unwrap().len(), 1);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.list_applications().unwrap().is_empty());
        assert!(store.list_tasks().unwrap().is_empty());
        assert!(store.get_task_record("any", "nope").unwrap().is_none());
        assert!(!store.delete_task("any", "nope").unwrap());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("vmgrid.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_framework_id("fw-persist").unwrap();
            store.put_application(&test_app("web")).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(
            store.get_framework().unwrap().unwrap().framework_id,
            "fw-persist"
        );
        assert!(store.get_application("web").unwrap().is_some());
    }
}
