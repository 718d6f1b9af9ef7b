//! redb table definitions for the vmgrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Framework identity keyed by cluster name.
pub const FRAMEWORKS: TableDefinition<&str, &[u8]> = TableDefinition::new("frameworks");

/// Application records keyed by `{app_id}`.
pub const APPLICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("applications");

/// Task records keyed by `{app_id}:{task_id}`.
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");
