//! vmgrid-state — durable registry and task database for vmgrid.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the framework identity,
//! application records, and the local per-task placement records.
//!
//! # Architecture
//!
//! Domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Task keys are `{app_id}:{task_id}` so an application's tasks are found
//! by prefix scan. Every write runs in its own redb write transaction, so a
//! record is either fully committed or not visible at all.
//!
//! The scheduler core only sees the [`Registry`] and [`TaskDatabase`]
//! traits; [`StateStore`] is the redb implementation of both.

pub mod error;
pub mod registry;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use registry::{Registry, TaskDatabase};
pub use store::StateStore;
pub use types::*;
