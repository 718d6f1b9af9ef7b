//! Framework identity registration.

use tracing::{error, info};
use vmgrid_state::{Registry, StateError};

use crate::error::SchedulerResult;

/// Make sure `framework_id` is the one recorded in the registry.
///
/// Registers the ID when none is stored and accepts a matching one. A
/// different stored ID is a cluster identity mismatch and must abort
/// startup. Returns `true` when the ID was newly registered.
pub fn ensure_framework_id(registry: &dyn Registry, framework_id: &str) -> SchedulerResult<bool> {
    if registry.framework_id_has_registered(framework_id)? {
        info!(%framework_id, "framework id already registered");
        return Ok(false);
    }

    if let Some(stored) = registry.registered_framework_id()? {
        error!(%stored, requested = %framework_id, "framework id mismatch");
        return Err(StateError::FrameworkIdMismatch {
            stored,
            requested: framework_id.to_string(),
        }
        .into());
    }

    registry.register_framework_id(framework_id)?;
    info!(%framework_id, "framework id registered");
    Ok(true)
}
