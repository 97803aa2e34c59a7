//! Host integration: one manager per model, reached through one attachment key.
//!
//! Every bypass request for a model goes through [`apply_bypass`], which
//! fetches (or lazily creates) the model's [`SharedManager`], registers the
//! adapter and rebuilds. Because the manager lives in the model's attachments,
//! cache-hit clones of the model reach the same manager and therefore the
//! same recorded originals.

use super::manager::{InjectionManager, SharedManager};
use crate::config::ManagerConfig;
use bypass_core::{Adapter, AttachmentError, BindingError, BypassError, HostModel};
use std::{
    any::type_name,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Attachment key of a model's injection manager.
pub const BYPASS_MANAGER_KEY: &str = "bypass_injection_manager";

/// The model's manager, created with `config` if the model has none yet.
///
/// An existing manager keeps its own configuration.
pub fn manager_for<M>(model: &M, config: ManagerConfig) -> Result<SharedManager, BypassError>
where
    M: HostModel + ?Sized,
{
    if let Some(existing) = model.get_attachment(BYPASS_MANAGER_KEY) {
        return existing
            .downcast::<Mutex<InjectionManager>>()
            .map_err(|_| {
                BypassError::from(AttachmentError::TypeMismatch {
                    key: BYPASS_MANAGER_KEY.to_string(),
                    expected: type_name::<Mutex<InjectionManager>>(),
                })
            });
    }

    let manager: SharedManager = Arc::new(Mutex::new(InjectionManager::with_config(config)));
    model.set_attachment(BYPASS_MANAGER_KEY, manager.clone());

    #[cfg(feature = "tracing")]
    tracing::debug!(manager = %lock(&manager).id(), "attached injection manager");

    Ok(manager)
}

/// Bind `adapter` to the module `module_id` and rebuild the model's hooks.
///
/// Returns the number of hooked modules.
pub fn apply_bypass<M>(
    model: &M,
    module_id: &str,
    adapter: Arc<dyn Adapter>,
) -> Result<usize, BypassError>
where
    M: HostModel + ?Sized,
{
    apply_bypass_with(model, module_id, adapter, ManagerConfig::default())
}

/// Like [`apply_bypass`], creating the manager with `config` if needed.
pub fn apply_bypass_with<M>(
    model: &M,
    module_id: &str,
    adapter: Arc<dyn Adapter>,
    config: ManagerConfig,
) -> Result<usize, BypassError>
where
    M: HostModel + ?Sized,
{
    let slot = model
        .slot(module_id)
        .ok_or_else(|| BindingError::UnknownModule(module_id.to_string()))?;
    let manager = manager_for(model, config)?;
    let mut manager = lock(&manager);
    manager.register_adapter(slot, adapter)?;
    // A refused request must not block later ones.
    manager.rebuild().map_err(|err| {
        manager.pop_binding();
        BypassError::from(err)
    })
}

/// Restore every original and detach the manager from `model`.
///
/// Returns the number of restored modules; zero when bypass was never applied.
pub fn disable_bypass<M>(model: &M) -> Result<usize, BypassError>
where
    M: HostModel + ?Sized,
{
    if model.get_attachment(BYPASS_MANAGER_KEY).is_none() {
        return Ok(0);
    }
    let manager = manager_for(model, ManagerConfig::default())?;
    let restored = lock(&manager).teardown();
    model.remove_attachment(BYPASS_MANAGER_KEY);
    Ok(restored)
}

/// Lock a shared manager, recovering from poisoning.
pub fn lock(manager: &SharedManager) -> MutexGuard<'_, InjectionManager> {
    manager.lock().unwrap_or_else(PoisonError::into_inner)
}
