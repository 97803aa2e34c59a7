//! Injection manager.
//!
//! One manager per model owns every bypass hook installed on that model's
//! modules. Bindings accumulate through [`InjectionManager::register_adapter`];
//! hooks only change through [`InjectionManager::rebuild`], which synthesizes
//! one fresh composed forward per module over the module's recorded original,
//! and [`InjectionManager::teardown`], which puts the originals back.
//!
//! Originals are captured once per module, the first time a rebuild touches
//! it, and a callable carrying a hook tag is never accepted as an original.

use super::hook::BypassForward;
use crate::config::ManagerConfig;
use bypass_core::{
    Adapter, BindingError, ForwardFn, ForwardSlot, HookTag, ManagerId, same_callable,
};
use std::{collections::BTreeMap, sync::Arc};

/// A manager shared through a model's attachments.
pub type SharedManager = Arc<std::sync::Mutex<InjectionManager>>;

struct Binding {
    slot: Arc<dyn ForwardSlot>,
    adapter: Arc<dyn Adapter>,
}

struct Installation {
    slot: Arc<dyn ForwardSlot>,
    original: ForwardFn,
    hook: ForwardFn,
}

/// Owns the bypass hooks of one model.
pub struct InjectionManager {
    id: ManagerId,
    tag: HookTag,
    config: ManagerConfig,
    bindings: Vec<Binding>,
    installed: BTreeMap<String, Installation>,
}

impl InjectionManager {
    /// Create a manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Create a manager with `config`.
    pub fn with_config(config: ManagerConfig) -> Self {
        let id = ManagerId::next();
        Self {
            id,
            tag: HookTag::new(config.injection_key.clone(), id),
            config,
            bindings: Vec::new(),
            installed: BTreeMap::new(),
        }
    }

    /// This manager's id.
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// The key every hook is installed under.
    pub fn injection_key(&self) -> &str {
        &self.config.injection_key
    }

    /// The active configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Number of adapter-to-module bindings.
    pub fn adapter_count(&self) -> usize {
        self.bindings.len()
    }

    /// Bound module ids, in first-binding order.
    pub fn module_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for binding in &self.bindings {
            let id = binding.slot.id();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Ids of modules currently carrying this manager's hook.
    pub fn installed_modules(&self) -> Vec<&str> {
        self.installed.keys().map(String::as_str).collect()
    }

    /// Whether any hook is installed.
    pub fn is_installed(&self) -> bool {
        !self.installed.is_empty()
    }

    /// Bind `adapter` to `module`. Nothing is installed until [`rebuild`](Self::rebuild).
    pub fn register_adapter(
        &mut self,
        module: Arc<dyn ForwardSlot>,
        adapter: Arc<dyn Adapter>,
    ) -> Result<(), BindingError> {
        for binding in &self.bindings {
            if binding.slot.id() != module.id() {
                continue;
            }
            if !std::ptr::addr_eq(Arc::as_ptr(&binding.slot), Arc::as_ptr(&module)) {
                return Err(BindingError::ConflictingModule(module.id().to_string()));
            }
            if std::ptr::addr_eq(Arc::as_ptr(&binding.adapter), Arc::as_ptr(&adapter)) {
                return Err(BindingError::DuplicateAdapter {
                    module: module.id().to_string(),
                    adapter: adapter.name().to_string(),
                });
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            manager = %self.id,
            module = module.id(),
            adapter = adapter.name(),
            "registered adapter"
        );

        self.bindings.push(Binding {
            slot: module,
            adapter,
        });
        Ok(())
    }

    /// Undo the most recent [`register_adapter`](Self::register_adapter).
    pub(crate) fn pop_binding(&mut self) -> Option<Arc<dyn Adapter>> {
        self.bindings.pop().map(|binding| binding.adapter)
    }

    /// Drop every binding of the adapter named `name`. Takes effect on the
    /// next rebuild. Returns how many bindings were removed.
    pub fn remove_adapter(&mut self, name: &str) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.adapter.name() != name);
        before - self.bindings.len()
    }

    /// Reinstall every hook from scratch.
    ///
    /// Every bound module gets one fresh composed forward over its recorded
    /// original; modules that lost all bindings get their original back.
    /// All modules are checked before any is touched, so an error leaves
    /// the model as it was. Returns the number of hooked modules.
    pub fn rebuild(&mut self) -> Result<usize, BindingError> {
        let groups = self.grouped();

        let mut originals = Vec::with_capacity(groups.len());
        for (slot, _) in &groups {
            match self.original_for(slot.as_ref()) {
                Ok(original) => originals.push(original),
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(manager = %self.id, error = %err, "rebuild refused");
                    return Err(err);
                }
            }
        }

        let mut next = BTreeMap::new();
        for ((slot, adapters), original) in groups.into_iter().zip(originals) {
            let hook: ForwardFn = Arc::new(BypassForward::new(
                self.tag.clone(),
                original.clone(),
                adapters,
                self.config.policy,
            ));
            slot.replace(hook.clone());
            next.insert(
                slot.id().to_string(),
                Installation {
                    slot,
                    original,
                    hook,
                },
            );
        }

        let previous = std::mem::replace(&mut self.installed, next);
        for (id, stale) in previous {
            if !self.installed.contains_key(&id) {
                stale.slot.replace(stale.original);
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            manager = %self.id,
            key = self.injection_key(),
            modules = self.installed.len(),
            bindings = self.bindings.len(),
            "rebuilt hooks"
        );

        Ok(self.installed.len())
    }

    /// Restore every recorded original and forget the records.
    ///
    /// Bindings are kept, so a later rebuild reinstalls the same hooks.
    /// Returns the number of restored modules.
    pub fn teardown(&mut self) -> usize {
        let restored = self.installed.len();
        for (_id, installation) in std::mem::take(&mut self.installed) {
            #[cfg(feature = "tracing")]
            {
                if !same_callable(&installation.slot.current(), &installation.hook) {
                    tracing::warn!(
                        module = %_id,
                        "restoring over a callable this manager did not install"
                    );
                }
            }
            installation.slot.replace(installation.original);
        }

        #[cfg(feature = "tracing")]
        {
            if restored > 0 {
                tracing::debug!(manager = %self.id, modules = restored, "tore down hooks");
            }
        }

        restored
    }

    /// Tear down and drop all bindings.
    pub fn clear(&mut self) {
        self.teardown();
        self.bindings.clear();
    }

    fn grouped(&self) -> Vec<(Arc<dyn ForwardSlot>, Vec<Arc<dyn Adapter>>)> {
        let mut groups: Vec<(Arc<dyn ForwardSlot>, Vec<Arc<dyn Adapter>>)> = Vec::new();
        for binding in &self.bindings {
            match groups
                .iter_mut()
                .find(|(slot, _)| slot.id() == binding.slot.id())
            {
                Some((_, adapters)) => adapters.push(binding.adapter.clone()),
                None => groups.push((binding.slot.clone(), vec![binding.adapter.clone()])),
            }
        }
        groups
    }

    fn original_for(&self, slot: &dyn ForwardSlot) -> Result<ForwardFn, BindingError> {
        let current = slot.current();

        if let Some(record) = self.installed.get(slot.id()) {
            if same_callable(&current, &record.hook) || same_callable(&current, &record.original) {
                return Ok(record.original.clone());
            }
            return Err(BindingError::ForeignHook {
                module: slot.id().to_string(),
                key: current
                    .hook_tag()
                    .map_or_else(|| "<untagged>".to_string(), |tag| tag.key().to_string()),
            });
        }

        match current.hook_tag() {
            None => Ok(current),
            Some(tag) if tag.owner() == self.id => {
                Err(BindingError::OriginalLost(slot.id().to_string()))
            }
            Some(tag) => Err(BindingError::ForeignHook {
                module: slot.id().to_string(),
                key: tag.key().to_string(),
            }),
        }
    }
}

impl Default for InjectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InjectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for InjectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionManager")
            .field("id", &self.id)
            .field("key", &self.injection_key())
            .field("bindings", &self.bindings.len())
            .field("installed", &self.installed_modules())
            .finish()
    }
}
