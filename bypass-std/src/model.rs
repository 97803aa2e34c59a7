//! Host-side model: named modules plus attachments.

use crate::{attachments::AttachmentRegistry, module::Module};
use bypass_core::{Attachment, Attachments, ForwardFn, ForwardSlot, HostModel};
use std::{collections::BTreeMap, sync::Arc};

/// A loaded model.
///
/// `Clone` behaves like a cache hit in the host: the clone shares the same
/// modules and the same attachment registry, so every copy over one set of
/// modules reaches one injection manager.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    modules: Arc<BTreeMap<String, Arc<Module>>>,
    attachments: Arc<AttachmentRegistry>,
}

impl Model {
    /// Start building a model.
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            modules: BTreeMap::new(),
        }
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A module by id.
    pub fn module(&self, id: &str) -> Option<&Arc<Module>> {
        self.modules.get(id)
    }

    /// Module ids, sorted.
    pub fn module_ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// The model's attachments.
    pub fn attachments(&self) -> &AttachmentRegistry {
        &self.attachments
    }
}

impl Attachments for Model {
    fn get_attachment(&self, key: &str) -> Option<Attachment> {
        self.attachments.get_attachment(key)
    }

    fn set_attachment(&self, key: &str, value: Attachment) -> Option<Attachment> {
        self.attachments.set_attachment(key, value)
    }

    fn remove_attachment(&self, key: &str) -> Option<Attachment> {
        self.attachments.remove_attachment(key)
    }
}

impl HostModel for Model {
    fn slot(&self, id: &str) -> Option<Arc<dyn ForwardSlot>> {
        self.modules
            .get(id)
            .map(|module| module.clone() as Arc<dyn ForwardSlot>)
    }
}

/// Builder for constructing a [`Model`].
///
/// # Example
/// ```ignore
/// let model = Model::builder("unet")
///     .module("mid.proj", Linear::new(weight, None)?.into_forward())
///     .build();
/// ```
pub struct ModelBuilder {
    name: String,
    modules: BTreeMap<String, Arc<Module>>,
}

impl ModelBuilder {
    /// Add a module running `forward`. A repeated id replaces the earlier module.
    pub fn module(mut self, id: impl Into<String>, forward: ForwardFn) -> Self {
        let id = id.into();
        self.modules
            .insert(id.clone(), Arc::new(Module::new(id, forward)));
        self
    }

    /// Number of modules added so far.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules were added.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Build the model.
    pub fn build(self) -> Model {
        Model {
            name: self.name,
            modules: Arc::new(self.modules),
            attachments: Arc::new(AttachmentRegistry::new()),
        }
    }
}
