//! Host model contracts: attachments and module lookup.

use crate::forward::ForwardSlot;
use std::{any::Any, sync::Arc};

/// An auxiliary object attached to a model.
pub type Attachment = Arc<dyn Any + Send + Sync>;

/// Key-value storage of attachments scoped to one model.
///
/// Implementations must hand back the same `Arc` for repeated lookups of one
/// key until it is replaced or removed.
pub trait Attachments {
    /// Look up an attachment.
    fn get_attachment(&self, key: &str) -> Option<Attachment>;

    /// Store an attachment, returning the one it replaced.
    fn set_attachment(&self, key: &str, value: Attachment) -> Option<Attachment>;

    /// Remove an attachment, returning it.
    fn remove_attachment(&self, key: &str) -> Option<Attachment>;
}

/// A model a bypass manager can be attached to.
pub trait HostModel: Attachments {
    /// The module registered under `id`, if any.
    fn slot(&self, id: &str) -> Option<Arc<dyn ForwardSlot>>;
}
