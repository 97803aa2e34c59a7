//! # Forward callables and replaceable slots
//!
//! A module's active behaviour is a [`ForwardFn`]: a shared, reference-counted
//! [`Forward`] object. Identity of a callable is pointer identity of its `Arc`
//! (see [`same_callable`]), which is what lets an injection manager tell the
//! true original apart from a hook it installed earlier.
//!
//! Hooks identify themselves through [`Forward::hook_tag`]. Plain forwards
//! return `None`.

use crate::{error::BoxError, tensor::Tensor};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// A shared forward callable.
pub type ForwardFn = Arc<dyn Forward>;

/// A forward computation over a tensor.
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `Forward`",
    label = "missing `Forward` implementation",
    note = "Wrap plain closures with `forward_fn`."
)]
pub trait Forward: Send + Sync + 'static {
    /// Run the computation.
    fn forward(&self, input: &Tensor) -> Result<Tensor, BoxError>;

    /// The tag of the manager that installed this callable, if it is a hook.
    fn hook_tag(&self) -> Option<&HookTag> {
        None
    }
}

/// Identity of an injection manager instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u64);

impl ManagerId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manager#{}", self.0)
    }
}

/// Marks a callable as a hook installed by a specific manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookTag {
    key: Arc<str>,
    owner: ManagerId,
}

impl HookTag {
    /// Create a tag for hooks installed by `owner` under `key`.
    pub fn new(key: impl Into<Arc<str>>, owner: ManagerId) -> Self {
        Self {
            key: key.into(),
            owner,
        }
    }

    /// The injection key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The installing manager.
    pub fn owner(&self) -> ManagerId {
        self.owner
    }
}

/// Whether two callables are the same object.
///
/// Compares data pointers only, so two `Arc`s to one object always match
/// regardless of which vtable each fat pointer carries.
pub fn same_callable(a: &ForwardFn, b: &ForwardFn) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// A [`Forward`] backed by a closure.
pub struct FnForward<F> {
    func: F,
}

impl<F> Forward for FnForward<F>
where
    F: Fn(&Tensor) -> Result<Tensor, BoxError> + Send + Sync + 'static,
{
    fn forward(&self, input: &Tensor) -> Result<Tensor, BoxError> {
        (self.func)(input)
    }
}

/// Wrap a closure into a shared [`ForwardFn`].
///
/// # Example
///
/// ```rust
/// use bypass_core::{Forward, Tensor, forward_fn};
///
/// let double = forward_fn(|x: &Tensor| Ok(x.scale(2.0)));
/// let y = double.forward(&Tensor::row(&[1.0, 2.0])).unwrap();
/// assert_eq!(y.data(), &[2.0, 4.0]);
/// ```
pub fn forward_fn<F>(func: F) -> ForwardFn
where
    F: Fn(&Tensor) -> Result<Tensor, BoxError> + Send + Sync + 'static,
{
    Arc::new(FnForward { func })
}

/// A module whose active forward callable can be read and replaced.
pub trait ForwardSlot: Send + Sync + 'static {
    /// Stable module id within its model.
    fn id(&self) -> &str;

    /// The currently active callable.
    fn current(&self) -> ForwardFn;

    /// Install `forward` as the active callable, returning the previous one.
    fn replace(&self, forward: ForwardFn) -> ForwardFn;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_callable_is_identity_not_equality() {
        let a = forward_fn(|x: &Tensor| Ok(x.clone()));
        let b = forward_fn(|x: &Tensor| Ok(x.clone()));
        let a2 = a.clone();
        assert!(same_callable(&a, &a2));
        assert!(!same_callable(&a, &b));
    }

    #[test]
    fn test_manager_ids_are_unique() {
        let a = ManagerId::next();
        let b = ManagerId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_plain_forward_has_no_tag() {
        let f = forward_fn(|x: &Tensor| Ok(x.clone()));
        assert!(f.hook_tag().is_none());
    }
}
