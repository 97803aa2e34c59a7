//! # bypass-core
//!
//! Core traits for per-model bypass hook injection.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! hosts and adapter implementations that don't need the full `bypass-std`
//! implementation.
//!
//! # Contracts
//!
//! ## Host side
//!
//! - [`Attachments`]: per-model key-value storage with identity-preserving lookup
//! - [`ForwardSlot`]: a module whose active [`ForwardFn`] can be replaced
//! - [`HostModel`]: attachments plus module lookup by id
//!
//! ## Adapter side
//!
//! - [`Adapter`]: a correction term and a combine step over a [`WeightSet`]
//! - [`WeightSet`] / [`ResidencyGuard`]: scoped checkout of adapter weights to
//!   the accelerator, released to host memory on every exit path
//!
//! # Error Types
//!
//! - [`BypassError`] - Top-level error type
//! - [`BindingError`] - Binding and hook capture errors
//! - [`AttachmentError`] - Typed attachment errors
//! - [`TensorError`] - Tensor operation errors

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod forward;
mod model;
mod residency;
mod tensor;

// Re-exports
pub use adapter::Adapter;
pub use error::{AttachmentError, BindingError, BoxError, BypassError, TensorError};
pub use forward::{
    FnForward, Forward, ForwardFn, ForwardSlot, HookTag, ManagerId, forward_fn, same_callable,
};
pub use model::{Attachment, Attachments, HostModel};
pub use residency::{ResidencyGuard, ResidencyPolicy, WeightSet};
pub use tensor::{DType, Device, Tensor};
