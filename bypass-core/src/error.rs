//! Error types for bypass injection.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`BypassError`] - Top-level error type for all manager operations
//! - [`BindingError`] - Adapter/module binding and hook capture errors
//! - [`AttachmentError`] - Typed attachment lookup errors
//! - [`TensorError`] - Shape, device and precision mismatches
//!
//! Forward passes return [`BoxError`] so that errors raised by an original
//! forward or an adapter reach the caller unchanged.

use crate::tensor::{DType, Device};
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all bypass operations.
#[derive(Error, Debug)]
pub enum BypassError {
    /// An adapter could not be bound to, or installed on, a module.
    #[error("binding error: {0}")]
    Binding(#[from] BindingError),

    /// An attachment lookup failed.
    #[error("attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    /// A tensor operation failed.
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),

    /// A custom error occurred.
    #[error(transparent)]
    Custom(BoxError),
}

/// Errors raised while binding adapters or capturing original callables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The model has no module with this id.
    #[error("no module named `{0}`")]
    UnknownModule(String),

    /// The module's current forward is a hook this manager did not install.
    #[error("module `{module}` carries a foreign hook (key `{key}`)")]
    ForeignHook {
        /// Module id.
        module: String,
        /// Injection key of the hook found on the module.
        key: String,
    },

    /// The module carries this manager's hook but no original is on record.
    #[error("original forward of module `{0}` was lost")]
    OriginalLost(String),

    /// The same adapter instance is already bound to this module.
    #[error("adapter `{adapter}` is already bound to module `{module}`")]
    DuplicateAdapter {
        /// Module id.
        module: String,
        /// Adapter name.
        adapter: String,
    },

    /// A different slot object is already bound under this module id.
    #[error("module id `{0}` is already bound to a different slot")]
    ConflictingModule(String),
}

/// Errors raised by typed attachment access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    /// The stored attachment is not of the requested type.
    #[error("attachment `{key}` is not a `{expected}`")]
    TypeMismatch {
        /// Attachment key.
        key: String,
        /// Requested type name.
        expected: &'static str,
    },
}

/// Errors raised by tensor operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// Data length does not match the shape.
    #[error("shape {shape:?} needs {expected} elements, got {actual}")]
    DataLength {
        /// Requested shape.
        shape: Vec<usize>,
        /// Element count implied by the shape.
        expected: usize,
        /// Element count supplied.
        actual: usize,
    },

    /// Operand shapes are incompatible.
    #[error("shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        /// Left operand shape.
        left: Vec<usize>,
        /// Right operand shape.
        right: Vec<usize>,
    },

    /// Operands live on different devices.
    #[error("device mismatch: {left} vs {right}")]
    DeviceMismatch {
        /// Left operand device.
        left: Device,
        /// Right operand device.
        right: Device,
    },

    /// Operands have different precisions.
    #[error("dtype mismatch: {left:?} vs {right:?}")]
    DTypeMismatch {
        /// Left operand precision.
        left: DType,
        /// Right operand precision.
        right: DType,
    },
}

// Convenience conversions
impl From<BoxError> for BypassError {
    fn from(err: BoxError) -> Self {
        BypassError::Custom(err)
    }
}
