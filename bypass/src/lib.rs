//! # bypass - shared per-model hook injection
//!
//! `bypass` applies adapters (LoRA and friends) to a loaded model's modules by
//! replacing each module's forward with a composed hook instead of merging
//! weights. One [`InjectionManager`] per model, reached through the model's
//! attachments, owns every hook; all structural changes go through a full
//! [`rebuild`](InjectionManager::rebuild), so hooks never wrap other hooks and
//! teardown always restores the true original.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bypass::prelude::*;
//!
//! let model = Model::builder("unet")
//!     .module("mid.proj", Linear::new(weight, None)?.into_forward())
//!     .build();
//!
//! let lora = LoraAdapter::new("style", down, up, 8.0)?.with_strength(0.8);
//! apply_bypass(&model, "mid.proj", Arc::new(lora))?;
//!
//! let y = model.module("mid.proj").unwrap().forward(&x)?;
//! disable_bypass(&model)?;
//! ```
//!
//! During each forward call an adapter's weights are checked out to the
//! input's device and precision and returned to host memory afterwards, even
//! when the call fails.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use bypass_core::{
    // Adapter side
    Adapter,
    // Host side
    Attachment,
    // Error types
    AttachmentError,
    Attachments,
    BindingError,
    BoxError,
    BypassError,
    // Tensors
    DType,
    Device,
    FnForward,
    Forward,
    ForwardFn,
    ForwardSlot,
    HookTag,
    HostModel,
    ManagerId,
    ResidencyGuard,
    ResidencyPolicy,
    Tensor,
    TensorError,
    WeightSet,
    forward_fn,
    same_callable,
};

pub use bypass_std::{
    adapters::{Ia3Adapter, LoraAdapter},
    attachments::AttachmentRegistry,
    config::{DEFAULT_INJECTION_KEY, ManagerConfig},
    injection::{
        BYPASS_MANAGER_KEY, BypassForward, InjectionManager, SharedManager, apply_bypass,
        apply_bypass_with, disable_bypass, manager_for,
    },
    model::{Model, ModelBuilder},
    module::{Linear, Module},
};

/// Injection manager internals and host flow.
pub mod injection {
    pub use bypass_std::injection::{
        BYPASS_MANAGER_KEY, BypassForward, InjectionManager, SharedManager, apply_bypass,
        apply_bypass_with, disable_bypass, lock, manager_for,
    };
}

/// Standard adapter implementations.
pub mod adapters {
    pub use bypass_std::adapters::{Ia3Adapter, LoraAdapter};
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use bypass_std::testing::*;
}

/// Prelude module - common imports for bypass.
///
/// # Usage
///
/// ```rust,ignore
/// use bypass::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Core traits
        Adapter,
        Attachments,
        // Errors
        BindingError,
        BoxError,
        BypassError,
        DType,
        Device,
        Forward,
        ForwardSlot,
        HostModel,
        // Manager
        InjectionManager,
        // Host model
        Linear,
        LoraAdapter,
        ManagerConfig,
        Model,
        Module,
        ResidencyPolicy,
        Tensor,
        apply_bypass,
        disable_bypass,
        forward_fn,
    };
}
