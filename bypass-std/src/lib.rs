//! # bypass-std
//!
//! Standard implementations for per-model bypass hook injection.
//!
//! This crate provides:
//! - **Attachments**: [`AttachmentRegistry`](attachments::AttachmentRegistry)
//! - **Host model**: [`Module`](module::Module), [`Linear`](module::Linear),
//!   [`Model`](model::Model)
//! - **Injection**: [`InjectionManager`](injection::InjectionManager) and the
//!   [`apply_bypass`](injection::apply_bypass) flow
//! - **Adapters**: LoRA and (IA)^3
//! - **Testing**: forward and adapter test doubles

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use bypass_core;

// Modules
pub mod adapters;
pub mod attachments;
pub mod config;
pub mod injection;
pub mod model;
pub mod module;
pub mod testing;
