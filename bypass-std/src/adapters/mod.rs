//! Standard adapter implementations.

pub mod ia3;
pub mod lora;

pub use ia3::Ia3Adapter;
pub use lora::LoraAdapter;
