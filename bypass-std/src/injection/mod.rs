//! Bypass hook injection.
//!
//! - [`InjectionManager`]: owns one model's hooks, rebuilt from scratch on
//!   every structural change
//! - [`BypassForward`]: the composed forward installed on each module
//! - [`apply_bypass`] / [`disable_bypass`]: the per-request host flow

pub mod bypass;
pub mod hook;
pub mod manager;

pub use bypass::{
    BYPASS_MANAGER_KEY, apply_bypass, apply_bypass_with, disable_bypass, lock, manager_for,
};
pub use hook::BypassForward;
pub use manager::{InjectionManager, SharedManager};
