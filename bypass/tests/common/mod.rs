#![allow(dead_code)]

use bypass::{Device, DType, ForwardFn, Model, Module, Tensor, testing::CountingForward};
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

pub const ACCEL: Device = Device::Accelerator(0);

/// A `[1, n]` input on the accelerator.
pub fn input(values: &[f32]) -> Tensor {
    Tensor::matrix(1, values.len(), values.to_vec())
        .unwrap()
        .on(ACCEL, DType::F16)
}

/// A `[1, n]` input in host memory.
pub fn host_input(values: &[f32]) -> Tensor {
    Tensor::matrix(1, values.len(), values.to_vec()).unwrap()
}

/// A module whose base forward doubles its input.
pub fn doubling_module(id: &str) -> (Arc<Module>, CountingForward) {
    let base = CountingForward::new(2.0);
    let module = Arc::new(Module::new(id, base.clone().into_forward()));
    (module, base)
}

/// A model with two doubling modules, `down` and `up`.
pub fn model() -> (Model, CountingForward) {
    let base = CountingForward::new(2.0);
    let forward: ForwardFn = base.clone().into_forward();
    let model = Model::builder("unet")
        .module("down", forward.clone())
        .module("up", forward)
        .build();
    (model, base)
}
