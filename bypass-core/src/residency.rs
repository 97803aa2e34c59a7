//! # Scoped weight residency
//!
//! An adapter's tensors live in host memory between calls. A forward call
//! checks them out with [`WeightSet::checkout`], which moves them to the
//! caller's device and precision and hands back a [`ResidencyGuard`]. Dropping
//! the guard moves them back, on normal return, on `?` early return and
//! during unwinding alike.
//!
//! ```rust
//! use bypass_core::{DType, Device, ResidencyPolicy, Tensor, WeightSet};
//!
//! let weights = WeightSet::new(vec![Tensor::row(&[1.0, 2.0])]);
//! {
//!     let policy = ResidencyPolicy::default();
//!     let guard = weights.checkout(Device::Accelerator(0), DType::F16, policy);
//!     assert_eq!(guard[0].device(), Device::Accelerator(0));
//! }
//! assert!(weights.is_on_host());
//! ```

use crate::tensor::{DType, Device, Tensor};
use bitflags::bitflags;
use std::{
    ops::Deref,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

bitflags! {
    /// How weights are placed for the duration of one call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResidencyPolicy: u8 {
        /// Move weights to the input's device.
        const MATCH_DEVICE = 1;
        /// Cast weights to the input's precision.
        const MATCH_DTYPE = 1 << 1;
        /// Return weights to host memory, at their stored precision, after the call.
        const OFFLOAD_AFTER_CALL = 1 << 2;
    }
}

impl Default for ResidencyPolicy {
    fn default() -> Self {
        Self::all()
    }
}

const HOST_CODE: u32 = u32::MAX;

fn encode(device: Device) -> u32 {
    match device {
        Device::Host => HOST_CODE,
        Device::Accelerator(index) => index,
    }
}

fn decode(code: u32) -> Device {
    match code {
        HOST_CODE => Device::Host,
        index => Device::Accelerator(index),
    }
}

/// The tensors belonging to one adapter.
///
/// Placement is mirrored in an atomic so it can be queried while the tensors
/// are checked out.
#[derive(Debug)]
pub struct WeightSet {
    tensors: Mutex<Vec<Tensor>>,
    placement: AtomicU32,
}

impl WeightSet {
    /// Take ownership of `tensors`, moving them to host memory.
    pub fn new(mut tensors: Vec<Tensor>) -> Self {
        for tensor in &mut tensors {
            let dtype = tensor.dtype();
            tensor.to(Device::Host, dtype);
        }
        Self {
            tensors: Mutex::new(tensors),
            placement: AtomicU32::new(HOST_CODE),
        }
    }

    /// Where the tensors currently are.
    pub fn device(&self) -> Device {
        decode(self.placement.load(Ordering::Acquire))
    }

    /// Whether the tensors are in host memory.
    pub fn is_on_host(&self) -> bool {
        self.device().is_host()
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the set holds no tensors.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Total size in bytes at the current precision.
    pub fn nbytes(&self) -> usize {
        self.lock().iter().map(Tensor::nbytes).sum()
    }

    /// Copy the tensors out, wherever they are.
    pub fn snapshot(&self) -> Vec<Tensor> {
        self.lock().clone()
    }

    /// Check the tensors out to `device` at `dtype` for the guard's lifetime.
    ///
    /// Blocks while another guard on the same set is alive.
    pub fn checkout(
        &self,
        device: Device,
        dtype: DType,
        policy: ResidencyPolicy,
    ) -> ResidencyGuard<'_> {
        let mut tensors = self.lock();
        let stored: Vec<DType> = tensors.iter().map(Tensor::dtype).collect();

        for tensor in tensors.iter_mut() {
            let target_device = if policy.contains(ResidencyPolicy::MATCH_DEVICE) {
                device
            } else {
                tensor.device()
            };
            let target_dtype = if policy.contains(ResidencyPolicy::MATCH_DTYPE) {
                dtype
            } else {
                tensor.dtype()
            };
            tensor.to(target_device, target_dtype);
        }
        if policy.contains(ResidencyPolicy::MATCH_DEVICE) {
            self.placement.store(encode(device), Ordering::Release);
        }

        ResidencyGuard {
            tensors,
            placement: &self.placement,
            stored,
            offload: policy.contains(ResidencyPolicy::OFFLOAD_AFTER_CALL),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Tensor>> {
        // A panic inside a checked-out call poisons the lock after the guard
        // has already offloaded, so the data is consistent.
        self.tensors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tensors checked out for one call. Releases them to host memory on drop.
#[must_use = "weights are released as soon as the guard is dropped"]
pub struct ResidencyGuard<'a> {
    tensors: MutexGuard<'a, Vec<Tensor>>,
    placement: &'a AtomicU32,
    stored: Vec<DType>,
    offload: bool,
}

impl ResidencyGuard<'_> {
    /// The checked-out tensors.
    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }
}

impl Deref for ResidencyGuard<'_> {
    type Target = [Tensor];

    fn deref(&self) -> &Self::Target {
        &self.tensors
    }
}

impl Drop for ResidencyGuard<'_> {
    fn drop(&mut self) {
        if !self.offload {
            return;
        }
        for (tensor, dtype) in self.tensors.iter_mut().zip(&self.stored) {
            tensor.to(Device::Host, *dtype);
        }
        self.placement.store(HOST_CODE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn weights() -> WeightSet {
        WeightSet::new(vec![Tensor::row(&[1.0, 2.0]), Tensor::zeros(vec![2, 2])])
    }

    #[test]
    fn test_new_moves_to_host() {
        let set = WeightSet::new(vec![Tensor::row(&[1.0]).on(Device::Accelerator(2), DType::F16)]);
        assert!(set.is_on_host());
        assert_eq!(set.snapshot()[0].device(), Device::Host);
        assert_eq!(set.snapshot()[0].dtype(), DType::F16);
    }

    #[test]
    fn test_checkout_and_release() {
        let set = weights();
        {
            let policy = ResidencyPolicy::default();
            let guard = set.checkout(Device::Accelerator(0), DType::BF16, policy);
            assert!(guard.iter().all(|t| t.device() == Device::Accelerator(0)));
            assert!(guard.iter().all(|t| t.dtype() == DType::BF16));
            assert_eq!(set.device(), Device::Accelerator(0));
        }
        assert!(set.is_on_host());
        assert!(set.snapshot().iter().all(|t| t.dtype() == DType::F32));
    }

    #[test]
    fn test_release_on_panic() {
        let set = weights();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let policy = ResidencyPolicy::default();
            let _guard = set.checkout(Device::Accelerator(0), DType::F32, policy);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(set.is_on_host());
        assert!(set.snapshot().iter().all(|t| t.device().is_host()));
    }

    #[test]
    fn test_policy_without_offload_keeps_weights_resident() {
        let set = weights();
        let policy = ResidencyPolicy::MATCH_DEVICE | ResidencyPolicy::MATCH_DTYPE;
        drop(set.checkout(Device::Accelerator(1), DType::F32, policy));
        assert_eq!(set.device(), Device::Accelerator(1));
    }

    #[test]
    fn test_policy_without_dtype_match_keeps_precision() {
        let set = weights();
        let guard = set.checkout(Device::Accelerator(0), DType::F16, ResidencyPolicy::MATCH_DEVICE);
        assert!(guard.iter().all(|t| t.dtype() == DType::F32));
    }

    #[test]
    fn test_nbytes() {
        assert_eq!(weights().nbytes(), (2 + 4) * 4);
    }
}
