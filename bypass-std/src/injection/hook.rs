//! The composed forward installed on a module.

use bypass_core::{Adapter, BoxError, Forward, ForwardFn, HookTag, ResidencyPolicy, Tensor};
use std::sync::Arc;

/// Runs a module's recorded original and then each adapter in registration
/// order.
///
/// Each adapter's weights are checked out only while that adapter works, so
/// at most one adapter's weights sit on the accelerator at any instant. The
/// first adapter's checkout spans the original forward.
pub struct BypassForward {
    tag: HookTag,
    original: ForwardFn,
    adapters: Vec<Arc<dyn Adapter>>,
    policy: ResidencyPolicy,
}

impl BypassForward {
    pub(crate) fn new(
        tag: HookTag,
        original: ForwardFn,
        adapters: Vec<Arc<dyn Adapter>>,
        policy: ResidencyPolicy,
    ) -> Self {
        Self {
            tag,
            original,
            adapters,
            policy,
        }
    }

    /// The callable this hook wraps.
    pub fn original(&self) -> &ForwardFn {
        &self.original
    }

    /// Adapter names, in application order.
    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }
}

impl Forward for BypassForward {
    fn forward(&self, input: &Tensor) -> Result<Tensor, BoxError> {
        let mut adapters = self.adapters.iter();
        let Some(first) = adapters.next() else {
            return self.original.forward(input);
        };

        let mut output = {
            let weights = first
                .weights()
                .checkout(input.device(), input.dtype(), self.policy);
            let base = self.original.forward(input)?;
            apply(first.as_ref(), input, base, &weights)?
        };

        for adapter in adapters {
            let weights = adapter
                .weights()
                .checkout(input.device(), input.dtype(), self.policy);
            output = apply(adapter.as_ref(), input, output, &weights)?;
        }
        Ok(output)
    }

    fn hook_tag(&self) -> Option<&HookTag> {
        Some(&self.tag)
    }
}

fn apply(
    adapter: &dyn Adapter,
    input: &Tensor,
    base: Tensor,
    weights: &[Tensor],
) -> Result<Tensor, BoxError> {
    #[cfg(feature = "tracing")]
    tracing::trace!(adapter = adapter.name(), device = %input.device(), "applying adapter");

    let correction = adapter.correction(input, &base, weights)?;
    adapter.combine(base, correction)
}
