//! (IA)^3 gating adapter: rescales each output feature by a learned factor.

use bypass_core::{Adapter, BoxError, Tensor, WeightSet};

/// Multiplies the base output elementwise by a learned `[out]` vector.
#[derive(Debug)]
pub struct Ia3Adapter {
    name: String,
    weights: WeightSet,
}

impl Ia3Adapter {
    /// Create an adapter gating with `scale [out]`.
    pub fn new(name: impl Into<String>, scale: Tensor) -> Self {
        Self {
            name: name.into(),
            weights: WeightSet::new(vec![scale]),
        }
    }
}

impl Adapter for Ia3Adapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn weights(&self) -> &WeightSet {
        &self.weights
    }

    fn correction(
        &self,
        _input: &Tensor,
        _base: &Tensor,
        weights: &[Tensor],
    ) -> Result<Tensor, BoxError> {
        Ok(weights[0].clone())
    }

    fn combine(&self, base: Tensor, correction: Tensor) -> Result<Tensor, BoxError> {
        Ok(base.mul_row(&correction)?)
    }
}
