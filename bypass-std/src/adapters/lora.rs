//! Low-rank (LoRA) bypass adapter.
//!
//! Adds `strength * alpha / rank * (x down^T) up^T` to the base output,
//! computed on the fly instead of merged into the base weights.

use bypass_core::{Adapter, BoxError, Tensor, TensorError, WeightSet};

const DOWN: usize = 0;
const UP: usize = 1;

/// A LoRA adapter for one module.
#[derive(Debug)]
pub struct LoraAdapter {
    name: String,
    rank: usize,
    alpha: f32,
    strength: f32,
    in_features: usize,
    out_features: usize,
    weights: WeightSet,
}

impl LoraAdapter {
    /// Create an adapter from `down [rank, in]` and `up [out, rank]`.
    pub fn new(
        name: impl Into<String>,
        down: Tensor,
        up: Tensor,
        alpha: f32,
    ) -> Result<Self, TensorError> {
        let (rank, in_features, out_features) = match (down.shape(), up.shape()) {
            ([rank, in_features], [out_features, up_rank]) if rank == up_rank => {
                (*rank, *in_features, *out_features)
            }
            _ => {
                return Err(TensorError::ShapeMismatch {
                    left: down.shape().to_vec(),
                    right: up.shape().to_vec(),
                });
            }
        };
        Ok(Self {
            name: name.into(),
            rank,
            alpha,
            strength: 1.0,
            in_features,
            out_features,
            weights: WeightSet::new(vec![down, up]),
        })
    }

    /// Set the strength multiplier.
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    /// Rank of the decomposition.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Input width.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Output width.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Effective scale: `strength * alpha / rank`.
    pub fn scale(&self) -> f32 {
        if self.rank == 0 {
            return 0.0;
        }
        self.strength * self.alpha / self.rank as f32
    }
}

impl Adapter for LoraAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn weights(&self) -> &WeightSet {
        &self.weights
    }

    fn correction(
        &self,
        input: &Tensor,
        _base: &Tensor,
        weights: &[Tensor],
    ) -> Result<Tensor, BoxError> {
        let hidden = input.matmul_t(&weights[DOWN])?;
        let delta = hidden.matmul_t(&weights[UP])?;
        Ok(delta.scale(self.scale()))
    }
}
