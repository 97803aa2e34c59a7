//! Adapter trait.
//!
//! An adapter is a small parametrized transform applied on top of a base
//! forward without touching the base weights. It contributes two pieces:
//! a correction term computed from the input and the base output, and a
//! combine step merging the two.

use crate::{error::BoxError, residency::WeightSet, tensor::Tensor};

/// A bypass adapter.
///
/// `correction` only ever sees its weights through the `weights` argument,
/// which the caller has checked out to the input's device and precision.
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `Adapter`",
    label = "missing `Adapter` implementation",
    note = "Adapters need `name`, `weights` and `correction`; `combine` defaults to addition."
)]
pub trait Adapter: Send + Sync + 'static {
    /// Human-readable adapter name.
    fn name(&self) -> &str;

    /// The adapter's tensors.
    fn weights(&self) -> &WeightSet;

    /// Compute the correction term for `input` given the `base` output.
    fn correction(
        &self,
        input: &Tensor,
        base: &Tensor,
        weights: &[Tensor],
    ) -> Result<Tensor, BoxError>;

    /// Merge the base output with the correction term.
    fn combine(&self, base: Tensor, correction: Tensor) -> Result<Tensor, BoxError> {
        Ok(base.add(&correction)?)
    }
}
