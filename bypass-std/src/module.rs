//! Host-side modules.

use bypass_core::{BoxError, Forward, ForwardFn, ForwardSlot, Tensor, TensorError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A named module with a replaceable forward callable.
pub struct Module {
    id: String,
    active: Mutex<ForwardFn>,
}

impl Module {
    /// Create a module running `forward`.
    pub fn new(id: impl Into<String>, forward: ForwardFn) -> Self {
        Self {
            id: id.into(),
            active: Mutex::new(forward),
        }
    }

    /// Run the active forward callable.
    ///
    /// The slot lock is released before the callable runs, so a hook may
    /// inspect or replace the slot while executing.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, BoxError> {
        let forward = self.current();
        forward.forward(input)
    }

    fn lock(&self) -> MutexGuard<'_, ForwardFn> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ForwardSlot for Module {
    fn id(&self) -> &str {
        &self.id
    }

    fn current(&self) -> ForwardFn {
        self.lock().clone()
    }

    fn replace(&self, forward: ForwardFn) -> ForwardFn {
        std::mem::replace(&mut *self.lock(), forward)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hooked = self.current().hook_tag().is_some();
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("hooked", &hooked)
            .finish()
    }
}

/// A dense layer: `y = x W^T + b`.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// Create a layer from `weight [out, in]` and an optional `bias [out]`.
    pub fn new(weight: Tensor, bias: Option<Tensor>) -> Result<Self, TensorError> {
        let out = match weight.shape() {
            [out, _] => *out,
            shape => {
                return Err(TensorError::ShapeMismatch {
                    left: shape.to_vec(),
                    right: vec![0, 0],
                });
            }
        };
        if let Some(bias) = &bias {
            if bias.shape() != [out] {
                return Err(TensorError::ShapeMismatch {
                    left: weight.shape().to_vec(),
                    right: bias.shape().to_vec(),
                });
            }
        }
        Ok(Self { weight, bias })
    }

    /// Input width.
    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    /// Output width.
    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    /// Share as a [`ForwardFn`].
    pub fn into_forward(self) -> ForwardFn {
        Arc::new(self)
    }
}

impl Forward for Linear {
    fn forward(&self, input: &Tensor) -> Result<Tensor, BoxError> {
        // Base weights follow the input; the host owns their real placement.
        let weight = self.weight.clone().on(input.device(), input.dtype());
        let out = input.matmul_t(&weight)?;
        match &self.bias {
            Some(bias) => {
                let bias = bias.clone().on(input.device(), input.dtype());
                Ok(out.add(&broadcast_rows(&bias, out.shape()[0])?)?)
            }
            None => Ok(out),
        }
    }
}

fn broadcast_rows(row: &Tensor, rows: usize) -> Result<Tensor, TensorError> {
    let data = row.data().repeat(rows);
    Ok(Tensor::matrix(rows, row.data().len(), data)?.on(row.device(), row.dtype()))
}
