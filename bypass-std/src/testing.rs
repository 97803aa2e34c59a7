//! Testing utilities for bypass injection.
//!
//! This module provides test doubles for forwards and adapters.
//!
//! # Features
//!
//! - [`CountingForward`]: a base forward that scales its input and counts calls
//! - [`FailingForward`]: a base forward that always errors
//! - [`OffsetAdapter`]: adds a constant and records where its weights were
//! - [`FailingAdapter`]: an adapter whose correction errors or panics
//! - [`CallLog`]: shared record of adapter calls

use bypass_core::{
    Adapter, BoxError, DType, Device, Forward, ForwardFn, Tensor, TensorError, WeightSet,
};
use std::sync::{
    Arc, Mutex, PoisonError, Weak,
    atomic::{AtomicUsize, Ordering},
};

// ============================================================================
// Call Log
// ============================================================================

/// One adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Adapter name.
    pub adapter: String,
    /// Device of the adapter's weights during the call.
    pub device: Device,
    /// Precision of the adapter's weights during the call.
    pub dtype: DType,
    /// How many watched adapters had weights off the host during the call.
    pub resident: usize,
}

/// Shared record of adapter calls, in order.
///
/// # Example
///
/// ```rust,ignore
/// let log = CallLog::new();
/// let x = Arc::new(OffsetAdapter::new("x", 1.0).with_log(log.clone()));
/// log.watch(x.clone());
///
/// module.forward(&input)?;
/// assert_eq!(log.names(), vec!["x"]);
/// ```
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<CallRecord>>,
    watched: Mutex<Vec<Weak<dyn Adapter>>>,
}

impl CallLog {
    /// Create an empty, shareable log.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count `adapter` in [`CallRecord::resident`] from now on.
    pub fn watch(&self, adapter: Arc<dyn Adapter>) {
        self.watched.lock().unwrap_or_else(PoisonError::into_inner).push(Arc::downgrade(&adapter));
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Adapter names in call order.
    pub fn names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.adapter.clone())
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn record(&self, adapter: &str, weights: &[Tensor]) {
        let resident = self
            .watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|a| !a.weights().is_on_host())
            .count();
        let first = weights.first();
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(CallRecord {
            adapter: adapter.to_string(),
            device: first.map_or(Device::Host, Tensor::device),
            dtype: first.map_or(DType::F32, Tensor::dtype),
            resident,
        });
    }
}

// ============================================================================
// Forwards
// ============================================================================

/// A base forward computing `factor * x` and counting its calls.
#[derive(Clone)]
pub struct CountingForward {
    factor: f32,
    calls: Arc<AtomicUsize>,
}

impl CountingForward {
    /// Create a forward scaling by `factor`.
    pub fn new(factor: f32) -> Self {
        Self {
            factor,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of calls so far, across clones.
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Share as a [`ForwardFn`]; clones keep counting into the same counter.
    pub fn into_forward(self) -> ForwardFn {
        Arc::new(self)
    }
}

impl Forward for CountingForward {
    fn forward(&self, input: &Tensor) -> Result<Tensor, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(input.scale(self.factor))
    }
}

/// A base forward that always fails with its message.
pub struct FailingForward {
    message: String,
}

impl FailingForward {
    /// Create a failing forward.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Share as a [`ForwardFn`].
    pub fn into_forward(self) -> ForwardFn {
        Arc::new(self)
    }
}

impl Forward for FailingForward {
    fn forward(&self, _input: &Tensor) -> Result<Tensor, BoxError> {
        Err(self.message.clone().into())
    }
}

// ============================================================================
// Adapters
// ============================================================================

/// Adds a constant stored in its single weight tensor.
///
/// The correction refuses weights that are not on the input's device, so a
/// placement bug shows up as an error.
pub struct OffsetAdapter {
    name: String,
    weights: WeightSet,
    log: Option<Arc<CallLog>>,
}

impl OffsetAdapter {
    /// Create an adapter adding `offset`.
    pub fn new(name: impl Into<String>, offset: f32) -> Self {
        Self {
            name: name.into(),
            weights: WeightSet::new(vec![Tensor::row(&[offset])]),
            log: None,
        }
    }

    /// Record calls into `log`.
    pub fn with_log(mut self, log: Arc<CallLog>) -> Self {
        self.log = Some(log);
        self
    }
}

impl Adapter for OffsetAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn weights(&self) -> &WeightSet {
        &self.weights
    }

    fn correction(
        &self,
        input: &Tensor,
        base: &Tensor,
        weights: &[Tensor],
    ) -> Result<Tensor, BoxError> {
        if let Some(log) = &self.log {
            log.record(&self.name, weights);
        }
        let offset = &weights[0];
        if offset.device() != input.device() {
            return Err(TensorError::DeviceMismatch {
                left: input.device(),
                right: offset.device(),
            }
            .into());
        }
        let filled = vec![offset.data()[0]; base.data().len()];
        Ok(Tensor::new(base.shape().to_vec(), filled)?.on(base.device(), base.dtype()))
    }
}

/// How a [`FailingAdapter`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Return an error from `correction`.
    Error,
    /// Panic inside `correction`.
    Panic,
}

/// An adapter whose correction always fails.
pub struct FailingAdapter {
    name: String,
    mode: FailureMode,
    weights: WeightSet,
}

impl FailingAdapter {
    /// Create a failing adapter.
    pub fn new(name: impl Into<String>, mode: FailureMode) -> Self {
        Self {
            name: name.into(),
            mode,
            weights: WeightSet::new(vec![Tensor::zeros(vec![4, 4])]),
        }
    }
}

impl Adapter for FailingAdapter {
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
        _weights: &[Tensor],
    ) -> Result<Tensor, BoxError> {
        match self.mode {
            FailureMode::Error => Err(format!("{} correction failed", self.name).into()),
            FailureMode::Panic => panic!("{} correction panicked", self.name),
        }
    }
}
