//! Minimal tensor value with a placement attribute.
//!
//! Storage is always `f32`; [`DType`] is a precision tag used for placement
//! matching and byte accounting. Binary operations refuse operands that
//! disagree on device or precision, so a weight left on the wrong tier
//! surfaces as a [`TensorError`] instead of silently computing.

use crate::error::TensorError;
use std::fmt;

/// Memory tier a tensor currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host (CPU) memory.
    #[default]
    Host,
    /// Accelerator memory, by device index.
    Accelerator(u32),
}

impl Device {
    /// Whether this is host memory.
    pub fn is_host(self) -> bool {
        matches!(self, Device::Host)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Host => write!(f, "host"),
            Device::Accelerator(index) => write!(f, "accel:{index}"),
        }
    }
}

/// Numeric precision tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// 32-bit float.
    #[default]
    F32,
    /// 16-bit float.
    F16,
    /// 16-bit brain float.
    BF16,
}

impl DType {
    /// Bytes per element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
        }
    }
}

/// A dense row-major tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
    device: Device,
    dtype: DType,
}

impl Tensor {
    /// Create a host `F32` tensor, checking that `data` fills `shape`.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TensorError::DataLength {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape,
            data,
            device: Device::Host,
            dtype: DType::F32,
        })
    }

    /// A zero-filled host tensor.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
            device: Device::Host,
            dtype: DType::F32,
        }
    }

    /// A one-dimensional tensor.
    pub fn row(values: &[f32]) -> Self {
        Self {
            shape: vec![values.len()],
            data: values.to_vec(),
            device: Device::Host,
            dtype: DType::F32,
        }
    }

    /// A `[rows, cols]` tensor.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, TensorError> {
        Self::new(vec![rows, cols], data)
    }

    /// Builder-style placement, used to construct inputs in a given tier.
    pub fn on(mut self, device: Device, dtype: DType) -> Self {
        self.to(device, dtype);
        self
    }

    /// Shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Raw element storage.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Current device.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Current precision.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Move to `device` at precision `dtype`.
    pub fn to(&mut self, device: Device, dtype: DType) {
        self.device = device;
        self.dtype = dtype;
    }

    /// Size in bytes at the current precision.
    pub fn nbytes(&self) -> usize {
        self.data.len() * self.dtype.size_in_bytes()
    }

    /// Elementwise sum of two equally shaped tensors.
    pub fn add(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        self.check_placement(other)?;
        if self.shape != other.shape {
            return Err(self.shape_mismatch(other));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a + b)
            .collect();
        Ok(self.with_data(self.shape.clone(), data))
    }

    /// Multiply every row of `self` elementwise by the one-dimensional `row`.
    pub fn mul_row(&self, row: &Tensor) -> Result<Tensor, TensorError> {
        self.check_placement(row)?;
        let width = self.shape.last().copied().unwrap_or(0);
        if self.shape.is_empty() || row.shape.len() != 1 || row.shape[0] != width {
            return Err(self.shape_mismatch(row));
        }
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, v)| v * row.data[i % width])
            .collect();
        Ok(self.with_data(self.shape.clone(), data))
    }

    /// Multiply every element by `factor`.
    pub fn scale(&self, factor: f32) -> Tensor {
        let data = self.data.iter().map(|v| v * factor).collect();
        self.with_data(self.shape.clone(), data)
    }

    /// `self [m, k]` times the transpose of `other [n, k]`, giving `[m, n]`.
    pub fn matmul_t(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        self.check_placement(other)?;
        let (m, k) = match self.shape.as_slice() {
            [m, k] => (*m, *k),
            _ => return Err(self.shape_mismatch(other)),
        };
        let n = match other.shape.as_slice() {
            [n, k2] if *k2 == k => *n,
            _ => return Err(self.shape_mismatch(other)),
        };

        let mut data = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0;
                for r in 0..k {
                    sum += self.data[i * k + r] * other.data[j * k + r];
                }
                data[i * n + j] = sum;
            }
        }
        Ok(self.with_data(vec![m, n], data))
    }

    fn with_data(&self, shape: Vec<usize>, data: Vec<f32>) -> Tensor {
        Tensor {
            shape,
            data,
            device: self.device,
            dtype: self.dtype,
        }
    }

    fn check_placement(&self, other: &Tensor) -> Result<(), TensorError> {
        if self.device != other.device {
            return Err(TensorError::DeviceMismatch {
                left: self.device,
                right: other.device,
            });
        }
        if self.dtype != other.dtype {
            return Err(TensorError::DTypeMismatch {
                left: self.dtype,
                right: other.dtype,
            });
        }
        Ok(())
    }

    fn shape_mismatch(&self, other: &Tensor) -> TensorError {
        TensorError::ShapeMismatch {
            left: self.shape.clone(),
            right: other.shape.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_length() {
        let err = Tensor::new(vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            TensorError::DataLength {
                shape: vec![2, 3],
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn test_matmul_t() {
        // [[1, 2], [3, 4]] x [[1, 0], [1, 1], [0, 2]]^T
        let a = Tensor::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::matrix(3, 2, vec![1.0, 0.0, 1.0, 1.0, 0.0, 2.0]).unwrap();
        let c = a.matmul_t(&b).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.data(), &[1.0, 3.0, 4.0, 3.0, 7.0, 8.0]);
    }

    #[test]
    fn test_mul_row_broadcasts() {
        let a = Tensor::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let gate = Tensor::row(&[10.0, 0.5]);
        assert_eq!(a.mul_row(&gate).unwrap().data(), &[10.0, 1.0, 30.0, 2.0]);
    }

    #[test]
    fn test_mul_row_rejects_scalar() {
        let scalar = Tensor::new(vec![], vec![3.0]).unwrap();
        let empty = Tensor::row(&[]);
        assert_eq!(
            scalar.mul_row(&empty).unwrap_err(),
            TensorError::ShapeMismatch {
                left: vec![],
                right: vec![0]
            }
        );

        // Zero-width rows are fine: there is nothing to scale.
        let a = Tensor::new(vec![2, 0], vec![]).unwrap();
        assert!(a.mul_row(&empty).unwrap().data().is_empty());
    }

    #[test]
    fn test_device_mismatch_is_an_error() {
        let a = Tensor::row(&[1.0]).on(Device::Accelerator(0), DType::F32);
        let b = Tensor::row(&[1.0]);
        assert!(matches!(
            a.add(&b),
            Err(TensorError::DeviceMismatch {
                left: Device::Accelerator(0),
                right: Device::Host
            })
        ));
    }

    #[test]
    fn test_dtype_mismatch_is_an_error() {
        let a = Tensor::row(&[1.0]).on(Device::Host, DType::F16);
        let b = Tensor::row(&[1.0]);
        assert!(matches!(a.add(&b), Err(TensorError::DTypeMismatch { .. })));
    }

    #[test]
    fn test_nbytes_follows_dtype() {
        let mut t = Tensor::zeros(vec![4]);
        assert_eq!(t.nbytes(), 16);
        t.to(Device::Accelerator(1), DType::BF16);
        assert_eq!(t.nbytes(), 8);
        assert_eq!(t.device().to_string(), "accel:1");
    }
}
