use std::{fmt, str::FromStr};

use ndarray::{Array, ArrayD, ArrayViewD, Dimension};

use crate::ModelError;

/// Where a tensor's owner computes with it.
///
/// Arrays always live in host memory; the device is a placement tag carried alongside them and
/// is never persisted, so loading realizes every tensor on whatever device the caller asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Device {
    #[default]
    Cpu,
    Gpu(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(ordinal) => write!(f, "gpu:{ordinal}"),
        }
    }
}

impl FromStr for Device {
    type Err = ModelError;

    /// Parses `cpu`, `gpu` (ordinal 0) or `gpu:N`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let invalid = || ModelError::InvalidInput(format!("unknown device {s:?}"));

        match s.split_once(':') {
            None if s == "cpu" => Ok(Device::Cpu),
            None if s == "gpu" => Ok(Device::Gpu(0)),
            Some(("gpu", ordinal)) => ordinal.parse().map(Device::Gpu).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F32,
    F64,
    I64,
}

impl DType {
    pub fn name(&self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I64 => "i64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The owned n-dimensional array behind a [`Tensor`].
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I64(ArrayD<i64>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
            TensorData::I64(_) => DType::I64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            TensorData::F32(a) => a.shape(),
            TensorData::F64(a) => a.shape(),
            TensorData::I64(a) => a.shape(),
        }
    }
}

/// A numeric array together with the device its owner computes on.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: TensorData,
    device: Device,
}

impl Tensor {
    /// Creates a new `Tensor` placed on the cpu.
    ///
    /// # Arguments
    /// * `data` - The array backing the tensor.
    ///
    /// # Returns
    /// A new `Tensor` instance.
    pub fn new(data: impl Into<TensorData>) -> Self {
        Self {
            data: data.into(),
            device: Device::Cpu,
        }
    }

    /// Returns this tensor tagged with `device`.
    pub fn to_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Views the tensor as `f32`, if that is its element type.
    pub fn as_f32(&self) -> Option<ArrayViewD<'_, f32>> {
        match &self.data {
            TensorData::F32(a) => Some(a.view()),
            _ => None,
        }
    }

    /// Views the tensor as `f64`, if that is its element type.
    pub fn as_f64(&self) -> Option<ArrayViewD<'_, f64>> {
        match &self.data {
            TensorData::F64(a) => Some(a.view()),
            _ => None,
        }
    }

    /// Views the tensor as `i64`, if that is its element type.
    pub fn as_i64(&self) -> Option<ArrayViewD<'_, i64>> {
        match &self.data {
            TensorData::I64(a) => Some(a.view()),
            _ => None,
        }
    }
}

impl<D: Dimension> From<Array<f32, D>> for TensorData {
    fn from(value: Array<f32, D>) -> Self {
        TensorData::F32(value.into_dyn())
    }
}

impl<D: Dimension> From<Array<f64, D>> for TensorData {
    fn from(value: Array<f64, D>) -> Self {
        TensorData::F64(value.into_dyn())
    }
}

impl<D: Dimension> From<Array<i64, D>> for TensorData {
    fn from(value: Array<i64, D>) -> Self {
        TensorData::I64(value.into_dyn())
    }
}

impl From<TensorData> for Tensor {
    fn from(value: TensorData) -> Self {
        Tensor::new(value)
    }
}

impl<D: Dimension> From<Array<f32, D>> for Tensor {
    fn from(value: Array<f32, D>) -> Self {
        Tensor::new(value)
    }
}

impl<D: Dimension> From<Array<f64, D>> for Tensor {
    fn from(value: Array<f64, D>) -> Self {
        Tensor::new(value)
    }
}

impl<D: Dimension> From<Array<i64, D>> for Tensor {
    fn from(value: Array<i64, D>) -> Self {
        Tensor::new(value)
    }
}
