#![allow(dead_code)]

use std::path::PathBuf;

use models::{Cost, Device, Model, ModelError, Result, StateDict, StateValue, Tensor, TensorData};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix1, Ix2, s};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// A per-process file under the system temp dir; callers remove it when done.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "models-{}-{name}.safetensors",
        std::process::id()
    ))
}

/// `n` samples of `y = x . w + b` with features drawn uniformly from `[-1, 1)`, laid out as
/// `[x..., y]` rows.
pub fn linear_dataset(n: usize, w: &[f32], b: f32, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dim = w.len();
    let mut data = Array2::zeros((n, dim + 1));

    for mut row in data.rows_mut() {
        let mut y = b;
        for (j, wj) in w.iter().enumerate() {
            let x = rng.random_range(-1.0..1.0);
            row[j] = x;
            y += wj * x;
        }
        row[dim] = y;
    }

    data
}

fn as_matrix<'a>(data: ArrayViewD<'a, f32>, cols: usize) -> Result<ArrayView2<'a, f32>> {
    let got = data.ndim();
    let data = data
        .into_dimensionality::<Ix2>()
        .map_err(|_| ModelError::ShapeMismatch {
            what: "data rank",
            got,
            expected: 2,
        })?;

    if data.ncols() != cols {
        return Err(ModelError::ShapeMismatch {
            what: "data columns",
            got: data.ncols(),
            expected: cols,
        });
    }
    if data.nrows() == 0 {
        return Err(ModelError::InvalidInput("empty batch".to_string()));
    }

    Ok(data)
}

/// Linear regression trained by one full-batch gradient-descent step on the mean squared error
/// per `train` call. Training rows are `[x..., y]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegressor {
    weights: Array1<f32>,
    bias: f32,
    learning_rate: f32,
    steps: usize,
}

impl LinearRegressor {
    pub fn new(dim: usize, learning_rate: f32) -> Self {
        Self {
            weights: Array1::zeros(dim),
            bias: 0.,
            learning_rate,
            steps: 0,
        }
    }

    pub fn weights(&self) -> ArrayView1<'_, f32> {
        self.weights.view()
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    fn predict(&self, x: ArrayView2<f32>) -> Array1<f32> {
        x.dot(&self.weights) + self.bias
    }

    /// Takes one step against `y` and returns the loss measured before it.
    fn step(&mut self, x: ArrayView2<f32>, y: ArrayView1<f32>) -> f32 {
        let n = x.nrows() as f32;
        let residual = self.predict(x) - &y;
        let loss = residual.mapv(|r| r.powi(2)).mean().unwrap_or_default();

        let grad_w = x.t().dot(&residual) * (2.0 / n);
        let grad_b = residual.sum() * (2.0 / n);
        self.weights.scaled_add(-self.learning_rate, &grad_w);
        self.bias -= self.learning_rate * grad_b;
        self.steps += 1;

        loss
    }
}

impl Model for LinearRegressor {
    const KIND: &'static str = "linear_regressor";
    type Output = Array1<f32>;

    fn train(&mut self, data: ArrayViewD<'_, f32>) -> Result<Cost> {
        let dim = self.weights.len();
        let data = as_matrix(data, dim + 1)?;
        let (x, y) = data.split_at(Axis(1), dim);
        Ok(Cost::Scalar(self.step(x, y.column(0))))
    }

    fn infer(&self, data: ArrayViewD<'_, f32>) -> Result<Array1<f32>> {
        let x = as_matrix(data, self.weights.len())?;
        Ok(self.predict(x))
    }

    fn to_dict(&self) -> StateDict {
        StateDict::new()
            .with("weights", self.weights.clone())
            .with("bias", self.bias)
            .with("learning_rate", self.learning_rate)
            .with("steps", self.steps as i64)
    }

    fn from_dict(mut dict: StateDict) -> Result<Self> {
        let weights = dict.take_f32_array("weights")?.into_dimensionality::<Ix1>()?;

        Ok(Self {
            weights,
            bias: dict.take_f64("bias")? as f32,
            learning_rate: dict.take_f64("learning_rate")? as f32,
            steps: dict.take_usize("steps")?,
        })
    }
}

/// Two regressors sharing their inputs, reporting one named cost each. Training rows are
/// `[x..., y_first, y_second]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoHeads {
    label: String,
    first: LinearRegressor,
    second: LinearRegressor,
    history: Vec<f32>,
}

impl TwoHeads {
    pub fn new(label: &str, dim: usize, learning_rate: f32) -> Self {
        Self {
            label: label.to_string(),
            first: LinearRegressor::new(dim, learning_rate),
            second: LinearRegressor::new(dim, learning_rate),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[f32] {
        &self.history
    }
}

impl Model for TwoHeads {
    const KIND: &'static str = "two_heads";
    type Output = Array2<f32>;

    fn train(&mut self, data: ArrayViewD<'_, f32>) -> Result<Cost> {
        let dim = self.first.weights.len();
        let data = as_matrix(data, dim + 2)?;
        let x = data.slice(s![.., ..dim]);

        let first = self.first.step(x, data.column(dim));
        let second = self.second.step(x, data.column(dim + 1));
        self.history.push(first + second);

        Ok(Cost::named([("first", first), ("second", second)]))
    }

    fn infer(&self, data: ArrayViewD<'_, f32>) -> Result<Array2<f32>> {
        let x = as_matrix(data, self.first.weights.len())?;
        let first = self.first.predict(x);
        let second = self.second.predict(x);
        Ok(ndarray::stack(Axis(1), &[first.view(), second.view()])?)
    }

    fn to_dict(&self) -> StateDict {
        let history = self.history.iter().map(|&x| StateValue::from(x)).collect::<Vec<_>>();

        StateDict::new()
            .with("label", self.label.as_str())
            .with("first", self.first.to_dict())
            .with("second", self.second.to_dict())
            .with("history", history)
    }

    fn from_dict(mut dict: StateDict) -> Result<Self> {
        let history = dict
            .take_list("history")?
            .into_iter()
            .map(|value| match value {
                StateValue::Float(x) => Ok(x as f32),
                other => Err(ModelError::UnexpectedValue {
                    key: "history".to_string(),
                    expected: "float",
                    got: other.type_name(),
                }),
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            label: dict.take_text("label")?,
            first: LinearRegressor::from_dict(dict.take_dict("first")?)?,
            second: LinearRegressor::from_dict(dict.take_dict("second")?)?,
            history,
        })
    }
}

/// A lookup table whose rows drift halfway toward the rows they are trained on.
///
/// Its table keeps the device it was placed on, so loading it shows where the state landed.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    table: Array2<f32>,
    device: Device,
}

impl Embedding {
    pub fn new(table: Array2<f32>) -> Self {
        Self {
            table,
            device: Device::Cpu,
        }
    }

    pub fn on(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

impl Model for Embedding {
    const KIND: &'static str = "embedding";
    type Output = Array2<f32>;

    fn train(&mut self, data: ArrayViewD<'_, f32>) -> Result<Cost> {
        let data = as_matrix(data, self.table.ncols())?;
        if data.nrows() != self.table.nrows() {
            return Err(ModelError::ShapeMismatch {
                what: "data rows",
                got: data.nrows(),
                expected: self.table.nrows(),
            });
        }

        let diff = &data - &self.table;
        let cost = diff.mapv(|d| d.powi(2)).mean().unwrap_or_default();
        self.table.scaled_add(0.5, &diff);

        Ok(Cost::Scalar(cost))
    }

    /// Looks up the rows whose indices are given in a 1-d array.
    fn infer(&self, data: ArrayViewD<'_, f32>) -> Result<Array2<f32>> {
        let got = data.ndim();
        let indices = data
            .into_dimensionality::<Ix1>()
            .map_err(|_| ModelError::ShapeMismatch {
                what: "index rank",
                got,
                expected: 1,
            })?;

        let rows = indices
            .iter()
            .map(|&i| {
                let valid = i >= 0. && i.fract() == 0. && (i as usize) < self.table.nrows();
                if valid {
                    Ok(i as usize)
                } else {
                    Err(ModelError::InvalidInput(format!("no row {i}")))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(self.table.select(Axis(0), &rows))
    }

    fn to_dict(&self) -> StateDict {
        StateDict::new().with("table", Tensor::from(self.table.clone()).to_device(self.device))
    }

    fn from_dict(mut dict: StateDict) -> Result<Self> {
        let tensor = dict.take_tensor("table")?;
        let device = tensor.device();
        let table = match tensor.into_data() {
            TensorData::F32(table) => table.into_dimensionality::<Ix2>()?,
            other => {
                return Err(ModelError::UnexpectedValue {
                    key: "table".to_string(),
                    expected: "f32 tensor",
                    got: other.dtype().name(),
                });
            }
        };

        Ok(Self { table, device })
    }
}
