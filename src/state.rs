use std::collections::{BTreeMap, btree_map};

use ndarray::{Array, ArrayD, Dimension};

use crate::{
    ModelError, Result,
    tensor::{DType, Device, Tensor, TensorData},
};

/// A single entry of a [`StateDict`].
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Tensor(Tensor),
    List(Vec<StateValue>),
    Dict(StateDict),
}

impl StateValue {
    /// Returns a short human-readable name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            StateValue::Float(_) => "float",
            StateValue::Int(_) => "int",
            StateValue::Bool(_) => "bool",
            StateValue::Text(_) => "text",
            StateValue::Tensor(_) => "tensor",
            StateValue::List(_) => "list",
            StateValue::Dict(_) => "dict",
        }
    }

    /// Returns this value with every tensor it contains tagged with `device`.
    pub fn to_device(self, device: Device) -> Self {
        match self {
            StateValue::Tensor(t) => StateValue::Tensor(t.to_device(device)),
            StateValue::List(values) => StateValue::List(
                values
                    .into_iter()
                    .map(|value| value.to_device(device))
                    .collect(),
            ),
            StateValue::Dict(dict) => StateValue::Dict(dict.to_device(device)),
            other => other,
        }
    }
}

/// The complete exported state of a model.
///
/// Keys are kept ordered so two exports of the same model compare and serialize identically.
/// No schema is enforced here: every model decides its own keys, and the `take_*` accessors turn
/// a missing or mistyped entry into the matching reconstruction error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    entries: BTreeMap<String, StateValue>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the value previously stored under `key`.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<StateValue>,
    ) -> Option<StateValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// Builder flavour of [`StateDict::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<StateValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, StateValue> {
        self.entries.iter()
    }

    /// Returns this dictionary with every tensor, at any depth, tagged with `device`.
    pub fn to_device(self, device: Device) -> Self {
        self.entries
            .into_iter()
            .map(|(key, value)| (key, value.to_device(device)))
            .collect()
    }

    /// Removes the entry under `key`, failing if there is none.
    ///
    /// # Errors
    /// `ModelError::MissingKey` if `key` is absent.
    pub fn take(&mut self, key: &str) -> Result<StateValue> {
        self.entries
            .remove(key)
            .ok_or_else(|| ModelError::MissingKey(key.to_string()))
    }

    pub fn take_f64(&mut self, key: &str) -> Result<f64> {
        match self.take(key)? {
            StateValue::Float(x) => Ok(x),
            other => Err(unexpected(key, "float", other.type_name())),
        }
    }

    pub fn take_i64(&mut self, key: &str) -> Result<i64> {
        match self.take(key)? {
            StateValue::Int(x) => Ok(x),
            other => Err(unexpected(key, "int", other.type_name())),
        }
    }

    /// Takes a non-negative integer entry, typically a dimension or a step counter.
    pub fn take_usize(&mut self, key: &str) -> Result<usize> {
        let x = self.take_i64(key)?;
        usize::try_from(x).map_err(|_| {
            ModelError::InvalidInput(format!("state key {key:?} holds {x}, expected a count"))
        })
    }

    pub fn take_bool(&mut self, key: &str) -> Result<bool> {
        match self.take(key)? {
            StateValue::Bool(x) => Ok(x),
            other => Err(unexpected(key, "bool", other.type_name())),
        }
    }

    pub fn take_text(&mut self, key: &str) -> Result<String> {
        match self.take(key)? {
            StateValue::Text(x) => Ok(x),
            other => Err(unexpected(key, "text", other.type_name())),
        }
    }

    pub fn take_tensor(&mut self, key: &str) -> Result<Tensor> {
        match self.take(key)? {
            StateValue::Tensor(t) => Ok(t),
            other => Err(unexpected(key, "tensor", other.type_name())),
        }
    }

    /// Takes a tensor entry and unwraps it as an `f32` array.
    pub fn take_f32_array(&mut self, key: &str) -> Result<ArrayD<f32>> {
        match self.take_tensor(key)?.into_data() {
            TensorData::F32(a) => Ok(a),
            other => Err(unexpected(key, "f32 tensor", tensor_name(other.dtype()))),
        }
    }

    /// Takes a tensor entry and unwraps it as an `f64` array.
    pub fn take_f64_array(&mut self, key: &str) -> Result<ArrayD<f64>> {
        match self.take_tensor(key)?.into_data() {
            TensorData::F64(a) => Ok(a),
            other => Err(unexpected(key, "f64 tensor", tensor_name(other.dtype()))),
        }
    }

    /// Takes a tensor entry and unwraps it as an `i64` array.
    pub fn take_i64_array(&mut self, key: &str) -> Result<ArrayD<i64>> {
        match self.take_tensor(key)?.into_data() {
            TensorData::I64(a) => Ok(a),
            other => Err(unexpected(key, "i64 tensor", tensor_name(other.dtype()))),
        }
    }

    pub fn take_list(&mut self, key: &str) -> Result<Vec<StateValue>> {
        match self.take(key)? {
            StateValue::List(x) => Ok(x),
            other => Err(unexpected(key, "list", other.type_name())),
        }
    }

    pub fn take_dict(&mut self, key: &str) -> Result<StateDict> {
        match self.take(key)? {
            StateValue::Dict(x) => Ok(x),
            other => Err(unexpected(key, "dict", other.type_name())),
        }
    }
}

fn unexpected(key: &str, expected: &'static str, got: &'static str) -> ModelError {
    ModelError::UnexpectedValue {
        key: key.to_string(),
        expected,
        got,
    }
}

fn tensor_name(dtype: DType) -> &'static str {
    match dtype {
        DType::F32 => "f32 tensor",
        DType::F64 => "f64 tensor",
        DType::I64 => "i64 tensor",
    }
}

impl FromIterator<(String, StateValue)> for StateDict {
    fn from_iter<I: IntoIterator<Item = (String, StateValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for StateDict {
    type Item = (String, StateValue);
    type IntoIter = btree_map::IntoIter<String, StateValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a StateDict {
    type Item = (&'a String, &'a StateValue);
    type IntoIter = btree_map::Iter<'a, String, StateValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Float(value)
    }
}

impl From<f32> for StateValue {
    fn from(value: f32) -> Self {
        StateValue::Float(value.into())
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Int(value)
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::Text(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Text(value.to_string())
    }
}

impl From<Tensor> for StateValue {
    fn from(value: Tensor) -> Self {
        StateValue::Tensor(value)
    }
}

impl<D: Dimension> From<Array<f32, D>> for StateValue {
    fn from(value: Array<f32, D>) -> Self {
        StateValue::Tensor(value.into())
    }
}

impl<D: Dimension> From<Array<f64, D>> for StateValue {
    fn from(value: Array<f64, D>) -> Self {
        StateValue::Tensor(value.into())
    }
}

impl<D: Dimension> From<Array<i64, D>> for StateValue {
    fn from(value: Array<i64, D>) -> Self {
        StateValue::Tensor(value.into())
    }
}

impl From<Vec<StateValue>> for StateValue {
    fn from(value: Vec<StateValue>) -> Self {
        StateValue::List(value)
    }
}

impl From<StateDict> for StateValue {
    fn from(value: StateDict) -> Self {
        StateValue::Dict(value)
    }
}
