//! Persistence of state dictionaries as safetensors files.
//!
//! Every tensor of the dictionary is stored as a safetensors tensor named after its position in
//! the dictionary (`"0"`, `"1"`, ...). Every `Float` is packed, as `f64` so that NaN and
//! infinities survive, into a single `floats` tensor. The shape of the dictionary itself travels
//! as JSON in the `state` metadata entry, with the remaining scalars inlined and tensors and
//! floats referenced by name and index, and the model kind, if any, in the `kind` entry.
//!
//! Files without a `state` entry, e.g. written by other tools, load as a flat dictionary of
//! their tensors.

use std::{
    collections::{BTreeMap, HashMap},
    fs, mem,
    path::Path,
};

use bytemuck::Pod;
use log::debug;
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};
use serde::{Deserialize, Serialize};

use crate::{
    ModelError, Result,
    state::{StateDict, StateValue},
    tensor::{Device, Tensor, TensorData},
};

const STATE_KEY: &str = "state";
const KIND_KEY: &str = "kind";
const FLOATS_TENSOR: &str = "floats";

/// The largest header safetensors agrees to read back.
const HEADER_LIMIT: usize = 100_000_000;

/// A state dictionary read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredState {
    /// The kind of model that wrote the state, if it was written by one.
    pub kind: Option<String>,
    pub state: StateDict,
}

/// The JSON skeleton of a state dictionary.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Layout {
    /// Index into the `floats` tensor.
    Float(usize),
    Int(i64),
    Bool(bool),
    Text(String),
    /// Name of the stored tensor.
    Tensor(String),
    List(Vec<Layout>),
    Dict(BTreeMap<String, Layout>),
}

struct RawTensor {
    dtype: Dtype,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

/// Writes `state` to `path`, creating or truncating the file.
///
/// Parent directories are not created.
///
/// # Arguments
/// * `path` - Destination file.
/// * `kind` - The kind of model the state belongs to, if any.
/// * `state` - The state to persist.
///
/// # Errors
/// `ModelError::Io` if the file cannot be written, or any error of [`encode`].
pub fn write_state(path: impl AsRef<Path>, kind: Option<&str>, state: &StateDict) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode(kind, state)?;
    fs::write(path, &bytes).map_err(|e| ModelError::io(path, e))?;

    debug!(entries = state.len(), bytes = bytes.len(); "wrote state to {}", path.display());
    Ok(())
}

/// Reads the state stored at `path`, realizing every tensor on `device`.
///
/// # Errors
/// `ModelError::Io` if the file cannot be read, or any error of [`decode`].
pub fn read_state(path: impl AsRef<Path>, device: Device) -> Result<StoredState> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| ModelError::io(path, e))?;
    let stored = decode(&bytes, device)?;

    debug!(
        entries = stored.state.len(),
        bytes = bytes.len();
        "read state from {} onto {device}",
        path.display()
    );
    Ok(stored)
}

/// Serializes a state dictionary into safetensors bytes.
///
/// # Errors
/// * `ModelError::HeaderTooLarge` if the file could not be read back.
/// * `ModelError::Format` if safetensors rejects a tensor.
pub fn encode(kind: Option<&str>, state: &StateDict) -> Result<Vec<u8>> {
    encode_within(kind, state, HEADER_LIMIT)
}

fn encode_within(kind: Option<&str>, state: &StateDict, limit: usize) -> Result<Vec<u8>> {
    let mut encoder = Encoder::default();
    let layout = encoder.dict(state);

    let mut metadata = HashMap::new();
    metadata.insert(STATE_KEY.to_string(), serde_json::to_string(&layout)?);
    if let Some(kind) = kind {
        metadata.insert(KIND_KEY.to_string(), kind.to_string());
    }

    let floats = RawTensor {
        dtype: Dtype::F64,
        shape: vec![encoder.floats.len()],
        bytes: bytemuck::cast_slice(&encoder.floats).to_vec(),
    };
    let floats = (!encoder.floats.is_empty()).then_some((FLOATS_TENSOR, &floats));

    let views = encoder
        .tensors
        .iter()
        .map(|(name, raw)| (name.as_str(), raw))
        .chain(floats)
        .map(|(name, raw)| {
            let view = TensorView::new(raw.dtype, raw.shape.clone(), &raw.bytes)?;
            Ok::<_, ModelError>((name, view))
        })
        .collect::<Result<Vec<_>>>()?;

    let bytes = safetensors::serialize(views, &Some(metadata))?;
    let size = bytes
        .first_chunk::<8>()
        .map_or(0, |n| u64::from_le_bytes(*n) as usize);
    if size > limit {
        return Err(ModelError::HeaderTooLarge { size, limit });
    }

    Ok(bytes)
}

/// Deserializes safetensors bytes into a state dictionary placed on `device`.
///
/// # Errors
/// * `ModelError::Format` if the bytes are not valid safetensors.
/// * `ModelError::Layout` if the `state` metadata entry is not a valid layout.
/// * `ModelError::DanglingTensor` if the layout references a tensor or float the file lacks.
/// * `ModelError::UnsupportedDType` / `ModelError::Shape` for unreadable tensors.
pub fn decode(bytes: &[u8], device: Device) -> Result<StoredState> {
    let (_, header) = SafeTensors::read_metadata(bytes)?;
    let tensors = SafeTensors::deserialize(bytes)?;
    let metadata = header.metadata().clone().unwrap_or_default();

    let kind = metadata.get(KIND_KEY).cloned();
    let state = match metadata.get(STATE_KEY) {
        Some(json) => {
            let layout: BTreeMap<String, Layout> = serde_json::from_str(json)?;
            let decoder = Decoder {
                tensors: &tensors,
                floats: read_floats(&tensors)?,
                device,
            };
            decoder.dict(layout)?
        }
        None => {
            let mut state = StateDict::new();
            for (name, view) in tensors.tensors() {
                state.insert(name, read_tensor(&view)?.to_device(device));
            }
            state
        }
    };

    Ok(StoredState { kind, state })
}

/// Flattens a dictionary into its layout, its tensors and its floats.
#[derive(Default)]
struct Encoder {
    tensors: Vec<(String, RawTensor)>,
    floats: Vec<f64>,
}

impl Encoder {
    fn dict(&mut self, dict: &StateDict) -> BTreeMap<String, Layout> {
        dict.iter()
            .map(|(key, value)| (key.clone(), self.value(value)))
            .collect()
    }

    fn value(&mut self, value: &StateValue) -> Layout {
        match value {
            StateValue::Float(x) => {
                self.floats.push(*x);
                Layout::Float(self.floats.len() - 1)
            }
            StateValue::Int(x) => Layout::Int(*x),
            StateValue::Bool(x) => Layout::Bool(*x),
            StateValue::Text(x) => Layout::Text(x.clone()),
            StateValue::Tensor(t) => {
                let name = self.tensors.len().to_string();
                self.tensors.push((name.clone(), raw_tensor(t)));
                Layout::Tensor(name)
            }
            StateValue::List(values) => {
                Layout::List(values.iter().map(|value| self.value(value)).collect())
            }
            StateValue::Dict(dict) => Layout::Dict(self.dict(dict)),
        }
    }
}

/// Rebuilds a dictionary out of its layout.
struct Decoder<'a> {
    tensors: &'a SafeTensors<'a>,
    floats: Vec<f64>,
    device: Device,
}

impl Decoder<'_> {
    fn dict(&self, layout: BTreeMap<String, Layout>) -> Result<StateDict> {
        layout
            .into_iter()
            .map(|(key, layout)| Ok((key, self.value(layout)?)))
            .collect()
    }

    fn value(&self, layout: Layout) -> Result<StateValue> {
        let value = match layout {
            Layout::Float(i) => {
                let x = self.floats.get(i).copied().ok_or_else(|| {
                    ModelError::DanglingTensor(format!("{FLOATS_TENSOR}[{i}]"))
                })?;
                StateValue::Float(x)
            }
            Layout::Int(x) => StateValue::Int(x),
            Layout::Bool(x) => StateValue::Bool(x),
            Layout::Text(x) => StateValue::Text(x),
            Layout::Tensor(name) => {
                let view = self
                    .tensors
                    .tensor(&name)
                    .map_err(|_| ModelError::DanglingTensor(name))?;
                StateValue::Tensor(read_tensor(&view)?.to_device(self.device))
            }
            Layout::List(layouts) => StateValue::List(
                layouts
                    .into_iter()
                    .map(|layout| self.value(layout))
                    .collect::<Result<_>>()?,
            ),
            Layout::Dict(layout) => StateValue::Dict(self.dict(layout)?),
        };

        Ok(value)
    }
}

fn raw_tensor(tensor: &Tensor) -> RawTensor {
    let (dtype, bytes) = match tensor.data() {
        TensorData::F32(a) => (Dtype::F32, array_bytes(a)),
        TensorData::F64(a) => (Dtype::F64, array_bytes(a)),
        TensorData::I64(a) => (Dtype::I64, array_bytes(a)),
    };

    RawTensor {
        dtype,
        shape: tensor.shape().to_vec(),
        bytes,
    }
}

/// Little-endian bytes of `array` in row-major order, whatever its memory layout.
fn array_bytes<T: Pod>(array: &ArrayD<T>) -> Vec<u8> {
    let elems: Vec<T> = array.iter().copied().collect();
    bytemuck::cast_slice(&elems).to_vec()
}

/// Reads possibly unaligned raw bytes as a sequence of `T`.
fn read_elems<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

fn array_from_bytes<T: Pod>(shape: &[usize], bytes: &[u8]) -> Result<ArrayD<T>> {
    Ok(ArrayD::from_shape_vec(IxDyn(shape), read_elems(bytes))?)
}

fn read_tensor(view: &TensorView<'_>) -> Result<Tensor> {
    let shape = view.shape();
    let data = match view.dtype() {
        Dtype::F32 => TensorData::F32(array_from_bytes(shape, view.data())?),
        Dtype::F64 => TensorData::F64(array_from_bytes(shape, view.data())?),
        Dtype::I64 => TensorData::I64(array_from_bytes(shape, view.data())?),
        other => return Err(ModelError::UnsupportedDType(format!("{other:?}"))),
    };

    Ok(Tensor::new(data))
}

/// Reads the packed floats, if the file has any.
fn read_floats(tensors: &SafeTensors<'_>) -> Result<Vec<f64>> {
    let Ok(view) = tensors.tensor(FLOATS_TENSOR) else {
        return Ok(Vec::new());
    };

    match view.dtype() {
        Dtype::F64 => Ok(read_elems(view.data())),
        other => Err(ModelError::UnsupportedDType(format!(
            "{other:?} in the {FLOATS_TENSOR} tensor"
        ))),
    }
}
