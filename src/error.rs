use std::{
    error::Error,
    fmt, io,
    path::{Path, PathBuf},
};

use safetensors::SafeTensorError;

/// The result type used across the crate.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Everything that can go wrong while training, exporting or persisting a model.
#[derive(Debug)]
pub enum ModelError {
    /// The file at `path` could not be read or written.
    Io { path: PathBuf, source: io::Error },

    /// The bytes are not a valid safetensors buffer.
    Format(SafeTensorError),

    /// The layout header stored next to the tensors could not be (de)serialized.
    Layout(serde_json::Error),

    /// The layout references a tensor the file does not contain.
    DanglingTensor(String),

    /// The encoded header is larger than safetensors agrees to read back.
    HeaderTooLarge { size: usize, limit: usize },

    /// A stored tensor uses an element type this crate does not read.
    UnsupportedDType(String),

    /// Raw tensor data does not fit the declared shape.
    Shape(ndarray::ShapeError),

    /// A state dictionary lacks a key `from_dict` requires.
    MissingKey(String),

    /// A state dictionary entry holds the wrong kind of value.
    UnexpectedValue {
        key: String,
        expected: &'static str,
        got: &'static str,
    },

    /// An input is invalid for semantic or domain reasons.
    InvalidInput(String),

    /// A shape invariant was violated (e.g. mismatched lengths).
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    /// No constructor is registered for the model kind.
    UnknownKind(String),

    /// The stored state was written without a model kind.
    MissingKind,
}

impl ModelError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            Self::Format(e) => write!(f, "invalid safetensors data: {e}"),
            Self::Layout(e) => write!(f, "invalid state layout: {e}"),
            Self::DanglingTensor(name) => {
                write!(f, "the layout references a missing tensor {name:?}")
            }
            Self::HeaderTooLarge { size, limit } => {
                write!(f, "state header of {size} bytes exceeds the {limit} bytes limit")
            }
            Self::UnsupportedDType(dtype) => write!(f, "unsupported tensor dtype {dtype}"),
            Self::Shape(e) => write!(f, "tensor shape error: {e}"),
            Self::MissingKey(key) => write!(f, "missing state key {key:?}"),
            Self::UnexpectedValue { key, expected, got } => {
                write!(f, "state key {key:?} holds a {got}, expected a {expected}")
            }
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got}, expected {expected}"),
            Self::UnknownKind(kind) => write!(f, "no model registered for kind {kind:?}"),
            Self::MissingKind => write!(f, "the stored state names no model kind"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Format(e) => Some(e),
            Self::Layout(e) => Some(e),
            Self::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SafeTensorError> for ModelError {
    fn from(value: SafeTensorError) -> Self {
        Self::Format(value)
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Layout(value)
    }
}

impl From<ndarray::ShapeError> for ModelError {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::Shape(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ModelError> for io::Error {
    fn from(value: ModelError) -> Self {
        match value {
            ModelError::Io { source, .. } => source,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
