//! The contract every model of the toolkit implements, and the persistence built on top of it.
//!
//! A [`Model`] trains on multi-dimensional data one iteration at a time, applies itself to new
//! data, and exports its complete internal state as a [`StateDict`]. Saving and loading follow
//! from the latter: the state is written as a safetensors file (see [`storage`]) and read back
//! with every tensor realized on the cpu, or on an explicitly requested [`Device`].

pub mod cost;
pub mod error;
pub mod model;
pub mod registry;
pub mod state;
pub mod storage;
pub mod tensor;

pub use cost::Cost;
pub use error::{ModelError, Result};
pub use model::Model;
pub use registry::{DynModel, Registry};
pub use state::{StateDict, StateValue};
pub use storage::StoredState;
pub use tensor::{DType, Device, Tensor, TensorData};
