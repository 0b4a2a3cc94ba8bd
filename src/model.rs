use std::path::Path;

use log::warn;
use ndarray::ArrayViewD;

use crate::{Cost, Device, Result, StateDict, storage};

/// A model: something able to describe some data given a finite set of parameters.
///
/// A linear regressor, for example, describes a dataset via a hyperplane in some N-dimensional
/// space. Every model can be trained on a sample of data, applied to new data, and can export
/// and import its complete internal state. Persisting to disk is provided on top of the latter.
pub trait Model: Sized {
    /// A stable tag naming the kind of model, stored next to its state on [`Model::save`].
    const KIND: &'static str;

    /// What [`Model::infer`] produces.
    type Output;

    /// Runs exactly one training iteration on `data`.
    ///
    /// Training updates the internal state, so calling this twice with the same data is not
    /// expected to report the same cost.
    ///
    /// # Arguments
    /// * `data` - A multi-dimensional array whose layout is defined by the model.
    ///
    /// # Returns
    /// The current training cost, or one cost per named objective.
    ///
    /// # Errors
    /// Implementations report invalid inputs with `ModelError::ShapeMismatch` or
    /// `ModelError::InvalidInput`.
    fn train(&mut self, data: ArrayViewD<'_, f32>) -> Result<Cost>;

    /// Applies the current state onto `data`.
    ///
    /// # Errors
    /// Implementations report invalid inputs with `ModelError::ShapeMismatch` or
    /// `ModelError::InvalidInput`.
    fn infer(&self, data: ArrayViewD<'_, f32>) -> Result<Self::Output>;

    /// Exports every piece of internal state needed to rebuild an equivalent model.
    fn to_dict(&self) -> StateDict;

    /// Rebuilds a model out of a state previously exported with [`Model::to_dict`].
    ///
    /// # Errors
    /// `ModelError::MissingKey` or `ModelError::UnexpectedValue` when `dict` lacks an entry or
    /// holds one of the wrong type.
    fn from_dict(dict: StateDict) -> Result<Self>;

    /// Saves the model's state to `path`, creating or overwriting the file.
    ///
    /// # Errors
    /// `ModelError::Io` if the file cannot be written, e.g. because its parent directory does
    /// not exist.
    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        storage::write_state(path, Some(Self::KIND), &self.to_dict())
    }

    /// Loads a model saved at `path`, with every tensor realized on the cpu.
    ///
    /// # Errors
    /// See [`Model::load_on`].
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_on(path, Device::Cpu)
    }

    /// Loads a model saved at `path`, with every tensor realized on `device`.
    ///
    /// # Errors
    /// * `ModelError::Io` if the file cannot be read.
    /// * `ModelError::Format`, `ModelError::Layout` or `ModelError::DanglingTensor` if it is not
    ///   a valid state file.
    /// * Whatever [`Model::from_dict`] fails with.
    fn load_on(path: impl AsRef<Path>, device: Device) -> Result<Self> {
        let path = path.as_ref();
        let stored = storage::read_state(path, device)?;

        if let Some(kind) = stored.kind.as_deref().filter(|kind| *kind != Self::KIND) {
            warn!(
                "{} was saved by a {kind} model, loading it as {}",
                path.display(),
                Self::KIND
            );
        }

        Self::from_dict(stored.state)
    }
}
