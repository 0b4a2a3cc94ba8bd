use std::{any::Any, collections::HashMap, path::Path};

use log::{debug, warn};
use ndarray::ArrayViewD;

use crate::{Cost, Device, Model, ModelError, Result, StateDict, storage};

/// The object-safe face of a [`Model`], for models whose concrete type is only known at runtime.
///
/// Inference is typed per model, so it is reached by downcasting to the concrete type.
pub trait DynModel: Any {
    fn kind(&self) -> &'static str;

    fn train(&mut self, data: ArrayViewD<'_, f32>) -> Result<Cost>;

    fn to_dict(&self) -> StateDict;

    fn save(&self, path: &Path) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<M: Model + 'static> DynModel for M {
    fn kind(&self) -> &'static str {
        M::KIND
    }

    fn train(&mut self, data: ArrayViewD<'_, f32>) -> Result<Cost> {
        Model::train(self, data)
    }

    fn to_dict(&self) -> StateDict {
        Model::to_dict(self)
    }

    fn save(&self, path: &Path) -> Result<()> {
        Model::save(self, path)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl dyn DynModel {
    pub fn is<M: Model + 'static>(&self) -> bool {
        self.as_any().is::<M>()
    }

    pub fn downcast_ref<M: Model + 'static>(&self) -> Option<&M> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<M: Model + 'static>(&mut self) -> Option<&mut M> {
        self.as_any_mut().downcast_mut()
    }
}

type Constructor = fn(StateDict) -> Result<Box<dyn DynModel>>;

fn construct<M: Model + 'static>(dict: StateDict) -> Result<Box<dyn DynModel>> {
    Ok(Box::new(M::from_dict(dict)?))
}

/// Maps model kinds to their constructors, so state can be loaded without knowing its model
/// type upfront.
#[derive(Default, Clone)]
pub struct Registry {
    constructors: HashMap<&'static str, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `M` under its kind, replacing any model previously registered under it.
    pub fn register<M: Model + 'static>(&mut self) -> &mut Self {
        if self.constructors.insert(M::KIND, construct::<M>).is_some() {
            warn!("replacing the model registered as {}", M::KIND);
        }
        self
    }

    /// Builder flavour of [`Registry::register`].
    pub fn with<M: Model + 'static>(mut self) -> Self {
        self.register::<M>();
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Returns every registered kind, in no particular order.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    /// Rebuilds a model of the given kind out of its state.
    ///
    /// # Errors
    /// `ModelError::UnknownKind` if nothing is registered as `kind`, otherwise whatever the
    /// model's `from_dict` fails with.
    pub fn from_dict(&self, kind: &str, dict: StateDict) -> Result<Box<dyn DynModel>> {
        let construct = self
            .constructors
            .get(kind)
            .ok_or_else(|| ModelError::UnknownKind(kind.to_string()))?;

        debug!("rebuilding a {kind} model out of {} entries", dict.len());
        construct(dict)
    }

    /// Loads whichever registered model saved `path`, realizing its tensors on the cpu.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Box<dyn DynModel>> {
        self.load_on(path, Device::Cpu)
    }

    /// Loads whichever registered model saved `path`, realizing its tensors on `device`.
    ///
    /// # Errors
    /// * Any error of [`storage::read_state`].
    /// * `ModelError::MissingKind` if the file names no model kind.
    /// * Any error of [`Registry::from_dict`].
    pub fn load_on(&self, path: impl AsRef<Path>, device: Device) -> Result<Box<dyn DynModel>> {
        let stored = storage::read_state(path, device)?;
        let kind = stored.kind.ok_or(ModelError::MissingKind)?;
        self.from_dict(&kind, stored.state)
    }
}
