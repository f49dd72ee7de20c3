//! Model space registration.

use mg_types::{MgError, MgResult, ModelType, SearchSpace};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A named search space over one model type.
#[derive(Debug, Clone)]
pub struct ModelSpace {
    pub name: String,
    pub model_type: Arc<dyn ModelType>,
    pub space: SearchSpace,
}

impl ModelSpace {
    /// Space named after its model type.
    pub fn new(model_type: Arc<dyn ModelType>, space: SearchSpace) -> Self {
        Self {
            name: model_type.name().to_string(),
            model_type,
            space,
        }
    }

    /// The model type's own default space.
    pub fn from_model_type(model_type: Arc<dyn ModelType>) -> Self {
        let space = model_type.default_space();
        Self::new(model_type, space)
    }

    /// Register the same model type more than once under distinct names.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Serialize for ModelSpace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ModelSpace", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("model_type", self.model_type.name())?;
        state.serialize_field("space", &self.space)?;
        state.end()
    }
}

/// What callers hand to the trainer: a bare model type, or a model type with
/// an explicit search space.
#[derive(Debug, Clone)]
pub enum ModelSpaceInput {
    Bare(Arc<dyn ModelType>),
    Explicit(ModelSpace),
}

impl From<Arc<dyn ModelType>> for ModelSpaceInput {
    fn from(model_type: Arc<dyn ModelType>) -> Self {
        Self::Bare(model_type)
    }
}

impl From<ModelSpace> for ModelSpaceInput {
    fn from(space: ModelSpace) -> Self {
        Self::Explicit(space)
    }
}

/// Uniquely named model spaces in registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelSpaceRegistry {
    spaces: Vec<Arc<ModelSpace>>,
    index: HashMap<String, usize>,
}

impl ModelSpaceRegistry {
    pub fn get(&self, name: &str) -> Option<&Arc<ModelSpace>> {
        self.index.get(name).map(|&i| &self.spaces[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelSpace>> {
        self.spaces.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.spaces.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

/// Normalize the inputs into a registry. The first duplicate name fails the
/// whole call.
pub fn process_model_spaces(inputs: Vec<ModelSpaceInput>) -> MgResult<ModelSpaceRegistry> {
    let mut registry = ModelSpaceRegistry::default();

    for input in inputs {
        let space = match input {
            ModelSpaceInput::Bare(model_type) => ModelSpace::from_model_type(model_type),
            ModelSpaceInput::Explicit(space) => {
                space.space.validate()?;
                space
            }
        };

        if registry.index.contains_key(&space.name) {
            return Err(MgError::DuplicateName { name: space.name });
        }

        debug!("Registered model space {} with {} dimensions", space.name, space.space.len());
        registry.index.insert(space.name.clone(), registry.spaces.len());
        registry.spaces.push(Arc::new(space));
    }

    Ok(registry)
}
