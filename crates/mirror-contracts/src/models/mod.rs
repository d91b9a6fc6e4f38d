mod registry;

pub use registry::{ModelCatalog, ModelSpec, DEFAULT_MODEL_ID};
