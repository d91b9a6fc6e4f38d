use indexmap::IndexMap;

pub const DEFAULT_MODEL_ID: &str = "gemini-3-pro-image-preview";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub recommended: bool,
}

/// Static catalog of generation models. Ids are passed to the endpoint
/// verbatim.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: IndexMap<String, ModelSpec>,
    default_id: String,
}

impl ModelCatalog {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        let models = models.unwrap_or_else(default_models);
        let default_id = if models.contains_key(DEFAULT_MODEL_ID) {
            DEFAULT_MODEL_ID.to_string()
        } else {
            models.keys().next().cloned().unwrap_or_default()
        };
        Self { models, default_id }
    }

    pub fn get(&self, id: &str) -> Option<&ModelSpec> {
        self.models.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn default_model(&self) -> Option<&ModelSpec> {
        self.models.get(&self.default_id)
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Display name for `id`, or the id itself when it is not catalogued.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id)
            .map(|model| model.display_name.as_str())
            .unwrap_or(id)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |id: &str, display_name: &str, description: &str, recommended: bool| {
        map.insert(
            id.to_string(),
            ModelSpec {
                id: id.to_string(),
                display_name: display_name.to_string(),
                description: description.to_string(),
                recommended,
            },
        );
    };

    insert(
        DEFAULT_MODEL_ID,
        "Pro high-fidelity (recommended)",
        "Best identity consistency and detail retention; use for final try-ons.",
        true,
    );
    insert(
        "gemini-2.5-flash-image",
        "Flash fast preview",
        "Very fast generation for a rough preview; slightly lower likeness.",
        false,
    );

    map
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{ModelCatalog, ModelSpec, DEFAULT_MODEL_ID};

    #[test]
    fn default_catalog_lists_pro_before_flash() {
        let catalog = ModelCatalog::default();
        let ids: Vec<&str> = catalog.list().map(|model| model.id.as_str()).collect();
        assert_eq!(ids, vec![DEFAULT_MODEL_ID, "gemini-2.5-flash-image"]);
        assert_eq!(catalog.default_id(), DEFAULT_MODEL_ID);
        assert!(catalog.default_model().map(|m| m.recommended).unwrap_or(false));
    }

    #[test]
    fn display_name_falls_back_to_raw_id() {
        let catalog = ModelCatalog::default();
        assert_eq!(
            catalog.display_name("gemini-2.5-flash-image"),
            "Flash fast preview"
        );
        assert_eq!(catalog.display_name("custom-model-x"), "custom-model-x");
    }

    #[test]
    fn custom_catalog_without_default_id_uses_first_entry() {
        let mut models = IndexMap::new();
        models.insert(
            "only-model".to_string(),
            ModelSpec {
                id: "only-model".to_string(),
                display_name: "Only".to_string(),
                description: String::new(),
                recommended: false,
            },
        );
        let catalog = ModelCatalog::new(Some(models));
        assert_eq!(catalog.default_id(), "only-model");
    }
}
