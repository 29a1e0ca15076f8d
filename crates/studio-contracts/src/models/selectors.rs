use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Picks the requested model, or the first model with `capability`.
    ///
    /// An explicit request that falls back carries a reason; an empty request
    /// silently takes the default.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(requested_value, capability) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
        }

        let candidates = self.registry.by_capability(capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            fallback_reason: requested.map(|value| {
                format!(
                    "Requested model '{value}' unavailable for capability '{capability}'; using {}.",
                    model.name
                )
            }),
            requested: requested.map(str::to_string),
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn edit_model(name: &str, provider: &str) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: vec!["image".to_string(), "edit".to_string()],
        }
    }

    #[test]
    fn falls_back_with_reason_when_requested_model_unknown() {
        let mut models = IndexMap::new();
        models.insert("flash".to_string(), edit_model("flash", "gemini"));
        let selection = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(Some("missing"), "edit")
            .unwrap();
        assert_eq!(selection.model.name, "flash");
        assert_eq!(selection.requested.as_deref(), Some("missing"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'missing' unavailable for capability 'edit'; using flash.")
        );
    }

    #[test]
    fn blank_request_uses_default_without_reason() {
        let selection = ModelSelector::new(None).select(Some("  "), "edit").unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash-image");
        assert!(selection.requested.is_none());
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn honors_explicit_dryrun_model() {
        let selection = ModelSelector::new(None)
            .select(Some("dryrun-image-1"), "edit")
            .unwrap();
        assert_eq!(selection.model.provider, "dryrun");
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn errors_when_no_model_has_capability() {
        let mut models = IndexMap::new();
        models.insert(
            "text-only".to_string(),
            ModelSpec {
                name: "text-only".to_string(),
                provider: "dryrun".to_string(),
                capabilities: vec!["text".to_string()],
            },
        );
        let err = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(None, "edit")
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for capability 'edit'.");
    }
}
