//! Name → factory registry of segmentation models

use std::sync::Arc;

use super::device::ComputeBackend;
use super::segmenter::Segmenter;
use super::threshold::ThresholdSegmenter;

/// Options a factory receives when building a model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelOptions {
    pub use_cpu: bool,
    pub backend: ComputeBackend,
}

pub type ModelFactory =
    Box<dyn Fn(&ModelOptions) -> anyhow::Result<Box<dyn Segmenter>> + Send + Sync>;

/// Ordered set of available models
#[derive(Default)]
pub struct ModelRegistry {
    entries: Vec<(String, ModelFactory)>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.list_models()).finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in threshold models
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("Lung (HU threshold)", |opts| {
            Ok(Box::new(ThresholdSegmenter::lung(opts.backend)))
        });
        registry.register("Liver (HU threshold)", |opts| {
            Ok(Box::new(ThresholdSegmenter::liver(opts.backend)))
        });
        registry
    }

    /// Add a model. Re-registering a name replaces the factory in place.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ModelOptions) -> anyhow::Result<Box<dyn Segmenter>> + Send + Sync + 'static,
    {
        let name = name.into();
        let factory: ModelFactory = Box::new(factory);
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((name, factory)),
        }
    }

    /// Model names in registration order
    pub fn list_models(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Build and load a model, None if it is unknown or fails to load
    pub fn get_instance(&self, name: &str, use_cpu: bool) -> Option<Arc<dyn Segmenter>> {
        let Some((_, factory)) = self.entries.iter().find(|(n, _)| n == name) else {
            log::warn!("Unknown model: {}", name);
            return None;
        };

        let options = ModelOptions {
            use_cpu,
            backend: ComputeBackend::select(use_cpu),
        };
        let mut model = match factory(&options) {
            Ok(model) => model,
            Err(err) => {
                log::warn!("Could not create model {}: {:#}", name, err);
                return None;
            }
        };
        if let Err(err) = model.load() {
            log::warn!("Could not load model {}: {:#}", name, err);
            return None;
        }

        log::info!(
            "Model ready: {} (organ {}, backend {})",
            name,
            model.organ_key(),
            model.backend().name()
        );
        Some(Arc::from(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_models_listed_in_order() {
        let registry = ModelRegistry::with_builtin();
        assert_eq!(
            registry.list_models(),
            ["Lung (HU threshold)", "Liver (HU threshold)"]
        );
    }

    #[test]
    fn test_get_instance_unknown_is_none() {
        let registry = ModelRegistry::with_builtin();
        assert!(registry.get_instance("Spleen", false).is_none());
    }

    #[test]
    fn test_get_instance_with_cpu_override() {
        let registry = ModelRegistry::with_builtin();
        let model = registry.get_instance("Lung (HU threshold)", true).unwrap();
        assert_eq!(model.backend(), ComputeBackend::Fallback);
        assert_eq!(model.organ_key().as_str(), "lung");
        assert!(model.info().use_cpu);
    }

    #[test]
    fn test_failing_factory_and_load_yield_none() {
        let mut registry = ModelRegistry::new();
        registry.register("broken", |_| Err(anyhow::anyhow!("weights missing")));
        registry.register("empty window", |opts| {
            Ok(Box::new(ThresholdSegmenter::new("w", "x", 5, 5, opts.backend)))
        });
        assert!(registry.get_instance("broken", true).is_none());
        assert!(registry.get_instance("empty window", true).is_none());
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = ModelRegistry::with_builtin();
        registry.register("Lung (HU threshold)", |opts| {
            Ok(Box::new(ThresholdSegmenter::new("Lung v2", "lung", -950, -350, opts.backend)))
        });
        assert_eq!(registry.list_models().len(), 2);
        let model = registry.get_instance("Lung (HU threshold)", true).unwrap();
        assert_eq!(model.display_name(), "Lung v2");
    }
}
