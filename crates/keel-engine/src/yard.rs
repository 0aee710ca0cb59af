//! Registry of renderers, selected per chart

use keel_core::ChartMetadata;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::renderer::Renderer;

/// Renderers keyed by name, with one designated default.
///
/// A chart selects its renderer through `metadata.engine`; charts that name
/// no engine, or an engine that is not registered, get the default.
#[derive(Clone)]
pub struct EngineYard {
    engines: HashMap<String, Arc<dyn Renderer>>,
    default: String,
}

impl Default for EngineYard {
    fn default() -> Self {
        Self::new(Arc::new(Engine::default()))
    }
}

impl EngineYard {
    pub fn new(default: Arc<dyn Renderer>) -> Self {
        let name = default.name().to_string();
        let mut engines = HashMap::new();
        engines.insert(name.clone(), default);
        Self {
            engines,
            default: name,
        }
    }

    /// Add a renderer, replacing any with the same name
    pub fn register(&mut self, renderer: Arc<dyn Renderer>) {
        self.engines.insert(renderer.name().to_string(), renderer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Renderer>> {
        self.engines.get(name).cloned()
    }

    pub fn default_engine(&self) -> Result<Arc<dyn Renderer>> {
        self.get(&self.default)
            .ok_or_else(|| EngineError::UnknownEngine(self.default.clone()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn select(&self, chart: &ChartMetadata) -> Result<Arc<dyn Renderer>> {
        match chart.engine.as_deref().filter(|e| !e.is_empty()) {
            None => self.default_engine(),
            Some(name) => match self.get(name) {
                Some(renderer) => Ok(renderer),
                None => {
                    warn!(
                        chart = %chart.name,
                        engine = name,
                        fallback = %self.default,
                        "chart requests an unknown template engine, using the default"
                    );
                    self.default_engine()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderedFiles;
    use keel_core::{Chart, TemplateContext};
    use semver::Version;

    struct Fixed;

    impl Renderer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn render(&self, chart: &Chart, _context: &TemplateContext) -> Result<RenderedFiles> {
            let mut out = RenderedFiles::new();
            out.insert(format!("{}/templates/a.yaml", chart.name()), "a: 1\n".into());
            Ok(out)
        }
    }

    fn meta(engine: Option<&str>) -> ChartMetadata {
        let mut meta = ChartMetadata::new("web", Version::new(1, 0, 0));
        meta.engine = engine.map(str::to_string);
        meta
    }

    #[test]
    fn test_select() {
        let mut yard = EngineYard::default();
        yard.register(Arc::new(Fixed));

        assert_eq!(yard.names(), vec!["fixed", "jinja"]);
        assert_eq!(yard.select(&meta(None)).unwrap().name(), "jinja");
        assert_eq!(yard.select(&meta(Some(""))).unwrap().name(), "jinja");
        assert_eq!(yard.select(&meta(Some("fixed"))).unwrap().name(), "fixed");
        assert_eq!(yard.select(&meta(Some("gotpl"))).unwrap().name(), "jinja");
    }
}
