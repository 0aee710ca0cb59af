//! The rendering seam between the release engine and template engines

use keel_core::{Chart, TemplateContext};
use std::collections::BTreeMap;

use crate::error::Result;

/// Rendered output keyed by path. Paths are prefixed with the chart name
/// (`web/templates/service.yaml`); subchart output lives under
/// `web/charts/<sub>/templates/`.
pub type RenderedFiles = BTreeMap<String, String>;

pub trait Renderer: Send + Sync {
    /// Name charts use to select this renderer
    fn name(&self) -> &str;

    /// Render every template of `chart` and its subcharts
    fn render(&self, chart: &Chart, context: &TemplateContext) -> Result<RenderedFiles>;
}
