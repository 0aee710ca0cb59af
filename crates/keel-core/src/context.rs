//! Template rendering context

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::capabilities::Capabilities;
use crate::chart::ChartMetadata;
use crate::release::ReleaseOptions;
use crate::values::Values;

/// Context available to all templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Coalesced values
    pub values: JsonValue,

    pub release: ReleaseOptions,

    pub chart: ChartInfo,

    pub capabilities: Capabilities,

    /// Current template info
    pub template: TemplateInfo,
}

/// Chart information for templates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInfo {
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
}

impl From<&ChartMetadata> for ChartInfo {
    fn from(meta: &ChartMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            version: meta.version.to_string(),
            app_version: meta.app_version.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    /// Template path, prefixed with the chart name
    pub name: String,
    pub base_path: String,
}

impl TemplateContext {
    pub fn new(
        values: Values,
        release: ReleaseOptions,
        chart: &ChartMetadata,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            values: values.into_inner(),
            release,
            chart: ChartInfo::from(chart),
            capabilities,
            template: TemplateInfo::default(),
        }
    }

    /// A copy of this context as seen by a subchart
    pub fn for_subchart(&self, subchart: &ChartMetadata) -> Self {
        Self {
            values: Values(self.values.clone())
                .scope_for_subchart(&subchart.name)
                .into_inner(),
            release: self.release.clone(),
            chart: ChartInfo::from(subchart),
            capabilities: self.capabilities.clone(),
            template: TemplateInfo::default(),
        }
    }

    pub fn with_template(mut self, name: &str, base_path: &str) -> Self {
        self.template = TemplateInfo {
            name: name.to_string(),
            base_path: base_path.to_string(),
        };
        self
    }

    /// Convert to a minijinja-compatible value
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}
