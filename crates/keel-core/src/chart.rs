//! Chart definition and on-disk loading

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::values::Values;

pub const CHART_FILE: &str = "Chart.yaml";
pub const VALUES_FILE: &str = "values.yaml";
pub const TEMPLATES_DIR: &str = "templates";
pub const CHARTS_DIR: &str = "charts";

/// Chart metadata from Chart.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub name: String,

    #[serde(with = "version_serde")]
    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Rendering engine the templates are written for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,

    /// Range of engine versions this chart works with (e.g. ">=0.2.0")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,

    /// Range of cluster versions this chart works with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl ChartMetadata {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            description: None,
            app_version: None,
            engine: None,
            engine_version: None,
            kube_version: None,
            keywords: vec![],
            home: None,
            sources: vec![],
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a Chart.yaml file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Write this metadata as YAML to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), yaml)?;
        Ok(())
    }
}

/// A single template file, named relative to the chart root
/// (e.g. `templates/deployment.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFile {
    pub name: String,
    pub data: String,
}

impl TemplateFile {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// A loaded chart: metadata, templates, default values and subcharts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub metadata: ChartMetadata,

    #[serde(default)]
    pub templates: Vec<TemplateFile>,

    #[serde(default)]
    pub values: Values,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Chart>,
}

impl Chart {
    pub fn new(metadata: ChartMetadata) -> Self {
        Self {
            metadata,
            templates: vec![],
            values: Values::new(),
            dependencies: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Load a chart directory, including every subchart under `charts/`
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        validate_chart_dir(dir)?;

        let metadata = ChartMetadata::load(dir.join(CHART_FILE))?;

        let values_path = dir.join(VALUES_FILE);
        let values = if values_path.exists() {
            Values::from_file(&values_path)?
        } else {
            Values::new()
        };

        let templates = load_templates(dir)?;

        let mut dependencies = Vec::new();
        let charts_dir = dir.join(CHARTS_DIR);
        if charts_dir.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(&charts_dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_dir())
                .collect();
            entries.sort();
            for sub in entries {
                if is_chart_dir(&sub) {
                    dependencies.push(Chart::load(&sub)?);
                } else {
                    tracing::debug!(path = %sub.display(), "skipping non-chart directory");
                }
            }
        }

        Ok(Self {
            metadata,
            templates,
            values,
            dependencies,
        })
    }
}

fn load_templates(dir: &Path) -> Result<Vec<TemplateFile>> {
    let templates_dir = dir.join(TEMPLATES_DIR);
    if !templates_dir.is_dir() {
        return Ok(vec![]);
    }

    let mut templates = Vec::new();
    for entry in WalkDir::new(&templates_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data = std::fs::read_to_string(entry.path())?;
        templates.push(TemplateFile { name, data });
    }
    Ok(templates)
}

/// Check that `dir` holds a chart: it is a directory containing a
/// parseable Chart.yaml with a non-empty name.
pub fn validate_chart_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = dir.as_ref();
    let meta = std::fs::metadata(dir).map_err(|_| CoreError::ChartNotFound {
        path: dir.display().to_string(),
    })?;
    if !meta.is_dir() {
        return Err(CoreError::InvalidChart {
            message: format!("{} is not a directory", dir.display()),
        });
    }

    let chart_file = dir.join(CHART_FILE);
    if !chart_file.exists() {
        return Err(CoreError::InvalidChart {
            message: format!("no {} exists in directory {}", CHART_FILE, dir.display()),
        });
    }

    let metadata = ChartMetadata::load(&chart_file)?;
    if metadata.name.trim().is_empty() {
        return Err(CoreError::InvalidChart {
            message: format!("chart name is empty in {}", chart_file.display()),
        });
    }
    Ok(())
}

pub fn is_chart_dir<P: AsRef<Path>>(dir: P) -> bool {
    validate_chart_dir(dir).is_ok()
}

mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(s.trim_start_matches('v')).map_err(serde::de::Error::custom)
    }
}
