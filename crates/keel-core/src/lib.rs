//! Keel Core - shared types for the Keel release engine
//!
//! This crate provides the foundational types used throughout Keel:
//! - `Chart`: a parameterized template bundle plus metadata
//! - `Values` / `Config`: configuration trees, raw blobs and coalescing
//! - `Capabilities`: what the target cluster and this engine support
//! - `TemplateContext`: the data handed to a renderer

pub mod capabilities;
pub mod chart;
pub mod context;
pub mod error;
pub mod release;
pub mod values;

pub use capabilities::{
    Capabilities, ENGINE_VERSION, KubeVersion, VersionSet, engine_version, is_compatible_range,
};
pub use chart::{Chart, ChartMetadata, TemplateFile, is_chart_dir, validate_chart_dir};
pub use context::TemplateContext;
pub use error::{CoreError, Result};
pub use release::{ReleaseOptions, ReleaseStatus};
pub use values::{Config, Values, coalesce_values, parse_set_values};
