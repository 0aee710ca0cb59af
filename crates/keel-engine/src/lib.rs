//! Keel Engine - chart rendering
//!
//! A chart is rendered by a [`Renderer`]. The default renderer is a
//! MiniJinja environment with Kubernetes-oriented filters; an
//! [`EngineYard`] picks the renderer a chart asks for.

pub mod engine;
pub mod error;
pub mod filters;
pub mod renderer;
pub mod yard;

pub use engine::{Engine, EngineBuilder, JINJA_ENGINE};
pub use error::{EngineError, Result};
pub use renderer::{RenderedFiles, Renderer};
pub use yard::EngineYard;
