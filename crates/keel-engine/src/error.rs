//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("{template}: {message}")]
    #[diagnostic(code(keel::engine::template))]
    Template {
        template: String,
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("error occurred here")]
        span: Option<SourceSpan>,
    },

    #[error("no template engine named '{0}' is registered")]
    #[diagnostic(code(keel::engine::unknown))]
    UnknownEngine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    pub fn from_minijinja(err: minijinja::Error, template: &str, source: &str) -> Self {
        let mut message = err.to_string();
        let mut cause = std::error::Error::source(&err);
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }

        let span = err.line().and_then(|line| line_span(source, line));
        Self::Template {
            template: template.to_string(),
            message,
            src: NamedSource::new(template, source.to_string()),
            span,
        }
    }
}

/// Byte span of a 1-based line within `source`
fn line_span(source: &str, line: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (idx, text) in source.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            return Some((offset, text.trim_end_matches('\n').len()).into());
        }
        offset += text.len();
    }
    None
}

pub type Result<T> = std::result::Result<T, EngineError>;
