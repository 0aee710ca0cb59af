//! Template engine based on MiniJinja

use keel_core::{Chart, TemplateContext};
use minijinja::Environment;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::filters;
use crate::renderer::{RenderedFiles, Renderer};

/// Name under which the MiniJinja engine is registered
pub const JINJA_ENGINE: &str = "jinja";

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The MiniJinja renderer
pub struct Engine {
    strict_mode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
        }
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("indent", filters::indent);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("required", filters::required);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);

        env.add_function("fail", filters::fail);
        env.add_function("semver_compare", filters::semver_compare);
        env.add_function("ternary", filters::ternary);

        env
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| EngineError::from_minijinja(e, template_name, template))?;
        let tmpl = env
            .get_template(template_name)
            .map_err(|e| EngineError::from_minijinja(e, template_name, template))?;
        tmpl.render(context_value(context))
            .map_err(|e| EngineError::from_minijinja(e, template_name, template))
    }

    fn render_chart(
        &self,
        chart: &Chart,
        context: &TemplateContext,
        prefix: &str,
        out: &mut RenderedFiles,
    ) -> Result<()> {
        let mut env = self.create_environment();
        for file in &chart.templates {
            env.add_template_owned(file.name.clone(), file.data.clone())
                .map_err(|e| {
                    EngineError::from_minijinja(e, &format!("{prefix}/{}", file.name), &file.data)
                })?;
        }

        let base_path = format!("{prefix}/templates");
        for file in &chart.templates {
            if is_partial(&file.name) {
                continue;
            }
            let path = format!(
                "{prefix}/{}",
                file.name
                    .trim_end_matches(".j2")
                    .trim_end_matches(".jinja2")
            );
            let ctx = context.clone().with_template(&path, &base_path);
            let tmpl = env
                .get_template(&file.name)
                .map_err(|e| EngineError::from_minijinja(e, &path, &file.data))?;
            let rendered = tmpl
                .render(context_value(&ctx))
                .map_err(|e| EngineError::from_minijinja(e, &path, &file.data))?;
            debug!(path = %path, bytes = rendered.len(), "rendered template");
            out.insert(path, rendered);
        }

        for sub in &chart.dependencies {
            let sub_ctx = context.for_subchart(&sub.metadata);
            let sub_prefix = format!("{prefix}/charts/{}", sub.name());
            self.render_chart(sub, &sub_ctx, &sub_prefix, out)?;
        }
        Ok(())
    }
}

impl Renderer for Engine {
    fn name(&self) -> &str {
        JINJA_ENGINE
    }

    fn render(&self, chart: &Chart, context: &TemplateContext) -> Result<RenderedFiles> {
        let mut out = RenderedFiles::new();
        self.render_chart(chart, context, chart.name(), &mut out)?;
        Ok(out)
    }
}

/// Helper templates (`_helpers.tpl`) are loaded for inclusion but never rendered on their own
fn is_partial(name: &str) -> bool {
    name.rsplit('/').next().is_some_and(|base| base.starts_with('_'))
}

fn context_value(context: &TemplateContext) -> minijinja::Value {
    minijinja::context! {
        values => &context.values,
        release => &context.release,
        chart => &context.chart,
        capabilities => &context.capabilities,
        template => &context.template,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{
        Capabilities, ChartMetadata, ReleaseOptions, TemplateFile, Values,
    };
    use semver::Version;

    fn chart() -> Chart {
        let mut chart = Chart::new(ChartMetadata::new("web", Version::new(1, 0, 0)));
        chart.templates = vec![
            TemplateFile::new(
                "templates/_helpers.tpl",
                "{% macro fullname() %}{{ release.name }}-web{% endmacro %}",
            ),
            TemplateFile::new(
                "templates/service.yaml.j2",
                "{% from \"templates/_helpers.tpl\" import fullname %}kind: Service\nname: {{ fullname() }}\n",
            ),
            TemplateFile::new("templates/NOTES.txt", "Installed {{ chart.name }}"),
        ];
        let mut sub = Chart::new(ChartMetadata::new("cache", Version::new(0, 1, 0)));
        sub.templates = vec![TemplateFile::new(
            "templates/cm.yaml",
            "size: {{ values.size }}\nenv: {{ values.global.env }}\n",
        )];
        chart.dependencies.push(sub);
        chart
    }

    fn context() -> TemplateContext {
        let values =
            Values::from_yaml("replicas: 3\nglobal:\n  env: prod\ncache:\n  size: 5\n").unwrap();
        let meta = ChartMetadata::new("web", Version::new(1, 0, 0));
        TemplateContext::new(
            values,
            ReleaseOptions::for_install("myapp", "default", 1),
            &meta,
            Capabilities::default(),
        )
    }

    #[test]
    fn test_render_simple() {
        let engine = Engine::new(true);
        let result = engine
            .render_string("replicas: {{ values.replicas }}", &context(), "test.yaml")
            .unwrap();
        assert_eq!(result, "replicas: 3");
    }

    #[test]
    fn test_undefined_error() {
        let engine = Engine::new(true);
        let err = engine
            .render_string("value: {{ values.nope.deeper }}", &context(), "test.yaml")
            .unwrap_err();
        assert!(matches!(err, EngineError::Template { .. }));
    }

    #[test]
    fn test_render_chart_paths() {
        let files = Engine::default().render(&chart(), &context()).unwrap();
        let paths: Vec<_> = files.keys().map(String::as_str).collect();

        assert_eq!(
            paths,
            vec![
                "web/charts/cache/templates/cm.yaml",
                "web/templates/NOTES.txt",
                "web/templates/service.yaml",
            ]
        );
        assert_eq!(files["web/templates/service.yaml"], "kind: Service\nname: myapp-web\n");
        assert_eq!(files["web/templates/NOTES.txt"], "Installed web");
        assert_eq!(files["web/charts/cache/templates/cm.yaml"], "size: 5\nenv: prod\n");
    }
}
