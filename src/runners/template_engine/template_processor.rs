//! Variable substitution for task arguments and text assets

use handlebars::Handlebars;
use serde_json::Value;
use thiserror::Error;

use super::handlebars_helpers::{FilterHelper, FILTERS};
use super::jinja_parser::{Jinja2Parser, ParseError};
use crate::playbook::Vars;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Undefined variable '{name}' in template")]
    UndefinedVariable { name: String },

    #[error("Template conversion failed: {message}")]
    ConversionFailed { message: String },

    #[error("Template rendering failed: {message}")]
    RenderingFailed { message: String },

    #[error("Template output is not valid UTF-8")]
    NotUtf8,
}

impl From<handlebars::RenderError> for TemplateError {
    fn from(error: handlebars::RenderError) -> Self {
        TemplateError::RenderingFailed {
            message: error.to_string(),
        }
    }
}

impl From<ParseError> for TemplateError {
    fn from(error: ParseError) -> Self {
        TemplateError::ConversionFailed {
            message: error.to_string(),
        }
    }
}

/// Renders `{{ var | filter }}` expressions against a variable scope.
/// References to undefined variables fail unless guarded by `default`.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    jinja_parser: Jinja2Parser,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);

        for &(name, filter) in FILTERS {
            handlebars.register_helper(name, Box::new(FilterHelper::new(name, filter)));
        }

        let jinja_parser = Jinja2Parser::new(FILTERS.iter().map(|(name, _)| *name).collect());

        Self {
            handlebars,
            jinja_parser,
        }
    }

    pub fn render(&self, template: &str, vars: &Vars) -> Result<String, TemplateError> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }

        let conversion = self.jinja_parser.convert_to_handlebars(template)?;
        let context = serde_json::to_value(vars).map_err(|e| TemplateError::RenderingFailed {
            message: e.to_string(),
        })?;

        for path in &conversion.required_paths {
            if lookup(&context, path).is_none() {
                return Err(TemplateError::UndefinedVariable {
                    name: path.join("."),
                });
            }
        }

        Ok(self
            .handlebars
            .render_template(&conversion.handlebars_template, &context)?)
    }

    /// Render a string value; every other value is returned unchanged
    pub fn render_value(&self, value: &Value, vars: &Vars) -> Result<Value, TemplateError> {
        match value {
            Value::String(s) => Ok(Value::String(self.render(s, vars)?)),
            other => Ok(other.clone()),
        }
    }

    /// Render text content held as bytes
    pub fn render_bytes(&self, data: &[u8], vars: &Vars) -> Result<Vec<u8>, TemplateError> {
        let text = std::str::from_utf8(data).map_err(|_| TemplateError::NotUtf8)?;
        Ok(self.render(text, vars)?.into_bytes())
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(context: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(context, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}
