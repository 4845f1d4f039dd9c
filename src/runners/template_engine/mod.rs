//! Jinja2-style variable substitution on top of Handlebars

pub mod handlebars_helpers;
pub mod jinja_parser;
pub mod template_processor;

pub use handlebars_helpers::{to_text, FILTERS};
pub use jinja_parser::{ConversionResult, Jinja2Parser, ParseError};
pub use template_processor::{TemplateEngine, TemplateError};
