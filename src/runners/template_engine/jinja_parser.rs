//! Jinja2 expression to Handlebars conversion
//!
//! Only `{{ expr }}` substitutions are converted. An expression is a variable
//! path or a quoted literal followed by any number of `| filter` or
//! `| filter(args)` applications. Filters map onto registered helpers, so
//! `{{ name | upper | replace('A', 'b') }}` becomes
//! `{{replace (upper name) "A" "b"}}`.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("expression regex is valid"));

static PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*|\[\d+\]|\['[^']*'\]|\.\d+)*$")
        .expect("path regex is valid")
});

static FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*(?:\((.*)\))?$").expect("filter regex is valid")
});

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("number regex is valid"));

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Unknown filter '{filter}' in '{expression}'")]
    UnknownFilter { filter: String, expression: String },
}

#[derive(Debug, Clone, Default)]
pub struct ConversionResult {
    pub handlebars_template: String,
    /// Variable paths that must resolve; paths guarded by `default` are excluded
    pub required_paths: Vec<Vec<String>>,
}

pub struct Jinja2Parser {
    filters: Vec<&'static str>,
}

impl Jinja2Parser {
    pub fn new(filters: Vec<&'static str>) -> Self {
        Self { filters }
    }

    pub fn convert_to_handlebars(&self, template: &str) -> Result<ConversionResult, ParseError> {
        let mut result = ConversionResult::default();
        let mut output = String::with_capacity(template.len());
        let mut last = 0;

        for caps in EXPRESSION.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            output.push_str(&template[last..whole.start()]);
            last = whole.end();

            let expression = caps[1].trim();
            output.push_str(&self.convert_expression(expression, &mut result.required_paths)?);
        }
        output.push_str(&template[last..]);

        result.handlebars_template = output;
        Ok(result)
    }

    fn convert_expression(
        &self,
        expression: &str,
        required: &mut Vec<Vec<String>>,
    ) -> Result<String, ParseError> {
        let invalid = |reason: &str| ParseError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = split_outside_quotes(expression, '|').into_iter();
        let base = parts.next().unwrap_or_default();
        let base = base.trim();
        if base.is_empty() {
            return Err(invalid("empty expression"));
        }

        let (mut converted, path) = if let Some(literal) = parse_literal(base) {
            (literal, None)
        } else if PATH.is_match(base) {
            let segments = path_segments(base);
            (handlebars_path(&segments), Some(segments))
        } else {
            return Err(invalid("expected a variable or a quoted literal"));
        };

        let mut filters = Vec::new();
        for filter in parts {
            let filter = filter.trim();
            let caps = FILTER
                .captures(filter)
                .ok_or_else(|| invalid("malformed filter"))?;
            let name = caps[1].to_string();
            if !self.filters.contains(&name.as_str()) {
                return Err(ParseError::UnknownFilter {
                    filter: name,
                    expression: expression.to_string(),
                });
            }
            let mut args = Vec::new();
            if let Some(raw_args) = caps.get(2) {
                for arg in split_outside_quotes(raw_args.as_str(), ',') {
                    let arg = arg.trim();
                    if arg.is_empty() {
                        continue;
                    }
                    let literal = parse_literal(arg)
                        .ok_or_else(|| invalid("filter arguments must be literals"))?;
                    args.push(literal);
                }
            }
            filters.push((name, args));
        }

        if let Some(segments) = path {
            if !filters.iter().any(|(name, _)| name == "default") {
                required.push(segments);
            }
        }

        if filters.is_empty() {
            return Ok(match parse_literal(base) {
                // a bare literal renders as its own text
                Some(_) => unquote_literal(base),
                None => format!("{{{{{converted}}}}}"),
            });
        }

        let last = filters.len() - 1;
        for (idx, (name, args)) in filters.into_iter().enumerate() {
            let mut call = format!("{name} {converted}");
            for arg in args {
                call.push(' ');
                call.push_str(&arg);
            }
            converted = if idx == last {
                call
            } else {
                format!("({call})")
            };
        }
        Ok(format!("{{{{{converted}}}}}"))
    }
}

/// Split on `sep` where it does not appear inside a quoted string
fn split_outside_quotes(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                current.push(c);
            }
            None if c == sep => parts.push(std::mem::take(&mut current)),
            None => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Literal in handlebars form: strings become double quoted, numbers and
/// booleans pass through
fn parse_literal(token: &str) -> Option<String> {
    if token.len() >= 2
        && ((token.starts_with('\'') && token.ends_with('\''))
            || (token.starts_with('"') && token.ends_with('"')))
    {
        let inner = &token[1..token.len() - 1];
        return Some(serde_json::Value::String(inner.to_string()).to_string());
    }
    match token {
        "true" | "True" => Some("true".to_string()),
        "false" | "False" => Some("false".to_string()),
        _ if NUMBER.is_match(token) => Some(token.to_string()),
        _ => None,
    }
}

fn unquote_literal(token: &str) -> String {
    if token.len() >= 2 && (token.starts_with('\'') || token.starts_with('"')) {
        token[1..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

fn path_segments(path: &str) -> Vec<String> {
    path.split(['.', '['])
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches(']').trim_matches('\'').to_string())
        .collect()
}

fn handlebars_path(segments: &[String]) -> String {
    segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| {
            let plain = segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !segment.starts_with(|c: char| c.is_ascii_digit());
            if idx == 0 || plain {
                segment.clone()
            } else {
                format!("[{segment}]")
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}
