//! Handlebars helpers backing the supported Jinja2 filters

use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, RenderErrorReason,
    ScopedJson,
};
use serde_json::Value;

type FilterFn = fn(&Value, &[&Value]) -> Result<Value, String>;

/// Names of every filter the template engine understands
pub const FILTERS: &[(&str, FilterFn)] = &[
    ("default", default_filter),
    ("upper", upper_filter),
    ("lower", lower_filter),
    ("capitalize", capitalize_filter),
    ("trim", trim_filter),
    ("quote", quote_filter),
    ("replace", replace_filter),
    ("join", join_filter),
    ("length", length_filter),
];

/// Adapts a value-returning filter to a helper usable both as a top level
/// expression and as a subexpression
pub struct FilterHelper {
    name: &'static str,
    filter: FilterFn,
}

impl FilterHelper {
    pub fn new(name: &'static str, filter: FilterFn) -> Self {
        Self { name, filter }
    }
}

impl HelperDef for FilterHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let input = h.param(0).map(|p| p.value().clone()).unwrap_or(Value::Null);
        let args: Vec<&Value> = h.params().iter().skip(1).map(|p| p.value()).collect();

        (self.filter)(&input, &args)
            .map(ScopedJson::Derived)
            .map_err(|reason| {
                RenderError::from(RenderErrorReason::Other(format!(
                    "filter {}: {reason}",
                    self.name
                )))
            })
    }
}

/// Render a value the way it appears in template output
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn arg<'a>(args: &[&'a Value], idx: usize, filter: &str) -> Result<&'a Value, String> {
    args.get(idx)
        .copied()
        .ok_or_else(|| format!("{filter} requires {} argument(s)", idx + 1))
}

fn default_filter(value: &Value, args: &[&Value]) -> Result<Value, String> {
    match value {
        Value::Null => Ok(args.first().map(|v| (*v).clone()).unwrap_or(Value::Null)),
        other => Ok(other.clone()),
    }
}

fn upper_filter(value: &Value, _: &[&Value]) -> Result<Value, String> {
    Ok(Value::String(to_text(value).to_uppercase()))
}

fn lower_filter(value: &Value, _: &[&Value]) -> Result<Value, String> {
    Ok(Value::String(to_text(value).to_lowercase()))
}

fn capitalize_filter(value: &Value, _: &[&Value]) -> Result<Value, String> {
    let text = to_text(value);
    let mut chars = text.chars();
    let capitalized = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect::<String>(),
        None => String::new(),
    };
    Ok(Value::String(capitalized))
}

fn trim_filter(value: &Value, _: &[&Value]) -> Result<Value, String> {
    Ok(Value::String(to_text(value).trim().to_string()))
}

/// Shell quoting, safe to splice into a command line
fn quote_filter(value: &Value, _: &[&Value]) -> Result<Value, String> {
    Ok(Value::String(shell_words::quote(&to_text(value)).into_owned()))
}

fn replace_filter(value: &Value, args: &[&Value]) -> Result<Value, String> {
    let from = to_text(arg(args, 0, "replace")?);
    let to = to_text(arg(args, 1, "replace")?);
    Ok(Value::String(to_text(value).replace(&from, &to)))
}

fn join_filter(value: &Value, args: &[&Value]) -> Result<Value, String> {
    let separator = args.first().map(|v| to_text(v)).unwrap_or_default();
    match value {
        Value::Array(items) => Ok(Value::String(
            items.iter().map(to_text).collect::<Vec<_>>().join(&separator),
        )),
        other => Ok(Value::String(to_text(other))),
    }
}

fn length_filter(value: &Value, _: &[&Value]) -> Result<Value, String> {
    let len = match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::String(s) => s.chars().count(),
        Value::Null => 0,
        other => return Err(format!("{other} has no length")),
    };
    Ok(Value::from(len))
}
