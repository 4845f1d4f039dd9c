//! Shorthand argument strings: `key=value key2=value2 positional text`

use once_cell::sync::Lazy;
use regex::Regex;

use crate::playbook::types::{TaskArgs, POSITIONAL_ARG};

static LIST_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*").expect("list separator regex is valid"));

/// Parse a shorthand argument string into a task argument map.
///
/// Tokens are separated by single spaces. A token containing `=` becomes a
/// key/value pair (the value is unquoted when it is a complete quoted
/// literal), every other token is appended to the positional remainder stored
/// under `_args`. The positional key is always present.
pub fn parse_arg_string(input: &str) -> TaskArgs {
    let mut args = TaskArgs::new();
    let mut positional: Vec<&str> = Vec::new();

    for token in input.split(' ') {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                args.insert(key.to_string(), serde_json::Value::String(unquote(value)));
            }
            _ => positional.push(token),
        }
    }

    args.insert(
        POSITIONAL_ARG.to_string(),
        serde_json::Value::String(positional.join(" ")),
    );
    args
}

/// Render string arguments back into shorthand form: sorted `k=v` pairs
/// followed by the positional remainder. Non-string values are skipped.
pub fn format_arg_string(args: &TaskArgs) -> String {
    let mut keys: Vec<&String> = args
        .keys()
        .filter(|k| k.as_str() != POSITIONAL_ARG)
        .collect();
    keys.sort();

    let mut parts: Vec<String> = keys
        .into_iter()
        .filter_map(|key| args[key].as_str().map(|value| format!("{key}={value}")))
        .collect();

    if let Some(positional) = args.get(POSITIONAL_ARG).and_then(|v| v.as_str()) {
        if !positional.is_empty() {
            parts.push(positional.to_string());
        }
    }
    parts.join(" ")
}

/// Split a comma separated string into its items
pub fn split_list(input: &str) -> Vec<String> {
    LIST_SEPARATOR
        .split(input.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 {
        if value.starts_with('"') && value.ends_with('"') {
            if let Ok(unquoted) = serde_json::from_str::<String>(value) {
                return unquoted;
            }
        }
        if value.starts_with('\'') && value.ends_with('\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mixed_arguments() {
        let args = parse_arg_string("a=1 b=2 positional text");
        assert_eq!(args.get("a"), Some(&json!("1")));
        assert_eq!(args.get("b"), Some(&json!("2")));
        assert_eq!(args.get(POSITIONAL_ARG), Some(&json!("positional text")));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_parse_positional_only() {
        let args = parse_arg_string("echo hi");
        assert_eq!(args.get(POSITIONAL_ARG), Some(&json!("echo hi")));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_parse_empty_string_keeps_positional_key() {
        let args = parse_arg_string("");
        assert_eq!(args.get(POSITIONAL_ARG), Some(&json!("")));
    }

    #[test]
    fn test_parse_unquotes_values() {
        let args = parse_arg_string(r#"state="started" name='nginx' path=/etc/a=b"#);
        assert_eq!(args.get("state"), Some(&json!("started")));
        assert_eq!(args.get("name"), Some(&json!("nginx")));
        assert_eq!(args.get("path"), Some(&json!("/etc/a=b")));
    }

    #[test]
    fn test_leading_equals_is_positional() {
        let args = parse_arg_string("=x y");
        assert_eq!(args.get(POSITIONAL_ARG), Some(&json!("=x y")));
    }

    #[test]
    fn test_format_round_trip() {
        let args = parse_arg_string("b=2 run this a=1");
        let formatted = format_arg_string(&args);
        assert_eq!(formatted, "a=1 b=2 run this");
        assert_eq!(parse_arg_string(&formatted), args);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("web1, web2,db"), vec!["web1", "web2", "db"]);
        assert_eq!(split_list("single"), vec!["single"]);
        assert!(split_list("").is_empty());
    }
}
