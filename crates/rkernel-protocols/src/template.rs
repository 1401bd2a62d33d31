//! Command template substitution.
//!
//! Arguments may contain `{name}` placeholders. Known names are replaced;
//! unknown ones are left untouched so a later stage (usually the backend)
//! can fill its own values such as `{response_address}`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid"));

/// Substitute placeholders in a single argument.
pub fn substitute(arg: &str, namespace: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(arg, |caps: &Captures<'_>| {
            namespace
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Substitute placeholders in every argument.
pub fn format_argv(argv: &[String], namespace: &HashMap<String, String>) -> Vec<String> {
    argv.iter().map(|arg| substitute(arg, namespace)).collect()
}

/// Whether any argument still references the given placeholder.
pub fn references(argv: &[String], name: &str) -> bool {
    let needle = format!("{{{}}}", name);
    argv.iter().any(|arg| arg.contains(&needle))
}
