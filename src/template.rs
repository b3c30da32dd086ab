use crate::fields::{FieldValueMap, MICROSERVICE_TABLE_ROWS};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Show at most this many items before collapsing into "and N more"
const SMART_LIST_SHOWN: usize = 3;
const SMART_LIST_FULL_MAX: usize = 5;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.-]+)\}").expect("placeholder pattern is valid"))
}

/// Human-friendly rendering of a comma-joined value list.
///
/// - 1 item: `a`
/// - 2 items: `a and b`
/// - 3 to 5: `a, b, and c`
/// - 6 or more: `a, b, c, and N more`
pub fn smart_list(value: &str) -> String {
    let items: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();

    match items.len() {
        0 => String::new(),
        1 => items[0].to_string(),
        2 => format!("{} and {}", items[0], items[1]),
        n if n <= SMART_LIST_FULL_MAX => {
            format!("{}, and {}", items[..n - 1].join(", "), items[n - 1])
        }
        n => format!(
            "{}, and {} more",
            items[..SMART_LIST_SHOWN].join(", "),
            n - SMART_LIST_SHOWN
        ),
    }
}

/// Replace `{field}` placeholders with values. Unknown placeholders are left
/// untouched. The generated table fragment is inserted verbatim.
pub fn substitute(template: &str, values: &FieldValueMap) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            match values.get(name) {
                Some(value) if name == MICROSERVICE_TABLE_ROWS => value.clone(),
                Some(value) if value.contains(',') => smart_list(value),
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Placeholder names used in `template`, in first-seen order
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_pattern().captures_iter(template) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
