// Rewind - Stepped Execution Visualizer
// Copyright (C) 2024 Rewind Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Best-effort value formatting
//!
//! All rendering of captured values goes through [`format_value`], parameterised by a
//! [`FormatLimits`] preset. Formatting never fails: a value that cannot be serialized
//! falls back to [`OBJECT_PLACEHOLDER`].

use serde_json::{Map, Value};

/// Marker appended to truncated text
pub const TRUNCATION_MARKER: &str = "...";

/// Rendered when a composite value cannot be serialized
pub const OBJECT_PLACEHOLDER: &str = "{...}";

/// Rendering of an unbound value
pub const UNDEFINED: &str = "undefined";

/// Truncation limits applied while formatting a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatLimits {
    /// Maximum characters of a string before it is truncated
    pub max_string: usize,
    /// Maximum array items rendered
    pub max_array: usize,
    /// Maximum characters of a compact object rendering
    pub max_object: usize,
    /// Whether truncated arrays report their full length
    pub count_suffix: bool,
}

impl FormatLimits {
    /// Call-tree labels: arguments and return values
    pub const CALL_TREE: Self = Self { max_string: 15, max_array: 5, max_object: 20, count_suffix: false };

    /// Call-frame arguments as rendered by an interpreter
    pub const ARGUMENT: Self = Self { max_string: 20, max_array: 5, max_object: 30, count_suffix: false };

    /// Variable display strings
    pub const VARIABLE: Self = Self { max_string: 30, max_array: 10, max_object: 50, count_suffix: true };
}

impl Default for FormatLimits {
    fn default() -> Self {
        Self::CALL_TREE
    }
}

/// Format a value for display. `None` renders as `undefined`.
pub fn format_value(value: Option<&Value>, limits: &FormatLimits) -> String {
    let Some(value) = value else {
        return UNDEFINED.to_string();
    };

    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", truncate(s, limits.max_string)),
        Value::Array(items) => format_array(items, limits),
        Value::Object(map) => format_object(map, limits),
    }
}

/// Format an argument list, joined with `, `.
///
/// String items are taken verbatim since interpreters hand over arguments that
/// are already formatted.
pub fn format_arguments(arguments: &[Value], limits: &FormatLimits) -> String {
    arguments
        .iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => format_value(Some(other), limits),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truncate to `max` characters, appending [`TRUNCATION_MARKER`] when anything was cut
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

fn format_array(items: &[Value], limits: &FormatLimits) -> String {
    let shown =
        items.iter().take(limits.max_array).map(format_array_item).collect::<Vec<_>>().join(", ");

    if items.len() <= limits.max_array {
        format!("[{shown}]")
    } else if limits.count_suffix {
        format!("[{shown}, {TRUNCATION_MARKER} ({} items)]", items.len())
    } else {
        format!("[{shown}, {TRUNCATION_MARKER}]")
    }
}

// Items inside an array render bare: strings unquoted, tree nodes by their value.
fn format_array_item(item: &Value) -> String {
    match item {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) if is_tree_node(map) => format_array_item(&map["value"]),
        other => serde_json::to_string(other).unwrap_or_else(|_| OBJECT_PLACEHOLDER.to_string()),
    }
}

fn format_object(map: &Map<String, Value>, limits: &FormatLimits) -> String {
    if is_tree_node(map) {
        return format!("Tree Node (value: {})", format_array_item(&map["value"]));
    }

    match serde_json::to_string(map) {
        Ok(json) => truncate(&json, limits.max_object),
        Err(_) => OBJECT_PLACEHOLDER.to_string(),
    }
}

/// Binary-tree nodes are recognised by carrying both `value` and `left`
fn is_tree_node(map: &Map<String, Value>) -> bool {
    map.contains_key("value") && map.contains_key("left")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: &Value) -> String {
        format_value(Some(value), &FormatLimits::CALL_TREE)
    }

    #[test]
    fn test_primitives() {
        assert_eq!(format_value(None, &FormatLimits::CALL_TREE), "undefined");
        assert_eq!(tree(&json!(null)), "null");
        assert_eq!(tree(&json!(true)), "true");
        assert_eq!(tree(&json!(42)), "42");
        assert_eq!(tree(&json!(-1.5)), "-1.5");
    }

    #[test]
    fn test_strings_are_quoted_and_truncated() {
        assert_eq!(tree(&json!("hello")), "\"hello\"");
        assert_eq!(tree(&json!("abcdefghijklmnopqrst")), "\"abcdefghijklmno...\"");
        // exactly at the limit stays intact
        assert_eq!(tree(&json!("abcdefghijklmno")), "\"abcdefghijklmno\"");
    }

    #[test]
    fn test_truncate_is_char_aware() {
        assert_eq!(truncate("héllo wörld", 4), "héll...");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_arrays() {
        assert_eq!(tree(&json!([1, 2, 3])), "[1, 2, 3]");
        assert_eq!(tree(&json!([1, 2, 3, 4, 5, 6, 7])), "[1, 2, 3, 4, 5, ...]");
        assert_eq!(tree(&json!(["a", null])), "[a, null]");
        assert_eq!(
            format_value(Some(&json!([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10])), &FormatLimits::VARIABLE),
            "[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, ... (11 items)]"
        );
    }

    #[test]
    fn test_objects() {
        assert_eq!(tree(&json!({"a": 1})), "{\"a\":1}");
        assert_eq!(tree(&json!({"name": "a long name value"})), "{\"name\":\"a long name...");
        assert_eq!(tree(&json!({"value": 7, "left": null, "right": null})), "Tree Node (value: 7)");
        assert_eq!(tree(&json!([{"value": 3, "left": null}])), "[3]");
    }

    #[test]
    fn test_arguments_pass_strings_through() {
        let args = vec![json!("[1, 2]"), json!(3), json!(["x"])];
        assert_eq!(format_arguments(&args, &FormatLimits::CALL_TREE), "[1, 2], 3, [x]");
        assert_eq!(format_arguments(&[], &FormatLimits::CALL_TREE), "");
    }
}
