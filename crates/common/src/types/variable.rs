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

//! Variables and lexical scopes captured from the interpreter

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::format::{format_value, FormatLimits};

/// Runtime type of a captured value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// No value bound
    #[default]
    Undefined,
    /// Explicit null
    Null,
    /// `true` / `false`
    Boolean,
    /// Any numeric value
    Number,
    /// Text
    String,
    /// Ordered list
    Array,
    /// Composite keyed value
    Object,
    /// Callable value; never shown as data
    Function,
}

impl ValueKind {
    /// Infer the kind of a plain data value
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None => Self::Undefined,
            Some(Value::Null) => Self::Null,
            Some(Value::Bool(_)) => Self::Boolean,
            Some(Value::Number(_)) => Self::Number,
            Some(Value::String(_)) => Self::String,
            Some(Value::Array(_)) => Self::Array,
            Some(Value::Object(_)) => Self::Object,
        }
    }
}

/// A named value in a scope.
///
/// `value` distinguishes an unbound variable (`None`) from an explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name
    pub name: String,
    /// Captured value, `None` when undefined
    #[serde(default, deserialize_with = "deserialize_present", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Runtime type
    #[serde(rename = "type", default)]
    pub kind: ValueKind,
    /// Display string as rendered by the interpreter
    #[serde(default)]
    pub display: String,
}

impl Variable {
    /// Create a variable, inferring its kind and display string from the value
    pub fn new(name: impl Into<String>, value: Option<Value>) -> Self {
        let kind = ValueKind::of(value.as_ref());
        let display = format_value(value.as_ref(), &FormatLimits::VARIABLE);
        Self { name: name.into(), value, kind, display }
    }

    /// Create a function-typed variable
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(Value::String("[Function]".to_string())),
            kind: ValueKind::Function,
            display: "[Function]".to_string(),
        }
    }

    /// Items of an array-typed variable, if it holds an actual array
    pub fn array_items(&self) -> Option<&Vec<Value>> {
        match (&self.kind, &self.value) {
            (ValueKind::Array, Some(Value::Array(items))) => Some(items),
            _ => None,
        }
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)`; a missing field stays `None`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// One level of the scope chain, innermost first in a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    /// Scope label such as `Local`, `Global` or `Scope 2`
    pub name: String,
    /// Variables in declaration order
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl Scope {
    /// Create a scope
    pub fn new(name: impl Into<String>, variables: Vec<Variable>) -> Self {
        Self { name: name.into(), variables }
    }

    /// Look up a variable by name
    pub fn find(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_inference() {
        assert_eq!(ValueKind::of(None), ValueKind::Undefined);
        assert_eq!(ValueKind::of(Some(&json!(null))), ValueKind::Null);
        assert_eq!(ValueKind::of(Some(&json!([1, 2]))), ValueKind::Array);
        assert_eq!(ValueKind::of(Some(&json!({"a": 1}))), ValueKind::Object);
    }

    #[test]
    fn test_null_is_not_undefined() {
        let var: Variable = serde_json::from_str(r#"{"name":"x","value":null,"type":"null"}"#).unwrap();
        assert_eq!(var.value, Some(Value::Null));

        let var: Variable = serde_json::from_str(r#"{"name":"y"}"#).unwrap();
        assert_eq!(var.value, None);
        assert_eq!(var.kind, ValueKind::Undefined);
    }

    #[test]
    fn test_array_items() {
        let var = Variable::new("arr", Some(json!([3, 1, 2])));
        assert_eq!(var.kind, ValueKind::Array);
        assert_eq!(var.display, "[3, 1, 2]");
        assert_eq!(var.array_items().map(Vec::len), Some(3));

        let mislabeled = Variable { kind: ValueKind::Array, ..Variable::new("s", Some(json!("abc"))) };
        assert!(mislabeled.array_items().is_none());
    }

    #[test]
    fn test_function_variable_serializes_type_key() {
        let json = serde_json::to_value(Variable::function("helper")).unwrap();
        assert_eq!(json["type"], "function");
    }
}
