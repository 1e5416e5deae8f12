// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Type descriptions for diagnostics

use super::date::DateKind;
use super::value::Value;

/// Describe the capabilities of a value, like `string` or `sequence+hash`
pub fn type_description(value: &Value) -> String {
    match value {
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Boolean(_) => "boolean".to_string(),
        Value::Date(d) => date_description(d.kind()).to_string(),
        Value::Callable(c) => c.kind_name().to_string(),
        Value::Node(_) => "node".to_string(),
        Value::Object(model) => {
            let mut parts: Vec<&str> = Vec::new();
            if model.as_scalar().is_some() {
                parts.push("string");
            }
            if model.as_number().is_some() {
                parts.push("number");
            }
            if model.as_boolean().is_some() {
                parts.push("boolean");
            }
            if let Some(date) = model.as_date() {
                parts.push(date_description(date.date_kind()));
            }
            if model.as_sequence().is_some() {
                parts.push("sequence");
            } else if let Some(collection) = model.as_collection() {
                parts.push(if collection.size().is_some() {
                    "extended_collection"
                } else {
                    "collection"
                });
            }
            if model.as_hash_ex().is_some() {
                parts.push("extended_hash");
            } else if model.as_hash().is_some() {
                parts.push("hash");
            }
            if let Some(callable) = model.as_callable() {
                parts.push(callable.kind_name());
            }
            if parts.is_empty() {
                "unsupported value".to_string()
            } else {
                parts.join("+")
            }
        }
    }
}

/// Describe an optional value; `None` reads as "missing"
pub fn optional_type_description(value: Option<&Value>) -> String {
    value.map_or_else(|| "missing".to_string(), type_description)
}

/// "a" or "an" followed by the type description
pub fn type_description_with_article(value: &Value) -> String {
    let description = type_description(value);
    let article = match description.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    };
    format!("{article} {description}")
}

fn date_description(kind: DateKind) -> &'static str {
    match kind {
        DateKind::Date => "date_only",
        DateKind::Time => "time",
        DateKind::DateTime => "date_time",
        DateKind::Unknown => "date (unknown type)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SimpleHash;
    use indexmap::IndexMap;
    use std::sync::Arc;

    #[test]
    fn test_descriptions() {
        assert_eq!(type_description(&Value::from("x")), "string");
        assert_eq!(
            type_description(&Value::sequence(vec![])),
            "sequence"
        );
        assert_eq!(
            type_description(&Value::Object(Arc::new(SimpleHash::lookup_only(IndexMap::new())))),
            "hash"
        );
        assert_eq!(type_description_with_article(&Value::from(1)), "a number");
        assert_eq!(optional_type_description(None), "missing");
    }
}
