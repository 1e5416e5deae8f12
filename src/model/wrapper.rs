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

//! Wrapping host data into template values

use super::number::Number;
use super::simple::{SimpleHash, SimpleSequence};
use super::value::Value;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Turns host data into template values
pub trait ObjectWrapper: Send + Sync + fmt::Debug {
    /// Wrap a JSON document; `None` for JSON null
    fn wrap(&self, value: &JsonValue) -> Option<Value>;
}

/// Wraps JSON objects as extended hashes and arrays as sequences
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultObjectWrapper;

impl ObjectWrapper for DefaultObjectWrapper {
    fn wrap(&self, value: &JsonValue) -> Option<Value> {
        wrap_json(value, true)
    }
}

/// Like [`DefaultObjectWrapper`], but objects only support key lookup
///
/// Templates can't list the keys of wrapped objects, so `?keys` and
/// iteration over hashes are unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct RestrictedObjectWrapper;

impl ObjectWrapper for RestrictedObjectWrapper {
    fn wrap(&self, value: &JsonValue) -> Option<Value> {
        wrap_json(value, false)
    }
}

fn wrap_json(value: &JsonValue, listable: bool) -> Option<Value> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Value::Boolean(*b)),
        JsonValue::Number(n) => Some(Value::Number(json_number(n))),
        JsonValue::String(s) => Some(Value::string(s.as_str())),
        JsonValue::Array(items) => {
            let items = items.iter().map(|item| wrap_json(item, listable)).collect();
            Some(Value::Object(Arc::new(SimpleSequence::new(items))))
        }
        JsonValue::Object(map) => {
            let entries: IndexMap<String, Value> = map
                .iter()
                .filter_map(|(k, v)| wrap_json(v, listable).map(|v| (k.clone(), v)))
                .collect();
            let hash = if listable {
                SimpleHash::new(entries)
            } else {
                SimpleHash::lookup_only(entries)
            };
            Some(Value::Object(Arc::new(hash)))
        }
    }
}

fn json_number(n: &serde_json::Number) -> Number {
    if let Some(i) = n.as_i64() {
        return Number::Integer(i);
    }
    if let Some(u) = n.as_u64() {
        return Number::Decimal(Decimal::from(u));
    }
    let f = n.as_f64().unwrap_or(f64::NAN);
    match Decimal::try_from(f) {
        Ok(d) => Number::Decimal(d),
        Err(_) => Number::Double(f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrap_nested_document() {
        let value = DefaultObjectWrapper
            .wrap(&json!({"name": "Ann", "tags": ["a", null], "age": 41}))
            .unwrap();
        let hash = value.as_hash().unwrap();
        assert_eq!(
            hash.get("name").unwrap().string_value().as_deref(),
            Some("Ann")
        );
        let tags = hash.get("tags").unwrap();
        assert_eq!(tags.as_sequence().unwrap().len(), 2);
        assert!(tags.as_sequence().unwrap().get(1).is_none());
        assert!(value.is_hash_ex());
    }

    #[test]
    fn test_restricted_wrapper_hides_keys() {
        let value = RestrictedObjectWrapper.wrap(&json!({"a": 1})).unwrap();
        assert!(value.is_hash());
        assert!(!value.is_hash_ex());
    }
}
