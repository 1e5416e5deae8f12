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

//! Sequence built-ins
//!
//! Most of these accept any iterable left-hand operand; lazily generated
//! collections are drained through the environment. `?filter`, `?map`,
//! `?take_while` and `?drop_while` stay lazy when their result is consumed
//! by something that iterates anyway.

use super::super::args::{
    check_count, check_count_range, index_arg, int_arg, optional_string_arg, string_arg,
};
use super::super::{bound_function, BuiltIn, BuiltInCall, BuiltInRegistry, ElementTransformer};
use crate::environment::Environment;
use crate::error::{EvalResult, TemplateError, TemplateResult};
use crate::eval::compare::sort_order;
use crate::eval::{compare, CmpOp, CompareOptions, Operand};
use crate::model::{
    optional_type_description, type_description, type_description_with_article, LazySequence,
    SequenceOperation, SimpleSequence, TransformingIterator, Value,
};
use std::cmp::Ordering;
use std::sync::Arc;

pub(super) fn register(registry: &mut BuiltInRegistry) {
    registry.register("size", size);
    registry.register("first", first);
    registry.register("last", last);
    registry.register("reverse", reverse);
    registry.register("sort", sort);
    registry.register("sort_by", sort_by);
    registry.register("join", join);
    registry.register("chunk", chunk);
    registry.register("seq_contains", seq_contains);
    registry.register("seq_index_of", seq_index_of(false));
    registry.register("seq_last_index_of", seq_index_of(true));
    registry.register("min", extreme(CmpOp::Lt));
    registry.register("max", extreme(CmpOp::Gt));
    registry.register("filter", transforming(SequenceOperation::Filter));
    registry.register("map", transforming(SequenceOperation::Map));
    registry.register("take_while", transforming(SequenceOperation::TakeWhile));
    registry.register("drop_while", transforming(SequenceOperation::DropWhile));
    registry.register("sequence", sequence);
}

fn sequence_value(items: Vec<Option<Value>>) -> Value {
    Value::Object(Arc::new(SimpleSequence::new(items)))
}

/// Items of an iterable left-hand operand
fn target_items(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Vec<Option<Value>>> {
    let value = call.target_value(env)?;
    match value.collect_items(env)? {
        Some(items) => Ok(items),
        None => Err(call.unexpected_type(&value, "sequence or collection").into()),
    }
}

fn size(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let value = call.target_value(env)?;
    if let Some(seq) = value.as_sequence() {
        return Ok(Some(Value::Number(seq.len().into())));
    }
    if let Some(hash) = value.as_hash_ex() {
        return Ok(Some(Value::Number(hash.size().into())));
    }
    if let Value::Object(model) = &value {
        if let Some(known) = model.as_collection().and_then(|c| c.size()) {
            return Ok(Some(Value::Number(known.into())));
        }
    }
    let Some(mut iter) = value.iterate() else {
        return Err(call
            .unexpected_type(&value, "extended-hash or sequence or extended collection")
            .into());
    };
    let mut count = 0usize;
    while iter.has_next(env)? {
        iter.next(env)?;
        count += 1;
    }
    Ok(Some(Value::Number(count.into())))
}

fn first(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let value = call.target_value(env)?;
    if let Some(seq) = value.as_sequence() {
        return Ok(seq.get(0));
    }
    let Some(mut iter) = value.iterate() else {
        return Err(call.unexpected_type(&value, "sequence or collection").into());
    };
    if iter.has_next(env)? {
        return iter.next(env);
    }
    Ok(None)
}

fn last(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let value = call.target_value(env)?;
    match value.as_sequence() {
        Some(seq) if seq.is_empty() => Ok(None),
        Some(seq) => Ok(seq.get(seq.len() - 1)),
        None => Err(call.unexpected_type(&value, "sequence").into()),
    }
}

fn reverse(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let mut items = target_items(call, env)?;
    items.reverse();
    Ok(Some(sequence_value(items)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Text,
    Number,
    Date,
    Boolean,
}

impl SortKey {
    fn of(value: &Value) -> Option<SortKey> {
        if value.is_string() {
            Some(SortKey::Text)
        } else if value.is_number() {
            Some(SortKey::Number)
        } else if value.is_date() {
            Some(SortKey::Date)
        } else if value.is_boolean() {
            Some(SortKey::Boolean)
        } else {
            None
        }
    }

    fn name(self) -> &'static str {
        match self {
            SortKey::Text => "a string",
            SortKey::Number => "a number",
            SortKey::Date => "a date",
            SortKey::Boolean => "a boolean",
        }
    }
}

/// Stable sort of `(key, item)` pairs; all keys must be of one comparable type
fn sort_pairs(
    builtin: &str,
    env: &Environment<'_>,
    mut pairs: Vec<(Value, Option<Value>)>,
) -> TemplateResult<Vec<Option<Value>>> {
    let mut expected: Option<(SortKey, &Value)> = None;
    for (index, (key, _)) in pairs.iter().enumerate() {
        let kind = SortKey::of(key).ok_or_else(|| {
            TemplateError::type_mismatch(format!(
                "?{builtin}: Values used for sorting must be strings, numbers, dates or booleans. The value at index {index} is {}.",
                type_description(key)
            ))
        })?;
        match expected {
            None => expected = Some((kind, key)),
            Some((first_kind, first)) if first_kind != kind => {
                return Err(TemplateError::type_mismatch(format!(
                    "?{builtin}: All values used for sorting must be of the same type. The first one is {}, so every value must be {}, but the value at index {index} is {}.",
                    type_description_with_article(first),
                    first_kind.name(),
                    type_description_with_article(key)
                )));
            }
            Some(_) => {}
        }
    }
    let mut failure = None;
    pairs.sort_by(|(a, _), (b, _)| match sort_order(env, a, b) {
        Some(Ok(ordering)) => ordering,
        Some(Err(error)) => {
            failure.get_or_insert(error);
            Ordering::Equal
        }
        None => Ordering::Equal,
    });
    if let Some(error) = failure {
        return Err(error);
    }
    Ok(pairs.into_iter().map(|(_, item)| item).collect())
}

fn require_items(builtin: &str, items: Vec<Option<Value>>) -> TemplateResult<Vec<Value>> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            item.ok_or_else(|| {
                TemplateError::evaluation(format!(
                    "?{builtin}: The item at index {index} is null; sequences with null items can't be sorted."
                ))
            })
        })
        .collect()
}

fn sort(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let items = require_items(call.name, target_items(call, env)?)?;
    let pairs = items.into_iter().map(|item| (item.clone(), Some(item))).collect();
    Ok(Some(sequence_value(sort_pairs(call.name, env, pairs)?)))
}

fn sort_by(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let items = require_items(call.name, target_items(call, env)?)?;
    let name = call.name.to_string();
    Ok(Some(bound_function(move |env, args| {
        check_count(&name, &args, 1)?;
        let path = key_path(&name, &args)?;
        let mut pairs = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut key = item.clone();
            for segment in &path {
                let Some(hash) = key.as_hash() else {
                    return Err(TemplateError::type_mismatch(format!(
                        "?{name}: The item at index {index} is not a hash, so it can't have a \"{segment}\" subvariable."
                    ))
                    .into());
                };
                key = hash.get(segment).ok_or_else(|| {
                    TemplateError::evaluation(format!(
                        "?{name}: The \"{segment}\" subvariable of the item at index {index} is null or missing."
                    ))
                })?;
            }
            pairs.push((key, Some(item.clone())));
        }
        Ok(Some(sequence_value(sort_pairs(&name, env, pairs)?)))
    })))
}

fn key_path(builtin: &str, args: &[Option<Value>]) -> TemplateResult<Vec<String>> {
    let Some(argument) = args[0].as_ref() else {
        return Err(TemplateError::invalid_reference(format!("the argument of ?{builtin}")));
    };
    if let Some(key) = argument.string_value() {
        return Ok(vec![key.into_owned()]);
    }
    let Some(seq) = argument.as_sequence() else {
        return Err(TemplateError::ArgumentType {
            builtin: builtin.to_string(),
            position: 1,
            expected: "a string or a sequence of strings".to_string(),
            actual: type_description(argument),
        });
    };
    (0..seq.len())
        .map(|i| {
            seq.get(i)
                .and_then(|v| v.string_value().map(|s| s.into_owned()))
                .ok_or_else(|| TemplateError::ArgumentType {
                    builtin: builtin.to_string(),
                    position: 1,
                    expected: "a sequence of strings".to_string(),
                    actual: optional_type_description(seq.get(i).as_ref()),
                })
        })
        .collect()
}

fn join(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let items = target_items(call, env)?;
    let name = call.name.to_string();
    Ok(Some(bound_function(move |env, args| {
        check_count_range(&name, &args, 1, 3)?;
        let separator = string_arg(&name, &args, 0)?;
        let empty = optional_string_arg(&name, &args, 1)?;
        let suffix = optional_string_arg(&name, &args, 2)?;
        let mut out = String::new();
        let mut joined = 0;
        for (index, item) in items.iter().enumerate() {
            let Some(item) = item else { continue };
            if !(item.is_string() || item.is_number() || item.is_date() || item.is_boolean()) {
                return Err(TemplateError::type_mismatch(format!(
                    "?{name} can join only strings, numbers, dates and booleans, but the item at index {index} is {}.",
                    type_description(item)
                ))
                .into());
            }
            if joined > 0 {
                out.push_str(&separator);
            }
            out.push_str(&env.coerce_to_string(Some(item), &format!("item at index {index}"))?);
            joined += 1;
        }
        if joined == 0 {
            return Ok(Some(Value::from(empty.unwrap_or_default())));
        }
        if let Some(suffix) = suffix {
            out.push_str(&suffix);
        }
        Ok(Some(Value::from(out)))
    })))
}

fn chunk(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let items = target_items(call, env)?;
    let name = call.name.to_string();
    Ok(Some(bound_function(move |_env, args| {
        check_count_range(&name, &args, 1, 2)?;
        let size = index_arg(&name, &args, 0)?;
        if size == 0 {
            return Err(TemplateError::evaluation(format!(
                "?{name}: The 1st argument must be at least 1."
            ))
            .into());
        }
        let filler = args.get(1).cloned();
        let chunks = items
            .chunks(size)
            .map(|chunk| {
                let mut chunk = chunk.to_vec();
                if let Some(filler) = &filler {
                    chunk.resize(size, filler.clone());
                }
                Some(sequence_value(chunk))
            })
            .collect();
        Ok(Some(sequence_value(chunks)))
    })))
}

fn equals(env: &mut Environment<'_>, item: &Value, needle: &Value) -> TemplateResult<bool> {
    compare(
        env,
        Operand::new(Some(item), "the sequence item"),
        CmpOp::Eq,
        Operand::new(Some(needle), "the searched value"),
        CompareOptions::lenient(),
    )
}

fn seq_contains(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let items = target_items(call, env)?;
    let name = call.name.to_string();
    Ok(Some(bound_function(move |env, args| {
        check_count(&name, &args, 1)?;
        let Some(needle) = &args[0] else {
            return Ok(Some(Value::from(false)));
        };
        for item in items.iter().flatten() {
            if equals(env, item, needle)? {
                return Ok(Some(Value::from(true)));
            }
        }
        Ok(Some(Value::from(false)))
    })))
}

fn seq_index_of(backwards: bool) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let items = target_items(call, env)?;
        let name = call.name.to_string();
        Ok(Some(bound_function(move |env, args| {
            check_count_range(&name, &args, 1, 2)?;
            let Some(needle) = args[0].clone() else {
                return Ok(Some(Value::from(-1)));
            };
            let len = items.len() as i64;
            let start = if args.len() > 1 {
                int_arg(&name, &args, 1)?
            } else if backwards {
                len - 1
            } else {
                0
            };
            let indices: Box<dyn Iterator<Item = i64>> = if backwards {
                Box::new((0..=start.min(len - 1)).rev())
            } else {
                Box::new(start.max(0)..len)
            };
            for index in indices {
                if let Some(item) = &items[index as usize] {
                    if equals(env, item, &needle)? {
                        return Ok(Some(Value::from(index)));
                    }
                }
            }
            Ok(Some(Value::from(-1)))
        })))
    }
}

fn extreme(op: CmpOp) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let items = target_items(call, env)?;
        let mut best: Option<Value> = None;
        for item in items.into_iter().flatten() {
            let better = match &best {
                None => true,
                Some(current) => compare(
                    env,
                    Operand::new(Some(&item), "the sequence item"),
                    op,
                    Operand::new(Some(current), "the best so far"),
                    CompareOptions::strict(),
                )?,
            };
            if better {
                best = Some(item);
            }
        }
        Ok(best)
    }
}

fn transforming(operation: SequenceOperation) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let source = call.target_value(env)?;
        if !source.is_iterable() {
            return Err(call.unexpected_type(&source, "sequence or collection").into());
        }
        let name = call.name.to_string();
        let lazy = call.lazy;
        Ok(Some(bound_function(move |env, args| {
            check_count(&name, &args, 1)?;
            let transformer = ElementTransformer::from_argument(&name, args[0].as_ref())?;
            if lazy {
                let lazy_result =
                    LazySequence::new(source.clone(), operation, transformer, name.clone());
                return Ok(Some(Value::Object(Arc::new(lazy_result))));
            }
            let Some(iter) = source.iterate() else {
                return Ok(Some(sequence_value(Vec::new())));
            };
            let items = TransformingIterator::new(iter, operation, transformer, name.clone())
                .drain(env)?;
            Ok(Some(sequence_value(items)))
        })))
    }
}

fn sequence(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let value = call.target_value(env)?;
    if value.is_sequence() {
        return Ok(Some(value));
    }
    match value.collect_items(env)? {
        Some(items) => Ok(Some(sequence_value(items))),
        None => Err(call.unexpected_type(&value, "sequence or collection").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_key_path_accepts_string_or_sequence() {
        let single = vec![Some(Value::from("name"))];
        assert_eq!(key_path("sort_by", &single).unwrap(), vec!["name".to_string()]);
        let nested = vec![Some(Value::sequence(vec![Value::from("a"), Value::from("b")]))];
        assert_eq!(key_path("sort_by", &nested).unwrap(), vec!["a", "b"]);
        let wrong = vec![Some(Value::from(1))];
        assert!(key_path("sort_by", &wrong).is_err());
    }

    #[test]
    fn test_mixed_sort_keys_name_the_expected_type() {
        let template = Arc::new(crate::settings::Configuration::default())
            .create_template("t", Arc::new(crate::ast::Block::new(vec![])));
        let env = template.create_environment(None, Vec::new());
        let pairs = [Value::from(3), Value::from(1), Value::from("x")]
            .into_iter()
            .map(|key| (key, None))
            .collect();
        let error = sort_pairs("sort", &env, pairs).unwrap_err().to_string();
        assert!(error.contains("every value must be a number"), "{error}");
        assert!(error.contains("index 2"), "{error}");
        assert!(error.contains("The first one is a number"), "{error}");
        assert!(error.contains("index 2 is a string"), "{error}");
    }

    #[test]
    fn test_sort_keys() {
        assert_eq!(SortKey::of(&Value::from("a")), Some(SortKey::Text));
        assert_eq!(SortKey::of(&Value::from(1)), Some(SortKey::Number));
        assert_eq!(SortKey::of(&Value::sequence(vec![])), None);
    }
}
