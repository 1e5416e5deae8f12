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

//! Built-ins applicable to values of any type

use super::super::args::{check_count, string_arg};
use super::super::{bound_function, BuiltIn, BuiltInCall, BuiltInRegistry, StringAndFunction};
use crate::environment::Environment;
use crate::error::{EvalResult, Interrupt, TemplateError, TemplateResult};
use crate::eval::format_number;
use crate::format::ComputerNumberFormat;
use crate::model::{type_description, Callable, DateKind, Number, Value};
use crate::settings::{BuilderArgs, BuilderValue, Version};
use std::sync::Arc;

pub(super) fn register(registry: &mut BuiltInRegistry) {
    registry.register_versioned(
        "c",
        vec![
            (Version::V2_3_0, Arc::new(computer(legacy_double)) as Arc<dyn BuiltIn>),
            (Version::V2_3_21, Arc::new(computer(ComputerNumberFormat::format_plain)) as Arc<dyn BuiltIn>),
        ],
    );
    registry.register("string", string);
    registry.register("has_content", has_content);
    registry.register("then", then);

    registry.register("is_string", is(Value::is_string));
    registry.register("is_number", is(Value::is_number));
    registry.register("is_boolean", is(Value::is_boolean));
    registry.register("is_date", is(Value::is_date));
    registry.register("is_date_only", is(|v| v.date_kind() == Some(DateKind::Date)));
    registry.register("is_time", is(|v| v.date_kind() == Some(DateKind::Time)));
    registry.register("is_datetime", is(|v| v.date_kind() == Some(DateKind::DateTime)));
    registry.register("is_unknown_date_like", is(|v| v.date_kind() == Some(DateKind::Unknown)));
    registry.register("is_sequence", is(Value::is_sequence));
    registry.register("is_collection", is(Value::is_collection));
    registry.register("is_hash", is(Value::is_hash));
    registry.register("is_hash_ex", is(Value::is_hash_ex));
    registry.register("is_directive", is(|v| matches!(v.as_callable(), Some(Callable::Directive(_)))));
    registry.register("is_function", is(|v| matches!(v.as_callable(), Some(Callable::Function(_)))));
    registry.register("is_method", is(|v| matches!(v.as_callable(), Some(Callable::Method(_)))));
    registry.register("is_macro", is(|v| v.as_callable().is_some_and(|c| c.is_macro())));
    registry.register("is_node", is(Value::is_node));

    registry.register("api", api);
    registry.register("new", new);
}

/// Doubles as they were rendered before 2.3.21: exponent notation for
/// very large and very small magnitudes
fn legacy_double(number: &Number) -> String {
    match number {
        Number::Double(f) if f.is_finite() && *f != 0.0 => {
            let magnitude = f.abs();
            if !(1e-3..1e7).contains(&magnitude) {
                format!("{f:e}").replace('e', "E")
            } else {
                ComputerNumberFormat::format_plain(number)
            }
        }
        _ => ComputerNumberFormat::format_plain(number),
    }
}

fn computer(render: fn(&Number) -> String) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let value = call.target_value(env)?;
        if let Some(number) = value.number_value() {
            return Ok(Some(Value::from(render(&number))));
        }
        if let Some(b) = value.boolean_value() {
            return Ok(Some(Value::from(if b { "true" } else { "false" })));
        }
        Err(call.unexpected_type(&value, "number or boolean").into())
    }
}

fn string(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let value = call.target_value(env)?;
    if let Value::String(_) = value {
        return Ok(Some(value));
    }
    let name = call.name.to_string();
    if let Some(number) = value.number_value() {
        let text = format_number(env, &number)?.as_str().to_string();
        return Ok(Some(StringAndFunction::new(text, move |env, args| {
            check_count(&name, &args, 1)?;
            let format = string_arg(&name, &args, 0)?;
            let formatted = env.number_format_for(&format)?.format(&number)?;
            Ok(Some(Value::from(formatted.as_str())))
        })));
    }
    if let Some(date) = value.date_value() {
        let date = date?;
        if date.kind() == DateKind::Unknown {
            return Err(TemplateError::AmbiguousDateKind {
                message: format!(
                    "?{name} can't format a date whose kind is unknown. Use ?date, ?time or ?datetime first."
                ),
            }
            .into());
        }
        let text = env
            .date_format_for_value(&date)?
            .format(&date)?
            .as_str()
            .to_string();
        return Ok(Some(StringAndFunction::new(text, move |env, args| {
            check_count(&name, &args, 1)?;
            let format = string_arg(&name, &args, 0)?;
            let formatted = env
                .date_format_for(&format, date.kind(), date.is_zoneless())?
                .format(&date)?;
            Ok(Some(Value::from(formatted.as_str())))
        })));
    }
    if let Some(b) = value.boolean_value() {
        let format = env.settings().boolean_format().clone();
        let text = if format.is_computer_like() {
            if b { "true" } else { "false" }
        } else {
            format.format(b)
        };
        return Ok(Some(StringAndFunction::new(text.to_string(), move |_env, args| {
            check_count(&name, &args, 2)?;
            let chosen = if b { 0 } else { 1 };
            Ok(Some(Value::from(string_arg(&name, &args, chosen)?)))
        })));
    }
    if value.is_string() {
        let text = env.coerce_to_string(Some(&value), &call.target.canonical_form())?;
        return Ok(Some(Value::from(text)));
    }
    Err(call
        .unexpected_type(&value, "string, number, date or boolean")
        .into())
}

fn has_content(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let value = match call.target_optional(env) {
        Ok(value) => value,
        Err(Interrupt::Exception(e)) if matches!(e.error(), TemplateError::InvalidReference { .. }) => {
            None
        }
        Err(other) => return Err(other),
    };
    let Some(value) = value else {
        return Ok(Some(Value::from(false)));
    };
    let has = if let Some(text) = value.string_value() {
        !text.is_empty()
    } else if let Some(seq) = value.as_sequence() {
        !seq.is_empty()
    } else if let Some(hash) = value.as_hash_ex() {
        hash.size() > 0
    } else if let Some(mut iter) = value.iterate() {
        iter.has_next(env)?
    } else {
        true
    };
    Ok(Some(Value::from(has)))
}

/// `condition?then(when_true, when_false)`
fn then(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let value = call.target_value(env)?;
    let Some(condition) = value.boolean_value() else {
        return Err(call.unexpected_type(&value, "boolean").into());
    };
    let name = call.name.to_string();
    Ok(Some(bound_function(move |_env, args| {
        check_count(&name, &args, 2)?;
        let chosen = if condition { 0 } else { 1 };
        Ok(args.into_iter().nth(chosen).flatten())
    })))
}

fn is(predicate: fn(&Value) -> bool) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let value = call.target_value(env)?;
        Ok(Some(Value::from(predicate(&value))))
    }
}

fn api(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    if !*env.settings().api_builtin_enabled() {
        return Err(TemplateError::evaluation(format!(
            "Can't use ?{}, because the \"api_builtin_enabled\" configuration setting is false. Think twice before enabling it; it exposes the host API of the value.",
            call.name
        ))
        .into());
    }
    let value = call.target_value(env)?;
    let exposed = match &value {
        Value::Object(model) => model.api(),
        _ => None,
    };
    match exposed {
        Some(api) => Ok(Some(api)),
        None => Err(TemplateError::type_mismatch(format!(
            "The value doesn't support ?{}, because it is {} without a host API:\n==> {}",
            call.name,
            type_description(&value),
            call.target.canonical_form()
        ))
        .into()),
    }
}

fn new(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let class_name = call.target_string(env)?;
    let template_name = env.current_template_name();
    env.settings()
        .new_builtin_class_resolver()
        .check(&class_name, template_name.as_deref())
        .map_err(|reason| TemplateError::ClassNotAllowed {
            class_name: class_name.clone(),
            reason,
        })?;
    if !env.settings().object_factories().contains(&class_name) {
        return Err(TemplateError::evaluation(format!(
            "?{}: no object factory is registered for class \"{class_name}\".",
            call.name
        ))
        .into());
    }
    let name = call.name.to_string();
    Ok(Some(bound_function(move |env, args| {
        let positional = args
            .iter()
            .enumerate()
            .map(|(index, arg)| builder_value(&name, index, arg.as_ref()))
            .collect::<TemplateResult<Vec<_>>>()?;
        let builder_args = BuilderArgs {
            positional,
            named: Default::default(),
        };
        let created = env
            .settings()
            .object_factories()
            .create(&class_name, &builder_args)
            .map_err(|message| TemplateError::evaluation(format!("?{name}: {message}")))?;
        match created.downcast_ref::<Value>() {
            Some(value) => Ok(Some(value.clone())),
            None => Err(TemplateError::type_mismatch(format!(
                "?{name}: class \"{class_name}\" doesn't produce a template value."
            ))
            .into()),
        }
    })))
}

fn builder_value(builtin: &str, index: usize, value: Option<&Value>) -> TemplateResult<BuilderValue> {
    let Some(value) = value else {
        return Ok(BuilderValue::Null);
    };
    if let Some(number) = value.number_value() {
        if let Some(decimal) = number.to_decimal() {
            return Ok(BuilderValue::Number(decimal));
        }
    }
    if let Some(text) = value.string_value() {
        return Ok(BuilderValue::String(text.into_owned()));
    }
    if let Some(b) = value.boolean_value() {
        return Ok(BuilderValue::Boolean(b));
    }
    if let Some(seq) = value.as_sequence() {
        return (0..seq.len())
            .map(|i| builder_value(builtin, index, seq.get(i).as_ref()))
            .collect::<TemplateResult<Vec<_>>>()
            .map(BuilderValue::List);
    }
    Err(TemplateError::ArgumentType {
        builtin: builtin.to_string(),
        position: index + 1,
        expected: "a string, number, boolean or sequence".to_string(),
        actual: type_description(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BuiltInExpr, Call, Expression, Interpolation, Literal, Variable};
    use crate::error::RenderError;
    use crate::settings::Configuration;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_legacy_double_rendering() {
        assert_eq!(legacy_double(&Number::Double(1e21)), "1E21");
        assert_eq!(legacy_double(&Number::Double(0.5)), "0.5");
        assert_eq!(legacy_double(&Number::Integer(12)), "12");
        assert_eq!(
            ComputerNumberFormat::format_plain(&Number::Double(1e21)),
            "1000000000000000000000"
        );
    }

    fn render_then(condition: Value, when_false: Arc<dyn Expression>) -> Result<String, RenderError> {
        let then = Call::new(
            Arc::new(BuiltInExpr::new(Arc::new(Variable::new("flag")), "then")),
            vec![Arc::new(Literal::new("yes")), when_false],
        );
        let data = Value::hash(IndexMap::from([("flag".to_string(), condition)]));
        Arc::new(Configuration::default())
            .create_template("then.ftl", Arc::new(Interpolation::new(Arc::new(then))))
            .render_to_string(Some(data))
    }

    #[rstest]
    #[case(true, "yes")]
    #[case(false, "no")]
    fn test_then_picks_by_condition(#[case] condition: bool, #[case] expected: &str) {
        let out = render_then(Value::from(condition), Arc::new(Literal::new("no"))).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_then_unchosen_side_may_be_missing() {
        let out = render_then(Value::from(true), Arc::new(Variable::new("missing"))).unwrap();
        assert_eq!(out, "yes");
    }

    #[test]
    fn test_then_requires_boolean() {
        let error = render_then(Value::from(1), Arc::new(Literal::new("no")))
            .unwrap_err()
            .to_string();
        assert!(error.contains("?then"), "{error}");
        assert!(error.contains("Expected boolean"), "{error}");
    }

    #[test]
    fn test_builder_values() {
        let list = Value::sequence(vec![Value::from(1), Value::from("a")]);
        let converted = builder_value("new", 0, Some(&list)).unwrap();
        assert!(matches!(converted, BuilderValue::List(items) if items.len() == 2));
        assert!(matches!(builder_value("new", 0, None).unwrap(), BuilderValue::Null));
    }
}
