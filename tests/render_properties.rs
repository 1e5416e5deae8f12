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

//! Comparison, sequence built-ins and error recovery seen through renders

mod common;

use chrono::{NaiveDate, NaiveTime};
use common::*;
use octofhir_template::ast::{
    Attempt, BuiltInExpr, Call, Comparison, Element, Expression, SpecialVariable,
};
use octofhir_template::eval::{compare, CmpOp, CompareOptions, Operand};
use octofhir_template::model::{Callable, FunctionModel};
use octofhir_template::{Environment, EvalResult, Number, TemplateDate, Value};
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

fn decimal(text: &str) -> Value {
    Value::from(Number::from(Decimal::from_str(text).unwrap()))
}

fn holds(left: &Value, op: CmpOp, right: &Value) -> bool {
    let mut env = template(block(vec![])).create_environment(None, Vec::new());
    compare(
        &mut env,
        Operand::new(Some(left), "left"),
        op,
        Operand::new(Some(right), "right"),
        CompareOptions::strict(),
    )
    .unwrap()
}

#[rstest]
#[case(decimal("1.5"), decimal("1.50"))]
#[case(Value::from(1), Value::from(2))]
#[case(Value::from(-3), decimal("2.75"))]
#[case(Value::from("a"), Value::from("a"))]
#[case(Value::from("a"), Value::from("b"))]
#[case(Value::from(true), Value::from(false))]
fn test_equality_is_symmetric(#[case] a: Value, #[case] b: Value) {
    assert_eq!(holds(&a, CmpOp::Eq, &b), holds(&b, CmpOp::Eq, &a));
    assert_eq!(holds(&a, CmpOp::Ne, &b), !holds(&a, CmpOp::Eq, &b));
}

#[rstest]
#[case(1, 2)]
#[case(5, 5)]
#[case(-7, 3)]
fn test_ordering_is_antisymmetric(#[case] a: i64, #[case] b: i64) {
    let (a, b) = (Value::from(a), Value::from(b));
    assert_eq!(holds(&a, CmpOp::Lt, &b), holds(&b, CmpOp::Gt, &a));
    assert_eq!(holds(&a, CmpOp::Le, &b), holds(&b, CmpOp::Ge, &a));
}

#[test]
fn test_decimal_scale_does_not_matter() {
    assert!(holds(&decimal("1.5"), CmpOp::Eq, &decimal("1.500")));
}

#[test]
fn test_sort() {
    let out = render_expression(joined(builtin(numbers(&[3, 1, 2]), "sort"))).unwrap();
    assert_eq!(out, "1, 2, 3");
}

#[rstest]
#[case(&[3, 1, 2])]
#[case(&[5, 5, 1, 9, 0])]
#[case(&[])]
fn test_sort_is_idempotent(#[case] items: &[i64]) {
    let once = render_expression(joined(builtin(numbers(items), "sort"))).unwrap();
    let twice =
        render_expression(joined(builtin(builtin(numbers(items), "sort"), "sort"))).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_sort_rejects_mixed_types() {
    let mixed = seq(vec![lit(1), lit("a")]);
    let error = render_expression(joined(builtin(mixed, "sort"))).unwrap_err();
    assert!(error.to_string().contains("same type"), "{error}");
}

#[test]
fn test_map_result_null_is_an_error() {
    let to_missing = lambda("x", var("missing"));
    let mapped = builtin_call(numbers(&[1, 2]), "map", vec![to_missing]);
    let error = render_expression(joined(mapped)).unwrap_err();
    assert!(error.to_string().contains("?map"), "{error}");
    assert!(error.to_string().contains("index 0"), "{error}");
}

#[test]
fn test_lazy_filter_map_matches_eager() {
    let above_two = || lambda("x", Arc::new(Comparison::new(var("x"), CmpOp::Gt, lit(2))));
    let pipeline = |lazy: bool| {
        let mut filter = BuiltInExpr::new(numbers(&[1, 2, 3, 4, 5, 6]), "filter");
        if lazy {
            filter = filter.with_lazy_result();
        }
        let filtered: Arc<dyn Expression> = Arc::new(Call::new(Arc::new(filter), vec![above_two()]));
        let as_text = lambda("x", builtin_call(var("x"), "string", vec![lit("0.0")]));
        builtin_call(filtered, "map", vec![as_text])
    };
    let eager = render_expression(joined(pipeline(false))).unwrap();
    let lazy = render_expression(joined(pipeline(true))).unwrap();
    assert_eq!(eager, lazy);
    assert_eq!(eager, "3.0, 4.0, 5.0, 6.0");
}

/// `target?name(predicate)`, optionally consumed lazily
fn transformed(
    target: Arc<dyn Expression>,
    name: &str,
    predicate: Arc<dyn Expression>,
    lazy: bool,
) -> Arc<dyn Expression> {
    let mut builtin = BuiltInExpr::new(target, name);
    if lazy {
        builtin = builtin.with_lazy_result();
    }
    Arc::new(Call::new(Arc::new(builtin), vec![predicate]))
}

fn below_three() -> Arc<dyn Expression> {
    lambda("x", Arc::new(Comparison::new(var("x"), CmpOp::Lt, lit(3))))
}

#[rstest]
#[case("take_while", "1, 2")]
#[case("drop_while", "3, 4, 1, 2")]
fn test_while_builtins_lazy_matches_eager(#[case] name: &str, #[case] expected: &str) {
    let source = || numbers(&[1, 2, 3, 4, 1, 2]);
    let eager = render_expression(joined(transformed(source(), name, below_three(), false))).unwrap();
    let lazy = render_expression(joined(transformed(source(), name, below_three(), true))).unwrap();
    assert_eq!(eager, lazy);
    assert_eq!(eager, expected);
}

/// `x -> x < limit`, counting how often it runs
struct CountingBelow {
    limit: i64,
    calls: AtomicUsize,
}

impl FunctionModel for CountingBelow {
    fn call(&self, _env: &mut Environment<'_>, args: Vec<Option<Value>>) -> EvalResult<Option<Value>> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let below = args
            .into_iter()
            .next()
            .flatten()
            .and_then(|value| value.number_value())
            .and_then(|number| number.to_i64_exact())
            .is_some_and(|n| n < self.limit);
        Ok(Some(Value::from(below)))
    }
}

#[rstest]
#[case("take_while", false, "1, 2")]
#[case("take_while", true, "1, 2")]
#[case("drop_while", false, "5, 1, 1")]
#[case("drop_while", true, "5, 1, 1")]
fn test_while_builtins_stop_testing_at_first_false(
    #[case] name: &str,
    #[case] lazy: bool,
    #[case] expected: &str,
) {
    let predicate = Arc::new(CountingBelow {
        limit: 3,
        calls: AtomicUsize::new(0),
    });
    let model = data(vec![(
        "below",
        Value::Callable(Callable::Function(predicate.clone())),
    )]);
    let root = interp(joined(transformed(numbers(&[1, 2, 5, 1, 1]), name, var("below"), lazy)));
    assert_eq!(render(root, Some(model)).unwrap(), expected);
    assert_eq!(predicate.calls.load(AtomicOrdering::SeqCst), 3);
}

#[rstest]
#[case("take_while")]
#[case("drop_while")]
#[case("filter")]
fn test_non_boolean_predicate_names_the_index(#[case] name: &str) {
    let identity = lambda("x", var("x"));
    let error = render_expression(joined(transformed(numbers(&[4, 5]), name, identity, false)))
        .unwrap_err()
        .to_string();
    assert!(error.contains(&format!("?{name}")), "{error}");
    assert!(error.contains("to return a boolean"), "{error}");
    assert!(error.contains("index 0"), "{error}");
}

#[test]
fn test_date_and_time_are_not_comparable() {
    let date = TemplateDate::from_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    let time = TemplateDate::from_time(NaiveTime::from_hms_opt(12, 30, 0).unwrap());
    let root = interp(Arc::new(Comparison::new(var("d"), CmpOp::Eq, var("t"))));
    let error = render(
        root,
        Some(data(vec![("d", date.into()), ("t", time.into())])),
    )
    .unwrap_err();
    assert!(error.to_string().contains("different types"), "{error}");
}

#[test]
fn test_attempt_recover_output() {
    let body = block(vec![text("partial "), interp(var("missing"))]);
    let recover = block(vec![text("recovered")]);
    let root = block(vec![
        text("<"),
        Arc::new(Attempt::new(body, recover)),
        text(">"),
    ]);
    assert_eq!(render(root, None).unwrap(), "<recovered>");
}

#[test]
fn test_nested_attempts_see_their_own_error() {
    let inner: Arc<dyn Element> = Arc::new(Attempt::new(
        interp(var("first_missing")),
        block(vec![text("inner;")]),
    ));
    let outer_body = block(vec![inner, interp(var("second_missing"))]);
    let outer_recover = block(vec![
        text("outer: "),
        interp(Arc::new(SpecialVariable::new(SpecialVariable::ERROR))),
    ]);
    let out = render(Arc::new(Attempt::new(outer_body, outer_recover)), None).unwrap();
    assert!(out.starts_with("outer: "), "{out}");
    assert!(out.contains("second_missing"), "{out}");
    assert!(!out.contains("inner;"), "{out}");
}
