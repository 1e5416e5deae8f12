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


//! Loop variable built-ins
//!
//! `item?index`, `item?has_next` and friends read the position of the
//! iteration that bound `item`. The left-hand operand must be the loop
//! variable itself, not an expression that evaluates to its value.

use super::super::{bound_function, BuiltIn, BuiltInCall, BuiltInRegistry};
use crate::environment::{Environment, LoopPosition};
use crate::error::{EvalResult, TemplateError};
use crate::model::Value;

pub(super) fn register(registry: &mut BuiltInRegistry) {
    registry.register("index", on_loop(|p| Value::from(p.index)));
    registry.register("counter", on_loop(|p| Value::from(p.index + 1)));
    registry.register("has_next", on_loop(|p| Value::from(p.has_next)));
    registry.register("is_first", on_loop(|p| Value::from(p.index == 0)));
    registry.register("is_last", on_loop(|p| Value::from(!p.has_next)));
    registry.register("is_odd_item", on_loop(|p| Value::from(p.index % 2 == 0)));
    registry.register("is_even_item", on_loop(|p| Value::from(p.index % 2 == 1)));
    registry.register(
        "item_parity",
        on_loop(|p| Value::from(if p.index % 2 == 0 { "odd" } else { "even" })),
    );
    registry.register("item_cycle", item_cycle);
}

fn position(call: &BuiltInCall<'_>, env: &Environment<'_>) -> Result<LoopPosition, TemplateError> {
    let name = call.target.canonical_form();
    env.loop_position(&name).ok_or_else(|| {
        TemplateError::evaluation(format!(
            "The left-hand operand of ?{} must be a loop variable, but there's no iteration in scope that binds \"{name}\".",
            call.name
        ))
    })
}

fn on_loop(f: fn(LoopPosition) -> Value) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        Ok(Some(f(position(call, env)?)))
    }
}

fn item_cycle(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let index = position(call, env)?.index;
    let name = call.name.to_string();
    Ok(Some(bound_function(move |_env, args| {
        if args.is_empty() {
            return Err(TemplateError::ArgumentCount {
                builtin: name.clone(),
                expected: "at least 1".to_string(),
                actual: 0,
            }
            .into());
        }
        Ok(args[index % args.len()].clone())
    })))
}

#[cfg(test)]
mod tests {
    use crate::ast::{
        Block, BuiltInExpr, Call, Element, Expression, Interpolation, List, Literal,
        SequenceLiteral, Text, Variable,
    };
    use crate::settings::Configuration;
    use crate::RenderError;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::Arc;

    fn on_n(name: &str) -> Arc<dyn Element> {
        Arc::new(Interpolation::new(Arc::new(BuiltInExpr::new(
            Arc::new(Variable::new("n")),
            name,
        ))))
    }

    /// `<#list ["a", "b", "c"] as n>${body};</#list>`
    fn render_list(body: Arc<dyn Element>) -> Result<String, RenderError> {
        let items: Vec<Arc<dyn Expression>> = ["a", "b", "c"]
            .into_iter()
            .map(|s| Arc::new(Literal::new(s)) as Arc<dyn Expression>)
            .collect();
        let body = Arc::new(Block::new(vec![body, Arc::new(Text::new(";"))]));
        let root = List::new(Arc::new(SequenceLiteral::new(items)), "n", body);
        Arc::new(Configuration::default())
            .create_template("loop.ftl", Arc::new(root))
            .render_to_string(None)
    }

    #[rstest]
    #[case("index", "0;1;2;")]
    #[case("counter", "1;2;3;")]
    #[case("has_next", "true;true;false;")]
    #[case("is_first", "true;false;false;")]
    #[case("is_last", "false;false;true;")]
    #[case("is_odd_item", "true;false;true;")]
    #[case("is_even_item", "false;true;false;")]
    #[case("item_parity", "odd;even;odd;")]
    fn test_loop_position_builtins(#[case] name: &str, #[case] expected: &str) {
        let body = if name.starts_with("is_") || name == "has_next" {
            Arc::new(Interpolation::new(Arc::new(Call::new(
                Arc::new(BuiltInExpr::new(
                    Arc::new(BuiltInExpr::new(Arc::new(Variable::new("n")), name)),
                    "string",
                )),
                vec![Arc::new(Literal::new("true")), Arc::new(Literal::new("false"))],
            )))) as Arc<dyn Element>
        } else {
            on_n(name)
        };
        assert_eq!(render_list(body).unwrap(), expected);
    }

    #[test]
    fn test_item_cycle() {
        let cycle = Call::new(
            Arc::new(BuiltInExpr::new(Arc::new(Variable::new("n")), "item_cycle")),
            vec![Arc::new(Literal::new("x")), Arc::new(Literal::new("y"))],
        );
        let body = Arc::new(Interpolation::new(Arc::new(cycle)));
        assert_eq!(render_list(body).unwrap(), "x;y;x;");
    }

    #[test]
    fn test_outside_a_loop_is_an_error() {
        let error = Arc::new(Configuration::default())
            .create_template("loop.ftl", on_n("index"))
            .render_to_string(None)
            .unwrap_err()
            .to_string();
        assert!(error.contains("?index"), "{error}");
        assert!(error.contains("must be a loop variable"), "{error}");
    }
}
