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

//! Shared helpers for the integration tests
//!
//! Templates are assembled directly from tree nodes, so these helpers keep
//! the trees short enough to read.

#![allow(dead_code)]

use indexmap::IndexMap;
use octofhir_template::ast::{
    Block, BuiltInExpr, Call, Element, Expression, Interpolation, Lambda, Literal,
    SequenceLiteral, Text, Variable,
};
use octofhir_template::{Configuration, RenderError, Template, Value};
use std::sync::Arc;

pub fn lit(value: impl Into<Value>) -> Arc<dyn Expression> {
    Arc::new(Literal::new(value))
}

pub fn var(name: &str) -> Arc<dyn Expression> {
    Arc::new(Variable::new(name))
}

pub fn seq(items: Vec<Arc<dyn Expression>>) -> Arc<dyn Expression> {
    Arc::new(SequenceLiteral::new(items))
}

pub fn numbers(items: &[i64]) -> Arc<dyn Expression> {
    seq(items.iter().map(|n| lit(*n)).collect())
}

/// `target?name`
pub fn builtin(target: Arc<dyn Expression>, name: &str) -> Arc<dyn Expression> {
    Arc::new(BuiltInExpr::new(target, name))
}

/// `target?name(args...)`
pub fn builtin_call(
    target: Arc<dyn Expression>,
    name: &str,
    args: Vec<Arc<dyn Expression>>,
) -> Arc<dyn Expression> {
    Arc::new(Call::new(builtin(target, name), args))
}

/// `param -> body`
pub fn lambda(param: &str, body: Arc<dyn Expression>) -> Arc<dyn Expression> {
    Arc::new(Lambda::new(param, body))
}

/// `target?join(", ")`
pub fn joined(target: Arc<dyn Expression>) -> Arc<dyn Expression> {
    builtin_call(target, "join", vec![lit(", ")])
}

pub fn text(content: &str) -> Arc<dyn Element> {
    Arc::new(Text::new(content))
}

pub fn interp(expression: Arc<dyn Expression>) -> Arc<dyn Element> {
    Arc::new(Interpolation::new(expression))
}

pub fn block(children: Vec<Arc<dyn Element>>) -> Arc<dyn Element> {
    Arc::new(Block::new(children))
}

pub fn data(entries: Vec<(&str, Value)>) -> Value {
    Value::hash(
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect::<IndexMap<_, _>>(),
    )
}

/// A configuration with the given settings applied
pub fn configuration(settings: &[(&str, &str)]) -> Arc<Configuration> {
    let mut configuration = Configuration::default();
    configuration
        .set_settings(settings.iter().copied())
        .expect("test settings are valid");
    Arc::new(configuration)
}

pub fn template(root: Arc<dyn Element>) -> Arc<Template> {
    configuration(&[]).create_template("test.ftl", root)
}

/// Render with a default configuration
pub fn render(root: Arc<dyn Element>, data_model: Option<Value>) -> Result<String, RenderError> {
    template(root).render_to_string(data_model)
}

/// Render an expression with `${...}`
pub fn render_expression(expression: Arc<dyn Expression>) -> Result<String, RenderError> {
    render(interp(expression), None)
}
