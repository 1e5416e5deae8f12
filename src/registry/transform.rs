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

//! Element transformers for `?filter`, `?map`, `?take_while` and `?drop_while`

use crate::ast::Expression;
use crate::environment::Environment;
use crate::error::{EvalResult, TemplateError, TemplateResult};
use crate::model::{optional_type_description, Callable, FunctionModel, MethodModel, Value};
use std::fmt;
use std::sync::Arc;

/// A one-argument callable applied to each element
#[derive(Clone)]
pub enum ElementTransformer {
    /// A function, including local lambdas and template functions
    Function(Arc<dyn FunctionModel>),
    /// A host method
    Method(Arc<dyn MethodModel>),
}

impl ElementTransformer {
    /// Build from the argument of a sequence built-in
    pub fn from_argument(builtin: &str, argument: Option<&Value>) -> TemplateResult<Self> {
        match argument.and_then(Value::as_callable) {
            Some(Callable::Function(f)) => Ok(ElementTransformer::Function(f)),
            Some(Callable::Method(m)) => Ok(ElementTransformer::Method(m)),
            _ => Err(TemplateError::ArgumentType {
                builtin: builtin.to_string(),
                position: 1,
                expected: "a function, a method or a local lambda".to_string(),
                actual: optional_type_description(argument),
            }),
        }
    }

    /// Apply to one element
    pub fn apply(&self, env: &mut Environment<'_>, item: Option<Value>) -> EvalResult<Option<Value>> {
        match self {
            ElementTransformer::Function(f) => f.call(env, vec![item]),
            ElementTransformer::Method(m) => m.exec(&[item]).map_err(|e| env.host_failure(e)),
        }
    }

    /// Short description for error messages
    pub fn description(&self) -> String {
        match self {
            ElementTransformer::Function(f) => f.describe().unwrap_or_else(|| "function".to_string()),
            ElementTransformer::Method(_) => "method".to_string(),
        }
    }
}

impl fmt::Debug for ElementTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementTransformer({})", self.description())
    }
}

/// `x -> body`, evaluated with `x` bound in a fresh local context
pub struct LocalLambda {
    parameter: String,
    body: Arc<dyn Expression>,
}

impl LocalLambda {
    /// Lambda over one parameter
    pub fn new(parameter: impl Into<String>, body: Arc<dyn Expression>) -> Self {
        Self {
            parameter: parameter.into(),
            body,
        }
    }
}

impl FunctionModel for LocalLambda {
    fn call(&self, env: &mut Environment<'_>, mut args: Vec<Option<Value>>) -> EvalResult<Option<Value>> {
        if args.len() != 1 {
            return Err(TemplateError::evaluation(format!(
                "The local lambda {} expects 1 argument, but has received {}.",
                self.describe().unwrap_or_default(),
                args.len()
            ))
            .into());
        }
        let argument = args.pop().flatten();
        let body = self.body.clone();
        env.with_local_variable(&self.parameter, argument, |env| body.eval(env))
    }

    fn describe(&self) -> Option<String> {
        Some(format!("{} -> {}", self.parameter, self.body.canonical_form()))
    }
}
