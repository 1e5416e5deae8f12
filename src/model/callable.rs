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

//! Callable values: directives, functions and methods

use super::value::Value;
use crate::ast::Element;
use crate::environment::Environment;
use crate::error::{EvalResult, HostError};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A value that can be invoked
#[derive(Clone)]
pub enum Callable {
    /// Invoked as `<@name .../>`; writes output, may run nested content
    Directive(Arc<dyn DirectiveModel>),
    /// Invoked as `name(...)` with access to the environment
    Function(Arc<dyn FunctionModel>),
    /// Host callback invoked as `name(...)` without the environment
    Method(Arc<dyn MethodModel>),
}

impl Callable {
    /// Name used in type descriptions
    pub fn kind_name(&self) -> &'static str {
        match self {
            Callable::Directive(d) if d.is_macro() => "macro",
            Callable::Directive(_) => "directive",
            Callable::Function(_) => "function",
            Callable::Method(_) => "method",
        }
    }

    /// Whether this was defined in a template
    pub fn is_macro(&self) -> bool {
        match self {
            Callable::Directive(d) => d.is_macro(),
            Callable::Function(f) => f.is_macro(),
            Callable::Method(_) => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.kind_name())
    }
}

/// Evaluated directive arguments
#[derive(Debug, Clone)]
pub enum CallArgs {
    /// `name=value` arguments in source order
    Named(IndexMap<String, Value>),
    /// Positional arguments in source order
    Positional(Vec<Value>),
}

impl CallArgs {
    /// No arguments
    pub fn none() -> Self {
        CallArgs::Positional(Vec::new())
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        match self {
            CallArgs::Named(map) => map.len(),
            CallArgs::Positional(list) => list.len(),
        }
    }

    /// Whether there are no arguments
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Nested content passed to a directive call
#[derive(Debug, Clone)]
pub struct NestedBody {
    /// Content between the start and end tags
    pub body: Arc<dyn Element>,
    /// Loop variable names declared after `;` at the call site
    pub params: Vec<String>,
}

impl NestedBody {
    /// Nested content without loop variables
    pub fn new(body: Arc<dyn Element>) -> Self {
        Self {
            body,
            params: Vec::new(),
        }
    }

    /// Declare loop variable names
    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }
}

/// A directive
pub trait DirectiveModel: Send + Sync {
    /// Run the directive
    fn execute(
        &self,
        env: &mut Environment<'_>,
        args: CallArgs,
        nested: Option<NestedBody>,
    ) -> EvalResult<()>;

    /// Whether this is a template-defined macro
    fn is_macro(&self) -> bool {
        false
    }
}

/// A function with access to the environment
pub trait FunctionModel: Send + Sync {
    /// Call with positional arguments; `None` entries are null arguments
    fn call(&self, env: &mut Environment<'_>, args: Vec<Option<Value>>)
    -> EvalResult<Option<Value>>;

    /// Whether this is a template-defined function
    fn is_macro(&self) -> bool {
        false
    }

    /// Source form for error messages, when there is one
    fn describe(&self) -> Option<String> {
        None
    }
}

/// A host callback that does not see the environment
///
/// Callbacks that need render state can read the snapshot published by
/// [`crate::environment::current_render`].
pub trait MethodModel: Send + Sync {
    /// Call with positional arguments
    fn exec(&self, args: &[Option<Value>]) -> Result<Option<Value>, HostError>;
}

impl<F> MethodModel for F
where
    F: Fn(&[Option<Value>]) -> Result<Option<Value>, HostError> + Send + Sync,
{
    fn exec(&self, args: &[Option<Value>]) -> Result<Option<Value>, HostError> {
        self(args)
    }
}
