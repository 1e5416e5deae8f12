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

//! Built-in registry
//!
//! Built-ins are the postfix operators of the template language
//! (`name?upper_case`, `list?size`, `price?string("0.00")`). Each name maps to
//! an immutable [`BuiltInDescriptor`] holding a version chain: a list of
//! implementations with the minimum incompatible-improvements version they
//! apply from. A use site looks its built-in up once, which picks the newest
//! applicable link and produces a [`BuiltInBinding`].

#![warn(missing_docs)]

pub mod args;
pub mod builtins;
pub mod transform;

pub use transform::{ElementTransformer, LocalLambda};

use crate::ast::Expression;
use crate::environment::Environment;
use crate::error::{EvalResult, TemplateError, TemplateResult};
use crate::model::{
    type_description_with_article, Callable, FunctionModel, Model, Number, ScalarModel,
    TemplateDate, Value,
};
use crate::settings::Version;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Accepted spelling of multi-word names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingConvention {
    /// Both `upper_case` and `upperCase`
    #[default]
    AutoDetect,
    /// Only `upper_case`
    Legacy,
    /// Only `upperCase`
    CamelCase,
}

impl NamingConvention {
    fn accepts(self, name: &str, descriptor: &BuiltInDescriptor) -> bool {
        match self {
            NamingConvention::AutoDetect => true,
            NamingConvention::Legacy => name == descriptor.snake_name,
            NamingConvention::CamelCase => name == descriptor.camel_name,
        }
    }

    fn name(self) -> &'static str {
        match self {
            NamingConvention::AutoDetect | NamingConvention::Legacy => "legacy (snake case)",
            NamingConvention::CamelCase => "camel case",
        }
    }
}

/// What a built-in sees when it is evaluated
pub struct BuiltInCall<'a> {
    /// The left-hand operand
    pub target: &'a dyn Expression,
    /// The name used at the use site
    pub name: &'a str,
    /// Whether the use site consumes sequence results lazily
    pub lazy: bool,
}

impl BuiltInCall<'_> {
    /// Evaluate the left-hand operand, which may be missing
    pub fn target_optional(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        self.target.eval(env)
    }

    /// Evaluate the left-hand operand, failing when it is missing
    pub fn target_value(&self, env: &mut Environment<'_>) -> EvalResult<Value> {
        self.target
            .eval(env)?
            .ok_or_else(|| TemplateError::invalid_reference(self.target.canonical_form()).into())
    }

    /// Evaluate the left-hand operand as text
    ///
    /// Numbers, dates and booleans are formatted with the current formats.
    pub fn target_string(&self, env: &mut Environment<'_>) -> EvalResult<String> {
        let value = self.target.eval(env)?;
        let description = self.target.canonical_form();
        Ok(env.coerce_to_string(value.as_ref(), &description)?)
    }

    /// Evaluate the left-hand operand as a number
    pub fn target_number(&self, env: &mut Environment<'_>) -> EvalResult<Number> {
        let value = self.target_value(env)?;
        value
            .number_value()
            .ok_or_else(|| self.unexpected_type(&value, "number").into())
    }

    /// Evaluate the left-hand operand as a date
    pub fn target_date(&self, env: &mut Environment<'_>) -> EvalResult<TemplateDate> {
        let value = self.target_value(env)?;
        match value.date_value() {
            Some(date) => Ok(date?),
            None => Err(self.unexpected_type(&value, "date").into()),
        }
    }

    /// Error for a left-hand operand of the wrong type
    pub fn unexpected_type(&self, value: &Value, expected: &str) -> TemplateError {
        TemplateError::type_mismatch(format!(
            "For \"?{}\" the left-hand operand: Expected {expected}, but this has evaluated to {}:\n==> {}",
            self.name,
            type_description_with_article(value),
            self.target.canonical_form()
        ))
    }
}

/// A built-in implementation
pub trait BuiltIn: Send + Sync {
    /// Evaluate the built-in at a use site
    fn eval(&self, call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>>;
}

impl<F> BuiltIn for F
where
    F: Fn(&BuiltInCall<'_>, &mut Environment<'_>) -> EvalResult<Option<Value>> + Send + Sync,
{
    fn eval(&self, call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        self(call, env)
    }
}

/// Immutable description of a built-in name
pub struct BuiltInDescriptor {
    snake_name: String,
    camel_name: String,
    /// `(min_version, implementation)`, ascending by version
    chain: Vec<(Version, Arc<dyn BuiltIn>)>,
}

impl BuiltInDescriptor {
    /// The legacy name
    pub fn snake_name(&self) -> &str {
        &self.snake_name
    }

    /// The camel case name
    pub fn camel_name(&self) -> &str {
        &self.camel_name
    }

    /// The newest implementation whose minimum version doesn't exceed `version`
    pub fn resolve(&self, version: Version) -> Option<&Arc<dyn BuiltIn>> {
        self.chain
            .iter()
            .rev()
            .find(|(min_version, _)| *min_version <= version)
            .map(|(_, implementation)| implementation)
    }
}

impl fmt::Debug for BuiltInDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltInDescriptor")
            .field("name", &self.snake_name)
            .field(
                "versions",
                &self.chain.iter().map(|(v, _)| v.to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A built-in bound to a use site
#[derive(Clone)]
pub struct BuiltInBinding {
    name: String,
    implementation: Arc<dyn BuiltIn>,
}

impl BuiltInBinding {
    /// The name used at the use site
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate against a left-hand operand
    pub fn eval(
        &self,
        target: &dyn Expression,
        lazy: bool,
        env: &mut Environment<'_>,
    ) -> EvalResult<Option<Value>> {
        let call = BuiltInCall {
            target,
            name: &self.name,
            lazy,
        };
        self.implementation.eval(&call, env)
    }
}

impl fmt::Debug for BuiltInBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.name)
    }
}

/// Name to built-in table
#[derive(Default)]
pub struct BuiltInRegistry {
    by_name: FxHashMap<String, Arc<BuiltInDescriptor>>,
}

static STANDARD_REGISTRY: LazyLock<Arc<BuiltInRegistry>> =
    LazyLock::new(|| Arc::new(BuiltInRegistry::standard()));

impl BuiltInRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in of the language
    pub fn standard() -> Self {
        let mut registry = Self::new();
        builtins::register_all(&mut registry);
        registry
    }

    /// The standard registry, shared by all configurations that don't customize it
    pub fn shared() -> Arc<BuiltInRegistry> {
        STANDARD_REGISTRY.clone()
    }

    /// Register a built-in that behaves the same in every version
    pub fn register(&mut self, snake_name: &str, implementation: impl BuiltIn + 'static) {
        self.register_versioned(snake_name, vec![(Version::V2_3_0, Arc::new(implementation))]);
    }

    /// Register a built-in with a version chain
    pub fn register_versioned(&mut self, snake_name: &str, mut chain: Vec<(Version, Arc<dyn BuiltIn>)>) {
        chain.sort_by(|a, b| a.0.cmp(&b.0));
        let camel_name = to_camel_case(snake_name);
        let descriptor = Arc::new(BuiltInDescriptor {
            snake_name: snake_name.to_string(),
            camel_name: camel_name.clone(),
            chain,
        });
        self.by_name.insert(snake_name.to_string(), descriptor.clone());
        self.by_name.insert(camel_name, descriptor);
    }

    /// Descriptor for a name in either convention
    pub fn descriptor(&self, name: &str) -> Option<&Arc<BuiltInDescriptor>> {
        self.by_name.get(name)
    }

    /// Sorted names valid under a naming convention
    pub fn names(&self, convention: NamingConvention) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_name
            .iter()
            .filter(|(name, descriptor)| match convention {
                NamingConvention::CamelCase => name.as_str() == descriptor.camel_name,
                _ => name.as_str() == descriptor.snake_name,
            })
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Look a name up for a use site
    pub fn lookup(
        &self,
        name: &str,
        convention: NamingConvention,
        version: Version,
    ) -> TemplateResult<BuiltInBinding> {
        let descriptor = self
            .by_name
            .get(name)
            .filter(|descriptor| convention.accepts(name, descriptor))
            .ok_or_else(|| self.unknown(name, convention))?;
        let implementation = descriptor.resolve(version).ok_or_else(|| {
            TemplateError::UnknownBuiltIn {
                name: name.to_string(),
                help: format!("This built-in requires incompatible improvements {} or later.",
                    descriptor.chain.first().map(|(v, _)| v.to_string()).unwrap_or_default()),
            }
        })?;
        Ok(BuiltInBinding {
            name: name.to_string(),
            implementation: implementation.clone(),
        })
    }

    fn unknown(&self, name: &str, convention: NamingConvention) -> TemplateError {
        let other_spelling = self.by_name.get(name).map(|d| match convention {
            NamingConvention::CamelCase => d.camel_name.clone(),
            _ => d.snake_name.clone(),
        });
        let help = match other_spelling {
            Some(correct) => format!(
                "The correct name is \"{correct}\", because the template uses {} naming convention.",
                convention.name()
            ),
            None => alphabetical_help(&self.names(convention)),
        };
        TemplateError::UnknownBuiltIn {
            name: name.to_string(),
            help,
        }
    }
}

impl fmt::Debug for BuiltInRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltInRegistry")
            .field("names", &self.names(NamingConvention::Legacy).len())
            .finish()
    }
}

fn alphabetical_help(names: &[&str]) -> String {
    let mut help = String::from("The alphabetical list of built-ins:");
    let mut last_initial = None;
    for name in names {
        let initial = name.chars().next();
        if initial != last_initial {
            help.push('\n');
            last_initial = initial;
        } else {
            help.push_str(", ");
        }
        help.push_str(name);
    }
    help
}

/// `upper_case` to `upperCase`
pub(crate) fn to_camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;
    for c in snake.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// A function value produced by a built-in, bound to its left-hand operand
pub(crate) struct BoundFunction<F> {
    function: F,
}

impl<F> FunctionModel for BoundFunction<F>
where
    F: Fn(&mut Environment<'_>, Vec<Option<Value>>) -> EvalResult<Option<Value>> + Send + Sync,
{
    fn call(&self, env: &mut Environment<'_>, args: Vec<Option<Value>>) -> EvalResult<Option<Value>> {
        (self.function)(env, args)
    }
}

/// Wrap a closure into a function value
pub(crate) fn bound_function<F>(function: F) -> Value
where
    F: Fn(&mut Environment<'_>, Vec<Option<Value>>) -> EvalResult<Option<Value>>
        + Send
        + Sync
        + 'static,
{
    Value::Callable(Callable::Function(function_model(function)))
}

/// Wrap a closure into a function model
pub(crate) fn function_model<F>(function: F) -> Arc<dyn FunctionModel>
where
    F: Fn(&mut Environment<'_>, Vec<Option<Value>>) -> EvalResult<Option<Value>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(BoundFunction { function })
}

/// A string that can also be called, like `n?string` and `n?string("0.00")`
pub(crate) struct StringAndFunction {
    text: String,
    function: Arc<dyn FunctionModel>,
}

impl StringAndFunction {
    pub(crate) fn new<F>(text: String, function: F) -> Value
    where
        F: Fn(&mut Environment<'_>, Vec<Option<Value>>) -> EvalResult<Option<Value>>
            + Send
            + Sync
            + 'static,
    {
        Value::Object(Arc::new(Self {
            text,
            function: function_model(function),
        }))
    }
}

impl Model for StringAndFunction {
    fn as_scalar(&self) -> Option<&dyn ScalarModel> {
        Some(self)
    }

    fn as_callable(&self) -> Option<Callable> {
        Some(Callable::Function(self.function.clone()))
    }
}

impl ScalarModel for StringAndFunction {
    fn as_string(&self) -> String {
        self.text.clone()
    }
}
