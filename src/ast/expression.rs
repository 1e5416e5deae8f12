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

//! Expression node kinds

use super::{quote, Expression, SourceLocation};
use crate::environment::Environment;
use crate::error::{EvalResult, Interrupt, TemplateError, TemplateException};
use crate::eval::{compare, CmpOp, CompareOptions, Operand};
use crate::model::{type_description, Callable, SimpleHash, SimpleSequence, Value};
use crate::registry::{BuiltInBinding, LocalLambda};
use indexmap::IndexMap;
use std::sync::{Arc, OnceLock};

fn raise(error: TemplateError, location: Option<&SourceLocation>) -> Interrupt {
    TemplateException::at(error, location).into()
}

/// Evaluate an expression that must not be missing
fn required(expression: &dyn Expression, env: &mut Environment<'_>) -> EvalResult<Value> {
    match expression.eval(env)? {
        Some(value) => Ok(value),
        None => Err(raise(
            TemplateError::invalid_reference(expression.canonical_form()),
            expression.location(),
        )),
    }
}

/// A constant
#[derive(Debug, Clone)]
pub struct Literal {
    value: Value,
    location: Option<SourceLocation>,
}

impl Literal {
    /// Create a literal
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for Literal {
    fn eval(&self, _env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        Ok(Some(self.value.clone()))
    }

    fn canonical_form(&self) -> String {
        match &self.value {
            Value::String(s) => quote(s),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            other => format!("<{}>", type_description(other)),
        }
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// A top-level variable reference
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    location: Option<SourceLocation>,
}

impl Variable {
    /// Reference a variable by name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for Variable {
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        env.get_variable(&self.name)
    }

    fn canonical_form(&self) -> String {
        self.name.clone()
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// Render state exposed to templates as `.name`
#[derive(Debug, Clone)]
pub struct SpecialVariable {
    name: String,
    location: Option<SourceLocation>,
}

impl SpecialVariable {
    /// `.error`, the message of the error being recovered from
    pub const ERROR: &'static str = "error";
    /// `.node`, the node being visited
    pub const NODE: &'static str = "node";
    /// `.current_template_name`
    pub const CURRENT_TEMPLATE_NAME: &'static str = "current_template_name";
    /// `.main_template_name`
    pub const MAIN_TEMPLATE_NAME: &'static str = "main_template_name";
    /// `.locale`
    pub const LOCALE: &'static str = "locale";

    /// Reference a special variable by name, without the leading dot
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for SpecialVariable {
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let value = match self.name.as_str() {
            Self::ERROR | "err" => match env.current_recovered_error() {
                Some(error) => Value::from(error.message()),
                None => {
                    return Err(raise(
                        TemplateError::evaluation(
                            "Can't get .error here, because you aren't inside a #recover block.",
                        ),
                        self.location.as_ref(),
                    ));
                }
            },
            Self::NODE => return Ok(env.current_node().map(Value::Node)),
            Self::CURRENT_TEMPLATE_NAME | "currentTemplateName" => {
                Value::from(env.current_template_name().unwrap_or_default())
            }
            Self::MAIN_TEMPLATE_NAME | "mainTemplateName" => {
                Value::from(env.main_template().name().to_string())
            }
            Self::LOCALE => Value::from(env.settings().locale().to_string()),
            other => {
                return Err(raise(
                    TemplateError::evaluation(format!(
                        "Unknown special variable name: \".{other}\"."
                    )),
                    self.location.as_ref(),
                ));
            }
        };
        Ok(Some(value))
    }

    fn canonical_form(&self) -> String {
        format!(".{}", self.name)
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `target.key`
#[derive(Debug, Clone)]
pub struct Dot {
    target: Arc<dyn Expression>,
    key: String,
    location: Option<SourceLocation>,
}

impl Dot {
    /// Look `key` up in the hash `target` evaluates to
    pub fn new(target: Arc<dyn Expression>, key: impl Into<String>) -> Self {
        Self {
            target,
            key: key.into(),
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for Dot {
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let target = required(self.target.as_ref(), env)?;
        env.ensure_namespace_initialized(&target)?;
        match target.as_hash() {
            Some(hash) => Ok(hash.get(&self.key)),
            None => Err(raise(
                TemplateError::type_mismatch(format!(
                    "For \".{}\" the left-hand operand: Expected a hash, but this has evaluated to {}:\n==> {}",
                    self.key,
                    type_description(&target),
                    self.target.canonical_form()
                )),
                self.location.as_ref(),
            )),
        }
    }

    fn canonical_form(&self) -> String {
        format!("{}.{}", self.target.canonical_form(), self.key)
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `target[key]`, indexing a sequence by number or a hash by string
#[derive(Debug, Clone)]
pub struct DynamicKey {
    target: Arc<dyn Expression>,
    key: Arc<dyn Expression>,
    location: Option<SourceLocation>,
}

impl DynamicKey {
    /// Create a dynamic key lookup
    pub fn new(target: Arc<dyn Expression>, key: Arc<dyn Expression>) -> Self {
        Self {
            target,
            key,
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for DynamicKey {
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let target = required(self.target.as_ref(), env)?;
        let key = required(self.key.as_ref(), env)?;
        if let Some(number) = key.number_value() {
            let Some(seq) = target.as_sequence() else {
                return Err(self.wrong_target(&target, "sequence"));
            };
            let index = number.to_i64_exact().ok_or_else(|| {
                raise(
                    TemplateError::type_mismatch(format!(
                        "Sequence index must be a whole number, but was {number}:\n==> {}",
                        self.key.canonical_form()
                    )),
                    self.location.as_ref(),
                )
            })?;
            if index < 0 {
                return Err(raise(
                    TemplateError::evaluation(format!("Negative sequence index: {index}")),
                    self.location.as_ref(),
                ));
            }
            return Ok(usize::try_from(index).ok().and_then(|i| seq.get(i)));
        }
        if let Some(name) = key.string_value() {
            env.ensure_namespace_initialized(&target)?;
            let Some(hash) = target.as_hash() else {
                return Err(self.wrong_target(&target, "hash"));
            };
            return Ok(hash.get(&name));
        }
        Err(raise(
            TemplateError::type_mismatch(format!(
                "The key in brackets must be a number or a string, but it has evaluated to {}:\n==> {}",
                type_description(&key),
                self.key.canonical_form()
            )),
            self.location.as_ref(),
        ))
    }

    fn canonical_form(&self) -> String {
        format!("{}[{}]", self.target.canonical_form(), self.key.canonical_form())
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

impl DynamicKey {
    fn wrong_target(&self, target: &Value, expected: &str) -> Interrupt {
        raise(
            TemplateError::type_mismatch(format!(
                "Expected a {expected}, but this has evaluated to {}:\n==> {}",
                type_description(target),
                self.target.canonical_form()
            )),
            self.location.as_ref(),
        )
    }
}

/// `callee(args...)`
#[derive(Debug, Clone)]
pub struct Call {
    callee: Arc<dyn Expression>,
    args: Vec<Arc<dyn Expression>>,
    location: Option<SourceLocation>,
}

impl Call {
    /// Call a function or method value
    pub fn new(callee: Arc<dyn Expression>, args: Vec<Arc<dyn Expression>>) -> Self {
        Self {
            callee,
            args,
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for Call {
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let callee = required(self.callee.as_ref(), env)?;
        let callable = callee.as_callable();
        let mut args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            args.push(arg.eval(env)?);
        }
        match callable {
            Some(Callable::Function(function)) => function.call(env, args),
            Some(Callable::Method(method)) => method.exec(&args).map_err(|e| env.host_failure(e)),
            Some(Callable::Directive(directive)) => Err(raise(
                TemplateError::type_mismatch(format!(
                    "A {} can't be called as a function:\n==> {}",
                    if directive.is_macro() { "macro" } else { "directive" },
                    self.callee.canonical_form()
                )),
                self.location.as_ref(),
            )),
            None => Err(raise(
                TemplateError::type_mismatch(format!(
                    "Expected a function or method, but this has evaluated to {}:\n==> {}",
                    type_description(&callee),
                    self.callee.canonical_form()
                )),
                self.location.as_ref(),
            )),
        }
    }

    fn canonical_form(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| a.canonical_form()).collect();
        format!("{}({})", self.callee.canonical_form(), args.join(", "))
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `target?name`
///
/// The built-in is bound on first evaluation and the binding is kept for the
/// life of the node.
#[derive(Debug)]
pub struct BuiltInExpr {
    target: Arc<dyn Expression>,
    name: String,
    lazy: bool,
    binding: OnceLock<BuiltInBinding>,
    location: Option<SourceLocation>,
}

impl BuiltInExpr {
    /// Apply the built-in `name` to `target`
    pub fn new(target: Arc<dyn Expression>, name: impl Into<String>) -> Self {
        Self {
            target,
            name: name.into(),
            lazy: false,
            binding: OnceLock::new(),
            location: None,
        }
    }

    /// Allow the built-in to return a lazily evaluated result
    ///
    /// Only safe where the result is consumed right away, like the list
    /// source of a `#list`.
    pub fn with_lazy_result(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    fn binding(&self, env: &Environment<'_>) -> EvalResult<&BuiltInBinding> {
        if let Some(binding) = self.binding.get() {
            return Ok(binding);
        }
        let binding = env
            .bind_builtin(&self.name)
            .map_err(|e| raise(e, self.location.as_ref()))?;
        Ok(self.binding.get_or_init(|| binding))
    }
}

impl Expression for BuiltInExpr {
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let binding = self.binding(env)?.clone();
        binding.eval(self.target.as_ref(), self.lazy, env)
    }

    fn canonical_form(&self) -> String {
        format!("{}?{}", self.target.canonical_form(), self.name)
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `left op right`
#[derive(Debug, Clone)]
pub struct Comparison {
    left: Arc<dyn Expression>,
    op: CmpOp,
    right: Arc<dyn Expression>,
    location: Option<SourceLocation>,
}

impl Comparison {
    /// Compare two expressions
    pub fn new(left: Arc<dyn Expression>, op: CmpOp, right: Arc<dyn Expression>) -> Self {
        Self {
            left,
            op,
            right,
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for Comparison {
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let left = self.left.eval(env)?;
        let right = self.right.eval(env)?;
        let left_form = || self.left.canonical_form();
        let right_form = || self.right.canonical_form();
        let result = compare(
            env,
            Operand::described_by(left.as_ref(), &left_form),
            self.op,
            Operand::described_by(right.as_ref(), &right_form),
            CompareOptions::strict(),
        )
        .map_err(|e| raise(e, self.location.as_ref()))?;
        Ok(Some(Value::from(result)))
    }

    fn canonical_form(&self) -> String {
        format!(
            "{} {} {}",
            self.left.canonical_form(),
            self.op.symbol(),
            self.right.canonical_form()
        )
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `param -> body`
#[derive(Debug, Clone)]
pub struct Lambda {
    parameter: String,
    body: Arc<dyn Expression>,
    location: Option<SourceLocation>,
}

impl Lambda {
    /// Create a single parameter lambda
    pub fn new(parameter: impl Into<String>, body: Arc<dyn Expression>) -> Self {
        Self {
            parameter: parameter.into(),
            body,
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for Lambda {
    fn eval(&self, _env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let lambda = LocalLambda::new(self.parameter.clone(), self.body.clone());
        Ok(Some(Value::Callable(Callable::Function(Arc::new(lambda)))))
    }

    fn canonical_form(&self) -> String {
        format!("{} -> {}", self.parameter, self.body.canonical_form())
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `[a, b, c]`
#[derive(Debug, Clone)]
pub struct SequenceLiteral {
    items: Vec<Arc<dyn Expression>>,
    location: Option<SourceLocation>,
}

impl SequenceLiteral {
    /// Create a sequence literal
    pub fn new(items: Vec<Arc<dyn Expression>>) -> Self {
        Self {
            items,
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for SequenceLiteral {
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let mut items = Vec::with_capacity(self.items.len());
        for item in &self.items {
            items.push(item.eval(env)?);
        }
        Ok(Some(Value::Object(Arc::new(SimpleSequence::new(items)))))
    }

    fn canonical_form(&self) -> String {
        let items: Vec<String> = self.items.iter().map(|i| i.canonical_form()).collect();
        format!("[{}]", items.join(", "))
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `{"k": v, ...}`
#[derive(Debug, Clone)]
pub struct HashLiteral {
    entries: Vec<(Arc<dyn Expression>, Arc<dyn Expression>)>,
    location: Option<SourceLocation>,
}

impl HashLiteral {
    /// Create a hash literal; later duplicate keys win
    pub fn new(entries: Vec<(Arc<dyn Expression>, Arc<dyn Expression>)>) -> Self {
        Self {
            entries,
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Expression for HashLiteral {
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let mut entries = IndexMap::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            let key_value = required(key.as_ref(), env)?;
            let key_text = env
                .coerce_to_string(Some(&key_value), &key.canonical_form())
                .map_err(|e| raise(e, self.location.as_ref()))?;
            let value = required(value.as_ref(), env)?;
            entries.insert(key_text, value);
        }
        Ok(Some(Value::Object(Arc::new(SimpleHash::new(entries)))))
    }

    fn canonical_form(&self) -> String {
        let entries: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}: {}", k.canonical_form(), v.canonical_form()))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}
