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

//! Element node kinds

use super::{quote, Children, Element, Expression, SourceLocation};
use crate::environment::Environment;
use crate::error::{EvalResult, FlowControl, Interrupt, TemplateError, TemplateException};
use crate::eval::format_value;
use crate::model::{type_description, CallArgs, Callable, NestedBody, Number, Value};
use indexmap::IndexMap;
use std::sync::Arc;

fn raise(error: TemplateError, location: Option<&SourceLocation>) -> Interrupt {
    TemplateException::at(error, location).into()
}

fn required(
    expression: &dyn Expression,
    env: &mut Environment<'_>,
    location: Option<&SourceLocation>,
) -> EvalResult<Value> {
    match expression.eval(env)? {
        Some(value) => Ok(value),
        None => Err(raise(
            TemplateError::invalid_reference(expression.canonical_form()),
            expression.location().or(location),
        )),
    }
}

fn required_string(
    expression: &dyn Expression,
    env: &mut Environment<'_>,
    location: Option<&SourceLocation>,
) -> EvalResult<String> {
    let value = required(expression, env, location)?;
    env.coerce_to_string(Some(&value), &expression.canonical_form())
        .map_err(|e| raise(e, location))
}

/// Static text
#[derive(Debug, Clone)]
pub struct Text {
    text: String,
}

impl Text {
    /// Create a text element
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Element for Text {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        env.out().write_str(&self.text)?;
        Ok(None)
    }

    fn description(&self) -> String {
        let mut preview: String = self.text.chars().take(20).collect();
        if preview.len() < self.text.len() {
            preview.push_str("...");
        }
        format!("text {}", quote(&preview))
    }
}

/// `${expression}`
#[derive(Debug, Clone)]
pub struct Interpolation {
    expression: Arc<dyn Expression>,
    location: Option<SourceLocation>,
}

impl Interpolation {
    /// Print the value of an expression
    pub fn new(expression: Arc<dyn Expression>) -> Self {
        Self {
            expression,
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Element for Interpolation {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let value = self.expression.eval(env)?;
        let form = self.expression.canonical_form();
        let hint = value
            .as_ref()
            .filter(|v| v.is_sequence())
            .map(|_| "Use ?join(\", \") to print the items of a sequence.");
        let output = format_value(env, value.as_ref(), &form, hint)
            .map_err(|e| raise(e, self.location.as_ref()))?;
        env.out().write_str(output.as_str())?;
        Ok(None)
    }

    fn description(&self) -> String {
        format!("${{{}}}", self.expression.canonical_form())
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// A sequence of elements
#[derive(Debug, Clone, Default)]
pub struct Block {
    children: Vec<Arc<dyn Element>>,
}

impl Block {
    /// Create a block
    pub fn new(children: Vec<Arc<dyn Element>>) -> Self {
        Self { children }
    }
}

impl Element for Block {
    fn accept(&self, _env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        Ok(Some(self.children.iter().map(|c| (c.clone(), false)).collect()))
    }

    fn description(&self) -> String {
        "block".to_string()
    }

    fn collect_macros(&self, out: &mut Vec<Arc<MacroDefinition>>) {
        for child in &self.children {
            child.collect_macros(out);
        }
    }
}

/// `#attempt` with its `#recover` block
#[derive(Debug, Clone)]
pub struct Attempt {
    body: Arc<dyn Element>,
    recover: Arc<dyn Element>,
    location: Option<SourceLocation>,
}

impl Attempt {
    /// Run `body`; if it fails, discard its output and run `recover`
    pub fn new(body: Arc<dyn Element>, recover: Arc<dyn Element>) -> Self {
        Self {
            body,
            recover,
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Element for Attempt {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        env.attempt(&self.body, &self.recover)?;
        Ok(None)
    }

    fn description(&self) -> String {
        "#attempt".to_string()
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    fn collect_macros(&self, out: &mut Vec<Arc<MacroDefinition>>) {
        self.body.collect_macros(out);
        self.recover.collect_macros(out);
    }
}

/// Whether a definition is a macro or a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    /// Called as a directive, writes output
    Macro,
    /// Called in expressions, returns a value with `#return`
    Function,
}

/// A declared macro parameter
#[derive(Debug, Clone)]
pub struct MacroParam {
    /// Parameter name
    pub name: String,
    /// Default value, evaluated in the macro's scope when the argument is omitted
    pub default: Option<Arc<dyn Expression>>,
}

impl MacroParam {
    /// A required parameter
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    /// A parameter with a default value
    pub fn with_default(name: impl Into<String>, default: Arc<dyn Expression>) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// A macro or function definition
#[derive(Debug, Clone)]
pub struct MacroDefinition {
    /// Name the definition is bound to in its namespace
    pub name: String,
    /// Declared parameters, in order
    pub params: Vec<MacroParam>,
    /// Parameter receiving the arguments that match no declared parameter
    pub catch_all: Option<String>,
    /// The body
    pub body: Arc<dyn Element>,
    /// Macro or function
    pub kind: MacroKind,
    /// Where the definition was written
    pub location: Option<SourceLocation>,
}

impl MacroDefinition {
    /// A macro definition
    pub fn new(name: impl Into<String>, params: Vec<MacroParam>, body: Arc<dyn Element>) -> Self {
        Self {
            name: name.into(),
            params,
            catch_all: None,
            body,
            kind: MacroKind::Macro,
            location: None,
        }
    }

    /// A function definition
    pub fn function(name: impl Into<String>, params: Vec<MacroParam>, body: Arc<dyn Element>) -> Self {
        Self {
            kind: MacroKind::Function,
            ..Self::new(name, params, body)
        }
    }

    /// Declare the catch-all parameter
    pub fn with_catch_all(mut self, name: impl Into<String>) -> Self {
        self.catch_all = Some(name.into());
        self
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Whether `name` is a declared parameter
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }
}

/// `#macro` or `#function`
///
/// Visiting the element does nothing; the definition is installed in the
/// namespace before the template runs.
#[derive(Debug, Clone)]
pub struct MacroDef {
    definition: Arc<MacroDefinition>,
}

impl MacroDef {
    /// Wrap a definition
    pub fn new(definition: MacroDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
        }
    }

    /// The definition
    pub fn definition(&self) -> &Arc<MacroDefinition> {
        &self.definition
    }
}

impl Element for MacroDef {
    fn accept(&self, _env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        Ok(None)
    }

    fn description(&self) -> String {
        let keyword = match self.definition.kind {
            MacroKind::Macro => "#macro",
            MacroKind::Function => "#function",
        };
        format!("{keyword} {}", self.definition.name)
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.definition.location.as_ref()
    }

    fn collect_macros(&self, out: &mut Vec<Arc<MacroDefinition>>) {
        out.push(self.definition.clone());
    }
}

/// Arguments at a directive call site
#[derive(Debug, Clone)]
pub enum CallSiteArgs {
    /// `name=value` pairs
    Named(Vec<(String, Arc<dyn Expression>)>),
    /// Values by position
    Positional(Vec<Arc<dyn Expression>>),
}

/// `<@callee args; loop_vars>nested</@callee>`
#[derive(Debug, Clone)]
pub struct MacroCall {
    callee: Arc<dyn Expression>,
    args: CallSiteArgs,
    nested: Option<Arc<dyn Element>>,
    loop_vars: Vec<String>,
    location: Option<SourceLocation>,
}

impl MacroCall {
    /// Call a directive or macro without nested content
    pub fn new(callee: Arc<dyn Expression>, args: CallSiteArgs) -> Self {
        Self {
            callee,
            args,
            nested: None,
            loop_vars: Vec::new(),
            location: None,
        }
    }

    /// Pass nested content and declare its loop variables
    pub fn with_nested(mut self, nested: Arc<dyn Element>, loop_vars: Vec<String>) -> Self {
        self.nested = Some(nested);
        self.loop_vars = loop_vars;
        self
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Element for MacroCall {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let callee = required(self.callee.as_ref(), env, self.location.as_ref())?;
        let Some(Callable::Directive(directive)) = callee.as_callable() else {
            return Err(raise(
                TemplateError::type_mismatch(format!(
                    "Expected a directive or macro, but this has evaluated to {}:\n==> {}",
                    type_description(&callee),
                    self.callee.canonical_form()
                )),
                self.location.as_ref(),
            ));
        };
        let args = match &self.args {
            CallSiteArgs::Named(pairs) => {
                let mut named = IndexMap::with_capacity(pairs.len());
                for (name, expression) in pairs {
                    let value = required(expression.as_ref(), env, self.location.as_ref())?;
                    named.insert(name.clone(), value);
                }
                CallArgs::Named(named)
            }
            CallSiteArgs::Positional(expressions) => {
                let mut values = Vec::with_capacity(expressions.len());
                for expression in expressions {
                    values.push(required(expression.as_ref(), env, self.location.as_ref())?);
                }
                CallArgs::Positional(values)
            }
        };
        let nested = self
            .nested
            .as_ref()
            .map(|body| NestedBody::new(body.clone()).with_params(self.loop_vars.clone()));
        directive.execute(env, args, nested)?;
        Ok(None)
    }

    fn description(&self) -> String {
        format!("@{}", self.callee.canonical_form())
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    fn collect_macros(&self, out: &mut Vec<Arc<MacroDefinition>>) {
        if let Some(nested) = &self.nested {
            nested.collect_macros(out);
        }
    }
}

/// `#nested`, runs the nested content of the current macro call
#[derive(Debug, Clone, Default)]
pub struct Nested {
    args: Vec<Arc<dyn Expression>>,
}

impl Nested {
    /// Pass values to the loop variables of the call site
    pub fn new(args: Vec<Arc<dyn Expression>>) -> Self {
        Self { args }
    }
}

impl Element for Nested {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let mut values = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            values.push(arg.eval(env)?);
        }
        env.invoke_nested(values)?;
        Ok(None)
    }

    fn description(&self) -> String {
        "#nested".to_string()
    }
}

/// `#return`
#[derive(Debug, Clone, Default)]
pub struct Return {
    value: Option<Arc<dyn Expression>>,
}

impl Return {
    /// Return from a macro, or from a function with a value
    pub fn new(value: Option<Arc<dyn Expression>>) -> Self {
        Self { value }
    }
}

impl Element for Return {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let value = match &self.value {
            Some(expression) => expression.eval(env)?,
            None => None,
        };
        Err(FlowControl::Return(value).into())
    }

    fn description(&self) -> String {
        match &self.value {
            Some(v) => format!("#return {}", v.canonical_form()),
            None => "#return".to_string(),
        }
    }
}

/// Where an assignment stores its variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentScope {
    /// `#assign`, the current namespace
    Namespace,
    /// `#global`, the global namespace
    Global,
    /// `#local`, the running macro or function
    Local,
}

/// What an assignment stores
#[derive(Debug, Clone)]
pub enum AssignmentSource {
    /// The value of an expression
    Expression(Arc<dyn Expression>),
    /// The output of a block, as a string
    Capture(Arc<dyn Element>),
}

/// `#assign`, `#global` and `#local`
#[derive(Debug, Clone)]
pub struct Assignment {
    scope: AssignmentScope,
    name: String,
    source: AssignmentSource,
    namespace: Option<Arc<dyn Expression>>,
    location: Option<SourceLocation>,
}

impl Assignment {
    /// Assign a variable
    pub fn new(scope: AssignmentScope, name: impl Into<String>, source: AssignmentSource) -> Self {
        Self {
            scope,
            name: name.into(),
            source,
            namespace: None,
            location: None,
        }
    }

    /// `#assign ... in namespace`
    pub fn in_namespace(mut self, namespace: Arc<dyn Expression>) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Element for Assignment {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let value = match &self.source {
            AssignmentSource::Expression(expression) => {
                required(expression.as_ref(), env, self.location.as_ref())?
            }
            AssignmentSource::Capture(body) => Value::from(env.capture_output(body)?),
        };
        match (self.scope, &self.namespace) {
            (AssignmentScope::Namespace, Some(target)) => {
                let target_value = required(target.as_ref(), env, self.location.as_ref())?;
                let namespace = match &target_value {
                    Value::Object(model) => model.as_namespace(),
                    _ => None,
                };
                let Some(namespace) = namespace else {
                    return Err(raise(
                        TemplateError::type_mismatch(format!(
                            "Expected a namespace, but this has evaluated to {}:\n==> {}",
                            type_description(&target_value),
                            target.canonical_form()
                        )),
                        self.location.as_ref(),
                    ));
                };
                namespace.set(&self.name, value);
            }
            (AssignmentScope::Namespace, None) => env.set_variable(&self.name, value),
            (AssignmentScope::Global, _) => env.set_global_variable(&self.name, value),
            (AssignmentScope::Local, _) => env
                .set_local_variable(&self.name, value)
                .map_err(|e| raise(e, self.location.as_ref()))?,
        }
        Ok(None)
    }

    fn description(&self) -> String {
        let keyword = match self.scope {
            AssignmentScope::Namespace => "#assign",
            AssignmentScope::Global => "#global",
            AssignmentScope::Local => "#local",
        };
        match &self.source {
            AssignmentSource::Expression(e) => format!("{keyword} {} = {}", self.name, e.canonical_form()),
            AssignmentSource::Capture(_) => format!("{keyword} {}", self.name),
        }
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    fn collect_macros(&self, out: &mut Vec<Arc<MacroDefinition>>) {
        if let AssignmentSource::Capture(body) = &self.source {
            body.collect_macros(out);
        }
    }
}

/// `#list source as item`, or `#list hash as key, value`
#[derive(Debug, Clone)]
pub struct List {
    source: Arc<dyn Expression>,
    item: String,
    value_var: Option<String>,
    body: Arc<dyn Element>,
    else_body: Option<Arc<dyn Element>>,
    location: Option<SourceLocation>,
}

impl List {
    /// Iterate a sequence or collection
    pub fn new(source: Arc<dyn Expression>, item: impl Into<String>, body: Arc<dyn Element>) -> Self {
        Self {
            source,
            item: item.into(),
            value_var: None,
            body,
            else_body: None,
            location: None,
        }
    }

    /// Iterate the key-value pairs of a hash; `item` becomes the key variable
    pub fn with_value_var(mut self, value_var: impl Into<String>) -> Self {
        self.value_var = Some(value_var.into());
        self
    }

    /// Content to run when there is nothing to list
    pub fn with_else(mut self, else_body: Arc<dyn Element>) -> Self {
        self.else_body = Some(else_body);
        self
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    fn run_body(
        &self,
        env: &mut Environment<'_>,
        item: Option<Value>,
        value: Option<Option<Value>>,
        index: usize,
        has_next: bool,
    ) -> EvalResult<bool> {
        env.set_loop_variable(&self.item, item);
        if let (Some(name), Some(value)) = (&self.value_var, value) {
            env.set_loop_variable(name, value);
        }
        env.set_loop_variable(&format!("{}_index", self.item), Some(Value::Number(Number::from(index))));
        env.set_loop_variable(
            &format!("{}_has_next", self.item),
            Some(Value::from(has_next)),
        );
        match env.visit(&self.body) {
            Ok(()) | Err(Interrupt::Flow(FlowControl::Continue)) => Ok(true),
            Err(Interrupt::Flow(FlowControl::Break)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    fn iterate(&self, env: &mut Environment<'_>, source: &Value) -> EvalResult<usize> {
        if self.value_var.is_some() {
            let Some(hash) = source.as_hash_ex() else {
                return Err(self.not_listable(source, "an extended hash"));
            };
            let keys = hash.keys();
            let values = hash.values();
            let count = keys.len();
            for (index, (key, value)) in keys.into_iter().zip(values).enumerate() {
                let more = self.run_body(
                    env,
                    Some(Value::from(key)),
                    Some(Some(value)),
                    index,
                    index + 1 < count,
                )?;
                if !more {
                    return Ok(index + 1);
                }
            }
            return Ok(count);
        }
        let Some(mut iter) = source.iterate() else {
            return Err(self.not_listable(source, "a sequence or collection"));
        };
        let mut index = 0;
        while iter.has_next(env)? {
            let item = iter.next(env)?;
            let has_next = iter.has_next(env)?;
            let more = self.run_body(env, item, None, index, has_next)?;
            index += 1;
            if !more {
                break;
            }
        }
        Ok(index)
    }

    fn not_listable(&self, value: &Value, expected: &str) -> Interrupt {
        raise(
            TemplateError::type_mismatch(format!(
                "Expected {expected}, but this has evaluated to {}:\n==> {}",
                type_description(value),
                self.source.canonical_form()
            )),
            self.location.as_ref(),
        )
    }
}

impl Element for List {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let source = required(self.source.as_ref(), env, self.location.as_ref())?;
        let listed = env.with_local_context(|env| self.iterate(env, &source))?;
        if listed == 0 {
            if let Some(else_body) = &self.else_body {
                env.visit(else_body)?;
            }
        }
        Ok(None)
    }

    fn description(&self) -> String {
        match &self.value_var {
            Some(value) => format!(
                "#list {} as {}, {value}",
                self.source.canonical_form(),
                self.item
            ),
            None => format!("#list {} as {}", self.source.canonical_form(), self.item),
        }
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    fn collect_macros(&self, out: &mut Vec<Arc<MacroDefinition>>) {
        self.body.collect_macros(out);
        if let Some(else_body) = &self.else_body {
            else_body.collect_macros(out);
        }
    }
}

/// `#break`
#[derive(Debug, Clone, Copy, Default)]
pub struct Break;

impl Element for Break {
    fn accept(&self, _env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        Err(FlowControl::Break.into())
    }

    fn description(&self) -> String {
        "#break".to_string()
    }
}

/// `#continue`
#[derive(Debug, Clone, Copy, Default)]
pub struct Continue;

impl Element for Continue {
    fn accept(&self, _env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        Err(FlowControl::Continue.into())
    }

    fn description(&self) -> String {
        "#continue".to_string()
    }
}

/// `#setting name=value`
#[derive(Debug, Clone)]
pub struct Setting {
    name: String,
    value: Arc<dyn Expression>,
    location: Option<SourceLocation>,
}

impl Setting {
    /// Change a setting for the rest of the render
    pub fn new(name: impl Into<String>, value: Arc<dyn Expression>) -> Self {
        Self {
            name: name.into(),
            value,
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Element for Setting {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let value = required(self.value.as_ref(), env, self.location.as_ref())?;
        let text = match &value {
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => match other.string_value() {
                Some(s) => s.into_owned(),
                None => {
                    return Err(raise(
                        TemplateError::type_mismatch(format!(
                            "The value of a setting must be a string, number or boolean, but this has evaluated to {}:\n==> {}",
                            type_description(other),
                            self.value.canonical_form()
                        )),
                        self.location.as_ref(),
                    ));
                }
            },
        };
        env.set_setting(&self.name, &text)
            .map_err(|e| raise(TemplateError::Setting(e), self.location.as_ref()))?;
        Ok(None)
    }

    fn description(&self) -> String {
        format!("#setting {}={}", self.name, self.value.canonical_form())
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `#import "lib" as ns`
#[derive(Debug, Clone)]
pub struct Import {
    template: Arc<dyn Expression>,
    namespace: String,
    location: Option<SourceLocation>,
}

impl Import {
    /// Import a library into a namespace variable
    pub fn new(template: Arc<dyn Expression>, namespace: impl Into<String>) -> Self {
        Self {
            template,
            namespace: namespace.into(),
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Element for Import {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let name = required_string(self.template.as_ref(), env, self.location.as_ref())?;
        env.import_lib(&name, &self.namespace, None)?;
        Ok(None)
    }

    fn description(&self) -> String {
        format!("#import {} as {}", self.template.canonical_form(), self.namespace)
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `#include "name"`
#[derive(Debug, Clone)]
pub struct Include {
    template: Arc<dyn Expression>,
    ignore_missing: bool,
    location: Option<SourceLocation>,
}

impl Include {
    /// Include another template
    pub fn new(template: Arc<dyn Expression>) -> Self {
        Self {
            template,
            ignore_missing: false,
            location: None,
        }
    }

    /// Skip silently when the template doesn't exist
    pub fn ignore_missing(mut self) -> Self {
        self.ignore_missing = true;
        self
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Element for Include {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let name = required_string(self.template.as_ref(), env, self.location.as_ref())?;
        env.include(&name, self.ignore_missing)?;
        Ok(None)
    }

    fn description(&self) -> String {
        format!("#include {}", self.template.canonical_form())
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `#visit node using namespaces`
#[derive(Debug, Clone)]
pub struct Visit {
    node: Arc<dyn Expression>,
    namespaces: Option<Arc<dyn Expression>>,
    location: Option<SourceLocation>,
}

impl Visit {
    /// Invoke the handler of a node
    pub fn new(node: Arc<dyn Expression>) -> Self {
        Self {
            node,
            namespaces: None,
            location: None,
        }
    }

    /// Search handlers in these namespaces instead of the current one
    pub fn using(mut self, namespaces: Arc<dyn Expression>) -> Self {
        self.namespaces = Some(namespaces);
        self
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Element for Visit {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let value = required(self.node.as_ref(), env, self.location.as_ref())?;
        let Some(node) = value.as_node().cloned() else {
            return Err(raise(
                TemplateError::type_mismatch(format!(
                    "Expected a node, but this has evaluated to {}:\n==> {}",
                    type_description(&value),
                    self.node.canonical_form()
                )),
                self.location.as_ref(),
            ));
        };
        let namespaces = match &self.namespaces {
            Some(expression) => {
                let value = required(expression.as_ref(), env, self.location.as_ref())?;
                Some(env.node_namespaces(&value)?)
            }
            None => None,
        };
        env.invoke_node_handler(node, namespaces)?;
        Ok(None)
    }

    fn description(&self) -> String {
        format!("#visit {}", self.node.canonical_form())
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `#recurse node using namespaces`
#[derive(Debug, Clone, Default)]
pub struct Recurse {
    node: Option<Arc<dyn Expression>>,
    namespaces: Option<Arc<dyn Expression>>,
    location: Option<SourceLocation>,
}

impl Recurse {
    /// Visit the children of `node`, or of the current node when `None`
    pub fn new(node: Option<Arc<dyn Expression>>) -> Self {
        Self {
            node,
            namespaces: None,
            location: None,
        }
    }

    /// Search handlers in these namespaces instead of the current ones
    pub fn using(mut self, namespaces: Arc<dyn Expression>) -> Self {
        self.namespaces = Some(namespaces);
        self
    }

    /// Attach a source location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl Element for Recurse {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let node = match &self.node {
            Some(expression) => {
                let value = required(expression.as_ref(), env, self.location.as_ref())?;
                match value.as_node() {
                    Some(node) => Some(node.clone()),
                    None => {
                        return Err(raise(
                            TemplateError::type_mismatch(format!(
                                "Expected a node, but this has evaluated to {}:\n==> {}",
                                type_description(&value),
                                expression.canonical_form()
                            )),
                            self.location.as_ref(),
                        ));
                    }
                }
            }
            None => None,
        };
        let namespaces = match &self.namespaces {
            Some(expression) => {
                let value = required(expression.as_ref(), env, self.location.as_ref())?;
                Some(env.node_namespaces(&value)?)
            }
            None => None,
        };
        env.recurse(node, namespaces)?;
        Ok(None)
    }

    fn description(&self) -> String {
        match &self.node {
            Some(node) => format!("#recurse {}", node.canonical_form()),
            None => "#recurse".to_string(),
        }
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// `#fallback`, defers to the next handler of the current node
#[derive(Debug, Clone, Copy, Default)]
pub struct Fallback;

impl Element for Fallback {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        env.fallback()?;
        Ok(None)
    }

    fn description(&self) -> String {
        "#fallback".to_string()
    }
}

/// `#stop`, ends the render
#[derive(Debug, Clone, Default)]
pub struct Stop {
    message: Option<Arc<dyn Expression>>,
}

impl Stop {
    /// Stop, optionally with a message
    pub fn new(message: Option<Arc<dyn Expression>>) -> Self {
        Self { message }
    }
}

impl Element for Stop {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let message = match &self.message {
            Some(expression) => Some(required_string(expression.as_ref(), env, None)?),
            None => None,
        };
        Err(FlowControl::Stop(message).into())
    }

    fn description(&self) -> String {
        "#stop".to_string()
    }
}
