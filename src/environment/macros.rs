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

//! Template-defined macros and functions

use super::{Environment, MacroFrame, Namespace, Template};
use crate::ast::{MacroDefinition, MacroKind};
use crate::error::{EvalResult, FlowControl, Interrupt, TemplateError};
use crate::model::{
    CallArgs, Callable, DirectiveModel, FunctionModel, NestedBody, SimpleSequence, Value,
};
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// A macro or function bound to the namespace that defined it
///
/// The body runs with that namespace as the current one, so its
/// `#assign`s and unqualified names refer to the defining library.
pub struct TemplateMacro {
    definition: Arc<MacroDefinition>,
    namespace: Weak<Namespace>,
    template: Arc<Template>,
}

impl TemplateMacro {
    /// The definition
    pub fn definition(&self) -> &Arc<MacroDefinition> {
        &self.definition
    }

    /// The value a definition is stored as
    pub(crate) fn into_value(self) -> Value {
        let kind = self.definition.kind;
        let callable = Arc::new(self);
        match kind {
            MacroKind::Macro => Value::Callable(Callable::Directive(callable)),
            MacroKind::Function => Value::Callable(Callable::Function(callable)),
        }
    }
}

impl fmt::Debug for TemplateMacro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateMacro")
            .field("name", &self.definition.name)
            .field("kind", &self.definition.kind)
            .field("template", &self.template.name())
            .finish()
    }
}

impl DirectiveModel for TemplateMacro {
    fn execute(&self, env: &mut Environment<'_>, args: CallArgs, nested: Option<NestedBody>) -> EvalResult<()> {
        let args = match args {
            CallArgs::Named(named) => MacroArgs::Named(named),
            CallArgs::Positional(values) => MacroArgs::Positional(values.into_iter().map(Some).collect()),
        };
        env.invoke_macro(self, args, nested).map(|_| ())
    }

    fn is_macro(&self) -> bool {
        true
    }
}

impl FunctionModel for TemplateMacro {
    fn call(&self, env: &mut Environment<'_>, args: Vec<Option<Value>>) -> EvalResult<Option<Value>> {
        env.invoke_macro(self, MacroArgs::Positional(args), None)
    }

    fn is_macro(&self) -> bool {
        true
    }

    fn describe(&self) -> Option<String> {
        Some(format!("function {}", self.definition.name))
    }
}

/// Arguments of a macro invocation
pub(crate) enum MacroArgs {
    Named(IndexMap<String, Value>),
    // null entries count as omitted
    Positional(Vec<Option<Value>>),
}

fn call_error(definition: &MacroDefinition, message: impl Into<String>) -> Interrupt {
    TemplateError::MacroCall {
        name: definition.name.clone(),
        message: message.into(),
    }
    .into()
}

fn kind_name(definition: &MacroDefinition) -> &'static str {
    match definition.kind {
        MacroKind::Macro => "macro",
        MacroKind::Function => "function",
    }
}

/// Match arguments to parameters; defaults are applied later
fn bind_arguments(definition: &MacroDefinition, args: MacroArgs) -> EvalResult<IndexMap<String, Value>> {
    let mut locals = IndexMap::with_capacity(definition.params.len() + 1);
    match args {
        MacroArgs::Named(named) => {
            let mut rest = IndexMap::new();
            for (name, value) in named {
                if definition.has_param(&name) {
                    locals.insert(name, value);
                } else if definition.catch_all.is_some() {
                    rest.insert(name, value);
                } else {
                    return Err(call_error(
                        definition,
                        format!(
                            "The {} has no parameter with name \"{name}\". Declared parameters: {}.",
                            kind_name(definition),
                            declared(definition)
                        ),
                    ));
                }
            }
            if let Some(catch_all) = &definition.catch_all {
                locals.insert(catch_all.clone(), Value::hash(rest));
            }
        }
        MacroArgs::Positional(values) => {
            if values.len() > definition.params.len() && definition.catch_all.is_none() {
                return Err(call_error(
                    definition,
                    format!(
                        "The {} takes {} argument(s), but {} were given.",
                        kind_name(definition),
                        definition.params.len(),
                        values.len()
                    ),
                ));
            }
            let mut values = values.into_iter();
            for param in &definition.params {
                if let Some(Some(value)) = values.next() {
                    locals.insert(param.name.clone(), value);
                }
            }
            if let Some(catch_all) = &definition.catch_all {
                let rest: Vec<Option<Value>> = values.collect();
                locals.insert(catch_all.clone(), Value::Object(Arc::new(SimpleSequence::new(rest))));
            }
        }
    }
    Ok(locals)
}

fn declared(definition: &MacroDefinition) -> String {
    if definition.params.is_empty() {
        return "none".to_string();
    }
    definition
        .params
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Environment<'_> {
    /// Put the macros of `template` into `namespace`
    pub(crate) fn import_macros(&mut self, template: &Arc<Template>, namespace: &Arc<Namespace>) {
        for definition in template.macros() {
            let bound = TemplateMacro {
                definition: definition.clone(),
                namespace: Arc::downgrade(namespace),
                template: template.clone(),
            };
            namespace.set(&definition.name, bound.into_value());
        }
    }

    /// Run a macro or function
    ///
    /// Arguments are bound before the frame becomes visible. The caller's
    /// frame, namespace and template are restored whatever the outcome.
    pub(crate) fn invoke_macro(
        &mut self,
        callee: &TemplateMacro,
        args: MacroArgs,
        nested: Option<NestedBody>,
    ) -> EvalResult<Option<Value>> {
        let definition = &callee.definition;
        let Some(namespace) = callee.namespace.upgrade() else {
            return Err(call_error(definition, "The namespace that defined it no longer exists."));
        };
        let locals = bind_arguments(definition, args)?;

        let caller = self.current_frame;
        let caller_namespace = std::mem::replace(&mut self.current_namespace, namespace);
        let caller_template = self.current_template.clone();
        self.macro_frames.push(MacroFrame {
            definition: definition.clone(),
            locals,
            nested,
            local_contexts: Vec::new(),
            caller,
            caller_namespace: caller_namespace.clone(),
            caller_template: caller_template.clone(),
        });
        let index = self.macro_frames.len() - 1;
        self.current_frame = Some(index);
        self.set_current_template(callee.template.clone());

        let result = self.run_macro_body(index, definition);

        self.macro_frames.truncate(index);
        self.current_frame = caller;
        self.current_namespace = caller_namespace;
        self.set_current_template(caller_template);
        result
    }

    fn run_macro_body(&mut self, index: usize, definition: &Arc<MacroDefinition>) -> EvalResult<Option<Value>> {
        for param in &definition.params {
            if self.macro_frames[index].locals.contains_key(&param.name) {
                continue;
            }
            let value = match &param.default {
                Some(default) => default.eval(self)?,
                None => None,
            };
            let Some(value) = value else {
                return Err(call_error(
                    definition,
                    format!(
                        "When calling the {}, the required parameter \"{}\" was either not specified, or had null/missing value.",
                        kind_name(definition),
                        param.name
                    ),
                ));
            };
            self.macro_frames[index].locals.insert(param.name.clone(), value);
        }

        let result = match definition.kind {
            MacroKind::Macro => self.visit(&definition.body),
            // the output of a function body is discarded
            MacroKind::Function => self.capture_output(&definition.body).map(|_| ()),
        };
        match result {
            Ok(()) => Ok(None),
            Err(Interrupt::Flow(FlowControl::Return(value))) => Ok(value),
            Err(other) => Err(other),
        }
    }

    /// `#nested`: run the nested content of the running macro call
    ///
    /// The content runs in the caller's scope with `values` bound to the
    /// loop variables the call site declared. Outside a macro, or when the
    /// call had no nested content, nothing happens.
    pub fn invoke_nested(&mut self, values: Vec<Option<Value>>) -> EvalResult<()> {
        let Some(index) = self.current_frame else {
            return Ok(());
        };
        let frame = &self.macro_frames[index];
        let Some(nested) = frame.nested.clone() else {
            return Ok(());
        };
        let caller = frame.caller;
        let caller_namespace = frame.caller_namespace.clone();
        let caller_template = frame.caller_template.clone();

        let own_namespace = std::mem::replace(&mut self.current_namespace, caller_namespace);
        let own_template = self.current_template.clone();
        self.current_frame = caller;
        self.set_current_template(caller_template);

        let result = self.with_local_context(|env| {
            for (name, value) in nested.params.iter().zip(values) {
                env.set_loop_variable(name, value);
            }
            env.visit(&nested.body)
        });

        self.current_frame = Some(index);
        self.current_namespace = own_namespace;
        self.set_current_template(own_template);
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{
        Assignment, AssignmentScope, AssignmentSource, Block, Call, CallSiteArgs, Dot, Element,
        Expression, Interpolation, Literal, MacroCall, MacroDef, MacroDefinition, MacroParam,
        Nested, Return, Text, Variable,
    };
    use crate::model::Value;
    use crate::settings::Configuration;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn var(name: &str) -> Arc<dyn Expression> {
        Arc::new(Variable::new(name))
    }

    fn lit(value: impl Into<Value>) -> Arc<dyn Expression> {
        Arc::new(Literal::new(value))
    }

    fn print(name: &str) -> Arc<dyn Element> {
        Arc::new(Interpolation::new(var(name)))
    }

    fn render(children: Vec<Arc<dyn Element>>) -> Result<String, crate::error::RenderError> {
        Arc::new(Configuration::default())
            .create_template("macros.ftl", Arc::new(Block::new(children)))
            .render_to_string(None)
    }

    fn greet_macro() -> Arc<dyn Element> {
        let body = Block::new(vec![
            Arc::new(Text::new("Hello ")),
            print("name"),
            Arc::new(Text::new(" ")),
            print("punct"),
        ]);
        Arc::new(MacroDef::new(MacroDefinition::new(
            "greet",
            vec![
                MacroParam::required("name"),
                MacroParam::with_default("punct", lit("!")),
            ],
            Arc::new(body),
        )))
    }

    #[test]
    fn test_named_and_positional_arguments() {
        let out = render(vec![
            greet_macro(),
            Arc::new(MacroCall::new(
                var("greet"),
                CallSiteArgs::Named(vec![("name".to_string(), lit("Ann"))]),
            )),
            Arc::new(Text::new("|")),
            Arc::new(MacroCall::new(
                var("greet"),
                CallSiteArgs::Positional(vec![lit("Bo"), lit("?")]),
            )),
        ])
        .unwrap();
        assert_eq!(out, "Hello Ann !|Hello Bo ?");
    }

    #[test]
    fn test_unknown_and_missing_arguments_fail() {
        let unknown = render(vec![
            greet_macro(),
            Arc::new(MacroCall::new(
                var("greet"),
                CallSiteArgs::Named(vec![("nope".to_string(), lit(1i64))]),
            )),
        ]);
        assert!(unknown.unwrap_err().to_string().contains("no parameter with name \"nope\""));

        let missing = render(vec![
            greet_macro(),
            Arc::new(MacroCall::new(var("greet"), CallSiteArgs::Positional(vec![]))),
        ]);
        assert!(missing.unwrap_err().to_string().contains("\"name\""));
    }

    #[test]
    fn test_nested_content_sees_caller_scope() {
        let repeat = MacroDefinition::new(
            "twice",
            vec![],
            Arc::new(Block::new(vec![
                Arc::new(Assignment::new(
                    AssignmentScope::Local,
                    "x",
                    AssignmentSource::Expression(lit("macro-local")),
                )),
                Arc::new(Nested::new(vec![lit(1i64)])),
                Arc::new(Nested::new(vec![lit(2i64)])),
            ])),
        );
        let out = render(vec![
            Arc::new(MacroDef::new(repeat)),
            Arc::new(Assignment::new(
                AssignmentScope::Namespace,
                "x",
                AssignmentSource::Expression(lit("caller")),
            )),
            Arc::new(
                MacroCall::new(var("twice"), CallSiteArgs::Positional(vec![])).with_nested(
                    Arc::new(Block::new(vec![print("i"), print("x"), Arc::new(Text::new(";"))])),
                    vec!["i".to_string()],
                ),
            ),
        ])
        .unwrap();
        assert_eq!(out, "1caller;2caller;");
    }

    #[test]
    fn test_function_returns_value_and_discards_output() {
        let double = MacroDefinition::function(
            "label",
            vec![MacroParam::required("s")],
            Arc::new(Block::new(vec![
                Arc::new(Text::new("ignored")),
                Arc::new(Return::new(Some(var("s")))),
            ])),
        );
        let out = render(vec![
            Arc::new(MacroDef::new(double)),
            Arc::new(Interpolation::new(Arc::new(Call::new(
                var("label"),
                vec![lit("ok")],
            )))),
        ])
        .unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_catch_all_collects_extra_named_arguments() {
        let definition = MacroDefinition::new(
            "attrs",
            vec![],
            Arc::new(Block::new(vec![Arc::new(Interpolation::new(Arc::new(
                Dot::new(var("rest"), "class"),
            )))])),
        )
        .with_catch_all("rest");
        let out = render(vec![
            Arc::new(MacroDef::new(definition)),
            Arc::new(MacroCall::new(
                var("attrs"),
                CallSiteArgs::Named(vec![("class".to_string(), lit("big"))]),
            )),
        ])
        .unwrap();
        assert_eq!(out, "big");
    }
}
