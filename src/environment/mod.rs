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

//! The execution environment of one render
//!
//! An [`Environment`] is the leaf of the settings hierarchy and owns all
//! per-render state: output, namespaces, macro frames, local contexts,
//! the instruction stack and the format caches. It is passed explicitly to
//! every element and expression; nothing in it is shared between threads.

mod current;
mod format_cache;
mod imports;
mod macros;
mod namespace;
mod nodes;
mod output;
mod template;
mod visit;

pub use current::{current_render, RenderSnapshot};
pub use macros::TemplateMacro;
pub use namespace::Namespace;
pub use output::Output;
pub use template::{resolve_template_name, MapTemplateLoader, Template, TemplateLoader};

use crate::ast::{Element, MacroDefinition};
use crate::error::{
    EvalResult, FlowControl, HostError, Interrupt, RenderError, SettingError, TemplateError,
    TemplateException, TemplateResult,
};
use crate::model::{DateKind, NestedBody, NodeModel, Value};
use crate::registry::BuiltInBinding;
use crate::settings::{Configuration, SettingKey, Settings};
use current::RenderGuard;
use format_cache::FormatCache;
use indexmap::IndexMap;
use nodes::NodeState;
use smallvec::SmallVec;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Variables of one iterator block or nested content invocation
#[derive(Debug, Default)]
struct LocalContext {
    variables: IndexMap<String, Value>,
}

/// Where an iteration is, as seen through its loop variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPosition {
    /// Zero-based index of the current item
    pub index: usize,
    /// Whether more items follow
    pub has_next: bool,
}

/// A running macro or function
struct MacroFrame {
    definition: Arc<MacroDefinition>,
    locals: IndexMap<String, Value>,
    nested: Option<NestedBody>,
    local_contexts: Vec<LocalContext>,
    caller: Option<usize>,
    caller_namespace: Arc<Namespace>,
    caller_template: Arc<Template>,
}

/// State of a single render
pub struct Environment<'w> {
    configuration: Arc<Configuration>,
    main_template: Arc<Template>,
    current_template: Arc<Template>,
    settings: Settings,
    out: Output<'w>,
    data_model: Option<Value>,
    instruction_stack: SmallVec<[Arc<dyn Element>; 16]>,
    macro_frames: Vec<MacroFrame>,
    current_frame: Option<usize>,
    // contexts outside any macro frame
    local_contexts: Vec<LocalContext>,
    main_namespace: Arc<Namespace>,
    global_namespace: Arc<Namespace>,
    current_namespace: Arc<Namespace>,
    loaded_libs: IndexMap<String, Arc<Namespace>>,
    recovered_errors: Vec<TemplateException>,
    last_handled: Option<TemplateException>,
    format_cache: FormatCache,
    attempt_depth: usize,
    node_state: Option<NodeState>,
}

impl<'w> Environment<'w> {
    /// Environment rendering `template` with `data_model` into `out`
    pub fn new(template: Arc<Template>, data_model: Option<Value>, out: impl Write + 'w) -> Self {
        let main_namespace = Arc::new(Namespace::for_template(template.clone()));
        Self {
            configuration: template.configuration().clone(),
            settings: Settings::with_parent(template.settings().clone()),
            current_template: template.clone(),
            main_template: template,
            out: Output::new(out),
            data_model,
            instruction_stack: SmallVec::new(),
            macro_frames: Vec::new(),
            current_frame: None,
            local_contexts: Vec::new(),
            current_namespace: main_namespace.clone(),
            main_namespace,
            global_namespace: Arc::new(Namespace::new()),
            loaded_libs: IndexMap::new(),
            recovered_errors: Vec::new(),
            last_handled: None,
            format_cache: FormatCache::default(),
            attempt_depth: 0,
            node_state: None,
        }
    }

    /// Render the main template
    ///
    /// Runs auto-imports and auto-includes first, then the main template.
    /// Exceptions the handler rethrows end the render.
    pub fn process(&mut self) -> Result<(), RenderError> {
        let _guard = RenderGuard::install(self.snapshot());
        self.format_cache.clear();
        let mut result = self.run_main();
        if *self.settings.auto_flush() {
            let flushed = self.out.flush();
            if result.is_ok() {
                result = flushed.map_err(Interrupt::from);
            }
        }
        self.format_cache.clear();
        match result {
            Ok(()) => Ok(()),
            Err(Interrupt::Exception(exception)) => Err(RenderError::Template(exception)),
            Err(Interrupt::Host(error)) => Err(RenderError::Host(error)),
            Err(Interrupt::Flow(FlowControl::Stop(message))) => Err(RenderError::Stopped(message)),
            Err(Interrupt::Flow(_)) => Ok(()),
        }
    }

    fn run_main(&mut self) -> EvalResult<()> {
        let main = self.main_template.clone();
        let main_namespace = self.main_namespace.clone();
        self.import_macros(&main, &main_namespace);
        self.run_auto_imports()?;
        self.run_auto_includes()?;
        self.visit(main.root())
    }

    fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            template_name: self.main_template.name().to_string(),
            locale: self.settings.locale().clone(),
            time_zone: self.settings.time_zone().clone(),
        }
    }

    /// Settings of this render; unset values come from the current template
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Assign a setting for the rest of the render
    ///
    /// Only the cached formats that depend on the changed setting are
    /// dropped.
    pub fn set_setting(&mut self, name: &str, value: &str) -> Result<(), SettingError> {
        let key = self.settings.assign_setting(name, value)?;
        self.setting_changed(key);
        Ok(())
    }

    fn setting_changed(&mut self, key: SettingKey) {
        match key {
            SettingKey::Locale => {
                self.format_cache.locale_changed();
                let locale = self.settings.locale().clone();
                current::update(|snapshot| snapshot.locale = locale);
            }
            SettingKey::TimeZone => {
                self.format_cache.time_zone_changed(false);
                let time_zone = self.settings.time_zone().clone();
                current::update(|snapshot| snapshot.time_zone = time_zone);
            }
            SettingKey::SqlDateAndTimeTimeZone => self.format_cache.time_zone_changed(true),
            SettingKey::NumberFormat => self.format_cache.number_format_changed(),
            SettingKey::DateFormat => self.format_cache.date_format_changed(DateKind::Date),
            SettingKey::TimeFormat => self.format_cache.date_format_changed(DateKind::Time),
            SettingKey::DateTimeFormat => self.format_cache.date_format_changed(DateKind::DateTime),
            SettingKey::CustomNumberFormats | SettingKey::CustomDateFormats => {
                self.format_cache.clear();
            }
            _ => {}
        }
    }

    /// The configuration the main template belongs to
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// The template being rendered
    pub fn main_template(&self) -> &Arc<Template> {
        &self.main_template
    }

    /// The template whose code is running; differs from the main template
    /// inside includes and library macros
    pub fn current_template(&self) -> &Arc<Template> {
        &self.current_template
    }

    /// Name of [`Self::current_template`]
    pub fn current_template_name(&self) -> Option<String> {
        Some(self.current_template.name().to_string())
    }

    /// Switch the running template
    ///
    /// The settings parent follows the template. Cached formats survive
    /// only when both templates add nothing over the same parent.
    fn set_current_template(&mut self, template: Arc<Template>) {
        if Arc::ptr_eq(&template, &self.current_template) {
            return;
        }
        let old = self.current_template.settings();
        let new = template.settings();
        let same_effective = !old.has_own_values()
            && !new.has_own_values()
            && match (old.parent(), new.parent()) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            };
        if !same_effective {
            self.format_cache.clear();
        }
        self.settings.set_parent(new.clone());
        self.current_template = template;
    }

    /// The output
    pub fn out(&mut self) -> &mut Output<'w> {
        &mut self.out
    }

    /// The data model of the render
    pub fn data_model(&self) -> Option<&Value> {
        self.data_model.as_ref()
    }

    /// The main namespace
    pub fn main_namespace(&self) -> &Arc<Namespace> {
        &self.main_namespace
    }

    /// The global namespace
    pub fn global_namespace(&self) -> &Arc<Namespace> {
        &self.global_namespace
    }

    /// The namespace `#assign` writes into
    pub fn current_namespace(&self) -> &Arc<Namespace> {
        &self.current_namespace
    }

    /// Bind a built-in through the configuration's registry
    pub fn bind_builtin(&self, name: &str) -> TemplateResult<BuiltInBinding> {
        self.configuration.bind_builtin(name)
    }

    /// Convert a value to text with the current formats
    pub fn coerce_to_string(&mut self, value: Option<&Value>, description: &str) -> TemplateResult<String> {
        crate::eval::coerce_to_string(self, value, description, None)
    }

    /// Turn a host error into what the visiting path propagates
    ///
    /// With `wrap_unchecked_exceptions` it becomes a template exception and
    /// goes through the exception handler; otherwise it passes the handler.
    pub fn host_failure(&self, error: HostError) -> Interrupt {
        if *self.settings.wrap_unchecked_exceptions() {
            TemplateError::Host {
                message: error.to_string(),
            }
            .into()
        } else {
            Interrupt::Host(error)
        }
    }

    /// The innermost error being recovered from
    pub fn current_recovered_error(&self) -> Option<&TemplateException> {
        self.recovered_errors.last()
    }

    fn local_contexts(&self) -> &[LocalContext] {
        match self.current_frame {
            Some(index) => &self.macro_frames[index].local_contexts,
            None => &self.local_contexts,
        }
    }

    fn local_contexts_mut(&mut self) -> &mut Vec<LocalContext> {
        match self.current_frame {
            Some(index) => &mut self.macro_frames[index].local_contexts,
            None => &mut self.local_contexts,
        }
    }

    /// Look a variable up
    ///
    /// Searched in order: local contexts (innermost first), the running
    /// macro, the current namespace, the global namespace, the data model
    /// and the shared variables of the configuration.
    pub fn get_variable(&mut self, name: &str) -> EvalResult<Option<Value>> {
        let found = self.lookup(name);
        if let Some(value) = &found {
            self.ensure_namespace_initialized(value)?;
        }
        Ok(found)
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        for context in self.local_contexts().iter().rev() {
            if let Some(value) = context.variables.get(name) {
                return Some(value.clone());
            }
        }
        if let Some(index) = self.current_frame {
            if let Some(value) = self.macro_frames[index].locals.get(name) {
                return Some(value.clone());
            }
        }
        self.current_namespace
            .get(name)
            .or_else(|| self.global_namespace.get(name))
            .or_else(|| {
                self.data_model
                    .as_ref()
                    .and_then(|model| model.as_hash())
                    .and_then(|hash| hash.get(name))
            })
            .or_else(|| self.configuration.shared_variable(name).cloned())
    }

    /// `#assign`: set a variable in the current namespace
    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.current_namespace.set(name, value);
    }

    /// `#global`: set a variable in the global namespace
    pub fn set_global_variable(&mut self, name: &str, value: Value) {
        self.global_namespace.set(name, value);
    }

    /// `#local`: set a variable of the running macro or function
    pub fn set_local_variable(&mut self, name: &str, value: Value) -> TemplateResult<()> {
        match self.current_frame {
            Some(index) => {
                self.macro_frames[index].locals.insert(name.to_string(), value);
                Ok(())
            }
            None => Err(TemplateError::evaluation(
                "The #local directive can only be used inside a macro or function.",
            )),
        }
    }

    /// Set a variable of the innermost local context; `None` removes it
    ///
    /// Does nothing outside [`Self::with_local_context`].
    pub fn set_loop_variable(&mut self, name: &str, value: Option<Value>) {
        let Some(context) = self.local_contexts_mut().last_mut() else {
            return;
        };
        match value {
            Some(value) => {
                context.variables.insert(name.to_string(), value);
            }
            None => {
                context.variables.shift_remove(name);
            }
        }
    }

    /// Position of the innermost iteration whose loop variable is `name`
    ///
    /// Only iterations of the running macro, or of the top level outside
    /// macros, are visible.
    pub fn loop_position(&self, name: &str) -> Option<LoopPosition> {
        let index_name = format!("{name}_index");
        let has_next_name = format!("{name}_has_next");
        self.local_contexts().iter().rev().find_map(|context| {
            let index = context.variables.get(&index_name)?.number_value()?.to_i64_exact()?;
            let has_next = context.variables.get(&has_next_name)?.boolean_value()?;
            Some(LoopPosition {
                index: usize::try_from(index).ok()?,
                has_next,
            })
        })
    }

    /// Run `body` with a fresh local context on top
    pub fn with_local_context<T>(&mut self, body: impl FnOnce(&mut Self) -> EvalResult<T>) -> EvalResult<T> {
        self.local_contexts_mut().push(LocalContext::default());
        let result = body(self);
        self.local_contexts_mut().pop();
        result
    }

    /// Run `body` with one variable bound in a fresh local context
    pub fn with_local_variable<T>(
        &mut self,
        name: &str,
        value: Option<Value>,
        body: impl FnOnce(&mut Self) -> EvalResult<T>,
    ) -> EvalResult<T> {
        self.with_local_context(|env| {
            env.set_loop_variable(name, value);
            body(env)
        })
    }

    /// The node being handled by `#visit` or `#recurse`
    pub fn current_node(&self) -> Option<Arc<dyn NodeModel>> {
        self.node_state.as_ref().map(|state| state.node.clone())
    }
}

impl fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("main_template", &self.main_template.name())
            .field("current_template", &self.current_template.name())
            .field("settings", &self.settings)
            .field(
                "running_macro",
                &self.current_frame.map(|index| self.macro_frames[index].definition.name.as_str()),
            )
            .field("instruction_depth", &self.instruction_stack.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Assignment, AssignmentScope, AssignmentSource, Block, Interpolation, Literal, Setting,
        Variable,
    };
    use crate::model::Number;
    use pretty_assertions::assert_eq;

    fn template(root: Arc<dyn Element>) -> Arc<Template> {
        Arc::new(Configuration::default()).create_template("test.ftl", root)
    }

    fn text(value: Option<Value>) -> Option<String> {
        value.and_then(|v| v.string_value().map(|s| s.into_owned()))
    }

    fn print(name: &str) -> Arc<dyn Element> {
        Arc::new(Interpolation::new(Arc::new(Variable::new(name))))
    }

    #[test]
    fn test_variable_resolution_order() {
        let data = Value::hash(IndexMap::from([
            ("a".to_string(), Value::from("data")),
            ("b".to_string(), Value::from("data")),
        ]));
        let mut out = Vec::new();
        let mut env = Environment::new(template(Arc::new(Block::new(vec![]))), Some(data), &mut out);
        env.set_global_variable("b", Value::from("global"));
        env.set_variable("c", Value::from("main"));
        env.set_global_variable("c", Value::from("global"));

        assert_eq!(text(env.get_variable("a").unwrap()).as_deref(), Some("data"));
        assert_eq!(text(env.get_variable("b").unwrap()).as_deref(), Some("global"));
        assert_eq!(text(env.get_variable("c").unwrap()).as_deref(), Some("main"));

        let shadowed = env
            .with_local_variable("c", Some(Value::from("local")), |env| env.get_variable("c"))
            .unwrap();
        assert_eq!(text(shadowed).as_deref(), Some("local"));
        assert_eq!(text(env.get_variable("c").unwrap()).as_deref(), Some("main"));
        assert!(env.get_variable("missing").unwrap().is_none());
    }

    #[test]
    fn test_local_outside_macro_fails() {
        let mut out = Vec::new();
        let mut env = Environment::new(template(Arc::new(Block::new(vec![]))), None, &mut out);
        assert!(env.set_local_variable("x", Value::from(1)).is_err());
    }

    #[test]
    fn test_setting_directive_changes_number_format() {
        let root = Block::new(vec![
            Arc::new(Assignment::new(
                AssignmentScope::Namespace,
                "n",
                AssignmentSource::Expression(Arc::new(Literal::new(Number::from(
                    rust_decimal::Decimal::new(15, 1),
                )))),
            )),
            print("n"),
            Arc::new(Setting::new("number_format", Arc::new(Literal::new("0.00")))),
            Arc::new(crate::ast::Text::new(" ")),
            print("n"),
        ]);
        let rendered = template(Arc::new(root)).render_to_string(None).unwrap();
        assert_eq!(rendered, "1.5 1.50");
    }

    #[test]
    fn test_shared_variables_are_last() {
        let mut configuration = Configuration::default();
        configuration.set_shared_variable("site", "shared");
        let configuration = Arc::new(configuration);
        let data = Value::hash(IndexMap::from([("other".to_string(), Value::from(1))]));
        let rendered = configuration
            .create_template("t", print("site"))
            .render_to_string(Some(data))
            .unwrap();
        assert_eq!(rendered, "shared");
    }
}
