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

//! Imports, includes and their automatic variants

use super::{resolve_template_name, Environment, Namespace};
use crate::error::{EvalResult, TemplateError};
use crate::model::Value;
use crate::settings::Settings;
use indexmap::IndexMap;
use log::debug;
use std::sync::Arc;

impl Environment<'_> {
    /// `#import`: bind the namespace of a library to `namespace_var`
    ///
    /// A library is loaded and run once per render; importing it again
    /// reuses its namespace. `lazy` overrides the `lazy_imports` setting.
    pub fn import_lib(&mut self, name: &str, namespace_var: &str, lazy: Option<bool>) -> EvalResult<()> {
        let namespace = self.load_lib(name, lazy)?;
        self.current_namespace.set(namespace_var, Value::Object(namespace));
        Ok(())
    }

    /// The namespace of a library, loading it on first use
    pub(crate) fn load_lib(&mut self, name: &str, lazy: Option<bool>) -> EvalResult<Arc<Namespace>> {
        let resolved = resolve_template_name(Some(self.current_template.name()), name)?;
        if let Some(namespace) = self.loaded_libs.get(&resolved) {
            return Ok(namespace.clone());
        }
        let template = self.configuration.get_template(&resolved)?;
        let namespace = Arc::new(Namespace::for_template(template.clone()));
        self.import_macros(&template, &namespace);
        self.loaded_libs.insert(resolved.clone(), namespace.clone());
        if lazy.unwrap_or(*self.settings.lazy_imports()) {
            debug!("Imported {resolved} lazily");
            namespace.mark_pending();
        } else {
            debug!("Importing {resolved}");
            self.initialize_namespace(&namespace)?;
        }
        Ok(namespace)
    }

    /// Run a library template to populate its namespace
    fn initialize_namespace(&mut self, namespace: &Arc<Namespace>) -> EvalResult<()> {
        let Some(template) = namespace.template().cloned() else {
            return Ok(());
        };
        let saved_namespace = std::mem::replace(&mut self.current_namespace, namespace.clone());
        let saved_frame = self.current_frame.take();
        let saved_contexts = std::mem::take(&mut self.local_contexts);
        let saved_template = self.current_template.clone();
        self.set_current_template(template.clone());

        let result = self.visit(template.root());

        self.set_current_template(saved_template);
        self.local_contexts = saved_contexts;
        self.current_frame = saved_frame;
        self.current_namespace = saved_namespace;
        result
    }

    /// Run a lazily imported library if `value` is its namespace and it
    /// hasn't run yet
    pub fn ensure_namespace_initialized(&mut self, value: &Value) -> EvalResult<()> {
        let Value::Object(model) = value else {
            return Ok(());
        };
        let Some(namespace) = model.as_namespace() else {
            return Ok(());
        };
        if !namespace.is_pending() {
            return Ok(());
        }
        let loaded = self
            .loaded_libs
            .values()
            .find(|lib| std::ptr::eq(lib.as_ref(), namespace))
            .cloned();
        match loaded {
            Some(lib) => self.initialize_if_pending(&lib),
            None => Ok(()),
        }
    }

    pub(crate) fn initialize_if_pending(&mut self, namespace: &Arc<Namespace>) -> EvalResult<()> {
        if !namespace.take_pending() {
            return Ok(());
        }
        if let Some(template) = namespace.template() {
            debug!("Initializing lazily imported {}", template.name());
        }
        self.initialize_namespace(namespace)
    }

    /// `#include`: run another template in the current namespace
    pub fn include(&mut self, name: &str, ignore_missing: bool) -> EvalResult<()> {
        let resolved = resolve_template_name(Some(self.current_template.name()), name)?;
        let template = match self.configuration.get_template(&resolved) {
            Ok(template) => template,
            Err(TemplateError::TemplateNotFound { .. }) if ignore_missing => {
                debug!("Skipped missing include {resolved}");
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };
        debug!("Including {resolved}");
        let namespace = self.current_namespace.clone();
        self.import_macros(&template, &namespace);
        let saved_template = self.current_template.clone();
        self.set_current_template(template.clone());
        let result = self.visit(template.root());
        self.set_current_template(saved_template);
        result
    }

    /// Settings levels from the configuration down to this render
    fn levels(&self) -> [&Settings; 3] {
        [
            self.configuration.settings().as_ref(),
            self.main_template.settings().as_ref(),
            &self.settings,
        ]
    }

    /// Auto-imports of all levels; an entry is skipped when a lower level
    /// imports into the same namespace name
    pub(crate) fn run_auto_imports(&mut self) -> EvalResult<()> {
        let per_level: Vec<IndexMap<String, String>> = self
            .levels()
            .iter()
            .map(|level| {
                if level.is_auto_imports_set() {
                    level.auto_imports().clone()
                } else {
                    IndexMap::new()
                }
            })
            .collect();
        let lazy = self.settings.effective_lazy_auto_imports();
        for (depth, imports) in per_level.iter().enumerate() {
            for (namespace_var, template_name) in imports {
                if per_level[depth + 1..]
                    .iter()
                    .any(|lower| lower.contains_key(namespace_var))
                {
                    continue;
                }
                debug!("Auto-importing {template_name} as {namespace_var}");
                self.import_lib(template_name, namespace_var, Some(lazy))?;
            }
        }
        Ok(())
    }

    /// Auto-includes of all levels; an entry is skipped when a lower level
    /// includes the same template
    pub(crate) fn run_auto_includes(&mut self) -> EvalResult<()> {
        let per_level: Vec<Vec<String>> = self
            .levels()
            .iter()
            .map(|level| {
                if level.is_auto_includes_set() {
                    level.auto_includes().clone()
                } else {
                    Vec::new()
                }
            })
            .collect();
        for (depth, includes) in per_level.iter().enumerate() {
            for template_name in includes {
                if per_level[depth + 1..]
                    .iter()
                    .any(|lower| lower.contains(template_name))
                {
                    continue;
                }
                debug!("Auto-including {template_name}");
                self.include(template_name, false)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{
        Assignment, AssignmentScope, AssignmentSource, Block, Dot, Element, Expression, Import,
        Include, Interpolation, Literal, Text, Variable,
    };
    use crate::environment::MapTemplateLoader;
    use crate::model::Value;
    use crate::settings::Configuration;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn lit(value: impl Into<Value>) -> Arc<dyn Expression> {
        Arc::new(Literal::new(value))
    }

    fn library() -> Arc<dyn Element> {
        Arc::new(Block::new(vec![
            Arc::new(Text::new("lib ran;")),
            Arc::new(Assignment::new(
                AssignmentScope::Namespace,
                "greeting",
                AssignmentSource::Expression(lit("hi")),
            )),
        ]))
    }

    fn configuration(settings: &[(&str, &str)]) -> Arc<Configuration> {
        let loader = MapTemplateLoader::new();
        loader.put("lib/util.ftl", library());
        loader.put("header.ftl", Arc::new(Text::new("header;")));
        let mut configuration = Configuration::default();
        configuration.set_template_loader(Arc::new(loader));
        configuration.set_settings(settings.iter().copied()).unwrap();
        Arc::new(configuration)
    }

    fn use_library() -> Vec<Arc<dyn Element>> {
        vec![
            Arc::new(Text::new("[")),
            Arc::new(Interpolation::new(Arc::new(Dot::new(
                Arc::new(Variable::new("u")),
                "greeting",
            )))),
            Arc::new(Text::new("]")),
        ]
    }

    #[test]
    fn test_import_runs_library_once() {
        let mut children: Vec<Arc<dyn Element>> = vec![
            Arc::new(Import::new(lit("lib/util.ftl"), "u")),
            Arc::new(Import::new(lit("/lib/util.ftl"), "again")),
        ];
        children.extend(use_library());
        let out = configuration(&[])
            .create_template("main.ftl", Arc::new(Block::new(children)))
            .render_to_string(None)
            .unwrap();
        // library output goes to the output where it is imported
        assert_eq!(out, "lib ran;[hi]");
    }

    #[test]
    fn test_lazy_import_runs_on_first_use() {
        let mut children: Vec<Arc<dyn Element>> = vec![
            Arc::new(Import::new(lit("lib/util.ftl"), "u")),
            Arc::new(Text::new("before;")),
        ];
        children.extend(use_library());
        let out = configuration(&[("lazy_imports", "true")])
            .create_template("main.ftl", Arc::new(Block::new(children)))
            .render_to_string(None)
            .unwrap();
        assert_eq!(out, "before;[lib ran;hi]");
    }

    #[test]
    fn test_auto_import_and_include() {
        let out = configuration(&[
            ("auto_import", "\"lib/util.ftl\" as u"),
            ("auto_include", "header.ftl"),
        ])
        .create_template("main.ftl", Arc::new(Block::new(use_library())))
        .render_to_string(None)
        .unwrap();
        assert_eq!(out, "lib ran;header;[hi]");
    }

    #[test]
    fn test_include_missing() {
        let configuration = configuration(&[]);
        let ignored = configuration
            .create_template("main.ftl", Arc::new(Include::new(lit("nope.ftl")).ignore_missing()))
            .render_to_string(None)
            .unwrap();
        assert_eq!(ignored, "");
        let failed = configuration
            .create_template("main.ftl", Arc::new(Include::new(lit("nope.ftl"))))
            .render_to_string(None);
        assert!(failed.unwrap_err().to_string().contains("nope.ftl"));
    }
}
