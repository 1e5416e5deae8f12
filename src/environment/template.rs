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

//! Parsed templates and the loader that supplies them

use super::Environment;
use crate::ast::{Element, MacroDefinition};
use crate::error::{RenderError, SettingError, TemplateError, TemplateResult};
use crate::model::Value;
use crate::settings::{Configuration, Settings, TemplateConfiguration};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// A parsed template bound to a configuration
pub struct Template {
    name: String,
    root: Arc<dyn Element>,
    settings: Arc<Settings>,
    configuration: Arc<Configuration>,
    macros: Vec<Arc<MacroDefinition>>,
    default_node_namespace: Option<String>,
    node_prefixes: IndexMap<String, String>,
}

impl Template {
    /// Create a template whose settings inherit from the configuration
    pub fn new(name: impl Into<String>, root: Arc<dyn Element>, configuration: &Arc<Configuration>) -> Self {
        let mut macros = Vec::new();
        root.collect_macros(&mut macros);
        Self {
            name: name.into(),
            root,
            settings: Arc::new(Settings::with_parent(configuration.settings().clone())),
            configuration: configuration.clone(),
            macros,
            default_node_namespace: None,
            node_prefixes: IndexMap::new(),
        }
    }

    /// Template name, as used for relative name resolution
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The root element
    pub fn root(&self) -> &Arc<dyn Element> {
        &self.root
    }

    /// Template level settings
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Mutable template level settings, for use before the template is shared
    pub fn settings_mut(&mut self) -> &mut Settings {
        Arc::make_mut(&mut self.settings)
    }

    /// Assign a template level setting by name
    pub fn set_setting(&mut self, name: &str, value: &str) -> Result<(), SettingError> {
        self.settings_mut().set_setting(name, value)
    }

    /// Apply a template configuration on top of the current settings
    pub fn apply_configuration(&mut self, template_configuration: &TemplateConfiguration) {
        template_configuration.apply(self.settings_mut());
    }

    /// The owning configuration
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Macro and function definitions of the template
    pub fn macros(&self) -> &[Arc<MacroDefinition>] {
        &self.macros
    }

    /// Node namespace URI whose elements are matched by bare local name
    pub fn set_default_node_namespace(&mut self, uri: impl Into<String>) {
        self.default_node_namespace = Some(uri.into());
    }

    /// Map a handler prefix to a node namespace URI; handlers for such nodes
    /// are named `prefix:local_name`
    pub fn add_node_namespace_prefix(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.node_prefixes.insert(prefix.into(), uri.into());
    }

    /// Name a node handler has in this template
    ///
    /// Nodes without a namespace match bare names, or `N:name` when a
    /// default namespace is declared. Nodes in the default namespace match
    /// bare names; other namespaces need a declared prefix.
    pub(crate) fn node_handler_name(&self, local_name: &str, node_namespace: Option<&str>) -> Option<String> {
        match node_namespace.filter(|uri| !uri.is_empty()) {
            None => match self.default_node_namespace {
                None => Some(local_name.to_string()),
                Some(_) => Some(format!("N:{local_name}")),
            },
            Some(uri) if self.default_node_namespace.as_deref() == Some(uri) => {
                Some(local_name.to_string())
            }
            Some(uri) => self
                .node_prefixes
                .iter()
                .find(|(_, mapped)| mapped.as_str() == uri)
                .map(|(prefix, _)| format!("{prefix}:{local_name}")),
        }
    }

    /// An environment that renders this template into `out`
    pub fn create_environment<'w>(
        self: &Arc<Self>,
        data_model: Option<Value>,
        out: impl Write + 'w,
    ) -> Environment<'w> {
        Environment::new(self.clone(), data_model, out)
    }

    /// Render the template into `out`
    pub fn process(self: &Arc<Self>, data_model: Option<Value>, out: impl Write) -> Result<(), RenderError> {
        self.create_environment(data_model, out).process()
    }

    /// Render the template into a string
    pub fn render_to_string(self: &Arc<Self>, data_model: Option<Value>) -> Result<String, RenderError> {
        let mut buffer = Vec::new();
        self.process(data_model, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("macros", &self.macros.len())
            .finish()
    }
}

/// Supplies already-parsed templates by name
pub trait TemplateLoader: Send + Sync {
    /// Root element of the named template
    fn load(&self, name: &str) -> Option<Arc<dyn Element>>;

    /// Template level settings for the named template
    fn template_configuration(&self, _name: &str) -> Option<TemplateConfiguration> {
        None
    }
}

/// In-memory loader
#[derive(Default)]
pub struct MapTemplateLoader {
    templates: RwLock<IndexMap<String, (Arc<dyn Element>, Option<TemplateConfiguration>)>>,
}

impl MapTemplateLoader {
    /// Empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template
    pub fn put(&self, name: impl Into<String>, root: Arc<dyn Element>) {
        self.templates.write().insert(name.into(), (root, None));
    }

    /// Add or replace a template with its own settings
    pub fn put_with_configuration(
        &self,
        name: impl Into<String>,
        root: Arc<dyn Element>,
        template_configuration: TemplateConfiguration,
    ) {
        self.templates
            .write()
            .insert(name.into(), (root, Some(template_configuration)));
    }

    /// Remove a template
    pub fn remove(&self, name: &str) -> bool {
        self.templates.write().shift_remove(name).is_some()
    }
}

impl TemplateLoader for MapTemplateLoader {
    fn load(&self, name: &str) -> Option<Arc<dyn Element>> {
        self.templates.read().get(name).map(|(root, _)| root.clone())
    }

    fn template_configuration(&self, name: &str) -> Option<TemplateConfiguration> {
        self.templates.read().get(name).and_then(|(_, tc)| tc.clone())
    }
}

impl fmt::Debug for MapTemplateLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapTemplateLoader")
            .field("templates", &self.templates.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolve `target` relative to the template named `base`
///
/// Absolute names start with `/`. Relative names are resolved against the
/// directory of `base`; `.` and `..` segments are normalized, and climbing
/// above the root is an error.
pub fn resolve_template_name(base: Option<&str>, target: &str) -> TemplateResult<String> {
    let joined = if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else {
        match base.and_then(|b| b.rfind('/').map(|i| &b[..=i])) {
            Some(directory) => format!("{directory}{target}"),
            None => target.to_string(),
        }
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(TemplateError::TemplateNotFound {
                        name: format!("{target} (the path goes above the root)"),
                    });
                }
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Text;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(None, "a.ftl", "a.ftl")]
    #[case(Some("lib/main.ftl"), "util.ftl", "lib/util.ftl")]
    #[case(Some("lib/main.ftl"), "/util.ftl", "util.ftl")]
    #[case(Some("lib/sub/main.ftl"), "../x.ftl", "lib/x.ftl")]
    #[case(Some("lib/main.ftl"), "./y.ftl", "lib/y.ftl")]
    fn test_resolve_template_name(#[case] base: Option<&str>, #[case] target: &str, #[case] expected: &str) {
        assert_eq!(resolve_template_name(base, target).unwrap(), expected);
    }

    #[test]
    fn test_resolve_above_root_fails() {
        assert!(resolve_template_name(Some("main.ftl"), "../x.ftl").is_err());
    }

    #[test]
    fn test_node_handler_names() {
        let configuration = Arc::new(Configuration::default());
        let mut template = Template::new("t", Arc::new(Text::new("")), &configuration);
        assert_eq!(template.node_handler_name("p", None), Some("p".to_string()));
        assert_eq!(template.node_handler_name("p", Some("urn:x")), None);

        template.add_node_namespace_prefix("x", "urn:x");
        template.set_default_node_namespace("urn:d");
        assert_eq!(template.node_handler_name("p", Some("urn:x")), Some("x:p".to_string()));
        assert_eq!(template.node_handler_name("p", Some("urn:d")), Some("p".to_string()));
        assert_eq!(template.node_handler_name("p", None), Some("N:p".to_string()));
    }

    #[test]
    fn test_map_loader() {
        let loader = MapTemplateLoader::new();
        loader.put("a", Arc::new(Text::new("A")));
        assert!(loader.load("a").is_some());
        assert!(loader.load("b").is_none());
        assert!(loader.remove("a"));
    }
}
