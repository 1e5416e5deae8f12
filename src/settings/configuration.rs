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

//! The root of the settings hierarchy

use super::{ObjectFactories, ObjectFactory, Settings, Version};
use crate::ast::Element;
use crate::environment::{Template, TemplateLoader};
use crate::error::{SettingError, TemplateError, TemplateResult};
use crate::model::Value;
use crate::registry::{BuiltInBinding, BuiltInRegistry, NamingConvention};
use indexmap::IndexMap;
use log::debug;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Long-lived, shareable engine configuration
///
/// Build it, wrap it in an `Arc`, then create templates from it. Once
/// shared, the root settings are read-only: mutating accessors clone the
/// settings node first, so templates created earlier keep what they saw.
#[derive(Clone)]
pub struct Configuration {
    settings: Arc<Settings>,
    incompatible_improvements: Version,
    naming_convention: NamingConvention,
    builtins: Arc<BuiltInRegistry>,
    factories: Arc<ObjectFactories>,
    shared_variables: IndexMap<String, Value>,
    template_loader: Option<Arc<dyn TemplateLoader>>,
}

impl Configuration {
    /// Configuration emulating the behavior of `incompatible_improvements`
    pub fn new(incompatible_improvements: Version) -> Self {
        let factories = Arc::new(ObjectFactories::with_standard());
        let mut settings = Settings::new();
        settings.set_object_factories(factories.clone());
        Self {
            settings: Arc::new(settings),
            incompatible_improvements,
            naming_convention: NamingConvention::default(),
            builtins: BuiltInRegistry::shared(),
            factories,
            shared_variables: IndexMap::new(),
            template_loader: None,
        }
    }

    /// Root settings
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Root settings, for modification
    pub fn settings_mut(&mut self) -> &mut Settings {
        Arc::make_mut(&mut self.settings)
    }

    /// Assign a setting by name
    ///
    /// `incompatible_improvements` is accepted besides the settings every
    /// level has.
    pub fn set_setting(&mut self, name: &str, value: &str) -> Result<(), SettingError> {
        if name == "incompatible_improvements" || name == "incompatibleImprovements" {
            let version = value.parse().map_err(|cause| SettingError::Assignment {
                name: "incompatible_improvements".to_string(),
                value: value.to_string(),
                cause,
            })?;
            self.incompatible_improvements = version;
            return Ok(());
        }
        self.settings_mut().set_setting(name, value)
    }

    /// Assign settings from a name to value map, in key order
    pub fn set_settings<'a, I>(&mut self, settings: I) -> Result<(), SettingError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (name, value) in settings {
            self.set_setting(name, value)?;
        }
        Ok(())
    }

    /// Version whose behavior is emulated
    pub fn incompatible_improvements(&self) -> Version {
        self.incompatible_improvements
    }

    /// Change the emulated version
    pub fn set_incompatible_improvements(&mut self, version: Version) {
        self.incompatible_improvements = version;
    }

    /// Accepted built-in name spelling
    pub fn naming_convention(&self) -> NamingConvention {
        self.naming_convention
    }

    /// Change the accepted built-in name spelling
    pub fn set_naming_convention(&mut self, convention: NamingConvention) {
        self.naming_convention = convention;
    }

    /// The built-in registry
    pub fn builtins(&self) -> &Arc<BuiltInRegistry> {
        &self.builtins
    }

    /// Replace the built-in registry
    pub fn set_builtins(&mut self, registry: Arc<BuiltInRegistry>) {
        self.builtins = registry;
    }

    /// Bind a built-in for a use site
    pub fn bind_builtin(&self, name: &str) -> TemplateResult<BuiltInBinding> {
        self.builtins
            .lookup(name, self.naming_convention, self.incompatible_improvements)
    }

    /// Factories available to builder expressions and `?new`
    pub fn object_factories(&self) -> &ObjectFactories {
        &self.factories
    }

    /// Register a factory under a class name
    pub fn register_object_factory(&mut self, class_name: impl Into<String>, factory: impl ObjectFactory + 'static) {
        Arc::make_mut(&mut self.factories).register(class_name, factory);
        let factories = self.factories.clone();
        self.settings_mut().set_object_factories(factories);
    }

    /// A variable visible to every render, after the data model
    pub fn shared_variable(&self, name: &str) -> Option<&Value> {
        self.shared_variables.get(name)
    }

    /// Define a shared variable
    pub fn set_shared_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.shared_variables.insert(name.into(), value.into());
    }

    /// Define a shared variable from JSON, through the configured object wrapper
    pub fn set_shared_variable_json(&mut self, name: impl Into<String>, value: &JsonValue) {
        let name = name.into();
        match self.settings.object_wrapper().wrap(value) {
            Some(wrapped) => {
                self.shared_variables.insert(name, wrapped);
            }
            None => {
                self.shared_variables.shift_remove(&name);
            }
        }
    }

    /// Names of the shared variables
    pub fn shared_variable_names(&self) -> impl Iterator<Item = &str> {
        self.shared_variables.keys().map(String::as_str)
    }

    /// The template loader
    pub fn template_loader(&self) -> Option<&Arc<dyn TemplateLoader>> {
        self.template_loader.as_ref()
    }

    /// Set the template loader used for imports, includes and auto-imports
    pub fn set_template_loader(&mut self, loader: Arc<dyn TemplateLoader>) {
        self.template_loader = Some(loader);
    }

    /// Create a template from an already parsed tree
    pub fn create_template(self: &Arc<Self>, name: impl Into<String>, root: Arc<dyn Element>) -> Arc<Template> {
        Arc::new(Template::new(name, root, self))
    }

    /// Load a template through the template loader
    ///
    /// `name` must already be resolved; see
    /// [`crate::environment::resolve_template_name`].
    pub fn get_template(self: &Arc<Self>, name: &str) -> TemplateResult<Arc<Template>> {
        let Some(loader) = &self.template_loader else {
            return Err(TemplateError::TemplateNotFound {
                name: format!("{name} (no template loader is configured)"),
            });
        };
        let root = loader.load(name).ok_or_else(|| TemplateError::TemplateNotFound {
            name: name.to_string(),
        })?;
        let mut template = Template::new(name, root, self);
        if let Some(template_configuration) = loader.template_configuration(name) {
            template.apply_configuration(&template_configuration);
        }
        debug!("Loaded template {name}");
        Ok(Arc::new(template))
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(Version::default())
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("incompatible_improvements", &self.incompatible_improvements)
            .field("naming_convention", &self.naming_convention)
            .field("settings", &self.settings)
            .field("shared_variables", &self.shared_variables.keys().collect::<Vec<_>>())
            .field("has_template_loader", &self.template_loader.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Locale;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_shared_root_is_copied_on_write() {
        let mut configuration = Configuration::default();
        let before = configuration.settings().clone();
        configuration.set_setting("locale", "de_DE").unwrap();
        assert_eq!(before.locale(), &Locale::us());
        assert_eq!(configuration.settings().locale().to_string(), "de_DE");
    }

    #[test]
    fn test_incompatible_improvements_setting() {
        let mut configuration = Configuration::default();
        configuration
            .set_setting("incompatibleImprovements", "2.3.21")
            .unwrap();
        assert_eq!(configuration.incompatible_improvements(), Version::V2_3_21);
        assert!(configuration.set_setting("incompatible_improvements", "x").is_err());
    }

    #[test]
    fn test_bind_builtin_follows_naming_convention() {
        let mut configuration = Configuration::default();
        assert!(configuration.bind_builtin("upperCase").is_ok());
        configuration.set_naming_convention(NamingConvention::Legacy);
        assert!(configuration.bind_builtin("upperCase").is_err());
        assert!(configuration.bind_builtin("upper_case").is_ok());
    }

    #[test]
    fn test_shared_variables_from_json() {
        let mut configuration = Configuration::default();
        configuration.set_shared_variable_json("site", &serde_json::json!({"name": "x"}));
        assert!(configuration.shared_variable("site").unwrap().is_hash());
        configuration.set_shared_variable_json("site", &JsonValue::Null);
        assert!(configuration.shared_variable("site").is_none());
    }

    #[test]
    fn test_configuration_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Configuration>();
    }
}
