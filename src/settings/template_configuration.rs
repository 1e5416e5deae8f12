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

//! Per-template setting overrides

use super::Settings;
use crate::error::SettingError;

/// Settings to apply on top of a template's own settings
///
/// Typically chosen by template name (all `*.html` templates get
/// `html_debug`, say) and applied when the template is loaded. Only what is
/// explicitly set here is applied, and only where the template has not set
/// it itself.
#[derive(Debug, Clone, Default)]
pub struct TemplateConfiguration {
    settings: Settings,
}

impl TemplateConfiguration {
    /// An empty override set
    pub fn new() -> Self {
        Self::default()
    }

    /// The overrides
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The overrides, for modification
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Assign an override from its textual form
    pub fn set_setting(&mut self, name: &str, value: &str) -> Result<(), SettingError> {
        self.settings.set_setting(name, value)
    }

    /// Apply the overrides to a template's settings
    pub fn apply(&self, target: &mut Settings) {
        target.merge_from(&self.settings);
    }

    /// Combine with an override set that takes precedence over this one
    pub fn merge(&mut self, other: &TemplateConfiguration) {
        let mut merged = other.settings.clone();
        merged.merge_from(&self.settings);
        self.settings = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_keeps_template_values() {
        let mut overrides = TemplateConfiguration::new();
        overrides.set_setting("number_format", "0.0").unwrap();
        overrides.set_setting("locale", "de_DE").unwrap();

        let mut template_settings = Settings::new();
        template_settings.set_setting("locale", "fr_FR").unwrap();
        overrides.apply(&mut template_settings);

        assert_eq!(template_settings.number_format(), "0.0");
        assert_eq!(template_settings.locale().language(), "fr");
    }

    #[test]
    fn test_later_override_wins() {
        let mut first = TemplateConfiguration::new();
        first.set_setting("number_format", "0.0").unwrap();
        first.set_setting("auto_include", "a.ftl").unwrap();
        let mut second = TemplateConfiguration::new();
        second.set_setting("number_format", "0.00").unwrap();
        second.set_setting("auto_include", "b.ftl").unwrap();

        first.merge(&second);
        assert_eq!(first.settings().number_format(), "0.00");
        assert_eq!(
            first.settings().auto_includes(),
            &vec!["a.ftl".to_string(), "b.ftl".to_string()]
        );
    }
}
