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

//! Policies for `?new`

use rustc_hash::FxHashSet;
use std::fmt;

/// Decides which classes `?new` may instantiate
pub trait ClassResolver: Send + Sync + fmt::Debug {
    /// `Err` carries the reason for refusing
    fn check(&self, class_name: &str, template_name: Option<&str>) -> Result<(), String>;
}

/// Allows every registered class
#[derive(Debug, Clone, Copy, Default)]
pub struct UnrestrictedResolver;

impl ClassResolver for UnrestrictedResolver {
    fn check(&self, _class_name: &str, _template_name: Option<&str>) -> Result<(), String> {
        Ok(())
    }
}

/// Allows nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowsNothingResolver;

impl ClassResolver for AllowsNothingResolver {
    fn check(&self, _class_name: &str, _template_name: Option<&str>) -> Result<(), String> {
        Err("?new is disabled by the configuration".to_string())
    }
}

/// Allows listed classes everywhere, and any class in trusted templates
///
/// A trusted template name ending with `*` matches every template whose name
/// starts with the part before the `*`.
#[derive(Debug, Clone, Default)]
pub struct OptInResolver {
    allowed_classes: FxHashSet<String>,
    trusted_templates: FxHashSet<String>,
    trusted_template_prefixes: Vec<String>,
}

impl OptInResolver {
    /// Create a resolver from class and template name lists
    pub fn new(allowed_classes: Vec<String>, trusted_templates: Vec<String>) -> Self {
        let mut resolver = Self {
            allowed_classes: allowed_classes.into_iter().collect(),
            ..Self::default()
        };
        for name in trusted_templates {
            let name = normalize_template_name(&name).to_string();
            match name.strip_suffix('*') {
                Some(prefix) => resolver.trusted_template_prefixes.push(prefix.to_string()),
                None => {
                    resolver.trusted_templates.insert(name);
                }
            }
        }
        resolver
    }

    fn is_trusted(&self, template_name: &str) -> bool {
        let name = normalize_template_name(template_name);
        self.trusted_templates.contains(name)
            || self
                .trusted_template_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

fn normalize_template_name(name: &str) -> &str {
    name.trim_start_matches('/')
}

impl ClassResolver for OptInResolver {
    fn check(&self, class_name: &str, template_name: Option<&str>) -> Result<(), String> {
        if self.allowed_classes.contains(class_name) {
            return Ok(());
        }
        if template_name.is_some_and(|name| self.is_trusted(name)) {
            return Ok(());
        }
        Err(format!(
            "neither the class is in the allowed_classes list, nor the template {} is trusted",
            template_name.map_or_else(|| "(unnamed)".to_string(), |n| format!("\"{n}\""))
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_in() {
        let resolver = OptInResolver::new(
            vec!["Safe".to_string()],
            vec!["lib/*".to_string(), "/admin.ftl".to_string()],
        );
        assert!(resolver.check("Safe", Some("any.ftl")).is_ok());
        assert!(resolver.check("Other", Some("lib/x.ftl")).is_ok());
        assert!(resolver.check("Other", Some("/admin.ftl")).is_ok());
        assert!(resolver.check("Other", Some("user.ftl")).is_err());
        assert!(resolver.check("Other", None).is_err());
    }

    #[test]
    fn test_fixed_policies() {
        assert!(UnrestrictedResolver.check("X", None).is_ok());
        assert!(AllowsNothingResolver.check("X", Some("a")).is_err());
    }
}
