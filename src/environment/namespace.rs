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

//! Variable namespaces

use super::template::Template;
use crate::model::{HashExModel, HashModel, Model, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A named set of variables
///
/// Every render has a main and a global namespace, plus one per imported
/// library. Templates see a namespace as a hash; `#assign` writes into the
/// current one.
pub struct Namespace {
    variables: RwLock<IndexMap<String, Value>>,
    template: Option<Arc<Template>>,
    pending_init: AtomicBool,
}

impl Namespace {
    /// An empty namespace not tied to a template
    pub fn new() -> Self {
        Self {
            variables: RwLock::new(IndexMap::new()),
            template: None,
            pending_init: AtomicBool::new(false),
        }
    }

    /// The namespace of a template
    pub(crate) fn for_template(template: Arc<Template>) -> Self {
        Self {
            template: Some(template),
            ..Self::new()
        }
    }

    /// The template that populates this namespace
    pub fn template(&self) -> Option<&Arc<Template>> {
        self.template.as_ref()
    }

    /// Look a variable up
    pub fn get(&self, name: &str) -> Option<Value> {
        self.variables.read().get(name).cloned()
    }

    /// Set a variable
    pub fn set(&self, name: &str, value: Value) {
        self.variables.write().insert(name.to_string(), value);
    }

    /// Remove a variable
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.variables.write().shift_remove(name)
    }

    /// Whether a variable is defined
    pub fn contains(&self, name: &str) -> bool {
        self.variables.read().contains_key(name)
    }

    /// Variable names in definition order
    pub fn names(&self) -> Vec<String> {
        self.variables.read().keys().cloned().collect()
    }

    /// Whether the library still has to run before its variables are usable
    pub fn is_pending(&self) -> bool {
        self.pending_init.load(Ordering::Acquire)
    }

    pub(crate) fn mark_pending(&self) {
        self.pending_init.store(true, Ordering::Release);
    }

    /// Clear the pending flag; true if it was set
    pub(crate) fn take_pending(&self) -> bool {
        self.pending_init.swap(false, Ordering::AcqRel)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("template", &self.template.as_ref().map(|t| t.name().to_string()))
            .field("variables", &self.names())
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl Model for Namespace {
    fn as_hash(&self) -> Option<&dyn HashModel> {
        Some(self)
    }

    fn as_hash_ex(&self) -> Option<&dyn HashExModel> {
        Some(self)
    }

    fn as_namespace(&self) -> Option<&Namespace> {
        Some(self)
    }
}

impl HashModel for Namespace {
    fn get(&self, key: &str) -> Option<Value> {
        Namespace::get(self, key)
    }
}

impl HashExModel for Namespace {
    fn keys(&self) -> Vec<String> {
        self.names()
    }

    fn values(&self) -> Vec<Value> {
        self.variables.read().values().cloned().collect()
    }

    fn size(&self) -> usize {
        self.variables.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_namespace_as_hash() {
        let namespace = Namespace::new();
        namespace.set("b", Value::from(2));
        namespace.set("a", Value::from(1));
        assert_eq!(namespace.names(), vec!["b".to_string(), "a".to_string()]);

        let value = Value::Object(Arc::new(namespace));
        let hash = value.as_hash_ex().unwrap();
        assert_eq!(hash.size(), 2);
        assert!(value.as_hash().unwrap().get("a").is_some());
    }

    #[test]
    fn test_pending_flag() {
        let namespace = Namespace::new();
        assert!(!namespace.take_pending());
        namespace.mark_pending();
        assert!(namespace.is_pending());
        assert!(namespace.take_pending());
        assert!(!namespace.is_pending());
    }
}
