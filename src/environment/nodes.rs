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

//! Node handler resolution for `#visit`, `#recurse` and `#fallback`

use super::{Environment, Namespace};
use crate::error::{EvalResult, TemplateError};
use crate::model::{node_types, type_description, CallArgs, Callable, DirectiveModel, NodeModel, Value};
use std::sync::Arc;

/// The node being handled and where its handler was found
pub(crate) struct NodeState {
    pub(crate) node: Arc<dyn NodeModel>,
    namespaces: Vec<Arc<Namespace>>,
    // index after the namespace of the running handler
    next_index: usize,
}

impl Environment<'_> {
    /// Namespaces named by a `using` clause
    ///
    /// Accepts a namespace, a template name (imported without binding a
    /// variable), or a sequence of those.
    pub fn node_namespaces(&mut self, value: &Value) -> EvalResult<Vec<Arc<Namespace>>> {
        match value.as_sequence() {
            Some(sequence) if !is_namespace(value) => {
                let mut namespaces = Vec::with_capacity(sequence.len());
                for index in 0..sequence.len() {
                    let Some(item) = sequence.get(index) else {
                        return Err(TemplateError::invalid_reference(format!(
                            "item {index} of the namespace list"
                        ))
                        .into());
                    };
                    namespaces.push(self.node_namespace(&item)?);
                }
                Ok(namespaces)
            }
            _ => Ok(vec![self.node_namespace(value)?]),
        }
    }

    fn node_namespace(&mut self, value: &Value) -> EvalResult<Arc<Namespace>> {
        if let Value::Object(model) = value {
            if let Some(namespace) = model.as_namespace() {
                return self.known_namespace(namespace).ok_or_else(|| {
                    TemplateError::evaluation(
                        "The namespace doesn't belong to this render, so it can't be used for node handlers.",
                    )
                    .into()
                });
            }
        }
        match value.string_value() {
            Some(name) => {
                let name = name.into_owned();
                self.load_lib(&name, None)
            }
            None => Err(TemplateError::type_mismatch(format!(
                "Expected a namespace or a template name, but this has evaluated to {}.",
                type_description(value)
            ))
            .into()),
        }
    }

    fn known_namespace(&self, namespace: &Namespace) -> Option<Arc<Namespace>> {
        [&self.main_namespace, &self.global_namespace, &self.current_namespace]
            .into_iter()
            .chain(self.loaded_libs.values())
            .find(|candidate| std::ptr::eq(candidate.as_ref(), namespace))
            .cloned()
    }

    /// `#visit`: run the handler of `node`
    ///
    /// Without `namespaces` the namespaces of the enclosing node handler are
    /// searched, or the current namespace at the top level.
    pub fn invoke_node_handler(
        &mut self,
        node: Arc<dyn NodeModel>,
        namespaces: Option<Vec<Arc<Namespace>>>,
    ) -> EvalResult<()> {
        let namespaces = match namespaces {
            Some(namespaces) => namespaces,
            None => match &self.node_state {
                Some(state) => state.namespaces.clone(),
                None => vec![self.current_namespace.clone()],
            },
        };
        let saved = self.node_state.replace(NodeState {
            node: node.clone(),
            namespaces,
            next_index: 0,
        });
        let result = match self.find_node_handler(node.as_ref(), 0) {
            Ok(Some((handler, index))) => self.run_node_handler(handler, index),
            Ok(None) => self.default_node_handling(node.as_ref()),
            Err(error) => Err(error),
        };
        self.node_state = saved;
        result
    }

    /// `#recurse`: visit the children of `node`, or of the current node
    pub fn recurse(
        &mut self,
        node: Option<Arc<dyn NodeModel>>,
        namespaces: Option<Vec<Arc<Namespace>>>,
    ) -> EvalResult<()> {
        let Some(node) = node.or_else(|| self.current_node()) else {
            return Err(TemplateError::evaluation(
                "#recurse without a node argument can only be used inside a node handler.",
            )
            .into());
        };
        for child in node.children() {
            self.invoke_node_handler(child, namespaces.clone())?;
        }
        Ok(())
    }

    /// `#fallback`: run the next handler of the current node
    ///
    /// The search continues after the namespace of the running handler.
    /// When there is none, nothing happens.
    pub fn fallback(&mut self) -> EvalResult<()> {
        let Some(state) = &self.node_state else {
            return Err(TemplateError::evaluation(
                "#fallback can only be used inside a node handler.",
            )
            .into());
        };
        let node = state.node.clone();
        let start = state.next_index;
        match self.find_node_handler(node.as_ref(), start)? {
            Some((handler, index)) => {
                let result = self.run_node_handler(handler, index);
                if let Some(state) = &mut self.node_state {
                    state.next_index = start;
                }
                result
            }
            None => Ok(()),
        }
    }

    fn run_node_handler(&mut self, handler: Arc<dyn DirectiveModel>, index: usize) -> EvalResult<()> {
        if let Some(state) = &mut self.node_state {
            state.next_index = index + 1;
        }
        handler.execute(self, CallArgs::none(), None)
    }

    /// First handler at or after `start`: by name in every namespace,
    /// then by `@node_type`
    fn find_node_handler(
        &mut self,
        node: &dyn NodeModel,
        start: usize,
    ) -> EvalResult<Option<(Arc<dyn DirectiveModel>, usize)>> {
        let namespaces = match &self.node_state {
            Some(state) => state.namespaces.clone(),
            None => return Ok(None),
        };
        let name = node.node_name();
        let node_namespace = node.node_namespace();
        for (index, namespace) in namespaces.iter().enumerate().skip(start) {
            self.initialize_if_pending(namespace)?;
            let key = match namespace.template() {
                Some(template) => template.node_handler_name(&name, node_namespace.as_deref()),
                None => node_namespace.is_none().then(|| name.clone()),
            };
            if let Some(handler) = key.and_then(|key| handler_in(namespace, &key)) {
                return Ok(Some((handler, index)));
            }
        }
        if let Some(node_type) = node.node_type() {
            let key = format!("@{node_type}");
            for (index, namespace) in namespaces.iter().enumerate().skip(start) {
                if let Some(handler) = handler_in(namespace, &key) {
                    return Ok(Some((handler, index)));
                }
            }
        }
        Ok(None)
    }

    fn default_node_handling(&mut self, node: &dyn NodeModel) -> EvalResult<()> {
        let node_type = node.node_type();
        match node_type.as_deref() {
            Some(node_types::TEXT) => {
                if let Some(text) = node.text() {
                    self.out.write_str(&text)?;
                }
                Ok(())
            }
            Some(node_types::DOCUMENT) => self.recurse(None, None),
            Some(node_types::PI | node_types::COMMENT | node_types::DOCUMENT_TYPE) => Ok(()),
            _ => Err(TemplateError::NoNodeHandler {
                node_name: node.node_name(),
                namespace: node.node_namespace(),
                node_type: node_type.unwrap_or_else(|| "default".to_string()),
            }
            .into()),
        }
    }
}

fn is_namespace(value: &Value) -> bool {
    matches!(value, Value::Object(model) if model.as_namespace().is_some())
}

/// Only directives and macros can handle nodes; other values are skipped
fn handler_in(namespace: &Namespace, key: &str) -> Option<Arc<dyn DirectiveModel>> {
    match namespace.get(key)?.as_callable()? {
        Callable::Directive(directive) => Some(directive),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{
        Block, BuiltInExpr, Element, Expression, Fallback, Interpolation, MacroDef,
        MacroDefinition, Recurse, SpecialVariable, Text, Variable, Visit,
    };
    use crate::environment::Template;
    use crate::model::{node_types, NodeModel, Value};
    use crate::settings::Configuration;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct TestNode {
        name: String,
        node_type: &'static str,
        text: Option<String>,
        children: Vec<Arc<dyn NodeModel>>,
    }

    impl NodeModel for TestNode {
        fn node_name(&self) -> String {
            self.name.clone()
        }

        fn node_type(&self) -> Option<String> {
            Some(self.node_type.to_string())
        }

        fn node_namespace(&self) -> Option<String> {
            None
        }

        fn parent(&self) -> Option<Arc<dyn NodeModel>> {
            None
        }

        fn children(&self) -> Vec<Arc<dyn NodeModel>> {
            self.children.clone()
        }

        fn text(&self) -> Option<String> {
            self.text.clone()
        }
    }

    fn element(name: &str, children: Vec<Arc<dyn NodeModel>>) -> Arc<dyn NodeModel> {
        Arc::new(TestNode {
            name: name.to_string(),
            node_type: node_types::ELEMENT,
            text: None,
            children,
        })
    }

    fn text(content: &str) -> Arc<dyn NodeModel> {
        Arc::new(TestNode {
            name: "#text".to_string(),
            node_type: node_types::TEXT,
            text: Some(content.to_string()),
            children: Vec::new(),
        })
    }

    fn document() -> Value {
        Value::Node(Arc::new(TestNode {
            name: "#document".to_string(),
            node_type: node_types::DOCUMENT,
            text: None,
            children: vec![element("doc", vec![element("title", vec![text("Hi")]), text("!")])],
        }))
    }

    fn handler(name: &str, body: Vec<Arc<dyn Element>>) -> Arc<dyn Element> {
        Arc::new(MacroDef::new(MacroDefinition::new(name, vec![], Arc::new(Block::new(body)))))
    }

    fn template(children: Vec<Arc<dyn Element>>) -> Arc<Template> {
        Arc::new(Configuration::default()).create_template("nodes.ftl", Arc::new(Block::new(children)))
    }

    fn visit_doc() -> Arc<dyn Element> {
        let doc: Arc<dyn Expression> = Arc::new(Variable::new("doc"));
        Arc::new(Visit::new(doc))
    }

    fn data() -> Value {
        Value::hash(indexmap::IndexMap::from([("doc".to_string(), document())]))
    }

    #[test]
    fn test_handlers_by_name_and_default_handling() {
        let out = template(vec![
            handler("doc", vec![Arc::new(Text::new("<doc>")), Arc::new(Recurse::new(None))]),
            handler("title", vec![
                Arc::new(Text::new("<h1>")),
                Arc::new(Recurse::new(None)),
                Arc::new(Text::new("</h1>")),
            ]),
            visit_doc(),
        ])
        .render_to_string(Some(data()))
        .unwrap();
        assert_eq!(out, "<doc><h1>Hi</h1>!");
    }

    #[test]
    fn test_type_handler_and_missing_handler() {
        let out = template(vec![
            handler("@element", vec![
                Arc::new(Text::new("[")),
                Arc::new(Interpolation::new(Arc::new(BuiltInExpr::new(
                    Arc::new(SpecialVariable::new(SpecialVariable::NODE)),
                    "node_name",
                )))),
                Arc::new(Recurse::new(None)),
                Arc::new(Text::new("]")),
            ]),
            visit_doc(),
        ])
        .render_to_string(Some(data()))
        .unwrap();
        assert_eq!(out, "[doc[titleHi]!]");

        let failed = template(vec![visit_doc()]).render_to_string(Some(data()));
        assert!(failed.unwrap_err().to_string().contains("\"doc\""));
    }

    #[test]
    fn test_fallback_without_next_handler_does_nothing() {
        let out = template(vec![
            handler("doc", vec![Arc::new(Text::new("a")), Arc::new(Fallback), Arc::new(Text::new("b"))]),
            visit_doc(),
        ])
        .render_to_string(Some(data()))
        .unwrap();
        assert_eq!(out, "ab");
    }
}
