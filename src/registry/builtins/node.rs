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

//! Node built-ins

use super::super::{BuiltIn, BuiltInCall, BuiltInRegistry};
use crate::environment::Environment;
use crate::error::EvalResult;
use crate::model::{NodeModel, Value};
use std::sync::Arc;

pub(super) fn register(registry: &mut BuiltInRegistry) {
    registry.register("node_name", on_node(|n| Some(Value::from(n.node_name()))));
    registry.register("node_type", on_node(|n| n.node_type().map(Value::from)));
    registry.register("node_namespace", on_node(|n| n.node_namespace().map(Value::from)));
    registry.register("parent", on_node(|n| n.parent().map(Value::Node)));
    registry.register("children", on_node(children));
    registry.register("root", on_node(root));
}

fn on_node(f: fn(&Arc<dyn NodeModel>) -> Option<Value>) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let value = call.target_value(env)?;
        match value.as_node() {
            Some(node) => Ok(f(node)),
            None => Err(call.unexpected_type(&value, "node").into()),
        }
    }
}

fn children(node: &Arc<dyn NodeModel>) -> Option<Value> {
    Some(Value::sequence(node.children().into_iter().map(Value::Node).collect()))
}

fn root(node: &Arc<dyn NodeModel>) -> Option<Value> {
    let mut current = node.clone();
    while let Some(parent) = current.parent() {
        current = parent;
    }
    Some(Value::Node(current))
}
