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

//! Node navigation capability for tree-structured input

use std::sync::Arc;

/// Node type names understood by the node handler resolution
pub mod node_types {
    /// Element node
    pub const ELEMENT: &str = "element";
    /// Text or CDATA node
    pub const TEXT: &str = "text";
    /// Document root
    pub const DOCUMENT: &str = "document";
    /// Processing instruction
    pub const PI: &str = "pi";
    /// Comment
    pub const COMMENT: &str = "comment";
    /// Document type declaration
    pub const DOCUMENT_TYPE: &str = "document_type";
    /// Attribute
    pub const ATTRIBUTE: &str = "attribute";
}

/// A node of a tree, as seen by the runtime
pub trait NodeModel: Send + Sync {
    /// Local name of the node
    fn node_name(&self) -> String;

    /// Node type, one of [`node_types`] or a host defined name
    fn node_type(&self) -> Option<String>;

    /// Namespace URI, `None` if the node is not in a namespace
    fn node_namespace(&self) -> Option<String>;

    /// Parent node
    fn parent(&self) -> Option<Arc<dyn NodeModel>>;

    /// Child nodes in document order
    fn children(&self) -> Vec<Arc<dyn NodeModel>>;

    /// Text content, used when a text node is written without a handler
    fn text(&self) -> Option<String> {
        None
    }
}
