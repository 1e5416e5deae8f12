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

//! Template language runtime in Rust
//!
//! The runtime core of a textual template language: a cascading settings
//! hierarchy, a capability based value model with coercion and comparison
//! rules, the postfix built-in dispatch table, and the per-render execution
//! environment that visits a parsed element tree and writes the output.
//!
//! Parsing is not part of this crate. Templates are assembled from the
//! element and expression nodes in [`ast`] (or from any other implementation
//! of the [`ast::Element`] and [`ast::Expression`] traits).

pub mod ast;
pub mod environment;
pub mod error;
pub mod eval;
pub mod format;
pub mod model;
pub mod registry;
pub mod settings;

// Re-export main types
pub use environment::{
    current_render, Environment, LoopPosition, MapTemplateLoader, Namespace, Output, Template,
    TemplateLoader,
};
pub use error::{
    EvalResult, FlowControl, HostError, Interrupt, RenderError, SettingError, TemplateError,
    TemplateException, TemplateResult,
};
pub use model::{Number, TemplateDate, Value};
pub use registry::BuiltInRegistry;
pub use settings::{Configuration, Settings, TemplateConfiguration, Version};
