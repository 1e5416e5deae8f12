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

//! Value model for template evaluation

#![warn(missing_docs)]

pub mod callable;
pub mod date;
pub mod lazy;
pub mod node;
pub mod number;
pub mod simple;
pub mod types;
pub mod value;
pub mod wrapper;

pub use callable::{CallArgs, Callable, DirectiveModel, FunctionModel, MethodModel, NestedBody};
pub use date::{DateKind, TemplateDate};
pub use lazy::{EmptyIterator, LazySequence, SequenceOperation, TransformingIterator};
pub use node::{NodeModel, node_types};
pub use number::Number;
pub use simple::{SimpleHash, SimpleSequence};
pub use types::{optional_type_description, type_description, type_description_with_article};
pub use value::{
    BooleanModel, CollectionModel, DateModel, HashExModel, HashModel, Model, NumberModel,
    ScalarModel, SequenceModel, Value, ValueIterator,
};
pub use wrapper::{DefaultObjectWrapper, ObjectWrapper, RestrictedObjectWrapper};
