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

//! The standard built-ins, one module per category

pub mod any;
pub mod date;
pub mod hash;
pub mod loop_var;
pub mod node;
pub mod number;
pub mod sequence;
pub mod string;

use super::BuiltInRegistry;

/// Register every standard built-in
pub fn register_all(registry: &mut BuiltInRegistry) {
    sequence::register(registry);
    hash::register(registry);
    loop_var::register(registry);
    string::register(registry);
    number::register(registry);
    date::register(registry);
    any::register(registry);
    node::register(registry);
}
