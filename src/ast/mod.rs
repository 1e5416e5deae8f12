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

//! Template tree definitions
//!
//! Templates reach the runtime already parsed. A template is a tree of
//! [`Element`]s (instructions that write output or change state) that
//! contain [`Expression`]s (computations that produce values). Both are
//! trait objects, so hosts can contribute their own node kinds next to the
//! ones defined here.

#![warn(missing_docs)]

mod element;
mod expression;

pub use element::*;
pub use expression::*;

use crate::environment::Environment;
use crate::error::EvalResult;
use crate::model::Value;
use std::fmt;
use std::sync::Arc;

/// Where a node was written in its template
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Name of the template
    pub template_name: Option<String>,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
}

impl SourceLocation {
    /// Location in a named template
    pub fn new(template_name: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            template_name: Some(template_name.into()),
            line,
            column,
        }
    }

    /// Location in a template without a name
    pub fn point(line: usize, column: usize) -> Self {
        Self {
            template_name: None,
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.template_name {
            Some(name) => write!(
                f,
                "in template \"{name}\" at line {}, column {}",
                self.line, self.column
            ),
            None => write!(f, "at line {}, column {}", self.line, self.column),
        }
    }
}

/// Child elements to visit after an element has accepted the environment,
/// each with a flag telling whether it replaces its parent on the
/// instruction stack
pub type Children = Vec<(Arc<dyn Element>, bool)>;

/// A template instruction
pub trait Element: Send + Sync + fmt::Debug {
    /// Execute the element
    ///
    /// Returns the children the environment should visit next, in order.
    /// Elements that drive their own children (loops, attempt blocks, macro
    /// calls) visit them through the environment and return `None`.
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>>;

    /// Short description for the instruction stack
    fn description(&self) -> String;

    /// Where the element was written
    fn location(&self) -> Option<&SourceLocation> {
        None
    }

    /// Collect the macro and function definitions in this subtree
    ///
    /// Definitions become visible in a namespace before the template that
    /// contains them starts running.
    fn collect_macros(&self, _out: &mut Vec<Arc<MacroDefinition>>) {}
}

/// A template expression
pub trait Expression: Send + Sync + fmt::Debug {
    /// Evaluate; `None` is a missing value
    fn eval(&self, env: &mut Environment<'_>) -> EvalResult<Option<Value>>;

    /// The expression as it would be written in a template
    fn canonical_form(&self) -> String;

    /// Where the expression was written
    fn location(&self) -> Option<&SourceLocation> {
        None
    }
}

/// String literal quoting used by canonical forms
pub(crate) fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_location_display() {
        assert_eq!(
            SourceLocation::new("main.ftl", 3, 7).to_string(),
            "in template \"main.ftl\" at line 3, column 7"
        );
        assert_eq!(SourceLocation::point(1, 2).to_string(), "at line 1, column 2");
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }
}
