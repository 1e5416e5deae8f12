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

//! Lazy evaluation for sequence operations
//!
//! `?filter`, `?map`, `?take_while` and `?drop_while` share one iterator,
//! [`TransformingIterator`]. It pulls from the source iterator and keeps at
//! most one element of lookahead, so `has_next` can be answered without
//! consuming anything. The eager form of these built-ins drains the very same
//! iterator into a sequence, which keeps the lazy and eager results identical.

use super::types::optional_type_description;
use super::value::{CollectionModel, Model, Value, ValueIterator};
use crate::environment::Environment;
use crate::error::{EvalResult, TemplateError};
use crate::registry::ElementTransformer;

/// Which sequence operation an iterator performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOperation {
    /// Keep items for which the predicate is true
    Filter,
    /// Replace each item by the transform result
    Map,
    /// Keep items until the predicate is false for the first time
    TakeWhile,
    /// Skip items until the predicate is false for the first time
    DropWhile,
}

/// Pull-based iterator with one element of lookahead
pub struct TransformingIterator {
    source: Box<dyn ValueIterator>,
    operation: SequenceOperation,
    transformer: ElementTransformer,
    builtin: String,
    lookahead: Option<Option<Value>>,
    dropping: bool,
    exhausted: bool,
    index: usize,
}

impl TransformingIterator {
    /// Create an iterator over `source`
    pub fn new(
        source: Box<dyn ValueIterator>,
        operation: SequenceOperation,
        transformer: ElementTransformer,
        builtin: impl Into<String>,
    ) -> Self {
        Self {
            source,
            operation,
            transformer,
            builtin: builtin.into(),
            lookahead: None,
            dropping: operation == SequenceOperation::DropWhile,
            exhausted: false,
            index: 0,
        }
    }

    /// Drain the remaining items
    pub fn drain(mut self, env: &mut Environment<'_>) -> EvalResult<Vec<Option<Value>>> {
        let mut items = Vec::new();
        while self.has_next(env)? {
            items.push(self.next(env)?);
        }
        Ok(items)
    }

    fn fetch(&mut self, env: &mut Environment<'_>) -> EvalResult<Option<Option<Value>>> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            if !self.source.has_next(env)? {
                self.exhausted = true;
                return Ok(None);
            }
            let item = self.source.next(env)?;
            let index = self.index;
            self.index += 1;

            match self.operation {
                SequenceOperation::Map => {
                    return match self.transformer.apply(env, item)? {
                        Some(mapped) => Ok(Some(Some(mapped))),
                        None => Err(TemplateError::invalid_reference(format!(
                            "the result of the element transformer ({}) of ?{} for the item at index {}",
                            self.transformer.description(),
                            self.builtin,
                            index
                        ))
                        .into()),
                    };
                }
                SequenceOperation::Filter => {
                    if self.test(env, &item, index)? {
                        return Ok(Some(item));
                    }
                }
                SequenceOperation::TakeWhile => {
                    if self.test(env, &item, index)? {
                        return Ok(Some(item));
                    }
                    self.exhausted = true;
                    return Ok(None);
                }
                SequenceOperation::DropWhile => {
                    if self.dropping && self.test(env, &item, index)? {
                        continue;
                    }
                    self.dropping = false;
                    return Ok(Some(item));
                }
            }
        }
    }

    fn test(
        &self,
        env: &mut Environment<'_>,
        item: &Option<Value>,
        index: usize,
    ) -> EvalResult<bool> {
        let result = self.transformer.apply(env, item.clone())?;
        match result.as_ref().and_then(Value::boolean_value) {
            Some(b) => Ok(b),
            None => Err(TemplateError::type_mismatch(format!(
                "?{} expects the element predicate ({}) to return a boolean, but it returned {} for the item at index {}.",
                self.builtin,
                self.transformer.description(),
                optional_type_description(result.as_ref()),
                index
            ))
            .into()),
        }
    }
}

impl ValueIterator for TransformingIterator {
    fn has_next(&mut self, env: &mut Environment<'_>) -> EvalResult<bool> {
        if self.lookahead.is_none() {
            self.lookahead = self.fetch(env)?;
        }
        Ok(self.lookahead.is_some())
    }

    fn next(&mut self, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        match self.lookahead.take() {
            Some(item) => Ok(item),
            None => Ok(self.fetch(env)?.flatten()),
        }
    }
}

/// A collection whose items are produced on demand
///
/// Each call to `iterator` starts over from the source value.
pub struct LazySequence {
    source: Value,
    operation: SequenceOperation,
    transformer: ElementTransformer,
    builtin: String,
}

impl LazySequence {
    /// Create a lazy collection over an iterable `source`
    pub fn new(
        source: Value,
        operation: SequenceOperation,
        transformer: ElementTransformer,
        builtin: impl Into<String>,
    ) -> Self {
        Self {
            source,
            operation,
            transformer,
            builtin: builtin.into(),
        }
    }
}

impl Model for LazySequence {
    fn as_collection(&self) -> Option<&dyn CollectionModel> {
        Some(self)
    }
}

impl CollectionModel for LazySequence {
    fn iterator(&self) -> Box<dyn ValueIterator> {
        let source = self.source.iterate().unwrap_or_else(|| Box::new(EmptyIterator));
        Box::new(TransformingIterator::new(
            source,
            self.operation,
            self.transformer.clone(),
            self.builtin.clone(),
        ))
    }
}

/// Iterator without items
pub struct EmptyIterator;

impl ValueIterator for EmptyIterator {
    fn has_next(&mut self, _env: &mut Environment<'_>) -> EvalResult<bool> {
        Ok(false)
    }

    fn next(&mut self, _env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        Ok(None)
    }
}
