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

//! Template value types
//!
//! [`Value`] is the closed set of things an expression can evaluate to.
//! Scalars are carried inline. Containers and host objects are carried as
//! [`Model`] trait objects, which expose capability views; one object may
//! offer several views at once (a sequence that is also a hash, a date
//! parser that is also a function), and all dispatch goes through those
//! views rather than through a single kind tag.

use super::callable::Callable;
use super::date::{DateKind, TemplateDate};
use super::node::NodeModel;
use super::number::Number;
use super::simple::{SimpleHash, SimpleSequence};
use crate::environment::{Environment, Namespace};
use crate::error::{EvalResult, TemplateResult};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A value produced by evaluating an expression
#[derive(Clone)]
pub enum Value {
    /// Number
    Number(Number),
    /// String
    String(Arc<str>),
    /// Boolean
    Boolean(bool),
    /// Date, time or date-time
    Date(TemplateDate),
    /// Container or host object exposing capability views
    Object(Arc<dyn Model>),
    /// Directive, function or method
    Callable(Callable),
    /// Tree node
    Node(Arc<dyn NodeModel>),
}

/// Capability views of an object value
///
/// Every view defaults to "not supported". An implementation overrides the
/// views it offers.
pub trait Model: Send + Sync {
    /// String view
    fn as_scalar(&self) -> Option<&dyn ScalarModel> {
        None
    }

    /// Number view
    fn as_number(&self) -> Option<&dyn NumberModel> {
        None
    }

    /// Boolean view
    fn as_boolean(&self) -> Option<&dyn BooleanModel> {
        None
    }

    /// Date view
    fn as_date(&self) -> Option<&dyn DateModel> {
        None
    }

    /// Random access view
    fn as_sequence(&self) -> Option<&dyn SequenceModel> {
        None
    }

    /// Forward-only iteration view
    fn as_collection(&self) -> Option<&dyn CollectionModel> {
        None
    }

    /// Key lookup view
    fn as_hash(&self) -> Option<&dyn HashModel> {
        None
    }

    /// Key listing view (extended hash)
    fn as_hash_ex(&self) -> Option<&dyn HashExModel> {
        None
    }

    /// Callable view
    fn as_callable(&self) -> Option<Callable> {
        None
    }

    /// The value exposed through `?api`
    fn api(&self) -> Option<Value> {
        None
    }

    /// Runtime namespace behind this object, if it is one
    fn as_namespace(&self) -> Option<&Namespace> {
        None
    }
}

/// Something that can be read as a string
pub trait ScalarModel {
    /// The string value
    fn as_string(&self) -> String;
}

/// Something that can be read as a number
pub trait NumberModel {
    /// The numeric value
    fn as_number(&self) -> Number;
}

/// Something that can be read as a boolean
pub trait BooleanModel {
    /// The boolean value
    fn as_boolean(&self) -> bool;
}

/// Something that can be read as a date
pub trait DateModel {
    /// Sub-kind of the date
    fn date_kind(&self) -> DateKind;

    /// The date value; may fail for values that are produced on demand
    fn as_date(&self) -> TemplateResult<TemplateDate>;
}

/// Random access list
pub trait SequenceModel {
    /// Number of items
    fn len(&self) -> usize;

    /// Item at an index; `None` for out of range and for null items
    fn get(&self, index: usize) -> Option<Value>;

    /// Whether the sequence is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Forward-only collection
pub trait CollectionModel {
    /// A fresh iterator
    fn iterator(&self) -> Box<dyn ValueIterator>;

    /// Known size, when the collection is an extended one
    fn size(&self) -> Option<usize> {
        None
    }
}

/// Key lookup
pub trait HashModel {
    /// Value for a key; `None` when missing
    fn get(&self, key: &str) -> Option<Value>;
}

/// Key listing
pub trait HashExModel {
    /// Keys in iteration order
    fn keys(&self) -> Vec<String>;

    /// Values in iteration order
    fn values(&self) -> Vec<Value>;

    /// Number of entries
    fn size(&self) -> usize {
        self.keys().len()
    }
}

/// Pull-based iterator over values
///
/// `next` is only called after `has_next` answered true. A `None` item is a
/// null element of the underlying collection.
pub trait ValueIterator {
    /// Whether another item is available
    fn has_next(&mut self, env: &mut Environment<'_>) -> EvalResult<bool>;

    /// The next item
    fn next(&mut self, env: &mut Environment<'_>) -> EvalResult<Option<Value>>;
}

/// Iterates a sequence by index
pub(crate) struct SequenceIterator {
    model: Arc<dyn Model>,
    index: usize,
}

impl SequenceIterator {
    pub(crate) fn new(model: Arc<dyn Model>) -> Self {
        Self { model, index: 0 }
    }

    fn len(&self) -> usize {
        self.model.as_sequence().map_or(0, |s| s.len())
    }
}

impl ValueIterator for SequenceIterator {
    fn has_next(&mut self, _env: &mut Environment<'_>) -> EvalResult<bool> {
        Ok(self.index < self.len())
    }

    fn next(&mut self, _env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
        let item = self.model.as_sequence().and_then(|s| s.get(self.index));
        self.index += 1;
        Ok(item)
    }
}

impl Value {
    /// String value
    pub fn string(value: impl Into<Arc<str>>) -> Self {
        Value::String(value.into())
    }

    /// Sequence of non-null items
    pub fn sequence(items: Vec<Value>) -> Self {
        Value::Object(Arc::new(SimpleSequence::from_values(items)))
    }

    /// Hash with ordered keys
    pub fn hash(entries: IndexMap<String, Value>) -> Self {
        Value::Object(Arc::new(SimpleHash::new(entries)))
    }

    /// Whether the value has a string view
    pub fn is_string(&self) -> bool {
        match self {
            Value::String(_) => true,
            Value::Object(m) => m.as_scalar().is_some(),
            _ => false,
        }
    }

    /// Whether the value has a number view
    pub fn is_number(&self) -> bool {
        match self {
            Value::Number(_) => true,
            Value::Object(m) => m.as_number().is_some(),
            _ => false,
        }
    }

    /// Whether the value has a boolean view
    pub fn is_boolean(&self) -> bool {
        match self {
            Value::Boolean(_) => true,
            Value::Object(m) => m.as_boolean().is_some(),
            _ => false,
        }
    }

    /// Whether the value has a date view
    pub fn is_date(&self) -> bool {
        self.date_kind().is_some()
    }

    /// Whether the value is a random access sequence
    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Object(m) if m.as_sequence().is_some())
    }

    /// Whether the value can be iterated
    pub fn is_collection(&self) -> bool {
        matches!(self, Value::Object(m) if m.as_collection().is_some())
    }

    /// Whether the value supports key lookup
    pub fn is_hash(&self) -> bool {
        matches!(self, Value::Object(m) if m.as_hash().is_some())
    }

    /// Whether the value supports key listing
    pub fn is_hash_ex(&self) -> bool {
        matches!(self, Value::Object(m) if m.as_hash_ex().is_some())
    }

    /// Whether the value is a tree node
    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    /// String view
    pub fn string_value(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::String(s) => Some(Cow::Borrowed(s)),
            Value::Object(m) => m.as_scalar().map(|s| Cow::Owned(s.as_string())),
            _ => None,
        }
    }

    /// Number view
    pub fn number_value(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(n.clone()),
            Value::Object(m) => m.as_number().map(|n| n.as_number()),
            _ => None,
        }
    }

    /// Boolean view
    pub fn boolean_value(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Object(m) => m.as_boolean().map(|b| b.as_boolean()),
            _ => None,
        }
    }

    /// Date kind, when the value has a date view
    pub fn date_kind(&self) -> Option<DateKind> {
        match self {
            Value::Date(d) => Some(d.kind()),
            Value::Object(m) => m.as_date().map(|d| d.date_kind()),
            _ => None,
        }
    }

    /// Date view; `None` when the value is not date-like
    pub fn date_value(&self) -> Option<TemplateResult<TemplateDate>> {
        match self {
            Value::Date(d) => Some(Ok(d.clone())),
            Value::Object(m) => m.as_date().map(|d| d.as_date()),
            _ => None,
        }
    }

    /// Random access view
    pub fn as_sequence(&self) -> Option<&dyn SequenceModel> {
        match self {
            Value::Object(m) => m.as_sequence(),
            _ => None,
        }
    }

    /// Key lookup view
    pub fn as_hash(&self) -> Option<&dyn HashModel> {
        match self {
            Value::Object(m) => m.as_hash(),
            _ => None,
        }
    }

    /// Key listing view
    pub fn as_hash_ex(&self) -> Option<&dyn HashExModel> {
        match self {
            Value::Object(m) => m.as_hash_ex(),
            _ => None,
        }
    }

    /// Callable view
    pub fn as_callable(&self) -> Option<Callable> {
        match self {
            Value::Callable(c) => Some(c.clone()),
            Value::Object(m) => m.as_callable(),
            _ => None,
        }
    }

    /// Node view
    pub fn as_node(&self) -> Option<&Arc<dyn NodeModel>> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Whether the value can be iterated, either as a collection or a sequence
    pub fn is_iterable(&self) -> bool {
        matches!(self, Value::Object(m) if m.as_collection().is_some() || m.as_sequence().is_some())
    }

    /// A fresh iterator; collections are preferred over sequences
    pub fn iterate(&self) -> Option<Box<dyn ValueIterator>> {
        match self {
            Value::Object(m) => {
                if let Some(collection) = m.as_collection() {
                    Some(collection.iterator())
                } else if m.as_sequence().is_some() {
                    Some(Box::new(SequenceIterator::new(m.clone())))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// All items of an iterable value
    ///
    /// Sequences are copied without running an iterator; lazily generated
    /// collections are drained through the environment.
    pub fn collect_items(&self, env: &mut Environment<'_>) -> EvalResult<Option<Vec<Option<Value>>>> {
        if let Some(seq) = self.as_sequence() {
            return Ok(Some((0..seq.len()).map(|i| seq.get(i)).collect()));
        }
        let Some(mut iter) = self.iterate() else {
            return Ok(None);
        };
        let mut items = Vec::new();
        while iter.has_next(env)? {
            items.push(iter.next(env)?);
        }
        Ok(Some(items))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Date(d) => write!(f, "Date({:?}, {})", d.kind(), d.instant()),
            Value::Object(_) => write!(f, "Object({})", super::types::type_description(self)),
            Value::Callable(c) => write!(f, "Callable({})", c.kind_name()),
            Value::Node(n) => write!(f, "Node({})", n.node_name()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(Number::Integer(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(Number::Integer(i64::from(value)))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(Number::from(value))
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Value::Number(value)
    }
}

impl From<TemplateDate> for Value {
    fn from(value: TemplateDate) -> Self {
        Value::Date(value)
    }
}
