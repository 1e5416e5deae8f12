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

//! Plain in-memory containers

use super::value::{
    CollectionModel, HashExModel, HashModel, Model, SequenceIterator, SequenceModel, Value,
    ValueIterator,
};
use indexmap::IndexMap;
use std::sync::Arc;

/// An immutable list that is both a sequence and a sized collection
#[derive(Debug, Clone, Default)]
pub struct SimpleSequence {
    items: Arc<[Option<Value>]>,
}

impl SimpleSequence {
    /// Sequence that may contain null items
    pub fn new(items: Vec<Option<Value>>) -> Self {
        Self {
            items: items.into(),
        }
    }

    /// Sequence of non-null items
    pub fn from_values(items: Vec<Value>) -> Self {
        Self::new(items.into_iter().map(Some).collect())
    }

    /// The items
    pub fn items(&self) -> &[Option<Value>] {
        &self.items
    }
}

impl Model for SimpleSequence {
    fn as_sequence(&self) -> Option<&dyn SequenceModel> {
        Some(self)
    }

    fn as_collection(&self) -> Option<&dyn CollectionModel> {
        Some(self)
    }
}

impl SequenceModel for SimpleSequence {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<Value> {
        self.items.get(index).cloned().flatten()
    }
}

impl CollectionModel for SimpleSequence {
    fn iterator(&self) -> Box<dyn ValueIterator> {
        Box::new(SequenceIterator::new(Arc::new(self.clone())))
    }

    fn size(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

/// An immutable hash with ordered keys
#[derive(Debug, Clone, Default)]
pub struct SimpleHash {
    entries: Arc<IndexMap<String, Value>>,
    listable: bool,
}

impl SimpleHash {
    /// Extended hash: keys can be listed
    pub fn new(entries: IndexMap<String, Value>) -> Self {
        Self {
            entries: Arc::new(entries),
            listable: true,
        }
    }

    /// Plain hash: only key lookup is exposed
    pub fn lookup_only(entries: IndexMap<String, Value>) -> Self {
        Self {
            entries: Arc::new(entries),
            listable: false,
        }
    }

    /// The entries
    pub fn entries(&self) -> &IndexMap<String, Value> {
        &self.entries
    }
}

impl Model for SimpleHash {
    fn as_hash(&self) -> Option<&dyn HashModel> {
        Some(self)
    }

    fn as_hash_ex(&self) -> Option<&dyn HashExModel> {
        if self.listable { Some(self) } else { None }
    }
}

impl HashModel for SimpleHash {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }
}

impl HashExModel for SimpleHash {
    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn values(&self) -> Vec<Value> {
        self.entries.values().cloned().collect()
    }

    fn size(&self) -> usize {
        self.entries.len()
    }
}
