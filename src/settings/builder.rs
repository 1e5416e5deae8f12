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

//! Object builder expressions
//!
//! Settings whose values are objects (engines, handlers, format factories)
//! accept a small expression language when no keyword matches:
//!
//! ```text
//! ConservativeEngine
//! DefaultTruncateAlgorithm("...", add_space_at_word_boundary=false)
//! { "base": BaseNNumberFormatFactory, "epoch": EpochMillisDateFormatFactory() }
//! ```
//!
//! Class names are looked up in an [`ObjectFactories`] registry rather than
//! loaded dynamically, so only registered types can be created.

use super::handlers::{
    DebugHandler, HtmlDebugHandler, IgnoreHandler, LogErrorReporter, LogWarnReporter,
    RethrowHandler,
};
use super::resolver::{AllowsNothingResolver, UnrestrictedResolver};
use super::truncate::DefaultTruncateAlgorithm;
use super::{
    AttemptExceptionReporter, ClassResolver, TemplateExceptionHandler, TruncateAlgorithm,
};
use crate::eval::{ArithmeticEngine, BigDecimalEngine, ConservativeEngine};
use crate::format::{
    BaseNNumberFormatFactory, DateFormatFactory, EpochMillisDateFormatFactory,
    NumberFormatFactory,
};
use crate::model::{DefaultObjectWrapper, ObjectWrapper, RestrictedObjectWrapper};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

/// An object created by a factory
pub type BuiltObject = Arc<dyn Any + Send + Sync>;

/// A value in a builder expression
#[derive(Clone)]
pub enum BuilderValue {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Number literal
    Number(Decimal),
    /// Quoted string
    String(String),
    /// `[a, b]`
    List(Vec<BuilderValue>),
    /// `{k: v}`
    Map(IndexMap<String, BuilderValue>),
    /// Result of `ClassName(...)`
    Object {
        /// Class name as written
        class_name: String,
        /// The created object
        object: BuiltObject,
    },
}

impl fmt::Debug for BuilderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderValue::Null => write!(f, "null"),
            BuilderValue::Boolean(b) => write!(f, "{b}"),
            BuilderValue::Number(n) => write!(f, "{n}"),
            BuilderValue::String(s) => write!(f, "{s:?}"),
            BuilderValue::List(items) => f.debug_list().entries(items).finish(),
            BuilderValue::Map(map) => f.debug_map().entries(map).finish(),
            BuilderValue::Object { class_name, .. } => write!(f, "{class_name}(..)"),
        }
    }
}

impl BuilderValue {
    /// The object of a given type, when this is one
    pub fn downcast<T: Clone + 'static>(&self) -> Option<T> {
        match self {
            BuilderValue::Object { object, .. } => object.downcast_ref::<T>().cloned(),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

/// Arguments of a `ClassName(...)` call
#[derive(Debug, Clone, Default)]
pub struct BuilderArgs {
    /// Positional arguments
    pub positional: Vec<BuilderValue>,
    /// `name=value` arguments
    pub named: IndexMap<String, BuilderValue>,
}

impl BuilderArgs {
    /// Fail unless there are no arguments at all
    pub fn expect_none(&self, class_name: &str) -> Result<(), String> {
        if self.positional.is_empty() && self.named.is_empty() {
            Ok(())
        } else {
            Err(format!("{class_name} has no constructor arguments"))
        }
    }
}

/// Creates objects for builder expressions
pub trait ObjectFactory: Send + Sync {
    /// Create an object from the call arguments
    fn create(&self, args: &BuilderArgs) -> Result<BuiltObject, String>;
}

impl<F> ObjectFactory for F
where
    F: Fn(&BuilderArgs) -> Result<BuiltObject, String> + Send + Sync,
{
    fn create(&self, args: &BuilderArgs) -> Result<BuiltObject, String> {
        self(args)
    }
}

/// Registry of class names usable in builder expressions and with `?new`
#[derive(Clone, Default)]
pub struct ObjectFactories {
    factories: IndexMap<String, Arc<dyn ObjectFactory>>,
}

impl fmt::Debug for ObjectFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

static STANDARD_FACTORIES: LazyLock<ObjectFactories> = LazyLock::new(ObjectFactories::with_standard);

fn no_args<T>(name: &'static str, make: fn() -> T) -> impl Fn(&BuilderArgs) -> Result<BuiltObject, String>
where
    T: Any + Send + Sync,
{
    move |args: &BuilderArgs| -> Result<BuiltObject, String> {
        args.expect_none(name)?;
        Ok(Arc::new(make()) as BuiltObject)
    }
}

impl ObjectFactories {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the engines, handlers, wrappers, format factories and
    /// truncate algorithm of this crate
    pub fn with_standard() -> Self {
        let mut registry = Self::new();
        registry.register(
            "BigDecimalEngine",
            no_args("BigDecimalEngine", || Arc::new(BigDecimalEngine) as Arc<dyn ArithmeticEngine>),
        );
        registry.register(
            "ConservativeEngine",
            no_args("ConservativeEngine", || {
                Arc::new(ConservativeEngine) as Arc<dyn ArithmeticEngine>
            }),
        );
        registry.register(
            "RethrowHandler",
            no_args("RethrowHandler", || {
                Arc::new(RethrowHandler) as Arc<dyn TemplateExceptionHandler>
            }),
        );
        registry.register(
            "DebugHandler",
            no_args("DebugHandler", || Arc::new(DebugHandler) as Arc<dyn TemplateExceptionHandler>),
        );
        registry.register(
            "HtmlDebugHandler",
            no_args("HtmlDebugHandler", || {
                Arc::new(HtmlDebugHandler) as Arc<dyn TemplateExceptionHandler>
            }),
        );
        registry.register(
            "IgnoreHandler",
            no_args("IgnoreHandler", || Arc::new(IgnoreHandler) as Arc<dyn TemplateExceptionHandler>),
        );
        registry.register(
            "LogErrorReporter",
            no_args("LogErrorReporter", || {
                Arc::new(LogErrorReporter) as Arc<dyn AttemptExceptionReporter>
            }),
        );
        registry.register(
            "LogWarnReporter",
            no_args("LogWarnReporter", || {
                Arc::new(LogWarnReporter) as Arc<dyn AttemptExceptionReporter>
            }),
        );
        registry.register(
            "DefaultObjectWrapper",
            no_args("DefaultObjectWrapper", || {
                Arc::new(DefaultObjectWrapper) as Arc<dyn ObjectWrapper>
            }),
        );
        registry.register(
            "RestrictedObjectWrapper",
            no_args("RestrictedObjectWrapper", || {
                Arc::new(RestrictedObjectWrapper) as Arc<dyn ObjectWrapper>
            }),
        );
        registry.register(
            "UnrestrictedResolver",
            no_args("UnrestrictedResolver", || {
                Arc::new(UnrestrictedResolver) as Arc<dyn ClassResolver>
            }),
        );
        registry.register(
            "AllowsNothingResolver",
            no_args("AllowsNothingResolver", || {
                Arc::new(AllowsNothingResolver) as Arc<dyn ClassResolver>
            }),
        );
        registry.register(
            "BaseNNumberFormatFactory",
            no_args("BaseNNumberFormatFactory", || {
                Arc::new(BaseNNumberFormatFactory) as Arc<dyn NumberFormatFactory>
            }),
        );
        registry.register(
            "EpochMillisDateFormatFactory",
            no_args("EpochMillisDateFormatFactory", || {
                Arc::new(EpochMillisDateFormatFactory) as Arc<dyn DateFormatFactory>
            }),
        );
        registry.register("DefaultTruncateAlgorithm", |args: &BuilderArgs| -> Result<BuiltObject, String> {
            let algorithm = DefaultTruncateAlgorithm::from_builder_args(args)?;
            Ok(Arc::new(Arc::new(algorithm) as Arc<dyn TruncateAlgorithm>) as BuiltObject)
        });
        registry
    }

    /// The shared standard registry
    pub(crate) fn standard() -> &'static ObjectFactories {
        &STANDARD_FACTORIES
    }

    /// Register a factory under a class name, replacing any earlier one
    pub fn register(&mut self, class_name: impl Into<String>, factory: impl ObjectFactory + 'static) {
        self.factories.insert(class_name.into(), Arc::new(factory));
    }

    /// Whether a class name is registered
    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// Create an object by class name
    pub fn create(&self, class_name: &str, args: &BuilderArgs) -> Result<BuiltObject, String> {
        let factory = self
            .factories
            .get(class_name)
            .ok_or_else(|| format!("No object factory is registered for class \"{class_name}\""))?;
        factory.create(args)
    }

    /// Evaluate a builder expression
    pub fn build(&self, source: &str) -> Result<BuilderValue, String> {
        let mut parser = BuilderParser {
            text: source,
            pos: 0,
            factories: self,
        };
        let value = parser.expression()?;
        parser.skip_whitespace();
        if parser.pos < source.len() {
            return Err(format!(
                "Unexpected text after the expression: \"{}\"",
                &source[parser.pos..]
            ));
        }
        Ok(value)
    }

    /// Evaluate a builder expression that must produce an object of type `T`
    pub fn build_object<T: Clone + 'static>(&self, source: &str, expected: &str) -> Result<T, String> {
        let value = self.build(source)?;
        value
            .downcast::<T>()
            .ok_or_else(|| format!("The expression must evaluate to {expected}, but it was {}", value.describe()))
    }
}

struct BuilderParser<'a> {
    text: &'a str,
    pos: usize,
    factories: &'a ObjectFactories,
}

impl BuilderParser<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(format!(
                "Expected \"{expected}\" at position {}, but found {}",
                self.pos,
                self.peek().map_or_else(|| "end of text".to_string(), |c| format!("\"{c}\""))
            ))
        }
    }

    fn expression(&mut self) -> Result<BuilderValue, String> {
        self.skip_whitespace();
        match self.peek() {
            None => Err("Unexpected end of text: expected an expression".to_string()),
            Some(q @ ('"' | '\'')) => self.string(q).map(BuilderValue::String),
            Some('[') => self.list(),
            Some('{') => self.map(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.object_or_keyword(),
            Some(c) => Err(format!("Unexpected character \"{c}\" at position {}", self.pos)),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, String> {
        self.pos += 1;
        let mut text = String::new();
        let mut escaped = false;
        while let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            if escaped {
                text.push(match c {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                return Ok(text);
            } else {
                text.push(c);
            }
        }
        Err(format!("Missing {quote}"))
    }

    fn number(&mut self) -> Result<BuilderValue, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.text[start..self.pos];
        let parsed = if text.contains(['e', 'E']) {
            Decimal::from_scientific(text)
        } else {
            Decimal::from_str(text)
        };
        parsed
            .map(BuilderValue::Number)
            .map_err(|_| format!("Malformed number: \"{text}\""))
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '.' | '$') {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.text[start..self.pos].to_string()
    }

    fn object_or_keyword(&mut self) -> Result<BuilderValue, String> {
        let name = self.identifier();
        match name.as_str() {
            "true" => return Ok(BuilderValue::Boolean(true)),
            "false" => return Ok(BuilderValue::Boolean(false)),
            "null" => return Ok(BuilderValue::Null),
            _ => {}
        }
        let mut args = BuilderArgs::default();
        if self.eat('(') && !self.eat(')') {
            loop {
                self.skip_whitespace();
                let save = self.pos;
                let named = match self.peek() {
                    Some(c) if c.is_alphabetic() || c == '_' => {
                        let arg_name = self.identifier();
                        if self.eat('=') {
                            Some(arg_name)
                        } else {
                            self.pos = save;
                            None
                        }
                    }
                    _ => None,
                };
                let value = self.expression()?;
                match named {
                    Some(arg_name) => {
                        args.named.insert(arg_name, value);
                    }
                    None if !args.named.is_empty() => {
                        return Err(format!(
                            "Positional arguments must come before named ones in the call of {name}"
                        ));
                    }
                    None => args.positional.push(value),
                }
                if self.eat(')') {
                    break;
                }
                self.expect(',')?;
            }
        }
        let object = self
            .factories
            .create(&name, &args)
            .map_err(|e| format!("Failed to create {name}: {e}"))?;
        Ok(BuilderValue::Object {
            class_name: name,
            object,
        })
    }

    fn list(&mut self) -> Result<BuilderValue, String> {
        self.expect('[')?;
        let mut items = Vec::new();
        if self.eat(']') {
            return Ok(BuilderValue::List(items));
        }
        loop {
            items.push(self.expression()?);
            if self.eat(']') {
                return Ok(BuilderValue::List(items));
            }
            self.expect(',')?;
        }
    }

    fn map(&mut self) -> Result<BuilderValue, String> {
        self.expect('{')?;
        let mut entries = IndexMap::new();
        if self.eat('}') {
            return Ok(BuilderValue::Map(entries));
        }
        loop {
            let key = match self.expression()? {
                BuilderValue::String(s) => s,
                other => return Err(format!("Map keys must be strings, but found {}", other.describe())),
            };
            self.expect(':')?;
            let value = self.expression()?;
            entries.insert(key, value);
            if self.eat('}') {
                return Ok(BuilderValue::Map(entries));
            }
            self.expect(',')?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Number;
    use pretty_assertions::assert_eq;
    use std::cmp::Ordering;

    #[test]
    fn test_build_engine() {
        let engine: Arc<dyn ArithmeticEngine> = ObjectFactories::standard()
            .build_object("ConservativeEngine()", "an arithmetic engine")
            .unwrap();
        assert_eq!(engine.name(), "conservative");
        assert_eq!(
            engine.compare(&Number::Integer(1), &Number::Integer(2)).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_build_map_of_factories() {
        let value = ObjectFactories::standard()
            .build("{ \"base\": BaseNNumberFormatFactory, 'epoch': EpochMillisDateFormatFactory() }")
            .unwrap();
        let BuilderValue::Map(entries) = value else {
            panic!("expected a map");
        };
        assert_eq!(entries.len(), 2);
        assert!(entries["base"].downcast::<Arc<dyn NumberFormatFactory>>().is_some());
        assert!(entries["epoch"].downcast::<Arc<dyn DateFormatFactory>>().is_some());
    }

    #[test]
    fn test_literals() {
        let value = ObjectFactories::new().build("[1, 'a', true, null, {'k': 2.5}]").unwrap();
        assert_eq!(
            format!("{value:?}"),
            "[1, \"a\", true, null, {\"k\": 2.5}]"
        );
    }

    #[test]
    fn test_errors() {
        let factories = ObjectFactories::standard();
        assert!(factories.build("NoSuchClass").unwrap_err().contains("No object factory"));
        assert!(factories.build("BigDecimalEngine(1)").is_err());
        assert!(factories.build("'abc").unwrap_err().contains("Missing '"));
        assert!(factories
            .build_object::<Arc<dyn ArithmeticEngine>>("DebugHandler", "an arithmetic engine")
            .is_err());
    }

    #[test]
    fn test_named_arguments() {
        let algorithm: Arc<dyn TruncateAlgorithm> = ObjectFactories::standard()
            .build_object(
                "DefaultTruncateAlgorithm('...', add_space_at_word_boundary=false)",
                "a truncate algorithm",
            )
            .unwrap();
        assert_eq!(algorithm.terminator(), "...");
    }
}
