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

//! Cascading settings
//!
//! Settings live on three levels: the [`Configuration`] root, one
//! [`TemplateConfiguration`]-adjusted node per template, and one node per
//! render owned by the environment. Every level stores each setting as an
//! `Option`; `None` means "inherit from the parent", and the root resolves
//! anything left unset to a built-in default.

pub mod builder;
pub mod configuration;
pub mod handlers;
pub mod keys;
pub(crate) mod parse;
pub mod resolver;
pub mod template_configuration;
pub mod truncate;
pub mod version;

pub use builder::{BuilderArgs, BuilderValue, BuiltObject, ObjectFactories, ObjectFactory};
pub use configuration::Configuration;
pub use handlers::{
    AttemptExceptionReporter, DebugHandler, HandlerContext, HtmlDebugHandler, IgnoreHandler,
    LogErrorReporter, LogWarnReporter, RethrowHandler, TemplateExceptionHandler,
};
pub use keys::SettingKey;
pub use resolver::{AllowsNothingResolver, ClassResolver, OptInResolver, UnrestrictedResolver};
pub use template_configuration::TemplateConfiguration;
pub use truncate::{DefaultTruncateAlgorithm, TruncateAlgorithm, TruncateMode};
pub use version::Version;

use crate::error::SettingError;
use crate::eval::{ArithmeticEngine, BigDecimalEngine, ConservativeEngine};
use crate::format::{
    BooleanFormat, CustomDateFormats, CustomNumberFormats, DateFormatFactory, Locale,
    NumberFormatFactory, TimeZone,
};
use crate::model::{DefaultObjectWrapper, ObjectWrapper, RestrictedObjectWrapper};
use indexmap::IndexMap;
use parking_lot::Mutex;
use parse::{parse_boolean, SettingStringParser};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::{Arc, LazyLock};

macro_rules! settings_table {
    ($(
        $(#[$doc:meta])*
        $field:ident: $ty:ty = $default:expr,
            $setter:ident, $is_set:ident, $unset:ident, merge $merge:path;
    )*) => {
        struct SettingDefaults {
            $($field: $ty,)*
        }

        static DEFAULTS: LazyLock<SettingDefaults> = LazyLock::new(|| SettingDefaults {
            $($field: $default,)*
        });

        /// One level of the settings hierarchy
        pub struct Settings {
            $($field: Option<$ty>,)*
            parent: Option<Arc<Settings>>,
            factories: Option<Arc<ObjectFactories>>,
            custom_attributes: Mutex<IndexMap<String, JsonValue>>,
        }

        impl Settings {
            /// A node without parent and without explicit values
            pub fn new() -> Self {
                Self {
                    $($field: None,)*
                    parent: None,
                    factories: None,
                    custom_attributes: Mutex::new(IndexMap::new()),
                }
            }

            $(
                $(#[$doc])*
                ///
                /// The value set on this level, else the parent's value.
                pub fn $field(&self) -> &$ty {
                    match (&self.$field, &self.parent) {
                        (Some(value), _) => value,
                        (None, Some(parent)) => parent.$field(),
                        (None, None) => &DEFAULTS.$field,
                    }
                }

                #[doc = concat!("Set `", stringify!($field), "` on this level")]
                pub fn $setter(&mut self, value: $ty) {
                    self.$field = Some(value);
                }

                #[doc = concat!("Whether `", stringify!($field), "` is set on this level")]
                pub fn $is_set(&self) -> bool {
                    self.$field.is_some()
                }

                #[doc = concat!("Make `", stringify!($field), "` inherit again")]
                pub fn $unset(&mut self) {
                    self.$field = None;
                }
            )*

            /// Whether any setting is set on this level
            pub(crate) fn has_own_values(&self) -> bool {
                false $(|| self.$field.is_some())*
            }

            /// Copy explicit settings of `source` into this node
            ///
            /// Settings set here are kept; maps are merged key-wise with this
            /// node's entries winning, and lists are concatenated with the
            /// source entries first.
            pub fn merge_from(&mut self, source: &Settings) {
                $(
                    self.$field = match (&source.$field, self.$field.take()) {
                        (Some(from), None) => Some(from.clone()),
                        (Some(from), Some(own)) => Some($merge(from, &own)),
                        (None, own) => own,
                    };
                )*
                let source_attributes = source.custom_attributes.lock().clone();
                let mut own_attributes = self.custom_attributes.lock();
                for (name, value) in source_attributes {
                    own_attributes.entry(name).or_insert(value);
                }
            }
        }

        impl Clone for Settings {
            fn clone(&self) -> Self {
                Self {
                    $($field: self.$field.clone(),)*
                    parent: self.parent.clone(),
                    factories: self.factories.clone(),
                    custom_attributes: Mutex::new(self.custom_attributes.lock().clone()),
                }
            }
        }

        impl fmt::Debug for Settings {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut s = f.debug_struct("Settings");
                $(
                    if let Some(value) = &self.$field {
                        s.field(stringify!($field), value);
                    }
                )*
                s.field("has_parent", &self.parent.is_some()).finish()
            }
        }
    };
}

fn keep_own<T: Clone>(_from: &T, own: &T) -> T {
    own.clone()
}

/// Key-wise merge where this node's entries win
///
/// With `overwrite_updates_order` colliding keys move after the source-only
/// keys; otherwise they keep their position in the source.
fn merge_maps<V: Clone>(
    from: &IndexMap<String, V>,
    own: &IndexMap<String, V>,
    overwrite_updates_order: bool,
) -> IndexMap<String, V> {
    let mut merged = from.clone();
    if overwrite_updates_order {
        for key in own.keys() {
            merged.shift_remove(key);
        }
    }
    for (key, value) in own {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn merge_in_source_order<V: Clone>(from: &IndexMap<String, V>, own: &IndexMap<String, V>) -> IndexMap<String, V> {
    merge_maps(from, own, false)
}

/// Own entries count as more specific, so they come last
fn merge_own_last<V: Clone>(from: &IndexMap<String, V>, own: &IndexMap<String, V>) -> IndexMap<String, V> {
    merge_maps(from, own, true)
}

fn concat_lists<T: Clone>(from: &Vec<T>, own: &Vec<T>) -> Vec<T> {
    from.iter().chain(own.iter()).cloned().collect()
}

settings_table! {
    /// Locale used by formats and the collator
    locale: Locale = Locale::us(),
        set_locale, is_locale_set, unset_locale, merge keep_own;
    /// Time zone dates are rendered in
    time_zone: TimeZone = TimeZone::system_default(),
        set_time_zone, is_time_zone_set, unset_time_zone, merge keep_own;
    /// Time zone for zone-less (database) date and time values; `None` means the normal time zone
    sql_date_and_time_time_zone: Option<TimeZone> = None,
        set_sql_date_and_time_time_zone, is_sql_date_and_time_time_zone_set,
        unset_sql_date_and_time_time_zone, merge keep_own;
    /// Default number format
    number_format: String = "number".to_string(),
        set_number_format, is_number_format_set, unset_number_format, merge keep_own;
    /// Default format of date-only values
    date_format: String = String::new(),
        set_date_format, is_date_format_set, unset_date_format, merge keep_own;
    /// Default format of time-only values
    time_format: String = String::new(),
        set_time_format, is_time_format_set, unset_time_format, merge keep_own;
    /// Default format of date-time values
    datetime_format: String = String::new(),
        set_datetime_format, is_datetime_format_set, unset_datetime_format, merge keep_own;
    /// How booleans are converted to text
    boolean_format: BooleanFormat = BooleanFormat::default(),
        set_boolean_format, is_boolean_format_set, unset_boolean_format, merge keep_own;
    /// `@name` number format factories
    custom_number_formats: CustomNumberFormats = IndexMap::new(),
        set_custom_number_formats, is_custom_number_formats_set, unset_custom_number_formats,
        merge merge_in_source_order;
    /// `@name` date format factories
    custom_date_formats: CustomDateFormats = IndexMap::new(),
        set_custom_date_formats, is_custom_date_formats_set, unset_custom_date_formats,
        merge merge_in_source_order;
    /// Number comparison and parsing semantics
    arithmetic_engine: Arc<dyn ArithmeticEngine> = Arc::new(BigDecimalEngine),
        set_arithmetic_engine, is_arithmetic_engine_set, unset_arithmetic_engine, merge keep_own;
    /// Turns host data into template values
    object_wrapper: Arc<dyn ObjectWrapper> = Arc::new(DefaultObjectWrapper),
        set_object_wrapper, is_object_wrapper_set, unset_object_wrapper, merge keep_own;
    /// What happens with template exceptions
    template_exception_handler: Arc<dyn TemplateExceptionHandler> = Arc::new(RethrowHandler),
        set_template_exception_handler, is_template_exception_handler_set,
        unset_template_exception_handler, merge keep_own;
    /// Reports errors suppressed by attempt blocks
    attempt_exception_reporter: Arc<dyn AttemptExceptionReporter> = Arc::new(LogErrorReporter),
        set_attempt_exception_reporter, is_attempt_exception_reporter_set,
        unset_attempt_exception_reporter, merge keep_own;
    /// Which classes `?new` may create
    new_builtin_class_resolver: Arc<dyn ClassResolver> = Arc::new(UnrestrictedResolver),
        set_new_builtin_class_resolver, is_new_builtin_class_resolver_set,
        unset_new_builtin_class_resolver, merge keep_own;
    /// Algorithm behind `?truncate` and its variants
    truncate_builtin_algorithm: Arc<dyn TruncateAlgorithm> = Arc::new(DefaultTruncateAlgorithm::default()),
        set_truncate_builtin_algorithm, is_truncate_builtin_algorithm_set,
        unset_truncate_builtin_algorithm, merge keep_own;
    /// Charset of the output
    output_encoding: Option<String> = None,
        set_output_encoding, is_output_encoding_set, unset_output_encoding, merge keep_own;
    /// Charset used by `?url`; `None` falls back to the output encoding
    url_escaping_charset: Option<String> = None,
        set_url_escaping_charset, is_url_escaping_charset_set, unset_url_escaping_charset,
        merge keep_own;
    /// Flush the output at the end of the render
    auto_flush: bool = true,
        set_auto_flush, is_auto_flush_set, unset_auto_flush, merge keep_own;
    /// Include tips in error messages
    show_error_tips: bool = true,
        set_show_error_tips, is_show_error_tips_set, unset_show_error_tips, merge keep_own;
    /// Whether `?api` may be used
    api_builtin_enabled: bool = false,
        set_api_builtin_enabled, is_api_builtin_enabled_set, unset_api_builtin_enabled,
        merge keep_own;
    /// Log template exceptions before the handler sees them
    log_template_exceptions: bool = false,
        set_log_template_exceptions, is_log_template_exceptions_set,
        unset_log_template_exceptions, merge keep_own;
    /// Turn host errors into template exceptions
    wrap_unchecked_exceptions: bool = false,
        set_wrap_unchecked_exceptions, is_wrap_unchecked_exceptions_set,
        unset_wrap_unchecked_exceptions, merge keep_own;
    /// Initialize imported namespaces on first use
    lazy_imports: bool = false,
        set_lazy_imports, is_lazy_imports_set, unset_lazy_imports, merge keep_own;
    /// Laziness of auto-imports; `None` follows `lazy_imports`
    lazy_auto_imports: Option<bool> = None,
        set_lazy_auto_imports, is_lazy_auto_imports_set, unset_lazy_auto_imports, merge keep_own;
    /// Namespace name to library template name
    auto_imports: IndexMap<String, String> = IndexMap::new(),
        set_auto_imports, is_auto_imports_set, unset_auto_imports, merge merge_own_last;
    /// Templates included before the main template
    auto_includes: Vec<String> = Vec::new(),
        set_auto_includes, is_auto_includes_set, unset_auto_includes, merge concat_lists;
    /// Classic compatibility: null reads as empty string, booleans print as `true`/``
    classic_compatible: bool = false,
        set_classic_compatible, is_classic_compatible_set, unset_classic_compatible,
        merge keep_own;
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// A node that inherits from `parent`
    pub fn with_parent(parent: Arc<Settings>) -> Self {
        let mut settings = Self::new();
        settings.parent = Some(parent);
        settings
    }

    /// The parent node
    pub fn parent(&self) -> Option<&Arc<Settings>> {
        self.parent.as_ref()
    }

    pub(crate) fn set_parent(&mut self, parent: Arc<Settings>) {
        self.parent = Some(parent);
    }

    pub(crate) fn set_object_factories(&mut self, factories: Arc<ObjectFactories>) {
        self.factories = Some(factories);
    }

    /// Factories used by builder expressions, inherited from the root
    pub fn object_factories(&self) -> &ObjectFactories {
        match (&self.factories, &self.parent) {
            (Some(factories), _) => factories,
            (None, Some(parent)) => parent.object_factories(),
            (None, None) => ObjectFactories::standard(),
        }
    }

    /// Whether `auto_imports` laziness resolves to lazy
    pub fn effective_lazy_auto_imports(&self) -> bool {
        self.lazy_auto_imports().unwrap_or(*self.lazy_imports())
    }

    /// Add one auto-import on this level
    pub fn add_auto_import(&mut self, namespace: impl Into<String>, template_name: impl Into<String>) {
        let mut imports = self.auto_imports.take().unwrap_or_default();
        let namespace = namespace.into();
        // re-adding moves the entry to the end
        imports.shift_remove(&namespace);
        imports.insert(namespace, template_name.into());
        self.auto_imports = Some(imports);
    }

    /// Add one auto-include on this level
    pub fn add_auto_include(&mut self, template_name: impl Into<String>) {
        let template_name = template_name.into();
        let mut includes = self.auto_includes.take().unwrap_or_default();
        includes.retain(|name| name != &template_name);
        includes.push(template_name);
        self.auto_includes = Some(includes);
    }

    /// A custom attribute, looking at the parent only if the name is absent here
    ///
    /// An explicit `null` on this level is returned as is.
    pub fn custom_attribute(&self, name: &str) -> Option<JsonValue> {
        if let Some(value) = self.custom_attributes.lock().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.custom_attribute(name))
    }

    /// Set a custom attribute on this level
    pub fn set_custom_attribute(&self, name: impl Into<String>, value: JsonValue) {
        self.custom_attributes.lock().insert(name.into(), value);
    }

    /// Remove a custom attribute from this level
    pub fn remove_custom_attribute(&self, name: &str) -> Option<JsonValue> {
        self.custom_attributes.lock().shift_remove(name)
    }

    /// Names of the custom attributes set on this level
    pub fn custom_attribute_names(&self) -> Vec<String> {
        self.custom_attributes.lock().keys().cloned().collect()
    }

    /// Assign a setting from its textual form
    ///
    /// Accepts snake case and camel case names.
    pub fn set_setting(&mut self, name: &str, value: &str) -> Result<(), SettingError> {
        self.assign_setting(name, value).map(|_| ())
    }

    /// Assign settings from a name to value map, in the map's order
    pub fn set_settings<'a, I>(&mut self, settings: I) -> Result<(), SettingError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (name, value) in settings {
            self.set_setting(name, value)?;
        }
        Ok(())
    }

    /// Assign a setting and report which one was changed
    pub(crate) fn assign_setting(&mut self, name: &str, value: &str) -> Result<SettingKey, SettingError> {
        let key = SettingKey::from_name(name).ok_or_else(|| SettingError::Unknown {
            name: name.to_string(),
            suggestion: keys::suggest_setting_name(name),
        })?;
        self.assign(key, value).map_err(|cause| SettingError::Assignment {
            name: key.snake_case().to_string(),
            value: value.to_string(),
            cause,
        })?;
        Ok(key)
    }

    fn assign(&mut self, key: SettingKey, value: &str) -> Result<(), String> {
        let keyword = value.trim().to_ascii_lowercase().replace('_', "");
        match key {
            SettingKey::Locale => self.set_locale(Locale::parse(value)?),
            SettingKey::TimeZone => self.set_time_zone(TimeZone::parse(value)?),
            SettingKey::SqlDateAndTimeTimeZone => {
                let zone = if keyword == "null" {
                    None
                } else {
                    Some(TimeZone::parse(value)?)
                };
                self.set_sql_date_and_time_time_zone(zone);
            }
            SettingKey::NumberFormat => self.set_number_format(value.to_string()),
            SettingKey::DateFormat => self.set_date_format(value.to_string()),
            SettingKey::TimeFormat => self.set_time_format(value.to_string()),
            SettingKey::DateTimeFormat => self.set_datetime_format(value.to_string()),
            SettingKey::BooleanFormat => self.set_boolean_format(BooleanFormat::parse(value)?),
            SettingKey::CustomNumberFormats => {
                let formats = self.build_factory_map::<Arc<dyn NumberFormatFactory>>(
                    value,
                    "a number format factory",
                )?;
                self.set_custom_number_formats(formats);
            }
            SettingKey::CustomDateFormats => {
                let formats = self
                    .build_factory_map::<Arc<dyn DateFormatFactory>>(value, "a date format factory")?;
                self.set_custom_date_formats(formats);
            }
            SettingKey::ArithmeticEngine => {
                let engine: Arc<dyn ArithmeticEngine> = match keyword.as_str() {
                    "bigdecimal" => Arc::new(BigDecimalEngine),
                    "conservative" => Arc::new(ConservativeEngine),
                    _ => self.build(value, "an arithmetic engine")?,
                };
                self.set_arithmetic_engine(engine);
            }
            SettingKey::ObjectWrapper => {
                let wrapper: Arc<dyn ObjectWrapper> = match keyword.as_str() {
                    "default" => Arc::new(DefaultObjectWrapper),
                    "restricted" => Arc::new(RestrictedObjectWrapper),
                    _ => self.build(value, "an object wrapper")?,
                };
                self.set_object_wrapper(wrapper);
            }
            SettingKey::TemplateExceptionHandler => {
                let handler: Arc<dyn TemplateExceptionHandler> = match keyword.as_str() {
                    "rethrow" | "default" => Arc::new(RethrowHandler),
                    "debug" => Arc::new(DebugHandler),
                    "htmldebug" => Arc::new(HtmlDebugHandler),
                    "ignore" => Arc::new(IgnoreHandler),
                    _ => self.build(value, "a template exception handler")?,
                };
                self.set_template_exception_handler(handler);
            }
            SettingKey::AttemptExceptionReporter => {
                let reporter: Arc<dyn AttemptExceptionReporter> = match keyword.as_str() {
                    "logerror" | "default" => Arc::new(LogErrorReporter),
                    "logwarn" => Arc::new(LogWarnReporter),
                    _ => self.build(value, "an attempt exception reporter")?,
                };
                self.set_attempt_exception_reporter(reporter);
            }
            SettingKey::NewBuiltinClassResolver => {
                let resolver: Arc<dyn ClassResolver> = match keyword.as_str() {
                    "unrestricted" => Arc::new(UnrestrictedResolver),
                    "allowsnothing" => Arc::new(AllowsNothingResolver),
                    _ if value.contains(':') => Arc::new(parse_opt_in_resolver(value)?),
                    _ => self.build(value, "a class resolver")?,
                };
                self.set_new_builtin_class_resolver(resolver);
            }
            SettingKey::TruncateBuiltinAlgorithm => {
                let algorithm: Arc<dyn TruncateAlgorithm> = match keyword.as_str() {
                    "default" => Arc::new(DefaultTruncateAlgorithm::default()),
                    _ => self.build(value, "a truncate algorithm")?,
                };
                self.set_truncate_builtin_algorithm(algorithm);
            }
            SettingKey::OutputEncoding => self.set_output_encoding(nullable_string(value)),
            SettingKey::UrlEscapingCharset => self.set_url_escaping_charset(nullable_string(value)),
            SettingKey::AutoFlush => self.set_auto_flush(parse_boolean(value)?),
            SettingKey::ShowErrorTips => self.set_show_error_tips(parse_boolean(value)?),
            SettingKey::ApiBuiltinEnabled => self.set_api_builtin_enabled(parse_boolean(value)?),
            SettingKey::LogTemplateExceptions => {
                self.set_log_template_exceptions(parse_boolean(value)?);
            }
            SettingKey::WrapUncheckedExceptions => {
                self.set_wrap_unchecked_exceptions(parse_boolean(value)?);
            }
            SettingKey::LazyImports => self.set_lazy_imports(parse_boolean(value)?),
            SettingKey::LazyAutoImports => {
                let lazy = if keyword == "null" {
                    None
                } else {
                    Some(parse_boolean(value)?)
                };
                self.set_lazy_auto_imports(lazy);
            }
            SettingKey::AutoImport => {
                self.set_auto_imports(SettingStringParser::new(value).parse_import_list()?);
            }
            SettingKey::AutoInclude => {
                self.set_auto_includes(SettingStringParser::new(value).parse_list()?);
            }
            SettingKey::ClassicCompatible => self.set_classic_compatible(parse_boolean(value)?),
        }
        Ok(())
    }

    fn build<T: Clone + 'static>(&self, source: &str, expected: &str) -> Result<T, String> {
        self.object_factories().build_object(source, expected)
    }

    fn build_factory_map<T: Clone + 'static>(
        &self,
        source: &str,
        expected: &str,
    ) -> Result<IndexMap<String, T>, String> {
        let BuilderValue::Map(entries) = self.object_factories().build(source)? else {
            return Err("The value must be a map of format names to format factories".to_string());
        };
        entries
            .into_iter()
            .map(|(name, value)| {
                if !is_format_name(&name) {
                    return Err(format!(
                        "Invalid format name \"{name}\": it must start with a letter and contain only letters and digits"
                    ));
                }
                let factory = value.downcast::<T>().ok_or_else(|| {
                    format!("The value for \"{name}\" must be {expected}, but it was {value:?}")
                })?;
                Ok((name, factory))
            })
            .collect()
    }
}

fn is_format_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_alphabetic) && name.chars().all(char::is_alphanumeric)
}

fn nullable_string(value: &str) -> Option<String> {
    if value.trim().eq_ignore_ascii_case("null") {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_opt_in_resolver(value: &str) -> Result<OptInResolver, String> {
    let mut allowed_classes = Vec::new();
    let mut trusted_templates = Vec::new();
    for (segment, items) in SettingStringParser::new(value).parse_segmented_list()? {
        match segment.as_str() {
            "allowed_classes" | "allowedClasses" => allowed_classes.extend(items),
            "trusted_templates" | "trustedTemplates" => trusted_templates.extend(items),
            other => {
                return Err(format!(
                    "Unrecognized list segment key: \"{other}\". Supported keys are: \"allowed_classes\", \"trusted_templates\""
                ));
            }
        }
    }
    Ok(OptInResolver::new(allowed_classes, trusted_templates))
}
