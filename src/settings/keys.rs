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

//! Setting names

use std::fmt;

macro_rules! setting_keys {
    ($( $variant:ident => $snake:literal, $camel:literal; )*) => {
        /// A setting that can be assigned by name
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum SettingKey {
            $(
                #[doc = concat!("`", $snake, "` / `", $camel, "`")]
                $variant,
            )*
        }

        impl SettingKey {
            /// Every key, in declaration order
            pub const ALL: &'static [SettingKey] = &[$(SettingKey::$variant),*];

            /// The snake case name
            pub fn snake_case(self) -> &'static str {
                match self {
                    $(SettingKey::$variant => $snake,)*
                }
            }

            /// The camel case name
            pub fn camel_case(self) -> &'static str {
                match self {
                    $(SettingKey::$variant => $camel,)*
                }
            }

            /// Look up a key by either of its names
            pub fn from_name(name: &str) -> Option<SettingKey> {
                match name {
                    $($snake | $camel => Some(SettingKey::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

setting_keys! {
    Locale => "locale", "locale";
    TimeZone => "time_zone", "timeZone";
    SqlDateAndTimeTimeZone => "sql_date_and_time_time_zone", "sqlDateAndTimeTimeZone";
    NumberFormat => "number_format", "numberFormat";
    DateFormat => "date_format", "dateFormat";
    TimeFormat => "time_format", "timeFormat";
    DateTimeFormat => "datetime_format", "datetimeFormat";
    BooleanFormat => "boolean_format", "booleanFormat";
    CustomNumberFormats => "custom_number_formats", "customNumberFormats";
    CustomDateFormats => "custom_date_formats", "customDateFormats";
    ArithmeticEngine => "arithmetic_engine", "arithmeticEngine";
    ObjectWrapper => "object_wrapper", "objectWrapper";
    TemplateExceptionHandler => "template_exception_handler", "templateExceptionHandler";
    AttemptExceptionReporter => "attempt_exception_reporter", "attemptExceptionReporter";
    NewBuiltinClassResolver => "new_builtin_class_resolver", "newBuiltinClassResolver";
    TruncateBuiltinAlgorithm => "truncate_builtin_algorithm", "truncateBuiltinAlgorithm";
    OutputEncoding => "output_encoding", "outputEncoding";
    UrlEscapingCharset => "url_escaping_charset", "urlEscapingCharset";
    AutoFlush => "auto_flush", "autoFlush";
    ShowErrorTips => "show_error_tips", "showErrorTips";
    ApiBuiltinEnabled => "api_builtin_enabled", "apiBuiltinEnabled";
    LogTemplateExceptions => "log_template_exceptions", "logTemplateExceptions";
    WrapUncheckedExceptions => "wrap_unchecked_exceptions", "wrapUncheckedExceptions";
    LazyImports => "lazy_imports", "lazyImports";
    LazyAutoImports => "lazy_auto_imports", "lazyAutoImports";
    AutoImport => "auto_import", "autoImport";
    AutoInclude => "auto_include", "autoInclude";
    ClassicCompatible => "classic_compatible", "classicCompatible";
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.snake_case())
    }
}

/// Best-effort correction for an unknown setting name
///
/// Well-known aliases come first (`encoding`, `timezone`, ...), then the
/// closest known name within a small edit distance, in the naming
/// convention the given name appears to use.
pub(crate) fn suggest_setting_name(name: &str) -> Option<String> {
    let camel = name.chars().any(|c| c.is_ascii_uppercase()) && !name.contains('_');
    let pick = |key: SettingKey| {
        if camel {
            key.camel_case().to_string()
        } else {
            key.snake_case().to_string()
        }
    };

    let alias = match name.to_ascii_lowercase().replace('_', "").as_str() {
        "encoding" | "charset" | "defaultencoding" | "defaultcharset" => {
            Some(SettingKey::OutputEncoding)
        }
        "timezone" | "tz" => Some(SettingKey::TimeZone),
        "sqltimezone" | "sqldatetimetimezone" => Some(SettingKey::SqlDateAndTimeTimeZone),
        "datetimeformat" => Some(SettingKey::DateTimeFormat),
        "autoimports" => Some(SettingKey::AutoImport),
        "autoincludes" => Some(SettingKey::AutoInclude),
        "exceptionhandler" => Some(SettingKey::TemplateExceptionHandler),
        _ => None,
    };
    if let Some(key) = alias {
        return Some(pick(key));
    }

    SettingKey::ALL
        .iter()
        .map(|key| {
            let candidate = pick(*key);
            (levenshtein_distance(name, &candidate), candidate)
        })
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

/// Calculate Levenshtein distance between two strings
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let chars1: Vec<char> = s1.chars().collect();
    let chars2: Vec<char> = s2.chars().collect();
    let mut previous: Vec<usize> = (0..=chars2.len()).collect();
    let mut current = vec![0; chars2.len() + 1];

    for (i, c1) in chars1.iter().enumerate() {
        current[0] = i + 1;
        for (j, c2) in chars2.iter().enumerate() {
            let cost = usize::from(c1 != c2);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[chars2.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_both_conventions_resolve() {
        assert_eq!(SettingKey::from_name("time_zone"), Some(SettingKey::TimeZone));
        assert_eq!(SettingKey::from_name("timeZone"), Some(SettingKey::TimeZone));
        assert_eq!(SettingKey::from_name("TimeZone"), None);
        for key in SettingKey::ALL {
            assert_eq!(SettingKey::from_name(key.camel_case()), Some(*key));
        }
    }

    #[rstest]
    #[case("localee", Some("locale"))]
    #[case("timezone", Some("time_zone"))]
    #[case("defaultEncoding", Some("outputEncoding"))]
    #[case("numberFormatt", Some("numberFormat"))]
    #[case("no_such_thing", None)]
    fn test_suggestions(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(suggest_setting_name(name).as_deref(), expected);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
    }
}
