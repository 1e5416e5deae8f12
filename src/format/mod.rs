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

//! Value formatting
//!
//! Number and date formats are resolved from format strings (`number`,
//! `0.00`, `medium`, `iso`, `@name params`, ...) against a locale and a time
//! zone. A resolved format reports whether it depends on the locale or on the
//! time zone, which is what lets the environment invalidate its format caches
//! partially when one of those settings changes.

#![warn(missing_docs)]

pub mod boolean;
pub mod custom;
pub mod date;
pub mod iso;
pub mod locale;
pub mod number;
pub mod time_zone;

pub use boolean::BooleanFormat;
pub use custom::{BaseNNumberFormatFactory, EpochMillisDateFormatFactory};
pub use date::{resolve_date_format, JavaPatternDateFormat};
pub use iso::{IsoDateFormat, IsoFlavor};
pub use locale::{Collator, Locale};
pub use number::{resolve_number_format, ComputerNumberFormat, DecimalPatternFormat};
pub use time_zone::TimeZone;

use crate::error::{TemplateError, TemplateResult};
use crate::model::{DateKind, Number, TemplateDate};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Output of a format: plain text or markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutput {
    /// Plain text, to be escaped by markup output contexts
    Plain(String),
    /// Markup, written verbatim
    Markup(String),
}

impl FormatOutput {
    /// The text regardless of kind
    pub fn as_str(&self) -> &str {
        match self {
            FormatOutput::Plain(s) | FormatOutput::Markup(s) => s,
        }
    }

    /// The plain text; markup is rejected
    pub fn into_plain(self, description: &str) -> TemplateResult<String> {
        match self {
            FormatOutput::Plain(s) => Ok(s),
            FormatOutput::Markup(_) => Err(TemplateError::MarkupInPlainText {
                description: description.to_string(),
            }),
        }
    }
}

/// A resolved number format
pub trait TemplateNumberFormat: Send + Sync + fmt::Debug {
    /// Format a number
    fn format(&self, number: &Number) -> TemplateResult<FormatOutput>;

    /// Whether the output depends on the locale
    fn is_locale_bound(&self) -> bool;

    /// Short description for messages
    fn description(&self) -> String;
}

/// A resolved date format
pub trait TemplateDateFormat: Send + Sync + fmt::Debug {
    /// Format a date
    fn format(&self, date: &TemplateDate) -> TemplateResult<FormatOutput>;

    /// Parse text into a date of the given kind
    fn parse(&self, text: &str, kind: DateKind) -> TemplateResult<TemplateDate>;

    /// Whether the output depends on the locale
    fn is_locale_bound(&self) -> bool;

    /// Whether the output depends on the time zone
    fn is_time_zone_bound(&self) -> bool;

    /// Short description for messages
    fn description(&self) -> String;
}

/// Creates number formats for `@name params` format strings
pub trait NumberFormatFactory: Send + Sync + fmt::Debug {
    /// Create the format for the parameters after the name
    fn get(&self, params: &str, locale: &Locale) -> TemplateResult<Arc<dyn TemplateNumberFormat>>;
}

/// What a date format is requested for
#[derive(Debug, Clone, Copy)]
pub struct DateFormatRequest<'a> {
    /// Kind of the values to format
    pub kind: DateKind,
    /// Locale in effect
    pub locale: &'a Locale,
    /// Time zone to render in
    pub time_zone: &'a TimeZone,
    /// Whether the values come from a zone-less source
    pub zoneless_input: bool,
}

/// Creates date formats for `@name params` format strings
pub trait DateFormatFactory: Send + Sync + fmt::Debug {
    /// Create the format for the parameters after the name
    fn get(
        &self,
        params: &str,
        request: &DateFormatRequest<'_>,
    ) -> TemplateResult<Arc<dyn TemplateDateFormat>>;
}

/// Custom number format factories by name
pub type CustomNumberFormats = IndexMap<String, Arc<dyn NumberFormatFactory>>;

/// Custom date format factories by name
pub type CustomDateFormats = IndexMap<String, Arc<dyn DateFormatFactory>>;

/// Split `@name params` into name and parameters
///
/// Returns `None` if the string is not a custom format reference. `@@` is
/// an escaped literal `@`.
pub(crate) fn split_custom_format(format: &str) -> Option<(&str, &str)> {
    let rest = format.strip_prefix('@')?;
    if !rest.chars().next().is_some_and(char::is_alphabetic) {
        return None;
    }
    match rest.find(char::is_whitespace) {
        Some(end) => Some((&rest[..end], rest[end..].trim())),
        None => Some((rest, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_custom_format() {
        assert_eq!(split_custom_format("@base 16"), Some(("base", "16")));
        assert_eq!(split_custom_format("@epoch"), Some(("epoch", "")));
        assert_eq!(split_custom_format("@@literal"), None);
        assert_eq!(split_custom_format("0.00"), None);
    }

    #[test]
    fn test_markup_rejected_as_plain() {
        let out = FormatOutput::Markup("<b>1</b>".to_string());
        assert!(matches!(
            out.into_plain("x"),
            Err(TemplateError::MarkupInPlainText { .. })
        ));
    }
}
