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

//! Locales, locale data and string collation

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A language plus optional country and variant, like `en_US`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale {
    language: String,
    country: Option<String>,
    variant: Option<String>,
}

impl Locale {
    /// Create a locale from its parts
    pub fn new(language: &str, country: Option<&str>) -> Self {
        Self {
            language: language.to_ascii_lowercase(),
            country: country.map(str::to_ascii_uppercase),
            variant: None,
        }
    }

    /// `en_US`
    pub fn us() -> Self {
        Self::new("en", Some("US"))
    }

    /// Parse `ll`, `ll_CC` or `ll_CC_variant`; `-` is accepted as separator
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let mut parts = text.split(['_', '-']);
        let language = parts.next().unwrap_or_default();
        if language.is_empty() || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("Malformed locale: \"{text}\""));
        }
        let country = parts.next().filter(|c| !c.is_empty());
        if let Some(country) = country {
            if !country.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(format!("Malformed locale: \"{text}\""));
            }
        }
        let variant = parts.collect::<Vec<_>>().join("_");
        let mut locale = Self::new(language, country);
        if !variant.is_empty() {
            locale.variant = Some(variant);
        }
        Ok(locale)
    }

    /// Language code, lower case
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Country code, upper case
    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Number symbols for this locale
    pub(crate) fn number_symbols(&self) -> NumberSymbols {
        let comma_decimal = matches!(
            self.language.as_str(),
            "de" | "fr" | "hu" | "it" | "es" | "nl" | "pt" | "ru" | "pl" | "cs" | "sk" | "sv"
                | "fi" | "nb" | "no" | "da" | "uk" | "ro" | "tr" | "id" | "el" | "hr" | "sl"
        );
        let (decimal, grouping) = match (self.language.as_str(), self.country()) {
            ("de", Some("CH")) => ('.', '\''),
            ("fr" | "ru" | "pl" | "cs" | "sk" | "sv" | "fi" | "nb" | "no" | "uk" | "hu", _) => {
                (',', '\u{a0}')
            }
            _ if comma_decimal => (',', '.'),
            _ => ('.', ','),
        };
        let (currency, currency_suffix) = match (self.language.as_str(), self.country()) {
            ("en", Some("GB")) => ("£", false),
            ("en", _) => ("$", false),
            ("hu", _) => ("Ft", true),
            ("ja", _) => ("¥", false),
            ("de" | "fr" | "it" | "es" | "nl" | "pt" | "fi" | "sk" | "sl" | "el", _) => ("€", true),
            _ => ("¤", false),
        };
        NumberSymbols {
            decimal,
            grouping,
            currency,
            currency_suffix,
        }
    }

    /// Month and day names for this locale
    pub(crate) fn date_names(&self) -> &'static DateNames {
        match self.language.as_str() {
            "de" => &GERMAN_NAMES,
            _ => &ENGLISH_NAMES,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.language)?;
        if let Some(country) = &self.country {
            write!(f, "_{country}")?;
        }
        if let Some(variant) = &self.variant {
            write!(f, "_{variant}")?;
        }
        Ok(())
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::us()
    }
}

/// Symbols used by decimal number formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NumberSymbols {
    pub decimal: char,
    pub grouping: char,
    pub currency: &'static str,
    pub currency_suffix: bool,
}

impl NumberSymbols {
    /// Locale independent symbols
    pub const COMPUTER: NumberSymbols = NumberSymbols {
        decimal: '.',
        grouping: ',',
        currency: "¤",
        currency_suffix: false,
    };
}

/// Month, weekday and day period names
#[derive(Debug)]
pub(crate) struct DateNames {
    pub months: [&'static str; 12],
    pub short_months: [&'static str; 12],
    /// Monday first
    pub weekdays: [&'static str; 7],
    pub short_weekdays: [&'static str; 7],
    pub am_pm: [&'static str; 2],
}

static ENGLISH_NAMES: DateNames = DateNames {
    months: [
        "January", "February", "March", "April", "May", "June", "July", "August", "September",
        "October", "November", "December",
    ],
    short_months: [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ],
    weekdays: [
        "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
    ],
    short_weekdays: ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"],
    am_pm: ["AM", "PM"],
};

static GERMAN_NAMES: DateNames = DateNames {
    months: [
        "Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August", "September",
        "Oktober", "November", "Dezember",
    ],
    short_months: [
        "Jan.", "Feb.", "März", "Apr.", "Mai", "Juni", "Juli", "Aug.", "Sep.", "Okt.", "Nov.",
        "Dez.",
    ],
    weekdays: [
        "Montag", "Dienstag", "Mittwoch", "Donnerstag", "Freitag", "Samstag", "Sonntag",
    ],
    short_weekdays: ["Mo.", "Di.", "Mi.", "Do.", "Fr.", "Sa.", "So."],
    am_pm: ["AM", "PM"],
};

/// Locale sensitive string ordering
///
/// Strings are compared letter by letter on three levels: base letters,
/// then accents, then case. A precomposed accented letter and the same
/// letter followed by a combining mark are equal. `"a"` and `"A"` are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collator {
    locale: Locale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CollationUnit {
    base: char,
    accent: u8,
    upper: bool,
}

impl Collator {
    /// Collator for a locale
    pub fn new(locale: &Locale) -> Self {
        Self {
            locale: locale.clone(),
        }
    }

    /// The locale this collator was created for
    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// Compare two strings
    pub fn compare(&self, left: &str, right: &str) -> Ordering {
        let left = collation_units(left);
        let right = collation_units(right);

        let primary = left
            .iter()
            .map(|u| u.base)
            .cmp(right.iter().map(|u| u.base));
        if primary != Ordering::Equal {
            return primary;
        }
        let secondary = left
            .iter()
            .map(|u| u.accent)
            .cmp(right.iter().map(|u| u.accent));
        if secondary != Ordering::Equal {
            return secondary;
        }
        left.iter()
            .map(|u| u.upper)
            .cmp(right.iter().map(|u| u.upper))
    }

    /// Whether two strings collate as equal
    pub fn equals(&self, left: &str, right: &str) -> bool {
        self.compare(left, right) == Ordering::Equal
    }
}

fn collation_units(text: &str) -> Vec<CollationUnit> {
    let mut units: Vec<CollationUnit> = Vec::with_capacity(text.len());
    for c in text.chars() {
        if let Some(accent) = combining_accent(c) {
            if let Some(last) = units.last_mut() {
                if last.accent == 0 {
                    last.accent = accent;
                    continue;
                }
            }
        }
        let upper = c.is_uppercase();
        let lower = c.to_lowercase().next().unwrap_or(c);
        let (base, accent) = decompose(lower);
        units.push(CollationUnit {
            base,
            accent,
            upper,
        });
    }
    units
}

const ACUTE: u8 = 1;
const GRAVE: u8 = 2;
const CIRCUMFLEX: u8 = 3;
const DIAERESIS: u8 = 4;
const TILDE: u8 = 5;
const RING: u8 = 6;
const CEDILLA: u8 = 7;
const DOUBLE_ACUTE: u8 = 8;
const CARON: u8 = 9;

fn combining_accent(c: char) -> Option<u8> {
    match c {
        '\u{301}' => Some(ACUTE),
        '\u{300}' => Some(GRAVE),
        '\u{302}' => Some(CIRCUMFLEX),
        '\u{308}' => Some(DIAERESIS),
        '\u{303}' => Some(TILDE),
        '\u{30a}' => Some(RING),
        '\u{327}' => Some(CEDILLA),
        '\u{30b}' => Some(DOUBLE_ACUTE),
        '\u{30c}' => Some(CARON),
        _ => None,
    }
}

fn decompose(c: char) -> (char, u8) {
    match c {
        'á' => ('a', ACUTE),
        'à' => ('a', GRAVE),
        'â' => ('a', CIRCUMFLEX),
        'ä' => ('a', DIAERESIS),
        'ã' => ('a', TILDE),
        'å' => ('a', RING),
        'ç' => ('c', CEDILLA),
        'č' => ('c', CARON),
        'é' => ('e', ACUTE),
        'è' => ('e', GRAVE),
        'ê' => ('e', CIRCUMFLEX),
        'ë' => ('e', DIAERESIS),
        'ě' => ('e', CARON),
        'í' => ('i', ACUTE),
        'ì' => ('i', GRAVE),
        'î' => ('i', CIRCUMFLEX),
        'ï' => ('i', DIAERESIS),
        'ñ' => ('n', TILDE),
        'ň' => ('n', CARON),
        'ó' => ('o', ACUTE),
        'ò' => ('o', GRAVE),
        'ô' => ('o', CIRCUMFLEX),
        'ö' => ('o', DIAERESIS),
        'õ' => ('o', TILDE),
        'ő' => ('o', DOUBLE_ACUTE),
        'ř' => ('r', CARON),
        'š' => ('s', CARON),
        'ú' => ('u', ACUTE),
        'ù' => ('u', GRAVE),
        'û' => ('u', CIRCUMFLEX),
        'ü' => ('u', DIAERESIS),
        'ű' => ('u', DOUBLE_ACUTE),
        'ů' => ('u', RING),
        'ý' => ('y', ACUTE),
        'ÿ' => ('y', DIAERESIS),
        'ž' => ('z', CARON),
        other => (other, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_locale() {
        let locale = Locale::parse("de_CH").unwrap();
        assert_eq!(locale.language(), "de");
        assert_eq!(locale.country(), Some("CH"));
        assert_eq!(locale.to_string(), "de_CH");
        assert_eq!(Locale::parse("en-gb").unwrap().to_string(), "en_GB");
        assert!(Locale::parse("").is_err());
        assert!(Locale::parse("e1").is_err());
    }

    #[test]
    fn test_number_symbols() {
        assert_eq!(Locale::us().number_symbols().decimal, '.');
        assert_eq!(Locale::parse("de_DE").unwrap().number_symbols().decimal, ',');
        assert_eq!(Locale::parse("de_DE").unwrap().number_symbols().grouping, '.');
    }

    #[test]
    fn test_collator_levels() {
        let collator = Collator::new(&Locale::us());
        assert_eq!(collator.compare("apple", "Banana"), Ordering::Less);
        assert_eq!(collator.compare("a", "A"), Ordering::Less);
        assert_eq!(collator.compare("e", "é"), Ordering::Less);
        assert_eq!(collator.compare("éclair", "ezra"), Ordering::Less);
        assert!(collator.equals("caf\u{e9}", "cafe\u{301}"));
        assert!(!collator.equals("a", "A"));
    }
}
