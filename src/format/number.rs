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

//! Number formats

use super::locale::{Locale, NumberSymbols};
use super::{split_custom_format, CustomNumberFormats, FormatOutput, TemplateNumberFormat};
use crate::error::{TemplateError, TemplateResult};
use crate::model::Number;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

/// Resolve a number format string
///
/// Recognized forms: `number`, `computer` (or `c`), `currency`, `percent`,
/// `@name params` for custom formats, and decimal patterns like `0.00` or
/// `#,##0.###`.
pub fn resolve_number_format(
    format: &str,
    locale: &Locale,
    custom: &CustomNumberFormats,
) -> TemplateResult<Arc<dyn TemplateNumberFormat>> {
    if let Some((name, params)) = split_custom_format(format) {
        let factory = custom
            .get(name)
            .ok_or_else(|| TemplateError::UnknownCustomFormat {
                kind: "number".to_string(),
                name: name.to_string(),
            })?;
        return factory.get(params, locale);
    }

    let symbols = locale.number_symbols();
    let format: Arc<dyn TemplateNumberFormat> = match format {
        "number" => Arc::new(DecimalPatternFormat::parse("#,##0.###", symbols)?),
        "computer" | "c" => Arc::new(ComputerNumberFormat),
        "currency" => {
            let pattern = if symbols.currency_suffix {
                "#,##0.00\u{a0}¤"
            } else {
                "¤#,##0.00"
            };
            Arc::new(DecimalPatternFormat::parse(pattern, symbols)?)
        }
        "percent" => Arc::new(DecimalPatternFormat::parse("#,##0%", symbols)?),
        pattern => {
            let pattern = pattern.strip_prefix('@').filter(|p| p.starts_with('@')).unwrap_or(pattern);
            Arc::new(DecimalPatternFormat::parse(pattern, symbols)?)
        }
    };
    Ok(format)
}

/// Locale independent format with full precision
///
/// Integers and decimals are never rounded and never use exponent notation.
/// Infinities render as `INF`/`-INF`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputerNumberFormat;

impl ComputerNumberFormat {
    /// Format without the [`FormatOutput`] wrapper
    pub fn format_plain(number: &Number) -> String {
        match number {
            Number::Integer(i) => i.to_string(),
            Number::Decimal(d) => d.normalize().to_string(),
            Number::Double(f) if f.is_nan() => "NaN".to_string(),
            Number::Double(f) if f.is_infinite() => {
                if *f > 0.0 { "INF" } else { "-INF" }.to_string()
            }
            Number::Double(f) => f.to_string(),
        }
    }
}

impl TemplateNumberFormat for ComputerNumberFormat {
    fn format(&self, number: &Number) -> TemplateResult<FormatOutput> {
        Ok(FormatOutput::Plain(Self::format_plain(number)))
    }

    fn is_locale_bound(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        "computer".to_string()
    }
}

/// Decimal pattern format, like `#,##0.00`
#[derive(Debug, Clone, PartialEq)]
pub struct DecimalPatternFormat {
    pattern: String,
    prefix: String,
    suffix: String,
    min_integer_digits: usize,
    grouping_size: Option<usize>,
    min_fraction_digits: u32,
    max_fraction_digits: u32,
    multiplier: u32,
    symbols: NumberSymbols,
}

impl DecimalPatternFormat {
    /// Parse a pattern for the given symbols
    pub(crate) fn parse(pattern: &str, symbols: NumberSymbols) -> TemplateResult<Self> {
        let invalid = |message: &str| TemplateError::InvalidFormat {
            format: pattern.to_string(),
            message: message.to_string(),
        };
        // Negative subpattern is not supported, the sign is always a prefix
        let positive = pattern.split(';').next().unwrap_or(pattern);

        let chars: Vec<char> = positive.chars().collect();
        let mut prefix = String::new();
        let mut body = String::new();
        let mut suffix = String::new();
        let mut quoted = false;
        let mut stage = 0;
        for &c in &chars {
            if c == '\'' {
                quoted = !quoted;
                continue;
            }
            let numeric = !quoted && matches!(c, '0' | '#' | ',' | '.');
            match (stage, numeric) {
                (0, false) => prefix.push(c),
                (0, true) | (1, true) => {
                    stage = 1;
                    body.push(c);
                }
                (1, false) | (2, _) => {
                    stage = 2;
                    suffix.push(c);
                }
                _ => {}
            }
        }
        if quoted {
            return Err(invalid("Unclosed quote in number pattern"));
        }
        if !body.contains(['0', '#']) {
            return Err(invalid("Number pattern must contain at least one digit placeholder"));
        }

        let (integer_part, fraction_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body.as_str(), ""),
        };
        if fraction_part.contains(['.', ',']) {
            return Err(invalid("Malformed fraction part in number pattern"));
        }
        let min_integer_digits = integer_part.chars().filter(|c| *c == '0').count();
        let grouping_size = integer_part
            .rfind(',')
            .map(|pos| integer_part[pos + 1..].chars().count())
            .filter(|size| *size > 0);
        let min_fraction_digits = fraction_part.chars().filter(|c| *c == '0').count() as u32;
        let max_fraction_digits = fraction_part.chars().count() as u32;

        let multiplier = if prefix.contains('%') || suffix.contains('%') {
            100
        } else if prefix.contains('‰') || suffix.contains('‰') {
            1000
        } else {
            1
        };
        let currency = symbols.currency;
        Ok(Self {
            pattern: pattern.to_string(),
            prefix: prefix.replace('¤', currency),
            suffix: suffix.replace('¤', currency),
            min_integer_digits,
            grouping_size,
            min_fraction_digits,
            max_fraction_digits,
            multiplier,
            symbols,
        })
    }

    /// Format without the [`FormatOutput`] wrapper
    pub fn format_plain(&self, number: &Number) -> String {
        let negative = number.is_negative();
        let Some(value) = number.to_decimal() else {
            let body = if number.is_nan() { "NaN" } else { "∞" };
            let sign = if negative { "-" } else { "" };
            return format!("{sign}{}{body}{}", self.prefix, self.suffix);
        };
        let value = value * Decimal::from(self.multiplier);
        let rounded = value
            .abs()
            .round_dp_with_strategy(self.max_fraction_digits, RoundingStrategy::MidpointNearestEven);
        let text = rounded.to_string();
        let (int_digits, frac_digits) = match text.split_once('.') {
            Some((i, f)) => (i.to_string(), f.to_string()),
            None => (text.clone(), String::new()),
        };

        let mut frac = frac_digits;
        while frac.len() > self.min_fraction_digits as usize && frac.ends_with('0') {
            frac.pop();
        }
        while frac.len() < self.min_fraction_digits as usize {
            frac.push('0');
        }

        let mut int = int_digits.trim_start_matches('0').to_string();
        while int.len() < self.min_integer_digits {
            int.insert(0, '0');
        }
        if int.is_empty() && frac.is_empty() {
            int.push('0');
        }
        let int = match self.grouping_size {
            Some(size) => group_digits(&int, size, self.symbols.grouping),
            None => int,
        };

        let is_zero = rounded.is_zero();
        let mut out = String::new();
        if negative && !is_zero {
            out.push('-');
        }
        out.push_str(&self.prefix);
        out.push_str(&int);
        if !frac.is_empty() {
            out.push(self.symbols.decimal);
            out.push_str(&frac);
        }
        out.push_str(&self.suffix);
        out
    }
}

impl TemplateNumberFormat for DecimalPatternFormat {
    fn format(&self, number: &Number) -> TemplateResult<FormatOutput> {
        Ok(FormatOutput::Plain(self.format_plain(number)))
    }

    fn is_locale_bound(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        self.pattern.clone()
    }
}

fn group_digits(digits: &str, size: usize, separator: char) -> String {
    let count = digits.chars().count();
    let mut out = String::with_capacity(digits.len() + count / size);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (count - i) % size == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::str::FromStr;

    fn format(pattern: &str, locale: &str, number: Number) -> String {
        let locale = Locale::parse(locale).unwrap();
        let format = resolve_number_format(pattern, &locale, &IndexMap::new()).unwrap();
        format.format(&number).unwrap().as_str().to_string()
    }

    fn dec(s: &str) -> Number {
        Number::Decimal(Decimal::from_str(s).unwrap())
    }

    #[rstest]
    #[case("number", "en_US", dec("1234567.891"), "1,234,567.891")]
    #[case("number", "en_US", dec("0.12345"), "0.123")]
    #[case("number", "de_DE", dec("1234.5"), "1.234,5")]
    #[case("0.00", "en_US", Number::Integer(3), "3.00")]
    #[case("0.00", "en_US", dec("2.345"), "2.34")]
    #[case("0.00", "en_US", dec("2.355"), "2.36")]
    #[case("#.##", "en_US", dec("0.5"), ".5")]
    #[case("000", "en_US", Number::Integer(7), "007")]
    #[case("percent", "en_US", dec("0.256"), "26%")]
    #[case("currency", "en_US", dec("-1234.5"), "-$1,234.50")]
    #[case("'#'0", "en_US", Number::Integer(5), "#5")]
    fn test_pattern_formats(
        #[case] pattern: &str,
        #[case] locale: &str,
        #[case] number: Number,
        #[case] expected: &str,
    ) {
        assert_eq!(format(pattern, locale, number), expected);
    }

    #[test]
    fn test_computer_format() {
        assert_eq!(format("c", "de_DE", dec("1234.50")), "1234.5");
        assert_eq!(format("computer", "en_US", Number::Double(f64::INFINITY)), "INF");
        assert_eq!(format("c", "en_US", Number::Double(1e21)), "1000000000000000000000");
        assert_eq!(format("c", "en_US", Number::Double(0.1)), "0.1");
    }

    #[test]
    fn test_unknown_custom_format() {
        let result = resolve_number_format("@money", &Locale::us(), &IndexMap::new());
        assert!(matches!(
            result,
            Err(TemplateError::UnknownCustomFormat { ref name, .. }) if name == "money"
        ));
    }

    #[test]
    fn test_malformed_pattern() {
        assert!(resolve_number_format("abc", &Locale::us(), &IndexMap::new()).is_err());
    }
}
