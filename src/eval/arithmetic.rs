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

//! Arithmetic engines: number comparison and string to number conversion

use crate::error::{TemplateError, TemplateResult};
use crate::model::Number;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Numeric semantics used by comparisons, sorting and `?number`
pub trait ArithmeticEngine: Send + Sync + fmt::Debug {
    /// Compare two numbers
    fn compare(&self, left: &Number, right: &Number) -> TemplateResult<Ordering>;

    /// Parse a number from text
    fn to_number(&self, text: &str) -> TemplateResult<Number>;

    /// Name used in messages
    fn name(&self) -> &str;
}

/// Compares with full decimal precision
///
/// Integers and decimals are compared exactly. Doubles are converted to
/// decimals when they are finite; infinities order before and after every
/// finite value. NaN is not comparable.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigDecimalEngine;

impl ArithmeticEngine for BigDecimalEngine {
    fn compare(&self, left: &Number, right: &Number) -> TemplateResult<Ordering> {
        reject_nan(left, right)?;
        if let (Number::Integer(a), Number::Integer(b)) = (left, right) {
            return Ok(a.cmp(b));
        }
        match (left.to_decimal(), right.to_decimal()) {
            (Some(a), Some(b)) => Ok(a.cmp(&b)),
            _ => Ok(compare_f64(left.to_f64(), right.to_f64())),
        }
    }

    fn to_number(&self, text: &str) -> TemplateResult<Number> {
        parse_number(text, false)
    }

    fn name(&self) -> &str {
        "bigdecimal"
    }
}

/// Keeps integers as integers and falls back to doubles
///
/// Two integers compare as integers, a double on either side makes the
/// comparison a double comparison, anything else compares as decimals.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConservativeEngine;

impl ArithmeticEngine for ConservativeEngine {
    fn compare(&self, left: &Number, right: &Number) -> TemplateResult<Ordering> {
        reject_nan(left, right)?;
        match (left, right) {
            (Number::Integer(a), Number::Integer(b)) => Ok(a.cmp(b)),
            (Number::Double(_), _) | (_, Number::Double(_)) => {
                Ok(compare_f64(left.to_f64(), right.to_f64()))
            }
            _ => match (left.to_decimal(), right.to_decimal()) {
                (Some(a), Some(b)) => Ok(a.cmp(&b)),
                _ => Ok(compare_f64(left.to_f64(), right.to_f64())),
            },
        }
    }

    fn to_number(&self, text: &str) -> TemplateResult<Number> {
        parse_number(text, true)
    }

    fn name(&self) -> &str {
        "conservative"
    }
}

fn reject_nan(left: &Number, right: &Number) -> TemplateResult<()> {
    if left.is_nan() || right.is_nan() {
        return Err(TemplateError::evaluation(
            "Can't compare NaN (not-a-number) values; use ?is_nan to test for them.",
        ));
    }
    Ok(())
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn parse_number(text: &str, prefer_integer: bool) -> TemplateResult<Number> {
    let trimmed = text.trim();
    match trimmed {
        "INF" | "+INF" | "Infinity" => return Ok(Number::Double(f64::INFINITY)),
        "-INF" | "-Infinity" => return Ok(Number::Double(f64::NEG_INFINITY)),
        "NaN" => return Ok(Number::Double(f64::NAN)),
        _ => {}
    }
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if prefer_integer {
        if let Ok(i) = unsigned.parse::<i64>() {
            return Ok(Number::Integer(i));
        }
    }
    let parsed = if unsigned.contains(['e', 'E']) {
        Decimal::from_scientific(unsigned)
    } else {
        Decimal::from_str(unsigned)
    };
    match parsed {
        Ok(d) => Ok(Number::Decimal(d)),
        Err(_) => match unsigned.parse::<f64>() {
            Ok(f) if f.is_finite() && !unsigned.is_empty() => Ok(Number::Double(f)),
            _ => Err(TemplateError::evaluation(format!(
                "Can't convert this string to number: \"{text}\""
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn dec(s: &str) -> Number {
        Number::Decimal(Decimal::from_str(s).unwrap())
    }

    #[rstest]
    #[case(Number::Integer(1), dec("1.0"), Ordering::Equal)]
    #[case(dec("0.5"), Number::Double(0.5), Ordering::Equal)]
    #[case(Number::Integer(2), Number::Double(f64::INFINITY), Ordering::Less)]
    #[case(dec("-3.5"), Number::Integer(-3), Ordering::Less)]
    fn test_bigdecimal_compare(#[case] a: Number, #[case] b: Number, #[case] expected: Ordering) {
        let engine = BigDecimalEngine;
        assert_eq!(engine.compare(&a, &b).unwrap(), expected);
        assert_eq!(engine.compare(&b, &a).unwrap(), expected.reverse());
    }

    #[test]
    fn test_nan_is_not_comparable() {
        let nan = Number::Double(f64::NAN);
        assert!(BigDecimalEngine.compare(&nan, &Number::Integer(1)).is_err());
        assert!(ConservativeEngine.compare(&Number::Integer(1), &nan).is_err());
    }

    #[test]
    fn test_to_number() {
        assert_eq!(BigDecimalEngine.to_number(" 1.50 ").unwrap(), dec("1.50"));
        assert_eq!(BigDecimalEngine.to_number("1e3").unwrap(), dec("1000"));
        assert_eq!(ConservativeEngine.to_number("42").unwrap(), Number::Integer(42));
        assert!(BigDecimalEngine.to_number("-INF").unwrap().is_infinite());
        assert!(BigDecimalEngine.to_number("12abc").is_err());
    }
}
