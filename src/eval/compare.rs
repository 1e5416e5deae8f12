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

//! Cross-type comparison used by relational operators, `?seq_contains` and friends

use super::{coerce_to_string, EvalContext};
use crate::error::{TemplateError, TemplateResult};
use crate::model::{type_description_with_article, DateKind, Value};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
        }
    }

    /// Parse an operator symbol; the word forms (`lt`, `gte`, ...) are accepted too
    pub fn from_symbol(symbol: &str) -> Option<CmpOp> {
        Some(match symbol {
            "==" | "=" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            "<" | "lt" => CmpOp::Lt,
            ">" | "gt" => CmpOp::Gt,
            "<=" | "lte" => CmpOp::Le,
            ">=" | "gte" => CmpOp::Ge,
            _ => return None,
        })
    }

    /// `==` or `!=`
    pub fn is_equality(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    fn holds_for(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Caller choices for a comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// A missing left operand makes the result `false` instead of an error
    pub left_null_is_false: bool,
    /// A missing right operand makes the result `false` instead of an error
    pub right_null_is_false: bool,
    /// Values of incomparable types are unequal instead of an error
    pub lenient: bool,
}

impl CompareOptions {
    /// Strict comparison
    pub fn strict() -> Self {
        Self::default()
    }

    /// Incomparable types are simply not equal
    pub fn lenient() -> Self {
        Self {
            lenient: true,
            ..Self::default()
        }
    }
}

/// One side of a comparison
#[derive(Clone, Copy)]
pub struct Operand<'a> {
    /// The value; `None` when null or missing
    pub value: Option<&'a Value>,
    description: Description<'a>,
}

/// How the operand appears in the template, for messages
#[derive(Clone, Copy)]
enum Description<'a> {
    Text(&'a str),
    Deferred(&'a dyn Fn() -> String),
}

impl<'a> Operand<'a> {
    /// Create an operand
    pub fn new(value: Option<&'a Value>, description: &'a str) -> Self {
        Self {
            value,
            description: Description::Text(description),
        }
    }

    /// Create an operand whose description is only built for messages
    pub fn described_by(value: Option<&'a Value>, describe: &'a dyn Fn() -> String) -> Self {
        Self {
            value,
            description: Description::Deferred(describe),
        }
    }

    /// How the operand appears in the template
    pub fn description(&self) -> Cow<'a, str> {
        match self.description {
            Description::Text(text) => Cow::Borrowed(text),
            Description::Deferred(describe) => Cow::Owned(describe()),
        }
    }
}

impl fmt::Debug for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operand")
            .field("value", &self.value)
            .field("description", &self.description())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn name(self) -> &'static str {
        match self {
            Side::Left => "left-hand",
            Side::Right => "right-hand",
        }
    }
}

/// Compare two values
///
/// Numbers go through the arithmetic engine, dates compare their instants
/// when both have the same known kind, strings compare through the
/// collator, and booleans by value. Strings and booleans only support
/// `==` and `!=`.
pub fn compare<C: EvalContext + ?Sized>(
    ctx: &mut C,
    left: Operand<'_>,
    op: CmpOp,
    right: Operand<'_>,
    options: CompareOptions,
) -> TemplateResult<bool> {
    let empty = Value::string("");
    let left_value = match resolve_missing(ctx, left, Side::Left, options.left_null_is_false)? {
        Some(Resolved::Value(v)) => v,
        Some(Resolved::Empty) => &empty,
        None => return Ok(false),
    };
    let right_value = match resolve_missing(ctx, right, Side::Right, options.right_null_is_false)? {
        Some(Resolved::Value(v)) => v,
        Some(Resolved::Empty) => &empty,
        None => return Ok(false),
    };

    if let (Some(a), Some(b)) = (left_value.number_value(), right_value.number_value()) {
        let ordering = ctx.arithmetic_engine().compare(&a, &b)?;
        return Ok(op.holds_for(ordering));
    }

    if let (Some(left_kind), Some(right_kind)) = (left_value.date_kind(), right_value.date_kind()) {
        for (kind, side) in [(left_kind, Side::Left), (right_kind, Side::Right)] {
            if kind == DateKind::Unknown {
                return Err(TemplateError::AmbiguousDateKind {
                    message: format!(
                        "The {} operand of the comparison is a date-like value where it's not known if it's a date (no time part), time, or date-time value. Use ?date, ?time or ?datetime to specify which.",
                        side.name()
                    ),
                });
            }
        }
        if left_kind != right_kind {
            return Err(TemplateError::type_mismatch(format!(
                "Can't compare dates of different types. Left date type is {}, right date type is {}.",
                left_kind.name(),
                right_kind.name()
            )));
        }
        let (Some(a), Some(b)) = (left_value.date_value(), right_value.date_value()) else {
            return Err(TemplateError::evaluation("Date value unavailable"));
        };
        return Ok(op.holds_for(a?.instant().cmp(&b?.instant())));
    }

    if let (Some(a), Some(b)) = (left_value.string_value(), right_value.string_value()) {
        if !op.is_equality() {
            return Err(TemplateError::UnsupportedOperator {
                operator: op.symbol().to_string(),
                operand_type: "string".to_string(),
            });
        }
        let equal = ctx.collator().equals(&a, &b);
        return Ok(equal == (op == CmpOp::Eq));
    }

    if let (Some(a), Some(b)) = (left_value.boolean_value(), right_value.boolean_value()) {
        if !op.is_equality() {
            return Err(TemplateError::UnsupportedOperator {
                operator: op.symbol().to_string(),
                operand_type: "boolean".to_string(),
            });
        }
        return Ok((a == b) == (op == CmpOp::Eq));
    }

    if ctx.is_classic_compatible() {
        let a = coerce_to_string(ctx, Some(left_value), &left.description(), None)?;
        let b = coerce_to_string(ctx, Some(right_value), &right.description(), None)?;
        return Ok(op.holds_for(ctx.collator().compare(&a, &b)));
    }

    if options.lenient {
        match op {
            CmpOp::Eq => return Ok(false),
            CmpOp::Ne => return Ok(true),
            _ => {}
        }
    }

    Err(TemplateError::type_mismatch(format!(
        "Can't compare values of these types. Allowed comparisons are between two numbers, two strings, two dates, or two booleans.\nLeft hand operand is {}.\nRight hand operand is {}.",
        type_description_with_article(left_value),
        type_description_with_article(right_value)
    )))
}

enum Resolved<'a> {
    Value(&'a Value),
    Empty,
}

fn resolve_missing<'a, C: EvalContext + ?Sized>(
    ctx: &C,
    operand: Operand<'a>,
    side: Side,
    null_is_false: bool,
) -> TemplateResult<Option<Resolved<'a>>> {
    match operand.value {
        Some(value) => Ok(Some(Resolved::Value(value))),
        None if ctx.is_classic_compatible() => Ok(Some(Resolved::Empty)),
        None if null_is_false => Ok(None),
        None => Err(TemplateError::invalid_reference(format!(
            "{}  [the {} operand of the comparison]",
            operand.description(),
            side.name()
        ))),
    }
}

/// Total order used by sorting for two values of the same key type
///
/// Returns `None` when the values are not of a comparable common type.
pub(crate) fn sort_order<C: EvalContext + ?Sized>(
    ctx: &C,
    a: &Value,
    b: &Value,
) -> Option<TemplateResult<Ordering>> {
    if let (Some(x), Some(y)) = (a.number_value(), b.number_value()) {
        return Some(ctx.arithmetic_engine().compare(&x, &y));
    }
    if let (Some(x), Some(y)) = (a.date_value(), b.date_value()) {
        return Some(x.and_then(|x| y.map(|y| x.instant().cmp(&y.instant()))));
    }
    if let (Some(x), Some(y)) = (a.string_value(), b.string_value()) {
        return Some(Ok(ctx.collator().compare(&x, &y)));
    }
    if let (Some(x), Some(y)) = (a.boolean_value(), b.boolean_value()) {
        return Some(Ok(x.cmp(&y)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::test_support::FixedContext;
    use crate::model::{Number, TemplateDate};
    use chrono::{NaiveDate, NaiveTime};
    use rstest::rstest;

    fn cmp(ctx: &mut FixedContext, a: Option<&Value>, op: CmpOp, b: Option<&Value>) -> TemplateResult<bool> {
        compare(ctx, Operand::new(a, "a"), op, Operand::new(b, "b"), CompareOptions::strict())
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 2)]
    #[case(-5, 3)]
    fn test_numbers_are_trichotomous(#[case] a: i64, #[case] b: i64) {
        let mut ctx = FixedContext::default();
        let (a, b) = (Value::from(a), Value::from(b));
        let holds: Vec<bool> = [CmpOp::Lt, CmpOp::Eq, CmpOp::Gt]
            .iter()
            .map(|op| cmp(&mut ctx, Some(&a), *op, Some(&b)).unwrap())
            .collect();
        assert_eq!(holds.iter().filter(|h| **h).count(), 1);
        assert_eq!(
            cmp(&mut ctx, Some(&a), CmpOp::Eq, Some(&b)).unwrap(),
            cmp(&mut ctx, Some(&b), CmpOp::Eq, Some(&a)).unwrap()
        );
    }

    #[test]
    fn test_decimal_precision() {
        let mut ctx = FixedContext::default();
        let a = Value::Number(Number::Decimal("1.10".parse().unwrap()));
        let b = Value::Number(Number::Decimal("1.1".parse().unwrap()));
        assert!(cmp(&mut ctx, Some(&a), CmpOp::Eq, Some(&b)).unwrap());
    }

    #[test]
    fn test_strings_only_support_equality() {
        let mut ctx = FixedContext::default();
        let (a, b) = (Value::from("a"), Value::from("b"));
        assert!(cmp(&mut ctx, Some(&a), CmpOp::Ne, Some(&b)).unwrap());
        assert!(matches!(
            cmp(&mut ctx, Some(&a), CmpOp::Lt, Some(&b)),
            Err(TemplateError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_booleans() {
        let mut ctx = FixedContext::default();
        let (t, f) = (Value::from(true), Value::from(false));
        assert!(cmp(&mut ctx, Some(&t), CmpOp::Ne, Some(&f)).unwrap());
        assert!(cmp(&mut ctx, Some(&t), CmpOp::Ge, Some(&f)).is_err());
    }

    #[test]
    fn test_dates_of_different_kinds() {
        let mut ctx = FixedContext::default();
        let date = Value::from(TemplateDate::from_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let time = Value::from(TemplateDate::from_time(NaiveTime::from_hms_opt(10, 0, 0).unwrap()));
        assert!(matches!(
            cmp(&mut ctx, Some(&date), CmpOp::Eq, Some(&time)),
            Err(TemplateError::TypeMismatch { .. })
        ));

        let unknown = Value::Date(TemplateDate::from_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).with_kind(DateKind::Unknown));
        let error = cmp(&mut ctx, Some(&unknown), CmpOp::Eq, Some(&date)).unwrap_err();
        assert!(error.to_string().contains("left-hand"));
        assert!(error.to_string().contains("?datetime"));
    }

    #[test]
    fn test_missing_operands() {
        let mut ctx = FixedContext::default();
        let one = Value::from(1);
        assert!(matches!(
            cmp(&mut ctx, None, CmpOp::Eq, Some(&one)),
            Err(TemplateError::InvalidReference { .. })
        ));
        let options = CompareOptions {
            right_null_is_false: true,
            ..CompareOptions::default()
        };
        assert!(!compare(&mut ctx, Operand::new(Some(&one), "a"), CmpOp::Ne, Operand::new(None, "b"), options).unwrap());

        ctx.classic = true;
        let empty = Value::from("");
        assert!(cmp(&mut ctx, None, CmpOp::Eq, Some(&empty)).unwrap());
    }

    #[test]
    fn test_mixed_types() {
        let mut ctx = FixedContext::default();
        let (n, s) = (Value::from(1), Value::from("1"));
        let error = cmp(&mut ctx, Some(&n), CmpOp::Eq, Some(&s)).unwrap_err();
        assert!(error.to_string().contains("Left hand operand is a number"));

        let lenient = |ctx: &mut FixedContext, op| {
            compare(ctx, Operand::new(Some(&n), "n"), op, Operand::new(Some(&s), "s"), CompareOptions::lenient())
        };
        assert!(!lenient(&mut ctx, CmpOp::Eq).unwrap());
        assert!(lenient(&mut ctx, CmpOp::Ne).unwrap());
        assert!(lenient(&mut ctx, CmpOp::Lt).is_err());

        ctx.classic = true;
        assert!(cmp(&mut ctx, Some(&n), CmpOp::Eq, Some(&s)).unwrap());
    }
}
