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

//! Conversion of values to text

use super::EvalContext;
use crate::error::{TemplateError, TemplateResult};
use crate::format::date::UNKNOWN_KIND_FORMAT_MESSAGE;
use crate::format::FormatOutput;
use crate::model::{type_description, DateKind, Number, TemplateDate, Value};

/// Format a value for output
///
/// Numbers and dates go through the current formats, which may produce
/// markup. Containers, callables and nodes are rejected with a
/// [`TemplateError::NonString`] carrying `hint`. A missing value is an
/// error, except in classic compatible mode where it is the empty string.
pub fn format_value<C: EvalContext + ?Sized>(
    ctx: &mut C,
    value: Option<&Value>,
    description: &str,
    hint: Option<&str>,
) -> TemplateResult<FormatOutput> {
    let Some(value) = value else {
        if ctx.is_classic_compatible() {
            return Ok(FormatOutput::Plain(String::new()));
        }
        return Err(TemplateError::invalid_reference(description));
    };
    match value {
        Value::String(s) => return Ok(FormatOutput::Plain(s.to_string())),
        Value::Number(n) => return format_number(ctx, n),
        Value::Date(d) => return format_date(ctx, d),
        Value::Boolean(b) => return Ok(FormatOutput::Plain(format_boolean(ctx, *b))),
        _ => {}
    }
    if let Some(n) = value.number_value() {
        return format_number(ctx, &n);
    }
    if let Some(date) = value.date_value() {
        return format_date(ctx, &date?);
    }
    if let Some(s) = value.string_value() {
        return Ok(FormatOutput::Plain(s.into_owned()));
    }
    if let Some(b) = value.boolean_value() {
        return Ok(FormatOutput::Plain(format_boolean(ctx, b)));
    }
    Err(TemplateError::NonString {
        description: description.to_string(),
        actual_type: type_description(value),
        hint: hint.map(str::to_string),
    })
}

/// Convert a value to plain text
///
/// Like [`format_value`], but markup produced by a format is rejected.
pub fn coerce_to_string<C: EvalContext + ?Sized>(
    ctx: &mut C,
    value: Option<&Value>,
    description: &str,
    hint: Option<&str>,
) -> TemplateResult<String> {
    format_value(ctx, value, description, hint)?.into_plain(description)
}

/// Format a number with the current number format
pub fn format_number<C: EvalContext + ?Sized>(
    ctx: &mut C,
    number: &Number,
) -> TemplateResult<FormatOutput> {
    ctx.number_format()?.format(number)
}

/// Format a date with the current format for its kind
pub fn format_date<C: EvalContext + ?Sized>(
    ctx: &mut C,
    date: &TemplateDate,
) -> TemplateResult<FormatOutput> {
    if date.kind() == DateKind::Unknown {
        return Err(TemplateError::AmbiguousDateKind {
            message: UNKNOWN_KIND_FORMAT_MESSAGE.to_string(),
        });
    }
    ctx.date_format(date.kind(), date.is_zoneless())?.format(date)
}

/// Format a boolean with the current boolean format
///
/// Classic compatible mode prints `true` and the empty string.
pub fn format_boolean<C: EvalContext + ?Sized>(ctx: &C, value: bool) -> String {
    if ctx.is_classic_compatible() {
        return if value { "true".to_string() } else { String::new() };
    }
    ctx.boolean_format().format(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::test_support::FixedContext;
    use crate::format::BooleanFormat;
    use crate::model::SimpleSequence;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Arc;

    fn text(ctx: &mut FixedContext, value: Option<&Value>) -> TemplateResult<String> {
        coerce_to_string(ctx, value, "x", Some("use ?join"))
    }

    #[test]
    fn test_scalars() {
        let mut ctx = FixedContext::default();
        assert_eq!(text(&mut ctx, Some(&Value::from("s"))).unwrap(), "s");
        assert_eq!(text(&mut ctx, Some(&Value::from(1234))).unwrap(), "1,234");
        let decimal = Value::Number(Number::Decimal(Decimal::from_str("2.34567").unwrap()));
        assert_eq!(text(&mut ctx, Some(&decimal)).unwrap(), "2.346");
        let date = Value::from(TemplateDate::from_date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()));
        assert_eq!(text(&mut ctx, Some(&date)).unwrap(), "2024-03-05");
    }

    #[test]
    fn test_booleans_follow_boolean_format() {
        let mut ctx = FixedContext {
            boolean_format: BooleanFormat::parse("yes,no").unwrap(),
            ..FixedContext::default()
        };
        assert_eq!(text(&mut ctx, Some(&Value::from(true))).unwrap(), "yes");
        ctx.classic = true;
        assert_eq!(text(&mut ctx, Some(&Value::from(false))).unwrap(), "");
    }

    #[test]
    fn test_containers_are_rejected_with_hint() {
        let mut ctx = FixedContext::default();
        let seq = Value::Object(Arc::new(SimpleSequence::from_values(vec![Value::from(1)])));
        let error = text(&mut ctx, Some(&seq)).unwrap_err();
        assert!(matches!(
            &error,
            TemplateError::NonString { actual_type, hint: Some(hint), .. }
                if actual_type == "sequence" && hint == "use ?join"
        ));
    }

    #[test]
    fn test_missing_value() {
        let mut ctx = FixedContext::default();
        assert!(matches!(
            text(&mut ctx, None),
            Err(TemplateError::InvalidReference { .. })
        ));
        ctx.classic = true;
        assert_eq!(text(&mut ctx, None).unwrap(), "");
    }

    #[test]
    fn test_unknown_date_kind() {
        let mut ctx = FixedContext::default();
        let date = TemplateDate::from_date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
            .with_kind(DateKind::Unknown);
        assert!(matches!(
            text(&mut ctx, Some(&Value::Date(date))),
            Err(TemplateError::AmbiguousDateKind { .. })
        ));
    }
}
