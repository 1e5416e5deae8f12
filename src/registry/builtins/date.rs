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

//! Date built-ins
//!
//! `?date`, `?time` and `?datetime` mark the kind of a date value whose kind
//! is unknown (or narrow a date-time); applied to a string they parse it.

use super::super::{BuiltIn, BuiltInCall, BuiltInRegistry};
use super::string::DateParser;
use crate::environment::Environment;
use crate::error::{EvalResult, TemplateError};
use crate::format::{IsoDateFormat, IsoFlavor, TemplateDateFormat, TimeZone};
use crate::model::{DateKind, TemplateDate, Value};

pub(super) fn register(registry: &mut BuiltInRegistry) {
    registry.register("date", set_kind(DateKind::Date));
    registry.register("time", set_kind(DateKind::Time));
    registry.register("datetime", set_kind(DateKind::DateTime));
    registry.register("date_if_unknown", kind_if_unknown(DateKind::Date));
    registry.register("time_if_unknown", kind_if_unknown(DateKind::Time));
    registry.register("datetime_if_unknown", kind_if_unknown(DateKind::DateTime));
    registry.register("iso_utc", iso(true));
    registry.register("iso_local", iso(false));
}

fn set_kind(kind: DateKind) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let value = call.target_value(env)?;
        let Some(date) = value.date_value() else {
            if value.is_string() {
                let text = env.coerce_to_string(Some(&value), &call.target.canonical_form())?;
                return Ok(Some(DateParser::value(text, kind, call.name, env)));
            }
            return Err(call.unexpected_type(&value, "date or string").into());
        };
        Ok(Some(Value::Date(with_kind(date?, kind)?)))
    }
}

/// Narrow a date to `kind`
///
/// Only unknown and date-time values can be narrowed; asking a date for its
/// time part (or the other way around) is an error.
fn with_kind(date: TemplateDate, kind: DateKind) -> Result<TemplateDate, TemplateError> {
    match date.kind() {
        current if current == kind => Ok(date),
        DateKind::Unknown | DateKind::DateTime => Ok(date.with_kind(kind)),
        current => Err(TemplateError::type_mismatch(format!(
            "Cannot convert {} into {}",
            current.name(),
            kind.name()
        ))),
    }
}

fn kind_if_unknown(kind: DateKind) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let date = call.target_date(env)?;
        if date.kind() == DateKind::Unknown {
            return Ok(Some(Value::Date(date.with_kind(kind))));
        }
        Ok(Some(Value::Date(date)))
    }
}

fn iso(utc: bool) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let date = call.target_date(env)?;
        if date.kind() == DateKind::Unknown {
            return Err(TemplateError::AmbiguousDateKind {
                message: format!(
                    "?{} can't format a date whose kind is unknown. Use ?date, ?time or ?datetime first.",
                    call.name
                ),
            }
            .into());
        }
        let time_zone = if utc {
            TimeZone::utc()
        } else {
            env.settings().time_zone().clone()
        };
        let format = IsoDateFormat::parse(IsoFlavor::Iso, "", date.kind(), time_zone)?;
        let text = format.format(&date)?.as_str().to_string();
        Ok(Some(Value::from(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone as _, Utc};
    use pretty_assertions::assert_eq;

    fn datetime() -> TemplateDate {
        TemplateDate::from_datetime(Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap())
    }

    #[test]
    fn test_narrowing() {
        let narrowed = with_kind(datetime(), DateKind::Date).unwrap();
        assert_eq!(narrowed.kind(), DateKind::Date);
        let unknown = datetime().with_kind(DateKind::Unknown);
        assert_eq!(with_kind(unknown, DateKind::Time).unwrap().kind(), DateKind::Time);
    }

    #[test]
    fn test_date_cannot_become_time() {
        let date = TemplateDate::from_date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        let error = with_kind(date, DateKind::Time).unwrap_err();
        assert_eq!(error.to_string(), "Cannot convert date into time");
    }
}
