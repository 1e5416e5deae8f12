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

//! Ready-made custom formats, registered by name in
//! `custom_number_formats` and `custom_date_formats`

use super::{
    DateFormatFactory, DateFormatRequest, FormatOutput, Locale, NumberFormatFactory,
    TemplateDateFormat, TemplateNumberFormat,
};
use crate::error::{TemplateError, TemplateResult};
use crate::model::{DateKind, Number, TemplateDate};
use chrono::DateTime;
use std::sync::Arc;

/// `@base 16` style integer formats
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseNNumberFormatFactory;

impl NumberFormatFactory for BaseNNumberFormatFactory {
    fn get(&self, params: &str, _locale: &Locale) -> TemplateResult<Arc<dyn TemplateNumberFormat>> {
        let base: u32 = params.trim().parse().map_err(|_| TemplateError::InvalidFormat {
            format: format!("@base {params}"),
            message: "The parameter must be an integer base".to_string(),
        })?;
        if !(2..=36).contains(&base) {
            return Err(TemplateError::InvalidFormat {
                format: format!("@base {params}"),
                message: format!("Base must be between 2 and 36, but was {base}"),
            });
        }
        Ok(Arc::new(BaseNNumberFormat { base }))
    }
}

#[derive(Debug, Clone, Copy)]
struct BaseNNumberFormat {
    base: u32,
}

impl TemplateNumberFormat for BaseNNumberFormat {
    fn format(&self, number: &Number) -> TemplateResult<FormatOutput> {
        let value = number.to_i64_exact().ok_or_else(|| TemplateError::InvalidFormat {
            format: self.description(),
            message: format!("Can only format integers, but got {number}"),
        })?;
        let mut digits = Vec::new();
        let mut rest = value.unsigned_abs();
        loop {
            let digit = (rest % self.base as u64) as u32;
            digits.push(std::char::from_digit(digit, self.base).unwrap_or('?'));
            rest /= self.base as u64;
            if rest == 0 {
                break;
            }
        }
        if value < 0 {
            digits.push('-');
        }
        Ok(FormatOutput::Plain(digits.iter().rev().collect()))
    }

    fn is_locale_bound(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        format!("@base {}", self.base)
    }
}

/// `@epoch` milliseconds since the epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochMillisDateFormatFactory;

impl DateFormatFactory for EpochMillisDateFormatFactory {
    fn get(
        &self,
        params: &str,
        _request: &DateFormatRequest<'_>,
    ) -> TemplateResult<Arc<dyn TemplateDateFormat>> {
        if !params.trim().is_empty() {
            return Err(TemplateError::InvalidFormat {
                format: format!("@epoch {params}"),
                message: "This format has no parameters".to_string(),
            });
        }
        Ok(Arc::new(EpochMillisDateFormat))
    }
}

#[derive(Debug, Clone, Copy)]
struct EpochMillisDateFormat;

impl TemplateDateFormat for EpochMillisDateFormat {
    fn format(&self, date: &TemplateDate) -> TemplateResult<FormatOutput> {
        Ok(FormatOutput::Plain(date.instant().timestamp_millis().to_string()))
    }

    fn parse(&self, text: &str, kind: DateKind) -> TemplateResult<TemplateDate> {
        let millis: i64 = text.trim().parse().map_err(|_| TemplateError::InvalidFormat {
            format: "@epoch".to_string(),
            message: format!("Not an integer: \"{text}\""),
        })?;
        let instant = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            TemplateError::InvalidFormat {
                format: "@epoch".to_string(),
                message: format!("Out of range: {millis}"),
            }
        })?;
        Ok(TemplateDate::new(instant, kind))
    }

    fn is_locale_bound(&self) -> bool {
        false
    }

    fn is_time_zone_bound(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        "@epoch".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{resolve_number_format, CustomNumberFormats};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base_n_via_registry() {
        let mut custom = CustomNumberFormats::new();
        custom.insert("base".to_string(), Arc::new(BaseNNumberFormatFactory));
        let format = resolve_number_format("@base 16", &Locale::us(), &custom).unwrap();
        assert_eq!(format.format(&Number::Integer(255)).unwrap().as_str(), "ff");
        assert_eq!(format.format(&Number::Integer(-10)).unwrap().as_str(), "-a");
        assert!(format.format(&Number::Double(1.5)).is_err());
        assert!(resolve_number_format("@base 99", &Locale::us(), &custom).is_err());
    }

    #[test]
    fn test_epoch_round_trip() {
        let format = EpochMillisDateFormat;
        let date = format.parse("86400000", DateKind::Date).unwrap();
        assert_eq!(format.format(&date).unwrap().as_str(), "86400000");
        assert_eq!(date.kind(), DateKind::Date);
    }
}
