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

//! Date formats: named styles and letter patterns

use super::iso::{IsoDateFormat, IsoFlavor};
use super::locale::{DateNames, Locale};
use super::time_zone::{format_gmt_id, TimeZone};
use super::{
    split_custom_format, CustomDateFormats, DateFormatRequest, FormatOutput, TemplateDateFormat,
};
use crate::error::{TemplateError, TemplateResult};
use crate::model::{DateKind, TemplateDate};
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone as _,
    Timelike, Utc,
};
use std::sync::Arc;

/// Message used whenever a date of unknown kind has to be formatted
pub(crate) const UNKNOWN_KIND_FORMAT_MESSAGE: &str = "Can't convert the date to string, because it isn't known if it's a date (no time part), time or date-time value. Use ?date, ?time or ?datetime to specify which.";

/// Resolve a date format string for a date kind
///
/// Recognized forms: `xs ...` and `iso ...` (ISO 8601), `@name params`,
/// the styles `short`, `medium`, `long` and `full` (for date-times also
/// `date-style_time-style`, like `short_medium`), and letter patterns like
/// `yyyy-MM-dd HH:mm`. An empty format means `medium`.
pub fn resolve_date_format(
    format: &str,
    request: &DateFormatRequest<'_>,
    custom: &CustomDateFormats,
) -> TemplateResult<Arc<dyn TemplateDateFormat>> {
    if request.kind == DateKind::Unknown {
        return Err(TemplateError::AmbiguousDateKind {
            message: UNKNOWN_KIND_FORMAT_MESSAGE.to_string(),
        });
    }
    let format = if format.trim().is_empty() { "medium" } else { format };
    if let Some(params) = strip_keyword(format, "xs") {
        return Ok(Arc::new(IsoDateFormat::parse(
            IsoFlavor::Xs,
            params,
            request.kind,
            request.time_zone.clone(),
        )?));
    }
    if let Some(params) = strip_keyword(format, "iso") {
        return Ok(Arc::new(IsoDateFormat::parse(
            IsoFlavor::Iso,
            params,
            request.kind,
            request.time_zone.clone(),
        )?));
    }
    if let Some((name, params)) = split_custom_format(format) {
        let factory = custom
            .get(name)
            .ok_or_else(|| TemplateError::UnknownCustomFormat {
                kind: "date".to_string(),
                name: name.to_string(),
            })?;
        return factory.get(params, request);
    }
    let pattern = match style_pattern(format, request.kind, request.locale) {
        Some(pattern) => pattern,
        None => format.strip_prefix('@').unwrap_or(format).to_string(),
    };
    Ok(Arc::new(JavaPatternDateFormat::new(
        &pattern,
        format,
        request.locale,
        request.time_zone.clone(),
    )?))
}

fn strip_keyword<'a>(format: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = format.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('_') {
        Some(rest.trim_start_matches(['_', ' ']))
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Short,
    Medium,
    Long,
    Full,
}

fn parse_style(name: &str) -> Option<Style> {
    match name {
        "short" => Some(Style::Short),
        "medium" => Some(Style::Medium),
        "long" => Some(Style::Long),
        "full" => Some(Style::Full),
        _ => None,
    }
}

fn style_pattern(format: &str, kind: DateKind, locale: &Locale) -> Option<String> {
    let (date_style, time_style) = match format.split_once('_') {
        Some((d, t)) if kind == DateKind::DateTime => (parse_style(d)?, parse_style(t)?),
        Some(_) => return None,
        None => {
            let style = parse_style(format)?;
            (style, style)
        }
    };
    let german = locale.language() == "de";
    let date = match (date_style, german) {
        (Style::Short, false) => "M/d/yy",
        (Style::Medium, false) => "MMM d, yyyy",
        (Style::Long, false) => "MMMM d, yyyy",
        (Style::Full, false) => "EEEE, MMMM d, yyyy",
        (Style::Short, true) => "dd.MM.yy",
        (Style::Medium, true) => "dd.MM.yyyy",
        (Style::Long, true) => "d. MMMM yyyy",
        (Style::Full, true) => "EEEE, d. MMMM yyyy",
    };
    let time = match (time_style, german) {
        (Style::Short, false) => "h:mm a",
        (Style::Medium, false) => "h:mm:ss a",
        (Style::Long | Style::Full, false) => "h:mm:ss a z",
        (Style::Short, true) => "HH:mm",
        (Style::Medium, true) => "HH:mm:ss",
        (Style::Long | Style::Full, true) => "HH:mm:ss z",
    };
    Some(match kind {
        DateKind::Date => date.to_string(),
        DateKind::Time => time.to_string(),
        _ => format!("{date}, {time}"),
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Field(char, usize),
}

fn tokenize(pattern: &str) -> TemplateResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars().peekable();
    let mut literal = String::new();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                literal.push('\'');
                continue;
            }
            let mut closed = false;
            while let Some(q) = chars.next() {
                if q == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        literal.push('\'');
                        continue;
                    }
                    closed = true;
                    break;
                }
                literal.push(q);
            }
            if !closed {
                return Err(TemplateError::InvalidFormat {
                    format: pattern.to_string(),
                    message: "Unclosed quote in date pattern".to_string(),
                });
            }
        } else if c.is_ascii_alphabetic() {
            if !"GyMdEaHkKhmsSzZXDuw".contains(c) {
                return Err(TemplateError::InvalidFormat {
                    format: pattern.to_string(),
                    message: format!("Illegal pattern character '{c}'"),
                });
            }
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            let mut count = 1;
            while chars.peek() == Some(&c) {
                chars.next();
                count += 1;
            }
            tokens.push(Token::Field(c, count));
        } else {
            literal.push(c);
        }
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

/// Letter pattern date format (`yyyy-MM-dd`, `EEE, d MMM yyyy HH:mm:ss Z`, ...)
#[derive(Debug, Clone)]
pub struct JavaPatternDateFormat {
    description: String,
    tokens: Vec<Token>,
    names: &'static DateNames,
    time_zone: TimeZone,
}

impl JavaPatternDateFormat {
    /// Compile a pattern for a locale and a zone
    pub fn new(
        pattern: &str,
        description: &str,
        locale: &Locale,
        time_zone: TimeZone,
    ) -> TemplateResult<Self> {
        Ok(Self {
            description: description.to_string(),
            tokens: tokenize(pattern)?,
            names: locale.date_names(),
            time_zone,
        })
    }

    fn render(&self, local: &DateTime<FixedOffset>) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Field(letter, count) => self.render_field(&mut out, *letter, *count, local),
            }
        }
        out
    }

    fn render_field(&self, out: &mut String, letter: char, count: usize, local: &DateTime<FixedOffset>) {
        let pad = |value: i64| format!("{:0width$}", value, width = count);
        match letter {
            'G' => out.push_str(if local.year() > 0 { "AD" } else { "BC" }),
            'y' => {
                if count == 2 {
                    out.push_str(&format!("{:02}", local.year().rem_euclid(100)));
                } else {
                    out.push_str(&pad(local.year() as i64));
                }
            }
            'M' => {
                let month = local.month0() as usize;
                match count {
                    1 | 2 => out.push_str(&pad(month as i64 + 1)),
                    3 => out.push_str(self.names.short_months[month]),
                    _ => out.push_str(self.names.months[month]),
                }
            }
            'd' => out.push_str(&pad(local.day() as i64)),
            'D' => out.push_str(&pad(local.ordinal() as i64)),
            'E' => {
                let day = local.weekday().num_days_from_monday() as usize;
                if count >= 4 {
                    out.push_str(self.names.weekdays[day]);
                } else {
                    out.push_str(self.names.short_weekdays[day]);
                }
            }
            'u' => out.push_str(&pad(local.weekday().number_from_monday() as i64)),
            'w' => out.push_str(&pad(local.iso_week().week() as i64)),
            'a' => out.push_str(self.names.am_pm[if local.hour() < 12 { 0 } else { 1 }]),
            'H' => out.push_str(&pad(local.hour() as i64)),
            'k' => out.push_str(&pad(if local.hour() == 0 { 24 } else { local.hour() as i64 })),
            'K' => out.push_str(&pad((local.hour() % 12) as i64)),
            'h' => {
                let h = local.hour() % 12;
                out.push_str(&pad(if h == 0 { 12 } else { h as i64 }));
            }
            'm' => out.push_str(&pad(local.minute() as i64)),
            's' => out.push_str(&pad(local.second() as i64)),
            'S' => out.push_str(&pad((local.nanosecond() / 1_000_000) as i64)),
            'z' => {
                let id = self.time_zone.id();
                if id.starts_with(['+', '-']) {
                    out.push_str(&format_gmt_id(self.time_zone.offset_seconds()));
                } else {
                    out.push_str(id);
                }
            }
            'Z' => out.push_str(&offset_text(local.offset().local_minus_utc(), false, false)),
            'X' => {
                let seconds = local.offset().local_minus_utc();
                if seconds == 0 {
                    out.push('Z');
                } else {
                    out.push_str(&offset_text(seconds, count >= 3, count == 1));
                }
            }
            _ => {}
        }
    }

    fn parse_text(&self, text: &str, kind: DateKind) -> Option<TemplateDate> {
        let mut fields = ParsedFields::default();
        let mut rest = text;
        for (i, token) in self.tokens.iter().enumerate() {
            match token {
                Token::Literal(lit) => {
                    rest = rest.strip_prefix(lit.as_str())?;
                }
                Token::Field(letter, count) => {
                    let next_is_field = matches!(self.tokens.get(i + 1), Some(Token::Field(..)));
                    rest = self.parse_field(rest, *letter, *count, next_is_field, &mut fields)?;
                }
            }
        }
        if !rest.trim().is_empty() {
            return None;
        }
        fields.build(kind, &self.time_zone)
    }

    fn parse_field<'t>(
        &self,
        text: &'t str,
        letter: char,
        count: usize,
        fixed_width: bool,
        fields: &mut ParsedFields,
    ) -> Option<&'t str> {
        let number = |text: &'t str| -> Option<(i64, &'t str)> {
            let max = if fixed_width { count } else { usize::MAX };
            let end = text
                .char_indices()
                .take_while(|(i, c)| c.is_ascii_digit() && *i < max)
                .map(|(i, c)| i + c.len_utf8())
                .last()?;
            Some((text[..end].parse().ok()?, &text[end..]))
        };
        match letter {
            'y' => {
                let (value, rest) = number(text)?;
                fields.year = Some(if count == 2 && value < 100 { 2000 + value } else { value });
                Some(rest)
            }
            'M' if count >= 3 => {
                let names = if count == 3 { &self.names.short_months } else { &self.names.months };
                let (index, rest) = match_name(text, names)?;
                fields.month = Some(index as i64 + 1);
                Some(rest)
            }
            'M' => {
                let (value, rest) = number(text)?;
                fields.month = Some(value);
                Some(rest)
            }
            'd' => {
                let (value, rest) = number(text)?;
                fields.day = Some(value);
                Some(rest)
            }
            'E' => {
                let names = if count >= 4 { &self.names.weekdays } else { &self.names.short_weekdays };
                let (_, rest) = match_name(text, names)?;
                Some(rest)
            }
            'a' => {
                let (index, rest) = match_name(text, &self.names.am_pm)?;
                fields.pm = Some(index == 1);
                Some(rest)
            }
            'H' | 'k' | 'K' | 'h' => {
                let (value, rest) = number(text)?;
                fields.hour = Some(match letter {
                    'k' if value == 24 => 0,
                    'h' if value == 12 => 0,
                    _ => value,
                });
                Some(rest)
            }
            'm' => {
                let (value, rest) = number(text)?;
                fields.minute = Some(value);
                Some(rest)
            }
            's' => {
                let (value, rest) = number(text)?;
                fields.second = Some(value);
                Some(rest)
            }
            'S' => {
                let (value, rest) = number(text)?;
                fields.millis = Some(value);
                Some(rest)
            }
            'z' | 'Z' | 'X' => {
                let (offset, rest) = parse_zone(text)?;
                fields.offset = Some(offset);
                Some(rest)
            }
            _ => {
                let (_, rest) = number(text)?;
                Some(rest)
            }
        }
    }
}

impl TemplateDateFormat for JavaPatternDateFormat {
    fn format(&self, date: &TemplateDate) -> TemplateResult<FormatOutput> {
        let local = date.instant().with_timezone(&self.time_zone.offset());
        Ok(FormatOutput::Plain(self.render(&local)))
    }

    fn parse(&self, text: &str, kind: DateKind) -> TemplateResult<TemplateDate> {
        self.parse_text(text.trim(), kind)
            .ok_or_else(|| TemplateError::InvalidFormat {
                format: self.description.clone(),
                message: format!("The string doesn't match the expected date/time/date-time format: \"{text}\""),
            })
    }

    fn is_locale_bound(&self) -> bool {
        true
    }

    fn is_time_zone_bound(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

fn match_name<'t>(text: &'t str, names: &[&str]) -> Option<(usize, &'t str)> {
    let lower = text.to_lowercase();
    names
        .iter()
        .enumerate()
        .filter(|(_, name)| lower.starts_with(&name.to_lowercase()))
        .max_by_key(|(_, name)| name.len())
        .and_then(|(i, name)| text.get(name.len()..).map(|rest| (i, rest)))
}

/// Parse `Z`, `UTC`, `GMT`, `GMT+hh:mm`, `+hh:mm`, `+hhmm` or `+hh` at the start of `text`
pub(crate) fn parse_zone(text: &str) -> Option<(i32, &str)> {
    if let Some(rest) = text.strip_prefix('Z') {
        return Some((0, rest));
    }
    let named = text.strip_prefix("GMT").or_else(|| text.strip_prefix("UTC"));
    let signed = named.unwrap_or(text);
    let sign = match signed.chars().next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return named.map(|rest| (0, rest)),
    };
    let body = &signed[1..];
    let end = body
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == ':'))
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    let plain: String = body[..end].chars().filter(char::is_ascii_digit).collect();
    let (hours, minutes) = match plain.len() {
        1 | 2 => (plain.parse::<i32>().ok()?, 0),
        4 => (plain[..2].parse::<i32>().ok()?, plain[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    Some((sign * (hours * 3600 + minutes * 60), &body[end..]))
}

fn offset_text(seconds: i32, colon: bool, hours_only: bool) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.abs();
    let (h, m) = (abs / 3600, (abs % 3600) / 60);
    if hours_only {
        format!("{sign}{h:02}")
    } else if colon {
        format!("{sign}{h:02}:{m:02}")
    } else {
        format!("{sign}{h:02}{m:02}")
    }
}

#[derive(Debug, Default)]
struct ParsedFields {
    year: Option<i64>,
    month: Option<i64>,
    day: Option<i64>,
    hour: Option<i64>,
    minute: Option<i64>,
    second: Option<i64>,
    millis: Option<i64>,
    pm: Option<bool>,
    offset: Option<i32>,
}

impl ParsedFields {
    fn build(&self, kind: DateKind, zone: &TimeZone) -> Option<TemplateDate> {
        let date = NaiveDate::from_ymd_opt(
            self.year.unwrap_or(1970) as i32,
            self.month.unwrap_or(1) as u32,
            self.day.unwrap_or(1) as u32,
        )?;
        let mut hour = self.hour.unwrap_or(0);
        if self.pm == Some(true) && hour < 12 {
            hour += 12;
        }
        let time = NaiveTime::from_hms_milli_opt(
            hour as u32,
            self.minute.unwrap_or(0) as u32,
            self.second.unwrap_or(0) as u32,
            self.millis.unwrap_or(0) as u32,
        )?;
        let offset = match self.offset {
            Some(seconds) => FixedOffset::east_opt(seconds)?,
            None => zone.offset(),
        };
        let local = NaiveDateTime::new(date, time);
        let instant = offset.from_local_datetime(&local).single()?.with_timezone(&Utc);
        Some(TemplateDate::new(instant, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn request<'a>(kind: DateKind, locale: &'a Locale, zone: &'a TimeZone) -> DateFormatRequest<'a> {
        DateFormatRequest {
            kind,
            locale,
            time_zone: zone,
            zoneless_input: false,
        }
    }

    fn sample() -> TemplateDate {
        let instant = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        TemplateDate::from_datetime(instant)
    }

    #[rstest]
    #[case("yyyy-MM-dd HH:mm:ss", "en_US", "UTC", "2024-03-05 14:07:09")]
    #[case("EEE, d MMM yyyy h:mm a", "en_US", "UTC", "Tue, 5 Mar 2024 2:07 PM")]
    #[case("EEEE d. MMMM", "de_DE", "UTC", "Dienstag 5. März")]
    #[case("HH:mm Z", "en_US", "GMT+01:00", "15:07 +0100")]
    #[case("HH:mm XXX", "en_US", "UTC", "14:07 Z")]
    #[case("'at' HH 'o''clock'", "en_US", "UTC", "at 14 o'clock")]
    #[case("medium", "en_US", "UTC", "Mar 5, 2024, 2:07:09 PM")]
    #[case("short_medium", "de_DE", "UTC", "05.03.24, 14:07:09")]
    fn test_format(
        #[case] format: &str,
        #[case] locale: &str,
        #[case] zone: &str,
        #[case] expected: &str,
    ) {
        let locale = Locale::parse(locale).unwrap();
        let zone = TimeZone::parse(zone).unwrap();
        let f = resolve_date_format(format, &request(DateKind::DateTime, &locale, &zone), &IndexMap::new())
            .unwrap();
        assert_eq!(f.format(&sample()).unwrap().as_str(), expected);
    }

    #[test]
    fn test_parse_pattern() {
        let locale = Locale::us();
        let zone = TimeZone::utc();
        let f = resolve_date_format(
            "dd MMM yyyy",
            &request(DateKind::Date, &locale, &zone),
            &IndexMap::new(),
        )
        .unwrap();
        let parsed = f.parse("05 Mar 2024", DateKind::Date).unwrap();
        assert_eq!(parsed.kind(), DateKind::Date);
        assert_eq!(f.format(&parsed).unwrap().as_str(), "05 Mar 2024");
        assert!(f.parse("5th of March", DateKind::Date).is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let locale = Locale::us();
        let zone = TimeZone::utc();
        let result = resolve_date_format("short", &request(DateKind::Unknown, &locale, &zone), &IndexMap::new());
        assert!(matches!(result, Err(TemplateError::AmbiguousDateKind { .. })));
    }

    #[test]
    fn test_illegal_pattern_letter() {
        let locale = Locale::us();
        let zone = TimeZone::utc();
        let result = resolve_date_format("yyyy-qq", &request(DateKind::Date, &locale, &zone), &IndexMap::new());
        assert!(result.is_err());
    }
}
