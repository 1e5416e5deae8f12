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

//! ISO 8601 and XML Schema date formats

use super::date::parse_zone;
use super::{FormatOutput, TemplateDateFormat, TimeZone};
use crate::error::{TemplateError, TemplateResult};
use crate::model::{DateKind, TemplateDate};
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone as _, Timelike, Utc,
};

/// Which ISO dialect to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoFlavor {
    /// Plain ISO 8601 (`iso`)
    Iso,
    /// XML Schema (`xs`); dates may carry a zone
    Xs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accuracy {
    Hours,
    Minutes,
    Seconds,
    Millis,
    /// Milliseconds only when non-zero
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneDisplay {
    Default,
    Never,
    Always,
}

/// ISO 8601 style format, with options like `iso m nz` or `xs_ms_u`
#[derive(Debug, Clone)]
pub struct IsoDateFormat {
    flavor: IsoFlavor,
    kind: DateKind,
    accuracy: Accuracy,
    zone_display: ZoneDisplay,
    force_utc: bool,
    time_zone: TimeZone,
    description: String,
}

impl IsoDateFormat {
    /// Parse the options after the `iso`/`xs` keyword
    pub fn parse(
        flavor: IsoFlavor,
        params: &str,
        kind: DateKind,
        time_zone: TimeZone,
    ) -> TemplateResult<Self> {
        let keyword = match flavor {
            IsoFlavor::Iso => "iso",
            IsoFlavor::Xs => "xs",
        };
        let mut format = Self {
            flavor,
            kind,
            accuracy: Accuracy::Auto,
            zone_display: ZoneDisplay::Default,
            force_utc: false,
            time_zone,
            description: format!("{keyword} {params}").trim_end().to_string(),
        };
        let mut accuracy_set = false;
        let mut zone_set = false;
        let mut utc_set = false;
        for option in params.split(['_', ' ']).filter(|o| !o.is_empty()) {
            let duplicate = |set: &mut bool| -> TemplateResult<()> {
                if std::mem::replace(set, true) {
                    Err(TemplateError::InvalidFormat {
                        format: format!("{keyword} {params}"),
                        message: format!("Option \"{option}\" conflicts with an earlier option"),
                    })
                } else {
                    Ok(())
                }
            };
            match option {
                "h" | "m" | "s" | "ms" | "fs" => {
                    duplicate(&mut accuracy_set)?;
                    format.accuracy = match option {
                        "h" => Accuracy::Hours,
                        "m" => Accuracy::Minutes,
                        "s" => Accuracy::Seconds,
                        "ms" => Accuracy::Millis,
                        _ => Accuracy::Auto,
                    };
                }
                "nz" | "fz" => {
                    duplicate(&mut zone_set)?;
                    format.zone_display = if option == "nz" {
                        ZoneDisplay::Never
                    } else {
                        ZoneDisplay::Always
                    };
                }
                "u" | "fu" => {
                    duplicate(&mut utc_set)?;
                    format.force_utc = true;
                }
                other => {
                    return Err(TemplateError::InvalidFormat {
                        format: format!("{keyword} {params}"),
                        message: format!(
                            "Unsupported option \"{other}\"; supported: h, m, s, ms, fs, nz, fz, u, fu"
                        ),
                    });
                }
            }
        }
        Ok(format)
    }

    fn offset(&self) -> FixedOffset {
        if self.force_utc {
            FixedOffset::east_opt(0).unwrap_or_else(|| self.time_zone.offset())
        } else {
            self.time_zone.offset()
        }
    }

    fn shows_zone(&self) -> bool {
        match (self.zone_display, self.kind, self.flavor) {
            (ZoneDisplay::Never, ..) => false,
            (ZoneDisplay::Always, ..) => true,
            (ZoneDisplay::Default, DateKind::Date, _) => false,
            (ZoneDisplay::Default, ..) => true,
        }
    }

    fn render_time(&self, local: &DateTime<FixedOffset>, out: &mut String) {
        out.push_str(&format!("{:02}", local.hour()));
        if self.accuracy == Accuracy::Hours {
            return;
        }
        out.push_str(&format!(":{:02}", local.minute()));
        if self.accuracy == Accuracy::Minutes {
            return;
        }
        out.push_str(&format!(":{:02}", local.second()));
        let millis = local.nanosecond() / 1_000_000;
        match self.accuracy {
            Accuracy::Millis => out.push_str(&format!(".{millis:03}")),
            Accuracy::Auto if millis != 0 => {
                let text = format!("{millis:03}");
                out.push('.');
                out.push_str(text.trim_end_matches('0'));
            }
            _ => {}
        }
    }

    fn render_zone(&self, local: &DateTime<FixedOffset>, out: &mut String) {
        let seconds = local.offset().local_minus_utc();
        if seconds == 0 {
            out.push('Z');
            return;
        }
        let sign = if seconds < 0 { '-' } else { '+' };
        let abs = seconds.abs();
        out.push_str(&format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60));
    }

    fn parse_text(&self, text: &str, kind: DateKind) -> Option<TemplateDate> {
        let default_offset = self.offset();
        let with_zone = |local: NaiveDateTime, offset: Option<i32>| -> Option<DateTime<Utc>> {
            let offset = match offset {
                Some(seconds) => FixedOffset::east_opt(seconds)?,
                None => default_offset,
            };
            Some(offset.from_local_datetime(&local).single()?.with_timezone(&Utc))
        };
        match kind {
            DateKind::Date => {
                let (date_part, zone_part) = split_at_len(text, 10)?;
                let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
                if zone_part.is_empty() {
                    return Some(TemplateDate::from_date(date));
                }
                if self.flavor == IsoFlavor::Iso {
                    return None;
                }
                let (offset, rest) = parse_zone(zone_part)?;
                if !rest.is_empty() {
                    return None;
                }
                let instant = with_zone(date.and_time(NaiveTime::MIN), Some(offset))?;
                Some(TemplateDate::new(instant, DateKind::Date))
            }
            DateKind::Time => {
                let (time, offset) = parse_time(text)?;
                let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
                let instant = with_zone(epoch.and_time(time), offset)?;
                Some(TemplateDate::new(instant, DateKind::Time))
            }
            _ => {
                let (date_part, time_part) = text.split_once('T')?;
                let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
                let (time, offset) = parse_time(time_part)?;
                let instant = with_zone(date.and_time(time), offset)?;
                Some(TemplateDate::new(instant, DateKind::DateTime))
            }
        }
    }
}

fn split_at_len(text: &str, len: usize) -> Option<(&str, &str)> {
    if text.len() < len || !text.is_char_boundary(len) {
        return None;
    }
    Some(text.split_at(len))
}

fn parse_time(text: &str) -> Option<(NaiveTime, Option<i32>)> {
    let end = text
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == ':' || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let (time_part, zone_part) = text.split_at(end);
    let time = NaiveTime::parse_from_str(time_part, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(time_part, "%H:%M"))
        .ok()
        .or_else(|| {
            let hour: u32 = time_part.parse().ok()?;
            NaiveTime::from_hms_opt(hour, 0, 0)
        })?;
    if zone_part.is_empty() {
        return Some((time, None));
    }
    let (offset, rest) = parse_zone(zone_part)?;
    if !rest.is_empty() {
        return None;
    }
    Some((time, Some(offset)))
}

impl TemplateDateFormat for IsoDateFormat {
    fn format(&self, date: &TemplateDate) -> TemplateResult<FormatOutput> {
        let local = date.instant().with_timezone(&self.offset());
        let mut out = String::new();
        if self.kind != DateKind::Time {
            let year = local.format("%Y").to_string();
            out.push_str(&year);
            out.push_str(&local.format("-%m-%d").to_string());
        }
        if self.kind == DateKind::DateTime {
            out.push('T');
        }
        if self.kind != DateKind::Date {
            self.render_time(&local, &mut out);
        }
        if self.shows_zone() {
            self.render_zone(&local, &mut out);
        }
        Ok(FormatOutput::Plain(out))
    }

    fn parse(&self, text: &str, kind: DateKind) -> TemplateResult<TemplateDate> {
        self.parse_text(text.trim(), kind)
            .ok_or_else(|| TemplateError::InvalidFormat {
                format: self.description.clone(),
                message: format!(
                    "The value didn't match the expected ISO 8601 {} format: \"{text}\"",
                    kind.name()
                ),
            })
    }

    fn is_locale_bound(&self) -> bool {
        false
    }

    fn is_time_zone_bound(&self) -> bool {
        !self.force_utc
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample() -> TemplateDate {
        let instant = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        TemplateDate::from_datetime(instant)
    }

    #[rstest]
    #[case(IsoFlavor::Iso, "", DateKind::DateTime, "UTC", "2024-03-05T14:07:09Z")]
    #[case(IsoFlavor::Iso, "m", DateKind::DateTime, "GMT+02:00", "2024-03-05T16:07+02:00")]
    #[case(IsoFlavor::Iso, "nz", DateKind::DateTime, "UTC", "2024-03-05T14:07:09")]
    #[case(IsoFlavor::Iso, "ms u", DateKind::Time, "GMT+02:00", "14:07:09.000Z")]
    #[case(IsoFlavor::Iso, "", DateKind::Date, "UTC", "2024-03-05")]
    #[case(IsoFlavor::Xs, "fz", DateKind::Date, "UTC", "2024-03-05Z")]
    fn test_format(
        #[case] flavor: IsoFlavor,
        #[case] params: &str,
        #[case] kind: DateKind,
        #[case] zone: &str,
        #[case] expected: &str,
    ) {
        let zone = TimeZone::parse(zone).unwrap();
        let format = IsoDateFormat::parse(flavor, params, kind, zone).unwrap();
        assert_eq!(format.format(&sample().with_kind(kind)).unwrap().as_str(), expected);
    }

    #[test]
    fn test_parse_datetime_with_offset() {
        let format = IsoDateFormat::parse(IsoFlavor::Iso, "", DateKind::DateTime, TimeZone::utc())
            .unwrap();
        let parsed = format.parse("2024-03-05T16:07:09+02:00", DateKind::DateTime).unwrap();
        assert_eq!(parsed.instant(), sample().instant());
        assert!(format.parse("2024-03-05 16:07", DateKind::DateTime).is_err());
    }

    #[test]
    fn test_conflicting_options() {
        let result = IsoDateFormat::parse(IsoFlavor::Iso, "m s", DateKind::Time, TimeZone::utc());
        assert!(result.is_err());
        let result = IsoDateFormat::parse(IsoFlavor::Xs, "bogus", DateKind::Time, TimeZone::utc());
        assert!(result.is_err());
    }
}
