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

//! Fixed-offset time zones

use chrono::{FixedOffset, Local, Offset, Utc};
use std::fmt;

/// Keyword for the zone of the host system
pub const SYSTEM_DEFAULT: &str = "JVM default";

/// A named, fixed UTC offset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeZone {
    id: String,
    offset_seconds: i32,
}

impl TimeZone {
    /// UTC
    pub fn utc() -> Self {
        Self {
            id: "UTC".to_string(),
            offset_seconds: 0,
        }
    }

    /// The current offset of the host system
    pub fn system_default() -> Self {
        let offset = Local::now().offset().fix().local_minus_utc();
        Self {
            id: format_gmt_id(offset),
            offset_seconds: offset,
        }
    }

    /// Parse `UTC`, `GMT`, `Z`, `GMT+1`, `UTC-05:30`, `+02:00` or `JVM default`
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text == SYSTEM_DEFAULT {
            return Ok(Self::system_default());
        }
        match text {
            "UTC" | "GMT" | "Z" | "Etc/UTC" | "Etc/GMT" | "Universal" | "Zulu" => {
                return Ok(Self {
                    id: text.to_string(),
                    offset_seconds: 0,
                });
            }
            _ => {}
        }
        let offset_part = text
            .strip_prefix("GMT")
            .or_else(|| text.strip_prefix("UTC"))
            .unwrap_or(text);
        let seconds = parse_offset(offset_part)
            .ok_or_else(|| format!("Unknown or unsupported time zone: \"{text}\""))?;
        Ok(Self {
            id: text.to_string(),
            offset_seconds: seconds,
        })
    }

    /// Zone id as it was given
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Offset from UTC in seconds
    pub fn offset_seconds(&self) -> i32 {
        self.offset_seconds
    }

    /// The offset as a chrono value
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.offset_seconds).unwrap_or_else(|| Utc.fix())
    }
}

impl fmt::Display for TimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl Default for TimeZone {
    fn default() -> Self {
        Self::utc()
    }
}

fn parse_offset(text: &str) -> Option<i32> {
    let (sign, rest) = match text.chars().next()? {
        '+' => (1, &text[1..]),
        '-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => (&rest[..2], &rest[2..]),
        None => (rest, "0"),
    };
    if hours.is_empty() || hours.len() > 2 || !hours.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if minutes.is_empty() || minutes.len() > 2 || !minutes.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 18 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

/// `GMT+hh:mm` style id for an offset
pub(crate) fn format_gmt_id(offset_seconds: i32) -> String {
    if offset_seconds == 0 {
        return "GMT".to_string();
    }
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let abs = offset_seconds.abs();
    format!("GMT{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("UTC", 0)]
    #[case("GMT+1", 3600)]
    #[case("GMT+01:00", 3600)]
    #[case("UTC-05:30", -19800)]
    #[case("+0230", 9000)]
    #[case("-08:00", -28800)]
    fn test_parse_offsets(#[case] text: &str, #[case] seconds: i32) {
        assert_eq!(TimeZone::parse(text).unwrap().offset_seconds(), seconds);
    }

    #[test]
    fn test_named_zones_unsupported() {
        assert!(TimeZone::parse("Europe/Budapest").is_err());
        assert!(TimeZone::parse("GMT+25").is_err());
    }

    #[test]
    fn test_gmt_id() {
        assert_eq!(format_gmt_id(-19800), "GMT-05:30");
        assert_eq!(format_gmt_id(0), "GMT");
    }
}
