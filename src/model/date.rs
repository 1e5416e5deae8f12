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

//! Date-like values

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone as _, Utc};
use serde::{Deserialize, Serialize};

/// Sub-kind of a date-like value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateKind {
    /// Date only, no time part
    Date,
    /// Time only, no date part
    Time,
    /// Date and time
    DateTime,
    /// Not known which of the above
    Unknown,
}

impl DateKind {
    /// Name used in messages
    pub fn name(self) -> &'static str {
        match self {
            DateKind::Date => "date",
            DateKind::Time => "time",
            DateKind::DateTime => "date-time",
            DateKind::Unknown => "unknown",
        }
    }

    /// Slot index for the known kinds
    pub(crate) fn slot(self) -> Option<usize> {
        match self {
            DateKind::Date => Some(0),
            DateKind::Time => Some(1),
            DateKind::DateTime => Some(2),
            DateKind::Unknown => None,
        }
    }
}

/// A point in time plus the kind of value it stands for
///
/// `zoneless` marks values that came from a zone-less source (like a
/// database date or time column). Those may be rendered in the
/// `sql_date_and_time_time_zone` instead of the normal time zone.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDate {
    instant: DateTime<Utc>,
    kind: DateKind,
    zoneless: bool,
}

impl TemplateDate {
    /// Create a date value of the given kind
    pub fn new(instant: DateTime<Utc>, kind: DateKind) -> Self {
        Self {
            instant,
            kind,
            zoneless: false,
        }
    }

    /// Date-only value at midnight UTC
    pub fn from_date(date: NaiveDate) -> Self {
        let instant = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        Self::new(instant, DateKind::Date)
    }

    /// Time-only value on the epoch day, UTC
    pub fn from_time(time: NaiveTime) -> Self {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
        let instant = Utc.from_utc_datetime(&epoch.and_time(time));
        Self::new(instant, DateKind::Time)
    }

    /// Date-time value
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        Self::new(instant, DateKind::DateTime)
    }

    /// Same instant with another kind
    pub fn with_kind(&self, kind: DateKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Mark the value as coming from a zone-less source
    pub fn zoneless(mut self) -> Self {
        self.zoneless = true;
        self
    }

    /// The instant
    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    /// The sub-kind
    pub fn kind(&self) -> DateKind {
        self.kind
    }

    /// Whether the value came from a zone-less source
    pub fn is_zoneless(&self) -> bool {
        self.zoneless
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_kind_keeps_instant() {
        let d = TemplateDate::from_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let dt = d.with_kind(DateKind::DateTime);
        assert_eq!(d.instant(), dt.instant());
        assert_eq!(dt.kind(), DateKind::DateTime);
        assert_eq!(DateKind::Unknown.slot(), None);
    }
}
