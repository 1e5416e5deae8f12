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

//! Format object caches of a render
//!
//! Date formats live in six partitions: three date kinds times two zone
//! halves. The second half holds formats for zone-less values rendered in
//! the SQL time zone, used only while that zone differs from the normal one.
//! Each partition keeps the default format of its kind and the formats
//! requested by explicit format string.

use super::Environment;
use crate::error::{TemplateError, TemplateResult};
use crate::eval::{ArithmeticEngine, EvalContext};
use crate::format::date::UNKNOWN_KIND_FORMAT_MESSAGE;
use crate::format::{
    resolve_date_format, resolve_number_format, BooleanFormat, Collator, DateFormatRequest,
    TemplateDateFormat, TemplateNumberFormat,
};
use crate::model::{DateKind, TemplateDate};
use log::debug;
use rustc_hash::FxHashMap;
use std::sync::Arc;

const KINDS: usize = 3;
const PARTITIONS: usize = KINDS * 2;

#[derive(Default)]
struct DatePartition {
    default: Option<Arc<dyn TemplateDateFormat>>,
    by_format: FxHashMap<String, Arc<dyn TemplateDateFormat>>,
}

impl DatePartition {
    fn clear(&mut self) {
        self.default = None;
        self.by_format.clear();
    }

    fn retain(&mut self, keep: impl Fn(&dyn TemplateDateFormat) -> bool) {
        if self.default.as_ref().is_some_and(|f| !keep(f.as_ref())) {
            self.default = None;
        }
        self.by_format.retain(|_, f| keep(f.as_ref()));
    }
}

/// Per-render cache of resolved formats
#[derive(Default)]
pub(crate) struct FormatCache {
    number_default: Option<Arc<dyn TemplateNumberFormat>>,
    number_by_format: FxHashMap<String, Arc<dyn TemplateNumberFormat>>,
    dates: [DatePartition; PARTITIONS],
}

impl FormatCache {
    pub(crate) fn clear(&mut self) {
        self.number_default = None;
        self.number_by_format.clear();
        for partition in &mut self.dates {
            partition.clear();
        }
    }

    /// Drop what depends on the locale
    pub(crate) fn locale_changed(&mut self) {
        if self.number_default.as_ref().is_some_and(|f| f.is_locale_bound()) {
            self.number_default = None;
        }
        self.number_by_format.retain(|_, f| !f.is_locale_bound());
        for partition in &mut self.dates {
            partition.retain(|f| !f.is_locale_bound());
        }
        debug!("Locale changed; dropped locale-bound formats");
    }

    /// Drop what depends on the time zone of one half
    pub(crate) fn time_zone_changed(&mut self, sql_half: bool) {
        for kind in 0..KINDS {
            self.dates[partition_index(kind, sql_half)].retain(|f| !f.is_time_zone_bound());
        }
        debug!(
            "{} time zone changed; dropped zone-bound date formats",
            if sql_half { "SQL" } else { "Default" }
        );
    }

    pub(crate) fn number_format_changed(&mut self) {
        self.number_default = None;
    }

    /// Drop the default format of one date kind, in both halves
    pub(crate) fn date_format_changed(&mut self, kind: DateKind) {
        if let Some(slot) = kind.slot() {
            self.dates[partition_index(slot, false)].default = None;
            self.dates[partition_index(slot, true)].default = None;
        }
    }
}

fn partition_index(kind_slot: usize, sql_half: bool) -> usize {
    kind_slot * 2 + usize::from(sql_half)
}

fn unknown_kind() -> TemplateError {
    TemplateError::AmbiguousDateKind {
        message: UNKNOWN_KIND_FORMAT_MESSAGE.to_string(),
    }
}

impl Environment<'_> {
    /// Whether zone-less values go to the SQL half
    fn uses_sql_half(&self, zoneless: bool) -> bool {
        zoneless
            && self
                .settings
                .sql_date_and_time_time_zone()
                .as_ref()
                .is_some_and(|sql| sql != self.settings.time_zone())
    }

    /// The number format for an explicit format string
    pub fn number_format_for(&mut self, format: &str) -> TemplateResult<Arc<dyn TemplateNumberFormat>> {
        if let Some(cached) = self.format_cache.number_by_format.get(format) {
            return Ok(cached.clone());
        }
        let resolved = resolve_number_format(
            format,
            self.settings.locale(),
            self.settings.custom_number_formats(),
        )?;
        self.format_cache
            .number_by_format
            .insert(format.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// The default number format
    pub fn default_number_format(&mut self) -> TemplateResult<Arc<dyn TemplateNumberFormat>> {
        if let Some(cached) = &self.format_cache.number_default {
            return Ok(cached.clone());
        }
        let format = self.settings.number_format().clone();
        let resolved = self.number_format_for(&format)?;
        self.format_cache.number_default = Some(resolved.clone());
        Ok(resolved)
    }

    /// The date format for an explicit format string
    pub fn date_format_for(
        &mut self,
        format: &str,
        kind: DateKind,
        zoneless: bool,
    ) -> TemplateResult<Arc<dyn TemplateDateFormat>> {
        let Some(slot) = kind.slot() else {
            return Err(unknown_kind());
        };
        let sql_half = self.uses_sql_half(zoneless);
        let index = partition_index(slot, sql_half);
        if let Some(cached) = self.format_cache.dates[index].by_format.get(format) {
            return Ok(cached.clone());
        }
        let resolved = self.resolve_date(format, kind, zoneless, sql_half)?;
        self.format_cache.dates[index]
            .by_format
            .insert(format.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// The default date format of a kind
    pub fn default_date_format(&mut self, kind: DateKind) -> TemplateResult<Arc<dyn TemplateDateFormat>> {
        self.default_date_format_for(kind, false)
    }

    fn default_date_format_for(
        &mut self,
        kind: DateKind,
        zoneless: bool,
    ) -> TemplateResult<Arc<dyn TemplateDateFormat>> {
        let Some(slot) = kind.slot() else {
            return Err(unknown_kind());
        };
        let sql_half = self.uses_sql_half(zoneless);
        let index = partition_index(slot, sql_half);
        if let Some(cached) = &self.format_cache.dates[index].default {
            return Ok(cached.clone());
        }
        let format = match kind {
            DateKind::Date => self.settings.date_format(),
            DateKind::Time => self.settings.time_format(),
            _ => self.settings.datetime_format(),
        }
        .clone();
        let resolved = self.resolve_date(&format, kind, zoneless, sql_half)?;
        self.format_cache.dates[index].default = Some(resolved.clone());
        Ok(resolved)
    }

    /// The default format for rendering a date value
    pub fn date_format_for_value(&mut self, date: &TemplateDate) -> TemplateResult<Arc<dyn TemplateDateFormat>> {
        self.default_date_format_for(date.kind(), date.is_zoneless())
    }

    fn resolve_date(
        &self,
        format: &str,
        kind: DateKind,
        zoneless: bool,
        sql_half: bool,
    ) -> TemplateResult<Arc<dyn TemplateDateFormat>> {
        let time_zone = match (sql_half, self.settings.sql_date_and_time_time_zone()) {
            (true, Some(sql)) => sql,
            _ => self.settings.time_zone(),
        };
        let request = DateFormatRequest {
            kind,
            locale: self.settings.locale(),
            time_zone,
            zoneless_input: zoneless,
        };
        resolve_date_format(format, &request, self.settings.custom_date_formats())
    }
}

impl EvalContext for Environment<'_> {
    fn arithmetic_engine(&self) -> Arc<dyn ArithmeticEngine> {
        self.settings.arithmetic_engine().clone()
    }

    fn collator(&self) -> Collator {
        Collator::new(self.settings.locale())
    }

    fn is_classic_compatible(&self) -> bool {
        *self.settings.classic_compatible()
    }

    fn boolean_format(&self) -> BooleanFormat {
        self.settings.boolean_format().clone()
    }

    fn number_format(&mut self) -> TemplateResult<Arc<dyn TemplateNumberFormat>> {
        self.default_number_format()
    }

    fn date_format(
        &mut self,
        kind: DateKind,
        zoneless: bool,
    ) -> TemplateResult<Arc<dyn TemplateDateFormat>> {
        self.default_date_format_for(kind, zoneless)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Block;
    use crate::model::Number;
    use crate::settings::Configuration;
    use pretty_assertions::assert_eq;

    fn environment(settings: &[(&str, &str)]) -> Environment<'static> {
        let mut configuration = Configuration::default();
        configuration
            .set_settings(settings.iter().copied())
            .unwrap();
        let template = Arc::new(configuration).create_template("formats.ftl", Arc::new(Block::new(vec![])));
        Environment::new(template, None, Vec::new())
    }

    fn iso(env: &mut Environment<'_>, zoneless: bool) -> Arc<dyn TemplateDateFormat> {
        env.date_format_for("iso", DateKind::DateTime, zoneless).unwrap()
    }

    #[test]
    fn test_locale_change_rebuilds_only_locale_bound_formats() {
        let mut env = environment(&[("locale", "en_US"), ("time_zone", "UTC")]);
        let computer = env.number_format_for("c").unwrap();
        let pattern = env.number_format_for("0.00").unwrap();
        let iso_format = iso(&mut env, false);
        let java = env.date_format_for("yyyy-MM-dd", DateKind::Date, false).unwrap();

        env.set_setting("locale", "de_DE").unwrap();

        assert!(Arc::ptr_eq(&computer, &env.number_format_for("c").unwrap()));
        assert!(!Arc::ptr_eq(&pattern, &env.number_format_for("0.00").unwrap()));
        assert!(Arc::ptr_eq(&iso_format, &iso(&mut env, false)));
        let rebuilt = env.date_format_for("yyyy-MM-dd", DateKind::Date, false).unwrap();
        assert!(!Arc::ptr_eq(&java, &rebuilt));
    }

    #[test]
    fn test_time_zone_change_clears_only_the_normal_half() {
        let mut env = environment(&[("time_zone", "UTC"), ("sql_date_and_time_time_zone", "GMT+02")]);
        let normal = iso(&mut env, false);
        let sql = iso(&mut env, true);
        assert!(!Arc::ptr_eq(&normal, &sql));

        env.set_setting("time_zone", "GMT+05").unwrap();

        assert!(!Arc::ptr_eq(&normal, &iso(&mut env, false)));
        assert!(Arc::ptr_eq(&sql, &iso(&mut env, true)));
    }

    #[test]
    fn test_sql_time_zone_change_clears_only_the_sql_half() {
        let mut env = environment(&[("time_zone", "UTC"), ("sql_date_and_time_time_zone", "GMT+02")]);
        let normal = iso(&mut env, false);
        let sql = iso(&mut env, true);

        env.set_setting("sql_date_and_time_time_zone", "GMT+03").unwrap();

        assert!(Arc::ptr_eq(&normal, &iso(&mut env, false)));
        assert!(!Arc::ptr_eq(&sql, &iso(&mut env, true)));
    }

    #[test]
    fn test_zoneless_values_use_sql_half_only_while_zones_differ() {
        let mut env = environment(&[("time_zone", "GMT+02")]);
        let normal = iso(&mut env, false);
        assert!(Arc::ptr_eq(&normal, &iso(&mut env, true)));

        env.set_setting("sql_date_and_time_time_zone", "GMT+04").unwrap();
        assert!(!Arc::ptr_eq(&normal, &iso(&mut env, true)));
        assert!(Arc::ptr_eq(&normal, &iso(&mut env, false)));

        env.set_setting("sql_date_and_time_time_zone", "GMT+02").unwrap();
        assert!(Arc::ptr_eq(&normal, &iso(&mut env, true)));
    }

    #[test]
    fn test_date_format_change_drops_only_that_default() {
        let mut env = environment(&[("time_zone", "UTC")]);
        let date_default = env.default_date_format(DateKind::Date).unwrap();
        let time_default = env.default_date_format(DateKind::Time).unwrap();
        let explicit = env.date_format_for("iso", DateKind::Date, false).unwrap();

        env.set_setting("date_format", "short").unwrap();

        assert!(!Arc::ptr_eq(&date_default, &env.default_date_format(DateKind::Date).unwrap()));
        assert!(Arc::ptr_eq(&time_default, &env.default_date_format(DateKind::Time).unwrap()));
        let still_cached = env.date_format_for("iso", DateKind::Date, false).unwrap();
        assert!(Arc::ptr_eq(&explicit, &still_cached));
    }

    #[test]
    fn test_custom_format_change_clears_everything() {
        let mut env = environment(&[("time_zone", "UTC")]);
        let computer = env.number_format_for("c").unwrap();
        let iso_format = iso(&mut env, false);
        let number_default = env.default_number_format().unwrap();

        env.set_setting("custom_number_formats", "{'hex': BaseNNumberFormatFactory}")
            .unwrap();

        assert!(!Arc::ptr_eq(&computer, &env.number_format_for("c").unwrap()));
        assert!(!Arc::ptr_eq(&iso_format, &iso(&mut env, false)));
        assert!(!Arc::ptr_eq(&number_default, &env.default_number_format().unwrap()));
        let hex = env.number_format_for("@hex 16").unwrap();
        assert_eq!(hex.format(&Number::Integer(255)).unwrap().as_str(), "ff");
    }
}
