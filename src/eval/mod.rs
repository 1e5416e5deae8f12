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

//! Coercion and comparison of template values
//!
//! The functions here only need a small view of the render state, the
//! [`EvalContext`]: the arithmetic engine, the collator, the boolean format,
//! classic compatibility, and access to the (cached) number and date
//! formats. The environment implements it; tests implement it with fixed
//! settings.

pub mod arithmetic;
pub mod coerce;
pub mod compare;

pub use arithmetic::{ArithmeticEngine, BigDecimalEngine, ConservativeEngine};
pub use coerce::{coerce_to_string, format_boolean, format_date, format_number, format_value};
pub use compare::{compare, CmpOp, CompareOptions, Operand};

use crate::error::TemplateResult;
use crate::format::{BooleanFormat, Collator, TemplateDateFormat, TemplateNumberFormat};
use crate::model::DateKind;
use std::sync::Arc;

/// The render state coercion and comparison depend on
pub trait EvalContext {
    /// Engine for number comparison
    fn arithmetic_engine(&self) -> Arc<dyn ArithmeticEngine>;

    /// Collator of the current locale
    fn collator(&self) -> Collator;

    /// Whether classic compatibility is on
    fn is_classic_compatible(&self) -> bool;

    /// Current boolean format
    fn boolean_format(&self) -> BooleanFormat;

    /// Current default number format
    fn number_format(&mut self) -> TemplateResult<Arc<dyn TemplateNumberFormat>>;

    /// Current default date format for a date kind
    fn date_format(
        &mut self,
        kind: DateKind,
        zoneless: bool,
    ) -> TemplateResult<Arc<dyn TemplateDateFormat>>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::format::{
        resolve_date_format, resolve_number_format, DateFormatRequest, Locale, TimeZone,
    };
    use indexmap::IndexMap;

    /// Fixed settings for unit tests
    pub(crate) struct FixedContext {
        pub locale: Locale,
        pub classic: bool,
        pub boolean_format: BooleanFormat,
        pub number_format: String,
        pub engine: Arc<dyn ArithmeticEngine>,
    }

    impl Default for FixedContext {
        fn default() -> Self {
            Self {
                locale: Locale::us(),
                classic: false,
                boolean_format: BooleanFormat::default(),
                number_format: "number".to_string(),
                engine: Arc::new(BigDecimalEngine),
            }
        }
    }

    impl EvalContext for FixedContext {
        fn arithmetic_engine(&self) -> Arc<dyn ArithmeticEngine> {
            self.engine.clone()
        }

        fn collator(&self) -> Collator {
            Collator::new(&self.locale)
        }

        fn is_classic_compatible(&self) -> bool {
            self.classic
        }

        fn boolean_format(&self) -> BooleanFormat {
            self.boolean_format.clone()
        }

        fn number_format(&mut self) -> TemplateResult<Arc<dyn TemplateNumberFormat>> {
            resolve_number_format(&self.number_format, &self.locale, &IndexMap::new())
        }

        fn date_format(
            &mut self,
            kind: DateKind,
            zoneless: bool,
        ) -> TemplateResult<Arc<dyn TemplateDateFormat>> {
            let time_zone = TimeZone::utc();
            let request = DateFormatRequest {
                kind,
                locale: &self.locale,
                time_zone: &time_zone,
                zoneless_input: zoneless,
            };
            resolve_date_format("iso", &request, &IndexMap::new())
        }
    }
}
