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

//! Number built-ins

use super::super::{BuiltIn, BuiltInCall, BuiltInRegistry};
use crate::environment::Environment;
use crate::error::{EvalResult, TemplateError, TemplateResult};
use crate::model::{Number, Value};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub(super) fn register(registry: &mut BuiltInRegistry) {
    registry.register("abs", on_number(abs));
    registry.register("round", on_number(|n| whole(n, Rounding::HalfUp)));
    registry.register("floor", on_number(|n| whole(n, Rounding::Floor)));
    registry.register("ceiling", on_number(|n| whole(n, Rounding::Ceiling)));
    registry.register("int", on_number(|n| whole(n, Rounding::Truncate)));
    registry.register("is_nan", on_number(|n| Ok(Value::from(n.is_nan()))));
    registry.register("is_infinite", on_number(|n| Ok(Value::from(n.is_infinite()))));
}

fn on_number(f: fn(&Number) -> TemplateResult<Value>) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let number = call.target_number(env)?;
        Ok(Some(f(&number)?))
    }
}

fn abs(number: &Number) -> TemplateResult<Value> {
    let result = match number {
        Number::Integer(i) => match i.checked_abs() {
            Some(a) => Number::Integer(a),
            None => Number::Decimal(Decimal::from(*i).abs()),
        },
        Number::Decimal(d) => Number::Decimal(d.abs()),
        Number::Double(f) => Number::Double(f.abs()),
    };
    Ok(Value::Number(result))
}

#[derive(Debug, Clone, Copy)]
enum Rounding {
    /// Nearest whole number, halves toward positive infinity
    HalfUp,
    Floor,
    Ceiling,
    Truncate,
}

fn whole(number: &Number, rounding: Rounding) -> TemplateResult<Value> {
    let result = match number {
        Number::Integer(i) => Number::Integer(*i),
        Number::Decimal(d) => {
            let rounded = match rounding {
                Rounding::HalfUp => (*d + Decimal::new(5, 1)).floor(),
                Rounding::Floor => d.floor(),
                Rounding::Ceiling => d.ceil(),
                Rounding::Truncate => d.trunc(),
            };
            rounded
                .to_i64()
                .map_or(Number::Decimal(rounded), Number::Integer)
        }
        Number::Double(f) => {
            if !f.is_finite() {
                return Err(TemplateError::evaluation(format!(
                    "Can't round {number} to a whole number."
                )));
            }
            let rounded = match rounding {
                Rounding::HalfUp => (f + 0.5).floor(),
                Rounding::Floor => f.floor(),
                Rounding::Ceiling => f.ceil(),
                Rounding::Truncate => f.trunc(),
            };
            Number::Integer(rounded as i64)
        }
    };
    Ok(Value::Number(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::str::FromStr;

    fn dec(s: &str) -> Number {
        Number::Decimal(Decimal::from_str(s).unwrap())
    }

    #[rstest]
    #[case(dec("1.5"), Rounding::HalfUp, 2)]
    #[case(dec("-1.5"), Rounding::HalfUp, -1)]
    #[case(dec("-1.2"), Rounding::Floor, -2)]
    #[case(dec("1.2"), Rounding::Ceiling, 2)]
    #[case(dec("-1.7"), Rounding::Truncate, -1)]
    #[case(Number::Double(2.5), Rounding::HalfUp, 3)]
    fn test_whole(#[case] number: Number, #[case] rounding: Rounding, #[case] expected: i64) {
        let result = whole(&number, rounding).unwrap();
        assert_eq!(result.number_value(), Some(Number::Integer(expected)));
    }

    #[test]
    fn test_abs_and_special_values() {
        assert_eq!(abs(&Number::Integer(-3)).unwrap().number_value(), Some(Number::Integer(3)));
        assert_eq!(abs(&dec("-0.5")).unwrap().number_value(), Some(dec("0.5")));
        assert!(whole(&Number::Double(f64::NAN), Rounding::Floor).is_err());
    }
}
