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

//! Numeric values

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::fmt;

/// A template number
///
/// Integers and decimals are exact; doubles come from hosts that hand over
/// floating point data and may be NaN or infinite.
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    /// 64-bit integer
    Integer(i64),
    /// Exact decimal
    Decimal(Decimal),
    /// IEEE double
    Double(f64),
}

impl Number {
    /// Exact decimal value, `None` for NaN and infinities
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Number::Integer(i) => Some(Decimal::from(*i)),
            Number::Decimal(d) => Some(*d),
            Number::Double(f) => {
                if f.is_finite() {
                    Decimal::from_f64_retain(*f).or_else(|| Decimal::from_f64(*f))
                } else {
                    None
                }
            }
        }
    }

    /// Lossy conversion to `f64`
    pub fn to_f64(&self) -> f64 {
        match self {
            Number::Integer(i) => *i as f64,
            Number::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            Number::Double(f) => *f,
        }
    }

    /// The value as an integer, when it has no fractional part
    pub fn to_i64_exact(&self) -> Option<i64> {
        match self {
            Number::Integer(i) => Some(*i),
            Number::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Number::Double(f) if f.is_finite() && f.fract() == 0.0 => {
                if *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Truncating conversion to an integer
    pub fn to_i64_truncated(&self) -> Option<i64> {
        match self {
            Number::Integer(i) => Some(*i),
            Number::Decimal(d) => d.trunc().to_i64(),
            Number::Double(f) if f.is_finite() => Some(f.trunc() as i64),
            Number::Double(_) => None,
        }
    }

    /// Whether this is a NaN double
    pub fn is_nan(&self) -> bool {
        matches!(self, Number::Double(f) if f.is_nan())
    }

    /// Whether this is an infinite double
    pub fn is_infinite(&self) -> bool {
        matches!(self, Number::Double(f) if f.is_infinite())
    }

    /// Sign test without conversion
    pub fn is_negative(&self) -> bool {
        match self {
            Number::Integer(i) => *i < 0,
            Number::Decimal(d) => d.is_sign_negative() && !d.is_zero(),
            Number::Double(f) => *f < 0.0,
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Integer(value)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Integer(value as i64)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(i) => Number::Integer(i),
            Err(_) => Number::Double(value as f64),
        }
    }
}

impl From<Decimal> for Number {
    fn from(value: Decimal) -> Self {
        Number::Decimal(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Double(value)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{i}"),
            Number::Decimal(d) => write!(f, "{}", d.normalize()),
            Number::Double(v) => write!(f, "{v}"),
        }
    }
}
