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

//! Argument checks shared by the built-in helpers
//!
//! Every failure names the built-in the way it was invoked.

use crate::error::{TemplateError, TemplateResult};
use crate::model::{optional_type_description, Number, Value};

/// Require exactly `expected` arguments
pub fn check_count(builtin: &str, args: &[Option<Value>], expected: usize) -> TemplateResult<()> {
    if args.len() != expected {
        return Err(TemplateError::ArgumentCount {
            builtin: builtin.to_string(),
            expected: expected.to_string(),
            actual: args.len(),
        });
    }
    Ok(())
}

/// Require between `min` and `max` arguments
pub fn check_count_range(
    builtin: &str,
    args: &[Option<Value>],
    min: usize,
    max: usize,
) -> TemplateResult<()> {
    if args.len() < min || args.len() > max {
        return Err(TemplateError::ArgumentCount {
            builtin: builtin.to_string(),
            expected: format!("{min} to {max}"),
            actual: args.len(),
        });
    }
    Ok(())
}

fn wrong_type(builtin: &str, args: &[Option<Value>], index: usize, expected: &str) -> TemplateError {
    TemplateError::ArgumentType {
        builtin: builtin.to_string(),
        position: index + 1,
        expected: expected.to_string(),
        actual: optional_type_description(args.get(index).and_then(Option::as_ref)),
    }
}

/// String argument at `index`
pub fn string_arg(builtin: &str, args: &[Option<Value>], index: usize) -> TemplateResult<String> {
    optional_string_arg(builtin, args, index)?
        .ok_or_else(|| wrong_type(builtin, args, index, "a string"))
}

/// String argument at `index`, absent when there are fewer arguments
pub fn optional_string_arg(
    builtin: &str,
    args: &[Option<Value>],
    index: usize,
) -> TemplateResult<Option<String>> {
    if index >= args.len() {
        return Ok(None);
    }
    match args[index].as_ref().and_then(Value::string_value) {
        Some(s) => Ok(Some(s.into_owned())),
        None => Err(wrong_type(builtin, args, index, "a string")),
    }
}

/// Number argument at `index`
pub fn number_arg(builtin: &str, args: &[Option<Value>], index: usize) -> TemplateResult<Number> {
    optional_number_arg(builtin, args, index)?
        .ok_or_else(|| wrong_type(builtin, args, index, "a number"))
}

/// Number argument at `index`, absent when there are fewer arguments
pub fn optional_number_arg(
    builtin: &str,
    args: &[Option<Value>],
    index: usize,
) -> TemplateResult<Option<Number>> {
    if index >= args.len() {
        return Ok(None);
    }
    match args[index].as_ref().and_then(Value::number_value) {
        Some(n) => Ok(Some(n)),
        None => Err(wrong_type(builtin, args, index, "a number")),
    }
}

/// Whole number argument at `index`
pub fn int_arg(builtin: &str, args: &[Option<Value>], index: usize) -> TemplateResult<i64> {
    let number = number_arg(builtin, args, index)?;
    number
        .to_i64_exact()
        .ok_or_else(|| wrong_type(builtin, args, index, "a whole number"))
}

/// Non-negative whole number argument at `index`
pub fn index_arg(builtin: &str, args: &[Option<Value>], index: usize) -> TemplateResult<usize> {
    let number = int_arg(builtin, args, index)?;
    usize::try_from(number).map_err(|_| wrong_type(builtin, args, index, "a non-negative number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_count_errors_name_the_builtin() {
        let args = vec![Some(Value::from("a"))];
        let error = check_count("leftPad", &args, 2).unwrap_err();
        assert_eq!(
            error.to_string(),
            "?leftPad expects 2 argument(s), but has received 1."
        );
        let error = check_count_range("join", &[], 1, 3).unwrap_err();
        assert_eq!(error.to_string(), "?join expects 1 to 3 argument(s), but has received 0.");
    }

    #[test]
    fn test_typed_arguments() {
        let args = vec![Some(Value::from(3)), Some(Value::from("x")), None];
        assert_eq!(int_arg("b", &args, 0).unwrap(), 3);
        assert_eq!(string_arg("b", &args, 1).unwrap(), "x");
        assert_eq!(optional_string_arg("b", &args, 5).unwrap(), None);
        let error = number_arg("b", &args, 1).unwrap_err();
        assert!(matches!(error, TemplateError::ArgumentType { position: 2, .. }));
        assert!(string_arg("b", &args, 2).is_err());
        assert!(index_arg("b", &[Some(Value::from(-1))], 0).is_err());
    }
}
