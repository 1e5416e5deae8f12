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

//! Boolean formats

/// How booleans are turned into strings
///
/// Parsed from the `boolean_format` setting: either `c` (or `computer`),
/// or `true_text,false_text` with exactly one comma.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BooleanFormat {
    /// `true` and `false`
    Computer,
    /// Explicit texts
    Pair {
        /// Text for `true`
        true_text: String,
        /// Text for `false`
        false_text: String,
    },
}

impl BooleanFormat {
    /// Parse a `boolean_format` value
    pub fn parse(format: &str) -> Result<Self, String> {
        if format == "c" || format == "computer" {
            return Ok(BooleanFormat::Computer);
        }
        let mut parts = format.split(',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(f), None) => Ok(BooleanFormat::Pair {
                true_text: t.to_string(),
                false_text: f.to_string(),
            }),
            _ => Err(format!(
                "Boolean format must be \"c\", or a \"true,false\" pair with exactly one comma, but was: {format:?}"
            )),
        }
    }

    /// Whether this is the `true,false` pair or the computer format
    pub fn is_computer_like(&self) -> bool {
        match self {
            BooleanFormat::Computer => true,
            BooleanFormat::Pair {
                true_text,
                false_text,
            } => true_text == "true" && false_text == "false",
        }
    }

    /// Format a boolean
    pub fn format(&self, value: bool) -> &str {
        match (self, value) {
            (BooleanFormat::Computer, true) => "true",
            (BooleanFormat::Computer, false) => "false",
            (BooleanFormat::Pair { true_text, .. }, true) => true_text,
            (BooleanFormat::Pair { false_text, .. }, false) => false_text,
        }
    }
}

impl Default for BooleanFormat {
    fn default() -> Self {
        BooleanFormat::Pair {
            true_text: "true".to_string(),
            false_text: "false".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_pair() {
        let format = BooleanFormat::parse("yes,no").unwrap();
        assert_eq!(format.format(true), "yes");
        assert_eq!(format.format(false), "no");
        assert!(!format.is_computer_like());
    }

    #[test]
    fn test_parse_computer() {
        assert_eq!(BooleanFormat::parse("c").unwrap(), BooleanFormat::Computer);
        assert!(BooleanFormat::default().is_computer_like());
    }

    #[test]
    fn test_reject_malformed() {
        assert!(BooleanFormat::parse("yes").is_err());
        assert!(BooleanFormat::parse("a,b,c").is_err());
    }
}
