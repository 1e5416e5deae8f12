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

//! Text truncation used by `?truncate`, `?truncate_w` and `?truncate_c`

use super::builder::{BuilderArgs, BuilderValue};
use std::fmt;

/// Where a truncation may cut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncateMode {
    /// Prefer word boundaries, cut inside a word when that loses too much
    Auto,
    /// Only at word boundaries (falls back to characters when there is none)
    Word,
    /// Anywhere
    Char,
}

/// Truncation strategy
pub trait TruncateAlgorithm: Send + Sync + fmt::Debug {
    /// Shorten `text` to at most `max_length` characters, terminator included
    fn truncate(
        &self,
        text: &str,
        max_length: usize,
        terminator: Option<&str>,
        mode: TruncateMode,
    ) -> String;

    /// Default terminator
    fn terminator(&self) -> &str;
}

/// `[...]` terminated truncation that prefers word boundaries
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultTruncateAlgorithm {
    terminator: String,
    add_space_at_word_boundary: bool,
    /// Minimum share of the available length an auto cut at a word boundary must keep
    word_boundary_min_ratio: f64,
}

impl Default for DefaultTruncateAlgorithm {
    fn default() -> Self {
        Self {
            terminator: "[...]".to_string(),
            add_space_at_word_boundary: true,
            word_boundary_min_ratio: 0.75,
        }
    }
}

impl DefaultTruncateAlgorithm {
    /// Use another default terminator
    pub fn with_terminator(terminator: impl Into<String>) -> Self {
        Self {
            terminator: terminator.into(),
            ..Self::default()
        }
    }

    /// `DefaultTruncateAlgorithm(terminator, add_space_at_word_boundary=.., word_boundary_min_ratio=..)`
    pub(crate) fn from_builder_args(args: &BuilderArgs) -> Result<Self, String> {
        let mut algorithm = Self::default();
        match args.positional.as_slice() {
            [] => {}
            [BuilderValue::String(t)] => algorithm.terminator = t.clone(),
            _ => return Err("expects at most one positional argument, the terminator string".to_string()),
        }
        for (name, value) in &args.named {
            match (name.as_str(), value) {
                ("add_space_at_word_boundary", BuilderValue::Boolean(b)) => {
                    algorithm.add_space_at_word_boundary = *b;
                }
                ("word_boundary_min_ratio", BuilderValue::Number(n)) => {
                    algorithm.word_boundary_min_ratio = n.to_string().parse().map_err(|_| "bad ratio")?;
                }
                (other, _) => return Err(format!("unsupported or mistyped argument \"{other}\"")),
            }
        }
        Ok(algorithm)
    }

    fn cut_at_chars(text: &str, budget: usize) -> String {
        text.chars().take(budget).collect::<String>().trim_end().to_string()
    }

    /// Longest prefix ending at a word boundary within `budget` characters
    fn cut_at_word(text: &str, budget: usize) -> Option<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut end = budget.min(chars.len());
        // a boundary right after the budget keeps the last word whole
        if end < chars.len() && !chars[end].is_whitespace() {
            while end > 0 && !chars[end - 1].is_whitespace() {
                end -= 1;
            }
        }
        let cut: String = chars[..end].iter().collect::<String>().trim_end().to_string();
        (!cut.is_empty()).then_some(cut)
    }
}

impl TruncateAlgorithm for DefaultTruncateAlgorithm {
    fn truncate(
        &self,
        text: &str,
        max_length: usize,
        terminator: Option<&str>,
        mode: TruncateMode,
    ) -> String {
        if text.chars().count() <= max_length {
            return text.to_string();
        }
        let terminator = terminator.unwrap_or(&self.terminator);
        let terminator_length = terminator.chars().count();
        if max_length <= terminator_length {
            return terminator.chars().take(max_length).collect();
        }
        let char_budget = max_length - terminator_length;
        let space = usize::from(self.add_space_at_word_boundary);
        let word_budget = char_budget.saturating_sub(space);

        let by_word = || {
            Self::cut_at_word(text, word_budget).map(|cut| {
                let separator = if self.add_space_at_word_boundary { " " } else { "" };
                (cut.chars().count(), format!("{cut}{separator}{terminator}"))
            })
        };
        let by_char = || format!("{}{terminator}", Self::cut_at_chars(text, char_budget));

        match mode {
            TruncateMode::Char => by_char(),
            TruncateMode::Word => by_word().map_or_else(by_char, |(_, s)| s),
            TruncateMode::Auto => match by_word() {
                Some((kept, s)) if kept as f64 >= word_budget as f64 * self.word_boundary_min_ratio => s,
                _ => by_char(),
            },
        }
    }

    fn terminator(&self) -> &str {
        &self.terminator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const TEXT: &str = "Lorem ipsum dolor sit amet";

    #[rstest]
    #[case(TruncateMode::Word, 15, "Lorem [...]")]
    #[case(TruncateMode::Char, 15, "Lorem ipsu[...]")]
    #[case(TruncateMode::Auto, 15, "Lorem ipsu[...]")]
    #[case(TruncateMode::Auto, 23, "Lorem ipsum dolor [...]")]
    #[case(TruncateMode::Word, 100, TEXT)]
    #[case(TruncateMode::Char, 3, "[..")]
    fn test_truncate(#[case] mode: TruncateMode, #[case] max: usize, #[case] expected: &str) {
        let algorithm = DefaultTruncateAlgorithm::default();
        let result = algorithm.truncate(TEXT, max, None, mode);
        assert_eq!(result, expected);
        assert!(result.chars().count() <= max);
    }

    #[test]
    fn test_custom_terminator() {
        let algorithm = DefaultTruncateAlgorithm::default();
        assert_eq!(algorithm.truncate(TEXT, 10, Some("…"), TruncateMode::Word), "Lorem …");
    }
}
