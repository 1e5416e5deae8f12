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

//! Mini-syntax for list-like setting values
//!
//! ```text
//! list:            a, "b c", 'd'
//! import list:     /lib/a.ftl as a, /lib/b.ftl as b
//! segmented list:  allowed_classes: A, B, trusted_templates: lib/*
//! ```

use indexmap::IndexMap;

/// Parse a boolean setting value
pub(crate) fn parse_boolean(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "t" => Ok(true),
        "false" | "no" | "n" | "f" => Ok(false),
        _ => Err(format!(
            "Boolean setting value must be one of \"true\", \"false\", \"yes\", \"no\", \"y\", \"n\", \"t\", \"f\", but was \"{value}\"."
        )),
    }
}

/// A word read by the parser
#[derive(Debug, Clone, PartialEq, Eq)]
struct Word {
    text: String,
    quoted: bool,
}

/// Cursor over a setting value
pub(crate) struct SettingStringParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> SettingStringParser<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// `a, b, c`
    pub(crate) fn parse_list(mut self) -> Result<Vec<String>, String> {
        let mut items = Vec::new();
        while self.skip_whitespace() {
            items.push(self.fetch_word(false)?.text);
            if !self.skip_whitespace() {
                break;
            }
            self.expect(',')?;
        }
        Ok(items)
    }

    /// `lib as ns, lib2 as ns2`; keys are namespaces
    pub(crate) fn parse_import_list(mut self) -> Result<IndexMap<String, String>, String> {
        let mut imports = IndexMap::new();
        while self.skip_whitespace() {
            let lib = self.fetch_word(false)?.text;
            if !self.skip_whitespace() {
                return Err("Unexpected end of text: expected \"as\"".to_string());
            }
            let keyword = self.fetch_word(false)?;
            if keyword.quoted || !keyword.text.eq_ignore_ascii_case("as") {
                return Err(format!(
                    "Expected \"as\", but found {}",
                    quote_for_message(&keyword.text)
                ));
            }
            if !self.skip_whitespace() {
                return Err("Unexpected end of text: expected the namespace name".to_string());
            }
            let namespace = self.fetch_word(false)?.text;
            imports.insert(namespace, lib);
            if !self.skip_whitespace() {
                break;
            }
            self.expect(',')?;
        }
        Ok(imports)
    }

    /// `key: a, b, key2: c`
    pub(crate) fn parse_segmented_list(mut self) -> Result<Vec<(String, Vec<String>)>, String> {
        let mut segments: Vec<(String, Vec<String>)> = Vec::new();
        while self.skip_whitespace() {
            let word = self.fetch_word(true)?;
            let key = (!word.quoted)
                .then(|| word.text.strip_suffix(':'))
                .flatten()
                .map(str::to_string);
            match (key, segments.last_mut()) {
                (Some(key), _) => segments.push((key, Vec::new())),
                (None, Some((_, items))) => items.push(word.text),
                (None, None) => {
                    return Err(format!(
                        "The very first element must be a key (ending with colon), but found {}",
                        quote_for_message(&word.text)
                    ));
                }
            }
            if !self.skip_whitespace() {
                break;
            }
            if self.peek() == Some(',') {
                self.pos += 1;
            } else if segments.last().is_some_and(|(_, items)| !items.is_empty()) {
                // a key may follow a value directly only after a comma
                return Err(format!("Expected \",\" but found \"{}\"", self.rest_preview()));
            }
        }
        Ok(segments)
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn rest_preview(&self) -> String {
        self.text[self.pos..].chars().take(20).collect()
    }

    /// Skip whitespace; false when the end of the text was reached
    fn skip_whitespace(&mut self) -> bool {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                return true;
            }
            self.pos += c.len_utf8();
        }
        false
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(_) => Err(format!(
                "Expected \"{expected}\", but found \"{}\"",
                self.rest_preview()
            )),
            None => Err(format!("Unexpected end of text: expected \"{expected}\"")),
        }
    }

    fn fetch_word(&mut self, allow_key: bool) -> Result<Word, String> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => self.fetch_quoted(q),
            Some(_) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    let bare = c.is_alphanumeric() || matches!(c, '/' | '\\' | '_' | '.' | '-' | '!' | '*' | '?');
                    if bare {
                        self.pos += c.len_utf8();
                    } else if c == ':' {
                        self.pos += 1;
                        if allow_key {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                if self.pos == start {
                    return Err(format!(
                        "Unexpected character: \"{}\"",
                        self.rest_preview()
                    ));
                }
                Ok(Word {
                    text: self.text[start..self.pos].to_string(),
                    quoted: false,
                })
            }
            None => Err("Unexpected end of text".to_string()),
        }
    }

    fn fetch_quoted(&mut self, quote: char) -> Result<Word, String> {
        self.pos += 1;
        let mut text = String::new();
        let mut escaped = false;
        while let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            if escaped {
                text.push(match c {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                return Ok(Word { text, quoted: true });
            } else {
                text.push(c);
            }
        }
        Err(format!("Missing {quote}"))
    }
}

fn quote_for_message(text: &str) -> String {
    format!("\"{text}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("yes", true)]
    #[case("Y", true)]
    #[case("TRUE", true)]
    #[case("t", true)]
    #[case("no", false)]
    #[case("F", false)]
    fn test_parse_boolean(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(parse_boolean(text).unwrap(), expected);
    }

    #[test]
    fn test_parse_boolean_rejects_other_words() {
        assert!(parse_boolean("maybe").is_err());
    }

    #[test]
    fn test_parse_list() {
        let list = SettingStringParser::new(" a.ftl, \"b c.ftl\" ,'d'").parse_list().unwrap();
        assert_eq!(list, vec!["a.ftl", "b c.ftl", "d"]);
        assert!(SettingStringParser::new("").parse_list().unwrap().is_empty());
        assert!(SettingStringParser::new("a b").parse_list().is_err());
    }

    #[test]
    fn test_parse_import_list() {
        let imports = SettingStringParser::new("/lib/a.ftl as a, \"/lib/b.ftl\" as b")
            .parse_import_list()
            .unwrap();
        assert_eq!(imports.get("a").map(String::as_str), Some("/lib/a.ftl"));
        assert_eq!(imports.get_index(1).map(|(k, _)| k.as_str()), Some("b"));

        let err = SettingStringParser::new("a.ftl is a").parse_import_list().unwrap_err();
        assert_eq!(err, "Expected \"as\", but found \"is\"");
        let err = SettingStringParser::new("a.ftl as ").parse_import_list().unwrap_err();
        assert_eq!(err, "Unexpected end of text: expected the namespace name");
    }

    #[test]
    fn test_parse_segmented_list() {
        let segments = SettingStringParser::new("allowed_classes: A, B, trusted_templates: lib/*, x")
            .parse_segmented_list()
            .unwrap();
        assert_eq!(
            segments,
            vec![
                ("allowed_classes".to_string(), vec!["A".to_string(), "B".to_string()]),
                ("trusted_templates".to_string(), vec!["lib/*".to_string(), "x".to_string()]),
            ]
        );
        assert!(SettingStringParser::new("A, b:").parse_segmented_list().is_err());
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            SettingStringParser::new("'abc").parse_list().unwrap_err(),
            "Missing '"
        );
    }
}
