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

//! String built-ins
//!
//! The left-hand operand is converted to text first, so `price?length`
//! measures the formatted number.

use super::super::args::{
    check_count, check_count_range, index_arg, int_arg, optional_string_arg, string_arg,
};
use super::super::{
    bound_function, function_model, BuiltIn, BuiltInCall, BuiltInRegistry, StringAndFunction,
};
use crate::environment::Environment;
use crate::error::{EvalResult, TemplateError, TemplateResult};
use crate::format::TemplateDateFormat;
use crate::model::{
    BooleanModel, Callable, DateKind, DateModel, FunctionModel, Model, Number, SequenceModel,
    SimpleSequence, TemplateDate, Value,
};
use crate::settings::TruncateMode;
use lru::LruCache;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock};

type StringMethod = fn(&str, &str, &[Option<Value>]) -> TemplateResult<Value>;

pub(super) fn register(registry: &mut BuiltInRegistry) {
    registry.register("length", simple(|s| Value::from(s.chars().count() as i64)));
    registry.register("upper_case", simple(|s| Value::from(s.to_uppercase())));
    registry.register("lower_case", simple(|s| Value::from(s.to_lowercase())));
    registry.register("cap_first", simple(|s| Value::from(change_first(s, true))));
    registry.register("uncap_first", simple(|s| Value::from(change_first(s, false))));
    registry.register("capitalize", simple(|s| Value::from(capitalize(s))));
    registry.register("trim", simple(|s| Value::from(s.trim())));

    registry.register("contains", method(contains));
    registry.register("starts_with", method(starts_with));
    registry.register("ends_with", method(ends_with));
    registry.register("index_of", method(index_of));
    registry.register("last_index_of", method(last_index_of));
    registry.register("replace", method(replace));
    registry.register("split", method(split));
    registry.register("matches", method(matches));
    registry.register("left_pad", method(left_pad));
    registry.register("right_pad", method(right_pad));

    registry.register("truncate", truncate(TruncateMode::Auto));
    registry.register("truncate_w", truncate(TruncateMode::Word));
    registry.register("truncate_c", truncate(TruncateMode::Char));

    registry.register("url", url(false));
    registry.register("url_path", url(true));

    registry.register("boolean", to_boolean);
    registry.register("number", to_number);
}

fn simple<F>(f: F) -> impl BuiltIn
where
    F: Fn(&str) -> Value + Send + Sync + 'static,
{
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let text = call.target_string(env)?;
        Ok(Some(f(&text)))
    }
}

fn method(f: StringMethod) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let text = call.target_string(env)?;
        let name = call.name.to_string();
        Ok(Some(bound_function(move |_env, args| {
            Ok(Some(f(&text, &name, &args)?))
        })))
    }
}

fn change_first(s: &str, upper: bool) -> String {
    let Some(start) = s.find(|c: char| !c.is_whitespace()) else {
        return s.to_string();
    };
    let mut out = String::with_capacity(s.len());
    out.push_str(&s[..start]);
    let mut rest = s[start..].chars();
    if let Some(first) = rest.next() {
        if upper {
            out.extend(first.to_uppercase());
        } else {
            out.extend(first.to_lowercase());
        }
    }
    out.extend(rest);
    out
}

fn capitalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn contains(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    check_count(name, args, 1)?;
    Ok(Value::from(s.contains(string_arg(name, args, 0)?.as_str())))
}

fn starts_with(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    check_count(name, args, 1)?;
    Ok(Value::from(s.starts_with(string_arg(name, args, 0)?.as_str())))
}

fn ends_with(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    check_count(name, args, 1)?;
    Ok(Value::from(s.ends_with(string_arg(name, args, 0)?.as_str())))
}

fn find_chars(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()] == *needle)
}

fn rfind_chars(hay: &[char], needle: &[char], until: usize) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    let last = until.min(hay.len() - needle.len());
    (0..=last).rev().find(|&i| hay[i..i + needle.len()] == *needle)
}

fn position(found: Option<usize>) -> Value {
    Value::from(found.map_or(-1, |i| i as i64))
}

fn index_of(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    check_count_range(name, args, 1, 2)?;
    let hay: Vec<char> = s.chars().collect();
    let needle: Vec<char> = string_arg(name, args, 0)?.chars().collect();
    let from = if args.len() > 1 {
        int_arg(name, args, 1)?.max(0) as usize
    } else {
        0
    };
    Ok(position(find_chars(&hay, &needle, from)))
}

fn last_index_of(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    check_count_range(name, args, 1, 2)?;
    let hay: Vec<char> = s.chars().collect();
    let needle: Vec<char> = string_arg(name, args, 0)?.chars().collect();
    if args.len() > 1 {
        let until = int_arg(name, args, 1)?;
        if until < 0 {
            return Ok(Value::from(-1));
        }
        return Ok(position(rfind_chars(&hay, &needle, until as usize)));
    }
    Ok(position(rfind_chars(&hay, &needle, hay.len())))
}

/// Flags of `?replace`, `?split` and `?matches`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
struct RegexFlags {
    regex: bool,
    case_insensitive: bool,
    first_only: bool,
    multi_line: bool,
    dot_all: bool,
    comments: bool,
}

impl RegexFlags {
    fn parse(name: &str, flags: &str) -> TemplateResult<Self> {
        let mut parsed = RegexFlags::default();
        for flag in flags.chars() {
            match flag {
                'r' => parsed.regex = true,
                'i' => parsed.case_insensitive = true,
                'f' => parsed.first_only = true,
                'm' => parsed.multi_line = true,
                's' => parsed.dot_all = true,
                'c' => parsed.comments = true,
                other => {
                    return Err(TemplateError::evaluation(format!(
                        "?{name}: Unrecognized flag \"{other}\" in \"{flags}\"."
                    )));
                }
            }
        }
        Ok(parsed)
    }

    /// Whether a plain substring search is enough
    fn is_literal(&self) -> bool {
        !self.regex && !self.case_insensitive
    }
}

const PATTERN_CACHE_LIMIT: usize = 64;

/// Compiled patterns, least recently used evicted first
static PATTERN_CACHE: LazyLock<Mutex<LruCache<(String, RegexFlags), Regex>>> = LazyLock::new(|| {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(PATTERN_CACHE_LIMIT).unwrap_or(NonZeroUsize::MIN),
    ))
});

fn compile(name: &str, pattern: &str, flags: RegexFlags) -> TemplateResult<Regex> {
    let mut key_flags = flags;
    key_flags.first_only = false;
    let key = (pattern.to_string(), key_flags);
    if let Some(regex) = PATTERN_CACHE.lock().get(&key) {
        return Ok(regex.clone());
    }
    let source = if flags.regex {
        pattern.to_string()
    } else {
        regex::escape(pattern)
    };
    let regex = RegexBuilder::new(&source)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_all)
        .ignore_whitespace(flags.comments)
        .build()
        .map_err(|e| TemplateError::InvalidFormat {
            format: pattern.to_string(),
            message: format!("?{name}: malformed regular expression: {e}"),
        })?;
    PATTERN_CACHE.lock().put(key, regex.clone());
    Ok(regex)
}

fn replace(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    check_count_range(name, args, 2, 3)?;
    let from = string_arg(name, args, 0)?;
    let to = string_arg(name, args, 1)?;
    let flags = RegexFlags::parse(name, &optional_string_arg(name, args, 2)?.unwrap_or_default())?;
    if flags.is_literal() {
        let replaced = if flags.first_only {
            s.replacen(from.as_str(), &to, 1)
        } else {
            s.replace(from.as_str(), &to)
        };
        return Ok(Value::from(replaced));
    }
    let regex = compile(name, &from, flags)?;
    // only regular expressions expand $1 style group references
    let replacement = if flags.regex { to } else { to.replace('$', "$$") };
    let replaced = if flags.first_only {
        regex.replacen(s, 1, replacement.as_str())
    } else {
        regex.replace_all(s, replacement.as_str())
    };
    Ok(Value::from(replaced.into_owned()))
}

fn split(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    check_count_range(name, args, 1, 2)?;
    let separator = string_arg(name, args, 0)?;
    let flags = RegexFlags::parse(name, &optional_string_arg(name, args, 1)?.unwrap_or_default())?;
    if flags.first_only {
        log::warn!("?{name} doesn't support the \"f\" flag; it was ignored");
    }
    let parts: Vec<Value> = if separator.is_empty() && !flags.regex {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    } else if flags.is_literal() {
        s.split(separator.as_str()).map(Value::from).collect()
    } else {
        compile(name, &separator, flags)?.split(s).map(Value::from).collect()
    };
    Ok(Value::sequence(parts))
}

/// Result of `?matches`: true if the whole string matches, and the list of all matches
struct RegexMatches {
    entire: bool,
    found: SimpleSequence,
}

impl Model for RegexMatches {
    fn as_boolean(&self) -> Option<&dyn BooleanModel> {
        Some(self)
    }

    fn as_sequence(&self) -> Option<&dyn SequenceModel> {
        Some(&self.found)
    }
}

impl BooleanModel for RegexMatches {
    fn as_boolean(&self) -> bool {
        self.entire
    }
}

fn matches(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    check_count_range(name, args, 1, 2)?;
    let pattern = string_arg(name, args, 0)?;
    let mut flags = RegexFlags::parse(name, &optional_string_arg(name, args, 1)?.unwrap_or_default())?;
    if flags.first_only {
        log::warn!("?{name} doesn't support the \"f\" flag; it was ignored");
    }
    flags.regex = true;
    let regex = compile(name, &pattern, flags)?;
    let entire = compile(name, &format!(r"\A(?:{pattern})\z"), flags)?.is_match(s);
    let found = regex.find_iter(s).map(|m| Value::from(m.as_str())).collect();
    Ok(Value::Object(Arc::new(RegexMatches {
        entire,
        found: SimpleSequence::from_values(found),
    })))
}

fn pad_args(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Option<(usize, Vec<char>)>> {
    check_count_range(name, args, 1, 2)?;
    let width = int_arg(name, args, 0)?;
    let filler: Vec<char> = optional_string_arg(name, args, 1)?
        .unwrap_or_else(|| " ".to_string())
        .chars()
        .collect();
    if filler.is_empty() {
        return Err(TemplateError::evaluation(format!(
            "?{name}: The 2nd argument can't be a 0-length string."
        )));
    }
    let length = s.chars().count();
    if width <= length as i64 {
        return Ok(None);
    }
    Ok(Some((width as usize - length, filler)))
}

fn left_pad(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    let Some((missing, filler)) = pad_args(s, name, args)? else {
        return Ok(Value::from(s));
    };
    let mut out: String = filler.iter().cycle().take(missing).collect();
    out.push_str(s);
    Ok(Value::from(out))
}

fn right_pad(s: &str, name: &str, args: &[Option<Value>]) -> TemplateResult<Value> {
    let Some((missing, filler)) = pad_args(s, name, args)? else {
        return Ok(Value::from(s));
    };
    let length = s.chars().count();
    let mut out = s.to_string();
    out.extend((length..length + missing).map(|i| filler[i % filler.len()]));
    Ok(Value::from(out))
}

fn truncate(mode: TruncateMode) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let text = call.target_string(env)?;
        let name = call.name.to_string();
        Ok(Some(bound_function(move |env, args| {
            check_count_range(&name, &args, 1, 2)?;
            let max_length = index_arg(&name, &args, 0)?;
            let terminator = optional_string_arg(&name, &args, 1)?;
            let algorithm = env.settings().truncate_builtin_algorithm().clone();
            let truncated = algorithm.truncate(&text, max_length, terminator.as_deref(), mode);
            Ok(Some(Value::from(truncated)))
        })))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrlCharset {
    Utf8,
    Latin1,
}

impl UrlCharset {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "utf8" => Some(UrlCharset::Utf8),
            "iso88591" | "latin1" => Some(UrlCharset::Latin1),
            _ => None,
        }
    }

    fn encode(self, c: char, buf: &mut Vec<u8>) {
        match self {
            UrlCharset::Utf8 => {
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
            UrlCharset::Latin1 => buf.push(u8::try_from(u32::from(c)).unwrap_or(b'?')),
        }
    }
}

fn url_escape(text: &str, charset: UrlCharset, keep_slash: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut bytes = Vec::with_capacity(4);
    for c in text.chars() {
        let safe = c.is_ascii_alphanumeric()
            || matches!(c, '-' | '_' | '.' | '!' | '~' | '*' | '\'' | '(' | ')')
            || (keep_slash && c == '/');
        if safe {
            out.push(c);
            continue;
        }
        bytes.clear();
        charset.encode(c, &mut bytes);
        for b in &bytes {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn resolve_charset(name: &str, charset: &str) -> TemplateResult<UrlCharset> {
    UrlCharset::from_name(charset).ok_or_else(|| {
        TemplateError::evaluation(format!("?{name}: Unsupported charset: \"{charset}\""))
    })
}

fn url(keep_slash: bool) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let text = call.target_string(env)?;
        let name = call.name.to_string();
        let settings = env.settings();
        let default_charset = settings
            .url_escaping_charset()
            .clone()
            .or_else(|| settings.output_encoding().clone());
        let default_escaped = match default_charset {
            Some(charset_name) => {
                Some(url_escape(&text, resolve_charset(&name, &charset_name)?, keep_slash))
            }
            None => None,
        };
        let escape_with = move |_env: &mut Environment<'_>, args: Vec<Option<Value>>| -> EvalResult<Option<Value>> {
            check_count(&name, &args, 1)?;
            let charset = resolve_charset(&name, &string_arg(&name, &args, 0)?)?;
            Ok(Some(Value::from(url_escape(&text, charset, keep_slash))))
        };
        // without a default charset only the callable form is usable
        Ok(Some(match default_escaped {
            Some(escaped) => StringAndFunction::new(escaped, escape_with),
            None => bound_function(escape_with),
        }))
    }
}

fn to_boolean(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let text = call.target_string(env)?;
    match text.as_str() {
        "true" => return Ok(Some(Value::from(true))),
        "false" => return Ok(Some(Value::from(false))),
        _ => {}
    }
    let format = env.settings().boolean_format().clone();
    if !format.is_computer_like() {
        if text == format.format(true) {
            return Ok(Some(Value::from(true)));
        }
        if text == format.format(false) {
            return Ok(Some(Value::from(false)));
        }
    }
    Err(TemplateError::evaluation(format!(
        "Can't convert this string to boolean: \"{text}\""
    ))
    .into())
}

fn to_number(call: &BuiltInCall<'_>, env: &mut Environment<'_>) -> EvalResult<Option<Value>> {
    let value = call.target_value(env)?;
    if let Some(number) = value.number_value() {
        return Ok(Some(Value::Number(number)));
    }
    let text = call.target_string(env)?;
    let engine = env.settings().arithmetic_engine().clone();
    let number: Number = engine.to_number(text.trim())?;
    Ok(Some(Value::Number(number)))
}

/// A string that is parsed as a date on demand
///
/// As a date it uses the default format of its kind; called with a format
/// string it parses with that format instead.
pub(crate) struct DateParser {
    text: String,
    kind: DateKind,
    default_format: Result<Arc<dyn TemplateDateFormat>, TemplateError>,
    parse_with: Arc<dyn FunctionModel>,
}

impl DateParser {
    pub(crate) fn value(text: String, kind: DateKind, name: &str, env: &mut Environment<'_>) -> Value {
        let default_format = env.default_date_format(kind);
        let parse_text = text.clone();
        let name = name.to_string();
        let parse_with = move |env: &mut Environment<'_>, args: Vec<Option<Value>>| -> EvalResult<Option<Value>> {
            check_count(&name, &args, 1)?;
            let format = string_arg(&name, &args, 0)?;
            let date = env.date_format_for(&format, kind, false)?.parse(&parse_text, kind)?;
            Ok(Some(Value::Date(date)))
        };
        Value::Object(Arc::new(DateParser {
            text,
            kind,
            default_format,
            parse_with: function_model(parse_with),
        }))
    }
}

impl Model for DateParser {
    fn as_date(&self) -> Option<&dyn DateModel> {
        Some(self)
    }

    fn as_callable(&self) -> Option<Callable> {
        Some(Callable::Function(self.parse_with.clone()))
    }
}

impl DateModel for DateParser {
    fn date_kind(&self) -> DateKind {
        self.kind
    }

    fn as_date(&self) -> TemplateResult<TemplateDate> {
        match &self.default_format {
            Ok(format) => format.parse(&self.text, self.kind),
            Err(error) => Err(error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn call(f: StringMethod, s: &str, args: Vec<Value>) -> TemplateResult<Value> {
        let args: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        f(s, "test", &args)
    }

    fn text(value: TemplateResult<Value>) -> String {
        value.unwrap().string_value().unwrap().into_owned()
    }

    #[rstest]
    #[case("  hello world", true, "  Hello world")]
    #[case("Hello", false, "hello")]
    #[case("", true, "")]
    fn test_change_first(#[case] input: &str, #[case] upper: bool, #[case] expected: &str) {
        assert_eq!(change_first(input, upper), expected);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("hELLO  wORLD"), "Hello  World");
    }

    #[test]
    fn test_index_of_uses_char_positions() {
        let found = call(index_of, "héllo", vec![Value::from("l")]).unwrap();
        assert_eq!(found.number_value(), Some(Number::Integer(2)));
        let found = call(last_index_of, "héllo", vec![Value::from("l")]).unwrap();
        assert_eq!(found.number_value(), Some(Number::Integer(3)));
        let found = call(last_index_of, "héllo", vec![Value::from("l"), Value::from(2)]).unwrap();
        assert_eq!(found.number_value(), Some(Number::Integer(2)));
        let missing = call(index_of, "abc", vec![Value::from("x")]).unwrap();
        assert_eq!(missing.number_value(), Some(Number::Integer(-1)));
    }

    #[rstest]
    #[case(vec!["o", "0"], "f00 b0o")]
    #[case(vec!["o", "0", "f"], "f0o boo")]
    #[case(vec!["O", "0", "i"], "f00 b00")]
    #[case(vec!["o+", "_", "r"], "f_ b_")]
    #[case(vec!["(b)o", "<$1>", "r"], "foo <b>o")]
    #[case(vec!["O", "$", "i"], "f$$ b$$")]
    fn test_replace(#[case] args: Vec<&str>, #[case] expected: &str) {
        let args = args.into_iter().map(Value::from).collect();
        assert_eq!(text(call(replace, "foo boo", args)), expected);
    }

    #[test]
    fn test_split() {
        let parts = call(split, "a, b,c", vec![Value::from(r",\s*"), Value::from("r")]).unwrap();
        let seq = parts.as_sequence().unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.get(1).unwrap().string_value().unwrap(), "b");
    }

    #[test]
    fn test_matches_is_boolean_and_sequence() {
        let result = call(matches, "a1b22", vec![Value::from(r"\d+")]).unwrap();
        assert_eq!(result.boolean_value(), Some(false));
        assert_eq!(result.as_sequence().unwrap().len(), 2);
        let result = call(matches, "123", vec![Value::from(r"\d+")]).unwrap();
        assert_eq!(result.boolean_value(), Some(true));
    }

    #[test]
    fn test_pattern_cache_evicts_least_recently_used() {
        let flags = RegexFlags {
            regex: true,
            ..RegexFlags::default()
        };
        let hot = "cache-hot-[0-9]+";
        let cold = |n: usize| format!("cache-cold-{n}");
        compile("matches", hot, flags).unwrap();
        let rounds = PATTERN_CACHE_LIMIT * 2;
        for n in 0..rounds {
            compile("matches", &cold(n), flags).unwrap();
            compile("matches", hot, flags).unwrap();
        }

        let cache = PATTERN_CACHE.lock();
        assert!(cache.len() <= PATTERN_CACHE_LIMIT);
        assert!(cache.contains(&(hot.to_string(), flags)));
        assert!(!cache.contains(&(cold(0), flags)));
        for n in rounds - PATTERN_CACHE_LIMIT / 2..rounds {
            assert!(cache.contains(&(cold(n), flags)), "{}", cold(n));
        }
    }

    #[test]
    fn test_unknown_flag() {
        let error = call(replace, "x", vec![Value::from("a"), Value::from("b"), Value::from("q")])
            .unwrap_err();
        assert!(error.to_string().contains("Unrecognized flag"));
    }

    #[rstest]
    #[case(left_pad, vec![Value::from(5), Value::from("-")], "----a")]
    #[case(left_pad, vec![Value::from(10), Value::from(".oO")], ".oO.oO.oOa")]
    #[case(right_pad, vec![Value::from(4)], "a   ")]
    #[case(left_pad, vec![Value::from(0)], "a")]
    fn test_padding(#[case] f: StringMethod, #[case] args: Vec<Value>, #[case] expected: &str) {
        assert_eq!(text(call(f, "a", args)), expected);
    }

    #[test]
    fn test_url_escape() {
        assert_eq!(
            url_escape("a b/ő&c", UrlCharset::Utf8, false),
            "a%20b%2F%C5%91%26c"
        );
        assert_eq!(url_escape("a b/é", UrlCharset::Latin1, true), "a%20b/%E9");
        assert_eq!(UrlCharset::from_name("ISO-8859-1"), Some(UrlCharset::Latin1));
        assert_eq!(UrlCharset::from_name("koi8"), None);
    }
}
