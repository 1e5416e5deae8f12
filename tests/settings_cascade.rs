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

//! Settings inheritance across configuration, template and render

mod common;

use common::*;
use octofhir_template::ast::{Setting, SpecialVariable};
use octofhir_template::{Settings, Template};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

/// A three level chain where each level may set `number_format`
fn chain(root: Option<&str>, middle: Option<&str>, leaf: Option<&str>) -> Settings {
    let mut top = Settings::new();
    if let Some(format) = root {
        top.set_number_format(format.to_string());
    }
    let mut mid = Settings::with_parent(Arc::new(top));
    if let Some(format) = middle {
        mid.set_number_format(format.to_string());
    }
    let mut bottom = Settings::with_parent(Arc::new(mid));
    if let Some(format) = leaf {
        bottom.set_number_format(format.to_string());
    }
    bottom
}

#[rstest]
#[case(None, None, None, "number")]
#[case(Some("0.00"), None, None, "0.00")]
#[case(Some("0.00"), Some("0.0"), None, "0.0")]
#[case(Some("0.00"), Some("0.0"), Some("0"), "0")]
#[case(None, None, Some("#"), "#")]
fn test_nearest_level_wins(
    #[case] root: Option<&str>,
    #[case] middle: Option<&str>,
    #[case] leaf: Option<&str>,
    #[case] expected: &str,
) {
    let settings = chain(root, middle, leaf);
    assert_eq!(settings.number_format(), expected);
    assert_eq!(settings.is_number_format_set(), leaf.is_some());
}

#[test]
fn test_unset_reveals_parent_value() {
    let mut settings = chain(Some("0.00"), None, Some("0"));
    settings.unset_number_format();
    assert_eq!(settings.number_format(), "0.00");
    assert!(!settings.is_number_format_set());
}

#[test]
fn test_unknown_setting_name_is_rejected() {
    let mut settings = Settings::new();
    let error = settings.set_setting("no_such_setting", "x").unwrap_err();
    assert!(error.to_string().contains("no_such_setting"), "{error}");
}

#[test]
fn test_template_settings_override_configuration() {
    let configuration = configuration(&[("number_format", "0.00")]);
    let plain = configuration.create_template("plain.ftl", interp(lit(2)));
    assert_eq!(plain.render_to_string(None).unwrap(), "2.00");

    let mut overriding = Template::new("override.ftl", interp(lit(2)), &configuration);
    overriding.set_setting("number_format", "0.0").unwrap();
    assert_eq!(Arc::new(overriding).render_to_string(None).unwrap(), "2.0");
}

#[test]
fn test_setting_directive_affects_rest_of_render_only() {
    let configuration = configuration(&[("locale", "en_US")]);
    let root = block(vec![
        interp(Arc::new(SpecialVariable::new(SpecialVariable::LOCALE))),
        text(";"),
        Arc::new(Setting::new("locale", lit("de_DE"))),
        interp(Arc::new(SpecialVariable::new(SpecialVariable::LOCALE))),
    ]);
    let template = configuration.create_template("locale.ftl", root);
    assert_eq!(template.render_to_string(None).unwrap(), "en_US;de_DE");
    // the configuration is untouched by the render
    assert_eq!(configuration.settings().locale().to_string(), "en_US");
}

#[test]
fn test_boolean_format_setting() {
    let configuration = configuration(&[("boolean_format", "yes,no")]);
    let root = block(vec![
        interp(var("flag")),
        text(" "),
        interp(builtin(var("flag"), "string")),
        text(" "),
        interp(builtin_call(lit(false), "string", vec![lit("on"), lit("off")])),
    ]);
    let out = configuration
        .create_template("bool.ftl", root)
        .render_to_string(Some(data(vec![("flag", true.into())])))
        .unwrap();
    assert_eq!(out, "yes yes off");
}
