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

//! Listing, assignments, macros across namespaces and `#stop`

mod common;

use common::*;
use indexmap::IndexMap;
use octofhir_template::ast::{
    Assignment, AssignmentScope, AssignmentSource, Break, CallSiteArgs, Children, Dot, Element,
    Import, List, MacroCall, MacroDef, MacroDefinition, MacroParam, Nested, Stop,
};
use octofhir_template::{
    Configuration, Environment, EvalResult, MapTemplateLoader, RenderError, Value,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// `<#if n_index == limit><#break></#if>`
#[derive(Debug)]
struct BreakAt {
    limit: i64,
}

impl Element for BreakAt {
    fn accept(&self, env: &mut Environment<'_>) -> EvalResult<Option<Children>> {
        let index = env
            .get_variable("n_index")?
            .and_then(|value| value.number_value())
            .and_then(|number| number.to_i64_exact());
        if index == Some(self.limit) {
            return Break.accept(env);
        }
        Ok(None)
    }

    fn description(&self) -> String {
        format!("#if n_index == {} #break", self.limit)
    }
}

#[test]
fn test_list_with_index_and_break() {
    let body = block(vec![
        interp(var("n_index")),
        text("="),
        interp(var("n")),
        text(";"),
        Arc::new(BreakAt { limit: 1 }),
    ]);
    let root: Arc<dyn Element> = Arc::new(List::new(numbers(&[7, 8, 9]), "n", body));
    assert_eq!(render(root, None).unwrap(), "0=7;1=8;");
}

#[test]
fn test_list_else_and_hash_pairs() {
    let empty_list: Arc<dyn Element> = Arc::new(
        List::new(numbers(&[]), "n", interp(var("n"))).with_else(text("nothing")),
    );
    assert_eq!(render(empty_list, None).unwrap(), "nothing");

    let pairs = Value::hash(IndexMap::from([
        ("a".to_string(), Value::from(1)),
        ("b".to_string(), Value::from(2)),
    ]));
    let body = block(vec![interp(var("k")), text(":"), interp(var("v")), text(" ")]);
    let root: Arc<dyn Element> = Arc::new(List::new(var("pairs"), "k", body).with_value_var("v"));
    assert_eq!(
        render(root, Some(data(vec![("pairs", pairs)]))).unwrap(),
        "a:1 b:2 "
    );
}

#[test]
fn test_loop_variables_vanish_after_the_loop() {
    let root = block(vec![
        Arc::new(List::new(numbers(&[1]), "n", text("x"))),
        interp(var("n")),
    ]);
    let error = render(root, None).unwrap_err();
    assert!(error.to_string().contains("==> n"), "{error}");
}

#[test]
fn test_capture_assignment() {
    let root = block(vec![
        Arc::new(Assignment::new(
            AssignmentScope::Namespace,
            "greeting",
            AssignmentSource::Capture(block(vec![text("Hello, "), interp(var("who"))])),
        )),
        interp(builtin(var("greeting"), "upper_case")),
    ]);
    let out = render(root, Some(data(vec![("who", "World".into())]))).unwrap();
    assert_eq!(out, "HELLO, WORLD");
}

#[test]
fn test_stop_keeps_output_so_far() {
    let root = block(vec![
        text("before"),
        Arc::new(Stop::new(Some(lit("halt")))),
        text("after"),
    ]);
    let mut out = Vec::new();
    let result = template(root).process(None, &mut out);
    assert!(matches!(result, Err(RenderError::Stopped(Some(ref message))) if message == "halt"));
    assert_eq!(String::from_utf8(out).unwrap(), "before");
}

/// `<#macro frame title><h>${title}</h><#nested 1/></#macro>`
fn layout_library() -> Arc<dyn Element> {
    let body = block(vec![
        text("<h>"),
        interp(var("title")),
        text("</h>"),
        Arc::new(Nested::new(vec![lit(1)])),
    ]);
    Arc::new(MacroDef::new(MacroDefinition::new(
        "frame",
        vec![MacroParam::with_default("title", lit("untitled"))],
        body,
    )))
}

#[test]
fn test_macro_from_imported_namespace() {
    let loader = MapTemplateLoader::new();
    loader.put("layout.ftl", layout_library());
    let mut configuration = Configuration::default();
    configuration.set_template_loader(Arc::new(loader));
    let configuration = Arc::new(configuration);

    let call = MacroCall::new(
        Arc::new(Dot::new(var("layout"), "frame")),
        CallSiteArgs::Named(vec![("title".to_string(), lit("Report"))]),
    )
    .with_nested(
        block(vec![text("["), interp(var("page")), text(":"), interp(var("who")), text("]")]),
        vec!["page".to_string()],
    );
    let root = block(vec![
        Arc::new(Import::new(lit("layout.ftl"), "layout")),
        Arc::new(Assignment::new(
            AssignmentScope::Namespace,
            "who",
            AssignmentSource::Expression(lit("main")),
        )),
        Arc::new(call),
    ]);
    let out = configuration
        .create_template("page.ftl", root)
        .render_to_string(None)
        .unwrap();
    assert_eq!(out, "<h>Report</h>[1:main]");
}

#[test]
fn test_macro_default_parameter() {
    let root = block(vec![
        layout_library(),
        Arc::new(MacroCall::new(var("frame"), CallSiteArgs::Named(vec![]))),
    ]);
    assert_eq!(render(root, None).unwrap(), "<h>untitled</h>");
}
