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

//! Element visiting, exception handling and attempt blocks

use super::Environment;
use crate::ast::Element;
use crate::error::{EvalResult, Interrupt, TemplateException};
use crate::settings::HandlerContext;
use log::error;
use std::fmt::Write as _;
use std::sync::Arc;

impl Environment<'_> {
    /// Visit an element and the children it asks for
    pub fn visit(&mut self, element: &Arc<dyn Element>) -> EvalResult<()> {
        self.visit_with(element, false)
    }

    /// Visit an element; with `hide_in_parent` it replaces the top of the
    /// instruction stack instead of going on top of it
    pub fn visit_with(&mut self, element: &Arc<dyn Element>, hide_in_parent: bool) -> EvalResult<()> {
        let hidden = if hide_in_parent {
            self.instruction_stack.pop()
        } else {
            None
        };
        self.instruction_stack.push(element.clone());
        let result = self.visit_frame(element);
        self.instruction_stack.pop();
        if let Some(hidden) = hidden {
            self.instruction_stack.push(hidden);
        }
        result
    }

    fn visit_frame(&mut self, element: &Arc<dyn Element>) -> EvalResult<()> {
        match element.accept(self) {
            Ok(Some(children)) => {
                for (child, hide_in_parent) in &children {
                    self.visit_with(child, *hide_in_parent)?;
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(Interrupt::Exception(exception)) => self.handle_exception(element, exception),
            Err(other) => Err(other),
        }
    }

    /// Give an exception to the exception handler, once per instance
    fn handle_exception(&mut self, element: &Arc<dyn Element>, exception: TemplateException) -> EvalResult<()> {
        if let Some(location) = element.location() {
            exception.blame(location);
        }
        if self
            .last_handled
            .as_ref()
            .is_some_and(|last| last.same_instance(&exception))
        {
            return Err(exception.into());
        }
        self.last_handled = Some(exception.clone());
        exception.capture_instruction_stack(|| self.describe_instruction_stack());

        let in_attempt_block = self.attempt_depth > 0;
        if *self.settings.log_template_exceptions() && !in_attempt_block {
            error!("Error executing template:\n{exception}");
        }

        let handler = self.settings.template_exception_handler().clone();
        let template_name = self.main_template.name().to_string();
        let mut ctx = HandlerContext {
            out: &mut self.out,
            in_attempt_block,
            template_name: Some(&template_name),
        };
        match handler.handle(&exception, &mut ctx) {
            Ok(()) => Ok(()),
            Err(rethrown) => {
                if in_attempt_block {
                    self.settings
                        .attempt_exception_reporter()
                        .report(&exception, Some(&template_name));
                }
                if !rethrown.same_instance(&exception) {
                    self.last_handled = Some(rethrown.clone());
                }
                Err(rethrown.into())
            }
        }
    }

    /// The instruction stack, innermost first
    pub fn describe_instruction_stack(&self) -> String {
        let mut described = String::new();
        for (depth, element) in self.instruction_stack.iter().rev().enumerate() {
            let label = if depth == 0 { "Failed at" } else { "Reached through" };
            let _ = write!(described, "\t- {label}: {}", element.description());
            if let Some(location) = element.location() {
                let _ = write!(described, "  [{location}]");
            }
            described.push('\n');
        }
        described
    }

    /// `#attempt` with its `#recover` block
    ///
    /// The attempted output is buffered. It reaches the output only if the
    /// body completes normally; after a failure only the recover output
    /// does, and `#break` or `#return` leaving the body drops it. While the
    /// recover block runs, `.error` is the caught exception.
    pub fn attempt(&mut self, body: &Arc<dyn Element>, recover: &Arc<dyn Element>) -> EvalResult<()> {
        self.out.push_buffer();
        self.attempt_depth += 1;
        let result = self.visit(body);
        self.attempt_depth -= 1;
        let buffered = self.out.pop_buffer();
        match result {
            Ok(()) => {
                self.out.write_str(&buffered)?;
                Ok(())
            }
            Err(Interrupt::Exception(exception)) => {
                self.recovered_errors.push(exception);
                let recovered = self.visit(recover);
                self.recovered_errors.pop();
                recovered
            }
            Err(Interrupt::Flow(flow)) => Err(flow.into()),
            Err(host) => Err(host),
        }
    }

    /// Render `body` into a string instead of the output
    pub fn capture_output(&mut self, body: &Arc<dyn Element>) -> EvalResult<String> {
        self.out.push_buffer();
        let result = self.visit(body);
        let captured = self.out.pop_buffer();
        result.map(|()| captured)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{
        Attempt, Block, Break, Element, Interpolation, List, Literal, SequenceLiteral,
        SpecialVariable, Text, Variable,
    };
    use crate::error::RenderError;
    use crate::settings::Configuration;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn render(root: Arc<dyn Element>, handler: &str) -> (Result<(), RenderError>, String) {
        let mut configuration = Configuration::default();
        configuration
            .set_setting("template_exception_handler", handler)
            .unwrap();
        let template = Arc::new(configuration).create_template("visit.ftl", root);
        let mut out = Vec::new();
        let result = template.process(None, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    fn missing() -> Arc<dyn Element> {
        Arc::new(Interpolation::new(Arc::new(Variable::new("missing"))))
    }

    #[test]
    fn test_rethrow_ends_render_with_partial_output() {
        let root = Block::new(vec![Arc::new(Text::new("a")), missing(), Arc::new(Text::new("b"))]);
        let (result, out) = render(Arc::new(root), "rethrow");
        let error = result.unwrap_err();
        assert!(error.to_string().contains("missing"));
        let exception = error.as_template_exception().unwrap();
        assert!(exception.instruction_stack().unwrap().contains("Failed at: ${missing}"));
        assert_eq!(out, "a");
    }

    #[test]
    fn test_ignore_skips_failing_instruction() {
        let root = Block::new(vec![Arc::new(Text::new("a")), missing(), Arc::new(Text::new("b"))]);
        let (result, out) = render(Arc::new(root), "ignore");
        assert!(result.is_ok());
        assert_eq!(out, "ab");
    }

    #[test]
    fn test_attempt_discards_failed_output() {
        let body = Block::new(vec![Arc::new(Text::new("partial")), missing()]);
        let recover = Block::new(vec![
            Arc::new(Text::new("recovered: ")),
            Arc::new(Interpolation::new(Arc::new(SpecialVariable::new(SpecialVariable::ERROR)))),
        ]);
        let root = Block::new(vec![
            Arc::new(Text::new("[")),
            Arc::new(Attempt::new(Arc::new(body), Arc::new(recover))),
            Arc::new(Text::new("]")),
        ]);
        let (result, out) = render(Arc::new(root), "rethrow");
        assert!(result.is_ok());
        assert!(out.starts_with("[recovered: "), "{out}");
        assert!(!out.contains("partial"));
        assert!(out.ends_with(']'));
    }

    #[test]
    fn test_break_out_of_attempt_drops_buffered_output() {
        let body = Block::new(vec![Arc::new(Text::new("attempted")), Arc::new(Break)]);
        let attempt = Attempt::new(Arc::new(body), Arc::new(Text::new("recovered")));
        let items = SequenceLiteral::new(vec![Arc::new(Literal::new(1i64)), Arc::new(Literal::new(2i64))]);
        let root = Block::new(vec![
            Arc::new(Text::new("<")),
            Arc::new(List::new(Arc::new(items), "n", Arc::new(attempt))),
            Arc::new(Text::new(">")),
        ]);
        let (result, out) = render(Arc::new(root), "rethrow");
        assert!(result.is_ok());
        assert_eq!(out, "<>");
    }

    #[test]
    fn test_debug_handler_inside_attempt_writes_nothing() {
        let body = Block::new(vec![Arc::new(Text::new("x")), missing()]);
        let root = Attempt::new(Arc::new(body), Arc::new(Text::new("fallback")));
        let (result, out) = render(Arc::new(root), "debug");
        assert!(result.is_ok());
        assert_eq!(out, "fallback");
    }

    #[test]
    fn test_error_outside_recover_fails() {
        let root = Interpolation::new(Arc::new(SpecialVariable::new(SpecialVariable::ERROR)));
        let (result, _) = render(Arc::new(root), "rethrow");
        assert!(result.is_err());
    }
}
