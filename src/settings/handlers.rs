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

//! Template exception handlers and attempt exception reporters

use crate::environment::Output;
use crate::error::TemplateException;
use log::{error, warn};
use std::fmt;

/// What a handler gets to see besides the exception
pub struct HandlerContext<'a, 'w> {
    /// The output of the render
    pub out: &'a mut Output<'w>,
    /// Whether the failing instruction is inside an attempt block
    pub in_attempt_block: bool,
    /// Name of the main template
    pub template_name: Option<&'a str>,
}

/// Decides what happens with a template exception
///
/// Returning `Ok` suppresses the exception and lets rendering continue with
/// the next instruction. Returning the exception (or another one) aborts the
/// current instruction; inside an attempt block that triggers the recover
/// block, elsewhere it ends the render.
pub trait TemplateExceptionHandler: Send + Sync + fmt::Debug {
    /// Handle an exception
    fn handle(
        &self,
        exception: &TemplateException,
        ctx: &mut HandlerContext<'_, '_>,
    ) -> Result<(), TemplateException>;
}

/// Rethrows every exception
#[derive(Debug, Clone, Copy, Default)]
pub struct RethrowHandler;

impl TemplateExceptionHandler for RethrowHandler {
    fn handle(
        &self,
        exception: &TemplateException,
        _ctx: &mut HandlerContext<'_, '_>,
    ) -> Result<(), TemplateException> {
        Err(exception.clone())
    }
}

/// Skips the failing instruction
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreHandler;

impl TemplateExceptionHandler for IgnoreHandler {
    fn handle(
        &self,
        exception: &TemplateException,
        ctx: &mut HandlerContext<'_, '_>,
    ) -> Result<(), TemplateException> {
        warn!(
            "Ignored template error in {}: {}",
            ctx.template_name.unwrap_or("unnamed template"),
            exception.message()
        );
        Ok(())
    }
}

/// Prints the error into the output, then rethrows
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugHandler;

impl TemplateExceptionHandler for DebugHandler {
    fn handle(
        &self,
        exception: &TemplateException,
        ctx: &mut HandlerContext<'_, '_>,
    ) -> Result<(), TemplateException> {
        if !ctx.in_attempt_block {
            let report = format!("Template processing error:\n\n{exception}\n");
            ctx.out.write_str(&report).map_err(TemplateException::new)?;
        }
        Err(exception.clone())
    }
}

/// Prints the error as a highlighted HTML block, then rethrows
///
/// The block closes common open tags first, so it shows up even when the
/// error happened inside a `<script>` or a `<table>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlDebugHandler;

const HTML_ERROR_PREFIX: &str = concat!(
    "<!-- TEMPLATE ERROR MESSAGE STARTS HERE --><!-- ]]> -->",
    "<script language=javascript>//\"></script><script language=javascript>//'></script>",
    "</title></xmp></script></noscript></style></object></head></pre></table>",
    "</form></table></table></table></a></u></i></b>",
    "<div align='left' style='background-color:#FFFF7C; display:block; border-top:double; ",
    "padding:4px; margin:0; font-family:Arial,sans-serif; color:#A80000; font-size:12px'>",
    "<b style='font-size:12px; font-weight:bold'>Template error</b>",
    "<pre style='display:block; margin:0; padding:0; font-family:monospace; white-space:pre-wrap'>\n",
);

impl TemplateExceptionHandler for HtmlDebugHandler {
    fn handle(
        &self,
        exception: &TemplateException,
        ctx: &mut HandlerContext<'_, '_>,
    ) -> Result<(), TemplateException> {
        if !ctx.in_attempt_block {
            let mut report = String::from(HTML_ERROR_PREFIX);
            report.push_str(&html_escape(&exception.to_string()));
            report.push_str("\n</pre></div></html>\n");
            ctx.out.write_str(&report).map_err(TemplateException::new)?;
        }
        Err(exception.clone())
    }
}

pub(crate) fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Reports exceptions that an attempt block has caught
pub trait AttemptExceptionReporter: Send + Sync + fmt::Debug {
    /// Report an exception
    fn report(&self, exception: &TemplateException, template_name: Option<&str>);
}

/// Logs caught exceptions at error level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorReporter;

impl AttemptExceptionReporter for LogErrorReporter {
    fn report(&self, exception: &TemplateException, template_name: Option<&str>) {
        error!(
            "Error executing template {} (suppressed by #attempt): {exception}",
            template_name.unwrap_or("unnamed template")
        );
    }
}

/// Logs caught exceptions at warning level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogWarnReporter;

impl AttemptExceptionReporter for LogWarnReporter {
    fn report(&self, exception: &TemplateException, template_name: Option<&str>) {
        warn!(
            "Error executing template {} (suppressed by #attempt): {exception}",
            template_name.unwrap_or("unnamed template")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use pretty_assertions::assert_eq;

    fn run(handler: &dyn TemplateExceptionHandler, in_attempt_block: bool) -> (String, bool) {
        let mut sink = Vec::new();
        let exception = TemplateException::new(TemplateError::evaluation("x < y failed"));
        let rethrown = {
            let mut out = Output::new(&mut sink);
            let mut ctx = HandlerContext {
                out: &mut out,
                in_attempt_block,
                template_name: Some("t.ftl"),
            };
            let result = handler.handle(&exception, &mut ctx);
            out.flush().unwrap();
            match result {
                Err(e) => {
                    assert!(e.same_instance(&exception));
                    true
                }
                Ok(()) => false,
            }
        };
        (String::from_utf8(sink).unwrap(), rethrown)
    }

    #[test]
    fn test_rethrow_and_ignore() {
        assert_eq!(run(&RethrowHandler, false), (String::new(), true));
        assert_eq!(run(&IgnoreHandler, false), (String::new(), false));
    }

    #[test]
    fn test_debug_writes_report_outside_attempt() {
        let (text, rethrown) = run(&DebugHandler, false);
        assert!(rethrown);
        assert!(text.starts_with("Template processing error:"));
        assert!(text.contains("x < y failed"));

        let (text, rethrown) = run(&DebugHandler, true);
        assert!(rethrown);
        assert_eq!(text, "");
    }

    #[test]
    fn test_html_debug_escapes() {
        let (text, _) = run(&HtmlDebugHandler, false);
        assert!(text.contains("x &lt; y failed"));
        assert!(text.ends_with("</pre></div></html>\n"));
    }
}
