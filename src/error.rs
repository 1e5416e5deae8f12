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

//! Error types for template evaluation
//!
//! Three layers live here:
//!
//! * [`TemplateError`] is the plain error taxonomy returned by the pure
//!   helpers (coercion, comparison, formatting, settings).
//! * [`TemplateException`] wraps a [`TemplateError`] into a shared instance
//!   with identity, so the environment can tell if it has already passed a
//!   given failure to the exception handler.
//! * [`Interrupt`] is what the visiting path propagates: a template exception,
//!   a flow-control signal, or an unwrapped host error.

use crate::ast::SourceLocation;
use crate::model::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Result type for the pure runtime helpers
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Result type for anything that runs while an environment is visiting
pub type EvalResult<T> = Result<T, Interrupt>;

/// Errors raised while assigning a setting by name
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingError {
    /// The setting name is not recognized under either naming convention
    #[error("Unknown setting: \"{name}\".{}", suggestion_phrase(.suggestion))]
    Unknown {
        /// The name as it was given
        name: String,
        /// A best-effort corrected name
        suggestion: Option<String>,
    },

    /// The name is known but the value could not be parsed or applied
    #[error("Failed to set setting \"{name}\" to value \"{value}\": {cause}")]
    Assignment {
        /// Canonical (snake case) setting name
        name: String,
        /// The raw value as it was given
        value: String,
        /// Why the value was rejected
        cause: String,
    },
}

fn suggestion_phrase(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" You may meant: \"{s}\"."),
        None => String::new(),
    }
}

/// Errors that can occur while evaluating a template
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// A value was null or missing where a concrete value was required
    #[error("The following has evaluated to null or missing:\n==> {description}")]
    InvalidReference {
        /// What was missing (usually the canonical form of an expression)
        description: String,
    },

    /// Operand(s) had the wrong capability for the operation
    #[error("{message}")]
    TypeMismatch {
        /// Full diagnostic message
        message: String,
    },

    /// Ordering operator used on a type that only supports equality
    #[error("Can't use operator \"{operator}\" on {operand_type} values.")]
    UnsupportedOperator {
        /// Operator symbol as written
        operator: String,
        /// Operand type description
        operand_type: String,
    },

    /// A built-in helper was called with the wrong number of arguments
    #[error("?{builtin} expects {expected} argument(s), but has received {actual}.")]
    ArgumentCount {
        /// Invocation name of the built-in
        builtin: String,
        /// Human readable expectation, like "1" or "1 to 3"
        expected: String,
        /// Number of arguments received
        actual: usize,
    },

    /// A built-in helper was called with an argument of the wrong type
    #[error("?{builtin} expects argument #{position} to be {expected}, but it was {actual}.")]
    ArgumentType {
        /// Invocation name of the built-in
        builtin: String,
        /// 1-based argument position
        position: usize,
        /// Expected type description
        expected: String,
        /// Actual type description
        actual: String,
    },

    /// A `@name` format string references an unregistered factory
    #[error("No custom {kind} format was defined with name \"{name}\".")]
    UnknownCustomFormat {
        /// "number" or "date"
        kind: String,
        /// The name after the `@`
        name: String,
    },

    /// A format string is malformed, or a value can't be parsed with it
    #[error("{message} (format: \"{format}\")")]
    InvalidFormat {
        /// The format string involved
        format: String,
        /// What went wrong
        message: String,
    },

    /// A date whose sub-kind is unknown was compared or formatted
    #[error("{message}")]
    AmbiguousDateKind {
        /// Full diagnostic message, naming the coercing built-ins
        message: String,
    },

    /// Tree recursion found no applicable node processor
    #[error(
        "No macro or directive is defined for node named \"{node_name}\"{}, and there is no fallback handler called @{node_type} either.",
        namespace_phrase(.namespace)
    )]
    NoNodeHandler {
        /// Local name of the node
        node_name: String,
        /// Namespace URI of the node, if any
        namespace: Option<String>,
        /// Node type used for the fallback lookup
        node_type: String,
    },

    /// A container value was used where text was expected
    #[error(
        "Expected a string or something automatically convertible to string (number, date or boolean), but this has evaluated to {actual_type}:\n==> {description}{}",
        hint_phrase(.hint)
    )]
    NonString {
        /// What was evaluated
        description: String,
        /// Type description of the value
        actual_type: String,
        /// Caller supplied hint
        hint: Option<String>,
    },

    /// A format produced markup where plain text was required
    #[error(
        "The value was formatted to markup, but plain text was required here. Use ?string to format it as plain text:\n==> {description}"
    )]
    MarkupInPlainText {
        /// What was being formatted
        description: String,
    },

    /// Lookup of an unknown built-in name
    #[error("Unknown built-in: \"{name}\". {help}")]
    UnknownBuiltIn {
        /// The name as it was written
        name: String,
        /// Correction or the list of valid names
        help: String,
    },

    /// Macro or function invocation failure (arguments, missing frame)
    #[error("Macro or function \"{name}\": {message}")]
    MacroCall {
        /// Name of the macro
        name: String,
        /// What went wrong
        message: String,
    },

    /// The class resolver refused a class
    #[error("Instantiating {class_name} is not allowed in the template for security reasons: {reason}")]
    ClassNotAllowed {
        /// Requested class name
        class_name: String,
        /// Why it was refused
        reason: String,
    },

    /// The template loader has no template with this name
    #[error("Template not found for name \"{name}\".")]
    TemplateNotFound {
        /// Requested template name
        name: String,
    },

    /// Textual setting assignment failed at run time
    #[error(transparent)]
    Setting(#[from] SettingError),

    /// A host error wrapped into a template error
    #[error("Host callable failed: {message}")]
    Host {
        /// The host error rendered as text
        message: String,
    },

    /// Writing to the output sink failed
    #[error("Output error: {message}")]
    Output {
        /// The I/O error rendered as text
        message: String,
    },

    /// Any other evaluation failure
    #[error("{message}")]
    Evaluation {
        /// Full diagnostic message
        message: String,
    },
}

fn namespace_phrase(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!(" and namespace \"{ns}\""),
        _ => " and no namespace".to_string(),
    }
}

fn hint_phrase(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("\nTip: {h}"),
        None => String::new(),
    }
}

impl TemplateError {
    /// Shorthand for [`TemplateError::TypeMismatch`]
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        TemplateError::TypeMismatch {
            message: message.into(),
        }
    }

    /// Shorthand for [`TemplateError::Evaluation`]
    pub fn evaluation(message: impl Into<String>) -> Self {
        TemplateError::Evaluation {
            message: message.into(),
        }
    }

    /// Shorthand for [`TemplateError::InvalidReference`]
    pub fn invalid_reference(description: impl Into<String>) -> Self {
        TemplateError::InvalidReference {
            description: description.into(),
        }
    }
}

struct ExceptionInner {
    error: TemplateError,
    location: OnceLock<SourceLocation>,
    instruction_stack: OnceLock<String>,
}

/// A template error with identity
///
/// Cloning shares the same instance; [`TemplateException::same_instance`]
/// compares identity, not content.
#[derive(Clone)]
pub struct TemplateException {
    inner: Arc<ExceptionInner>,
}

impl TemplateException {
    /// Create a new exception instance
    pub fn new(error: TemplateError) -> Self {
        Self {
            inner: Arc::new(ExceptionInner {
                error,
                location: OnceLock::new(),
                instruction_stack: OnceLock::new(),
            }),
        }
    }

    /// Create a new exception blamed on a source location
    pub fn at(error: TemplateError, location: Option<&SourceLocation>) -> Self {
        let exception = Self::new(error);
        if let Some(location) = location {
            exception.blame(location);
        }
        exception
    }

    /// The underlying error
    pub fn error(&self) -> &TemplateError {
        &self.inner.error
    }

    /// The error message without location or stack
    pub fn message(&self) -> String {
        self.inner.error.to_string()
    }

    /// The location the error was blamed on, if known
    pub fn location(&self) -> Option<&SourceLocation> {
        self.inner.location.get()
    }

    /// Template instruction stack captured when the exception was first handled
    pub fn instruction_stack(&self) -> Option<&str> {
        self.inner.instruction_stack.get().map(String::as_str)
    }

    /// Identity comparison
    pub fn same_instance(&self, other: &TemplateException) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Set the blamed location unless one is already set
    pub(crate) fn blame(&self, location: &SourceLocation) {
        let _ = self.inner.location.set(location.clone());
    }

    /// Capture the instruction stack unless it was captured before
    pub(crate) fn capture_instruction_stack(&self, describe: impl FnOnce() -> String) {
        if self.inner.instruction_stack.get().is_none() {
            let _ = self.inner.instruction_stack.set(describe());
        }
    }
}

impl fmt::Display for TemplateException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.error)?;
        if let Some(location) = self.location() {
            write!(f, "\n\n----\nError {location}")?;
        }
        if let Some(stack) = self.instruction_stack() {
            write!(f, "\n----\nTemplate instruction stack:\n{stack}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TemplateException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateException")
            .field("error", &self.inner.error)
            .field("location", &self.location())
            .finish()
    }
}

impl std::error::Error for TemplateException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner.error)
    }
}

impl From<TemplateError> for TemplateException {
    fn from(error: TemplateError) -> Self {
        TemplateException::new(error)
    }
}

/// An error raised by user supplied host code
#[derive(Clone)]
pub struct HostError(Arc<dyn std::error::Error + Send + Sync>);

impl HostError {
    /// Wrap any host error
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HostError(Arc::new(error))
    }

    /// Create a host error from a message
    pub fn msg(message: impl Into<String>) -> Self {
        HostError(Arc::new(MessageError(message.into())))
    }

    /// The wrapped error
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync) {
        self.0.as_ref()
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostError").field(&self.0.to_string()).finish()
    }
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MessageError {}

/// Non-error control transfer
#[derive(Debug, Clone)]
pub enum FlowControl {
    /// `#return`, optionally with a function result
    Return(Option<Value>),
    /// `#break` out of the innermost iterator block
    Break,
    /// `#continue` with the next iteration
    Continue,
    /// `#stop`, ends the whole render
    Stop(Option<String>),
}

/// What the visiting path propagates
#[derive(Debug, Clone)]
pub enum Interrupt {
    /// A template exception, subject to the exception handler
    Exception(TemplateException),
    /// Flow control, never passed to the exception handler
    Flow(FlowControl),
    /// A host error that was not wrapped into a template exception
    Host(HostError),
}

impl From<TemplateError> for Interrupt {
    fn from(error: TemplateError) -> Self {
        Interrupt::Exception(TemplateException::new(error))
    }
}

impl From<TemplateException> for Interrupt {
    fn from(exception: TemplateException) -> Self {
        Interrupt::Exception(exception)
    }
}

impl From<SettingError> for Interrupt {
    fn from(error: SettingError) -> Self {
        TemplateError::Setting(error).into()
    }
}

impl From<FlowControl> for Interrupt {
    fn from(flow: FlowControl) -> Self {
        Interrupt::Flow(flow)
    }
}

/// Errors returned from [`crate::Environment::process`]
#[derive(Error, Debug, Clone)]
pub enum RenderError {
    /// A template exception that the handler rethrew
    #[error(transparent)]
    Template(TemplateException),

    /// A host error that was left to propagate natively
    #[error("Host error: {0}")]
    Host(HostError),

    /// Rendering ended through `#stop`
    #[error("Template processing stopped{}", stop_phrase(.0))]
    Stopped(Option<String>),
}

fn stop_phrase(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

impl RenderError {
    /// The template exception, when this is one
    pub fn as_template_exception(&self) -> Option<&TemplateException> {
        match self {
            RenderError::Template(te) => Some(te),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_identity() {
        let a = TemplateException::new(TemplateError::evaluation("boom"));
        let b = a.clone();
        let c = TemplateException::new(TemplateError::evaluation("boom"));

        assert!(a.same_instance(&b));
        assert!(!a.same_instance(&c));
        assert_eq!(a.error(), c.error());
    }

    #[test]
    fn test_instruction_stack_captured_once() {
        let te = TemplateException::new(TemplateError::evaluation("boom"));
        te.capture_instruction_stack(|| "first".to_string());
        te.capture_instruction_stack(|| "second".to_string());
        assert_eq!(te.instruction_stack(), Some("first"));
    }

    #[test]
    fn test_unknown_setting_message() {
        let error = SettingError::Unknown {
            name: "localee".to_string(),
            suggestion: Some("locale".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Unknown setting: \"localee\". You may meant: \"locale\"."
        );
    }

    #[test]
    fn test_no_node_handler_message() {
        let error = TemplateError::NoNodeHandler {
            node_name: "para".to_string(),
            namespace: None,
            node_type: "element".to_string(),
        };
        assert!(error.to_string().contains("node named \"para\" and no namespace"));
        assert!(error.to_string().contains("@element"));
    }
}
