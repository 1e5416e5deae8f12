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

//! Render output with nested capture buffers

use crate::error::{TemplateError, TemplateResult};
use std::fmt;
use std::io::Write;

/// Where rendered text goes
///
/// Writes land in the innermost capture buffer if there is one, otherwise
/// in the sink. Attempt blocks and captured assignments push a buffer and
/// decide what to do with its content when they pop it.
pub struct Output<'w> {
    sink: Box<dyn Write + 'w>,
    buffers: Vec<String>,
}

impl<'w> Output<'w> {
    /// Output writing to `sink`
    pub fn new(sink: impl Write + 'w) -> Self {
        Self {
            sink: Box::new(sink),
            buffers: Vec::new(),
        }
    }

    /// Write text
    pub fn write_str(&mut self, text: &str) -> TemplateResult<()> {
        match self.buffers.last_mut() {
            Some(buffer) => {
                buffer.push_str(text);
                Ok(())
            }
            None => self.sink.write_all(text.as_bytes()).map_err(io_error),
        }
    }

    /// Flush the sink
    pub fn flush(&mut self) -> TemplateResult<()> {
        self.sink.flush().map_err(io_error)
    }

    /// Start capturing
    pub(crate) fn push_buffer(&mut self) {
        self.buffers.push(String::new());
    }

    /// Stop capturing and return what was captured
    pub(crate) fn pop_buffer(&mut self) -> String {
        self.buffers.pop().unwrap_or_default()
    }

    /// Number of active capture buffers
    pub fn capture_depth(&self) -> usize {
        self.buffers.len()
    }
}

impl fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("capture_depth", &self.buffers.len())
            .finish()
    }
}

fn io_error(error: std::io::Error) -> TemplateError {
    TemplateError::Output {
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_buffers_capture_writes() {
        let mut sink = Vec::new();
        {
            let mut out = Output::new(&mut sink);
            out.write_str("a").unwrap();
            out.push_buffer();
            out.write_str("b").unwrap();
            out.push_buffer();
            out.write_str("c").unwrap();
            assert_eq!(out.pop_buffer(), "c");
            let outer = out.pop_buffer();
            out.write_str(&outer).unwrap();
            out.flush().unwrap();
        }
        assert_eq!(String::from_utf8(sink).unwrap(), "ab");
    }
}
