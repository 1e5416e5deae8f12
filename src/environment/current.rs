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

//! Thread-local view of the render running on this thread
//!
//! Host callbacks that don't receive the environment (methods) can read the
//! template name, locale and time zone of the current render here.

use crate::format::{Locale, TimeZone};
use std::cell::RefCell;

/// What a host callback can learn about the current render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSnapshot {
    /// Name of the main template
    pub template_name: String,
    /// Locale in effect
    pub locale: Locale,
    /// Time zone in effect
    pub time_zone: TimeZone,
}

thread_local! {
    static CURRENT: RefCell<Option<RenderSnapshot>> = const { RefCell::new(None) };
}

/// The render running on this thread, if any
pub fn current_render() -> Option<RenderSnapshot> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Installs a snapshot and restores the previous one when dropped
pub(crate) struct RenderGuard {
    previous: Option<RenderSnapshot>,
}

impl RenderGuard {
    pub(crate) fn install(snapshot: RenderSnapshot) -> Self {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(snapshot));
        Self { previous }
    }
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Update the installed snapshot, if there is one
pub(crate) fn update(change: impl FnOnce(&mut RenderSnapshot)) {
    CURRENT.with(|current| {
        if let Some(snapshot) = current.borrow_mut().as_mut() {
            change(snapshot);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot(name: &str) -> RenderSnapshot {
        RenderSnapshot {
            template_name: name.to_string(),
            locale: Locale::us(),
            time_zone: TimeZone::utc(),
        }
    }

    #[test]
    fn test_guards_nest() {
        assert_eq!(current_render(), None);
        {
            let _outer = RenderGuard::install(snapshot("outer"));
            {
                let _inner = RenderGuard::install(snapshot("inner"));
                assert_eq!(current_render().unwrap().template_name, "inner");
            }
            assert_eq!(current_render().unwrap().template_name, "outer");
            update(|s| s.template_name = "changed".to_string());
            assert_eq!(current_render().unwrap().template_name, "changed");
        }
        assert_eq!(current_render(), None);
    }
}
