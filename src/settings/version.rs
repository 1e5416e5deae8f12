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

//! Incompatible-improvements versions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.micro` version
///
/// The configuration's incompatible-improvements version selects between
/// alternate built-in implementations, so templates written against an
/// older behavior keep rendering the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major part
    pub major: u32,
    /// Minor part
    pub minor: u32,
    /// Micro part
    pub micro: u32,
}

impl Version {
    /// Baseline behavior
    pub const V2_3_0: Version = Version::new(2, 3, 0);
    /// `?c` renders doubles in plain decimal notation from here on
    pub const V2_3_21: Version = Version::new(2, 3, 21);
    /// Newest behavior this crate implements
    pub const CURRENT: Version = Version::new(2, 3, 32);

    /// Create a version
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::V2_3_0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> Result<u32, String> {
            match parts.next() {
                Some(p) => p
                    .parse()
                    .map_err(|_| format!("Malformed version number: \"{s}\"")),
                None if required => Err(format!("Malformed version number: \"{s}\"")),
                None => Ok(0),
            }
        };
        let version = Version::new(next(true)?, next(false)?, next(false)?);
        if parts.next().is_some() {
            return Err(format!("Malformed version number: \"{s}\""));
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        assert!(Version::V2_3_0 < Version::V2_3_21);
        assert!(Version::V2_3_21 <= Version::CURRENT);
        assert_eq!("2.3.21".parse::<Version>().unwrap(), Version::V2_3_21);
        assert_eq!("2.4".parse::<Version>().unwrap(), Version::new(2, 4, 0));
        assert!("2.x".parse::<Version>().is_err());
        assert_eq!(Version::V2_3_21.to_string(), "2.3.21");
    }
}
