// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a port config and of the live port created from it. Stays the same across config edits.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortGuid(Uuid);

impl PortGuid {
    /// Creates a new random GUID
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The wrapped UUID
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true for the nil UUID, which never identifies a port
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for PortGuid {
    fn default() -> Self {
        Self::new_v4()
    }
}

impl Display for PortGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for PortGuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
