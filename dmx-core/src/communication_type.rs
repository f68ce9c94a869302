// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt::Display;

use serde::{Deserialize, Serialize};

/// How a port exchanges DMX with the network.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommunicationType {
    /// Sent to the subnet broadcast address, received on any address
    Broadcast,
    /// Sent to a single destination, received on the NIC address
    #[default]
    Unicast,
    /// Sent to and received from the per-universe multicast group
    Multicast,
    /// Never touches the network, output is only looped back to the application
    InternalOnly,
}

impl CommunicationType {
    /// Returns true if traffic of this type needs a socket
    pub const fn uses_network(&self) -> bool {
        !matches!(self, Self::InternalOnly)
    }
}

impl Display for CommunicationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Broadcast => "Broadcast",
            Self::Unicast => "Unicast",
            Self::Multicast => "Multicast",
            Self::InternalOnly => "Internal Only",
        };
        f.write_str(name)
    }
}
