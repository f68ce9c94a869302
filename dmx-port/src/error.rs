#![warn(missing_docs)]
//! The errors used within the dmx-port crate.

// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use dmx_core::{packet_error::PacketError, priority::PriorityError, signal::SignalError, universe::UniverseError};

use crate::guid::PortGuid;

/// Error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO errors
    #[error("std error: {0:?}")]
    Io(#[from] std::io::Error),

    /// All parse/pack errors of the wire packets live within the same family of errors as described in [PacketError].
    #[error("packet error: {0:?}")]
    Packet(#[from] PacketError),

    /// Error with a universe mapping
    #[error("universe error: {0:?}")]
    Universe(#[from] UniverseError),

    /// Error reading or writing signal data, e.g. a channel outside 1..=512
    #[error("signal error: {0:?}")]
    Signal(#[from] SignalError),

    /// Attempted to use a priority value that is invalid, e.g. sending with a priority > 200.
    #[error("priority error: {0:?}")]
    Priority(#[from] PriorityError),

    /// The protocol settings could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The protocol settings could not be serialized.
    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// The device or destination address is not an IPv4 address.
    ///
    /// # Arguments
    /// 0: The address as configured
    #[error("invalid ip address: {0:?}")]
    InvalidIpAddress(String),

    /// A local universe outside of the port's range was addressed.
    ///
    /// # Arguments
    /// universe: The local universe
    ///
    /// port: Name of the port
    #[error("local universe {universe} is not in range of port {port}")]
    UniverseNotInPortRange {
        /// The local universe
        universe: i32,
        /// Name of the port
        port: String,
    },

    /// No port with the given GUID exists.
    #[error("no port with guid {0}")]
    PortNotFound(PortGuid),
}

/// Result alias used throughout the crate.
pub type DmxResult<T> = Result<T, Error>;
