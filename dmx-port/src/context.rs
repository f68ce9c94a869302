// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! State shared by every port of one [PortManager](crate::port_manager::PortManager).

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{config::ProtocolSettings, protocol::ProtocolRegistry};

/// Process wide switches ports evaluate on every registration and send.
#[derive(Debug)]
pub struct RuntimeFlags {
    send_dmx_enabled: AtomicBool,
    receive_dmx_enabled: AtomicBool,
}

impl RuntimeFlags {
    /// Creates the flags
    pub fn new(send_dmx_enabled: bool, receive_dmx_enabled: bool) -> Self {
        Self {
            send_dmx_enabled: AtomicBool::new(send_dmx_enabled),
            receive_dmx_enabled: AtomicBool::new(receive_dmx_enabled),
        }
    }

    /// Output ports hand signals to their sender
    pub fn is_send_dmx_enabled(&self) -> bool {
        self.send_dmx_enabled.load(Ordering::Acquire)
    }

    /// Input ports are bound to a receiver
    pub fn is_receive_dmx_enabled(&self) -> bool {
        self.receive_dmx_enabled.load(Ordering::Acquire)
    }

    /// Returns the previous value
    pub(crate) fn set_send_dmx_enabled(&self, enabled: bool) -> bool {
        self.send_dmx_enabled.swap(enabled, Ordering::AcqRel)
    }

    /// Returns the previous value
    pub(crate) fn set_receive_dmx_enabled(&self, enabled: bool) -> bool {
        self.receive_dmx_enabled.swap(enabled, Ordering::AcqRel)
    }
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// The protocols and runtime flags ports are created with.
///
/// One context exists per manager and is handed to every port it creates, there is no global instance.
#[derive(Debug)]
pub struct PortContext {
    registry: ProtocolRegistry,
    flags: RuntimeFlags,
}

impl PortContext {
    /// Creates a context
    pub fn new(registry: ProtocolRegistry, flags: RuntimeFlags) -> Arc<Self> {
        Arc::new(Self { registry, flags })
    }

    /// Creates a context with the runtime flags of `settings`
    pub fn from_settings(registry: ProtocolRegistry, settings: &ProtocolSettings) -> Arc<Self> {
        Self::new(registry, RuntimeFlags::new(settings.send_dmx_enabled, settings.receive_dmx_enabled))
    }

    /// The protocols ports can use
    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// The runtime flags
    pub fn flags(&self) -> &RuntimeFlags {
        &self.flags
    }

    /// Shorthand for [RuntimeFlags::is_send_dmx_enabled]
    pub fn is_send_dmx_enabled(&self) -> bool {
        self.flags.is_send_dmx_enabled()
    }

    /// Shorthand for [RuntimeFlags::is_receive_dmx_enabled]
    pub fn is_receive_dmx_enabled(&self) -> bool {
        self.flags.is_receive_dmx_enabled()
    }
}
