// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Input and output ports.
//!
//! A port maps a range of local universes, as the application numbers them, onto an equally sized range of extern universes
//! on the wire. It is registered with at most one protocol. A port whose config can't be registered stays present but inert.

pub mod input;
pub mod output;

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI32, Ordering},
};

use dmx_core::{communication_type::CommunicationType, universe::UniverseMapping};
use parking_lot::Mutex;

pub use self::{input::InputPort, output::OutputPort};
use crate::{
    config::parse_ipv4,
    context::PortContext,
    guid::PortGuid,
    protocol::DmxProtocol,
    raw_listener::{RawListenerId, RawListenerSet},
    spsc::SignalProducer,
};

/// Behaviour shared by input and output ports.
pub trait DmxPort: Send + Sync {
    /// Identity of the port, the same as the GUID of its config
    fn port_guid(&self) -> PortGuid;

    /// Name of the port
    fn port_name(&self) -> String;

    /// The protocol the port uses, None if no protocol is available
    fn protocol(&self) -> Option<Arc<dyn DmxProtocol>>;

    /// How the port talks to the network
    fn communication_type(&self) -> CommunicationType;

    /// IPv4 address of the network interface, as configured
    fn device_address(&self) -> String;

    /// The local to extern mapping, None if the configured range is invalid
    fn universe_mapping(&self) -> Option<UniverseMapping>;

    /// Returns true if the communication type can be used with `protocol` in the port's direction
    fn supports_communication_type(&self, protocol: &dyn DmxProtocol) -> bool;

    /// Returns true while the port is bound to its protocol
    fn is_registered(&self) -> bool;

    /// Binds the port to its protocol. Returns false and leaves the port unregistered if that is not possible.
    fn register(&self) -> bool;

    /// Releases the port from its protocol. Does nothing if the port is not registered.
    fn unregister(&self);

    /// Shared handle to the cached extern universe offset, updated whenever the config changes
    fn extern_universe_offset_handle(&self) -> Arc<AtomicI32>;

    /// Attaches a listener queue to the port
    fn add_raw_listener(&self, id: RawListenerId, producer: SignalProducer);

    /// Detaches a listener queue, None if it was not attached
    fn remove_raw_listener(&self, id: RawListenerId) -> Option<SignalProducer>;

    /// Describes why the port can't be registered, None if the config is valid.
    ///
    /// Parses the device address and searches the protocol's capabilities. Not meant to be called per frame.
    fn config_problem(&self) -> Option<String> {
        common_config_problem(self)
    }

    /// Returns true if the port's config allows registration. See [DmxPort::config_problem].
    fn is_valid_port_slow(&self) -> bool {
        self.config_problem().is_none()
    }

    /// Returns true if the local universe belongs to the port
    fn is_local_universe_in_port_range(&self, universe: i32) -> bool {
        self.universe_mapping().is_some_and(|mapping| mapping.is_local_universe_in_range(universe))
    }

    /// Returns true if the extern universe belongs to the port
    fn is_extern_universe_in_port_range(&self, universe: i32) -> bool {
        self.universe_mapping().is_some_and(|mapping| mapping.is_extern_universe_in_range(universe))
    }

    /// Converts a local universe to the extern universe with the cached offset
    fn convert_local_to_extern_universe_id(&self, local_universe: i32) -> i32 {
        local_universe.wrapping_add(self.extern_universe_offset_handle().load(Ordering::Acquire))
    }

    /// Converts an extern universe to the local universe with the cached offset
    fn convert_extern_to_local_universe_id(&self, extern_universe: i32) -> i32 {
        extern_universe.wrapping_sub(self.extern_universe_offset_handle().load(Ordering::Acquire))
    }
}

/// Checks shared by input and output ports: device address, protocol, communication type and universe range.
pub(crate) fn common_config_problem<P: DmxPort + ?Sized>(port: &P) -> Option<String> {
    if let Err(e) = parse_ipv4(&port.device_address()) {
        return Some(e.to_string());
    }

    let Some(protocol) = port.protocol() else {
        return Some("no protocol available".to_owned());
    };

    if !port.supports_communication_type(protocol.as_ref()) {
        return Some(format!("{} does not support {}", protocol.name(), port.communication_type()));
    }

    let Some(mapping) = port.universe_mapping() else {
        return Some("invalid universe range".to_owned());
    };

    let bounds = protocol.universe_bounds();
    if !mapping.fits_within(&bounds) {
        return Some(format!("universes {mapping} exceed the {} universe range {bounds}", protocol.name()));
    }

    None
}

/// Either kind of port
#[derive(Debug, Clone)]
pub enum PortRef {
    /// An input port
    Input(Arc<InputPort>),
    /// An output port
    Output(Arc<OutputPort>),
}

impl PortRef {
    /// The port behind the reference
    pub fn as_port(&self) -> &dyn DmxPort {
        match self {
            Self::Input(port) => port.as_ref(),
            Self::Output(port) => port.as_ref(),
        }
    }

    /// The input port, None for output ports
    pub fn as_input(&self) -> Option<&Arc<InputPort>> {
        match self {
            Self::Input(port) => Some(port),
            Self::Output(_) => None,
        }
    }

    /// The output port, None for input ports
    pub fn as_output(&self) -> Option<&Arc<OutputPort>> {
        match self {
            Self::Input(_) => None,
            Self::Output(port) => Some(port),
        }
    }

    /// Identity of the port
    pub fn port_guid(&self) -> PortGuid {
        self.as_port().port_guid()
    }

    /// Returns true if both refer to the same port instance
    pub fn ptr_eq(&self, other: &PortRef) -> bool {
        match (self, other) {
            (Self::Input(a), Self::Input(b)) => Arc::ptr_eq(a, b),
            (Self::Output(a), Self::Output(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// State every port carries besides its config.
#[derive(Debug)]
pub(crate) struct PortCore {
    pub(crate) port_guid: PortGuid,
    pub(crate) context: Arc<PortContext>,
    pub(crate) registered: AtomicBool,
    /// Serializes registration changes of the port
    pub(crate) registration: Mutex<()>,
    pub(crate) extern_universe_offset: Arc<AtomicI32>,
    pub(crate) raw_listeners: RawListenerSet,
}

impl PortCore {
    pub(crate) fn new(port_guid: PortGuid, context: Arc<PortContext>, mapping: Option<UniverseMapping>) -> Self {
        Self {
            port_guid,
            context,
            registered: AtomicBool::new(false),
            registration: Mutex::new(()),
            extern_universe_offset: Arc::new(AtomicI32::new(mapping.map_or(0, |mapping| mapping.extern_universe_offset()))),
            raw_listeners: RawListenerSet::default(),
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    pub(crate) fn update_offset(&self, mapping: Option<UniverseMapping>) {
        self.extern_universe_offset.store(mapping.map_or(0, |mapping| mapping.extern_universe_offset()), Ordering::Release);
    }
}

/// Resolves a configured protocol name against the context's registry
pub(crate) fn resolve_protocol(context: &PortContext, protocol_name: &str) -> Option<Arc<dyn DmxProtocol>> {
    context.registry().find_or_first(protocol_name)
}
