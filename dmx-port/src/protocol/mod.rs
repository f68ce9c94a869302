// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Protocols bind ports to the network.
//!
//! A [DmxProtocol] answers capability queries (communication types, universe bounds, loopback) and hands out pooled
//! [DmxSender]s and [DmxReceiver]s: ports that resolve to the same network endpoint share one socket and one worker thread.
//! The byte layout of a protocol is described by its [WireFormat], the sender and receiver workers are protocol agnostic.

pub mod artnet;
mod pool;
pub mod receiver;
pub mod sacn;
pub mod sender;
mod socket;
#[cfg(test)]
pub(crate) mod test_protocol;

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use dmx_core::{communication_type::CommunicationType, packet_error::PacketError, priority::Priority, universe::UniverseBounds};

pub use self::{artnet::ArtNetProtocol, receiver::DmxReceiver, sacn::SacnProtocol, sender::DmxSender};
use crate::port::{input::InputPort, output::OutputPort};

/// A DMX over network protocol such as sACN or Art-Net.
pub trait DmxProtocol: Send + Sync {
    /// Name the protocol is configured by
    fn name(&self) -> &str;

    /// Communication types input ports of this protocol can use, the first one is the default
    fn input_communication_types(&self) -> &[CommunicationType];

    /// Communication types output ports of this protocol can use, the first one is the default
    fn output_communication_types(&self) -> &[CommunicationType];

    /// Range of universe IDs the protocol can address
    fn universe_bounds(&self) -> UniverseBounds;

    /// Lowest universe ID the protocol can address
    fn min_universe_id(&self) -> i32 {
        self.universe_bounds().min()
    }

    /// Highest universe ID the protocol can address
    fn max_universe_id(&self) -> i32 {
        self.universe_bounds().max()
    }

    /// Returns true if output sent with this communication type is received again by the same host
    fn is_causing_loopback(&self, communication_type: CommunicationType) -> bool;

    /// Binds an input port to a receiver, reusing one that listens on the same endpoint.
    ///
    /// Returns false if no receiver could be created, the port stays unregistered.
    fn register_input_port(&self, port: &Arc<InputPort>) -> bool;

    /// Releases the port's receiver. When this returns the receiver no longer calls into the port.
    fn unregister_input_port(&self, port: &InputPort);

    /// Binds an output port to a sender, reusing one that sends to the same endpoint.
    ///
    /// Returns None if no sender could be created, the port stays unregistered.
    fn register_output_port(&self, port: &Arc<OutputPort>) -> Option<Arc<DmxSender>>;

    /// Releases the port's sender. A sender without ports is stopped before this returns.
    fn unregister_output_port(&self, port: &OutputPort);
}

/// The protocols available to ports, in order of preference.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    protocols: Vec<Arc<dyn DmxProtocol>>,
}

impl ProtocolRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with Art-Net and sACN on their standard ports
    pub fn with_default_protocols() -> Self {
        Self::new().with_protocol(Arc::new(ArtNetProtocol::new())).with_protocol(Arc::new(SacnProtocol::new()))
    }

    /// Adds a protocol. A protocol with the same name replaces the existing one in place.
    pub fn with_protocol(mut self, protocol: Arc<dyn DmxProtocol>) -> Self {
        match self.protocols.iter_mut().find(|existing| existing.name().eq_ignore_ascii_case(protocol.name())) {
            Some(existing) => *existing = protocol,
            None => self.protocols.push(protocol),
        }
        self
    }

    /// Finds a protocol by name, ignoring ASCII case
    pub fn find(&self, name: &str) -> Option<Arc<dyn DmxProtocol>> {
        self.protocols.iter().find(|protocol| protocol.name().eq_ignore_ascii_case(name.trim())).cloned()
    }

    /// Finds a protocol by name, falling back to the first registered protocol with a warning
    pub fn find_or_first(&self, name: &str) -> Option<Arc<dyn DmxProtocol>> {
        self.find(name).or_else(|| {
            let first = self.first()?;
            tracing::warn!(protocol = %name, fallback = first.name(), "Unknown protocol, falling back to the first available protocol");
            Some(first)
        })
    }

    /// The first registered protocol
    pub fn first(&self) -> Option<Arc<dyn DmxProtocol>> {
        self.protocols.first().cloned()
    }

    /// Iterates all registered protocols
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DmxProtocol>> {
        self.protocols.iter()
    }

    /// Names of all registered protocols
    pub fn names(&self) -> Vec<String> {
        self.protocols.iter().map(|protocol| protocol.name().to_owned()).collect()
    }
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.protocols.iter().map(|protocol| protocol.name())).finish()
    }
}

/// One universe of DMX to put on the wire
#[derive(Debug, Clone, Copy)]
pub struct OutgoingDmx<'a> {
    /// Extern universe
    pub universe: i32,
    /// Wire sequence number
    pub sequence: u8,
    /// Priority, ignored by protocols without priorities
    pub priority: Priority,
    /// Last packet of the stream
    pub stream_terminated: bool,
    /// The 512 channel values
    pub values: &'a [u8],
}

/// One universe of DMX taken off the wire
#[derive(Debug, Clone, Copy)]
pub struct IncomingDmx<'a> {
    /// Extern universe
    pub universe: i32,
    /// Wire sequence number
    pub sequence: u8,
    /// Priority, [Priority::DEFAULT] for protocols without priorities
    pub priority: Priority,
    /// The source stops sending to the universe
    pub stream_terminated: bool,
    /// The data is meant for visualisation only
    pub preview_data: bool,
    /// Channel values, at most 512
    pub values: &'a [u8],
}

/// Byte level behaviour of a protocol, used by the protocol agnostic sender and receiver workers.
pub trait WireFormat: Send + Sync + 'static {
    /// Protocol name for logs
    fn protocol_name(&self) -> &'static str;

    /// UDP port used for sending and receiving
    fn udp_port(&self) -> u16;

    /// Buffer size that fits any packet of the protocol
    fn max_packet_size(&self) -> usize;

    /// Idle time after which the latest data of a universe is sent again
    fn keep_alive_interval(&self) -> Duration;

    /// Silence after which a source is considered lost and its next sequence number is accepted unconditionally
    fn data_loss_timeout(&self) -> Duration {
        self.keep_alive_interval().mul_f32(2.5)
    }

    /// Number of stream terminated packets sent per universe when a sender stops
    fn termination_packet_count(&self) -> usize {
        0
    }

    /// The sequence number following `previous`
    fn next_sequence(&self, previous: u8) -> u8;

    /// Returns true if a packet with sequence `received` has to be dropped after `last` was accepted
    fn is_out_of_sequence(&self, _last: u8, _received: u8) -> bool {
        false
    }

    /// Multicast group a universe is sent to, None if the protocol has no multicast
    fn multicast_group(&self, _universe: i32) -> Option<Ipv4Addr> {
        None
    }

    /// Packs one universe into `buf`, returns the number of bytes written
    fn pack(&self, dmx: &OutgoingDmx<'_>, buf: &mut [u8]) -> Result<usize, PacketError>;

    /// Parses a datagram. Errors for packets that carry no DMX data are expected and only traced.
    fn parse<'a>(&self, buf: &'a [u8]) -> Result<IncomingDmx<'a>, PacketError>;
}
