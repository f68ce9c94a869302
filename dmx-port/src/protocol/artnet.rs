// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Art-Net 4, ArtDmx only.
//!
//! Extern universes are 15 bit port addresses. Art-Net has no priorities, received signals carry [Priority::DEFAULT].

use std::{sync::Arc, time::Duration};

use dmx_core::{
    artnet_packet::ArtDmxPacket, communication_type::CommunicationType, definitions::*, packet_error::PacketError,
    priority::Priority, universe::UniverseBounds,
};

use super::{DmxProtocol, IncomingDmx, OutgoingDmx, WireFormat, pool::EndpointPool, receiver::DmxReceiver, sender::DmxSender};
use crate::port::{DmxPort, input::InputPort, output::OutputPort};

/// Name Art-Net ports are configured by
pub const ARTNET_PROTOCOL_NAME: &str = "Art-Net";

const INPUT_COMMUNICATION_TYPES: [CommunicationType; 2] = [CommunicationType::Broadcast, CommunicationType::Unicast];

const OUTPUT_COMMUNICATION_TYPES: [CommunicationType; 3] =
    [CommunicationType::Broadcast, CommunicationType::Unicast, CommunicationType::InternalOnly];

/// ArtDmx packets on the wire.
#[derive(Debug, Clone, Copy)]
pub struct ArtNetWire {
    port: u16,
}

impl ArtNetWire {
    /// Creates a wire format sending to and receiving on `port`
    pub const fn new(port: u16) -> Self {
        Self { port }
    }
}

impl WireFormat for ArtNetWire {
    fn protocol_name(&self) -> &'static str {
        ARTNET_PROTOCOL_NAME
    }

    fn udp_port(&self) -> u16 {
        self.port
    }

    fn max_packet_size(&self) -> usize {
        ARTNET_MAX_DMX_PACKET_SIZE
    }

    fn keep_alive_interval(&self) -> Duration {
        ARTNET_KEEP_ALIVE_INTERVAL
    }

    fn next_sequence(&self, previous: u8) -> u8 {
        // 0 disables sequencing at the receiver
        match previous {
            u8::MAX => 1,
            previous => previous + 1,
        }
    }

    fn pack(&self, dmx: &OutgoingDmx<'_>, buf: &mut [u8]) -> Result<usize, PacketError> {
        let port_address = u16::try_from(dmx.universe).map_err(|_| PacketError::InvalidUniverse(dmx.universe))?;

        ArtDmxPacket {
            sequence: dmx.sequence,
            physical: 0,
            port_address,
            values: dmx.values,
        }
        .pack(buf)
    }

    fn parse<'a>(&self, buf: &'a [u8]) -> Result<IncomingDmx<'a>, PacketError> {
        let packet = ArtDmxPacket::parse(buf)?;

        Ok(IncomingDmx {
            universe: i32::from(packet.port_address),
            sequence: packet.sequence,
            priority: Priority::DEFAULT,
            stream_terminated: false,
            preview_data: false,
            values: packet.values,
        })
    }
}

/// The Art-Net protocol, owning the pooled senders and receivers of all Art-Net ports.
pub struct ArtNetProtocol {
    pool: EndpointPool,
}

impl ArtNetProtocol {
    /// Creates the protocol on the standard Art-Net port 6454
    pub fn new() -> Self {
        Self::with_port(ARTNET_PORT)
    }

    /// Creates the protocol on a custom UDP port
    pub fn with_port(port: u16) -> Self {
        Self {
            pool: EndpointPool::new(Arc::new(ArtNetWire::new(port))),
        }
    }

    /// UDP port packets are sent to and received on
    pub fn udp_port(&self) -> u16 {
        self.pool.wire().udp_port()
    }

    /// Number of live senders
    pub fn num_senders(&self) -> usize {
        self.pool.num_senders()
    }

    /// Number of live receivers
    pub fn num_receivers(&self) -> usize {
        self.pool.num_receivers()
    }

    /// The live receivers
    pub fn receivers(&self) -> Vec<Arc<DmxReceiver>> {
        self.pool.receivers()
    }
}

impl Default for ArtNetProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ArtNetProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtNetProtocol")
            .field("udp_port", &self.udp_port())
            .field("senders", &self.num_senders())
            .field("receivers", &self.num_receivers())
            .finish()
    }
}

impl DmxProtocol for ArtNetProtocol {
    fn name(&self) -> &str {
        ARTNET_PROTOCOL_NAME
    }

    fn input_communication_types(&self) -> &[CommunicationType] {
        &INPUT_COMMUNICATION_TYPES
    }

    fn output_communication_types(&self) -> &[CommunicationType] {
        &OUTPUT_COMMUNICATION_TYPES
    }

    fn universe_bounds(&self) -> UniverseBounds {
        UniverseBounds::ARTNET
    }

    fn is_causing_loopback(&self, communication_type: CommunicationType) -> bool {
        matches!(communication_type, CommunicationType::Broadcast | CommunicationType::InternalOnly)
    }

    fn register_input_port(&self, port: &Arc<InputPort>) -> bool {
        self.pool.register_input_port(port)
    }

    fn unregister_input_port(&self, port: &InputPort) {
        self.pool.unregister_input_port(port.port_guid());
    }

    fn register_output_port(&self, port: &Arc<OutputPort>) -> Option<Arc<DmxSender>> {
        self.pool.register_output_port(port)
    }

    fn unregister_output_port(&self, port: &OutputPort) {
        self.pool.unregister_output_port(port.port_guid());
    }
}

#[cfg(test)]
mod test_artnet_wire {
    use super::*;

    #[test]
    fn test_sequence_skips_zero() {
        let wire = ArtNetWire::new(ARTNET_PORT);
        assert_eq!(wire.next_sequence(u8::MAX), 1);
        assert_eq!(wire.next_sequence(0), 1);
        assert_eq!(wire.next_sequence(41), 42);
    }

    #[test]
    fn test_received_dmx_has_default_priority() {
        let wire = ArtNetWire::new(ARTNET_PORT);
        let mut buf = [0u8; ARTNET_MAX_DMX_PACKET_SIZE];
        let len = wire
            .pack(
                &OutgoingDmx {
                    universe: 0x0123,
                    sequence: 5,
                    priority: Priority::MAX,
                    stream_terminated: false,
                    values: &[1, 2, 3, 4],
                },
                &mut buf,
            )
            .unwrap();

        let dmx = wire.parse(&buf[..len]).unwrap();
        assert_eq!(dmx.universe, 0x0123);
        assert_eq!(dmx.sequence, 5);
        assert_eq!(dmx.priority, Priority::DEFAULT);
        assert_eq!(dmx.values, &[1, 2, 3, 4]);
        assert!(!wire.is_out_of_sequence(5, 5));
    }

    #[test]
    fn test_capabilities() {
        let protocol = ArtNetProtocol::new();
        assert_eq!(protocol.name(), "Art-Net");
        assert_eq!(protocol.udp_port(), 6454);
        assert_eq!(protocol.min_universe_id(), 0);
        assert_eq!(protocol.max_universe_id(), 32767);
        assert!(protocol.is_causing_loopback(CommunicationType::Broadcast));
        assert!(!protocol.is_causing_loopback(CommunicationType::Unicast));
        assert!(!protocol.input_communication_types().contains(&CommunicationType::Multicast));
    }
}
