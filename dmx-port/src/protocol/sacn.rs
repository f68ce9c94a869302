// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Streaming ACN (ANSI E1.31-2018).
//!
//! Output ports send data packets by multicast (239.255.hi.lo) or unicast, input ports receive them from either. Every
//! universe carries an 8 bit sequence number, receivers drop packets that fall within the discard window of
//! ANSI E1.31-2018 Section 6.7.2 relative to the last accepted packet from the same source.

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use dmx_core::{
    communication_type::CommunicationType,
    definitions::*,
    packet_error::PacketError,
    sacn_packet::{SacnDataPacket, universe_to_ipv4_multicast_addr},
    source_name::SourceName,
    universe::UniverseBounds,
};
use uuid::Uuid;

use super::{DmxProtocol, IncomingDmx, OutgoingDmx, WireFormat, pool::EndpointPool, receiver::DmxReceiver, sender::DmxSender};
use crate::port::{DmxPort, input::InputPort, output::OutputPort};

/// Name sACN ports are configured by
pub const SACN_PROTOCOL_NAME: &str = "sACN";

/// Source name used for sent packets unless configured otherwise
pub const DEFAULT_SOURCE_NAME: &str = "dmx-port";

const INPUT_COMMUNICATION_TYPES: [CommunicationType; 2] = [CommunicationType::Multicast, CommunicationType::Unicast];

const OUTPUT_COMMUNICATION_TYPES: [CommunicationType; 3] =
    [CommunicationType::Multicast, CommunicationType::Unicast, CommunicationType::InternalOnly];

/// E1.31 data packets on the wire.
#[derive(Debug, Clone)]
pub struct SacnWire {
    port: u16,
    cid: Uuid,
    source_name: SourceName,
}

impl SacnWire {
    /// Creates a wire format with a random CID
    pub fn new(port: u16) -> Self {
        Self::with_source(port, Uuid::new_v4(), SourceName::truncated(DEFAULT_SOURCE_NAME))
    }

    /// Creates a wire format that identifies as the given source
    pub fn with_source(port: u16, cid: Uuid, source_name: SourceName) -> Self {
        Self { port, cid, source_name }
    }

    /// Component identifier sent with every packet
    pub fn cid(&self) -> &Uuid {
        &self.cid
    }

    /// Source name sent with every packet
    pub fn source_name(&self) -> &SourceName {
        &self.source_name
    }
}

impl WireFormat for SacnWire {
    fn protocol_name(&self) -> &'static str {
        SACN_PROTOCOL_NAME
    }

    fn udp_port(&self) -> u16 {
        self.port
    }

    fn max_packet_size(&self) -> usize {
        E131_MAX_DATA_PACKET_SIZE
    }

    fn keep_alive_interval(&self) -> Duration {
        E131_KEEP_ALIVE_INTERVAL
    }

    fn data_loss_timeout(&self) -> Duration {
        E131_NETWORK_DATA_LOSS_TIMEOUT
    }

    fn termination_packet_count(&self) -> usize {
        E131_TERMINATE_STREAM_PACKET_COUNT
    }

    fn next_sequence(&self, previous: u8) -> u8 {
        previous.wrapping_add(1)
    }

    fn is_out_of_sequence(&self, last: u8, received: u8) -> bool {
        // Compared as a signed 8 bit difference so the window works across the wrap
        let diff = received.wrapping_sub(last) as i8 as isize;
        diff > E131_SEQ_DIFF_DISCARD_LOWER_BOUND && diff <= E131_SEQ_DIFF_DISCARD_UPPER_BOUND
    }

    fn multicast_group(&self, universe: i32) -> Option<Ipv4Addr> {
        if !(E131_MIN_UNIVERSE..=E131_MAX_UNIVERSE).contains(&universe) {
            return None;
        }
        let universe = u16::try_from(universe).ok()?;
        Some(universe_to_ipv4_multicast_addr(universe))
    }

    fn pack(&self, dmx: &OutgoingDmx<'_>, buf: &mut [u8]) -> Result<usize, PacketError> {
        let universe = u16::try_from(dmx.universe).map_err(|_| PacketError::InvalidUniverse(dmx.universe))?;

        SacnDataPacket {
            cid: self.cid,
            source_name: self.source_name.clone(),
            priority: dmx.priority,
            synchronization_address: 0,
            sequence_number: dmx.sequence,
            preview_data: false,
            stream_terminated: dmx.stream_terminated,
            universe,
            start_code: DMX_NULL_START_CODE,
            values: dmx.values,
        }
        .pack(buf)
    }

    fn parse<'a>(&self, buf: &'a [u8]) -> Result<IncomingDmx<'a>, PacketError> {
        let packet = SacnDataPacket::parse(buf)?;

        if packet.start_code != DMX_NULL_START_CODE {
            Err(PacketError::ParseInvalidData("alternate start code"))?;
        }

        Ok(IncomingDmx {
            universe: i32::from(packet.universe),
            sequence: packet.sequence_number,
            priority: packet.priority,
            stream_terminated: packet.stream_terminated,
            preview_data: packet.preview_data,
            values: packet.values,
        })
    }
}

/// The sACN protocol, owning the pooled senders and receivers of all sACN ports.
pub struct SacnProtocol {
    pool: EndpointPool,
}

impl SacnProtocol {
    /// Creates the protocol on the standard ACN port 5568
    pub fn new() -> Self {
        Self::with_port(ACN_SDT_MULTICAST_PORT)
    }

    /// Creates the protocol on a custom UDP port
    pub fn with_port(port: u16) -> Self {
        Self::with_wire(SacnWire::new(port))
    }

    /// Creates the protocol with a custom source identity
    pub fn with_wire(wire: SacnWire) -> Self {
        Self {
            pool: EndpointPool::new(Arc::new(wire)),
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

impl Default for SacnProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SacnProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SacnProtocol")
            .field("udp_port", &self.udp_port())
            .field("senders", &self.num_senders())
            .field("receivers", &self.num_receivers())
            .finish()
    }
}

impl DmxProtocol for SacnProtocol {
    fn name(&self) -> &str {
        SACN_PROTOCOL_NAME
    }

    fn input_communication_types(&self) -> &[CommunicationType] {
        &INPUT_COMMUNICATION_TYPES
    }

    fn output_communication_types(&self) -> &[CommunicationType] {
        &OUTPUT_COMMUNICATION_TYPES
    }

    fn universe_bounds(&self) -> UniverseBounds {
        UniverseBounds::SACN
    }

    fn is_causing_loopback(&self, communication_type: CommunicationType) -> bool {
        matches!(communication_type, CommunicationType::Multicast | CommunicationType::InternalOnly)
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
mod test_sacn_wire {
    use dmx_core::priority::Priority;

    use super::*;

    #[test]
    fn test_sequence_wraps_to_zero() {
        let wire = SacnWire::new(ACN_SDT_MULTICAST_PORT);
        assert_eq!(wire.next_sequence(u8::MAX), 0);
        assert_eq!(wire.next_sequence(0), 1);
    }

    #[test]
    fn test_sequence_discard_window() {
        let wire = SacnWire::new(ACN_SDT_MULTICAST_PORT);

        // Duplicate and recently seen numbers are dropped
        assert!(wire.is_out_of_sequence(100, 100));
        assert!(wire.is_out_of_sequence(100, 99));
        assert!(wire.is_out_of_sequence(100, 81));

        // A jump back of 20 or more is treated as a restarted source
        assert!(!wire.is_out_of_sequence(100, 80));
        assert!(!wire.is_out_of_sequence(100, 101));

        assert!(!wire.is_out_of_sequence(255, 0));
        assert!(wire.is_out_of_sequence(0, 255));
    }

    #[test]
    fn test_multicast_group_only_for_valid_universes() {
        let wire = SacnWire::new(ACN_SDT_MULTICAST_PORT);
        assert_eq!(wire.multicast_group(1), Some(Ipv4Addr::new(239, 255, 0, 1)));
        assert_eq!(wire.multicast_group(63999), Some(Ipv4Addr::new(239, 255, 249, 255)));
        assert_eq!(wire.multicast_group(0), None);
        assert_eq!(wire.multicast_group(64000), None);
    }

    #[test]
    fn test_packed_dmx_parses_back() {
        let wire = SacnWire::new(ACN_SDT_MULTICAST_PORT);
        let values = [7u8; 512];
        let mut buf = [0u8; E131_MAX_DATA_PACKET_SIZE];

        let len = wire
            .pack(
                &OutgoingDmx {
                    universe: 42,
                    sequence: 9,
                    priority: Priority::new(150).unwrap(),
                    stream_terminated: true,
                    values: &values,
                },
                &mut buf,
            )
            .unwrap();

        let dmx = wire.parse(&buf[..len]).unwrap();
        assert_eq!(dmx.universe, 42);
        assert_eq!(dmx.sequence, 9);
        assert_eq!(dmx.priority.get(), 150);
        assert!(dmx.stream_terminated);
        assert!(!dmx.preview_data);
        assert_eq!(dmx.values, &values[..]);
    }

    #[test]
    fn test_pack_rejects_universe_outside_u16() {
        let wire = SacnWire::new(ACN_SDT_MULTICAST_PORT);
        let mut buf = [0u8; E131_MAX_DATA_PACKET_SIZE];
        let dmx = OutgoingDmx {
            universe: 70000,
            sequence: 0,
            priority: Priority::DEFAULT,
            stream_terminated: false,
            values: &[0; 512],
        };

        assert_eq!(wire.pack(&dmx, &mut buf), Err(PacketError::InvalidUniverse(70000)));
    }

    #[test]
    fn test_capabilities() {
        let protocol = SacnProtocol::new();
        assert_eq!(protocol.name(), "sACN");
        assert_eq!(protocol.udp_port(), 5568);
        assert_eq!(protocol.min_universe_id(), 1);
        assert_eq!(protocol.max_universe_id(), 63999);
        assert!(protocol.is_causing_loopback(CommunicationType::Multicast));
        assert!(protocol.is_causing_loopback(CommunicationType::InternalOnly));
        assert!(!protocol.is_causing_loopback(CommunicationType::Unicast));
        assert!(!protocol.output_communication_types().contains(&CommunicationType::Broadcast));
    }
}
