// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Pooled network receiver.
//!
//! A [DmxReceiver] owns one UDP socket and one worker thread. The worker parses every datagram for a universe it listens
//! to, drops stale sequence numbers, and pushes the resulting signal into every assigned input port whose extern range contains the universe.
//! Delivery happens under the same lock assignment changes take, so once [DmxReceiver::unassign_input_port] returns the
//! port is never called again.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    io::{self, ErrorKind},
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use dmx_core::{communication_type::CommunicationType, signal::DmxSignal, universe::UniverseMapping, universe_set::UniverseSet};
use parking_lot::Mutex;

use super::{
    WireFormat,
    socket::{RECEIVE_TIMEOUT, receiver_socket},
};
use crate::{
    guid::PortGuid,
    port::{DmxPort, input::InputPort},
};

/// Large enough for any datagram on an ethernet link
const RECEIVE_BUFFER_SIZE: usize = 1500;

/// Where a receiver listens. Ports with equal endpoints share one receiver.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ReceiverEndpoint {
    communication_type: CommunicationType,
    device_address: Ipv4Addr,
}

impl ReceiverEndpoint {
    /// Creates an endpoint
    pub const fn new(communication_type: CommunicationType, device_address: Ipv4Addr) -> Self {
        Self {
            communication_type,
            device_address,
        }
    }

    /// How the receiver listens
    pub const fn communication_type(&self) -> CommunicationType {
        self.communication_type
    }

    /// NIC the receiver listens on
    pub const fn device_address(&self) -> Ipv4Addr {
        self.device_address
    }
}

impl Display for ReceiverEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.communication_type, self.device_address)
    }
}

struct AssignedPort {
    port_guid: PortGuid,
    port: Weak<InputPort>,
    /// Captured on assignment, a mapping change re-registers the port
    mapping: Option<UniverseMapping>,
}

struct ReceiverState {
    ports: Vec<AssignedPort>,
    universes: UniverseSet,
    joined_groups: HashSet<Ipv4Addr>,
}

/// Receives DMX for all input ports assigned to it from one socket.
pub struct DmxReceiver {
    endpoint: ReceiverEndpoint,
    wire: Arc<dyn WireFormat>,
    socket: Arc<UdpSocket>,
    state: Arc<Mutex<ReceiverState>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DmxReceiver {
    /// Opens the socket and starts the worker thread.
    pub(crate) fn spawn(endpoint: ReceiverEndpoint, wire: Arc<dyn WireFormat>) -> io::Result<Arc<Self>> {
        let socket = Arc::new(receiver_socket(&endpoint, wire.udp_port())?);
        let state = Arc::new(Mutex::new(ReceiverState {
            ports: Vec::new(),
            universes: UniverseSet::new(),
            joined_groups: HashSet::new(),
        }));
        let running = Arc::new(AtomicBool::new(true));

        let worker = ReceiverWorker {
            wire: Arc::clone(&wire),
            socket: Arc::clone(&socket),
            state: Arc::clone(&state),
            running: Arc::clone(&running),
            sequences: SequenceTracker::new(wire.data_loss_timeout()),
            signal_sequences: HashMap::new(),
        };

        let handle = thread::Builder::new()
            .name(format!("{} receiver", wire.protocol_name()))
            .spawn(move || worker.run())?;

        tracing::info!(protocol = wire.protocol_name(), endpoint = %endpoint, port = wire.udp_port(), "Started DMX receiver");

        Ok(Arc::new(Self {
            endpoint,
            wire,
            socket,
            state,
            running,
            worker: Mutex::new(Some(handle)),
        }))
    }

    /// The endpoint the receiver listens on
    pub fn endpoint(&self) -> &ReceiverEndpoint {
        &self.endpoint
    }

    /// Returns true if the receiver listens on `endpoint`
    pub fn equals_endpoint(&self, endpoint: &ReceiverEndpoint) -> bool {
        self.endpoint == *endpoint
    }

    /// Number of input ports using the receiver
    pub fn num_assigned_ports(&self) -> usize {
        self.state.lock().ports.len()
    }

    /// Returns true if the port uses the receiver
    pub fn is_assigned(&self, port_guid: PortGuid) -> bool {
        self.state.lock().ports.iter().any(|assigned| assigned.port_guid == port_guid)
    }

    /// Returns true if datagrams for the extern universe are delivered
    pub fn is_listening_to(&self, universe: i32) -> bool {
        self.state.lock().universes.contains(universe)
    }

    pub(crate) fn assign_input_port(&self, port: &Arc<InputPort>) {
        let mut state = self.state.lock();
        let port_guid = port.port_guid();
        state.ports.retain(|assigned| assigned.port_guid != port_guid);
        state.ports.push(AssignedPort {
            port_guid,
            port: Arc::downgrade(port),
            mapping: port.universe_mapping(),
        });
        self.update_universes(&mut state);
    }

    /// Removes the port, returns the number of remaining ports or None if the port was not assigned
    pub(crate) fn unassign_input_port(&self, port_guid: PortGuid) -> Option<usize> {
        let mut state = self.state.lock();
        let before = state.ports.len();
        state.ports.retain(|assigned| assigned.port_guid != port_guid);
        if state.ports.len() == before {
            return None;
        }

        self.update_universes(&mut state);
        Some(state.ports.len())
    }

    /// Recomputes the delivered universes and the multicast memberships from the assigned ports.
    fn update_universes(&self, state: &mut ReceiverState) {
        let mut universes = UniverseSet::new();
        for mapping in state.ports.iter().filter_map(|assigned| assigned.mapping) {
            universes.mark_range(mapping.extern_universes());
        }
        state.universes = universes;

        if self.endpoint.communication_type != CommunicationType::Multicast {
            return;
        }

        let wanted: HashSet<Ipv4Addr> = state.universes.iter().filter_map(|universe| self.wire.multicast_group(universe)).collect();

        for group in state.joined_groups.difference(&wanted) {
            if let Err(e) = self.socket.leave_multicast_v4(group, &self.endpoint.device_address) {
                tracing::debug!(%group, error = %e, "Failed to leave multicast group");
            }
        }

        for group in wanted.difference(&state.joined_groups) {
            if let Err(e) = self.socket.join_multicast_v4(group, &self.endpoint.device_address) {
                tracing::warn!(%group, interface = %self.endpoint.device_address, error = %e, "Failed to join multicast group");
            }
        }

        state.joined_groups = wanted;
    }

    /// Stops the worker and waits for it to finish.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);

        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        // A port dropped on the worker thread may end up here, the worker exits on its own
        if handle.thread().id() == thread::current().id() {
            return;
        }

        if handle.join().is_err() {
            tracing::warn!(protocol = self.wire.protocol_name(), endpoint = %self.endpoint, "DMX receiver thread panicked");
        }

        tracing::info!(protocol = self.wire.protocol_name(), endpoint = %self.endpoint, "Stopped DMX receiver");
    }
}

impl Drop for DmxReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DmxReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmxReceiver")
            .field("protocol", &self.wire.protocol_name())
            .field("endpoint", &self.endpoint)
            .field("assigned_ports", &self.num_assigned_ports())
            .finish()
    }
}

struct ReceiverWorker {
    wire: Arc<dyn WireFormat>,
    socket: Arc<UdpSocket>,
    state: Arc<Mutex<ReceiverState>>,
    running: Arc<AtomicBool>,
    sequences: SequenceTracker,
    /// Sequence assigned to the signals of a universe
    signal_sequences: HashMap<i32, u32>,
}

impl ReceiverWorker {
    fn run(mut self) {
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        let mut last_pruned = Instant::now();

        while self.running.load(Ordering::Acquire) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, source)) => self.handle_datagram(&buf[..len], source),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
                Err(e) => {
                    tracing::debug!(protocol = self.wire.protocol_name(), error = %e, "Failed to receive");
                    thread::sleep(RECEIVE_TIMEOUT);
                }
            }

            if last_pruned.elapsed() >= self.sequences.timeout() {
                last_pruned = Instant::now();
                self.sequences.prune(last_pruned);
            }
        }
    }

    fn handle_datagram(&mut self, datagram: &[u8], source: SocketAddr) {
        let dmx = match self.wire.parse(datagram) {
            Ok(dmx) => dmx,
            Err(e) => {
                tracing::trace!(protocol = self.wire.protocol_name(), %source, error = %e, "Ignored datagram");
                return;
            }
        };

        let key = (source, dmx.universe);
        if dmx.stream_terminated {
            self.sequences.forget(&key);
            return;
        }

        if dmx.preview_data {
            return;
        }

        // Upgraded ports are released only after the lock, dropping the last reference to a port unregisters it
        let mut delivered_to = Vec::new();
        {
            let state = self.state.lock();
            if !state.universes.contains(dmx.universe) {
                return;
            }

            if !self.sequences.accept(self.wire.as_ref(), key, dmx.sequence, Instant::now()) {
                tracing::trace!(universe = dmx.universe, received = dmx.sequence, "Dropped out of sequence packet");
                return;
            }

            let sequence = self.signal_sequences.entry(dmx.universe).or_insert(0);
            *sequence = sequence.wrapping_add(1);

            let signal = match DmxSignal::from_slice(dmx.universe, dmx.values, *sequence, dmx.priority) {
                Ok(signal) => Arc::new(signal),
                Err(e) => {
                    tracing::trace!(universe = dmx.universe, error = %e, "Invalid DMX data");
                    return;
                }
            };

            for assigned in &state.ports {
                if !assigned.mapping.is_some_and(|mapping| mapping.is_extern_universe_in_range(dmx.universe)) {
                    continue;
                }

                if let Some(port) = assigned.port.upgrade() {
                    port.single_producer_input_dmx_signal(Arc::clone(&signal));
                    delivered_to.push(port);
                }
            }
        }
        drop(delivered_to);
    }
}

/// Last accepted wire sequence per source and universe.
///
/// A source that stays silent for longer than the data loss timeout is forgotten, so a restarted source is accepted no
/// matter where its sequence numbers start.
struct SequenceTracker {
    timeout: Duration,
    last: HashMap<(SocketAddr, i32), (u8, Instant)>,
}

impl SequenceTracker {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last: HashMap::new(),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Records the sequence and returns true, or returns false if the packet has to be dropped
    fn accept(&mut self, wire: &dyn WireFormat, key: (SocketAddr, i32), sequence: u8, now: Instant) -> bool {
        if let Some(&(last, seen)) = self.last.get(&key) {
            if now.saturating_duration_since(seen) < self.timeout && wire.is_out_of_sequence(last, sequence) {
                return false;
            }
        }

        self.last.insert(key, (sequence, now));
        true
    }

    fn forget(&mut self, key: &(SocketAddr, i32)) {
        self.last.remove(key);
    }

    /// Drops every source that was silent for longer than the timeout
    fn prune(&mut self, now: Instant) {
        let timeout = self.timeout;
        self.last.retain(|_, (_, seen)| now.saturating_duration_since(*seen) < timeout);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.last.len()
    }
}

#[cfg(test)]
mod test_sequence_tracker {
    use dmx_core::definitions::{ACN_SDT_MULTICAST_PORT, E131_NETWORK_DATA_LOSS_TIMEOUT};

    use super::*;
    use crate::protocol::sacn::SacnWire;

    fn source(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 10], port))
    }

    #[test]
    fn test_stale_sequences_are_dropped() {
        let wire = SacnWire::new(ACN_SDT_MULTICAST_PORT);
        let mut sequences = SequenceTracker::new(wire.data_loss_timeout());
        let start = Instant::now();

        assert!(sequences.accept(&wire, (source(5568), 5), 10, start));
        assert!(!sequences.accept(&wire, (source(5568), 5), 10, start));
        assert!(!sequences.accept(&wire, (source(5568), 5), 0, start + Duration::from_secs(1)));
        assert!(sequences.accept(&wire, (source(5568), 5), 11, start + Duration::from_secs(1)));

        // Other universes and other sources keep their own window
        assert!(sequences.accept(&wire, (source(5568), 6), 0, start));
        assert!(sequences.accept(&wire, (source(5569), 5), 0, start));
    }

    #[test]
    fn test_restarted_source_is_accepted_after_data_loss_timeout() {
        let wire = SacnWire::new(ACN_SDT_MULTICAST_PORT);
        let mut sequences = SequenceTracker::new(wire.data_loss_timeout());
        assert_eq!(sequences.timeout(), E131_NETWORK_DATA_LOSS_TIMEOUT);

        let start = Instant::now();
        assert!(sequences.accept(&wire, (source(5568), 5), 10, start));

        let restarted = start + Duration::from_secs(3);
        for sequence in 0..5 {
            assert!(sequences.accept(&wire, (source(5568), 5), sequence, restarted));
        }
    }

    #[test]
    fn test_terminated_stream_is_forgotten() {
        let wire = SacnWire::new(ACN_SDT_MULTICAST_PORT);
        let mut sequences = SequenceTracker::new(wire.data_loss_timeout());
        let start = Instant::now();

        assert!(sequences.accept(&wire, (source(5568), 5), 10, start));
        sequences.forget(&(source(5568), 5));
        assert!(sequences.accept(&wire, (source(5568), 5), 0, start));
    }

    #[test]
    fn test_prune_drops_silent_sources() {
        let wire = SacnWire::new(ACN_SDT_MULTICAST_PORT);
        let mut sequences = SequenceTracker::new(wire.data_loss_timeout());
        let start = Instant::now();

        sequences.accept(&wire, (source(5568), 1), 0, start);
        sequences.accept(&wire, (source(5568), 2), 0, start + Duration::from_secs(2));
        assert_eq!(sequences.len(), 2);

        sequences.prune(start + Duration::from_secs(3));
        assert_eq!(sequences.len(), 1);
        assert!(sequences.accept(&wire, (source(5568), 1), 0, start + Duration::from_secs(3)));
    }
}
