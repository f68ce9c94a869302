// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Pooled network sender.
//!
//! A [DmxSender] owns one UDP socket and one worker thread. Output ports hand it signals through a channel, the worker keeps
//! the latest signal and a wire sequence number per universe, sends each signal immediately and resends the latest data of
//! idle universes as keep-alive. Universes no assigned port covers any more are terminated and forgotten.

use std::{
    collections::HashMap,
    fmt::Display,
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use dmx_core::{communication_type::CommunicationType, signal::DmxSignal, universe::UniverseMapping};
use parking_lot::Mutex;

use super::{OutgoingDmx, WireFormat, socket::sender_socket};
use crate::guid::PortGuid;

/// Where a sender transmits to. Ports with equal endpoints share one sender.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SenderEndpoint {
    communication_type: CommunicationType,
    device_address: Ipv4Addr,
    destination_address: Option<Ipv4Addr>,
}

impl SenderEndpoint {
    /// Creates an endpoint. The destination is only part of the endpoint for unicast.
    pub fn new(communication_type: CommunicationType, device_address: Ipv4Addr, destination_address: Option<Ipv4Addr>) -> Self {
        let destination_address = match communication_type {
            CommunicationType::Unicast => destination_address,
            _ => None,
        };

        Self {
            communication_type,
            device_address,
            destination_address,
        }
    }

    /// How the sender transmits
    pub const fn communication_type(&self) -> CommunicationType {
        self.communication_type
    }

    /// NIC the sender transmits from
    pub const fn device_address(&self) -> Ipv4Addr {
        self.device_address
    }

    /// Unicast destination
    pub const fn destination_address(&self) -> Option<Ipv4Addr> {
        self.destination_address
    }

    /// The socket address a universe is sent to, None if the endpoint can't reach the universe
    pub fn destination(&self, wire: &dyn WireFormat, universe: i32) -> Option<SocketAddr> {
        let ip = match self.communication_type {
            CommunicationType::Unicast => self.destination_address?,
            CommunicationType::Multicast => wire.multicast_group(universe)?,
            CommunicationType::Broadcast => Ipv4Addr::BROADCAST,
            CommunicationType::InternalOnly => return None,
        };

        Some(SocketAddr::V4(SocketAddrV4::new(ip, wire.udp_port())))
    }
}

impl Display for SenderEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.destination_address {
            Some(destination) => write!(f, "{} {} -> {}", self.communication_type, self.device_address, destination),
            None => write!(f, "{} {}", self.communication_type, self.device_address),
        }
    }
}

enum SenderCommand {
    Send(Arc<DmxSignal>),
    /// Universes left by the last port sending them
    Release(Vec<i32>),
    Stop,
}

/// Sends the signals of all output ports assigned to it from one socket.
pub struct DmxSender {
    endpoint: SenderEndpoint,
    protocol_name: &'static str,
    /// Assigned ports and the universe range each one sends
    assigned_ports: Mutex<HashMap<PortGuid, Option<UniverseMapping>>>,
    commands: Sender<SenderCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DmxSender {
    /// Opens the socket and starts the worker thread.
    pub(crate) fn spawn(endpoint: SenderEndpoint, wire: Arc<dyn WireFormat>) -> io::Result<Arc<Self>> {
        let socket = sender_socket(&endpoint)?;
        let (commands, receiver) = crossbeam_channel::unbounded();
        let protocol_name = wire.protocol_name();

        let worker = SenderWorker {
            endpoint,
            buf: vec![0; wire.max_packet_size()],
            wire,
            socket,
            streams: HashMap::new(),
        };

        let handle = thread::Builder::new()
            .name(format!("{protocol_name} sender"))
            .spawn(move || worker.run(receiver))?;

        tracing::info!(protocol = protocol_name, endpoint = %endpoint, "Started DMX sender");

        Ok(Arc::new(Self {
            endpoint,
            protocol_name,
            assigned_ports: Mutex::new(HashMap::new()),
            commands,
            worker: Mutex::new(Some(handle)),
        }))
    }

    /// The endpoint the sender transmits to
    pub fn endpoint(&self) -> &SenderEndpoint {
        &self.endpoint
    }

    /// Returns true if the sender transmits to `endpoint`
    pub fn equals_endpoint(&self, endpoint: &SenderEndpoint) -> bool {
        self.endpoint == *endpoint
    }

    /// Queues a signal for sending. Never blocks.
    pub fn send_dmx_signal(&self, signal: Arc<DmxSignal>) {
        if self.commands.send(SenderCommand::Send(signal)).is_err() {
            tracing::trace!(protocol = self.protocol_name, endpoint = %self.endpoint, "Dropped signal, sender is stopped");
        }
    }

    /// Number of output ports using the sender
    pub fn num_assigned_ports(&self) -> usize {
        self.assigned_ports.lock().len()
    }

    /// Returns true if the port uses the sender
    pub fn is_assigned(&self, port_guid: PortGuid) -> bool {
        self.assigned_ports.lock().contains_key(&port_guid)
    }

    /// Assigns a port together with the universes it sends to
    pub(crate) fn assign_output_port(&self, port_guid: PortGuid, mapping: Option<UniverseMapping>) {
        self.assigned_ports.lock().insert(port_guid, mapping);
    }

    /// Removes the port, returns the number of remaining ports or None if the port was not assigned.
    ///
    /// Universes of the port that no remaining port sends to are terminated and no longer kept alive.
    pub(crate) fn unassign_output_port(&self, port_guid: PortGuid) -> Option<usize> {
        let mut assigned_ports = self.assigned_ports.lock();
        let mapping = assigned_ports.remove(&port_guid)?;

        // Without remaining ports the sender is stopped, which terminates every stream
        if let Some(mapping) = mapping.filter(|_| !assigned_ports.is_empty()) {
            let released: Vec<i32> = mapping
                .extern_universes()
                .filter(|&universe| !assigned_ports.values().flatten().any(|other| other.is_extern_universe_in_range(universe)))
                .collect();

            if !released.is_empty() && self.commands.send(SenderCommand::Release(released)).is_err() {
                tracing::trace!(protocol = self.protocol_name, endpoint = %self.endpoint, "Sender stopped before releasing universes");
            }
        }

        Some(assigned_ports.len())
    }

    /// Stops the worker and waits for it to finish. Stream termination packets are sent on the way out.
    pub(crate) fn stop(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        // The worker may already be gone, joining tells
        let _ = self.commands.send(SenderCommand::Stop);
        if handle.join().is_err() {
            tracing::warn!(protocol = self.protocol_name, endpoint = %self.endpoint, "DMX sender thread panicked");
        }

        tracing::info!(protocol = self.protocol_name, endpoint = %self.endpoint, "Stopped DMX sender");
    }
}

impl Drop for DmxSender {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DmxSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmxSender")
            .field("protocol", &self.protocol_name)
            .field("endpoint", &self.endpoint)
            .field("assigned_ports", &self.num_assigned_ports())
            .finish()
    }
}

struct UniverseStream {
    signal: Arc<DmxSignal>,
    sequence: u8,
    last_sent: Instant,
}

struct SenderWorker {
    endpoint: SenderEndpoint,
    wire: Arc<dyn WireFormat>,
    socket: UdpSocket,
    streams: HashMap<i32, UniverseStream>,
    buf: Vec<u8>,
}

impl SenderWorker {
    fn run(mut self, commands: crossbeam_channel::Receiver<SenderCommand>) {
        loop {
            match commands.recv_timeout(self.time_to_next_keep_alive()) {
                Ok(SenderCommand::Send(signal)) => self.send_latest(signal),
                Ok(SenderCommand::Release(universes)) => self.release(&universes),
                Ok(SenderCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            self.send_keep_alives();
        }

        self.terminate_streams();
    }

    fn time_to_next_keep_alive(&self) -> Duration {
        let interval = self.wire.keep_alive_interval();
        self.streams
            .values()
            .map(|stream| interval.saturating_sub(stream.last_sent.elapsed()))
            .min()
            .unwrap_or(interval)
            .max(Duration::from_millis(1))
    }

    fn send_latest(&mut self, signal: Arc<DmxSignal>) {
        let universe = signal.extern_universe_id();
        let stream = self.streams.entry(universe).or_insert_with(|| UniverseStream {
            signal: Arc::clone(&signal),
            // The first packet of a universe carries next_sequence(u8::MAX)
            sequence: u8::MAX,
            last_sent: Instant::now(),
        });
        stream.signal = signal;

        transmit(self.wire.as_ref(), &self.socket, &self.endpoint, &mut self.buf, stream, false);
    }

    fn send_keep_alives(&mut self) {
        let interval = self.wire.keep_alive_interval();
        for stream in self.streams.values_mut() {
            if stream.last_sent.elapsed() >= interval {
                transmit(self.wire.as_ref(), &self.socket, &self.endpoint, &mut self.buf, stream, false);
            }
        }
    }

    fn release(&mut self, universes: &[i32]) {
        for universe in universes {
            if let Some(mut stream) = self.streams.remove(universe) {
                self.terminate(&mut stream);
            }
        }
    }

    fn terminate_streams(&mut self) {
        let streams: Vec<UniverseStream> = self.streams.drain().map(|(_, stream)| stream).collect();
        for mut stream in streams {
            self.terminate(&mut stream);
        }
    }

    fn terminate(&mut self, stream: &mut UniverseStream) {
        for _ in 0..self.wire.termination_packet_count() {
            transmit(self.wire.as_ref(), &self.socket, &self.endpoint, &mut self.buf, stream, true);
        }
        tracing::trace!(protocol = self.wire.protocol_name(), universe = stream.signal.extern_universe_id(), "Terminated universe");
    }
}

fn transmit(
    wire: &dyn WireFormat,
    socket: &UdpSocket,
    endpoint: &SenderEndpoint,
    buf: &mut [u8],
    stream: &mut UniverseStream,
    stream_terminated: bool,
) {
    let universe = stream.signal.extern_universe_id();
    let Some(destination) = endpoint.destination(wire, universe) else {
        tracing::trace!(protocol = wire.protocol_name(), universe, "Universe not reachable from {endpoint}");
        return;
    };

    stream.sequence = wire.next_sequence(stream.sequence);
    stream.last_sent = Instant::now();

    let dmx = OutgoingDmx {
        universe,
        sequence: stream.sequence,
        priority: stream.signal.priority(),
        stream_terminated,
        values: stream.signal.channel_data(),
    };

    let len = match wire.pack(&dmx, buf) {
        Ok(len) => len,
        Err(e) => {
            tracing::debug!(protocol = wire.protocol_name(), universe, error = %e, "Failed to pack DMX packet");
            return;
        }
    };

    // Dropped frames are superseded by the next one
    if let Err(e) = socket.send_to(&buf[..len], destination) {
        tracing::debug!(protocol = wire.protocol_name(), universe, %destination, error = %e, "Failed to send DMX packet");
    }
}
