// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! UDP socket setup for senders and receivers.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    time::Duration,
};

use dmx_core::communication_type::CommunicationType;
use socket2::{Domain, Protocol, Socket, Type};

use super::{receiver::ReceiverEndpoint, sender::SenderEndpoint};

/// How long a receiver blocks in recv before it checks whether it should stop.
pub(crate) const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens the socket a sender transmits from. It is bound to an ephemeral port on the NIC address.
pub(crate) fn sender_socket(endpoint: &SenderEndpoint) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    match endpoint.communication_type() {
        CommunicationType::Multicast => {
            socket.set_multicast_if_v4(&endpoint.device_address())?;
            // Local receivers on the same host see our multicast traffic
            socket.set_multicast_loop_v4(true)?;
        }
        CommunicationType::Broadcast => socket.set_broadcast(true)?,
        CommunicationType::Unicast | CommunicationType::InternalOnly => {}
    }

    socket.bind(&SocketAddr::new(endpoint.device_address().into(), 0).into())?;

    Ok(socket.into())
}

/// Opens the socket a receiver listens on.
///
/// Unicast receivers bind the NIC address. Multicast and broadcast receivers bind the wildcard address on unix, where
/// binding a specific address would filter out group and broadcast datagrams, and the NIC address elsewhere.
pub(crate) fn receiver_socket(endpoint: &ReceiverEndpoint, port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    let bind_address = match endpoint.communication_type() {
        CommunicationType::Multicast | CommunicationType::Broadcast => {
            #[cfg(unix)]
            socket.set_reuse_port(true)?;

            if cfg!(unix) { Ipv4Addr::UNSPECIFIED } else { endpoint.device_address() }
        }
        CommunicationType::Unicast | CommunicationType::InternalOnly => endpoint.device_address(),
    };

    if endpoint.communication_type() == CommunicationType::Broadcast {
        socket.set_broadcast(true)?;
    }

    socket.bind(&SocketAddr::new(bind_address.into(), port).into())?;
    socket.set_read_timeout(Some(RECEIVE_TIMEOUT))?;

    Ok(socket.into())
}
