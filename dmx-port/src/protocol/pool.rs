// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Senders and receivers shared by endpoint.

use std::sync::Arc;

use dmx_core::communication_type::CommunicationType;
use parking_lot::Mutex;

use super::{
    WireFormat,
    receiver::{DmxReceiver, ReceiverEndpoint},
    sender::{DmxSender, SenderEndpoint},
};
use crate::{
    config::parse_ipv4,
    error::DmxResult,
    guid::PortGuid,
    port::{DmxPort, input::InputPort, output::OutputPort},
};

/// The live senders and receivers of one protocol instance.
///
/// Entries are created on first use of an endpoint and stopped, under the pool lock, when their last port leaves. Holding the
/// lock while stopping keeps a new entry from binding the same endpoint before the old socket is closed.
pub(crate) struct EndpointPool {
    wire: Arc<dyn WireFormat>,
    senders: Mutex<Vec<Arc<DmxSender>>>,
    receivers: Mutex<Vec<Arc<DmxReceiver>>>,
}

impl EndpointPool {
    pub(crate) fn new(wire: Arc<dyn WireFormat>) -> Self {
        Self {
            wire,
            senders: Mutex::new(Vec::new()),
            receivers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn wire(&self) -> &Arc<dyn WireFormat> {
        &self.wire
    }

    pub(crate) fn num_senders(&self) -> usize {
        self.senders.lock().len()
    }

    pub(crate) fn num_receivers(&self) -> usize {
        self.receivers.lock().len()
    }

    pub(crate) fn receivers(&self) -> Vec<Arc<DmxReceiver>> {
        self.receivers.lock().clone()
    }

    pub(crate) fn register_input_port(&self, port: &Arc<InputPort>) -> bool {
        let endpoint = match parse_ipv4(&port.device_address()) {
            Ok(device_address) => ReceiverEndpoint::new(port.communication_type(), device_address),
            Err(e) => {
                tracing::warn!(port = %port.port_name(), error = %e, "Cannot register input port");
                return false;
            }
        };

        let mut receivers = self.receivers.lock();
        let receiver = match receivers.iter().find(|receiver| receiver.equals_endpoint(&endpoint)) {
            Some(receiver) => Arc::clone(receiver),
            None => match DmxReceiver::spawn(endpoint, Arc::clone(&self.wire)) {
                Ok(receiver) => {
                    receivers.push(Arc::clone(&receiver));
                    receiver
                }
                Err(e) => {
                    tracing::warn!(port = %port.port_name(), endpoint = %endpoint, error = %e, "Failed to create DMX receiver");
                    return false;
                }
            },
        };

        receiver.assign_input_port(port);
        true
    }

    pub(crate) fn unregister_input_port(&self, port_guid: PortGuid) {
        let mut receivers = self.receivers.lock();
        receivers.retain(|receiver| match receiver.unassign_input_port(port_guid) {
            Some(0) => {
                receiver.stop();
                false
            }
            _ => true,
        });
    }

    pub(crate) fn register_output_port(&self, port: &Arc<OutputPort>) -> Option<Arc<DmxSender>> {
        let endpoint = match output_endpoint(port) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::warn!(port = %port.port_name(), error = %e, "Cannot register output port");
                return None;
            }
        };

        let mut senders = self.senders.lock();
        let sender = match senders.iter().find(|sender| sender.equals_endpoint(&endpoint)) {
            Some(sender) => Arc::clone(sender),
            None => match DmxSender::spawn(endpoint, Arc::clone(&self.wire)) {
                Ok(sender) => {
                    senders.push(Arc::clone(&sender));
                    sender
                }
                Err(e) => {
                    tracing::warn!(port = %port.port_name(), endpoint = %endpoint, error = %e, "Failed to create DMX sender");
                    return None;
                }
            },
        };

        sender.assign_output_port(port.port_guid(), port.universe_mapping());
        Some(sender)
    }

    pub(crate) fn unregister_output_port(&self, port_guid: PortGuid) {
        let mut senders = self.senders.lock();
        senders.retain(|sender| match sender.unassign_output_port(port_guid) {
            Some(0) => {
                sender.stop();
                false
            }
            _ => true,
        });
    }
}

fn output_endpoint(port: &OutputPort) -> DmxResult<SenderEndpoint> {
    let device_address = parse_ipv4(&port.device_address())?;
    let destination_address = match port.communication_type() {
        CommunicationType::Unicast => Some(parse_ipv4(&port.destination_address())?),
        _ => None,
    };

    Ok(SenderEndpoint::new(port.communication_type(), device_address, destination_address))
}
