// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A protocol without sockets for port and manager tests.

use std::sync::Arc;

use dmx_core::{communication_type::CommunicationType, universe::UniverseBounds};
use parking_lot::Mutex;

use super::{DmxProtocol, sender::DmxSender};
use crate::{
    guid::PortGuid,
    port::{DmxPort, input::InputPort, output::OutputPort},
};

pub(crate) const TEST_PROTOCOL_NAME: &str = "Test";

const INPUT_COMMUNICATION_TYPES: [CommunicationType; 2] = [CommunicationType::Unicast, CommunicationType::Multicast];

const OUTPUT_COMMUNICATION_TYPES: [CommunicationType; 2] = [CommunicationType::InternalOnly, CommunicationType::Unicast];

/// Records input registrations. Input ports always register, output ports never get a sender.
#[derive(Debug, Default)]
pub(crate) struct TestProtocol {
    inputs: Mutex<Vec<PortGuid>>,
}

impl TestProtocol {
    pub(crate) fn registered_inputs(&self) -> Vec<PortGuid> {
        self.inputs.lock().clone()
    }
}

impl DmxProtocol for TestProtocol {
    fn name(&self) -> &str {
        TEST_PROTOCOL_NAME
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
        communication_type == CommunicationType::InternalOnly
    }

    fn register_input_port(&self, port: &Arc<InputPort>) -> bool {
        self.inputs.lock().push(port.port_guid());
        true
    }

    fn unregister_input_port(&self, port: &InputPort) {
        self.inputs.lock().retain(|guid| *guid != port.port_guid());
    }

    fn register_output_port(&self, _port: &Arc<OutputPort>) -> Option<Arc<DmxSender>> {
        None
    }

    fn unregister_output_port(&self, _port: &OutputPort) {}
}
