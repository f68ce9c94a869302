// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Owner of every live port.
//!
//! The manager turns [ProtocolSettings] into ports and keeps them in sync with later edits. Ports are keyed by the GUID of
//! their config, an edit of a config with a known GUID updates the existing port in place.

use std::{sync::Arc, time::Duration};

use crate::{
    config::ProtocolSettings,
    context::PortContext,
    guid::PortGuid,
    port::{DmxPort, PortRef, input::InputPort, output::OutputPort},
    protocol::ProtocolRegistry,
};

/// The live input and output ports of one application session.
#[derive(Debug)]
pub struct PortManager {
    context: Arc<PortContext>,
    input_ports: Vec<Arc<InputPort>>,
    output_ports: Vec<Arc<OutputPort>>,
}

impl PortManager {
    /// Creates a port for every configured port. Invalid configs are corrected first, ports that still can't be registered
    /// are created inert.
    pub fn startup(mut settings: ProtocolSettings, registry: ProtocolRegistry) -> Self {
        settings.make_valid(&registry);
        let context = PortContext::from_settings(registry, &settings);

        let input_ports: Vec<_> = settings
            .input_port_configs
            .into_iter()
            .map(|config| InputPort::create_from_config(config, Arc::clone(&context)))
            .collect();

        let output_ports: Vec<_> = settings
            .output_port_configs
            .into_iter()
            .map(|config| OutputPort::create_from_config(config, Arc::clone(&context)))
            .collect();

        tracing::info!(
            inputs = input_ports.len(),
            outputs = output_ports.len(),
            protocols = ?context.registry(),
            "Started DMX port manager"
        );

        Self {
            context,
            input_ports,
            output_ports,
        }
    }

    /// Unregisters every port and releases them. Nothing is persisted.
    pub fn shutdown(self) {
        drop(self);
    }

    fn unregister_all(&self) {
        for port in &self.input_ports {
            port.unregister();
        }
        for port in &self.output_ports {
            port.unregister();
        }
    }

    /// The context shared by all ports
    pub fn context(&self) -> &Arc<PortContext> {
        &self.context
    }

    /// All input ports in config order
    pub fn input_ports(&self) -> &[Arc<InputPort>] {
        &self.input_ports
    }

    /// All output ports in config order
    pub fn output_ports(&self) -> &[Arc<OutputPort>] {
        &self.output_ports
    }

    /// Finds an input port
    pub fn find_input_port_by_guid(&self, port_guid: PortGuid) -> Option<&Arc<InputPort>> {
        self.input_ports.iter().find(|port| port.port_guid() == port_guid)
    }

    /// Finds an output port
    pub fn find_output_port_by_guid(&self, port_guid: PortGuid) -> Option<&Arc<OutputPort>> {
        self.output_ports.iter().find(|port| port.port_guid() == port_guid)
    }

    /// Finds a port, input ports are searched first
    pub fn find_port_by_guid(&self, port_guid: PortGuid) -> Option<PortRef> {
        self.find_input_port_by_guid(port_guid)
            .map(|port| PortRef::Input(Arc::clone(port)))
            .or_else(|| self.find_output_port_by_guid(port_guid).map(|port| PortRef::Output(Arc::clone(port))))
    }

    /// Finds a port that is known to exist.
    ///
    /// # Panics
    /// If no port has the GUID. Referring to a port that was never created or already removed is a bug in the caller.
    pub fn find_port_by_guid_checked(&self, port_guid: PortGuid) -> PortRef {
        match self.find_port_by_guid(port_guid) {
            Some(port) => port,
            None => panic!("no DMX port with GUID {port_guid}"),
        }
    }

    /// Brings the ports in line with edited settings.
    ///
    /// Ports whose GUID is still configured are updated in place and keep their identity, new configs create ports and
    /// ports without a config are unregistered and dropped. The runtime flags are taken over from `settings`.
    pub fn update_from_protocol_settings(&mut self, mut settings: ProtocolSettings) {
        settings.make_valid(self.context.registry());

        self.context.flags().set_send_dmx_enabled(settings.send_dmx_enabled);
        self.context.flags().set_receive_dmx_enabled(settings.receive_dmx_enabled);

        let mut input_ports = Vec::with_capacity(settings.input_port_configs.len());
        for config in settings.input_port_configs {
            match self.find_input_port_by_guid(config.port_guid) {
                Some(port) => {
                    port.update_from_config(config);
                    input_ports.push(Arc::clone(port));
                }
                None => input_ports.push(InputPort::create_from_config(config, Arc::clone(&self.context))),
            }
        }

        let mut output_ports = Vec::with_capacity(settings.output_port_configs.len());
        for config in settings.output_port_configs {
            match self.find_output_port_by_guid(config.port_guid) {
                Some(port) => {
                    port.update_from_config(config);
                    output_ports.push(Arc::clone(port));
                }
                None => output_ports.push(OutputPort::create_from_config(config, Arc::clone(&self.context))),
            }
        }

        for removed in self.input_ports.iter().filter(|port| !input_ports.iter().any(|kept| Arc::ptr_eq(kept, port))) {
            tracing::debug!(port = %removed.port_name(), "Removed input port");
            removed.unregister();
        }
        for removed in self.output_ports.iter().filter(|port| !output_ports.iter().any(|kept| Arc::ptr_eq(kept, port))) {
            tracing::debug!(port = %removed.port_name(), "Removed output port");
            removed.unregister();
        }

        self.input_ports = input_ports;
        self.output_ports = output_ports;
    }

    /// The current settings, as they would be saved
    pub fn protocol_settings(&self) -> ProtocolSettings {
        ProtocolSettings {
            send_dmx_enabled: self.is_send_dmx_enabled(),
            receive_dmx_enabled: self.is_receive_dmx_enabled(),
            input_port_configs: self.input_ports.iter().map(|port| port.config()).collect(),
            output_port_configs: self.output_ports.iter().map(|port| port.config()).collect(),
        }
    }

    /// Ticks every input port. Call once per frame from the thread reading the ports.
    pub fn tick(&self, delta_time: Duration) {
        for port in &self.input_ports {
            port.tick(delta_time);
        }
    }

    /// Drops buffered signals of every port and their raw listeners
    pub fn clear_buffers(&self) {
        for port in &self.input_ports {
            port.clear_buffers();
        }
        for port in &self.output_ports {
            port.clear_buffers();
        }
    }

    /// Returns true if output ports send to the network
    pub fn is_send_dmx_enabled(&self) -> bool {
        self.context.is_send_dmx_enabled()
    }

    /// Returns true if input ports receive from the network
    pub fn is_receive_dmx_enabled(&self) -> bool {
        self.context.is_receive_dmx_enabled()
    }

    /// Enables or disables sending and re-evaluates the registration of every output port
    pub fn set_send_dmx_enabled(&self, enabled: bool) {
        if self.context.flags().set_send_dmx_enabled(enabled) == enabled {
            return;
        }

        tracing::info!(enabled, "Sending DMX toggled");
        for port in &self.output_ports {
            port.update_registration();
        }
    }

    /// Enables or disables receiving and re-evaluates the registration of every input port
    pub fn set_receive_dmx_enabled(&self, enabled: bool) {
        if self.context.flags().set_receive_dmx_enabled(enabled) == enabled {
            return;
        }

        tracing::info!(enabled, "Receiving DMX toggled");
        for port in &self.input_ports {
            port.update_registration();
        }
    }
}

impl Drop for PortManager {
    fn drop(&mut self) {
        self.unregister_all();
        tracing::info!("Shut down DMX port manager");
    }
}
