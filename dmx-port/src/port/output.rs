// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Ports sending DMX to the network.
//!
//! An output port caches the latest signal of every universe it sent. [OutputPort::send_dmx] only overwrites the channels
//! it is given, all other channels keep the value they were last sent with.

use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicI32, Ordering},
    },
};

use dmx_core::{
    communication_type::CommunicationType,
    priority::Priority,
    signal::{DmxSignal, SignalError},
    universe::UniverseMapping,
};
use parking_lot::{Mutex, RwLock};

use super::{DmxPort, PortCore, common_config_problem, input::SignalMap, resolve_protocol};
use crate::{
    config::{OutputPortConfig, parse_ipv4},
    context::PortContext,
    error::{DmxResult, Error},
    guid::PortGuid,
    protocol::{DmxProtocol, DmxSender},
    raw_listener::RawListenerId,
    spsc::SignalProducer,
};

struct OutputPortState {
    config: OutputPortConfig,
    protocol: Option<Arc<dyn DmxProtocol>>,
    mapping: Option<UniverseMapping>,
    sender: Option<Arc<DmxSender>>,
}

#[derive(Default)]
struct SentSignals {
    latest: SignalMap,
    sequence: u32,
}

/// A port sending DMX.
pub struct OutputPort {
    weak_self: Weak<OutputPort>,
    core: PortCore,
    state: RwLock<OutputPortState>,
    signals: Mutex<SentSignals>,
}

impl OutputPort {
    /// Creates the port and registers it if the config and the runtime flags allow it.
    pub fn create_from_config(config: OutputPortConfig, context: Arc<PortContext>) -> Arc<Self> {
        let protocol = resolve_protocol(&context, &config.protocol_name);
        let mapping = port_mapping(&config);

        let port = Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            core: PortCore::new(config.port_guid, context, mapping),
            state: RwLock::new(OutputPortState {
                config,
                protocol,
                mapping,
                sender: None,
            }),
            signals: Mutex::new(SentSignals::default()),
        });

        port.update_registration();
        port
    }

    /// A copy of the port's config
    pub fn config(&self) -> OutputPortConfig {
        self.state.read().config.clone()
    }

    /// IPv4 address unicast signals are sent to, as configured
    pub fn destination_address(&self) -> String {
        self.state.read().config.destination_address.clone()
    }

    /// Priority signals are sent with
    pub fn priority(&self) -> Priority {
        self.state.read().config.priority()
    }

    /// The sender the port is assigned to, None while unregistered or for internal only ports
    pub fn sender(&self) -> Option<Arc<DmxSender>> {
        self.state.read().sender.clone()
    }

    /// Returns true if sent signals are handed to the network
    pub fn is_send_dmx_enabled(&self) -> bool {
        self.core.context.is_send_dmx_enabled()
    }

    /// Returns true if sent signals are also handed to the port's raw listeners.
    ///
    /// That is the case if the config asks for it, if the protocol receives its own output for the communication type, or
    /// if sending or receiving is disabled.
    pub fn is_loopback_to_engine(&self) -> bool {
        let context = &self.core.context;
        if !context.is_send_dmx_enabled() || !context.is_receive_dmx_enabled() {
            return true;
        }

        let state = self.state.read();
        state.config.loopback_to_engine
            || state.protocol.as_ref().is_some_and(|protocol| protocol.is_causing_loopback(state.config.communication_type))
    }

    /// Applies a new config. The port is only re-registered if the protocol, communication type, addresses or universe
    /// range changed.
    pub fn update_from_config(&self, mut config: OutputPortConfig) {
        if config.port_guid != self.core.port_guid {
            tracing::warn!(port = %config.port_name, guid = %config.port_guid, "Config GUID differs from port GUID, keeping the port GUID");
            config.port_guid = self.core.port_guid;
        }

        let mapping = port_mapping(&config);
        let (registration_changed, mapping_changed) = {
            let state = self.state.read();
            let mapping_changed = state.mapping != mapping;
            let registration_changed = mapping_changed
                || !state.config.protocol_name.eq_ignore_ascii_case(&config.protocol_name)
                || state.config.communication_type != config.communication_type
                || state.config.device_address.trim() != config.device_address.trim()
                || state.config.destination_address.trim() != config.destination_address.trim();
            (registration_changed, mapping_changed)
        };

        if registration_changed {
            self.unregister();
        }

        {
            let mut state = self.state.write();
            if !state.config.protocol_name.eq_ignore_ascii_case(&config.protocol_name) {
                state.protocol = resolve_protocol(&self.core.context, &config.protocol_name);
            }
            state.mapping = mapping;
            state.config = config;
        }
        self.core.update_offset(mapping);

        if mapping_changed {
            self.signals.lock().latest.clear();
        }

        self.update_registration();
    }

    /// Registers or unregisters the port as the runtime flags and the config demand. Returns true if the port is registered.
    pub fn update_registration(&self) -> bool {
        if self.core.context.is_send_dmx_enabled() {
            self.register()
        } else {
            self.unregister();
            false
        }
    }

    /// Sends channel values to a local universe. Channels are 1-based, channels not in `channels` keep their last value.
    ///
    /// # Errors
    /// UniverseNotInPortRange: The local universe does not belong to the port.
    ///
    /// Signal: A channel is outside 1..=512. Nothing is sent in that case.
    pub fn send_dmx(&self, local_universe: i32, channels: &HashMap<u16, u8>) -> DmxResult<()> {
        if !self.is_local_universe_in_port_range(local_universe) {
            return Err(Error::UniverseNotInPortRange {
                universe: local_universe,
                port: self.port_name(),
            });
        }

        if let Some(&channel) = channels.keys().find(|&&channel| !DmxSignal::is_valid_channel(channel)) {
            return Err(SignalError::ChannelOutOfRange(channel).into());
        }

        let extern_universe = self.convert_local_to_extern_universe_id(local_universe);
        let priority = self.priority();

        let signal = {
            let mut guard = self.signals.lock();
            let signals = &mut *guard;
            signals.sequence = signals.sequence.wrapping_add(1);

            let cached = signals
                .latest
                .entry(extern_universe)
                .or_insert_with(|| Arc::new(DmxSignal::new(extern_universe, priority)));

            // Clones the signal if a sender or listener still holds the previous one
            let signal = Arc::make_mut(cached);
            for (&channel, &value) in channels {
                signal.write_channel(channel, value)?;
            }
            signal.set_priority(priority);
            signal.stamp(signals.sequence);

            Arc::clone(cached)
        };

        if self.is_send_dmx_enabled() {
            if let Some(sender) = self.sender() {
                sender.send_dmx_signal(Arc::clone(&signal));
            }
        }

        if self.is_loopback_to_engine() {
            self.core.raw_listeners.push_all(&signal);
        }

        Ok(())
    }

    /// The latest signal sent to a local universe.
    ///
    /// Only returns a signal if the port loops back to the engine, unless `include_if_no_loopback` is set.
    pub fn game_thread_get_dmx_signal(&self, local_universe: i32, include_if_no_loopback: bool) -> Option<Arc<DmxSignal>> {
        if !include_if_no_loopback && !self.is_loopback_to_engine() {
            return None;
        }

        if !self.is_local_universe_in_port_range(local_universe) {
            return None;
        }

        let extern_universe = self.convert_local_to_extern_universe_id(local_universe);
        self.signals.lock().latest.get(&extern_universe).cloned()
    }

    /// Drops the cached signals and clears the queues of all raw listeners.
    pub fn clear_buffers(&self) {
        self.signals.lock().latest.clear();
        self.core.raw_listeners.clear_all();
    }

    /// Number of started raw listeners
    pub fn num_raw_listeners(&self) -> usize {
        self.core.raw_listeners.len()
    }
}

fn port_mapping(config: &OutputPortConfig) -> Option<UniverseMapping> {
    match config.universe_mapping() {
        Ok(mapping) => Some(mapping),
        Err(e) => {
            tracing::warn!(port = %config.port_name, error = %e, "Invalid universe range");
            None
        }
    }
}

impl DmxPort for OutputPort {
    fn port_guid(&self) -> PortGuid {
        self.core.port_guid
    }

    fn port_name(&self) -> String {
        self.state.read().config.port_name.clone()
    }

    fn protocol(&self) -> Option<Arc<dyn DmxProtocol>> {
        self.state.read().protocol.clone()
    }

    fn communication_type(&self) -> CommunicationType {
        self.state.read().config.communication_type
    }

    fn device_address(&self) -> String {
        self.state.read().config.device_address.clone()
    }

    fn universe_mapping(&self) -> Option<UniverseMapping> {
        self.state.read().mapping
    }

    fn supports_communication_type(&self, protocol: &dyn DmxProtocol) -> bool {
        protocol.output_communication_types().contains(&self.communication_type())
    }

    fn config_problem(&self) -> Option<String> {
        common_config_problem(self).or_else(|| {
            if self.communication_type() != CommunicationType::Unicast {
                return None;
            }
            parse_ipv4(&self.destination_address()).err().map(|e| format!("unicast destination: {e}"))
        })
    }

    fn is_registered(&self) -> bool {
        self.core.is_registered()
    }

    fn register(&self) -> bool {
        let _registration = self.core.registration.lock();
        if self.core.is_registered() {
            return true;
        }

        if !self.core.context.is_send_dmx_enabled() {
            tracing::debug!(port = %self.port_name(), "Sending DMX is disabled, output port stays unregistered");
            return false;
        }

        if let Some(problem) = self.config_problem() {
            tracing::warn!(port = %self.port_name(), problem = %problem, "Output port config is invalid, port is inactive");
            return false;
        }

        // Internal only ports loop back to the engine and never need a sender
        if self.communication_type() == CommunicationType::InternalOnly {
            self.core.set_registered(true);
            tracing::debug!(port = %self.port_name(), "Registered internal only output port");
            return true;
        }

        let (Some(port), Some(protocol)) = (self.weak_self.upgrade(), self.protocol()) else {
            return false;
        };

        let Some(sender) = protocol.register_output_port(&port) else {
            tracing::warn!(port = %self.port_name(), protocol = protocol.name(), "Failed to register output port");
            return false;
        };

        self.state.write().sender = Some(sender);
        self.core.set_registered(true);
        tracing::debug!(port = %self.port_name(), protocol = protocol.name(), "Registered output port");
        true
    }

    fn unregister(&self) {
        let _registration = self.core.registration.lock();
        if !self.core.is_registered() {
            return;
        }

        let sender = self.state.write().sender.take();
        if sender.is_some() {
            if let Some(protocol) = self.protocol() {
                protocol.unregister_output_port(self);
            }
        }

        self.core.set_registered(false);
        tracing::debug!(port = %self.port_name(), "Unregistered output port");
    }

    fn extern_universe_offset_handle(&self) -> Arc<AtomicI32> {
        Arc::clone(&self.core.extern_universe_offset)
    }

    fn add_raw_listener(&self, id: RawListenerId, producer: SignalProducer) {
        self.core.raw_listeners.add(id, producer);
    }

    fn remove_raw_listener(&self, id: RawListenerId) -> Option<SignalProducer> {
        self.core.raw_listeners.remove(id)
    }
}

impl Drop for OutputPort {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("OutputPort")
            .field("guid", &self.core.port_guid)
            .field("name", &state.config.port_name)
            .field("protocol", &state.config.protocol_name)
            .field("communication_type", &state.config.communication_type)
            .field("mapping", &state.mapping)
            .field("registered", &self.core.is_registered())
            .field("offset", &self.core.extern_universe_offset.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod test_output_port {
    use super::*;
    use crate::{
        context::RuntimeFlags,
        protocol::{
            ProtocolRegistry,
            test_protocol::{TEST_PROTOCOL_NAME, TestProtocol},
        },
        raw_listener::RawListener,
    };

    fn context(send_dmx_enabled: bool, receive_dmx_enabled: bool) -> Arc<PortContext> {
        PortContext::new(
            ProtocolRegistry::new().with_protocol(Arc::new(TestProtocol::default())),
            RuntimeFlags::new(send_dmx_enabled, receive_dmx_enabled),
        )
    }

    fn internal_config() -> OutputPortConfig {
        OutputPortConfig {
            port_name: "Internal".to_owned(),
            protocol_name: TEST_PROTOCOL_NAME.to_owned(),
            communication_type: CommunicationType::InternalOnly,
            device_address: "127.0.0.1".to_owned(),
            local_universe_start: 1,
            num_universes: 2,
            extern_universe_start: 10,
            ..Default::default()
        }
    }

    fn unicast_config() -> OutputPortConfig {
        OutputPortConfig {
            port_name: "Unicast".to_owned(),
            communication_type: CommunicationType::Unicast,
            destination_address: "127.0.0.2".to_owned(),
            ..internal_config()
        }
    }

    fn channels(values: &[(u16, u8)]) -> HashMap<u16, u8> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_internal_only_registers_without_sender() {
        let port = OutputPort::create_from_config(internal_config(), context(true, true));
        assert!(port.is_registered());
        assert!(port.sender().is_none());
        assert!(port.is_loopback_to_engine());
    }

    #[test]
    fn test_partial_sends_are_merged() {
        let port = OutputPort::create_from_config(internal_config(), context(true, true));

        port.send_dmx(1, &channels(&[(1, 10)])).unwrap();
        port.send_dmx(1, &channels(&[(2, 20)])).unwrap();

        let signal = port.game_thread_get_dmx_signal(1, false).unwrap();
        assert_eq!(signal.extern_universe_id(), 10);
        assert_eq!(signal.read_channel(1), Some(10));
        assert_eq!(signal.read_channel(2), Some(20));
        assert_eq!(signal.read_channel(3), Some(0));
        assert_eq!(signal.sequence(), 2);
        assert!(port.game_thread_get_dmx_signal(2, false).is_none());
    }

    #[test]
    fn test_sent_signals_are_copied_on_write() {
        let port = OutputPort::create_from_config(internal_config(), context(true, true));

        port.send_dmx(2, &channels(&[(512, 1)])).unwrap();
        let first = port.game_thread_get_dmx_signal(2, false).unwrap();
        port.send_dmx(2, &channels(&[(512, 2)])).unwrap();

        assert_eq!(first.read_channel(512), Some(1));
        assert_eq!(port.game_thread_get_dmx_signal(2, false).unwrap().read_channel(512), Some(2));
    }

    #[test]
    fn test_invalid_sends_change_nothing() {
        let port = OutputPort::create_from_config(internal_config(), context(true, true));
        port.send_dmx(1, &channels(&[(1, 10)])).unwrap();

        assert!(matches!(port.send_dmx(3, &channels(&[(1, 1)])), Err(Error::UniverseNotInPortRange { universe: 3, .. })));
        assert!(matches!(
            port.send_dmx(1, &channels(&[(1, 99), (513, 1)])),
            Err(Error::Signal(SignalError::ChannelOutOfRange(513)))
        ));
        assert!(port.send_dmx(1, &channels(&[(0, 1)])).is_err());

        let signal = port.game_thread_get_dmx_signal(1, false).unwrap();
        assert_eq!(signal.read_channel(1), Some(10));
        assert_eq!(signal.sequence(), 1);
    }

    #[test]
    fn test_loopback_feeds_raw_listeners() {
        let port = OutputPort::create_from_config(internal_config(), context(true, true));
        let mut listener = RawListener::new(&port);
        listener.start();

        port.send_dmx(2, &channels(&[(5, 50)])).unwrap();

        let (local_universe, signal) = listener.dequeue_signal().unwrap();
        assert_eq!(local_universe, 2);
        assert_eq!(signal.extern_universe_id(), 11);
        assert_eq!(signal.read_channel(5), Some(50));
    }

    #[test]
    fn test_loopback_rules() {
        // The test protocol only loops back internal only ports and never hands out senders
        let port = OutputPort::create_from_config(unicast_config(), context(true, true));
        assert!(port.is_valid_port_slow());
        assert!(!port.is_registered());
        assert!(!port.is_loopback_to_engine());

        port.send_dmx(1, &channels(&[(1, 1)])).unwrap();
        assert!(port.game_thread_get_dmx_signal(1, false).is_none());
        assert!(port.game_thread_get_dmx_signal(1, true).is_some());

        port.update_from_config(OutputPortConfig {
            loopback_to_engine: true,
            ..port.config()
        });
        assert!(port.is_loopback_to_engine());

        let send_disabled = OutputPort::create_from_config(unicast_config(), context(false, true));
        assert!(send_disabled.is_loopback_to_engine());

        let receive_disabled = OutputPort::create_from_config(unicast_config(), context(true, false));
        assert!(receive_disabled.is_loopback_to_engine());
    }

    #[test]
    fn test_unicast_requires_destination() {
        let port = OutputPort::create_from_config(
            OutputPortConfig {
                destination_address: String::new(),
                ..unicast_config()
            },
            context(true, true),
        );

        assert!(!port.is_valid_port_slow());
        assert!(port.config_problem().unwrap().contains("destination"));
    }
}
