// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Ports receiving DMX from the network.
//!
//! The receiver thread is the only producer of an input port. Every accepted signal goes to the port's raw listeners and to
//! its tick queue. [InputPort::tick] drains the tick queue into a map holding the latest signal per universe, readers get an
//! immutable snapshot of that map so they never race the tick.

use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicI32, AtomicU8, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use dmx_core::{
    communication_type::CommunicationType,
    priority::{Priority, PriorityStrategy},
    signal::DmxSignal,
    universe::UniverseMapping,
};
use parking_lot::{Mutex, RwLock};

use super::{DmxPort, PortCore, resolve_protocol};
use crate::{
    config::InputPortConfig,
    context::PortContext,
    guid::PortGuid,
    protocol::DmxProtocol,
    raw_listener::RawListenerId,
    spsc::{SignalConsumer, SignalProducer, signal_queue},
};

/// Latest signal per extern universe
pub type SignalMap = HashMap<i32, Arc<DmxSignal>>;

struct InputPortState {
    config: InputPortConfig,
    protocol: Option<Arc<dyn DmxProtocol>>,
    mapping: Option<UniverseMapping>,
}

/// A port receiving DMX.
pub struct InputPort {
    weak_self: Weak<InputPort>,
    core: PortCore,
    state: RwLock<InputPortState>,
    tick_producer: Mutex<SignalProducer>,
    tick_consumer: Mutex<SignalConsumer>,
    latest_signals: ArcSwap<SignalMap>,
    lowest_seen_priority: AtomicU8,
    highest_seen_priority: AtomicU8,
}

impl InputPort {
    /// Creates the port and registers it if the config and the runtime flags allow it.
    pub fn create_from_config(config: InputPortConfig, context: Arc<PortContext>) -> Arc<Self> {
        let protocol = resolve_protocol(&context, &config.protocol_name);
        let mapping = port_mapping(&config);
        let (tick_producer, tick_consumer) = signal_queue();

        let port = Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            core: PortCore::new(config.port_guid, context, mapping),
            state: RwLock::new(InputPortState { config, protocol, mapping }),
            tick_producer: Mutex::new(tick_producer),
            tick_consumer: Mutex::new(tick_consumer),
            latest_signals: ArcSwap::from_pointee(SignalMap::new()),
            lowest_seen_priority: AtomicU8::new(Priority::MAX_RAW),
            highest_seen_priority: AtomicU8::new(Priority::MIN_RAW),
        });

        port.update_registration();
        port
    }

    /// A copy of the port's config
    pub fn config(&self) -> InputPortConfig {
        self.state.read().config.clone()
    }

    /// How inbound signals are filtered by priority
    pub fn priority_strategy(&self) -> PriorityStrategy {
        self.state.read().config.priority_strategy
    }

    /// Priority the strategy compares against
    pub fn priority(&self) -> Priority {
        self.state.read().config.priority()
    }

    /// Applies a new config. The port is only re-registered if the protocol, communication type, device address or universe
    /// range changed, a rename causes no network traffic.
    pub fn update_from_config(&self, mut config: InputPortConfig) {
        if config.port_guid != self.core.port_guid {
            tracing::warn!(port = %config.port_name, guid = %config.port_guid, "Config GUID differs from port GUID, keeping the port GUID");
            config.port_guid = self.core.port_guid;
        }

        let mapping = port_mapping(&config);
        let registration_changed = {
            let state = self.state.read();
            !state.config.protocol_name.eq_ignore_ascii_case(&config.protocol_name)
                || state.config.communication_type != config.communication_type
                || state.config.device_address.trim() != config.device_address.trim()
                || state.mapping != mapping
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

        self.update_registration();
    }

    /// Registers or unregisters the port as the runtime flags and the config demand. Returns true if the port is registered.
    pub fn update_registration(&self) -> bool {
        if self.core.context.is_receive_dmx_enabled() {
            self.register()
        } else {
            self.unregister();
            false
        }
    }

    /// Hands a received signal to the port. Called by the port's receiver only.
    pub(crate) fn single_producer_input_dmx_signal(&self, signal: Arc<DmxSignal>) {
        if !self.accepts_priority(signal.priority()) {
            tracing::trace!(universe = signal.extern_universe_id(), priority = %signal.priority(), "Filtered signal by priority");
            return;
        }

        self.core.raw_listeners.push_all(&signal);
        self.tick_producer.lock().push(signal);
    }

    fn accepts_priority(&self, received: Priority) -> bool {
        let (strategy, port_priority) = {
            let state = self.state.read();
            (state.config.priority_strategy, state.config.priority())
        };

        if strategy == PriorityStrategy::None {
            return true;
        }

        let raw = received.get();
        let lowest = self.lowest_seen_priority.fetch_min(raw, Ordering::AcqRel).min(raw);
        let highest = self.highest_seen_priority.fetch_max(raw, Ordering::AcqRel).max(raw);

        strategy.accepts(port_priority, received, Priority::clamped(lowest), Priority::clamped(highest))
    }

    /// Moves every queued signal into the latest signal map. Call once per frame.
    pub fn tick(&self, _delta_time: Duration) {
        let mut consumer = self.tick_consumer.lock();
        if consumer.is_empty() {
            return;
        }

        let mut latest = SignalMap::clone(&self.latest_signals.load());
        while let Some(signal) = consumer.pop() {
            latest.insert(signal.extern_universe_id(), signal);
        }
        self.latest_signals.store(Arc::new(latest));
    }

    /// The latest signal of a local universe as of the last [InputPort::tick]
    pub fn game_thread_get_dmx_signal(&self, local_universe: i32) -> Option<Arc<DmxSignal>> {
        if !self.is_local_universe_in_port_range(local_universe) {
            return None;
        }

        let extern_universe = self.convert_local_to_extern_universe_id(local_universe);
        self.latest_signals.load().get(&extern_universe).cloned()
    }

    /// Snapshot of the latest signals as of the last [InputPort::tick], keyed by extern universe
    pub fn game_thread_get_all_dmx_signals(&self) -> Arc<SignalMap> {
        self.latest_signals.load_full()
    }

    /// Drops queued and latest signals and clears the queues of all raw listeners.
    pub fn clear_buffers(&self) {
        self.tick_consumer.lock().clear();
        self.latest_signals.store(Arc::new(SignalMap::new()));
        self.core.raw_listeners.clear_all();

        self.lowest_seen_priority.store(Priority::MAX_RAW, Ordering::Release);
        self.highest_seen_priority.store(Priority::MIN_RAW, Ordering::Release);
    }

    /// Number of started raw listeners
    pub fn num_raw_listeners(&self) -> usize {
        self.core.raw_listeners.len()
    }
}

fn port_mapping(config: &InputPortConfig) -> Option<UniverseMapping> {
    match config.universe_mapping() {
        Ok(mapping) => Some(mapping),
        Err(e) => {
            tracing::warn!(port = %config.port_name, error = %e, "Invalid universe range");
            None
        }
    }
}

impl DmxPort for InputPort {
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
        protocol.input_communication_types().contains(&self.communication_type())
    }

    fn is_registered(&self) -> bool {
        self.core.is_registered()
    }

    fn register(&self) -> bool {
        let _registration = self.core.registration.lock();
        if self.core.is_registered() {
            return true;
        }

        if !self.core.context.is_receive_dmx_enabled() {
            tracing::debug!(port = %self.port_name(), "Receiving DMX is disabled, input port stays unregistered");
            return false;
        }

        if let Some(problem) = self.config_problem() {
            tracing::warn!(port = %self.port_name(), problem = %problem, "Input port config is invalid, port is inactive");
            return false;
        }

        let (Some(port), Some(protocol)) = (self.weak_self.upgrade(), self.protocol()) else {
            return false;
        };

        if !protocol.register_input_port(&port) {
            tracing::warn!(port = %self.port_name(), protocol = protocol.name(), "Failed to register input port");
            return false;
        }

        self.core.set_registered(true);
        tracing::debug!(port = %self.port_name(), protocol = protocol.name(), "Registered input port");
        true
    }

    fn unregister(&self) {
        let _registration = self.core.registration.lock();
        if !self.core.is_registered() {
            return;
        }

        if let Some(protocol) = self.protocol() {
            protocol.unregister_input_port(self);
        }

        self.core.set_registered(false);
        tracing::debug!(port = %self.port_name(), "Unregistered input port");
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

impl Drop for InputPort {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for InputPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InputPort")
            .field("guid", &self.core.port_guid)
            .field("name", &state.config.port_name)
            .field("protocol", &state.config.protocol_name)
            .field("communication_type", &state.config.communication_type)
            .field("mapping", &state.mapping)
            .field("registered", &self.core.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod test_input_port {
    use super::*;
    use crate::{
        context::RuntimeFlags,
        protocol::{
            ProtocolRegistry,
            test_protocol::{TEST_PROTOCOL_NAME, TestProtocol},
        },
        raw_listener::RawListener,
    };
    use proptest::prelude::*;

    fn context(protocol: &Arc<TestProtocol>, receive_dmx_enabled: bool) -> Arc<PortContext> {
        let protocol: Arc<dyn DmxProtocol> = protocol.clone();
        PortContext::new(ProtocolRegistry::new().with_protocol(protocol), RuntimeFlags::new(true, receive_dmx_enabled))
    }

    fn config() -> InputPortConfig {
        InputPortConfig {
            port_name: "Stage".to_owned(),
            protocol_name: TEST_PROTOCOL_NAME.to_owned(),
            communication_type: CommunicationType::Unicast,
            device_address: "127.0.0.1".to_owned(),
            local_universe_start: 1,
            num_universes: 4,
            extern_universe_start: 100,
            ..Default::default()
        }
    }

    fn signal(extern_universe: i32, first_channel: u8, sequence: u32) -> Arc<DmxSignal> {
        Arc::new(DmxSignal::from_slice(extern_universe, &[first_channel], sequence, Priority::DEFAULT).unwrap())
    }

    fn prioritized(extern_universe: i32, priority: u8) -> Arc<DmxSignal> {
        Arc::new(DmxSignal::new(extern_universe, Priority::new(priority).unwrap()))
    }

    #[test]
    fn test_registers_with_valid_config() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(config(), context(&protocol, true));

        assert!(port.is_valid_port_slow());
        assert!(port.is_registered());
        assert_eq!(protocol.registered_inputs(), vec![port.port_guid()]);

        port.unregister();
        port.unregister();
        assert!(!port.is_registered());
        assert!(protocol.registered_inputs().is_empty());
    }

    #[test]
    fn test_invalid_config_leaves_port_inert() {
        let protocol = Arc::new(TestProtocol::default());
        let context = context(&protocol, true);

        let bad_address = InputPort::create_from_config(
            InputPortConfig {
                device_address: "not an address".to_owned(),
                ..config()
            },
            Arc::clone(&context),
        );
        assert!(!bad_address.is_valid_port_slow());
        assert!(!bad_address.is_registered());

        let out_of_bounds = InputPort::create_from_config(
            InputPortConfig {
                extern_universe_start: 63998,
                ..config()
            },
            context,
        );
        assert!(!out_of_bounds.is_valid_port_slow());
        assert!(!out_of_bounds.register());
        assert!(protocol.registered_inputs().is_empty());
    }

    #[test]
    fn test_receive_disabled_keeps_port_unregistered() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(config(), context(&protocol, false));

        assert!(port.is_valid_port_slow());
        assert!(!port.is_registered());
    }

    #[test]
    fn test_universe_conversion() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(config(), context(&protocol, true));

        assert_eq!(port.convert_local_to_extern_universe_id(2), 101);
        assert_eq!(port.convert_extern_to_local_universe_id(103), 4);
        assert!(!port.is_local_universe_in_port_range(5));
        assert!(port.is_extern_universe_in_port_range(103));
        assert!(!port.is_extern_universe_in_port_range(104));
    }

    #[test]
    fn test_tick_keeps_latest_signal_per_universe() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(config(), context(&protocol, true));

        port.single_producer_input_dmx_signal(signal(101, 1, 1));
        port.single_producer_input_dmx_signal(signal(100, 9, 1));
        port.single_producer_input_dmx_signal(signal(101, 2, 2));
        port.single_producer_input_dmx_signal(signal(101, 3, 3));

        assert!(port.game_thread_get_dmx_signal(2).is_none());
        port.tick(Duration::from_millis(16));

        let latest = port.game_thread_get_dmx_signal(2).unwrap();
        assert_eq!(latest.read_channel(1), Some(3));
        assert_eq!(latest.sequence(), 3);
        assert_eq!(port.game_thread_get_dmx_signal(1).unwrap().read_channel(1), Some(9));
        assert!(port.game_thread_get_dmx_signal(3).is_none());
        assert!(port.game_thread_get_dmx_signal(5).is_none());
        assert_eq!(port.game_thread_get_all_dmx_signals().len(), 2);

        // A snapshot taken before the next tick is unaffected by it
        let snapshot = port.game_thread_get_all_dmx_signals();
        port.single_producer_input_dmx_signal(signal(101, 4, 4));
        port.tick(Duration::from_millis(16));
        assert_eq!(snapshot[&101].read_channel(1), Some(3));
        assert_eq!(port.game_thread_get_dmx_signal(2).unwrap().read_channel(1), Some(4));
    }

    #[test]
    fn test_raw_listener_receives_every_signal_in_order() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(config(), context(&protocol, true));

        let mut listener = RawListener::new(&port);
        port.single_producer_input_dmx_signal(signal(100, 0, 0));
        listener.start();
        assert_eq!(port.num_raw_listeners(), 1);

        for sequence in 1..=50 {
            port.single_producer_input_dmx_signal(signal(100 + (sequence as i32 % 4), 0, sequence));
        }

        for sequence in 1..=50 {
            let (local_universe, signal) = listener.dequeue_signal().unwrap();
            assert_eq!(signal.sequence(), sequence);
            assert_eq!(local_universe, 1 + (sequence as i32 % 4));
        }
        assert!(listener.dequeue_signal().is_none());

        listener.stop();
        assert_eq!(port.num_raw_listeners(), 0);
        port.single_producer_input_dmx_signal(signal(100, 0, 51));
        assert!(listener.is_empty());
    }

    #[test]
    fn test_listener_follows_offset_changes() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(config(), context(&protocol, true));
        let mut listener = RawListener::new(&port);
        listener.start();

        port.update_from_config(InputPortConfig {
            extern_universe_start: 200,
            ..port.config()
        });
        port.single_producer_input_dmx_signal(signal(201, 0, 1));

        assert_eq!(listener.dequeue_signal().unwrap().0, 2);
    }

    #[test]
    fn test_clear_buffers_empties_everything() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(config(), context(&protocol, true));
        let mut listener = RawListener::new(&port);
        listener.start();

        port.single_producer_input_dmx_signal(signal(100, 1, 1));
        port.tick(Duration::ZERO);
        port.single_producer_input_dmx_signal(signal(101, 1, 2));
        assert_eq!(listener.len(), 2);

        port.clear_buffers();
        assert!(listener.is_empty());
        for local_universe in 1..=4 {
            assert!(port.game_thread_get_dmx_signal(local_universe).is_none());
        }

        port.tick(Duration::ZERO);
        assert!(port.game_thread_get_all_dmx_signals().is_empty());
    }

    #[test]
    fn test_highest_priority_strategy() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(
            InputPortConfig {
                priority_strategy: PriorityStrategy::Highest,
                ..config()
            },
            context(&protocol, true),
        );
        let mut listener = RawListener::new(&port);
        listener.start();

        port.single_producer_input_dmx_signal(prioritized(100, 100));
        port.single_producer_input_dmx_signal(prioritized(100, 50));
        port.single_producer_input_dmx_signal(prioritized(100, 150));
        port.single_producer_input_dmx_signal(prioritized(100, 100));

        let accepted: Vec<u8> = std::iter::from_fn(|| listener.dequeue_signal()).map(|(_, signal)| signal.priority().get()).collect();
        assert_eq!(accepted, vec![100, 150]);

        port.clear_buffers();
        port.single_producer_input_dmx_signal(prioritized(100, 100));
        assert_eq!(listener.len(), 1);
    }

    #[test]
    fn test_equal_priority_strategy() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(
            InputPortConfig {
                priority_strategy: PriorityStrategy::Equal,
                priority: 120,
                ..config()
            },
            context(&protocol, true),
        );
        let mut listener = RawListener::new(&port);
        listener.start();

        port.single_producer_input_dmx_signal(prioritized(100, 100));
        port.single_producer_input_dmx_signal(prioritized(100, 120));

        assert_eq!(listener.len(), 1);
        assert_eq!(listener.dequeue_signal().unwrap().1.priority().get(), 120);
    }

    #[test]
    fn test_rename_does_not_reregister() {
        let protocol = Arc::new(TestProtocol::default());
        let port = InputPort::create_from_config(config(), context(&protocol, true));

        port.update_from_config(InputPortConfig {
            port_name: "Renamed".to_owned(),
            ..port.config()
        });
        assert_eq!(port.port_name(), "Renamed");
        assert!(port.is_registered());
        assert_eq!(protocol.registered_inputs(), vec![port.port_guid()]);

        port.update_from_config(InputPortConfig {
            device_address: "bogus".to_owned(),
            ..port.config()
        });
        assert!(!port.is_registered());
        assert!(protocol.registered_inputs().is_empty());
    }

    proptest! {
        #[test]
        fn test_remapped_port_reports_local_universes(extern_start in 1i32..=63_996, pick in 0i32..4, value in any::<u8>()) {
            let protocol = Arc::new(TestProtocol::default());
            let port = InputPort::create_from_config(config(), context(&protocol, true));
            let mut listener = RawListener::new(&port);
            listener.start();

            port.update_from_config(InputPortConfig {
                extern_universe_start: extern_start,
                ..port.config()
            });
            prop_assert!(port.is_registered());

            port.single_producer_input_dmx_signal(signal(extern_start + pick, value, 1));
            port.tick(Duration::ZERO);

            let (local_universe, received) = listener.dequeue_signal().unwrap();
            prop_assert_eq!(local_universe, 1 + pick);
            prop_assert_eq!(local_universe, port.convert_extern_to_local_universe_id(extern_start + pick));
            prop_assert_eq!(port.convert_local_to_extern_universe_id(local_universe), extern_start + pick);
            prop_assert_eq!(port.game_thread_get_dmx_signal(local_universe).unwrap().read_channel(1), Some(value));
            prop_assert_eq!(received.read_channel(1), Some(value));
        }
    }
}
