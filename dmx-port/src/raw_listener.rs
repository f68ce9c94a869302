// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Lossless access to every signal a port sees.
//!
//! Where [InputPort::tick](crate::port::input::InputPort::tick) keeps only the latest signal per universe, a [RawListener]
//! queues every signal of its port in arrival order. Listeners hold their port weakly.
//!
//! ```no_run
//! use dmx_port::{config::ProtocolSettings, port_manager::PortManager, protocol::ProtocolRegistry, raw_listener::RawListener};
//!
//! let manager = PortManager::startup(ProtocolSettings::default(), ProtocolRegistry::with_default_protocols());
//! for port in manager.input_ports() {
//!     let mut listener = RawListener::new(port);
//!     listener.start();
//!
//!     while let Some((local_universe, signal)) = listener.dequeue_signal() {
//!         println!("{local_universe}: {signal:?}");
//!     }
//!
//!     listener.stop();
//! }
//! ```

use std::sync::{
    Arc, Weak,
    atomic::{AtomicI32, AtomicU64, Ordering},
};

use dmx_core::signal::DmxSignal;
use parking_lot::Mutex;

use crate::{
    guid::PortGuid,
    port::DmxPort,
    spsc::{SignalConsumer, SignalProducer, signal_queue},
};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a listener within its port
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RawListenerId(u64);

impl RawListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Queues every signal of one port until it is dequeued.
///
/// A listener receives nothing until [RawListener::start] and stops receiving once [RawListener::stop] returns. Dropping a
/// started listener stops it.
pub struct RawListener {
    id: RawListenerId,
    port: Weak<dyn DmxPort>,
    port_guid: PortGuid,
    extern_universe_offset: Arc<AtomicI32>,
    consumer: SignalConsumer,
    /// Held while stopped, owned by the port while started
    producer: Option<SignalProducer>,
}

impl RawListener {
    /// Creates a stopped listener for `port`
    pub fn new<P: DmxPort + 'static>(port: &Arc<P>) -> Self {
        let (producer, consumer) = signal_queue();
        let weak: Weak<dyn DmxPort> = Arc::downgrade(port) as Weak<dyn DmxPort>;

        Self {
            id: RawListenerId::next(),
            port: weak,
            port_guid: port.port_guid(),
            extern_universe_offset: port.extern_universe_offset_handle(),
            consumer,
            producer: Some(producer),
        }
    }

    /// Attaches the listener to its port. Does nothing if started already or the port is gone.
    pub fn start(&mut self) {
        let Some(port) = self.port.upgrade() else {
            tracing::debug!(port = %self.port_guid, "Cannot start raw listener, port is gone");
            return;
        };

        if let Some(producer) = self.producer.take() {
            port.add_raw_listener(self.id, producer);
        }
    }

    /// Detaches the listener. When this returns the port no longer queues signals for it.
    pub fn stop(&mut self) {
        if self.producer.is_some() {
            return;
        }

        match self.port.upgrade().and_then(|port| port.remove_raw_listener(self.id)) {
            Some(producer) => self.producer = Some(producer),
            // The port went away with the producer, a fresh queue keeps the listener restartable
            None => {
                let (producer, consumer) = signal_queue();
                self.producer = Some(producer);
                self.consumer = consumer;
            }
        }
    }

    /// Returns true between [RawListener::start] and [RawListener::stop]
    pub fn is_started(&self) -> bool {
        self.producer.is_none()
    }

    /// Takes the oldest queued signal and the local universe it belongs to
    pub fn dequeue_signal(&mut self) -> Option<(i32, Arc<DmxSignal>)> {
        let signal = self.consumer.pop()?;
        let local_universe = signal.extern_universe_id().wrapping_sub(self.extern_universe_offset.load(Ordering::Acquire));
        Some((local_universe, signal))
    }

    /// Drops every queued signal
    pub fn clear(&mut self) {
        self.consumer.clear();
    }

    /// Number of queued signals
    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    /// Returns true if no signal is queued
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// The port the listener was created for, None if the port is gone
    pub fn owner(&self) -> Option<Arc<dyn DmxPort>> {
        self.port.upgrade()
    }

    /// GUID of the port the listener was created for
    pub fn port_guid(&self) -> PortGuid {
        self.port_guid
    }

    /// Identity of the listener within its port
    pub fn id(&self) -> RawListenerId {
        self.id
    }
}

impl Drop for RawListener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RawListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawListener")
            .field("id", &self.id)
            .field("port", &self.port_guid)
            .field("started", &self.is_started())
            .field("queued", &self.len())
            .finish()
    }
}

struct AttachedListener {
    id: RawListenerId,
    producer: SignalProducer,
}

/// The listeners attached to one port.
#[derive(Default)]
pub(crate) struct RawListenerSet {
    listeners: Mutex<Vec<AttachedListener>>,
}

impl RawListenerSet {
    pub(crate) fn add(&self, id: RawListenerId, producer: SignalProducer) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|listener| listener.id != id);
        listeners.push(AttachedListener { id, producer });
    }

    pub(crate) fn remove(&self, id: RawListenerId) -> Option<SignalProducer> {
        let mut listeners = self.listeners.lock();
        let index = listeners.iter().position(|listener| listener.id == id)?;
        Some(listeners.swap_remove(index).producer)
    }

    pub(crate) fn push_all(&self, signal: &Arc<DmxSignal>) {
        for listener in self.listeners.lock().iter_mut() {
            listener.producer.push(Arc::clone(signal));
        }
    }

    pub(crate) fn clear_all(&self) {
        for listener in self.listeners.lock().iter_mut() {
            listener.producer.clear();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl std::fmt::Debug for RawListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawListenerSet").field("listeners", &self.len()).finish()
    }
}

#[cfg(test)]
mod test_raw_listener_set {
    use dmx_core::priority::Priority;

    use super::*;

    #[test]
    fn test_removed_listener_receives_nothing() {
        let set = RawListenerSet::default();
        let (first_producer, mut first) = signal_queue();
        let (second_producer, mut second) = signal_queue();
        let first_id = RawListenerId::next();
        let second_id = RawListenerId::next();

        set.add(first_id, first_producer);
        set.add(second_id, second_producer);
        set.push_all(&Arc::new(DmxSignal::new(1, Priority::DEFAULT)));

        assert!(set.remove(first_id).is_some());
        assert!(set.remove(first_id).is_none());
        set.push_all(&Arc::new(DmxSignal::new(2, Priority::DEFAULT)));

        assert_eq!(first.len(), 1);
        assert_eq!(first.pop().unwrap().extern_universe_id(), 1);
        assert_eq!(second.len(), 2);

        set.clear_all();
        assert!(second.is_empty());
    }
}
