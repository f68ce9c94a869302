// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Single producer, single consumer signal queue.
//!
//! Neither handle is `Clone` and both take `&mut self`, so a queue has exactly one writer and one reader. Handles can be
//! moved to the thread that uses them.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use dmx_core::signal::DmxSignal;

/// Creates an unbounded queue and returns its two ends.
pub fn signal_queue() -> (SignalProducer, SignalConsumer) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    let producer = SignalProducer {
        sender,
        drain: receiver.clone(),
    };
    (producer, SignalConsumer { receiver })
}

/// Writing end of a signal queue.
#[derive(Debug)]
pub struct SignalProducer {
    sender: Sender<Arc<DmxSignal>>,
    /// Only used to empty the queue
    drain: Receiver<Arc<DmxSignal>>,
}

impl SignalProducer {
    /// Appends a signal
    pub fn push(&mut self, signal: Arc<DmxSignal>) {
        // The producer keeps the channel connected, sending cannot fail
        let _ = self.sender.send(signal);
    }

    /// Drops every queued signal
    pub fn clear(&mut self) {
        while self.drain.try_recv().is_ok() {}
    }

    /// Number of queued signals
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Returns true if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Reading end of a signal queue.
#[derive(Debug)]
pub struct SignalConsumer {
    receiver: Receiver<Arc<DmxSignal>>,
}

impl SignalConsumer {
    /// Takes the oldest signal, never blocks
    pub fn pop(&mut self) -> Option<Arc<DmxSignal>> {
        self.receiver.try_recv().ok()
    }

    /// Drops every queued signal
    pub fn clear(&mut self) {
        while self.receiver.try_recv().is_ok() {}
    }

    /// Number of queued signals
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod test_spsc {
    use std::thread;

    use dmx_core::priority::Priority;

    use super::*;

    fn signal(universe: i32) -> Arc<DmxSignal> {
        Arc::new(DmxSignal::new(universe, Priority::DEFAULT))
    }

    #[test]
    fn test_fifo_across_threads() {
        let (mut producer, mut consumer) = signal_queue();

        let writer = thread::spawn(move || {
            for universe in 1..=100 {
                producer.push(signal(universe));
            }
            producer
        });
        let producer = writer.join().unwrap();

        assert_eq!(producer.len(), 100);
        for universe in 1..=100 {
            assert_eq!(consumer.pop().unwrap().extern_universe_id(), universe);
        }
        assert!(consumer.pop().is_none());
    }

    #[test]
    fn test_producer_clears_queue() {
        let (mut producer, consumer) = signal_queue();
        producer.push(signal(1));
        producer.push(signal(2));

        producer.clear();
        assert!(consumer.is_empty());
        assert!(producer.is_empty());
    }
}
