// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DMX port I/O over sACN (ANSI E1.31-2018) and Art-Net.
//!
//! An application addresses DMX through ports. A port maps a range of local universes onto a range of extern universes
//! on the wire and is registered with one protocol. Input ports collect the signals the protocol receives, output ports
//! hand the application's channel values to the protocol. Ports that share a network endpoint share one sender or
//! receiver thread.
//!
//! The [PortManager](port_manager::PortManager) owns every port and is created from
//! [ProtocolSettings](config::ProtocolSettings). Signals are read on the application thread, either as the latest signal
//! per universe after [PortManager::tick](port_manager::PortManager::tick) or in arrival order through a
//! [RawListener](raw_listener::RawListener).
//!
//! Installation instructions are detailed within the README file.
//!
//! # Examples
//!
//! Sending to an output port that only loops back to the application and reading the signal through a raw listener.
//! ```
//! use std::collections::HashMap;
//!
//! use dmx_port::communication_type::CommunicationType;
//! use dmx_port::config::{OutputPortConfig, ProtocolSettings};
//! use dmx_port::port_manager::PortManager;
//! use dmx_port::protocol::ProtocolRegistry;
//! use dmx_port::raw_listener::RawListener;
//!
//! let settings = ProtocolSettings {
//!     output_port_configs: vec![OutputPortConfig {
//!         port_name: "Preview".to_owned(),
//!         communication_type: CommunicationType::InternalOnly,
//!         local_universe_start: 1,
//!         num_universes: 2,
//!         extern_universe_start: 10,
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! let manager = PortManager::startup(settings, ProtocolRegistry::with_default_protocols());
//! let port = &manager.output_ports()[0];
//!
//! let mut listener = RawListener::new(port);
//! listener.start();
//!
//! // Channels are 1-based, channels not given keep their last value.
//! port.send_dmx(2, &HashMap::from([(1, 255), (512, 128)])).unwrap();
//!
//! let (local_universe, signal) = listener.dequeue_signal().unwrap();
//! assert_eq!(local_universe, 2);
//! assert_eq!(signal.extern_universe_id(), 11);
//! assert_eq!(signal.read_channel(512), Some(128));
//!
//! manager.shutdown();
//! ```
//!
//! Receiving sACN multicast on the loopback interface and polling the latest signals once per frame.
//! ```no_run
//! use std::time::Duration;
//!
//! use dmx_port::communication_type::CommunicationType;
//! use dmx_port::config::{InputPortConfig, ProtocolSettings};
//! use dmx_port::port_manager::PortManager;
//! use dmx_port::protocol::ProtocolRegistry;
//!
//! let settings = ProtocolSettings {
//!     input_port_configs: vec![InputPortConfig {
//!         port_name: "Stage".to_owned(),
//!         protocol_name: "sACN".to_owned(),
//!         communication_type: CommunicationType::Multicast,
//!         device_address: "127.0.0.1".to_owned(),
//!         num_universes: 4,
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! let manager = PortManager::startup(settings, ProtocolRegistry::with_default_protocols());
//!
//! loop {
//!     manager.tick(Duration::from_millis(16));
//!
//!     for (extern_universe, signal) in manager.input_ports()[0].game_thread_get_all_dmx_signals().iter() {
//!         println!("{extern_universe}: {:?}", &signal.channel_data()[..8]);
//!     }
//!
//!     std::thread::sleep(Duration::from_millis(16));
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/dmx-port/")]
#![warn(missing_docs)]

pub use dmx_core::{communication_type, definitions, priority, signal, source_name, universe};

pub mod config;
pub mod context;
pub mod error;
pub mod guid;
pub mod port;
pub mod port_manager;
pub mod protocol;
pub mod raw_listener;
pub mod spsc;

pub use error::DmxResult;
