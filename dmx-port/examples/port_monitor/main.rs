// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Starts a port manager and prints what its ports see.
//!
//! Usage: `port_monitor [settings.toml] [seconds]`
//!
//! Without a settings file a unicast sACN output sends a ramp on two universes to an input on the loopback interface. Every
//! output port ramps its first two channels, every port gets a raw listener. Set `RUST_LOG=debug` for the port lifecycle.

mod error;
use error::ExampleResult;

use std::{
    collections::HashMap,
    env,
    time::{Duration, Instant},
};

use dmx_port::{
    communication_type::CommunicationType,
    config::{InputPortConfig, OutputPortConfig, ProtocolSettings},
    port::DmxPort,
    port_manager::PortManager,
    protocol::ProtocolRegistry,
    raw_listener::RawListener,
};
use tracing_subscriber::EnvFilter;

const FRAME_TIME: Duration = Duration::from_millis(25);
const REPORT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_RUN_TIME: Duration = Duration::from_secs(10);

fn main() -> ExampleResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let settings = match args.get(1) {
        Some(path) => ProtocolSettings::load(path)?,
        None => loopback_settings(),
    };

    let run_time = args
        .get(2)
        .and_then(|seconds| seconds.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RUN_TIME);

    let manager = PortManager::startup(settings, ProtocolRegistry::with_default_protocols());

    for port in manager.input_ports() {
        report_port(port.as_ref());
    }
    for port in manager.output_ports() {
        report_port(port.as_ref());
    }

    let mut listeners: Vec<(String, RawListener)> = manager
        .input_ports()
        .iter()
        .map(|port| (port.port_name(), RawListener::new(port)))
        .chain(manager.output_ports().iter().map(|port| (port.port_name(), RawListener::new(port))))
        .collect();

    for (_, listener) in &mut listeners {
        listener.start();
    }

    let started = Instant::now();
    let mut last_report = Instant::now();
    let mut received: HashMap<String, usize> = HashMap::new();
    let mut level: u8 = 0;

    while started.elapsed() < run_time {
        level = level.wrapping_add(1);

        for port in manager.output_ports() {
            let Some(mapping) = port.universe_mapping() else {
                continue;
            };

            let channels = HashMap::from([(1, level), (2, u8::MAX - level)]);
            for local_universe in mapping.local_universe_start()..=mapping.local_universe_end() {
                port.send_dmx(local_universe, &channels)?;
            }
        }

        manager.tick(FRAME_TIME);

        for (name, listener) in &mut listeners {
            while let Some((local_universe, signal)) = listener.dequeue_signal() {
                tracing::trace!(port = %name, local_universe, sequence = signal.sequence(), "Raw signal");
                *received.entry(name.clone()).or_default() += 1;
            }
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            last_report = Instant::now();

            for port in manager.input_ports() {
                let signals = port.game_thread_get_all_dmx_signals();
                let mut universes: Vec<_> = signals.keys().copied().collect();
                universes.sort_unstable();

                for extern_universe in universes {
                    let signal = &signals[&extern_universe];
                    println!(
                        "{} universe {} (local {}): priority {} first channels {:?}",
                        port.port_name(),
                        extern_universe,
                        port.convert_extern_to_local_universe_id(extern_universe),
                        signal.priority(),
                        &signal.channel_data()[..4]
                    );
                }
            }

            for (name, count) in received.drain() {
                println!("{name}: {count} raw signals");
            }
        }

        std::thread::sleep(FRAME_TIME);
    }

    manager.shutdown();
    Ok(())
}

fn report_port(port: &dyn DmxPort) {
    match port.config_problem() {
        None => tracing::info!(port = %port.port_name(), registered = port.is_registered(), "Port ready"),
        Some(problem) => tracing::warn!(port = %port.port_name(), %problem, "Port is inert"),
    }
}

fn loopback_settings() -> ProtocolSettings {
    ProtocolSettings {
        input_port_configs: vec![InputPortConfig {
            port_name: "Loopback In".to_owned(),
            protocol_name: "sACN".to_owned(),
            communication_type: CommunicationType::Unicast,
            device_address: "127.0.0.1".to_owned(),
            local_universe_start: 1,
            num_universes: 2,
            extern_universe_start: 1,
            ..Default::default()
        }],
        output_port_configs: vec![OutputPortConfig {
            port_name: "Loopback Out".to_owned(),
            protocol_name: "sACN".to_owned(),
            communication_type: CommunicationType::Unicast,
            device_address: "127.0.0.1".to_owned(),
            destination_address: "127.0.0.1".to_owned(),
            local_universe_start: 1,
            num_universes: 2,
            extern_universe_start: 1,
            ..Default::default()
        }],
        ..Default::default()
    }
}
