// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Port configuration records and the process wide protocol settings.
//!
//! Settings are plain serde records, usually loaded from TOML:
//!
//! ```
//! use dmx_port::config::ProtocolSettings;
//! use dmx_port::protocol::ProtocolRegistry;
//!
//! let mut settings = ProtocolSettings::from_toml_str(
//!     r#"
//!     send_dmx_enabled = true
//!
//!     [[input_port_configs]]
//!     port_name = "Stage"
//!     protocol_name = "sACN"
//!     communication_type = "Multicast"
//!     device_address = "127.0.0.1"
//!     local_universe_start = 1
//!     num_universes = 4
//!     extern_universe_start = 100
//!     "#,
//! )
//! .unwrap();
//!
//! settings.make_valid(&ProtocolRegistry::with_default_protocols());
//! assert_eq!(settings.input_port_configs[0].universe_mapping().unwrap().local_to_extern(2), 101);
//! ```

use std::{collections::HashSet, net::Ipv4Addr, path::Path, sync::Arc};

use dmx_core::{
    communication_type::CommunicationType,
    priority::{Priority, PriorityStrategy},
    universe::{UniverseError, UniverseMapping},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{DmxResult, Error},
    guid::PortGuid,
    protocol::{DmxProtocol, ProtocolRegistry},
};

/// Process wide DMX settings: the runtime flags and every configured port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Output ports hand their signals to the network
    pub send_dmx_enabled: bool,
    /// Input ports are bound to the network
    pub receive_dmx_enabled: bool,
    /// Every configured input port
    pub input_port_configs: Vec<InputPortConfig>,
    /// Every configured output port
    pub output_port_configs: Vec<OutputPortConfig>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            send_dmx_enabled: true,
            receive_dmx_enabled: true,
            input_port_configs: Vec::new(),
            output_port_configs: Vec::new(),
        }
    }
}

impl ProtocolSettings {
    /// Parses settings from TOML. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> DmxResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Serializes the settings to TOML
    pub fn to_toml_string(&self) -> DmxResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Reads settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> DmxResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Writes settings to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> DmxResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Corrects every config so ports can be created from it. Each correction is logged as a warning.
    ///
    /// - Duplicate GUIDs are regenerated
    /// - Blank and duplicate port names are replaced by generated unique names
    /// - Unknown protocols fall back to the first registered protocol
    /// - Communication types the protocol doesn't support fall back to its first supported type
    /// - Fewer than 1 universe becomes 1
    ///
    /// Invalid addresses and universe ranges outside of the protocol's bounds are left alone, the port created from such a
    /// config stays unregistered.
    pub fn make_valid(&mut self, registry: &ProtocolRegistry) {
        let mut guids = HashSet::new();
        let mut names = HashSet::new();

        for config in &mut self.input_port_configs {
            config.make_valid(registry, &mut guids, &mut names);
        }

        for config in &mut self.output_port_configs {
            config.make_valid(registry, &mut guids, &mut names);
        }
    }
}

/// Configuration of one input port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPortConfig {
    /// Identity of the port
    pub port_guid: PortGuid,
    /// Unique, human readable name
    pub port_name: String,
    /// Name of the protocol, e.g. `sACN` or `Art-Net`
    pub protocol_name: String,
    /// How the port receives
    pub communication_type: CommunicationType,
    /// IPv4 address of the network interface to receive on
    pub device_address: String,
    /// First universe as seen by the application
    pub local_universe_start: i32,
    /// Number of universes
    pub num_universes: i32,
    /// First universe as seen on the wire
    pub extern_universe_start: i32,
    /// How inbound signals are filtered by priority
    pub priority_strategy: PriorityStrategy,
    /// Priority the strategy compares against
    pub priority: u8,
}

impl Default for InputPortConfig {
    fn default() -> Self {
        Self {
            port_guid: PortGuid::new_v4(),
            port_name: String::new(),
            protocol_name: "sACN".to_owned(),
            communication_type: CommunicationType::Multicast,
            device_address: Ipv4Addr::LOCALHOST.to_string(),
            local_universe_start: 1,
            num_universes: 1,
            extern_universe_start: 1,
            priority_strategy: PriorityStrategy::None,
            priority: Priority::DEFAULT_RAW,
        }
    }
}

impl InputPortConfig {
    const NAME_PREFIX: &'static str = "Input Port";

    /// The local to extern mapping described by the config
    pub fn universe_mapping(&self) -> Result<UniverseMapping, UniverseError> {
        UniverseMapping::new(self.local_universe_start, self.num_universes, self.extern_universe_start)
    }

    /// The configured priority, clamped to 200
    pub fn priority(&self) -> Priority {
        Priority::clamped(self.priority)
    }

    fn make_valid(&mut self, registry: &ProtocolRegistry, guids: &mut HashSet<PortGuid>, names: &mut HashSet<String>) {
        unique_guid(&mut self.port_guid, guids, &self.port_name);
        unique_name(&mut self.port_name, Self::NAME_PREFIX, names);

        if let Some(protocol) = valid_protocol(&mut self.protocol_name, registry, &self.port_name) {
            valid_communication_type(&mut self.communication_type, protocol.input_communication_types(), &self.port_name);
        }

        valid_num_universes(&mut self.num_universes, &self.port_name);
        valid_priority(&mut self.priority, &self.port_name);
    }
}

/// Configuration of one output port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPortConfig {
    /// Identity of the port
    pub port_guid: PortGuid,
    /// Unique, human readable name
    pub port_name: String,
    /// Name of the protocol, e.g. `sACN` or `Art-Net`
    pub protocol_name: String,
    /// How the port sends
    pub communication_type: CommunicationType,
    /// IPv4 address of the network interface to send from
    pub device_address: String,
    /// IPv4 address to send to, only used for unicast
    pub destination_address: String,
    /// First universe as seen by the application
    pub local_universe_start: i32,
    /// Number of universes
    pub num_universes: i32,
    /// First universe as seen on the wire
    pub extern_universe_start: i32,
    /// Sent signals are also handed to the port's raw listeners
    pub loopback_to_engine: bool,
    /// Priority signals are sent with
    pub priority: u8,
}

impl Default for OutputPortConfig {
    fn default() -> Self {
        Self {
            port_guid: PortGuid::new_v4(),
            port_name: String::new(),
            protocol_name: "sACN".to_owned(),
            communication_type: CommunicationType::Multicast,
            device_address: Ipv4Addr::LOCALHOST.to_string(),
            destination_address: String::new(),
            local_universe_start: 1,
            num_universes: 1,
            extern_universe_start: 1,
            loopback_to_engine: false,
            priority: Priority::DEFAULT_RAW,
        }
    }
}

impl OutputPortConfig {
    const NAME_PREFIX: &'static str = "Output Port";

    /// The local to extern mapping described by the config
    pub fn universe_mapping(&self) -> Result<UniverseMapping, UniverseError> {
        UniverseMapping::new(self.local_universe_start, self.num_universes, self.extern_universe_start)
    }

    /// The configured priority, clamped to 200
    pub fn priority(&self) -> Priority {
        Priority::clamped(self.priority)
    }

    fn make_valid(&mut self, registry: &ProtocolRegistry, guids: &mut HashSet<PortGuid>, names: &mut HashSet<String>) {
        unique_guid(&mut self.port_guid, guids, &self.port_name);
        unique_name(&mut self.port_name, Self::NAME_PREFIX, names);

        if let Some(protocol) = valid_protocol(&mut self.protocol_name, registry, &self.port_name) {
            valid_communication_type(&mut self.communication_type, protocol.output_communication_types(), &self.port_name);
        }

        valid_num_universes(&mut self.num_universes, &self.port_name);
        valid_priority(&mut self.priority, &self.port_name);
    }
}

/// Parses a configured IPv4 address, surrounding whitespace is ignored
pub fn parse_ipv4(address: &str) -> DmxResult<Ipv4Addr> {
    address.trim().parse().map_err(|_| Error::InvalidIpAddress(address.to_owned()))
}

fn unique_guid(guid: &mut PortGuid, seen: &mut HashSet<PortGuid>, port_name: &str) {
    if guid.is_nil() || seen.contains(guid) {
        let replacement = PortGuid::new_v4();
        tracing::warn!(port = %port_name, old = %guid, new = %replacement, "Port GUID is not unique, generated a new one");
        *guid = replacement;
    }
    seen.insert(*guid);
}

fn unique_name(name: &mut String, prefix: &str, seen: &mut HashSet<String>) {
    let trimmed = name.trim();
    if trimmed.is_empty() || seen.contains(trimmed) {
        let generated = (1..)
            .map(|n| format!("{prefix} {n}"))
            .find(|candidate| !seen.contains(candidate))
            .unwrap_or_else(|| prefix.to_owned());

        if !trimmed.is_empty() {
            tracing::warn!(old = %trimmed, new = %generated, "Port name is not unique, renamed port");
        }
        *name = generated;
    } else if trimmed.len() != name.len() {
        *name = trimmed.to_owned();
    }
    seen.insert(name.clone());
}

fn valid_protocol(protocol_name: &mut String, registry: &ProtocolRegistry, port_name: &str) -> Option<Arc<dyn DmxProtocol>> {
    if let Some(protocol) = registry.find(protocol_name) {
        *protocol_name = protocol.name().to_owned();
        return Some(protocol);
    }

    let fallback = registry.first()?;
    tracing::warn!(
        port = %port_name,
        protocol = %protocol_name,
        fallback = fallback.name(),
        "Unknown protocol, falling back to the first available protocol"
    );
    *protocol_name = fallback.name().to_owned();
    Some(fallback)
}

fn valid_communication_type(communication_type: &mut CommunicationType, supported: &[CommunicationType], port_name: &str) {
    if supported.contains(communication_type) {
        return;
    }

    if let Some(first) = supported.first() {
        tracing::warn!(
            port = %port_name,
            communication_type = %communication_type,
            fallback = %first,
            "Communication type is not supported by the protocol"
        );
        *communication_type = *first;
    }
}

fn valid_num_universes(num_universes: &mut i32, port_name: &str) {
    if *num_universes < 1 {
        tracing::warn!(port = %port_name, num_universes = *num_universes, "A port needs at least one universe");
        *num_universes = 1;
    }
}

fn valid_priority(priority: &mut u8, port_name: &str) {
    if *priority > Priority::MAX_RAW {
        tracing::warn!(port = %port_name, priority = *priority, "Priority exceeds {}, clamped", Priority::MAX_RAW);
        *priority = Priority::MAX_RAW;
    }
}

#[cfg(test)]
mod test_config {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let settings = ProtocolSettings::from_toml_str(
            r#"
            receive_dmx_enabled = false

            [[output_port_configs]]
            port_name = "Front"
            protocol_name = "Art-Net"
            communication_type = "Unicast"
            destination_address = "10.0.0.2"
            "#,
        )
        .unwrap();

        assert!(settings.send_dmx_enabled);
        assert!(!settings.receive_dmx_enabled);
        assert!(settings.input_port_configs.is_empty());

        let output = &settings.output_port_configs[0];
        assert_eq!(output.port_name, "Front");
        assert_eq!(output.communication_type, CommunicationType::Unicast);
        assert_eq!(output.num_universes, 1);
        assert_eq!(output.priority(), Priority::DEFAULT);
        assert!(!output.port_guid.is_nil());
    }

    #[test]
    fn test_toml_keeps_guid() {
        let mut settings = ProtocolSettings::default();
        settings.input_port_configs.push(InputPortConfig::default());

        let serialized = settings.to_toml_string().unwrap();
        let parsed = ProtocolSettings::from_toml_str(&serialized).unwrap();
        assert_eq!(parsed.input_port_configs[0].port_guid, settings.input_port_configs[0].port_guid);
    }

    #[test]
    fn test_make_valid_names() {
        let mut settings = ProtocolSettings::default();
        settings.input_port_configs.push(InputPortConfig::default());
        settings.input_port_configs.push(InputPortConfig {
            port_name: "Input Port 1".to_owned(),
            ..Default::default()
        });
        settings.output_port_configs.push(OutputPortConfig {
            port_name: "  Input Port 1 ".to_owned(),
            ..Default::default()
        });

        settings.make_valid(&ProtocolRegistry::with_default_protocols());

        assert_eq!(settings.input_port_configs[0].port_name, "Input Port 1");
        assert_eq!(settings.input_port_configs[1].port_name, "Input Port 2");
        assert_eq!(settings.output_port_configs[0].port_name, "Output Port 1");
    }

    #[test]
    fn test_make_valid_fallbacks() {
        let registry = ProtocolRegistry::with_default_protocols();
        let first = registry.first().unwrap();

        let duplicate = PortGuid::new_v4();
        let mut settings = ProtocolSettings::default();
        settings.input_port_configs.push(InputPortConfig {
            port_guid: duplicate,
            protocol_name: "KiNET".to_owned(),
            num_universes: 0,
            priority: 250,
            ..Default::default()
        });
        settings.output_port_configs.push(OutputPortConfig {
            port_guid: duplicate,
            protocol_name: "sacn".to_owned(),
            communication_type: CommunicationType::Broadcast,
            extern_universe_start: 70000,
            ..Default::default()
        });

        settings.make_valid(&registry);

        let input = &settings.input_port_configs[0];
        assert_eq!(input.protocol_name, first.name());
        assert_eq!(input.num_universes, 1);
        assert_eq!(input.priority, 200);
        assert_eq!(input.port_guid, duplicate);

        let output = &settings.output_port_configs[0];
        assert_eq!(output.protocol_name, "sACN");
        assert_ne!(output.port_guid, duplicate);
        // sACN doesn't send broadcast
        assert_eq!(output.communication_type, CommunicationType::Multicast);
        // out of bounds ranges are kept, the port stays inert
        assert_eq!(output.extern_universe_start, 70000);
    }

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4(" 192.168.0.1 ").unwrap(), Ipv4Addr::new(192, 168, 0, 1));
        assert!(matches!(parse_ipv4("localhost"), Err(Error::InvalidIpAddress(_))));
        assert!(matches!(parse_ipv4("::1"), Err(Error::InvalidIpAddress(_))));
    }
}
