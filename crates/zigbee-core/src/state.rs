//! Network/node state and rolling counters (spec.md §3 "Network info",
//! "Node info", "Counters"). Grounded on `zigpy/state.py`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Channels, Eui64, ExtendedPanId, Nwk};
use crate::zdo::LogicalType;

/// Static facts about the coordinator itself (spec.md §3 "Node info").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub nwk: Nwk,
    pub ieee: Eui64,
    pub logical_type: LogicalType,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub version: Option<String>,
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self {
            nwk: Nwk(0xfffe),
            ieee: Eui64::UNKNOWN,
            logical_type: LogicalType::Reserved7,
            model: None,
            manufacturer: None,
            version: None,
        }
    }
}

/// A 16-byte network/link key plus the counters that govern whether a
/// backup carrying it may be reloaded (spec.md §3 "Network key"/"trust-
/// center link key"; `zigpy.state.Key`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Key {
    pub key: [u8; 16],
    pub seq: u8,
    pub tx_counter: u32,
    pub rx_counter: u32,
    /// Only meaningful for per-partner link keys (trust-center link key,
    /// key table entries); `Eui64::UNKNOWN` for the network key, which has
    /// no single partner.
    pub partner_ieee: Eui64,
}

impl Key {
    pub const UNKNOWN: [u8; 16] = [0xff; 16];
}

impl Default for Key {
    fn default() -> Self {
        Self { key: Self::UNKNOWN, seq: 0, tx_counter: 0, rx_counter: 0, partner_ieee: Eui64::UNKNOWN }
    }
}

/// Network-wide parameters (spec.md §3 "Network info"). `pan_id` defaults to
/// the "not yet formed" sentinel `0xFFFE`, matching `zigpy.state.NetworkInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInformation {
    pub extended_pan_id: ExtendedPanId,
    pub pan_id: u16,
    pub nwk_update_id: u8,
    pub nwk_manager_id: Nwk,
    pub channel: u8,
    pub channel_mask: Channels,
    pub security_level: u8,
    pub network_key: Key,
    pub tc_link_key: Key,
    pub key_table: Vec<Key>,
    pub children: Vec<Eui64>,
    pub nwk_addresses: HashMap<Eui64, Nwk>,
    /// Opaque radio-specific blob, passed through unexamined (spec.md §3).
    #[serde(default)]
    pub stack_specific: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Informational only: which radio/backend produced this snapshot
    /// (Open Coordinator Backup's `metadata.source`).
    #[serde(default)]
    pub source: String,
}

impl Default for NetworkInformation {
    fn default() -> Self {
        Self {
            extended_pan_id: Eui64::UNKNOWN,
            pan_id: 0xfffe,
            nwk_update_id: 0,
            nwk_manager_id: Nwk(0xfffe),
            channel: 0,
            channel_mask: Channels(0),
            security_level: 0,
            network_key: Key::default(),
            tc_link_key: Key::default(),
            key_table: Vec::new(),
            children: Vec::new(),
            nwk_addresses: HashMap::new(),
            stack_specific: serde_json::Value::Null,
            metadata: serde_json::Value::Null,
            source: String::new(),
        }
    }
}

/// One rolling, wraparound-aware counter. `value` is always
/// `last_reset_value + raw_value`, so resetting never loses history
/// (`zigpy.state.Counter`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    name: String,
    raw_value: u64,
    last_reset_value: u64,
    reset_count: u64,
}

impl Counter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), raw_value: 0, last_reset_value: 0, reset_count: 0 }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u64 {
        self.last_reset_value + self.raw_value
    }

    pub fn increment(&mut self) {
        self.raw_value += 1;
    }

    /// Absorb a new raw reading from the device. If it's lower than the
    /// last one we saw, the device's own counter rolled over or was reset
    /// out from under us; fold the old value into `last_reset_value` so
    /// `value()` keeps climbing instead of jumping backward.
    pub fn update(&mut self, new_raw_value: u64) {
        let diff = new_raw_value as i128 - self.raw_value as i128;
        if diff < 0 {
            self.reset_and_update(new_raw_value);
        } else {
            self.raw_value = new_raw_value;
        }
    }

    pub fn reset_and_update(&mut self, new_raw_value: u64) {
        self.last_reset_value = self.value();
        self.raw_value = new_raw_value;
        self.reset_count += 1;
    }

    pub fn reset(&mut self) {
        self.reset_and_update(0);
    }
}

/// A named collection of [`Counter`]s, created on first access
/// (`zigpy.state.Counters.__getattr__`/`__getitem__`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    counters: HashMap<String, Counter>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_add(&mut self, name: &str) -> &mut Counter {
        self.counters.entry(name.to_string()).or_insert_with(|| Counter::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&Counter> {
        self.counters.get(name)
    }

    pub fn reset_all(&mut self) {
        for counter in self.counters.values_mut() {
            counter.reset();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Counter> {
        self.counters.values()
    }
}

/// The full in-memory state snapshot an application controller carries and
/// persists: node identity, network parameters, and traffic counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    pub node_information: NodeInfo,
    pub network_information: NetworkInformation,
    pub counters: Counters,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize_counters(&mut self) {
        for name in ["rx", "tx", "rx_broadcast", "tx_broadcast", "device_join", "device_rejoin"] {
            self.counters.get_or_add(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_value_survives_a_reset() {
        let mut c = Counter::new("rx");
        c.increment();
        c.increment();
        assert_eq!(c.value(), 2);
        c.reset();
        assert_eq!(c.value(), 0);
        c.increment();
        assert_eq!(c.value(), 1);
    }

    #[test]
    fn counter_update_detects_device_side_rollover() {
        let mut c = Counter::new("rx");
        c.update(100);
        assert_eq!(c.value(), 100);
        // device's own counter rolled over and restarted from a small value
        c.update(5);
        assert_eq!(c.value(), 105);
    }

    #[test]
    fn counters_creates_entries_on_first_access() {
        let mut counters = Counters::new();
        assert!(counters.get("rx").is_none());
        counters.get_or_add("rx").increment();
        assert_eq!(counters.get("rx").unwrap().value(), 1);
    }
}
