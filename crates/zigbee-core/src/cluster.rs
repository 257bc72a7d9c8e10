//! C4/C5 — cluster registry and cluster runtime.
//!
//! `zigpy` builds its cluster classes at import time via a metaclass that
//! collects `attributes`/`server_commands`/`client_commands` class bodies
//! and registers each class by `cluster_id` in `Cluster._registry`
//! (`zigpy/zcl/clusters/*.py`, `zigpy/zcl/__init__.py`). There is no
//! metaclass machinery in Rust; the registry here is a plain boot-time
//! table (`cluster_registry()`) keyed by id, and `Cluster::from_id` is the
//! factory spec.md §4.1/§9 calls for in place of `getattr`-based dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use crate::error::{InvalidResponse, Result, ZigbeeError};
use crate::listener::{ListenerHandle, ListenerRegistry};
use crate::types::Wire;
use crate::zcl::foundation::{
    Attribute, AttributeReportingConfig, AttributeValue, ConfigureReportingResponseRecord,
    DefaultResponse, KnownStatus, ReadAttributeRecord, Status, TypeValue,
    WriteAttributesStatusRecord,
};
use crate::zcl::FrameControl;

pub mod id {
    pub const BASIC: u16 = 0x0000;
    pub const POWER_CONFIG: u16 = 0x0001;
    pub const IDENTIFY: u16 = 0x0003;
    pub const GROUPS: u16 = 0x0004;
    pub const SCENES: u16 = 0x0005;
    pub const ON_OFF: u16 = 0x0006;
    pub const LEVEL_CONTROL: u16 = 0x0008;
    pub const OTA: u16 = 0x0019;
    pub const POLL_CONTROL: u16 = 0x0020;
    pub const COLOR_CONTROL: u16 = 0x0300;
    pub const ILLUMINANCE_MEASUREMENT: u16 = 0x0400;
    pub const TEMPERATURE_MEASUREMENT: u16 = 0x0402;
    pub const HUMIDITY_MEASUREMENT: u16 = 0x0405;
    pub const OCCUPANCY_SENSING: u16 = 0x0406;
    pub const ELECTRICAL_MEASUREMENT: u16 = 0x0b04;
}

/// One registry-declared attribute (spec.md §3 "Cluster": "registry-declared
/// schema"). `type_tag` is the *default* wire type used when constructing a
/// write or a synthesized constant-overlay value; inbound values still carry
/// their own tag and are trusted over this one.
#[derive(Debug, Clone, Copy)]
pub struct AttributeDef {
    pub id: u16,
    pub name: &'static str,
    pub type_tag: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandDef {
    pub id: u8,
    pub name: &'static str,
    pub is_manufacturer_specific: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterDef {
    pub id: u16,
    pub name: &'static str,
    pub attributes: &'static [AttributeDef],
    pub server_commands: &'static [CommandDef],
    pub client_commands: &'static [CommandDef],
}

impl ClusterDef {
    pub fn attribute_by_id(&self, attr_id: u16) -> Option<&'static AttributeDef> {
        self.attributes.iter().find(|a| a.id == attr_id)
    }

    pub fn attribute_by_name(&self, name: &str) -> Option<&'static AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn server_command_by_name(&self, name: &str) -> Option<&'static CommandDef> {
        self.server_commands.iter().find(|c| c.name == name)
    }

    pub fn client_command_by_name(&self, name: &str) -> Option<&'static CommandDef> {
        self.client_commands.iter().find(|c| c.name == name)
    }
}

macro_rules! attrs {
    ($($id:expr, $name:expr, $tag:expr);* $(;)?) => {
        &[$(AttributeDef { id: $id, name: $name, type_tag: $tag }),*]
    };
}

macro_rules! cmds {
    ($($id:expr, $name:expr, $manuf:expr);* $(;)?) => {
        &[$(CommandDef { id: $id, name: $name, is_manufacturer_specific: $manuf }),*]
    };
}

// Attribute type tags, matching AttributeValue::type_tag()'s table.
const U8: u8 = 0x20;
const U16: u8 = 0x21;
const U32: u8 = 0x23;
const I16: u8 = 0x29;
const BOOL: u8 = 0x10;
const ENUM8: u8 = 0x30;
const CHAR_STRING: u8 = 0x42;
const IEEE: u8 = 0xf0;
const BITMAP8: u8 = 0x18;

static BASIC_ATTRS: &[AttributeDef] = attrs![
    0x0000, "zcl_version", U8;
    0x0001, "app_version", U8;
    0x0002, "stack_version", U8;
    0x0003, "hw_version", U8;
    0x0004, "manufacturer", CHAR_STRING;
    0x0005, "model", CHAR_STRING;
    0x0006, "date_code", CHAR_STRING;
    0x0007, "power_source", ENUM8;
    0x4000, "sw_build_id", CHAR_STRING;
];

static POWER_CONFIG_ATTRS: &[AttributeDef] = attrs![
    0x0020, "battery_voltage", U8;
    0x0021, "battery_percentage_remaining", U8;
];

static IDENTIFY_ATTRS: &[AttributeDef] = attrs![0x0000, "identify_time", U16];
static IDENTIFY_SERVER_COMMANDS: &[CommandDef] =
    cmds![0x00, "identify", false; 0x01, "identify_query", false];

static GROUPS_ATTRS: &[AttributeDef] = attrs![0x0000, "name_support", BITMAP8];
static GROUPS_SERVER_COMMANDS: &[CommandDef] = cmds![
    0x00, "add", false;
    0x01, "view", false;
    0x02, "get_membership", false;
    0x03, "remove", false;
    0x04, "remove_all", false;
    0x05, "add_if_identifying", false
];

static ON_OFF_ATTRS: &[AttributeDef] = attrs![0x0000, "on_off", BOOL];
static ON_OFF_SERVER_COMMANDS: &[CommandDef] =
    cmds![0x00, "off", false; 0x01, "on", false; 0x02, "toggle", false];

static LEVEL_CONTROL_ATTRS: &[AttributeDef] = attrs![
    0x0000, "current_level", U8;
    0x0010, "on_off_transition_time", U16;
];
static LEVEL_CONTROL_SERVER_COMMANDS: &[CommandDef] = cmds![
    0x00, "move_to_level", false;
    0x01, "move", false;
    0x02, "step", false;
    0x03, "stop", false;
    0x04, "move_to_level_with_on_off", false
];

static COLOR_CONTROL_ATTRS: &[AttributeDef] = attrs![
    0x0000, "current_hue", U8;
    0x0001, "current_saturation", U8;
    0x0003, "current_x", U16;
    0x0004, "current_y", U16;
    0x0007, "color_temperature", U16;
    0x0008, "color_mode", ENUM8;
];
static COLOR_CONTROL_SERVER_COMMANDS: &[CommandDef] = cmds![
    0x00, "move_to_hue", false;
    0x03, "move_to_saturation", false;
    0x06, "move_to_hue_and_saturation", false;
    0x07, "move_to_color", false;
    0x0a, "move_to_color_temperature", false
];

static TEMPERATURE_ATTRS: &[AttributeDef] = attrs![0x0000, "measured_value", I16];
static HUMIDITY_ATTRS: &[AttributeDef] = attrs![0x0000, "measured_value", U16];
static ILLUMINANCE_ATTRS: &[AttributeDef] = attrs![0x0000, "measured_value", U16];
static OCCUPANCY_ATTRS: &[AttributeDef] = attrs![0x0000, "occupancy", BITMAP8];

static OTA_ATTRS: &[AttributeDef] = attrs![
    0x0000, "upgrade_server_id", IEEE;
    0x0002, "current_file_version", U32;
];
static OTA_CLIENT_COMMANDS: &[CommandDef] = cmds![
    0x01, "query_next_image", false;
    0x03, "image_block", false;
    0x06, "upgrade_end", false
];
static OTA_SERVER_COMMANDS: &[CommandDef] = cmds![
    0x00, "image_notify", false;
    0x02, "query_next_image_response", false;
    0x05, "image_block_response", false;
    0x07, "upgrade_end_response", false
];

static ELECTRICAL_MEASUREMENT_ATTRS: &[AttributeDef] = attrs![
    0x0505, "rms_voltage", U16;
    0x0508, "rms_current", U16;
    0x050b, "active_power", I16;
];

static EMPTY_CMDS: &[CommandDef] = &[];

fn registry_table() -> &'static HashMap<u16, ClusterDef> {
    static TABLE: OnceLock<HashMap<u16, ClusterDef>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let defs = [
            ClusterDef { id: id::BASIC, name: "basic", attributes: BASIC_ATTRS, server_commands: EMPTY_CMDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::POWER_CONFIG, name: "power_configuration", attributes: POWER_CONFIG_ATTRS, server_commands: EMPTY_CMDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::IDENTIFY, name: "identify", attributes: IDENTIFY_ATTRS, server_commands: IDENTIFY_SERVER_COMMANDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::GROUPS, name: "groups", attributes: GROUPS_ATTRS, server_commands: GROUPS_SERVER_COMMANDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::ON_OFF, name: "on_off", attributes: ON_OFF_ATTRS, server_commands: ON_OFF_SERVER_COMMANDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::LEVEL_CONTROL, name: "level_control", attributes: LEVEL_CONTROL_ATTRS, server_commands: LEVEL_CONTROL_SERVER_COMMANDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::COLOR_CONTROL, name: "color_control", attributes: COLOR_CONTROL_ATTRS, server_commands: COLOR_CONTROL_SERVER_COMMANDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::TEMPERATURE_MEASUREMENT, name: "temperature_measurement", attributes: TEMPERATURE_ATTRS, server_commands: EMPTY_CMDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::HUMIDITY_MEASUREMENT, name: "relative_humidity", attributes: HUMIDITY_ATTRS, server_commands: EMPTY_CMDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::ILLUMINANCE_MEASUREMENT, name: "illuminance_measurement", attributes: ILLUMINANCE_ATTRS, server_commands: EMPTY_CMDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::OCCUPANCY_SENSING, name: "occupancy_sensing", attributes: OCCUPANCY_ATTRS, server_commands: EMPTY_CMDS, client_commands: EMPTY_CMDS },
            ClusterDef { id: id::OTA, name: "ota", attributes: OTA_ATTRS, server_commands: OTA_SERVER_COMMANDS, client_commands: OTA_CLIENT_COMMANDS },
            ClusterDef { id: id::ELECTRICAL_MEASUREMENT, name: "electrical_measurement", attributes: ELECTRICAL_MEASUREMENT_ATTRS, server_commands: EMPTY_CMDS, client_commands: EMPTY_CMDS },
        ];
        defs.into_iter().map(|d| (d.id, d)).collect()
    })
}

/// Lookup by numeric id (`zigpy.zcl.Cluster._registry`).
pub fn lookup(cluster_id: u16) -> Option<&'static ClusterDef> {
    registry_table().get(&cluster_id)
}

/// Lookup by `ep_attribute`-style name (`zigpy.zcl.Cluster._registry_name`).
pub fn lookup_by_name(name: &str) -> Option<&'static ClusterDef> {
    registry_table().values().find(|d| d.name == name)
}

/// Manufacturer-specific clusters occupy 0xfc00..=0xffff in the Zigbee
/// profile id space; a cluster id in this range with no registry entry is
/// still a first-class manufacturer-specific cluster, not a parse error
/// (spec.md §9 Open Question (b)).
pub fn is_manufacturer_specific_range(cluster_id: u16) -> bool {
    (0xfc00..=0xffff).contains(&cluster_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterRole {
    Server,
    Client,
}

/// Events a cluster fans out to listeners (spec.md §6 persistence events,
/// §4.2 inbound dispatch).
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    AttributeUpdated { attr_id: u16, value: AttributeValue },
    ClusterCommandReceived { command_id: u8, tsn: u8, data: Vec<u8> },
    UnknownClusterMessage { command_id: u8, tsn: u8 },
}

pub type ClusterListener = Arc<dyn Fn(&ClusterEvent) + Send + Sync>;

/// What a cluster needs from its owning device to put bytes on the wire and
/// wait for a matching reply. Kept as a trait rather than a back-reference
/// to the owning endpoint/device: endpoint<->cluster<->device would
/// otherwise form a reference cycle (spec.md §9 "Cyclic references");
/// `Device` (C7) is the one concrete implementor, reached by passing
/// `&dyn ClusterTransport` into each call instead of storing it.
pub trait ClusterTransport: Send + Sync {
    /// Send a ZCL frame for `cluster_id`/`endpoint_id` and, if `expect_reply`
    /// is set, await the matching response (by TSN) up to the configured
    /// APS timeout. Returns the response's ZCL payload bytes (past the
    /// four-or-six-byte header) if a reply was expected and received.
    fn send<'a>(
        &'a self,
        endpoint_id: u8,
        cluster_id: u16,
        frame_control: FrameControl,
        manufacturer_code: Option<u16>,
        command_id: u8,
        payload: Vec<u8>,
        expect_reply: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>>;
}

/// The runtime cluster instance (C5). `def` is `None` for an unknown
/// cluster id outside the manufacturer-specific range — spec.md §4.2's
/// "generic cluster" whose dispatch emits `unknown_cluster_message`.
pub struct Cluster {
    pub cluster_id: u16,
    pub endpoint_id: u8,
    pub role: ClusterRole,
    def: Option<&'static ClusterDef>,
    manufacturer_code: Option<u16>,
    attribute_cache: HashMap<u16, AttributeValue>,
    constant_attributes: HashMap<u16, AttributeValue>,
    listeners: ListenerRegistry<ClusterListener>,
}

impl Cluster {
    /// `Cluster::from_id(endpoint, id)` (spec.md's C4 summary).
    pub fn from_id(endpoint_id: u8, cluster_id: u16, role: ClusterRole) -> Self {
        Self {
            cluster_id,
            endpoint_id,
            role,
            def: lookup(cluster_id),
            manufacturer_code: None,
            attribute_cache: HashMap::new(),
            constant_attributes: HashMap::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.def.map(|d| d.name).unwrap_or("unknown")
    }

    pub fn is_manufacturer_specific_cluster(&self) -> bool {
        self.def.is_none() && is_manufacturer_specific_range(self.cluster_id)
    }

    pub fn set_manufacturer_code(&mut self, code: Option<u16>) {
        self.manufacturer_code = code;
    }

    pub fn add_listener(&self, listener: ClusterListener) -> ListenerHandle {
        self.listeners.add_listener(listener)
    }

    pub fn remove_listener(&self, handle: ListenerHandle) {
        self.listeners.remove_listener(handle)
    }

    /// Install a value that always short-circuits reads for `attr_id`
    /// without ever touching the wire (spec.md §3 "constant-attribute
    /// overlay").
    pub fn set_constant_attribute(&mut self, attr_id: u16, value: AttributeValue) {
        self.constant_attributes.insert(attr_id, value);
    }

    pub fn cached(&self, attr_id: u16) -> Option<&AttributeValue> {
        self.constant_attributes.get(&attr_id).or_else(|| self.attribute_cache.get(&attr_id))
    }

    fn resolve_attr_id(&self, name_or_id: AttrRef) -> Option<u16> {
        match name_or_id {
            AttrRef::Id(id) => Some(id),
            AttrRef::Name(name) => self.def.and_then(|d| d.attribute_by_name(name)).map(|a| a.id),
        }
    }

    fn emit(&self, event: ClusterEvent) {
        self.listeners.notify_sync("cluster_event", |l| {
            l(&event);
            Ok(())
        });
    }

    fn frame_control(&self, is_manufacturer_specific: bool) -> FrameControl {
        FrameControl {
            cluster_specific: false,
            manufacturer_specific: is_manufacturer_specific,
            direction_server_to_client: self.role == ClusterRole::Client,
            disable_default_response: false,
        }
    }

    /// Read-attributes (spec.md §4.2 "Read-attributes contract").
    pub async fn read_attributes(
        &mut self,
        attrs: &[AttrRef<'_>],
        allow_cache: bool,
        transport: &dyn ClusterTransport,
    ) -> Result<(HashMap<u16, AttributeValue>, HashMap<u16, Status>)> {
        let mut successes = HashMap::new();
        let mut failures = HashMap::new();
        let mut wire_ids = Vec::new();

        for a in attrs {
            let Some(id) = self.resolve_attr_id(*a) else {
                continue;
            };
            if let Some(v) = self.constant_attributes.get(&id) {
                successes.insert(id, v.clone());
                continue;
            }
            if allow_cache {
                if let Some(v) = self.attribute_cache.get(&id) {
                    successes.insert(id, v.clone());
                    continue;
                }
            }
            wire_ids.push(id);
        }

        if wire_ids.is_empty() {
            return Ok((successes, failures));
        }

        let mut payload = Vec::new();
        crate::types::LvList(wire_ids.clone()).serialize_to(&mut payload);

        let reply = transport
            .send(
                self.endpoint_id,
                self.cluster_id,
                self.frame_control(false),
                self.manufacturer_code,
                0x00, // ReadAttributes
                payload,
                true,
            )
            .await?;

        match reply {
            None => {
                for id in wire_ids {
                    failures.insert(id, Status::Known(KnownStatus::Timeout));
                }
            }
            Some(data) => {
                if let Ok((default, _)) = DefaultResponse::deserialize(&data) {
                    for id in wire_ids {
                        failures.insert(id, default.status);
                    }
                } else {
                    let mut rest = &data[..];
                    while !rest.is_empty() {
                        let (rec, r) = ReadAttributeRecord::deserialize(rest)?;
                        rest = r;
                        if rec.status.is_success() {
                            if let Some(v) = rec.value {
                                self.attribute_cache.insert(rec.attrid, v.clone());
                                successes.insert(rec.attrid, v);
                            }
                        } else {
                            failures.insert(rec.attrid, rec.status);
                        }
                    }
                }
            }
        }

        Ok((successes, failures))
    }

    pub async fn write_attributes(
        &mut self,
        values: &[(AttrRef<'_>, AttributeValue)],
        transport: &dyn ClusterTransport,
    ) -> Result<Vec<WriteAttributesStatusRecord>> {
        let mut payload = Vec::new();
        let mut ids = Vec::new();
        for (a, v) in values {
            let Some(id) = self.resolve_attr_id(*a) else {
                return Err(ZigbeeError::InvalidResponse(InvalidResponse::SchemaMismatch(
                    "unknown attribute".into(),
                )));
            };
            ids.push(id);
            Attribute { attrid: id, value: TypeValue(v.clone()) }.serialize_to(&mut payload);
        }

        let reply = transport
            .send(
                self.endpoint_id,
                self.cluster_id,
                self.frame_control(false),
                self.manufacturer_code,
                0x02, // WriteAttributes
                payload,
                true,
            )
            .await?;

        let mut records = Vec::new();
        if let Some(data) = reply {
            let mut rest = &data[..];
            while !rest.is_empty() {
                let (rec, r) = WriteAttributesStatusRecord::deserialize(rest)?;
                rest = r;
                records.push(rec);
            }
        }
        for (id, (_, value)) in ids.iter().zip(values.iter()) {
            let failed = records.iter().any(|r| r.attrid == *id && !r.status.is_success());
            if !failed {
                self.attribute_cache.insert(*id, value.clone());
            }
        }
        Ok(records)
    }

    /// Configure-reporting (spec.md §4.2). Unknown attribute names are
    /// rejected before anything hits the wire.
    pub async fn configure_reporting(
        &mut self,
        configs: Vec<AttributeReportingConfig>,
        transport: &dyn ClusterTransport,
    ) -> Result<Vec<ConfigureReportingResponseRecord>> {
        if let Some(def) = self.def {
            for c in &configs {
                if def.attribute_by_id(c.attrid()).is_none() {
                    return Err(ZigbeeError::InvalidResponse(InvalidResponse::SchemaMismatch(
                        format!("unknown attribute 0x{:04x}", c.attrid()),
                    )));
                }
            }
        }
        let mut payload = Vec::new();
        for c in &configs {
            c.serialize_to(&mut payload);
        }
        let reply = transport
            .send(
                self.endpoint_id,
                self.cluster_id,
                self.frame_control(false),
                self.manufacturer_code,
                0x06, // ConfigureReporting
                payload,
                true,
            )
            .await?;
        let mut records = Vec::new();
        if let Some(data) = reply {
            let mut rest = &data[..];
            while !rest.is_empty() {
                let (rec, r) = ConfigureReportingResponseRecord::deserialize(rest)?;
                rest = r;
                records.push(rec);
            }
        }
        Ok(records)
    }

    /// General cluster-specific command dispatch by registry name
    /// (spec.md §9: "a single `cluster.command(name, args…)` that resolves
    /// via the registry"). `raw_args` is the already-encoded command
    /// payload; the typed helpers below build it for the handful of
    /// commands with fixed, simple argument shapes.
    pub async fn command(
        &self,
        name: &str,
        raw_args: Vec<u8>,
        expect_reply: bool,
        transport: &dyn ClusterTransport,
    ) -> Result<Option<Vec<u8>>> {
        let def = self.def.ok_or_else(|| {
            ZigbeeError::InvalidResponse(InvalidResponse::SchemaMismatch("no schema for cluster".into()))
        })?;
        let cmd = match self.role {
            ClusterRole::Server => def.server_command_by_name(name),
            ClusterRole::Client => def.client_command_by_name(name),
        }
        .ok_or_else(|| {
            ZigbeeError::InvalidResponse(InvalidResponse::SchemaMismatch(format!("unknown command {name}")))
        })?;

        let frame_control = FrameControl {
            cluster_specific: true,
            manufacturer_specific: cmd.is_manufacturer_specific,
            direction_server_to_client: self.role == ClusterRole::Client,
            disable_default_response: false,
        };
        transport
            .send(
                self.endpoint_id,
                self.cluster_id,
                frame_control,
                self.manufacturer_code,
                cmd.id,
                raw_args,
                expect_reply,
            )
            .await
    }

    pub async fn on(&self, transport: &dyn ClusterTransport) -> Result<()> {
        self.command("on", Vec::new(), true, transport).await.map(|_| ())
    }

    pub async fn off(&self, transport: &dyn ClusterTransport) -> Result<()> {
        self.command("off", Vec::new(), true, transport).await.map(|_| ())
    }

    pub async fn toggle(&self, transport: &dyn ClusterTransport) -> Result<()> {
        self.command("toggle", Vec::new(), true, transport).await.map(|_| ())
    }

    pub async fn move_to_level(
        &self,
        level: u8,
        transition_time: u16,
        transport: &dyn ClusterTransport,
    ) -> Result<()> {
        let mut args = Vec::new();
        level.serialize_to(&mut args);
        transition_time.serialize_to(&mut args);
        self.command("move_to_level", args, true, transport).await.map(|_| ())
    }

    /// Process an inbound report-attributes frame (command id 0x0a):
    /// write through to the cache and emit `attribute_updated` per record
    /// (spec.md §4.2). The default-response the same frame may be owed is
    /// not sent here — that needs the transport, which only `Device`
    /// (C7) holds; see `Endpoint::handle_message`/`Device::handle_zcl_packet`.
    pub fn handle_report_attributes(&mut self, records: Vec<Attribute>) {
        for rec in records {
            self.attribute_cache.insert(rec.attrid, rec.value.0.clone());
            self.emit(ClusterEvent::AttributeUpdated { attr_id: rec.attrid, value: rec.value.0 });
        }
    }

    /// Process an inbound cluster-specific command that did not match a
    /// pending TSN (spec.md §4.4: "frames whose TSN does not match are
    /// dispatched as asynchronous events ... to listeners").
    pub fn handle_cluster_command(&self, command_id: u8, tsn: u8, data: Vec<u8>) {
        self.emit(ClusterEvent::ClusterCommandReceived { command_id, tsn, data });
    }

    pub fn handle_unknown_cluster_message(&self, command_id: u8, tsn: u8) {
        self.emit(ClusterEvent::UnknownClusterMessage { command_id, tsn });
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AttrRef<'a> {
    Id(u16),
    Name(&'a str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_known_cluster_by_id_and_name() {
        let def = lookup(id::ON_OFF).unwrap();
        assert_eq!(def.name, "on_off");
        assert_eq!(lookup_by_name("on_off").unwrap().id, id::ON_OFF);
    }

    #[test]
    fn from_id_falls_back_to_generic_cluster_outside_registry_and_mfg_range() {
        let c = Cluster::from_id(1, 0x1234, ClusterRole::Server);
        assert_eq!(c.name(), "unknown");
        assert!(!c.is_manufacturer_specific_cluster());
    }

    #[test]
    fn from_id_flags_manufacturer_specific_range_even_without_a_schema() {
        let c = Cluster::from_id(1, 0xfc01, ClusterRole::Server);
        assert!(c.def.is_none());
        assert!(c.is_manufacturer_specific_cluster());
    }

    #[test]
    fn constant_attribute_overlay_shadows_cache() {
        let mut c = Cluster::from_id(1, id::BASIC, ClusterRole::Server);
        c.set_constant_attribute(0x0000, AttributeValue::Uint8(3));
        assert_eq!(c.cached(0x0000), Some(&AttributeValue::Uint8(3)));
    }

    #[test]
    fn handle_report_attributes_writes_through_cache() {
        let mut c = Cluster::from_id(1, id::ON_OFF, ClusterRole::Server);
        c.handle_report_attributes(vec![Attribute {
            attrid: 0x0000,
            value: TypeValue(AttributeValue::Boolean(true)),
        }]);
        assert_eq!(c.cached(0x0000), Some(&AttributeValue::Boolean(true)));
    }
}
