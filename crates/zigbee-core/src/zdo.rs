//! C9 — ZDO (Zigbee Device Objects): descriptors, the 32-command registry,
//! and the controller's response to unsolicited ZDO traffic (device
//! announcements, match descriptor requests, permit-join notifications).
//!
//! Grounded on `zigpy/zdo/types.py` and `zigpy/zdo/__init__.py`.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::CodecError;
use crate::struct_codec::deserialize_optional_tail;
use crate::types::{Eui64, LvList, Nwk, Wire};

/// `zigpy.zdo.types.LogicalType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum LogicalType {
    Coordinator = 0b000,
    Router = 0b001,
    EndDevice = 0b010,
    Reserved3 = 0b011,
    Reserved4 = 0b100,
    Reserved5 = 0b101,
    Reserved6 = 0b110,
    Reserved7 = 0b111,
}

impl LogicalType {
    pub fn from_u8(v: u8) -> Self {
        match v & 0x07 {
            0b000 => LogicalType::Coordinator,
            0b001 => LogicalType::Router,
            0b010 => LogicalType::EndDevice,
            0b011 => LogicalType::Reserved3,
            0b100 => LogicalType::Reserved4,
            0b101 => LogicalType::Reserved5,
            0b110 => LogicalType::Reserved6,
            _ => LogicalType::Reserved7,
        }
    }
}

/// `zigpy.zdo.types.PowerDescriptor`. The four 4-bit sub-fields packed into
/// each byte are left uninterpreted, same as the source (TODO there too:
/// current mode / available modes / current power source / power level).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerDescriptor {
    pub byte_1: u8,
    pub byte_2: u8,
}

impl Wire for PowerDescriptor {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.byte_1);
        out.push(self.byte_2);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        if buf.len() < 2 {
            return Err(CodecError::UnexpectedEof { needed: 2, got: buf.len() });
        }
        Ok((PowerDescriptor { byte_1: buf[0], byte_2: buf[1] }, &buf[2..]))
    }
}

/// `zigpy.zdo.types.SimpleDescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleDescriptor {
    pub endpoint: u8,
    pub profile: u16,
    pub device_type: u16,
    pub device_version: u8,
    pub input_clusters: Vec<u16>,
    pub output_clusters: Vec<u16>,
}

impl Wire for SimpleDescriptor {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.endpoint);
        self.profile.serialize_to(out);
        self.device_type.serialize_to(out);
        out.push(self.device_version);
        LvList(self.input_clusters.clone()).serialize_to(out);
        LvList(self.output_clusters.clone()).serialize_to(out);
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (endpoint, rest) = u8::deserialize(buf)?;
        let (profile, rest) = u16::deserialize(rest)?;
        let (device_type, rest) = u16::deserialize(rest)?;
        let (device_version, rest) = u8::deserialize(rest)?;
        let (input_clusters, rest) = LvList::<u16>::deserialize(rest)?;
        let (output_clusters, rest) = LvList::<u16>::deserialize(rest)?;
        Ok((
            SimpleDescriptor {
                endpoint,
                profile,
                device_type,
                device_version,
                input_clusters: input_clusters.0,
                output_clusters: output_clusters.0,
            },
            rest,
        ))
    }
}

/// `zigpy.zdo.types.SizePrefixedSimpleDescriptor`: the Simple_Desc_rsp wire
/// shape, which prepends a length byte and reads back `None` when that byte
/// is zero (the device reported no descriptor, typically a status != SUCCESS
/// response).
pub struct SizePrefixedSimpleDescriptor;

impl SizePrefixedSimpleDescriptor {
    pub fn serialize(desc: &SimpleDescriptor) -> Vec<u8> {
        let body = desc.serialize();
        let mut out = vec![body.len() as u8];
        out.extend(body);
        out
    }

    pub fn deserialize(data: &[u8]) -> Result<(Option<SimpleDescriptor>, &[u8]), CodecError> {
        if data.is_empty() || data[0] == 0 {
            return Ok((None, data.get(1..).unwrap_or(&[])));
        }
        let (desc, rest) = SimpleDescriptor::deserialize(&data[1..])?;
        Ok((Some(desc), rest))
    }
}

/// `zigpy.zdo.types.NodeDescriptor`. Every accessor mirrors a specific bit
/// of `byte1`/`mac_capability_flags`; all are plain non-optional reads here
/// since the struct is always fully populated once parsed (spec.md §4.1
/// models partial population as a parse failure rather than a per-field
/// option, unlike the dynamically-typed source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub byte1: u8,
    pub byte2: u8,
    pub mac_capability_flags: u8,
    pub manufacturer_code: u16,
    pub maximum_buffer_size: u8,
    pub maximum_incoming_transfer_size: u16,
    pub server_mask: u16,
    pub maximum_outgoing_transfer_size: u16,
    pub descriptor_capability_field: u8,
}

impl NodeDescriptor {
    pub fn logical_type(&self) -> LogicalType {
        LogicalType::from_u8(self.byte1)
    }
    pub fn is_coordinator(&self) -> bool {
        self.logical_type() == LogicalType::Coordinator
    }
    pub fn is_end_device(&self) -> bool {
        self.logical_type() == LogicalType::EndDevice
    }
    pub fn is_router(&self) -> bool {
        self.logical_type() == LogicalType::Router
    }
    pub fn complex_descriptor_available(&self) -> bool {
        self.byte1 & 0b0000_1000 != 0
    }
    pub fn user_descriptor_available(&self) -> bool {
        self.byte1 & 0b0001_0000 != 0
    }
    pub fn is_alternate_pan_coordinator(&self) -> bool {
        self.mac_capability_flags & 0b0000_0001 != 0
    }
    pub fn is_full_function_device(&self) -> bool {
        self.mac_capability_flags & 0b0000_0010 != 0
    }
    pub fn is_mains_powered(&self) -> bool {
        self.mac_capability_flags & 0b0000_0100 != 0
    }
    pub fn is_receiver_on_when_idle(&self) -> bool {
        self.mac_capability_flags & 0b0000_1000 != 0
    }
    pub fn is_security_capable(&self) -> bool {
        self.mac_capability_flags & 0b0100_0000 != 0
    }
    pub fn allocate_address(&self) -> bool {
        self.mac_capability_flags & 0b1000_0000 != 0
    }
}

impl Wire for NodeDescriptor {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.byte1);
        out.push(self.byte2);
        out.push(self.mac_capability_flags);
        self.manufacturer_code.serialize_to(out);
        out.push(self.maximum_buffer_size);
        self.maximum_incoming_transfer_size.serialize_to(out);
        self.server_mask.serialize_to(out);
        self.maximum_outgoing_transfer_size.serialize_to(out);
        out.push(self.descriptor_capability_field);
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (byte1, rest) = u8::deserialize(buf)?;
        let (byte2, rest) = u8::deserialize(rest)?;
        let (mac_capability_flags, rest) = u8::deserialize(rest)?;
        let (manufacturer_code, rest) = u16::deserialize(rest)?;
        let (maximum_buffer_size, rest) = u8::deserialize(rest)?;
        let (maximum_incoming_transfer_size, rest) = u16::deserialize(rest)?;
        let (server_mask, rest) = u16::deserialize(rest)?;
        let (maximum_outgoing_transfer_size, rest) = u16::deserialize(rest)?;
        let (descriptor_capability_field, rest) = u8::deserialize(rest)?;
        Ok((
            NodeDescriptor {
                byte1,
                byte2,
                mac_capability_flags,
                manufacturer_code,
                maximum_buffer_size,
                maximum_incoming_transfer_size,
                server_mask,
                maximum_outgoing_transfer_size,
                descriptor_capability_field,
            },
            rest,
        ))
    }
}

/// `zigpy.zdo.types.MultiAddress`: the one struct spec.md names as "the
/// concrete example" of a conditional-field struct, modeled per §9's sum
/// type strategy rather than as optional fields with a validity predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiAddress {
    Nwk { addr: Nwk },
    Ieee { addr: Eui64, endpoint: u8 },
}

impl MultiAddress {
    pub fn addrmode(&self) -> u8 {
        match self {
            MultiAddress::Nwk { .. } => 0x01,
            MultiAddress::Ieee { .. } => 0x03,
        }
    }
}

impl Wire for MultiAddress {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.addrmode());
        match self {
            MultiAddress::Nwk { addr } => addr.serialize_to(out),
            MultiAddress::Ieee { addr, endpoint } => {
                addr.serialize_to(out);
                out.push(*endpoint);
            }
        }
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (addrmode, rest) = u8::deserialize(buf)?;
        match addrmode {
            0x01 => {
                let (addr, rest) = Nwk::deserialize(rest)?;
                Ok((MultiAddress::Nwk { addr }, rest))
            }
            0x03 => {
                let (addr, rest) = Eui64::deserialize(rest)?;
                let (endpoint, rest) = u8::deserialize(rest)?;
                Ok((MultiAddress::Ieee { addr, endpoint }, rest))
            }
            other => Err(CodecError::InvalidDiscriminant(other as u32)),
        }
    }
}

/// The 32-entry ZDO command registry (spec.md §6). Response ids are always
/// `request | 0x8000`; `is_response()` checks that bit directly rather than
/// needing a second table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZdoCommandId(pub u16);

impl ZdoCommandId {
    pub const NWK_ADDR_REQ: ZdoCommandId = ZdoCommandId(0x0000);
    pub const NWK_ADDR_RSP: ZdoCommandId = ZdoCommandId(0x8000);
    pub const IEEE_ADDR_REQ: ZdoCommandId = ZdoCommandId(0x0001);
    pub const IEEE_ADDR_RSP: ZdoCommandId = ZdoCommandId(0x8001);
    pub const NODE_DESC_REQ: ZdoCommandId = ZdoCommandId(0x0002);
    pub const NODE_DESC_RSP: ZdoCommandId = ZdoCommandId(0x8002);
    pub const POWER_DESC_REQ: ZdoCommandId = ZdoCommandId(0x0003);
    pub const POWER_DESC_RSP: ZdoCommandId = ZdoCommandId(0x8003);
    pub const SIMPLE_DESC_REQ: ZdoCommandId = ZdoCommandId(0x0004);
    pub const SIMPLE_DESC_RSP: ZdoCommandId = ZdoCommandId(0x8004);
    pub const ACTIVE_EP_REQ: ZdoCommandId = ZdoCommandId(0x0005);
    pub const ACTIVE_EP_RSP: ZdoCommandId = ZdoCommandId(0x8005);
    pub const MATCH_DESC_REQ: ZdoCommandId = ZdoCommandId(0x0006);
    pub const MATCH_DESC_RSP: ZdoCommandId = ZdoCommandId(0x8006);
    pub const COMPLEX_DESC_REQ: ZdoCommandId = ZdoCommandId(0x0010);
    pub const COMPLEX_DESC_RSP: ZdoCommandId = ZdoCommandId(0x8010);
    pub const USER_DESC_REQ: ZdoCommandId = ZdoCommandId(0x0011);
    pub const USER_DESC_RSP: ZdoCommandId = ZdoCommandId(0x8011);
    pub const DEVICE_ANNCE: ZdoCommandId = ZdoCommandId(0x0013);
    pub const USER_DESC_SET: ZdoCommandId = ZdoCommandId(0x0014);
    pub const USER_DESC_CONF: ZdoCommandId = ZdoCommandId(0x8014);
    pub const SYSTEM_SERVER_DISCOVERY_REQ: ZdoCommandId = ZdoCommandId(0x0015);
    pub const SYSTEM_SERVER_DISCOVERY_RSP: ZdoCommandId = ZdoCommandId(0x8015);
    pub const BIND_REQ: ZdoCommandId = ZdoCommandId(0x0021);
    pub const BIND_RSP: ZdoCommandId = ZdoCommandId(0x8021);
    pub const UNBIND_REQ: ZdoCommandId = ZdoCommandId(0x0022);
    pub const UNBIND_RSP: ZdoCommandId = ZdoCommandId(0x8022);
    pub const MGMT_NWK_DISC_REQ: ZdoCommandId = ZdoCommandId(0x0030);
    pub const MGMT_NWK_DISC_RSP: ZdoCommandId = ZdoCommandId(0x8030);
    pub const MGMT_LQI_REQ: ZdoCommandId = ZdoCommandId(0x0031);
    pub const MGMT_LQI_RSP: ZdoCommandId = ZdoCommandId(0x8031);
    pub const MGMT_RTG_REQ: ZdoCommandId = ZdoCommandId(0x0032);
    pub const MGMT_RTG_RSP: ZdoCommandId = ZdoCommandId(0x8032);
    pub const MGMT_LEAVE_REQ: ZdoCommandId = ZdoCommandId(0x0034);
    pub const MGMT_LEAVE_RSP: ZdoCommandId = ZdoCommandId(0x8034);
    pub const MGMT_PERMIT_JOINING_REQ: ZdoCommandId = ZdoCommandId(0x0036);
    pub const MGMT_PERMIT_JOINING_RSP: ZdoCommandId = ZdoCommandId(0x8036);
    pub const MGMT_NWK_UPDATE_REQ: ZdoCommandId = ZdoCommandId(0x0038);
    pub const MGMT_NWK_UPDATE_RSP: ZdoCommandId = ZdoCommandId(0x8038);

    pub fn is_response(self) -> bool {
        self.0 & 0x8000 != 0
    }

    pub fn request_id(self) -> ZdoCommandId {
        ZdoCommandId(self.0 & !0x8000)
    }

    pub fn response_id(self) -> ZdoCommandId {
        ZdoCommandId(self.0 | 0x8000)
    }
}

/// Bind/Unbind request bodies (`zigpy.zdo.types.Bind`/request helpers in
/// `zigpy/zdo/__init__.py`'s `bind`/`unbind`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub src_ieee: Eui64,
    pub src_endpoint: u8,
    pub cluster_id: u16,
    pub dst: MultiAddress,
}

impl Wire for BindRequest {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.src_ieee.serialize_to(out);
        out.push(self.src_endpoint);
        self.cluster_id.serialize_to(out);
        self.dst.serialize_to(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (src_ieee, rest) = Eui64::deserialize(buf)?;
        let (src_endpoint, rest) = u8::deserialize(rest)?;
        let (cluster_id, rest) = u16::deserialize(rest)?;
        let (dst, rest) = MultiAddress::deserialize(rest)?;
        Ok((BindRequest { src_ieee, src_endpoint, cluster_id, dst }, rest))
    }
}

/// `Mgmt_Leave_req` flags: bit 6 = remove children, bit 7 = rejoin
/// (`zigpy.zdo.__init__.ZDO.leave`).
pub fn leave_flags(remove_children: bool, rejoin: bool) -> u8 {
    let mut flags = 0u8;
    if remove_children {
        flags |= 0x40;
    }
    if rejoin {
        flags |= 0x80;
    }
    flags
}

/// `Device_annce` payload: nwk, ieee, capability (`zigpy.zdo.__init__`'s
/// handling of `Device_annce` in `handle_message`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAnnounce {
    pub nwk: Nwk,
    pub ieee: Eui64,
    pub capability: u8,
}

impl Wire for DeviceAnnounce {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.nwk.serialize_to(out);
        self.ieee.serialize_to(out);
        out.push(self.capability);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (nwk, rest) = Nwk::deserialize(buf)?;
        let (ieee, rest) = Eui64::deserialize(rest)?;
        let (capability, rest) = u8::deserialize(rest)?;
        Ok((DeviceAnnounce { nwk, ieee, capability }, rest))
    }
}

/// `Match_Desc_req`: profile + cluster lists the requester is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDescRequest {
    pub nwk_addr_of_interest: Nwk,
    pub profile_id: u16,
    pub input_clusters: Vec<u16>,
    pub output_clusters: Vec<u16>,
}

impl Wire for MatchDescRequest {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.nwk_addr_of_interest.serialize_to(out);
        self.profile_id.serialize_to(out);
        LvList(self.input_clusters.clone()).serialize_to(out);
        LvList(self.output_clusters.clone()).serialize_to(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (nwk_addr_of_interest, rest) = Nwk::deserialize(buf)?;
        let (profile_id, rest) = u16::deserialize(rest)?;
        let (input_clusters, rest) = LvList::<u16>::deserialize(rest)?;
        let (output_clusters, rest) = LvList::<u16>::deserialize(rest)?;
        Ok((
            MatchDescRequest {
                nwk_addr_of_interest,
                profile_id,
                input_clusters: input_clusters.0,
                output_clusters: output_clusters.0,
            },
            rest,
        ))
    }
}

/// `Match_Desc_rsp`: `zigpy.zdo.__init__.ZDO.handle_match_desc` only ever
/// answers with endpoint 1 for the Home Automation profile (0x0104),
/// otherwise an empty match list.
pub fn handle_match_desc(request: &MatchDescRequest, our_nwk: Nwk) -> (u8, Vec<u8>) {
    const HOME_AUTOMATION_PROFILE: u16 = 0x0104;
    if request.profile_id == HOME_AUTOMATION_PROFILE {
        (0, vec![1])
    } else {
        let _ = our_nwk;
        (0, vec![])
    }
}

/// Trailing-optional decode helper for responses that carry a descriptor
/// only when `status == SUCCESS` — several `*_rsp` bodies share this shape.
pub fn deserialize_optional_descriptor<T: Wire>(
    buf: &[u8],
) -> Result<(Option<T>, &[u8]), CodecError> {
    deserialize_optional_tail::<T>(buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZdoStatus(pub u8);

impl ZdoStatus {
    pub const SUCCESS: ZdoStatus = ZdoStatus(0x00);
    pub const NOT_SUPPORTED: ZdoStatus = ZdoStatus(0x84);
    pub fn is_success(self) -> bool {
        self.0 == 0x00
    }
    pub fn is_not_supported(self) -> bool {
        self.0 == 0x84
    }
}

/// One `Mgmt_Lqi_rsp` neighbor table record (`zigpy.zdo.types.Neighbor`):
/// the packed relationship/device-type byte is kept raw since neither the
/// topology scanner (C12) nor any caller spec.md describes needs to
/// interpret it, only discover the NWK address behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborTableEntry {
    pub extended_pan_id: Eui64,
    pub ieee: Eui64,
    pub nwk: Nwk,
    pub packed: u8,
    pub permit_joining: u8,
    pub depth: u8,
    pub lqi: u8,
}

impl Wire for NeighborTableEntry {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.extended_pan_id.serialize_to(out);
        self.ieee.serialize_to(out);
        self.nwk.serialize_to(out);
        out.push(self.packed);
        out.push(self.permit_joining);
        out.push(self.depth);
        out.push(self.lqi);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (extended_pan_id, rest) = Eui64::deserialize(buf)?;
        let (ieee, rest) = Eui64::deserialize(rest)?;
        let (nwk, rest) = Nwk::deserialize(rest)?;
        let (packed, rest) = u8::deserialize(rest)?;
        let (permit_joining, rest) = u8::deserialize(rest)?;
        let (depth, rest) = u8::deserialize(rest)?;
        let (lqi, rest) = u8::deserialize(rest)?;
        Ok((
            NeighborTableEntry { extended_pan_id, ieee, nwk, packed, permit_joining, depth, lqi },
            rest,
        ))
    }
}

/// `Mgmt_Lqi_rsp` body: status, the device's total entry count, the
/// `StartIndex` this response actually covers, and the page of entries
/// (spec.md §4.8: "paging by `StartIndex`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgmtLqiResponse {
    pub status: ZdoStatus,
    pub neighbor_table_entries: u8,
    pub start_index: u8,
    pub neighbor_table_list: Vec<NeighborTableEntry>,
}

impl Wire for MgmtLqiResponse {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.status.0);
        out.push(self.neighbor_table_entries);
        out.push(self.start_index);
        out.push(self.neighbor_table_list.len() as u8);
        for entry in &self.neighbor_table_list {
            entry.serialize_to(out);
        }
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (status, rest) = u8::deserialize(buf)?;
        let (neighbor_table_entries, rest) = u8::deserialize(rest)?;
        let (start_index, rest) = u8::deserialize(rest)?;
        let (count, mut rest) = u8::deserialize(rest)?;
        let mut neighbor_table_list = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (entry, r) = NeighborTableEntry::deserialize(rest)?;
            neighbor_table_list.push(entry);
            rest = r;
        }
        Ok((
            MgmtLqiResponse { status: ZdoStatus(status), neighbor_table_entries, start_index, neighbor_table_list },
            rest,
        ))
    }
}

/// One `Mgmt_Rtg_rsp` routing table record (`zigpy.zdo.types.Route`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingTableEntry {
    pub destination: Nwk,
    pub packed: u8,
    pub next_hop: Nwk,
}

impl Wire for RoutingTableEntry {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.destination.serialize_to(out);
        out.push(self.packed);
        self.next_hop.serialize_to(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (destination, rest) = Nwk::deserialize(buf)?;
        let (packed, rest) = u8::deserialize(rest)?;
        let (next_hop, rest) = Nwk::deserialize(rest)?;
        Ok((RoutingTableEntry { destination, packed, next_hop }, rest))
    }
}

/// `Mgmt_Rtg_rsp` body, same paging shape as [`MgmtLqiResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgmtRtgResponse {
    pub status: ZdoStatus,
    pub routing_table_entries: u8,
    pub start_index: u8,
    pub routing_table_list: Vec<RoutingTableEntry>,
}

impl Wire for MgmtRtgResponse {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.status.0);
        out.push(self.routing_table_entries);
        out.push(self.start_index);
        out.push(self.routing_table_list.len() as u8);
        for entry in &self.routing_table_list {
            entry.serialize_to(out);
        }
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (status, rest) = u8::deserialize(buf)?;
        let (routing_table_entries, rest) = u8::deserialize(rest)?;
        let (start_index, rest) = u8::deserialize(rest)?;
        let (count, mut rest) = u8::deserialize(rest)?;
        let mut routing_table_list = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (entry, r) = RoutingTableEntry::deserialize(rest)?;
            routing_table_list.push(entry);
            rest = r;
        }
        Ok((
            MgmtRtgResponse { status: ZdoStatus(status), routing_table_entries, start_index, routing_table_list },
            rest,
        ))
    }
}

#[cfg(test)]
mod mgmt_tests {
    use super::*;

    #[test]
    fn mgmt_lqi_response_roundtrips_with_entries() {
        let resp = MgmtLqiResponse {
            status: ZdoStatus::SUCCESS,
            neighbor_table_entries: 1,
            start_index: 0,
            neighbor_table_list: vec![NeighborTableEntry {
                extended_pan_id: Eui64([1; 8]),
                ieee: Eui64([2; 8]),
                nwk: Nwk(0xabcd),
                packed: 0,
                permit_joining: 0,
                depth: 1,
                lqi: 200,
            }],
        };
        let (back, rest) = MgmtLqiResponse::deserialize(&resp.serialize()).unwrap();
        assert_eq!(back, resp);
        assert!(rest.is_empty());
    }

    #[test]
    fn mgmt_rtg_response_roundtrips_with_entries() {
        let resp = MgmtRtgResponse {
            status: ZdoStatus::SUCCESS,
            routing_table_entries: 1,
            start_index: 0,
            routing_table_list: vec![RoutingTableEntry {
                destination: Nwk(0x1111),
                packed: 0,
                next_hop: Nwk(0x2222),
            }],
        };
        let (back, rest) = MgmtRtgResponse::deserialize(&resp.serialize()).unwrap();
        assert_eq!(back, resp);
        assert!(rest.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_address_roundtrips_nwk_and_ieee_modes() {
        let nwk = MultiAddress::Nwk { addr: Nwk(0x1234) };
        let (back, rest) = MultiAddress::deserialize(&nwk.serialize()).unwrap();
        assert_eq!(back, nwk);
        assert!(rest.is_empty());

        let ieee = MultiAddress::Ieee { addr: Eui64([1, 2, 3, 4, 5, 6, 7, 8]), endpoint: 3 };
        let (back, rest) = MultiAddress::deserialize(&ieee.serialize()).unwrap();
        assert_eq!(back, ieee);
        assert!(rest.is_empty());
    }

    #[test]
    fn multi_address_rejects_unknown_addrmode() {
        let buf = [0x02u8, 0x00, 0x00];
        assert!(MultiAddress::deserialize(&buf).is_err());
    }

    #[test]
    fn node_descriptor_bit_accessors() {
        let nd = NodeDescriptor {
            byte1: 0b0001_1001, // router(0b001) | complex_desc | user_desc
            byte2: 0,
            mac_capability_flags: 0b1000_0010, // full-function + allocate_address
            manufacturer_code: 0x10f2,
            maximum_buffer_size: 80,
            maximum_incoming_transfer_size: 0,
            server_mask: 0,
            maximum_outgoing_transfer_size: 0,
            descriptor_capability_field: 0,
        };
        assert_eq!(nd.logical_type(), LogicalType::Router);
        assert!(nd.is_router());
        assert!(!nd.is_coordinator());
        assert!(nd.complex_descriptor_available());
        assert!(nd.user_descriptor_available());
        assert!(nd.is_full_function_device());
        assert!(nd.allocate_address());
        assert!(!nd.is_mains_powered());
    }

    #[test]
    fn size_prefixed_simple_descriptor_zero_length_means_absent() {
        let (desc, rest) = SizePrefixedSimpleDescriptor::deserialize(&[0x00, 0xaa]).unwrap();
        assert!(desc.is_none());
        assert_eq!(rest, &[0xaa]);
    }

    #[test]
    fn size_prefixed_simple_descriptor_roundtrip() {
        let desc = SimpleDescriptor {
            endpoint: 1,
            profile: 0x0104,
            device_type: 0x0100,
            device_version: 1,
            input_clusters: vec![0x0000, 0x0006],
            output_clusters: vec![],
        };
        let bytes = SizePrefixedSimpleDescriptor::serialize(&desc);
        let (back, rest) = SizePrefixedSimpleDescriptor::deserialize(&bytes).unwrap();
        assert_eq!(back, Some(desc));
        assert!(rest.is_empty());
    }

    #[test]
    fn match_desc_answers_only_for_home_automation_profile() {
        let req = MatchDescRequest {
            nwk_addr_of_interest: Nwk(0),
            profile_id: 0x0104,
            input_clusters: vec![0x0006],
            output_clusters: vec![],
        };
        let (status, endpoints) = handle_match_desc(&req, Nwk(0));
        assert_eq!(status, 0);
        assert_eq!(endpoints, vec![1]);

        let other = MatchDescRequest { profile_id: 0x0101, ..req };
        let (_, endpoints) = handle_match_desc(&other, Nwk(0));
        assert!(endpoints.is_empty());
    }

    #[test]
    fn response_id_sets_the_high_bit() {
        assert_eq!(ZdoCommandId::ACTIVE_EP_REQ.response_id(), ZdoCommandId::ACTIVE_EP_RSP);
        assert!(ZdoCommandId::ACTIVE_EP_RSP.is_response());
        assert!(!ZdoCommandId::ACTIVE_EP_REQ.is_response());
    }
}
