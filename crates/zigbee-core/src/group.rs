//! C13 — groups: 16-bit group addressing and the bidirectional membership
//! invariant spec.md §3's Ownership summary calls out ("membership is
//! consistent in both directions (endpoint lists groups; group lists
//! endpoints)").
//!
//! Grounded on `zigpy/group.py`: `Group`/`Groups` (registry keyed by group
//! id), `GroupEndpoint` (a fake endpoint wrapping a `Cluster` so the same
//! `cluster.on()`/`cluster.move_to_level()` helpers used for a single device
//! work unchanged for a multicast group), and `update_group_membership`'s
//! two-sided insert/remove.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;

use crate::cluster::{Cluster, ClusterRole, ClusterTransport};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::radio::{AddrModeAddress, RadioHandle, TxOptions, ZigbeePacket};
use crate::types::Eui64;
use crate::zcl::{FrameControl, ZclHeader};

/// Groups address endpoints, never devices directly (Zigbee has no concept
/// of a device-wide group membership), so a member is the pair
/// `(device ieee, endpoint id)` (spec.md §9 "Groups reference endpoints by
/// triple, never by owning pointer").
pub type GroupMember = (Eui64, u8);

#[derive(Debug, Clone)]
pub struct Group {
    pub group_id: u16,
    pub name: Option<String>,
    members: HashSet<GroupMember>,
}

impl Group {
    pub fn new(group_id: u16, name: Option<String>) -> Self {
        Self { group_id, name, members: HashSet::new() }
    }

    pub fn members(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter()
    }

    pub fn contains(&self, member: GroupMember) -> bool {
        self.members.contains(&member)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The group registry (C13). Kept as a `DashMap` for the same reason the
/// application controller's device table is one (concurrent lookups from
/// ingress and from API callers without a global lock).
pub struct Groups {
    groups: DashMap<u16, Group>,
}

impl Default for Groups {
    fn default() -> Self {
        Self::new()
    }
}

impl Groups {
    pub fn new() -> Self {
        Self { groups: DashMap::new() }
    }

    pub fn add_group(&self, group_id: u16, name: Option<String>) {
        self.groups.entry(group_id).or_insert_with(|| Group::new(group_id, name));
    }

    /// Remove a group outright. Any endpoint still listing this group in its
    /// own membership set is left stale until the next
    /// `remove_member`/re-scan touches it — callers that delete a group
    /// wholesale are expected to walk its (now-returned) member list and
    /// call [`Groups::remove_member`] for each first.
    pub fn remove_group(&self, group_id: u16) -> Option<Group> {
        self.groups.remove(&group_id).map(|(_, g)| g)
    }

    pub fn get(&self, group_id: u16) -> Option<Group> {
        self.groups.get(&group_id).map(|g| g.clone())
    }

    pub fn group_ids(&self) -> Vec<u16> {
        self.groups.iter().map(|e| *e.key()).collect()
    }

    /// Add `endpoint` as a member of `group_id`, creating the group if it
    /// doesn't exist yet, and keeping both directions consistent.
    pub fn add_member(&self, group_id: u16, ieee: Eui64, endpoint: &mut Endpoint) {
        self.groups
            .entry(group_id)
            .or_insert_with(|| Group::new(group_id, None))
            .members
            .insert((ieee, endpoint.endpoint_id));
        endpoint.add_group(group_id);
    }

    /// Remove `endpoint` from `group_id`'s membership, keeping both
    /// directions consistent. A no-op on either side if already absent.
    pub fn remove_member(&self, group_id: u16, ieee: Eui64, endpoint: &mut Endpoint) {
        if let Some(mut group) = self.groups.get_mut(&group_id) {
            group.members.remove(&(ieee, endpoint.endpoint_id));
        }
        endpoint.remove_group(group_id);
    }
}

/// The fake endpoint id `zigpy.group.GroupEndpoint` uses for its `Cluster`
/// instances — there is no real endpoint behind a group send, this is just
/// what gets embedded in `ZigbeePacket::src_ep`.
const GROUP_ENDPOINT_ID: u8 = 0xfe;

/// A virtual endpoint addressing an entire group (spec.md C13). Wraps a
/// `Cluster` exactly as [`Endpoint`] does so `cluster.on()`/
/// `cluster.move_to_level()` work unchanged; [`ClusterTransport::send`]
/// multicasts to `AddrModeAddress::Group` instead of one device's NWK
/// address and never waits for a reply, since a multicast has no single
/// respondent to correlate a TSN against.
pub struct GroupEndpoint {
    pub group_id: u16,
    pub cluster: Cluster,
    io: Arc<RadioHandle>,
}

impl GroupEndpoint {
    pub fn new(group_id: u16, cluster_id: u16, io: Arc<RadioHandle>) -> Self {
        Self { group_id, cluster: Cluster::from_id(GROUP_ENDPOINT_ID, cluster_id, ClusterRole::Server), io }
    }
}

impl ClusterTransport for GroupEndpoint {
    fn send<'a>(
        &'a self,
        _endpoint_id: u8,
        cluster_id: u16,
        frame_control: FrameControl,
        manufacturer_code: Option<u16>,
        command_id: u8,
        payload: Vec<u8>,
        _expect_reply: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>> {
        Box::pin(async move {
            let tsn = self.io.next_tsn();
            let header = ZclHeader { frame_control, manufacturer_code, tsn, command_id };
            let mut data = header.serialize();
            data.extend(payload);

            let packet = ZigbeePacket {
                src_ep: GROUP_ENDPOINT_ID,
                dst_ep: 0xff,
                dst: AddrModeAddress::Group(self.group_id),
                profile_id: 0x0104,
                cluster_id,
                data,
                tx_options: TxOptions { ack: false, use_network_key: true },
                radius: 0,
            };
            self.io.send(packet).await?;
            Ok(None)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ieee(n: u8) -> Eui64 {
        Eui64([n, 0, 0, 0, 0, 0, 0, 0])
    }

    #[test]
    fn add_member_is_visible_from_both_directions() {
        let groups = Groups::new();
        let mut ep = Endpoint::from_simple_descriptor(&crate::zdo::SimpleDescriptor {
            endpoint: 1,
            profile: 0x0104,
            device_type: 0x0100,
            device_version: 1,
            input_clusters: vec![crate::cluster::id::ON_OFF],
            output_clusters: vec![],
        });

        groups.add_member(0x0001, ieee(1), &mut ep);

        assert!(groups.get(0x0001).unwrap().contains((ieee(1), 1)));
        assert!(ep.groups().any(|&g| g == 0x0001));
    }

    #[test]
    fn remove_member_clears_both_directions() {
        let groups = Groups::new();
        let mut ep = Endpoint::from_simple_descriptor(&crate::zdo::SimpleDescriptor {
            endpoint: 1,
            profile: 0x0104,
            device_type: 0x0100,
            device_version: 1,
            input_clusters: vec![],
            output_clusters: vec![],
        });
        groups.add_member(0x0001, ieee(1), &mut ep);

        groups.remove_member(0x0001, ieee(1), &mut ep);

        assert!(!groups.get(0x0001).unwrap().contains((ieee(1), 1)));
        assert!(!ep.groups().any(|&g| g == 0x0001));
    }

    #[test]
    fn add_group_is_idempotent() {
        let groups = Groups::new();
        groups.add_group(0x0001, Some("Kitchen".to_string()));
        groups.add_group(0x0001, Some("Overwritten".to_string()));
        assert_eq!(groups.get(0x0001).unwrap().name.as_deref(), Some("Kitchen"));
    }
}
